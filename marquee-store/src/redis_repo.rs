use redis::RedisResult;
use tracing::debug;

/// INCR the counter and start its window only on the first hit. A key left
/// without a TTL (TTL == -1) is repaired so it cannot block forever.
const FIXED_WINDOW_SCRIPT: &str = r#"
    local count = redis.call("INCR", KEYS[1])
    if count == 1 or redis.call("TTL", KEYS[1]) == -1 then
        redis.call("EXPIRE", KEYS[1], ARGV[1])
    end
    return count
"#;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub fn new(connection_string: &str) -> RedisResult<Self> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    /// Fixed-window counter. Returns false once `limit` requests have been
    /// seen for `key` inside the current window. The window starts with the
    /// first request and is not extended by later ones.
    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let count: i64 = redis::Script::new(FIXED_WINDOW_SCRIPT)
            .key(key)
            .arg(window_seconds)
            .invoke_async(&mut conn)
            .await?;

        if count > limit {
            debug!(key, count, limit, "Rate limit exceeded");
        }
        Ok(count <= limit)
    }
}
