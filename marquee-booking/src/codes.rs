use chrono::Utc;
use rand::Rng;

const BASE36: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// `BK<epoch millis><5 base36 chars>`
pub fn booking_reference() -> String {
    format!("BK{}{}", Utc::now().timestamp_millis(), random_base36(5))
}

/// `BUNDLE-<epoch millis>-<6 base36 chars>`
pub fn bundle_reference() -> String {
    format!("BUNDLE-{}-{}", Utc::now().timestamp_millis(), random_base36(6))
}

/// Six digits, uniform over 000000..=999999. Kept as text so leading zeros survive.
pub fn verification_code() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{:06}", n)
}

fn random_base36(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_format() {
        let reference = booking_reference();
        assert!(reference.starts_with("BK"));
        let suffix = &reference[reference.len() - 5..];
        assert!(suffix.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        assert!(reference[2..reference.len() - 5].parse::<i64>().is_ok());

        let bundle = bundle_reference();
        let parts: Vec<&str> = bundle.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "BUNDLE");
        assert_eq!(parts[2].len(), 6);
    }

    #[test]
    fn test_verification_code_is_six_digits() {
        for _ in 0..500 {
            let code = verification_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
