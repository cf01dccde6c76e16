use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wraps customer contact data so log macros never print it in full.
///
/// `Debug` and `Display` keep the first character and, for e-mail addresses,
/// the domain (`j*****@example.com`). Serialization is untouched because API
/// responses need the real value.
#[derive(Clone, Deserialize)]
pub struct Masked<T>(pub T);

impl<T: fmt::Display> Masked<T> {
    fn redacted(&self) -> String {
        let raw = self.0.to_string();
        let (local, domain) = match raw.split_once('@') {
            Some((local, domain)) => (local, Some(domain)),
            None => (raw.as_str(), None),
        };

        let mut out = String::new();
        if let Some(first) = local.chars().next() {
            out.push(first);
        }
        out.push_str("*****");
        if let Some(domain) = domain {
            out.push('@');
            out.push_str(domain);
        }
        out
    }
}

impl<T: fmt::Display> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl<T: fmt::Display> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}
