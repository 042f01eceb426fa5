use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Opaque optimistic-concurrency token issued by the server.
///
/// Etags are compared for equality only. [Etag::empty] is the sentinel sent
/// with a write when the document must not exist yet.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Etag(String);

impl Etag {
    pub fn new(value: impl Into<String>) -> Self {
        Etag(value.into())
    }

    /// The "must not exist" sentinel.
    pub fn empty() -> Self {
        Etag(Uuid::nil().to_string())
    }

    /// Builds an etag from a server-side change counter.
    pub fn from_counter(counter: u128) -> Self {
        Etag(Uuid::from_u128(counter).to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.0 == Uuid::nil().to_string()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Etag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Etag {
    fn from(value: &str) -> Self {
        Etag::new(value)
    }
}

impl From<String> for Etag {
    fn from(value: String) -> Self {
        Etag(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_sentinel() {
        let empty = Etag::empty();
        assert!(empty.is_empty());
        assert_eq!(empty.as_str(), "00000000-0000-0000-0000-000000000000");
        assert!(!Etag::new("E1").is_empty());
    }

    #[test]
    fn test_equality_only() {
        assert_eq!(Etag::from("E1"), Etag::new("E1".to_string()));
        assert_ne!(Etag::from("E1"), Etag::from("E2"));
    }

    #[test]
    fn test_from_counter_is_distinct() {
        assert_ne!(Etag::from_counter(1), Etag::from_counter(2));
        assert!(!Etag::from_counter(1).is_empty());
        assert_eq!(Etag::from_counter(0), Etag::empty());
    }
}
