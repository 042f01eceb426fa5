use dashmap::DashMap;

use crate::common::KEY_PREFIX_SEPARATOR;
use crate::errors::{DocketError, DocketResult, ErrorKind};

/// Generates document keys on the client when an object is stored without
/// one.
pub trait KeyGenerator: Send + Sync {
    /// Returns a fresh key for an object whose type tag is `tag`.
    fn generate_document_key(&self, tag: &str) -> DocketResult<String>;
}

/// Default generator producing `"<prefix>/<n>"`, where the prefix is the
/// lower-cased type tag and `n` counts up per prefix from 1.
#[derive(Default)]
pub struct SequentialKeyGenerator {
    counters: DashMap<String, u64>,
}

impl SequentialKeyGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next key for `tag` follow `value`.
    pub fn seed(&self, tag: &str, value: u64) {
        self.counters.insert(tag.to_lowercase(), value);
    }
}

impl KeyGenerator for SequentialKeyGenerator {
    fn generate_document_key(&self, tag: &str) -> DocketResult<String> {
        if tag.is_empty() {
            log::error!("Cannot generate a document key without a type tag");
            return Err(DocketError::new(
                "Cannot generate a document key without a type tag",
                ErrorKind::IdentityError,
            ));
        }

        let prefix = tag.to_lowercase();
        let next = {
            let mut counter = self.counters.entry(prefix.clone()).or_insert(0);
            *counter += 1;
            *counter
        };
        Ok(format!("{}{}{}", prefix, KEY_PREFIX_SEPARATOR, next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_keys_count_per_prefix() {
        let generator = SequentialKeyGenerator::new();
        assert_eq!(generator.generate_document_key("Users").unwrap(), "users/1");
        assert_eq!(generator.generate_document_key("Users").unwrap(), "users/2");
        assert_eq!(generator.generate_document_key("Orders").unwrap(), "orders/1");
    }

    #[test]
    fn test_seed() {
        let generator = SequentialKeyGenerator::new();
        generator.seed("Users", 41);
        assert_eq!(generator.generate_document_key("users").unwrap(), "users/42");
    }

    #[test]
    fn test_empty_tag_is_identity_error() {
        let generator = SequentialKeyGenerator::new();
        let err = generator.generate_document_key("").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::IdentityError);
    }

    #[test]
    fn test_concurrent_generation_is_unique() {
        let generator = Arc::new(SequentialKeyGenerator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let generator = generator.clone();
                std::thread::spawn(move || {
                    (0..25)
                        .map(|_| generator.generate_document_key("Users").unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut keys: Vec<String> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 100);
    }
}
