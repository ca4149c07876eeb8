//! Result location generation.

use super::EngineConfig;
use uuid::Uuid;

/// Generates fresh result locations and correlation ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultLocator {
    base: String,
    suffix: String,
}

impl ResultLocator {
    /// Creates a locator producing `{base}/{uuid}{suffix}`.
    #[must_use]
    pub fn new(base: impl Into<String>, suffix: impl Into<String>) -> Self {
        let base: String = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
            suffix: suffix.into(),
        }
    }

    /// Creates a locator from executor configuration.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.result_store_uri.clone(), config.result_suffix.clone())
    }

    /// A location no other request has been given.
    #[must_use]
    pub fn next_result_uri(&self) -> String {
        format!("{}/{}{}", self.base, Uuid::new_v4(), self.suffix)
    }

    /// A fresh correlation id.
    #[must_use]
    pub fn next_correlation_id(&self) -> Uuid {
        Uuid::new_v4()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_uri_shape() {
        let locator = ResultLocator::new("s3://bucket/run", ".cbor.tar.gz");
        let uri = locator.next_result_uri();

        let rest = uri.strip_prefix("s3://bucket/run/").unwrap();
        let id = rest.strip_suffix(".cbor.tar.gz").unwrap();
        assert!(Uuid::parse_str(id).is_ok());
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let locator = ResultLocator::new("s3://bucket/", ".bin");
        assert!(locator.next_result_uri().starts_with("s3://bucket/"));
        assert!(!locator.next_result_uri().starts_with("s3://bucket//"));
    }

    #[test]
    fn test_fresh_values() {
        let locator = ResultLocator::from_config(&EngineConfig::new("s3://bucket"));
        assert_ne!(locator.next_result_uri(), locator.next_result_uri());
        assert_ne!(locator.next_correlation_id(), locator.next_correlation_id());
    }
}
