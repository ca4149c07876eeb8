//! Executor configuration.

use crate::errors::ConduitError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// What a node does when a failed batch has used up its attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustedRetryPolicy {
    /// Stop the lineage without any signal.
    #[default]
    Silent,
    /// Stop the lineage, log a warning, emit `lineage.exhausted` and count the
    /// batch in the node's report.
    Report,
}

/// Configuration of a [`PipelineExecutor`](super::PipelineExecutor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base location result URIs are generated under, e.g. `s3://bucket/run`.
    pub result_store_uri: String,
    /// Suffix appended to every generated result URI.
    #[serde(default = "default_result_suffix")]
    pub result_suffix: String,
    /// Longest a node waits for its next response before failing.
    #[serde(default)]
    pub response_timeout_ms: Option<u64>,
    /// Behavior once a batch runs out of attempts.
    #[serde(default)]
    pub exhausted_retry_policy: ExhaustedRetryPolicy,
    /// Retry failures reported by terminal nodes as well.
    #[serde(default)]
    pub retry_terminal_failures: bool,
}

fn default_result_suffix() -> String {
    ".cbor.tar.gz".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            result_store_uri: String::new(),
            result_suffix: default_result_suffix(),
            response_timeout_ms: None,
            exhausted_retry_policy: ExhaustedRetryPolicy::default(),
            retry_terminal_failures: false,
        }
    }
}

impl EngineConfig {
    /// Creates a configuration writing results under `result_store_uri`.
    #[must_use]
    pub fn new(result_store_uri: impl Into<String>) -> Self {
        Self {
            result_store_uri: result_store_uri.into(),
            ..Self::default()
        }
    }

    /// Sets the result URI suffix.
    #[must_use]
    pub fn with_result_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.result_suffix = suffix.into();
        self
    }

    /// Sets the idle response timeout.
    #[must_use]
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Sets the exhausted retry policy.
    #[must_use]
    pub fn with_exhausted_retry_policy(mut self, policy: ExhaustedRetryPolicy) -> Self {
        self.exhausted_retry_policy = policy;
        self
    }

    /// Enables or disables retries for terminal nodes.
    #[must_use]
    pub fn with_retry_terminal_failures(mut self, enabled: bool) -> Self {
        self.retry_terminal_failures = enabled;
        self
    }

    /// The idle response timeout, if any.
    #[must_use]
    pub fn response_timeout(&self) -> Option<Duration> {
        self.response_timeout_ms.map(Duration::from_millis)
    }

    /// Checks the configuration for values the executor cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConduitError::Config`] if `result_store_uri` is empty or the
    /// response timeout is zero.
    pub fn validate(&self) -> Result<(), ConduitError> {
        if self.result_store_uri.trim().is_empty() {
            return Err(ConduitError::Config(
                "result_store_uri must not be empty".to_string(),
            ));
        }
        if self.response_timeout_ms == Some(0) {
            return Err(ConduitError::Config(
                "response_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Parses and validates a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConduitError::Config`] if the text is malformed or invalid.
    pub fn from_json_str(text: &str) -> Result<Self, ConduitError> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| ConduitError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConduitError::Io`] if the file cannot be read and
    /// [`ConduitError::Config`] if its content is invalid.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConduitError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::new("s3://bucket");
        assert_eq!(config.result_suffix, ".cbor.tar.gz");
        assert_eq!(config.response_timeout(), None);
        assert_eq!(config.exhausted_retry_policy, ExhaustedRetryPolicy::Silent);
        assert!(!config.retry_terminal_failures);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let config = EngineConfig::new("s3://bucket")
            .with_result_suffix(".json")
            .with_response_timeout(Duration::from_secs(2))
            .with_exhausted_retry_policy(ExhaustedRetryPolicy::Report)
            .with_retry_terminal_failures(true);

        assert_eq!(config.result_suffix, ".json");
        assert_eq!(config.response_timeout_ms, Some(2000));
        assert_eq!(config.response_timeout(), Some(Duration::from_secs(2)));
        assert_eq!(config.exhausted_retry_policy, ExhaustedRetryPolicy::Report);
        assert!(config.retry_terminal_failures);
    }

    #[test]
    fn test_validate_rejects_empty_store() {
        assert!(matches!(
            EngineConfig::default().validate(),
            Err(ConduitError::Config(_))
        ));
        assert!(EngineConfig::new("   ").validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = EngineConfig::new("s3://bucket").with_response_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_json_str() {
        let config = EngineConfig::from_json_str(
            r#"{
                "result_store_uri": "s3://results",
                "response_timeout_ms": 500,
                "exhausted_retry_policy": "report"
            }"#,
        )
        .unwrap();

        assert_eq!(config.result_store_uri, "s3://results");
        assert_eq!(config.result_suffix, ".cbor.tar.gz");
        assert_eq!(config.response_timeout(), Some(Duration::from_millis(500)));
        assert_eq!(config.exhausted_retry_policy, ExhaustedRetryPolicy::Report);
    }

    #[test]
    fn test_from_json_str_errors() {
        assert!(matches!(
            EngineConfig::from_json_str("{"),
            Err(ConduitError::Config(_))
        ));
        assert!(matches!(
            EngineConfig::from_json_str(r#"{"result_store_uri": ""}"#),
            Err(ConduitError::Config(_))
        ));
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"result_store_uri": "file:///tmp/out", "result_suffix": ".bin"}}"#).unwrap();

        let config = EngineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.result_store_uri, "file:///tmp/out");
        assert_eq!(config.result_suffix, ".bin");
    }

    #[test]
    fn test_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            EngineConfig::from_json_file(dir.path().join("missing.json")),
            Err(ConduitError::Io(_))
        ));
    }
}
