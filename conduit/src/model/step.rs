//! Pipeline steps and channel naming.

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Runtime policy attached to a step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Number of records a worker groups into one output.
    #[serde(default)]
    pub batch_size: u32,
    /// Seconds a worker waits before flushing a partial batch.
    #[serde(default)]
    pub batch_timeout: u32,
    /// Maximum number of attempts for a batch sent to this step.
    #[serde(default)]
    pub max_retries: u32,
}

/// A named pipeline stage served by an external worker.
///
/// Field names on the wire match the persisted step definitions, so a
/// pipeline loaded from the ledger deserializes directly into this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Unique step identifier.
    #[serde(rename = "step_id")]
    pub id: Uuid,
    /// Declared step name.
    pub name: String,
    /// The pipeline owning this step.
    #[serde(default)]
    pub pipeline_id: Uuid,
    /// Name of the step feeding this one. Empty for the root step.
    #[serde(rename = "input_step_name", default, deserialize_with = "null_as_empty")]
    pub input: String,
    /// Worker image reference.
    #[serde(default)]
    pub image: String,
    /// Runtime policy.
    #[serde(default)]
    pub runtime_config: RuntimeConfig,
    /// Opaque worker configuration.
    #[serde(default)]
    pub config: serde_json::Value,
}

// Root steps are persisted with a null input name.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl Step {
    /// Creates a step with a fresh identifier.
    #[must_use]
    pub fn new(name: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            pipeline_id: Uuid::nil(),
            input: input.into(),
            image: String::new(),
            runtime_config: RuntimeConfig::default(),
            config: serde_json::Value::Null,
        }
    }

    /// Sets the step identifier.
    #[must_use]
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// Sets the worker image.
    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// Sets the maximum attempt count.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.runtime_config.max_retries = max_retries;
        self
    }

    /// Sets the worker batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.runtime_config.batch_size = batch_size;
        self
    }

    /// Sets the worker batch timeout in seconds.
    #[must_use]
    pub fn with_batch_timeout(mut self, batch_timeout: u32) -> Self {
        self.runtime_config.batch_timeout = batch_timeout;
        self
    }

    /// Sets the opaque worker configuration.
    #[must_use]
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    /// Returns true if the step has no declared input.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.input.is_empty()
    }

    /// Channel the engine publishes requests for this step on.
    ///
    /// The format is shared with deployed workers and must not change.
    #[must_use]
    pub fn request_channel(&self) -> String {
        format!("requests_{}_{}", self.id, self.name)
    }

    /// Channel the worker of this step publishes responses on.
    #[must_use]
    pub fn response_channel(&self) -> String {
        format!("responses_{}_{}", self.id, self.name)
    }
}
