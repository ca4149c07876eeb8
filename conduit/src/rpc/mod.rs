//! Request/response records exchanged with workers.
//!
//! Field names are PascalCase on the wire because deployed workers already
//! read and write them that way.

use crate::errors::CodecError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unit of work sent to a worker on its request channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProcessRequest {
    /// Where the worker reads its input. Empty for requests entering the root.
    #[serde(default)]
    pub resource_uri: String,
    /// Where the worker writes its output.
    pub result_uri: String,
    /// Asks the worker to flush and stop. Never set by the engine.
    #[serde(default)]
    pub termination: bool,
    /// Correlates this request with its response.
    pub correlation_id: Uuid,
}

impl ProcessRequest {
    /// Creates a request.
    #[must_use]
    pub fn new(resource_uri: impl Into<String>, result_uri: impl Into<String>, correlation_id: Uuid) -> Self {
        Self {
            resource_uri: resource_uri.into(),
            result_uri: result_uri.into(),
            termination: false,
            correlation_id,
        }
    }

    /// Encodes the request as a message body.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes a request from a message body.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not a valid request.
    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        Ok(serde_json::from_slice(payload)?)
    }
}

/// Status reported by a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessStatus {
    /// The worker produced a result.
    #[serde(rename = "OK")]
    Ok,
    /// The worker failed to process the request.
    #[serde(rename = "ERROR")]
    Error,
    /// The worker has no more output for this lineage.
    #[serde(rename = "ALLDONE")]
    AllDone,
}

/// A worker's answer, as it appears on the response channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProcessResponse {
    /// Correlation id of the request being answered.
    pub correlation_id: Uuid,
    /// Outcome.
    pub status: ProcessStatus,
    /// Output location, set on success.
    #[serde(default)]
    pub result_uri: String,
    /// Failure description, set on error.
    #[serde(default)]
    pub error: String,
}

impl ProcessResponse {
    /// A successful response.
    #[must_use]
    pub fn ok(correlation_id: Uuid, result_uri: impl Into<String>) -> Self {
        Self {
            correlation_id,
            status: ProcessStatus::Ok,
            result_uri: result_uri.into(),
            error: String::new(),
        }
    }

    /// A failed response.
    #[must_use]
    pub fn error(correlation_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            correlation_id,
            status: ProcessStatus::Error,
            result_uri: String::new(),
            error: error.into(),
        }
    }

    /// An exhaustion signal.
    #[must_use]
    pub fn all_done(correlation_id: Uuid) -> Self {
        Self {
            correlation_id,
            status: ProcessStatus::AllDone,
            result_uri: String::new(),
            error: String::new(),
        }
    }

    /// Encodes the response as a message body.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes a response from a message body.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not a valid response, including an
    /// unknown status.
    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Converts the flat record into a tagged event.
    #[must_use]
    pub fn into_event(self) -> ResponseEvent {
        let outcome = match self.status {
            ProcessStatus::Ok => ResponseOutcome::Succeeded {
                result_uri: self.result_uri,
            },
            ProcessStatus::Error => ResponseOutcome::Failed { error: self.error },
            ProcessStatus::AllDone => ResponseOutcome::AllDone,
        };
        ResponseEvent {
            correlation_id: self.correlation_id,
            outcome,
        }
    }
}

/// What a response means for the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// The attempt produced output at `result_uri`.
    Succeeded {
        /// Output location.
        result_uri: String,
    },
    /// The attempt failed.
    Failed {
        /// Worker error text.
        error: String,
    },
    /// The producing worker has exhausted its input.
    AllDone,
}

impl ResponseOutcome {
    /// Short label used in logs and events.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Succeeded { .. } => "succeeded",
            Self::Failed { .. } => "failed",
            Self::AllDone => "all_done",
        }
    }
}

/// A decoded response event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseEvent {
    /// Correlation id of the answered attempt.
    pub correlation_id: Uuid,
    /// Tagged outcome.
    pub outcome: ResponseOutcome,
}

impl ResponseEvent {
    /// Decodes a message body straight into an event.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not a valid response.
    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        ProcessResponse::decode(payload).map(ProcessResponse::into_event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_request_wire_field_names() {
        let cid = Uuid::new_v4();
        let request = ProcessRequest::new("s3://in/a", "s3://out/b.cbor.tar.gz", cid);
        let value: serde_json::Value = serde_json::from_slice(&request.encode().unwrap()).unwrap();

        assert_eq!(
            value,
            json!({
                "ResourceUri": "s3://in/a",
                "ResultUri": "s3://out/b.cbor.tar.gz",
                "Termination": false,
                "CorrelationId": cid.to_string(),
            })
        );
    }

    #[test]
    fn test_request_decode_without_resource() {
        let cid = Uuid::new_v4();
        let body = json!({"ResultUri": "s3://out/x", "CorrelationId": cid}).to_string();
        let request = ProcessRequest::decode(body.as_bytes()).unwrap();

        assert_eq!(request.resource_uri, "");
        assert!(!request.termination);
        assert_eq!(request.correlation_id, cid);
    }

    #[test]
    fn test_response_decode_ok() {
        let cid = Uuid::new_v4();
        let body = json!({
            "CorrelationId": cid,
            "Status": "OK",
            "ResultUri": "s3://out/r",
            "Error": "",
            "Extra": 1
        })
        .to_string();

        let event = ResponseEvent::decode(body.as_bytes()).unwrap();
        assert_eq!(event.correlation_id, cid);
        assert_eq!(
            event.outcome,
            ResponseOutcome::Succeeded {
                result_uri: "s3://out/r".to_string()
            }
        );
    }

    #[test]
    fn test_response_decode_error_and_all_done() {
        let cid = Uuid::new_v4();
        let failed = json!({"CorrelationId": cid, "Status": "ERROR", "Error": "bad row"}).to_string();
        let done = json!({"CorrelationId": cid, "Status": "ALLDONE"}).to_string();

        assert_eq!(
            ResponseEvent::decode(failed.as_bytes()).unwrap().outcome,
            ResponseOutcome::Failed {
                error: "bad row".to_string()
            }
        );
        assert_eq!(
            ResponseEvent::decode(done.as_bytes()).unwrap().outcome,
            ResponseOutcome::AllDone
        );
    }

    #[test]
    fn test_unknown_status_rejected() {
        let body = json!({"CorrelationId": Uuid::new_v4(), "Status": "MAYBE"}).to_string();
        assert!(ProcessResponse::decode(body.as_bytes()).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(ResponseEvent::decode(b"not json").is_err());
        assert!(ResponseEvent::decode(br#"{"Status":"OK"}"#).is_err());
    }

    #[test]
    fn test_constructors_encode_status() {
        let cid = Uuid::new_v4();
        let body = ProcessResponse::all_done(cid).encode().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(value["Status"], "ALLDONE");
        assert_eq!(ProcessResponse::ok(cid, "u").into_event().outcome.label(), "succeeded");
        assert_eq!(ProcessResponse::error(cid, "e").into_event().outcome.label(), "failed");
    }
}
