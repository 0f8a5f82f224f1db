//! Wire-level value types: inbound event envelopes and the outbound
//! topic subscription request.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::{DomainError, ErrorCode, WILDCARD};

/// An inbound change notification.
///
/// Only `type` is required; `data` is opaque to the bridge and defaults
/// to `null` when the producer omits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(default)]
    pub data: JsonValue,
}

impl EventEnvelope {
    /// Creates an envelope.
    pub fn new(event_type: impl Into<String>, data: JsonValue) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }

    /// Decodes one text frame into an envelope.
    ///
    /// # Errors
    ///
    /// `ErrorCode::MalformedEnvelope` when the frame is not a JSON object
    /// with a non-empty string `type`.
    pub fn from_frame(frame: &str) -> Result<Self, DomainError> {
        let envelope: EventEnvelope = serde_json::from_str(frame).map_err(|e| {
            DomainError::new(ErrorCode::MalformedEnvelope, format!("Undecodable envelope: {}", e))
        })?;

        if envelope.event_type.is_empty() {
            return Err(DomainError::new(
                ErrorCode::MalformedEnvelope,
                "Envelope type cannot be empty",
            ));
        }

        Ok(envelope)
    }

    /// The envelope as a JSON object, the shape wildcard consumers see on the wire.
    pub fn to_json(&self) -> JsonValue {
        serde_json::json!({
            "type": self.event_type,
            "data": self.data,
        })
    }
}

/// Outbound topic subscription request, sent once per successful connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    pub events: Vec<String>,
}

impl SubscriptionRequest {
    /// Request for every topic.
    pub fn all_topics() -> Self {
        Self {
            events: vec![WILDCARD.to_string()],
        }
    }

    /// Encodes the request as a text frame.
    pub fn to_frame(&self) -> Result<String, DomainError> {
        serde_json::to_string(self)
            .map_err(|e| DomainError::new(ErrorCode::InternalError, e.to_string()))
    }
}
