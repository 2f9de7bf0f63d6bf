//! Stripe event envelope and the typed payloads we act on.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

use super::signature::VerifiedPayload;

/// Verified bytes that do not match the expected event schema.
///
/// The signature was valid, so this points at provider contract drift rather
/// than tampering.
#[derive(Debug, Error)]
#[error("malformed {what}: {source}")]
pub struct DecodeError {
    what: &'static str,
    #[source]
    source: serde_json::Error,
}

impl DecodeError {
    fn new(what: &'static str, source: serde_json::Error) -> Self {
        Self { what, source }
    }

    /// Which structure failed to decode.
    pub fn what(&self) -> &'static str {
        self.what
    }
}

/// Event types with a dedicated handler.
///
/// Every other tag maps to [`EventType::Unrecognized`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    PaymentIntentSucceeded,
    Unrecognized,
}

impl EventType {
    /// Classify a raw tag. Total over all strings.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "payment_intent.succeeded" => Self::PaymentIntentSucceeded,
            _ => Self::Unrecognized,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PaymentIntentSucceeded => "payment_intent.succeeded",
            Self::Unrecognized => "unrecognized",
        }
    }
}

/// Generic event envelope.
///
/// `raw_data` is left untyped until a handler asks for it.
#[derive(Debug, Clone, Deserialize)]
pub struct EventEnvelope {
    /// Provider event id, when present (`evt_...`)
    #[serde(default)]
    pub id: Option<String>,

    /// Event type tag, e.g. `payment_intent.succeeded`
    #[serde(rename = "type")]
    pub event_type: String,

    /// The event object: `data.object` when wrapped, otherwise `data`
    #[serde(default, rename = "data", deserialize_with = "unwrap_data_object")]
    pub raw_data: Value,
}

impl EventEnvelope {
    pub fn kind(&self) -> EventType {
        EventType::from_tag(&self.event_type)
    }

    /// Decode `raw_data` into a typed payload.
    pub fn data_as<T>(&self, what: &'static str) -> Result<T, DecodeError>
    where
        T: for<'de> Deserialize<'de>,
    {
        T::deserialize(&self.raw_data).map_err(|e| DecodeError::new(what, e))
    }
}

fn unwrap_data_object<'de, D>(deserializer: D) -> Result<Value, D::Error>
where
    D: Deserializer<'de>,
{
    let data = Value::deserialize(deserializer)?;

    Ok(match data {
        Value::Object(mut map) if map.contains_key("object") => {
            map.remove("object").unwrap_or(Value::Null)
        }
        other => other,
    })
}

/// Decode a verified payload into an event envelope.
pub fn decode(payload: &VerifiedPayload) -> Result<EventEnvelope, DecodeError> {
    serde_json::from_slice(payload.as_bytes()).map_err(|e| DecodeError::new("event envelope", e))
}

/// The parts of a PaymentIntent this service reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentIntent {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub amount: Option<i64>,

    #[serde(default)]
    pub currency: Option<String>,

    /// Where the receipt goes; Stripe sends `null` when unset
    #[serde(default)]
    pub receipt_email: Option<String>,
}

impl PaymentIntent {
    /// The notification target, if one is usable.
    pub fn notification_target(&self) -> Option<&str> {
        self.receipt_email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
    }
}
