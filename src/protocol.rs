//! Wire format of the weather stream.
//!
//! Every frame is a JSON object tagged by its `type` field. Inbound frames
//! are decoded into [`InboundMessage`]; unrecognized types are kept as
//! [`InboundMessage::Unknown`] instead of failing, so a newer server can add
//! message types without breaking older clients.

use crate::error::Error;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tokio_tungstenite::tungstenite::Message;

/// `welcome` payload, sent by the server right after the handshake
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Welcome {
    /// Cities the server can stream, keyed by name (values are not used)
    #[serde(default)]
    pub available_cities: Map<String, Value>,
    /// Greeting text
    #[serde(default)]
    pub message: Option<String>,
    /// Server clock at connect time
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub server_time: Option<DateTime<Utc>>,
}

impl Welcome {
    /// City names in the order the server listed them
    pub fn city_names(&self) -> Vec<String> {
        self.available_cities.keys().cloned().collect()
    }
}

/// Current conditions for one city
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherUpdate {
    pub city: String,
    /// Degrees Celsius
    pub temperature: f64,
    pub description: String,
    /// Relative humidity in percent
    pub humidity: f64,
    pub wind_speed: f64,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Server's answer to a subscribe or unsubscribe request
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubscriptionConfirmed {
    pub city: String,
    pub subscribed: bool,
}

/// Periodic server statistics frame
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Heartbeat {
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_clients: u64,
    #[serde(default)]
    pub cities_monitored: u64,
}

/// A decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Welcome(Welcome),
    WeatherUpdate(WeatherUpdate),
    SubscriptionConfirmed(SubscriptionConfirmed),
    Heartbeat(Heartbeat),
    Pong,
    /// Frame with a `type` this client does not handle (or none at all)
    Unknown { kind: Option<String>, raw: Value },
}

impl InboundMessage {
    /// Decode a text frame.
    ///
    /// Fails with [`Error::MalformedFrame`] when the text is not a JSON object
    /// or a known message type is missing required fields.
    pub fn decode(text: &str) -> Result<Self, Error> {
        let value: Value = serde_json::from_str(text)?;
        if !value.is_object() {
            return Err(Error::MalformedFrame(format!(
                "expected a JSON object, got {}",
                json_type_name(&value)
            )));
        }

        let kind = value.get("type").and_then(Value::as_str).map(str::to_owned);
        let message = match kind.as_deref() {
            Some("welcome") => InboundMessage::Welcome(serde_json::from_value(value)?),
            Some("weatherUpdate") => InboundMessage::WeatherUpdate(serde_json::from_value(value)?),
            Some("subscriptionConfirmed") => {
                InboundMessage::SubscriptionConfirmed(serde_json::from_value(value)?)
            }
            Some("heartbeat") => InboundMessage::Heartbeat(serde_json::from_value(value)?),
            Some("pong") => InboundMessage::Pong,
            _ => InboundMessage::Unknown { kind: kind.clone(), raw: value },
        };
        Ok(message)
    }

    /// The `type` tag, for logging
    pub fn kind(&self) -> &str {
        match self {
            InboundMessage::Welcome(_) => "welcome",
            InboundMessage::WeatherUpdate(_) => "weatherUpdate",
            InboundMessage::SubscriptionConfirmed(_) => "subscriptionConfirmed",
            InboundMessage::Heartbeat(_) => "heartbeat",
            InboundMessage::Pong => "pong",
            InboundMessage::Unknown { kind, .. } => kind.as_deref().unwrap_or("<none>"),
        }
    }
}

/// Frames the client sends
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutboundMessage {
    Subscribe { city: String },
    Unsubscribe { city: String },
    Ping,
}

impl OutboundMessage {
    pub fn subscribe(city: impl Into<String>) -> Self {
        OutboundMessage::Subscribe { city: city.into() }
    }

    pub fn unsubscribe(city: impl Into<String>) -> Self {
        OutboundMessage::Unsubscribe { city: city.into() }
    }

    /// Serialize into a WebSocket text frame
    pub fn to_message(&self) -> Result<Message, Error> {
        let text = serde_json::to_string(self)
            .map_err(|e| Error::MalformedFrame(format!("failed to encode {:?}: {}", self, e)))?;
        Ok(Message::Text(text))
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Server timestamps arrive either as ISO 8601 text or as epoch milliseconds.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Millis(i64),
    Text(String),
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawTimestamp>::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(RawTimestamp::Millis(ms)) => Utc
            .timestamp_millis_opt(ms)
            .single()
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {}", ms))),
        Some(RawTimestamp::Text(text)) => parse_timestamp(&text)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", text))),
    }
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    // No offset: read as UTC
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}
