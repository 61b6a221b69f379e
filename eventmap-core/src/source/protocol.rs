//! Defines the JSON protocol used between eventmap and external provider
//! binaries (`eventmap-provider-<name>`) over stdin/stdout.
//!
//! eventmap writes one [`Request`] line to the provider's stdin and reads a
//! single [`Response`] from its stdout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use super::SourceFetch;

pub trait ProviderCommand: Serialize {
    type Response: DeserializeOwned;
    fn command() -> Command;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    ListEvents,
}

/// Request sent from eventmap to provider.
#[derive(Debug, Serialize, Deserialize)]
pub struct Request {
    pub command: Command,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Response sent from provider to eventmap.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response<T> {
    Success { data: T },
    Error { error: String },
}

impl<T: Serialize> Response<T> {
    /// Serialized success line, for provider implementations.
    pub fn success(data: T) -> serde_json::Result<String> {
        serde_json::to_string(&Response::Success { data })
    }
}

impl Response<()> {
    /// Serialized error line, for provider implementations.
    pub fn error(msg: &str) -> serde_json::Result<String> {
        serde_json::to_string(&Response::<()>::Error {
            error: msg.to_string(),
        })
    }
}

/// List events for one source id within an optional window.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListEvents {
    /// The source id with the provider prefix removed
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_min: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_max: Option<DateTime<Utc>>,
}

impl ProviderCommand for ListEvents {
    type Response = SourceFetch;
    fn command() -> Command {
        Command::ListEvents
    }
}
