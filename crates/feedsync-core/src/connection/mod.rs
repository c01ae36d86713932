//! Live push channel: one stream per account scope.

pub mod manager;
pub mod policy;
pub mod ws;

use std::fmt;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::feed::Generation;
use crate::models::AccountScope;

pub use manager::ConnectionManager;
pub use policy::{ExponentialBackoff, ManualReconnect, ReconnectPolicy};
pub use ws::WsConnector;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("closed by server: {}", .0.as_deref().unwrap_or("no reason given"))]
    Closed(Option<String>),

    #[error("invalid push frame: {0}")]
    InvalidFrame(String),
}

/// One inbound push message and the account it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct PushFrame {
    pub payload: Value,
    pub account_id: Option<String>,
}

impl PushFrame {
    /// Frames are either `{"type": "message", "session_id": .., "message": {..}}`
    /// or a flat message object that carries its own account id. Frames of
    /// any other `type` are rejected.
    pub fn from_text(text: &str) -> Result<Self, ConnectionError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ConnectionError::InvalidFrame(e.to_string()))?;
        let Value::Object(mut map) = value else {
            return Err(ConnectionError::InvalidFrame("frame is not an object".to_string()));
        };
        match map.get("type") {
            None => {}
            Some(Value::String(kind)) if kind == "message" => {
                map.remove("type");
            }
            Some(other) => {
                return Err(ConnectionError::InvalidFrame(format!(
                    "unsupported frame type {}",
                    other
                )))
            }
        }

        let account_id = ["account_id", "accountId", "session_id"]
            .iter()
            .find_map(|key| match map.get(*key) {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            });

        let payload = match map.remove("message") {
            Some(message @ Value::Object(_)) => message,
            Some(other) => {
                map.insert("message".to_string(), other);
                Value::Object(map)
            }
            None => Value::Object(map),
        };
        Ok(Self {
            payload,
            account_id,
        })
    }
}

/// What the connection manager reports, tagged with the scope generation
/// the stream was opened for.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Opened,
    Closed { reason: Option<String> },
    Message(PushFrame),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaggedEvent {
    pub generation: Generation,
    pub event: ConnectionEvent,
}

pub type PushStream = BoxStream<'static, Result<PushFrame, ConnectionError>>;

/// Opens the transport for one account scope. The returned stream ends (or
/// yields an error) when the connection drops.
pub trait PushConnector: Send + Sync + 'static {
    fn connect(
        &self,
        account: &AccountScope,
    ) -> BoxFuture<'static, Result<PushStream, ConnectionError>>;
}
