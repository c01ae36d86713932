use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Media category attached to a message. Unknown tags are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MediaType {
    Photo,
    Video,
    Audio,
    Voice,
    Document,
    Sticker,
    Animation,
    Other(String),
}

impl MediaType {
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "photo" | "image" => Self::Photo,
            "video" => Self::Video,
            "audio" => Self::Audio,
            "voice" => Self::Voice,
            "document" | "file" => Self::Document,
            "sticker" => Self::Sticker,
            "animation" | "gif" => Self::Animation,
            _ => Self::Other(tag.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Voice => "voice",
            Self::Document => "document",
            Self::Sticker => "sticker",
            Self::Animation => "animation",
            Self::Other(tag) => tag,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MediaType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Identity of a message inside the feed. Message ids are only unique per chat.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageKey {
    pub chat_id: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MessageError {
    #[error("message is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("message timestamp is not a valid instant: {0}")]
    InvalidTimestamp(String),

    #[error("message is not a JSON object: {0}")]
    Decode(String),
}

/// Message as delivered by the backend, before validation.
///
/// Every field is optional so that one bad row never fails a whole page.
/// Ids may arrive as numbers or strings; both snake_case and camelCase keys
/// are accepted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMessage {
    #[serde(default, alias = "message_id", alias = "messageId")]
    pub id: Option<Value>,
    #[serde(default, alias = "chatId")]
    pub chat_id: Option<Value>,
    #[serde(default, alias = "chatName")]
    pub chat_name: Option<String>,
    #[serde(default, alias = "chatUsername")]
    pub chat_username: Option<String>,
    #[serde(default, alias = "senderId")]
    pub sender_id: Option<Value>,
    #[serde(default, alias = "senderName")]
    pub sender_name: Option<String>,
    #[serde(default, alias = "senderUsername")]
    pub sender_username: Option<String>,
    #[serde(default, alias = "text")]
    pub content: Option<String>,
    #[serde(default, alias = "mediaType")]
    pub media_type: Option<String>,
    #[serde(default, alias = "date", alias = "message_date")]
    pub timestamp: Option<Value>,
    #[serde(default, alias = "accountId", alias = "session_id", alias = "sessionId")]
    pub account_id: Option<Value>,
}

/// A validated chat message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub chat_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaType>,
    pub timestamp: DateTime<Utc>,
    /// Account the message was observed through, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

impl Message {
    /// Validate a raw message.
    ///
    /// `source_account` is the account the transport delivered it on; it only
    /// fills in `account_id` when the payload does not carry one itself.
    pub fn from_raw(raw: RawMessage, source_account: Option<&str>) -> Result<Self, MessageError> {
        let id = raw
            .id
            .as_ref()
            .and_then(value_to_id)
            .ok_or(MessageError::MissingField("id"))?;
        let chat_id = raw
            .chat_id
            .as_ref()
            .and_then(value_to_id)
            .ok_or(MessageError::MissingField("chat_id"))?;
        let timestamp = match raw.timestamp {
            Some(value) => parse_timestamp(&value)?,
            None => return Err(MessageError::MissingField("timestamp")),
        };

        let account_id = raw
            .account_id
            .as_ref()
            .and_then(value_to_id)
            .or_else(|| source_account.map(str::to_string));

        Ok(Message {
            chat_name: raw
                .chat_name
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| chat_id.clone()),
            id,
            chat_id,
            chat_username: raw.chat_username,
            sender_id: raw.sender_id.as_ref().and_then(value_to_id),
            sender_name: raw.sender_name,
            sender_username: raw.sender_username,
            content: raw.content,
            media_type: raw
                .media_type
                .filter(|tag| !tag.is_empty())
                .map(|tag| MediaType::from_tag(&tag)),
            timestamp,
            account_id,
        })
    }

    /// Decode and validate a message from an arbitrary JSON value.
    pub fn from_value(value: Value, source_account: Option<&str>) -> Result<Self, MessageError> {
        let raw: RawMessage =
            serde_json::from_value(value).map_err(|e| MessageError::Decode(e.to_string()))?;
        Self::from_raw(raw, source_account)
    }

    pub fn key(&self) -> MessageKey {
        MessageKey {
            chat_id: self.chat_id.clone(),
            id: self.id.clone(),
        }
    }

    /// Display name of the sender, falling back to the username or id
    pub fn sender_label(&self) -> &str {
        self.sender_name
            .as_deref()
            .or(self.sender_username.as_deref())
            .or(self.sender_id.as_deref())
            .unwrap_or("service")
    }
}

fn value_to_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Accepts RFC 3339 strings, naive `YYYY-MM-DDTHH:MM:SS` strings (read as UTC),
/// and unix seconds (integer or fractional).
fn parse_timestamp(value: &Value) -> Result<DateTime<Utc>, MessageError> {
    match value {
        Value::String(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Ok(dt.with_timezone(&Utc));
            }
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
                .map(|naive| naive.and_utc())
                .map_err(|_| MessageError::InvalidTimestamp(s.clone()))
        }
        Value::Number(n) => {
            let millis = if let Some(secs) = n.as_i64() {
                secs.checked_mul(1000)
            } else {
                n.as_f64().map(|secs| (secs * 1000.0).round() as i64)
            };
            millis
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                .ok_or_else(|| MessageError::InvalidTimestamp(n.to_string()))
        }
        other => Err(MessageError::InvalidTimestamp(other.to_string())),
    }
}
