//! Chat log entries and file-share acknowledgements.
//!
//! Entries are immutable once the server appends them; the whole log is
//! replayed verbatim to every new joiner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One entry in a room's chat log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum ChatEntry {
    Text {
        username: String,
        text: String,
        #[serde(with = "timestamp_millis")]
        timestamp: DateTime<Utc>,
    },
    File {
        id: Uuid,
        username: String,
        file_name: String,
        file_type: String,
        /// Base64 data URL as uploaded.
        file_data: String,
        #[serde(with = "timestamp_millis")]
        timestamp: DateTime<Utc>,
    },
}

impl ChatEntry {
    #[must_use]
    pub fn username(&self) -> &str {
        match self {
            ChatEntry::Text { username, .. } | ChatEntry::File { username, .. } => username,
        }
    }

    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ChatEntry::Text { timestamp, .. } | ChatEntry::File { timestamp, .. } => *timestamp,
        }
    }
}

/// Outcome reported to an uploader in `file-share-ack`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileShareAck {
    pub status: AckStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FileShareAck {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            status: AckStatus::Ok,
            message: None,
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: AckStatus::Error,
            message: Some(message.into()),
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == AckStatus::Ok
    }
}

/// RFC 3339 UTC with millisecond precision, e.g. `2024-05-01T10:00:00.000Z`.
mod timestamp_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_text_entry_wire_shape() {
        let entry = ChatEntry::Text {
            username: "alice".to_string(),
            text: "hi".to_string(),
            timestamp: fixed_time(),
        };
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!({
                "type": "text",
                "username": "alice",
                "text": "hi",
                "timestamp": "2024-05-01T10:00:00.000Z"
            })
        );
    }

    #[test]
    fn test_file_entry_wire_shape() {
        let id = Uuid::new_v4();
        let entry = ChatEntry::File {
            id,
            username: "bob".to_string(),
            file_name: "notes.txt".to_string(),
            file_type: "text/plain".to_string(),
            file_data: "data:text/plain;base64,aGk=".to_string(),
            timestamp: fixed_time(),
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["type"], "file");
        assert_eq!(value["id"], id.to_string());
        assert_eq!(value["fileName"], "notes.txt");
        assert_eq!(value["fileType"], "text/plain");
        assert_eq!(value["fileData"], "data:text/plain;base64,aGk=");

        let parsed: ChatEntry = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, entry);
        assert_eq!(parsed.username(), "bob");
    }

    #[test]
    fn test_ack_omits_message_when_ok() {
        assert_eq!(serde_json::to_value(FileShareAck::ok()).unwrap(), json!({"status": "ok"}));
        assert_eq!(
            serde_json::to_value(FileShareAck::error("too big")).unwrap(),
            json!({"status": "error", "message": "too big"})
        );
    }

    #[test]
    fn test_timestamp_accepts_offsets() {
        let entry: ChatEntry = serde_json::from_value(json!({
            "type": "text",
            "username": "a",
            "text": "b",
            "timestamp": "2024-05-01T12:00:00.000+02:00"
        }))
        .unwrap();
        assert_eq!(entry.timestamp(), fixed_time());
    }
}
