//! Core types for the SMV service
//!
//! Identities bind an ed25519 public key to a platform account. Message
//! records track every candidate signup message seen on the feed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Platform (social network) numeric message id
pub type MessageId = u64;

/// Platform (social network) numeric account id
pub type PlatformUserId = u64;

// ============ Identity Types ============

/// A verified binding between a public key and a platform account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Hex-encoded ed25519 public key (64 chars)
    pub public_key: String,
    /// Immutable platform account id
    pub platform_user_id: PlatformUserId,
    /// Current display handle
    pub handle: String,
    /// Why this identity was frozen, if it was
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked: Option<String>,
    pub created: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl Identity {
    pub fn is_blocked(&self) -> bool {
        self.blocked.is_some()
    }
}

/// Public registry view of a non-blocked identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub public_key: String,
    pub handle: String,
    pub platform_user_id: PlatformUserId,
    /// Epoch seconds
    pub created: i64,
    /// Epoch seconds
    pub last_modified: i64,
}

impl From<&Identity> for Party {
    fn from(i: &Identity) -> Self {
        Self {
            public_key: i.public_key.clone(),
            handle: i.handle.clone(),
            platform_user_id: i.platform_user_id,
            created: i.created.timestamp(),
            last_modified: i.last_modified.timestamp(),
        }
    }
}

// ============ Message Types ============

/// Processing status of a signup message
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    /// Picked up, not finished yet
    Processing,
    Passed,
    InvalidFormat,
    InvalidSignature,
    /// Valid signature, but the claim conflicts with existing identities
    Blocklisted,
    /// Legacy status from the first collector generation
    Unparseable,
}

impl MessageStatus {
    /// Terminal statuses are never processed again
    pub fn is_terminal(&self) -> bool {
        !matches!(self, MessageStatus::Processing)
    }

    pub fn description(&self) -> &'static str {
        match self {
            MessageStatus::Processing => "The message is being processed.",
            MessageStatus::Passed => "Successful sign up",
            MessageStatus::InvalidFormat => "The message does not look like a sign up message.",
            MessageStatus::InvalidSignature => {
                "Signature does not match user's handle: make sure user signed their \
                 handle not name, i.e. @handle - it starts with @. Other common mistakes \
                 are typo, wrong lower-upper case."
            }
            MessageStatus::Blocklisted => {
                "User tried to do something not allowed, e.g. transfer a key to another user"
            }
            MessageStatus::Unparseable => "The message could not be parsed.",
        }
    }
}

/// A candidate signup message and what happened to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub message_id: MessageId,
    pub status: MessageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<PlatformUserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Reply sent to the author ("" when none was sent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
    /// Blocklist reason for `BLOCKLISTED` records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub last_modified: DateTime<Utc>,
}

/// Partial update of a message record; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordUpdate {
    pub author_id: Option<PlatformUserId>,
    pub author_handle: Option<String>,
    pub text: Option<String>,
    pub reply: Option<String>,
    pub reason: Option<String>,
    pub status: Option<MessageStatus>,
}

impl RecordUpdate {
    /// Crash-recovery marker written before any parsing
    pub fn processing(author_id: PlatformUserId, author_handle: &str, text: &str) -> Self {
        Self {
            author_id: Some(author_id),
            author_handle: Some(author_handle.to_string()),
            text: Some(text.to_string()),
            status: Some(MessageStatus::Processing),
            ..Self::default()
        }
    }

    /// Final status with the reply that was sent (or "")
    pub fn finished(status: MessageStatus, reply: impl Into<String>) -> Self {
        Self {
            reply: Some(reply.into()),
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

// ============ Response Types ============

/// Standard API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            hint: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            hint: None,
        }
    }

    pub fn error_with_hint(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            hint: Some(hint.into()),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub parties_count: usize,
}

/// Aggregate processing statistics
#[derive(Debug, Serialize)]
pub struct StatisticsResponse {
    pub time: DateTime<Utc>,
    pub status_counts: BTreeMap<MessageStatus, usize>,
    pub last_message_id: Option<MessageId>,
    pub todo_count: usize,
}

/// Answer of the single-message lookup endpoint
#[derive(Debug, Serialize)]
pub struct MessageLookupResponse {
    pub message_id: MessageId,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<MessageRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_description: Option<String>,
}

/// Answer of the enqueue endpoint
#[derive(Debug, Serialize)]
pub struct TodoResponse {
    pub message_id: MessageId,
    pub queued: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&MessageStatus::InvalidSignature).unwrap(),
            "\"INVALID_SIGNATURE\""
        );
        let status: MessageStatus = serde_json::from_str("\"UNPARSEABLE\"").unwrap();
        assert_eq!(status, MessageStatus::Unparseable);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!MessageStatus::Processing.is_terminal());
        assert!(MessageStatus::Passed.is_terminal());
        assert!(MessageStatus::Blocklisted.is_terminal());
    }

    #[test]
    fn test_party_uses_epoch_seconds() {
        let created = Utc.with_ymd_and_hms(2021, 9, 13, 10, 34, 20).unwrap();
        let identity = Identity {
            public_key: "ab".repeat(32),
            platform_user_id: 18237215432962,
            handle: "my_handle".into(),
            blocked: None,
            created,
            last_modified: created + chrono::Duration::seconds(11),
        };
        let party = Party::from(&identity);
        assert_eq!(party.created, 1631529260);
        assert_eq!(party.last_modified, 1631529271);
    }

    #[test]
    fn test_status_counts_serialize_as_object() {
        let mut counts = BTreeMap::new();
        counts.insert(MessageStatus::Passed, 3usize);
        let json = serde_json::to_value(&counts).unwrap();
        assert_eq!(json["PASSED"], 3);
    }
}
