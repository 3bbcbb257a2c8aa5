/**
 * Cached Chat Message
 * 
 * This module defines the `CachedMessage` struct, the unit of data held in a
 * room's recent-message list and in the write-behind queue, together with the
 * `PresenceEntry` record used for online-user tracking.
 * 
 * Both types serialize with camelCase field names so that the JSON written to
 * the fast-path store matches what socket handlers and the persistence worker
 * expect.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::SharedError;

/// A single chat message as held by the chat cache.
///
/// # Fields
/// * `id` - Stable message identifier (also the primary-store key)
/// * `room_id` - Room the message belongs to
/// * `sender_id` - User who sent the message
/// * `body` - Message text; the only field `update_message` changes
/// * `created_at` - Creation time (UTC)
///
/// # Example
/// ```rust
/// use studysync::shared::CachedMessage;
///
/// let message = CachedMessage::new("room-1", "user-1", "Hello!");
/// assert_eq!(message.room_id, "room-1");
/// assert_eq!(message.body, "Hello!");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CachedMessage {
    /// Message identifier
    pub id: String,
    /// Room identifier
    pub room_id: String,
    /// Sender identifier
    pub sender_id: String,
    /// Message text content
    pub body: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl CachedMessage {
    /// Create a new message with a generated id and the current timestamp.
    pub fn new(
        room_id: impl Into<String>,
        sender_id: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), room_id, sender_id, body)
    }

    /// Create a message with a caller-supplied id.
    ///
    /// Used when the id is assigned by the primary store or the client.
    pub fn with_id(
        id: impl Into<String>,
        room_id: impl Into<String>,
        sender_id: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            room_id: room_id.into(),
            sender_id: sender_id.into(),
            body: body.into(),
            created_at: Utc::now(),
        }
    }

    /// Validate the message before it is persisted.
    ///
    /// Ids must be non-empty; an empty body is allowed (attachments-only
    /// messages carry no text).
    pub fn validate(&self) -> Result<(), SharedError> {
        if self.id.trim().is_empty() {
            return Err(SharedError::validation("id", "Message id cannot be empty"));
        }
        if self.room_id.trim().is_empty() {
            return Err(SharedError::validation("roomId", "Room id cannot be empty"));
        }
        if self.sender_id.trim().is_empty() {
            return Err(SharedError::validation("senderId", "Sender id cannot be empty"));
        }
        Ok(())
    }

    /// Serialize to the JSON form stored in the fast-path list.
    pub fn to_json(&self) -> Result<String, SharedError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse the JSON form stored in the fast-path list.
    pub fn from_json(raw: &str) -> Result<Self, SharedError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Presence record for one online user.
///
/// A new join for the same user overwrites the previous entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    /// User identifier
    pub user_id: String,
    /// Socket the user joined from
    pub socket_id: String,
    /// When the user joined
    pub joined_at: DateTime<Utc>,
    /// Last activity time
    pub last_seen: DateTime<Utc>,
}

impl PresenceEntry {
    /// Create a fresh entry with `joined_at` and `last_seen` set to now.
    pub fn new(user_id: impl Into<String>, socket_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            socket_id: socket_id.into(),
            joined_at: now,
            last_seen: now,
        }
    }
}
