use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Delivery status of a scheduled message. Stored as TEXT.
///
/// SENDING is a transient claim marker: a row is moved PENDING -> SENDING
/// atomically when a dispatch run picks it up, so overlapping runs cannot
/// both deliver the same row. Every other transition is one-directional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "UPPERCASE")]
pub enum MessageStatus {
    Pending,
    Sending,
    Sent,
    Failed,
    Cancelled,
}

#[allow(dead_code)]
#[derive(Debug, Clone, FromRow)]
pub struct ScheduledMessage {
    pub id: Uuid,
    /// The identity the message should appear to come from.
    pub author_id: Uuid,
    /// Admin who scheduled on behalf of the author, if any.
    pub scheduled_by: Option<Uuid>,
    pub workspace_id: Uuid,
    pub channel_id: String,
    pub channel_name: Option<String>,
    pub body: String,
    pub scheduled_for: DateTime<Utc>,
    pub status: MessageStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// Remote message id returned by the gateway, set once SENT.
    pub remote_message_id: Option<String>,
}

/// A stored credential letting one user act against one remote chat server.
#[allow(dead_code)]
#[derive(Debug, Clone, FromRow)]
pub struct WorkspaceConnection {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub server_url: String,
    pub encrypted_credential: String,
    /// Short-lived auth token. Null once the connection is deactivated.
    pub auth_token: Option<String>,
    pub remote_user_id: Option<String>,
    pub is_active: bool,
}
