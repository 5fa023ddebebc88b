use crate::models::{ScheduledMessage, WorkspaceConnection};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, query, query_as};
use uuid::Uuid;

const MESSAGE_COLUMNS: &str = "id, author_id, scheduled_by, workspace_id, channel_id, \
     channel_name, body, scheduled_for, status, sent_at, error, remote_message_id";

const CONNECTION_COLUMNS: &str =
    "id, owner_id, server_url, encrypted_credential, auth_token, remote_user_id, is_active";

/// Claims a batch of due messages for this run.
///
/// The claim is a single atomic update PENDING -> SENDING over rows selected
/// with SKIP LOCKED, so overlapping runs never pick up the same row twice.
/// Claimed rows are returned for dispatch.
pub async fn claim_due_messages(
    db_pool: &PgPool,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<ScheduledMessage>, sqlx::Error> {
    let messages = query_as::<_, ScheduledMessage>(&format!(
        r#"
        UPDATE scheduled_messages
        SET status = 'SENDING', updated_at = NOW()
        WHERE id IN (
            SELECT id
            FROM scheduled_messages
            WHERE status = 'PENDING'
                AND scheduled_for <= $1
            ORDER BY scheduled_for
            LIMIT $2
            FOR UPDATE SKIP LOCKED
        )
        RETURNING {MESSAGE_COLUMNS}
        "#
    ))
    .bind(now)
    .bind(limit)
    .fetch_all(db_pool)
    .await?;

    Ok(messages)
}

/// Marks a claimed message as delivered, recording the remote message id
/// (when the gateway returned one) for later edit/lookup.
pub async fn mark_sent(
    db_pool: &PgPool,
    message_id: Uuid,
    remote_message_id: Option<&str>,
) -> Result<(), sqlx::Error> {
    query(
        r#"
        UPDATE scheduled_messages
        SET status = 'SENT', sent_at = NOW(), error = NULL,
            remote_message_id = $2, updated_at = NOW()
        WHERE id = $1 AND status = 'SENDING'
        "#,
    )
    .bind(message_id)
    .bind(remote_message_id)
    .execute(db_pool)
    .await?;

    Ok(())
}

/// Marks a claimed message as failed with the reason. Terminal: nothing in
/// this service moves a row back to PENDING.
pub async fn mark_failed(
    db_pool: &PgPool,
    message_id: Uuid,
    error: &str,
) -> Result<(), sqlx::Error> {
    query(
        r#"
        UPDATE scheduled_messages
        SET status = 'FAILED', error = $2, updated_at = NOW()
        WHERE id = $1 AND status = 'SENDING'
        "#,
    )
    .bind(message_id)
    .bind(error)
    .execute(db_pool)
    .await?;

    Ok(())
}

/// Fetches the workspace connection a message was scheduled against.
pub async fn connection_by_id(
    db_pool: &PgPool,
    connection_id: Uuid,
) -> Result<Option<WorkspaceConnection>, sqlx::Error> {
    query_as::<_, WorkspaceConnection>(&format!(
        "SELECT {CONNECTION_COLUMNS} FROM workspace_connections WHERE id = $1"
    ))
    .bind(connection_id)
    .fetch_optional(db_pool)
    .await
}

/// Finds `owner_id`'s own usable connection to `server_url`.
///
/// The URL match is a case-sensitive exact string comparison; rows without a
/// token and remote user id are not usable and are excluded here.
pub async fn active_connection_for(
    db_pool: &PgPool,
    owner_id: Uuid,
    server_url: &str,
) -> Result<Option<WorkspaceConnection>, sqlx::Error> {
    query_as::<_, WorkspaceConnection>(&format!(
        r#"
        SELECT {CONNECTION_COLUMNS}
        FROM workspace_connections
        WHERE owner_id = $1
            AND server_url = $2
            AND is_active = TRUE
            AND auth_token IS NOT NULL
            AND remote_user_id IS NOT NULL
        LIMIT 1
        "#
    ))
    .bind(owner_id)
    .bind(server_url)
    .fetch_optional(db_pool)
    .await
}

/// Deactivates a connection after an auth failure so other pending messages
/// sharing the same stale token fail fast instead of hammering the server.
pub async fn deactivate_connection(
    db_pool: &PgPool,
    connection_id: Uuid,
) -> Result<(), sqlx::Error> {
    query(
        r#"
        UPDATE workspace_connections
        SET is_active = FALSE, auth_token = NULL, remote_user_id = NULL,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(connection_id)
    .execute(db_pool)
    .await?;

    Ok(())
}
