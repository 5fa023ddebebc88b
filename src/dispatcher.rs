use crate::credentials;
use crate::errors::DispatchError;
use crate::gateway::ChatGateway;
use crate::models::ScheduledMessage;
use crate::store;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{Span, error, info, instrument};
use uuid::Uuid;

/// Aggregate result of one dispatch run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub sent: usize,
    pub failed: usize,
}

/// Whether a failure looks like an expired or revoked token. Matched on the
/// recorded error text so gateway and resolution failures are treated alike.
pub fn is_auth_failure(error_text: &str) -> bool {
    error_text.contains("Unauthorized") || error_text.contains("401")
}

struct DeliveryFailure {
    error: DispatchError,
    /// Connection the attempt was made with, if one was resolved. An auth
    /// failure deactivates this exact row.
    connection_id: Option<Uuid>,
}

impl DeliveryFailure {
    fn before_send(error: impl Into<DispatchError>) -> Self {
        Self {
            error: error.into(),
            connection_id: None,
        }
    }
}

/// Processes one batch of due messages.
///
/// Claims up to `batch_size` rows due at `now`, then delivers them one at a
/// time, awaiting each gateway call before the next. Per-message failures are
/// recorded on the row and never abort the batch; only a failure of the claim
/// query itself ends the run early. FAILED is terminal here: nothing in this
/// function requeues a message.
#[instrument(skip_all, fields(messages_claimed = 0))]
pub async fn dispatch_due_messages<G: ChatGateway + ?Sized>(
    db_pool: &PgPool,
    gateway: &G,
    now: DateTime<Utc>,
    batch_size: i64,
) -> Result<DispatchSummary, sqlx::Error> {
    let messages = store::claim_due_messages(db_pool, now, batch_size).await?;

    let mut summary = DispatchSummary::default();
    if messages.is_empty() {
        info!("No due messages found.");
        return Ok(summary);
    }
    Span::current().record("messages_claimed", messages.len());
    info!(messages_claimed = messages.len(), "Found due messages to send.");

    for message in &messages {
        match deliver_one(db_pool, gateway, message).await {
            Ok(remote_message_id) => {
                summary.sent += 1;
                match store::mark_sent(db_pool, message.id, remote_message_id.as_deref()).await {
                    Ok(()) => info!(message_id = %message.id, "Message delivered."),
                    Err(e) => {
                        // The send went through; the row is left SENDING
                        // rather than re-marked PENDING, so it cannot be
                        // claimed and sent a second time.
                        error!(message_id = %message.id, "Error marking message as sent: {}.", e);
                    }
                }
            }
            Err(failure) => {
                summary.failed += 1;
                let error_text = failure.error.to_string();
                error!(message_id = %message.id, "Delivery failed: {}", error_text);

                if let Err(e) = store::mark_failed(db_pool, message.id, &error_text).await {
                    error!(message_id = %message.id, "Error recording failure: {}.", e);
                }

                if is_auth_failure(&error_text)
                    && let Some(connection_id) = failure.connection_id
                {
                    match store::deactivate_connection(db_pool, connection_id).await {
                        Ok(()) => {
                            info!(%connection_id, "Deactivated connection after auth failure.")
                        }
                        Err(e) => {
                            error!(%connection_id, "Error deactivating connection: {}.", e)
                        }
                    }
                }
            }
        }
    }

    info!(
        sent = summary.sent,
        failed = summary.failed,
        "Dispatch run complete."
    );

    Ok(summary)
}

/// Attempts delivery of a single claimed message: resolve the sender
/// credential, then post through the gateway. Returns the remote message id
/// on success.
async fn deliver_one<G: ChatGateway + ?Sized>(
    db_pool: &PgPool,
    gateway: &G,
    message: &ScheduledMessage,
) -> Result<Option<String>, DeliveryFailure> {
    let workspace = store::connection_by_id(db_pool, message.workspace_id)
        .await
        .map_err(DeliveryFailure::before_send)?
        .ok_or_else(|| DeliveryFailure::before_send(DispatchError::WorkspaceMissing))?;

    // "Send as": a message authored by someone other than the workspace
    // owner goes out with the author's own token for the same server.
    let author_connection = if credentials::needs_author_connection(message, &workspace) {
        store::active_connection_for(db_pool, message.author_id, &workspace.server_url)
            .await
            .map_err(DeliveryFailure::before_send)?
    } else {
        None
    };

    let credential = credentials::resolve_sender(message, &workspace, author_connection)
        .map_err(DeliveryFailure::before_send)?;
    let connection_id = credential.connection_id;

    gateway
        .send_message(
            &credential,
            &workspace.server_url,
            &message.channel_id,
            &message.body,
        )
        .await
        .map_err(|error| DeliveryFailure {
            error: error.into(),
            connection_id: Some(connection_id),
        })
}
