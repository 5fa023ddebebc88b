use crate::errors::DispatchError;
use crate::models::{ScheduledMessage, WorkspaceConnection};
use uuid::Uuid;

/// The connection actually used to deliver a message. May belong to a
/// different user than the workspace's owner when "send as" is in play.
#[derive(Debug, Clone)]
pub struct SenderCredential {
    pub auth_token: String,
    pub remote_user_id: String,
    /// Row the token came from, so an auth failure deactivates the right one.
    pub connection_id: Uuid,
}

/// Whether delivering `message` requires looking up the author's own
/// connection instead of using the workspace's stored token.
pub fn needs_author_connection(
    message: &ScheduledMessage,
    workspace: &WorkspaceConnection,
) -> bool {
    message.author_id != workspace.owner_id
}

/// Picks the credential a message must be sent with.
///
/// If the author owns the workspace, the workspace's own token is used.
/// Otherwise the author's own active connection to the same server URL is
/// required; `author_connection` is that lookup's result, and `None` means
/// the author never connected the server.
pub fn resolve_sender(
    message: &ScheduledMessage,
    workspace: &WorkspaceConnection,
    author_connection: Option<WorkspaceConnection>,
) -> Result<SenderCredential, DispatchError> {
    if !needs_author_connection(message, workspace) {
        return credential_from(workspace);
    }

    match author_connection {
        Some(connection) => credential_from(&connection),
        None => Err(DispatchError::AuthorNotConnected {
            server_url: workspace.server_url.clone(),
        }),
    }
}

fn credential_from(connection: &WorkspaceConnection) -> Result<SenderCredential, DispatchError> {
    if !connection.is_active {
        return Err(DispatchError::ConnectionUnusable);
    }
    match (&connection.auth_token, &connection.remote_user_id) {
        (Some(auth_token), Some(remote_user_id)) => Ok(SenderCredential {
            auth_token: auth_token.clone(),
            remote_user_id: remote_user_id.clone(),
            connection_id: connection.id,
        }),
        _ => Err(DispatchError::ConnectionUnusable),
    }
}
