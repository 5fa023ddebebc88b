use thiserror::Error;

/// A per-message delivery failure. Every variant is terminal: the message is
/// recorded FAILED and the batch moves on.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(
        "Author has no active connection to {server_url}. \
         The author must connect this server before messages can be sent as them."
    )]
    AuthorNotConnected { server_url: String },

    #[error("Workspace not authenticated or inactive.")]
    ConnectionUnusable,

    #[error("Workspace connection not found.")]
    WorkspaceMissing,

    #[error(transparent)]
    Gateway(#[from] crate::gateway::GatewayError),

    #[error("database error: {0}")]
    Store(#[from] sqlx::Error),
}
