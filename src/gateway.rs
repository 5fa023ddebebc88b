use async_trait::async_trait;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::instrument;

use crate::credentials::SenderCredential;

/// Longest slice of a remote response body kept in a persisted error string.
const ERROR_BODY_LIMIT: usize = 500;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("request to chat gateway failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response from the remote server. The status code is part
    /// of the display text so auth failures ("401") can be recognized from
    /// the persisted error string alone.
    #[error("chat gateway returned {status}: {body}")]
    Remote { status: u16, body: String },
}

/// The remote chat system's message-send surface.
///
/// Object-safe so dispatch tests can substitute a stub that records calls.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Posts `text` to `channel_id` as the credential's identity.
    /// Returns the remote message id when the server provides one.
    async fn send_message(
        &self,
        credential: &SenderCredential,
        server_url: &str,
        channel_id: &str,
        text: &str,
    ) -> Result<Option<String>, GatewayError>;
}

/// Thin client for the Rocket.Chat REST API.
pub struct RocketChatGateway {
    http: reqwest::Client,
}

impl RocketChatGateway {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ChatGateway for RocketChatGateway {
    #[instrument(skip(self, credential, text))]
    async fn send_message(
        &self,
        credential: &SenderCredential,
        server_url: &str,
        channel_id: &str,
        text: &str,
    ) -> Result<Option<String>, GatewayError> {
        let url = format!("{}/api/v1/chat.postMessage", server_url.trim_end_matches('/'));

        let response = self
            .http
            .post(&url)
            .header("X-Auth-Token", &credential.auth_token)
            .header("X-User-Id", &credential.remote_user_id)
            .json(&json!({ "channel": channel_id, "text": text }))
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        if !(200..300).contains(&status) {
            return Err(GatewayError::Remote {
                status,
                body: trim_body(&body),
            });
        }

        let parsed: Value = match serde_json::from_str(&body) {
            Ok(value) => value,
            // A 2xx with an unreadable body still means the message landed;
            // we just have no remote id to record.
            Err(_) => return Ok(None),
        };

        if parsed.get("success").and_then(Value::as_bool) == Some(false) {
            return Err(GatewayError::Remote {
                status,
                body: trim_body(&body),
            });
        }

        Ok(extract_message_id(&parsed))
    }
}

/// Pulls `message._id` out of a chat.postMessage response.
fn extract_message_id(response: &Value) -> Option<String> {
    response
        .get("message")
        .and_then(|message| message.get("_id"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn trim_body(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((index, _)) => trimmed[..index].to_string(),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_remote_message_id() {
        let response = json!({
            "success": true,
            "message": { "_id": "7aDSXtjMA3KPLxLjt", "rid": "GENERAL" }
        });
        assert_eq!(
            extract_message_id(&response),
            Some("7aDSXtjMA3KPLxLjt".to_string())
        );
    }

    #[test]
    fn missing_message_id_is_none() {
        assert_eq!(extract_message_id(&json!({ "success": true })), None);
        assert_eq!(extract_message_id(&json!({ "message": {} })), None);
    }

    #[test]
    fn remote_error_text_carries_status_code() {
        let err = GatewayError::Remote {
            status: 401,
            body: "Unauthorized".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("401"));
        assert!(text.contains("Unauthorized"));
    }

    #[test]
    fn long_bodies_are_trimmed() {
        let body = "x".repeat(2000);
        assert_eq!(trim_body(&body).len(), ERROR_BODY_LIMIT);
        assert_eq!(trim_body("  short  "), "short");
    }
}
