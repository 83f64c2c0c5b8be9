//! HTTP push sender (FCM v1 style endpoint).

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::config::PushPlatformConfig;
use crate::notification::PushMessage;

use super::sender::PushSender;
use super::types::{SendError, SendReceipt};

#[derive(Serialize)]
struct SendRequest<'a> {
    message: &'a PushMessage,
}

pub struct HttpPushSender {
    client: reqwest::Client,
    url: String,
    access_token: String,
}

impl HttpPushSender {
    pub fn new(client: reqwest::Client, config: &PushPlatformConfig) -> Self {
        Self {
            client,
            url: config.send_url(),
            access_token: config.access_token.clone(),
        }
    }
}

#[async_trait]
impl PushSender for HttpPushSender {
    async fn send_push(&self, message: &PushMessage) -> Result<SendReceipt, SendError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.access_token)
            .json(&SendRequest { message })
            .send()
            .await
            .map_err(|e| SendError::new(format!("push request failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(SendError::with_code(
                status.as_u16(),
                format!("push rejected with status {}: {}", status, body.trim()),
            ));
        }

        Ok(SendReceipt {
            message_id: message_name(&body),
            response: Some(status.to_string()),
        })
    }
}

/// The provider answers `{"name": "projects/.../messages/<id>"}`
fn message_name(body: &str) -> Option<String> {
    serde_json::from_str::<Value>(body)
        .ok()?
        .get("name")?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wraps_message() {
        let message = PushMessage {
            token: "device-1".to_string(),
            notification: Some(json!({ "title": "Hi" })),
            ..PushMessage::default()
        };

        let body = serde_json::to_value(SendRequest { message: &message }).unwrap();
        assert_eq!(
            body,
            json!({ "message": { "token": "device-1", "notification": { "title": "Hi" } } })
        );
    }

    #[test]
    fn test_message_name() {
        assert_eq!(
            message_name(r#"{"name": "projects/acme/messages/42"}"#).as_deref(),
            Some("projects/acme/messages/42")
        );
        assert_eq!(message_name("not json"), None);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_has_no_code() {
        let config = PushPlatformConfig {
            endpoint: "http://127.0.0.1:1/send".to_string(),
            project_id: "acme".to_string(),
            access_token: "token".to_string(),
            unavailable_codes: vec![401],
        };
        let sender = HttpPushSender::new(reqwest::Client::new(), &config);

        let err = sender.send_push(&PushMessage::default()).await.unwrap_err();
        assert_eq!(err.code, None);
    }
}
