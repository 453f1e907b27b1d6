//! REST backend: wire types, the `ProjectBackend` seam and its reqwest implementation.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::ClientConfig;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Server returned {status}: {}", .message.as_deref().unwrap_or("no message"))]
    Server { status: u16, message: Option<String> },

    #[error("Request failed: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    Decode(String),
}

impl ApiError {
    /// The server-provided `message`, if the response carried one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::Server { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    /// Text for a user notice: the server's message when present, else `fallback`.
    pub fn notice_text(&self, fallback: &str) -> String {
        self.server_message().unwrap_or(fallback).to_string()
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Network(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEntry {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, alias = "createdAt", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, rename = "versionId", skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
}

/// Local mirror of the backend's project record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectStatus {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub conversation: Vec<ConversationEntry>,
    #[serde(default)]
    pub current_code: Option<String>,
    #[serde(default, rename = "isPublished")]
    pub is_published: bool,
    /// Explicit generation status, for backends that report one.
    #[serde(default)]
    pub status: Option<String>,
}

impl ProjectStatus {
    pub fn code(&self) -> Option<&str> {
        self.current_code.as_deref().filter(|c| !c.trim().is_empty())
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

#[async_trait]
pub trait ProjectBackend: Send + Sync {
    async fn fetch_project(&self, project_id: &str) -> ApiResult<ProjectStatus>;
    async fn fetch_conversation(&self, project_id: &str) -> ApiResult<Vec<ConversationEntry>>;
    /// Returns the generated code, when the response carries it.
    async fn generate(&self, project_id: &str, prompt: &str) -> ApiResult<Option<String>>;
    async fn revise(&self, project_id: &str, message: &str) -> ApiResult<()>;
    /// Returns the server's confirmation message.
    async fn save(&self, project_id: &str, code: &str) -> ApiResult<Option<String>>;
    async fn toggle_publish(&self, project_id: &str) -> ApiResult<()>;
    async fn rollback(&self, project_id: &str, version_id: &str) -> ApiResult<Option<String>>;
}

pub type SharedBackend = Arc<dyn ProjectBackend>;

pub struct HttpBackend {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct ProjectEnvelope {
    project: ProjectStatus,
}

#[derive(Deserialize)]
struct ConversationEnvelope {
    #[serde(default)]
    conversation: Vec<ConversationEntry>,
}

#[derive(Deserialize, Default)]
struct CodeResponse {
    #[serde(default)]
    code: Option<String>,
}

#[derive(Deserialize, Default)]
struct MessageResponse {
    #[serde(default)]
    message: Option<String>,
}

impl HttpBackend {
    pub fn new(config: &ClientConfig) -> ApiResult<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send_json<T: DeserializeOwned + Default>(&self, request: RequestBuilder) -> ApiResult<T> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        let value: Value = if body.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&body).unwrap_or(Value::String(body))
        };

        if !status.is_success() {
            let message = value.get("message").and_then(Value::as_str).map(str::to_string);
            return Err(ApiError::Server {
                status: status.as_u16(),
                message,
            });
        }
        if value.is_null() {
            return Ok(T::default());
        }
        serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ProjectBackend for HttpBackend {
    async fn fetch_project(&self, project_id: &str) -> ApiResult<ProjectStatus> {
        let url = self.url(&format!("/api/user/project/{}", project_id));
        let envelope: Option<ProjectEnvelope> = self.send_json(self.client.get(url)).await?;
        envelope
            .map(|e| e.project)
            .ok_or_else(|| ApiError::Decode("missing project".to_string()))
    }

    async fn fetch_conversation(&self, project_id: &str) -> ApiResult<Vec<ConversationEntry>> {
        let url = self.url(&format!("/api/project/conversation/{}", project_id));
        let envelope: Option<ConversationEnvelope> = self.send_json(self.client.get(url)).await?;
        Ok(envelope.map(|e| e.conversation).unwrap_or_default())
    }

    async fn generate(&self, project_id: &str, prompt: &str) -> ApiResult<Option<String>> {
        let url = self.url(&format!("/api/project/{}/generate", project_id));
        let response: CodeResponse = self
            .send_json(self.client.post(url).json(&json!({ "prompt": prompt })))
            .await?;
        Ok(response.code.filter(|c| !c.is_empty()))
    }

    async fn revise(&self, project_id: &str, message: &str) -> ApiResult<()> {
        let url = self.url(&format!("/api/project/{}/revision", project_id));
        let _: Value = self
            .send_json(self.client.post(url).json(&json!({ "message": message })))
            .await?;
        Ok(())
    }

    async fn save(&self, project_id: &str, code: &str) -> ApiResult<Option<String>> {
        let url = self.url(&format!("/api/project/{}", project_id));
        let response: MessageResponse = self
            .send_json(self.client.put(url).json(&json!({ "current_code": code })))
            .await?;
        Ok(response.message)
    }

    async fn toggle_publish(&self, project_id: &str) -> ApiResult<()> {
        let url = self.url(&format!("/api/user/publish-toggle/{}", project_id));
        let _: Value = self.send_json(self.client.get(url)).await?;
        Ok(())
    }

    async fn rollback(&self, project_id: &str, version_id: &str) -> ApiResult<Option<String>> {
        let url = self.url(&format!("/api/project/{}/rollback/{}", project_id, version_id));
        let response: MessageResponse = self.send_json(self.client.post(url)).await?;
        Ok(response.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_project_status_wire_shape() {
        let raw = r#"{
            "id": 42,
            "name": "Landing",
            "isPublished": true,
            "current_code": "",
            "conversation": [
                {"id": "m1", "role": "user", "content": "make a site", "createdAt": "2024-01-01T00:00:00Z"},
                {"id": "m2", "role": "assistant", "content": "done", "versionId": "v1"},
                {"id": "m3", "role": "system", "content": "x"}
            ]
        }"#;
        let status: ProjectStatus = serde_json::from_str(raw).unwrap();
        assert_eq!(status.id, "42");
        assert!(status.is_published);
        assert_eq!(status.code(), None);
        assert_eq!(status.conversation[0].timestamp.as_deref(), Some("2024-01-01T00:00:00Z"));
        assert_eq!(status.conversation[1].version_id.as_deref(), Some("v1"));
        assert_eq!(status.conversation[2].role, Role::Other);
    }

    #[test]
    fn test_notice_text_prefers_server_message() {
        let err = ApiError::Server {
            status: 403,
            message: Some("Not enough credits".into()),
        };
        assert_eq!(err.notice_text("Failed to generate website"), "Not enough credits");
        let err = ApiError::Network("timeout".into());
        assert_eq!(err.notice_text("Failed to generate website"), "Failed to generate website");
    }
}
