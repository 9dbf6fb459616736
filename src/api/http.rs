//! reqwest transport for the council backend

use super::error::{status_error, ApiError, Operation};
use super::types::{ConversationRecord, CreatedConversation, SendMessageRequest};
use super::{ByteStream, CouncilApi};
use crate::config::ClientConfig;
use crate::conversation::AssistantMessage;
use crate::directory::ConversationSummary;
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// HTTP client bound to one backend origin
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    config: ClientConfig,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Returns [`ApiError::Config`] if the TLS backend fails to initialize.
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        // No total timeout on the client: the stream stays open for minutes
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ApiError::Config(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn conversation_path(id: &str) -> String {
        format!("/api/conversations/{id}")
    }

    /// Send a bounded request and return the response if it was 2xx
    async fn send(&self, request: RequestBuilder, operation: Operation) -> Result<Response, ApiError> {
        let response = request.timeout(self.config.request_timeout).send().await?;
        check_status(response, operation).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        operation: Operation,
    ) -> Result<T, ApiError> {
        let response = self.send(request, operation).await?;
        Ok(response.json::<T>().await?)
    }
}

async fn check_status(response: Response, operation: Operation) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::warn!(
        operation = ?operation,
        status = status.as_u16(),
        body_len = body.len(),
        "Council backend returned an error"
    );
    Err(status_error(operation, status.as_u16(), &body))
}

#[async_trait]
impl CouncilApi for HttpTransport {
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, ApiError> {
        let url = self.config.url("/api/conversations");
        tracing::debug!(%url, "Listing conversations");
        self.send_json(self.client.get(url), Operation::ListConversations)
            .await
    }

    async fn create_conversation(&self) -> Result<CreatedConversation, ApiError> {
        let url = self.config.url("/api/conversations");
        tracing::debug!(%url, "Creating conversation");
        let request = self.client.post(url).json(&serde_json::json!({}));
        self.send_json(request, Operation::CreateConversation).await
    }

    async fn get_conversation(&self, id: &str) -> Result<ConversationRecord, ApiError> {
        let url = self.config.url(&Self::conversation_path(id));
        tracing::debug!(%url, "Fetching conversation");
        self.send_json(self.client.get(url), Operation::GetConversation)
            .await
    }

    async fn delete_conversation(&self, id: &str) -> Result<Value, ApiError> {
        let url = self.config.url(&Self::conversation_path(id));
        tracing::debug!(%url, "Deleting conversation");
        let response = self
            .send(self.client.delete(url), Operation::DeleteConversation)
            .await?;

        // Acknowledgement bodies vary; an empty one is still a success
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn send_message(
        &self,
        id: &str,
        request: &SendMessageRequest,
    ) -> Result<AssistantMessage, ApiError> {
        let url = self.config.url(&format!("{}/message", Self::conversation_path(id)));
        tracing::debug!(%url, content_len = request.content.len(), "Sending message");
        // The whole council runs before the response; no request timeout
        let response = self.client.post(url).json(request).send().await?;
        let response = check_status(response, Operation::SendMessage).await?;
        Ok(response.json::<AssistantMessage>().await?)
    }

    async fn send_message_stream(
        &self,
        id: &str,
        request: &SendMessageRequest,
    ) -> Result<ByteStream, ApiError> {
        let url = self.config.url(&format!("{}/message/stream", Self::conversation_path(id)));
        tracing::debug!(
            %url,
            content_len = request.content.len(),
            images = request.images.len(),
            "Opening message stream"
        );

        let response = self.client.post(url).json(request).send().await?;
        let response = check_status(response, Operation::SendMessageStream).await?;

        Ok(response
            .bytes_stream()
            .map_err(|e| ApiError::Stream(e.to_string()))
            .boxed())
    }
}
