//! HTTP client for the call gateway.
//!
//! The gateway owns the actual voice-chat session; this side only tells it
//! which file to stream into which chat.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::debug;

use voice_queue::{CallTransport, ChatId, MediaHandle, TransportError};

/// JSON payload for starting a stream in a chat.
#[derive(Debug, Serialize)]
struct JoinRequest<'a> {
    path: &'a str,
}

#[derive(Clone)]
pub struct GatewayTransport {
    client: Client,
    base_url: String,
}

impl GatewayTransport {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("build gateway http client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn call_url(&self, chat_id: ChatId, action: &str) -> String {
        format!("{}/calls/{chat_id}/{action}", self.base_url)
    }

    async fn post(
        &self,
        chat_id: ChatId,
        action: &str,
        body: Option<&JoinRequest<'_>>,
    ) -> Result<(), TransportError> {
        let url = self.call_url(chat_id, action);
        let request = match body {
            Some(body) => self.client.post(&url).json(body),
            None => self.client.post(&url),
        };
        let response = request
            .send()
            .await
            .map_err(|err| TransportError::Unavailable(format!("{action} request failed: {err}")))?;
        let status = response.status();
        let message = if status.is_success() {
            String::new()
        } else {
            response.text().await.unwrap_or_default()
        };
        debug!(chat_id, action, status = %status, "gateway call");
        map_status(status, message)
    }
}

fn map_status(status: StatusCode, message: String) -> Result<(), TransportError> {
    if status.is_success() {
        return Ok(());
    }
    if status == StatusCode::NOT_FOUND {
        return Err(TransportError::NoSession);
    }
    Err(TransportError::Rejected {
        status: status.as_u16(),
        message: message.trim().to_string(),
    })
}

#[async_trait]
impl CallTransport for GatewayTransport {
    async fn join(&self, chat_id: ChatId, media: &MediaHandle) -> Result<(), TransportError> {
        let path = media.as_path().to_string_lossy();
        self.post(chat_id, "join", Some(&JoinRequest { path: &path }))
            .await
    }

    async fn leave(&self, chat_id: ChatId) -> Result<(), TransportError> {
        match self.post(chat_id, "leave", None).await {
            Err(TransportError::NoSession) => Ok(()),
            other => other,
        }
    }

    async fn pause(&self, chat_id: ChatId) -> Result<(), TransportError> {
        self.post(chat_id, "pause", None).await
    }

    async fn resume(&self, chat_id: ChatId) -> Result<(), TransportError> {
        self.post(chat_id, "resume", None).await
    }
}
