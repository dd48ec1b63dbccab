use crate::config::ChannelConfig;
use crate::errors::DeliveryError;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

pub const PHOTO_FILENAME: &str = "photo.jpg";
pub const PHOTO_MIME: &str = "image/jpeg";

/// A file sent to the alert channel.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: &'static str,
    pub mime: &'static str,
    pub content: AttachmentContent,
}

#[derive(Debug, Clone)]
pub enum AttachmentContent {
    Memory(Bytes),
    /// Streamed from disk when the request is sent
    File { path: PathBuf, len: u64 },
}

impl Attachment {
    pub fn jpeg(content: AttachmentContent) -> Self {
        Self {
            filename: PHOTO_FILENAME,
            mime: PHOTO_MIME,
            content,
        }
    }

    async fn into_part(self) -> Result<Part, DeliveryError> {
        let body = match self.content {
            AttachmentContent::Memory(bytes) => {
                let len = bytes.len() as u64;
                Part::stream_with_length(bytes, len)
            }
            AttachmentContent::File { path, len } => {
                let file = tokio::fs::File::open(&path).await?;
                Part::stream_with_length(file, len)
            }
        };

        Ok(body.file_name(self.filename).mime_str(self.mime)?)
    }
}

/// The downstream messaging provider alerts are forwarded to.
///
/// Both operations return the provider's JSON answer on success. A failed
/// call never affects the other operation.
#[async_trait]
pub trait AlertChannel: Send + Sync {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<Value, DeliveryError>;

    async fn send_photo(
        &self,
        chat_id: &str,
        attachment: Attachment,
        caption: &str,
    ) -> Result<Value, DeliveryError>;
}

/// Telegram bot API client
#[derive(Clone)]
pub struct TelegramChannel {
    client: reqwest::Client,
    api_url: Url,
    token: String,
    timeout: Duration,
}

impl TelegramChannel {
    pub fn new(config: &ChannelConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.clone(),
            token: config.bot_token.clone().unwrap_or_default(),
            timeout: config.timeout(),
        }
    }

    /// `{api_url}/bot{token}/{method}`. Tokens contain `:`, so the path is
    /// built from segments rather than joined as a relative reference.
    fn method_url(&self, method: &str) -> Result<Url, DeliveryError> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|()| DeliveryError::InvalidUrl(self.api_url.to_string()))?
            .pop_if_empty()
            .push(&format!("bot{}", self.token))
            .push(method);
        Ok(url)
    }

    /// Sends a request and interprets the bot API envelope.
    ///
    /// The timeout covers the whole exchange, including reading the body.
    async fn dispatch(&self, request: reqwest::RequestBuilder) -> Result<Value, DeliveryError> {
        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        let (status, body) = timeout(self.timeout, exchange)
            .await
            .map_err(|_| DeliveryError::Timeout(self.timeout))??;

        let body = serde_json::from_slice::<Value>(&body).ok();
        if !status.is_success() {
            return Err(DeliveryError::Status { status, body });
        }

        let body = body.ok_or(DeliveryError::InvalidResponse)?;
        if body.get("ok") == Some(&Value::Bool(false)) {
            let description = body
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("no description")
                .to_string();
            return Err(DeliveryError::Rejected { description, body });
        }

        Ok(body)
    }
}

#[async_trait]
impl AlertChannel for TelegramChannel {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<Value, DeliveryError> {
        let url = self.method_url("sendMessage")?;
        let request = self
            .client
            .post(url)
            .json(&json!({ "chat_id": chat_id, "text": text }));
        self.dispatch(request).await
    }

    async fn send_photo(
        &self,
        chat_id: &str,
        attachment: Attachment,
        caption: &str,
    ) -> Result<Value, DeliveryError> {
        let url = self.method_url("sendPhoto")?;
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .part("photo", attachment.into_part().await?);
        let request = self.client.post(url).multipart(form);
        self.dispatch(request).await
    }
}
