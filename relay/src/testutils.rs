use crate::channel::{AlertChannel, Attachment, AttachmentContent};
use crate::errors::DeliveryError;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Mutex;

pub const MULTIPART_BOUNDARY: &str = "beacon-test-boundary";

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelCall {
    Message {
        chat_id: String,
        text: String,
    },
    Photo {
        chat_id: String,
        filename: &'static str,
        mime: &'static str,
        caption: String,
        bytes: Vec<u8>,
        /// Set when the attachment was streamed from a staged file
        staged_path: Option<PathBuf>,
    },
}

/// Alert channel that records every call and answers like the bot API.
#[derive(Default)]
pub struct RecordingChannel {
    calls: Mutex<Vec<ChannelCall>>,
    fail_messages: bool,
    fail_photos: bool,
}

impl RecordingChannel {
    pub fn failing_messages() -> Self {
        Self {
            fail_messages: true,
            ..Default::default()
        }
    }

    pub fn failing_photos() -> Self {
        Self {
            fail_photos: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<ChannelCall> {
        self.calls.lock().unwrap().clone()
    }
}

fn bad_request(description: &str) -> DeliveryError {
    DeliveryError::Status {
        status: reqwest::StatusCode::BAD_REQUEST,
        body: Some(json!({"ok": false, "error_code": 400, "description": description})),
    }
}

#[async_trait]
impl AlertChannel for RecordingChannel {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<Value, DeliveryError> {
        self.calls.lock().unwrap().push(ChannelCall::Message {
            chat_id: chat_id.to_string(),
            text: text.to_string(),
        });

        if self.fail_messages {
            return Err(bad_request("Bad Request: chat not found"));
        }
        Ok(json!({"ok": true, "result": {"message_id": 1}}))
    }

    async fn send_photo(
        &self,
        chat_id: &str,
        attachment: Attachment,
        caption: &str,
    ) -> Result<Value, DeliveryError> {
        let (bytes, staged_path) = match attachment.content {
            AttachmentContent::Memory(bytes) => (bytes.to_vec(), None),
            AttachmentContent::File { path, .. } => (std::fs::read(&path)?, Some(path)),
        };

        self.calls.lock().unwrap().push(ChannelCall::Photo {
            chat_id: chat_id.to_string(),
            filename: attachment.filename,
            mime: attachment.mime,
            caption: caption.to_string(),
            bytes,
            staged_path,
        });

        if self.fail_photos {
            return Err(bad_request("Bad Request: IMAGE_PROCESS_FAILED"));
        }
        Ok(json!({"ok": true, "result": {"message_id": 2}}))
    }
}

/// Builds a `multipart/form-data` body delimited by [`MULTIPART_BOUNDARY`].
#[derive(Default)]
pub struct MultipartBody {
    body: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{MULTIPART_BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, filename: &str, content: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{MULTIPART_BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: image/jpeg\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(content);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{MULTIPART_BOUNDARY}--\r\n").as_bytes());
        self.body
    }
}
