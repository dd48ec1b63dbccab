use crate::channel::{AlertChannel, Attachment, AttachmentContent};
use crate::errors::{DecodeError, RelayError};
use crate::metrics_defs::PHOTO_BYTES;
use crate::outcome::{DeliveryOutcome, Stage};
use crate::report::{AlertReport, PhotoState, multipart_error};
use axum::extract::multipart::Field;
use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;

/// Standard alphabet; clients are inconsistent about padding.
const PHOTO_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decodes a `data:<mime>;base64,<payload>` string or a bare base64 payload.
///
/// Everything up to the first comma is discarded. ASCII whitespace in the
/// payload is ignored.
pub fn decode_data_url(data_url: &str) -> Result<Bytes, DecodeError> {
    let payload = match data_url.split_once(',') {
        Some((_header, payload)) => payload,
        None => data_url,
    };

    let compact: Vec<u8> = payload
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();

    Ok(PHOTO_ENGINE.decode(compact)?.into())
}

#[derive(Debug)]
pub enum Photo {
    /// Decoded from an inline data-URL
    Inline(Bytes),
    /// Uploaded as a multipart file and written to disk
    Staged(StagedPhoto),
}

impl Photo {
    pub fn len(&self) -> u64 {
        match self {
            Photo::Inline(bytes) => bytes.len() as u64,
            Photo::Staged(staged) => staged.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn source(&self) -> &'static str {
        match self {
            Photo::Inline(_) => "inline",
            Photo::Staged(_) => "upload",
        }
    }

    fn attachment(&self) -> Attachment {
        let content = match self {
            Photo::Inline(bytes) => AttachmentContent::Memory(bytes.clone()),
            Photo::Staged(staged) => AttachmentContent::File {
                path: staged.path().to_path_buf(),
                len: staged.len(),
            },
        };
        Attachment::jpeg(content)
    }
}

/// A photo upload held in a temporary file.
///
/// The file is deleted when this value is dropped.
#[derive(Debug)]
pub struct StagedPhoto {
    path: TempPath,
    len: u64,
}

impl StagedPhoto {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Where multipart photo uploads are written while a request is handled
#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: Option<PathBuf>,
}

impl StagingArea {
    /// Uses the system temp dir when `dir` is `None`.
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    /// Streams a multipart file part into a new staging file.
    ///
    /// Returns `None` for an empty part, which is what browsers send when no
    /// file was chosen.
    pub async fn stage_upload(
        &self,
        mut field: Field<'_>,
    ) -> Result<Option<StagedPhoto>, RelayError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("beacon-photo-").suffix(".jpg");
        let named = match &self.dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(RelayError::Staging)?;

        // Dropping `path` deletes the file, including on the early returns below.
        let (file, path) = named.into_parts();
        let mut file = tokio::fs::File::from_std(file);
        let mut len = 0u64;

        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            file.write_all(&chunk).await.map_err(RelayError::Staging)?;
            len += chunk.len() as u64;
        }
        file.flush().await.map_err(RelayError::Staging)?;
        drop(file);

        if len == 0 {
            return Ok(None);
        }

        tracing::debug!(path = %path.display(), bytes = len, "Staged photo upload");
        Ok(Some(StagedPhoto { path, len }))
    }
}

pub fn photo_caption(report: &AlertReport) -> String {
    let origin = match &report.label {
        Some(label) => format!("📷 Photo from {label}"),
        None => "📷 Photo (from web)".to_string(),
    };
    format!(
        "{origin}\nLocation: {}, {}",
        report.latitude, report.longitude
    )
}

/// Sends the report's photo, if there is one, as a `photo.jpg` attachment.
///
/// The photo is consumed: a staged file is deleted when this returns,
/// whatever the outcome.
pub async fn relay(
    channel: &dyn AlertChannel,
    chat_id: &str,
    report: &mut AlertReport,
) -> DeliveryOutcome {
    let photo = match std::mem::replace(&mut report.photo, PhotoState::Absent) {
        PhotoState::Absent => return DeliveryOutcome::skipped(),
        PhotoState::Malformed(e) => return DeliveryOutcome::not_attempted(Stage::Photo, &e),
        PhotoState::Present(photo) => photo,
    };

    metrics::histogram!(PHOTO_BYTES.name, "source" => photo.source()).record(photo.len() as f64);

    let caption = photo_caption(report);
    let result = channel
        .send_photo(chat_id, photo.attachment(), &caption)
        .await;
    drop(photo);

    DeliveryOutcome::from_result(Stage::Photo, result)
}
