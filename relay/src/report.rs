//! Request normalization.
//!
//! Every accepted encoding is reduced to one [`AlertReport`] before any
//! sender sees it:
//!
//! - `application/json` (or no content type): `lat`/`latitude`,
//!   `lon`/`longitude`, optional `label` and `photo` as a base64 data-URL
//! - `multipart/form-data`: the same text fields plus a `photo` file part,
//!   staged to disk while it streams in
//! - `application/x-www-form-urlencoded`: the text fields only
//!
//! Long field names win over short ones when both are sent. Missing
//! coordinates reject the request before anything is delivered.

use crate::errors::{DecodeError, RelayError, ValidationError};
use crate::photo::{Photo, StagingArea, decode_data_url};
use axum::Form;
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use bytes::Bytes;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

pub const DEFAULT_LABEL: &str = "unknown";

/// A latitude or longitude exactly as the client sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coordinate(String);

impl Coordinate {
    /// Blank values count as missing. Anything else is kept verbatim.
    pub fn parse(raw: &str) -> Option<Self> {
        (!raw.trim().is_empty()).then(|| Coordinate(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug)]
pub enum PhotoState {
    Absent,
    Present(Photo),
    /// A photo was sent but could not be decoded
    Malformed(DecodeError),
}

/// One emergency report, valid for the duration of a single request.
#[derive(Debug)]
pub struct AlertReport {
    pub latitude: Coordinate,
    pub longitude: Coordinate,
    /// `None` when the client did not identify its camera
    pub label: Option<String>,
    pub photo: PhotoState,
}

impl AlertReport {
    pub fn label_or_default(&self) -> &str {
        self.label.as_deref().unwrap_or(DEFAULT_LABEL)
    }
}

/// Payload encodings accepted by `/send_data`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Json,
    Multipart,
    Form,
}

impl Encoding {
    /// Picks the extraction routine from a `Content-Type` value.
    ///
    /// A missing content type is read as JSON.
    pub fn from_content_type(content_type: Option<&str>) -> Result<Self, ValidationError> {
        let Some(content_type) = content_type else {
            return Ok(Encoding::Json);
        };

        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "application/json" => Ok(Encoding::Json),
            "multipart/form-data" => Ok(Encoding::Multipart),
            "application/x-www-form-urlencoded" => Ok(Encoding::Form),
            other if other.starts_with("application/") && other.ends_with("+json") => {
                Ok(Encoding::Json)
            }
            _ => Err(ValidationError::UnsupportedContentType(
                content_type.to_string(),
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Json => "json",
            Encoding::Multipart => "multipart",
            Encoding::Form => "form",
        }
    }
}

/// Coordinates and label collected from any encoding, before alias
/// resolution.
#[derive(Debug, Default)]
struct Fields {
    latitude: Option<Coordinate>,
    lat: Option<Coordinate>,
    longitude: Option<Coordinate>,
    lon: Option<Coordinate>,
    label: Option<String>,
}

impl Fields {
    fn set_text(&mut self, name: &str, value: &str) {
        match name {
            "latitude" => self.latitude = Coordinate::parse(value),
            "lat" => self.lat = Coordinate::parse(value),
            "longitude" => self.longitude = Coordinate::parse(value),
            "lon" => self.lon = Coordinate::parse(value),
            "label" => self.label = Some(value.to_string()),
            _ => {}
        }
    }

    fn has_coordinates(&self) -> bool {
        (self.latitude.is_some() || self.lat.is_some())
            && (self.longitude.is_some() || self.lon.is_some())
    }

    fn into_report(self, photo: PhotoState) -> Result<AlertReport, ValidationError> {
        let latitude = self.latitude.or(self.lat);
        let longitude = self.longitude.or(self.lon);

        let (Some(latitude), Some(longitude)) = (latitude, longitude) else {
            return Err(ValidationError::MissingCoordinates);
        };

        Ok(AlertReport {
            latitude,
            longitude,
            label: self.label.as_deref().and_then(normalize_label),
            photo,
        })
    }
}

fn normalize_label(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(DEFAULT_LABEL) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Builds an [`AlertReport`] from a `/send_data` request.
///
/// Staged uploads belong to the returned report; on error they are already
/// released.
pub async fn normalize(
    request: Request,
    staging: &StagingArea,
) -> Result<(Encoding, AlertReport), RelayError> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .map(|value| {
            value.to_str().map_err(|_| {
                let raw = String::from_utf8_lossy(value.as_bytes()).into_owned();
                ValidationError::UnsupportedContentType(raw)
            })
        })
        .transpose()?;
    let encoding = Encoding::from_content_type(content_type)?;

    let report = match encoding {
        Encoding::Json => {
            let body = Bytes::from_request(request, &())
                .await
                .map_err(|rejection| body_error(rejection.status(), rejection.body_text()))?;
            from_json(&body)?
        }
        Encoding::Form => {
            let Form(form) = Form::<HashMap<String, String>>::from_request(request, &())
                .await
                .map_err(|rejection| match rejection.status() {
                    StatusCode::PAYLOAD_TOO_LARGE => {
                        RelayError::PayloadTooLarge(rejection.body_text())
                    }
                    _ => ValidationError::MalformedForm(rejection.body_text()).into(),
                })?;
            from_form(form)?
        }
        Encoding::Multipart => {
            let multipart = Multipart::from_request(request, &())
                .await
                .map_err(|rejection| ValidationError::MalformedMultipart(rejection.body_text()))?;
            from_multipart(multipart, staging).await?
        }
    };

    Ok((encoding, report))
}

fn body_error(status: StatusCode, message: String) -> RelayError {
    match status {
        StatusCode::PAYLOAD_TOO_LARGE => RelayError::PayloadTooLarge(message),
        _ => ValidationError::MalformedJson(message).into(),
    }
}

/// Reads a coordinate from a JSON object: a number or a string, passed
/// through as text. `null` counts as missing.
fn json_coordinate(
    object: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<Coordinate>, ValidationError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => Ok(Coordinate::parse(&number.to_string())),
        Some(Value::String(text)) => Ok(Coordinate::parse(text)),
        Some(_) => Err(ValidationError::InvalidField {
            field,
            reason: "expected a number or a string".to_string(),
        }),
    }
}

/// A label of any other JSON type is ignored.
fn json_label(object: &Map<String, Value>) -> Option<String> {
    match object.get("label") {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text.clone()),
        Some(other) => {
            tracing::debug!(label = %other, "Ignoring non-string label");
            None
        }
    }
}

fn json_photo(object: &Map<String, Value>) -> PhotoState {
    match object.get("photo") {
        None | Some(Value::Null) => PhotoState::Absent,
        Some(Value::String(data_url)) => inline_photo(data_url),
        Some(_) => {
            let e = DecodeError::NotAString;
            tracing::warn!(error = %e, "Discarding undecodable photo");
            PhotoState::Malformed(e)
        }
    }
}

pub(crate) fn from_json(body: &[u8]) -> Result<AlertReport, ValidationError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| ValidationError::MalformedJson(e.to_string()))?;
    let Value::Object(object) = value else {
        return Err(ValidationError::MalformedJson(
            "expected a JSON object".to_string(),
        ));
    };

    let fields = Fields {
        latitude: json_coordinate(&object, "latitude")?,
        lat: json_coordinate(&object, "lat")?,
        longitude: json_coordinate(&object, "longitude")?,
        lon: json_coordinate(&object, "lon")?,
        label: json_label(&object),
    };

    // Checked before the photo is decoded
    if !fields.has_coordinates() {
        return Err(ValidationError::MissingCoordinates);
    }

    fields.into_report(json_photo(&object))
}

/// Decodes an inline photo. A bad payload is kept as `Malformed` so the
/// rest of the alert still goes out.
fn inline_photo(data_url: &str) -> PhotoState {
    if data_url.trim().is_empty() {
        return PhotoState::Absent;
    }

    match decode_data_url(data_url) {
        Ok(bytes) => PhotoState::Present(Photo::Inline(bytes)),
        Err(e) => {
            tracing::warn!(error = %e, "Discarding undecodable photo");
            PhotoState::Malformed(e)
        }
    }
}

fn from_form(form: HashMap<String, String>) -> Result<AlertReport, ValidationError> {
    let mut fields = Fields::default();
    for (name, value) in &form {
        fields.set_text(name, value);
    }
    fields.into_report(PhotoState::Absent)
}

async fn from_multipart(
    mut multipart: Multipart,
    staging: &StagingArea,
) -> Result<AlertReport, RelayError> {
    let mut fields = Fields::default();
    let mut photo = PhotoState::Absent;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name == "photo" {
            if !matches!(photo, PhotoState::Absent) {
                tracing::debug!("Ignoring additional photo part");
            } else if field.file_name().is_none() {
                // A data-URL sent as a plain form value
                let data_url = field.text().await.map_err(multipart_error)?;
                photo = inline_photo(&data_url);
            } else if let Some(staged) = staging.stage_upload(field).await? {
                photo = PhotoState::Present(Photo::Staged(staged));
            }
            continue;
        }

        let value = field.text().await.map_err(multipart_error)?;
        fields.set_text(&name, &value);
    }

    Ok(fields.into_report(photo)?)
}

pub(crate) fn multipart_error(e: axum::extract::multipart::MultipartError) -> RelayError {
    match e.status() {
        StatusCode::PAYLOAD_TOO_LARGE => RelayError::PayloadTooLarge(e.body_text()),
        _ => ValidationError::MalformedMultipart(e.body_text()).into(),
    }
}
