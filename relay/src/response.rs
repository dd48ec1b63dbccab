use crate::outcome::DeliveryOutcome;
use serde::Serialize;
use serde_json::Value;

/// Reply to an alert that passed normalization.
///
/// `ok` is always true here; delivery failures are only visible in the
/// per-stage statuses.
#[derive(Debug, Serialize, PartialEq)]
pub struct RelayResponse {
    pub ok: bool,
    pub msg_status: Value,
    pub photo_status: Value,
}

pub fn compose(text: &DeliveryOutcome, photo: &DeliveryOutcome) -> RelayResponse {
    RelayResponse {
        ok: true,
        msg_status: text.status(),
        photo_status: photo.status(),
    }
}
