use crate::channel::AlertChannel;
use crate::config::{AlertConfig, CameraLine};
use crate::outcome::{DeliveryOutcome, Stage};
use crate::report::AlertReport;

pub const MAPS_URL: &str = "https://www.google.com/maps";

pub fn maps_link(report: &AlertReport) -> String {
    format!("{MAPS_URL}?q={},{}", report.latitude, report.longitude)
}

/// Builds the human-readable alert:
///
/// ```text
/// 📍 <title>
/// Camera: <label>
/// Location: <latitude>, <longitude>
/// https://www.google.com/maps?q=<latitude>,<longitude>
/// ```
///
/// The camera line follows [`CameraLine`].
pub fn alert_text(config: &AlertConfig, report: &AlertReport) -> String {
    let mut lines = vec![format!("📍 {}", config.title)];

    let show_camera = match config.camera_line {
        CameraLine::WhenLabelled => report.label.is_some(),
        CameraLine::Always => true,
    };
    if show_camera {
        lines.push(format!("Camera: {}", report.label_or_default()));
    }

    lines.push(format!(
        "Location: {}, {}",
        report.latitude, report.longitude
    ));
    lines.push(maps_link(report));
    lines.join("\n")
}

/// Sends the alert text. Failures end up in the outcome, never in the
/// caller.
pub async fn send_alert(
    channel: &dyn AlertChannel,
    chat_id: &str,
    config: &AlertConfig,
    report: &AlertReport,
) -> DeliveryOutcome {
    let text = alert_text(config, report);
    let result = channel.send_message(chat_id, &text).await;
    DeliveryOutcome::from_result(Stage::Text, result)
}
