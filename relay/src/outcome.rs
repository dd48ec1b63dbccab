use crate::errors::DeliveryError;
use crate::metrics_defs::DELIVERY_OUTCOMES;
use serde_json::{Value, json};
use std::fmt;

/// The two independent delivery stages of one alert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Text,
    Photo,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Text => "text",
            Stage::Photo => "photo",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to one downstream call.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryOutcome {
    pub attempted: bool,
    pub succeeded: bool,
    /// The provider's JSON answer, successful or not
    pub provider_response: Option<Value>,
    pub error: Option<String>,
}

impl DeliveryOutcome {
    /// Nothing to deliver.
    pub fn skipped() -> Self {
        Self {
            attempted: false,
            succeeded: false,
            provider_response: None,
            error: None,
        }
    }

    /// The stage had input but could not call the channel.
    pub fn not_attempted(stage: Stage, error: &dyn std::error::Error) -> Self {
        tracing::warn!(stage = %stage, error = %error, "Skipping delivery");
        record(stage, "skipped");
        Self {
            attempted: false,
            succeeded: false,
            provider_response: None,
            error: Some(error.to_string()),
        }
    }

    pub fn from_result(stage: Stage, result: Result<Value, DeliveryError>) -> Self {
        match result {
            Ok(response) => {
                tracing::debug!(stage = %stage, "Delivered to alert channel");
                record(stage, "success");
                Self {
                    attempted: true,
                    succeeded: true,
                    provider_response: Some(response),
                    error: None,
                }
            }
            Err(e) => {
                tracing::error!(stage = %stage, error = %e, "Delivery to alert channel failed");
                record(stage, "failure");
                Self {
                    attempted: true,
                    succeeded: false,
                    provider_response: e.provider_response().cloned(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// The value reported to the client for this stage.
    ///
    /// The provider's answer when there is one, an error marker when the
    /// stage failed without one, `null` when it was skipped.
    pub fn status(&self) -> Value {
        match (&self.provider_response, &self.error) {
            (Some(response), _) => response.clone(),
            (None, Some(error)) => json!({ "ok": false, "error": error }),
            (None, None) => Value::Null,
        }
    }
}

fn record(stage: Stage, result: &'static str) {
    metrics::counter!(DELIVERY_OUTCOMES.name, "stage" => stage.as_str(), "result" => result)
        .increment(1);
}
