use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, PartialEq)]
pub enum InvalidConfig {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Channel API URL must be a base URL: {0}")]
    InvalidApiUrl(String),

    #[error("Channel timeout must be at least one second")]
    ZeroTimeout,

    #[error("Request body limit cannot be 0")]
    ZeroBodyLimit,

    #[error("Alert title cannot be empty")]
    EmptyTitle,
}

/// Relay configuration
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for the public alert endpoint
    #[serde(default)]
    pub listener: Listener,
    /// Downstream alert channel
    #[serde(default)]
    pub channel: ChannelConfig,
    /// Formatting of the forwarded alert
    #[serde(default)]
    pub alert: AlertConfig,
    /// Limits and staging for uploaded payloads
    #[serde(default)]
    pub upload: UploadConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        self.listener.validate()?;

        if self.channel.api_url.cannot_be_a_base() {
            return Err(InvalidConfig::InvalidApiUrl(self.channel.api_url.to_string()));
        }

        if self.channel.timeout_secs == 0 {
            return Err(InvalidConfig::ZeroTimeout);
        }

        if self.upload.max_body_bytes == 0 {
            return Err(InvalidConfig::ZeroBodyLimit);
        }

        if self.alert.title.trim().is_empty() {
            return Err(InvalidConfig::EmptyTitle);
        }

        Ok(())
    }

    /// Names of the channel credentials that are not set.
    ///
    /// Missing credentials are not fatal: requests are still relayed and
    /// fail against the provider.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.channel.bot_token.as_deref().is_none_or(str::is_empty) {
            missing.push("bot_token");
        }
        if self.channel.chat_id.as_deref().is_none_or(str::is_empty) {
            missing.push("chat_id");
        }
        missing
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "0.0.0.0".into(),
            port: 5000,
        }
    }
}

impl Listener {
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        if self.port == 0 {
            return Err(InvalidConfig::InvalidPort);
        }
        Ok(())
    }
}

/// Telegram bot API credentials and client settings
#[derive(Clone, Deserialize, PartialEq)]
pub struct ChannelConfig {
    /// Base URL of the bot API
    #[serde(default = "default_api_url")]
    pub api_url: Url,
    pub bot_token: Option<String>,
    /// Destination chat for every alert
    pub chat_id: Option<String>,
    /// Upper bound for one downstream exchange, body included
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ChannelConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig {
            api_url: default_api_url(),
            bot_token: None,
            chat_id: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

// The token is a credential and must not end up in logs.
impl fmt::Debug for ChannelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelConfig")
            .field("api_url", &self.api_url.as_str())
            .field("bot_token", &self.bot_token.as_ref().map(|_| "<redacted>"))
            .field("chat_id", &self.chat_id)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_api_url() -> Url {
    Url::parse("https://api.telegram.org").expect("static URL is valid")
}

fn default_timeout_secs() -> u64 {
    30
}

/// Whether the alert text carries a `Camera:` line
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CameraLine {
    /// Only when the client supplied a label other than the default
    #[default]
    WhenLabelled,
    /// Always, showing the default label when none was supplied
    Always,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct AlertConfig {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub camera_line: CameraLine,
}

impl Default for AlertConfig {
    fn default() -> Self {
        AlertConfig {
            title: default_title(),
            camera_line: CameraLine::default(),
        }
    }
}

fn default_title() -> String {
    "New Emergency Alert".into()
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct UploadConfig {
    /// Largest accepted request body, in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Directory for staged photo uploads; the system temp dir when unset
    pub staging_dir: Option<PathBuf>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        UploadConfig {
            max_body_bytes: default_max_body_bytes(),
            staging_dir: None,
        }
    }
}

fn default_max_body_bytes() -> usize {
    20 * 1024 * 1024
}
