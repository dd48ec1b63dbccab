use relay::config::{Config as RelayConfig, InvalidConfig};
use serde::Deserialize;
use std::fs::File;

#[derive(Deserialize, Debug, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Deserialize, Debug, PartialEq)]
pub struct LoggingConfig {
    pub sentry_dsn: String,
}

#[derive(Deserialize, Debug, Default, PartialEq)]
pub struct CommonConfig {
    pub metrics: Option<MetricsConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Deserialize, Debug, Default, PartialEq)]
pub struct Config {
    #[serde(flatten)]
    pub common: CommonConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data = serde_yaml::from_reader(file)?;

        Ok(data)
    }

    /// Applies the deployment environment on top of the file:
    /// `BOT_TOKEN`, `CHAT_ID` and `PORT`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("BOT_TOKEN") {
            self.relay.channel.bot_token = Some(token);
        }
        if let Some(chat_id) = lookup("CHAT_ID") {
            self.relay.channel.chat_id = Some(chat_id);
        }
        if let Some(port) = lookup("PORT") {
            self.relay.listener.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::EnvError("PORT", port))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        Ok(self.relay.validate()?)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid value for {0}: {1:?}")]
    EnvError(&'static str, String),
    #[error("invalid config: {0}")]
    Invalid(#[from] InvalidConfig),
}
