//! Application settings loaded from config.toml
//!
//! Every section has defaults, so an empty file (or a file with only the sections an
//! operator cares about) is valid. Secrets are not stored here: the Discord bot token is
//! read from the environment by the binary and handed to the sink at construction time.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::{path::Path, time::Duration};

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// `[checkout]` section
    pub checkout: CheckoutConfig,
    /// `[overdue]` section
    pub overdue: OverdueConfig,
    /// `[notifications]` section
    pub notifications: NotificationConfig,
}

/// Checkout provider settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckoutConfig {
    /// Base URL the provider redirects back to, without trailing slash
    pub callback_base_url: String,
    /// Upper bound on a single provider call
    pub timeout_secs: u64,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            callback_base_url: "http://localhost:8000/api".to_string(),
            timeout_secs: 10,
        }
    }
}

impl CheckoutConfig {
    /// Upper bound for a single provider call.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Callback the provider hits after a successful checkout of `payment_id`.
    #[must_use]
    pub fn success_url(&self, payment_id: i64) -> String {
        format!(
            "{}/payments/{payment_id}/success",
            self.callback_base_url.trim_end_matches('/')
        )
    }

    /// Callback the provider hits when the user abandons checkout of `payment_id`.
    #[must_use]
    pub fn cancel_url(&self, payment_id: i64) -> String {
        format!(
            "{}/payments/{payment_id}/cancel",
            self.callback_base_url.trim_end_matches('/')
        )
    }
}

/// Overdue scan settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OverdueConfig {
    /// Seconds between two scans
    pub interval_secs: u64,
    /// Borrowings fetched per page while scanning
    pub page_size: u64,
}

impl Default for OverdueConfig {
    fn default() -> Self {
        Self {
            interval_secs: 24 * 60 * 60,
            page_size: 50,
        }
    }
}

impl OverdueConfig {
    /// Time between overdue scans.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Notification channel settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Discord channel receiving lifecycle messages; messages only go to the log if unset
    pub discord_channel_id: Option<u64>,
}

impl AppConfig {
    /// Checks the values serde cannot express constraints for.
    pub fn validate(&self) -> Result<()> {
        if self.checkout.callback_base_url.trim().is_empty() {
            return Err(config_error("checkout.callback_base_url cannot be empty"));
        }
        if self.checkout.timeout_secs == 0 {
            return Err(config_error("checkout.timeout_secs must be positive"));
        }
        if self.overdue.interval_secs == 0 {
            return Err(config_error("overdue.interval_secs must be positive"));
        }
        if self.overdue.page_size == 0 {
            return Err(config_error("overdue.page_size must be positive"));
        }
        if self.notifications.discord_channel_id == Some(0) {
            return Err(config_error("notifications.discord_channel_id cannot be 0"));
        }
        Ok(())
    }
}

fn config_error(message: &str) -> Error {
    Error::Config {
        message: message.to_string(),
    }
}

/// Parses and validates configuration from a TOML string.
pub fn parse_config(contents: &str) -> Result<AppConfig> {
    let config: AppConfig = toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })?;
    config.validate()?;
    Ok(config)
}

/// Loads configuration from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - A value is out of range
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    tracing::debug!("Loading configuration from {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {path_ref:?}: {e}"),
    })?;
    parse_config(&contents)
}

/// Loads configuration from `LIBRARY_CONFIG`, falling back to `./config.toml`.
/// A missing default file yields the built-in defaults.
pub fn load_default_config() -> Result<AppConfig> {
    if let Ok(path) = std::env::var("LIBRARY_CONFIG") {
        return load_config(path);
    }
    let default_path = Path::new("config.toml");
    if default_path.exists() {
        load_config(default_path)
    } else {
        tracing::info!("No config.toml found, using defaults");
        Ok(AppConfig::default())
    }
}
