//! Environment configuration for different deployment stages

use std::{env, fs, time::Duration};

use anyhow::{bail, Context};
use aws_config::{retry::RetryConfig, timeout::TimeoutConfig, BehaviorVersion};

/// Application environment configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    /// Production environment
    Production,
    /// Staging environment
    Staging,
    /// Development environment (uses `LocalStack`)
    Development,
}

impl Environment {
    /// Creates an Environment from the `APP_ENV` environment variable
    ///
    /// # Panics
    ///
    /// Panics if `APP_ENV` contains an invalid value
    #[must_use]
    pub fn from_env() -> Self {
        let env = env::var("APP_ENV")
            .unwrap_or_else(|_| "development".to_string())
            .trim()
            .to_lowercase();

        match env.as_str() {
            "production" => Self::Production,
            "staging" => Self::Staging,
            "development" => Self::Development,
            _ => panic!("Invalid environment: {env}"),
        }
    }

    /// Returns the endpoint URL to use for AWS services
    #[must_use]
    pub const fn override_aws_endpoint_url(&self) -> Option<&str> {
        match self {
            // Regular AWS endpoints for production and staging
            Self::Production | Self::Staging => None,
            // LocalStack endpoint for development
            Self::Development { .. } => Some("http://localhost:4566"),
        }
    }

    /// AWS configuration with retry and timeout settings
    pub async fn aws_config(&self) -> aws_config::SdkConfig {
        let retry_config = RetryConfig::standard()
            .with_max_attempts(3)
            .with_initial_backoff(Duration::from_millis(50));

        let timeout_config = TimeoutConfig::builder()
            .operation_timeout(Duration::from_secs(30))
            .build();

        let mut config_builder = aws_config::load_defaults(BehaviorVersion::latest())
            .await
            .to_builder()
            .retry_config(retry_config)
            .timeout_config(timeout_config);

        if let Some(endpoint_url) = self.override_aws_endpoint_url() {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }

        config_builder.build()
    }

    /// Returns the outbox table name
    ///
    /// # Panics
    ///
    /// Panics if the `OUTBOX_TABLE_NAME` environment variable is not set in
    /// production/staging
    #[must_use]
    pub fn outbox_table_name(&self) -> String {
        match self {
            Self::Production | Self::Staging => env::var("OUTBOX_TABLE_NAME")
                .expect("OUTBOX_TABLE_NAME environment variable is not set"),
            Self::Development => "relay-outbox-entries".to_string(),
        }
    }

    /// Returns the Global Secondary Index name backing the pending view
    #[must_use]
    pub fn outbox_status_gsi_name(&self) -> String {
        env::var("OUTBOX_STATUS_GSI_NAME").unwrap_or_else(|_| "status-index".to_string())
    }

    /// Returns the Telegram bot token, read from the `TELEGRAM_BOT_TOKEN`
    /// environment variable or from the file named by
    /// `TELEGRAM_BOT_TOKEN_FILE`
    ///
    /// # Errors
    ///
    /// Returns an error if neither source yields a non-empty token. A missing
    /// credential is a startup failure; there is no degraded mode.
    pub fn telegram_bot_token(&self) -> anyhow::Result<String> {
        if let Ok(token) = env::var("TELEGRAM_BOT_TOKEN") {
            let token = token.trim().to_string();
            if !token.is_empty() {
                return Ok(token);
            }
        }

        if let Ok(path) = env::var("TELEGRAM_BOT_TOKEN_FILE") {
            let token = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read Telegram bot token file {path}"))?
                .trim()
                .to_string();
            if token.is_empty() {
                bail!("Telegram bot token file {path} is empty");
            }
            return Ok(token);
        }

        bail!("Telegram bot token is not configured (set TELEGRAM_BOT_TOKEN or TELEGRAM_BOT_TOKEN_FILE)")
    }

    /// Returns the pending-view poll interval in milliseconds
    #[must_use]
    pub fn poll_interval_ms(&self) -> u64 {
        env::var("OUTBOX_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(2000)
    }

    /// Returns the initial reconnection delay in milliseconds
    #[must_use]
    pub fn reconnect_delay_ms(&self) -> u64 {
        env::var("FEED_RECONNECT_DELAY_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1000)
    }

    /// Returns the maximum reconnection delay in milliseconds
    #[must_use]
    pub fn max_reconnect_delay_ms(&self) -> u64 {
        env::var("FEED_MAX_RECONNECT_DELAY_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60000)
    }

    /// Returns the number of entry processors for this environment
    #[must_use]
    pub const fn num_entry_processors(&self) -> usize {
        match self {
            Self::Production => 8,
            Self::Staging => 4,
            Self::Development { .. } => 2,
        }
    }

    /// Returns the entry channel capacity (2 * processors)
    #[must_use]
    pub const fn entry_channel_capacity(&self) -> usize {
        self.num_entry_processors() * 2
    }
}
