//! Server configuration loaded from environment variables.
//!
//! Every setting has a default, so the server starts with no configuration
//! at all: memory store, local attachments, port 3000.

use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::services::ChatSettings;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Env: `HTTP_ADDR`. Default: `0.0.0.0:3000`
    pub http_addr: SocketAddr,

    /// Env: `DATABASE_URL`. Unset selects the in-memory store.
    pub database_url: Option<String>,

    /// Env: `DB_MAX_CONNECTIONS`. Default: `20`
    pub db_max_connections: u32,

    /// Env: `BLOB_STORAGE_PATH`. Default: `./attachments`
    pub blob_storage_path: PathBuf,

    /// Base of the URLs handed out for stored attachments.
    /// Env: `PUBLIC_BASE_URL`. Default: `http://localhost:3000`
    pub public_base_url: String,

    /// Env: `MAX_ATTACHMENT_BYTES`. Default: 10 MiB
    pub max_attachment_bytes: usize,

    /// Env: `MATCH_CANDIDATE_WINDOW`. Default: `5`
    pub candidate_window: usize,

    /// Env: `TX_MAX_ATTEMPTS`. Default: `5`
    pub max_tx_attempts: u32,

    /// Env: `DELIVERY_DELAY_MS`. Default: `1000`
    pub delivery_delay: Duration,

    /// Env: `SWEEP_INTERVAL_SECS`. Default: `300`
    pub sweep_interval: Duration,

    /// Treat users without an open websocket as offline.
    /// Env: `REQUIRE_LIVE_CONNECTION`. Default: `false`
    pub require_live_connection: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        let chat = ChatSettings::default();
        Self {
            http_addr: ([0, 0, 0, 0], 3000).into(),
            database_url: None,
            db_max_connections: 20,
            blob_storage_path: PathBuf::from("./attachments"),
            public_base_url: "http://localhost:3000".to_string(),
            max_attachment_bytes: 10 * 1024 * 1024,
            candidate_window: chat.candidate_window,
            max_tx_attempts: chat.max_tx_attempts,
            delivery_delay: chat.delivery_delay,
            sweep_interval: chat.sweep_interval,
            require_live_connection: false,
        }
    }
}

impl AppConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Self {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!(error = %e, "No .env file loaded");
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable source, falling back to
    /// defaults for missing or invalid values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        parse_into(&lookup, "HTTP_ADDR", &mut config.http_addr);
        config.database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        parse_into(&lookup, "DB_MAX_CONNECTIONS", &mut config.db_max_connections);
        if let Some(path) = lookup("BLOB_STORAGE_PATH") {
            config.blob_storage_path = PathBuf::from(path);
        }
        if let Some(url) = lookup("PUBLIC_BASE_URL") {
            config.public_base_url = url.trim_end_matches('/').to_string();
        }
        parse_into(&lookup, "MAX_ATTACHMENT_BYTES", &mut config.max_attachment_bytes);
        parse_into(&lookup, "MATCH_CANDIDATE_WINDOW", &mut config.candidate_window);
        parse_into(&lookup, "TX_MAX_ATTEMPTS", &mut config.max_tx_attempts);

        let mut delivery_ms = config.delivery_delay.as_millis() as u64;
        parse_into(&lookup, "DELIVERY_DELAY_MS", &mut delivery_ms);
        config.delivery_delay = Duration::from_millis(delivery_ms);

        let mut sweep_secs = config.sweep_interval.as_secs();
        parse_into(&lookup, "SWEEP_INTERVAL_SECS", &mut sweep_secs);
        config.sweep_interval = Duration::from_secs(sweep_secs);

        parse_into(
            &lookup,
            "REQUIRE_LIVE_CONNECTION",
            &mut config.require_live_connection,
        );

        if config.candidate_window == 0 {
            tracing::warn!("MATCH_CANDIDATE_WINDOW must be positive, using 1");
            config.candidate_window = 1;
        }
        if config.sweep_interval.is_zero() {
            tracing::warn!("SWEEP_INTERVAL_SECS must be positive, using default");
            config.sweep_interval = ChatSettings::default().sweep_interval;
        }

        config
    }

    pub fn chat_settings(&self) -> ChatSettings {
        ChatSettings {
            candidate_window: self.candidate_window,
            max_tx_attempts: self.max_tx_attempts,
            delivery_delay: self.delivery_delay,
            sweep_interval: self.sweep_interval,
        }
    }
}

fn parse_into<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, target: &mut T)
where
    T: FromStr,
    T::Err: Display,
{
    let Some(raw) = lookup(name) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => *target = value,
        Err(e) => tracing::warn!(variable = name, value = %raw, error = %e, "Invalid value, using default"),
    }
}
