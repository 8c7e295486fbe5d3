//! Environment-driven configuration
//!
//! Values come from the process environment, after `.env` has been loaded by
//! `main`. Every key has a default so a bare checkout runs against the public
//! storefront with a local SQLite file.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Semaphore;

use crate::models::DEFAULT_MARKDOWN;

pub const DEFAULT_WORKERS: usize = 5;
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(600);

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Output format of the log subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "dev" => Ok(Self::Text),
            "json" | "prod" => Ok(Self::Json),
            other => Err(format!("unknown log format {other:?}")),
        }
    }
}

/// Settings for the browser-backed fetcher
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Storefront origin without trailing slash
    pub base_url: String,
    pub page_timeout: Duration,
    /// Pause after load so deferred rendering can finish
    pub settle_delay: Duration,
    pub http_timeout: Duration,
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            base_url: "https://store77.net".to_string(),
            page_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_secs(3),
            http_timeout: Duration::from_secs(15),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Settings for the scrape cycle itself
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub interval: Duration,
    pub workers: usize,
    pub markdown: i64,
    pub fetch_descriptions: bool,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            workers: DEFAULT_WORKERS,
            markdown: DEFAULT_MARKDOWN,
            fetch_descriptions: false,
        }
    }
}

impl HarvestConfig {
    /// Cycle period; zero falls back to [`DEFAULT_INTERVAL`].
    pub fn period(&self) -> Duration {
        if self.interval.is_zero() {
            DEFAULT_INTERVAL
        } else {
            self.interval
        }
    }

    /// Worker pool size, kept within what a semaphore can hold.
    pub fn worker_slots(&self) -> usize {
        self.workers.clamp(1, Semaphore::MAX_PERMITS)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub log_level: String,
    pub log_format: LogFormat,
    pub fetcher: FetcherConfig,
    pub harvest: HarvestConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, which keeps tests off
    /// the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let fetcher_defaults = FetcherConfig::default();
        let harvest_defaults = HarvestConfig::default();

        let workers: i64 = parse_or(&lookup, "SCRAPE_WORKERS", DEFAULT_WORKERS as i64)?;
        let workers = usize::try_from(workers)
            .ok()
            .filter(|w| *w > 0)
            .unwrap_or(DEFAULT_WORKERS)
            .min(Semaphore::MAX_PERMITS);

        let interval = match parse_or(&lookup, "SCRAPE_INTERVAL_SECS", 600)? {
            0 => DEFAULT_INTERVAL,
            secs => Duration::from_secs(secs),
        };

        Ok(Self {
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| "sqlite:catalog.db".to_string()),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info,sqlx=warn".to_string()),
            log_format: parse_or(&lookup, "LOG_FORMAT", LogFormat::Text)?,
            fetcher: FetcherConfig {
                base_url: lookup("BASE_URL")
                    .map(|url| url.trim_end_matches('/').to_string())
                    .unwrap_or(fetcher_defaults.base_url),
                page_timeout: Duration::from_secs(parse_or(&lookup, "PAGE_TIMEOUT_SECS", 30)?),
                settle_delay: Duration::from_millis(parse_or(&lookup, "SETTLE_DELAY_MS", 3000)?),
                http_timeout: Duration::from_secs(parse_or(&lookup, "HTTP_TIMEOUT_SECS", 15)?),
                user_agent: lookup("USER_AGENT").unwrap_or(fetcher_defaults.user_agent),
            },
            harvest: HarvestConfig {
                interval,
                workers,
                markdown: parse_or(&lookup, "PRICE_MARKDOWN", harvest_defaults.markdown)?,
                fetch_descriptions: parse_or(&lookup, "FETCH_DESCRIPTIONS", false)?,
            },
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("invalid value {raw:?} for {key}")),
        _ => Ok(default),
    }
}
