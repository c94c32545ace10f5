use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub live_channel_url: String,
    pub credential_store_path: String,
    pub credential_key: String,
    pub live_feed_capacity: usize,
    pub http_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

/// Backoff settings for the live channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_reconnects: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// A connection that stays up this long, or delivers a frame, clears the
    /// failure count.
    pub stable_after: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_reconnects: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            stable_after: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the given (1-based) retry attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = ReconnectPolicy::default();
        Ok(Self {
            api_base_url: env::var("API_BASE_URL").context("API_BASE_URL must be set")?,
            live_channel_url: env::var("LIVE_CHANNEL_URL")
                .context("LIVE_CHANNEL_URL must be set")?,
            credential_store_path: env::var("CREDENTIAL_STORE_PATH")
                .unwrap_or_else(|_| "./session.json".to_string()),
            credential_key: env::var("CREDENTIAL_KEY")
                .unwrap_or_else(|_| "access_token".to_string()),
            live_feed_capacity: parse_var("LIVE_FEED_CAPACITY", 200)?,
            http_timeout: Duration::from_secs(parse_var("HTTP_TIMEOUT_SECS", 10)?),
            reconnect: ReconnectPolicy {
                max_reconnects: parse_var("MAX_RECONNECTS", defaults.max_reconnects)?,
                base_delay: Duration::from_millis(parse_var("RECONNECT_BASE_DELAY_MS", 1000)?),
                max_delay: Duration::from_secs(parse_var("RECONNECT_MAX_DELAY_SECS", 60)?),
                stable_after: Duration::from_secs(parse_var("RECONNECT_STABLE_SECS", 30)?),
            },
        })
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a number, got {:?}", name, raw)),
        Err(_) => Ok(default),
    }
}
