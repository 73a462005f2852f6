use crate::pipeline::orchestrator::PipelineSettings;
use crate::pipeline::pacing::PacingPolicy;
use clap::Parser;
use std::time::Duration;

/// Remote browser with stealth mode and ad blocking on
pub const DEFAULT_BROWSERLESS_ENDPOINT: &str = "wss://chrome.browserless.io?stealth=true&blockAds=true";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Service configuration, from flags or the environment
#[derive(Debug, Clone, Parser)]
#[command(name = "listing-scout", version, about = "Realtor.ca listing scraper with webhook delivery")]
pub struct Config {
    /// Port the HTTP server listens on
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Listing pages scraped at the same time
    #[arg(long, env = "CONCURRENCY", default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub concurrency: u32,

    /// Navigation timeout in milliseconds
    #[arg(long = "nav-timeout", env = "NAV_TIMEOUT", default_value_t = 45_000)]
    pub nav_timeout_ms: u64,

    /// Access token for the remote browser service
    #[arg(long, env = "BROWSERLESS_TOKEN", hide_env_values = true)]
    pub browserless_token: Option<String>,

    /// DevTools websocket endpoint of the remote browser service
    #[arg(long, env = "BROWSERLESS_ENDPOINT", default_value = DEFAULT_BROWSERLESS_ENDPOINT)]
    pub browserless_endpoint: String,

    #[arg(long, env = "USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Minimum politeness delay after each listing, in milliseconds
    #[arg(long = "polite-delay", env = "POLITE_DELAY_MS", default_value_t = 2000)]
    pub polite_delay_ms: u64,

    /// Random extra politeness delay, in milliseconds
    #[arg(long = "polite-jitter", env = "POLITE_JITTER_MS", default_value_t = 2000)]
    pub polite_jitter_ms: u64,

    /// Minimum wait after a page loads before reading it, in milliseconds
    #[arg(long = "settle-delay", env = "SETTLE_DELAY_MS", default_value_t = 1500)]
    pub settle_delay_ms: u64,

    /// Random extra settle wait, in milliseconds
    #[arg(long = "settle-jitter", env = "SETTLE_JITTER_MS", default_value_t = 1500)]
    pub settle_jitter_ms: u64,

    /// Timeout for each webhook POST, in milliseconds
    #[arg(long = "webhook-timeout", env = "WEBHOOK_TIMEOUT_MS", default_value_t = 10_000)]
    pub webhook_timeout_ms: u64,
}

impl Config {
    /// Token if one is set and not blank
    pub fn browserless_token(&self) -> Option<&str> {
        self.browserless_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }

    pub fn nav_timeout(&self) -> Duration {
        Duration::from_millis(self.nav_timeout_ms)
    }

    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_millis(self.webhook_timeout_ms)
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            concurrency: self.concurrency as usize,
            nav_timeout: self.nav_timeout(),
            politeness: PacingPolicy::from_millis(self.polite_delay_ms, self.polite_jitter_ms),
            settle: PacingPolicy::from_millis(self.settle_delay_ms, self.settle_jitter_ms),
        }
    }
}
