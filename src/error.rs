use thiserror::Error;

/// Failures the scrape pipeline can run into.
///
/// Only `RequestValidation` and `Configuration` ever reach the HTTP caller.
/// `FatalOrchestration` ends a run with an `error` event. The rest are
/// recovered where they happen and only show up in logs.
#[derive(Error, Debug)]
pub enum ScoutError {
    #[error("{0}")]
    RequestValidation(String),

    #[error("{0}")]
    Configuration(String),

    #[error("Discovery strategy '{strategy}' failed: {source}")]
    DiscoveryStrategy {
        strategy: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Scraping {url} failed: {source}")]
    ExtractionTask {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Webhook delivery to {url} failed: {reason}")]
    Delivery { url: String, reason: String },

    #[error("{0}")]
    FatalOrchestration(String),
}

/// Failure inside a single extraction method. Never escapes the chain.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Invalid selector: {0}")]
    Selector(String),

    #[error("Malformed embedded state: {0}")]
    EmbeddedState(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}
