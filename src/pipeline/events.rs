use crate::error::ScoutError;
use crate::models::PropertyResult;
use crate::scrapers::types::SearchRequest;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Progress notification POSTed to the caller's webhook
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum PipelineEvent {
    #[serde(rename_all = "camelCase")]
    Started {
        location: String,
        bedrooms: Option<u32>,
        budget: f64,
        total_candidates: usize,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Property {
        index: usize,
        total: usize,
        property: PropertyResult,
    },
    #[serde(rename_all = "camelCase")]
    Completed {
        total_scraped: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        successful_scrapes: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl PipelineEvent {
    pub fn started(request: &SearchRequest, total_candidates: usize) -> Self {
        Self::Started {
            location: request.location.clone(),
            bedrooms: request.bedrooms,
            budget: request.budget,
            total_candidates,
            timestamp: Utc::now(),
        }
    }

    pub fn property(index: usize, total: usize, property: PropertyResult) -> Self {
        Self::Property {
            index,
            total,
            property,
        }
    }

    pub fn completed(total_scraped: usize, successful_scrapes: usize) -> Self {
        Self::Completed {
            total_scraped,
            successful_scrapes: Some(successful_scrapes),
            message: None,
            timestamp: Utc::now(),
        }
    }

    /// Terminal event for a run where discovery found nothing
    pub fn no_candidates() -> Self {
        Self::Completed {
            total_scraped: 0,
            successful_scrapes: None,
            message: Some("No properties found. Try different search criteria.".to_string()),
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::Property { .. } => "property",
            Self::Completed { .. } => "completed",
            Self::Error { .. } => "error",
        }
    }
}

/// Delivers pipeline events to a consumer.
///
/// Delivery is best-effort: implementations log failures and never return them.
#[async_trait]
pub trait EventEmitter: Send + Sync {
    async fn emit(&self, webhook_url: &str, event: &PipelineEvent);
}

/// POSTs events as JSON to the request's webhook URL. No retries.
pub struct WebhookEmitter {
    client: Client,
}

impl WebhookEmitter {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create webhook HTTP client")?;

        Ok(Self { client })
    }

    /// Single delivery attempt. Non-2xx responses count as failures.
    pub async fn deliver(&self, webhook_url: &str, event: &PipelineEvent) -> Result<(), ScoutError> {
        let delivery_error = |reason: String| ScoutError::Delivery {
            url: webhook_url.to_string(),
            reason,
        };

        let response = self
            .client
            .post(webhook_url)
            .json(event)
            .send()
            .await
            .map_err(|e| delivery_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(delivery_error(format!("webhook returned status {}", status)));
        }

        Ok(())
    }
}

#[async_trait]
impl EventEmitter for WebhookEmitter {
    async fn emit(&self, webhook_url: &str, event: &PipelineEvent) {
        match self.deliver(webhook_url, event).await {
            Ok(()) => debug!(event = event.kind(), "Webhook delivered"),
            Err(e) => warn!(event = event.kind(), "{}", e),
        }
    }
}
