//! HTTP front door: accepts scrape requests and answers health probes.
//!
//! `POST /scrape-webhook` only validates and acknowledges. The pipeline runs
//! on its own task and reports through the caller's webhook.

use crate::config::Config;
use crate::error::ScoutError;
use crate::pipeline::events::WebhookEmitter;
use crate::pipeline::orchestrator::PipelineOrchestrator;
use crate::scrapers::browser::BrowserlessConnector;
use crate::scrapers::discovery::LinkDiscoveryChain;
use crate::scrapers::realtor::default_strategies;
use crate::scrapers::types::SearchRequest;
use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    /// `None` when no browser credential is configured
    pipeline: Option<Arc<PipelineOrchestrator>>,
}

impl AppState {
    pub fn new(pipeline: Option<Arc<PipelineOrchestrator>>) -> Self {
        Self { pipeline }
    }

    /// Wire the production pipeline from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let Some(token) = config.browserless_token() else {
            warn!("⚠️  BROWSERLESS_TOKEN not set, scrape requests will be refused");
            return Ok(Self::new(None));
        };

        let settings = config.pipeline_settings();
        let connector = BrowserlessConnector::new(
            config.browserless_endpoint.clone(),
            token,
            config.user_agent.clone(),
        );
        let discovery = LinkDiscoveryChain::new(default_strategies(settings.nav_timeout, settings.settle));
        let emitter = WebhookEmitter::new(config.webhook_timeout())?;

        let pipeline = PipelineOrchestrator::new(
            Arc::new(connector),
            discovery,
            Arc::new(emitter),
            settings,
        );
        Ok(Self::new(Some(Arc::new(pipeline))))
    }

    fn browserless_configured(&self) -> bool {
        self.pipeline.is_some()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/scrape-webhook", post(scrape_webhook))
        .with_state(state)
}

/// Serve until the process is stopped
pub async fn start(port: u16, state: AppState) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("🚀 Server running on http://{}", addr);
    axum::serve(listener, router(state))
        .await
        .context("HTTP server failed")?;
    Ok(())
}

async fn scrape_webhook(
    State(state): State<AppState>,
    body: Result<Json<SearchRequest>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return failure(StatusCode::BAD_REQUEST, &unreadable_body(rejection));
        }
    };

    if let Err(e) = request.validate() {
        return failure(StatusCode::BAD_REQUEST, &e);
    }

    let Some(pipeline) = state.pipeline.clone() else {
        let e = ScoutError::Configuration("BROWSERLESS_TOKEN not configured".to_string());
        return failure(StatusCode::INTERNAL_SERVER_ERROR, &e);
    };

    info!(location = %request.location, max_results = request.max_results, "Scrape requested");
    tokio::spawn(async move {
        if let Err(e) = pipeline.run(request).await {
            error!("Scrape run ended early: {}", e);
        }
    });

    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "status": "started",
            "message": "Scraping started in background",
            "usingBrowserless": true,
        })),
    )
}

async fn index(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "running",
        "service": "realtor scraper",
        "browserless": state.browserless_configured(),
        "message": "POST to /scrape-webhook to start scraping",
    }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "browserlessConfigured": state.browserless_configured(),
    }))
}

/// A body that is absent or not JSON carries no webhook. A JSON body with
/// wrongly typed fields is reported as such.
fn unreadable_body(rejection: JsonRejection) -> ScoutError {
    let message = match rejection {
        JsonRejection::MissingJsonContentType(_) | JsonRejection::JsonSyntaxError(_) => {
            "webhookUrl required".to_string()
        }
        other => format!("Invalid request body: {}", other.body_text()),
    };
    debug!(%message, "Rejected scrape request body");
    ScoutError::RequestValidation(message)
}

fn failure(status: StatusCode, error: &ScoutError) -> (StatusCode, Json<Value>) {
    (
        status,
        Json(json!({
            "success": false,
            "error": error.to_string(),
        })),
    )
}
