use crate::pipeline::pacing::PacingPolicy;
use crate::scrapers::types::SearchRequest;
use anyhow::{Context, Result};
use async_trait::async_trait;
use scraper::Html;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Opens a rendering session (a browser connection).
///
/// Failing here is the only fatal condition of a scrape run.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn Renderer>>;
}

/// A connected rendering session. Shared read-only by every task of a run.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Open a fresh, isolated page owned by the caller
    async fn open_page(&self) -> Result<Box<dyn RenderPage>>;

    /// Drop the session connection
    async fn disconnect(&self);
}

/// A single page (tab) inside a rendering session
#[async_trait]
pub trait RenderPage: Send + Sync {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()>;

    /// Current document HTML
    async fn content(&self) -> Result<String>;

    async fn close(self: Box<Self>) -> Result<()>;
}

/// HTML of a rendered page, taken right after it loaded
#[derive(Debug, Clone)]
pub struct DocumentSnapshot {
    pub url: String,
    pub html: String,
}

impl DocumentSnapshot {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }

    pub fn parse(&self) -> Html {
        Html::parse_document(&self.html)
    }
}

/// One way of finding candidate listing URLs for a search
#[async_trait]
pub trait DiscoveryStrategy: Send + Sync {
    /// Name used in logs and on every link the strategy yields
    fn name(&self) -> &'static str;

    /// Raw, possibly repeating, listing URLs for `request`
    async fn find_links(
        &self,
        renderer: &dyn Renderer,
        request: &SearchRequest,
    ) -> Result<Vec<String>>;
}

/// Load `url` in a new page and snapshot it.
///
/// The page is closed on every path, including navigation timeouts.
pub async fn render_document(
    renderer: &dyn Renderer,
    url: &str,
    timeout: Duration,
    settle: &PacingPolicy,
) -> Result<DocumentSnapshot> {
    let mut page = renderer.open_page().await.context("Failed to open page")?;
    let loaded = load_page(page.as_mut(), url, timeout, settle).await;

    if let Err(e) = page.close().await {
        warn!(url, error = %e, "Failed to close page");
    }

    loaded
}

async fn load_page(
    page: &mut dyn RenderPage,
    url: &str,
    timeout: Duration,
    settle: &PacingPolicy,
) -> Result<DocumentSnapshot> {
    debug!(url, "Navigating");
    tokio::time::timeout(timeout, page.navigate(url, timeout))
        .await
        .with_context(|| format!("Navigation timed out after {}ms", timeout.as_millis()))?
        .with_context(|| format!("Failed to navigate to {}", url))?;

    settle.wait().await;

    let html = page.content().await.context("Failed to read page HTML")?;
    debug!(url, bytes = html.len(), "Captured page HTML");

    Ok(DocumentSnapshot::new(url, html))
}
