use crate::scrapers::traits::{RenderPage, Renderer, SessionConnector};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use headless_chrome::{Browser, Tab};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// How long the websocket may sit without browser events before it is dropped.
/// Politeness delays can leave every tab idle for several seconds at a time.
const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(300);

/// Connects to a remote Chrome (Browserless style) over the DevTools websocket
pub struct BrowserlessConnector {
    endpoint: String,
    token: String,
    user_agent: String,
}

impl BrowserlessConnector {
    pub fn new(
        endpoint: impl Into<String>,
        token: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: token.into(),
            user_agent: user_agent.into(),
        }
    }

    /// Endpoint with the access token appended as a query parameter
    pub fn websocket_url(&self) -> Result<String> {
        let mut url = Url::parse(&self.endpoint)
            .with_context(|| format!("Invalid browser endpoint: {}", self.endpoint))?;
        url.query_pairs_mut().append_pair("token", &self.token);
        Ok(url.into())
    }
}

#[async_trait]
impl SessionConnector for BrowserlessConnector {
    async fn connect(&self) -> Result<Arc<dyn Renderer>> {
        let ws_url = self.websocket_url()?;
        info!(endpoint = %self.endpoint, "Connecting to remote Chrome...");

        let browser = tokio::task::spawn_blocking(move || {
            Browser::connect_with_timeout(ws_url, IDLE_BROWSER_TIMEOUT)
        })
        .await
        .context("Browser connect task failed")?
        .context("Failed to connect to remote Chrome")?;

        info!("Connected to remote Chrome");
        Ok(Arc::new(ChromeRenderer::new(browser, self.user_agent.clone())))
    }
}

/// Rendering session backed by a `headless_chrome` browser connection
pub struct ChromeRenderer {
    browser: Mutex<Option<Browser>>,
    user_agent: String,
}

impl ChromeRenderer {
    pub fn new(browser: Browser, user_agent: String) -> Self {
        Self {
            browser: Mutex::new(Some(browser)),
            user_agent,
        }
    }

    fn browser(&self) -> Result<Browser> {
        self.browser
            .lock()
            .map_err(|_| anyhow!("Browser handle lock poisoned"))?
            .clone()
            .ok_or_else(|| anyhow!("Browser session already disconnected"))
    }
}

#[async_trait]
impl Renderer for ChromeRenderer {
    async fn open_page(&self) -> Result<Box<dyn RenderPage>> {
        let browser = self.browser()?;
        let user_agent = self.user_agent.clone();

        let tab = tokio::task::spawn_blocking(move || -> Result<Arc<Tab>> {
            let tab = browser.new_tab().context("Failed to open tab")?;
            tab.set_user_agent(&user_agent, Some("en-US,en;q=0.9"), None)
                .context("Failed to set user agent")?;
            Ok(tab)
        })
        .await
        .context("Open tab task failed")??;

        Ok(Box::new(ChromePage { tab }))
    }

    async fn disconnect(&self) {
        let browser = match self.browser.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => {
                warn!("Browser handle lock poisoned, leaving session to drop");
                None
            }
        };

        if let Some(browser) = browser {
            // Dropping the last handle closes the websocket, which can block.
            if let Err(e) = tokio::task::spawn_blocking(move || drop(browser)).await {
                warn!("Browser disconnect task failed: {}", e);
            }
            info!("Disconnected from remote Chrome");
        }
    }
}

/// One tab in the remote browser
pub struct ChromePage {
    tab: Arc<Tab>,
}

#[async_trait]
impl RenderPage for ChromePage {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()> {
        let tab = self.tab.clone();
        let url = url.to_string();

        tokio::task::spawn_blocking(move || -> Result<()> {
            tab.set_default_timeout(timeout);
            tab.navigate_to(&url)?;
            tab.wait_until_navigated()?;
            Ok(())
        })
        .await
        .context("Navigation task failed")?
    }

    async fn content(&self) -> Result<String> {
        let tab = self.tab.clone();

        tokio::task::spawn_blocking(move || -> Result<String> {
            let html_result = tab.evaluate("document.documentElement.outerHTML", false)?;
            match html_result.value {
                Some(value) => Ok(value.as_str().unwrap_or("").to_string()),
                None => {
                    warn!("Could not get HTML from page");
                    Ok(String::new())
                }
            }
        })
        .await
        .context("Content task failed")?
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let tab = self.tab;

        let closed = tokio::task::spawn_blocking(move || tab.close(true))
            .await
            .context("Close task failed")??;
        debug!(closed, "Closed tab");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_url_carries_token() {
        let connector =
            BrowserlessConnector::new("wss://chrome.browserless.io", "secret token", "ua");
        let url = connector.websocket_url().unwrap();

        assert!(url.starts_with("wss://chrome.browserless.io"));
        assert!(url.ends_with("?token=secret+token"));
    }

    #[test]
    fn test_websocket_url_keeps_existing_query() {
        let connector =
            BrowserlessConnector::new("wss://example.test/chrome?blockAds=true", "t", "ua");
        assert_eq!(
            connector.websocket_url().unwrap(),
            "wss://example.test/chrome?blockAds=true&token=t"
        );
    }

    #[test]
    fn test_default_endpoint_keeps_stealth_flags() {
        let connector =
            BrowserlessConnector::new(crate::config::DEFAULT_BROWSERLESS_ENDPOINT, "t", "ua");
        assert_eq!(
            connector.websocket_url().unwrap(),
            "wss://chrome.browserless.io/?stealth=true&blockAds=true&token=t"
        );
    }

    #[test]
    fn test_invalid_endpoint_is_an_error() {
        let connector = BrowserlessConnector::new("not a url", "t", "ua");
        assert!(connector.websocket_url().is_err());
    }
}
