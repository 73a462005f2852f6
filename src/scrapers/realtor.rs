use crate::pipeline::pacing::PacingPolicy;
use crate::scrapers::traits::{render_document, DiscoveryStrategy, Renderer};
use crate::scrapers::types::SearchRequest;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, info};
use url::{form_urlencoded, Url};

const LISTING_HOST: &str = "realtor.ca";
const LISTING_PATH_PREFIX: &str = "/real-estate/";

/// Query parameters search engines use to wrap the real destination of a result
const REDIRECT_PARAMS: [&str; 3] = ["q", "url", "uddg"];

/// Web search engines tried before falling back to the listing site itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchEngine {
    Google,
    Bing,
    DuckDuckGo,
}

impl SearchEngine {
    pub fn name(&self) -> &'static str {
        match self {
            SearchEngine::Google => "google",
            SearchEngine::Bing => "bing",
            SearchEngine::DuckDuckGo => "duckduckgo",
        }
    }

    pub fn search_url(&self, query: &str) -> Result<Url> {
        let url = match self {
            SearchEngine::Google => Url::parse_with_params(
                "https://www.google.com/search",
                &[("q", query), ("num", "20")],
            ),
            SearchEngine::Bing => Url::parse_with_params(
                "https://www.bing.com/search",
                &[("q", query), ("count", "30")],
            ),
            SearchEngine::DuckDuckGo => {
                Url::parse_with_params("https://html.duckduckgo.com/html/", &[("q", query)])
            }
        };
        url.context("Failed to build search URL")
    }
}

/// Finds listings by running a `site:realtor.ca` query on a search engine
pub struct SearchEngineStrategy {
    engine: SearchEngine,
    nav_timeout: Duration,
    settle: PacingPolicy,
}

impl SearchEngineStrategy {
    pub fn new(engine: SearchEngine, nav_timeout: Duration, settle: PacingPolicy) -> Self {
        Self {
            engine,
            nav_timeout,
            settle,
        }
    }
}

#[async_trait]
impl DiscoveryStrategy for SearchEngineStrategy {
    fn name(&self) -> &'static str {
        self.engine.name()
    }

    async fn find_links(
        &self,
        renderer: &dyn Renderer,
        request: &SearchRequest,
    ) -> Result<Vec<String>> {
        let search_url = self.engine.search_url(&request.search_query())?;
        info!(engine = self.name(), url = %search_url, "Searching");

        let snapshot =
            render_document(renderer, search_url.as_str(), self.nav_timeout, &self.settle).await?;
        let links = extract_listing_links(&snapshot.html, &snapshot.url)?;

        info!(engine = self.name(), found = links.len(), "Search finished");
        Ok(links)
    }
}

/// Loads the realtor.ca map page for the location directly.
///
/// This page ignores the bedroom and budget filters and always uses the
/// Edmonton-area map bounds, so results for other regions depend on how the
/// site recentres the map.
pub struct RealtorListingStrategy {
    nav_timeout: Duration,
    settle: PacingPolicy,
}

impl RealtorListingStrategy {
    pub fn new(nav_timeout: Duration, settle: PacingPolicy) -> Self {
        Self {
            nav_timeout,
            settle,
        }
    }

    pub fn listing_url(request: &SearchRequest) -> String {
        let mut center = request.location.clone();
        if let Some(province) = request.province.as_deref().filter(|p| !p.is_empty()) {
            center.push_str(", ");
            center.push_str(province);
        }
        center.push_str(", Canada");

        format!(
            "https://www.realtor.ca/map#ZoomLevel=13&Center={}&LatitudeMax=53.7&LongitudeMax=-113.3&LatitudeMin=53.4&LongitudeMin=-113.7&Sort=6-D&PropertyTypeGroupID=1&PropertySearchTypeId=1&TransactionTypeId=2&Currency=CAD",
            encode_component(&center)
        )
    }
}

#[async_trait]
impl DiscoveryStrategy for RealtorListingStrategy {
    fn name(&self) -> &'static str {
        "realtor-listing"
    }

    async fn find_links(
        &self,
        renderer: &dyn Renderer,
        request: &SearchRequest,
    ) -> Result<Vec<String>> {
        let listing_url = Self::listing_url(request);
        info!(url = %listing_url, "Trying direct realtor.ca search");

        let snapshot =
            render_document(renderer, &listing_url, self.nav_timeout, &self.settle).await?;
        let links = extract_listing_links(&snapshot.html, &snapshot.url)?;

        info!(found = links.len(), "realtor.ca search finished");
        Ok(links)
    }
}

/// Google, Bing, DuckDuckGo, then the realtor.ca map page
pub fn default_strategies(
    nav_timeout: Duration,
    settle: PacingPolicy,
) -> Vec<Box<dyn DiscoveryStrategy>> {
    vec![
        Box::new(SearchEngineStrategy::new(SearchEngine::Google, nav_timeout, settle))
            as Box<dyn DiscoveryStrategy>,
        Box::new(SearchEngineStrategy::new(SearchEngine::Bing, nav_timeout, settle)),
        Box::new(SearchEngineStrategy::new(SearchEngine::DuckDuckGo, nav_timeout, settle)),
        Box::new(RealtorListingStrategy::new(nav_timeout, settle)),
    ]
}

/// Every anchor on the page that leads to a realtor.ca listing, in page order.
///
/// Relative hrefs are resolved against `base_url`, search-engine redirect
/// wrappers are unwrapped and query strings and fragments are dropped.
pub fn extract_listing_links(html: &str, base_url: &str) -> Result<Vec<String>> {
    let document = Html::parse_document(html);
    let anchor_selector =
        Selector::parse("a[href]").map_err(|e| anyhow!("Invalid anchor selector: {}", e))?;
    let base = Url::parse(base_url).ok();

    let mut links = Vec::new();
    for anchor in document.select(&anchor_selector) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };

        let resolved = match &base {
            Some(base) => base.join(href),
            None => Url::parse(href),
        };
        let Ok(resolved) = resolved else {
            debug!(href, "Skipping unparseable href");
            continue;
        };

        let mut target = unwrap_redirect(resolved);
        if !is_listing_url(&target) {
            continue;
        }
        target.set_query(None);
        target.set_fragment(None);
        links.push(target.to_string());
    }

    Ok(links)
}

fn is_listing_url(url: &Url) -> bool {
    let on_site = url
        .host_str()
        .map(|host| host == LISTING_HOST || host.ends_with(".realtor.ca"))
        .unwrap_or(false);
    on_site && url.path().starts_with(LISTING_PATH_PREFIX)
}

fn unwrap_redirect(url: Url) -> Url {
    if is_listing_url(&url) {
        return url;
    }
    url.query_pairs()
        .filter(|(key, _)| REDIRECT_PARAMS.iter().any(|param| key == param))
        .filter_map(|(_, value)| Url::parse(&value).ok())
        .find(|inner| matches!(inner.scheme(), "http" | "https"))
        .unwrap_or(url)
}

/// Percent-encode like a URI component (spaces as `%20`)
fn encode_component(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
