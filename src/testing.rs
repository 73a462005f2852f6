//! In-memory stand-ins for the browser, the webhook and discovery strategies.

use crate::pipeline::events::{EventEmitter, PipelineEvent};
use crate::scrapers::traits::{DiscoveryStrategy, RenderPage, Renderer, SessionConnector};
use crate::scrapers::types::SearchRequest;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How a fake page behaves when navigated to
#[derive(Debug, Clone)]
pub enum PageScript {
    Html(String),
    Slow(Duration, String),
    Fail,
}

impl PageScript {
    pub fn html(html: &str) -> Self {
        PageScript::Html(html.to_string())
    }
}

#[derive(Default)]
struct RendererState {
    pages: HashMap<String, PageScript>,
    opened: AtomicUsize,
    closed: AtomicUsize,
    open_now: AtomicUsize,
    peak_open: AtomicUsize,
    disconnected: AtomicBool,
}

/// Serves scripted HTML per URL. Unknown URLs fail to navigate.
#[derive(Default)]
pub struct FakeRenderer {
    state: Arc<RendererState>,
}

impl FakeRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only valid before the renderer is shared
    pub fn with_page(mut self, url: &str, script: PageScript) -> Self {
        if let Some(state) = Arc::get_mut(&mut self.state) {
            state.pages.insert(url.to_string(), script);
        }
        self
    }

    pub fn opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    pub fn peak_open(&self) -> usize {
        self.state.peak_open.load(Ordering::SeqCst)
    }

    pub fn is_disconnected(&self) -> bool {
        self.state.disconnected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn open_page(&self) -> Result<Box<dyn RenderPage>> {
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        let now = self.state.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.peak_open.fetch_max(now, Ordering::SeqCst);

        Ok(Box::new(FakePage {
            state: self.state.clone(),
            html: None,
        }))
    }

    async fn disconnect(&self) {
        self.state.disconnected.store(true, Ordering::SeqCst);
    }
}

struct FakePage {
    state: Arc<RendererState>,
    html: Option<String>,
}

#[async_trait]
impl RenderPage for FakePage {
    async fn navigate(&mut self, url: &str, _timeout: Duration) -> Result<()> {
        match self.state.pages.get(url).cloned() {
            Some(PageScript::Html(html)) => self.html = Some(html),
            Some(PageScript::Slow(delay, html)) => {
                tokio::time::sleep(delay).await;
                self.html = Some(html);
            }
            Some(PageScript::Fail) | None => {
                return Err(anyhow!("net::ERR_CONNECTION_RESET at {}", url));
            }
        }
        Ok(())
    }

    async fn content(&self) -> Result<String> {
        self.html.clone().ok_or_else(|| anyhow!("no document loaded"))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
        self.state.open_now.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out a shared `FakeRenderer`, or refuses like a bad credential would
pub struct FakeConnector {
    renderer: Option<Arc<FakeRenderer>>,
    connects: Arc<AtomicUsize>,
}

impl FakeConnector {
    pub fn new(renderer: Arc<FakeRenderer>) -> Self {
        Self {
            renderer: Some(renderer),
            connects: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn refusing() -> Self {
        Self {
            renderer: None,
            connects: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn connects(&self) -> Arc<AtomicUsize> {
        self.connects.clone()
    }
}

#[async_trait]
impl SessionConnector for FakeConnector {
    async fn connect(&self) -> Result<Arc<dyn Renderer>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match &self.renderer {
            Some(renderer) => Ok(renderer.clone() as Arc<dyn Renderer>),
            None => Err(anyhow!("connection refused")),
        }
    }
}

/// Keeps every emitted event with its target URL
#[derive(Default)]
pub struct RecordingEmitter {
    events: Mutex<Vec<(String, PipelineEvent)>>,
}

impl RecordingEmitter {
    pub fn events(&self) -> Vec<(String, PipelineEvent)> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events().iter().map(|(_, e)| e.kind()).collect()
    }
}

#[async_trait]
impl EventEmitter for RecordingEmitter {
    async fn emit(&self, webhook_url: &str, event: &PipelineEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push((webhook_url.to_string(), event.clone()));
        }
    }
}

/// Discovery strategy with a canned answer
pub struct ScriptedStrategy {
    name: &'static str,
    outcome: std::result::Result<Vec<String>, String>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedStrategy {
    pub fn found(name: &'static str, urls: &[&str]) -> Self {
        Self {
            name,
            outcome: Ok(urls.iter().map(|u| u.to_string()).collect()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(name: &'static str) -> Self {
        Self {
            name,
            outcome: Err("navigation timeout".to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl DiscoveryStrategy for ScriptedStrategy {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn find_links(
        &self,
        _renderer: &dyn Renderer,
        _request: &SearchRequest,
    ) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone().map_err(|e| anyhow!(e))
    }
}
