use crate::error::ScoutError;
use crate::models::{CandidateLink, PropertyResult};
use crate::pipeline::events::{EventEmitter, PipelineEvent};
use crate::pipeline::pacing::PacingPolicy;
use crate::pipeline::pool::{BoundedWorkerPool, TaskOutcome};
use crate::scrapers::discovery::LinkDiscoveryChain;
use crate::scrapers::extract::ExtractionStrategyChain;
use crate::scrapers::traits::{render_document, Renderer, SessionConnector};
use crate::scrapers::types::SearchRequest;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Lifecycle of one scrape run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Validating,
    Discovering,
    Extracting,
    Summarizing,
    Done,
    Aborted,
}

impl PipelineState {
    pub fn can_advance_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (Done | Aborted, _) => false,
            (_, Aborted) => true,
            (Idle, Validating)
            | (Validating, Discovering)
            | (Discovering, Extracting)
            | (Discovering, Summarizing)
            | (Extracting, Summarizing)
            | (Summarizing, Done) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Aborted)
    }
}

/// Knobs the pipeline takes from configuration
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    /// Maximum listing pages scraped at the same time
    pub concurrency: usize,
    /// Per-navigation timeout
    pub nav_timeout: Duration,
    /// Wait after each listing before its worker slot frees up
    pub politeness: PacingPolicy,
    /// Wait after a page loads before its HTML is read
    pub settle: PacingPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            concurrency: 1,
            nav_timeout: Duration::from_millis(45_000),
            politeness: PacingPolicy::from_millis(2000, 2000),
            settle: PacingPolicy::from_millis(1500, 1500),
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub state: PipelineState,
    pub total_candidates: usize,
    pub total_scraped: usize,
    pub successful_scrapes: usize,
}

/// Run-scoped bookkeeping. Lives only for one call to `run`.
struct PipelineRun {
    state: PipelineState,
    total_candidates: usize,
    total_scraped: usize,
    successful_scrapes: usize,
}

impl PipelineRun {
    fn new() -> Self {
        Self {
            state: PipelineState::Idle,
            total_candidates: 0,
            total_scraped: 0,
            successful_scrapes: 0,
        }
    }

    fn advance(&mut self, next: PipelineState) {
        if !self.state.can_advance_to(next) {
            warn!(from = ?self.state, to = ?next, "Unexpected pipeline transition");
        }
        debug!(from = ?self.state, to = ?next, "Pipeline transition");
        self.state = next;
    }

    fn summary(&self) -> RunSummary {
        RunSummary {
            state: self.state,
            total_candidates: self.total_candidates,
            total_scraped: self.total_scraped,
            successful_scrapes: self.successful_scrapes,
        }
    }
}

/// Discovery, bounded extraction and event delivery for a search request
pub struct PipelineOrchestrator {
    connector: Arc<dyn SessionConnector>,
    discovery: LinkDiscoveryChain,
    extractor: Arc<ExtractionStrategyChain>,
    emitter: Arc<dyn EventEmitter>,
    settings: PipelineSettings,
}

impl PipelineOrchestrator {
    pub fn new(
        connector: Arc<dyn SessionConnector>,
        discovery: LinkDiscoveryChain,
        emitter: Arc<dyn EventEmitter>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            connector,
            discovery,
            extractor: Arc::new(ExtractionStrategyChain::default()),
            emitter,
            settings,
        }
    }

    pub fn with_extractor(mut self, extractor: ExtractionStrategyChain) -> Self {
        self.extractor = Arc::new(extractor);
        self
    }

    /// Run the whole pipeline for `request`.
    ///
    /// Returns `RequestValidation` without emitting anything when the request
    /// is unusable, and `FatalOrchestration` after emitting an `error` event
    /// when no rendering session can be opened. Everything else is reported
    /// through the webhook and the returned summary.
    #[instrument(skip_all, fields(location = %request.location))]
    pub async fn run(&self, request: SearchRequest) -> Result<RunSummary, ScoutError> {
        let mut run = PipelineRun::new();

        run.advance(PipelineState::Validating);
        let webhook_url = match request.validate() {
            Ok(url) => url.to_string(),
            Err(e) => {
                run.advance(PipelineState::Aborted);
                return Err(e);
            }
        };

        run.advance(PipelineState::Discovering);
        let renderer = match self.connector.connect().await {
            Ok(renderer) => renderer,
            Err(e) => {
                let fatal = ScoutError::FatalOrchestration(format!(
                    "Failed to open rendering session: {:#}",
                    e
                ));
                error!("Scrape error: {}", fatal);
                run.advance(PipelineState::Aborted);
                self.emitter
                    .emit(&webhook_url, &PipelineEvent::error(fatal.to_string()))
                    .await;
                return Err(fatal);
            }
        };

        self.drive(&mut run, renderer.clone(), &request, &webhook_url)
            .await;
        renderer.disconnect().await;

        let summary = run.summary();
        info!(
            candidates = summary.total_candidates,
            successful = summary.successful_scrapes,
            "✅ Scraping completed"
        );
        Ok(summary)
    }

    async fn drive(
        &self,
        run: &mut PipelineRun,
        renderer: Arc<dyn Renderer>,
        request: &SearchRequest,
        webhook_url: &str,
    ) {
        let links = self.discovery.discover(renderer.as_ref(), request).await;
        run.total_candidates = links.len();

        self.emitter
            .emit(webhook_url, &PipelineEvent::started(request, links.len()))
            .await;

        if links.is_empty() {
            run.advance(PipelineState::Summarizing);
            self.emitter
                .emit(webhook_url, &PipelineEvent::no_candidates())
                .await;
            run.advance(PipelineState::Done);
            return;
        }

        run.advance(PipelineState::Extracting);
        let total = links.len();
        let pool = BoundedWorkerPool::new(self.settings.concurrency, self.settings.politeness);
        let extractor = self.extractor.clone();
        let nav_timeout = self.settings.nav_timeout;
        let settle = self.settings.settle;

        let mut tasks = pool.spawn(links, move |link| {
            scrape_listing(renderer.clone(), extractor.clone(), link, nav_timeout, settle)
        });

        while let Some(outcome) = tasks.next().await {
            run.total_scraped += 1;
            if outcome.succeeded {
                run.successful_scrapes += 1;
            }
            let event = PipelineEvent::property(run.total_scraped, total, outcome.result);
            self.emitter.emit(webhook_url, &event).await;
        }

        run.advance(PipelineState::Summarizing);
        self.emitter
            .emit(
                webhook_url,
                &PipelineEvent::completed(run.total_scraped, run.successful_scrapes),
            )
            .await;
        run.advance(PipelineState::Done);
    }
}

/// Load one listing page in its own tab and extract what it offers
pub async fn scrape_listing(
    renderer: Arc<dyn Renderer>,
    extractor: Arc<ExtractionStrategyChain>,
    link: CandidateLink,
    nav_timeout: Duration,
    settle: PacingPolicy,
) -> TaskOutcome {
    info!(url = %link.url, "Scraping");

    match render_document(renderer.as_ref(), &link.url, nav_timeout, &settle).await {
        Ok(snapshot) => {
            let record = extractor.extract(&snapshot);
            if record.is_empty() {
                debug!(url = %link.url, "Page yielded no listing fields");
            }
            TaskOutcome::succeeded(PropertyResult::new(link.url, record))
        }
        Err(source) => {
            let error = ScoutError::ExtractionTask {
                url: link.url.clone(),
                source,
            };
            warn!("{}", error);
            TaskOutcome::failed(link.url)
        }
    }
}
