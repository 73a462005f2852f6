//! Scrape run orchestration: pacing, the bounded worker pool, webhook events
//! and the state machine that ties them together.

pub mod events;
pub mod orchestrator;
pub mod pacing;
pub mod pool;

pub use events::{EventEmitter, PipelineEvent, WebhookEmitter};
pub use orchestrator::{PipelineOrchestrator, PipelineSettings, PipelineState, RunSummary};
pub use pacing::PacingPolicy;
pub use pool::{BoundedWorkerPool, TaskOutcome};
