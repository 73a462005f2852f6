pub mod browser;
pub mod discovery;
pub mod extract;
pub mod realtor;
pub mod traits;
pub mod types;

pub use browser::BrowserlessConnector;
pub use discovery::LinkDiscoveryChain;
pub use extract::ExtractionStrategyChain;
pub use traits::{DiscoveryStrategy, DocumentSnapshot, RenderPage, Renderer, SessionConnector};
pub use types::SearchRequest;
