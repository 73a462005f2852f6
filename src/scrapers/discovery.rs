use crate::error::ScoutError;
use crate::models::CandidateLink;
use crate::scrapers::traits::{DiscoveryStrategy, Renderer};
use crate::scrapers::types::SearchRequest;
use std::collections::HashSet;
use tracing::{info, warn};

/// Tries discovery strategies in priority order until one finds links.
///
/// The first strategy always runs. Later ones only run when the request
/// allows fallback and everything before them came back empty. Links from
/// different strategies are never merged.
pub struct LinkDiscoveryChain {
    strategies: Vec<Box<dyn DiscoveryStrategy>>,
}

impl LinkDiscoveryChain {
    pub fn new(strategies: Vec<Box<dyn DiscoveryStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Deduplicated candidate links, at most `request.max_results` of them.
    /// Empty when no strategy found anything.
    pub async fn discover(
        &self,
        renderer: &dyn Renderer,
        request: &SearchRequest,
    ) -> Vec<CandidateLink> {
        for (position, strategy) in self.strategies.iter().enumerate() {
            if position > 0 && !request.use_fallback {
                info!("Fallback disabled, stopping discovery");
                break;
            }

            match strategy.find_links(renderer, request).await {
                Ok(links) if !links.is_empty() => {
                    let candidates = dedup_and_cap(links, strategy.name(), request.max_results);
                    info!(
                        strategy = strategy.name(),
                        candidates = candidates.len(),
                        "Final candidate links"
                    );
                    return candidates;
                }
                Ok(_) => {
                    info!(strategy = strategy.name(), "Strategy found no links");
                }
                Err(source) => {
                    let error = ScoutError::DiscoveryStrategy {
                        strategy: strategy.name().to_string(),
                        source,
                    };
                    warn!("{}", error);
                }
            }
        }

        info!("No candidate links found");
        Vec::new()
    }
}

/// Drop repeated URLs keeping first-seen order, then keep the first `max`.
pub fn dedup_and_cap(urls: Vec<String>, strategy: &str, max: usize) -> Vec<CandidateLink> {
    let mut seen = HashSet::new();
    urls.into_iter()
        .filter(|url| seen.insert(url.clone()))
        .take(max)
        .map(|url| CandidateLink {
            url,
            strategy: strategy.to_string(),
        })
        .collect()
}
