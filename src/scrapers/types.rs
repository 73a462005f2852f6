use crate::error::ScoutError;
use serde::{Deserialize, Serialize};

/// Search parameters for a scrape run, as posted to `/scrape-webhook`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    /// City or area to search in
    #[serde(default = "default_location")]
    pub location: String,
    /// Number of bedrooms to put in search queries
    #[serde(default = "default_bedrooms")]
    pub bedrooms: Option<u32>,
    /// Carried through, not used in queries
    #[serde(default)]
    pub bathrooms: Option<f64>,
    /// Carried through, not used in queries
    #[serde(default)]
    pub sqft_min: Option<f64>,
    /// Carried through, not used in queries
    #[serde(default)]
    pub sqft_max: Option<f64>,
    /// Target price (CAD)
    #[serde(default = "default_budget")]
    pub budget: f64,
    /// Upper bound on candidate links scraped
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Try the secondary strategies when the primary one finds nothing
    #[serde(default = "default_use_fallback", alias = "useGoogleFallback")]
    pub use_fallback: bool,
    /// Where progress events are POSTed
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub province: Option<String>,
}

fn default_location() -> String {
    "Edmonton".to_string()
}

fn default_bedrooms() -> Option<u32> {
    Some(2)
}

fn default_budget() -> f64 {
    500_000.0
}

fn default_max_results() -> usize {
    10
}

fn default_use_fallback() -> bool {
    true
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            location: default_location(),
            bedrooms: default_bedrooms(),
            bathrooms: None,
            sqft_min: None,
            sqft_max: None,
            budget: default_budget(),
            max_results: default_max_results(),
            use_fallback: default_use_fallback(),
            webhook_url: None,
            province: None,
        }
    }
}

impl SearchRequest {
    /// Check the request before any work starts and return the webhook target.
    pub fn validate(&self) -> Result<&str, ScoutError> {
        let webhook = self
            .webhook_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ScoutError::RequestValidation("webhookUrl required".to_string()))?;

        if self.max_results == 0 {
            return Err(ScoutError::RequestValidation(
                "maxResults must be a positive integer".to_string(),
            ));
        }

        Ok(webhook)
    }

    /// Search engine query: `site:realtor.ca "<location>" <n> bedroom $<budget>`
    pub fn search_query(&self) -> String {
        let mut parts = vec![format!("site:realtor.ca \"{}\"", self.location)];
        if let Some(bedrooms) = self.bedrooms.filter(|b| *b > 0) {
            parts.push(format!("{} bedroom", bedrooms));
        }
        if self.budget > 0.0 {
            parts.push(format!("${}", self.budget));
        }
        parts.join(" ")
    }
}
