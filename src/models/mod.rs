use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A listing URL found by one of the discovery strategies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateLink {
    pub url: String,
    /// Name of the strategy that produced the link
    pub strategy: String,
}

/// Fields pulled out of a listing page.
///
/// Every field is optional; an extraction method only fills what it finds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mls: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beds: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baths: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl ExtractedRecord {
    /// True when no field has been filled
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Fill every field still missing here from `other`. Present fields win.
    pub fn fill_missing(&mut self, other: ExtractedRecord) {
        fill(&mut self.mls, other.mls);
        fill(&mut self.price, other.price);
        fill(&mut self.address, other.address);
        fill(&mut self.city, other.city);
        fill(&mut self.beds, other.beds);
        fill(&mut self.baths, other.baths);
        fill(&mut self.photo, other.photo);
        fill(&mut self.title, other.title);
        fill(&mut self.description, other.description);
        fill(&mut self.image, other.image);
    }
}

fn fill(slot: &mut Option<String>, value: Option<String>) {
    if slot.is_none() {
        *slot = value;
    }
}

/// One scraped listing as forwarded to the webhook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyResult {
    pub url: String,
    #[serde(flatten)]
    pub record: ExtractedRecord,
    pub scraped_at: DateTime<Utc>,
}

impl PropertyResult {
    /// Result for a candidate whose page could not be loaded or read
    pub fn url_only(url: impl Into<String>) -> Self {
        Self::new(url, ExtractedRecord::default())
    }

    pub fn new(url: impl Into<String>, record: ExtractedRecord) -> Self {
        Self {
            url: url.into(),
            record,
            scraped_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_missing_keeps_present_fields() {
        let mut record = ExtractedRecord {
            price: Some("$1".to_string()),
            ..Default::default()
        };
        record.fill_missing(ExtractedRecord {
            price: Some("$2".to_string()),
            city: Some("Edmonton".to_string()),
            ..Default::default()
        });

        assert_eq!(record.price.as_deref(), Some("$1"));
        assert_eq!(record.city.as_deref(), Some("Edmonton"));
    }

    #[test]
    fn test_property_result_serializes_flat_without_absent_fields() {
        let result = PropertyResult::new(
            "https://www.realtor.ca/real-estate/1/x",
            ExtractedRecord {
                beds: Some("2".to_string()),
                ..Default::default()
            },
        );
        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(value["url"], "https://www.realtor.ca/real-estate/1/x");
        assert_eq!(value["beds"], "2");
        assert!(value.get("scrapedAt").is_some());
        assert!(value.get("price").is_none());
        assert!(value.get("record").is_none());
    }
}
