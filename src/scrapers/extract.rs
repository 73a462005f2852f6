use crate::error::ExtractionError;
use crate::models::ExtractedRecord;
use crate::scrapers::traits::DocumentSnapshot;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use std::sync::OnceLock;
use tracing::debug;

/// Global assigned by realtor.ca listing pages with the full listing payload
const PRELOADED_STATE_MARKER: &str = "__PRELOADED_STATE__";

/// What an extraction method hands back to the chain
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Authoritative record, skip the remaining methods
    Finished(ExtractedRecord),
    /// Record so far, keep going
    Continue(ExtractedRecord),
}

/// One technique for pulling listing fields out of a rendered page
pub trait ExtractionMethod: Send + Sync {
    fn name(&self) -> &'static str;

    /// Build on `record` using `document`. An error means "no contribution".
    fn apply(&self, document: &Html, record: &ExtractedRecord) -> Result<Step, ExtractionError>;
}

/// Runs extraction methods in order and merges their output.
///
/// Never fails: a method that errors is skipped and the record built so far
/// carries on to the next one.
pub struct ExtractionStrategyChain {
    methods: Vec<Box<dyn ExtractionMethod>>,
}

impl ExtractionStrategyChain {
    pub fn new(methods: Vec<Box<dyn ExtractionMethod>>) -> Self {
        Self { methods }
    }

    pub fn extract(&self, snapshot: &DocumentSnapshot) -> ExtractedRecord {
        let document = snapshot.parse();
        self.extract_document(&document)
    }

    pub fn extract_document(&self, document: &Html) -> ExtractedRecord {
        let mut record = ExtractedRecord::default();

        for method in &self.methods {
            match method.apply(document, &record) {
                Ok(Step::Finished(finished)) => {
                    debug!(method = method.name(), "Extraction finished early");
                    return finished;
                }
                Ok(Step::Continue(next)) => record = next,
                Err(e) => debug!(method = method.name(), error = %e, "Extraction method failed"),
            }
        }

        record
    }
}

impl Default for ExtractionStrategyChain {
    /// Embedded state, JSON-LD, meta tags, then the document title
    fn default() -> Self {
        Self::new(vec![
            Box::new(EmbeddedStateMethod) as Box<dyn ExtractionMethod>,
            Box::new(StructuredDataMethod),
            Box::new(MetaTagMethod),
            Box::new(TitleFallbackMethod),
        ])
    }
}

/// Reads the listing out of the page's preloaded-state script
pub struct EmbeddedStateMethod;

impl ExtractionMethod for EmbeddedStateMethod {
    fn name(&self) -> &'static str {
        "embedded-state"
    }

    fn apply(&self, document: &Html, record: &ExtractedRecord) -> Result<Step, ExtractionError> {
        let script_selector = selector("script")?;

        // Pages also mention the global in reads and guards; only an
        // assignment with a parseable object counts.
        let mut last_error = None;
        for script in document
            .select(&script_selector)
            .map(|s| s.text().collect::<String>())
            .filter(|text| text.contains(PRELOADED_STATE_MARKER))
        {
            let parsed = preloaded_state_json(&script)
                .and_then(|json| serde_json::from_str::<Value>(json).map_err(ExtractionError::from));
            match parsed {
                Ok(state) => return Ok(Step::Finished(map_preloaded_state(&state))),
                Err(e) => last_error = Some(e),
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(Step::Continue(record.clone())),
        }
    }
}

/// The first balanced `{...}` assigned to the preloaded-state marker in `script`
fn preloaded_state_json(script: &str) -> Result<&str, ExtractionError> {
    for (marker_at, marker) in script.match_indices(PRELOADED_STATE_MARKER) {
        let after_marker = script[marker_at + marker.len()..].trim_start();
        let Some(rhs) = after_marker.strip_prefix('=') else {
            continue;
        };
        if rhs.starts_with('=') {
            continue;
        }
        let rhs = rhs.trim_start();
        if !rhs.starts_with('{') {
            continue;
        }
        if let Some(object) = balanced_object(rhs) {
            return Ok(object);
        }
    }

    Err(ExtractionError::EmbeddedState(
        "no object assigned to the preloaded state".to_string(),
    ))
}

/// Slice of `text` (which starts at `{`) up to its matching `}`.
/// Braces inside string literals are ignored.
fn balanced_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..=i]);
                }
            }
            _ => {}
        }
    }

    None
}

fn map_preloaded_state(state: &Value) -> ExtractedRecord {
    let listing = state
        .get("propertyDetails")
        .filter(|v| truthy(v))
        .or_else(|| state.get("Property").filter(|v| truthy(v)))
        .unwrap_or(state);

    ExtractedRecord {
        mls: text_at(listing, "/MlsNumber"),
        price: text_at(listing, "/Property/Price"),
        address: text_at(listing, "/Property/Address/AddressText").map(|a| a.replace('|', ", ")),
        city: text_at(listing, "/Property/Address/City"),
        beds: text_at(listing, "/Building/Bedrooms"),
        baths: text_at(listing, "/Building/BathroomTotal"),
        photo: text_at(listing, "/Property/Photo/0/HighResPath"),
        ..Default::default()
    }
}

/// Price and address from `application/ld+json` blocks
pub struct StructuredDataMethod;

impl ExtractionMethod for StructuredDataMethod {
    fn name(&self) -> &'static str {
        "json-ld"
    }

    fn apply(&self, document: &Html, record: &ExtractedRecord) -> Result<Step, ExtractionError> {
        let ld_selector = selector(r#"script[type="application/ld+json"]"#)?;

        let mut nodes = Vec::new();
        for block in document.select(&ld_selector) {
            let text = block.text().collect::<String>();
            match serde_json::from_str::<Value>(text.trim()) {
                Ok(value) => collect_nodes(value, &mut nodes),
                Err(e) => debug!(error = %e, "Skipping malformed JSON-LD block"),
            }
        }

        let mut found = ExtractedRecord::default();
        if let Some(node) = nodes
            .iter()
            .find(|n| offer_price(n).is_some() || n.get("address").is_some())
        {
            found.price = offer_price(node);
            match node.get("address") {
                Some(Value::String(address)) => found.address = non_empty(address),
                Some(address @ Value::Object(_)) => {
                    found.address = text_at(address, "/streetAddress");
                    found.city = text_at(address, "/addressLocality");
                }
                _ => {}
            }
        }

        let mut merged = record.clone();
        merged.fill_missing(found);
        Ok(Step::Continue(merged))
    }
}

/// Flatten top-level arrays and `@graph` containers into individual nodes
fn collect_nodes(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_nodes(item, out);
            }
        }
        Value::Object(mut map) => {
            if let Some(graph) = map.remove("@graph") {
                collect_nodes(graph, out);
            }
            out.push(Value::Object(map));
        }
        _ => {}
    }
}

fn offer_price(node: &Value) -> Option<String> {
    match node.get("offers")? {
        Value::Array(offers) => offers.iter().find_map(|o| text_at(o, "/price")),
        offer => text_at(offer, "/price"),
    }
}

/// Social/meta tags, plus price and room counts parsed out of their text
pub struct MetaTagMethod;

impl ExtractionMethod for MetaTagMethod {
    fn name(&self) -> &'static str {
        "meta-tags"
    }

    fn apply(&self, document: &Html, record: &ExtractedRecord) -> Result<Step, ExtractionError> {
        let title = meta_content(
            document,
            &[r#"meta[property="og:title"]"#, r#"meta[name="twitter:title"]"#],
        )?;
        let description = meta_content(
            document,
            &[r#"meta[property="og:description"]"#, r#"meta[name="description"]"#],
        )?;
        let image = meta_content(
            document,
            &[r#"meta[property="og:image"]"#, r#"meta[name="twitter:image"]"#],
        )?;

        let mut merged = record.clone();

        // A price in the listing title is more specific than the JSON-LD offer.
        if let Some(price) = title.as_deref().and_then(title_price) {
            merged.price = Some(price);
        }
        if let Some(description) = description.as_deref() {
            if merged.beds.is_none() {
                merged.beds = capture(beds_pattern(), description);
            }
            if merged.baths.is_none() {
                merged.baths = capture(baths_pattern(), description);
            }
        }

        merged.fill_missing(ExtractedRecord {
            title,
            description,
            image,
            ..Default::default()
        });
        Ok(Step::Continue(merged))
    }
}

fn meta_content(document: &Html, selectors: &[&str]) -> Result<Option<String>, ExtractionError> {
    for css in selectors {
        let meta_selector = selector(css)?;
        let content = document
            .select(&meta_selector)
            .filter_map(|el| el.value().attr("content"))
            .find_map(non_empty);
        if content.is_some() {
            return Ok(content);
        }
    }
    Ok(None)
}

fn title_price(title: &str) -> Option<String> {
    price_pattern().find(title).map(|m| m.as_str().to_string())
}

fn capture(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn price_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\d[\d,]*").expect("price regex is valid"))
}

fn beds_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d+)\s*(?:bedrooms?|beds?|bd)\b").expect("beds regex is valid")
    })
}

fn baths_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(?:bathrooms?|baths?|ba)\b")
            .expect("baths regex is valid")
    })
}

/// Uses `<title>` when nothing else supplied a title
pub struct TitleFallbackMethod;

impl ExtractionMethod for TitleFallbackMethod {
    fn name(&self) -> &'static str {
        "document-title"
    }

    fn apply(&self, document: &Html, record: &ExtractedRecord) -> Result<Step, ExtractionError> {
        let mut merged = record.clone();
        if merged.title.is_none() {
            let title_selector = selector("title")?;
            merged.title = document
                .select(&title_selector)
                .next()
                .and_then(|t| non_empty(&t.text().collect::<String>()));
        }
        Ok(Step::Continue(merged))
    }
}

fn selector(css: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(css).map_err(|e| ExtractionError::Selector(format!("{css}: {e}")))
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// String or number at a JSON pointer, as text
fn text_at(value: &Value, pointer: &str) -> Option<String> {
    match value.pointer(pointer)? {
        Value::String(s) => non_empty(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(html: &str) -> ExtractedRecord {
        ExtractionStrategyChain::default().extract(&DocumentSnapshot::new("https://x", html))
    }

    const META_TAGS: &str = r#"
        <meta property="og:title" content="For sale: 123 Main St - $489,900">
        <meta property="og:description" content="Bright condo with 2 bedrooms and 1.5 baths near downtown">
        <meta property="og:image" content="https://cdn.realtor.ca/listing/1.jpg">
    "#;

    #[test]
    fn test_embedded_state_is_authoritative() {
        let html = format!(
            r#"<html><head><title>Listing</title>{META_TAGS}
            <script>
              window.__PRELOADED_STATE__ = {{"propertyDetails":{{
                "MlsNumber":"E4400001",
                "Property":{{"Price":"$510,000","Address":{{"AddressText":"12 Elm St|Edmonton, Alberta T5J0N3","City":"Edmonton"}},
                            "Photo":[{{"HighResPath":"https://cdn.realtor.ca/hi/1.jpg"}}]}},
                "Building":{{"Bedrooms":"3","BathroomTotal":2}},
                "Remarks":"Has a {{brace}} in text"
              }}}};
              window.other = {{}};
            </script></head><body></body></html>"#
        );

        let record = extract(&html);

        assert_eq!(
            record,
            ExtractedRecord {
                mls: Some("E4400001".to_string()),
                price: Some("$510,000".to_string()),
                address: Some("12 Elm St, Edmonton, Alberta T5J0N3".to_string()),
                city: Some("Edmonton".to_string()),
                beds: Some("3".to_string()),
                baths: Some("2".to_string()),
                photo: Some("https://cdn.realtor.ca/hi/1.jpg".to_string()),
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_meta_tags_only() {
        let html = format!("<html><head><title>Doc title</title>{META_TAGS}</head></html>");

        let record = extract(&html);

        assert_eq!(record.title.as_deref(), Some("For sale: 123 Main St - $489,900"));
        assert_eq!(record.price.as_deref(), Some("$489,900"));
        assert_eq!(record.beds.as_deref(), Some("2"));
        assert_eq!(record.baths.as_deref(), Some("1.5"));
        assert_eq!(record.image.as_deref(), Some("https://cdn.realtor.ca/listing/1.jpg"));
        assert!(record.mls.is_none());
    }

    #[test]
    fn test_malformed_embedded_state_falls_through() {
        let html = format!(
            r#"<html><head>{META_TAGS}
            <script>window.__PRELOADED_STATE__ = {{"propertyDetails": {{"MlsNumber": </script>
            </head></html>"#
        );

        let record = extract(&html);

        assert!(record.mls.is_none());
        assert_eq!(record.price.as_deref(), Some("$489,900"));
    }

    #[test]
    fn test_json_ld_baseline_with_meta_price_override() {
        let html = format!(
            r#"<html><head>{META_TAGS}
            <script type="application/ld+json">
              {{"@context":"https://schema.org","@graph":[
                {{"@type":"WebPage","name":"x"}},
                {{"@type":"Residence","offers":{{"@type":"Offer","price":475000,"priceCurrency":"CAD"}},
                  "address":{{"streetAddress":"123 Main St","addressLocality":"Edmonton"}}}}
              ]}}
            </script></head></html>"#
        );

        let record = extract(&html);

        assert_eq!(record.address.as_deref(), Some("123 Main St"));
        assert_eq!(record.city.as_deref(), Some("Edmonton"));
        assert_eq!(record.price.as_deref(), Some("$489,900"));
    }

    #[test]
    fn test_json_ld_price_kept_without_title_price() {
        let html = r#"<html><head>
            <meta property="og:title" content="123 Main St">
            <script type="application/ld+json">not json</script>
            <script type="application/ld+json">
              [{"@type":"Product","offers":[{"price":"475000"}]}]
            </script></head></html>"#;

        let record = extract(html);

        assert_eq!(record.price.as_deref(), Some("475000"));
        assert_eq!(record.title.as_deref(), Some("123 Main St"));
    }

    #[test]
    fn test_title_fallback_and_empty_page() {
        let record = extract("<html><head><title>  Listing 42  </title></head></html>");
        assert_eq!(record.title.as_deref(), Some("Listing 42"));

        assert!(extract("<html><body></body></html>").is_empty());
    }

    #[test]
    fn test_failing_method_is_skipped() {
        struct Broken;
        impl ExtractionMethod for Broken {
            fn name(&self) -> &'static str {
                "broken"
            }
            fn apply(&self, _: &Html, _: &ExtractedRecord) -> Result<Step, ExtractionError> {
                Err(ExtractionError::EmbeddedState("boom".to_string()))
            }
        }

        let chain = ExtractionStrategyChain::new(vec![
            Box::new(Broken) as Box<dyn ExtractionMethod>,
            Box::new(TitleFallbackMethod),
        ]);
        let record = chain.extract_document(&Html::parse_document("<title>Still here</title>"));

        assert_eq!(record.title.as_deref(), Some("Still here"));
    }

    #[test]
    fn test_embedded_state_found_after_a_guard_script() {
        let html = r#"<html><head><title>T</title>
            <script>if (window.__PRELOADED_STATE__) { track("ready"); }</script>
            <script>var ok = window.__PRELOADED_STATE__ == null;</script>
            <script>window.__PRELOADED_STATE__ = {"propertyDetails":{"MlsNumber":"E1","Property":{"Price":"$300,000"}}};</script>
            </head></html>"#;

        let record = extract(html);

        assert_eq!(record.mls.as_deref(), Some("E1"));
        assert_eq!(record.price.as_deref(), Some("$300,000"));
        assert!(record.title.is_none());
    }

    #[test]
    fn test_preloaded_state_json_skips_reads_of_the_global() {
        let script = r#"const s = window.__PRELOADED_STATE__ || {};
            window.__PRELOADED_STATE__ = {"a":{"b":1}};"#;
        assert_eq!(preloaded_state_json(script).unwrap(), r#"{"a":{"b":1}}"#);
        assert!(preloaded_state_json("if (__PRELOADED_STATE__) { go(); }").is_err());
    }

    #[test]
    fn test_balanced_object_ignores_braces_in_strings() {
        let text = r#"{"a":"}{","b":{"c":"\"}"}} trailing"#;
        assert_eq!(balanced_object(text), Some(r#"{"a":"}{","b":{"c":"\"}"}}"#));
        assert_eq!(balanced_object(r#"{"open": {"#), None);
    }
}
