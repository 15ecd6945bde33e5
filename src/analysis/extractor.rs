use regex::Regex;

use crate::error::ExtractorError;

/// Matches the escaped JSON embedded in the cookie.fun markup:
/// `contractAddress\":\"<address>\`
pub const DEFAULT_ADDRESS_PATTERN: &str = r#"contractAddress\\":\\"([A-Za-z0-9]{32,44})\\"#;

pub const DEFAULT_ADDRESS_LIMIT: usize = 10;

/// Pulls token addresses out of scraped page text.
///
/// Results keep document order and are capped at `limit`. Duplicates in the
/// source show up as duplicates in the output.
#[derive(Debug, Clone)]
pub struct AddressExtractor {
    pattern: Regex,
    limit: usize,
}

impl AddressExtractor {
    pub fn new(pattern: &str, limit: usize) -> Result<Self, ExtractorError> {
        Ok(AddressExtractor {
            pattern: Regex::new(pattern)?,
            limit,
        })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn extract(&self, text: &str) -> Vec<String> {
        self.pattern
            .captures_iter(text)
            .filter_map(|caps| caps.get(1).or_else(|| caps.get(0)))
            .map(|m| m.as_str().to_string())
            .take(self.limit)
            .collect()
    }
}
