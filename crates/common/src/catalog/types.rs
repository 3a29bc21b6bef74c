//! Catalog provider value types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lending format tracked per catalog item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    Ebook,
    Audiobook,
}

impl Format {
    pub const ALL: [Format; 2] = [Format::Ebook, Format::Audiobook];

    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Ebook => "ebook",
            Format::Audiobook => "audiobook",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ebook" => Some(Format::Ebook),
            "audiobook" => Some(Format::Audiobook),
            _ => None,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Availability of one format of one catalog item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityStatus {
    Available,
    Hold,
    NotOwned,
    Unknown,
}

impl AvailabilityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AvailabilityStatus::Available => "available",
            AvailabilityStatus::Hold => "hold",
            AvailabilityStatus::NotOwned => "not_owned",
            AvailabilityStatus::Unknown => "unknown",
        }
    }
}

impl From<&str> for AvailabilityStatus {
    fn from(s: &str) -> Self {
        match s {
            "available" => AvailabilityStatus::Available,
            "hold" => AvailabilityStatus::Hold,
            "not_owned" => AvailabilityStatus::NotOwned,
            _ => AvailabilityStatus::Unknown,
        }
    }
}

impl fmt::Display for AvailabilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate record returned by a provider search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderBook {
    #[serde(default)]
    pub provider: String,
    pub provider_item_id: String,
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub isbn10: Option<String>,
    #[serde(default)]
    pub isbn13: Option<String>,
    #[serde(default)]
    pub asin: Option<String>,
    /// Arbitrary provider metadata (deep links, formats, ...)
    #[serde(default)]
    pub raw: serde_json::Value,
}

/// Availability as reported by a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderAvailability {
    #[serde(default)]
    pub provider: String,
    pub provider_item_id: String,
    pub format: Format,
    pub status: AvailabilityStatus,
    #[serde(default)]
    pub copies_available: Option<i32>,
    #[serde(default)]
    pub copies_total: Option<i32>,
    #[serde(default)]
    pub holds: Option<i32>,
    #[serde(default)]
    pub deep_link: Option<String>,
}

impl ProviderAvailability {
    /// Placeholder for an (item, format) pair the provider did not report
    pub fn not_owned(provider: &str, provider_item_id: &str, format: Format) -> Self {
        Self {
            provider: provider.to_string(),
            provider_item_id: provider_item_id.to_string(),
            format,
            status: AvailabilityStatus::NotOwned,
            copies_available: None,
            copies_total: None,
            holds: None,
            deep_link: None,
        }
    }
}

/// Search parameters handed to a provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub title: Option<String>,
    pub author: Option<String>,
    pub isbn10: Option<String>,
    pub isbn13: Option<String>,
    pub limit: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            AvailabilityStatus::Available,
            AvailabilityStatus::Hold,
            AvailabilityStatus::NotOwned,
            AvailabilityStatus::Unknown,
        ] {
            assert_eq!(AvailabilityStatus::from(status.as_str()), status);
        }
        assert_eq!(AvailabilityStatus::from("lost"), AvailabilityStatus::Unknown);
    }

    #[test]
    fn test_format_parse_is_lenient() {
        assert_eq!(Format::parse(" Ebook "), Some(Format::Ebook));
        assert_eq!(Format::parse("audiobook"), Some(Format::Audiobook));
        assert_eq!(Format::parse("paperback"), None);
    }
}
