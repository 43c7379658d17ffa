//! Minimal FHIR `Bundle` model.
//!
//! Only the fields the synchronizer needs are typed; entry resources stay as
//! raw JSON.

use serde::{Deserialize, Serialize};

/// Link relation pointing at the next page of a search result
pub const NEXT_RELATION: &str = "next";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BundleType {
    Document,
    Message,
    Transaction,
    TransactionResponse,
    Batch,
    BatchResponse,
    History,
    Searchset,
    Collection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleLink {
    pub relation: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    #[serde(rename = "type")]
    pub bundle_type: BundleType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub link: Vec<BundleLink>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry: Vec<BundleEntry>,
}

impl Bundle {
    /// An empty search result page
    pub fn searchset() -> Self {
        Self {
            bundle_type: BundleType::Searchset,
            link: Vec::new(),
            entry: Vec::new(),
        }
    }

    pub fn with_resources(mut self, resources: impl IntoIterator<Item = serde_json::Value>) -> Self {
        self.entry.extend(resources.into_iter().map(|r| BundleEntry {
            resource: Some(r),
        }));
        self
    }

    pub fn with_next(mut self, url: impl Into<String>) -> Self {
        self.link.push(BundleLink {
            relation: NEXT_RELATION.to_string(),
            url: url.into(),
        });
        self
    }

    /// URL of the next page, if the server returned one
    pub fn next_url(&self) -> Option<&str> {
        self.link
            .iter()
            .find(|l| l.relation == NEXT_RELATION)
            .map(|l| l.url.as_str())
    }

    /// Consumes the bundle, returning the resources of all entries that carry one
    pub fn into_resources(self) -> Vec<serde_json::Value> {
        self.entry.into_iter().filter_map(|e| e.resource).collect()
    }
}
