//! Aggregated search response envelope.

use serde::{Deserialize, Serialize};

use super::result::EnrichedResult;

/// Per-provider outcome attached to a response for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderOutcome {
    pub provider: String,
    pub result_count: usize,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub served_from_cache: bool,
}

/// Final response returned to the caller of `Search`/`SearchStream`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<EnrichedResult>,
    pub total_matched: usize,
    pub providers: Vec<ProviderOutcome>,
    pub served_from_cache: bool,
    pub partial: bool,
    pub query_expanded: bool,
}

impl SearchResponse {
    pub fn empty() -> Self {
        Self {
            results: Vec::new(),
            total_matched: 0,
            providers: Vec::new(),
            served_from_cache: false,
            partial: false,
            query_expanded: false,
        }
    }

    /// True if every queried provider failed; the whole operation is
    /// only a failure when none of them returned anything.
    pub fn all_providers_failed(&self) -> bool {
        !self.providers.is_empty() && self.providers.iter().all(|p| p.error.is_some())
    }
}
