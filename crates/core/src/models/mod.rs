//! Domain data types shared across the aggregator, streaming engine and
//! reconciliation loop.

pub mod cache;
pub mod health;
pub mod request;
pub mod result;
pub mod response;
pub mod torrent;

pub use cache::{CacheFreshness, CachedEntry, PopularEntry};
pub use health::{ProviderHealth, ProviderStatus};
pub use request::{
    resolve_provider_aliases, RankingProfile, SearchFilters, SearchRequest, SortKey, SortOrder,
};
pub use response::{ProviderOutcome, SearchResponse};
pub use result::{CatalogHit, EnrichedResult, SearchEnrichment, SearchResult};
pub use torrent::{
    FilePriority, FileRef, LiveFileProgress, PiecePriority, SessionMode, SessionState, TorrentRecord,
    TorrentState,
};
