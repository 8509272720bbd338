//! Trait boundaries for the external collaborators the aggregator,
//! streaming engine and reconciliation loop depend on. Concrete
//! implementations (a real indexer transport, a BitTorrent engine, a
//! persistent repository) live outside this crate; only in-memory fakes
//! for testing ship here (see [`crate::testutil`]).

use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::Result;
use crate::models::{CatalogHit, FileRef, LiveFileProgress, RankingProfile, SearchFilters, SearchResult, SessionState, TorrentRecord};

/// One upstream search backend (Torznab-style feed, scrape endpoint, ...).
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Torznab-style providers get a narrower fetch-limit band than
    /// scrape-style ones.
    fn is_torznab_style(&self) -> bool {
        false
    }

    async fn search(&self, query: &str, limit: u32, filters: &SearchFilters) -> Result<Vec<SearchResult>>;
}

/// Optional external metadata catalog (TMDb/IMDb-style), consulted once
/// per merged response to backfill poster/rating/overview/id.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    async fn multi_search(&self, normalized_query: &str) -> Result<Option<CatalogHit>>;
}

/// A handle to a torrent added to the embedded BitTorrent engine.
#[async_trait]
pub trait Session: Send + Sync {
    fn info_hash(&self) -> &str;

    async fn state(&self) -> Result<SessionState>;

    /// The torrent's file layout as the engine currently understands it.
    async fn files(&self) -> Result<Vec<FileRef>>;

    /// Per-file completion as currently known by the engine.
    async fn live_files(&self) -> Result<Vec<LiveFileProgress>>;

    async fn set_file_priority(&self, file_index: usize, priority: crate::models::FilePriority) -> Result<()>;

    /// Sets the download priority of the byte range `[range.start, range.end)`
    /// within `file_index`'s pieces.
    async fn set_piece_priority(
        &self,
        file_index: usize,
        range: std::ops::Range<u64>,
        priority: crate::models::PiecePriority,
    ) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    async fn resume(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    /// Whether this session is exempt from disk-pressure pausing.
    /// Defaults to unfocused.
    fn is_focused(&self) -> bool {
        false
    }

    async fn focus(&self) -> Result<()>;

    async fn unfocus(&self) -> Result<()>;
}

/// The embedded BitTorrent engine: creates/destroys sessions from a magnet
/// link or `.torrent` bytes.
#[async_trait]
pub trait Engine: Send + Sync {
    async fn add_magnet(&self, magnet_uri: &str, download_dir: &PathBuf) -> Result<Box<dyn Session>>;

    async fn add_torrent_bytes(&self, bytes: &[u8], download_dir: &PathBuf) -> Result<Box<dyn Session>>;

    async fn session(&self, info_hash: &str) -> Result<Option<Box<dyn Session>>>;

    async fn remove(&self, info_hash: &str, delete_files: bool) -> Result<()>;

    /// All sessions currently held by the engine, active or not. Walked by
    /// the reconciler and admission controller on every sweep.
    async fn list_sessions(&self) -> Result<Vec<Box<dyn Session>>>;

    /// Clears the focused flag on every session.
    async fn unfocus_all(&self) -> Result<()>;
}

/// A sequential byte-range reader over a torrent file's pieces, backed by
/// an engine session with its read window steered by priority.
#[async_trait]
pub trait StreamReader: Send + Sync {
    async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    fn file_size(&self) -> u64;

    /// Informs the reader that consumption has reached `offset`, so it can
    /// steer the engine's piece priority window ahead of it.
    async fn seek_hint(&mut self, offset: u64) -> Result<()>;
}

/// Persistent store of torrent records, independent of whether an engine
/// session currently exists for them.
#[async_trait]
pub trait TorrentRepository: Send + Sync {
    async fn get(&self, info_hash: &str) -> Result<Option<TorrentRecord>>;

    async fn upsert(&self, record: TorrentRecord) -> Result<()>;

    async fn list(&self) -> Result<Vec<TorrentRecord>>;

    /// Batch form of [`Self::get`]; a missing hash is simply absent from the
    /// result rather than erroring the whole call, since the reconciler
    /// walks live engine sessions and a record may have been deleted since.
    async fn get_many(&self, info_hashes: &[String]) -> Result<Vec<TorrentRecord>>;

    async fn delete(&self, info_hash: &str) -> Result<()>;

    /// Monotonic compare-and-swap progress update;
    /// implementations must apply [`TorrentRecord::merge_progress`]
    /// semantics rather than overwriting blindly.
    async fn update_progress(&self, info_hash: &str, done_bytes: i64) -> Result<()>;

    async fn update_tags(&self, info_hash: &str, tags: Vec<String>) -> Result<()>;
}

/// Backend for the two-tier response cache. Kept separate from
/// [`TorrentRepository`] since an implementation may back it with Redis
/// while the repository stays on a SQL store.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<crate::models::CachedEntry>>;

    async fn put(&self, entry: crate::models::CachedEntry) -> Result<()>;

    async fn touch_popularity(&self, key: &str) -> Result<()>;

    async fn most_popular(&self, limit: usize) -> Result<Vec<crate::models::PopularEntry>>;
}

/// Snapshot of ranking weights an operator can tune at runtime, read by
/// the aggregator when a request doesn't supply its own profile.
#[async_trait]
pub trait RuntimeConfigStore: Send + Sync {
    async fn default_ranking_profile(&self) -> Result<RankingProfile>;
}
