//! In-memory fakes for the trait boundaries in [`crate::domain`], used by
//! tests across the workspace. Concrete engine/repository/indexer
//! transports are out of scope; these fakes make the rest of the system
//! exercisable end to end without them.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::domain::{CacheBackend, Engine, Session, SearchProvider, TorrentRepository};
use crate::error::{Error, Result};
use crate::models::{
    CachedEntry, FilePriority, FileRef, PopularEntry, SearchFilters, SearchResult, SessionState,
    TorrentRecord,
};

/// Serves a fixed result set regardless of query, optionally simulating
/// failures via `fail_after`.
pub struct StaticSearchProvider {
    name: String,
    torznab_style: bool,
    results: Vec<SearchResult>,
    calls: Mutex<u32>,
    fail_first_n: u32,
}

impl StaticSearchProvider {
    pub fn new(name: impl Into<String>, results: Vec<SearchResult>) -> Self {
        Self {
            name: name.into(),
            torznab_style: false,
            results,
            calls: Mutex::new(0),
            fail_first_n: 0,
        }
    }

    pub fn torznab(mut self) -> Self {
        self.torznab_style = true;
        self
    }

    pub fn failing_first(mut self, n: u32) -> Self {
        self.fail_first_n = n;
        self
    }

    pub fn call_count(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl SearchProvider for StaticSearchProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_torznab_style(&self) -> bool {
        self.torznab_style
    }

    async fn search(&self, _query: &str, _limit: u32, _filters: &SearchFilters) -> Result<Vec<SearchResult>> {
        let mut calls = self.calls.lock().unwrap();
        *calls += 1;
        if *calls <= self.fail_first_n {
            return Err(Error::Transient(format!("{} unavailable", self.name)));
        }
        Ok(self.results.clone())
    }
}

#[derive(Default)]
pub struct InMemoryTorrentRepository {
    records: Mutex<HashMap<String, TorrentRecord>>,
}

impl InMemoryTorrentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TorrentRepository for InMemoryTorrentRepository {
    async fn get(&self, info_hash: &str) -> Result<Option<TorrentRecord>> {
        Ok(self.records.lock().unwrap().get(info_hash).cloned())
    }

    async fn upsert(&self, record: TorrentRecord) -> Result<()> {
        self.records.lock().unwrap().insert(record.info_hash.clone(), record);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<TorrentRecord>> {
        Ok(self.records.lock().unwrap().values().cloned().collect())
    }

    async fn get_many(&self, info_hashes: &[String]) -> Result<Vec<TorrentRecord>> {
        let records = self.records.lock().unwrap();
        Ok(info_hashes.iter().filter_map(|h| records.get(h).cloned()).collect())
    }

    async fn delete(&self, info_hash: &str) -> Result<()> {
        self.records.lock().unwrap().remove(info_hash);
        Ok(())
    }

    async fn update_progress(&self, info_hash: &str, done_bytes: i64) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(info_hash)
            .ok_or_else(|| Error::NotFound { resource: info_hash.to_string() })?;
        record.merge_progress(done_bytes, chrono::Utc::now());
        Ok(())
    }

    async fn update_tags(&self, info_hash: &str, tags: Vec<String>) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(info_hash)
            .ok_or_else(|| Error::NotFound { resource: info_hash.to_string() })?;
        record.tags = tags;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryCacheBackend {
    entries: Mutex<HashMap<String, CachedEntry>>,
    popularity: Mutex<HashMap<String, PopularEntry>>,
}

impl InMemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<CachedEntry>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn put(&self, entry: CachedEntry) -> Result<()> {
        self.entries.lock().unwrap().insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn touch_popularity(&self, key: &str) -> Result<()> {
        let now = chrono::Utc::now();
        let mut popularity = self.popularity.lock().unwrap();
        popularity
            .entry(key.to_string())
            .and_modify(|p| p.record_hit(now))
            .or_insert_with(|| PopularEntry {
                key: key.to_string(),
                hit_count: 1,
                last_requested_at: now,
            });
        Ok(())
    }

    async fn most_popular(&self, limit: usize) -> Result<Vec<PopularEntry>> {
        let popularity = self.popularity.lock().unwrap();
        let mut entries: Vec<PopularEntry> = popularity.values().cloned().collect();
        entries.sort_by(|a, b| b.hit_count.cmp(&a.hit_count));
        entries.truncate(limit);
        Ok(entries)
    }
}

struct InMemorySessionState {
    info_hash: String,
    state: Mutex<SessionState>,
    paused: Mutex<bool>,
    focused: Mutex<bool>,
}

#[async_trait]
impl Session for InMemorySessionState {
    fn info_hash(&self) -> &str {
        &self.info_hash
    }

    async fn state(&self) -> Result<SessionState> {
        Ok(self.state.lock().unwrap().clone())
    }

    async fn files(&self) -> Result<Vec<FileRef>> {
        Ok(Vec::new())
    }

    async fn live_files(&self) -> Result<Vec<crate::models::LiveFileProgress>> {
        Ok(Vec::new())
    }

    async fn set_file_priority(&self, _file_index: usize, _priority: FilePriority) -> Result<()> {
        Ok(())
    }

    async fn set_piece_priority(
        &self,
        _file_index: usize,
        _range: std::ops::Range<u64>,
        _priority: crate::models::PiecePriority,
    ) -> Result<()> {
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        *self.paused.lock().unwrap() = true;
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        *self.paused.lock().unwrap() = false;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    fn is_focused(&self) -> bool {
        *self.focused.lock().unwrap()
    }

    async fn focus(&self) -> Result<()> {
        *self.focused.lock().unwrap() = true;
        Ok(())
    }

    async fn unfocus(&self) -> Result<()> {
        *self.focused.lock().unwrap() = false;
        Ok(())
    }
}

/// A fake engine that tracks sessions purely in memory and never actually
/// moves bytes; `advance` lets tests simulate download progress.
#[derive(Default)]
pub struct InMemoryEngine {
    sessions: Mutex<HashMap<String, SessionState>>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, info_hash: &str, done_bytes: i64) {
        if let Some(state) = self.sessions.lock().unwrap().get_mut(info_hash) {
            state.done_bytes = done_bytes.max(state.done_bytes);
        }
    }

    fn insert(&self, info_hash: &str, total_bytes: i64) -> SessionState {
        let state = SessionState {
            info_hash: info_hash.to_string(),
            mode: crate::models::SessionMode::Downloading,
            done_bytes: 0,
            total_bytes,
            download_rate_bps: 0,
            upload_rate_bps: 0,
            connected_peers: 0,
            updated_at: chrono::Utc::now(),
        };
        self.sessions.lock().unwrap().insert(info_hash.to_string(), state.clone());
        state
    }
}

#[async_trait]
impl Engine for InMemoryEngine {
    async fn add_magnet(&self, magnet_uri: &str, _download_dir: &PathBuf) -> Result<Box<dyn Session>> {
        let info_hash = magnet_uri
            .split("btih:")
            .nth(1)
            .map(|s| s.split('&').next().unwrap_or(s).to_lowercase())
            .ok_or_else(|| Error::InvalidSource { reason: "magnet missing btih".to_string() })?;
        let state = self.insert(&info_hash, 0);
        Ok(Box::new(InMemorySessionState {
            info_hash,
            state: Mutex::new(state),
            paused: Mutex::new(false),
            focused: Mutex::new(false),
        }))
    }

    async fn add_torrent_bytes(&self, bytes: &[u8], _download_dir: &PathBuf) -> Result<Box<dyn Session>> {
        let info_hash = format!("{:040x}", bytes.len());
        let state = self.insert(&info_hash, bytes.len() as i64);
        Ok(Box::new(InMemorySessionState {
            info_hash,
            state: Mutex::new(state),
            paused: Mutex::new(false),
            focused: Mutex::new(false),
        }))
    }

    async fn session(&self, info_hash: &str) -> Result<Option<Box<dyn Session>>> {
        let sessions = self.sessions.lock().unwrap();
        Ok(sessions.get(info_hash).cloned().map(|state| {
            Box::new(InMemorySessionState {
                info_hash: state.info_hash.clone(),
                state: Mutex::new(state),
                paused: Mutex::new(false),
                focused: Mutex::new(false),
            }) as Box<dyn Session>
        }))
    }

    async fn remove(&self, info_hash: &str, _delete_files: bool) -> Result<()> {
        self.sessions.lock().unwrap().remove(info_hash);
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<Box<dyn Session>>> {
        let sessions = self.sessions.lock().unwrap();
        Ok(sessions
            .values()
            .cloned()
            .map(|state| {
                Box::new(InMemorySessionState {
                    info_hash: state.info_hash.clone(),
                    state: Mutex::new(state),
                    paused: Mutex::new(false),
                    focused: Mutex::new(false),
                }) as Box<dyn Session>
            })
            .collect())
    }

    async fn unfocus_all(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_engine_round_trips_a_magnet() {
        let engine = InMemoryEngine::new();
        let session = engine
            .add_magnet("magnet:?xt=urn:btih:abcdef0123456789abcdef0123456789abcdef01", &PathBuf::from("/tmp"))
            .await
            .unwrap();
        assert_eq!(session.info_hash(), "abcdef0123456789abcdef0123456789abcdef01");
        engine.advance(session.info_hash(), 500);
        let state = session.state().await.unwrap();
        assert_eq!(state.done_bytes, 500);
    }

    #[tokio::test]
    async fn in_memory_repository_applies_monotonic_progress() {
        let repo = InMemoryTorrentRepository::new();
        repo.upsert(TorrentRecord {
            info_hash: "a".repeat(40),
            name: "x".to_string(),
            state: crate::models::TorrentState::Active,
            total_bytes: 1000,
            done_bytes: 400,
            files: vec![],
            tags: vec![],
            download_dir: PathBuf::from("/data"),
            added_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        })
        .await
        .unwrap();
        repo.update_progress(&"a".repeat(40), 100).await.unwrap();
        let record = repo.get(&"a".repeat(40)).await.unwrap().unwrap();
        assert_eq!(record.done_bytes, 400);
    }
}
