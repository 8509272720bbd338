//! Per-torrent registry enforcing the dormancy policy among concurrent
//! readers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const DORMANCY_THRESHOLD: Duration = Duration::from_secs(60);

struct ReaderEntry {
    last_access: Instant,
    sleep: Arc<dyn Fn() + Send + Sync>,
}

/// Tracks every open reader per torrent so an active reader can put idle
/// siblings to sleep. A single-reader torrent never triggers dormancy.
pub struct DormancyRegistry {
    by_torrent: Mutex<HashMap<String, HashMap<u64, ReaderEntry>>>,
    threshold: Duration,
}

impl Default for DormancyRegistry {
    fn default() -> Self {
        Self { by_torrent: Mutex::new(HashMap::new()), threshold: DORMANCY_THRESHOLD }
    }
}

impl DormancyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the default 60s idle threshold; used by tests to exercise
    /// the sleep-trigger path without waiting a full minute.
    pub fn with_threshold(mut self, threshold: Duration) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn register(&self, info_hash: &str, reader_id: u64, sleep: Arc<dyn Fn() + Send + Sync>) {
        let mut map = self.by_torrent.lock().unwrap();
        map.entry(info_hash.to_string())
            .or_default()
            .insert(reader_id, ReaderEntry { last_access: Instant::now(), sleep });
    }

    /// Idempotent: removing an already-unregistered reader is a no-op.
    pub fn unregister(&self, info_hash: &str, reader_id: u64) {
        let mut map = self.by_torrent.lock().unwrap();
        if let Some(readers) = map.get_mut(info_hash) {
            readers.remove(&reader_id);
            if readers.is_empty() {
                map.remove(info_hash);
            }
        }
    }

    pub fn touch(&self, info_hash: &str, reader_id: u64) {
        let mut map = self.by_torrent.lock().unwrap();
        if let Some(readers) = map.get_mut(info_hash) {
            if let Some(entry) = readers.get_mut(&reader_id) {
                entry.last_access = Instant::now();
            }
        }
    }

    /// Called by an active reader's dormancy pass: puts any sibling idle
    /// for over 60s to sleep. Never sleeps the caller itself.
    pub fn enforce(&self, info_hash: &str, caller_id: u64) {
        let now = Instant::now();
        let map = self.by_torrent.lock().unwrap();
        let Some(readers) = map.get(info_hash) else { return };
        if readers.len() < 2 {
            return;
        }
        for (id, entry) in readers {
            if *id == caller_id {
                continue;
            }
            if now.duration_since(entry.last_access) > self.threshold {
                (entry.sleep)();
            }
        }
    }

    pub fn reader_count(&self, info_hash: &str) -> usize {
        self.by_torrent
            .lock()
            .unwrap()
            .get(info_hash)
            .map(|r| r.len())
            .unwrap_or(0)
    }
}
