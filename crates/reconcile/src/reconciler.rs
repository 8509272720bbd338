//! Periodic reconciliation loop: syncs live engine session state into the
//! durable record store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

use tsearch_core::domain::{Engine, TorrentRepository};
use tsearch_core::models::TorrentRecord;

use crate::merge::merge_cycle;

const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

pub struct Reconciler {
    engine: Arc<dyn Engine>,
    repository: Arc<dyn TorrentRepository>,
    interval: Duration,
}

impl Reconciler {
    pub fn new(engine: Arc<dyn Engine>, repository: Arc<dyn TorrentRepository>) -> Self {
        Self { engine, repository, interval: DEFAULT_INTERVAL }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Runs the reconciliation loop until `cancellation` fires.
    pub async fn run(&self, cancellation: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = cancellation.cancelled() => {
                    debug!("reconciler stopping");
                    return;
                }
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn run_cycle(&self) {
        let sessions = match self.engine.list_sessions().await {
            Ok(sessions) => sessions,
            Err(err) => {
                error!(error = %err, "failed to list engine sessions");
                return;
            }
        };

        let info_hashes: Vec<String> = sessions.iter().map(|s| s.info_hash().to_string()).collect();
        let records = match self.repository.get_many(&info_hashes).await {
            Ok(records) => records,
            Err(err) => {
                error!(error = %err, "failed to batch-fetch stored torrent records");
                return;
            }
        };
        let records_by_hash: HashMap<String, TorrentRecord> =
            records.into_iter().map(|r| (r.info_hash.clone(), r)).collect();

        for session in sessions {
            let info_hash = session.info_hash().to_string();
            let Some(record) = records_by_hash.get(&info_hash) else {
                debug!(%info_hash, "no stored record yet, skipping");
                continue;
            };
            if let Err(err) = self.reconcile_one(record, session.as_ref()).await {
                warn!(%info_hash, error = %err, "reconciliation cycle failed for torrent");
            }
        }
    }

    /// Upserts the full merged record unless only `done_bytes` changed, in
    /// which case it takes the cheaper monotonic progress-only update path.
    async fn reconcile_one(
        &self,
        record: &TorrentRecord,
        session: &dyn tsearch_core::domain::Session,
    ) -> tsearch_core::error::Result<()> {
        let live_state = session.state().await?;
        let live_files = session.live_files().await?;

        if let Some(next) = merge_cycle(record, &live_state, &live_files) {
            let only_progress_changed = next.state == record.state
                && next.name == record.name
                && next.total_bytes == record.total_bytes
                && next.files.len() == record.files.len()
                && next
                    .files
                    .iter()
                    .zip(record.files.iter())
                    .all(|(a, b)| a.bytes_completed == b.bytes_completed);

            if only_progress_changed {
                self.repository.update_progress(&record.info_hash, next.done_bytes).await?;
            } else {
                self.repository.upsert(next).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tsearch_core::models::TorrentState;
    use tsearch_core::testutil::{InMemoryEngine, InMemoryTorrentRepository};

    #[tokio::test]
    async fn cycle_advances_stored_progress_from_engine() {
        let engine = Arc::new(InMemoryEngine::new());
        let repository = Arc::new(InMemoryTorrentRepository::new());

        let session = engine
            .add_magnet("magnet:?xt=urn:btih:abcdef0123456789abcdef0123456789abcdef01", &PathBuf::from("/tmp"))
            .await
            .unwrap();
        let info_hash = session.info_hash().to_string();

        repository
            .upsert(tsearch_core::models::TorrentRecord {
                info_hash: info_hash.clone(),
                name: String::new(),
                state: TorrentState::Pending,
                total_bytes: 1000,
                done_bytes: 0,
                files: vec![],
                tags: vec![],
                download_dir: PathBuf::from("/data"),
                added_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
            })
            .await
            .unwrap();

        engine.advance(&info_hash, 500);

        let reconciler = Reconciler::new(engine, repository.clone());
        reconciler.run_cycle().await;

        let record = repository.get(&info_hash).await.unwrap().unwrap();
        assert_eq!(record.done_bytes, 500);
    }

    #[tokio::test]
    async fn missing_repository_record_is_skipped_without_panicking() {
        let engine = Arc::new(InMemoryEngine::new());
        let repository = Arc::new(InMemoryTorrentRepository::new());
        engine
            .add_magnet("magnet:?xt=urn:btih:abcdef0123456789abcdef0123456789abcdef01", &PathBuf::from("/tmp"))
            .await
            .unwrap();

        let reconciler = Reconciler::new(engine, repository);
        reconciler.run_cycle().await;
    }
}
