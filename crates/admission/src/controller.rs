//! Disk-pressure admission controller: pauses non-focused sessions when
//! free space drops below a threshold, resumes them once it recovers.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use tsearch_core::domain::Engine;
use tsearch_core::error::Result;

use crate::probe::DiskSpaceProbe;

const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    pub data_dir: PathBuf,
    pub min_free_bytes: u64,
    pub resume_bytes: u64,
    pub interval: Duration,
}

impl AdmissionConfig {
    /// Auto-corrects a misconfigured `resume_bytes <= min_free_bytes` to
    /// `2 * min_free_bytes`.
    pub fn new(data_dir: PathBuf, min_free_bytes: u64, resume_bytes: u64) -> Self {
        let resume_bytes = if resume_bytes > min_free_bytes { resume_bytes } else { 2 * min_free_bytes };
        Self { data_dir, min_free_bytes, resume_bytes, interval: DEFAULT_INTERVAL }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

pub struct AdmissionController {
    engine: Arc<dyn Engine>,
    probe: Arc<dyn DiskSpaceProbe>,
    config: AdmissionConfig,
    paused: AtomicBool,
    paused_ids: Mutex<HashSet<String>>,
}

impl AdmissionController {
    pub fn new(engine: Arc<dyn Engine>, probe: Arc<dyn DiskSpaceProbe>, config: AdmissionConfig) -> Self {
        Self { engine, probe, config, paused: AtomicBool::new(false), paused_ids: Mutex::new(HashSet::new()) }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub async fn run(&self, cancellation: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval);
        loop {
            tokio::select! {
                _ = cancellation.cancelled() => return,
                _ = ticker.tick() => {
                    if let Err(err) = self.tick().await {
                        warn!(error = %err, "admission tick failed");
                    }
                }
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn tick(&self) -> Result<()> {
        let free = self.probe.free_bytes(&self.config.data_dir).await?;

        if !self.is_paused() && free < self.config.min_free_bytes {
            self.enter_pause(free).await?;
        } else if self.is_paused() && free >= self.config.resume_bytes {
            self.exit_pause(free).await;
        }
        Ok(())
    }

    async fn enter_pause(&self, free: u64) -> Result<()> {
        warn!(free, min_free = self.config.min_free_bytes, "disk pressure detected, pausing non-focused sessions");
        let sessions = self.engine.list_sessions().await?;
        let mut ids = self.paused_ids.lock().await;
        for session in sessions {
            if session.is_focused() {
                continue;
            }
            let info_hash = session.info_hash().to_string();
            if let Err(err) = session.stop().await {
                warn!(%info_hash, error = %err, "failed to stop session under disk pressure");
                continue;
            }
            ids.insert(info_hash);
        }
        self.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn exit_pause(&self, free: u64) {
        info!(free, resume_at = self.config.resume_bytes, "disk pressure cleared, resuming sessions");
        let mut ids = self.paused_ids.lock().await;
        for info_hash in ids.drain() {
            match self.engine.session(&info_hash).await {
                Ok(Some(session)) => {
                    if let Err(err) = session.resume().await {
                        warn!(%info_hash, error = %err, "failed to resume session after disk pressure cleared");
                    }
                }
                Ok(None) => warn!(%info_hash, "session disappeared while paused"),
                Err(err) => warn!(%info_hash, error = %err, "failed to look up session to resume"),
            }
        }
        self.paused.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsearch_core::testutil::InMemoryEngine;

    #[test]
    fn misconfigured_resume_threshold_is_corrected() {
        let config = AdmissionConfig::new(PathBuf::from("/data"), 1000, 500);
        assert_eq!(config.resume_bytes, 2000);
    }

    #[test]
    fn well_formed_resume_threshold_is_kept() {
        let config = AdmissionConfig::new(PathBuf::from("/data"), 1000, 5000);
        assert_eq!(config.resume_bytes, 5000);
    }

    #[tokio::test]
    async fn pauses_and_resumes_around_hysteresis() {
        let engine = Arc::new(InMemoryEngine::new());
        engine
            .add_magnet("magnet:?xt=urn:btih:abcdef0123456789abcdef0123456789abcdef01", &PathBuf::from("/tmp"))
            .await
            .unwrap();

        let probe = Arc::new(crate::probe::FixedProbe::new(100));
        let config = AdmissionConfig::new(PathBuf::from("/data"), 1000, 2000);
        let controller = AdmissionController::new(engine, probe.clone(), config);

        controller.tick().await.unwrap();
        assert!(controller.is_paused());

        probe.set(3000);
        controller.tick().await.unwrap();
        assert!(!controller.is_paused());
    }
}
