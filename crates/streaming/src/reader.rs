//! Wraps a raw [`StreamReader`] with the priority-window controller,
//! issuing `set_piece_priority` calls on the underlying session ahead of
//! playback and enforcing sibling dormancy.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::instrument;

use tsearch_core::domain::{Session, StreamReader};
use tsearch_core::error::Result;
use tsearch_core::models::PiecePriority;

use crate::controller::WindowState;
use crate::dormancy::DormancyRegistry;
use crate::window::PriorityCall;

static NEXT_READER_ID: AtomicU64 = AtomicU64::new(1);

/// Default readahead hint fed into [`crate::window::initial_window`] until
/// the EMA has observed real throughput.
const DEFAULT_READAHEAD: u64 = 16 * crate::window::MIB;

struct Inner {
    window: WindowState,
    raw: Box<dyn StreamReader>,
}

/// A [`StreamReader`] decorator that keeps the engine's piece priorities
/// ahead of the consumer and registers itself with a per-torrent
/// [`DormancyRegistry`] so idle siblings get put to sleep.
pub struct PriorityStreamReader {
    session: Arc<dyn Session>,
    file_index: usize,
    info_hash: String,
    reader_id: u64,
    file_len: u64,
    registry: Arc<DormancyRegistry>,
    sleep_requested: Arc<AtomicBool>,
    inner: Mutex<Inner>,
}

impl PriorityStreamReader {
    pub fn new(
        session: Arc<dyn Session>,
        file_index: usize,
        raw: Box<dyn StreamReader>,
        registry: Arc<DormancyRegistry>,
    ) -> Self {
        let reader_id = NEXT_READER_ID.fetch_add(1, Ordering::Relaxed);
        let info_hash = session.info_hash().to_string();
        let file_len = raw.file_size();
        let window = WindowState::new(DEFAULT_READAHEAD, file_len, Instant::now());

        let sleep_requested = Arc::new(AtomicBool::new(false));
        let sleep_flag = sleep_requested.clone();
        registry.register(&info_hash, reader_id, Arc::new(move || sleep_flag.store(true, Ordering::SeqCst)));

        Self {
            session,
            file_index,
            info_hash,
            reader_id,
            file_len,
            registry,
            sleep_requested,
            inner: Mutex::new(Inner { window, raw }),
        }
    }

    async fn apply_calls(&self, calls: Vec<PriorityCall>) -> Result<()> {
        for call in calls {
            self.apply_one(&call).await?;
        }
        Ok(())
    }

    async fn apply_one(&self, call: &PriorityCall) -> Result<()> {
        let range: Range<u64> = call.start..call.end;
        self.session.set_piece_priority(self.file_index, range, call.priority.clone()).await
    }

    /// Runs the dormancy-enforcement pass. Must only be called after the
    /// caller has released `self.inner`'s lock.
    fn enforce_dormancy(&self) {
        self.registry.enforce(&self.info_hash, self.reader_id);
    }

    /// If a sibling's enforcement pass flagged this reader for sleep,
    /// drops its current window's priority and marks it dormant.
    async fn honor_sleep_request(&self) -> Result<()> {
        if !self.sleep_requested.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let call = {
            let mut inner = self.inner.lock().await;
            inner.window.enter_dormancy()
        };
        if let Some(call) = call {
            self.apply_one(&call).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl StreamReader for PriorityStreamReader {
    #[instrument(skip(self, buf), fields(info_hash = %self.info_hash, reader_id = self.reader_id))]
    async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.honor_sleep_request().await?;
        self.registry.touch(&self.info_hash, self.reader_id);

        let (n, calls, run_dormancy_pass) = {
            let mut inner = self.inner.lock().await;
            let n = inner.raw.read_at(offset, buf).await?;
            let (calls, due) = inner.window.on_read(offset + n as u64, n as u64, Instant::now());
            (n, calls, due)
        };

        self.apply_calls(calls).await?;
        if run_dormancy_pass {
            self.enforce_dormancy();
        }
        Ok(n)
    }

    fn file_size(&self) -> u64 {
        self.file_len
    }

    #[instrument(skip(self), fields(info_hash = %self.info_hash, reader_id = self.reader_id))]
    async fn seek_hint(&mut self, offset: u64) -> Result<()> {
        self.registry.touch(&self.info_hash, self.reader_id);
        let calls = {
            let mut inner = self.inner.lock().await;
            inner.raw.seek_hint(offset).await?;
            let (calls, _) = inner.window.on_seek(offset, Instant::now());
            calls
        };
        self.apply_calls(calls).await?;
        self.enforce_dormancy();
        Ok(())
    }
}

impl Drop for PriorityStreamReader {
    fn drop(&mut self) {
        self.registry.unregister(&self.info_hash, self.reader_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tsearch_core::error::Error;

    struct FakeRawReader {
        file_len: u64,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl StreamReader for FakeRawReader {
        async fn read_at(&mut self, _offset: u64, buf: &mut [u8]) -> Result<usize> {
            self.reads.fetch_add(1, Ordering::Relaxed);
            Ok(buf.len())
        }

        fn file_size(&self) -> u64 {
            self.file_len
        }

        async fn seek_hint(&mut self, _offset: u64) -> Result<()> {
            Ok(())
        }
    }

    struct FakeSession {
        info_hash: String,
        calls: Mutex<Vec<(usize, Range<u64>, PiecePriority)>>,
    }

    #[async_trait]
    impl Session for FakeSession {
        fn info_hash(&self) -> &str {
            &self.info_hash
        }

        async fn state(&self) -> Result<tsearch_core::models::SessionState> {
            Err(Error::Permanent("unused in test".to_string()))
        }

        async fn files(&self) -> Result<Vec<tsearch_core::models::FileRef>> {
            Ok(Vec::new())
        }

        async fn live_files(&self) -> Result<Vec<tsearch_core::models::LiveFileProgress>> {
            Ok(Vec::new())
        }

        async fn set_file_priority(&self, _file_index: usize, _priority: tsearch_core::models::FilePriority) -> Result<()> {
            Ok(())
        }

        async fn set_piece_priority(&self, file_index: usize, range: Range<u64>, priority: PiecePriority) -> Result<()> {
            self.calls.lock().await.push((file_index, range, priority));
            Ok(())
        }

        async fn pause(&self) -> Result<()> {
            Ok(())
        }

        async fn resume(&self) -> Result<()> {
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            Ok(())
        }

        async fn focus(&self) -> Result<()> {
            Ok(())
        }

        async fn unfocus(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn read_issues_priority_calls_and_unregisters_on_drop() {
        let session = Arc::new(FakeSession { info_hash: "a".repeat(40), calls: Mutex::new(Vec::new()) });
        let raw = Box::new(FakeRawReader { file_len: 1024 * crate::window::MIB, reads: AtomicUsize::new(0) });
        let registry = Arc::new(DormancyRegistry::new());

        let mut reader = PriorityStreamReader::new(session.clone(), 0, raw, registry.clone());
        assert_eq!(registry.reader_count(&"a".repeat(40)), 1);

        let mut buf = vec![0u8; 1024];
        let n = reader.read_at(100 * crate::window::MIB, &mut buf).await.unwrap();
        assert_eq!(n, 1024);
        assert!(!session.calls.lock().await.is_empty());

        drop(reader);
        assert_eq!(registry.reader_count(&"a".repeat(40)), 0);
    }

    #[tokio::test]
    async fn seek_hint_forces_priority_reapplication() {
        let session = Arc::new(FakeSession { info_hash: "b".repeat(40), calls: Mutex::new(Vec::new()) });
        let raw = Box::new(FakeRawReader { file_len: 1024 * crate::window::MIB, reads: AtomicUsize::new(0) });
        let registry = Arc::new(DormancyRegistry::new());
        let mut reader = PriorityStreamReader::new(session.clone(), 0, raw, registry);

        reader.seek_hint(500 * crate::window::MIB).await.unwrap();
        assert!(!session.calls.lock().await.is_empty());
    }
}
