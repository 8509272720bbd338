//! Create/start/stop/delete torrent use-case glue wiring the engine to the
//! record store, including orphan-session rollback on repository failure
//! and containment-checked file deletion.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{instrument, warn};

use tsearch_core::domain::{Engine, TorrentRepository};
use tsearch_core::error::{Error, Result};
use tsearch_core::models::{TorrentRecord, TorrentState};

/// Either a magnet URI or raw `.torrent` bytes.
pub enum TorrentSource {
    Magnet(String),
    Bytes(Vec<u8>),
}

pub struct TorrentUseCases {
    engine: Arc<dyn Engine>,
    repository: Arc<dyn TorrentRepository>,
}

impl TorrentUseCases {
    pub fn new(engine: Arc<dyn Engine>, repository: Arc<dyn TorrentRepository>) -> Self {
        Self { engine, repository }
    }

    /// Opens a session for `source`, derives the initial record from its
    /// file layout (scenario 4), and persists it. Rolls the orphan session
    /// back if persistence fails.
    #[instrument(skip(self, source))]
    pub async fn create(&self, source: TorrentSource, download_dir: PathBuf) -> Result<TorrentRecord> {
        let (session, display_name_hint) = match &source {
            TorrentSource::Magnet(uri) => {
                let session = self.engine.add_magnet(uri, &download_dir).await?;
                (session, magnet_display_name(uri))
            }
            TorrentSource::Bytes(bytes) => {
                let session = self.engine.add_torrent_bytes(bytes, &download_dir).await?;
                (session, None)
            }
        };

        let info_hash = session.info_hash().to_string();
        let files = session.files().await.unwrap_or_default();
        let total_bytes: i64 = files.iter().map(|f| f.size_bytes).sum();
        let name = display_name_hint
            .or_else(|| derive_name_from_files(&files))
            .unwrap_or_else(|| info_hash.clone());

        let now = Utc::now();
        let record = TorrentRecord {
            info_hash: info_hash.clone(),
            name,
            state: TorrentState::Active,
            total_bytes,
            done_bytes: 0,
            files,
            tags: Vec::new(),
            download_dir,
            added_at: now,
            updated_at: now,
        };

        if let Err(err) = self.repository.upsert(record.clone()).await {
            warn!(%info_hash, error = %err, "rolling back orphan session after repository failure");
            let _ = self.engine.remove(&info_hash, false).await;
            return Err(Error::Repository { message: "failed to persist new torrent record".to_string(), source: err.into() });
        }

        Ok(record)
    }

    #[instrument(skip(self))]
    pub async fn start(&self, info_hash: &str) -> Result<()> {
        let session = self.require_session(info_hash).await?;
        session.resume().await
    }

    #[instrument(skip(self))]
    pub async fn stop(&self, info_hash: &str) -> Result<()> {
        let session = self.require_session(info_hash).await?;
        session.pause().await
    }

    #[instrument(skip(self, tags))]
    pub async fn set_tags(&self, info_hash: &str, tags: Vec<String>) -> Result<()> {
        self.repository.update_tags(info_hash, tags).await
    }

    /// Removes the engine session, deletes the repository record, and
    /// optionally deletes the torrent's files from disk.
    #[instrument(skip(self))]
    pub async fn delete(&self, info_hash: &str, delete_files: bool) -> Result<()> {
        let record = self.repository.get(info_hash).await?;

        self.engine.remove(info_hash, delete_files).await?;
        self.repository.delete(info_hash).await?;

        if delete_files {
            if let Some(record) = record {
                delete_record_files(&record).await?;
            }
        }
        Ok(())
    }

    async fn require_session(&self, info_hash: &str) -> Result<Box<dyn tsearch_core::domain::Session>> {
        self.engine
            .session(info_hash)
            .await?
            .ok_or_else(|| Error::NotFound { resource: info_hash.to_string() })
    }
}

fn magnet_display_name(uri: &str) -> Option<String> {
    let parsed = url::Url::parse(uri).ok()?;
    parsed.query_pairs().find(|(k, _)| k == "dn").map(|(_, v)| v.into_owned())
}

fn derive_name_from_files(files: &[tsearch_core::models::FileRef]) -> Option<String> {
    let first = files.first()?;
    first.relative_path.components().next().map(|c| c.as_os_str().to_string_lossy().into_owned())
}

/// Deletes every file under the record's download directory, canonicalizing
/// the root once and validating each path remains contained, then
/// removes now-empty parent directories bottom-up up to (exclusive of) the
/// root. Accumulates per-file failures instead of aborting on the first.
async fn delete_record_files(record: &TorrentRecord) -> Result<()> {
    let root = tokio::fs::canonicalize(&record.download_dir)
        .await
        .map_err(|err| Error::Filesystem(vec![format!("cannot canonicalize {:?}: {err}", record.download_dir)]))?;

    let mut errors = Vec::new();
    let mut touched_dirs = std::collections::BTreeSet::new();

    for file in &record.files {
        let resolved = match file.resolve_within(&root) {
            Ok(path) => path,
            Err(err) => {
                errors.push(err.to_string());
                continue;
            }
        };
        if let Some(parent) = resolved.parent() {
            touched_dirs.insert(parent.to_path_buf());
        }
        if let Err(err) = tokio::fs::remove_file(&resolved).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                errors.push(format!("{:?}: {err}", resolved));
            }
        }
    }

    // Deepest directories first so a child's removal can empty its parent
    // within the same pass.
    let mut dirs: Vec<PathBuf> = touched_dirs.into_iter().collect();
    dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
    for dir in dirs {
        remove_empty_ancestors(&dir, &root).await;
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::Filesystem(errors))
    }
}

async fn remove_empty_ancestors(start: &Path, root: &Path) {
    let mut current = start.to_path_buf();
    while current != root && current.starts_with(root) {
        match tokio::fs::read_dir(&current).await {
            Ok(mut entries) => {
                if entries.next_entry().await.ok().flatten().is_some() {
                    return;
                }
            }
            Err(_) => return,
        }
        if tokio::fs::remove_dir(&current).await.is_err() {
            return;
        }
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magnet_display_name_extracts_dn_param() {
        let uri = "magnet:?xt=urn:btih:08ada5a7a6183aae1e09d831df6748d566095a10&dn=Sintel";
        assert_eq!(magnet_display_name(uri), Some("Sintel".to_string()));
    }

    #[test]
    fn magnet_display_name_missing_dn_is_none() {
        let uri = "magnet:?xt=urn:btih:08ada5a7a6183aae1e09d831df6748d566095a10";
        assert_eq!(magnet_display_name(uri), None);
    }

    #[test]
    fn derives_name_from_first_file_top_component() {
        let files = vec![tsearch_core::models::FileRef {
            index: 0,
            relative_path: PathBuf::from("Sintel/Sintel.mp4"),
            size_bytes: 10,
            bytes_completed: 0,
            priority: tsearch_core::models::FilePriority::Normal,
        }];
        assert_eq!(derive_name_from_files(&files), Some("Sintel".to_string()));
    }
}
