//! Torrent records, file references and session state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TorrentState {
    Pending,
    Active,
    Stopped,
    Completed,
    Error,
}

/// One file within a torrent's piece-mapped layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRef {
    pub index: usize,
    pub relative_path: PathBuf,
    pub size_bytes: i64,
    pub bytes_completed: i64,
    pub priority: FilePriority,
}

impl FileRef {
    /// Rejects `..`, absolute paths, and any component escaping the
    /// torrent's own download directory.
    pub fn validate(&self) -> Result<()> {
        if self.relative_path.is_absolute() {
            return Err(Error::InvalidSource {
                reason: format!("file path must be relative: {:?}", self.relative_path),
            });
        }
        for component in self.relative_path.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => {
                    return Err(Error::InvalidSource {
                        reason: format!("file path escapes torrent root: {:?}", self.relative_path),
                    })
                }
            }
        }
        Ok(())
    }

    /// Joins the file's relative path onto `root` and verifies the result
    /// stays within `root` after lexical normalization.
    pub fn resolve_within(&self, root: &Path) -> Result<PathBuf> {
        self.validate()?;
        let joined = root.join(&self.relative_path);
        let normalized = normalize_lexically(&joined);
        let root_normalized = normalize_lexically(root);
        if !normalized.starts_with(&root_normalized) {
            return Err(Error::InvalidSource {
                reason: format!("resolved path {:?} escapes root {:?}", normalized, root),
            });
        }
        Ok(normalized)
    }
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilePriority {
    Skip,
    Low,
    Normal,
    High,
}

/// Piece-range priority accepted by sessions, ordered by increasing
/// urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PiecePriority {
    None,
    Normal,
    Readahead,
    Next,
    High,
}

/// Persisted record of a torrent the system is managing, independent of
/// whether an engine session currently exists for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorrentRecord {
    pub info_hash: String,
    pub name: String,
    pub state: TorrentState,
    pub total_bytes: i64,
    pub done_bytes: i64,
    pub files: Vec<FileRef>,
    pub tags: Vec<String>,
    pub download_dir: PathBuf,
    pub added_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TorrentRecord {
    /// Monotonic merge: `done_bytes` can only advance, never regress on a
    /// stale or reordered update.
    pub fn merge_progress(&mut self, done_bytes: i64, now: DateTime<Utc>) {
        self.done_bytes = self.done_bytes.max(done_bytes);
        self.updated_at = now;
    }
}

/// Live per-file progress as reported by the engine, independent of the
/// stored record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveFileProgress {
    pub index: usize,
    pub relative_path: PathBuf,
    pub bytes_completed: i64,
}

/// Engine-reported mode of an active session; distinct from
/// [`TorrentState`], which tracks the persisted record's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Idle,
    Downloading,
    Focused,
}

/// Live engine-reported session state for an active torrent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub info_hash: String,
    pub mode: SessionMode,
    pub done_bytes: i64,
    pub total_bytes: i64,
    pub download_rate_bps: i64,
    pub upload_rate_bps: i64,
    pub connected_peers: i32,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str) -> FileRef {
        FileRef {
            index: 0,
            relative_path: PathBuf::from(path),
            size_bytes: 10,
            bytes_completed: 0,
            priority: FilePriority::Normal,
        }
    }

    #[test]
    fn rejects_absolute_path() {
        assert!(file("/etc/passwd").validate().is_err());
    }

    #[test]
    fn rejects_parent_escape() {
        assert!(file("../../etc/passwd").validate().is_err());
    }

    #[test]
    fn accepts_nested_relative_path() {
        assert!(file("season1/episode01.mkv").validate().is_ok());
    }

    #[test]
    fn resolve_within_stays_inside_root() {
        let root = PathBuf::from("/data/torrents/abc");
        let resolved = file("video/movie.mkv").resolve_within(&root).unwrap();
        assert!(resolved.starts_with(&root));
    }

    #[test]
    fn merge_progress_never_regresses() {
        let mut record = TorrentRecord {
            info_hash: "a".repeat(40),
            name: "x".to_string(),
            state: TorrentState::Active,
            total_bytes: 1000,
            done_bytes: 500,
            files: vec![],
            tags: vec![],
            download_dir: PathBuf::from("/data"),
            added_at: Utc::now(),
            updated_at: Utc::now(),
        };
        record.merge_progress(200, Utc::now());
        assert_eq!(record.done_bytes, 500);
        record.merge_progress(800, Utc::now());
        assert_eq!(record.done_bytes, 800);
    }
}
