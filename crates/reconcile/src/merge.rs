//! Pure merge logic for one reconciliation cycle. Kept free of
//! I/O so every branch of the merge can be exercised without a fake engine.

use tsearch_core::models::{FileRef, LiveFileProgress, SessionMode, SessionState, TorrentRecord, TorrentState};

/// Computes the record that should be upserted for one torrent this cycle,
/// or `None` if nothing changed and the upsert should be skipped.
pub fn merge_cycle(
    record: &TorrentRecord,
    live: &SessionState,
    live_files: &[LiveFileProgress],
) -> Option<TorrentRecord> {
    let mut next = record.clone();

    let live_done_bytes = if live_files.is_empty() {
        live.done_bytes
    } else {
        live_files.iter().map(|f| f.bytes_completed).sum()
    };
    next.done_bytes = record.done_bytes.max(live_done_bytes);

    let derived_status = if live.total_bytes > 0 && next.done_bytes >= live.total_bytes {
        TorrentState::Completed
    } else {
        TorrentState::Active
    };
    if derived_status != record.state {
        next.state = derived_status;
    }

    let files_changed = !live_files.is_empty()
        && (live_files.len() != record.files.len()
            || live_files.iter().any(|live_file| {
                record
                    .files
                    .get(live_file.index)
                    .map(|stored| live_file.bytes_completed > stored.bytes_completed)
                    .unwrap_or(true)
            }));
    if files_changed {
        next.files = merge_files(&record.files, live_files);
    }

    if record.name.is_empty() {
        if let Some(first) = live_files.first() {
            if let Some(derived) = first.relative_path.components().next() {
                next.name = derived.as_os_str().to_string_lossy().into_owned();
            }
        }
    }

    if live.total_bytes > 0 {
        next.total_bytes = live.total_bytes;
    }

    let unchanged = next.done_bytes == record.done_bytes
        && next.state == record.state
        && next.files.len() == record.files.len()
        && next
            .files
            .iter()
            .zip(record.files.iter())
            .all(|(a, b)| a.bytes_completed == b.bytes_completed)
        && next.name == record.name
        && next.total_bytes == record.total_bytes;

    if unchanged {
        return None;
    }
    Some(next)
}

fn merge_files(stored: &[FileRef], live: &[LiveFileProgress]) -> Vec<FileRef> {
    if live.len() != stored.len() {
        return live
            .iter()
            .map(|f| {
                let priority = stored
                    .iter()
                    .find(|s| s.index == f.index)
                    .map(|s| s.priority)
                    .unwrap_or(tsearch_core::models::FilePriority::Normal);
                FileRef {
                    index: f.index,
                    relative_path: f.relative_path.clone(),
                    size_bytes: stored.iter().find(|s| s.index == f.index).map(|s| s.size_bytes).unwrap_or(0),
                    bytes_completed: f.bytes_completed,
                    priority,
                }
            })
            .collect();
    }
    stored
        .iter()
        .map(|s| {
            let live_bytes = live.iter().find(|f| f.index == s.index).map(|f| f.bytes_completed).unwrap_or(0);
            FileRef { bytes_completed: s.bytes_completed.max(live_bytes), ..s.clone() }
        })
        .collect()
}
