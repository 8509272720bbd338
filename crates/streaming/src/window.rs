//! Pure priority-window math: initial sizing and the 4-band gradient.

use tsearch_core::models::PiecePriority;

pub const MIB: u64 = 1024 * 1024;
pub const MIN_WINDOW: u64 = 32 * MIB;
pub const MAX_WINDOW: u64 = 256 * MIB;
pub const HEAD_PROTECT: u64 = 8 * MIB;
pub const TAIL_PROTECT: u64 = 8 * MIB;
const BAND_CAP: u64 = 2 * MIB;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityCall {
    pub start: u64,
    pub end: u64,
    pub priority: PiecePriority,
}

impl PriorityCall {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }
}

/// `clamp(readahead*4, minWindow, maxWindow)`, raised to `max(w, fileLen/100)`
/// and re-clamped at `maxWindow`.
pub fn initial_window(readahead: u64, file_len: u64) -> u64 {
    let window = (readahead.saturating_mul(4)).clamp(MIN_WINDOW, MAX_WINDOW);
    let window = window.max(file_len / 100);
    window.min(MAX_WINDOW)
}

/// Builds the 4-band gradient `[off, off+window)` clipped to `file_len`:
/// High (≤2MiB) → Next (≤2MiB) → Readahead (remaining/4, or all of it if
/// that would fall below 2MiB) → Normal (remainder). Zero-length bands are
/// omitted.
pub fn gradient_bands(off: u64, window: u64, file_len: u64) -> Vec<PriorityCall> {
    let end = (off + window).min(file_len);
    if end <= off {
        return Vec::new();
    }
    let total = end - off;

    let high = total.min(BAND_CAP);
    let after_high = total - high;
    let next = after_high.min(BAND_CAP);
    let after_next = after_high - next;

    let readahead = if after_next / 4 < BAND_CAP {
        after_next
    } else {
        after_next / 4
    };
    let normal = after_next - readahead;

    let mut bands = Vec::with_capacity(4);
    let mut cursor = off;
    for (len, priority) in [
        (high, PiecePriority::High),
        (next, PiecePriority::Next),
        (readahead, PiecePriority::Readahead),
        (normal, PiecePriority::Normal),
    ] {
        if len == 0 {
            continue;
        }
        bands.push(PriorityCall { start: cursor, end: cursor + len, priority });
        cursor += len;
    }
    bands
}

/// Clips `[off, off+length)` into the unprotected middle of the file and
/// returns the interval to deprioritize, or `None` if nothing survives
/// clipping.
pub fn deprioritize_range(off: u64, length: u64, file_len: u64) -> Option<PriorityCall> {
    let lo = off.max(HEAD_PROTECT);
    let tail_boundary = file_len.saturating_sub(TAIL_PROTECT);
    let hi = (off.saturating_add(length)).min(tail_boundary);
    if hi > lo {
        Some(PriorityCall { start: lo, end: hi, priority: PiecePriority::None })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_gradient_priority_scenario() {
        let file_len = 1024 * MIB;
        let off = 100 * MIB;
        let window = 64 * MIB;
        let bands = gradient_bands(off, window, file_len);
        assert_eq!(bands.len(), 4);
        assert_eq!(bands[0], PriorityCall { start: 100 * MIB, end: 102 * MIB, priority: PiecePriority::High });
        assert_eq!(bands[1], PriorityCall { start: 102 * MIB, end: 104 * MIB, priority: PiecePriority::Next });
        assert_eq!(bands[2], PriorityCall { start: 104 * MIB, end: 119 * MIB, priority: PiecePriority::Readahead });
        assert_eq!(bands[3], PriorityCall { start: 119 * MIB, end: 164 * MIB, priority: PiecePriority::Normal });
        let total: u64 = bands.iter().map(|b| b.len()).sum();
        assert_eq!(total, window);
    }

    #[test]
    fn gradient_never_exceeds_file_end() {
        let file_len = 10 * MIB;
        let bands = gradient_bands(8 * MIB, 64 * MIB, file_len);
        assert!(bands.iter().all(|b| b.end <= file_len));
    }

    #[test]
    fn deprioritize_respects_head_and_tail_protection() {
        let file_len = 100 * MIB;
        let call = deprioritize_range(0, 20 * MIB, file_len).unwrap();
        assert_eq!(call.start, HEAD_PROTECT);

        let call = deprioritize_range(90 * MIB, 20 * MIB, file_len).unwrap();
        assert_eq!(call.end, file_len - TAIL_PROTECT);
    }

    #[test]
    fn deprioritize_fully_inside_protected_zone_yields_nothing() {
        assert!(deprioritize_range(0, 4 * MIB, 100 * MIB).is_none());
    }

    #[test]
    fn initial_window_respects_bounds() {
        assert_eq!(initial_window(1 * MIB, 1000 * MIB), MIN_WINDOW);
        assert_eq!(initial_window(1000 * MIB, 1000 * MIB), MAX_WINDOW);
    }
}
