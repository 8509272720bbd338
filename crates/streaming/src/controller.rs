//! Mutex-protected priority-window state machine driving reads and seeks.

use std::time::{Duration, Instant};

use crate::window::{deprioritize_range, gradient_bands, initial_window, PriorityCall, MAX_WINDOW, MIN_WINDOW};

const ADJUST_GATE: Duration = Duration::from_millis(500);
const EMA_ALPHA: f64 = 0.3;
const EMA_WINDOW_SECS: f64 = 30.0;
const SEEK_BOOST: Duration = Duration::from_secs(10);
const DORMANCY_CHECK_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct WindowState {
    pub pos: u64,
    pub file_len: u64,
    pub window: u64,
    pub backtrack: u64,
    pub step: u64,
    pub prev_off: u64,
    pub prev_window: u64,
    pub last_off: u64,
    ema_bps: f64,
    bytes_since_update: u64,
    last_update: Instant,
    seek_boost_until: Option<Instant>,
    pub last_access: Instant,
    pub last_dormancy_check: Instant,
    pub dormant: bool,
}

impl WindowState {
    pub fn new(readahead: u64, file_len: u64, now: Instant) -> Self {
        let window = initial_window(readahead, file_len);
        let step = (window / 4).max(mib());
        Self {
            pos: 0,
            file_len,
            window,
            backtrack: (window / 2).min(window / 2),
            step,
            prev_off: 0,
            prev_window: 0,
            last_off: u64::MAX,
            ema_bps: 0.0,
            bytes_since_update: 0,
            last_update: now,
            seek_boost_until: None,
            last_access: now,
            last_dormancy_check: now,
            dormant: false,
        }
    }

    /// Record a read of `bytes` ending at `new_pos`; returns the priority
    /// calls to issue and whether a dormancy-enforcement pass is due.
    pub fn on_read(&mut self, new_pos: u64, bytes: u64, now: Instant) -> (Vec<PriorityCall>, bool) {
        self.pos = new_pos;
        self.last_access = now;
        self.bytes_since_update += bytes;

        let mut calls = Vec::new();
        let was_dormant = self.dormant;
        if was_dormant {
            self.dormant = false;
        }

        self.adjust_window(now);
        calls.extend(self.update_priority_window(false, was_dormant));

        let schedule_dormancy_pass = now.duration_since(self.last_dormancy_check) >= DORMANCY_CHECK_INTERVAL;
        if schedule_dormancy_pass {
            self.last_dormancy_check = now;
        }
        (calls, schedule_dormancy_pass)
    }

    /// Record a seek to `new_pos`; always forces a re-application of the
    /// priority window and doubles it under a 10s seek boost.
    pub fn on_seek(&mut self, new_pos: u64, now: Instant) -> (Vec<PriorityCall>, bool) {
        self.pos = new_pos;
        self.last_access = now;
        self.dormant = false;

        self.window = (self.window * 2).min(MAX_WINDOW);
        self.backtrack = self.window / 2;
        self.step = (self.window / 4).max(mib());
        self.seek_boost_until = Some(now + SEEK_BOOST);

        let calls = self.update_priority_window(true, true);
        self.last_dormancy_check = now;
        (calls, true)
    }

    /// EMA of throughput with α=0.3; first observation sets the rate
    /// directly. Skips dynamic sizing while inside the seek boost window.
    fn adjust_window(&mut self, now: Instant) {
        if now.duration_since(self.last_update) < ADJUST_GATE {
            return;
        }
        let elapsed = now.duration_since(self.last_update).as_secs_f64().max(0.001);
        let instantaneous = self.bytes_since_update as f64 / elapsed;
        self.ema_bps = if self.ema_bps == 0.0 {
            instantaneous
        } else {
            EMA_ALPHA * instantaneous + (1.0 - EMA_ALPHA) * self.ema_bps
        };
        self.bytes_since_update = 0;
        self.last_update = now;

        if let Some(until) = self.seek_boost_until {
            if now < until {
                return;
            }
            self.seek_boost_until = None;
        }

        let target = (self.ema_bps * EMA_WINDOW_SECS) as u64;
        self.window = target.clamp(MIN_WINDOW, MAX_WINDOW);
        self.backtrack = self.window / 2;
        self.step = (self.window / 4).max(mib());
    }

    /// `off = max(0, pos-backtrack)`; no-ops unless forced or the offset
    /// moved by at least `step`. Deprioritizes the stale portion of the
    /// previous window before applying the new gradient.
    fn update_priority_window(&mut self, force: bool, wake: bool) -> Vec<PriorityCall> {
        let off = self.pos.saturating_sub(self.backtrack);
        if !force && !wake && self.last_off != u64::MAX && off.abs_diff(self.last_off) < self.step {
            return Vec::new();
        }

        let mut calls = Vec::new();
        if self.prev_window > 0 {
            let prev_end = self.prev_off + self.prev_window;
            let new_end = off + self.window;
            if off > self.prev_off {
                if let Some(call) = deprioritize_range(self.prev_off, (off.min(prev_end)) - self.prev_off, self.file_len) {
                    calls.push(call);
                }
            } else if new_end < prev_end {
                if let Some(call) = deprioritize_range(new_end, prev_end - new_end, self.file_len) {
                    calls.push(call);
                }
            }
        }

        calls.extend(gradient_bands(off, self.window, self.file_len));

        self.prev_off = off;
        self.prev_window = self.window;
        self.last_off = off;
        calls
    }

    /// Puts this reader to sleep: readahead is dropped to 0 by the caller
    /// and its previous window is deprioritized.
    pub fn enter_dormancy(&mut self) -> Option<PriorityCall> {
        self.dormant = true;
        if self.prev_window == 0 {
            return None;
        }
        deprioritize_range(self.prev_off, self.prev_window, self.file_len)
    }
}

fn mib() -> u64 {
    1024 * 1024
}
