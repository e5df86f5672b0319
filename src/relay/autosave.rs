//! Autosave throttling.
//!
//! The core reports every battery RAM write through a
//! [`BatteryObserver`]. Writes only bump a counter; the session polls the
//! monitor after each tick, and any new writes push the deadline out to
//! one [`QUIESCENCE_WINDOW`] after the latest write. A burst of writes thus
//! yields a single snapshot once the game has stopped writing.

use std::future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant};

use super::core::BatteryObserver;

/// Quiet period after the last write before a snapshot is taken.
pub const QUIESCENCE_WINDOW: Duration = Duration::from_secs(1);

/// Tracks battery RAM writes for one session.
#[derive(Debug)]
pub struct AutosaveMonitor {
    writes: Arc<AtomicU64>,
    seen: u64,
    armed: bool,
    deadline: Option<Instant>,
    window: Duration,
}

impl AutosaveMonitor {
    pub fn new(window: Duration) -> Self {
        Self {
            writes: Arc::new(AtomicU64::new(0)),
            seen: 0,
            armed: false,
            deadline: None,
            window,
        }
    }

    /// Returns a callback to install on the core with `on_battery_write`.
    pub fn observer(&self) -> BatteryObserver {
        let writes = Arc::clone(&self.writes);
        Box::new(move || {
            writes.fetch_add(1, Ordering::Relaxed);
        })
    }

    /// Starts watching; writes that happened before arming are ignored.
    pub fn arm(&mut self) {
        self.armed = true;
        self.seen = self.writes.load(Ordering::Relaxed);
        self.deadline = None;
    }

    /// Stops watching and cancels any pending snapshot.
    pub fn disarm(&mut self) {
        self.armed = false;
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Restarts the quiescence window if any write happened since the last poll.
    pub fn poll(&mut self, now: Instant) {
        let writes = self.writes.load(Ordering::Relaxed);
        if writes != self.seen {
            self.seen = writes;
            if self.armed {
                self.deadline = Some(now + self.window);
            }
        }
    }

    /// When the pending snapshot is due, if one is pending.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Consumes the pending snapshot if its deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

impl Default for AutosaveMonitor {
    fn default() -> Self {
        Self::new(QUIESCENCE_WINDOW)
    }
}

/// One-shot timer: completes at `deadline`, or never when there is none.
pub async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(observer: &mut BatteryObserver, times: usize) {
        for _ in 0..times {
            observer();
        }
    }

    #[test]
    fn test_burst_yields_one_snapshot_after_window() {
        let mut monitor = AutosaveMonitor::default();
        let mut observer = monitor.observer();
        monitor.arm();
        let start = Instant::now();

        // Writes spread over 500ms, each poll pushes the deadline out
        for step in 0..5u64 {
            write(&mut observer, 3);
            monitor.poll(start + Duration::from_millis(step * 100));
        }
        let last_write = start + Duration::from_millis(400);
        assert_eq!(monitor.deadline(), Some(last_write + QUIESCENCE_WINDOW));

        assert!(!monitor.take_due(last_write + Duration::from_millis(999)));
        assert!(monitor.take_due(last_write + QUIESCENCE_WINDOW));
        assert!(!monitor.take_due(last_write + Duration::from_secs(5)));
        assert_eq!(monitor.deadline(), None);
    }

    #[test]
    fn test_poll_without_writes_keeps_deadline() {
        let mut monitor = AutosaveMonitor::default();
        let mut observer = monitor.observer();
        monitor.arm();
        let start = Instant::now();

        write(&mut observer, 1);
        monitor.poll(start);
        monitor.poll(start + Duration::from_millis(300));
        monitor.poll(start + Duration::from_millis(600));
        assert_eq!(monitor.deadline(), Some(start + QUIESCENCE_WINDOW));
    }

    #[test]
    fn test_disarmed_monitor_never_schedules() {
        let mut monitor = AutosaveMonitor::default();
        let mut observer = monitor.observer();
        let start = Instant::now();

        write(&mut observer, 4);
        monitor.poll(start);
        assert_eq!(monitor.deadline(), None);

        monitor.arm();
        write(&mut observer, 1);
        monitor.poll(start);
        assert!(monitor.deadline().is_some());

        monitor.disarm();
        assert!(!monitor.is_armed());
        assert!(!monitor.take_due(start + Duration::from_secs(10)));
    }

    #[test]
    fn test_writes_before_arming_are_ignored() {
        let mut monitor = AutosaveMonitor::default();
        let mut observer = monitor.observer();
        write(&mut observer, 2);
        monitor.arm();
        monitor.poll(Instant::now());
        assert_eq!(monitor.deadline(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_until_none_never_completes() {
        let waited = time::timeout(Duration::from_secs(60), sleep_until(None)).await;
        assert!(waited.is_err());

        let deadline = Instant::now() + QUIESCENCE_WINDOW;
        sleep_until(Some(deadline)).await;
        assert!(Instant::now() >= deadline);
    }
}
