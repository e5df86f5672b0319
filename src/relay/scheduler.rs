//! Input debounce scheduler.
//!
//! The core only samples the joypad once per frame, so a momentary press can
//! fall between two samples. A `PRESS_BUTTON` therefore becomes a hold that
//! lasts [`HOLD_TICKS`] ticks. Ticks run at [`TICK_RATE_HZ`], twice the
//! native frame rate, and each tick applies the current holds and advances
//! the core by one frame.

use std::collections::BTreeMap;
use std::future;
use std::time::Duration;
use tokio::time::{self, Interval, MissedTickBehavior};

use super::core::{EmulationCore, InputCode};

/// Scheduler tick frequency.
pub const TICK_RATE_HZ: u64 = 120;

/// Number of ticks a single press is held for.
pub const HOLD_TICKS: u32 = 10;

/// Time between two scheduler ticks.
pub fn tick_period() -> Duration {
    Duration::from_nanos(1_000_000_000 / TICK_RATE_HZ)
}

/// Pending holds plus the running flag for one session.
#[derive(Debug, Default)]
pub struct InputScheduler {
    holds: BTreeMap<InputCode, u32>,
    running: bool,
}

impl InputScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the scheduler as running.
    ///
    /// Returns `false` when it was already running, in which case nothing changes.
    pub fn start(&mut self) -> bool {
        !std::mem::replace(&mut self.running, true)
    }

    /// Stops ticking and forgets any pending holds.
    pub fn stop(&mut self) {
        self.running = false;
        self.holds.clear();
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Starts (or restarts) a hold of `HOLD_TICKS` for `code`.
    pub fn press(&mut self, code: InputCode) {
        self.holds.insert(code, HOLD_TICKS);
    }

    /// Applies one tick: collects and decrements the active holds, hands them
    /// to the core and advances it by one frame.
    ///
    /// # Returns
    ///
    /// The input codes held during this tick.
    pub fn tick(&mut self, core: &mut dyn EmulationCore) -> Vec<InputCode> {
        let mut held = Vec::new();
        for (code, remaining) in self.holds.iter_mut() {
            if *remaining > 0 {
                held.push(*code);
                *remaining -= 1;
            }
        }

        core.set_held(&held);
        core.advance_frame();
        held
    }
}

/// Periodic timer that can be started and stopped.
///
/// While stopped, [`tick`](Self::tick) never completes, so it can sit in a
/// `select!` unconditionally.
#[derive(Debug)]
pub struct FrameTicker {
    period: Duration,
    interval: Option<Interval>,
}

impl FrameTicker {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            interval: None,
        }
    }

    /// Starts the timer unless it is already running.
    pub fn start(&mut self) {
        if self.interval.is_none() {
            let mut interval = time::interval(self.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.interval = Some(interval);
        }
    }

    pub fn stop(&mut self) {
        self.interval = None;
    }

    pub fn is_active(&self) -> bool {
        self.interval.is_some()
    }

    /// Waits for the next tick.
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => future::pending::<()>().await,
        }
    }
}
