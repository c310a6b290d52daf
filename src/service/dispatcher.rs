//! Periodic tick source with a fast and a slow cadence.

use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use super::state::DispatchInterval;

/// Owns the two recurring timers and yields ticks from whichever is active.
///
/// Ticks missed while the consumer is busy are not queued: at most one tick
/// is pending at any time. Must be created inside a tokio runtime.
pub struct PeriodicDispatcher {
    fast: Interval,
    slow: Interval,
    active: Option<DispatchInterval>,
}

impl PeriodicDispatcher {
    /// Create a dispatcher with both timers armed and dispatch suspended.
    pub fn new() -> Self {
        Self {
            fast: timer(DispatchInterval::Fast),
            slow: timer(DispatchInterval::Slow),
            active: None,
        }
    }

    /// Currently active cadence, `None` while suspended.
    pub fn active(&self) -> Option<DispatchInterval> {
        self.active
    }

    /// Switch to `interval`. The first tick arrives one full period from now.
    pub fn activate(&mut self, interval: DispatchInterval) {
        self.timer_mut(interval).reset();
        self.active = Some(interval);
    }

    /// Stop yielding ticks until the next `activate`.
    pub fn suspend(&mut self) {
        self.active = None;
    }

    /// Wait for the next tick of the active timer.
    ///
    /// Never completes while suspended. Cancel safe.
    pub async fn tick(&mut self) {
        match self.active {
            Some(interval) => {
                self.timer_mut(interval).tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    fn timer_mut(&mut self, interval: DispatchInterval) -> &mut Interval {
        match interval {
            DispatchInterval::Fast => &mut self.fast,
            DispatchInterval::Slow => &mut self.slow,
        }
    }
}

impl Default for PeriodicDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn timer(interval: DispatchInterval) -> Interval {
    let period = interval.period();
    let mut timer = time::interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    timer
}
