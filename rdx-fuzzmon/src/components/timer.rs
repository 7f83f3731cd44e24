//! Defines the recurring tasks registered through `schedule_task`.

use crate::engine::EngineContext;
use std::time::Duration;
use tokio::time::Instant;

/// The body of a recurring task. It runs on the engine's queue.
pub type TaskAction = Box<dyn FnMut(&mut EngineContext) + Send>;

/// Fires its action each time `interval` has elapsed on the engine clock.
#[doc(hidden)]
pub(crate) struct ScheduledTask {
    pub interval: Duration,
    pub last_fired: Instant,
    /// `None` only while the action itself is running.
    action: Option<TaskAction>,
}

impl ScheduledTask {
    /// Creates a new `ScheduledTask`. The first firing is one full interval away.
    pub(crate) fn new(interval: Duration, action: TaskAction, now: Instant) -> Self {
        Self {
            interval,
            last_fired: now,
            action: Some(action),
        }
    }

    /// Returns `true` if the interval has elapsed since the last firing.
    pub(crate) fn is_due(&self, now: Instant) -> bool {
        self.action.is_some() && now.saturating_duration_since(self.last_fired) >= self.interval
    }

    /// Lends the action out so it can run with mutable access to the context.
    pub(crate) fn take_action(&mut self) -> Option<TaskAction> {
        self.action.take()
    }

    /// Returns a lent action and restarts the interval.
    pub(crate) fn restore(&mut self, action: TaskAction, fired_at: Instant) {
        self.action = Some(action);
        self.last_fired = fired_at;
    }
}
