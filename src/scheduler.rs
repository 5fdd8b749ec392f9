//! Scheduler boundary for timed operators.
//!
//! There is no process-wide default scheduler: every operator that needs
//! timing takes one explicitly, which keeps the core testable against
//! tokio's paused virtual clock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

/// Revocable handle to a scheduled action.
#[derive(Clone)]
pub struct ScheduledHandle {
    cancelled: Arc<AtomicBool>,
    task: Arc<tokio::task::JoinHandle<()>>,
}

impl ScheduledHandle {
    /// Revokes the action if it has not fired yet. Idempotent.
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        self.task.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Deferred-execution primitive consumed by the timed operators.
pub trait Scheduler: Clone + Send + Sync + 'static {
    /// Current instant on this scheduler's clock.
    fn now(&self) -> Instant;

    /// Runs `action` once `after` has elapsed. `tolerance` permits the
    /// scheduler to coalesce the fire time within a window; `None` means
    /// the scheduler's minimum supported precision.
    fn schedule(
        &self,
        after: Duration,
        tolerance: Option<Duration>,
        action: Box<dyn FnOnce() + Send>,
    ) -> ScheduledHandle;
}

/// Scheduler backed by the ambient tokio runtime's timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn schedule(
        &self,
        after: Duration,
        _tolerance: Option<Duration>,
        action: Box<dyn FnOnce() + Send>,
    ) -> ScheduledHandle {
        // tokio's timer wheel already coalesces within its millisecond
        // granularity, which is this scheduler's minimum tolerance.
        let deadline = Instant::now() + after;
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if !flag.load(Ordering::Acquire) {
                action();
            }
        });
        ScheduledHandle {
            cancelled,
            task: Arc::new(task),
        }
    }
}
