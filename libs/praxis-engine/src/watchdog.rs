//! Execution Watchdog - hard wall-clock ceiling on sandboxed work
//!
//! Submitted code controls its own control flow and may never yield, so
//! cooperative cancellation is not enough: when the budget expires the
//! watchdog trips the sandbox's kill flag, forcing the interpreter to
//! stop on its next step check, and reports a timeout. The abandoned
//! work runs to its forced exit on the blocking pool and its result is
//! dropped.

use crate::sandbox::KillHandle;
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// The wrapped step exceeded its wall-clock budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutError {
    pub budget_ms: u64,
}

impl fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exceeded the {}ms execution budget", self.budget_ms)
    }
}

impl std::error::Error for TimeoutError {}

/// Run `work` under a hard wall-clock budget
///
/// On expiry the kill handle is triggered before returning, so a
/// non-terminating mount is torn down rather than left running. Both
/// the mount step and the assertion step of an attempt are wrapped
/// with the same budget.
pub async fn with_budget<T, F>(
    budget_ms: u64,
    kill: &KillHandle,
    work: F,
) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(Duration::from_millis(budget_ms), work).await {
        Ok(value) => Ok(value),
        Err(_) => {
            kill.trigger();
            tracing::warn!(budget_ms, "watchdog budget exceeded, sandbox killed");
            Err(TimeoutError { budget_ms })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_fast_work_passes_through() {
        let kill = KillHandle::new();
        let result = with_budget(1000, &kill, async { 41 + 1 }).await;
        assert_eq!(result, Ok(42));
        assert!(!kill.is_triggered());
    }

    #[tokio::test]
    async fn test_slow_work_times_out_and_kills() {
        let kill = KillHandle::new();
        let started = Instant::now();
        let result = with_budget(50, &kill, async {
            tokio::time::sleep(Duration::from_secs(30)).await;
        })
        .await;

        assert_eq!(result, Err(TimeoutError { budget_ms: 50 }));
        assert!(kill.is_triggered());
        // Bounded overhead: nowhere near the 30s the work wanted.
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_blocking_pool_work_is_subject_to_the_budget() {
        // Work must be handed to the blocking pool to be interruptible:
        // a sleep running on another thread lets the timeout win, where
        // the same sleep inlined in the wrapped future could not.
        let kill = KillHandle::new();
        let task = tokio::task::spawn_blocking(|| {
            std::thread::sleep(Duration::from_millis(300));
            "done"
        });

        let result = with_budget(50, &kill, task).await;
        assert!(result.is_err());
        assert!(kill.is_triggered());
    }

    #[tokio::test]
    async fn test_kill_flag_stops_abandoned_blocking_work() {
        let kill = KillHandle::new();
        let observed = kill.clone();
        let handle = tokio::task::spawn_blocking(move || {
            // Stand-in for an interpreter loop that only the kill flag
            // can stop.
            while !observed.is_triggered() {
                std::hint::spin_loop();
            }
            "stopped"
        });

        let result = with_budget(50, &kill, async { handle.await }).await;
        assert!(result.is_err());

        // The abandoned task still winds down once the flag is set.
        // (It was killed by the watchdog above; nothing waits on it.)
    }
}
