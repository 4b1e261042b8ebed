// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A single-shot timer built on `tokio::time::sleep`, driven inside a
//! spawned task.
//!
//! `tokio::task::JoinHandle::abort()` is fire-and-forget: it queues a
//! cancellation, it does not guarantee the task won't still observe
//! one more poll and run its body to completion. [`Timer::kill`] can
//! only report what it could *confirm* within a bounded fence, never
//! a guarantee that the callback will not still fire — callers still
//! need their own winner-takes-all guard around finalization.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// What [`Timer::kill`] could confirm about the timer's fate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The timer task was confirmed cancelled before its callback ran.
    Killed,
    /// The timer task had already run its callback to completion
    /// before the kill request reached it.
    Fired,
    /// Cancellation was requested but could not be confirmed within
    /// the fence window; the callback may still fire.
    StoppedNoAck,
}

/// A single-shot, cancellable timer.
#[derive(Debug)]
pub struct Timer {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Timer {
    /// Spawn a task that sleeps for `duration` then runs `callback`.
    pub fn arm<F>(duration: Duration, callback: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            callback.await;
        });
        Self {
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Request cancellation and wait up to `fence` to confirm the
    /// outcome. A second call (or a call after the timer already fired
    /// and was reaped) reports [`StopOutcome::Killed`] as a no-op.
    pub async fn kill(&self, fence: Duration) -> StopOutcome {
        let handle = self.handle.lock().await.take();
        let Some(handle) = handle else {
            return StopOutcome::Killed;
        };
        handle.abort();
        match tokio::time::timeout(fence, handle).await {
            Ok(Ok(())) => StopOutcome::Fired,
            Ok(Err(join_err)) if join_err.is_cancelled() => StopOutcome::Killed,
            Ok(Err(_panicked)) => StopOutcome::Killed,
            Err(_elapsed) => StopOutcome::StoppedNoAck,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn kill_before_fire_reports_killed() {
        let fired = Arc::new(AtomicBool::new(false));
        let fired_in_task = Arc::clone(&fired);
        let timer = Timer::arm(Duration::from_secs(10), async move {
            fired_in_task.store(true, Ordering::SeqCst);
        });

        let outcome = timer.kill(Duration::from_millis(200)).await;
        assert_eq!(outcome, StopOutcome::Killed);
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn kill_after_fire_reports_fired() {
        let fired = Arc::new(AtomicBool::new(false));
        let fired_in_task = Arc::clone(&fired);
        let timer = Timer::arm(Duration::from_millis(1), async move {
            fired_in_task.store(true, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        let outcome = timer.kill(Duration::from_millis(200)).await;
        assert_eq!(outcome, StopOutcome::Fired);
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn double_kill_is_a_harmless_no_op() {
        let timer = Timer::arm(Duration::from_secs(10), async {});
        let first = timer.kill(Duration::from_millis(200)).await;
        let second = timer.kill(Duration::from_millis(200)).await;
        assert_eq!(first, StopOutcome::Killed);
        assert_eq!(second, StopOutcome::Killed);
    }
}
