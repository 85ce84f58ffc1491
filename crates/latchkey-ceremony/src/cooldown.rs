//! Rate-limit cooldown countdown.
//!
//! When the backend rejects an attempt with `RATE_LIMITED` it includes a
//! `remainingMs` hint. [`CooldownTimer::arm`] converts that hint into a
//! live once-per-second countdown that gates re-submission: while armed,
//! the owning ceremony disables its form and treats submissions as
//! no-ops; at zero the timer fires its completion callback so the
//! ceremony can return to its pre-attempt phase and refocus the primary
//! input. [`CooldownTimer::cancel`] aborts the task whenever the owning
//! state is left early.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Duration;

/// One countdown step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CooldownTick {
    pub remaining_secs: u64,
    /// Pre-formatted display text, `"Ns"` or `"M:SS"`.
    pub display: String,
}

/// Format a remaining-seconds value: `"Ns"` below one minute, `"M:SS"` at
/// or above.
pub fn format_countdown(secs: u64) -> String {
    if secs < 60 {
        format!("{secs}s")
    } else {
        format!("{}:{:02}", secs / 60, secs % 60)
    }
}

fn tick(remaining_secs: u64) -> CooldownTick {
    CooldownTick {
        remaining_secs,
        display: format_countdown(remaining_secs),
    }
}

/// Converts a `remainingMs` hint into a live countdown. `None` on the
/// watch channel means no cooldown is in effect.
pub struct CooldownTimer {
    ticks: watch::Sender<Option<CooldownTick>>,
    task: Option<JoinHandle<()>>,
}

impl CooldownTimer {
    pub fn new() -> Self {
        let (ticks, _rx) = watch::channel(None);
        Self { ticks, task: None }
    }

    /// Subscribe to countdown ticks.
    pub fn subscribe(&self) -> watch::Receiver<Option<CooldownTick>> {
        self.ticks.subscribe()
    }

    /// Whether a countdown is currently running.
    pub fn is_armed(&self) -> bool {
        self.ticks.borrow().is_some()
    }

    /// Start a countdown for `remaining_ms`, rounded up to whole seconds.
    /// `on_elapsed` fires exactly once, when the countdown reaches zero.
    /// Re-arming replaces any countdown already in flight.
    pub fn arm(&mut self, remaining_ms: u64, on_elapsed: impl FnOnce() + Send + 'static) {
        self.cancel();
        let mut remaining_secs = remaining_ms.div_ceil(1000);
        tracing::debug!(remaining_secs, "cooldown armed");
        self.ticks.send_replace(Some(tick(remaining_secs)));
        if remaining_secs == 0 {
            // Callers may arm while holding their own state lock; the
            // callback must never run on their stack.
            self.ticks.send_replace(None);
            self.task = Some(tokio::spawn(async move { on_elapsed() }));
            return;
        }

        let ticks = self.ticks.clone();
        self.task = Some(tokio::spawn(async move {
            while remaining_secs > 0 {
                tokio::time::sleep(Duration::from_secs(1)).await;
                remaining_secs -= 1;
                if remaining_secs > 0 {
                    ticks.send_replace(Some(tick(remaining_secs)));
                }
            }
            ticks.send_replace(None);
            on_elapsed();
        }));
    }

    /// Abort the countdown without firing the completion callback.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.ticks.send_replace(None);
    }
}

impl Default for CooldownTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CooldownTimer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn countdown_formatting() {
        assert_eq!(format_countdown(0), "0s");
        assert_eq!(format_countdown(5), "5s");
        assert_eq!(format_countdown(59), "59s");
        assert_eq!(format_countdown(60), "1:00");
        assert_eq!(format_countdown(75), "1:15");
        assert_eq!(format_countdown(600), "10:00");
    }

    #[tokio::test(start_paused = true)]
    async fn decrements_once_per_second_and_fires_once() {
        let mut timer = CooldownTimer::new();
        let fired = Arc::new(AtomicU32::new(0));
        let fired_in_task = Arc::clone(&fired);
        let mut ticks = timer.subscribe();

        timer.arm(5000, move || {
            fired_in_task.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(
            ticks.borrow_and_update().as_ref().unwrap().display,
            "5s"
        );

        let mut seen = Vec::new();
        while ticks.changed().await.is_ok() {
            match ticks.borrow_and_update().clone() {
                Some(t) => seen.push(t.remaining_secs),
                None => break,
            }
        }
        assert_eq!(seen, vec![4, 3, 2, 1]);
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // Nothing further fires.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn partial_seconds_round_up() {
        let mut timer = CooldownTimer::new();
        timer.arm(4200, || {});
        assert_eq!(
            timer.subscribe().borrow().as_ref().unwrap().remaining_secs,
            5
        );
        timer.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_suppresses_the_callback() {
        let mut timer = CooldownTimer::new();
        let fired = Arc::new(AtomicU32::new(0));
        let fired_in_task = Arc::clone(&fired);
        timer.arm(3000, move || {
            fired_in_task.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        tokio::task::yield_now().await;
        timer.cancel();
        assert!(!timer.is_armed());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_hint_fires_immediately() {
        let mut timer = CooldownTimer::new();
        let fired = Arc::new(AtomicU32::new(0));
        let fired_in_task = Arc::clone(&fired);
        timer.arm(0, move || {
            fired_in_task.fetch_add(1, Ordering::SeqCst);
        });
        assert!(!timer.is_armed());
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
