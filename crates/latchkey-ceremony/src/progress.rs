//! Progress animation for in-flight backend calls.
//!
//! The Credential Service takes multiple seconds for its heavy operations
//! and reports nothing until it resolves, so the animator fabricates
//! smooth intermediate motion: a per-frame eased tween toward the current
//! target, re-armed by a coarse milestone creep that steps through an
//! ordered phase script. The creep deliberately never arms the final
//! milestone — the jump to 100% and its short settle pause happen only in
//! [`ProgressAnimator::finish`], which the controller calls when the
//! backend call actually resolves. Displayed completion is therefore
//! always backend-gated even though the intermediate motion is simulated.
//!
//! All spawned tasks are abortable and [`ProgressAnimator::cancel`] is
//! invoked unconditionally whenever the owning ceremony leaves the
//! in-progress phase, so no orphaned frame callback can touch a reset
//! view.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Interval between interpolation frames (~60 fps).
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// One displayed frame: interpolated percent plus the current phase label.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressFrame {
    /// Interpolated progress, `0.0..=100.0`.
    pub percent: f32,
    /// Discrete phase label for the milestone currently in effect.
    pub label: String,
}

impl Default for ProgressFrame {
    fn default() -> Self {
        Self {
            percent: 0.0,
            label: String::new(),
        }
    }
}

/// One step of an operation's phase script.
#[derive(Debug, Clone, Copy)]
pub struct Milestone {
    pub label: &'static str,
    pub target_percent: f32,
}

/// Ease-out quadratic: fast start, gentle landing.
fn ease_out_quad(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t) * (1.0 - t)
}

/// State shared between the animator handle and its spawned tasks.
struct Shared {
    percent: Mutex<f32>,
    label: Mutex<String>,
    /// Label and settle target for the milestone only `finish` may reach.
    final_milestone: Mutex<Option<Milestone>>,
    /// The currently armed tween, owned here so the creep task can re-arm
    /// it and `cancel` can still reach it.
    tween: Mutex<Option<JoinHandle<()>>>,
    frames: watch::Sender<ProgressFrame>,
}

impl Shared {
    fn publish(&self) {
        let frame = ProgressFrame {
            percent: *self.percent.lock().unwrap(),
            label: self.label.lock().unwrap().clone(),
        };
        self.frames.send_replace(frame);
    }
}

/// Abort the active tween, if any, and arm a new one toward `target`.
fn arm_tween(shared: &Arc<Shared>, target: f32, duration: Duration) {
    let task = {
        let shared = Arc::clone(shared);
        tokio::spawn(async move {
            let start = *shared.percent.lock().unwrap();
            let begun = tokio::time::Instant::now();
            let mut frames = tokio::time::interval(FRAME_INTERVAL);
            frames.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                frames.tick().await;
                let t = if duration.is_zero() {
                    1.0
                } else {
                    begun.elapsed().as_secs_f32() / duration.as_secs_f32()
                };
                let value = start + (target - start) * ease_out_quad(t);
                *shared.percent.lock().unwrap() = value.clamp(0.0, 100.0);
                shared.publish();
                if t >= 1.0 {
                    break;
                }
            }
        })
    };
    if let Some(previous) = shared.tween.lock().unwrap().replace(task) {
        previous.abort();
    }
}

/// Produces a smoothly interpolated 0–100 progress value and a discrete
/// phase label, decoupled from actual backend completion time.
pub struct ProgressAnimator {
    shared: Arc<Shared>,
    creep: Option<JoinHandle<()>>,
}

impl ProgressAnimator {
    pub fn new() -> Self {
        let (frames, _rx) = watch::channel(ProgressFrame::default());
        Self {
            shared: Arc::new(Shared {
                percent: Mutex::new(0.0),
                label: Mutex::new(String::new()),
                final_milestone: Mutex::new(None),
                tween: Mutex::new(None),
                frames,
            }),
            creep: None,
        }
    }

    /// Subscribe to interpolated frames.
    pub fn subscribe(&self) -> watch::Receiver<ProgressFrame> {
        self.shared.frames.subscribe()
    }

    /// Current interpolated percent.
    pub fn percent(&self) -> f32 {
        *self.shared.percent.lock().unwrap()
    }

    /// Begin an eased interpolation from the current value toward
    /// `target_percent` over `duration`. A new call re-arms the tween.
    pub fn animate_to(&mut self, target_percent: f32, duration: Duration) {
        arm_tween(&self.shared, target_percent, duration);
    }

    /// Run an operation's phase script: immediately arm the first
    /// milestone, then advance one milestone per `step_interval`. The
    /// final milestone is never armed here; it is reserved for
    /// [`Self::finish`].
    pub fn run_milestones(&mut self, milestones: &'static [Milestone], step_interval: Duration) {
        self.cancel();
        let Some((last, creep_steps)) = milestones.split_last() else {
            return;
        };
        *self.shared.final_milestone.lock().unwrap() = Some(*last);
        if creep_steps.is_empty() {
            return;
        }

        let shared = Arc::clone(&self.shared);
        let tween_duration = step_interval.min(Duration::from_millis(800));
        self.creep = Some(tokio::spawn(async move {
            for (i, milestone) in creep_steps.iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(step_interval).await;
                }
                tracing::debug!(label = milestone.label, target = milestone.target_percent, "progress milestone");
                *shared.label.lock().unwrap() = milestone.label.to_string();
                arm_tween(&shared, milestone.target_percent, tween_duration);
            }
            // Crept as far as simulation is allowed to go; the last
            // milestone waits for the backend.
        }));
    }

    /// Backend-gated completion: stop the creep, switch to the final
    /// milestone's label, and tween to 100 over the settle window.
    pub fn finish(&mut self, settle: Duration) {
        if let Some(creep) = self.creep.take() {
            creep.abort();
        }
        if let Some(last) = self.shared.final_milestone.lock().unwrap().take() {
            *self.shared.label.lock().unwrap() = last.label.to_string();
        }
        arm_tween(&self.shared, 100.0, settle);
    }

    /// Abort every outstanding task and reset to an idle frame.
    pub fn cancel(&mut self) {
        if let Some(creep) = self.creep.take() {
            creep.abort();
        }
        if let Some(tween) = self.shared.tween.lock().unwrap().take() {
            tween.abort();
        }
        *self.shared.final_milestone.lock().unwrap() = None;
        *self.shared.percent.lock().unwrap() = 0.0;
        self.shared.label.lock().unwrap().clear();
        self.shared.publish();
    }
}

impl Default for ProgressAnimator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProgressAnimator {
    fn drop(&mut self) {
        if let Some(creep) = self.creep.take() {
            creep.abort();
        }
        if let Some(tween) = self.shared.tween.lock().unwrap().take() {
            tween.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &[Milestone] = &[
        Milestone { label: "deriving key", target_percent: 35.0 },
        Milestone { label: "re-encrypting", target_percent: 70.0 },
        Milestone { label: "done", target_percent: 100.0 },
    ];

    #[tokio::test(start_paused = true)]
    async fn tween_reaches_target_with_easing() {
        let mut animator = ProgressAnimator::new();
        animator.animate_to(80.0, Duration::from_millis(400));

        tokio::time::sleep(Duration::from_millis(200)).await;
        tokio::task::yield_now().await;
        let halfway = animator.percent();
        // Ease-out covers 75% of the distance by the midpoint.
        assert!(halfway > 40.0, "halfway point was {halfway}");

        tokio::time::sleep(Duration::from_millis(400)).await;
        tokio::task::yield_now().await;
        assert!((animator.percent() - 80.0).abs() < 0.5);
    }

    #[tokio::test(start_paused = true)]
    async fn creep_never_reaches_final_milestone() {
        let mut animator = ProgressAnimator::new();
        animator.run_milestones(SCRIPT, Duration::from_secs(2));

        // Far longer than the whole script would take.
        tokio::time::sleep(Duration::from_secs(30)).await;
        tokio::task::yield_now().await;

        let frame = animator.subscribe().borrow().clone();
        assert_eq!(frame.label, "re-encrypting");
        assert!(frame.percent <= 70.5, "crept to {}", frame.percent);
    }

    #[tokio::test(start_paused = true)]
    async fn finish_jumps_to_final_milestone() {
        let mut animator = ProgressAnimator::new();
        animator.run_milestones(SCRIPT, Duration::from_secs(2));
        tokio::time::sleep(Duration::from_secs(1)).await;

        animator.finish(Duration::from_millis(300));
        tokio::time::sleep(Duration::from_millis(400)).await;
        tokio::task::yield_now().await;

        let frame = animator.subscribe().borrow().clone();
        assert_eq!(frame.label, "done");
        assert!((frame.percent - 100.0).abs() < 0.5);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_resets_and_stops_motion() {
        let mut animator = ProgressAnimator::new();
        animator.run_milestones(SCRIPT, Duration::from_secs(2));
        tokio::time::sleep(Duration::from_secs(3)).await;
        tokio::task::yield_now().await;
        assert!(animator.percent() > 0.0);

        animator.cancel();
        assert_eq!(animator.percent(), 0.0);

        // No orphaned task moves it afterwards.
        tokio::time::sleep(Duration::from_secs(10)).await;
        tokio::task::yield_now().await;
        assert_eq!(animator.percent(), 0.0);
    }
}
