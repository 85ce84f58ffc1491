//! The ceremony controller.
//!
//! [`CeremonyController`] drives every re-auth-gated operation through
//! the generic state machine in [`crate::state`]: it owns the secret
//! cells, the progress animator, and the cooldown timer, applies the pure
//! reducer to each incoming event, runs the resulting effects, and pushes
//! a fresh [`CeremonySnapshot`] to subscribers after every accepted
//! transition.
//!
//! Exactly one ceremony is active per controller at a time. Suspension
//! happens only inside the spawned commit task; everything else is
//! synchronous under one briefly-held mutex, which keeps the machine
//! reentrant-safe. Cancellation is local-only: cancelling resets the
//! machine but does not interrupt an in-flight backend call — a late
//! resolution is recognized by its attempt generation and dropped as
//! stale.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use latchkey_service::classify::ClassifiedError;
use latchkey_service::service::CredentialService;
use latchkey_service::types::RecoveryKeyBundle;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::cooldown::{CooldownTick, CooldownTimer};
use crate::progress::{ProgressAnimator, ProgressFrame};
use crate::secret::SecretCell;
use crate::state::{
    CeremonyCore, CeremonyEvent, Effect, Notice, OperationKind, Phase, SessionState, Transition,
    reduce,
};

/// Interval between simulated progress milestones while a call is
/// outstanding.
const PHASE_STEP_INTERVAL: Duration = Duration::from_secs(2);

/// Pause between the backend-gated jump to 100% and the phase change out
/// of `Committing`, so the completed bar is actually seen.
const SETTLE_DELAY: Duration = Duration::from_millis(300);

// ---------------------------------------------------------------------------
// Session listener
// ---------------------------------------------------------------------------

/// Receives application-level session transitions (invoked exactly once
/// per successful unlock, recovery, or deletion).
///
/// Called from inside the controller's transition applier; implementations
/// must not call back into the controller synchronously.
pub trait SessionListener: Send + Sync {
    fn notify_session_state(&self, state: SessionState);
}

/// Listener for hosts that do not track session state (tests, previews).
pub struct NullSessionListener;

impl SessionListener for NullSessionListener {
    fn notify_session_state(&self, _state: SessionState) {}
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// View-facing snapshot of the active ceremony, pushed after every
/// accepted transition. Progress frames and cooldown ticks ride on their
/// own channels ([`CeremonyController::subscribe_progress`],
/// [`CeremonyController::subscribe_cooldown`]) since they update at a
/// much higher rate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CeremonySnapshot {
    pub kind: Option<OperationKind>,
    pub phase: Phase,
    /// Inline, in-ceremony error (invalid credential, rate limit).
    pub error: Option<ClassifiedError>,
    /// Transient, dismissable notification.
    pub notice: Option<Notice>,
    /// Freshly issued recovery bundle awaiting acknowledgement. Replaces
    /// any previously displayed key material.
    pub artifact: Option<RecoveryKeyBundle>,
    pub artifact_acknowledged: bool,
    /// True while committing or cooling down; the view disables inputs.
    pub form_disabled: bool,
    /// True when the finish action may be invoked from `Success`.
    pub can_finish: bool,
    /// Incremented to pulse the shake indication on the credential field.
    pub shake_seq: u64,
    /// Incremented to request focus back on the primary input.
    pub focus_seq: u64,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

struct Inner {
    core: CeremonyCore,
    /// Current credential (password or recovery key).
    secret: SecretCell,
    /// New credential for flows that collect one.
    new_credential: SecretCell,
    /// Commit generation; resolutions carrying an older value are stale.
    attempt: u64,
    disposed: bool,
    error: Option<ClassifiedError>,
    notice: Option<Notice>,
    artifact: Option<RecoveryKeyBundle>,
    acknowledged: bool,
    shake_seq: u64,
    focus_seq: u64,
    animator: ProgressAnimator,
    cooldown: CooldownTimer,
    snapshots: watch::Sender<CeremonySnapshot>,
}

impl Inner {
    fn commit_is_current(&self, attempt: u64) -> bool {
        !self.disposed && self.attempt == attempt && self.core.phase == Phase::Committing
    }

    fn publish(&self) {
        let phase = self.core.phase;
        self.snapshots.send_replace(CeremonySnapshot {
            kind: self.core.kind,
            phase,
            error: self.error.clone(),
            notice: self.notice.clone(),
            artifact: self.artifact.clone(),
            artifact_acknowledged: self.acknowledged,
            form_disabled: matches!(phase, Phase::Committing | Phase::Cooldown),
            can_finish: phase == Phase::Success
                && (self.artifact.is_none() || self.acknowledged),
            shake_seq: self.shake_seq,
            focus_seq: self.focus_seq,
        });
    }
}

struct Shared {
    inner: Mutex<Inner>,
    service: Arc<dyn CredentialService>,
    session: Arc<dyn SessionListener>,
}

/// Central state machine for sensitive vault operations.
pub struct CeremonyController {
    shared: Arc<Shared>,
}

impl CeremonyController {
    pub fn new(service: Arc<dyn CredentialService>, session: Arc<dyn SessionListener>) -> Self {
        let (snapshots, _rx) = watch::channel(CeremonySnapshot::default());
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    core: CeremonyCore::default(),
                    secret: SecretCell::new(),
                    new_credential: SecretCell::new(),
                    attempt: 0,
                    disposed: false,
                    error: None,
                    notice: None,
                    artifact: None,
                    acknowledged: false,
                    shake_seq: 0,
                    focus_seq: 0,
                    animator: ProgressAnimator::new(),
                    cooldown: CooldownTimer::new(),
                    snapshots,
                }),
                service,
                session,
            }),
        }
    }

    /// Subscribe to ceremony snapshots.
    pub fn subscribe(&self) -> watch::Receiver<CeremonySnapshot> {
        self.shared.inner.lock().unwrap().snapshots.subscribe()
    }

    /// Subscribe to interpolated progress frames.
    pub fn subscribe_progress(&self) -> watch::Receiver<ProgressFrame> {
        self.shared.inner.lock().unwrap().animator.subscribe()
    }

    /// Subscribe to cooldown countdown ticks.
    pub fn subscribe_cooldown(&self) -> watch::Receiver<Option<CooldownTick>> {
        self.shared.inner.lock().unwrap().cooldown.subscribe()
    }

    /// Whether either secret cell currently holds credential text.
    /// Outside an active ceremony this is always `false`.
    pub fn holds_secret(&self) -> bool {
        let inner = self.shared.inner.lock().unwrap();
        !inner.secret.is_empty() || !inner.new_credential.is_empty()
    }

    /// Initiate a sensitive action. Ignored unless the machine is idle.
    pub fn begin(&self, kind: OperationKind) {
        self.shared.dispatch(CeremonyEvent::Begin(kind));
    }

    /// Submit the current credential for the `ReAuth` gate.
    ///
    /// This is a UI gate only — it validates local non-empty input and
    /// advances the phase; the credential is verified by the backend
    /// inside the commit call, not here. Returns `false` when the input
    /// is empty or the machine is not at `ReAuth`.
    pub fn submit_reauth(&self, credential: &str) -> bool {
        let mut inner = self.shared.inner.lock().unwrap();
        if inner.disposed || inner.core.phase != Phase::ReAuth || credential.is_empty() {
            return false;
        }
        inner.secret.set(credential);
        self.shared.dispatch_locked(&mut inner, CeremonyEvent::SubmitReAuth);
        true
    }

    /// Submit and locally validate the new credential (non-empty, equal
    /// confirmation). Returns `false` when validation fails or the
    /// machine is not at `NewCredential`.
    pub fn submit_new_credential(&self, new: &str, confirmation: &str) -> bool {
        let mut inner = self.shared.inner.lock().unwrap();
        if inner.disposed
            || inner.core.phase != Phase::NewCredential
            || new.is_empty()
            || new != confirmation
        {
            return false;
        }
        inner.new_credential.set(new);
        self.shared
            .dispatch_locked(&mut inner, CeremonyEvent::SubmitNewCredential);
        true
    }

    /// Set the safekeeping acknowledgement toggle for a displayed
    /// recovery bundle. Accepted only in `Success` with a bundle held.
    pub fn acknowledge_artifact(&self, checked: bool) {
        let mut inner = self.shared.inner.lock().unwrap();
        if inner.artifact.is_none() {
            return;
        }
        self.shared
            .dispatch_locked(&mut inner, CeremonyEvent::AcknowledgeArtifact(checked));
    }

    /// Terminal finish action from `Success`. For bundle-issuing flows
    /// this is rejected until the acknowledgement toggle is set — the
    /// acknowledgement is never skippable.
    pub fn finish(&self) -> bool {
        let mut inner = self.shared.inner.lock().unwrap();
        if inner.disposed || inner.core.phase != Phase::Success {
            return false;
        }
        if inner.artifact.is_some() && !inner.acknowledged {
            warn!("finish rejected: recovery key not acknowledged");
            return false;
        }
        self.shared.dispatch_locked(&mut inner, CeremonyEvent::Finish);
        true
    }

    /// Explicit user cancel. Resets the local machine; an in-flight
    /// backend call is left to resolve and its resolution is dropped.
    pub fn cancel(&self) {
        self.shared.dispatch(CeremonyEvent::Cancel);
    }

    /// Dismiss the current transient notification.
    pub fn dismiss_notice(&self) {
        let mut inner = self.shared.inner.lock().unwrap();
        if inner.notice.take().is_some() {
            inner.publish();
        }
    }

    /// Deterministic teardown invoked by the view container. Clears the
    /// secret cells and cancels all timers and animation tasks, whatever
    /// state the machine was in. Idempotent; the controller accepts no
    /// further events afterwards.
    pub fn dispose(&self) {
        let mut inner = self.shared.inner.lock().unwrap();
        self.shared.dispatch_locked(&mut inner, CeremonyEvent::Dispose);
        inner.disposed = true;
    }
}

impl Drop for CeremonyController {
    fn drop(&mut self) {
        // Teardown guarantee also holds when the owner forgets dispose().
        if let Ok(mut inner) = self.shared.inner.lock() {
            if !inner.disposed {
                self.shared.dispatch_locked(&mut inner, CeremonyEvent::Dispose);
                inner.disposed = true;
            }
        }
    }
}

impl Shared {
    fn dispatch(self: &Arc<Self>, event: CeremonyEvent) {
        let mut inner = self.inner.lock().unwrap();
        self.dispatch_locked(&mut inner, event);
    }

    fn dispatch_locked(self: &Arc<Self>, inner: &mut Inner, event: CeremonyEvent) {
        if inner.disposed && !matches!(event, CeremonyEvent::Dispose) {
            return;
        }
        let Some(Transition { next, effects }) = reduce(&inner.core, &event) else {
            debug!(phase = ?inner.core.phase, "ceremony event ignored");
            return;
        };
        if let CeremonyEvent::Begin(kind) = event {
            inner.core.kind = Some(kind);
        }
        debug!(from = ?inner.core.phase, to = ?next, kind = ?inner.core.kind, "ceremony transition");
        inner.core.phase = next;
        for effect in effects {
            self.run_effect(inner, effect);
        }
        if inner.core.phase == Phase::Idle {
            inner.core.kind = None;
        }
        inner.publish();
    }

    fn run_effect(self: &Arc<Self>, inner: &mut Inner, effect: Effect) {
        match effect {
            Effect::ClearSecret => inner.secret.clear(),
            Effect::ClearNewCredential => inner.new_credential.clear(),
            Effect::ClearError => inner.error = None,
            Effect::ClearNotice => inner.notice = None,
            Effect::ClearArtifact => {
                inner.artifact = None;
                inner.acknowledged = false;
            }
            Effect::CancelProgress => inner.animator.cancel(),
            Effect::CancelCooldown => inner.cooldown.cancel(),
            Effect::SurfaceInline(err) => inner.error = Some(err),
            Effect::Shake => inner.shake_seq += 1,
            Effect::RestoreFocus => inner.focus_seq += 1,
            Effect::Notify(notice) => inner.notice = Some(notice),
            Effect::NotifySession(state) => self.session.notify_session_state(state),
            Effect::StoreArtifact(bundle) => {
                inner.artifact = Some(bundle);
                inner.acknowledged = false;
            }
            Effect::SetArtifactAcknowledged(checked) => inner.acknowledged = checked,
            Effect::StartCooldown(remaining_ms) => {
                let shared = Arc::clone(self);
                inner.cooldown.arm(remaining_ms, move || {
                    shared.dispatch(CeremonyEvent::CooldownElapsed);
                });
            }
            Effect::StartCommit => self.start_commit(inner),
        }
    }

    /// Spawn the operation's single atomic backend call. The transient
    /// credential copies handed to the task are zeroized when it ends.
    fn start_commit(self: &Arc<Self>, inner: &mut Inner) {
        let Some(kind) = inner.core.kind else {
            return;
        };
        inner.attempt += 1;
        let attempt = inner.attempt;
        inner
            .animator
            .run_milestones(kind.milestones(), PHASE_STEP_INTERVAL);
        info!(?kind, attempt, "ceremony committing");

        let current = Zeroizing::new(inner.secret.read().to_string());
        let fresh = Zeroizing::new(inner.new_credential.read().to_string());
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let result = execute_commit(shared.service.as_ref(), kind, &current, &fresh).await;
            drop(current);
            drop(fresh);
            shared.resolve_commit(attempt, result).await;
        });
    }

    /// Process a backend resolution, dropping it when the ceremony has
    /// already moved on. The displayed completion is backend-gated: the
    /// final progress jump and settle pause run before the phase changes.
    async fn resolve_commit(
        self: Arc<Self>,
        attempt: u64,
        result: Result<Option<RecoveryKeyBundle>, ClassifiedError>,
    ) {
        match result {
            Ok(artifact) => {
                {
                    let mut inner = self.inner.lock().unwrap();
                    if !inner.commit_is_current(attempt) {
                        debug!(attempt, "dropping stale commit success");
                        return;
                    }
                    inner.animator.finish(SETTLE_DELAY);
                }
                tokio::time::sleep(SETTLE_DELAY).await;
                let mut inner = self.inner.lock().unwrap();
                if !inner.commit_is_current(attempt) {
                    debug!(attempt, "dropping stale commit success");
                    return;
                }
                self.dispatch_locked(&mut inner, CeremonyEvent::CommitSucceeded(artifact));
            }
            Err(err) => {
                let mut inner = self.inner.lock().unwrap();
                if !inner.commit_is_current(attempt) {
                    debug!(attempt, "dropping stale commit failure");
                    return;
                }
                info!(code = %err.code, "ceremony commit failed");
                self.dispatch_locked(&mut inner, CeremonyEvent::CommitFailed(err));
            }
        }
    }
}

/// The single atomic backend call for each operation kind. Verification
/// and mutation happen together, server-side.
async fn execute_commit(
    service: &dyn CredentialService,
    kind: OperationKind,
    current: &str,
    fresh: &str,
) -> Result<Option<RecoveryKeyBundle>, ClassifiedError> {
    match kind {
        OperationKind::Unlock => {
            let outcome = service.unlock(current).await?;
            debug!(unlock_count = outcome.unlock_count, "vault unlocked");
            Ok(None)
        }
        OperationKind::ChangePassword => {
            Ok(Some(service.change_master_password(current, fresh).await?))
        }
        OperationKind::Recover => {
            // One logical commit over the backend's two recovery calls:
            // a failure in either routes like any single-call failure.
            let outcome = service.recover_vault(current).await?;
            debug!(unlock_count = outcome.unlock_count, "vault recovered");
            Ok(Some(service.change_password_after_recovery(fresh).await?))
        }
        OperationKind::BiometricEnroll => {
            service.enroll_biometric(current).await?;
            Ok(None)
        }
        OperationKind::BiometricRevoke => {
            service.revoke_biometric(current).await?;
            Ok(None)
        }
        OperationKind::DeleteVault => {
            service.delete_vault(current).await?;
            Ok(None)
        }
    }
}
