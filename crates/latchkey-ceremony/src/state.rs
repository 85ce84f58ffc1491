//! Ceremony state machine — pure data, pure reducer.
//!
//! Every sensitive, re-authentication-gated operation (unlock, master
//! password rotation, vault recovery, biometric enrollment/revocation,
//! vault deletion) runs through the same generic phase sequence:
//!
//! ```text
//! Idle --> ReAuth --> [NewCredential] --> Committing --> Success
//!                                              |  \-> Cooldown (rate-limited)
//!                                              \--> back to ReAuth / Idle on error
//! ```
//!
//! [`reduce`] is a total pure function `(state, event) -> transition`: it
//! performs no I/O and touches no timers. It returns the next phase plus
//! the list of [`Effect`]s the controller must run — clearing secrets,
//! starting or stopping timers, notifying the surrounding application.
//! Event/phase pairs that make no sense return `None` and are ignored,
//! which is what makes the machine reentrant-safe.

use latchkey_service::classify::{ClassifiedError, ErrorCode};
use latchkey_service::types::RecoveryKeyBundle;

use crate::progress::Milestone;

// ---------------------------------------------------------------------------
// Operation kinds
// ---------------------------------------------------------------------------

/// The sensitive operation a ceremony drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Unlock,
    ChangePassword,
    Recover,
    BiometricEnroll,
    BiometricRevoke,
    DeleteVault,
}

/// What the `ReAuth` phase collects for a given operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReauthCredential {
    Password,
    RecoveryKey,
}

impl OperationKind {
    /// Whether the flow collects a new credential between re-auth and
    /// commit.
    pub fn needs_new_credential(self) -> bool {
        matches!(self, Self::ChangePassword | Self::Recover)
    }

    /// Whether a successful commit returns a recovery key bundle that the
    /// user must explicitly acknowledge before finishing.
    pub fn issues_recovery_bundle(self) -> bool {
        matches!(self, Self::ChangePassword | Self::Recover)
    }

    /// Which credential the `ReAuth` phase collects.
    pub fn reauth_credential(self) -> ReauthCredential {
        match self {
            Self::Recover => ReauthCredential::RecoveryKey,
            _ => ReauthCredential::Password,
        }
    }

    /// Whether an invalid-credential failure keeps the already-entered
    /// new credential. True only when the flow's route keeps the
    /// new-credential screen current while re-auth is redone.
    pub fn keeps_new_credential_on_reauth_error(self) -> bool {
        matches!(self, Self::ChangePassword)
    }

    /// The phase a rate-limited attempt resumes into once the cooldown
    /// elapses: the phase immediately preceding `Committing`.
    pub fn pre_commit_phase(self) -> Phase {
        if self.needs_new_credential() {
            Phase::NewCredential
        } else {
            Phase::ReAuth
        }
    }

    /// Application-level session transition a successful commit implies.
    pub fn session_event_on_success(self) -> Option<SessionState> {
        match self {
            Self::Unlock | Self::Recover => Some(SessionState::Unlocked),
            Self::DeleteVault => Some(SessionState::NoVault),
            _ => None,
        }
    }

    /// Phase script the progress animator creeps through while the
    /// operation's backend call is outstanding. The last entry is only
    /// ever reached on actual resolution.
    pub fn milestones(self) -> &'static [Milestone] {
        match self {
            Self::Unlock => &[
                Milestone { label: "deriving key", target_percent: 40.0 },
                Milestone { label: "decrypting vault", target_percent: 75.0 },
                Milestone { label: "unlocked", target_percent: 100.0 },
            ],
            Self::ChangePassword => &[
                Milestone { label: "verifying password", target_percent: 25.0 },
                Milestone { label: "re-encrypting vault", target_percent: 60.0 },
                Milestone { label: "issuing recovery key", target_percent: 85.0 },
                Milestone { label: "password changed", target_percent: 100.0 },
            ],
            Self::Recover => &[
                Milestone { label: "verifying recovery key", target_percent: 25.0 },
                Milestone { label: "rebuilding vault access", target_percent: 60.0 },
                Milestone { label: "issuing recovery key", target_percent: 85.0 },
                Milestone { label: "vault recovered", target_percent: 100.0 },
            ],
            Self::BiometricEnroll => &[
                Milestone { label: "verifying password", target_percent: 45.0 },
                Milestone { label: "enrolling biometric", target_percent: 80.0 },
                Milestone { label: "biometric enabled", target_percent: 100.0 },
            ],
            Self::BiometricRevoke => &[
                Milestone { label: "verifying password", target_percent: 45.0 },
                Milestone { label: "removing biometric", target_percent: 80.0 },
                Milestone { label: "biometric disabled", target_percent: 100.0 },
            ],
            Self::DeleteVault => &[
                Milestone { label: "verifying password", target_percent: 40.0 },
                Milestone { label: "erasing vault", target_percent: 80.0 },
                Milestone { label: "vault deleted", target_percent: 100.0 },
            ],
        }
    }

    /// Notice text for kinds whose `Success` is transient.
    fn success_message(self) -> &'static str {
        match self {
            Self::Unlock => "vault unlocked",
            Self::BiometricEnroll => "biometric unlock enabled",
            Self::BiometricRevoke => "biometric unlock disabled",
            Self::DeleteVault => "vault deleted",
            // Bundle-issuing kinds show the Success phase instead.
            Self::ChangePassword | Self::Recover => "",
        }
    }
}

// ---------------------------------------------------------------------------
// Phases, events, effects
// ---------------------------------------------------------------------------

/// Lifecycle phase of the active ceremony.
///
/// `ReAuth` is a documented two-step UI gate, not verification: it
/// advances on local non-empty input alone, and the credential is only
/// actually verified inside the single atomic backend call of
/// `Committing`. A wrong password therefore "passes" re-auth and fails
/// later, at commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    ReAuth,
    NewCredential,
    Committing,
    /// Rate-limited; the form is disabled while the countdown runs.
    Cooldown,
    /// Terminal for bundle-issuing kinds: the freshly issued recovery key
    /// is displayed and must be acknowledged before `Finish` is accepted.
    Success,
}

/// Application-level session transition announced on certain successes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Locked,
    Unlocked,
    NoVault,
}

/// A transient, dismissable notification for the surrounding view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub severity: NoticeSeverity,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeSeverity {
    Success,
    Error,
}

/// Everything the reducer needs to know about the current ceremony.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CeremonyCore {
    pub kind: Option<OperationKind>,
    pub phase: Phase,
}

/// Inputs to the state machine. Credential text never rides on events;
/// the controller stores it in the secret cells before emitting
/// `SubmitReAuth`/`SubmitNewCredential`.
#[derive(Debug, Clone)]
pub enum CeremonyEvent {
    /// User initiated a sensitive action.
    Begin(OperationKind),
    /// Non-empty current credential entered.
    SubmitReAuth,
    /// Locally valid new credential entered.
    SubmitNewCredential,
    /// The outstanding backend call resolved successfully.
    CommitSucceeded(Option<RecoveryKeyBundle>),
    /// The outstanding backend call failed, already classified.
    CommitFailed(ClassifiedError),
    /// Safekeeping acknowledgement toggled for the displayed bundle.
    AcknowledgeArtifact(bool),
    /// The armed cooldown reached zero.
    CooldownElapsed,
    /// Explicit user cancel.
    Cancel,
    /// Terminal finish action from `Success`.
    Finish,
    /// The owning view is being torn down.
    Dispose,
}

/// Side effects the controller runs after a transition is accepted.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Wipe the current-credential cell.
    ClearSecret,
    /// Wipe the new-credential cell.
    ClearNewCredential,
    /// Discard any inline error.
    ClearError,
    /// Discard any transient notification.
    ClearNotice,
    /// Discard a held recovery bundle and its acknowledgement.
    ClearArtifact,
    /// Spawn the operation's single atomic backend call and start the
    /// progress animation.
    StartCommit,
    /// Cancel all progress animation tasks.
    CancelProgress,
    /// Arm the rate-limit countdown for the given milliseconds.
    StartCooldown(u64),
    /// Cancel the cooldown countdown.
    CancelCooldown,
    /// Show an inline, in-ceremony error.
    SurfaceInline(ClassifiedError),
    /// Pulse the shake indication on the credential field.
    Shake,
    /// Surface a transient notification.
    Notify(Notice),
    /// Announce an application-level session transition.
    NotifySession(SessionState),
    /// Hold a freshly issued recovery bundle for display.
    StoreArtifact(RecoveryKeyBundle),
    /// Set the safekeeping acknowledgement on the displayed bundle.
    SetArtifactAcknowledged(bool),
    /// Return focus to the primary input.
    RestoreFocus,
}

/// An accepted transition: the next phase and the effects to run.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub next: Phase,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn to(next: Phase) -> Self {
        Self {
            next,
            effects: Vec::new(),
        }
    }

    fn with(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Cooldown applied when a `RATE_LIMITED` error arrives without a
/// `remainingMs` hint.
pub const DEFAULT_COOLDOWN_MS: u64 = 30_000;

// ---------------------------------------------------------------------------
// Reducer
// ---------------------------------------------------------------------------

/// The pure reducer. Returns `None` for event/phase pairs the machine
/// ignores.
pub fn reduce(core: &CeremonyCore, event: &CeremonyEvent) -> Option<Transition> {
    match (core.phase, event) {
        (Phase::Idle, CeremonyEvent::Begin(_)) => Some(
            Transition::to(Phase::ReAuth)
                .with(Effect::ClearSecret)
                .with(Effect::ClearNewCredential)
                .with(Effect::ClearError)
                .with(Effect::ClearNotice)
                .with(Effect::ClearArtifact),
        ),

        (Phase::ReAuth, CeremonyEvent::SubmitReAuth) => {
            let kind = core.kind?;
            if kind.needs_new_credential() {
                Some(Transition::to(Phase::NewCredential).with(Effect::ClearError))
            } else {
                Some(
                    Transition::to(Phase::Committing)
                        .with(Effect::ClearError)
                        .with(Effect::StartCommit),
                )
            }
        }

        (Phase::NewCredential, CeremonyEvent::SubmitNewCredential) => Some(
            Transition::to(Phase::Committing)
                .with(Effect::ClearError)
                .with(Effect::StartCommit),
        ),

        (Phase::Committing, CeremonyEvent::CommitSucceeded(artifact)) => {
            let kind = core.kind?;
            let mut transition = Transition::to(if kind.issues_recovery_bundle() {
                Phase::Success
            } else {
                Phase::Idle
            })
            .with(Effect::CancelProgress)
            .with(Effect::ClearSecret)
            .with(Effect::ClearNewCredential);

            if let Some(bundle) = artifact {
                transition = transition.with(Effect::StoreArtifact(bundle.clone()));
            }
            if let Some(session) = kind.session_event_on_success() {
                transition = transition.with(Effect::NotifySession(session));
            }
            if !kind.issues_recovery_bundle() {
                transition = transition.with(Effect::Notify(Notice {
                    severity: NoticeSeverity::Success,
                    message: kind.success_message().to_string(),
                }));
            }
            Some(transition)
        }

        (Phase::Committing, CeremonyEvent::CommitFailed(err)) => {
            let kind = core.kind?;
            Some(reduce_commit_failure(kind, err))
        }

        (Phase::Cooldown, CeremonyEvent::CooldownElapsed) => {
            let kind = core.kind?;
            Some(
                Transition::to(kind.pre_commit_phase())
                    .with(Effect::CancelCooldown)
                    .with(Effect::RestoreFocus),
            )
        }

        (Phase::Success, CeremonyEvent::AcknowledgeArtifact(checked)) => Some(
            Transition::to(Phase::Success).with(Effect::SetArtifactAcknowledged(*checked)),
        ),

        (Phase::Success, CeremonyEvent::Finish) => Some(
            Transition::to(Phase::Idle)
                .with(Effect::ClearSecret)
                .with(Effect::ClearNewCredential)
                .with(Effect::ClearError)
                .with(Effect::ClearArtifact),
        ),

        // Explicit cancel from any non-terminal phase resets everything.
        // Cancellation is local-only: an in-flight backend call is not
        // interrupted, its late resolution is dropped as stale.
        (
            Phase::ReAuth | Phase::NewCredential | Phase::Committing | Phase::Cooldown,
            CeremonyEvent::Cancel,
        ) => Some(full_reset()),

        (_, CeremonyEvent::Dispose) => Some(full_reset()),

        _ => None,
    }
}

fn full_reset() -> Transition {
    Transition::to(Phase::Idle)
        .with(Effect::CancelProgress)
        .with(Effect::CancelCooldown)
        .with(Effect::ClearSecret)
        .with(Effect::ClearNewCredential)
        .with(Effect::ClearError)
        .with(Effect::ClearNotice)
        .with(Effect::ClearArtifact)
}

fn reduce_commit_failure(kind: OperationKind, err: &ClassifiedError) -> Transition {
    match err.code {
        // Keep the user inside the ceremony: disable the form, count
        // down, resume at the pre-attempt phase with entries preserved.
        ErrorCode::RateLimited => Transition::to(Phase::Cooldown)
            .with(Effect::CancelProgress)
            .with(Effect::SurfaceInline(err.clone()))
            .with(Effect::StartCooldown(
                err.remaining_ms.unwrap_or(DEFAULT_COOLDOWN_MS),
            )),

        // The current credential must be re-entered; the in-progress new
        // credential survives only when the flow's route keeps that
        // screen current.
        ErrorCode::InvalidPassword | ErrorCode::InvalidRecoveryKey => {
            let mut transition = Transition::to(Phase::ReAuth)
                .with(Effect::CancelProgress)
                .with(Effect::ClearSecret)
                .with(Effect::SurfaceInline(err.clone()))
                .with(Effect::Shake);
            if !kind.keeps_new_credential_on_reauth_error() {
                transition = transition.with(Effect::ClearNewCredential);
            }
            transition
        }

        // Intentional user back-out: reset silently.
        ErrorCode::BiometricCancelled => full_reset(),

        // User-visible abort: notify, then reset.
        ErrorCode::BiometricFailed | ErrorCode::Unknown => full_reset().with(Effect::Notify(Notice {
            severity: NoticeSeverity::Error,
            message: err.message.clone(),
        })),
    }
}
