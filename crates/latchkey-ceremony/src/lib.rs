//! Ceremony orchestration for Latchkey.
//!
//! A *ceremony* is a guided, multi-phase UI flow for a single sensitive
//! vault operation: unlock, master-password rotation, vault recovery,
//! biometric enrollment/revocation, or vault deletion. This crate is the
//! central client-side state machine that drives all of them through one
//! generic phase sequence, gated on proof of identity and backed by the
//! Credential Service boundary in `latchkey-service`.
//!
//! # Modules
//!
//! - [`state`] — phases, events, effects, and the pure reducer.
//! - [`controller`] — [`CeremonyController`], which owns the machine and
//!   its resources and pushes snapshots to subscribers.
//! - [`secret`] — [`SecretCell`], the zeroizing holder for transient
//!   credential text, cleared on every exit path.
//! - [`progress`] — eased, milestone-scripted progress animation for the
//!   multi-second backend calls; completion is always backend-gated.
//! - [`cooldown`] — the rate-limit countdown that gates re-submission.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use latchkey_ceremony::controller::{CeremonyController, NullSessionListener};
//! use latchkey_ceremony::state::OperationKind;
//! use latchkey_service::MockCredentialService;
//!
//! # async fn example() {
//! let service = Arc::new(MockCredentialService::new());
//! let controller = CeremonyController::new(service, Arc::new(NullSessionListener));
//! let mut snapshots = controller.subscribe();
//!
//! controller.begin(OperationKind::Unlock);
//! controller.submit_reauth("correct horse battery staple");
//! snapshots.changed().await.unwrap();
//! # }
//! ```

pub mod controller;
pub mod cooldown;
pub mod progress;
pub mod secret;
pub mod state;

// Re-export the most commonly used types at the crate root for convenience.
pub use controller::{CeremonyController, CeremonySnapshot, NullSessionListener, SessionListener};
pub use cooldown::{CooldownTick, CooldownTimer, format_countdown};
pub use progress::{Milestone, ProgressAnimator, ProgressFrame};
pub use secret::SecretCell;
pub use state::{CeremonyEvent, Effect, Notice, NoticeSeverity, OperationKind, Phase, SessionState};
