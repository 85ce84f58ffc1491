//! Credential Service boundary for Latchkey.
//!
//! Latchkey is the client-side orchestration layer of a local-first
//! credential vault. All cryptography, key derivation, and persistent
//! storage live behind an opaque, trusted backend — the *Credential
//! Service* — reachable only through request/response calls. This crate
//! defines that boundary for the rest of the workspace:
//!
//! - [`service`] — the async [`CredentialService`] trait, one method per
//!   backend call.
//! - [`types`] — serde wire DTOs for every request/response pair.
//! - [`report`] — the immutable import [`ValidationReport`] returned by a
//!   successful validate call.
//! - [`classify`] — turns the backend's opaque error payload into a typed
//!   [`ClassifiedError`]. Classification happens exactly once, here at the
//!   boundary; no raw payload ever crosses into view logic.
//! - [`mock`] — a test-constructible, fully injected backend double for
//!   tests and backend-less operation.

pub mod classify;
pub mod mock;
pub mod report;
pub mod service;
pub mod types;

// Re-export the most commonly used types at the crate root for convenience.
pub use classify::{ClassifiedError, ErrorCode, classify};
pub use mock::MockCredentialService;
pub use report::{CandidateEntry, DuplicateEntry, ValidationReport};
pub use service::CredentialService;
pub use types::{
    BiometricStatus, HardwareSecurityStatus, ImportOutcome, IntegrityReport, IntegrityStatus,
    RecoveryKeyBundle, UnlockOutcome,
};

/// Convenience alias for results at the Credential Service boundary.
pub type Result<T> = std::result::Result<T, ClassifiedError>;
