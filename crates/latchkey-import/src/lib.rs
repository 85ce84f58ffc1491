//! Import reconciliation for Latchkey.
//!
//! Foreign credential exports arrive as an opaque payload that the
//! Credential Service parses and validates into an immutable
//! [`ValidationReport`]: valid candidates, detected duplicates,
//! unsupported record kinds, and malformed records, each carrying a
//! stable index into the original parsed sequence. This crate owns the
//! *mutable* half of that picture — the [`ImportReconciler`], which
//! tracks the user's selection (checked / skipped / force-imported) and
//! derives the exact skip-index list the backend's confirm call expects.
//!
//! The engine is independent of the ceremony machinery in
//! `latchkey-ceremony`; the two share only the Credential Service
//! boundary and its error classification.

pub mod selection;

// Re-export the report types so import-facing code depends on one crate.
pub use latchkey_service::report::{
    CandidateEntry, DuplicateEntry, EntryDraft, MalformedEntry, UnsupportedEntry, ValidationReport,
};
pub use selection::{ConfirmError, ImportReconciler};
