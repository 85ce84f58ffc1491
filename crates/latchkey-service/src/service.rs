//! The Credential Service trait.
//!
//! One async method per backend call. Verification and mutation happen
//! together, server-side, inside each call — there is no separate verify
//! endpoint. Implementations classify failures at the boundary (see
//! [`crate::classify`]) so every method returns a typed [`ClassifiedError`]
//! and never a raw payload.
//!
//! The trait is object-safe; the orchestration layer holds an
//! `Arc<dyn CredentialService>` so tests inject
//! [`crate::MockCredentialService`] and production injects the real
//! transport adapter.

use async_trait::async_trait;

use crate::classify::ClassifiedError;
use crate::report::ValidationReport;
use crate::types::{
    BiometricStatus, HardwareSecurityStatus, ImportOutcome, IntegrityReport, RecoveryKeyBundle,
    UnlockOutcome,
};

/// Request/response boundary to the trusted vault backend.
#[async_trait]
pub trait CredentialService: Send + Sync {
    /// Unlock the vault with the master password.
    async fn unlock(&self, password: &str) -> Result<UnlockOutcome, ClassifiedError>;

    /// Atomically verify `current` and rotate the master password to
    /// `new`, issuing a fresh recovery key.
    async fn change_master_password(
        &self,
        current: &str,
        new: &str,
    ) -> Result<RecoveryKeyBundle, ClassifiedError>;

    /// Unlock the vault with a recovery key instead of the password.
    async fn recover_vault(&self, recovery_key: &str) -> Result<UnlockOutcome, ClassifiedError>;

    /// Set a new master password for a vault opened via recovery. Issues a
    /// fresh recovery key; the one just used is retired.
    async fn change_password_after_recovery(
        &self,
        new: &str,
    ) -> Result<RecoveryKeyBundle, ClassifiedError>;

    /// Enroll the OS biometric provider, gated on the master password.
    async fn enroll_biometric(&self, password: &str) -> Result<(), ClassifiedError>;

    /// Remove the biometric enrollment, gated on the master password.
    async fn revoke_biometric(&self, password: &str) -> Result<(), ClassifiedError>;

    /// Query biometric provider availability and enrollment state.
    async fn check_biometric_availability(&self) -> Result<BiometricStatus, ClassifiedError>;

    /// Query hardware-backed key protection state.
    async fn check_hardware_security(&self) -> Result<HardwareSecurityStatus, ClassifiedError>;

    /// Destroy the vault and all its contents, gated on the master
    /// password. Irreversible.
    async fn delete_vault(&self, password: &str) -> Result<(), ClassifiedError>;

    /// Run the backend's integrity check over the on-disk vault.
    async fn check_vault_integrity(&self) -> Result<IntegrityReport, ClassifiedError>;

    /// Parse and validate a foreign export payload without mutating the
    /// vault. `password` is required by sources whose exports are
    /// themselves encrypted.
    async fn validate_import(
        &self,
        payload: &str,
        password: Option<&str>,
    ) -> Result<ValidationReport, ClassifiedError>;

    /// Commit a validated import, excluding every original-sequence index
    /// in `skip_indices`.
    async fn confirm_import(
        &self,
        payload: &str,
        password: Option<&str>,
        skip_indices: &[usize],
    ) -> Result<ImportOutcome, ClassifiedError>;
}
