//! Wire DTOs for Credential Service responses.
//!
//! Field names are camelCase on the wire, matching the backend's JSON
//! contract. These types carry no behavior beyond typed accessors; the
//! import-specific [`crate::report::ValidationReport`] lives in its own
//! module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Result of a successful `unlock` or `recoverVault` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockOutcome {
    /// Lifetime number of successful unlocks, maintained by the backend.
    pub unlock_count: u64,
}

/// A freshly issued recovery credential.
///
/// Returned by `changeMasterPassword` and `changePasswordAfterRecovery`.
/// The previous recovery key is invalid the moment this bundle exists, so
/// any cached display of old key material must be replaced with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryKeyBundle {
    /// The recovery key, pre-formatted in display groups for transcription.
    pub formatted_key: String,
    /// Short fingerprint identifying the vault this key belongs to.
    pub vault_fingerprint: String,
    /// When the key was generated.
    pub generation_date: DateTime<Utc>,
}

/// Availability and enrollment state of the OS biometric provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiometricStatus {
    pub available: bool,
    pub provider_name: String,
    pub enrolled: bool,
}

/// Availability and state of hardware-backed key protection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareSecurityStatus {
    pub available: bool,
    pub provider_name: String,
    pub enabled: bool,
}

/// Coarse health classification of the on-disk vault.
///
/// The wire carries a free-form `status` string; unknown values read as
/// [`IntegrityStatus::Degraded`] so callers never branch on raw strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrityStatus {
    Ok,
    Degraded,
    Corrupt,
}

impl<'de> Deserialize<'de> for IntegrityStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let status = String::deserialize(deserializer)?;
        Ok(match status.as_str() {
            "ok" => Self::Ok,
            "corrupt" => Self::Corrupt,
            _ => Self::Degraded,
        })
    }
}

/// Result of a `checkVaultIntegrity` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub status: IntegrityStatus,
    pub message: String,
}

impl IntegrityReport {
    /// Whether the vault passed the integrity check outright.
    pub fn is_healthy(&self) -> bool {
        self.status == IntegrityStatus::Ok
    }
}

/// Result of a successful `confirm<Source>Import` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    /// Number of entries actually written to the vault.
    pub imported: u32,
    /// Number of entries excluded via the skip list.
    pub skipped: u32,
    /// Ids of the newly created vault entries, in import order.
    pub imported_ids: Vec<Uuid>,
}
