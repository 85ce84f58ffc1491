//! Injected mock backend.
//!
//! [`MockCredentialService`] is a fully self-contained Credential Service
//! double: every knob lives on the instance, never in module-level state,
//! so tests construct one per case and run in isolation without reset
//! calls. It simulates backend latency with `tokio::time::sleep` (paused
//! clocks advance through it deterministically) and produces its failures
//! as wire-shaped payloads run through [`classify`], exercising the same
//! boundary path a real transport adapter would.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::classify::{ClassifiedError, classify};
use crate::report::ValidationReport;
use crate::service::CredentialService;
use crate::types::{
    BiometricStatus, HardwareSecurityStatus, ImportOutcome, IntegrityReport, IntegrityStatus,
    RecoveryKeyBundle, UnlockOutcome,
};

/// Mutable backend state, all of it behind the instance's one mutex.
struct MockState {
    master_password: String,
    recovery_key: String,
    unlock_count: u64,
    vault_deleted: bool,
    biometric_available: bool,
    biometric_enrolled: bool,
    cancel_next_biometric: bool,
    hardware_enabled: bool,
    integrity: IntegrityReport,
    validation_report: ValidationReport,
    /// Remaining scripted rate-limit failures and the hint they carry.
    rate_limit_script: Option<(u32, u64)>,
    /// Method names in call order, for assertions.
    calls: Vec<&'static str>,
}

/// Test-constructible Credential Service double.
pub struct MockCredentialService {
    latency: Duration,
    state: Mutex<MockState>,
}

impl Default for MockCredentialService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCredentialService {
    /// Create a mock accepting password `"hunter2"` and recovery key
    /// `"AAAA-BBBB-CCCC-DDDD"`, with no latency and a healthy vault.
    pub fn new() -> Self {
        Self {
            latency: Duration::ZERO,
            state: Mutex::new(MockState {
                master_password: "hunter2".to_string(),
                recovery_key: "AAAA-BBBB-CCCC-DDDD".to_string(),
                unlock_count: 0,
                vault_deleted: false,
                biometric_available: true,
                biometric_enrolled: false,
                cancel_next_biometric: false,
                hardware_enabled: false,
                integrity: IntegrityReport {
                    status: IntegrityStatus::Ok,
                    message: "vault is healthy".to_string(),
                },
                validation_report: ValidationReport::default(),
                rate_limit_script: None,
                calls: Vec::new(),
            }),
        }
    }

    /// Set the accepted master password.
    pub fn with_master_password(self, password: impl Into<String>) -> Self {
        self.state.lock().unwrap().master_password = password.into();
        self
    }

    /// Set the accepted recovery key.
    pub fn with_recovery_key(self, key: impl Into<String>) -> Self {
        self.state.lock().unwrap().recovery_key = key.into();
        self
    }

    /// Simulate multi-second backend latency on every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail the next `count` credential-gated calls with `RATE_LIMITED`
    /// carrying `remaining_ms`.
    pub fn fail_rate_limited_times(self, count: u32, remaining_ms: u64) -> Self {
        self.state.lock().unwrap().rate_limit_script = Some((count, remaining_ms));
        self
    }

    /// Canned report returned by `validate_import`.
    pub fn with_validation_report(self, report: ValidationReport) -> Self {
        self.state.lock().unwrap().validation_report = report;
        self
    }

    /// Set biometric provider availability and enrollment.
    pub fn with_biometric(self, available: bool, enrolled: bool) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.biometric_available = available;
            state.biometric_enrolled = enrolled;
        }
        self
    }

    /// Make the next biometric call fail as a user-dismissed prompt.
    pub fn cancel_next_biometric(&self) {
        self.state.lock().unwrap().cancel_next_biometric = true;
    }

    /// Set the canned integrity report.
    pub fn with_integrity(self, status: IntegrityStatus, message: impl Into<String>) -> Self {
        self.state.lock().unwrap().integrity = IntegrityReport {
            status,
            message: message.into(),
        };
        self
    }

    /// Method names in call order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Current lifetime unlock count.
    pub fn unlock_count(&self) -> u64 {
        self.state.lock().unwrap().unlock_count
    }

    /// Whether biometric unlock is currently enrolled.
    pub fn biometric_enrolled(&self) -> bool {
        self.state.lock().unwrap().biometric_enrolled
    }

    async fn begin_call(&self, name: &'static str) {
        self.state.lock().unwrap().calls.push(name);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    /// Produce a failure the way a transport adapter would: format the
    /// wire payload, then classify it at the boundary.
    fn wire_error(code: &str, message: &str, remaining_ms: Option<u64>) -> ClassifiedError {
        let payload = match remaining_ms {
            Some(ms) => serde_json::json!({ "code": code, "message": message, "remainingMs": ms }),
            None => serde_json::json!({ "code": code, "message": message }),
        };
        classify(&payload.to_string())
    }

    /// Consume one scripted rate-limit failure, if armed.
    fn take_rate_limit(state: &mut MockState) -> Option<ClassifiedError> {
        let (count, remaining_ms) = state.rate_limit_script?;
        if count == 0 {
            state.rate_limit_script = None;
            return None;
        }
        state.rate_limit_script = Some((count - 1, remaining_ms));
        Some(Self::wire_error(
            "RATE_LIMITED",
            "too many attempts",
            Some(remaining_ms),
        ))
    }

    /// Gate shared by every password-bearing call.
    fn verify_password(state: &mut MockState, password: &str) -> Result<(), ClassifiedError> {
        if state.vault_deleted {
            return Err(classify("no vault exists at this location"));
        }
        if let Some(err) = Self::take_rate_limit(state) {
            return Err(err);
        }
        if password != state.master_password {
            return Err(Self::wire_error(
                "INVALID_PASSWORD",
                "the password is incorrect",
                None,
            ));
        }
        Ok(())
    }

    fn issue_bundle(state: &mut MockState) -> RecoveryKeyBundle {
        let key = generate_formatted_key();
        state.recovery_key = key.clone();
        RecoveryKeyBundle {
            formatted_key: key,
            vault_fingerprint: "mock-vault-01".to_string(),
            generation_date: Utc::now(),
        }
    }
}

/// Generate a recovery key in display groups, e.g. `7F2A-91CE-04B3-D8E6`.
fn generate_formatted_key() -> String {
    let hex = Uuid::now_v7().simple().to_string().to_uppercase();
    hex.as_bytes()
        .chunks(4)
        .take(4)
        .map(|chunk| std::str::from_utf8(chunk).unwrap_or("0000"))
        .collect::<Vec<_>>()
        .join("-")
}

#[async_trait]
impl CredentialService for MockCredentialService {
    async fn unlock(&self, password: &str) -> Result<UnlockOutcome, ClassifiedError> {
        self.begin_call("unlock").await;
        let mut state = self.state.lock().unwrap();
        Self::verify_password(&mut state, password)?;
        state.unlock_count += 1;
        Ok(UnlockOutcome {
            unlock_count: state.unlock_count,
        })
    }

    async fn change_master_password(
        &self,
        current: &str,
        new: &str,
    ) -> Result<RecoveryKeyBundle, ClassifiedError> {
        self.begin_call("change_master_password").await;
        let mut state = self.state.lock().unwrap();
        Self::verify_password(&mut state, current)?;
        state.master_password = new.to_string();
        Ok(Self::issue_bundle(&mut state))
    }

    async fn recover_vault(&self, recovery_key: &str) -> Result<UnlockOutcome, ClassifiedError> {
        self.begin_call("recover_vault").await;
        let mut state = self.state.lock().unwrap();
        if state.vault_deleted {
            return Err(classify("no vault exists at this location"));
        }
        if let Some(err) = Self::take_rate_limit(&mut state) {
            return Err(err);
        }
        if recovery_key != state.recovery_key {
            return Err(Self::wire_error(
                "INVALID_RECOVERY_KEY",
                "the recovery key is incorrect",
                None,
            ));
        }
        state.unlock_count += 1;
        Ok(UnlockOutcome {
            unlock_count: state.unlock_count,
        })
    }

    async fn change_password_after_recovery(
        &self,
        new: &str,
    ) -> Result<RecoveryKeyBundle, ClassifiedError> {
        self.begin_call("change_password_after_recovery").await;
        let mut state = self.state.lock().unwrap();
        state.master_password = new.to_string();
        Ok(Self::issue_bundle(&mut state))
    }

    async fn enroll_biometric(&self, password: &str) -> Result<(), ClassifiedError> {
        self.begin_call("enroll_biometric").await;
        let mut state = self.state.lock().unwrap();
        if std::mem::take(&mut state.cancel_next_biometric) {
            return Err(Self::wire_error(
                "BIOMETRIC_CANCELLED",
                "prompt dismissed",
                None,
            ));
        }
        if !state.biometric_available {
            return Err(Self::wire_error(
                "BIOMETRIC_FAILED",
                "no biometric provider available",
                None,
            ));
        }
        Self::verify_password(&mut state, password)?;
        state.biometric_enrolled = true;
        Ok(())
    }

    async fn revoke_biometric(&self, password: &str) -> Result<(), ClassifiedError> {
        self.begin_call("revoke_biometric").await;
        let mut state = self.state.lock().unwrap();
        if std::mem::take(&mut state.cancel_next_biometric) {
            return Err(Self::wire_error(
                "BIOMETRIC_CANCELLED",
                "prompt dismissed",
                None,
            ));
        }
        Self::verify_password(&mut state, password)?;
        state.biometric_enrolled = false;
        Ok(())
    }

    async fn check_biometric_availability(&self) -> Result<BiometricStatus, ClassifiedError> {
        self.begin_call("check_biometric_availability").await;
        let state = self.state.lock().unwrap();
        Ok(BiometricStatus {
            available: state.biometric_available,
            provider_name: "MockPrint".to_string(),
            enrolled: state.biometric_enrolled,
        })
    }

    async fn check_hardware_security(&self) -> Result<HardwareSecurityStatus, ClassifiedError> {
        self.begin_call("check_hardware_security").await;
        let state = self.state.lock().unwrap();
        Ok(HardwareSecurityStatus {
            available: true,
            provider_name: "MockEnclave".to_string(),
            enabled: state.hardware_enabled,
        })
    }

    async fn delete_vault(&self, password: &str) -> Result<(), ClassifiedError> {
        self.begin_call("delete_vault").await;
        let mut state = self.state.lock().unwrap();
        Self::verify_password(&mut state, password)?;
        state.vault_deleted = true;
        state.unlock_count = 0;
        Ok(())
    }

    async fn check_vault_integrity(&self) -> Result<IntegrityReport, ClassifiedError> {
        self.begin_call("check_vault_integrity").await;
        Ok(self.state.lock().unwrap().integrity.clone())
    }

    async fn validate_import(
        &self,
        _payload: &str,
        password: Option<&str>,
    ) -> Result<ValidationReport, ClassifiedError> {
        self.begin_call("validate_import").await;
        let mut state = self.state.lock().unwrap();
        if let Some(password) = password {
            Self::verify_password(&mut state, password)?;
        }
        Ok(state.validation_report.clone())
    }

    async fn confirm_import(
        &self,
        _payload: &str,
        password: Option<&str>,
        skip_indices: &[usize],
    ) -> Result<ImportOutcome, ClassifiedError> {
        self.begin_call("confirm_import").await;
        let mut state = self.state.lock().unwrap();
        if let Some(password) = password {
            Self::verify_password(&mut state, password)?;
        }

        let mut candidates = state.validation_report.valid_indices();
        candidates.extend(state.validation_report.duplicate_indices());
        let skipped = skip_indices
            .iter()
            .filter(|index| candidates.contains(*index))
            .count();
        let imported = candidates.len() - skipped;

        tracing::debug!(imported, skipped, "mock import committed");
        Ok(ImportOutcome {
            imported: imported as u32,
            skipped: skipped as u32,
            imported_ids: (0..imported).map(|_| Uuid::now_v7()).collect(),
        })
    }
}
