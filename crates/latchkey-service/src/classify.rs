//! Error classification for the Credential Service boundary.
//!
//! The backend reports failures as an opaque string that is either a
//! JSON-encoded object `{"code", "message", "remainingMs"?}` or a plain
//! human-readable message. [`classify`] turns either form into a
//! [`ClassifiedError`], always: unparseable input, a missing `code` field,
//! or an unrecognized code all fall back to [`ErrorCode::Unknown`] carrying
//! the original text. The function is total and never panics.

use serde::{Deserialize, Serialize};

/// Message used when the backend hands us an empty error payload.
const GENERIC_FAILURE_MESSAGE: &str = "the operation failed for an unknown reason";

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Typed failure category reported by the Credential Service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// The supplied master password did not verify.
    InvalidPassword,
    /// The supplied recovery key did not verify.
    InvalidRecoveryKey,
    /// The backend is enforcing a minimum wait before the next attempt.
    /// [`ClassifiedError::remaining_ms`] carries the wait hint.
    RateLimited,
    /// The user dismissed the OS biometric prompt. Treated as a silent,
    /// intentional abort — no error is surfaced.
    BiometricCancelled,
    /// The OS biometric check ran and rejected the user.
    BiometricFailed,
    /// Anything the classifier could not map to a known code.
    Unknown,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCode::InvalidPassword => "invalid-password",
            ErrorCode::InvalidRecoveryKey => "invalid-recovery-key",
            ErrorCode::RateLimited => "rate-limited",
            ErrorCode::BiometricCancelled => "biometric-cancelled",
            ErrorCode::BiometricFailed => "biometric-failed",
            ErrorCode::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A classified Credential Service failure.
///
/// This is the single error type every [`crate::CredentialService`] method
/// returns. Call sites never see the raw wire payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("credential service error ({code}): {message}")]
pub struct ClassifiedError {
    /// Failure category.
    pub code: ErrorCode,
    /// Human-readable message, suitable for inline display.
    pub message: String,
    /// Rate-limit wait hint in milliseconds, present only for
    /// [`ErrorCode::RateLimited`].
    pub remaining_ms: Option<u64>,
}

impl ClassifiedError {
    /// Build an error with a known code and no rate-limit hint.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            remaining_ms: None,
        }
    }

    /// Build an `Unknown` error from free-form text.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unknown, message)
    }

    /// Build a `RateLimited` error carrying a wait hint.
    pub fn rate_limited(message: impl Into<String>, remaining_ms: u64) -> Self {
        Self {
            code: ErrorCode::RateLimited,
            message: message.into(),
            remaining_ms: Some(remaining_ms),
        }
    }

    /// Whether the user should stay inside the current ceremony (inline
    /// message, optional cooldown) rather than being returned to idle.
    pub fn is_recoverable_in_flow(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::InvalidPassword | ErrorCode::InvalidRecoveryKey | ErrorCode::RateLimited
        )
    }

    /// Whether the failure represents an intentional user back-out that
    /// should reset the ceremony without surfacing anything.
    pub fn is_silent_abort(&self) -> bool {
        self.code == ErrorCode::BiometricCancelled
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Wire shape of a structured error payload. Every field is optional so a
/// partially well-formed object still decodes and falls through to the
/// `Unknown` path instead of erroring.
#[derive(Debug, Deserialize)]
struct WirePayload {
    code: Option<String>,
    message: Option<String>,
    #[serde(rename = "remainingMs")]
    remaining_ms: Option<u64>,
}

/// Classify an opaque error payload from the Credential Service.
///
/// Attempts a structured JSON decode first; on decode failure, a missing
/// `code`, or an unrecognized `code`, falls back to
/// `{code: Unknown, message: <original text>}` (or a generic message when
/// the text is blank). Never fails, no side effects.
pub fn classify(raw: &str) -> ClassifiedError {
    if let Ok(payload) = serde_json::from_str::<WirePayload>(raw)
        && let Some(code) = payload.code.as_deref().and_then(parse_code)
    {
        let message = payload
            .message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| default_message(code).to_string());
        return ClassifiedError {
            code,
            message,
            remaining_ms: payload.remaining_ms.filter(|_| code == ErrorCode::RateLimited),
        };
    }

    let trimmed = raw.trim();
    ClassifiedError::unknown(if trimmed.is_empty() {
        GENERIC_FAILURE_MESSAGE
    } else {
        trimmed
    })
}

/// Map a wire `code` string to a typed code. Unrecognized codes return
/// `None` so the caller can apply the `Unknown` fallback with the full
/// original text preserved.
fn parse_code(code: &str) -> Option<ErrorCode> {
    match code {
        "INVALID_PASSWORD" => Some(ErrorCode::InvalidPassword),
        "INVALID_RECOVERY_KEY" => Some(ErrorCode::InvalidRecoveryKey),
        "RATE_LIMITED" => Some(ErrorCode::RateLimited),
        "BIOMETRIC_CANCELLED" => Some(ErrorCode::BiometricCancelled),
        "BIOMETRIC_FAILED" => Some(ErrorCode::BiometricFailed),
        _ => None,
    }
}

/// Fallback display text for structured payloads that omit `message`.
fn default_message(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::InvalidPassword => "the password is incorrect",
        ErrorCode::InvalidRecoveryKey => "the recovery key is incorrect",
        ErrorCode::RateLimited => "too many attempts, please wait",
        ErrorCode::BiometricCancelled => "biometric prompt was dismissed",
        ErrorCode::BiometricFailed => "biometric verification failed",
        ErrorCode::Unknown => GENERIC_FAILURE_MESSAGE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_payload_with_known_code() {
        let err = classify(r#"{"code":"INVALID_PASSWORD","message":"nope"}"#);
        assert_eq!(err.code, ErrorCode::InvalidPassword);
        assert_eq!(err.message, "nope");
        assert_eq!(err.remaining_ms, None);
    }

    #[test]
    fn rate_limited_carries_hint() {
        let err = classify(r#"{"code":"RATE_LIMITED","message":"slow down","remainingMs":5000}"#);
        assert_eq!(err.code, ErrorCode::RateLimited);
        assert_eq!(err.remaining_ms, Some(5000));
    }

    #[test]
    fn remaining_ms_ignored_for_non_rate_limit_codes() {
        let err = classify(r#"{"code":"INVALID_PASSWORD","message":"x","remainingMs":9}"#);
        assert_eq!(err.remaining_ms, None);
    }

    #[test]
    fn unrecognized_code_preserves_original_text() {
        let raw = r#"{"code":"KABOOM","message":"exploded"}"#;
        let err = classify(raw);
        assert_eq!(err.code, ErrorCode::Unknown);
        assert_eq!(err.message, raw);
    }

    #[test]
    fn missing_code_falls_back_to_unknown() {
        let raw = r#"{"message":"no code here"}"#;
        let err = classify(raw);
        assert_eq!(err.code, ErrorCode::Unknown);
        assert_eq!(err.message, raw);
    }

    #[test]
    fn plain_string_becomes_unknown_message() {
        let err = classify("disk on fire");
        assert_eq!(err.code, ErrorCode::Unknown);
        assert_eq!(err.message, "disk on fire");
    }

    #[test]
    fn blank_input_gets_generic_message() {
        for raw in ["", "   ", "\n\t"] {
            let err = classify(raw);
            assert_eq!(err.code, ErrorCode::Unknown);
            assert_eq!(err.message, GENERIC_FAILURE_MESSAGE);
        }
    }

    #[test]
    fn structured_payload_with_blank_message_uses_default() {
        let err = classify(r#"{"code":"RATE_LIMITED","message":"  "}"#);
        assert_eq!(err.code, ErrorCode::RateLimited);
        assert_eq!(err.message, "too many attempts, please wait");
    }

    #[test]
    fn taxonomy_predicates() {
        assert!(classify(r#"{"code":"RATE_LIMITED"}"#).is_recoverable_in_flow());
        assert!(classify(r#"{"code":"INVALID_RECOVERY_KEY"}"#).is_recoverable_in_flow());
        assert!(classify(r#"{"code":"BIOMETRIC_CANCELLED"}"#).is_silent_abort());
        assert!(!classify("whatever").is_recoverable_in_flow());
        assert!(!classify("whatever").is_silent_abort());
    }
}
