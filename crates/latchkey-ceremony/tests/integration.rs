//! Integration tests for the latchkey-ceremony crate.
//!
//! These drive full ceremonies against the injected mock backend under a
//! paused clock: happy paths, classified failures, rate-limit cooldown,
//! stale-resolution dropping, and the secret-lifecycle guarantees.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use latchkey_ceremony::controller::{CeremonyController, CeremonySnapshot, SessionListener};
use latchkey_ceremony::state::{NoticeSeverity, OperationKind, Phase, SessionState};
use latchkey_service::{CredentialService, ErrorCode, MockCredentialService};
use tokio::sync::watch;

#[derive(Default)]
struct RecordingListener {
    events: Mutex<Vec<SessionState>>,
}

impl RecordingListener {
    fn events(&self) -> Vec<SessionState> {
        self.events.lock().unwrap().clone()
    }
}

impl SessionListener for RecordingListener {
    fn notify_session_state(&self, state: SessionState) {
        self.events.lock().unwrap().push(state);
    }
}

/// Route ceremony tracing through the test harness. Idempotent; run with
/// `RUST_LOG=latchkey_ceremony=debug` to see per-transition logs.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn harness(
    mock: MockCredentialService,
) -> (CeremonyController, Arc<MockCredentialService>, Arc<RecordingListener>) {
    init_tracing();
    let service = Arc::new(mock);
    let listener = Arc::new(RecordingListener::default());
    let controller = CeremonyController::new(service.clone(), listener.clone());
    (controller, service, listener)
}

async fn wait_for_phase(rx: &mut watch::Receiver<CeremonySnapshot>, phase: Phase) {
    loop {
        if rx.borrow_and_update().phase == phase {
            return;
        }
        rx.changed().await.expect("controller dropped");
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Happy paths
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn unlock_notifies_session_exactly_once() {
    let (controller, _, listener) =
        harness(MockCredentialService::new().with_latency(Duration::from_secs(3)));
    let mut snapshots = controller.subscribe();

    controller.begin(OperationKind::Unlock);
    assert!(controller.submit_reauth("hunter2"));
    assert_eq!(snapshots.borrow().phase, Phase::Committing);
    assert!(snapshots.borrow().form_disabled);

    wait_for_phase(&mut snapshots, Phase::Idle).await;
    let snap = snapshots.borrow().clone();
    assert_eq!(
        snap.notice.as_ref().map(|n| n.severity),
        Some(NoticeSeverity::Success)
    );
    assert_eq!(listener.events(), vec![SessionState::Unlocked]);
    assert!(!controller.holds_secret());
}

#[tokio::test(start_paused = true)]
async fn change_password_gates_finish_on_acknowledgement() {
    let (controller, _, listener) = harness(MockCredentialService::new());
    let mut snapshots = controller.subscribe();

    controller.begin(OperationKind::ChangePassword);
    assert!(controller.submit_reauth("hunter2"));
    assert_eq!(snapshots.borrow().phase, Phase::NewCredential);
    assert!(controller.submit_new_credential("new-pass", "new-pass"));

    wait_for_phase(&mut snapshots, Phase::Success).await;
    let snap = snapshots.borrow().clone();
    assert!(snap.artifact.is_some(), "success must hold the new bundle");
    assert!(!snap.can_finish);
    assert!(!controller.holds_secret(), "secrets cleared on success");

    // The acknowledgement is never skippable.
    assert!(!controller.finish());
    controller.acknowledge_artifact(true);
    assert!(controller.subscribe().borrow().can_finish);
    assert!(controller.finish());

    wait_for_phase(&mut snapshots, Phase::Idle).await;
    assert!(snapshots.borrow().artifact.is_none());
    // Password rotation does not change the session state.
    assert_eq!(listener.events(), vec![]);
}

#[tokio::test(start_paused = true)]
async fn acknowledgement_can_be_withdrawn() {
    let (controller, _, _) = harness(MockCredentialService::new());
    let mut snapshots = controller.subscribe();

    controller.begin(OperationKind::ChangePassword);
    controller.submit_reauth("hunter2");
    controller.submit_new_credential("new-pass", "new-pass");
    wait_for_phase(&mut snapshots, Phase::Success).await;

    controller.acknowledge_artifact(true);
    controller.acknowledge_artifact(false);
    assert!(!controller.finish());
}

#[tokio::test(start_paused = true)]
async fn recover_runs_both_backend_calls_and_unlocks() {
    let (controller, service, listener) = harness(MockCredentialService::new());
    let mut snapshots = controller.subscribe();

    controller.begin(OperationKind::Recover);
    assert!(controller.submit_reauth("AAAA-BBBB-CCCC-DDDD"));
    assert_eq!(snapshots.borrow().phase, Phase::NewCredential);
    assert!(controller.submit_new_credential("fresh-pass", "fresh-pass"));

    wait_for_phase(&mut snapshots, Phase::Success).await;
    assert!(snapshots.borrow().artifact.is_some());
    assert_eq!(listener.events(), vec![SessionState::Unlocked]);
    assert_eq!(
        service.calls(),
        vec!["recover_vault", "change_password_after_recovery"]
    );
}

#[tokio::test(start_paused = true)]
async fn delete_vault_announces_no_vault() {
    let (controller, _, listener) = harness(MockCredentialService::new());
    let mut snapshots = controller.subscribe();

    controller.begin(OperationKind::DeleteVault);
    controller.submit_reauth("hunter2");
    wait_for_phase(&mut snapshots, Phase::Idle).await;
    assert_eq!(listener.events(), vec![SessionState::NoVault]);
}

// ═══════════════════════════════════════════════════════════════════════
//  Classified failures
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn wrong_password_returns_to_reauth_with_shake() {
    let (controller, _, listener) = harness(MockCredentialService::new());
    let mut snapshots = controller.subscribe();

    controller.begin(OperationKind::Unlock);
    controller.submit_reauth("wrong");
    wait_for_phase(&mut snapshots, Phase::ReAuth).await;

    let snap = snapshots.borrow().clone();
    assert_eq!(
        snap.error.as_ref().map(|e| e.code),
        Some(ErrorCode::InvalidPassword)
    );
    assert_eq!(snap.shake_seq, 1);
    assert!(!controller.holds_secret(), "wrong password must be wiped");
    assert_eq!(listener.events(), vec![]);
}

#[tokio::test(start_paused = true)]
async fn invalid_recovery_key_discards_entered_new_credential() {
    let (controller, _, _) = harness(MockCredentialService::new());
    let mut snapshots = controller.subscribe();

    controller.begin(OperationKind::Recover);
    controller.submit_reauth("XXXX-0000");
    controller.submit_new_credential("fresh-pass", "fresh-pass");
    wait_for_phase(&mut snapshots, Phase::ReAuth).await;

    assert_eq!(
        snapshots.borrow().error.as_ref().map(|e| e.code),
        Some(ErrorCode::InvalidRecoveryKey)
    );
    assert!(!controller.holds_secret());
}

#[tokio::test(start_paused = true)]
async fn biometric_cancel_resets_silently() {
    let (controller, service, _) = harness(MockCredentialService::new());
    let mut snapshots = controller.subscribe();

    service.cancel_next_biometric();
    controller.begin(OperationKind::BiometricEnroll);
    controller.submit_reauth("hunter2");
    wait_for_phase(&mut snapshots, Phase::Idle).await;

    let snap = snapshots.borrow().clone();
    assert!(snap.notice.is_none(), "intentional back-out surfaces nothing");
    assert!(snap.error.is_none());
    assert!(!controller.holds_secret());
}

#[tokio::test(start_paused = true)]
async fn unknown_failure_surfaces_dismissable_notice() {
    let mock = MockCredentialService::new();
    // Deleting the vault out-of-band makes every later call fail with an
    // unclassifiable plain-string payload.
    mock.delete_vault("hunter2").await.unwrap();
    let (controller, _, _) = harness(mock);
    let mut snapshots = controller.subscribe();

    controller.begin(OperationKind::Unlock);
    controller.submit_reauth("hunter2");
    wait_for_phase(&mut snapshots, Phase::Idle).await;

    let snap = snapshots.borrow().clone();
    let notice = snap.notice.expect("unknown failures must notify");
    assert_eq!(notice.severity, NoticeSeverity::Error);

    controller.dismiss_notice();
    assert!(controller.subscribe().borrow().notice.is_none());
}

// ═══════════════════════════════════════════════════════════════════════
//  Rate limiting
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn rate_limited_commit_cools_down_and_resumes() {
    let (controller, _, listener) =
        harness(MockCredentialService::new().fail_rate_limited_times(1, 5000));
    let mut snapshots = controller.subscribe();
    let mut cooldown = controller.subscribe_cooldown();

    controller.begin(OperationKind::Unlock);
    controller.submit_reauth("hunter2");
    wait_for_phase(&mut snapshots, Phase::Cooldown).await;

    let snap = snapshots.borrow().clone();
    assert!(snap.form_disabled);
    assert_eq!(snap.error.as_ref().map(|e| e.code), Some(ErrorCode::RateLimited));
    assert_eq!(
        cooldown.borrow_and_update().as_ref().map(|t| t.display.clone()),
        Some("5s".to_string())
    );
    // Submission while armed is a no-op.
    assert!(!controller.submit_reauth("hunter2"));

    wait_for_phase(&mut snapshots, Phase::ReAuth).await;
    let snap = snapshots.borrow().clone();
    assert!(!snap.form_disabled);
    assert_eq!(snap.focus_seq, 1, "focus returns to the primary input");
    assert!(cooldown.borrow_and_update().is_none());

    // The script is exhausted; retry succeeds end to end.
    assert!(controller.submit_reauth("hunter2"));
    wait_for_phase(&mut snapshots, Phase::Idle).await;
    assert_eq!(listener.events(), vec![SessionState::Unlocked]);
}

#[tokio::test(start_paused = true)]
async fn rate_limit_preserves_the_entered_new_credential() {
    let (controller, _, _) =
        harness(MockCredentialService::new().fail_rate_limited_times(1, 3000));
    let mut snapshots = controller.subscribe();

    controller.begin(OperationKind::ChangePassword);
    controller.submit_reauth("hunter2");
    controller.submit_new_credential("new-pass", "new-pass");
    wait_for_phase(&mut snapshots, Phase::Cooldown).await;
    assert!(
        controller.holds_secret(),
        "entered credentials survive a rate limit"
    );

    // Resumes at the phase immediately preceding the commit.
    wait_for_phase(&mut snapshots, Phase::NewCredential).await;
    assert!(controller.submit_new_credential("new-pass", "new-pass"));
    wait_for_phase(&mut snapshots, Phase::Success).await;
}

// ═══════════════════════════════════════════════════════════════════════
//  Cancellation, teardown, stale resolutions
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn late_resolution_after_cancel_is_dropped() {
    let (controller, _, listener) =
        harness(MockCredentialService::new().with_latency(Duration::from_secs(5)));
    let mut snapshots = controller.subscribe();

    controller.begin(OperationKind::Unlock);
    controller.submit_reauth("hunter2");
    assert_eq!(snapshots.borrow_and_update().phase, Phase::Committing);

    controller.cancel();
    assert_eq!(snapshots.borrow_and_update().phase, Phase::Idle);
    assert!(!controller.holds_secret());

    // Let the abandoned call resolve; the ceremony must not move.
    tokio::time::sleep(Duration::from_secs(10)).await;
    tokio::task::yield_now().await;
    let snap = snapshots.borrow().clone();
    assert_eq!(snap.phase, Phase::Idle);
    assert!(snap.notice.is_none());
    assert_eq!(listener.events(), vec![]);
}

#[tokio::test(start_paused = true)]
async fn dispose_mid_commit_clears_secret_and_ignores_resolution() {
    let (controller, _, listener) =
        harness(MockCredentialService::new().with_latency(Duration::from_secs(5)));

    controller.begin(OperationKind::Unlock);
    controller.submit_reauth("hunter2");
    controller.dispose();
    assert!(!controller.holds_secret());

    tokio::time::sleep(Duration::from_secs(10)).await;
    tokio::task::yield_now().await;
    assert_eq!(listener.events(), vec![]);
}

// ═══════════════════════════════════════════════════════════════════════
//  Progress animation
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn displayed_completion_is_backend_gated() {
    let (controller, _, _) =
        harness(MockCredentialService::new().with_latency(Duration::from_secs(8)));
    let mut snapshots = controller.subscribe();
    let progress = controller.subscribe_progress();

    controller.begin(OperationKind::Unlock);
    controller.submit_reauth("hunter2");

    // Mid-call the simulated creep has moved but must not claim
    // completion: the final milestone waits for the backend.
    tokio::time::sleep(Duration::from_secs(4)).await;
    tokio::task::yield_now().await;
    let frame = progress.borrow().clone();
    assert!(frame.percent > 0.0);
    assert!(frame.percent < 100.0);
    assert_ne!(frame.label, "unlocked");

    wait_for_phase(&mut snapshots, Phase::Idle).await;
}
