//! Rollout state machine against a scripted platform and a virtual clock.

mod common;

use std::time::Duration;

use aca_reconcile::{ManualClock, PollPolicy, RunningState};
use aca_rollout::mock::{revision, PlatformCall, ScriptedPlatform};
use aca_rollout::{
    OperationStatus, Orchestrator, PlatformError, RolloutError, RolloutPhase,
};
use common::{built_revision, APP, REVISION};
use rstest::rstest;

fn policy() -> PollPolicy {
    PollPolicy::new(Duration::from_secs(10), Duration::from_secs(300))
}

fn provisioning() -> aca_revision::RevisionResource {
    revision(REVISION, false, "None", "Provisioning", "Activating")
}

fn healthy() -> aca_revision::RevisionResource {
    revision(REVISION, true, "Healthy", "Provisioned", "Running")
}

#[tokio::test]
async fn healthy_after_third_poll_stops_polling() {
    let platform = ScriptedPlatform::new().with_revisions([provisioning(), provisioning(), healthy()]);
    let clock = ManualClock::new();
    let built = built_revision();

    let report = Orchestrator::new(&platform, &clock, policy())
        .rollout(APP, &built)
        .await
        .unwrap();

    assert_eq!(report.phase, RolloutPhase::Healthy);
    assert!(report.result.is_healthy());
    assert_eq!(report.polls, 3);
    assert_eq!(platform.revision_polls(), 3);
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(10); 2]);
    assert_eq!(
        report.result.revision_url.as_deref(),
        Some("https://myapp--prod-20231215120000.azurecontainerapps.io")
    );

    let phases: Vec<_> = report.phases.iter().map(|p| p.phase).collect();
    assert_eq!(
        phases,
        vec![
            RolloutPhase::Submitting,
            RolloutPhase::Provisioning,
            RolloutPhase::Activating,
            RolloutPhase::Healthy,
        ]
    );
}

#[rstest]
#[case::running_failed(revision(REVISION, true, "Unhealthy", "Provisioned", "Failed"))]
#[case::provisioning_failed(revision(REVISION, false, "None", "Failed", "Activating"))]
#[tokio::test]
async fn definitive_failure_fails_fast(#[case] observed: aca_revision::RevisionResource) {
    let platform = ScriptedPlatform::new().with_revisions([observed]);
    let clock = ManualClock::new();

    let report = Orchestrator::new(&platform, &clock, policy())
        .rollout(APP, &built_revision())
        .await
        .unwrap();

    assert_eq!(report.phase, RolloutPhase::Unhealthy);
    assert_eq!(report.polls, 1);
    assert!(clock.sleeps().is_empty());
    assert!(!report.result.is_healthy());
}

#[tokio::test]
async fn no_terminal_state_times_out_with_last_snapshot() {
    let platform = ScriptedPlatform::new().with_revisions([provisioning()]);
    let clock = ManualClock::new();

    let report = Orchestrator::new(&platform, &clock, policy())
        .rollout(APP, &built_revision())
        .await
        .unwrap();

    assert_eq!(report.phase, RolloutPhase::TimedOut);
    assert_eq!(report.polls, 30);
    assert_eq!(report.elapsed, Duration::from_secs(300));
    assert_eq!(clock.elapsed(), Duration::from_secs(300));
    assert_eq!(report.result.running_state, RunningState::Activating);
    assert_eq!(report.result.provisioning_state.as_str(), "Provisioning");
}

#[tokio::test]
async fn sleeps_never_overshoot_the_deadline() {
    let platform = ScriptedPlatform::new().with_revisions([provisioning()]);
    let clock = ManualClock::new();
    let policy = PollPolicy::new(Duration::from_secs(10), Duration::from_secs(25));

    let report = Orchestrator::new(&platform, &clock, policy)
        .rollout(APP, &built_revision())
        .await
        .unwrap();

    assert_eq!(report.phase, RolloutPhase::TimedOut);
    assert_eq!(
        clock.sleeps(),
        vec![
            Duration::from_secs(10),
            Duration::from_secs(10),
            Duration::from_secs(5)
        ]
    );
    assert_eq!(clock.elapsed(), Duration::from_secs(25));
}

#[tokio::test]
async fn invisible_revision_counts_as_in_flight() {
    let platform = ScriptedPlatform::new()
        .with_revision_script([Ok(None), Ok(None)])
        .with_revisions([healthy()]);
    let clock = ManualClock::new();

    let report = Orchestrator::new(&platform, &clock, policy())
        .rollout(APP, &built_revision())
        .await
        .unwrap();

    assert_eq!(report.phase, RolloutPhase::Healthy);
    assert_eq!(report.polls, 3);
}

#[tokio::test]
async fn transient_poll_errors_are_absorbed() {
    let platform = ScriptedPlatform::new()
        .with_revision_script([Err(PlatformError::Transport("connection reset".to_string()))])
        .with_revisions([healthy()]);
    let clock = ManualClock::new();

    let report = Orchestrator::new(&platform, &clock, policy())
        .rollout(APP, &built_revision())
        .await
        .unwrap();

    assert_eq!(report.phase, RolloutPhase::Healthy);
    assert_eq!(report.polls, 2);
}

#[tokio::test]
async fn submission_rejection_is_fatal_and_not_retried() {
    let platform = ScriptedPlatform::new().rejecting(PlatformError::Rejected {
        status: 400,
        code: "ContainerAppInvalidImage".to_string(),
        message: "image registry.azurecr.io/myapp:prod-20231215120000 not found".to_string(),
    });
    let clock = ManualClock::new();

    let err = Orchestrator::new(&platform, &clock, policy())
        .rollout(APP, &built_revision())
        .await
        .unwrap_err();

    match err {
        RolloutError::PlatformRejected {
            revision,
            code,
            message,
        } => {
            assert_eq!(revision, REVISION);
            assert_eq!(code.as_deref(), Some("ContainerAppInvalidImage"));
            assert!(message.contains("not found"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(platform.calls().len(), 1);
    assert_eq!(platform.revision_polls(), 0);
}

#[tokio::test]
async fn failed_operation_is_a_rejection() {
    let platform = ScriptedPlatform::new().with_operation_script([
        Ok(OperationStatus::InProgress),
        Ok(OperationStatus::Failed {
            code: Some("ProvisioningFailed".to_string()),
            message: "quota exceeded".to_string(),
        }),
    ]);
    let clock = ManualClock::new();

    let err = Orchestrator::new(&platform, &clock, policy())
        .rollout(APP, &built_revision())
        .await
        .unwrap_err();

    assert!(matches!(err, RolloutError::PlatformRejected { ref message, .. } if message == "quota exceeded"));
    assert_eq!(platform.revision_polls(), 0);
}

#[tokio::test]
async fn operation_wait_shares_the_deadline() {
    let platform = ScriptedPlatform::new()
        .with_operation_script(std::iter::repeat_with(|| Ok(OperationStatus::InProgress)).take(100))
        .with_revisions([healthy()]);
    let clock = ManualClock::new();

    let report = Orchestrator::new(&platform, &clock, policy())
        .rollout(APP, &built_revision())
        .await
        .unwrap();

    assert_eq!(report.phase, RolloutPhase::TimedOut);
    assert_eq!(report.polls, 0);
    assert_eq!(platform.revision_polls(), 0);
    assert_eq!(clock.elapsed(), Duration::from_secs(300));
}

#[tokio::test]
async fn resubmission_updates_in_place() {
    let platform = ScriptedPlatform::new().with_revisions([healthy()]);
    let clock = ManualClock::new();
    let built = built_revision();
    let orchestrator = Orchestrator::new(&platform, &clock, policy());

    for _ in 0..2 {
        let report = orchestrator.rollout(APP, &built).await.unwrap();
        assert_eq!(report.phase, RolloutPhase::Healthy);
    }

    let submits = platform
        .calls()
        .into_iter()
        .filter(|c| matches!(c, PlatformCall::CreateOrUpdate { .. }))
        .count();
    assert_eq!(submits, 2);
    assert_eq!(platform.creates(), 1);
    assert_eq!(platform.updates(), 1);
    assert_eq!(platform.revision_suffixes(), vec!["prod-20231215120000"]);
}

proptest::proptest! {
    #[test]
    fn timed_out_rollouts_stop_exactly_at_the_deadline(interval in 1u64..60, timeout in 1u64..600) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let platform = ScriptedPlatform::new().with_revisions([provisioning()]);
        let clock = ManualClock::new();
        let policy = PollPolicy::new(Duration::from_secs(interval), Duration::from_secs(timeout));

        let report = runtime
            .block_on(Orchestrator::new(&platform, &clock, policy).rollout(APP, &built_revision()))
            .unwrap();

        proptest::prop_assert_eq!(report.phase, RolloutPhase::TimedOut);
        proptest::prop_assert_eq!(clock.elapsed(), Duration::from_secs(timeout));
        proptest::prop_assert!(clock.sleeps().iter().all(|s| *s <= Duration::from_secs(interval)));
        proptest::prop_assert_eq!(u64::from(report.polls), timeout.div_ceil(interval));
    }
}
