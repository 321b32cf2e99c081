//! Unit tests for the stack waiter.

use std::time::Duration;

use rstest::{fixture, rstest};
use tokio_util::sync::CancellationToken;

use super::*;
use crate::signer::TransportError;
use crate::test_support::{FakeSleeper, ScriptedControlPlane};

const STACK: &str = "web";
const INTERVAL: Duration = Duration::from_secs(5);

#[fixture]
fn control_plane() -> ScriptedControlPlane {
    ScriptedControlPlane::new()
}

#[fixture]
fn sleeper() -> FakeSleeper {
    FakeSleeper::new()
}

fn waiter<'a>(
    control_plane: &'a ScriptedControlPlane,
    sleeper: &'a FakeSleeper,
    max_attempts: u32,
) -> StackWaiter<'a, ScriptedControlPlane, FakeSleeper> {
    StackWaiter::new(control_plane, sleeper)
        .with_poll_interval(INTERVAL)
        .with_max_attempts(max_attempts)
}

#[rstest]
#[tokio::test]
async fn create_succeeds_on_third_poll(control_plane: ScriptedControlPlane, sleeper: FakeSleeper) {
    control_plane
        .push_status(STACK, StackStatus::CreateInProgress)
        .push_status(STACK, StackStatus::CreateInProgress)
        .push_status(STACK, StackStatus::CreateComplete);

    let outcome = waiter(&control_plane, &sleeper, 10)
        .wait_for(STACK, OperationKind::Create)
        .await
        .expect("stack completes");

    let WaitOutcome::Reached(stack) = outcome else {
        panic!("expected a stack snapshot, got {outcome:?}");
    };
    assert_eq!(stack.status, StackStatus::CreateComplete);
    assert_eq!(control_plane.describe_count(), 3);
    assert_eq!(sleeper.slept(), vec![INTERVAL, INTERVAL]);
}

#[rstest]
#[tokio::test]
async fn times_out_after_exactly_max_attempts(
    control_plane: ScriptedControlPlane,
    sleeper: FakeSleeper,
) {
    for _ in 0..5 {
        control_plane.push_status(STACK, StackStatus::UpdateInProgress);
    }

    let err = waiter(&control_plane, &sleeper, 3)
        .wait_for(STACK, OperationKind::Update)
        .await
        .expect_err("never completes");

    assert_eq!(
        err,
        StackError::Timeout {
            stack_name: String::from(STACK),
            attempts: 3,
            last_status: Some(StackStatus::UpdateInProgress),
        }
    );
    assert_eq!(control_plane.describe_count(), 3);
    assert_eq!(sleeper.slept().len(), 2, "no sleep after the last query");
}

#[rstest]
#[tokio::test]
async fn absent_stack_completes_a_delete(
    control_plane: ScriptedControlPlane,
    sleeper: FakeSleeper,
) {
    control_plane
        .push_status(STACK, StackStatus::DeleteInProgress)
        .push_absent();

    let outcome = waiter(&control_plane, &sleeper, 5)
        .wait_for(STACK, OperationKind::Delete)
        .await
        .expect("deletion completes");

    assert_eq!(outcome, WaitOutcome::Gone);
    assert_eq!(control_plane.describe_count(), 2);
}

#[rstest]
#[tokio::test]
async fn absent_stack_is_transient_during_create(
    control_plane: ScriptedControlPlane,
    sleeper: FakeSleeper,
) {
    control_plane
        .push_absent()
        .push_status(STACK, StackStatus::CreateInProgress)
        .push_status(STACK, StackStatus::CreateComplete);

    let outcome = waiter(&control_plane, &sleeper, 5)
        .wait_for(STACK, OperationKind::Create)
        .await
        .expect("creation completes");

    assert!(matches!(outcome, WaitOutcome::Reached(_)));
    assert_eq!(control_plane.describe_count(), 3);
}

#[rstest]
#[case::create_failed(OperationKind::Create, StackStatus::CreateFailed)]
#[case::rolled_back(OperationKind::Create, StackStatus::RollbackComplete)]
#[case::update_rolled_back(OperationKind::Update, StackStatus::UpdateRollbackComplete)]
#[tokio::test]
async fn failure_terminals_stop_polling(
    control_plane: ScriptedControlPlane,
    sleeper: FakeSleeper,
    #[case] kind: OperationKind,
    #[case] status: StackStatus,
) {
    control_plane.push_stack(Stack::new(STACK, status.clone()).with_reason("Resource Bucket failed"));

    let err = waiter(&control_plane, &sleeper, 5)
        .wait_for(STACK, kind)
        .await
        .expect_err("failure terminal");

    assert_eq!(
        err,
        StackError::DeploymentFailure {
            stack_name: String::from(STACK),
            status,
            reason: Some(String::from("Resource Bucket failed")),
        }
    );
    assert_eq!(control_plane.describe_count(), 1);
    assert!(sleeper.slept().is_empty());
}

#[rstest]
#[tokio::test]
async fn delete_failed_suggests_retaining_resources(
    control_plane: ScriptedControlPlane,
    sleeper: FakeSleeper,
) {
    control_plane
        .push_status(STACK, StackStatus::DeleteInProgress)
        .push_stack(Stack::new(STACK, StackStatus::DeleteFailed).with_reason("Bucket not empty"));

    let err = waiter(&control_plane, &sleeper, 5)
        .wait_for(STACK, OperationKind::Delete)
        .await
        .expect_err("delete failed");

    assert!(matches!(err, StackError::DeleteFailed { .. }));
    let message = err.to_string();
    assert!(message.contains("Bucket not empty"), "{message}");
    assert!(message.contains("--retain"), "{message}");
}

#[rstest]
#[tokio::test]
async fn describe_errors_propagate_without_retry(
    control_plane: ScriptedControlPlane,
    sleeper: FakeSleeper,
) {
    control_plane.push_describe_error(StackError::Transport(TransportError::Network(
        String::from("connection reset"),
    )));

    let err = waiter(&control_plane, &sleeper, 5)
        .wait_for(STACK, OperationKind::Create)
        .await
        .expect_err("transport failure");

    assert!(matches!(err, StackError::Transport(TransportError::Network(_))));
    assert_eq!(control_plane.describe_count(), 1);
}

#[rstest]
#[tokio::test]
async fn cancellation_during_sleep_stops_polling(control_plane: ScriptedControlPlane) {
    for _ in 0..5 {
        control_plane.push_status(STACK, StackStatus::CreateInProgress);
    }
    let token = CancellationToken::new();
    let sleeper = FakeSleeper::cancelling_after(2, token.clone());

    let err = waiter(&control_plane, &sleeper, 10)
        .with_cancellation(token)
        .wait_for(STACK, OperationKind::Create)
        .await
        .expect_err("cancelled");

    assert_eq!(
        err,
        StackError::Cancelled {
            stack_name: String::from(STACK),
            attempts: 2,
        }
    );
    assert_eq!(control_plane.describe_count(), 2);
}

#[rstest]
#[tokio::test]
async fn cancellation_interrupts_a_stalled_sleep(control_plane: ScriptedControlPlane) {
    control_plane.push_status(STACK, StackStatus::CreateInProgress);
    let token = CancellationToken::new();
    let sleeper = FakeSleeper::stalled();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::task::yield_now().await;
        canceller.cancel();
    });

    let err = waiter(&control_plane, &sleeper, 10)
        .with_cancellation(token)
        .wait_for(STACK, OperationKind::Create)
        .await
        .expect_err("cancelled while sleeping");

    assert!(matches!(err, StackError::Cancelled { attempts: 1, .. }));
}

#[rstest]
#[tokio::test]
async fn pre_cancelled_token_makes_no_queries(
    control_plane: ScriptedControlPlane,
    sleeper: FakeSleeper,
) {
    let token = CancellationToken::new();
    token.cancel();

    let err = waiter(&control_plane, &sleeper, 10)
        .with_cancellation(token)
        .wait_for(STACK, OperationKind::Create)
        .await
        .expect_err("cancelled up front");

    assert!(matches!(err, StackError::Cancelled { attempts: 0, .. }));
    assert_eq!(control_plane.describe_count(), 0);
}

#[rstest]
#[tokio::test]
async fn unpolled_describe_leaves_the_script_untouched(
    control_plane: ScriptedControlPlane,
    sleeper: FakeSleeper,
) {
    control_plane.push_status(STACK, StackStatus::CreateComplete);
    let pending = control_plane.describe_stack(STACK);
    drop(pending);
    assert_eq!(control_plane.describe_count(), 0);

    let outcome = waiter(&control_plane, &sleeper, 1)
        .wait_for(STACK, OperationKind::Create)
        .await
        .expect("scripted status is still queued");

    assert!(matches!(outcome, WaitOutcome::Reached(_)));
    assert_eq!(control_plane.describe_count(), 1);
}

#[test]
fn zero_attempts_still_query_once() {
    let control_plane = ScriptedControlPlane::new();
    let sleeper = FakeSleeper::new();
    let waiter = StackWaiter::new(&control_plane, &sleeper).with_max_attempts(0);
    assert!(format!("{waiter:?}").contains("max_attempts: 1"));
}

#[rstest]
#[case::delete_absent(OperationKind::Delete, None, true)]
#[case::create_absent(OperationKind::Create, None, false)]
#[case::update_complete(OperationKind::Update, Some(StackStatus::UpdateComplete), true)]
#[case::cleanup(OperationKind::Update, Some(StackStatus::UpdateCompleteCleanupInProgress), false)]
fn classify_decides_completion(
    #[case] kind: OperationKind,
    #[case] status: Option<StackStatus>,
    #[case] done: bool,
) {
    let stack = status.map(|s| Stack::new(STACK, s));
    let decision = classify(STACK, kind, stack.as_ref());
    assert_eq!(matches!(decision, PollDecision::Done(_)), done);
}
