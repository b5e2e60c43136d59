//! Behavioural tests for the flow executor.
//!
//! Delivery goes through `MockNotifier`; time goes through `ManualTimer`
//! (virtual clock, recorded sleeps) or `TokioTimer` under tokio's paused
//! clock, so no test actually waits.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use notifier::mock::MockNotifier;
use notifier::{DeliveryError, Notification, Notifier};

use crate::executor::render_notification;
use crate::models::{Connection, DelayPayload, DelayUnit, FlowModel, RunContext, Step, StepKind};
use crate::{
    EngineError, ExecutorConfig, FlowExecutor, ManualTimer, RunOutcome, RunState, StopReason, Timer,
    TokioTimer,
};

const RECIPIENT: &str = "someone@example.com";

fn ctx() -> RunContext {
    RunContext::new(RECIPIENT)
}

struct Harness {
    executor: FlowExecutor,
    notifier: Arc<MockNotifier>,
    timer: Arc<ManualTimer>,
}

fn harness_with(notifier: MockNotifier) -> Harness {
    let notifier = Arc::new(notifier);
    let timer = Arc::new(ManualTimer::starting_at(
        Utc.with_ymd_and_hms(2026, 10, 15, 8, 0, 0).unwrap(),
    ));
    let executor = FlowExecutor::new(notifier.clone(), timer.clone(), ExecutorConfig::default());
    Harness { executor, notifier, timer }
}

fn harness() -> Harness {
    harness_with(MockNotifier::accepting())
}

impl Harness {
    async fn run(&self, flow: &FlowModel) -> RunOutcome {
        self.executor.run(flow, &ctx(), &CancellationToken::new()).await
    }

    fn texts(&self) -> Vec<String> {
        self.notifier.delivered().into_iter().map(|n| n.text).collect()
    }
}

fn flow(steps: Vec<Step>, edges: &[(&str, &str)]) -> FlowModel {
    FlowModel::new(
        steps,
        edges.iter().map(|(s, t)| Connection::new(*s, *t)).collect(),
    )
}

// ============================================================
// Degenerate flows
// ============================================================

#[tokio::test]
async fn empty_flows_stop_without_effects() {
    let h = harness();

    let no_steps = flow(vec![], &[("s", "e")]);
    let no_edges = flow(vec![Step::start("s"), Step::action("a", "x"), Step::end("e")], &[]);

    for f in [no_steps, no_edges, FlowModel::default()] {
        assert_eq!(h.run(&f).await, RunOutcome::Stopped(StopReason::EmptyFlow));
    }
    assert_eq!(h.notifier.call_count(), 0);
    assert!(h.timer.sleeps().is_empty());
}

#[tokio::test]
async fn start_to_end_reaches_end_without_effects() {
    let h = harness();
    let outcome = h.run(&FlowModel::linear(vec![Step::start("s"), Step::end("e")])).await;

    assert_eq!(outcome, RunOutcome::ReachedEnd);
    assert!(outcome.reached_end());
    assert_eq!(h.notifier.call_count(), 0);
    assert!(h.timer.sleeps().is_empty());
}

#[tokio::test]
async fn missing_start_is_reported() {
    let h = harness();
    let f = flow(vec![Step::action("a", "x"), Step::end("e")], &[("a", "e")]);
    assert_eq!(h.run(&f).await, RunOutcome::Stopped(StopReason::NoStart));
    assert_eq!(h.notifier.call_count(), 0);
}

#[tokio::test]
async fn multiple_starts_are_an_invalid_flow() {
    let h = harness();
    let f = flow(
        vec![Step::start("s1"), Step::start("s2"), Step::action("a", "x"), Step::end("e")],
        &[("s1", "a"), ("s2", "a"), ("a", "e")],
    );
    assert_eq!(
        h.run(&f).await,
        RunOutcome::Stopped(StopReason::InvalidFlow(EngineError::MultipleStarts { count: 2 }))
    );
    assert_eq!(h.notifier.call_count(), 0);
}

#[tokio::test]
async fn multiple_outgoing_connections_are_an_invalid_flow() {
    let h = harness();
    let f = flow(
        vec![Step::start("s"), Step::action("a", "x"), Step::action("b", "y"), Step::end("e")],
        &[("s", "a"), ("a", "e"), ("a", "b"), ("b", "e")],
    );
    assert_eq!(
        h.run(&f).await,
        RunOutcome::Stopped(StopReason::InvalidFlow(EngineError::MultipleOutgoing {
            step_id: "a".into(),
            count: 2,
        }))
    );
    assert_eq!(h.notifier.call_count(), 0);
}

#[tokio::test]
async fn duplicated_connection_still_reaches_end() {
    let h = harness();
    let f = flow(
        vec![Step::start("s"), Step::action("a", "x"), Step::end("e")],
        &[("s", "a"), ("s", "a"), ("a", "e")],
    );
    assert_eq!(h.run(&f).await, RunOutcome::ReachedEnd);
    assert_eq!(h.texts(), vec!["x"]);
}

#[tokio::test]
async fn start_without_outgoing_connection_is_reported() {
    let h = harness();
    let f = flow(vec![Step::start("s"), Step::action("a", "x"), Step::end("e")], &[("a", "e")]);
    assert_eq!(h.run(&f).await, RunOutcome::Stopped(StopReason::NoOutgoingFromStart));
    assert_eq!(h.notifier.call_count(), 0);
}

#[tokio::test]
async fn chain_without_end_is_exhausted_after_running_every_step() {
    let h = harness();
    let f = FlowModel::linear(vec![Step::start("s"), Step::action("a", "one"), Step::action("b", "two")]);

    assert_eq!(h.run(&f).await, RunOutcome::Stopped(StopReason::ChainExhausted));
    assert_eq!(h.texts(), vec!["one", "two"]);
}

// ============================================================
// Action dispatch
// ============================================================

#[tokio::test]
async fn single_action_dispatches_once() {
    let h = harness();
    let f = FlowModel::linear(vec![Step::start("s"), Step::action("a", "hi"), Step::end("e")]);

    assert_eq!(h.run(&f).await, RunOutcome::ReachedEnd);

    let sent = h.notifier.delivered();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0],
        Notification {
            to: RECIPIENT.into(),
            subject: "Automation Flow Message".into(),
            text: "hi".into(),
            html: "<p>hi</p>".into(),
        }
    );
}

#[tokio::test]
async fn actions_dispatch_in_chain_order() {
    let h = harness();
    // Steps listed out of chain order on purpose.
    let f = flow(
        vec![Step::end("e"), Step::action("b", "second"), Step::start("s"), Step::action("a", "first")],
        &[("b", "e"), ("s", "a"), ("a", "b")],
    );

    assert_eq!(h.run(&f).await, RunOutcome::ReachedEnd);
    assert_eq!(h.texts(), vec!["first", "second"]);
}

#[tokio::test]
async fn delivery_failure_stops_the_run() {
    let h = harness_with(MockNotifier::failing(DeliveryError::Rejected {
        status: 403,
        message: "forbidden".into(),
    }));
    let f = FlowModel::linear(vec![
        Step::start("s"),
        Step::action("a", "hi"),
        Step::delay("d", DelayPayload::relative(1.0, DelayUnit::Hours)),
        Step::action("b", "never"),
        Step::end("e"),
    ]);

    assert_eq!(
        h.run(&f).await,
        RunOutcome::Stopped(StopReason::DeliveryFailed {
            step_id: "a".into(),
            error: DeliveryError::Rejected { status: 403, message: "forbidden".into() },
        })
    );
    assert_eq!(h.texts(), vec!["hi"]);
    assert!(h.timer.sleeps().is_empty());
}

#[tokio::test]
async fn failure_midway_keeps_earlier_deliveries() {
    let h = harness_with(MockNotifier::failing_after(1, DeliveryError::transport("timeout")));
    let f = FlowModel::linear(vec![
        Step::start("s"),
        Step::action("a", "one"),
        Step::action("b", "two"),
        Step::action("c", "three"),
        Step::end("e"),
    ]);

    let outcome = h.run(&f).await;
    assert!(matches!(
        outcome,
        RunOutcome::Stopped(StopReason::DeliveryFailed { ref step_id, .. }) if step_id == "b"
    ));
    assert_eq!(h.texts(), vec!["one", "two"]);
}

#[tokio::test]
async fn blank_message_sends_placeholder() {
    let h = harness();
    let f = FlowModel::linear(vec![
        Step::start("s"),
        Step::new("a", StepKind::parse("action", None)),
        Step::action("b", "   "),
        Step::end("e"),
    ]);

    assert_eq!(h.run(&f).await, RunOutcome::ReachedEnd);
    assert_eq!(h.texts(), vec!["No message", "No message"]);
}

#[tokio::test]
async fn message_is_sent_verbatim() {
    let h = harness();
    let message = "  - item one\n  - item two\n";
    let f = FlowModel::linear(vec![Step::start("s"), Step::action("a", message), Step::end("e")]);

    assert_eq!(h.run(&f).await, RunOutcome::ReachedEnd);
    assert_eq!(h.texts(), vec![message]);
}

#[test]
fn html_body_escapes_and_breaks_lines() {
    let n = render_notification("Subj", "to@x.y", "line <1>\nline & 2");
    assert_eq!(n.text, "line <1>\nline & 2");
    assert_eq!(n.html, "<p>line &lt;1&gt;<br>line &amp; 2</p>");
}

#[tokio::test]
async fn configured_subject_is_used() {
    let notifier = Arc::new(MockNotifier::accepting());
    let executor = FlowExecutor::new(
        notifier.clone(),
        Arc::new(ManualTimer::starting_at(Utc::now())),
        ExecutorConfig { subject: "Reminder".into() },
    );
    let f = FlowModel::linear(vec![Step::start("s"), Step::action("a", "x"), Step::end("e")]);

    executor.run(&f, &ctx(), &CancellationToken::new()).await;
    assert_eq!(notifier.delivered()[0].subject, "Reminder");
}

// ============================================================
// Delays
// ============================================================

#[tokio::test]
async fn relative_delay_waits_before_next_step() {
    let h = harness();
    let f = FlowModel::linear(vec![
        Step::start("s"),
        Step::delay("d", DelayPayload::relative(5.0, DelayUnit::Minutes)),
        Step::action("a", "after"),
        Step::end("e"),
    ]);

    assert_eq!(h.run(&f).await, RunOutcome::ReachedEnd);
    assert_eq!(h.timer.sleeps(), vec![Duration::from_secs(300)]);
    assert_eq!(h.texts(), vec!["after"]);
}

/// Records the runtime instant of every delivery.
struct TimedNotifier {
    at: Mutex<Vec<tokio::time::Instant>>,
}

#[async_trait]
impl Notifier for TimedNotifier {
    async fn deliver(&self, _notification: &Notification) -> Result<(), DeliveryError> {
        self.at.lock().unwrap().push(tokio::time::Instant::now());
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn dispatch_happens_only_after_the_delay_elapses() {
    let notifier = Arc::new(TimedNotifier { at: Mutex::new(Vec::new()) });
    let executor = FlowExecutor::new(notifier.clone(), Arc::new(TokioTimer), ExecutorConfig::default());
    let f = FlowModel::linear(vec![
        Step::start("s"),
        Step::delay("d", DelayPayload::relative(5.0, DelayUnit::Minutes)),
        Step::action("a", "late"),
        Step::end("e"),
    ]);

    let began = tokio::time::Instant::now();
    assert_eq!(executor.run(&f, &ctx(), &CancellationToken::new()).await, RunOutcome::ReachedEnd);

    let at = notifier.at.lock().unwrap().clone();
    assert_eq!(at.len(), 1);
    assert!(at[0] - began >= Duration::from_secs(300));
}

#[tokio::test]
async fn past_specific_instant_does_not_sleep() {
    let h = harness();
    let past = h.timer.now() - chrono::Duration::seconds(1);
    let f = FlowModel::linear(vec![
        Step::start("s"),
        Step::delay("d", DelayPayload::specific(past)),
        Step::end("e"),
    ]);

    assert_eq!(h.run(&f).await, RunOutcome::ReachedEnd);
    assert!(h.timer.sleeps().is_empty());
}

#[tokio::test]
async fn future_specific_instant_waits_until_then() {
    let h = harness();
    let at = h.timer.now() + chrono::Duration::hours(2);
    let f = FlowModel::linear(vec![
        Step::start("s"),
        Step::delay("d", DelayPayload::specific(at)),
        Step::end("e"),
    ]);

    assert_eq!(h.run(&f).await, RunOutcome::ReachedEnd);
    assert_eq!(h.timer.sleeps(), vec![Duration::from_secs(7_200)]);
}

#[tokio::test]
async fn invalid_delay_is_a_no_op() {
    let h = harness();
    let f = FlowModel::linear(vec![
        Step::start("s"),
        Step::delay("d", DelayPayload::relative(-1.0, DelayUnit::Days)),
        Step::action("a", "x"),
        Step::end("e"),
    ]);

    assert_eq!(h.run(&f).await, RunOutcome::ReachedEnd);
    assert!(h.timer.sleeps().is_empty());
    assert_eq!(h.notifier.call_count(), 1);
}

// ============================================================
// Malformed chains
// ============================================================

#[tokio::test]
async fn unrecognized_step_is_skipped() {
    let h = harness();
    let f = FlowModel::linear(vec![
        Step::start("s"),
        Step::new("w", StepKind::Unrecognized("webhook".into())),
        Step::action("a", "x"),
        Step::end("e"),
    ]);

    assert_eq!(h.run(&f).await, RunOutcome::ReachedEnd);
    assert_eq!(h.notifier.call_count(), 1);
}

#[tokio::test]
async fn dangling_reference_stops_after_preceding_steps() {
    let h = harness();
    let f = flow(
        vec![Step::start("s"), Step::action("a", "before"), Step::end("e")],
        &[("s", "a"), ("a", "ghost")],
    );

    assert_eq!(
        h.run(&f).await,
        RunOutcome::Stopped(StopReason::DanglingReference { step_id: "ghost".into() })
    );
    assert_eq!(h.texts(), vec!["before"]);
}

#[tokio::test]
async fn cycle_terminates_without_repeating_effects() {
    let h = harness();
    // s → a → b → a → …
    let f = flow(
        vec![Step::start("s"), Step::action("a", "one"), Step::action("b", "two"), Step::end("e")],
        &[("s", "a"), ("a", "b"), ("b", "a")],
    );

    assert_eq!(
        h.run(&f).await,
        RunOutcome::Stopped(StopReason::CycleDetected { step_id: "a".into() })
    );
    assert_eq!(h.texts(), vec!["one", "two"]);
}

#[tokio::test]
async fn edge_back_into_start_is_a_cycle() {
    let h = harness();
    let f = flow(vec![Step::start("s"), Step::action("a", "x")], &[("s", "a"), ("a", "s")]);

    assert_eq!(
        h.run(&f).await,
        RunOutcome::Stopped(StopReason::CycleDetected { step_id: "s".into() })
    );
    assert_eq!(h.notifier.call_count(), 1);
}

// ============================================================
// Cancellation and background runs
// ============================================================

#[tokio::test]
async fn pre_cancelled_run_does_nothing() {
    let h = harness();
    let f = FlowModel::linear(vec![Step::start("s"), Step::action("a", "x"), Step::end("e")]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    assert_eq!(
        h.executor.run(&f, &ctx(), &cancel).await,
        RunOutcome::Stopped(StopReason::Cancelled)
    );
    assert_eq!(h.notifier.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancelling_during_delay_stops_the_run() {
    let notifier = Arc::new(MockNotifier::accepting());
    let executor = Arc::new(FlowExecutor::new(
        notifier.clone(),
        Arc::new(TokioTimer),
        ExecutorConfig::default(),
    ));
    let f = FlowModel::linear(vec![
        Step::start("s"),
        Step::delay("wait", DelayPayload::relative(1.0, DelayUnit::Days)),
        Step::action("a", "never"),
        Step::end("e"),
    ]);

    let handle = executor.spawn(f, ctx());
    let mut state = handle.subscribe();
    state
        .wait_for(|s| matches!(s, RunState::Walking { step_id } if step_id == "wait"))
        .await
        .expect("run publishes progress");

    handle.cancel();
    assert_eq!(handle.join().await, RunOutcome::Stopped(StopReason::Cancelled));
    assert_eq!(notifier.call_count(), 0);
}

#[tokio::test]
async fn spawned_run_publishes_completion() {
    let notifier = Arc::new(MockNotifier::accepting());
    let executor = Arc::new(FlowExecutor::new(
        notifier.clone(),
        Arc::new(ManualTimer::starting_at(Utc::now())),
        ExecutorConfig::default(),
    ));
    let f = FlowModel::linear(vec![Step::start("s"), Step::action("a", "bg"), Step::end("e")]);

    let handle = executor.spawn(f, ctx());
    let mut state = handle.subscribe();
    let done = state
        .wait_for(RunState::is_completed)
        .await
        .expect("run completes")
        .clone();

    assert_eq!(done, RunState::Completed { outcome: RunOutcome::ReachedEnd });
    assert_eq!(handle.state(), done);
    assert_eq!(handle.join().await, RunOutcome::ReachedEnd);
    assert_eq!(notifier.call_count(), 1);
}

/// Panics on delivery, to exercise run supervision.
struct PanickingNotifier;

#[async_trait]
impl Notifier for PanickingNotifier {
    async fn deliver(&self, _notification: &Notification) -> Result<(), DeliveryError> {
        panic!("transport bug");
    }
}

#[tokio::test]
async fn panicking_run_is_reported_as_aborted() {
    let executor = Arc::new(FlowExecutor::with_notifier(Arc::new(PanickingNotifier)));
    let f = FlowModel::linear(vec![Step::start("s"), Step::action("a", "x"), Step::end("e")]);

    let handle = executor.spawn(f, ctx());
    let mut state = handle.subscribe();
    state.wait_for(RunState::is_completed).await.expect("completion is published");

    assert!(matches!(
        handle.join().await,
        RunOutcome::Stopped(StopReason::Aborted(_))
    ));
}

#[tokio::test]
async fn concurrent_runs_are_independent() {
    let notifier = Arc::new(MockNotifier::accepting());
    let executor = Arc::new(FlowExecutor::new(
        notifier.clone(),
        Arc::new(ManualTimer::starting_at(Utc::now())),
        ExecutorConfig::default(),
    ));
    let f = FlowModel::linear(vec![Step::start("s"), Step::action("a", "x"), Step::end("e")]);

    let first = executor.spawn(f.clone(), RunContext::new("one@example.com"));
    let second = executor.spawn(f, RunContext::new("two@example.com"));
    assert_ne!(first.run_id(), second.run_id());

    assert_eq!(first.join().await, RunOutcome::ReachedEnd);
    assert_eq!(second.join().await, RunOutcome::ReachedEnd);

    let mut recipients: Vec<_> = notifier.delivered().into_iter().map(|n| n.to).collect();
    recipients.sort();
    assert_eq!(recipients, vec!["one@example.com", "two@example.com"]);
}
