//! Flow execution engine.
//!
//! `FlowExecutor` walks a flow as a single chain:
//! 1. Indexes the flow and resolves its start step.
//! 2. Follows connections one step at a time, in order.
//! 3. Sends one notification per `action` step, awaiting delivery.
//! 4. Suspends for each `delay` step.
//! 5. Stops at `end`, or reports why it could not get there.
//!
//! A run never returns an error: every way of stopping is a [`RunOutcome`].

use std::collections::HashSet;
use std::sync::Arc;

use notifier::{Notification, Notifier};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};
use uuid::Uuid;

use crate::chain::ChainIndex;
use crate::delay::compute_delay;
use crate::models::{ActionPayload, FlowModel, RunContext, Step, StepKind};
use crate::outcome::{RunOutcome, RunState, StopReason};
use crate::timer::{Timer, TokioTimer};

/// Subject line used when none is configured.
pub const DEFAULT_SUBJECT: &str = "Automation Flow Message";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Subject of every notification sent by an action step.
    pub subject: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            subject: DEFAULT_SUBJECT.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// RunHandle
// ---------------------------------------------------------------------------

/// Handle to a run started with [`FlowExecutor::spawn`].
///
/// Dropping the handle does not stop the run.
#[derive(Debug)]
pub struct RunHandle {
    run_id: Uuid,
    cancel: CancellationToken,
    state: watch::Receiver<RunState>,
    task: JoinHandle<RunOutcome>,
}

impl RunHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Request cancellation; honoured at the next step or suspension point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Latest published state.
    pub fn state(&self) -> RunState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.clone()
    }

    /// Wait for the run to finish.
    pub async fn join(self) -> RunOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => StopReason::Aborted(e.to_string()).into(),
        }
    }
}

// ---------------------------------------------------------------------------
// FlowExecutor
// ---------------------------------------------------------------------------

/// Stateless orchestrator; one instance can serve any number of concurrent
/// runs, each with its own cursor and [`RunContext`].
pub struct FlowExecutor {
    notifier: Arc<dyn Notifier>,
    timer: Arc<dyn Timer>,
    config: ExecutorConfig,
}

impl FlowExecutor {
    /// Create a new executor.
    pub fn new(notifier: Arc<dyn Notifier>, timer: Arc<dyn Timer>, config: ExecutorConfig) -> Self {
        Self { notifier, timer, config }
    }

    /// Executor on the tokio clock with the default configuration.
    pub fn with_notifier(notifier: Arc<dyn Notifier>) -> Self {
        Self::new(notifier, Arc::new(TokioTimer), ExecutorConfig::default())
    }

    /// Run the flow to completion in the current task.
    #[instrument(skip_all, fields(steps = flow.steps.len(), to = %ctx.recipient_address))]
    pub async fn run(
        &self,
        flow: &FlowModel,
        ctx: &RunContext,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        let (state, _) = watch::channel(RunState::NotStarted);
        let outcome = self.walk(flow, ctx, cancel, &state).await;
        state.send_replace(RunState::Completed { outcome: outcome.clone() });
        outcome
    }

    /// Start the run on a background task and return immediately.
    ///
    /// The run is supervised: a panic inside it is reported as
    /// [`StopReason::Aborted`] through the handle and the state channel.
    pub fn spawn(self: &Arc<Self>, flow: FlowModel, ctx: RunContext) -> RunHandle {
        let run_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(RunState::NotStarted);
        let state_tx = Arc::new(state_tx);

        let span = info_span!("run", %run_id, to = %ctx.recipient_address);
        let inner = {
            let executor = Arc::clone(self);
            let cancel = cancel.clone();
            let state_tx = Arc::clone(&state_tx);
            tokio::spawn(
                async move { executor.walk(&flow, &ctx, &cancel, &state_tx).await }
                    .instrument(span.clone()),
            )
        };

        let task = tokio::spawn(
            async move {
                let outcome = match inner.await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!("run task died: {}", e);
                        StopReason::Aborted(e.to_string()).into()
                    }
                };
                state_tx.send_replace(RunState::Completed { outcome: outcome.clone() });
                outcome
            }
            .instrument(span),
        );

        info!(%run_id, "run accepted");
        RunHandle { run_id, cancel, state: state_rx, task }
    }

    // -----------------------------------------------------------------------
    // Internal: the chain walk.
    // -----------------------------------------------------------------------

    async fn walk(
        &self,
        flow: &FlowModel,
        ctx: &RunContext,
        cancel: &CancellationToken,
        state: &watch::Sender<RunState>,
    ) -> RunOutcome {
        let outcome = self.walk_chain(flow, ctx, cancel, state).await;
        match &outcome {
            RunOutcome::ReachedEnd => info!("run reached end"),
            RunOutcome::Stopped(reason @ StopReason::DeliveryFailed { .. }) => {
                error!("run stopped: {}", reason)
            }
            RunOutcome::Stopped(reason) => warn!("run stopped: {}", reason),
        }
        outcome
    }

    async fn walk_chain(
        &self,
        flow: &FlowModel,
        ctx: &RunContext,
        cancel: &CancellationToken,
        state: &watch::Sender<RunState>,
    ) -> RunOutcome {
        if flow.steps.is_empty() || flow.connections.is_empty() {
            return StopReason::EmptyFlow.into();
        }

        let index = match ChainIndex::build(flow) {
            Ok(index) => index,
            Err(e) => return StopReason::InvalidFlow(e).into(),
        };

        let start = match index.find_start() {
            Ok(Some(start)) => start,
            Ok(None) => return StopReason::NoStart.into(),
            Err(e) => return StopReason::InvalidFlow(e).into(),
        };

        let Some(mut current) = index.next_step_id(&start.id) else {
            return StopReason::NoOutgoingFromStart.into();
        };

        // One outgoing connection per step means any revisit loops forever.
        let mut visited: HashSet<&str> = HashSet::from([start.id.as_str()]);

        loop {
            if cancel.is_cancelled() {
                return StopReason::Cancelled.into();
            }

            let Some(step) = index.find_step(current) else {
                return StopReason::DanglingReference { step_id: current.to_owned() }.into();
            };

            if !visited.insert(step.id.as_str()) {
                return StopReason::CycleDetected { step_id: step.id.clone() }.into();
            }

            state.send_replace(RunState::Walking { step_id: step.id.clone() });
            debug!(step_id = %step.id, kind = step.kind.name(), "entering step");

            match &step.kind {
                StepKind::End => return RunOutcome::ReachedEnd,
                StepKind::Action(payload) => {
                    if let Err(reason) = self.dispatch(step, payload, ctx, cancel).await {
                        return reason.into();
                    }
                }
                StepKind::Delay(payload) => {
                    let wait = compute_delay(payload, self.timer.now());
                    if !wait.is_zero() {
                        debug!(step_id = %step.id, ?wait, "waiting");
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => return StopReason::Cancelled.into(),
                            _ = self.timer.sleep(wait) => {}
                        }
                    }
                }
                // The start step is seeded into `visited`, so re-entering it
                // is reported as a cycle above.
                StepKind::Start => {}
                StepKind::Unrecognized(kind) => {
                    warn!(step_id = %step.id, kind = %kind, "skipping step of unrecognized kind");
                }
            }

            match index.next_step_id(&step.id) {
                Some(next) => current = next,
                None => return StopReason::ChainExhausted.into(),
            }
        }
    }

    async fn dispatch(
        &self,
        step: &Step,
        payload: &ActionPayload,
        ctx: &RunContext,
        cancel: &CancellationToken,
    ) -> Result<(), StopReason> {
        let notification = render_notification(
            &self.config.subject,
            &ctx.recipient_address,
            payload.effective_message(),
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StopReason::Cancelled),
            result = self.notifier.deliver(&notification) => {
                result.map_err(|error| StopReason::DeliveryFailed {
                    step_id: step.id.clone(),
                    error,
                })?;
                info!(step_id = %step.id, "notification delivered");
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Build the notification for one action step.
///
/// The plain body is the message itself; the HTML body escapes it and turns
/// line breaks into `<br>`.
pub fn render_notification(subject: &str, to: &str, message: &str) -> Notification {
    Notification {
        to: to.to_owned(),
        subject: subject.to_owned(),
        text: message.to_owned(),
        html: format!("<p>{}</p>", escape_html(message).replace("\r\n", "<br>").replace('\n', "<br>")),
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
