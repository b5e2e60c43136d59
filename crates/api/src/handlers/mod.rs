//! Request handlers and the state they share.

pub mod health;
pub mod runs;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use engine::{FlowExecutor, RunHandle, RunState};

/// Completed runs are pruned once this many runs are tracked.
const PRUNE_THRESHOLD: usize = 1024;

/// What the API keeps about a run after handing it to the executor.
#[derive(Debug, Clone)]
pub struct TrackedRun {
    pub state: watch::Receiver<RunState>,
    pub cancel: CancellationToken,
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<FlowExecutor>,
    runs: Arc<RwLock<HashMap<Uuid, TrackedRun>>>,
}

impl AppState {
    pub fn new(executor: Arc<FlowExecutor>) -> Self {
        Self {
            executor,
            runs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Remember a freshly spawned run. The handle itself is dropped; the run
    /// keeps going on its own task.
    pub async fn track(&self, handle: &RunHandle) {
        let mut runs = self.runs.write().await;
        if runs.len() >= PRUNE_THRESHOLD {
            runs.retain(|_, run| !run.state.borrow().is_completed());
        }
        runs.insert(
            handle.run_id(),
            TrackedRun {
                state: handle.subscribe(),
                cancel: handle.cancellation_token(),
            },
        );
    }

    pub async fn get(&self, run_id: Uuid) -> Option<TrackedRun> {
        self.runs.read().await.get(&run_id).cloned()
    }

    /// Cancel every run still in flight.
    pub async fn cancel_all(&self) {
        for run in self.runs.read().await.values() {
            run.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use engine::{DelayPayload, DelayUnit, FlowModel, RunContext, RunOutcome, Step, StopReason};
    use notifier::mock::MockNotifier;

    fn state() -> AppState {
        let notifier = Arc::new(MockNotifier::accepting());
        AppState::new(Arc::new(FlowExecutor::with_notifier(notifier)))
    }

    fn waiting_flow() -> FlowModel {
        FlowModel::linear(vec![
            Step::start("s"),
            Step::delay("wait", DelayPayload::relative(3.0, DelayUnit::Days)),
            Step::end("e"),
        ])
    }

    async fn outcome_of(state: &AppState, run_id: Uuid) -> RunOutcome {
        let mut rx = state.get(run_id).await.expect("run is tracked").state;
        let completed = rx.wait_for(RunState::is_completed).await.unwrap().clone();
        match completed {
            RunState::Completed { outcome } => outcome,
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[tokio::test]
    async fn full_table_prunes_only_completed_runs() {
        let state = state();
        let ctx = RunContext::new("x@example.com");

        let waiting = state.executor.spawn(waiting_flow(), ctx.clone());
        state.track(&waiting).await;

        let mut finished = Vec::new();
        for _ in 1..PRUNE_THRESHOLD {
            let handle = state.executor.spawn(FlowModel::default(), ctx.clone());
            state.track(&handle).await;
            finished.push(handle.run_id());
            handle.join().await;
        }
        assert_eq!(state.runs.read().await.len(), PRUNE_THRESHOLD);

        let newest = state.executor.spawn(waiting_flow(), ctx);
        state.track(&newest).await;

        let runs = state.runs.read().await;
        assert_eq!(runs.len(), 2);
        assert!(runs.contains_key(&waiting.run_id()));
        assert!(runs.contains_key(&newest.run_id()));
        assert!(finished.iter().all(|id| !runs.contains_key(id)));
        drop(runs);

        state.cancel_all().await;
    }

    #[tokio::test]
    async fn cancel_all_stops_waiting_runs() {
        let state = state();
        let handle = state
            .executor
            .spawn(waiting_flow(), RunContext::new("x@example.com"));
        state.track(&handle).await;

        state.cancel_all().await;

        assert_eq!(
            outcome_of(&state, handle.run_id()).await,
            RunOutcome::Stopped(StopReason::Cancelled)
        );
    }
}
