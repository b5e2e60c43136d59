use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::AppState;
use crate::ApiError;
use engine::{ChainIndex, FlowModel, RunContext, RunState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRunDto {
    pub flow: FlowModel,
    pub recipient_email: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunAccepted {
    pub run_id: Uuid,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatus {
    pub run_id: Uuid,
    pub state: RunState,
}

/// Check the flow, start it in the background, and answer immediately.
///
/// Only ambiguities the executor would refuse outright are rejected here
/// (duplicate IDs, several outgoing connections, several starts). Dangling
/// references, a missing start and cycles are left to the run, which reports
/// them as its outcome.
pub async fn start(
    State(state): State<AppState>,
    Json(payload): Json<StartRunDto>,
) -> Result<(StatusCode, Json<RunAccepted>), ApiError> {
    let recipient = payload.recipient_email.trim();
    if recipient.is_empty() {
        return Err(ApiError::Validation("recipientEmail is required".into()));
    }

    ChainIndex::build(&payload.flow)?.find_start()?;
    let steps = payload.flow.steps.len();

    let handle = state
        .executor
        .spawn(payload.flow, RunContext::new(recipient));
    state.track(&handle).await;

    info!(run_id = %handle.run_id(), steps, "run started");

    Ok((
        StatusCode::ACCEPTED,
        Json(RunAccepted { run_id: handle.run_id(), status: "accepted" }),
    ))
}

pub async fn get(
    Path(run_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<RunStatus>, ApiError> {
    let run = state.get(run_id).await.ok_or(ApiError::NotFound)?;
    let current = run.state.borrow().clone();
    Ok(Json(RunStatus { run_id, state: current }))
}

/// Request cancellation; the run stops at its next step or suspension point.
pub async fn cancel(
    Path(run_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<RunAccepted>), ApiError> {
    let run = state.get(run_id).await.ok_or(ApiError::NotFound)?;
    run.cancel.cancel();
    info!(%run_id, "run cancellation requested");
    Ok((
        StatusCode::ACCEPTED,
        Json(RunAccepted { run_id, status: "cancelling" }),
    ))
}
