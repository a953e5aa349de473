//! Stats refresh endpoint.
//!
//! POST /stats/refresh asks for the subject's statistics to be recomputed.
//! 202 when a job was queued, 200 with the reason when nothing was queued.
//! Subject validation is left to the admission queue.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use pulseboard_core::{RefreshOutcome, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::jobs::JobAdmissionQueue;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub user_id: String,
    /// When the caller's copy of the stats was computed.
    #[serde(default)]
    pub last_known_update: Option<Timestamp>,
}

/// POST /stats/refresh
pub async fn request_refresh(
    State(queue): State<Arc<JobAdmissionQueue>>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<(StatusCode, Json<RefreshOutcome>)> {
    let outcome = queue
        .request_refresh(&req.user_id, req.last_known_update)
        .await?;

    let status = if outcome.is_admitted() {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };

    Ok((status, Json(outcome)))
}
