use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use rota_core::{
    DirectoryEdit, EngineStatus, OwnerLookup, RequesterActivity, priority::PriorityEntry,
    rebuild::RebuildReport, store::PermanentBan,
};
use rota_model::RequesterId;

use crate::infra::app_state::AppState;
use crate::infra::errors::{AppError, AppResult};

/// `POST /directory/edits`
pub async fn edit_directory(
    State(state): State<AppState>,
    Json(edit): Json<DirectoryEdit>,
) -> AppResult<Json<RebuildReport>> {
    let report = state.engine().edit_directory(edit).await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct PriorityBody {
    pub remaining: u32,
    #[serde(default)]
    pub stop_after: bool,
}

/// `PUT /priority/{owner}`
pub async fn set_priority(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Json(body): Json<PriorityBody>,
) -> AppResult<StatusCode> {
    state
        .engine()
        .set_priority(&owner, body.remaining, body.stop_after)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /priority/{owner}`
pub async fn remove_priority(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> AppResult<Json<PriorityEntry>> {
    let entry = state.engine().remove_priority(&owner).await?;
    Ok(Json(entry))
}

#[derive(Debug, Serialize)]
pub struct BanChange {
    pub requester_id: RequesterId,
    pub changed: bool,
}

/// `POST /bans/{requester_id}`
pub async fn ban(
    State(state): State<AppState>,
    Path(requester_id): Path<i64>,
) -> AppResult<Json<BanChange>> {
    let requester = RequesterId(requester_id);
    let changed = state.engine().ban_permanently(requester).await?;
    Ok(Json(BanChange {
        requester_id: requester,
        changed,
    }))
}

/// `DELETE /bans/{requester_id}`
pub async fn unban(
    State(state): State<AppState>,
    Path(requester_id): Path<i64>,
) -> AppResult<Json<BanChange>> {
    let requester = RequesterId(requester_id);
    let changed = state.engine().lift_permanent_ban(requester).await?;
    if !changed {
        return Err(AppError::not_found(format!(
            "requester {requester} is not banned"
        )));
    }
    Ok(Json(BanChange {
        requester_id: requester,
        changed,
    }))
}

/// `GET /bans`
pub async fn list_bans(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<PermanentBan>>> {
    Ok(Json(state.engine().permanent_bans().await?))
}

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    pub value: String,
}

/// `GET /owners/lookup?value=`
pub async fn lookup_owner(
    State(state): State<AppState>,
    Query(query): Query<LookupQuery>,
) -> AppResult<Json<OwnerLookup>> {
    state
        .engine()
        .lookup_owner(&query.value)
        .await
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("no owner holds {}", query.value)))
}

/// `GET /requesters/{requester_id}/activity`
pub async fn requester_activity(
    State(state): State<AppState>,
    Path(requester_id): Path<i64>,
) -> AppResult<Json<RequesterActivity>> {
    let activity = state
        .engine()
        .requester_activity(RequesterId(requester_id))
        .await?;
    Ok(Json(activity))
}

/// `GET /status`
pub async fn status(State(state): State<AppState>) -> Json<EngineStatus> {
    Json(state.engine().status().await)
}
