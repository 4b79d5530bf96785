use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use rota_core::{AllocationOutcome, AllocationRequest, RefusalReason};
use rota_model::{DeliveryContext, RequesterId, ResourceKind};

use crate::commands::describe_refusal;
use crate::infra::app_state::AppState;
use crate::infra::errors::{AppError, AppResult};

#[derive(Debug, Deserialize)]
pub struct AllocateBody {
    pub requester_id: i64,
    pub chat_id: i64,
    #[serde(default)]
    pub message_id: Option<i64>,
}

#[derive(Debug, Serialize)]
struct RefusalBody {
    error: RefusalError,
}

#[derive(Debug, Serialize)]
struct RefusalError {
    message: String,
    status: u16,
    #[serde(flatten)]
    reason: RefusalReason,
}

/// `POST /allocate/{kind}`
pub async fn allocate(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Json(body): Json<AllocateBody>,
) -> AppResult<Response> {
    let kind: ResourceKind = kind
        .parse()
        .map_err(|err: rota_model::ModelError| AppError::bad_request(err.to_string()))?;

    let context = DeliveryContext {
        chat_id: body.chat_id,
        message_id: body.message_id,
    };
    let request = AllocationRequest::new(RequesterId(body.requester_id), kind, context);

    let response = match state.allocate(request).await {
        AllocationOutcome::Issued(issued) => Json(issued).into_response(),
        AllocationOutcome::PoolExhausted => {
            return Err(AppError::conflict(format!("no {kind} is available")));
        }
        AllocationOutcome::Refused(reason) => {
            let body = RefusalBody {
                error: RefusalError {
                    message: describe_refusal(&reason),
                    status: StatusCode::FORBIDDEN.as_u16(),
                    reason,
                },
            };
            (StatusCode::FORBIDDEN, Json(body)).into_response()
        }
    };
    Ok(response)
}

#[derive(Debug, Deserialize)]
pub struct ClearBody {
    pub requester_id: i64,
    pub kind: ResourceKind,
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub value: String,
    pub owner: String,
    pub lifted_ban: bool,
}

/// `POST /obligations/clear`
pub async fn clear_obligation(
    State(state): State<AppState>,
    Json(body): Json<ClearBody>,
) -> AppResult<Json<ClearResponse>> {
    let cleared = state
        .engine()
        .clear_obligation(RequesterId(body.requester_id), body.kind, &body.value)
        .await?;

    Ok(Json(ClearResponse {
        value: cleared.item.value,
        owner: cleared.item.owner,
        lifted_ban: cleared.lifted_ban,
    }))
}
