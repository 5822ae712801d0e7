/*
 * Responsibility
 * - gate を通過したリクエストを primary / secondary service に転送する handler
 * - identity は RequestCtx (gate が書き換えた context) からのみ読む
 * - 転送失敗時のレスポンス書き込みはここ (request boundary) で行う
 */
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value};

use crate::api::v1::extractors::RequestCtx;
use crate::error::AppError;
use crate::services::forward::types::MSG_FORWARD_FAILED;
use crate::services::forward::{ExecuteOptions, ForwardFailure, ForwardRequest, Reply};
use crate::state::AppState;

/// Empty body → empty object; anything else must be a JSON object.
fn parse_payload(body: &Bytes) -> Result<Map<String, Value>, AppError> {
    if body.is_empty() {
        return Ok(Map::new());
    }
    serde_json::from_slice(body).map_err(|_| AppError::BadRequest("invalid json payload"))
}

fn json_response(status: StatusCode, body: Bytes) -> Response {
    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}

async fn forward_primary_with(
    state: &AppState,
    RequestCtx(ctx): RequestCtx,
    endpoint: String,
    body: Bytes,
    opts: ExecuteOptions,
) -> Result<Response, AppError> {
    let payload = parse_payload(&body)?;
    let req = ForwardRequest::new(&ctx, format!("/{endpoint}")).with_payload(payload);

    match state.primary.execute(&req, opts).await {
        Ok(body) => Ok(json_response(StatusCode::OK, body)),
        Err(ForwardFailure {
            reply: Some(reply), ..
        }) => Ok(reply.into_response()),
        Err(ForwardFailure { error, reply: None }) => {
            tracing::warn!(error = %error, "primary forward failed, no reply requested");
            Err(AppError::Upstream)
        }
    }
}

/// POST /primary/{*endpoint}, /public/{*endpoint}
pub async fn forward_primary(
    State(state): State<AppState>,
    Path(endpoint): Path<String>,
    ctx: RequestCtx,
    body: Bytes,
) -> Result<Response, AppError> {
    forward_primary_with(&state, ctx, endpoint, body, ExecuteOptions::interactive()).await
}

/// POST /primary-critical/{*endpoint}
pub async fn forward_primary_critical(
    State(state): State<AppState>,
    Path(endpoint): Path<String>,
    ctx: RequestCtx,
    body: Bytes,
) -> Result<Response, AppError> {
    forward_primary_with(&state, ctx, endpoint, body, ExecuteOptions::critical()).await
}

/// POST /background/{*endpoint}
pub async fn forward_background(
    State(state): State<AppState>,
    Path(endpoint): Path<String>,
    ctx: RequestCtx,
    body: Bytes,
) -> Result<Response, AppError> {
    forward_primary_with(&state, ctx, endpoint, body, ExecuteOptions::background()).await
}

/// ANY /secondary/{*endpoint}
///
/// The secondary router never writes a response, so the status and body it
/// returns are relayed here.
pub async fn forward_secondary(
    State(state): State<AppState>,
    Path(endpoint): Path<String>,
    method: Method,
    RequestCtx(ctx): RequestCtx,
    body: Bytes,
) -> Result<Response, AppError> {
    let payload = parse_payload(&body)?;
    let req = ForwardRequest::new(&ctx, format!("/{endpoint}"))
        .with_method(method)
        .with_payload(payload);

    match state.secondary.execute(&req).await {
        Ok(result) => Ok(json_response(result.status, result.body)),
        Err(err) => {
            tracing::warn!(error = %err, "secondary forward failed");
            Ok(Reply::message(StatusCode::NOT_ACCEPTABLE, MSG_FORWARD_FAILED).into_response())
        }
    }
}
