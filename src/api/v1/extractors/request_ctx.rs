use axum::extract::FromRequestParts;
use axum::http::{StatusCode, request::Parts};

use crate::context::RequestContext;
use crate::state::AppState;

/// Handler で、gate が書き換えた RequestContext を受け取るための extractor
/// middleware が RequestContext を request.extensions() に insert 済みである前提
/// 見つからない場合は 401 を返す（gate がかかってない・ミドルウェア未設定）
pub struct RequestCtx(pub RequestContext);

impl FromRequestParts<AppState> for RequestCtx
where
    AppState: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .map(RequestCtx)
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}
