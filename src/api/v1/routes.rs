/*
 * Responsibility
 * - v1 の URL 構造を定義
 * - policy ごとに gate (middleware::auth::access) を route_layer で適用する
 *   - /primary, /primary-critical, /secondary: StrictAuthenticated
 *   - /background: ProcessableAuthenticated
 *   - /public: ValidOrGuest
 */
use axum::{
    Router,
    routing::{any, get, post},
};

use crate::api::v1::handlers::{
    health::health,
    proxy::{forward_background, forward_primary, forward_primary_critical, forward_secondary},
};
use crate::middleware::auth::access;
use crate::services::auth::Policy;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    let strict = Router::new()
        .route("/primary/{*endpoint}", post(forward_primary))
        .route("/primary-critical/{*endpoint}", post(forward_primary_critical))
        .route("/secondary/{*endpoint}", any(forward_secondary));
    let strict = access::apply(strict, state.clone(), Policy::StrictAuthenticated);

    let background = Router::new().route("/background/{*endpoint}", post(forward_background));
    let background = access::apply(background, state.clone(), Policy::ProcessableAuthenticated);

    let public = Router::new().route("/public/{*endpoint}", post(forward_primary));
    let public = access::apply(public, state, Policy::ValidOrGuest);

    Router::new()
        .route("/health", get(health))
        .merge(strict)
        .merge(background)
        .merge(public)
}
