//! gate の判定 → response 書き込み / request 書き換えを行う middleware
//!
//! - Deny: `{"message": ...}` + policy ごとの status を返して打ち切る
//! - Allow: MSISDN / Token-Id (と発行した Authorization) を request に書き戻し、
//!   RequestContext を extensions に入れて次へ
//! - Is-Guest / Is-Open-Api / 新しい Authorization は response header に付ける

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Request, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};

use crate::context::{IS_GUEST_HEADER, IS_OPEN_API_HEADER, RequestContext};
use crate::error::AppError;
use crate::services::auth::{AuthDecision, Policy};
use crate::state::AppState;

#[derive(Clone)]
struct AccessState {
    app: AppState,
    policy: Policy,
}

/// Put every route of `router` behind the gate with the given policy.
///
/// ```ignore
/// let open = Router::new().route("/public/{*endpoint}", post(forward_primary));
/// let open = middleware::auth::access::apply(open, state.clone(), Policy::ValidOrGuest);
/// ```
pub fn apply(router: Router<AppState>, state: AppState, policy: Policy) -> Router<AppState> {
    let access = AccessState { app: state, policy };
    router.route_layer(middleware::from_fn_with_state(access, access_middleware))
}

async fn access_middleware(
    State(access): State<AccessState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let ctx = RequestContext::from_headers(req.headers(), &access.app.forwarded_ip_header);
    let open_api = access.policy == Policy::ValidOrGuest;

    match access.app.gate.authorize(access.policy, &ctx).await {
        AuthDecision::Deny(denial) => {
            let mut resp = AppError::from(&denial).into_response();
            mark_response(resp.headers_mut(), open_api, denial.is_guest, None);
            resp
        }
        AuthDecision::Allow(grant) => {
            grant.context.write_trust_headers(req.headers_mut());
            // middleware → extractor への受け渡し
            req.extensions_mut().insert(grant.context);

            let mut resp = next.run(req).await;
            mark_response(
                resp.headers_mut(),
                open_api,
                grant.is_guest,
                grant.issued_authorization.as_deref(),
            );
            resp
        }
    }
}

fn mark_response(
    headers: &mut HeaderMap,
    open_api: bool,
    is_guest: bool,
    issued_authorization: Option<&str>,
) {
    if open_api {
        headers.insert(IS_OPEN_API_HEADER, HeaderValue::from_static("True"));
    }
    if is_guest {
        headers.insert(IS_GUEST_HEADER, HeaderValue::from_static("True"));
    }
    if let Some(v) = issued_authorization.and_then(|v| HeaderValue::from_str(v).ok()) {
        headers.insert(header::AUTHORIZATION, v);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        Json,
        body::to_bytes,
        http::{HeaderName, StatusCode},
        routing::post,
    };
    use jsonwebtoken::Algorithm;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::api::v1::extractors::RequestCtx;
    use crate::services::auth::AuthorizationGate;
    use crate::services::auth::gate::test_support::FakeGuestProvider;
    use crate::services::auth::token::TokenValidator;
    use crate::services::auth::token::test_support::{SECRET, bearer, guest_token, user_token};
    use crate::services::forward::{PrimaryRouter, SecondaryRouter};

    const IP: &str = "10.0.0.1";

    fn state(forwarded: &'static str, provider: Arc<FakeGuestProvider>) -> AppState {
        let gate = AuthorizationGate::new(
            TokenValidator::new(SECRET, Algorithm::HS256, 0),
            provider,
            tracing::Span::none(),
        );
        let client = reqwest::Client::new();
        AppState::new(
            Arc::new(gate),
            PrimaryRouter::new(client.clone(), "http://127.0.0.1:1", tracing::Span::none()),
            SecondaryRouter::new(client, "http://127.0.0.1:1", tracing::Span::none()),
            HeaderName::from_static(forwarded),
        )
    }

    // Echo what the handler saw: the rewritten headers and the extracted context.
    async fn echo(RequestCtx(ctx): RequestCtx, headers: HeaderMap) -> Json<Value> {
        let h = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
        Json(json!({
            "msisdn": h("msisdn"),
            "token_id": h("token-id"),
            "authorization": h("authorization"),
            "ctx_user_id": ctx.user_id,
        }))
    }

    fn app(state: AppState, policy: Policy) -> Router {
        let router = Router::new().route("/echo", post(echo));
        apply(router, state.clone(), policy).with_state(state)
    }

    fn request(auth: Option<&str>, ip: Option<&str>) -> Request<Body> {
        let mut builder = Request::post("/echo");
        if let Some(auth) = auth {
            builder = builder.header("authorization", auth);
        }
        if let Some(ip) = ip {
            builder = builder.header("x-forwarded-for", ip);
        }
        builder
            .header("msisdn", "spoofed")
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(resp: Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn strict_allow_rewrites_identity_headers() {
        let app = app(state("x-forwarded-for", Arc::default()), Policy::StrictAuthenticated);
        let auth = bearer(&user_token("989120000000", IP));

        let resp = app.oneshot(request(Some(auth.as_str()), Some(IP))).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().get("is-open-api").is_none());
        let body = json_body(resp).await;
        assert_eq!(body["msisdn"], "989120000000");
        assert_eq!(body["token_id"], "tok-989120000000");
        assert_eq!(body["ctx_user_id"], "989120000000");
    }

    #[tokio::test]
    async fn strict_deny_writes_message_body() {
        let app = app(state("x-forwarded-for", Arc::default()), Policy::StrictAuthenticated);

        let resp = app.oneshot(request(None, Some(IP))).await.unwrap();

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(resp).await, json!({ "message": "Your session has expired" }));
    }

    #[tokio::test]
    async fn strict_guest_denial_carries_guest_marker() {
        let app = app(state("x-forwarded-for", Arc::default()), Policy::StrictAuthenticated);
        let auth = bearer(&guest_token(IP));

        let resp = app.oneshot(request(Some(auth.as_str()), Some(IP))).await.unwrap();

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(resp.headers().get("is-guest").unwrap(), "True");
    }

    #[tokio::test]
    async fn processable_without_forwarded_ip_is_422() {
        let app = app(state("x-forwarded-for", Arc::default()), Policy::ProcessableAuthenticated);
        let auth = bearer(&user_token("1", IP));

        let resp = app.oneshot(request(Some(auth.as_str()), None)).await.unwrap();

        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn configured_forwarded_header_is_the_one_trusted() {
        let app = app(state("fake-x-forwarded-for", Arc::default()), Policy::StrictAuthenticated);
        let auth = bearer(&user_token("1", IP));

        // Only the standard header is set, so the configured one is missing.
        let resp = app.oneshot(request(Some(auth.as_str()), Some(IP))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn valid_or_guest_mints_and_returns_the_new_token() {
        let provider = Arc::new(FakeGuestProvider::default());
        let app = app(state("x-forwarded-for", provider.clone()), Policy::ValidOrGuest);

        let resp = app.oneshot(request(None, Some(IP))).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(provider.calls(), 1);
        let minted = bearer(&guest_token(IP));
        assert_eq!(resp.headers().get("is-open-api").unwrap(), "True");
        assert_eq!(resp.headers().get("is-guest").unwrap(), "True");
        assert_eq!(resp.headers().get("authorization").unwrap(), minted.as_str());

        let body = json_body(resp).await;
        assert_eq!(body["authorization"], minted.as_str());
        assert_eq!(body["msisdn"], "guest");
    }

    #[tokio::test]
    async fn valid_or_guest_provider_failure_aborts() {
        let provider = Arc::new(FakeGuestProvider::failing());
        let app = app(state("x-forwarded-for", provider), Policy::ValidOrGuest);

        let resp = app.oneshot(request(None, Some(IP))).await.unwrap();

        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(resp.headers().get("is-open-api").unwrap(), "True");
    }
}
