/*
 * Responsibility
 * - secondary service への転送 (method は呼び出し側が選ぶ)
 * - Authorization は伝搬しない
 * - status/body/error を返すだけで、レスポンスは書かない (呼び出し側の責務)
 */
use tracing::Instrument;

use crate::services::forward::send;
use crate::services::forward::types::{ForwardError, ForwardRequest, ForwardResult};

#[derive(Debug, Clone)]
pub struct SecondaryRouter {
    client: reqwest::Client,
    base_url: String,
    span: tracing::Span,
}

impl SecondaryRouter {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, span: tracing::Span) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            span,
        }
    }

    /// Any downstream status is a result; only transport/encoding problems are errors.
    pub async fn execute(&self, req: &ForwardRequest) -> Result<ForwardResult, ForwardError> {
        let span = tracing::debug_span!(
            parent: &self.span,
            "secondary_forward",
            method = %req.method,
            endpoint = %req.endpoint,
            request_id = req.headers.request_id.as_deref().unwrap_or(""),
            user_id = req.headers.user_id.as_deref().unwrap_or(""),
        );

        async {
            let (status, body) = send(&self.client, &self.base_url, req, false)
                .await
                .map_err(|err| {
                    tracing::error!(log_code = 230211u32, error = %err, "secondary service call failed");
                    err
                })?;

            tracing::debug!(status = %status, "secondary service answered");
            Ok(ForwardResult { status, body })
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use axum::http::{Method, StatusCode};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn router(base_url: String) -> SecondaryRouter {
        SecondaryRouter::new(reqwest::Client::new(), base_url, tracing::Span::none())
    }

    fn ctx() -> RequestContext {
        RequestContext {
            authorization: Some("Bearer secret".into()),
            forwarded_ip: Some("10.0.0.1".into()),
            user_id: Some("42".into()),
            request_id: Some("req-9".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn uses_selected_method_and_skips_authorization() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/profile"))
            .and(header("x-forwarded-for", "10.0.0.1"))
            .and(header("msisdn", "42"))
            .and(header("x-request-id", "req-9"))
            .respond_with(ResponseTemplate::new(200).set_body_string("done"))
            .expect(1)
            .mount(&server)
            .await;

        let req = ForwardRequest::new(&ctx(), "/profile").with_method(Method::PUT);
        let result = router(server.uri()).execute(&req).await.unwrap();

        assert_eq!(result.status, StatusCode::OK);
        assert_eq!(&result.body[..], b"done");

        let received = server.received_requests().await.unwrap();
        assert!(received[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn non_success_status_is_returned_not_raised() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(401).set_body_string(r#"{"message":"no"}"#))
            .mount(&server)
            .await;

        let req = ForwardRequest::new(&ctx(), "/profile").with_method(Method::DELETE);
        let result = router(server.uri()).execute(&req).await.unwrap();

        assert_eq!(result.status, StatusCode::UNAUTHORIZED);
        assert_eq!(&result.body[..], br#"{"message":"no"}"#);
    }

    #[tokio::test]
    async fn transport_failure_is_an_error() {
        let req = ForwardRequest::new(&ctx(), "/profile");
        let err = router("http://127.0.0.1:1".to_string())
            .execute(&req)
            .await
            .unwrap_err();

        assert!(matches!(err, ForwardError::Unavailable(_)));
    }
}
