/*
 * Responsibility
 * - Guest session (匿名・IP 束縛 token) の発行インターフェース
 * - HTTP 実装は外部 identity endpoint を同期的に呼ぶだけ (retry しない)
 * - 失敗時の status/message は provider 側が決める (gate はそのまま返す)
 */
use async_trait::async_trait;
use axum::http::{HeaderName, StatusCode, header};
use thiserror::Error;
use tracing::Instrument;

use crate::context::DEVICE_TYPE_HEADER;
use crate::services::auth::ip_binding::is_valid_ipv4;

pub const MSG_REQUIRED_HEADERS_MISSING: &str = "Some of the required headers are missing";
pub const MSG_REQUEST_BUILD_FAILED: &str = "error while creating the guest login request";
pub const MSG_GUEST_LOGIN_FAILED: &str = "error while guest login";
pub const MSG_GUEST_TOKEN_MISSING: &str = "Authorization header is empty after guest login";

#[derive(Debug, Error)]
pub enum GuestLoginError {
    #[error("forwarded ip is missing or malformed")]
    MalformedIp,

    #[error("failed to build guest login request: {0}")]
    Request(String),

    #[error("guest login request failed: {0}")]
    Unavailable(#[from] reqwest::Error),

    #[error("guest login response carried no token")]
    MissingToken,
}

impl GuestLoginError {
    /// Caller-facing status and message for this failure.
    pub fn reply(&self) -> (StatusCode, &'static str) {
        match self {
            Self::MalformedIp => (StatusCode::FORBIDDEN, MSG_REQUIRED_HEADERS_MISSING),
            Self::Request(_) => (StatusCode::FORBIDDEN, MSG_REQUEST_BUILD_FAILED),
            Self::Unavailable(_) => (StatusCode::UNPROCESSABLE_ENTITY, MSG_GUEST_LOGIN_FAILED),
            Self::MissingToken => (StatusCode::UNPROCESSABLE_ENTITY, MSG_GUEST_TOKEN_MISSING),
        }
    }
}

/// What the gate hands to the provider when it needs a guest session.
#[derive(Debug, Clone, Copy)]
pub struct GuestLoginRequest<'a> {
    pub forwarded_ip: &'a str,
    pub device_type: Option<&'a str>,
    pub request_id: Option<&'a str>,
}

/// Mints an anonymous token bound to the caller's forwarded IP.
///
/// Returns the full `Authorization` value (`Bearer <token>`) so the gate can
/// install it on the request and validate it straight away.
#[async_trait]
pub trait GuestSessionProvider: Send + Sync {
    async fn mint(&self, req: GuestLoginRequest<'_>) -> Result<String, GuestLoginError>;
}

/// Guest login over HTTP: `POST <url>` with the forwarded IP and device type,
/// token read back from the response `Authorization` header.
#[derive(Debug, Clone)]
pub struct HttpGuestSessionProvider {
    client: reqwest::Client,
    url: String,
    forwarded_ip_header: HeaderName,
    default_device_type: String,
    span: tracing::Span,
}

impl HttpGuestSessionProvider {
    pub fn new(
        client: reqwest::Client,
        url: impl Into<String>,
        forwarded_ip_header: HeaderName,
        default_device_type: impl Into<String>,
        span: tracing::Span,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            forwarded_ip_header,
            default_device_type: default_device_type.into(),
            span,
        }
    }

    async fn call(&self, req: GuestLoginRequest<'_>) -> Result<String, GuestLoginError> {
        // Checked before any network traffic.
        if !is_valid_ipv4(req.forwarded_ip) {
            tracing::warn!(log_code = 230131u32, client_ip = %req.forwarded_ip, "guest login refused: malformed forwarded ip");
            return Err(GuestLoginError::MalformedIp);
        }

        let device_type = req
            .device_type
            .filter(|v| !v.is_empty())
            .unwrap_or(self.default_device_type.as_str());

        let request = self
            .client
            .post(&self.url)
            .header(self.forwarded_ip_header.clone(), req.forwarded_ip)
            .header(DEVICE_TYPE_HEADER, device_type)
            .build()
            .map_err(|e| GuestLoginError::Request(e.to_string()))?;

        let resp = self.client.execute(request).await.map_err(|e| {
            tracing::error!(log_code = 230132u32, error = %e, "guest login request failed");
            GuestLoginError::from(e)
        })?;

        let token = resp
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        match token {
            Some(token) => {
                tracing::debug!(log_code = 130130u32, status = %resp.status(), "guest login succeeded");
                Ok(token)
            }
            None => {
                tracing::error!(log_code = 230133u32, status = %resp.status(), "guest login response carried no token");
                Err(GuestLoginError::MissingToken)
            }
        }
    }
}

#[async_trait]
impl GuestSessionProvider for HttpGuestSessionProvider {
    async fn mint(&self, req: GuestLoginRequest<'_>) -> Result<String, GuestLoginError> {
        let span = tracing::debug_span!(
            parent: &self.span,
            "guest_login",
            request_id = req.request_id.unwrap_or(""),
            client_ip = %req.forwarded_ip,
        );
        self.call(req).instrument(span).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header as header_eq, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(url: String) -> HttpGuestSessionProvider {
        HttpGuestSessionProvider::new(
            reqwest::Client::new(),
            url,
            HeaderName::from_static("x-forwarded-for"),
            "WEB",
            tracing::Span::none(),
        )
    }

    fn request<'a>(ip: &'a str, device_type: Option<&'a str>) -> GuestLoginRequest<'a> {
        GuestLoginRequest {
            forwarded_ip: ip,
            device_type,
            request_id: Some("req-1"),
        }
    }

    #[tokio::test]
    async fn returns_token_from_response_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/guest/login"))
            .and(header_eq("x-forwarded-for", "10.0.0.1"))
            .and(header_eq("device-type", "WEB"))
            .respond_with(ResponseTemplate::new(200).insert_header("Authorization", "Bearer guest-token"))
            .expect(1)
            .mount(&server)
            .await;

        let token = provider(format!("{}/guest/login", server.uri()))
            .mint(request("10.0.0.1", None))
            .await
            .unwrap();

        assert_eq!(token, "Bearer guest-token");
    }

    #[tokio::test]
    async fn forwards_caller_device_type() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header_eq("device-type", "ANDROID"))
            .respond_with(ResponseTemplate::new(200).insert_header("Authorization", "Bearer t"))
            .expect(1)
            .mount(&server)
            .await;

        let token = provider(server.uri())
            .mint(request("10.0.0.1", Some("ANDROID")))
            .await
            .unwrap();

        assert_eq!(token, "Bearer t");
    }

    #[tokio::test]
    async fn malformed_ip_fails_without_calling_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).insert_header("Authorization", "Bearer t"))
            .expect(0)
            .mount(&server)
            .await;

        let p = provider(server.uri());
        for ip in ["", "10.0.0.256", "not-an-ip"] {
            let err = p.mint(request(ip, None)).await.unwrap_err();
            assert!(matches!(err, GuestLoginError::MalformedIp));
            assert_eq!(err.reply().0, StatusCode::FORBIDDEN);
        }
    }

    #[tokio::test]
    async fn missing_token_is_unprocessable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let err = provider(server.uri())
            .mint(request("10.0.0.1", None))
            .await
            .unwrap_err();

        assert!(matches!(err, GuestLoginError::MissingToken));
        assert_eq!(err.reply(), (StatusCode::UNPROCESSABLE_ENTITY, MSG_GUEST_TOKEN_MISSING));
    }

    #[tokio::test]
    async fn transport_failure_is_unprocessable() {
        // Nothing listens on port 1.
        let err = provider("http://127.0.0.1:1/guest".to_string())
            .mint(request("10.0.0.1", None))
            .await
            .unwrap_err();

        assert!(matches!(err, GuestLoginError::Unavailable(_)));
        assert_eq!(err.reply(), (StatusCode::UNPROCESSABLE_ENTITY, MSG_GUEST_LOGIN_FAILED));
    }
}
