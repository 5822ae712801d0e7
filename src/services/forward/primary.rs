//! Primary-service router.
//!
//! Always POSTs, propagates `Authorization` along with the other trust
//! headers, and classifies the downstream answer:
//!
//! - transport / encoding failure → generic error (unless raw errors)
//! - `401` → [`ForwardError::ReauthRequired`], relayed or collapsed
//! - `200` → body returned as is
//! - anything else → [`ForwardError::Rejected`], generic error (unless raw errors)

use axum::{
    body::Bytes,
    http::{Method, StatusCode},
};
use tracing::Instrument;

use crate::services::forward::send;
use crate::services::forward::types::{
    ForwardError, ForwardFailure, ForwardRequest, MSG_FORWARD_FAILED, Reply,
};

/// How a downstream `401` reaches the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReauthMode {
    /// Status 401 and the downstream body, verbatim. A human can log in again.
    Relay,
    /// The configured error status with the downstream body. Background callers
    /// only need to know the call failed.
    Collapse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteOptions {
    pub reauth: ReauthMode,
    /// Write nothing for transport and non-401 failures; hand the error back.
    pub raw_errors: bool,
    pub error_status: StatusCode,
    pub error_message: &'static str,
}

impl ExecuteOptions {
    pub const fn interactive() -> Self {
        Self {
            reauth: ReauthMode::Relay,
            raw_errors: false,
            error_status: StatusCode::NOT_ACCEPTABLE,
            error_message: MSG_FORWARD_FAILED,
        }
    }

    pub const fn critical() -> Self {
        Self {
            raw_errors: true,
            ..Self::interactive()
        }
    }

    pub const fn background() -> Self {
        Self {
            reauth: ReauthMode::Collapse,
            raw_errors: false,
            error_status: StatusCode::UNPROCESSABLE_ENTITY,
            error_message: MSG_FORWARD_FAILED,
        }
    }

    pub fn with_error(mut self, status: StatusCode, message: &'static str) -> Self {
        self.error_status = status;
        self.error_message = message;
        self
    }

    fn generic_reply(&self) -> Option<Reply> {
        if self.raw_errors {
            None
        } else {
            Some(Reply::message(self.error_status, self.error_message))
        }
    }
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self::interactive()
    }
}

#[derive(Debug, Clone)]
pub struct PrimaryRouter {
    client: reqwest::Client,
    base_url: String,
    span: tracing::Span,
}

impl PrimaryRouter {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, span: tracing::Span) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            span,
        }
    }

    pub async fn execute(
        &self,
        req: &ForwardRequest,
        opts: ExecuteOptions,
    ) -> Result<Bytes, ForwardFailure> {
        let span = tracing::debug_span!(
            parent: &self.span,
            "primary_forward",
            endpoint = %req.endpoint,
            request_id = req.headers.request_id.as_deref().unwrap_or(""),
            user_id = req.headers.user_id.as_deref().unwrap_or(""),
            client_ip = req.headers.forwarded_ip.as_deref().unwrap_or(""),
        );

        async {
            // The primary service only speaks POST.
            let outcome = if req.method == Method::POST {
                send(&self.client, &self.base_url, req, true).await
            } else {
                let mut req = req.clone();
                req.method = Method::POST;
                send(&self.client, &self.base_url, &req, true).await
            };

            match outcome {
                Ok((status, body)) => classify(status, body, opts),
                Err(error) => {
                    tracing::error!(log_code = 230201u32, error = %error, "primary service call failed");
                    Err(ForwardFailure {
                        error,
                        reply: opts.generic_reply(),
                    })
                }
            }
        }
        .instrument(span)
        .await
    }
}

fn classify(status: StatusCode, body: Bytes, opts: ExecuteOptions) -> Result<Bytes, ForwardFailure> {
    if status == StatusCode::OK {
        return Ok(body);
    }

    if status == StatusCode::UNAUTHORIZED {
        tracing::warn!(log_code = 230203u32, "primary service asked the client to login again");
        let reply = match opts.reauth {
            ReauthMode::Relay => Some(Reply::raw(StatusCode::UNAUTHORIZED, body.clone())),
            ReauthMode::Collapse if opts.raw_errors => None,
            ReauthMode::Collapse => Some(Reply::raw(opts.error_status, body.clone())),
        };
        return Err(ForwardFailure {
            error: ForwardError::ReauthRequired { body },
            reply,
        });
    }

    tracing::warn!(log_code = 230204u32, status = %status, "primary service rejected the request");
    Err(ForwardFailure {
        error: ForwardError::Rejected { status, body },
        reply: opts.generic_reply(),
    })
}
