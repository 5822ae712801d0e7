/*
 * Responsibility
 * - downstream 転送の共通型 (ForwardRequest / ForwardResult / ForwardError)
 * - 呼び出し側に返す "どう書くべきか" (Reply) の型
 * - レスポンスの書き込み自体は handler (request boundary) で行う
 */
use axum::{
    Json,
    body::Bytes,
    http::{Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::context::{OUTBOUND_FORWARDED_IP_HEADER, REQUEST_ID_HEADER, RequestContext, USER_ID_HEADER};

pub const MSG_FORWARD_FAILED: &str = "An error occurred while processing your request";

/// Trust headers copied from the gate-populated context onto outbound calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropagatedHeaders {
    pub authorization: Option<String>,
    pub forwarded_ip: Option<String>,
    pub user_id: Option<String>,
    pub request_id: Option<String>,
}

impl PropagatedHeaders {
    pub fn from_context(ctx: &RequestContext) -> Self {
        Self {
            authorization: ctx.bearer().map(str::to_string),
            forwarded_ip: ctx.forwarded_ip.clone(),
            user_id: ctx.user_id.clone(),
            request_id: ctx.request_id.clone(),
        }
    }

    pub(crate) fn apply(
        &self,
        mut builder: reqwest::RequestBuilder,
        with_authorization: bool,
    ) -> reqwest::RequestBuilder {
        if with_authorization {
            if let Some(v) = &self.authorization {
                builder = builder.header(header::AUTHORIZATION, v);
            }
        }
        if let Some(v) = &self.forwarded_ip {
            builder = builder.header(OUTBOUND_FORWARDED_IP_HEADER, v);
        }
        if let Some(v) = &self.user_id {
            builder = builder.header(USER_ID_HEADER, v);
        }
        if let Some(v) = &self.request_id {
            builder = builder.header(REQUEST_ID_HEADER, v);
        }
        builder
    }
}

/// One outbound call: `<base_url><endpoint>` with a JSON object payload.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub endpoint: String,
    pub method: Method,
    pub payload: Map<String, Value>,
    pub headers: PropagatedHeaders,
}

impl ForwardRequest {
    pub fn new(ctx: &RequestContext, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: Method::POST,
            payload: Map::new(),
            headers: PropagatedHeaders::from_context(ctx),
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_payload(mut self, payload: Map<String, Value>) -> Self {
        self.payload = payload;
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.payload.insert(key.into(), value.into());
    }
}

/// Raw downstream answer; the body is never interpreted here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardResult {
    pub status: StatusCode,
    pub body: Bytes,
}

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("failed to encode payload: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("downstream unavailable: {0}")]
    Unavailable(#[from] reqwest::Error),

    #[error("client should login again")]
    ReauthRequired { body: Bytes },

    #[error("invalid response: {status}")]
    Rejected { status: StatusCode, body: Bytes },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyBody {
    /// `{"message": ...}`
    Message(&'static str),
    /// Downstream bytes relayed as JSON.
    Raw(Bytes),
}

/// What the caller should see for a failed forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: StatusCode,
    pub body: ReplyBody,
}

impl Reply {
    pub fn message(status: StatusCode, message: &'static str) -> Self {
        Self {
            status,
            body: ReplyBody::Message(message),
        }
    }

    pub fn raw(status: StatusCode, body: Bytes) -> Self {
        Self {
            status,
            body: ReplyBody::Raw(body),
        }
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        match self.body {
            ReplyBody::Message(message) => {
                (self.status, Json(json!({ "message": message }))).into_response()
            }
            ReplyBody::Raw(body) => (
                self.status,
                [(header::CONTENT_TYPE, "application/json")],
                body,
            )
                .into_response(),
        }
    }
}

/// A classified failure plus the reply to write, if the mode asks for one.
///
/// `reply == None` means the caller asked for raw errors and owns the response.
#[derive(Debug)]
pub struct ForwardFailure {
    pub error: ForwardError,
    pub reply: Option<Reply>,
}
