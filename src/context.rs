/*
 * Responsibility
 * - リクエスト単位の trust context (RequestContext) の型
 * - 受信ヘッダから生成し、gate だけが user/token 識別子を書き換える
 * - router はここから forward 用ヘッダを読む (token の再パースはしない)
 */
use axum::http::{HeaderMap, HeaderName, HeaderValue, header};

pub const USER_ID_HEADER: HeaderName = HeaderName::from_static("msisdn");
pub const TOKEN_ID_HEADER: HeaderName = HeaderName::from_static("token-id");
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");
pub const DEVICE_TYPE_HEADER: HeaderName = HeaderName::from_static("device-type");
pub const IS_GUEST_HEADER: HeaderName = HeaderName::from_static("is-guest");
pub const IS_OPEN_API_HEADER: HeaderName = HeaderName::from_static("is-open-api");

/// Outbound requests always carry the client IP under the standard name,
/// whatever header the edge was configured to trust on the way in.
pub const OUTBOUND_FORWARDED_IP_HEADER: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Per-request carrier of the header values the gate and the routers care about.
///
/// Absent headers stay `None`; an empty header value is kept as `Some("")` so
/// callers can tell "not sent" from "sent empty".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub authorization: Option<String>,
    pub forwarded_ip: Option<String>,
    pub user_id: Option<String>,
    pub token_id: Option<String>,
    pub request_id: Option<String>,
    pub device_type: Option<String>,
}

impl RequestContext {
    pub fn from_headers(headers: &HeaderMap, forwarded_ip_header: &HeaderName) -> Self {
        Self {
            authorization: header_str(headers, &header::AUTHORIZATION),
            forwarded_ip: header_str(headers, forwarded_ip_header),
            user_id: header_str(headers, &USER_ID_HEADER),
            token_id: header_str(headers, &TOKEN_ID_HEADER),
            request_id: header_str(headers, &REQUEST_ID_HEADER),
            device_type: header_str(headers, &DEVICE_TYPE_HEADER),
        }
    }

    /// `Authorization` counts as present only when it is non-empty.
    pub fn bearer(&self) -> Option<&str> {
        self.authorization.as_deref().filter(|v| !v.is_empty())
    }

    pub fn forwarded_ip(&self) -> &str {
        self.forwarded_ip.as_deref().unwrap_or("")
    }

    /// Write the gate-owned trust fields back onto the inbound headers.
    ///
    /// A `None` removes the header so that a client-supplied value never
    /// survives an allowed request.
    pub fn write_trust_headers(&self, headers: &mut HeaderMap) {
        set_or_remove(headers, USER_ID_HEADER, self.user_id.as_deref());
        set_or_remove(headers, TOKEN_ID_HEADER, self.token_id.as_deref());
        if let Some(auth) = self.bearer() {
            set_or_remove(headers, header::AUTHORIZATION, Some(auth));
        }
    }
}

fn header_str(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

fn set_or_remove(headers: &mut HeaderMap, name: HeaderName, value: Option<&str>) {
    match value.and_then(|v| HeaderValue::from_str(v).ok()) {
        Some(v) => {
            headers.insert(name, v);
        }
        None => {
            headers.remove(name);
        }
    }
}
