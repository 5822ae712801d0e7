//! Authorization gate: header → token → guest? → IP binding → allow / deny.
//!
//! The gate only *decides*. It takes the request's [`RequestContext`], returns
//! an [`AuthDecision`] and leaves writing the response (and rewriting the
//! request headers) to the middleware at the request boundary.
//!
//! Three policies share the same pipeline:
//!
//! - [`Policy::StrictAuthenticated`]: interactive endpoints. Guests are
//!   rejected, malformed forwarded IP is 403, everything else 401.
//! - [`Policy::ProcessableAuthenticated`]: background callers. Same checks,
//!   every denial is 422.
//! - [`Policy::ValidOrGuest`]: open endpoints. A missing `Authorization`
//!   mints a guest session; a guest session whose IP drifted is re-minted
//!   exactly once. An authenticated session whose IP drifted is 401.

use std::fmt;
use std::sync::Arc;

use axum::http::StatusCode;
use thiserror::Error;
use tracing::Instrument;

use crate::context::RequestContext;
use crate::services::auth::guest::{
    GuestLoginError, GuestLoginRequest, GuestSessionProvider, MSG_REQUIRED_HEADERS_MISSING,
};
use crate::services::auth::ip_binding::{BindingError, IpBindingPolicy};
use crate::services::auth::token::{Claims, TokenError, TokenValidator};

pub const MSG_SESSION_EXPIRED: &str = "Your session has expired";
pub const MSG_LOGIN_REQUIRED: &str = "Please log in";
pub const MSG_REQUIRED_HEADERS_INVALID: &str = "Some of the required headers are missing or invalid";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    StrictAuthenticated,
    ProcessableAuthenticated,
    ValidOrGuest,
}

impl Policy {
    fn log_base(&self) -> u32 {
        match self {
            Self::StrictAuthenticated => 100,
            Self::ProcessableAuthenticated => 110,
            Self::ValidOrGuest => 120,
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::StrictAuthenticated => "strict_authenticated",
            Self::ProcessableAuthenticated => "processable_authenticated",
            Self::ValidOrGuest => "valid_or_guest",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authorization header is missing")]
    MissingCredentials,

    #[error("authorization header is malformed")]
    MalformedHeader,

    #[error("token is invalid: {0}")]
    InvalidToken(String),

    #[error("token belongs to a guest")]
    GuestNotPermitted,

    #[error("client ip does not match the session")]
    BindingViolation,

    #[error("forwarded ip is missing or malformed")]
    MalformedIp,

    #[error(transparent)]
    GuestLogin(#[from] GuestLoginError),
}

impl AuthError {
    fn log_offset(&self) -> u32 {
        match self {
            Self::MissingCredentials => 1,
            Self::MalformedHeader | Self::InvalidToken(_) => 2,
            Self::GuestNotPermitted => 3,
            Self::BindingViolation | Self::MalformedIp => 4,
            Self::GuestLogin(_) => 5,
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::MalformedHeader => Self::MalformedHeader,
            TokenError::InvalidToken(e) => Self::InvalidToken(e.to_string()),
        }
    }
}

impl From<BindingError> for AuthError {
    fn from(e: BindingError) -> Self {
        match e {
            BindingError::MalformedIp => Self::MalformedIp,
            BindingError::Violation => Self::BindingViolation,
        }
    }
}

/// An allowed request.
#[derive(Debug, Clone)]
pub struct Grant {
    /// The inbound context with the gate-owned fields rewritten from claims.
    pub context: RequestContext,
    pub is_guest: bool,
    /// `Authorization` value minted during this request, if any.
    pub issued_authorization: Option<String>,
}

/// A terminal denial. `status` and `message` are what the caller sees.
#[derive(Debug)]
pub struct Denial {
    pub status: StatusCode,
    pub message: &'static str,
    pub is_guest: bool,
    pub reason: AuthError,
}

/// Produced once per request and never mutated afterwards.
#[derive(Debug)]
pub enum AuthDecision {
    Allow(Grant),
    Deny(Denial),
}

impl AuthDecision {
    pub fn allow(&self) -> bool {
        matches!(self, Self::Allow(_))
    }

    pub fn is_guest(&self) -> bool {
        match self {
            Self::Allow(g) => g.is_guest,
            Self::Deny(d) => d.is_guest,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Allow(_) => StatusCode::OK,
            Self::Deny(d) => d.status,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Allow(_) => "",
            Self::Deny(d) => d.message,
        }
    }
}

// Internal failure before it is mapped to a policy-specific status.
struct Rejection {
    reason: AuthError,
    is_guest: bool,
}

impl Rejection {
    fn new(reason: impl Into<AuthError>) -> Self {
        Self {
            reason: reason.into(),
            is_guest: false,
        }
    }

    fn guest(reason: impl Into<AuthError>) -> Self {
        Self {
            reason: reason.into(),
            is_guest: true,
        }
    }
}

pub struct AuthorizationGate {
    validator: TokenValidator,
    guest: Arc<dyn GuestSessionProvider>,
    span: tracing::Span,
}

impl fmt::Debug for AuthorizationGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationGate")
            .field("validator", &self.validator)
            .finish()
    }
}

impl AuthorizationGate {
    pub fn new(
        validator: TokenValidator,
        guest: Arc<dyn GuestSessionProvider>,
        span: tracing::Span,
    ) -> Self {
        Self {
            validator,
            guest,
            span,
        }
    }

    pub async fn authorize(&self, policy: Policy, ctx: &RequestContext) -> AuthDecision {
        let span = tracing::debug_span!(
            parent: &self.span,
            "authorize",
            %policy,
            request_id = ctx.request_id.as_deref().unwrap_or(""),
            client_ip = %ctx.forwarded_ip(),
        );

        async {
            let outcome = match policy {
                Policy::StrictAuthenticated | Policy::ProcessableAuthenticated => {
                    self.authenticated(ctx, IpBindingPolicy::ipv4_then_exact())
                }
                Policy::ValidOrGuest => self.valid_or_guest(ctx).await,
            };

            match outcome {
                Ok(grant) => {
                    tracing::debug!(
                        log_code = 130_000 + policy.log_base(),
                        user_id = grant.context.user_id.as_deref().unwrap_or(""),
                        token_id = grant.context.token_id.as_deref().unwrap_or(""),
                        is_guest = grant.is_guest,
                        "the token is valid"
                    );
                    AuthDecision::Allow(grant)
                }
                Err(rejection) => AuthDecision::Deny(self.deny(policy, rejection)),
            }
        }
        .instrument(span)
        .await
    }

    // Strict and processable share every check; they only differ in how a
    // failure is reported.
    fn authenticated(
        &self,
        ctx: &RequestContext,
        binding: IpBindingPolicy,
    ) -> Result<Grant, Rejection> {
        let authorization = ctx
            .bearer()
            .ok_or_else(|| Rejection::new(AuthError::MissingCredentials))?;

        let claims = self.validator.validate(authorization).map_err(Rejection::new)?;

        if claims.is_guest() {
            return Err(Rejection::guest(AuthError::GuestNotPermitted));
        }

        binding.check(&claims, ctx.forwarded_ip()).map_err(|e| {
            tracing::warn!(previous_ip = claims.ip.as_deref().unwrap_or(""), "the user ip has been changed");
            Rejection::new(e)
        })?;

        Ok(grant(ctx, authorization, &claims, None))
    }

    async fn valid_or_guest(&self, ctx: &RequestContext) -> Result<Grant, Rejection> {
        let mut issued = None;

        let authorization = match ctx.bearer() {
            Some(v) => v.to_string(),
            None => {
                let minted = self.mint(ctx).await?;
                issued = Some(minted.clone());
                minted
            }
        };

        let mut claims = self.validator.validate(&authorization).map_err(|e| {
            Rejection {
                is_guest: issued.is_some(),
                reason: e.into(),
            }
        })?;

        let binding = IpBindingPolicy::exact();
        if binding.check(&claims, ctx.forwarded_ip()).is_err() {
            if !claims.is_guest() {
                tracing::warn!(previous_ip = claims.ip.as_deref().unwrap_or(""), "the user ip has been changed");
                return Err(Rejection::new(AuthError::BindingViolation));
            }

            // Stale anonymous session: re-mint once for the current IP.
            tracing::debug!(previous_ip = claims.ip.as_deref().unwrap_or(""), "guest ip drifted, re-minting");
            let minted = self.mint(ctx).await.map_err(|r| Rejection {
                is_guest: true,
                ..r
            })?;
            claims = self.validator.validate(&minted).map_err(Rejection::guest)?;

            binding
                .check(&claims, ctx.forwarded_ip())
                .map_err(Rejection::guest)?;
            issued = Some(minted);
        }

        let authorization = issued.as_deref().unwrap_or(authorization.as_str()).to_string();
        Ok(grant(ctx, &authorization, &claims, issued))
    }

    async fn mint(&self, ctx: &RequestContext) -> Result<String, Rejection> {
        let req = GuestLoginRequest {
            forwarded_ip: ctx.forwarded_ip(),
            device_type: ctx.device_type.as_deref(),
            request_id: ctx.request_id.as_deref(),
        };

        let minted = self
            .guest
            .mint(req)
            .await
            .map_err(|e| Rejection::new(AuthError::GuestLogin(e)))?;

        tracing::debug!("guest login successfully");
        Ok(minted)
    }

    fn deny(&self, policy: Policy, rejection: Rejection) -> Denial {
        let Rejection { reason, is_guest } = rejection;

        let (status, message) = match (&reason, policy) {
            (AuthError::GuestLogin(e), _) => e.reply(),
            (AuthError::GuestNotPermitted, Policy::ProcessableAuthenticated) => {
                (StatusCode::UNPROCESSABLE_ENTITY, MSG_LOGIN_REQUIRED)
            }
            (AuthError::GuestNotPermitted, _) => (StatusCode::UNAUTHORIZED, MSG_LOGIN_REQUIRED),
            (AuthError::MalformedIp, Policy::ProcessableAuthenticated) => {
                (StatusCode::UNPROCESSABLE_ENTITY, MSG_REQUIRED_HEADERS_MISSING)
            }
            (AuthError::MalformedIp, _) => (StatusCode::FORBIDDEN, MSG_REQUIRED_HEADERS_INVALID),
            (_, Policy::ProcessableAuthenticated) => {
                (StatusCode::UNPROCESSABLE_ENTITY, MSG_SESSION_EXPIRED)
            }
            (_, _) => (StatusCode::UNAUTHORIZED, MSG_SESSION_EXPIRED),
        };

        let log_code = 230_000 + policy.log_base() + reason.log_offset();
        if matches!(reason, AuthError::GuestLogin(_)) {
            tracing::error!(log_code, error = %reason, status = %status, "guest login failed");
        } else {
            tracing::warn!(log_code, error = %reason, status = %status, is_guest, "request denied");
        }

        Denial {
            status,
            message,
            is_guest,
            reason,
        }
    }
}

fn grant(
    ctx: &RequestContext,
    authorization: &str,
    claims: &Claims,
    issued_authorization: Option<String>,
) -> Grant {
    let context = RequestContext {
        authorization: Some(authorization.to_string()),
        user_id: claims.user_id.clone(),
        token_id: claims.token_id.clone(),
        ..ctx.clone()
    };

    Grant {
        context,
        is_guest: claims.is_guest(),
        issued_authorization,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::services::auth::guest::{GuestLoginError, GuestLoginRequest, GuestSessionProvider};
    use crate::services::auth::token::test_support::{bearer, guest_token};

    /// Mints guest tokens bound to the requested IP, or to a fixed IP when set.
    #[derive(Default)]
    pub struct FakeGuestProvider {
        pub bind_to: Option<String>,
        pub fail: bool,
        pub calls: AtomicUsize,
    }

    impl FakeGuestProvider {
        pub fn bound_to(ip: &str) -> Self {
            Self {
                bind_to: Some(ip.to_string()),
                ..Default::default()
            }
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GuestSessionProvider for FakeGuestProvider {
        async fn mint(&self, req: GuestLoginRequest<'_>) -> Result<String, GuestLoginError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(GuestLoginError::MissingToken);
            }
            let ip = self.bind_to.as_deref().unwrap_or(req.forwarded_ip);
            Ok(bearer(&guest_token(ip)))
        }
    }
}
