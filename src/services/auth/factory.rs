/// Factory: build `AuthorizationGate` from application `Config`.
use std::sync::Arc;

use crate::config::Config;
use crate::services::auth::AuthorizationGate;
use crate::services::auth::guest::HttpGuestSessionProvider;
use crate::services::auth::token::TokenValidator;

pub fn build_gate(config: &Config, client: reqwest::Client) -> Arc<AuthorizationGate> {
    let validator = TokenValidator::new(
        config.jwt_secret.as_bytes(),
        config.jwt_algorithm,
        config.jwt_leeway_seconds,
    );

    let guest = HttpGuestSessionProvider::new(
        client,
        config.guest_login_url.clone(),
        config.forwarded_ip_header.clone(),
        config.default_device_type.clone(),
        tracing::info_span!("guest_session"),
    );

    Arc::new(AuthorizationGate::new(
        validator,
        Arc::new(guest),
        tracing::info_span!("authorization_gate"),
    ))
}
