/// Factory: build the forwarding routers from application `Config`.
use crate::config::Config;
use crate::services::forward::{PrimaryRouter, SecondaryRouter};

pub fn build_primary_router(config: &Config, client: reqwest::Client) -> PrimaryRouter {
    PrimaryRouter::new(
        client,
        config.primary_service_url.clone(),
        tracing::info_span!("primary_router"),
    )
}

pub fn build_secondary_router(config: &Config, client: reqwest::Client) -> SecondaryRouter {
    SecondaryRouter::new(
        client,
        config.secondary_service_url.clone(),
        tracing::info_span!("secondary_router"),
    )
}
