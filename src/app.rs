/*
 * Responsibility
 * - tracing 初期化 / panic hook
 * - Config読み込み → 依存生成 (gate, routers) → Router 組み立て
 * - Middleware の適用 (request-id / trace / limit / timeout)
 * - axum::serve() で起動
 */
use std::{panic, process};

use anyhow::{Context, Result};
use axum::Router;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    api,
    config::Config,
    middleware,
    services::{auth, forward},
    state::AppState,
};

fn init_tracing() {
    // Prefer RUST_LOG if set; otherwise use a sensible default.
    // Ex:
    // RUST_LOG=info,edge_gate=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        // Always surface panics via tracing so they don't get lost.
        tracing::error!(?info, "panic");

        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env().context("failed to load configuration")?;

    init_panic_hook(!config.app_env.is_production());

    tracing::info!(
        "starting edge gate in {:?} mode on {}",
        config.app_env,
        config.addr
    );
    tracing::debug!(?config, "configuration loaded");

    let state = build_state(&config)?;
    let app = build_router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_state(config: &Config) -> Result<AppState> {
    // One client for guest login and both downstream services; it carries the
    // only timeout on outbound calls.
    let client = reqwest::Client::builder()
        .timeout(config.downstream_timeout)
        .build()
        .context("failed to build http client")?;

    let gate = auth::build_gate(config, client.clone());
    let primary = forward::build_primary_router(config, client.clone());
    let secondary = forward::build_secondary_router(config, client);

    Ok(AppState::new(
        gate,
        primary,
        secondary,
        config.forwarded_ip_header.clone(),
    ))
}

fn build_router(state: AppState, config: &Config) -> Router {
    let router = Router::new()
        .nest("/api/v1", api::v1::routes(state.clone()))
        .with_state(state);

    middleware::http::apply(router, config.forwarded_ip_header.clone())
}
