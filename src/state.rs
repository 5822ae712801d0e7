/*
 * Responsibility
 * - Router に紐づける共有コンテキスト (AppState)
 *   - gate, primary/secondary router, forwarded-IP header 名
 * - Clone 前提で持つ (内部は Arc/Clone cheap)
 * - 起動後は read-only (リクエスト間で共有する可変状態は持たない)
 */
use std::sync::Arc;

use axum::http::HeaderName;

use crate::services::auth::AuthorizationGate;
use crate::services::forward::{PrimaryRouter, SecondaryRouter};

#[derive(Clone, Debug)]
pub struct AppState {
    pub gate: Arc<AuthorizationGate>,
    pub primary: PrimaryRouter,
    pub secondary: SecondaryRouter,
    pub forwarded_ip_header: HeaderName,
}

impl AppState {
    pub fn new(
        gate: Arc<AuthorizationGate>,
        primary: PrimaryRouter,
        secondary: SecondaryRouter,
        forwarded_ip_header: HeaderName,
    ) -> Self {
        Self {
            gate,
            primary,
            secondary,
            forwarded_ip_header,
        }
    }
}
