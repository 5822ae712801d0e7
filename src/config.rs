/*
 * Responsibility
 * - 環境変数の読み込み (JWT secret, guest login URL, downstream base URL など)
 * - 設定値のバリデーション (不足なら起動失敗)
 * - forwarded-IP header 名もここで決める (グローバル変数にはしない)
 */
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use axum::http::HeaderName;
use jsonwebtoken::Algorithm;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn from_env() -> Self {
        match std::env::var("APP_ENV")
            .unwrap_or_else(|_| "development".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

pub const DEFAULT_FORWARDED_IP_HEADER: &str = "x-forwarded-for";
pub const DEFAULT_DEVICE_TYPE: &str = "WEB";

#[derive(Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,

    // Shared HMAC secret; never printed.
    pub jwt_secret: String,
    pub jwt_algorithm: Algorithm,
    pub jwt_leeway_seconds: u64,

    // Load tests swap this for a fake header so real proxies can't collide.
    pub forwarded_ip_header: HeaderName,

    pub guest_login_url: String,
    pub default_device_type: String,

    pub primary_service_url: String,
    pub secondary_service_url: String,
    pub downstream_timeout: Duration,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("addr", &self.addr)
            .field("app_env", &self.app_env)
            .field("jwt_algorithm", &self.jwt_algorithm)
            .field("jwt_leeway_seconds", &self.jwt_leeway_seconds)
            .field("forwarded_ip_header", &self.forwarded_ip_header)
            .field("guest_login_url", &self.guest_login_url)
            .field("default_device_type", &self.default_device_type)
            .field("primary_service_url", &self.primary_service_url)
            .field("secondary_service_url", &self.secondary_service_url)
            .field("downstream_timeout", &self.downstream_timeout)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);

        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = AppEnv::from_env();

        let jwt_secret =
            std::env::var("JWT_SECRET_KEY").map_err(|_| ConfigError::Missing("JWT_SECRET_KEY"))?;
        if jwt_secret.is_empty() {
            return Err(ConfigError::Invalid("JWT_SECRET_KEY"));
        }

        let jwt_algorithm = match std::env::var("JWT_ALGORITHM") {
            Ok(v) => parse_hmac_algorithm(&v).ok_or(ConfigError::Invalid("JWT_ALGORITHM"))?,
            Err(_) => Algorithm::HS256,
        };

        let jwt_leeway_seconds = std::env::var("JWT_LEEWAY_SECONDS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);

        let forwarded_ip_header = std::env::var("FORWARDED_IP_HEADER")
            .unwrap_or_else(|_| DEFAULT_FORWARDED_IP_HEADER.to_string());
        let forwarded_ip_header = HeaderName::from_str(forwarded_ip_header.trim())
            .map_err(|_| ConfigError::Invalid("FORWARDED_IP_HEADER"))?;

        let guest_login_url = required_url("GUEST_LOGIN_URL")?;

        let default_device_type = std::env::var("DEFAULT_DEVICE_TYPE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DEVICE_TYPE.to_string());

        let primary_service_url = required_url("PRIMARY_SERVICE_URL")?;
        let secondary_service_url = required_url("SECONDARY_SERVICE_URL")?;

        let downstream_timeout = std::env::var("DOWNSTREAM_TIMEOUT_SECONDS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(10));

        Ok(Self {
            addr,
            app_env,
            jwt_secret,
            jwt_algorithm,
            jwt_leeway_seconds,
            forwarded_ip_header,
            guest_login_url,
            default_device_type,
            primary_service_url,
            secondary_service_url,
            downstream_timeout,
        })
    }
}

fn required_url(key: &'static str) -> Result<String, ConfigError> {
    let raw = std::env::var(key).map_err(|_| ConfigError::Missing(key))?;
    let raw = raw.trim();
    // Endpoints are appended verbatim, so only validate that the base parses.
    Url::parse(raw).map_err(|_| ConfigError::Invalid(key))?;
    Ok(raw.to_string())
}

/// Only shared-secret algorithms make sense with a single HMAC secret.
pub fn parse_hmac_algorithm(raw: &str) -> Option<Algorithm> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "HS256" => Some(Algorithm::HS256),
        "HS384" => Some(Algorithm::HS384),
        "HS512" => Some(Algorithm::HS512),
        _ => None,
    }
}
