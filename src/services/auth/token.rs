use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::Value;
use std::{error::Error as StdError, fmt};

const BEARER_SEPARATOR: &str = "Bearer ";

// Errors returned by bearer-token parsing + verification.
#[derive(Debug)]
pub enum TokenError {
    MalformedHeader,
    InvalidToken(jsonwebtoken::errors::Error),
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedHeader => write!(f, "authorization header is not 'Bearer <token>'"),
            Self::InvalidToken(e) => write!(f, "jwt verification failed: {}", e),
        }
    }
}

impl StdError for TokenError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::InvalidToken(e) => Some(e),
            _ => None,
        }
    }
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        Self::InvalidToken(e)
    }
}

/// Claims as they appear on the wire.
///
/// Identity provider tokens are loosely typed (`user_id` may be a number or a
/// string), so every recognised claim is kept as a raw JSON value and unknown
/// claims are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
struct RawClaims {
    #[serde(default)]
    user_id: Option<Value>,
    #[serde(default)]
    token_id: Option<Value>,
    #[serde(default)]
    ip: Option<Value>,
    #[serde(default)]
    is_guest: Option<Value>,
}

/// Verified claims with explicit absence.
///
/// `None` means the claim was missing (or JSON `null`); `Some("")` means it was
/// present but empty. Nothing here ever carries a placeholder string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Claims {
    pub user_id: Option<String>,
    pub token_id: Option<String>,
    pub ip: Option<String>,
    /// `Some(true)` only for a boolean `true`; any other value is `Some(false)`.
    pub is_guest: Option<bool>,
}

impl Claims {
    pub fn is_guest(&self) -> bool {
        self.is_guest == Some(true)
    }
}

impl From<RawClaims> for Claims {
    fn from(raw: RawClaims) -> Self {
        Self {
            user_id: raw.user_id.as_ref().and_then(render_claim),
            token_id: raw.token_id.as_ref().and_then(render_claim),
            ip: raw.ip.as_ref().and_then(render_claim),
            is_guest: raw
                .is_guest
                .as_ref()
                .filter(|v| !v.is_null())
                .map(|v| matches!(v, Value::Bool(true))),
        }
    }
}

fn render_claim(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// Split `Bearer <token>` on the literal separator; exactly two parts allowed.
///
/// `"Bearer a Bearer b"` and `"xBearer a"` both fail, as does a bare token.
pub fn split_bearer(header_value: &str) -> Result<&str, TokenError> {
    let mut parts = header_value.split(BEARER_SEPARATOR);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(""), Some(token), None) => Ok(token),
        _ => Err(TokenError::MalformedHeader),
    }
}

/// HMAC bearer-token verifier.
///
/// - Secret material is intentionally not printable via Debug.
#[derive(Clone)]
pub struct TokenValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Do not print key material
        f.debug_struct("TokenValidator")
            .field("validation", &self.validation)
            .finish()
    }
}

impl TokenValidator {
    pub fn new(secret: &[u8], algorithm: Algorithm, leeway_seconds: u64) -> Self {
        let mut validation = Validation::new(algorithm);
        // The identity provider does not always stamp `exp`; when present it is enforced.
        validation.required_spec_claims.clear();
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.validate_aud = false;
        validation.leeway = leeway_seconds;

        Self {
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Parse the raw `Authorization` value, verify the token and extract claims.
    pub fn validate(&self, header_value: &str) -> Result<Claims, TokenError> {
        let token = split_bearer(header_value)?;
        self.verify(token)
    }

    // Verify and decode a bare token.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let data = jsonwebtoken::decode::<RawClaims>(token, &self.decoding_key, &self.validation)?;
        Ok(data.claims.into())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use jsonwebtoken::{EncodingKey, Header};
    use serde_json::{Value, json};

    pub const SECRET: &[u8] = b"test-secret";

    pub fn sign(claims: &Value) -> String {
        sign_with(claims, SECRET)
    }

    pub fn sign_with(claims: &Value, secret: &[u8]) -> String {
        jsonwebtoken::encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret),
        )
        .expect("sign test token")
    }

    pub fn user_token(user_id: &str, ip: &str) -> String {
        sign(&json!({
            "user_id": user_id,
            "token_id": format!("tok-{user_id}"),
            "ip": ip,
            "is_guest": false,
        }))
    }

    pub fn guest_token(ip: &str) -> String {
        sign(&json!({
            "user_id": "guest",
            "token_id": format!("guest-{ip}"),
            "ip": ip,
            "is_guest": true,
        }))
    }

    pub fn bearer(token: &str) -> String {
        format!("Bearer {token}")
    }
}
