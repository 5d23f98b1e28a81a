//! Bearer credentials issued by the authentication provider.
//!
//! Tokens are HMAC-SHA256 based, binding an account id to the account's
//! registered email. Format: `mp_at_<account_id>_<hex(email)>_<hmac_hex>`.
//! An empty email segment means the account has no email on file.

mod authenticator;

pub use authenticator::TokenAuthenticator;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Token prefix used to identify mealplan account tokens.
const TOKEN_PREFIX: &str = "mp_at_";

/// Environment variable holding the hex-encoded shared secret.
pub const SECRET_ENV_VAR: &str = "MEALPLAN_TOKEN_SECRET";

/// Errors that can occur during token operations.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("invalid token format: {0}")]
    InvalidFormat(String),

    #[error("invalid account ID in token: {0}")]
    InvalidAccountId(String),

    #[error("invalid email segment in token: {0}")]
    InvalidEmail(String),

    #[error("token HMAC verification failed")]
    HmacMismatch,

    #[error("missing token secret")]
    MissingSecret,
}

/// Configuration for token generation and validation.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// The HMAC secret key bytes.
    pub secret: Vec<u8>,
}

impl TokenConfig {
    pub fn new(secret: Vec<u8>) -> Self {
        Self { secret }
    }

    /// Decode a hex secret as written by `mealplan init`.
    pub fn from_hex(secret_hex: &str) -> Result<Self, TokenError> {
        let secret = hex::decode(secret_hex.trim()).map_err(|e| {
            TokenError::InvalidFormat(format!("token secret is not valid hex: {e}"))
        })?;
        Ok(Self::new(secret))
    }

    /// Create a TokenConfig from the `MEALPLAN_TOKEN_SECRET` environment
    /// variable.
    pub fn from_env() -> Result<Self, TokenError> {
        let secret_hex = std::env::var(SECRET_ENV_VAR).map_err(|_| TokenError::MissingSecret)?;
        Self::from_hex(&secret_hex)
    }
}

/// Claims extracted from a validated token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub account_id: Uuid,
    pub email: Option<String>,
}

/// Issue a credential for an account.
///
/// The HMAC-SHA256 is computed over `<account_id>:<email>`.
pub fn generate_token(config: &TokenConfig, account_id: Uuid, email: Option<&str>) -> String {
    let email = email.unwrap_or("");
    let mac = compute_hmac(&config.secret, signed_message(account_id, email).as_bytes());
    format!(
        "{TOKEN_PREFIX}{account_id}_{}_{}",
        hex::encode(email),
        hex::encode(mac)
    )
}

/// Validate a credential and extract its claims.
pub fn validate_token(config: &TokenConfig, token: &str) -> Result<TokenClaims, TokenError> {
    let rest = token.strip_prefix(TOKEN_PREFIX).ok_or_else(|| {
        TokenError::InvalidFormat(format!("token must start with '{TOKEN_PREFIX}'"))
    })?;

    if rest.len() < 36 || !rest.is_char_boundary(36) {
        return Err(TokenError::InvalidFormat(
            "token too short to contain a valid UUID".to_string(),
        ));
    }
    let (id_str, after_id) = rest.split_at(36);
    let account_id =
        Uuid::parse_str(id_str).map_err(|e| TokenError::InvalidAccountId(e.to_string()))?;

    let after_underscore = after_id.strip_prefix('_').ok_or_else(|| {
        TokenError::InvalidFormat("expected underscore after account id".to_string())
    })?;
    let (email_hex, hmac_hex) = after_underscore.split_once('_').ok_or_else(|| {
        TokenError::InvalidFormat("expected underscore between email and hmac".to_string())
    })?;

    let email_bytes =
        hex::decode(email_hex).map_err(|e| TokenError::InvalidEmail(e.to_string()))?;
    let email =
        String::from_utf8(email_bytes).map_err(|e| TokenError::InvalidEmail(e.to_string()))?;

    let provided_mac = hex::decode(hmac_hex)
        .map_err(|e| TokenError::InvalidFormat(format!("invalid hex in hmac: {e}")))?;

    let mut mac = new_mac(&config.secret);
    mac.update(signed_message(account_id, &email).as_bytes());
    mac.verify_slice(&provided_mac)
        .map_err(|_| TokenError::HmacMismatch)?;

    Ok(TokenClaims {
        account_id,
        email: (!email.is_empty()).then_some(email),
    })
}

fn signed_message(account_id: Uuid, email: &str) -> String {
    format!("{account_id}:{email}")
}

fn new_mac(key: &[u8]) -> HmacSha256 {
    HmacSha256::new_from_slice(key).expect("HMAC can take key of any size")
}

fn compute_hmac(key: &[u8], message: &[u8]) -> Vec<u8> {
    let mut mac = new_mac(key);
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}
