//! [`Authenticator`] backed by HMAC credentials.

use async_trait::async_trait;
use tracing::debug;

use super::{TokenConfig, validate_token};
use crate::identity::{Account, Authenticator};

/// Verifies credentials signed with the shared secret.
#[derive(Debug, Clone)]
pub struct TokenAuthenticator {
    config: TokenConfig,
}

impl TokenAuthenticator {
    pub fn new(config: TokenConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Authenticator for TokenAuthenticator {
    async fn authenticate(&self, credential: &str) -> anyhow::Result<Option<Account>> {
        match validate_token(&self.config, credential.trim()) {
            Ok(claims) => Ok(Some(Account {
                id: claims.account_id,
                email: claims.email,
            })),
            Err(e) => {
                debug!(error = %e, "rejected credential");
                Ok(None)
            }
        }
    }
}
