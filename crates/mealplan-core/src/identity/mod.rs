//! Identity resolution: maps a request to the normalized email key that
//! owns meal plans.
//!
//! Guests identify themselves with an `email` field; authenticated callers
//! present a credential that an [`Authenticator`] turns into an account.
//! Both channels end in the same key space, so a guest and an account with
//! the same email are the same identity.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use mealplan_db::models::IdentityKind;
use tracing::debug;
use uuid::Uuid;

use crate::error::MealPlanError;

/// The resolved owner of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Lower-cased, trimmed email.
    pub key: String,
    pub kind: IdentityKind,
}

impl Identity {
    /// A guest identity from a raw email.
    pub fn guest(email: &str) -> Result<Self, MealPlanError> {
        let key = normalize_email(email).ok_or_else(|| {
            MealPlanError::MissingIdentity(format!("{email:?} is not a usable email"))
        })?;
        Ok(Self {
            key,
            kind: IdentityKind::Guest,
        })
    }

    /// Same owner, regardless of the channel each was resolved through.
    pub fn same_owner(&self, other: &Identity) -> bool {
        self.key == other.key
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.key, self.kind)
    }
}

/// The identity-bearing parts of an incoming request.
#[derive(Debug, Clone, Default)]
pub struct IdentityRequest {
    /// Bearer credential, when the caller is signed in.
    pub credential: Option<String>,
    /// Guest email from the request payload.
    pub email: Option<String>,
}

impl IdentityRequest {
    pub fn guest(email: impl Into<String>) -> Self {
        Self {
            credential: None,
            email: Some(email.into()),
        }
    }

    pub fn authenticated(credential: impl Into<String>) -> Self {
        Self {
            credential: Some(credential.into()),
            email: None,
        }
    }
}

/// An account as reported by the authentication provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: Uuid,
    pub email: Option<String>,
}

/// Verifies bearer credentials.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Returns the account for a valid credential, `None` for one that does
    /// not verify. `Err` is reserved for provider failures.
    async fn authenticate(&self, credential: &str) -> anyhow::Result<Option<Account>>;
}

/// Lower-case and trim an email. `None` if the result is empty or has no `@`.
pub fn normalize_email(raw: &str) -> Option<String> {
    let normalized = raw.trim().to_lowercase();
    let (local, domain) = normalized.split_once('@')?;
    if local.is_empty() || domain.is_empty() {
        return None;
    }
    Some(normalized)
}

/// Resolves requests to identities. Never creates account or guest records.
#[derive(Clone, Default)]
pub struct IdentityResolver {
    authenticator: Option<Arc<dyn Authenticator>>,
}

impl IdentityResolver {
    /// A resolver that only accepts guest requests.
    pub fn guests_only() -> Self {
        Self::default()
    }

    pub fn new(authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            authenticator: Some(authenticator),
        }
    }

    pub async fn resolve(&self, request: &IdentityRequest) -> Result<Identity, MealPlanError> {
        if let Some(credential) = &request.credential {
            return self.resolve_credential(credential).await;
        }

        let email = request
            .email
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| MealPlanError::MissingIdentity("request carries no email".into()))?;
        Identity::guest(email)
    }

    async fn resolve_credential(&self, credential: &str) -> Result<Identity, MealPlanError> {
        let authenticator = self.authenticator.as_ref().ok_or_else(|| {
            MealPlanError::MissingIdentity(
                "credential presented but authentication is disabled".into(),
            )
        })?;

        let Some(account) = authenticator.authenticate(credential).await? else {
            debug!("credential failed verification");
            return Err(MealPlanError::MissingIdentity(
                "credential could not be verified".into(),
            ));
        };

        let key = account
            .email
            .as_deref()
            .and_then(normalize_email)
            .ok_or_else(|| {
                MealPlanError::MissingIdentity(format!(
                    "account {} has no email on file",
                    account.id
                ))
            })?;

        Ok(Identity {
            key,
            kind: IdentityKind::Authenticated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedAuthenticator(Option<Account>);

    #[async_trait]
    impl Authenticator for FixedAuthenticator {
        async fn authenticate(&self, _credential: &str) -> anyhow::Result<Option<Account>> {
            Ok(self.0.clone())
        }
    }

    fn resolver_with(account: Option<Account>) -> IdentityResolver {
        IdentityResolver::new(Arc::new(FixedAuthenticator(account)))
    }

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email("  A@X.Com "), Some("a@x.com".to_string()));
        assert_eq!(normalize_email("no-at-sign"), None);
        assert_eq!(normalize_email("@x.com"), None);
        assert_eq!(normalize_email("a@"), None);
        assert_eq!(normalize_email("   "), None);
    }

    #[tokio::test]
    async fn guest_resolves_from_email() {
        let identity = IdentityResolver::guests_only()
            .resolve(&IdentityRequest::guest(" Ada@Example.com"))
            .await
            .unwrap();
        assert_eq!(identity.key, "ada@example.com");
        assert_eq!(identity.kind, IdentityKind::Guest);
    }

    #[tokio::test]
    async fn guest_without_email_is_missing_identity() {
        let resolver = IdentityResolver::guests_only();
        for request in [
            IdentityRequest::default(),
            IdentityRequest::guest("   "),
            IdentityRequest::guest("not-an-email"),
        ] {
            let err = resolver.resolve(&request).await.unwrap_err();
            assert!(matches!(err, MealPlanError::MissingIdentity(_)), "{err:?}");
        }
    }

    #[tokio::test]
    async fn authenticated_uses_account_email() {
        let resolver = resolver_with(Some(Account {
            id: Uuid::new_v4(),
            email: Some("Ada@Example.com".into()),
        }));
        let request = IdentityRequest {
            credential: Some("token".into()),
            email: Some("someone-else@example.com".into()),
        };
        let identity = resolver.resolve(&request).await.unwrap();
        assert_eq!(identity.key, "ada@example.com");
        assert_eq!(identity.kind, IdentityKind::Authenticated);
    }

    #[tokio::test]
    async fn account_without_email_is_missing_identity() {
        let resolver = resolver_with(Some(Account {
            id: Uuid::new_v4(),
            email: None,
        }));
        let err = resolver
            .resolve(&IdentityRequest::authenticated("token"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no email on file"), "{err}");
    }

    #[tokio::test]
    async fn unverified_credential_does_not_fall_back_to_guest() {
        let resolver = resolver_with(None);
        let request = IdentityRequest {
            credential: Some("forged".into()),
            email: Some("a@x.com".into()),
        };
        let err = resolver.resolve(&request).await.unwrap_err();
        assert!(matches!(err, MealPlanError::MissingIdentity(_)));
    }

    #[tokio::test]
    async fn guest_and_account_with_same_email_are_same_owner() {
        let guest = Identity::guest("a@x.com").unwrap();
        let account = resolver_with(Some(Account {
            id: Uuid::new_v4(),
            email: Some("A@X.COM".into()),
        }))
        .resolve(&IdentityRequest::authenticated("token"))
        .await
        .unwrap();
        assert!(guest.same_owner(&account));
        assert_ne!(guest, account);
    }
}
