//! Identity verification port and token gating.

use futures::future::BoxFuture;
use tracing::warn;

use crate::{error::ServiceError, state::SharedState};

/// A verified (or claimed, when authentication is disabled) caller identity.
#[derive(Debug, Clone)]
pub struct Identity {
    /// Stable user identifier.
    pub user_id: String,
    /// Name shown to other players.
    pub display_name: String,
}

/// Capability consumed from the external auth service:
/// `verify(token) -> identity`.
pub trait IdentityVerifier: Send + Sync {
    /// Verify a token and return the identity it belongs to.
    fn verify(&self, token: String) -> BoxFuture<'static, Result<VerifiedIdentity, ServiceError>>;
}

/// Identity material produced by the verifier.
#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    /// Stable user identifier asserted by the token.
    pub user_id: String,
    /// Display name claim, when the token carries one.
    pub display_name: Option<String>,
}

/// Resolve the caller identity from an optional token plus client-claimed
/// fields.
///
/// With `require_authentication` enabled a missing or invalid token is
/// rejected and the verified user id always wins over the claimed one; the
/// claimed display name is kept as a fallback when the token has no name
/// claim. Without it the claimed identity is accepted as-is.
pub async fn resolve_identity(
    state: &SharedState,
    token: Option<String>,
    claimed_user_id: &str,
    claimed_display_name: &str,
) -> Result<Identity, ServiceError> {
    if !state.config().require_authentication {
        if claimed_user_id.trim().is_empty() {
            return Err(ServiceError::InvalidInput("user_id must not be blank".into()));
        }
        return Ok(Identity {
            user_id: claimed_user_id.trim().to_string(),
            display_name: claimed_display_name.trim().to_string(),
        });
    }

    let Some(token) = token.filter(|t| !t.is_empty()) else {
        return Err(ServiceError::Unauthorized("identity token required".into()));
    };

    let Some(verifier) = state.verifier().await else {
        warn!("authentication required but no identity verifier installed");
        return Err(ServiceError::Unauthorized(
            "identity verification unavailable".into(),
        ));
    };

    let verified = verifier.verify(token).await?;
    Ok(Identity {
        user_id: verified.user_id,
        display_name: verified
            .display_name
            .unwrap_or_else(|| claimed_display_name.trim().to_string()),
    })
}

/// Extract a bearer token from an Authorization header value.
pub fn bearer_token(header: Option<&str>) -> Option<String> {
    header
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::state::AppState;

    struct StaticVerifier;

    impl IdentityVerifier for StaticVerifier {
        fn verify(
            &self,
            token: String,
        ) -> BoxFuture<'static, Result<VerifiedIdentity, ServiceError>> {
            Box::pin(async move {
                if token == "good-token" {
                    Ok(VerifiedIdentity {
                        user_id: "verified-alice".into(),
                        display_name: None,
                    })
                } else {
                    Err(ServiceError::Unauthorized("invalid token".into()))
                }
            })
        }
    }

    #[tokio::test]
    async fn claimed_identity_accepted_when_auth_disabled() {
        let state = AppState::new(AppConfig::default());
        let identity = resolve_identity(&state, None, " alice ", "Alice")
            .await
            .unwrap();
        assert_eq!(identity.user_id, "alice");
        assert_eq!(identity.display_name, "Alice");
    }

    #[tokio::test]
    async fn token_required_when_auth_enabled() {
        let config = AppConfig {
            require_authentication: true,
            ..AppConfig::default()
        };
        let state = AppState::new(config);
        state.install_verifier(std::sync::Arc::new(StaticVerifier)).await;

        let err = resolve_identity(&state, None, "alice", "Alice")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));

        let identity = resolve_identity(&state, Some("good-token".into()), "alice", "Alice")
            .await
            .unwrap();
        assert_eq!(identity.user_id, "verified-alice");
        assert_eq!(identity.display_name, "Alice");
    }

    #[test]
    fn bearer_token_extraction() {
        assert_eq!(
            bearer_token(Some("Bearer abc123")).as_deref(),
            Some("abc123")
        );
        assert_eq!(bearer_token(Some("Basic abc123")), None);
        assert_eq!(bearer_token(Some("Bearer ")), None);
        assert_eq!(bearer_token(None), None);
    }
}
