/// Principal extraction from bearer tokens
///
/// Accounts live in an external identity service. It signs short-lived
/// HS256 tokens with the shared secret; this module only verifies them
/// and turns the claims into a [`Principal`].
use crate::{api::middleware::extract_bearer_token, context::AppContext, error::MarketError};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};

/// Capability carried by a principal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Pro,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Pro => "pro",
        }
    }
}

/// The authenticated actor making a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub role: Role,
}

#[cfg(test)]
impl Principal {
    pub fn client(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Client,
        }
    }

    pub fn pro(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Pro,
        }
    }
}

/// Claims issued by the identity service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrincipalClaims {
    pub sub: String,
    pub role: Role,
    pub exp: usize,
}

/// Authenticated context - rejects requests without a valid principal
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub principal: Principal,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = MarketError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| MarketError::Unauthorized("Missing authorization header".to_string()))?;

        let principal = verify_principal_token(&token, &state.config.authentication.jwt_secret)?;

        Ok(AuthContext { principal })
    }
}

/// Optional authenticated context - anonymous readers get `None`
#[derive(Debug, Clone)]
pub struct OptionalAuthContext {
    pub principal: Option<Principal>,
}

#[async_trait]
impl FromRequestParts<AppContext> for OptionalAuthContext {
    type Rejection = MarketError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let principal = extract_bearer_token(&parts.headers).and_then(|token| {
            verify_principal_token(&token, &state.config.authentication.jwt_secret).ok()
        });

        Ok(OptionalAuthContext { principal })
    }
}

/// Verify a principal token and extract its claims
pub fn verify_principal_token(token: &str, jwt_secret: &str) -> Result<Principal, MarketError> {
    use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

    let decoding_key = DecodingKey::from_secret(jwt_secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    // Allow some clock skew (5 minutes)
    validation.leeway = 300;

    let data = decode::<PrincipalClaims>(token, &decoding_key, &validation).map_err(|e| {
        tracing::debug!("Principal token rejected: {}", e);
        match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                MarketError::Unauthorized("Token has expired".to_string())
            }
            jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                MarketError::Unauthorized("Invalid token signature".to_string())
            }
            _ => MarketError::Unauthorized(format!("Invalid token: {}", e)),
        }
    })?;

    if data.claims.sub.trim().is_empty() {
        return Err(MarketError::Unauthorized("Token has an empty subject".to_string()));
    }

    Ok(Principal {
        id: data.claims.sub,
        role: data.claims.role,
    })
}

/// Mint a token the way the identity service does
#[cfg(test)]
pub(crate) fn issue_test_token(principal: &Principal, jwt_secret: &str) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let claims = PrincipalClaims {
        sub: principal.id.clone(),
        role: principal.role,
        exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-that-is-at-least-32-characters";

    #[test]
    fn test_round_trip_claims() {
        let token = issue_test_token(&Principal::pro("pro-1"), SECRET);
        let principal = verify_principal_token(&token, SECRET).unwrap();
        assert_eq!(principal, Principal::pro("pro-1"));
    }

    #[test]
    fn test_wrong_secret_is_unauthorized() {
        let token = issue_test_token(&Principal::client("client-1"), SECRET);
        let err = verify_principal_token(&token, "another-secret-that-is-32-characters-long").unwrap_err();
        assert!(matches!(err, MarketError::Unauthorized(_)));
    }

    #[test]
    fn test_garbage_token_is_unauthorized() {
        assert!(matches!(
            verify_principal_token("not-a-jwt", SECRET),
            Err(MarketError::Unauthorized(_))
        ));
    }
}
