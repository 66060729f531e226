//! Bearer token authentication

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use mapster_core::UserId;

use crate::error::ApiError;
use crate::AppState;

/// Resolves a bearer token to a user.
pub trait IdentityProvider: Send + Sync {
    fn authenticate(&self, token: &str) -> Option<UserId>;
}

/// Fixed token table, usually from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticTokens {
    tokens: BTreeMap<String, UserId>,
}

impl StaticTokens {
    pub fn new(tokens: BTreeMap<String, UserId>) -> Self {
        Self { tokens }
    }

    pub fn with_token(mut self, token: impl Into<String>, user_id: UserId) -> Self {
        self.tokens.insert(token.into(), user_id);
        self
    }
}

impl IdentityProvider for StaticTokens {
    fn authenticate(&self, token: &str) -> Option<UserId> {
        self.tokens.get(token).copied()
    }
}

/// The authenticated requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub UserId);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ApiError::Unauthorized)?;

        match state.identity.authenticate(token) {
            Some(user_id) => Ok(AuthUser(user_id)),
            None => {
                tracing::debug!("Rejected unknown bearer token");
                Err(ApiError::Unauthorized)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_tokens() {
        let tokens = StaticTokens::default()
            .with_token("alice", UserId(1))
            .with_token("bob", UserId(2));
        assert_eq!(tokens.authenticate("bob"), Some(UserId(2)));
        assert_eq!(tokens.authenticate("Bob"), None);
        assert_eq!(tokens.authenticate(""), None);
    }
}
