//! Bearer token extractor and permission checks.
//!
//! The request flow is a short-circuit chain: token present? token valid?
//! cache hit? repository fallback on miss. Any negative branch rejects
//! before the next step runs; a cache hit never touches the repository.
//!
//! # Example
//!
//! ```ignore
//! async fn list_flights(BearerAuth(user): BearerAuth) -> Result<Json<Vec<Flight>>, AuthError> {
//!     user.require_permission("view_flights")?;
//!     // ...
//! }
//! ```

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};

use flightdeck_storage::UserRepository;

use crate::cache::{CachedIdentity, IdentityCache, id_key, username_key};
use crate::error::AuthError;
use crate::token::{AccessClaims, JwtService};

/// State required for bearer token authentication.
///
/// Include in the application state and expose to the `BearerAuth`
/// extractor via `FromRef`.
#[derive(Clone)]
pub struct AuthState {
    pub jwt_service: Arc<JwtService>,
    pub identity_cache: Arc<dyn IdentityCache>,
    pub user_repository: Arc<dyn UserRepository>,
}

impl AuthState {
    pub fn new(
        jwt_service: Arc<JwtService>,
        identity_cache: Arc<dyn IdentityCache>,
        user_repository: Arc<dyn UserRepository>,
    ) -> Self {
        Self {
            jwt_service,
            identity_cache,
            user_repository,
        }
    }
}

/// The identity resolved for an authenticated request.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub identity: CachedIdentity,
}

impl AuthenticatedUser {
    /// Reject unless the identity holds the required permission.
    /// Pure set-membership, no I/O.
    pub fn require_permission(&self, permission: &str) -> Result<(), AuthError> {
        if self.identity.has_permission(permission) {
            Ok(())
        } else {
            tracing::debug!(
                username = %self.identity.username,
                permission = permission,
                "Permission denied"
            );
            Err(AuthError::permission_denied(permission))
        }
    }
}

/// Resolve validated claims to an identity, cache first.
///
/// Entries are probed under both seeded key shapes, username then id. On
/// a miss the repository is consulted; the result is not written back to
/// the cache — seeding is the only population path, so a lapsed entry
/// sends every request to the repository until reseeded.
pub async fn resolve_identity(
    state: &AuthState,
    claims: &AccessClaims,
) -> Result<AuthenticatedUser, AuthError> {
    for key in [username_key(&claims.username), id_key(claims.sub)] {
        let Some(cached) = state.identity_cache.get(&key).await else {
            continue;
        };
        match serde_json::from_str::<CachedIdentity>(&cached) {
            Ok(identity) => {
                tracing::debug!(username = %claims.username, key = %key, "Identity cache hit");
                return Ok(AuthenticatedUser { identity });
            }
            Err(e) => {
                // Corrupt entry reads as a miss; the repository is authoritative.
                tracing::warn!(username = %claims.username, error = %e, "Dropping malformed cache entry");
            }
        }
    }

    tracing::debug!(username = %claims.username, "Identity cache miss");

    let user = state
        .user_repository
        .find_by_id(claims.sub)
        .await?
        .ok_or(AuthError::UnknownIdentity)?;

    Ok(AuthenticatedUser {
        identity: CachedIdentity::from(&user),
    })
}

/// Axum extractor that validates a Bearer token and resolves the identity.
pub struct BearerAuth(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for BearerAuth
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_state = AuthState::from_ref(state);

        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::unauthorized("No authorization token found"))?;

        // Validation happens before any cache or repository access.
        let claims = auth_state.jwt_service.decode(token)?;

        let user = resolve_identity(&auth_state, &claims).await?;

        tracing::debug!(
            username = %user.identity.username,
            role = %user.identity.role,
            "Token validated"
        );

        Ok(BearerAuth(user))
    }
}
