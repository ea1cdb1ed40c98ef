//! Authentication and authorization for Flightdeck.
//!
//! Resolves `Authorization: Bearer <jwt>` credentials to an identity with
//! minimum repository load: a valid token is first looked up in the
//! identity cache and only falls back to the user repository on a miss.
//! Permission checks are pure set-membership tests on the resolved
//! identity.

pub mod cache;
pub mod error;
pub mod middleware;
pub mod token;

pub use cache::{CachedIdentity, IdentityCache, id_key, username_key};
pub use error::AuthError;
pub use middleware::{AuthState, AuthenticatedUser, BearerAuth};
pub use token::{AccessClaims, JwtService};
