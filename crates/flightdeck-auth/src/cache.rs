//! Lookaside identity cache contract.
//!
//! The cache stores a read-mostly projection of a user record under two
//! keys (`user:<username>` and `user:id:<id>`) with a bounded TTL. The
//! caller owns fallback behavior; the cache itself is only get/set.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use flightdeck_core::User;

/// Cache key for lookup by username.
pub fn username_key(username: &str) -> String {
    format!("user:{username}")
}

/// Cache key for lookup by durable id.
pub fn id_key(id: Uuid) -> String {
    format!("user:id:{id}")
}

/// Read-mostly projection of a user record.
///
/// An entry, if present, is value-equal to the repository row at the time
/// of caching; staleness within the TTL is tolerated by design.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedIdentity {
    pub id: Uuid,
    pub username: String,
    pub role: String,
    pub permissions: Vec<String>,
}

impl CachedIdentity {
    /// Pure set-membership test, no I/O.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

impl From<&User> for CachedIdentity {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            role: user.role.clone(),
            permissions: user.permissions.clone(),
        }
    }
}

/// String key-value cache with TTL, consumed cache-aside.
///
/// Implementations must swallow backend failures: a failed `get` reads as
/// a miss, a failed `set` is logged and dropped. The authorization path
/// must keep working with the cache unavailable.
#[async_trait]
pub trait IdentityCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;

    async fn set(&self, key: &str, value: &str, ttl_secs: u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_namespacing() {
        let id = Uuid::new_v4();
        assert_eq!(username_key("admin"), "user:admin");
        assert_eq!(id_key(id), format!("user:id:{id}"));
    }

    #[test]
    fn test_projection_from_user() {
        let user = User::new("admin", "hash", "admin", vec!["view_flights".into()]);
        let identity = CachedIdentity::from(&user);

        assert_eq!(identity.id, user.id);
        assert_eq!(identity.username, "admin");
        assert!(identity.has_permission("view_flights"));
        assert!(!identity.has_permission("update_flights"));
    }

    #[test]
    fn test_projection_roundtrip() {
        let user = User::new("user", "hash", "user", vec!["view_flights".into()]);
        let identity = CachedIdentity::from(&user);

        let json = serde_json::to_string(&identity).unwrap();
        let decoded: CachedIdentity = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, identity);
    }
}
