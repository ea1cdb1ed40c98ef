//! The user identity record.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// A user account.
///
/// `password_hash` is an argon2 PHC string; it never leaves the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub permissions: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl User {
    pub fn new(
        username: impl Into<String>,
        password_hash: impl Into<String>,
        role: impl Into<String>,
        permissions: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            password_hash: password_hash.into(),
            role: role.into(),
            permissions,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Pure set-membership test, no I/O.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_membership() {
        let user = User::new(
            "admin",
            "$argon2id$fake",
            "admin",
            vec!["view_flights".into(), "update_flights".into()],
        );
        assert!(user.has_permission("view_flights"));
        assert!(user.has_permission("update_flights"));
        assert!(!user.has_permission("delete_flights"));
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User::new("user", "$argon2id$fake", "user", vec![]);
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["username"], "user");
    }
}
