//! Startup seeding: default accounts and identity cache priming.

use anyhow::Context;
use argon2::password_hash::{PasswordHasher, SaltString, rand_core::OsRng};
use argon2::Argon2;
use std::sync::Arc;

use flightdeck_auth::{CachedIdentity, IdentityCache, id_key, username_key};
use flightdeck_core::User;
use flightdeck_storage::UserRepository;

/// Hash a password with Argon2id and a fresh random salt.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))?;
    Ok(hash.to_string())
}

/// Seed the default accounts if the user store is empty, and prime the
/// identity cache for them either way.
///
/// Cache priming is the only population path for the identity cache:
/// entries that lapse are not rewritten on miss, so the TTL here bounds
/// how long the fast path lasts between restarts.
pub async fn seed_users(
    users: &Arc<dyn UserRepository>,
    cache: &Arc<dyn IdentityCache>,
    cache_ttl_secs: u64,
) -> anyhow::Result<()> {
    if users.count().await.context("counting users")? == 0 {
        let defaults = [
            (
                "admin",
                "admin123",
                "admin",
                vec!["view_flights".to_string(), "update_flights".to_string()],
            ),
            (
                "user",
                "user123",
                "user",
                vec!["view_flights".to_string()],
            ),
        ];

        for (username, password, role, permissions) in defaults {
            let user = User::new(username, hash_password(password)?, role, permissions);
            users
                .insert(user)
                .await
                .with_context(|| format!("seeding user {username}"))?;
            tracing::info!(username = username, role = role, "Seeded default user");
        }
    } else {
        tracing::debug!("User store already populated, skipping seed");
    }

    prime_identity_cache(users, cache, cache_ttl_secs).await
}

/// Write a `CachedIdentity` entry for every known default account, keyed
/// by username and by id.
async fn prime_identity_cache(
    users: &Arc<dyn UserRepository>,
    cache: &Arc<dyn IdentityCache>,
    cache_ttl_secs: u64,
) -> anyhow::Result<()> {
    for username in ["admin", "user"] {
        let Some(user) = users
            .find_by_username(username)
            .await
            .context("loading seeded user")?
        else {
            continue;
        };

        let identity = CachedIdentity::from(&user);
        let payload = serde_json::to_string(&identity).context("encoding cached identity")?;

        cache
            .set(&username_key(&user.username), &payload, cache_ttl_secs)
            .await;
        cache
            .set(&id_key(user.id), &payload, cache_ttl_secs)
            .await;
        tracing::debug!(username = %user.username, "Primed identity cache");
    }
    Ok(())
}
