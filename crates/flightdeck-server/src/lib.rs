//! Flightdeck server crate.
//!
//! Wires the pipeline together: the scheduler mutates flight records and
//! publishes change events through the broker client; a consumer-group
//! subscription feeds the fan-out hub, which pushes every event to all
//! connected WebSocket clients. The HTTP surface sits beside the pipeline
//! and authorizes requests through the cache-aware Bearer extractor.

pub mod bootstrap;
pub mod broker;
pub mod cache;
pub mod config;
pub mod gateway;
pub mod observability;
pub mod routes;
pub mod scheduler;
pub mod server;

pub use broker::{BrokerClient, BrokerError, EventPublisher, NoopPublisher};
pub use cache::CacheBackend;
pub use config::{AppConfig, load_config};
pub use gateway::FanoutHub;
pub use observability::{apply_logging_level, init_tracing};
pub use scheduler::{FlightScheduler, LoopHandle};
pub use server::{AppState, FlightdeckServer, ServerBuilder, build_app};

/// Create a cache backend based on configuration.
///
/// With Redis disabled this returns a local-only cache. With Redis enabled
/// the pool is created eagerly; connection failures degrade to local-only
/// mode rather than failing startup.
pub fn create_cache_backend(config: &config::RedisConfig) -> CacheBackend {
    use std::time::Duration;

    if !config.enabled {
        tracing::info!("Redis disabled, using local cache only");
        return CacheBackend::new_local();
    }

    tracing::info!(url = %config.url, "Connecting to Redis");

    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    let pool_config = redis_config.pool.get_or_insert_with(Default::default);
    pool_config.max_size = config.pool_size;
    pool_config.timeouts.wait = Some(Duration::from_millis(config.timeout_ms));
    pool_config.timeouts.create = Some(Duration::from_millis(config.timeout_ms));
    pool_config.timeouts.recycle = Some(Duration::from_millis(config.timeout_ms));

    match redis_config.create_pool(Some(deadpool_redis::Runtime::Tokio1)) {
        Ok(pool) => CacheBackend::new_redis(pool),
        Err(e) => {
            tracing::warn!(error = %e, "Redis pool creation failed, falling back to local cache");
            CacheBackend::new_local()
        }
    }
}
