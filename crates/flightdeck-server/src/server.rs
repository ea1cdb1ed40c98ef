//! Server assembly and lifecycle.
//!
//! `ServerBuilder` wires repositories, cache, auth, broker and hub into an
//! `AppState`; `FlightdeckServer::run` drives the full lifecycle: seed,
//! broker connect and provisioning, consumer subscription, scheduler
//! loops, HTTP serve, graceful shutdown.

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::extract::FromRef;
use axum::http::{HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use flightdeck_auth::{AuthState, IdentityCache, JwtService};
use flightdeck_storage::{
    FlightRepository, InMemoryFlightRepository, InMemoryUserRepository, UserRepository,
};

use crate::broker::{BrokerClient, EventPublisher, NoopPublisher};
use crate::cache::CacheBackend;
use crate::config::AppConfig;
use crate::gateway::FanoutHub;
use crate::scheduler::{FlightScheduler, LoopHandle};
use crate::{bootstrap, create_cache_backend, routes};

/// Shared application state. Everything a handler touches hangs off this.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub flights: Arc<dyn FlightRepository>,
    pub users: Arc<dyn UserRepository>,
    pub cache: CacheBackend,
    pub auth: AuthState,
    pub hub: Arc<FanoutHub>,
    pub broker: Option<Arc<BrokerClient>>,
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> AuthState {
        state.auth.clone()
    }
}

/// Builds an `AppState` from configuration, with injectable repositories.
pub struct ServerBuilder {
    config: AppConfig,
    flights: Option<Arc<dyn FlightRepository>>,
    users: Option<Arc<dyn UserRepository>>,
}

impl ServerBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            flights: None,
            users: None,
        }
    }

    pub fn with_flight_repository(mut self, flights: Arc<dyn FlightRepository>) -> Self {
        self.flights = Some(flights);
        self
    }

    pub fn with_user_repository(mut self, users: Arc<dyn UserRepository>) -> Self {
        self.users = Some(users);
        self
    }

    /// Assemble the state. No connections are opened here except the Redis
    /// cache pool; the broker connects in `run`.
    pub fn build_state(self) -> AppState {
        let config = Arc::new(self.config);

        let flights = self
            .flights
            .unwrap_or_else(|| Arc::new(InMemoryFlightRepository::new()));
        let users = self
            .users
            .unwrap_or_else(|| Arc::new(InMemoryUserRepository::new()));

        let cache = create_cache_backend(&config.redis);

        let jwt_service = Arc::new(JwtService::new(
            &config.auth.secret,
            config.auth.token_expiry_secs,
        ));
        let identity_cache: Arc<dyn IdentityCache> = Arc::new(cache.clone());
        let auth = AuthState::new(jwt_service, identity_cache, Arc::clone(&users));

        let broker = if config.broker.enabled {
            match broker_pool(&config.broker.url) {
                Ok(pool) => Some(Arc::new(BrokerClient::new(
                    pool,
                    config.broker.url.clone(),
                    config.broker.topic.clone(),
                    config.broker.connect_attempts,
                ))),
                Err(e) => {
                    // Startup fails later in run(); keep the state buildable
                    // for tests that never start the pipeline.
                    tracing::error!(error = %e, "Broker pool creation failed");
                    None
                }
            }
        } else {
            None
        };

        AppState {
            config,
            flights,
            users,
            cache,
            auth,
            hub: Arc::new(FanoutHub::new()),
            broker,
        }
    }

    pub fn build(self) -> FlightdeckServer {
        FlightdeckServer {
            state: self.build_state(),
        }
    }
}

fn broker_pool(url: &str) -> anyhow::Result<deadpool_redis::Pool> {
    deadpool_redis::Config::from_url(url)
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .context("creating broker connection pool")
}

/// Build the HTTP application: routes plus trace and CORS layers.
pub fn build_app(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);

    routes::router()
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::PATCH])
            .allow_headers(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers(Any)
}

/// The assembled server, ready to run.
pub struct FlightdeckServer {
    pub state: AppState,
}

impl FlightdeckServer {
    /// Run the full pipeline until a shutdown signal arrives.
    ///
    /// With the broker enabled, failure to connect or provision the topic
    /// is fatal: a server that cannot deliver events should not come up
    /// half-alive. With the broker disabled the pipeline degrades to
    /// committed-but-unannounced mutations.
    pub async fn run(self) -> anyhow::Result<()> {
        let state = self.state;
        let config = Arc::clone(&state.config);

        if config.bootstrap.seed_users {
            bootstrap::seed_users(
                &state.users,
                &state.auth.identity_cache,
                config.auth.cache_ttl_secs,
            )
            .await
            .context("seeding users")?;
        }

        let mut consumer_task = None;
        if let Some(broker) = &state.broker {
            broker.connect().await.context("connecting to broker")?;
            broker
                .ensure_topic(
                    &config.broker.group,
                    config.broker.partitions,
                    config.broker.replication,
                )
                .await
                .context("provisioning broker topic")?;

            let hub = Arc::clone(&state.hub);
            let consumer = format!("fanout-{}", Uuid::new_v4());
            consumer_task = Some(broker.subscribe(
                &config.broker.group,
                &consumer,
                move |event| {
                    let hub = Arc::clone(&hub);
                    async move {
                        hub.broadcast(&event);
                        Ok(())
                    }
                },
            ));
        } else if config.broker.enabled {
            anyhow::bail!("broker enabled but client could not be created");
        } else {
            tracing::warn!("Broker disabled, WebSocket clients will receive no events");
        }

        let mut loop_handles: Vec<LoopHandle> = Vec::new();
        if config.scheduler.enabled {
            let publisher: Arc<dyn EventPublisher> = match &state.broker {
                Some(broker) => Arc::clone(broker) as Arc<dyn EventPublisher>,
                None => Arc::new(NoopPublisher),
            };
            let scheduler = Arc::new(FlightScheduler::new(Arc::clone(&state.flights), publisher));
            loop_handles.push(scheduler.spawn_creation_loop(config.scheduler.creation_interval_secs));
            loop_handles.push(scheduler.spawn_update_loop(config.scheduler.update_interval_secs));
            tracing::info!(
                creation_interval_secs = config.scheduler.creation_interval_secs,
                update_interval_secs = config.scheduler.update_interval_secs,
                "Scheduler started"
            );
        }

        let addr = config.addr();
        let broker_client = state.broker.clone();
        let app = build_app(state);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding {addr}"))?;
        tracing::info!(addr = %addr, "Server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("serving HTTP")?;

        tracing::info!("Shutting down");
        for handle in loop_handles {
            handle.stop().await;
        }
        if let Some(broker) = broker_client {
            broker.disconnect();
        }
        if let Some(task) = consumer_task {
            task.abort();
        }

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_state_defaults() {
        let state = ServerBuilder::new(AppConfig::default()).build_state();
        assert!(state.broker.is_none());
        assert_eq!(state.cache.mode(), "local");
        assert_eq!(state.hub.client_count(), 0);
    }

    #[tokio::test]
    async fn test_builder_accepts_injected_repositories() {
        let flights: Arc<dyn FlightRepository> = Arc::new(InMemoryFlightRepository::new());
        let state = ServerBuilder::new(AppConfig::default())
            .with_flight_repository(Arc::clone(&flights))
            .build_state();

        let flight = flightdeck_core::Flight::new(
            "AA100",
            "New York",
            time::OffsetDateTime::now_utc(),
        );
        state.flights.insert(flight).await.unwrap();
        assert_eq!(flights.find_all().await.unwrap().len(), 1);
    }
}
