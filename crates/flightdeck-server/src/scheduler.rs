//! Mutation scheduler: the write side of the pipeline.
//!
//! Two independent periodic loops mutate the flight store and publish a
//! change event per committed mutation. The commit happens first; an event
//! is only emitted for state that is durably in the repository. A publish
//! failure after a commit is logged and swallowed, so a broker outage
//! degrades to events-lost rather than stopping the mutation flow.

use std::sync::Arc;

use rand::Rng;
use rand::seq::SliceRandom;
use time::{Duration, OffsetDateTime};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use flightdeck_core::{Flight, FlightEvent, FlightStatus};
use flightdeck_storage::FlightRepository;

use crate::broker::EventPublisher;

const AIRLINES: [&str; 8] = ["AA", "BA", "DL", "UA", "LH", "AF", "EK", "QF"];

const DESTINATIONS: [&str; 10] = [
    "New York",
    "London",
    "Paris",
    "Tokyo",
    "Dubai",
    "Singapore",
    "Frankfurt",
    "Sydney",
    "Toronto",
    "Amsterdam",
];

/// Handle to a running scheduler loop.
///
/// `stop` signals shutdown and waits for the loop task to finish; a tick
/// already in flight completes before the task exits.
pub struct LoopHandle {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl LoopHandle {
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

/// Drives flight creation and status-update ticks.
///
/// The scheduler owns no connections and no global state; everything it
/// touches arrives through the constructor.
pub struct FlightScheduler {
    flights: Arc<dyn FlightRepository>,
    publisher: Arc<dyn EventPublisher>,
}

impl FlightScheduler {
    pub fn new(flights: Arc<dyn FlightRepository>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { flights, publisher }
    }

    /// One creation tick: insert between one and three new flights and
    /// publish a creation event for each committed insert.
    pub async fn creation_tick(&self) {
        let flights = generate_flights();

        for flight in flights {
            let number = flight.flight_number.clone();
            match self.flights.insert(flight).await {
                Ok(inserted) => {
                    tracing::info!(
                        flight_number = %inserted.flight_number,
                        destination = %inserted.destination,
                        "Created flight"
                    );
                    self.publish(FlightEvent::created(&inserted)).await;
                }
                Err(e) => {
                    // Usually a flight-number collision; the next tick
                    // draws fresh numbers.
                    tracing::warn!(flight_number = %number, error = %e, "Flight insert failed");
                }
            }
        }
    }

    /// One update tick: pick up to three non-terminal flights, apply a
    /// random status transition to each, and publish an update event per
    /// committed transition.
    pub async fn update_tick(&self) {
        let all = match self.flights.find_all().await {
            Ok(all) => all,
            Err(e) => {
                tracing::warn!(error = %e, "Flight listing failed, skipping update tick");
                return;
            }
        };

        let picks = pick_transitions(&all);
        if picks.is_empty() {
            tracing::debug!("No eligible flights to update");
            return;
        }

        for (id, status) in picks {
            match self.flights.update_status(id, status).await {
                Ok(updated) => {
                    tracing::info!(
                        flight_number = %updated.flight_number,
                        status = %updated.status,
                        "Updated flight status"
                    );
                    self.publish(FlightEvent::status_updated(&updated, status))
                        .await;
                }
                Err(e) => {
                    tracing::warn!(flight_id = %id, error = %e, "Status update failed");
                }
            }
        }
    }

    async fn publish(&self, event: FlightEvent) {
        if let Err(e) = self.publisher.publish(&event).await {
            tracing::warn!(
                flight_number = %event.flight_number,
                error = %e,
                "Event publish failed, state committed without event"
            );
        }
    }

    /// Spawn the creation loop with the given period.
    pub fn spawn_creation_loop(self: &Arc<Self>, period_secs: u64) -> LoopHandle {
        self.spawn_loop(period_secs, TickKind::Creation)
    }

    /// Spawn the status-update loop with the given period.
    pub fn spawn_update_loop(self: &Arc<Self>, period_secs: u64) -> LoopHandle {
        self.spawn_loop(period_secs, TickKind::Update)
    }

    fn spawn_loop(self: &Arc<Self>, period_secs: u64, kind: TickKind) -> LoopHandle {
        let scheduler = Arc::clone(self);
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(period_secs.max(1)));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick resolves immediately; consume it so the loop
            // starts one period after spawn.
            interval.tick().await;

            loop {
                // Shutdown is only observed between ticks; a tick in
                // flight always completes.
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = shutdown_rx.changed() => break,
                }

                match kind {
                    TickKind::Creation => scheduler.creation_tick().await,
                    TickKind::Update => scheduler.update_tick().await,
                }
            }
            tracing::info!(loop_kind = kind.as_str(), "Scheduler loop stopped");
        });

        LoopHandle { shutdown, handle }
    }
}

#[derive(Clone, Copy)]
enum TickKind {
    Creation,
    Update,
}

impl TickKind {
    fn as_str(self) -> &'static str {
        match self {
            TickKind::Creation => "creation",
            TickKind::Update => "update",
        }
    }
}

/// Draw one to three fresh flight records.
///
/// All randomness happens here, synchronously, so no RNG is held across an
/// await point.
fn generate_flights() -> Vec<Flight> {
    let mut rng = rand::thread_rng();
    let count = rng.gen_range(1..=3);

    (0..count)
        .map(|_| {
            let airline = AIRLINES[rng.gen_range(0..AIRLINES.len())];
            let number = format!("{}{}", airline, rng.gen_range(100..9999));
            let destination = DESTINATIONS[rng.gen_range(0..DESTINATIONS.len())];
            let departure = OffsetDateTime::now_utc() + Duration::hours(rng.gen_range(1..=12));
            Flight::new(number, destination, departure)
        })
        .collect()
}

/// Pick up to three non-terminal flights and a random target status for
/// each. Terminal (cancelled) flights are never selected.
fn pick_transitions(all: &[Flight]) -> Vec<(Uuid, FlightStatus)> {
    let eligible: Vec<&Flight> = all.iter().filter(|f| !f.status.is_terminal()).collect();
    if eligible.is_empty() {
        return Vec::new();
    }

    let mut rng = rand::thread_rng();
    let count = rng.gen_range(1..=3usize).min(eligible.len());

    eligible
        .choose_multiple(&mut rng, count)
        .map(|flight| {
            let status = FlightStatus::ALL[rng.gen_range(0..FlightStatus::ALL.len())];
            (flight.id, status)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use flightdeck_storage::{InMemoryFlightRepository, StorageError};
    use std::sync::Mutex;

    use crate::broker::BrokerError;
    use flightdeck_core::FlightEventType;

    struct RecordingPublisher {
        events: Mutex<Vec<FlightEvent>>,
    }

    impl RecordingPublisher {
        fn new() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
            }
        }

        fn events(&self) -> Vec<FlightEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventPublisher for RecordingPublisher {
        async fn publish(&self, event: &FlightEvent) -> Result<(), BrokerError> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    /// Repository wrapper whose mutations always fail.
    struct FailingRepo {
        inner: InMemoryFlightRepository,
    }

    #[async_trait]
    impl FlightRepository for FailingRepo {
        async fn find_all(&self) -> Result<Vec<Flight>, StorageError> {
            self.inner.find_all().await
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<Flight>, StorageError> {
            self.inner.find_by_id(id).await
        }

        async fn find_by_number(&self, n: &str) -> Result<Option<Flight>, StorageError> {
            self.inner.find_by_number(n).await
        }

        async fn insert(&self, _flight: Flight) -> Result<Flight, StorageError> {
            Err(StorageError::connectivity("store offline"))
        }

        async fn update_status(
            &self,
            id: Uuid,
            _status: FlightStatus,
        ) -> Result<Flight, StorageError> {
            Err(StorageError::not_found("Flight", id.to_string()))
        }
    }

    #[tokio::test]
    async fn test_creation_tick_inserts_and_publishes() {
        let repo = Arc::new(InMemoryFlightRepository::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let scheduler = FlightScheduler::new(repo.clone(), publisher.clone());

        scheduler.creation_tick().await;

        let stored = repo.find_all().await.unwrap();
        assert!((1..=3).contains(&stored.len()));

        let events = publisher.events();
        assert_eq!(events.len(), stored.len());
        assert!(
            events
                .iter()
                .all(|e| e.event_type == FlightEventType::FlightCreated)
        );
    }

    #[tokio::test]
    async fn test_update_tick_skips_terminal_flights() {
        let repo = Arc::new(InMemoryFlightRepository::new());
        for i in 0..5 {
            let mut flight = Flight::new(format!("AA{i}"), "Tokyo", OffsetDateTime::now_utc());
            flight.set_status(FlightStatus::Cancelled);
            repo.insert(flight).await.unwrap();
        }

        let publisher = Arc::new(RecordingPublisher::new());
        let scheduler = FlightScheduler::new(repo.clone(), publisher.clone());

        scheduler.update_tick().await;

        assert!(publisher.events().is_empty());
        let stored = repo.find_all().await.unwrap();
        assert!(stored.iter().all(|f| f.status == FlightStatus::Cancelled));
    }

    #[tokio::test]
    async fn test_update_tick_publishes_committed_transitions() {
        let repo = Arc::new(InMemoryFlightRepository::new());
        repo.insert(Flight::new("BA2490", "London", OffsetDateTime::now_utc()))
            .await
            .unwrap();

        let publisher = Arc::new(RecordingPublisher::new());
        let scheduler = FlightScheduler::new(repo.clone(), publisher.clone());

        scheduler.update_tick().await;

        let events = publisher.events();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.event_type, FlightEventType::StatusUpdated);
        assert_eq!(event.flight_number, "BA2490");

        // The event reflects the committed record.
        let stored = repo.find_by_number("BA2490").await.unwrap().unwrap();
        assert_eq!(event.new_status, stored.status);
    }

    #[tokio::test]
    async fn test_failed_commit_emits_no_event() {
        let repo = Arc::new(FailingRepo {
            inner: InMemoryFlightRepository::new(),
        });
        let publisher = Arc::new(RecordingPublisher::new());
        let scheduler = FlightScheduler::new(repo, publisher.clone());

        scheduler.creation_tick().await;
        scheduler.update_tick().await;

        assert!(publisher.events().is_empty());
    }

    #[test]
    fn test_pick_transitions_excludes_cancelled() {
        let mut cancelled = Flight::new("QF1", "Sydney", OffsetDateTime::now_utc());
        cancelled.set_status(FlightStatus::Cancelled);
        let active = Flight::new("QF2", "Sydney", OffsetDateTime::now_utc());
        let active_id = active.id;

        for _ in 0..20 {
            let picks = pick_transitions(&[cancelled.clone(), active.clone()]);
            assert!(picks.iter().all(|(id, _)| *id == active_id));
        }
    }

    #[tokio::test]
    async fn test_loop_handle_stops() {
        let repo = Arc::new(InMemoryFlightRepository::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let scheduler = Arc::new(FlightScheduler::new(
            repo as Arc<dyn FlightRepository>,
            publisher,
        ));

        let handle = scheduler.spawn_update_loop(3600);
        handle.stop().await;
    }
}
