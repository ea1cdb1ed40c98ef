//! End-to-end pipeline tests: scheduler ticks commit to the store, the
//! published events flow to the fan-out hub, and registered clients see
//! the same serialized frames in order.

use std::sync::Arc;

use async_trait::async_trait;

use flightdeck_core::{Flight, FlightEvent, FlightEventType, FlightStatus};
use flightdeck_server::{BrokerError, EventPublisher, FanoutHub, FlightScheduler};
use flightdeck_storage::{FlightRepository, InMemoryFlightRepository};
use time::OffsetDateTime;

/// Publisher that delivers straight to the hub, standing in for the
/// broker transport.
struct HubPublisher {
    hub: Arc<FanoutHub>,
}

#[async_trait]
impl EventPublisher for HubPublisher {
    async fn publish(&self, event: &FlightEvent) -> Result<(), BrokerError> {
        self.hub.broadcast(event);
        Ok(())
    }
}

#[tokio::test]
async fn creation_tick_reaches_websocket_clients() {
    let repo = Arc::new(InMemoryFlightRepository::new());
    let hub = Arc::new(FanoutHub::new());
    let (_client, mut frames) = hub.register();

    let scheduler = FlightScheduler::new(
        repo.clone() as Arc<dyn FlightRepository>,
        Arc::new(HubPublisher { hub: hub.clone() }),
    );
    scheduler.creation_tick().await;

    let stored = repo.find_all().await.unwrap();
    assert!(!stored.is_empty());

    // One frame per committed insert, each naming a stored flight.
    for _ in 0..stored.len() {
        let frame = frames.recv().await.expect("frame for committed insert");
        let event: FlightEvent = serde_json::from_str(&frame).unwrap();
        assert_eq!(event.event_type, FlightEventType::FlightCreated);
        assert!(
            stored
                .iter()
                .any(|f| f.id == event.flight_id && f.flight_number == event.flight_number)
        );
    }
    assert!(frames.try_recv().is_err());
}

#[tokio::test]
async fn update_events_reflect_committed_state() {
    let repo = Arc::new(InMemoryFlightRepository::new());
    repo.insert(Flight::new("EK202", "Dubai", OffsetDateTime::now_utc()))
        .await
        .unwrap();

    let hub = Arc::new(FanoutHub::new());
    let (_client, mut frames) = hub.register();

    let scheduler = FlightScheduler::new(
        repo.clone() as Arc<dyn FlightRepository>,
        Arc::new(HubPublisher { hub: hub.clone() }),
    );
    scheduler.update_tick().await;

    let frame = frames.recv().await.expect("update frame");
    let event: FlightEvent = serde_json::from_str(&frame).unwrap();
    assert_eq!(event.event_type, FlightEventType::StatusUpdated);

    // The frame carries the status the store committed, not a proposal.
    let stored = repo.find_by_number("EK202").await.unwrap().unwrap();
    assert_eq!(event.new_status, stored.status);
    assert_eq!(event.flight_id, stored.id);
}

#[tokio::test]
async fn every_client_sees_every_event() {
    let repo = Arc::new(InMemoryFlightRepository::new());
    repo.insert(Flight::new("QF12", "Sydney", OffsetDateTime::now_utc()))
        .await
        .unwrap();

    let hub = Arc::new(FanoutHub::new());
    let (_a, mut frames_a) = hub.register();
    let (_b, mut frames_b) = hub.register();

    let scheduler = FlightScheduler::new(
        repo.clone() as Arc<dyn FlightRepository>,
        Arc::new(HubPublisher { hub: hub.clone() }),
    );
    scheduler.update_tick().await;

    let frame_a = frames_a.recv().await.unwrap();
    let frame_b = frames_b.recv().await.unwrap();
    assert_eq!(frame_a, frame_b);
}

#[tokio::test]
async fn terminal_flights_stop_producing_events() {
    let repo = Arc::new(InMemoryFlightRepository::new());
    let flight = repo
        .insert(Flight::new("AF081", "Paris", OffsetDateTime::now_utc()))
        .await
        .unwrap();
    repo.update_status(flight.id, FlightStatus::Cancelled)
        .await
        .unwrap();

    let hub = Arc::new(FanoutHub::new());
    let (_client, mut frames) = hub.register();

    let scheduler = FlightScheduler::new(
        repo.clone() as Arc<dyn FlightRepository>,
        Arc::new(HubPublisher { hub: hub.clone() }),
    );
    for _ in 0..5 {
        scheduler.update_tick().await;
    }

    assert!(frames.try_recv().is_err());
    let stored = repo.find_by_id(flight.id).await.unwrap().unwrap();
    assert_eq!(stored.status, FlightStatus::Cancelled);
}
