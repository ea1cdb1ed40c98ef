//! Event types for the flight status pipeline.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::flight::{Flight, FlightStatus};

/// What kind of mutation an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlightEventType {
    FlightCreated,
    StatusUpdated,
}

/// An immutable fact describing one completed flight mutation.
///
/// The same serialized form travels over the broker and over the WebSocket
/// push channel, unmodified. The flight id doubles as the broker message
/// key, so updates to one flight stay ordered for a given consumer group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightEvent {
    #[serde(rename = "type")]
    pub event_type: FlightEventType,
    pub flight_id: Uuid,
    pub flight_number: String,
    pub new_status: FlightStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl FlightEvent {
    /// Event for a newly created flight.
    pub fn created(flight: &Flight) -> Self {
        Self {
            event_type: FlightEventType::FlightCreated,
            flight_id: flight.id,
            flight_number: flight.flight_number.clone(),
            new_status: flight.status,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    /// Event for a committed status transition.
    pub fn status_updated(flight: &Flight, new_status: FlightStatus) -> Self {
        Self {
            event_type: FlightEventType::StatusUpdated,
            flight_id: flight.id,
            flight_number: flight.flight_number.clone(),
            new_status,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    /// Broker message key. Per-flight ordering is keyed on the durable id.
    pub fn key(&self) -> String {
        self.flight_id.to_string()
    }
}
