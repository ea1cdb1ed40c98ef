//! The flight record and its status set.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::CoreError;

/// Operational status of a flight.
///
/// The set is fixed; `Cancelled` is terminal and excludes the flight from
/// further scheduler selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlightStatus {
    OnTime,
    Delayed,
    Cancelled,
}

impl FlightStatus {
    /// All statuses, in declaration order.
    pub const ALL: [FlightStatus; 3] = [
        FlightStatus::OnTime,
        FlightStatus::Delayed,
        FlightStatus::Cancelled,
    ];

    /// Whether this status is terminal for scheduler selection.
    pub fn is_terminal(self) -> bool {
        matches!(self, FlightStatus::Cancelled)
    }

    /// Wire representation (`ON_TIME`, `DELAYED`, `CANCELLED`).
    pub fn as_str(self) -> &'static str {
        match self {
            FlightStatus::OnTime => "ON_TIME",
            FlightStatus::Delayed => "DELAYED",
            FlightStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::str::FromStr for FlightStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ON_TIME" => Ok(FlightStatus::OnTime),
            "DELAYED" => Ok(FlightStatus::Delayed),
            "CANCELLED" => Ok(FlightStatus::Cancelled),
            other => Err(CoreError::invalid_status(other)),
        }
    }
}

impl std::fmt::Display for FlightStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A flight record.
///
/// The `id` is assigned at creation and never reassigned; `flight_number`
/// is the unique human-facing identifier. Records are mutated only through
/// status transitions and are never hard-deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flight {
    pub id: Uuid,
    pub flight_number: String,
    pub destination: String,
    pub status: FlightStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub scheduled_departure: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Flight {
    /// Create a new flight with status `OnTime`.
    pub fn new(
        flight_number: impl Into<String>,
        destination: impl Into<String>,
        scheduled_departure: OffsetDateTime,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            flight_number: flight_number.into(),
            destination: destination.into(),
            status: FlightStatus::OnTime,
            scheduled_departure,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a status transition, bumping `updated_at`.
    pub fn set_status(&mut self, status: FlightStatus) {
        self.status = status;
        self.updated_at = OffsetDateTime::now_utc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&FlightStatus::OnTime).unwrap();
        assert_eq!(json, "\"ON_TIME\"");

        let status: FlightStatus = serde_json::from_str("\"DELAYED\"").unwrap();
        assert_eq!(status, FlightStatus::Delayed);
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!(
            FlightStatus::from_str("CANCELLED").unwrap(),
            FlightStatus::Cancelled
        );
        assert!(FlightStatus::from_str("BOARDING").is_err());
    }

    #[test]
    fn test_terminal_status() {
        assert!(FlightStatus::Cancelled.is_terminal());
        assert!(!FlightStatus::OnTime.is_terminal());
        assert!(!FlightStatus::Delayed.is_terminal());
    }

    #[test]
    fn test_flight_creation_defaults() {
        let flight = Flight::new(
            "BA2490",
            "London",
            OffsetDateTime::now_utc() + time::Duration::hours(4),
        );
        assert_eq!(flight.status, FlightStatus::OnTime);
        assert_eq!(flight.flight_number, "BA2490");
        assert_eq!(flight.created_at, flight.updated_at);
    }

    #[test]
    fn test_set_status_bumps_updated_at() {
        let mut flight = Flight::new("LH441", "Frankfurt", OffsetDateTime::now_utc());
        let before = flight.updated_at;
        flight.set_status(FlightStatus::Delayed);
        assert_eq!(flight.status, FlightStatus::Delayed);
        assert!(flight.updated_at >= before);
    }
}
