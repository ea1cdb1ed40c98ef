//! In-memory repository backend.
//!
//! Backed by `DashMap`; suitable for single-process deployments and tests.

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use flightdeck_core::{Flight, FlightStatus, User};

use crate::error::StorageError;
use crate::traits::{FlightRepository, UserRepository};

/// In-memory flight store keyed by flight id.
#[derive(Default)]
pub struct InMemoryFlightRepository {
    flights: DashMap<Uuid, Flight>,
}

impl InMemoryFlightRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FlightRepository for InMemoryFlightRepository {
    async fn find_all(&self) -> Result<Vec<Flight>, StorageError> {
        let mut flights: Vec<Flight> = self.flights.iter().map(|e| e.value().clone()).collect();
        flights.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(flights)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Flight>, StorageError> {
        Ok(self.flights.get(&id).map(|e| e.value().clone()))
    }

    async fn find_by_number(&self, flight_number: &str) -> Result<Option<Flight>, StorageError> {
        Ok(self
            .flights
            .iter()
            .find(|e| e.value().flight_number == flight_number)
            .map(|e| e.value().clone()))
    }

    async fn insert(&self, flight: Flight) -> Result<Flight, StorageError> {
        if self.flights.contains_key(&flight.id) {
            return Err(StorageError::conflict("flight", flight.id.to_string()));
        }
        if self
            .flights
            .iter()
            .any(|e| e.value().flight_number == flight.flight_number)
        {
            return Err(StorageError::conflict("flight", flight.flight_number));
        }
        self.flights.insert(flight.id, flight.clone());
        Ok(flight)
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: FlightStatus,
    ) -> Result<Flight, StorageError> {
        let mut entry = self
            .flights
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found("flight", id.to_string()))?;
        entry.value_mut().set_status(status);
        Ok(entry.value().clone())
    }
}

/// In-memory user store keyed by user id.
#[derive(Default)]
pub struct InMemoryUserRepository {
    users: DashMap<Uuid, User>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StorageError> {
        Ok(self.users.get(&id).map(|e| e.value().clone()))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StorageError> {
        Ok(self
            .users
            .iter()
            .find(|e| e.value().username == username)
            .map(|e| e.value().clone()))
    }

    async fn insert(&self, user: User) -> Result<User, StorageError> {
        if self
            .users
            .iter()
            .any(|e| e.value().username == user.username)
        {
            return Err(StorageError::conflict("user", user.username));
        }
        self.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn count(&self) -> Result<usize, StorageError> {
        Ok(self.users.len())
    }
}
