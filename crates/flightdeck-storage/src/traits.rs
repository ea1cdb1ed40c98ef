//! Storage traits for the Flightdeck repository layer.
//!
//! Implementations must be thread-safe (`Send + Sync`). No transactional
//! guarantees are assumed beyond single-record atomicity.

use async_trait::async_trait;
use uuid::Uuid;

use flightdeck_core::{Flight, FlightStatus, User};

use crate::error::StorageError;

/// Repository for flight records.
///
/// # Example
///
/// ```ignore
/// async fn delayed_count(repo: &dyn FlightRepository) -> Result<usize, StorageError> {
///     Ok(repo
///         .find_all()
///         .await?
///         .iter()
///         .filter(|f| f.status == FlightStatus::Delayed)
///         .count())
/// }
/// ```
#[async_trait]
pub trait FlightRepository: Send + Sync {
    /// Returns all flights, most recently updated first.
    async fn find_all(&self) -> Result<Vec<Flight>, StorageError>;

    /// Reads a flight by its durable id. `None` when absent.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Flight>, StorageError>;

    /// Reads a flight by its human-facing flight number. `None` when absent.
    async fn find_by_number(&self, flight_number: &str) -> Result<Option<Flight>, StorageError>;

    /// Inserts a new flight.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` when the id or flight number is
    /// already taken.
    async fn insert(&self, flight: Flight) -> Result<Flight, StorageError>;

    /// Applies a status transition to an existing flight.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` when the flight does not exist.
    async fn update_status(
        &self,
        id: Uuid,
        status: FlightStatus,
    ) -> Result<Flight, StorageError>;
}

/// Repository for user accounts.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Reads a user by id. `None` when absent.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StorageError>;

    /// Reads a user by username. `None` when absent.
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StorageError>;

    /// Inserts a new user.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` when the username is taken.
    async fn insert(&self, user: User) -> Result<User, StorageError>;

    /// Number of stored users. Used by bootstrap seeding.
    async fn count(&self) -> Result<usize, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time test that the repositories are object-safe
    fn _assert_flight_repo_object_safe(_: &dyn FlightRepository) {}
    fn _assert_user_repo_object_safe(_: &dyn UserRepository) {}
}
