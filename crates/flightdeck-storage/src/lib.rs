//! Repository abstraction for Flightdeck.
//!
//! Defines the storage traits consumed by the scheduler, the HTTP handlers
//! and the authorizer, plus an in-memory backend. Durable backends are out
//! of scope; anything implementing the traits plugs in.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::StorageError;
pub use memory::{InMemoryFlightRepository, InMemoryUserRepository};
pub use traits::{FlightRepository, UserRepository};
