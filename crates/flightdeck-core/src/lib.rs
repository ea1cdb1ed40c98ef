//! Core domain model for Flightdeck.
//!
//! This crate holds the types shared by every other workspace member:
//! the `Flight` record and its status set, the `User` identity record,
//! and the `FlightEvent` change notification.

pub mod error;
pub mod events;
pub mod flight;
pub mod user;

pub use error::CoreError;
pub use events::{FlightEvent, FlightEventType};
pub use flight::{Flight, FlightStatus};
pub use user::User;
