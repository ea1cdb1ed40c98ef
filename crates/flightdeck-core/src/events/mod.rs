//! Change events for the propagation pipeline.
//!
//! A `FlightEvent` is an immutable fact describing one committed mutation.
//! It is produced by the component that committed the mutation, carried
//! over the broker between processes, and fanned out to WebSocket clients
//! unchanged.

mod types;

pub use types::{FlightEvent, FlightEventType};
