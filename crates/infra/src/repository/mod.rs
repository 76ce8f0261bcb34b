//! Shipment repository boundary.
//!
//! Stores the current state of each shipment keyed by id, with an optimistic
//! version counter: 0 on insert, +1 on every successful save.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryShipmentRepository;
pub use r#trait::{RepositoryError, ShipmentRepository};
