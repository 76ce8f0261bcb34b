//! Query surface: filtered, paginated, read-only shipment views.
//!
//! Not part of the state machine; every view is a thin projection over the
//! [`crate::repository::ShipmentRepository`].

pub mod filter;
pub mod pagination;
pub mod views;

pub use filter::ShipmentFilter;
pub use pagination::{Page, PageMeta, PageRequest};
pub use views::{ItemLineView, ShipmentQueries, ShipmentSummary};
