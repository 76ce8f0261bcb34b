//! `stocktransfer-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns)
//! shared by the transfer domain and its infrastructure adapters.

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{BranchId, ProductId, ShipmentId, TransferItemId, UserId};
pub use value_object::{Attachment, ValueObject};
