//! Infrastructure layer: collaborator boundaries, configuration, the command
//! service and the read-only query surface.
//!
//! Everything here is synchronous and IO-free in its in-memory form; durable
//! backends plug in behind [`StockLedger`], [`ShipmentRepository`] and the
//! directory traits.

pub mod config;
pub mod directory;
pub mod error;
pub mod query;
pub mod repository;
pub mod service;
pub mod stock_ledger;


pub use config::TransferConfig;
pub use directory::{
    BranchDirectory, BranchRecord, DirectoryError, InMemoryDirectory, ProductDirectory,
    ProductRecord, UserDirectory, UserRecord,
};
pub use error::{ErrorCategory, TransferError};
pub use query::{
    ItemLineView, Page, PageMeta, PageRequest, ShipmentFilter, ShipmentQueries, ShipmentSummary,
};
pub use repository::{InMemoryShipmentRepository, RepositoryError, ShipmentRepository};
pub use service::{NewItem, NewShipment, TransferService};
pub use stock_ledger::{InMemoryStockLedger, StockLedger, StockLedgerError, StockMovement};
