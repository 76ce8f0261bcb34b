//! Stock ledger boundary.
//!
//! Per-branch, per-product on-hand quantities. The ledger is independently
//! transactional: each call either applies fully or not at all, but two calls
//! are never coupled. Coupling a stock movement with a shipment change is the
//! service's job (see [`crate::service`]).

pub mod in_memory;
pub mod r#trait;

pub use in_memory::{InMemoryStockLedger, StockMovement};
pub use r#trait::{StockLedger, StockLedgerError};
