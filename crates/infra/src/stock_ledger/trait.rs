use std::sync::Arc;

use thiserror::Error;

use stocktransfer_core::{BranchId, ProductId};

/// Stock ledger operation error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StockLedgerError {
    #[error(
        "insufficient stock of product {product_id} at branch {branch_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        branch_id: BranchId,
        product_id: ProductId,
        requested: i64,
        available: i64,
    },

    #[error("stock ledger storage error: {0}")]
    Storage(String),
}

/// Per-branch stock levels.
///
/// Quantities are strictly positive; callers skip zero movements.
pub trait StockLedger: Send + Sync {
    /// Remove `quantity` units from a branch. Fails without effect when the
    /// branch holds fewer units.
    fn decrement_stock(
        &self,
        branch_id: BranchId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<(), StockLedgerError>;

    /// Add `quantity` units to a branch.
    fn increment_stock(
        &self,
        branch_id: BranchId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<(), StockLedgerError>;
}

impl<L> StockLedger for Arc<L>
where
    L: StockLedger + ?Sized,
{
    fn decrement_stock(
        &self,
        branch_id: BranchId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<(), StockLedgerError> {
        (**self).decrement_stock(branch_id, product_id, quantity)
    }

    fn increment_stock(
        &self,
        branch_id: BranchId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<(), StockLedgerError> {
        (**self).increment_stock(branch_id, product_id, quantity)
    }
}
