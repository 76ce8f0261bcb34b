use std::collections::HashMap;
use std::sync::RwLock;

use stocktransfer_core::{BranchId, ProductId};

use super::r#trait::{StockLedger, StockLedgerError};

/// One applied stock change, in application order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockMovement {
    pub branch_id: BranchId,
    pub product_id: ProductId,
    /// Negative for decrements.
    pub delta: i64,
}

#[derive(Debug, Default)]
struct LedgerState {
    levels: HashMap<(BranchId, ProductId), i64>,
    journal: Vec<StockMovement>,
}

/// In-memory stock ledger.
///
/// Intended for tests/dev. Keeps a journal of every applied movement so
/// callers can assert exactly which stock changes happened.
#[derive(Debug, Default)]
pub struct InMemoryStockLedger {
    state: RwLock<LedgerState>,
}

impl InMemoryStockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the on-hand quantity of a product at a branch (not journaled).
    pub fn set_level(
        &self,
        branch_id: BranchId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<(), StockLedgerError> {
        let mut state = self.write()?;
        state.levels.insert((branch_id, product_id), quantity);
        Ok(())
    }

    pub fn level(&self, branch_id: BranchId, product_id: ProductId) -> Result<i64, StockLedgerError> {
        let state = self.read()?;
        Ok(state.levels.get(&(branch_id, product_id)).copied().unwrap_or(0))
    }

    pub fn movements(&self) -> Result<Vec<StockMovement>, StockLedgerError> {
        Ok(self.read()?.journal.clone())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, LedgerState>, StockLedgerError> {
        self.state
            .read()
            .map_err(|_| StockLedgerError::Storage("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, LedgerState>, StockLedgerError> {
        self.state
            .write()
            .map_err(|_| StockLedgerError::Storage("lock poisoned".to_string()))
    }

    fn ensure_positive(quantity: i64) -> Result<(), StockLedgerError> {
        if quantity <= 0 {
            return Err(StockLedgerError::Storage(format!(
                "stock movements must be positive (got {quantity})"
            )));
        }
        Ok(())
    }
}

impl StockLedger for InMemoryStockLedger {
    fn decrement_stock(
        &self,
        branch_id: BranchId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<(), StockLedgerError> {
        Self::ensure_positive(quantity)?;
        let mut state = self.write()?;

        let available = state.levels.get(&(branch_id, product_id)).copied().unwrap_or(0);
        if available < quantity {
            return Err(StockLedgerError::InsufficientStock {
                branch_id,
                product_id,
                requested: quantity,
                available,
            });
        }

        state.levels.insert((branch_id, product_id), available - quantity);
        state.journal.push(StockMovement {
            branch_id,
            product_id,
            delta: -quantity,
        });
        Ok(())
    }

    fn increment_stock(
        &self,
        branch_id: BranchId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<(), StockLedgerError> {
        Self::ensure_positive(quantity)?;
        let mut state = self.write()?;

        let level = state.levels.entry((branch_id, product_id)).or_insert(0);
        *level = level.checked_add(quantity).ok_or_else(|| {
            StockLedgerError::Storage(format!(
                "stock level overflow for product {product_id} at branch {branch_id}"
            ))
        })?;
        state.journal.push(StockMovement {
            branch_id,
            product_id,
            delta: quantity,
        });
        Ok(())
    }
}
