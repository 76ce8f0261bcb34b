use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use stocktransfer_core::{AggregateRoot, ExpectedVersion, ShipmentId, TransferItemId};
use stocktransfer_transfers::Shipment;

use super::r#trait::{RepositoryError, ShipmentRepository};
use crate::query::ShipmentFilter;

#[derive(Debug, Default)]
struct RepositoryState {
    shipments: HashMap<ShipmentId, Shipment>,
    items: HashMap<TransferItemId, ShipmentId>,
    last_number: u64,
}

/// In-memory shipment repository.
///
/// Intended for tests/dev. Not optimized for performance: list queries scan
/// every stored shipment.
#[derive(Debug, Default)]
pub struct InMemoryShipmentRepository {
    state: RwLock<RepositoryState>,
}

impl InMemoryShipmentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.shipments.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, RepositoryState>, RepositoryError> {
        self.state
            .read()
            .map_err(|_| RepositoryError::Storage("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, RepositoryState>, RepositoryError> {
        self.state
            .write()
            .map_err(|_| RepositoryError::Storage("lock poisoned".to_string()))
    }
}

impl ShipmentRepository for InMemoryShipmentRepository {
    fn next_number(&self) -> Result<u64, RepositoryError> {
        let mut state = self.write()?;
        state.last_number += 1;
        Ok(state.last_number)
    }

    fn insert(&self, shipment: &Shipment) -> Result<u64, RepositoryError> {
        let id = shipment.id_typed();
        let mut state = self.write()?;

        if state.shipments.contains_key(&id) {
            return Err(RepositoryError::Duplicate(format!("shipment {id}")));
        }
        if let Some(item) = shipment
            .items()
            .iter()
            .find(|i| state.items.contains_key(&i.id_typed()))
        {
            return Err(RepositoryError::Duplicate(format!("item {}", item.id_typed())));
        }

        let mut stored = shipment.clone();
        stored.stamp_version(0);
        for item in stored.items() {
            state.items.insert(item.id_typed(), id);
        }
        state.last_number = state.last_number.max(stored.number());
        state.shipments.insert(id, stored);
        Ok(0)
    }

    fn load(&self, shipment_id: ShipmentId) -> Result<Shipment, RepositoryError> {
        self.read()?
            .shipments
            .get(&shipment_id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    fn save(&self, shipment: &Shipment, expected: ExpectedVersion) -> Result<u64, RepositoryError> {
        let id = shipment.id_typed();
        let mut state = self.write()?;

        let current = state
            .shipments
            .get(&id)
            .map(|s| s.version())
            .ok_or(RepositoryError::NotFound)?;

        if !expected.matches(current) {
            return Err(RepositoryError::Conflict(format!(
                "expected {expected:?}, found {current}"
            )));
        }

        let next = current + 1;
        let mut stored = shipment.clone();
        stored.stamp_version(next);
        state.shipments.insert(id, stored);
        Ok(next)
    }

    fn locate_item(&self, item_id: TransferItemId) -> Result<ShipmentId, RepositoryError> {
        self.read()?
            .items
            .get(&item_id)
            .copied()
            .ok_or(RepositoryError::NotFound)
    }

    fn list(&self, filter: &ShipmentFilter) -> Result<Vec<Shipment>, RepositoryError> {
        let state = self.read()?;
        let mut matching: Vec<Shipment> = state
            .shipments
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.number().cmp(&a.number()));
        Ok(matching)
    }
}
