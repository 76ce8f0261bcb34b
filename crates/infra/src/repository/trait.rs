use std::sync::Arc;

use thiserror::Error;

use stocktransfer_core::{ExpectedVersion, ShipmentId, TransferItemId};
use stocktransfer_transfers::Shipment;

use crate::query::{Page, PageRequest, ShipmentFilter};

/// Repository operation error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("shipment not found")]
    NotFound,

    #[error("optimistic concurrency check failed: {0}")]
    Conflict(String),

    #[error("duplicate identifier: {0}")]
    Duplicate(String),

    #[error("repository storage error: {0}")]
    Storage(String),
}

/// Durable shipment storage.
///
/// Implementations must:
/// - reject a `save` whose expectation does not match the stored version
///   (no lost updates between concurrent callers)
/// - persist the whole shipment atomically
/// - return list results in descending sequential-number order
pub trait ShipmentRepository: Send + Sync {
    /// Reserve the next sequential shipment number (starting at 1).
    fn next_number(&self) -> Result<u64, RepositoryError>;

    /// Store a newly created shipment at version 0.
    fn insert(&self, shipment: &Shipment) -> Result<u64, RepositoryError>;

    fn load(&self, shipment_id: ShipmentId) -> Result<Shipment, RepositoryError>;

    /// Replace the stored shipment if its version matches `expected`.
    ///
    /// Returns the new version.
    fn save(&self, shipment: &Shipment, expected: ExpectedVersion) -> Result<u64, RepositoryError>;

    /// Find the shipment owning an item.
    fn locate_item(&self, item_id: TransferItemId) -> Result<ShipmentId, RepositoryError>;

    /// All matching shipments, newest first.
    fn list(&self, filter: &ShipmentFilter) -> Result<Vec<Shipment>, RepositoryError>;

    /// One page of matching shipments, newest first.
    fn query(
        &self,
        filter: &ShipmentFilter,
        page: PageRequest,
    ) -> Result<Page<Shipment>, RepositoryError> {
        Ok(Page::slice(self.list(filter)?, page))
    }
}

impl<R> ShipmentRepository for Arc<R>
where
    R: ShipmentRepository + ?Sized,
{
    fn next_number(&self) -> Result<u64, RepositoryError> {
        (**self).next_number()
    }

    fn insert(&self, shipment: &Shipment) -> Result<u64, RepositoryError> {
        (**self).insert(shipment)
    }

    fn load(&self, shipment_id: ShipmentId) -> Result<Shipment, RepositoryError> {
        (**self).load(shipment_id)
    }

    fn save(&self, shipment: &Shipment, expected: ExpectedVersion) -> Result<u64, RepositoryError> {
        (**self).save(shipment, expected)
    }

    fn locate_item(&self, item_id: TransferItemId) -> Result<ShipmentId, RepositoryError> {
        (**self).locate_item(item_id)
    }

    fn list(&self, filter: &ShipmentFilter) -> Result<Vec<Shipment>, RepositoryError> {
        (**self).list(filter)
    }

    fn query(
        &self,
        filter: &ShipmentFilter,
        page: PageRequest,
    ) -> Result<Page<Shipment>, RepositoryError> {
        (**self).query(filter, page)
    }
}
