use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use stocktransfer_core::{AggregateRoot, BranchId, ProductId, ShipmentId, TransferItemId};
use stocktransfer_transfers::{ConditionState, ItemLineState, Shipment, ShipmentStatus};

use super::filter::ShipmentFilter;
use super::pagination::{Page, PageRequest};
use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::repository::ShipmentRepository;

/// One row of a shipment list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentSummary {
    pub id: ShipmentId,
    pub number: u64,
    pub origin: String,
    pub destination: String,
    pub sender: String,
    pub status: ShipmentStatus,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    pub item_count: usize,
    pub version: u64,
}

impl From<&Shipment> for ShipmentSummary {
    fn from(s: &Shipment) -> Self {
        Self {
            id: s.id_typed(),
            number: s.number(),
            origin: s.origin().map(|b| b.name.clone()).unwrap_or_default(),
            destination: s.destination().map(|b| b.name.clone()).unwrap_or_default(),
            sender: s.sender().map(|u| u.username.clone()).unwrap_or_default(),
            status: s.status(),
            dispatched_at: s.dispatched_at(),
            received_at: s.received_at(),
            item_count: s.items().len(),
            version: s.version(),
        }
    }
}

/// One manifest line as the receiving branch sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemLineView {
    pub item_id: TransferItemId,
    pub line_no: u32,
    pub product_id: ProductId,
    pub product_name: String,
    pub sent_price: u64,
    pub sent_quantity: i64,
    pub received_quantity: Option<i64>,
    pub discrepancy: Option<i64>,
    pub unit_price: Option<u64>,
    pub buyback_threshold: Option<u64>,
    pub condition: ConditionState,
    pub state: ItemLineState,
}

/// Read-only, paginated views over the shipment repository.
#[derive(Debug)]
pub struct ShipmentQueries<R> {
    repository: R,
    default_page_size: u32,
    max_page_size: u32,
}

impl<R> ShipmentQueries<R>
where
    R: ShipmentRepository,
{
    pub fn new(repository: R, config: &TransferConfig) -> Self {
        Self {
            repository,
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
        }
    }

    /// Shipments addressed to `destination` that still need reconciling.
    pub fn incoming(
        &self,
        destination: BranchId,
        search: Option<&str>,
        page: PageRequest,
    ) -> Result<Page<ShipmentSummary>, TransferError> {
        let filter = ShipmentFilter::new()
            .with_destination(destination)
            .with_statuses(ShipmentStatus::pending())
            .with_search(search);
        self.search(&filter, page)
    }

    /// Shipments `destination` has finished reconciling.
    pub fn received(
        &self,
        destination: BranchId,
        search: Option<&str>,
        page: PageRequest,
    ) -> Result<Page<ShipmentSummary>, TransferError> {
        let filter = ShipmentFilter::new()
            .with_destination(destination)
            .with_statuses(ShipmentStatus::terminal())
            .with_search(search);
        self.search(&filter, page)
    }

    /// Everything `origin` has dispatched, whatever its status.
    pub fn outgoing(
        &self,
        origin: BranchId,
        search: Option<&str>,
        page: PageRequest,
    ) -> Result<Page<ShipmentSummary>, TransferError> {
        let filter = ShipmentFilter::new().with_origin(origin).with_search(search);
        self.search(&filter, page)
    }

    pub fn search(
        &self,
        filter: &ShipmentFilter,
        page: PageRequest,
    ) -> Result<Page<ShipmentSummary>, TransferError> {
        let page = page.normalized(self.default_page_size, self.max_page_size);
        let result = self.repository.query(filter, page)?;
        debug!(
            page = page.page,
            per_page = page.per_page,
            total = result.meta.total,
            "shipment query"
        );
        Ok(result.map(|s| ShipmentSummary::from(&s)))
    }

    pub fn shipment(&self, shipment_id: ShipmentId) -> Result<Shipment, TransferError> {
        Ok(self.repository.load(shipment_id)?)
    }

    /// Manifest lines in line order.
    pub fn item_lines(&self, shipment_id: ShipmentId) -> Result<Vec<ItemLineView>, TransferError> {
        let shipment = self.repository.load(shipment_id)?;
        Ok(shipment
            .items()
            .iter()
            .map(|item| ItemLineView {
                item_id: item.id_typed(),
                line_no: item.line_no(),
                product_id: item.product_id(),
                product_name: item.product_name().to_string(),
                sent_price: item.sent_price(),
                sent_quantity: item.sent_quantity(),
                received_quantity: item.received_quantity(),
                discrepancy: item.discrepancy(),
                unit_price: item.unit_price(),
                buyback_threshold: item.buyback_threshold(),
                condition: item.condition(),
                state: item.line_state(),
            })
            .collect())
    }
}
