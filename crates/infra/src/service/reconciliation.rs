//! Item reconciliation on the receiving side.

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::debug;

use stocktransfer_core::{AggregateRoot, Attachment, ExpectedVersion, TransferItemId};
use stocktransfer_events::{EventBus, EventEnvelope};
use stocktransfer_transfers::{
    AttachEvidence, ConditionState, MarkReceived, RemoveComment, SetBuybackThreshold, SetComment,
    SetConditionState, SetReceivedQuantity, SetUnitPrice, Shipment, ShipmentCommand,
};

use super::TransferService;
use crate::directory::{BranchDirectory, ProductDirectory, UserDirectory};
use crate::error::TransferError;
use crate::repository::ShipmentRepository;
use crate::stock_ledger::StockLedger;

impl<R, L, D, B> TransferService<R, L, D, B>
where
    R: ShipmentRepository,
    L: StockLedger,
    D: BranchDirectory + UserDirectory + ProductDirectory,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Record how many units arrived. Over-receipt follows the configured policy.
    #[tracing::instrument(skip(self))]
    pub fn set_received_quantity(
        &self,
        item_id: TransferItemId,
        quantity: i64,
        expected: ExpectedVersion,
    ) -> Result<Shipment, TransferError> {
        let policy = self.config.over_receipt;
        self.execute_on_item(
            item_id,
            expected,
            ShipmentCommand::SetReceivedQuantity(SetReceivedQuantity {
                item_id,
                quantity,
                policy,
                occurred_at: Utc::now(),
            }),
        )
    }

    #[tracing::instrument(skip(self))]
    pub fn set_unit_price(
        &self,
        item_id: TransferItemId,
        price: u64,
        expected: ExpectedVersion,
    ) -> Result<Shipment, TransferError> {
        self.execute_on_item(
            item_id,
            expected,
            ShipmentCommand::SetUnitPrice(SetUnitPrice {
                item_id,
                price,
                occurred_at: Utc::now(),
            }),
        )
    }

    #[tracing::instrument(skip(self))]
    pub fn set_buyback_threshold(
        &self,
        item_id: TransferItemId,
        threshold: u64,
        expected: ExpectedVersion,
    ) -> Result<Shipment, TransferError> {
        self.execute_on_item(
            item_id,
            expected,
            ShipmentCommand::SetBuybackThreshold(SetBuybackThreshold {
                item_id,
                threshold,
                occurred_at: Utc::now(),
            }),
        )
    }

    #[tracing::instrument(skip(self))]
    pub fn set_condition_state(
        &self,
        item_id: TransferItemId,
        condition: ConditionState,
        expected: ExpectedVersion,
    ) -> Result<Shipment, TransferError> {
        self.execute_on_item(
            item_id,
            expected,
            ShipmentCommand::SetConditionState(SetConditionState {
                item_id,
                condition,
                occurred_at: Utc::now(),
            }),
        )
    }

    /// Close the item's receipt. Marking an already received item is a no-op.
    #[tracing::instrument(skip(self))]
    pub fn mark_received(
        &self,
        item_id: TransferItemId,
        expected: ExpectedVersion,
    ) -> Result<Shipment, TransferError> {
        self.execute_on_item(
            item_id,
            expected,
            ShipmentCommand::MarkReceived(MarkReceived {
                item_id,
                occurred_at: Utc::now(),
            }),
        )
    }

    #[tracing::instrument(skip(self, attachments), fields(count = attachments.len()))]
    pub fn attach_evidence(
        &self,
        item_id: TransferItemId,
        attachments: Vec<Attachment>,
        expected: ExpectedVersion,
    ) -> Result<Shipment, TransferError> {
        self.execute_on_item(
            item_id,
            expected,
            ShipmentCommand::AttachEvidence(AttachEvidence {
                item_id,
                attachments,
                occurred_at: Utc::now(),
            }),
        )
    }

    #[tracing::instrument(skip(self, text))]
    pub fn set_comment(
        &self,
        item_id: TransferItemId,
        text: String,
        expected: ExpectedVersion,
    ) -> Result<Shipment, TransferError> {
        self.execute_on_item(
            item_id,
            expected,
            ShipmentCommand::SetComment(SetComment {
                item_id,
                text,
                occurred_at: Utc::now(),
            }),
        )
    }

    #[tracing::instrument(skip(self))]
    pub fn remove_comment(
        &self,
        item_id: TransferItemId,
        expected: ExpectedVersion,
    ) -> Result<Shipment, TransferError> {
        self.execute_on_item(
            item_id,
            expected,
            ShipmentCommand::RemoveComment(RemoveComment {
                item_id,
                occurred_at: Utc::now(),
            }),
        )
    }

    fn execute_on_item(
        &self,
        item_id: TransferItemId,
        expected: ExpectedVersion,
        command: ShipmentCommand,
    ) -> Result<Shipment, TransferError> {
        let shipment_id = self.repository.locate_item(item_id)?;
        let shipment = self.execute(shipment_id, expected, command)?;
        debug!(
            %shipment_id,
            %item_id,
            status = ?shipment.status(),
            version = shipment.version(),
            "item updated"
        );
        Ok(shipment)
    }
}
