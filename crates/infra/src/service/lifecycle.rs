//! Shipment lifecycle: creation, pending lists, finalization, receipt signature.

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::{error, info, warn};

use stocktransfer_core::{
    Aggregate, AggregateRoot, Attachment, BranchId, ExpectedVersion, ShipmentId, TransferItemId,
};
use stocktransfer_events::{EventBus, EventEnvelope};
use stocktransfer_transfers::{
    BranchRef, CreateShipment, Finalize, ItemDraft, SenderRef, Shipment, ShipmentCommand,
    ShipmentStatus, SignReceipt, TransferItem,
};

use super::{NewItem, NewShipment, TransferService};
use crate::directory::{BranchDirectory, ProductDirectory, UserDirectory};
use crate::error::TransferError;
use crate::query::ShipmentFilter;
use crate::repository::ShipmentRepository;
use crate::stock_ledger::StockLedger;

impl<R, L, D, B> TransferService<R, L, D, B>
where
    R: ShipmentRepository,
    L: StockLedger,
    D: BranchDirectory + UserDirectory + ProductDirectory,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Dispatch a new shipment and take its quantities out of the origin's stock.
    ///
    /// All-or-nothing: if any decrement or the insert fails, every decrement
    /// already applied is reversed and no shipment is stored.
    #[tracing::instrument(
        skip(self, request),
        fields(origin = %request.origin, destination = %request.destination, lines = request.items.len())
    )]
    pub fn create_shipment(&self, request: NewShipment) -> Result<Shipment, TransferError> {
        let origin = self.directory.branch(request.origin)?;
        let destination = self.directory.branch(request.destination)?;
        let sender = self.directory.user(request.sender)?;
        let items = request
            .items
            .iter()
            .map(|item| self.draft(item))
            .collect::<Result<Vec<_>, _>>()?;

        let shipment_id = ShipmentId::new();
        let mut command = CreateShipment {
            shipment_id,
            number: 0,
            origin: BranchRef {
                id: origin.id,
                name: origin.name,
            },
            destination: BranchRef {
                id: destination.id,
                name: destination.name,
            },
            sender: SenderRef {
                id: sender.id,
                username: sender.username,
            },
            items,
            comment: request.comment,
            attachments: request.attachments,
            signature: request.signature,
            occurred_at: Utc::now(),
        };
        // Reject bad manifests before a sequential number is consumed.
        command.validate()?;
        command.number = self.repository.next_number()?;

        let mut shipment = Shipment::empty(shipment_id);
        let events = shipment.handle(&ShipmentCommand::CreateShipment(command))?;
        for event in &events {
            shipment.apply(event);
        }

        self.dispatch_stock(origin.id, shipment.items())?;

        if let Err(err) = self.repository.insert(&shipment) {
            warn!(error = %err, %shipment_id, "insert failed; restoring origin stock");
            self.restock(origin.id, shipment.items());
            return Err(err.into());
        }

        self.publish(&shipment, &events);
        info!(
            %shipment_id,
            number = shipment.number(),
            lines = shipment.items().len(),
            "shipment dispatched"
        );
        Ok(shipment)
    }

    /// Shipments addressed to `destination` that are not yet terminal, newest first.
    #[tracing::instrument(skip(self))]
    pub fn list_pending_for_branch(
        &self,
        destination: BranchId,
    ) -> Result<Vec<Shipment>, TransferError> {
        let filter = ShipmentFilter::new()
            .with_destination(destination)
            .with_statuses(ShipmentStatus::pending());
        Ok(self.repository.list(&filter)?)
    }

    /// Derive the shipment status from its items.
    ///
    /// Terminal once every item is received; otherwise only moves a
    /// `Requested` shipment to `InProcess`. Repeated calls are no-ops.
    #[tracing::instrument(skip(self))]
    pub fn finalize(
        &self,
        shipment_id: ShipmentId,
        expected: ExpectedVersion,
    ) -> Result<Shipment, TransferError> {
        let shipment = self.execute(
            shipment_id,
            expected,
            ShipmentCommand::Finalize(Finalize {
                occurred_at: Utc::now(),
            }),
        )?;
        info!(
            %shipment_id,
            status = ?shipment.status(),
            version = shipment.version(),
            "shipment finalized"
        );
        Ok(shipment)
    }

    /// Record the receiving branch's signature.
    #[tracing::instrument(skip(self, signature))]
    pub fn sign_receipt(
        &self,
        shipment_id: ShipmentId,
        signature: Attachment,
        expected: ExpectedVersion,
    ) -> Result<Shipment, TransferError> {
        self.execute(
            shipment_id,
            expected,
            ShipmentCommand::SignReceipt(SignReceipt {
                signature,
                occurred_at: Utc::now(),
            }),
        )
    }

    fn draft(&self, item: &NewItem) -> Result<ItemDraft, TransferError> {
        let product = self.directory.product(item.product_id)?;
        Ok(ItemDraft {
            item_id: TransferItemId::new(),
            product_id: product.id,
            product_name: product.name,
            sent_price: product.price,
            quantity: item.quantity,
            buyback_threshold: item.buyback_threshold.or(product.buyback_threshold),
            comment: item.comment.clone(),
            attachments: item.attachments.clone(),
        })
    }

    fn dispatch_stock(&self, origin: BranchId, items: &[TransferItem]) -> Result<(), TransferError> {
        for (idx, item) in items.iter().enumerate() {
            if let Err(err) =
                self.ledger
                    .decrement_stock(origin, item.product_id(), item.sent_quantity())
            {
                warn!(
                    error = %err,
                    product_id = %item.product_id(),
                    quantity = item.sent_quantity(),
                    "stock decrement failed; rolling back dispatch"
                );
                self.restock(origin, &items[..idx]);
                return Err(err.into());
            }
        }
        Ok(())
    }

    /// Undo dispatch decrements, newest first.
    fn restock(&self, origin: BranchId, items: &[TransferItem]) {
        for item in items.iter().rev() {
            if let Err(err) =
                self.ledger
                    .increment_stock(origin, item.product_id(), item.sent_quantity())
            {
                error!(
                    error = %err,
                    branch_id = %origin,
                    product_id = %item.product_id(),
                    quantity = item.sent_quantity(),
                    "failed to restore stock after aborted dispatch"
                );
            }
        }
    }
}
