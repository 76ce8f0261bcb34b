//! Return workflow: send a received item back to its origin branch.

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::{error, info, warn};

use stocktransfer_core::{AggregateRoot, DomainError, ExpectedVersion, ShipmentId, TransferItemId};
use stocktransfer_events::{EventBus, EventEnvelope};
use stocktransfer_transfers::{ReturnItem, RevertReturn, Shipment, ShipmentCommand, ShipmentEvent};

use super::TransferService;
use crate::directory::{BranchDirectory, ProductDirectory, UserDirectory};
use crate::error::{ErrorCategory, TransferError};
use crate::repository::ShipmentRepository;
use crate::stock_ledger::StockLedger;

/// Reloads allowed when clearing a flag races unrelated writes to the shipment.
const REVERT_ATTEMPTS: usize = 3;

impl<R, L, D, B> TransferService<R, L, D, B>
where
    R: ShipmentRepository,
    L: StockLedger,
    D: BranchDirectory + UserDirectory + ProductDirectory,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Return a received item: freeze it and put its received quantity back
    /// into the origin's stock.
    ///
    /// The `returned` flag is saved first, conditioned on the loaded version,
    /// so only one of several racing returns ever reaches the ledger. A failed
    /// increment clears the flag again; events are published only once both
    /// sides have succeeded.
    #[tracing::instrument(skip(self))]
    pub fn return_item(
        &self,
        item_id: TransferItemId,
        expected: ExpectedVersion,
    ) -> Result<Shipment, TransferError> {
        let shipment_id = self.repository.locate_item(item_id)?;
        let command = ShipmentCommand::ReturnItem(ReturnItem {
            item_id,
            occurred_at: Utc::now(),
        });
        let (loaded, events) = self.decide(shipment_id, expected, &command)?;

        let reversal = events
            .iter()
            .find_map(|event| match event {
                ShipmentEvent::ItemReturned(returned) => Some(returned.clone()),
                _ => None,
            })
            .ok_or_else(|| DomainError::invariant("return decided no ItemReturned event"))?;

        let shipment = self.persist(&loaded, &events)?;

        if reversal.quantity > 0 {
            if let Err(err) = self.ledger.increment_stock(
                reversal.origin_branch_id,
                reversal.product_id,
                reversal.quantity,
            ) {
                warn!(
                    error = %err,
                    %shipment_id,
                    %item_id,
                    "return stock increment failed; reverting flag"
                );
                self.revert_return(shipment_id, item_id);
                return Err(err.into());
            }
        }

        self.publish(&shipment, &events);
        info!(
            %shipment_id,
            %item_id,
            quantity = reversal.quantity,
            version = shipment.version(),
            "item returned to origin"
        );
        Ok(shipment)
    }

    /// Clear the `returned` flag of an item whose stock was never credited.
    fn revert_return(&self, shipment_id: ShipmentId, item_id: TransferItemId) {
        let command = ShipmentCommand::RevertReturn(RevertReturn {
            item_id,
            occurred_at: Utc::now(),
        });

        let mut last_error = None;
        for _ in 0..REVERT_ATTEMPTS {
            let attempt = self
                .decide(shipment_id, ExpectedVersion::Any, &command)
                .and_then(|(loaded, events)| self.persist(&loaded, &events));
            match attempt {
                Ok(_) => return,
                Err(err) if err.category() == ErrorCategory::Conflict => last_error = Some(err),
                Err(err) => {
                    last_error = Some(err);
                    break;
                }
            }
        }

        if let Some(err) = last_error {
            error!(
                error = %err,
                %shipment_id,
                %item_id,
                "failed to revert return; item is flagged returned without stock credit"
            );
        }
    }
}
