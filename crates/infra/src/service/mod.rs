//! Shipment command service.
//!
//! Composes the repository, stock ledger, directories and event bus around
//! the pure [`Shipment`] aggregate:
//!
//! ```text
//! Command
//!   ↓
//! 1. Load shipment, check the caller's expected version
//!   ↓
//! 2. Handle command (pure decision logic, produces events)
//!   ↓
//! 3. Save conditioned on the loaded version
//!   ↓
//! 4. Publish events (best-effort)
//! ```
//!
//! Commands that decide no events skip steps 3–4 and leave the version alone.
//! Stock effects wrap this pipeline: creation decrements the origin before
//! the insert and restocks if it fails; a return saves its flag first and
//! increments the origin only once that save has won the version check.

mod lifecycle;
mod reconciliation;
mod returns;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};
use uuid::Uuid;

use stocktransfer_core::{
    Aggregate, AggregateRoot, Attachment, BranchId, ExpectedVersion, ProductId, ShipmentId, UserId,
};
use stocktransfer_events::{Event, EventBus, EventEnvelope};
use stocktransfer_transfers::{Shipment, ShipmentCommand, ShipmentEvent};

use crate::config::TransferConfig;
use crate::directory::{BranchDirectory, ProductDirectory, UserDirectory};
use crate::error::TransferError;
use crate::repository::ShipmentRepository;
use crate::stock_ledger::StockLedger;

/// Aggregate type stamped on published envelopes.
pub const AGGREGATE_TYPE: &str = "transfers.shipment";

/// Dispatch request from the origin branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewShipment {
    pub origin: BranchId,
    pub destination: BranchId,
    pub sender: UserId,
    pub items: Vec<NewItem>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub comment: Option<String>,
    /// Dispatch signature image.
    #[serde(default)]
    pub signature: Option<Attachment>,
}

/// One requested manifest line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItem {
    pub product_id: ProductId,
    pub quantity: i64,
    /// Overrides the product's default threshold when set.
    #[serde(default)]
    pub buyback_threshold: Option<u64>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// Application service for the shipment lifecycle, item reconciliation and
/// returns.
///
/// - `R`: shipment repository
/// - `L`: stock ledger
/// - `D`: branch, user and product directory
/// - `B`: audit event bus
#[derive(Debug)]
pub struct TransferService<R, L, D, B> {
    repository: R,
    ledger: L,
    directory: D,
    bus: B,
    config: TransferConfig,
}

impl<R, L, D, B> TransferService<R, L, D, B> {
    pub fn new(repository: R, ledger: L, directory: D, bus: B, config: TransferConfig) -> Self {
        Self {
            repository,
            ledger,
            directory,
            bus,
            config,
        }
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    pub fn into_parts(self) -> (R, L, D, B) {
        (self.repository, self.ledger, self.directory, self.bus)
    }
}

impl<R, L, D, B> TransferService<R, L, D, B>
where
    R: ShipmentRepository,
    L: StockLedger,
    D: BranchDirectory + UserDirectory + ProductDirectory,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Load, version-check and decide. Nothing is persisted.
    fn decide(
        &self,
        shipment_id: ShipmentId,
        expected: ExpectedVersion,
        command: &ShipmentCommand,
    ) -> Result<(Shipment, Vec<ShipmentEvent>), TransferError> {
        let loaded = self.repository.load(shipment_id)?;
        expected.check(loaded.version())?;
        let events = loaded.handle(command)?;
        Ok((loaded, events))
    }

    /// Apply decided events and save them conditioned on the loaded version.
    fn persist(
        &self,
        loaded: &Shipment,
        events: &[ShipmentEvent],
    ) -> Result<Shipment, TransferError> {
        let mut next = loaded.clone();
        for event in events {
            next.apply(event);
        }

        let version = self
            .repository
            .save(&next, ExpectedVersion::Exact(loaded.version()))?;
        next.stamp_version(version);
        Ok(next)
    }

    /// Persist, then publish.
    fn commit(
        &self,
        loaded: &Shipment,
        events: &[ShipmentEvent],
    ) -> Result<Shipment, TransferError> {
        let next = self.persist(loaded, events)?;
        self.publish(&next, events);
        Ok(next)
    }

    /// Run a command with no stock side effects.
    fn execute(
        &self,
        shipment_id: ShipmentId,
        expected: ExpectedVersion,
        command: ShipmentCommand,
    ) -> Result<Shipment, TransferError> {
        let (loaded, events) = self.decide(shipment_id, expected, &command)?;
        if events.is_empty() {
            debug!(%shipment_id, version = loaded.version(), "command was a no-op");
            return Ok(loaded);
        }
        self.commit(&loaded, &events)
    }

    /// Publish committed events. Failures are logged; the change is already durable.
    fn publish(&self, shipment: &Shipment, events: &[ShipmentEvent]) {
        for event in events {
            let payload = match serde_json::to_value(event) {
                Ok(payload) => payload,
                Err(err) => {
                    warn!(error = %err, event_type = event.event_type(), "failed to serialize event");
                    continue;
                }
            };

            let envelope = EventEnvelope::new(
                Uuid::now_v7(),
                *shipment.id_typed().as_uuid(),
                AGGREGATE_TYPE,
                shipment.version(),
                event.event_type(),
                event.occurred_at(),
                payload,
            );

            if let Err(err) = self.bus.publish(envelope) {
                warn!(
                    error = ?err,
                    shipment_id = %shipment.id_typed(),
                    event_type = event.event_type(),
                    "event publication failed"
                );
            }
        }
    }
}
