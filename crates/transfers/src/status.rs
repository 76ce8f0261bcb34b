use serde::{Deserialize, Serialize};

use crate::item::TransferItem;

/// Shipment status lifecycle.
///
/// `Requested → InProcess → {Completed | CompletedIncomplete}`; terminal
/// statuses never transition again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    Requested,
    InProcess,
    Completed,
    CompletedIncomplete,
}

impl ShipmentStatus {
    pub fn is_terminal(self) -> bool {
        match self {
            ShipmentStatus::Requested | ShipmentStatus::InProcess => false,
            ShipmentStatus::Completed | ShipmentStatus::CompletedIncomplete => true,
        }
    }

    /// Statuses the receiving branch still has to act on.
    pub fn pending() -> &'static [ShipmentStatus] {
        &[ShipmentStatus::Requested, ShipmentStatus::InProcess]
    }

    /// Statuses a shipment can end in.
    pub fn terminal() -> &'static [ShipmentStatus] {
        &[ShipmentStatus::Completed, ShipmentStatus::CompletedIncomplete]
    }
}

/// Derive the terminal status from item states.
///
/// Returns `None` while any item is still unreceived. Otherwise the shipment
/// is `Completed` iff every item received exactly what was sent in an
/// acceptable condition; a flagged condition wins over matching quantities.
/// Returned items keep counting with the quantities they were received with.
pub fn derive_status(items: &[TransferItem]) -> Option<ShipmentStatus> {
    if items.is_empty() || !items.iter().all(TransferItem::is_received) {
        return None;
    }
    if items.iter().all(TransferItem::is_complete) {
        Some(ShipmentStatus::Completed)
    } else {
        Some(ShipmentStatus::CompletedIncomplete)
    }
}
