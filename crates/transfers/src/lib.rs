//! Inter-branch shipment domain.
//!
//! A [`Shipment`] moves stock from an origin branch to a destination branch.
//! The receiving branch reconciles each [`TransferItem`] against what was
//! sent, the shipment derives its terminal status from those items, and
//! received items can be returned to the origin.
//!
//! Pure domain logic: no IO, no stock ledger access. The infrastructure layer
//! turns [`ShipmentEvent::ShipmentCreated`] and [`ShipmentEvent::ItemReturned`]
//! into stock movements.

pub mod item;
pub mod policy;
pub mod shipment;
pub mod status;

pub use item::{ConditionState, ItemDraft, ItemLineState, TransferItem};
pub use policy::OverReceiptPolicy;
pub use shipment::{
    AttachEvidence, BranchRef, CreateShipment, Finalize, MarkReceived, RemoveComment, ReturnItem,
    RevertReturn, SenderRef, SetBuybackThreshold, SetComment, SetConditionState, SetReceivedQuantity,
    SetUnitPrice, Shipment, ShipmentCommand, ShipmentEvent, SignReceipt,
};
pub use status::{ShipmentStatus, derive_status};
