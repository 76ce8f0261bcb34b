use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stocktransfer_core::{
    Aggregate, AggregateRoot, Attachment, BranchId, DomainError, DomainResult, ProductId,
    ShipmentId, TransferItemId, UserId,
};
use stocktransfer_events::Event;

use crate::item::{ConditionState, ItemDraft, TransferItem};
use crate::policy::OverReceiptPolicy;
use crate::status::{ShipmentStatus, derive_status};

/// Branch reference with its display name captured at dispatch time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRef {
    pub id: BranchId,
    pub name: String,
}

/// Sending user with the username captured at dispatch time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderRef {
    pub id: UserId,
    pub username: String,
}

/// Aggregate root: Shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shipment {
    id: ShipmentId,
    number: u64,
    origin: Option<BranchRef>,
    destination: Option<BranchRef>,
    sender: Option<SenderRef>,
    dispatched_at: Option<DateTime<Utc>>,
    received_at: Option<DateTime<Utc>>,
    comment: Option<String>,
    attachments: Vec<Attachment>,
    dispatch_signature: Option<Attachment>,
    receipt_signature: Option<Attachment>,
    status: ShipmentStatus,
    items: Vec<TransferItem>,
    version: u64,
    created: bool,
}

impl Shipment {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: ShipmentId) -> Self {
        Self {
            id,
            number: 0,
            origin: None,
            destination: None,
            sender: None,
            dispatched_at: None,
            received_at: None,
            comment: None,
            attachments: Vec::new(),
            dispatch_signature: None,
            receipt_signature: None,
            status: ShipmentStatus::Requested,
            items: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ShipmentId {
        self.id
    }

    /// Human-readable sequential number.
    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn origin(&self) -> Option<&BranchRef> {
        self.origin.as_ref()
    }

    pub fn destination(&self) -> Option<&BranchRef> {
        self.destination.as_ref()
    }

    pub fn sender(&self) -> Option<&SenderRef> {
        self.sender.as_ref()
    }

    pub fn origin_id(&self) -> Option<BranchId> {
        self.origin.as_ref().map(|b| b.id)
    }

    pub fn destination_id(&self) -> Option<BranchId> {
        self.destination.as_ref().map(|b| b.id)
    }

    pub fn dispatched_at(&self) -> Option<DateTime<Utc>> {
        self.dispatched_at
    }

    pub fn received_at(&self) -> Option<DateTime<Utc>> {
        self.received_at
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn dispatch_signature(&self) -> Option<&Attachment> {
        self.dispatch_signature.as_ref()
    }

    pub fn receipt_signature(&self) -> Option<&Attachment> {
        self.receipt_signature.as_ref()
    }

    pub fn status(&self) -> ShipmentStatus {
        self.status
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Items in manifest order.
    pub fn items(&self) -> &[TransferItem] {
        &self.items
    }

    pub fn item(&self, item_id: TransferItemId) -> Option<&TransferItem> {
        self.items.iter().find(|i| i.id_typed() == item_id)
    }

    pub fn all_received(&self) -> bool {
        !self.items.is_empty() && self.items.iter().all(TransferItem::is_received)
    }

    /// Per product, the quantity this shipment contributes to the destination's
    /// usable stock: received items only, returned items excluded.
    pub fn effective_received(&self) -> BTreeMap<ProductId, i64> {
        let mut totals = BTreeMap::new();
        for item in self.items.iter().filter(|i| i.is_received() && !i.is_returned()) {
            *totals.entry(item.product_id()).or_insert(0) += item.received_quantity().unwrap_or(0);
        }
        totals
    }

    /// Record the version assigned by the repository on a successful save.
    pub fn stamp_version(&mut self, version: u64) {
        self.version = version;
    }

    fn item_mut(&mut self, item_id: TransferItemId) -> Option<&mut TransferItem> {
        self.items.iter_mut().find(|i| i.id_typed() == item_id)
    }
}

impl AggregateRoot for Shipment {
    type Id = ShipmentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateShipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateShipment {
    pub shipment_id: ShipmentId,
    pub number: u64,
    pub origin: BranchRef,
    pub destination: BranchRef,
    pub sender: SenderRef,
    pub items: Vec<ItemDraft>,
    pub comment: Option<String>,
    pub attachments: Vec<Attachment>,
    pub signature: Option<Attachment>,
    pub occurred_at: DateTime<Utc>,
}

impl CreateShipment {
    /// Manifest checks that need no aggregate state: distinct branches, at
    /// least one line, positive quantities, unique item ids.
    pub fn validate(&self) -> DomainResult<()> {
        if self.origin.id == self.destination.id {
            return Err(DomainError::validation(
                "origin and destination branches must differ",
            ));
        }
        if self.items.is_empty() {
            return Err(DomainError::validation(
                "a shipment must contain at least one item",
            ));
        }

        let mut seen = HashSet::with_capacity(self.items.len());
        for draft in &self.items {
            if draft.quantity <= 0 {
                return Err(DomainError::invalid_quantity(format!(
                    "sent quantity for product {} must be positive (got {})",
                    draft.product_id, draft.quantity
                )));
            }
            if !seen.insert(draft.item_id) {
                return Err(DomainError::validation(format!(
                    "duplicate item id {}",
                    draft.item_id
                )));
            }
        }
        Ok(())
    }
}

/// Command: SetReceivedQuantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetReceivedQuantity {
    pub item_id: TransferItemId,
    pub quantity: i64,
    pub policy: OverReceiptPolicy,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetUnitPrice (minor currency units).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetUnitPrice {
    pub item_id: TransferItemId,
    pub price: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetBuybackThreshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetBuybackThreshold {
    pub item_id: TransferItemId,
    pub threshold: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetConditionState.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetConditionState {
    pub item_id: TransferItemId,
    pub condition: ConditionState,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkReceived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkReceived {
    pub item_id: TransferItemId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AttachEvidence (receive side).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachEvidence {
    pub item_id: TransferItemId,
    pub attachments: Vec<Attachment>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetComment (receive side).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetComment {
    pub item_id: TransferItemId,
    pub text: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveComment (receive side).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveComment {
    pub item_id: TransferItemId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SignReceipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignReceipt {
    pub signature: Attachment,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Finalize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finalize {
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReturnItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnItem {
    pub item_id: TransferItemId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RevertReturn.
///
/// Clears the returned flag when the origin's stock could not be credited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevertReturn {
    pub item_id: TransferItemId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShipmentCommand {
    CreateShipment(CreateShipment),
    SetReceivedQuantity(SetReceivedQuantity),
    SetUnitPrice(SetUnitPrice),
    SetBuybackThreshold(SetBuybackThreshold),
    SetConditionState(SetConditionState),
    MarkReceived(MarkReceived),
    AttachEvidence(AttachEvidence),
    SetComment(SetComment),
    RemoveComment(RemoveComment),
    SignReceipt(SignReceipt),
    Finalize(Finalize),
    ReturnItem(ReturnItem),
    RevertReturn(RevertReturn),
}

/// Event: ShipmentCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentCreated {
    pub shipment_id: ShipmentId,
    pub number: u64,
    pub origin: BranchRef,
    pub destination: BranchRef,
    pub sender: SenderRef,
    pub items: Vec<ItemDraft>,
    pub comment: Option<String>,
    pub attachments: Vec<Attachment>,
    pub signature: Option<Attachment>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReconciliationStarted (Requested → InProcess).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationStarted {
    pub shipment_id: ShipmentId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReceivedQuantityRecorded.
///
/// `requested` is what the receiver entered; `recorded` is what the over-receipt
/// policy let through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedQuantityRecorded {
    pub shipment_id: ShipmentId,
    pub item_id: TransferItemId,
    pub requested: i64,
    pub recorded: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitPriceRecorded {
    pub shipment_id: ShipmentId,
    pub item_id: TransferItemId,
    pub price: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuybackThresholdRecorded {
    pub shipment_id: ShipmentId,
    pub item_id: TransferItemId,
    pub threshold: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionRecorded {
    pub shipment_id: ShipmentId,
    pub item_id: TransferItemId,
    pub condition: ConditionState,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemReceived {
    pub shipment_id: ShipmentId,
    pub item_id: TransferItemId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceAttached {
    pub shipment_id: ShipmentId,
    pub item_id: TransferItemId,
    pub attachments: Vec<Attachment>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentRecorded {
    pub shipment_id: ShipmentId,
    pub item_id: TransferItemId,
    pub text: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentRemoved {
    pub shipment_id: ShipmentId,
    pub item_id: TransferItemId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptSigned {
    pub shipment_id: ShipmentId,
    pub signature: Attachment,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ShipmentFinalized (terminal status derived).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentFinalized {
    pub shipment_id: ShipmentId,
    pub status: ShipmentStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemReturned.
///
/// Carries everything the infrastructure layer needs to move `quantity` units
/// of `product_id` back into `origin_branch_id`'s stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemReturned {
    pub shipment_id: ShipmentId,
    pub item_id: TransferItemId,
    pub origin_branch_id: BranchId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReturnReverted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnReverted {
    pub shipment_id: ShipmentId,
    pub item_id: TransferItemId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShipmentEvent {
    ShipmentCreated(ShipmentCreated),
    ReconciliationStarted(ReconciliationStarted),
    ReceivedQuantityRecorded(ReceivedQuantityRecorded),
    UnitPriceRecorded(UnitPriceRecorded),
    BuybackThresholdRecorded(BuybackThresholdRecorded),
    ConditionRecorded(ConditionRecorded),
    ItemReceived(ItemReceived),
    EvidenceAttached(EvidenceAttached),
    CommentRecorded(CommentRecorded),
    CommentRemoved(CommentRemoved),
    ReceiptSigned(ReceiptSigned),
    ShipmentFinalized(ShipmentFinalized),
    ItemReturned(ItemReturned),
    ReturnReverted(ReturnReverted),
}

impl Event for ShipmentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ShipmentEvent::ShipmentCreated(_) => "transfers.shipment.created",
            ShipmentEvent::ReconciliationStarted(_) => "transfers.shipment.reconciliation_started",
            ShipmentEvent::ReceivedQuantityRecorded(_) => "transfers.item.received_quantity_recorded",
            ShipmentEvent::UnitPriceRecorded(_) => "transfers.item.unit_price_recorded",
            ShipmentEvent::BuybackThresholdRecorded(_) => "transfers.item.buyback_threshold_recorded",
            ShipmentEvent::ConditionRecorded(_) => "transfers.item.condition_recorded",
            ShipmentEvent::ItemReceived(_) => "transfers.item.received",
            ShipmentEvent::EvidenceAttached(_) => "transfers.item.evidence_attached",
            ShipmentEvent::CommentRecorded(_) => "transfers.item.comment_recorded",
            ShipmentEvent::CommentRemoved(_) => "transfers.item.comment_removed",
            ShipmentEvent::ReceiptSigned(_) => "transfers.shipment.receipt_signed",
            ShipmentEvent::ShipmentFinalized(_) => "transfers.shipment.finalized",
            ShipmentEvent::ItemReturned(_) => "transfers.item.returned",
            ShipmentEvent::ReturnReverted(_) => "transfers.item.return_reverted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ShipmentEvent::ShipmentCreated(e) => e.occurred_at,
            ShipmentEvent::ReconciliationStarted(e) => e.occurred_at,
            ShipmentEvent::ReceivedQuantityRecorded(e) => e.occurred_at,
            ShipmentEvent::UnitPriceRecorded(e) => e.occurred_at,
            ShipmentEvent::BuybackThresholdRecorded(e) => e.occurred_at,
            ShipmentEvent::ConditionRecorded(e) => e.occurred_at,
            ShipmentEvent::ItemReceived(e) => e.occurred_at,
            ShipmentEvent::EvidenceAttached(e) => e.occurred_at,
            ShipmentEvent::CommentRecorded(e) => e.occurred_at,
            ShipmentEvent::CommentRemoved(e) => e.occurred_at,
            ShipmentEvent::ReceiptSigned(e) => e.occurred_at,
            ShipmentEvent::ShipmentFinalized(e) => e.occurred_at,
            ShipmentEvent::ItemReturned(e) => e.occurred_at,
            ShipmentEvent::ReturnReverted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Shipment {
    type Command = ShipmentCommand;
    type Event = ShipmentEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ShipmentEvent::ShipmentCreated(e) => {
                self.id = e.shipment_id;
                self.number = e.number;
                self.origin = Some(e.origin.clone());
                self.destination = Some(e.destination.clone());
                self.sender = Some(e.sender.clone());
                self.dispatched_at = Some(e.occurred_at);
                self.received_at = None;
                self.comment = e.comment.clone();
                self.attachments = e.attachments.clone();
                self.dispatch_signature = e.signature.clone();
                self.status = ShipmentStatus::Requested;
                self.items = e
                    .items
                    .iter()
                    .enumerate()
                    .map(|(idx, draft)| TransferItem::dispatched(idx as u32 + 1, draft))
                    .collect();
                self.created = true;
            }
            ShipmentEvent::ReconciliationStarted(_) => {
                self.status = ShipmentStatus::InProcess;
            }
            ShipmentEvent::ReceivedQuantityRecorded(e) => {
                if let Some(item) = self.item_mut(e.item_id) {
                    item.record_received_quantity(e.recorded);
                }
            }
            ShipmentEvent::UnitPriceRecorded(e) => {
                if let Some(item) = self.item_mut(e.item_id) {
                    item.record_unit_price(e.price);
                }
            }
            ShipmentEvent::BuybackThresholdRecorded(e) => {
                if let Some(item) = self.item_mut(e.item_id) {
                    item.record_buyback_threshold(e.threshold);
                }
            }
            ShipmentEvent::ConditionRecorded(e) => {
                if let Some(item) = self.item_mut(e.item_id) {
                    item.record_condition(e.condition);
                }
            }
            ShipmentEvent::ItemReceived(e) => {
                if let Some(item) = self.item_mut(e.item_id) {
                    item.mark_received();
                }
            }
            ShipmentEvent::EvidenceAttached(e) => {
                if let Some(item) = self.item_mut(e.item_id) {
                    item.attach_receive_evidence(&e.attachments);
                }
            }
            ShipmentEvent::CommentRecorded(e) => {
                if let Some(item) = self.item_mut(e.item_id) {
                    item.set_receive_comment(Some(e.text.clone()));
                }
            }
            ShipmentEvent::CommentRemoved(e) => {
                if let Some(item) = self.item_mut(e.item_id) {
                    item.set_receive_comment(None);
                }
            }
            ShipmentEvent::ReceiptSigned(e) => {
                self.receipt_signature = Some(e.signature.clone());
            }
            ShipmentEvent::ShipmentFinalized(e) => {
                self.status = e.status;
                if self.received_at.is_none() {
                    self.received_at = Some(e.occurred_at);
                }
            }
            ShipmentEvent::ItemReturned(e) => {
                if let Some(item) = self.item_mut(e.item_id) {
                    item.mark_returned();
                }
            }
            ShipmentEvent::ReturnReverted(e) => {
                if let Some(item) = self.item_mut(e.item_id) {
                    item.clear_returned();
                }
            }
        }
        // Version is assigned by the repository on save, not per event.
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ShipmentCommand::CreateShipment(cmd) => self.handle_create(cmd),
            ShipmentCommand::SetReceivedQuantity(cmd) => self.handle_received_quantity(cmd),
            ShipmentCommand::SetUnitPrice(cmd) => self.handle_unit_price(cmd),
            ShipmentCommand::SetBuybackThreshold(cmd) => self.handle_buyback_threshold(cmd),
            ShipmentCommand::SetConditionState(cmd) => self.handle_condition(cmd),
            ShipmentCommand::MarkReceived(cmd) => self.handle_mark_received(cmd),
            ShipmentCommand::AttachEvidence(cmd) => self.handle_attach_evidence(cmd),
            ShipmentCommand::SetComment(cmd) => self.handle_set_comment(cmd),
            ShipmentCommand::RemoveComment(cmd) => self.handle_remove_comment(cmd),
            ShipmentCommand::SignReceipt(cmd) => self.handle_sign_receipt(cmd),
            ShipmentCommand::Finalize(cmd) => self.handle_finalize(cmd),
            ShipmentCommand::ReturnItem(cmd) => self.handle_return(cmd),
            ShipmentCommand::RevertReturn(cmd) => self.handle_revert_return(cmd),
        }
    }
}

impl Shipment {
    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn find_item(&self, item_id: TransferItemId) -> Result<&TransferItem, DomainError> {
        self.ensure_created()?;
        self.item(item_id).ok_or_else(DomainError::not_found)
    }

    /// Item whose receipt fields may still change.
    fn receipt_open_item(&self, item_id: TransferItemId) -> Result<&TransferItem, DomainError> {
        let item = self.find_item(item_id)?;
        item.ensure_receipt_open()?;
        if self.status.is_terminal() {
            return Err(DomainError::item_frozen(format!(
                "shipment {} is already finalized",
                self.number
            )));
        }
        Ok(item)
    }

    /// Item that still accepts audit-trail changes (evidence, comments).
    fn annotatable_item(&self, item_id: TransferItemId) -> Result<&TransferItem, DomainError> {
        let item = self.find_item(item_id)?;
        item.ensure_not_returned()?;
        Ok(item)
    }

    /// The first receive-side change moves a requested shipment to InProcess.
    fn start_if_requested(&self, occurred_at: DateTime<Utc>) -> Vec<ShipmentEvent> {
        if self.status == ShipmentStatus::Requested {
            vec![ShipmentEvent::ReconciliationStarted(ReconciliationStarted {
                shipment_id: self.id,
                occurred_at,
            })]
        } else {
            vec![]
        }
    }

    fn handle_create(&self, cmd: &CreateShipment) -> Result<Vec<ShipmentEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("shipment already exists"));
        }
        if cmd.shipment_id != self.id {
            return Err(DomainError::invariant("shipment_id mismatch"));
        }
        cmd.validate()?;
        if cmd.number == 0 {
            return Err(DomainError::validation("shipment number must be positive"));
        }

        Ok(vec![ShipmentEvent::ShipmentCreated(ShipmentCreated {
            shipment_id: cmd.shipment_id,
            number: cmd.number,
            origin: cmd.origin.clone(),
            destination: cmd.destination.clone(),
            sender: cmd.sender.clone(),
            items: cmd.items.clone(),
            comment: cmd.comment.clone(),
            attachments: cmd.attachments.clone(),
            signature: cmd.signature.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_received_quantity(
        &self,
        cmd: &SetReceivedQuantity,
    ) -> Result<Vec<ShipmentEvent>, DomainError> {
        let item = self.receipt_open_item(cmd.item_id)?;
        let recorded = cmd.policy.resolve(cmd.quantity, item.sent_quantity())?;

        let mut events = self.start_if_requested(cmd.occurred_at);
        events.push(ShipmentEvent::ReceivedQuantityRecorded(ReceivedQuantityRecorded {
            shipment_id: self.id,
            item_id: cmd.item_id,
            requested: cmd.quantity,
            recorded,
            occurred_at: cmd.occurred_at,
        }));
        Ok(events)
    }

    fn handle_unit_price(&self, cmd: &SetUnitPrice) -> Result<Vec<ShipmentEvent>, DomainError> {
        self.receipt_open_item(cmd.item_id)?;

        let mut events = self.start_if_requested(cmd.occurred_at);
        events.push(ShipmentEvent::UnitPriceRecorded(UnitPriceRecorded {
            shipment_id: self.id,
            item_id: cmd.item_id,
            price: cmd.price,
            occurred_at: cmd.occurred_at,
        }));
        Ok(events)
    }

    fn handle_buyback_threshold(
        &self,
        cmd: &SetBuybackThreshold,
    ) -> Result<Vec<ShipmentEvent>, DomainError> {
        self.receipt_open_item(cmd.item_id)?;

        let mut events = self.start_if_requested(cmd.occurred_at);
        events.push(ShipmentEvent::BuybackThresholdRecorded(BuybackThresholdRecorded {
            shipment_id: self.id,
            item_id: cmd.item_id,
            threshold: cmd.threshold,
            occurred_at: cmd.occurred_at,
        }));
        Ok(events)
    }

    fn handle_condition(&self, cmd: &SetConditionState) -> Result<Vec<ShipmentEvent>, DomainError> {
        self.receipt_open_item(cmd.item_id)?;

        let mut events = self.start_if_requested(cmd.occurred_at);
        events.push(ShipmentEvent::ConditionRecorded(ConditionRecorded {
            shipment_id: self.id,
            item_id: cmd.item_id,
            condition: cmd.condition,
            occurred_at: cmd.occurred_at,
        }));
        Ok(events)
    }

    fn handle_mark_received(&self, cmd: &MarkReceived) -> Result<Vec<ShipmentEvent>, DomainError> {
        let item = self.find_item(cmd.item_id)?;
        item.ensure_not_returned()?;

        // `received` is monotonic; marking twice is a no-op.
        if item.is_received() {
            return Ok(vec![]);
        }
        if item.received_quantity().is_none() {
            return Err(DomainError::validation(format!(
                "item {} has no received quantity recorded",
                cmd.item_id
            )));
        }

        let mut events = self.start_if_requested(cmd.occurred_at);
        events.push(ShipmentEvent::ItemReceived(ItemReceived {
            shipment_id: self.id,
            item_id: cmd.item_id,
            occurred_at: cmd.occurred_at,
        }));
        Ok(events)
    }

    fn handle_attach_evidence(
        &self,
        cmd: &AttachEvidence,
    ) -> Result<Vec<ShipmentEvent>, DomainError> {
        self.annotatable_item(cmd.item_id)?;
        if cmd.attachments.is_empty() {
            return Err(DomainError::validation("no attachments supplied"));
        }

        let mut events = self.start_if_requested(cmd.occurred_at);
        events.push(ShipmentEvent::EvidenceAttached(EvidenceAttached {
            shipment_id: self.id,
            item_id: cmd.item_id,
            attachments: cmd.attachments.clone(),
            occurred_at: cmd.occurred_at,
        }));
        Ok(events)
    }

    fn handle_set_comment(&self, cmd: &SetComment) -> Result<Vec<ShipmentEvent>, DomainError> {
        self.annotatable_item(cmd.item_id)?;
        let text = cmd.text.trim();
        if text.is_empty() {
            return Err(DomainError::validation("comment cannot be empty"));
        }

        let mut events = self.start_if_requested(cmd.occurred_at);
        events.push(ShipmentEvent::CommentRecorded(CommentRecorded {
            shipment_id: self.id,
            item_id: cmd.item_id,
            text: text.to_string(),
            occurred_at: cmd.occurred_at,
        }));
        Ok(events)
    }

    fn handle_remove_comment(&self, cmd: &RemoveComment) -> Result<Vec<ShipmentEvent>, DomainError> {
        let item = self.annotatable_item(cmd.item_id)?;
        if item.receive_comment().is_none() {
            return Ok(vec![]);
        }

        Ok(vec![ShipmentEvent::CommentRemoved(CommentRemoved {
            shipment_id: self.id,
            item_id: cmd.item_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_sign_receipt(&self, cmd: &SignReceipt) -> Result<Vec<ShipmentEvent>, DomainError> {
        self.ensure_created()?;
        if self.status.is_terminal() {
            return Err(DomainError::invariant(format!(
                "shipment {} is already finalized",
                self.number
            )));
        }

        Ok(vec![ShipmentEvent::ReceiptSigned(ReceiptSigned {
            shipment_id: self.id,
            signature: cmd.signature.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_finalize(&self, cmd: &Finalize) -> Result<Vec<ShipmentEvent>, DomainError> {
        self.ensure_created()?;

        if self.status.is_terminal() {
            return Ok(vec![]);
        }

        match derive_status(&self.items) {
            None => Ok(self.start_if_requested(cmd.occurred_at)),
            Some(status) => {
                let mut events = self.start_if_requested(cmd.occurred_at);
                events.push(ShipmentEvent::ShipmentFinalized(ShipmentFinalized {
                    shipment_id: self.id,
                    status,
                    occurred_at: cmd.occurred_at,
                }));
                Ok(events)
            }
        }
    }

    fn handle_return(&self, cmd: &ReturnItem) -> Result<Vec<ShipmentEvent>, DomainError> {
        let item = self.find_item(cmd.item_id)?;

        if item.is_returned() {
            return Err(DomainError::already_returned(format!(
                "item {} was already returned",
                cmd.item_id
            )));
        }
        if !item.is_received() {
            return Err(DomainError::invariant(
                "only received items can be returned",
            ));
        }
        let origin_branch_id = self
            .origin_id()
            .ok_or_else(|| DomainError::invariant("origin branch must be set"))?;

        Ok(vec![ShipmentEvent::ItemReturned(ItemReturned {
            shipment_id: self.id,
            item_id: cmd.item_id,
            origin_branch_id,
            product_id: item.product_id(),
            quantity: item.received_quantity().unwrap_or(0),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_revert_return(
        &self,
        cmd: &RevertReturn,
    ) -> Result<Vec<ShipmentEvent>, DomainError> {
        let item = self.find_item(cmd.item_id)?;
        if !item.is_returned() {
            return Err(DomainError::invariant(format!(
                "item {} has not been returned",
                cmd.item_id
            )));
        }
        Ok(vec![ShipmentEvent::ReturnReverted(ReturnReverted {
            shipment_id: self.id,
            item_id: cmd.item_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    use crate::item::ItemLineState;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn branch(name: &str) -> BranchRef {
        BranchRef {
            id: BranchId::new(),
            name: name.to_string(),
        }
    }

    fn sender() -> SenderRef {
        SenderRef {
            id: UserId::new(),
            username: "maria".to_string(),
        }
    }

    fn draft(quantity: i64) -> ItemDraft {
        ItemDraft {
            item_id: TransferItemId::new(),
            product_id: ProductId::new(),
            product_name: "Drill".to_string(),
            sent_price: 4_500,
            quantity,
            buyback_threshold: None,
            comment: None,
            attachments: vec![],
        }
    }

    fn create_cmd(shipment_id: ShipmentId, items: Vec<ItemDraft>) -> CreateShipment {
        CreateShipment {
            shipment_id,
            number: 1,
            origin: branch("Centro"),
            destination: branch("Norte"),
            sender: sender(),
            items,
            comment: Some("weekly restock".to_string()),
            attachments: vec![],
            signature: None,
            occurred_at: test_time(),
        }
    }

    fn run(shipment: &mut Shipment, cmd: ShipmentCommand) -> Vec<ShipmentEvent> {
        let events = shipment.handle(&cmd).unwrap();
        for e in &events {
            shipment.apply(e);
        }
        events
    }

    fn created(quantities: &[i64]) -> Shipment {
        let id = ShipmentId::new();
        let mut shipment = Shipment::empty(id);
        let items = quantities.iter().map(|q| draft(*q)).collect();
        run(&mut shipment, ShipmentCommand::CreateShipment(create_cmd(id, items)));
        shipment
    }

    fn receive(
        shipment: &mut Shipment,
        item_id: TransferItemId,
        quantity: i64,
        condition: ConditionState,
    ) {
        run(
            shipment,
            ShipmentCommand::SetReceivedQuantity(SetReceivedQuantity {
                item_id,
                quantity,
                policy: OverReceiptPolicy::Clamp,
                occurred_at: test_time(),
            }),
        );
        run(
            shipment,
            ShipmentCommand::SetConditionState(SetConditionState {
                item_id,
                condition,
                occurred_at: test_time(),
            }),
        );
        run(
            shipment,
            ShipmentCommand::MarkReceived(MarkReceived {
                item_id,
                occurred_at: test_time(),
            }),
        );
    }

    fn finalize(shipment: &mut Shipment) -> Vec<ShipmentEvent> {
        run(
            shipment,
            ShipmentCommand::Finalize(Finalize {
                occurred_at: test_time(),
            }),
        )
    }

    fn item_id(shipment: &Shipment, idx: usize) -> TransferItemId {
        shipment.items()[idx].id_typed()
    }

    #[test]
    fn create_emits_shipment_created_and_keeps_manifest_order() {
        let shipment = created(&[3, 5, 7]);

        assert!(shipment.is_created());
        assert_eq!(shipment.status(), ShipmentStatus::Requested);
        assert_eq!(shipment.version(), 0);
        assert_eq!(shipment.number(), 1);
        let lines: Vec<(u32, i64)> = shipment
            .items()
            .iter()
            .map(|i| (i.line_no(), i.sent_quantity()))
            .collect();
        assert_eq!(lines, vec![(1, 3), (2, 5), (3, 7)]);
    }

    #[test]
    fn create_rejects_same_origin_and_destination() {
        let id = ShipmentId::new();
        let shipment = Shipment::empty(id);
        let mut cmd = create_cmd(id, vec![draft(1)]);
        cmd.destination = cmd.origin.clone();

        let err = shipment
            .handle(&ShipmentCommand::CreateShipment(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("must differ")));
    }

    #[test]
    fn create_rejects_empty_manifest_and_non_positive_quantities() {
        let id = ShipmentId::new();
        let shipment = Shipment::empty(id);

        let err = shipment
            .handle(&ShipmentCommand::CreateShipment(create_cmd(id, vec![])))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = shipment
            .handle(&ShipmentCommand::CreateShipment(create_cmd(id, vec![draft(0)])))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidQuantity(_)));
    }

    #[test]
    fn create_twice_is_a_conflict() {
        let shipment = created(&[1]);
        let cmd = create_cmd(shipment.id_typed(), vec![draft(1)]);
        let err = shipment
            .handle(&ShipmentCommand::CreateShipment(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn first_receive_side_change_moves_to_in_process() {
        let mut shipment = created(&[10]);
        let id = item_id(&shipment, 0);

        let events = run(
            &mut shipment,
            ShipmentCommand::SetUnitPrice(SetUnitPrice {
                item_id: id,
                price: 990,
                occurred_at: test_time(),
            }),
        );
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], ShipmentEvent::ReconciliationStarted(_)));
        assert_eq!(shipment.status(), ShipmentStatus::InProcess);
        assert_eq!(shipment.items()[0].unit_price(), Some(990));

        let events = run(
            &mut shipment,
            ShipmentCommand::SetBuybackThreshold(SetBuybackThreshold {
                item_id: id,
                threshold: 4,
                occurred_at: test_time(),
            }),
        );
        assert_eq!(events.len(), 1);
        assert_eq!(shipment.items()[0].buyback_threshold(), Some(4));
    }

    #[test]
    fn over_receipt_is_clamped_and_requested_value_is_kept_in_the_event() {
        let mut shipment = created(&[10]);
        let id = item_id(&shipment, 0);

        let events = run(
            &mut shipment,
            ShipmentCommand::SetReceivedQuantity(SetReceivedQuantity {
                item_id: id,
                quantity: 14,
                policy: OverReceiptPolicy::Clamp,
                occurred_at: test_time(),
            }),
        );
        match events.last() {
            Some(ShipmentEvent::ReceivedQuantityRecorded(e)) => {
                assert_eq!(e.requested, 14);
                assert_eq!(e.recorded, 10);
            }
            other => panic!("expected ReceivedQuantityRecorded, got {other:?}"),
        }
        assert_eq!(shipment.items()[0].received_quantity(), Some(10));
        assert_eq!(shipment.items()[0].discrepancy(), Some(0));
    }

    #[test]
    fn negative_received_quantity_is_invalid() {
        let shipment = created(&[10]);
        let err = shipment
            .handle(&ShipmentCommand::SetReceivedQuantity(SetReceivedQuantity {
                item_id: item_id(&shipment, 0),
                quantity: -1,
                policy: OverReceiptPolicy::Clamp,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidQuantity(_)));
    }

    #[test]
    fn mark_received_requires_a_quantity_and_is_idempotent() {
        let mut shipment = created(&[10]);
        let id = item_id(&shipment, 0);
        let mark = ShipmentCommand::MarkReceived(MarkReceived {
            item_id: id,
            occurred_at: test_time(),
        });

        assert!(matches!(
            shipment.handle(&mark).unwrap_err(),
            DomainError::Validation(_)
        ));

        receive(&mut shipment, id, 10, ConditionState::Good);
        assert!(shipment.items()[0].is_received());
        assert!(shipment.handle(&mark).unwrap().is_empty());
    }

    #[test]
    fn receipt_fields_freeze_once_received() {
        let mut shipment = created(&[10, 10]);
        let id = item_id(&shipment, 0);
        receive(&mut shipment, id, 8, ConditionState::Good);

        let err = shipment
            .handle(&ShipmentCommand::SetReceivedQuantity(SetReceivedQuantity {
                item_id: id,
                quantity: 9,
                policy: OverReceiptPolicy::Clamp,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::ItemFrozen(_)));

        // Audit side channel stays open.
        run(
            &mut shipment,
            ShipmentCommand::SetComment(SetComment {
                item_id: id,
                text: "two units missing".to_string(),
                occurred_at: test_time(),
            }),
        );
        assert_eq!(shipment.items()[0].receive_comment(), Some("two units missing"));
    }

    #[test]
    fn finalize_before_all_received_only_moves_to_in_process() {
        let mut shipment = created(&[10, 10]);
        let events = finalize(&mut shipment);
        assert_eq!(events.len(), 1);
        assert_eq!(shipment.status(), ShipmentStatus::InProcess);

        let id = item_id(&shipment, 0);
        receive(&mut shipment, id, 10, ConditionState::Good);
        assert!(finalize(&mut shipment).is_empty());
        assert_eq!(shipment.status(), ShipmentStatus::InProcess);
        assert_eq!(shipment.received_at(), None);
    }

    #[test]
    fn full_receipt_in_good_condition_completes() {
        let mut shipment = created(&[10]);
        let id = item_id(&shipment, 0);
        receive(&mut shipment, id, 10, ConditionState::Good);

        finalize(&mut shipment);
        assert_eq!(shipment.status(), ShipmentStatus::Completed);
        assert!(shipment.received_at().is_some());
    }

    #[test]
    fn short_receipt_completes_incomplete() {
        let mut shipment = created(&[10, 10]);
        let first = item_id(&shipment, 0);
        let second = item_id(&shipment, 1);
        receive(&mut shipment, first, 10, ConditionState::Good);
        receive(&mut shipment, second, 5, ConditionState::Good);

        finalize(&mut shipment);
        assert_eq!(shipment.status(), ShipmentStatus::CompletedIncomplete);
    }

    #[test]
    fn lost_condition_overrides_matching_quantity() {
        let mut shipment = created(&[10]);
        let id = item_id(&shipment, 0);
        receive(&mut shipment, id, 10, ConditionState::Lost);

        finalize(&mut shipment);
        assert_eq!(shipment.status(), ShipmentStatus::CompletedIncomplete);
    }

    #[test]
    fn fair_condition_still_completes() {
        let mut shipment = created(&[4]);
        let id = item_id(&shipment, 0);
        receive(&mut shipment, id, 4, ConditionState::Fair);

        finalize(&mut shipment);
        assert_eq!(shipment.status(), ShipmentStatus::Completed);
    }

    #[test]
    fn finalize_twice_emits_nothing_the_second_time() {
        let mut shipment = created(&[10]);
        let id = item_id(&shipment, 0);
        receive(&mut shipment, id, 10, ConditionState::Good);

        assert!(!finalize(&mut shipment).is_empty());
        let status = shipment.status();
        assert!(finalize(&mut shipment).is_empty());
        assert_eq!(shipment.status(), status);
    }

    #[test]
    fn return_requires_received_item() {
        let shipment = created(&[10]);
        let err = shipment
            .handle(&ShipmentCommand::ReturnItem(ReturnItem {
                item_id: item_id(&shipment, 0),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn return_reverses_received_quantity_once_and_freezes_the_item() {
        let mut shipment = created(&[10]);
        let id = item_id(&shipment, 0);
        receive(&mut shipment, id, 6, ConditionState::Good);
        finalize(&mut shipment);
        let status = shipment.status();

        let cmd = ShipmentCommand::ReturnItem(ReturnItem {
            item_id: id,
            occurred_at: test_time(),
        });
        let events = run(&mut shipment, cmd.clone());
        match &events[0] {
            ShipmentEvent::ItemReturned(e) => {
                assert_eq!(e.quantity, 6);
                assert_eq!(Some(e.origin_branch_id), shipment.origin_id());
            }
            other => panic!("expected ItemReturned, got {other:?}"),
        }
        assert!(shipment.items()[0].is_returned());
        assert_eq!(shipment.status(), status);
        assert!(shipment.effective_received().is_empty());

        assert!(matches!(
            shipment.handle(&cmd).unwrap_err(),
            DomainError::AlreadyReturned(_)
        ));
    }

    #[test]
    fn returned_item_rejects_every_other_mutation() {
        let mut shipment = created(&[10]);
        let id = item_id(&shipment, 0);
        receive(&mut shipment, id, 10, ConditionState::Good);
        finalize(&mut shipment);
        run(
            &mut shipment,
            ShipmentCommand::ReturnItem(ReturnItem {
                item_id: id,
                occurred_at: test_time(),
            }),
        );
        let before = shipment.clone();

        let commands = vec![
            ShipmentCommand::SetReceivedQuantity(SetReceivedQuantity {
                item_id: id,
                quantity: 1,
                policy: OverReceiptPolicy::Clamp,
                occurred_at: test_time(),
            }),
            ShipmentCommand::SetUnitPrice(SetUnitPrice {
                item_id: id,
                price: 1,
                occurred_at: test_time(),
            }),
            ShipmentCommand::SetBuybackThreshold(SetBuybackThreshold {
                item_id: id,
                threshold: 1,
                occurred_at: test_time(),
            }),
            ShipmentCommand::SetConditionState(SetConditionState {
                item_id: id,
                condition: ConditionState::Poor,
                occurred_at: test_time(),
            }),
            ShipmentCommand::MarkReceived(MarkReceived {
                item_id: id,
                occurred_at: test_time(),
            }),
            ShipmentCommand::AttachEvidence(AttachEvidence {
                item_id: id,
                attachments: vec![Attachment::new("late.jpg").unwrap()],
                occurred_at: test_time(),
            }),
            ShipmentCommand::SetComment(SetComment {
                item_id: id,
                text: "late note".to_string(),
                occurred_at: test_time(),
            }),
            ShipmentCommand::RemoveComment(RemoveComment {
                item_id: id,
                occurred_at: test_time(),
            }),
        ];

        for cmd in commands {
            let err = shipment.handle(&cmd).unwrap_err();
            assert!(
                matches!(err, DomainError::ItemFrozen(_)),
                "{cmd:?} returned {err:?}"
            );
        }
        assert_eq!(shipment, before);
    }

    #[test]
    fn unknown_item_is_not_found() {
        let shipment = created(&[1]);
        let err = shipment
            .handle(&ShipmentCommand::MarkReceived(MarkReceived {
                item_id: TransferItemId::new(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn receipt_can_be_signed_until_finalized() {
        let mut shipment = created(&[1]);
        let signature = Attachment::new("signatures/norte-0001.png").unwrap();
        run(
            &mut shipment,
            ShipmentCommand::SignReceipt(SignReceipt {
                signature: signature.clone(),
                occurred_at: test_time(),
            }),
        );
        assert_eq!(shipment.receipt_signature(), Some(&signature));
        assert_eq!(shipment.status(), ShipmentStatus::Requested);

        let id = item_id(&shipment, 0);
        receive(&mut shipment, id, 1, ConditionState::Good);
        finalize(&mut shipment);

        let err = shipment
            .handle(&ShipmentCommand::SignReceipt(SignReceipt {
                signature,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn effective_received_sums_per_product() {
        let id = ShipmentId::new();
        let mut shipment = Shipment::empty(id);
        let product = ProductId::new();
        let mut a = draft(5);
        a.product_id = product;
        let mut b = draft(3);
        b.product_id = product;
        run(&mut shipment, ShipmentCommand::CreateShipment(create_cmd(id, vec![a, b])));

        let first = item_id(&shipment, 0);
        let second = item_id(&shipment, 1);
        receive(&mut shipment, first, 5, ConditionState::Good);
        assert_eq!(shipment.effective_received().get(&product), Some(&5));

        receive(&mut shipment, second, 2, ConditionState::Good);
        assert_eq!(shipment.effective_received().get(&product), Some(&7));
    }

    #[test]
    fn shipment_serializes_statuses_as_closed_values() {
        let mut shipment = created(&[2]);
        let id = item_id(&shipment, 0);
        receive(&mut shipment, id, 1, ConditionState::Incomplete);
        finalize(&mut shipment);

        let json = serde_json::to_value(&shipment).unwrap();
        assert_eq!(json["status"], "completed_incomplete");
        assert_eq!(json["items"][0]["condition"], "incomplete");

        let back: Shipment = serde_json::from_value(json).unwrap();
        assert_eq!(back, shipment);
    }

    #[test]
    fn revert_return_reopens_the_item_for_a_retry() {
        let mut shipment = created(&[10]);
        let id = item_id(&shipment, 0);
        receive(&mut shipment, id, 8, ConditionState::Good);
        finalize(&mut shipment);

        let revert = ShipmentCommand::RevertReturn(RevertReturn {
            item_id: id,
            occurred_at: test_time(),
        });
        assert!(matches!(
            shipment.handle(&revert).unwrap_err(),
            DomainError::InvariantViolation(_)
        ));

        let give_back = ShipmentCommand::ReturnItem(ReturnItem {
            item_id: id,
            occurred_at: test_time(),
        });
        run(&mut shipment, give_back.clone());
        run(&mut shipment, revert);

        assert!(!shipment.items()[0].is_returned());
        assert_eq!(shipment.items()[0].line_state(), ItemLineState::Received);
        assert_eq!(shipment.effective_received().values().sum::<i64>(), 8);

        let events = run(&mut shipment, give_back);
        assert!(matches!(&events[0], ShipmentEvent::ItemReturned(e) if e.quantity == 8));
    }

    #[test]
    fn item_returned_before_finalize_keeps_its_received_quantity_for_status() {
        let mut shipment = created(&[10, 4]);
        let first = item_id(&shipment, 0);
        let second = item_id(&shipment, 1);
        receive(&mut shipment, first, 10, ConditionState::Good);

        run(
            &mut shipment,
            ShipmentCommand::ReturnItem(ReturnItem {
                item_id: first,
                occurred_at: test_time(),
            }),
        );
        assert_eq!(shipment.status(), ShipmentStatus::InProcess);
        assert!(finalize(&mut shipment).is_empty());

        receive(&mut shipment, second, 4, ConditionState::Good);
        let events = finalize(&mut shipment);

        assert!(matches!(
            &events[..],
            [ShipmentEvent::ShipmentFinalized(e)] if e.status == ShipmentStatus::Completed
        ));
        assert_eq!(shipment.status(), ShipmentStatus::Completed);
        assert!(shipment.items()[0].is_returned());
        assert_eq!(
            shipment.effective_received().get(&shipment.items()[1].product_id()),
            Some(&4)
        );
        assert_eq!(shipment.effective_received().len(), 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: whatever non-negative quantity is entered, the recorded
        /// received quantity stays within [0, sent].
        #[test]
        fn recorded_quantity_stays_within_sent(sent in 1i64..10_000, requested in 0i64..20_000) {
            let mut shipment = created(&[sent]);
            let id = item_id(&shipment, 0);
            run(
                &mut shipment,
                ShipmentCommand::SetReceivedQuantity(SetReceivedQuantity {
                    item_id: id,
                    quantity: requested,
                    policy: OverReceiptPolicy::Clamp,
                    occurred_at: test_time(),
                }),
            );
            let recorded = shipment.items()[0].received_quantity().unwrap();
            prop_assert!(recorded >= 0);
            prop_assert!(recorded <= sent);
            prop_assert_eq!(recorded, requested.min(sent));
        }

        /// Property: finalize derives the same status no matter how often it runs.
        #[test]
        fn finalize_is_idempotent(
            lines in prop::collection::vec((1i64..50, 0i64..60, 0usize..5), 1..6)
        ) {
            let conditions = [
                ConditionState::Good,
                ConditionState::Fair,
                ConditionState::Poor,
                ConditionState::Incomplete,
                ConditionState::Lost,
            ];
            let sent: Vec<i64> = lines.iter().map(|(s, _, _)| *s).collect();
            let mut shipment = created(&sent);
            for (idx, (_, received, condition)) in lines.iter().enumerate() {
                let id = item_id(&shipment, idx);
                receive(&mut shipment, id, *received, conditions[*condition]);
            }

            finalize(&mut shipment);
            let first = shipment.status();
            prop_assert!(first.is_terminal());
            prop_assert!(finalize(&mut shipment).is_empty());
            prop_assert_eq!(shipment.status(), first);

            let expected_complete = lines
                .iter()
                .all(|(s, r, c)| r >= s && conditions[*c].is_acceptable());
            prop_assert_eq!(first == ShipmentStatus::Completed, expected_complete);
        }
    }
}
