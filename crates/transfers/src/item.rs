use serde::{Deserialize, Serialize};

use stocktransfer_core::{
    Attachment, DomainError, DomainResult, Entity, ProductId, TransferItemId,
};

/// Per-item quality/outcome tag recorded by the receiving branch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionState {
    #[default]
    Good,
    Fair,
    /// Not a flagged outcome, but outside what a `Completed` shipment accepts.
    Poor,
    Incomplete,
    Lost,
}

impl ConditionState {
    /// Conditions compatible with a fully completed shipment.
    pub fn is_acceptable(self) -> bool {
        matches!(self, ConditionState::Good | ConditionState::Fair)
    }
}

/// Receiving-side state of one line, as shown on the reconciliation screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemLineState {
    Pending,
    Received,
    Returned,
}

/// Sender-side description of one line, resolved against the product
/// directory before the shipment is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDraft {
    pub item_id: TransferItemId,
    pub product_id: ProductId,
    /// Display snapshot of the product name at dispatch time.
    pub product_name: String,
    /// Catalog price at dispatch time, in minor currency units.
    pub sent_price: u64,
    pub quantity: i64,
    pub buyback_threshold: Option<u64>,
    pub comment: Option<String>,
    pub attachments: Vec<Attachment>,
}

/// One product line on a shipment.
///
/// Only mutated through its owning [`crate::Shipment`]; every setter here is
/// crate-private and invoked from event application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferItem {
    id: TransferItemId,
    line_no: u32,
    product_id: ProductId,
    product_name: String,
    sent_price: u64,
    sent_quantity: i64,
    received_quantity: Option<i64>,
    unit_price: Option<u64>,
    buyback_threshold: Option<u64>,
    condition: ConditionState,
    received: bool,
    returned: bool,
    send_evidence: Vec<Attachment>,
    receive_evidence: Vec<Attachment>,
    send_comment: Option<String>,
    receive_comment: Option<String>,
}

impl TransferItem {
    pub(crate) fn dispatched(line_no: u32, draft: &ItemDraft) -> Self {
        Self {
            id: draft.item_id,
            line_no,
            product_id: draft.product_id,
            product_name: draft.product_name.clone(),
            sent_price: draft.sent_price,
            sent_quantity: draft.quantity,
            received_quantity: None,
            unit_price: None,
            buyback_threshold: draft.buyback_threshold,
            condition: ConditionState::default(),
            received: false,
            returned: false,
            send_evidence: draft.attachments.clone(),
            receive_evidence: Vec::new(),
            send_comment: draft.comment.clone(),
            receive_comment: None,
        }
    }

    pub fn id_typed(&self) -> TransferItemId {
        self.id
    }

    /// 1-based position on the manifest.
    pub fn line_no(&self) -> u32 {
        self.line_no
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    pub fn sent_price(&self) -> u64 {
        self.sent_price
    }

    pub fn sent_quantity(&self) -> i64 {
        self.sent_quantity
    }

    pub fn received_quantity(&self) -> Option<i64> {
        self.received_quantity
    }

    pub fn unit_price(&self) -> Option<u64> {
        self.unit_price
    }

    pub fn buyback_threshold(&self) -> Option<u64> {
        self.buyback_threshold
    }

    pub fn condition(&self) -> ConditionState {
        self.condition
    }

    pub fn is_received(&self) -> bool {
        self.received
    }

    pub fn is_returned(&self) -> bool {
        self.returned
    }

    pub fn send_evidence(&self) -> &[Attachment] {
        &self.send_evidence
    }

    pub fn receive_evidence(&self) -> &[Attachment] {
        &self.receive_evidence
    }

    pub fn send_comment(&self) -> Option<&str> {
        self.send_comment.as_deref()
    }

    pub fn receive_comment(&self) -> Option<&str> {
        self.receive_comment.as_deref()
    }

    /// Units sent but not received, once a received quantity is recorded.
    pub fn discrepancy(&self) -> Option<i64> {
        self.received_quantity.map(|q| self.sent_quantity - q)
    }

    pub fn line_state(&self) -> ItemLineState {
        if self.returned {
            ItemLineState::Returned
        } else if self.received {
            ItemLineState::Received
        } else {
            ItemLineState::Pending
        }
    }

    /// Whether this line alone is compatible with a `Completed` shipment.
    pub fn is_complete(&self) -> bool {
        self.received_quantity == Some(self.sent_quantity) && self.condition.is_acceptable()
    }

    /// Returned items accept no further change at all.
    pub(crate) fn ensure_not_returned(&self) -> DomainResult<()> {
        if self.returned {
            return Err(DomainError::item_frozen(format!(
                "item {} has been returned",
                self.id
            )));
        }
        Ok(())
    }

    /// Receipt fields stay editable until the item is marked received.
    pub(crate) fn ensure_receipt_open(&self) -> DomainResult<()> {
        self.ensure_not_returned()?;
        if self.received {
            return Err(DomainError::item_frozen(format!(
                "item {} is already marked received",
                self.id
            )));
        }
        Ok(())
    }

    pub(crate) fn record_received_quantity(&mut self, quantity: i64) {
        self.received_quantity = Some(quantity);
    }

    pub(crate) fn record_unit_price(&mut self, price: u64) {
        self.unit_price = Some(price);
    }

    pub(crate) fn record_buyback_threshold(&mut self, threshold: u64) {
        self.buyback_threshold = Some(threshold);
    }

    pub(crate) fn record_condition(&mut self, condition: ConditionState) {
        self.condition = condition;
    }

    pub(crate) fn mark_received(&mut self) {
        self.received = true;
    }

    pub(crate) fn mark_returned(&mut self) {
        self.returned = true;
    }

    pub(crate) fn clear_returned(&mut self) {
        self.returned = false;
    }

    pub(crate) fn attach_receive_evidence(&mut self, attachments: &[Attachment]) {
        self.receive_evidence.extend_from_slice(attachments);
    }

    pub(crate) fn set_receive_comment(&mut self, text: Option<String>) {
        self.receive_comment = text;
    }
}

impl Entity for TransferItem {
    type Id = TransferItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
