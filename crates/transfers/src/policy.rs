use serde::{Deserialize, Serialize};

use stocktransfer_core::{DomainError, DomainResult};

/// What to do when a receiving branch records more units than were sent.
///
/// Negative quantities are always rejected; this policy only governs
/// over-receipt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverReceiptPolicy {
    /// Record `sent_quantity` instead of the requested value.
    #[default]
    Clamp,
    /// Fail with `InvalidQuantity`.
    Reject,
}

impl OverReceiptPolicy {
    /// Resolve a requested received quantity against the sent quantity.
    pub fn resolve(self, requested: i64, sent: i64) -> DomainResult<i64> {
        if requested < 0 {
            return Err(DomainError::invalid_quantity(format!(
                "received quantity cannot be negative (got {requested})"
            )));
        }
        if requested <= sent {
            return Ok(requested);
        }
        match self {
            OverReceiptPolicy::Clamp => Ok(sent),
            OverReceiptPolicy::Reject => Err(DomainError::invalid_quantity(format!(
                "received quantity {requested} exceeds sent quantity {sent}"
            ))),
        }
    }
}
