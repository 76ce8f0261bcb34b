use serde::{Deserialize, Serialize};

use stocktransfer_core::BranchId;
use stocktransfer_transfers::{Shipment, ShipmentStatus};

/// Shipment selection criteria. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentFilter {
    pub origin: Option<BranchId>,
    pub destination: Option<BranchId>,
    /// Empty means any status.
    pub statuses: Vec<ShipmentStatus>,
    /// Case-insensitive free text over the sequential number, branch names
    /// and sender username.
    pub search: Option<String>,
}

impl ShipmentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_origin(mut self, origin: BranchId) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn with_destination(mut self, destination: BranchId) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn with_statuses(mut self, statuses: &[ShipmentStatus]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    pub fn with_search(mut self, search: Option<&str>) -> Self {
        self.search = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        self
    }

    pub fn matches(&self, shipment: &Shipment) -> bool {
        if !shipment.is_created() {
            return false;
        }
        if self.origin.is_some() && shipment.origin_id() != self.origin {
            return false;
        }
        if self.destination.is_some() && shipment.destination_id() != self.destination {
            return false;
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&shipment.status()) {
            return false;
        }
        match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(needle) => Self::matches_text(shipment, &needle.to_lowercase()),
        }
    }

    fn matches_text(shipment: &Shipment, needle: &str) -> bool {
        if shipment.number().to_string().contains(needle) {
            return true;
        }
        let names = [
            shipment.origin().map(|b| b.name.as_str()),
            shipment.destination().map(|b| b.name.as_str()),
            shipment.sender().map(|u| u.username.as_str()),
        ];
        names
            .into_iter()
            .flatten()
            .any(|name| name.to_lowercase().contains(needle))
    }
}
