//! Service-level error model.

use thiserror::Error;

use stocktransfer_core::DomainError;

use crate::directory::DirectoryError;
use crate::repository::RepositoryError;
use crate::stock_ledger::StockLedgerError;

/// Coarse error taxonomy callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad input; rejected without any state change.
    Validation,
    /// The caller's workflow asked for something the item/shipment state forbids.
    Policy,
    /// Stale version; refetch and retry.
    Conflict,
    NotFound,
    /// A collaborator (stock ledger, storage) failed; state is unchanged.
    Collaborator,
}

/// Error returned by every service command and query.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Stock(#[from] StockLedgerError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl TransferError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            TransferError::Domain(err) => match err {
                DomainError::Validation(_)
                | DomainError::InvalidQuantity(_)
                | DomainError::InvalidId(_) => ErrorCategory::Validation,
                DomainError::InvariantViolation(_)
                | DomainError::ItemFrozen(_)
                | DomainError::AlreadyReturned(_) => ErrorCategory::Policy,
                DomainError::NotFound => ErrorCategory::NotFound,
                DomainError::Conflict(_) => ErrorCategory::Conflict,
            },
            TransferError::Stock(_) => ErrorCategory::Collaborator,
            TransferError::Repository(err) => match err {
                RepositoryError::NotFound => ErrorCategory::NotFound,
                RepositoryError::Conflict(_) | RepositoryError::Duplicate(_) => {
                    ErrorCategory::Conflict
                }
                RepositoryError::Storage(_) => ErrorCategory::Collaborator,
            },
            TransferError::Directory(err) => match err {
                DirectoryError::UnknownBranch(_) | DirectoryError::UnknownUser(_) => {
                    ErrorCategory::NotFound
                }
                // An unresolvable product reference is bad input to CreateShipment.
                DirectoryError::UnknownProduct(_) => ErrorCategory::Validation,
                DirectoryError::Storage(_) => ErrorCategory::Collaborator,
            },
            TransferError::Config(_) => ErrorCategory::Validation,
        }
    }

    /// Whether retrying the same command (after a refetch for conflicts) can
    /// succeed.
    pub fn is_retriable(&self) -> bool {
        match self {
            TransferError::Repository(RepositoryError::Duplicate(_)) => false,
            other => matches!(
                other.category(),
                ErrorCategory::Conflict | ErrorCategory::Collaborator
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stocktransfer_core::{BranchId, ProductId};

    #[test]
    fn domain_errors_map_to_the_taxonomy() {
        let cases = [
            (DomainError::validation("x"), ErrorCategory::Validation),
            (DomainError::invalid_quantity("x"), ErrorCategory::Validation),
            (DomainError::item_frozen("x"), ErrorCategory::Policy),
            (DomainError::already_returned("x"), ErrorCategory::Policy),
            (DomainError::conflict("x"), ErrorCategory::Conflict),
            (DomainError::not_found(), ErrorCategory::NotFound),
        ];
        for (err, expected) in cases {
            assert_eq!(TransferError::from(err).category(), expected);
        }
    }

    #[test]
    fn collaborator_failures_and_conflicts_are_retriable() {
        let insufficient = TransferError::from(StockLedgerError::InsufficientStock {
            branch_id: BranchId::new(),
            product_id: ProductId::new(),
            requested: 2,
            available: 1,
        });
        assert_eq!(insufficient.category(), ErrorCategory::Collaborator);
        assert!(insufficient.is_retriable());

        assert!(TransferError::from(RepositoryError::Conflict("stale".into())).is_retriable());
        assert!(!TransferError::from(RepositoryError::Duplicate("id".into())).is_retriable());
        assert!(!TransferError::from(DomainError::item_frozen("x")).is_retriable());
    }

    #[test]
    fn unknown_product_is_a_validation_failure() {
        let err = TransferError::from(DirectoryError::UnknownProduct(ProductId::new()));
        assert_eq!(err.category(), ErrorCategory::Validation);
    }
}
