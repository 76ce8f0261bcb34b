//! Read-only identity collaborators (branches, users, products).
//!
//! Shipments only keep ids plus display snapshots taken at creation time, so
//! later edits to a directory record never rewrite shipment history.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use stocktransfer_core::{BranchId, ProductId, UserId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("unknown branch {0}")]
    UnknownBranch(BranchId),

    #[error("unknown user {0}")]
    UnknownUser(UserId),

    #[error("unknown product {0}")]
    UnknownProduct(ProductId),

    #[error("directory storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRecord {
    pub id: BranchId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: ProductId,
    pub name: String,
    /// Catalog price in minor currency units.
    pub price: u64,
    /// Default reorder threshold carried onto shipped lines.
    pub buyback_threshold: Option<u64>,
}

pub trait BranchDirectory: Send + Sync {
    fn branch(&self, id: BranchId) -> Result<BranchRecord, DirectoryError>;
}

pub trait UserDirectory: Send + Sync {
    fn user(&self, id: UserId) -> Result<UserRecord, DirectoryError>;
}

pub trait ProductDirectory: Send + Sync {
    fn product(&self, id: ProductId) -> Result<ProductRecord, DirectoryError>;
}

impl<D: BranchDirectory + ?Sized> BranchDirectory for Arc<D> {
    fn branch(&self, id: BranchId) -> Result<BranchRecord, DirectoryError> {
        (**self).branch(id)
    }
}

impl<D: UserDirectory + ?Sized> UserDirectory for Arc<D> {
    fn user(&self, id: UserId) -> Result<UserRecord, DirectoryError> {
        (**self).user(id)
    }
}

impl<D: ProductDirectory + ?Sized> ProductDirectory for Arc<D> {
    fn product(&self, id: ProductId) -> Result<ProductRecord, DirectoryError> {
        (**self).product(id)
    }
}

#[derive(Debug, Default)]
struct DirectoryState {
    branches: HashMap<BranchId, BranchRecord>,
    users: HashMap<UserId, UserRecord>,
    products: HashMap<ProductId, ProductRecord>,
}

/// In-memory directory serving all three lookups (tests/dev).
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    state: RwLock<DirectoryState>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_branch(&self, name: impl Into<String>) -> Result<BranchId, DirectoryError> {
        let id = BranchId::new();
        self.write()?.branches.insert(
            id,
            BranchRecord {
                id,
                name: name.into(),
            },
        );
        Ok(id)
    }

    pub fn add_user(&self, username: impl Into<String>) -> Result<UserId, DirectoryError> {
        let id = UserId::new();
        self.write()?.users.insert(
            id,
            UserRecord {
                id,
                username: username.into(),
            },
        );
        Ok(id)
    }

    pub fn add_product(
        &self,
        name: impl Into<String>,
        price: u64,
        buyback_threshold: Option<u64>,
    ) -> Result<ProductId, DirectoryError> {
        let id = ProductId::new();
        self.upsert_product(ProductRecord {
            id,
            name: name.into(),
            price,
            buyback_threshold,
        })?;
        Ok(id)
    }

    /// Insert or replace a product record (e.g. a catalog price change).
    pub fn upsert_product(&self, record: ProductRecord) -> Result<(), DirectoryError> {
        self.write()?.products.insert(record.id, record);
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, DirectoryState>, DirectoryError> {
        self.state
            .read()
            .map_err(|_| DirectoryError::Storage("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, DirectoryState>, DirectoryError> {
        self.state
            .write()
            .map_err(|_| DirectoryError::Storage("lock poisoned".to_string()))
    }
}

impl BranchDirectory for InMemoryDirectory {
    fn branch(&self, id: BranchId) -> Result<BranchRecord, DirectoryError> {
        self.read()?
            .branches
            .get(&id)
            .cloned()
            .ok_or(DirectoryError::UnknownBranch(id))
    }
}

impl UserDirectory for InMemoryDirectory {
    fn user(&self, id: UserId) -> Result<UserRecord, DirectoryError> {
        self.read()?
            .users
            .get(&id)
            .cloned()
            .ok_or(DirectoryError::UnknownUser(id))
    }
}

impl ProductDirectory for InMemoryDirectory {
    fn product(&self, id: ProductId) -> Result<ProductRecord, DirectoryError> {
        self.read()?
            .products
            .get(&id)
            .cloned()
            .ok_or(DirectoryError::UnknownProduct(id))
    }
}
