//! Collection and operation vocabulary shared by the queue and the engine.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// A synchronized collection (one local table mirroring one remote table).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Products,
    Sales,
    Notifications,
    Settings,
}

impl Collection {
    /// Every synchronized collection, in pull order.
    pub const ALL: [Collection; 4] = [
        Collection::Products,
        Collection::Sales,
        Collection::Notifications,
        Collection::Settings,
    ];

    /// Table name, identical locally and remotely.
    pub fn as_table(&self) -> &'static str {
        match self {
            Collection::Products => "products",
            Collection::Sales => "sales",
            Collection::Notifications => "notifications",
            Collection::Settings => "settings",
        }
    }

    /// Singular form, embedded in placeholder identifiers.
    pub fn singular(&self) -> &'static str {
        match self {
            Collection::Products => "product",
            Collection::Sales => "sale",
            Collection::Notifications => "notification",
            Collection::Settings => "setting",
        }
    }
}

impl core::fmt::Display for Collection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_table())
    }
}

impl FromStr for Collection {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "products" => Ok(Collection::Products),
            "sales" => Ok(Collection::Sales),
            "notifications" => Ok(Collection::Notifications),
            "settings" => Ok(Collection::Settings),
            other => Err(DomainError::validation(format!(
                "unknown collection '{other}'"
            ))),
        }
    }
}

/// Kind of write captured by a queued mutation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl core::fmt::Display for Operation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "insert" => Ok(Operation::Insert),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            other => Err(DomainError::validation(format!(
                "unknown operation '{other}'"
            ))),
        }
    }
}
