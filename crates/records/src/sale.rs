use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use duka_core::{DomainError, DomainResult, RecordId};

/// A sale as stored locally and mirrored remotely.
///
/// Sales are immutable after creation with one exception: `product_id` is
/// rewritten at most once, when the referenced product trades its
/// placeholder identifier for a server UUID. `product_name` is a snapshot
/// taken at sale time so the sale stays displayable after the product is
/// renamed or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub id: RecordId,
    #[serde(default)]
    pub product_id: Option<RecordId>,
    pub product_name: String,
    pub quantity: i64,
    /// Selling price per unit at sale time, in smallest currency unit.
    pub unit_price: i64,
    /// `unit_price * quantity`, computed once at sale time and never
    /// recomputed from later price changes.
    pub total_price: i64,
    pub sale_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing)]
    pub synced: bool,
    #[serde(default, skip_serializing)]
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl SaleRecord {
    /// Check field invariants: a positive quantity and non-negative money.
    pub fn validate(&self) -> DomainResult<()> {
        if self.quantity <= 0 {
            return Err(DomainError::validation("sale quantity must be positive"));
        }
        if self.unit_price < 0 {
            return Err(DomainError::validation("unit_price must not be negative"));
        }
        if self.total_price < 0 {
            return Err(DomainError::validation("total_price must not be negative"));
        }
        Ok(())
    }

    /// Profit realised by this sale given the product's buying price.
    ///
    /// Uses the locked-in `total_price`, so the margin reflects the prices
    /// in effect when the sale happened.
    pub fn profit(&self, buying_price: i64) -> i64 {
        self.total_price - buying_price * self.quantity
    }
}
