use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use duka_core::{DomainError, DomainResult, RecordId};

/// Threshold applied when a product does not set its own.
pub const DEFAULT_LOW_STOCK_LEVEL: i64 = 7;

fn default_low_stock_level() -> i64 {
    DEFAULT_LOW_STOCK_LEVEL
}

/// Stock classification derived from quantity and threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StockLevel {
    InStock,
    LowStock,
    OutOfStock,
}

impl StockLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockLevel::InStock => "in-stock",
            StockLevel::LowStock => "low-stock",
            StockLevel::OutOfStock => "out-of-stock",
        }
    }
}

/// A product as stored locally and mirrored remotely.
///
/// `synced` and `last_synced_at` are local bookkeeping: they are never
/// serialized into push bodies, and they default when deserializing remote
/// rows (which do not carry them).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: RecordId,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    /// Price in smallest currency unit (e.g., cents).
    pub buying_price: i64,
    /// Price in smallest currency unit (e.g., cents).
    pub selling_price: i64,
    pub quantity: i64,
    #[serde(default = "default_low_stock_level")]
    pub low_stock_level: i64,
    /// Local file path before upload, public URL after.
    #[serde(default)]
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing)]
    pub synced: bool,
    #[serde(default, skip_serializing)]
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl ProductRecord {
    /// Check field invariants: non-empty name, non-negative money and stock.
    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("product name must not be empty"));
        }
        if self.buying_price < 0 {
            return Err(DomainError::validation("buying_price must not be negative"));
        }
        if self.selling_price < 0 {
            return Err(DomainError::validation("selling_price must not be negative"));
        }
        if self.quantity < 0 {
            return Err(DomainError::validation("quantity must not be negative"));
        }
        if self.low_stock_level < 0 {
            return Err(DomainError::validation(
                "low_stock_level must not be negative",
            ));
        }
        Ok(())
    }

    /// Classify current stock against the low-stock threshold.
    ///
    /// Zero is always out-of-stock, even when the threshold itself is zero.
    pub fn stock_level(&self) -> StockLevel {
        if self.quantity <= 0 {
            StockLevel::OutOfStock
        } else if self.quantity <= self.low_stock_level {
            StockLevel::LowStock
        } else {
            StockLevel::InStock
        }
    }
}
