use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use duka_core::{DomainError, DomainResult, RecordId};

/// A key/value application setting.
///
/// The value is free-form JSON; callers own its schema. Settings are
/// addressed by `key` in the application and by `id` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingRecord {
    pub id: RecordId,
    pub key: String,
    pub value: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing)]
    pub synced: bool,
    #[serde(default, skip_serializing)]
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl SettingRecord {
    pub fn validate(&self) -> DomainResult<()> {
        if self.key.trim().is_empty() {
            return Err(DomainError::validation("setting key must not be empty"));
        }
        Ok(())
    }
}
