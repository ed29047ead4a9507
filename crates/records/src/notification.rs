use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use duka_core::{DomainError, RecordId};

/// Kind of an in-app notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    LowStock,
    WeeklyReport,
    MonthlyReport,
    Info,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::LowStock => "low-stock",
            NotificationKind::WeeklyReport => "weekly-report",
            NotificationKind::MonthlyReport => "monthly-report",
            NotificationKind::Info => "info",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low-stock" => Ok(NotificationKind::LowStock),
            "weekly-report" => Ok(NotificationKind::WeeklyReport),
            "monthly-report" => Ok(NotificationKind::MonthlyReport),
            "info" => Ok(NotificationKind::Info),
            other => Err(DomainError::validation(format!(
                "unknown notification kind '{other}'"
            ))),
        }
    }
}

/// An in-app notification, synchronized like any other record.
///
/// Clearing is an update (`cleared = true`), not a delete, so the history
/// survives and other devices converge on the same state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: RecordId,
    pub kind: NotificationKind,
    pub message: String,
    /// Product that triggered the notification, when there is one.
    #[serde(default)]
    pub product_id: Option<RecordId>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub cleared: bool,
    #[serde(default, skip_serializing)]
    pub synced: bool,
    #[serde(default, skip_serializing)]
    pub last_synced_at: Option<DateTime<Utc>>,
}
