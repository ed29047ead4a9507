use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use duka_core::{ClientId, Collection, DomainError, DomainResult, MutationId, Operation, RecordId};

use crate::notification::NotificationRecord;
use crate::product::ProductRecord;
use crate::sale::SaleRecord;
use crate::setting::SettingRecord;

/// Failed push attempts after which a mutation stops being retried
/// automatically and must be reset by an operator.
pub const MAX_SYNC_ATTEMPTS: u32 = 5;

/// Status of a queued mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationStatus {
    Pending,
    Synced,
    Failed,
}

impl MutationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationStatus::Pending => "pending",
            MutationStatus::Synced => "synced",
            MutationStatus::Failed => "failed",
        }
    }
}

impl FromStr for MutationStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MutationStatus::Pending),
            "synced" => Ok(MutationStatus::Synced),
            "failed" => Ok(MutationStatus::Failed),
            other => Err(DomainError::validation(format!(
                "unknown mutation status '{other}'"
            ))),
        }
    }
}

/// Typed payload carried by a queued mutation.
///
/// Tagged by record kind so a payload cannot be replayed against the wrong
/// table. The record travels under its own key rather than inline, so
/// record fields (a notification's `kind`) cannot collide with the tag.
/// Deletes carry no record body; the target travels in the mutation's
/// `record_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "lowercase")]
pub enum MutationPayload {
    Product(ProductRecord),
    Sale(SaleRecord),
    Notification(NotificationRecord),
    Setting(SettingRecord),
    Delete,
}

impl MutationPayload {
    /// True when this payload is legal for the given collection/operation.
    pub fn matches(&self, collection: Collection, op: Operation) -> bool {
        match (op, self) {
            (Operation::Delete, MutationPayload::Delete) => true,
            (Operation::Delete, _) | (_, MutationPayload::Delete) => false,
            (_, MutationPayload::Product(_)) => collection == Collection::Products,
            (_, MutationPayload::Sale(_)) => collection == Collection::Sales,
            (_, MutationPayload::Notification(_)) => collection == Collection::Notifications,
            (_, MutationPayload::Setting(_)) => collection == Collection::Settings,
        }
    }

    /// Identifier of the record embedded in this payload, if any.
    pub fn record_id(&self) -> Option<&RecordId> {
        match self {
            MutationPayload::Product(r) => Some(&r.id),
            MutationPayload::Sale(r) => Some(&r.id),
            MutationPayload::Notification(r) => Some(&r.id),
            MutationPayload::Setting(r) => Some(&r.id),
            MutationPayload::Delete => None,
        }
    }

    /// Re-key the embedded record. No-op for deletes.
    pub fn set_record_id(&mut self, id: RecordId) {
        match self {
            MutationPayload::Product(r) => r.id = id,
            MutationPayload::Sale(r) => r.id = id,
            MutationPayload::Notification(r) => r.id = id,
            MutationPayload::Setting(r) => r.id = id,
            MutationPayload::Delete => {}
        }
    }

    /// Foreign-key reference carried by this payload under `field`, if any.
    pub fn reference(&self, field: &str) -> Option<&RecordId> {
        match (self, field) {
            (MutationPayload::Sale(sale), "product_id") => sale.product_id.as_ref(),
            (MutationPayload::Notification(n), "product_id") => n.product_id.as_ref(),
            _ => None,
        }
    }

    /// Point the `field` reference at `id`.
    ///
    /// Returns false when this payload carries no such field.
    pub fn set_reference(&mut self, field: &str, id: RecordId) -> bool {
        match (self, field) {
            (MutationPayload::Sale(sale), "product_id") => {
                sale.product_id = Some(id);
                true
            }
            (MutationPayload::Notification(n), "product_id") => {
                n.product_id = Some(id);
                true
            }
            _ => false,
        }
    }

    /// Wire body for pushing this payload: the bare record object, without
    /// the payload tag and without local bookkeeping fields. `None` for
    /// deletes.
    pub fn to_body(&self) -> Result<Option<Value>, serde_json::Error> {
        Ok(match self {
            MutationPayload::Product(r) => Some(serde_json::to_value(r)?),
            MutationPayload::Sale(r) => Some(serde_json::to_value(r)?),
            MutationPayload::Notification(r) => Some(serde_json::to_value(r)?),
            MutationPayload::Setting(r) => Some(serde_json::to_value(r)?),
            MutationPayload::Delete => None,
        })
    }
}

/// A write intent, captured durably until the remote backend confirms it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    pub id: MutationId,
    pub client_id: ClientId,
    pub collection: Collection,
    pub op: Operation,
    /// Target record. May be a placeholder until the record's first push.
    pub record_id: RecordId,
    pub payload: MutationPayload,
    pub created_at: DateTime<Utc>,
    pub status: MutationStatus,
    /// Failed push attempts so far.
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl Mutation {
    /// Build a pending mutation, validating the payload against the
    /// collection and operation.
    pub fn new(
        client_id: ClientId,
        collection: Collection,
        op: Operation,
        record_id: RecordId,
        payload: MutationPayload,
    ) -> DomainResult<Self> {
        if !payload.matches(collection, op) {
            return Err(DomainError::invariant(format!(
                "payload does not match {op} on {collection}"
            )));
        }
        if let Some(embedded) = payload.record_id() {
            if *embedded != record_id {
                return Err(DomainError::invariant(
                    "payload record id differs from mutation target",
                ));
            }
        }
        Ok(Self {
            id: MutationId::new(),
            client_id,
            collection,
            op,
            record_id,
            payload,
            created_at: Utc::now(),
            status: MutationStatus::Pending,
            attempts: 0,
            last_error: None,
        })
    }
}
