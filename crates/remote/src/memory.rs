//! In-memory implementation of the remote seam.
//!
//! Behaves like a small PostgREST project: inserts upsert on id, updates
//! merge fields into the stored row and silently skip missing rows, and
//! deletes are idempotent. Tests flip it offline, deprovision it, or
//! inject per-call faults to exercise the engine's failure paths.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use duka_core::{Collection, RecordId};

use crate::backend::RemoteBackend;
use crate::error::{RemoteError, RemoteResult};

/// One kind of backend call, for fault targeting and the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Select,
    Insert,
    Update,
    Delete,
    DeleteMany,
    Probe,
}

impl Call {
    fn as_str(&self) -> &'static str {
        match self {
            Call::Select => "select",
            Call::Insert => "insert",
            Call::Update => "update",
            Call::Delete => "delete",
            Call::DeleteMany => "delete_many",
            Call::Probe => "probe",
        }
    }
}

/// Fault injected into a matching call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Timeout,
    Network,
    RelationNotFound,
    Api(u16),
}

impl Fault {
    fn to_error(self) -> RemoteError {
        match self {
            Fault::Timeout => RemoteError::Timeout,
            Fault::Network => RemoteError::Network("injected network failure".to_string()),
            Fault::RelationNotFound => RemoteError::RelationNotFound,
            Fault::Api(status) => RemoteError::Api(status, "injected API failure".to_string()),
        }
    }
}

#[derive(Debug)]
struct InjectedFault {
    collection: Collection,
    call: Call,
    fault: Fault,
    remaining: usize,
}

#[derive(Debug)]
struct Inner {
    online: bool,
    provisioned: bool,
    tables: HashMap<Collection, BTreeMap<String, Value>>,
    faults: Vec<InjectedFault>,
    calls: Vec<String>,
}

/// In-memory [`RemoteBackend`].
#[derive(Debug)]
pub struct InMemoryBackend {
    inner: Mutex<Inner>,
}

impl InMemoryBackend {
    /// A reachable, provisioned, empty backend.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                online: true,
                provisioned: true,
                tables: HashMap::new(),
                faults: Vec::new(),
                calls: Vec::new(),
            }),
        }
    }

    /// Offline backends fail every call with a network error and report
    /// themselves unreachable.
    pub async fn set_online(&self, online: bool) {
        self.inner.lock().await.online = online;
    }

    /// Unprovisioned backends answer every table call with
    /// [`RemoteError::RelationNotFound`], like a project whose schema
    /// has not been created yet.
    pub async fn set_provisioned(&self, provisioned: bool) {
        self.inner.lock().await.provisioned = provisioned;
    }

    /// Fail the next matching call with `fault`.
    pub async fn fail_next(&self, collection: Collection, call: Call, fault: Fault) {
        self.fail_times(collection, call, fault, 1).await;
    }

    /// Fail the next `times` matching calls with `fault`.
    pub async fn fail_times(&self, collection: Collection, call: Call, fault: Fault, times: usize) {
        self.inner.lock().await.faults.push(InjectedFault {
            collection,
            call,
            fault,
            remaining: times,
        });
    }

    /// Place a row directly into a table, bypassing checks and the log.
    pub async fn seed(&self, collection: Collection, row: Value) -> RemoteResult<()> {
        let id = row_id(&row)?;
        self.inner
            .lock()
            .await
            .tables
            .entry(collection)
            .or_default()
            .insert(id, row);
        Ok(())
    }

    /// Current rows of a table, in id order.
    pub async fn rows(&self, collection: Collection) -> Vec<Value> {
        self.inner
            .lock()
            .await
            .tables
            .get(&collection)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default()
    }

    /// A single row by id.
    pub async fn row(&self, collection: Collection, id: &str) -> Option<Value> {
        self.inner
            .lock()
            .await
            .tables
            .get(&collection)
            .and_then(|table| table.get(id))
            .cloned()
    }

    /// Every table call made so far, as `"<call> <collection>"` entries.
    pub async fn calls(&self) -> Vec<String> {
        self.inner.lock().await.calls.clone()
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    /// Record the call, then apply offline / fault / provisioning rules.
    fn admit(&mut self, collection: Collection, call: Call) -> RemoteResult<()> {
        self.calls.push(format!("{} {collection}", call.as_str()));

        if !self.online {
            return Err(RemoteError::Network("backend offline".to_string()));
        }

        if let Some(index) = self
            .faults
            .iter()
            .position(|f| f.collection == collection && f.call == call && f.remaining > 0)
        {
            self.faults[index].remaining -= 1;
            let fault = self.faults[index].fault;
            if self.faults[index].remaining == 0 {
                self.faults.remove(index);
            }
            return Err(fault.to_error());
        }

        if !self.provisioned {
            return Err(RemoteError::RelationNotFound);
        }

        Ok(())
    }
}

fn row_id(row: &Value) -> RemoteResult<String> {
    row.get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RemoteError::Parse("row has no string id".to_string()))
}

#[async_trait]
impl RemoteBackend for InMemoryBackend {
    async fn select_all(&self, collection: Collection) -> RemoteResult<Vec<Value>> {
        let mut inner = self.inner.lock().await;
        inner.admit(collection, Call::Select)?;

        Ok(inner
            .tables
            .get(&collection)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn insert(&self, collection: Collection, row: &Value) -> RemoteResult<()> {
        let mut inner = self.inner.lock().await;
        inner.admit(collection, Call::Insert)?;

        let id = row_id(row)?;
        inner
            .tables
            .entry(collection)
            .or_default()
            .insert(id, row.clone());
        Ok(())
    }

    async fn update(&self, collection: Collection, id: &RecordId, row: &Value) -> RemoteResult<()> {
        let mut inner = self.inner.lock().await;
        inner.admit(collection, Call::Update)?;

        // PATCH semantics: merge fields into the stored row; a missing
        // row is a silent no-op, exactly like PostgREST with a filter
        // that matches nothing.
        if let Some(table) = inner.tables.get_mut(&collection) {
            if let (Some(Value::Object(existing)), Some(patch)) =
                (table.get_mut(id.as_str()), row.as_object())
            {
                for (field, value) in patch {
                    existing.insert(field.clone(), value.clone());
                }
            }
        }
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &RecordId) -> RemoteResult<()> {
        let mut inner = self.inner.lock().await;
        inner.admit(collection, Call::Delete)?;

        if let Some(table) = inner.tables.get_mut(&collection) {
            table.remove(id.as_str());
        }
        Ok(())
    }

    async fn delete_many(&self, collection: Collection, ids: &[RecordId]) -> RemoteResult<()> {
        let mut inner = self.inner.lock().await;
        inner.admit(collection, Call::DeleteMany)?;

        if let Some(table) = inner.tables.get_mut(&collection) {
            for id in ids {
                table.remove(id.as_str());
            }
        }
        Ok(())
    }

    async fn probe(&self, collection: Collection) -> RemoteResult<()> {
        self.inner.lock().await.admit(collection, Call::Probe)
    }

    async fn reachable(&self) -> bool {
        self.inner.lock().await.online
    }
}
