//! Push: replay the mutation queue against the remote backend.
//!
//! A push is three passes over the pending queue. First every queued
//! insert that still targets a placeholder gets a server id, persisted
//! into its payload so the id survives failed cycles. Second, reference
//! fields pointing at those placeholders are rewritten, both in queued
//! payloads and in stored rows. Third, the queue is sent in creation
//! order, with updates and deletes translated through the same mapping.

use std::collections::HashSet;

use chrono::Utc;
use tracing::{debug, warn};

use duka_core::{Collection, Operation, RecordId};
use duka_records::{Mutation, MutationPayload, MutationStatus};
use duka_remote::{RemoteBackend, RemoteError};
use duka_store::{Store, StoreError};

use crate::error::SyncResult;
use crate::remap::{REFERENCES, RemapTable};

/// What a push accomplished.
#[derive(Debug, Default)]
pub(crate) struct PushOutcome {
    /// Mutations accepted by the backend.
    pub pushed: usize,
    /// Mutations whose send failed, counted against their retry budget.
    pub failed: usize,
    /// Mutations deferred to a later cycle or settled as orphans.
    pub skipped: usize,
    /// False when the backend tables are not provisioned yet.
    pub schema_ready: bool,
    /// Ids assigned to placeholders, for the post-push fixup.
    pub remap: RemapTable,
}

/// How one mutation fared.
enum Applied {
    /// Accepted by the backend and marked synced.
    Sent,
    /// Left pending for a later cycle, no attempt burned.
    Deferred,
    /// Settled without a send; nothing remote to act on.
    Dropped,
    /// Send failed and the failure was recorded.
    Failed,
    /// The remote table vanished mid-push; stop the cycle.
    SchemaLost,
}

/// Drain the pending mutation queue.
pub(crate) async fn push_pending(
    store: &Store,
    remote: &dyn RemoteBackend,
) -> SyncResult<PushOutcome> {
    // A missing table means the backend project exists but its schema was
    // never applied. The queue must survive that untouched, so probe once
    // up front instead of burning an attempt per mutation.
    if let Err(err) = remote.probe(Collection::Products).await {
        return match err {
            RemoteError::RelationNotFound => {
                warn!("remote schema not provisioned, keeping mutations queued");
                Ok(PushOutcome::default())
            }
            err => Err(err.into()),
        };
    }

    let mut outcome = PushOutcome {
        schema_ready: true,
        ..PushOutcome::default()
    };

    let mut pending = store.list_pending_mutations().await?;
    if pending.is_empty() {
        return Ok(outcome);
    }
    debug!(count = pending.len(), "pushing pending mutations");

    let mut remap = RemapTable::new();
    assign_ids(store, &mut pending, &mut remap).await?;
    rewrite_queued_references(store, &mut pending, &remap).await?;
    apply(store, remote, &pending, &remap, &mut outcome).await?;
    outcome.remap = remap;

    let cleared = store.clear_synced_mutations().await?;
    if cleared > 0 {
        debug!(cleared, "dropped confirmed mutations from the queue");
    }

    Ok(outcome)
}

/// Assign a server id to every queued insert that still targets a
/// placeholder. The id is written into the queued payload, so a failed
/// or interrupted cycle resumes with the same id instead of minting a
/// fresh one.
async fn assign_ids(
    store: &Store,
    pending: &mut [Mutation],
    remap: &mut RemapTable,
) -> SyncResult<()> {
    for mutation in pending.iter_mut() {
        if mutation.op != Operation::Insert || !mutation.record_id.is_placeholder() {
            continue;
        }

        let assigned = match mutation.payload.record_id() {
            // An earlier cycle already assigned one; keep it.
            Some(id) if !id.is_placeholder() => id.clone(),
            _ => {
                let fresh = RecordId::new();
                mutation.payload.set_record_id(fresh.clone());
                store
                    .update_mutation_payload(&mutation.id, &mutation.payload)
                    .await?;
                fresh
            }
        };

        debug!(placeholder = %mutation.record_id, %assigned, "assigned server id");
        remap.insert(mutation.collection, mutation.record_id.clone(), assigned);
    }

    Ok(())
}

/// Point queued payloads and stored rows that reference a placeholder at
/// its assigned id. Runs before anything is sent, so the backend never
/// sees a placeholder in a reference field.
async fn rewrite_queued_references(
    store: &Store,
    pending: &mut [Mutation],
    remap: &RemapTable,
) -> SyncResult<()> {
    if remap.is_empty() {
        return Ok(());
    }

    for &(child, field, parent) in REFERENCES {
        let pairs: Vec<(RecordId, RecordId)> = remap
            .for_collection(parent)
            .map(|(old, new)| (old.clone(), new.clone()))
            .collect();

        for (old, new) in pairs {
            let rewritten = store.rewrite_reference(child, field, &old, &new).await?;
            if rewritten > 0 {
                debug!(%child, field, rows = rewritten, "rewrote stored references");
            }

            for mutation in pending.iter_mut() {
                if mutation.collection == child && mutation.payload.reference(field) == Some(&old) {
                    mutation.payload.set_reference(field, new.clone());
                    store
                        .update_mutation_payload(&mutation.id, &mutation.payload)
                        .await?;
                }
            }
        }
    }

    Ok(())
}

/// Send the queue in creation order.
async fn apply(
    store: &Store,
    remote: &dyn RemoteBackend,
    pending: &[Mutation],
    remap: &RemapTable,
    outcome: &mut PushOutcome,
) -> SyncResult<()> {
    // Placeholders whose insert was accepted in this cycle. Updates and
    // deletes behind a placeholder are only sent once this records it.
    let mut landed: HashSet<RecordId> = HashSet::new();

    let mut i = 0;
    while i < pending.len() {
        let mutation = &pending[i];

        let applied = match mutation.op {
            Operation::Delete => {
                match apply_delete_run(store, remote, pending, i, remap, &landed, outcome).await? {
                    Some(next) => {
                        i = next;
                        continue;
                    }
                    None => Applied::SchemaLost,
                }
            }
            Operation::Insert => apply_insert(store, remote, mutation, remap, &mut landed).await?,
            Operation::Update => apply_update(store, remote, mutation, remap, &landed).await?,
        };

        match applied {
            Applied::Sent => outcome.pushed += 1,
            Applied::Deferred | Applied::Dropped => outcome.skipped += 1,
            Applied::Failed => outcome.failed += 1,
            Applied::SchemaLost => {
                warn!("remote schema disappeared mid-push, stopping early");
                return Ok(());
            }
        }

        i += 1;
    }

    Ok(())
}

async fn apply_insert(
    store: &Store,
    remote: &dyn RemoteBackend,
    mutation: &Mutation,
    remap: &RemapTable,
    landed: &mut HashSet<RecordId>,
) -> SyncResult<Applied> {
    // The body is the live row when it still exists, so a push carries
    // edits made after the create was queued.
    let mut body = match store
        .record_payload(mutation.collection, &mutation.record_id)
        .await?
    {
        Some(live) => live,
        None => mutation.payload.clone(),
    };

    let target = match remap.get(mutation.collection, &mutation.record_id) {
        Some(assigned) => assigned.clone(),
        // Not a placeholder; send under the id it already carries.
        None => mutation.record_id.clone(),
    };
    body.set_record_id(target.clone());

    // A row created moments after its parent may reference a placeholder
    // whose own insert did not land this cycle. Sending it would hand the
    // backend a reference to a record it does not have.
    if references_unlanded_parent(&body, mutation.collection, remap, landed) {
        debug!(mutation = %mutation.id, "parent insert has not landed, deferring");
        return Ok(Applied::Deferred);
    }

    let Some(row) = body.to_body().map_err(StoreError::from)? else {
        warn!(mutation = %mutation.id, "insert with an empty payload, settling");
        store.mark_mutation_synced(&mutation.id).await?;
        return Ok(Applied::Dropped);
    };

    match remote.insert(mutation.collection, &row).await {
        Ok(()) => {
            if mutation.record_id.is_placeholder() {
                store
                    .reidentify(mutation.collection, &mutation.record_id, &target)
                    .await?;
                let moved = store
                    .retarget_pending_mutations(mutation.collection, &mutation.record_id, &target)
                    .await?;
                if moved > 0 {
                    debug!(moved, "retargeted queued mutations to the assigned id");
                }
                landed.insert(mutation.record_id.clone());
            } else {
                store
                    .mark_record_synced(mutation.collection, &target, Utc::now())
                    .await?;
            }
            store.mark_mutation_synced(&mutation.id).await?;
            Ok(Applied::Sent)
        }
        Err(err) => note_failure(store, mutation, &err).await,
    }
}

async fn apply_update(
    store: &Store,
    remote: &dyn RemoteBackend,
    mutation: &Mutation,
    remap: &RemapTable,
    landed: &HashSet<RecordId>,
) -> SyncResult<Applied> {
    let target = match resolve_target(store, mutation, remap, landed).await? {
        Resolved::Id(id) => id,
        Resolved::Deferred => return Ok(Applied::Deferred),
        Resolved::Orphaned => return Ok(Applied::Dropped),
    };

    let mut body = mutation.payload.clone();
    body.set_record_id(target.clone());
    let Some(row) = body.to_body().map_err(StoreError::from)? else {
        warn!(mutation = %mutation.id, "update with an empty payload, settling");
        store.mark_mutation_synced(&mutation.id).await?;
        return Ok(Applied::Dropped);
    };

    match remote.update(mutation.collection, &target, &row).await {
        Ok(()) => {
            store
                .mark_record_synced(mutation.collection, &target, Utc::now())
                .await?;
            store.mark_mutation_synced(&mutation.id).await?;
            Ok(Applied::Sent)
        }
        Err(err) => note_failure(store, mutation, &err).await,
    }
}

/// Send a run of adjacent deletes against one collection as a single
/// round trip. Returns the index after the run, or `None` when the
/// remote schema vanished and the cycle should stop.
async fn apply_delete_run(
    store: &Store,
    remote: &dyn RemoteBackend,
    pending: &[Mutation],
    start: usize,
    remap: &RemapTable,
    landed: &HashSet<RecordId>,
    outcome: &mut PushOutcome,
) -> SyncResult<Option<usize>> {
    let collection = pending[start].collection;
    let mut end = start;
    while end < pending.len()
        && pending[end].op == Operation::Delete
        && pending[end].collection == collection
    {
        end += 1;
    }

    let mut batch: Vec<(&Mutation, RecordId)> = Vec::new();
    for mutation in &pending[start..end] {
        match resolve_target(store, mutation, remap, landed).await? {
            Resolved::Id(id) => batch.push((mutation, id)),
            Resolved::Deferred | Resolved::Orphaned => outcome.skipped += 1,
        }
    }

    if batch.is_empty() {
        return Ok(Some(end));
    }

    let sent = if let [(_, id)] = batch.as_slice() {
        remote.delete(collection, id).await
    } else {
        let ids: Vec<RecordId> = batch.iter().map(|(_, id)| id.clone()).collect();
        remote.delete_many(collection, &ids).await
    };

    match sent {
        Ok(()) => {
            for (mutation, _) in &batch {
                store.mark_mutation_synced(&mutation.id).await?;
            }
            if batch.len() > 1 {
                debug!(%collection, count = batch.len(), "batched adjacent deletes");
            }
            outcome.pushed += batch.len();
        }
        // Leave the whole run pending with no attempt burned; the next
        // cycle's preflight sorts out whether the schema is coming back.
        Err(RemoteError::RelationNotFound) => return Ok(None),
        Err(err) => {
            for (mutation, _) in &batch {
                note_failure(store, mutation, &err).await?;
                outcome.failed += 1;
            }
        }
    }

    Ok(Some(end))
}

enum Resolved {
    Id(RecordId),
    Deferred,
    Orphaned,
}

/// Translate a mutation's target through the remap when it is still a
/// placeholder.
async fn resolve_target(
    store: &Store,
    mutation: &Mutation,
    remap: &RemapTable,
    landed: &HashSet<RecordId>,
) -> SyncResult<Resolved> {
    if !mutation.record_id.is_placeholder() {
        return Ok(Resolved::Id(mutation.record_id.clone()));
    }

    match remap.get(mutation.collection, &mutation.record_id) {
        Some(assigned) if landed.contains(&mutation.record_id) => Ok(Resolved::Id(assigned.clone())),
        // The insert is queued but did not land this cycle; everything
        // behind it waits with it.
        Some(_) => Ok(Resolved::Deferred),
        // No queued insert will ever create this record remotely, so
        // there is nothing to update or delete. Settle the mutation
        // instead of retrying it forever.
        None => {
            warn!(
                mutation = %mutation.id,
                record = %mutation.record_id,
                "no insert queued for placeholder, settling mutation"
            );
            store.mark_mutation_synced(&mutation.id).await?;
            Ok(Resolved::Orphaned)
        }
    }
}

/// True when a reference field of `body` points at a record whose own
/// insert has not been accepted yet.
fn references_unlanded_parent(
    body: &MutationPayload,
    collection: Collection,
    remap: &RemapTable,
    landed: &HashSet<RecordId>,
) -> bool {
    REFERENCES.iter().any(|&(child, field, parent)| {
        child == collection
            && body
                .reference(field)
                .and_then(|target| remap.placeholder_for(parent, target))
                .is_some_and(|placeholder| !landed.contains(placeholder))
    })
}

/// Record a failed send against the mutation's retry budget.
async fn note_failure(
    store: &Store,
    mutation: &Mutation,
    err: &RemoteError,
) -> SyncResult<Applied> {
    if matches!(err, RemoteError::RelationNotFound) {
        return Ok(Applied::SchemaLost);
    }

    if err.is_transient() {
        let status = store
            .bump_mutation_attempts(&mutation.id, &err.to_string())
            .await?;
        if status == MutationStatus::Failed {
            warn!(mutation = %mutation.id, error = %err, "mutation exhausted its retries");
        } else {
            debug!(mutation = %mutation.id, error = %err, "send failed, will retry");
        }
    } else {
        warn!(mutation = %mutation.id, error = %err, "send rejected, not retrying");
        store
            .mark_mutation_failed(&mutation.id, &err.to_string())
            .await?;
    }

    Ok(Applied::Failed)
}
