/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Merges a batch of remote operations into the record store and prunes the
//! pending log. The batch is unordered on the wire; we group it by record
//! and replay each group in ascending merge-key order, so the strongest op
//! lands last and every replica walks the same path.
//!
//! Per-op problems never fail the call: the offending op is recorded in
//! `rejectedRemote` with its reason and the batch continues. A defensive
//! invariant breach rolls the whole batch back through the journal below.

use super::{Conflict, MergeStrategy, ReconcileResult, RejectedOp, Resolution};
use crate::clock::Hlc;
use crate::error::*;
use crate::op::{Operation, RejectReason};
use crate::schema::Schema;
use crate::storage::records::next_record;
use crate::storage::{Origin, PendingLog, Record, RecordStore};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Undo state for one batch. Records journal their first-touch prior value;
/// the pending log and clock are small enough to snapshot wholesale.
struct Journal {
    records: Vec<(String, String, Option<Record>)>,
    pending: PendingLog,
    clock: Hlc,
}

impl Journal {
    fn new(pending: &PendingLog, clock: &Hlc) -> Self {
        Journal {
            records: Vec::new(),
            pending: pending.clone(),
            clock: clock.clone(),
        }
    }

    fn touched(&mut self, collection: &str, id: &str, prior: Option<Record>) {
        if !self
            .records
            .iter()
            .any(|(c, i, _)| c == collection && i == id)
        {
            self.records
                .push((collection.to_owned(), id.to_owned(), prior));
        }
    }

    fn rollback(self, store: &mut RecordStore, pending: &mut PendingLog, clock: &mut Hlc) {
        for (collection, id, prior) in self.records.into_iter().rev() {
            store.restore(&collection, &id, prior);
        }
        *pending = self.pending;
        *clock = self.clock;
    }
}

pub(crate) fn reconcile(
    schema: &Schema,
    clock: &mut Hlc,
    store: &mut RecordStore,
    pending: &mut PendingLog,
    batch: Vec<Operation>,
    strategy: MergeStrategy,
) -> Result<ReconcileResult> {
    let mut journal = Journal::new(pending, clock);
    match run_batch(schema, clock, store, pending, batch, strategy, &mut journal) {
        Ok(result) => Ok(result),
        Err(e) => {
            log::error!("reconcile failed, rolling back the batch: {}", e);
            journal.rollback(store, pending, clock);
            Err(e)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_batch(
    schema: &Schema,
    clock: &mut Hlc,
    store: &mut RecordStore,
    pending: &mut PendingLog,
    batch: Vec<Operation>,
    strategy: MergeStrategy,
    journal: &mut Journal,
) -> Result<ReconcileResult> {
    let mut result = ReconcileResult::default();

    // Schema-check everything up front. An op that fails never observes the
    // clock and never touches state.
    let mut valid = Vec::with_capacity(batch.len());
    for op in batch {
        let check = match op.payload() {
            Some(payload) => schema.validate(op.collection(), payload),
            None => schema.collection(op.collection()).map(|_| ()),
        };
        match check {
            Ok(()) => valid.push(op),
            Err(e) => {
                log::warn!("rejecting remote op {}: {}", op.op_id(), e);
                result.rejected_remote.push(RejectedOp {
                    op_id: op.op_id().to_owned(),
                    reason: RejectReason::Malformed,
                });
            }
        }
    }

    for op in &valid {
        clock.observe(op.clock());
    }

    let mut groups: BTreeMap<(String, String), Vec<Operation>> = BTreeMap::new();
    for op in valid {
        groups
            .entry((op.collection().to_owned(), op.record_id().to_owned()))
            .or_default()
            .push(op);
    }

    for ((collection, id), mut ops) in groups {
        // Ascending, so the strongest-winning op is applied last. The sort
        // is stable; an exact replay inside one batch stays behind its
        // original and gets flagged as a duplicate.
        ops.sort_by(|a, b| {
            strategy.cmp_keys((a.timestamp(), a.clock()), (b.timestamp(), b.clock()))
        });
        for op in ops {
            apply_remote(
                strategy,
                store,
                pending,
                journal,
                &collection,
                &id,
                op,
                &mut result,
            )?;
        }
    }

    // Defensive: every surviving pending op must still name a record the
    // store knows about (pending ⊆ applied).
    for entry in pending.iter() {
        let op = &entry.operation;
        ensure!(
            store.get(op.collection(), op.record_id()).is_some(),
            Error::Internal(format!("pending op {} names a missing record", op.op_id()))
        );
    }

    result.accepted_local = pending
        .iter()
        .map(|e| e.operation.op_id().to_owned())
        .collect();
    result.accepted_local.sort();
    result.rejected_local.sort();
    result.applied_remote.sort();
    result.rejected_remote.sort_by(|a, b| a.op_id.cmp(&b.op_id));
    result.conflicts.sort_by(|a, b| {
        (
            a.remote_op.collection(),
            a.remote_op.record_id(),
            a.winner_op_id.as_str(),
        )
            .cmp(&(
                b.remote_op.collection(),
                b.remote_op.record_id(),
                b.winner_op_id.as_str(),
            ))
    });
    Ok(result)
}

#[allow(clippy::too_many_arguments)]
fn apply_remote(
    strategy: MergeStrategy,
    store: &mut RecordStore,
    pending: &mut PendingLog,
    journal: &mut Journal,
    collection: &str,
    id: &str,
    op: Operation,
    result: &mut ReconcileResult,
) -> Result<()> {
    let current = store.get(collection, id).cloned();
    let Some(cur) = current else {
        // Nothing here yet: creates materialize the record, anything else
        // targets a record this replica has never seen.
        if matches!(op, Operation::Create { .. }) {
            log::debug!("remote create {} materializes {}/{}", op.op_id(), collection, id);
            let rec = next_record(None, &op, Origin::Remote);
            let prior = store.insert(rec);
            journal.touched(collection, id, prior);
            result.applied_remote.push(op.op_id().to_owned());
        } else {
            log::debug!("orphan remote {} {} for {}/{}", op.kind_name(), op.op_id(), collection, id);
            result.rejected_remote.push(RejectedOp {
                op_id: op.op_id().to_owned(),
                reason: RejectReason::OrphanOp,
            });
        }
        return Ok(());
    };

    let op_key = (op.timestamp(), op.clock());
    let cur_key = (cur.metadata.updated_at, &cur.metadata.clock);
    match strategy.cmp_keys(op_key, cur_key) {
        Ordering::Equal => {
            // Same merge key, same logical write: a replay.
            result.rejected_remote.push(RejectedOp {
                op_id: op.op_id().to_owned(),
                reason: RejectReason::Duplicate,
            });
        }
        Ordering::Less => {
            log::debug!(
                "remote {} {} at {} is stale against {}/{} (held by {} at {})",
                op.kind_name(),
                op.op_id(),
                op.clock(),
                collection,
                id,
                cur.metadata.last_op_id,
                cur.metadata.clock
            );
            result.rejected_remote.push(RejectedOp {
                op_id: op.op_id().to_owned(),
                reason: RejectReason::Stale,
            });
            // Losing to a write from another replica is a conflict worth
            // reporting; losing to your own later write is just lag.
            if op.clock().node_id != cur.metadata.clock.node_id {
                let local_op = pending
                    .iter()
                    .find(|e| e.operation.op_id() == cur.metadata.last_op_id)
                    .map(|e| e.operation.clone())
                    .unwrap_or_else(|| cur.to_operation());
                result.conflicts.push(Conflict {
                    local_op,
                    remote_op: op,
                    resolution: Resolution::LocalWins,
                    winner_op_id: cur.metadata.last_op_id.clone(),
                });
            }
        }
        Ordering::Greater => {
            ensure!(
                cur.version < u64::MAX,
                Error::Internal(format!("version overflow on {}/{}", collection, id))
            );
            // The remote op dominates whatever we have, whether it applies
            // cleanly or resurrects a tombstone. Local pending ops it
            // overwrites are pruned; the one that owned the record state is
            // the conflict's losing side. Pending ops on other records are
            // untouched.
            let overwritten = pending.remove_for_record(collection, id, |pop| {
                strategy.cmp_keys((pop.timestamp(), pop.clock()), op_key) == Ordering::Less
            });
            for loser in &overwritten {
                log::debug!(
                    "local pending {} on {}/{} lost to remote {}",
                    loser.operation.op_id(),
                    collection,
                    id,
                    op.op_id()
                );
                result.rejected_local.push(loser.operation.op_id().to_owned());
            }
            if let Some(owner) = overwritten
                .iter()
                .find(|e| e.operation.op_id() == cur.metadata.last_op_id)
            {
                result.conflicts.push(Conflict {
                    local_op: owner.operation.clone(),
                    remote_op: op.clone(),
                    resolution: Resolution::RemoteWins,
                    winner_op_id: op.op_id().to_owned(),
                });
            }
            let rec = next_record(Some(&cur), &op, Origin::Remote);
            let prior = store.insert(rec);
            journal.touched(collection, id, prior);
            result.applied_remote.push(op.op_id().to_owned());
        }
    }
    Ok(())
}
