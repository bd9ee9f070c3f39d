/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! "Friendly" public api for using syncstore: one handle per replica, typed
//! arguments and results. The JSON-value rendition of the same surface is in
//! `boundary.rs`.
//!
//! Every mutating call holds the write guard for its full duration, so a
//! call either completes fully or (on error) leaves no observable change.
//! Reads take the read guard and may run alongside each other, never
//! alongside a write. Returned values are always owned copies.

use crate::clock::Hlc;
use crate::error::*;
use crate::op::Operation;
use crate::schema::Schema;
use crate::snapshot::{self, Snapshot};
use crate::storage::{ApplyResult, Origin, PendingEntry, PendingLog, Record, RecordStore};
use crate::sync::{self, MergeStrategy, ReconcileResult};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use types::MsTime;

pub struct SyncEngine {
    state: RwLock<EngineState>,
}

struct EngineState {
    schema: Schema,
    node_id: String,
    clock: Hlc,
    store: RecordStore,
    pending: PendingLog,
    op_seq: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineMetadata {
    pub node_id: String,
    pub clock: Hlc,
    pub pending_count: usize,
    pub record_count: usize,
}

impl SyncEngine {
    pub fn new(schema_json: impl AsRef<str>, node_id: impl Into<String>) -> Result<Self> {
        let schema = Schema::from_json_str(schema_json.as_ref())?;
        Self::with_schema(schema, node_id)
    }

    pub fn with_schema(schema: Schema, node_id: impl Into<String>) -> Result<Self> {
        let node_id = node_id.into();
        ensure!(
            !node_id.is_empty(),
            Error::Malformed("node id may not be empty".into())
        );
        log::debug!("new engine for node {:?}", node_id);
        Ok(SyncEngine {
            state: RwLock::new(EngineState {
                schema,
                clock: Hlc::new(node_id.clone()),
                node_id,
                store: RecordStore::default(),
                pending: PendingLog::default(),
                op_seq: 0,
            }),
        })
    }

    /// Applies one locally-issued operation and queues it as pending.
    /// `now_ms` is the host's wall clock, recorded on the pending entry.
    pub fn apply(&self, op: Operation, now_ms: i64) -> Result<ApplyResult> {
        let mut guard = self.state.write().unwrap();
        let state = &mut *guard;
        let result = state.store.apply(&state.schema, &op, Origin::Local)?;
        state.pending.push(op, MsTime(now_ms));
        Ok(result)
    }

    /// Looks up one record, tombstones included.
    pub fn get(&self, collection: &str, id: &str) -> Result<Option<Record>> {
        let state = self.state.read().unwrap();
        state.schema.collection(collection)?;
        Ok(state.store.get(collection, id).cloned())
    }

    /// Whether a live (non-tombstoned) record exists.
    pub fn exists(&self, collection: &str, id: &str) -> Result<bool> {
        Ok(self.get(collection, id)?.map_or(false, |r| !r.deleted))
    }

    /// All records of a collection, ordered by record id ascending.
    pub fn query(&self, collection: &str, include_deleted: bool) -> Result<Vec<Record>> {
        let state = self.state.read().unwrap();
        state.schema.collection(collection)?;
        Ok(state.store.query(collection, include_deleted))
    }

    pub fn pending_count(&self) -> usize {
        self.state.read().unwrap().pending.count()
    }

    pub fn pending_ops(&self) -> Vec<PendingEntry> {
        self.state.read().unwrap().pending.list().to_vec()
    }

    /// Drops acknowledged ops from the pending queue. Unknown ids are
    /// ignored; records are untouched. Returns how many entries were
    /// dropped.
    pub fn acknowledge(&self, op_ids: &[String]) -> usize {
        let removed = self.state.write().unwrap().pending.acknowledge(op_ids);
        log::debug!("acknowledged {} of {} ops", removed, op_ids.len());
        removed
    }

    /// Advances the clock for a local event and returns the new value.
    pub fn tick(&self) -> Hlc {
        self.state.write().unwrap().clock.tick()
    }

    /// Allocates an op id in the `<node>_<ms>_<seq>` shape for hosts that
    /// don't mint their own.
    pub fn new_op_id(&self, now_ms: i64) -> String {
        let mut state = self.state.write().unwrap();
        state.op_seq += 1;
        format!("{}_{}_{}", state.node_id, now_ms, state.op_seq)
    }

    /// Merges a batch of remote operations. Per-op problems land in the
    /// result's rejected lists; the call itself only fails if an internal
    /// invariant trips, in which case the whole batch is rolled back.
    pub fn reconcile(
        &self,
        batch: Vec<Operation>,
        strategy: MergeStrategy,
    ) -> Result<ReconcileResult> {
        let mut guard = self.state.write().unwrap();
        let state = &mut *guard;
        log::debug!(
            "reconciling {} remote ops with {:?}",
            batch.len(),
            strategy
        );
        sync::reconcile(
            &state.schema,
            &mut state.clock,
            &mut state.store,
            &mut state.pending,
            batch,
            strategy,
        )
    }

    /// A deep-copied, self-contained dump of the engine's entire state.
    pub fn export(&self) -> Snapshot {
        let state = self.state.read().unwrap();
        Snapshot {
            format_version: snapshot::FORMAT_VERSION,
            schema: state.schema.clone(),
            node_id: state.node_id.clone(),
            clock: state.clock.clone(),
            records: state.store.clone(),
            pending: state.pending.clone(),
        }
    }

    /// Replaces the engine's state with a previously exported snapshot.
    /// Nothing changes unless the format version checks out.
    pub fn import(&self, snapshot: Snapshot) -> Result<()> {
        snapshot.check_format()?;
        let mut state = self.state.write().unwrap();
        state.schema = snapshot.schema;
        state.node_id = snapshot.node_id;
        state.clock = snapshot.clock;
        state.store = snapshot.records;
        state.pending = snapshot.pending;
        state.op_seq = 0;
        log::debug!("imported snapshot for node {:?}", state.node_id);
        Ok(())
    }

    pub fn metadata(&self) -> EngineMetadata {
        let state = self.state.read().unwrap();
        EngineMetadata {
            node_id: state.node_id.clone(),
            clock: state.clock.clone(),
            pending_count: state.pending.count(),
            record_count: state.store.record_count(),
        }
    }

    pub fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    pub fn snapshot_format_version(&self) -> u32 {
        snapshot::FORMAT_VERSION
    }
}
