/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The wire-neutral host surface: the same functions as [`SyncEngine`], but
//! over JSON-shaped values. Each input is decoded exactly once and each
//! output encoded exactly once; a call either succeeds fully or has no
//! observable effect. Platform glue (C ABI, handle maps, dynamic loading)
//! lives with the host, not here.

use crate::engine::SyncEngine;
use crate::error::*;
use crate::op::{Operation, RejectReason};
use crate::schema::Schema;
use crate::snapshot::{self, Snapshot};
use crate::sync::{MergeStrategy, RejectedOp};
use serde::Serialize;
use serde_json::Value as JsonValue;

fn encode<T: Serialize>(value: &T) -> Result<JsonValue> {
    serde_json::to_value(value).map_err(|e| Error::Internal(format!("encoding failed: {}", e)))
}

pub fn new_engine(schema: &JsonValue, node_id: &str) -> Result<SyncEngine> {
    let schema = Schema::from_json_value(schema)?;
    SyncEngine::with_schema(schema, node_id)
}

pub fn apply(engine: &SyncEngine, op: &JsonValue, now_ms: i64) -> Result<JsonValue> {
    let op: Operation = serde_json::from_value(op.clone())?;
    encode(&engine.apply(op, now_ms)?)
}

/// The record as a JSON value, or `null` when it doesn't exist.
pub fn get(engine: &SyncEngine, collection: &str, id: &str) -> Result<JsonValue> {
    match engine.get(collection, id)? {
        Some(record) => encode(&record),
        None => Ok(JsonValue::Null),
    }
}

pub fn query(engine: &SyncEngine, collection: &str, include_deleted: bool) -> Result<JsonValue> {
    encode(&engine.query(collection, include_deleted)?)
}

pub fn pending_count(engine: &SyncEngine) -> usize {
    engine.pending_count()
}

pub fn pending_ops(engine: &SyncEngine) -> Result<JsonValue> {
    encode(&engine.pending_ops())
}

pub fn acknowledge(engine: &SyncEngine, op_ids: &JsonValue) -> Result<()> {
    let ids: Vec<String> = serde_json::from_value(op_ids.clone())?;
    engine.acknowledge(&ids);
    Ok(())
}

pub fn tick(engine: &SyncEngine) -> Result<JsonValue> {
    encode(&engine.tick())
}

/// Decodes and reconciles a remote batch. Ops that don't decode are
/// rejected as malformed (keyed by their `opId` when one is present) and
/// cause no side effects; the rest of the batch proceeds.
pub fn reconcile(
    engine: &SyncEngine,
    remote_ops: &JsonValue,
    strategy: &JsonValue,
) -> Result<JsonValue> {
    let strategy: MergeStrategy = serde_json::from_value(strategy.clone())?;
    let JsonValue::Array(raw_ops) = remote_ops else {
        throw!(Error::Malformed("remote ops must be an array".into()));
    };

    let mut batch = Vec::with_capacity(raw_ops.len());
    let mut undecodable = Vec::new();
    for raw in raw_ops {
        match serde_json::from_value::<Operation>(raw.clone()) {
            Ok(op) => batch.push(op),
            Err(e) => {
                let op_id = raw
                    .get("opId")
                    .and_then(JsonValue::as_str)
                    .unwrap_or_default()
                    .to_owned();
                log::warn!("undecodable remote op {:?}: {}", op_id, e);
                undecodable.push(RejectedOp {
                    op_id,
                    reason: RejectReason::Malformed,
                });
            }
        }
    }

    let mut result = engine.reconcile(batch, strategy)?;
    if !undecodable.is_empty() {
        result.rejected_remote.extend(undecodable);
        result.rejected_remote.sort_by(|a, b| a.op_id.cmp(&b.op_id));
    }
    encode(&result)
}

pub fn export(engine: &SyncEngine) -> Result<JsonValue> {
    encode(&engine.export())
}

pub fn import(engine: &SyncEngine, snapshot: &JsonValue) -> Result<()> {
    // Check the declared version before attempting a full decode, so a
    // snapshot from a future format reports UnsupportedFormat rather than a
    // decoding error.
    if let Some(v) = snapshot.get("formatVersion").and_then(JsonValue::as_u64) {
        if v != u64::from(snapshot::FORMAT_VERSION) {
            throw!(Error::UnsupportedFormat(v as u32));
        }
    }
    let snapshot: Snapshot = serde_json::from_value(snapshot.clone())?;
    engine.import(snapshot)
}

pub fn metadata(engine: &SyncEngine) -> Result<JsonValue> {
    encode(&engine.metadata())
}

pub fn version(engine: &SyncEngine) -> &'static str {
    engine.version()
}

pub fn snapshot_format_version(engine: &SyncEngine) -> u32 {
    engine.snapshot_format_version()
}
