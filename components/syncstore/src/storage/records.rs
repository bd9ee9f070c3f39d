/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The materialized record state: one `Record` per `(collection, id)`,
//! including tombstones. Deleted records are never physically removed; they
//! keep their clock and stay visible to the reconciler (and to queries that
//! ask for them) so that late-arriving writes resolve the same way on every
//! replica.
//!
//! Both maps are BTreeMaps on purpose: iteration order is the canonical
//! (lexicographic) order, which is what `query` promises and what makes
//! snapshot exports byte-identical across replicas.

use crate::clock::Hlc;
use crate::error::*;
use crate::op::Operation;
use crate::schema::Schema;
use crate::JsonObject;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use types::MsTime;

/// Which side of the sync boundary produced the mutation that a record
/// currently reflects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Local,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    pub created_at: MsTime,
    pub updated_at: MsTime,
    pub origin: Origin,
    pub clock: Hlc,
    /// The id of the operation that produced this record state. The winning
    /// op is the same on every replica, so this stays deterministic.
    pub last_op_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    pub collection: String,
    pub version: u64,
    pub payload: JsonObject,
    pub metadata: RecordMetadata,
    pub deleted: bool,
}

impl Record {
    /// Reconstructs the operation that produced this record state, for
    /// conflict reporting when the original op is no longer in the pending
    /// log. A create that resurrected a tombstone reads back as an update
    /// (the version gives it away); nothing downstream depends on the kind.
    pub(crate) fn to_operation(&self) -> Operation {
        let md = &self.metadata;
        if self.deleted {
            Operation::Delete {
                op_id: md.last_op_id.clone(),
                id: self.id.clone(),
                collection: self.collection.clone(),
                base_version: self.version.saturating_sub(1),
                timestamp: md.updated_at,
                clock: md.clock.clone(),
            }
        } else if self.version == 1 {
            Operation::Create {
                op_id: md.last_op_id.clone(),
                id: self.id.clone(),
                collection: self.collection.clone(),
                payload: self.payload.clone(),
                timestamp: md.updated_at,
                clock: md.clock.clone(),
            }
        } else {
            Operation::Update {
                op_id: md.last_op_id.clone(),
                id: self.id.clone(),
                collection: self.collection.clone(),
                payload: self.payload.clone(),
                base_version: self.version - 1,
                timestamp: md.updated_at,
                clock: md.clock.clone(),
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordStore {
    collections: BTreeMap<String, BTreeMap<String, Record>>,
}

/// What `apply` hands back to the caller on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyResult {
    pub op_id: String,
    pub record_id: String,
    pub version: u64,
}

impl RecordStore {
    pub fn get(&self, collection: &str, id: &str) -> Option<&Record> {
        self.collections.get(collection)?.get(id)
    }

    /// All records of a collection, tombstones optional, ordered by record
    /// id ascending.
    pub fn query(&self, collection: &str, include_deleted: bool) -> Vec<Record> {
        match self.collections.get(collection) {
            Some(records) => records
                .values()
                .filter(|r| include_deleted || !r.deleted)
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn record_count(&self) -> usize {
        self.collections.values().map(|c| c.len()).sum()
    }

    /// Puts a record, returning whatever was there before. The reconciler
    /// uses the prior value for its rollback journal.
    pub(crate) fn insert(&mut self, record: Record) -> Option<Record> {
        self.collections
            .entry(record.collection.clone())
            .or_default()
            .insert(record.id.clone(), record)
    }

    /// Restores a journaled prior state (`None` removes the record again).
    pub(crate) fn restore(&mut self, collection: &str, id: &str, prior: Option<Record>) {
        match prior {
            Some(r) => {
                self.insert(r);
            }
            None => {
                if let Some(coll) = self.collections.get_mut(collection) {
                    coll.remove(id);
                    if coll.is_empty() {
                        self.collections.remove(collection);
                    }
                }
            }
        }
    }

    /// Applies one operation under the full rule set: schema validation,
    /// existence checks, and (for locally-issued updates and deletes) the
    /// base-version check. Nothing is mutated unless every check passes.
    pub fn apply(&mut self, schema: &Schema, op: &Operation, origin: Origin) -> Result<ApplyResult> {
        match op.payload() {
            Some(payload) => schema.validate(op.collection(), payload)?,
            // Deletes carry no payload; only the collection must be known.
            None => {
                schema.collection(op.collection())?;
            }
        }

        let current = self.get(op.collection(), op.record_id());
        match op {
            Operation::Create { .. } => {
                if let Some(r) = current {
                    if !r.deleted {
                        throw!(Error::AlreadyExists);
                    }
                }
            }
            Operation::Update { .. } | Operation::Delete { .. } => match current {
                None => throw!(Error::NotFound),
                Some(r) if r.deleted => throw!(Error::NotFound),
                Some(r) => {
                    if origin == Origin::Local {
                        let expected = op.base_version().unwrap_or_default();
                        if expected != r.version {
                            throw!(Error::VersionMismatch {
                                expected,
                                actual: r.version,
                            });
                        }
                    }
                }
            },
        }

        let next = next_record(current, op, origin);
        let result = ApplyResult {
            op_id: op.op_id().to_owned(),
            record_id: next.id.clone(),
            version: next.version,
        };
        log::trace!(
            "applied {} {} on {}/{} -> v{}",
            op.kind_name(),
            op.op_id(),
            op.collection(),
            op.record_id(),
            next.version
        );
        self.insert(next);
        Ok(result)
    }
}

/// Builds the record state that follows `prev` under `op`. The caller has
/// already decided the op wins; this only encodes the construction rules:
/// version bumps by one, deletes keep the last known payload, creation time
/// survives resurrection.
pub(crate) fn next_record(prev: Option<&Record>, op: &Operation, origin: Origin) -> Record {
    let version = prev.map(|r| r.version).unwrap_or(0) + 1;
    let created_at = prev.map(|r| r.metadata.created_at).unwrap_or(op.timestamp());
    let payload = match op.payload() {
        Some(p) => p.clone(),
        None => prev.map(|r| r.payload.clone()).unwrap_or_default(),
    };
    Record {
        id: op.record_id().to_owned(),
        collection: op.collection().to_owned(),
        version,
        payload,
        metadata: RecordMetadata {
            created_at,
            updated_at: op.timestamp(),
            origin,
            clock: op.clock().clone(),
            last_op_id: op.op_id().to_owned(),
        },
        deleted: op.is_delete(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::from_json_value(&json!({
            "version": 1,
            "collections": {
                "todos": {"fields": [{"name": "title", "type": "string", "required": true}]}
            }
        }))
        .unwrap()
    }

    fn clock(node: &str, counter: u64) -> Hlc {
        Hlc {
            node_id: node.into(),
            counter,
        }
    }

    fn create(op_id: &str, id: &str, title: &str, ts: i64, c: Hlc) -> Operation {
        Operation::Create {
            op_id: op_id.into(),
            id: id.into(),
            collection: "todos".into(),
            payload: json!({ "title": title }).as_object().unwrap().clone(),
            timestamp: MsTime(ts),
            clock: c,
        }
    }

    fn update(op_id: &str, id: &str, title: &str, base: u64, ts: i64, c: Hlc) -> Operation {
        Operation::Update {
            op_id: op_id.into(),
            id: id.into(),
            collection: "todos".into(),
            payload: json!({ "title": title }).as_object().unwrap().clone(),
            base_version: base,
            timestamp: MsTime(ts),
            clock: c,
        }
    }

    fn delete(op_id: &str, id: &str, base: u64, ts: i64, c: Hlc) -> Operation {
        Operation::Delete {
            op_id: op_id.into(),
            id: id.into(),
            collection: "todos".into(),
            base_version: base,
            timestamp: MsTime(ts),
            clock: c,
        }
    }

    #[test]
    fn test_create_update_delete_lifecycle() {
        let s = schema();
        let mut store = RecordStore::default();

        let r = store
            .apply(&s, &create("a1", "r1", "x", 1000, clock("a", 1)), Origin::Local)
            .unwrap();
        assert_eq!(r.version, 1);

        let r = store
            .apply(&s, &update("a2", "r1", "y", 1, 2000, clock("a", 2)), Origin::Local)
            .unwrap();
        assert_eq!(r.version, 2);

        let rec = store.get("todos", "r1").unwrap();
        assert_eq!(rec.payload["title"], "y");
        assert_eq!(rec.metadata.created_at, MsTime(1000));
        assert_eq!(rec.metadata.updated_at, MsTime(2000));
        assert_eq!(rec.metadata.last_op_id, "a2");

        let r = store
            .apply(&s, &delete("a3", "r1", 2, 3000, clock("a", 3)), Origin::Local)
            .unwrap();
        assert_eq!(r.version, 3);
        let rec = store.get("todos", "r1").unwrap();
        assert!(rec.deleted);
        // The tombstone keeps the last known payload.
        assert_eq!(rec.payload["title"], "y");
    }

    #[test]
    fn test_create_on_live_record_fails() {
        let s = schema();
        let mut store = RecordStore::default();
        store
            .apply(&s, &create("a1", "r1", "x", 1000, clock("a", 1)), Origin::Local)
            .unwrap();
        let err = store
            .apply(&s, &create("a2", "r1", "x", 2000, clock("a", 2)), Origin::Local)
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists));
    }

    #[test]
    fn test_create_resurrects_tombstone() {
        let s = schema();
        let mut store = RecordStore::default();
        store
            .apply(&s, &create("a1", "r1", "x", 1000, clock("a", 1)), Origin::Local)
            .unwrap();
        store
            .apply(&s, &delete("a2", "r1", 1, 2000, clock("a", 2)), Origin::Local)
            .unwrap();
        let r = store
            .apply(&s, &create("a3", "r1", "again", 3000, clock("a", 3)), Origin::Local)
            .unwrap();
        assert_eq!(r.version, 3);
        let rec = store.get("todos", "r1").unwrap();
        assert!(!rec.deleted);
        assert_eq!(rec.payload["title"], "again");
        // Creation time survives the resurrection.
        assert_eq!(rec.metadata.created_at, MsTime(1000));
    }

    #[test]
    fn test_update_missing_or_tombstoned_fails() {
        let s = schema();
        let mut store = RecordStore::default();
        let err = store
            .apply(&s, &update("a1", "r1", "x", 1, 1000, clock("a", 1)), Origin::Local)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound));

        store
            .apply(&s, &create("a2", "r1", "x", 1000, clock("a", 2)), Origin::Local)
            .unwrap();
        store
            .apply(&s, &delete("a3", "r1", 1, 2000, clock("a", 3)), Origin::Local)
            .unwrap();
        let err = store
            .apply(&s, &update("a4", "r1", "y", 2, 3000, clock("a", 4)), Origin::Local)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound));
    }

    #[test]
    fn test_local_base_version_enforced() {
        let s = schema();
        let mut store = RecordStore::default();
        store
            .apply(&s, &create("a1", "r1", "x", 1000, clock("a", 1)), Origin::Local)
            .unwrap();
        let err = store
            .apply(&s, &update("a2", "r1", "y", 5, 2000, clock("a", 2)), Origin::Local)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::VersionMismatch {
                expected: 5,
                actual: 1
            }
        ));
        // Remote ops only carry base_version as a hint.
        store
            .apply(&s, &update("b1", "r1", "z", 5, 2000, clock("b", 2)), Origin::Remote)
            .unwrap();
    }

    #[test]
    fn test_failed_apply_leaves_no_trace() {
        let s = schema();
        let mut store = RecordStore::default();
        let bad = Operation::Create {
            op_id: "a1".into(),
            id: "r1".into(),
            collection: "todos".into(),
            payload: json!({}).as_object().unwrap().clone(),
            timestamp: MsTime(1000),
            clock: clock("a", 1),
        };
        assert!(store.apply(&s, &bad, Origin::Local).is_err());
        assert!(store.get("todos", "r1").is_none());
        assert_eq!(store.record_count(), 0);
    }

    #[test]
    fn test_query_order_and_tombstone_filter() {
        let s = schema();
        let mut store = RecordStore::default();
        for (op, id) in [("a1", "r2"), ("a2", "r10"), ("a3", "r1")] {
            store
                .apply(&s, &create(op, id, "x", 1000, clock("a", 1)), Origin::Local)
                .unwrap();
        }
        store
            .apply(&s, &delete("a4", "r10", 1, 2000, clock("a", 2)), Origin::Local)
            .unwrap();

        let live: Vec<_> = store
            .query("todos", false)
            .into_iter()
            .map(|r| r.id)
            .collect();
        // Lexicographic, not numeric: "r10" sorts before "r2".
        assert_eq!(live, vec!["r1", "r2"]);

        let all: Vec<_> = store
            .query("todos", true)
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(all, vec!["r1", "r10", "r2"]);
        assert_eq!(store.record_count(), 3);
    }
}
