/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The operation model: an immutable description of an intended mutation,
//! identified by a globally unique op id. Operations replace whole payloads;
//! there are no partial-field merges.

use crate::clock::Hlc;
use crate::JsonObject;
use serde::{Deserialize, Serialize};
use types::MsTime;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Operation {
    #[serde(rename_all = "camelCase")]
    Create {
        op_id: String,
        id: String,
        collection: String,
        payload: JsonObject,
        timestamp: MsTime,
        clock: Hlc,
    },
    #[serde(rename_all = "camelCase")]
    Update {
        op_id: String,
        id: String,
        collection: String,
        payload: JsonObject,
        base_version: u64,
        timestamp: MsTime,
        clock: Hlc,
    },
    #[serde(rename_all = "camelCase")]
    Delete {
        op_id: String,
        id: String,
        collection: String,
        base_version: u64,
        timestamp: MsTime,
        clock: Hlc,
    },
}

impl Operation {
    pub fn op_id(&self) -> &str {
        match self {
            Operation::Create { op_id, .. }
            | Operation::Update { op_id, .. }
            | Operation::Delete { op_id, .. } => op_id,
        }
    }

    pub fn record_id(&self) -> &str {
        match self {
            Operation::Create { id, .. }
            | Operation::Update { id, .. }
            | Operation::Delete { id, .. } => id,
        }
    }

    pub fn collection(&self) -> &str {
        match self {
            Operation::Create { collection, .. }
            | Operation::Update { collection, .. }
            | Operation::Delete { collection, .. } => collection,
        }
    }

    pub fn timestamp(&self) -> MsTime {
        match self {
            Operation::Create { timestamp, .. }
            | Operation::Update { timestamp, .. }
            | Operation::Delete { timestamp, .. } => *timestamp,
        }
    }

    pub fn clock(&self) -> &Hlc {
        match self {
            Operation::Create { clock, .. }
            | Operation::Update { clock, .. }
            | Operation::Delete { clock, .. } => clock,
        }
    }

    /// The version the issuer observed before mutating. Informational for
    /// remote ops; enforced for local updates and deletes.
    pub fn base_version(&self) -> Option<u64> {
        match self {
            Operation::Create { .. } => None,
            Operation::Update { base_version, .. }
            | Operation::Delete { base_version, .. } => Some(*base_version),
        }
    }

    /// The payload the operation carries. Deletes carry none; the store
    /// keeps the last known payload on the tombstone.
    pub fn payload(&self) -> Option<&JsonObject> {
        match self {
            Operation::Create { payload, .. } | Operation::Update { payload, .. } => Some(payload),
            Operation::Delete { .. } => None,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Operation::Delete { .. })
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Operation::Create { .. } => "create",
            Operation::Update { .. } => "update",
            Operation::Delete { .. } => "delete",
        }
    }
}

/// Why a remote operation was refused during reconciliation. Serialized
/// verbatim into `rejectedRemote` entries; never a call-level error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// The op could not be decoded or failed schema validation.
    Malformed,
    /// The op lost to the record's current state under the merge strategy.
    Stale,
    /// The op's merge key equals the record's current one: a replay.
    Duplicate,
    /// An update or delete for a record this replica has never seen.
    OrphanOp,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn clock(node: &str, counter: u64) -> Hlc {
        Hlc {
            node_id: node.into(),
            counter,
        }
    }

    #[test]
    fn test_create_wire_shape() {
        let op = Operation::Create {
            op_id: "a_1000_1".into(),
            id: "r1".into(),
            collection: "todos".into(),
            payload: json!({"title": "x"}).as_object().unwrap().clone(),
            timestamp: MsTime(1000),
            clock: clock("a", 1),
        };
        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            json!({
                "type": "create",
                "opId": "a_1000_1",
                "id": "r1",
                "collection": "todos",
                "payload": {"title": "x"},
                "timestamp": 1000,
                "clock": {"nodeId": "a", "counter": 1},
            })
        );
    }

    #[test]
    fn test_delete_decodes_without_payload() {
        let op: Operation = serde_json::from_value(json!({
            "type": "delete",
            "opId": "a_2000_2",
            "id": "r1",
            "collection": "todos",
            "baseVersion": 1,
            "timestamp": 2000,
            "clock": {"nodeId": "a", "counter": 2},
        }))
        .unwrap();
        assert!(op.is_delete());
        assert_eq!(op.base_version(), Some(1));
        assert!(op.payload().is_none());
    }

    #[test]
    fn test_update_requires_base_version() {
        let bad = serde_json::from_value::<Operation>(json!({
            "type": "update",
            "opId": "a_2000_2",
            "id": "r1",
            "collection": "todos",
            "payload": {},
            "timestamp": 2000,
            "clock": {"nodeId": "a", "counter": 2},
        }));
        assert!(bad.is_err());
    }

    #[test]
    fn test_reject_reason_wire_names() {
        assert_eq!(
            serde_json::to_value(RejectReason::OrphanOp).unwrap(),
            json!("OrphanOp")
        );
        assert_eq!(
            serde_json::to_value(RejectReason::Duplicate).unwrap(),
            json!("Duplicate")
        );
    }
}
