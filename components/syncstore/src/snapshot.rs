/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The versioned, self-describing dump of an engine's entire state: schema,
//! node id, clock, every record (tombstones included) and the pending log.
//! Hosts persist it as an opaque blob and hand it back through `import`.

use crate::clock::Hlc;
use crate::error::*;
use crate::schema::Schema;
use crate::storage::{PendingLog, RecordStore};
use serde::{Deserialize, Serialize};

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub format_version: u32,
    pub schema: Schema,
    pub node_id: String,
    pub clock: Hlc,
    pub records: RecordStore,
    pub pending: PendingLog,
}

impl Snapshot {
    pub(crate) fn check_format(&self) -> Result<()> {
        ensure!(
            self.format_version == FORMAT_VERSION,
            Error::UnsupportedFormat(self.format_version)
        );
        Ok(())
    }

    /// Canonical serialization: routed through `serde_json::Value` so every
    /// object (struct fields included) emits its keys in ascending order.
    /// Two engines that have seen the same operations produce byte-identical
    /// `records` here; that is the convergence check.
    pub fn to_canonical_json(&self) -> Result<String> {
        let value = serde_json::to_value(self)
            .map_err(|e| Error::Internal(format!("snapshot serialization failed: {}", e)))?;
        Ok(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot() -> Snapshot {
        Snapshot {
            format_version: FORMAT_VERSION,
            schema: Schema::from_json_value(&json!({
                "version": 1,
                "collections": {
                    "todos": {"fields": [{"name": "title", "type": "string", "required": true}]}
                }
            }))
            .unwrap(),
            node_id: "a".into(),
            clock: Hlc {
                node_id: "a".into(),
                counter: 3,
            },
            records: RecordStore::default(),
            pending: PendingLog::default(),
        }
    }

    #[test]
    fn test_round_trip() {
        let s = snapshot();
        let json = serde_json::to_string(&s).unwrap();
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn test_canonical_keys_are_sorted() {
        let s = snapshot();
        let canonical = s.to_canonical_json().unwrap();
        // Struct declaration order would put formatVersion before clock;
        // canonical form must not.
        let clock_at = canonical.find("\"clock\"").unwrap();
        let version_at = canonical.find("\"formatVersion\"").unwrap();
        assert!(clock_at < version_at);
    }

    #[test]
    fn test_format_check() {
        let mut s = snapshot();
        s.check_format().unwrap();
        s.format_version = 2;
        assert!(matches!(
            s.check_format().unwrap_err(),
            Error::UnsupportedFormat(2)
        ));
    }
}
