/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The queue of locally-applied operations no peer has acknowledged yet.
//! Strictly FIFO: hosts push entries in apply order and drain them in the
//! same order when building an upload. Entries leave the queue either by
//! acknowledgement or by losing a conflict during reconciliation.

use crate::op::Operation;
use serde::{Deserialize, Serialize};
use types::MsTime;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingEntry {
    pub operation: Operation,
    pub applied_at: MsTime,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PendingLog {
    entries: Vec<PendingEntry>,
}

impl PendingLog {
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn list(&self) -> &[PendingEntry] {
        &self.entries
    }

    pub fn contains(&self, op_id: &str) -> bool {
        self.entries.iter().any(|e| e.operation.op_id() == op_id)
    }

    pub(crate) fn push(&mut self, operation: Operation, applied_at: MsTime) {
        self.entries.push(PendingEntry {
            operation,
            applied_at,
        });
    }

    /// Removes every entry whose op id appears in `op_ids`; ids that aren't
    /// queued are ignored. Returns how many entries were dropped. An
    /// acknowledged op never re-enters the queue.
    pub(crate) fn acknowledge(&mut self, op_ids: &[String]) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|e| !op_ids.iter().any(|id| id == e.operation.op_id()));
        before - self.entries.len()
    }

    /// Removes the entries for one record that satisfy `pred` (in practice:
    /// the ones a remote winner just overwrote), preserving the order of
    /// everything else.
    pub(crate) fn remove_for_record<F>(
        &mut self,
        collection: &str,
        id: &str,
        mut pred: F,
    ) -> Vec<PendingEntry>
    where
        F: FnMut(&Operation) -> bool,
    {
        let mut removed = Vec::new();
        self.entries.retain(|e| {
            let hit = e.operation.collection() == collection
                && e.operation.record_id() == id
                && pred(&e.operation);
            if hit {
                removed.push(e.clone());
            }
            !hit
        });
        removed
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &PendingEntry> {
        self.entries.iter()
    }
}
