/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Reconciliation of remote operation batches into local state. The types
//! here are the observable result surface; the algorithm lives in
//! `reconcile.rs`.

mod reconcile;


pub(crate) use reconcile::reconcile;

use crate::clock::Hlc;
use crate::op::{Operation, RejectReason};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use types::MsTime;

/// The deterministic rule for picking a winner between two ops that target
/// the same record. Every replica must reconcile a batch with the same
/// strategy or they will not converge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MergeStrategy {
    /// Compare hybrid logical clocks: `(counter, nodeId)`.
    ClockWins,
    /// Compare wall-clock timestamps first, then fall back to the clock:
    /// `(timestamp, counter, nodeId)`.
    TimestampWins,
}

impl MergeStrategy {
    /// Orders two merge keys. Identical keys mean the same author at the
    /// same logical instant, i.e. a replay of the same write.
    pub(crate) fn cmp_keys(self, a: (MsTime, &Hlc), b: (MsTime, &Hlc)) -> Ordering {
        match self {
            MergeStrategy::ClockWins => a.1.cmp(b.1),
            MergeStrategy::TimestampWins => a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Resolution {
    LocalWins,
    RemoteWins,
}

/// A detected disagreement between a local and a remote op on one record,
/// resolved deterministically. Recorded for observers; never a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub local_op: Operation,
    pub remote_op: Operation,
    pub resolution: Resolution,
    pub winner_op_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedOp {
    pub op_id: String,
    pub reason: RejectReason,
}

/// What one `reconcile` call did, with stably ordered lists: op ids
/// ascending, conflicts by `(collection, recordId, winnerOpId)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResult {
    pub accepted_local: Vec<String>,
    pub rejected_local: Vec<String>,
    pub applied_remote: Vec<String>,
    pub rejected_remote: Vec<RejectedOp>,
    pub conflicts: Vec<Conflict>,
}
