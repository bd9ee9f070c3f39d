/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

#[macro_use]
mod util;
pub mod boundary;
pub mod clock;
pub mod engine;
pub mod error;
pub mod op;
pub mod schema;
pub mod snapshot;
pub mod storage;
pub mod sync;

// Some re-exports we use frequently for local convenience
pub(crate) use serde_json::Value as JsonValue;
pub(crate) type JsonObject<Val = JsonValue> = serde_json::Map<String, Val>;

pub use crate::clock::Hlc;
pub use crate::engine::{EngineMetadata, SyncEngine};
pub use crate::error::*;
pub use crate::op::{Operation, RejectReason};
pub use crate::schema::Schema;
pub use crate::snapshot::Snapshot;
pub use crate::storage::{ApplyResult, Origin, PendingEntry, Record};
pub use crate::sync::{Conflict, MergeStrategy, ReconcileResult, RejectedOp, Resolution};
pub use types::MsTime;
