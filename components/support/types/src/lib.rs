/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use serde_derive::*;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Typesafe way to manage millisecond timestamps. Used for operation
/// timestamps and record bookkeeping, so that a raw `i64` can't silently be
/// passed where a timestamp was meant (or vice versa).
///
/// The engine never reads the system clock; hosts pass timestamps in.
/// `MsTime::now()` exists for hosts and tests that want a real wall clock.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Default,
)]
pub struct MsTime(pub i64);

impl MsTime {
    pub fn now() -> Self {
        let d = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        MsTime(d.as_millis() as i64)
    }

    #[inline]
    pub fn as_millis(self) -> i64 {
        self.0
    }
}

impl From<i64> for MsTime {
    #[inline]
    fn from(ms: i64) -> Self {
        MsTime(ms)
    }
}

impl From<MsTime> for i64 {
    #[inline]
    fn from(ts: MsTime) -> Self {
        ts.0
    }
}

impl fmt::Display for MsTime {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
