/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The hybrid logical clock. Each replica owns one `Hlc`, advances it before
//! emitting a local operation (`tick`) and on ingesting a remote one
//! (`observe`). Comparing two clocks orders by counter first and breaks ties
//! on the node id, which gives every pair of distinct events a total order
//! regardless of which replica produced them.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hlc {
    pub node_id: String,
    pub counter: u64,
}

impl Hlc {
    pub fn new(node_id: impl Into<String>) -> Self {
        Hlc {
            node_id: node_id.into(),
            counter: 0,
        }
    }

    /// Advances the counter for a locally-emitted event and returns the new
    /// clock value. Invoked exactly once per local operation.
    pub fn tick(&mut self) -> Hlc {
        self.counter += 1;
        self.clone()
    }

    /// Folds a clock received from a peer into this one. The counter jumps
    /// past whichever side is further ahead; the node id never changes.
    /// Invoked before applying any remote operation.
    pub fn observe(&mut self, incoming: &Hlc) -> Hlc {
        self.counter = self.counter.max(incoming.counter) + 1;
        self.clone()
    }
}

impl Ord for Hlc {
    fn cmp(&self, other: &Self) -> Ordering {
        self.counter
            .cmp(&other.counter)
            .then_with(|| self.node_id.cmp(&other.node_id))
    }
}

impl PartialOrd for Hlc {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Hlc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.node_id, self.counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hlc(node: &str, counter: u64) -> Hlc {
        Hlc {
            node_id: node.into(),
            counter,
        }
    }

    #[test]
    fn test_tick_is_monotonic() {
        let mut c = Hlc::new("a");
        assert_eq!(c.tick(), hlc("a", 1));
        assert_eq!(c.tick(), hlc("a", 2));
        assert_eq!(c.counter, 2);
    }

    #[test]
    fn test_observe_jumps_past_the_peer() {
        let mut c = Hlc::new("a");
        c.tick();
        assert_eq!(c.observe(&hlc("b", 7)), hlc("a", 8));
        // A peer behind us still advances our counter by one.
        assert_eq!(c.observe(&hlc("b", 2)), hlc("a", 9));
    }

    #[test]
    fn test_ordering_counter_first_then_node_id() {
        assert!(hlc("z", 1) < hlc("a", 2));
        assert!(hlc("a", 3) < hlc("b", 3));
        assert_eq!(hlc("a", 3).cmp(&hlc("a", 3)), Ordering::Equal);
    }

    #[test]
    fn test_serde_shape() {
        let c = hlc("node-1", 42);
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v, serde_json::json!({"nodeId": "node-1", "counter": 42}));
    }

    #[test]
    fn test_display_for_logging() {
        assert_eq!(hlc("node-1", 42).to_string(), "(node-1, 42)");
    }
}
