// src/ledger.rs

use std::collections::HashSet;

/// Track ids that already produced an event. Append-only for the lifetime of
/// the process; a track id in here never triggers extraction again.
#[derive(Debug, Default)]
pub struct DedupLedger {
    actioned: HashSet<i64>,
}

impl DedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, track_id: i64) -> bool {
        self.actioned.contains(&track_id)
    }

    /// Returns `false` when the id was already present.
    pub fn insert(&mut self, track_id: i64) -> bool {
        self.actioned.insert(track_id)
    }

    pub fn len(&self) -> usize {
        self.actioned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actioned.is_empty()
    }
}
