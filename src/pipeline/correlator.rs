// src/pipeline/correlator.rs
//
// Per-frame decision: does a violation co-occur with an identifier inside
// the zone, and has that identifier's track already been actioned?

use crate::ledger::DedupLedger;
use crate::types::{BoundingBox, ClassLabel, Detection};
use crate::zone::Region;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trigger {
    pub track_id: i64,
    pub bbox: BoundingBox,
    /// Detector score of the identifier box.
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameDecision {
    /// No violation + identifier pair inside the zone.
    Idle,
    /// The pair is present but this track already produced its event.
    Suppressed { track_id: i64 },
    Trigger(Trigger),
}

/// Running state of one scan over a frame's in-zone detections.
#[derive(Debug, Default)]
struct ZoneScan {
    violation_seen: bool,
    candidate: Option<Trigger>,
}

impl ZoneScan {
    fn observe(mut self, det: &Detection) -> Self {
        match (&det.class_label, det.track_id) {
            (ClassLabel::Violation, _) => self.violation_seen = true,
            // Keep-last: a later identifier replaces any earlier one in the
            // same frame. Identifiers without a track id can't be deduplicated
            // and are ignored.
            (ClassLabel::Identifier, Some(track_id)) => {
                self.candidate = Some(Trigger {
                    track_id,
                    bbox: det.bbox,
                    confidence: det.confidence,
                })
            }
            _ => {}
        }
        self
    }
}

/// Scan detections in tracker order and emit at most one trigger.
pub fn correlate(region: &Region, ledger: &DedupLedger, detections: &[Detection]) -> FrameDecision {
    let scan = detections
        .iter()
        .filter(|det| region.contains(det.bbox.centroid()))
        .fold(ZoneScan::default(), ZoneScan::observe);

    match scan.candidate {
        Some(candidate) if scan.violation_seen => {
            if ledger.contains(candidate.track_id) {
                FrameDecision::Suppressed {
                    track_id: candidate.track_id,
                }
            } else {
                FrameDecision::Trigger(candidate)
            }
        }
        _ => FrameDecision::Idle,
    }
}
