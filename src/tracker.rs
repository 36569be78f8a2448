// src/tracker.rs

use crate::interface::ObjectTracker;
use crate::plate_detection::{calculate_iou, PlateDetector, RawDetection};
use crate::types::{BoundingBox, Detection, Frame, LabelConfig, TrackerConfig};
use anyhow::Result;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct TrackedObject {
    pub id: i64,
    pub bbox: [f32; 4],
    pub class_name: String,
    pub first_seen_frame: u64,
    pub last_seen_frame: u64,
}

/// Greedy IoU tracker. Ids start at 1 and are never handed out twice within
/// one run, but an object that disappears longer than `max_missing_frames`
/// comes back under a new id.
pub struct IouTracker {
    next_id: i64,
    tracks: BTreeMap<i64, TrackedObject>,
    iou_threshold: f32,
    max_missing_frames: u64,
}

impl IouTracker {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            next_id: 1,
            tracks: BTreeMap::new(),
            iou_threshold: config.iou_threshold,
            max_missing_frames: config.max_missing_frames,
        }
    }

    pub fn active_tracks(&self) -> usize {
        self.tracks.len()
    }

    /// Assign a track id to every detection, preserving input order.
    pub fn update(&mut self, detections: Vec<RawDetection>, frame_id: u64) -> Vec<(i64, RawDetection)> {
        let mut claimed: HashSet<i64> = HashSet::new();
        let mut assigned = Vec::with_capacity(detections.len());

        for det in detections {
            let mut best_match: Option<(i64, f32)> = None;

            for (track_id, track) in &self.tracks {
                if track.class_name != det.class_name || claimed.contains(track_id) {
                    continue;
                }

                let iou = calculate_iou(&track.bbox, &det.bbox);
                if iou > self.iou_threshold && best_match.map_or(true, |(_, best)| iou > best) {
                    best_match = Some((*track_id, iou));
                }
            }

            let track_id = match best_match.and_then(|(id, _)| self.tracks.get_mut(&id)) {
                Some(track) => {
                    track.bbox = det.bbox;
                    track.last_seen_frame = frame_id;
                    track.id
                }
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    self.tracks.insert(
                        id,
                        TrackedObject {
                            id,
                            bbox: det.bbox,
                            class_name: det.class_name.clone(),
                            first_seen_frame: frame_id,
                            last_seen_frame: frame_id,
                        },
                    );
                    debug!("🆕 New track: ID #{}, class: {}", id, det.class_name);
                    id
                }
            };

            claimed.insert(track_id);
            assigned.push((track_id, det));
        }

        let max_missing = self.max_missing_frames;
        self.tracks.retain(|id, track| {
            let keep = frame_id.saturating_sub(track.last_seen_frame) <= max_missing;
            if !keep {
                debug!(
                    "🗑️  Dropping track ID #{} ({}) - seen frames {}..={}, missing for {}",
                    id,
                    track.class_name,
                    track.first_seen_frame,
                    track.last_seen_frame,
                    frame_id - track.last_seen_frame
                );
            }
            keep
        });

        assigned
    }
}

/// Detector + tracker, the per-frame source of classified, tracked boxes.
pub struct TrackedDetector {
    detector: PlateDetector,
    tracker: IouTracker,
    labels: LabelConfig,
    frame_counter: u64,
}

impl TrackedDetector {
    pub fn new(detector: PlateDetector, tracker: IouTracker, labels: LabelConfig) -> Self {
        info!(
            "✓ Tracker ready (violation='{}', identifier='{}')",
            labels.violation, labels.identifier
        );
        Self {
            detector,
            tracker,
            labels,
            frame_counter: 0,
        }
    }
}

impl ObjectTracker for TrackedDetector {
    fn track(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        self.frame_counter += 1;
        let raw = self.detector.detect(frame)?;
        let tracked = self.tracker.update(raw, self.frame_counter);
        debug!(
            "Frame {}: {} tracked objects, {} active tracks",
            self.frame_counter,
            tracked.len(),
            self.tracker.active_tracks()
        );
        Ok(to_detections(tracked, &self.labels))
    }
}

fn to_detections(tracked: Vec<(i64, RawDetection)>, labels: &LabelConfig) -> Vec<Detection> {
    tracked
        .into_iter()
        .map(|(track_id, det)| Detection {
            bbox: BoundingBox::from_xyxy(det.bbox),
            class_label: labels.classify(&det.class_name),
            track_id: Some(track_id),
            confidence: det.confidence,
        })
        .collect()
}
