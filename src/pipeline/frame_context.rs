// src/pipeline/frame_context.rs
//
// Everything known about one frame while it moves through the loop. The
// sink draws from this, so annotations added during extraction show up on
// the same frame that triggered them.

use crate::pipeline::correlator::FrameDecision;
use crate::types::{Annotation, Detection, Frame};

#[derive(Debug, Clone)]
pub struct FrameContext {
    pub frame_id: u64,
    pub timestamp_ms: f64,
    pub frame: Frame,
    pub detections: Vec<Detection>,
    pub decision: FrameDecision,
    pub annotations: Vec<Annotation>,
}

impl FrameContext {
    pub fn new(frame_id: u64, frame: Frame) -> Self {
        let timestamp_ms = frame.timestamp_ms;
        Self {
            frame_id,
            timestamp_ms,
            frame,
            detections: Vec::new(),
            decision: FrameDecision::Idle,
            annotations: Vec::new(),
        }
    }

    pub fn annotate(&mut self, annotation: Annotation) {
        self.annotations.push(annotation);
    }
}
