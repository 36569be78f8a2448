// src/pipeline/metrics.rs
//
// Run counters, logged as a summary when the loop stops.

use crate::pipeline::driver::StopReason;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub total_frames: u64,
    pub frames_with_detections: u64,
    pub triggers: u64,
    pub records_written: u64,
    pub duplicates_suppressed: u64,
    pub skipped_crops: u64,
    pub ocr_fallbacks: u64,
    pub tracking_time_us: u64,
    pub started_at: Instant,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            total_frames: 0,
            frames_with_detections: 0,
            triggers: 0,
            records_written: 0,
            duplicates_suppressed: 0,
            skipped_crops: 0,
            ocr_fallbacks: 0,
            tracking_time_us: 0,
            started_at: Instant::now(),
        }
    }

    pub fn add_tracking_time(&mut self, elapsed: Duration) {
        self.tracking_time_us += elapsed.as_micros() as u64;
    }

    pub fn fps(&self) -> f64 {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            self.total_frames as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self, stop_reason: StopReason, unique_tracks: usize) -> MetricsSummary {
        MetricsSummary {
            stop_reason,
            total_frames: self.total_frames,
            fps: self.fps(),
            frames_with_detections: self.frames_with_detections,
            triggers: self.triggers,
            records_written: self.records_written,
            duplicates_suppressed: self.duplicates_suppressed,
            skipped_crops: self.skipped_crops,
            ocr_fallbacks: self.ocr_fallbacks,
            unique_tracks,
            avg_tracking_us: self
                .tracking_time_us
                .checked_div(self.total_frames)
                .unwrap_or(0),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub stop_reason: StopReason,
    pub total_frames: u64,
    pub fps: f64,
    pub frames_with_detections: u64,
    pub triggers: u64,
    pub records_written: u64,
    pub duplicates_suppressed: u64,
    pub skipped_crops: u64,
    pub ocr_fallbacks: u64,
    /// Track ids in the dedup ledger at shutdown.
    pub unique_tracks: usize,
    pub avg_tracking_us: u64,
    pub elapsed_secs: f64,
}

impl MetricsSummary {
    /// Machine-readable form of the run summary.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}
