// src/pipeline/driver.rs
//
// The frame loop. One frame is fully processed (track, correlate, extract,
// present) before the next is read. Stop requests are only observed between
// frames, never during an extraction.

use crate::interface::{FrameSink, FrameSource, LoopControl, ObjectTracker};
use crate::ledger::DedupLedger;
use crate::pipeline::correlator::{correlate, FrameDecision};
use crate::pipeline::frame_context::FrameContext;
use crate::pipeline::metrics::{MetricsSummary, PipelineMetrics};
use crate::pipeline::orchestrator::{ExtractionOrchestrator, ExtractionOutcome};
use crate::preprocessing;
use crate::zone::Region;
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

const PROGRESS_EVERY_FRAMES: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndOfStream,
    /// A frame read failed; handled like end-of-stream.
    StreamError,
    /// The operator pressed the stop key.
    UserRequested,
    /// Ctrl-C.
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopped(StopReason),
}

pub struct FrameLoopDriver {
    source: Box<dyn FrameSource>,
    tracker: Box<dyn ObjectTracker>,
    orchestrator: ExtractionOrchestrator,
    sink: Box<dyn FrameSink>,
    region: Region,
    ledger: DedupLedger,
    working_size: (usize, usize),
    stop_flag: Arc<AtomicBool>,
    metrics: PipelineMetrics,
    frame_id: u64,
}

impl FrameLoopDriver {
    pub fn new(
        source: Box<dyn FrameSource>,
        tracker: Box<dyn ObjectTracker>,
        orchestrator: ExtractionOrchestrator,
        sink: Box<dyn FrameSink>,
        region: Region,
        working_size: (usize, usize),
        stop_flag: Arc<AtomicBool>,
    ) -> Self {
        Self {
            source,
            tracker,
            orchestrator,
            sink,
            region,
            ledger: DedupLedger::new(),
            working_size,
            stop_flag,
            metrics: PipelineMetrics::new(),
            frame_id: 0,
        }
    }

    #[cfg(test)]
    pub fn ledger(&self) -> &DedupLedger {
        &self.ledger
    }

    /// Drive the loop until it stops, then tear down. Teardown runs on every
    /// exit path; if the loop itself failed, that error wins over any
    /// teardown error.
    pub fn run(&mut self) -> Result<MetricsSummary> {
        info!(
            "▶ Frame loop started ({}x{}, {}-point zone)",
            self.working_size.0,
            self.working_size.1,
            self.region.vertices().len()
        );

        let outcome = self.run_loop();
        let teardown = self.teardown();

        let stop_reason = outcome?;
        teardown?;

        Ok(self.metrics.summary(stop_reason, self.ledger.len()))
    }

    fn run_loop(&mut self) -> Result<StopReason> {
        loop {
            if let LoopState::Stopped(reason) = self.step()? {
                return Ok(reason);
            }
        }
    }

    fn step(&mut self) -> Result<LoopState> {
        if self.stop_flag.load(Ordering::SeqCst) {
            info!("🛑 Interrupt received, stopping");
            return Ok(LoopState::Stopped(StopReason::Interrupted));
        }

        let frame = match self.source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("End of stream after {} frames", self.frame_id);
                return Ok(LoopState::Stopped(StopReason::EndOfStream));
            }
            Err(e) => {
                warn!("Frame read failed after {} frames, stopping: {:#}", self.frame_id, e);
                return Ok(LoopState::Stopped(StopReason::StreamError));
            }
        };

        self.frame_id += 1;
        let (width, height) = self.working_size;
        let frame = preprocessing::resize_frame(frame, width, height);
        let mut ctx = FrameContext::new(self.frame_id, frame);

        self.process_frame(&mut ctx)?;

        if self.frame_id % PROGRESS_EVERY_FRAMES == 0 {
            info!(
                "Frame {} | {:.1} FPS | {} records",
                self.frame_id,
                self.metrics.fps(),
                self.metrics.records_written
            );
        }

        match self.sink.present(&ctx, &self.region)? {
            LoopControl::Continue => Ok(LoopState::Running),
            LoopControl::Stop => {
                info!("Stop requested at frame {}", self.frame_id);
                Ok(LoopState::Stopped(StopReason::UserRequested))
            }
        }
    }

    fn process_frame(&mut self, ctx: &mut FrameContext) -> Result<()> {
        let started = Instant::now();
        ctx.detections = self
            .tracker
            .track(&ctx.frame)
            .with_context(|| format!("tracking failed on frame {}", ctx.frame_id))?;
        self.metrics.add_tracking_time(started.elapsed());

        self.metrics.total_frames += 1;
        if !ctx.detections.is_empty() {
            self.metrics.frames_with_detections += 1;
        }

        ctx.decision = correlate(&self.region, &self.ledger, &ctx.detections);

        match ctx.decision {
            FrameDecision::Idle => {}
            FrameDecision::Suppressed { track_id } => {
                self.metrics.duplicates_suppressed += 1;
                debug!("Track #{} already recorded, skipping", track_id);
            }
            FrameDecision::Trigger(trigger) => {
                self.metrics.triggers += 1;
                info!(
                    "🪖 No-helmet rider with plate track #{} ({:.2}) in zone (frame {} @ {:.0} ms)",
                    trigger.track_id, trigger.confidence, ctx.frame_id, ctx.timestamp_ms
                );
                match self.orchestrator.extract(&trigger, ctx, &mut self.ledger)? {
                    ExtractionOutcome::Recorded { degraded, .. } => {
                        self.metrics.records_written += 1;
                        if degraded {
                            self.metrics.ocr_fallbacks += 1;
                        }
                    }
                    ExtractionOutcome::EmptyCrop { .. } => self.metrics.skipped_crops += 1,
                }
            }
        }

        Ok(())
    }

    fn teardown(&mut self) -> Result<()> {
        let steps = [
            ("flush record store", self.orchestrator.flush()),
            ("release frame source", self.source.release()),
            ("close display", self.sink.close()),
        ];

        let mut first_error = None;
        for (step, result) in steps {
            if let Err(e) = result {
                error!("Teardown: failed to {}: {:#}", step, e);
                if first_error.is_none() {
                    first_error = Some(e.context(format!("failed to {}", step)));
                }
            }
        }

        if self.ledger.is_empty() {
            info!("✓ Teardown complete (no tracks recorded)");
        } else {
            info!("✓ Teardown complete ({} tracks recorded)", self.ledger.len());
        }
        first_error.map_or(Ok(()), Err)
    }
}
