// src/pipeline/mod.rs

pub mod correlator;
pub mod driver;
pub mod frame_context;
pub mod metrics;
pub mod orchestrator;

#[cfg(test)]
pub mod testing;

pub use correlator::{correlate, FrameDecision, Trigger};
pub use driver::{FrameLoopDriver, StopReason};
pub use frame_context::FrameContext;
pub use metrics::{MetricsSummary, PipelineMetrics};
pub use orchestrator::{ExtractionOrchestrator, ExtractionOutcome};
