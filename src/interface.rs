// src/interface.rs
//
// Seams between the monitoring core and everything it talks to. The frame
// loop only ever sees these traits, so each collaborator can be swapped for
// a scripted fake in tests.

use crate::pipeline::FrameContext;
use crate::types::{Crop, Detection, EventRecord, Frame};
use crate::zone::Region;
use anyhow::Result;
use chrono::NaiveDateTime;
use std::path::Path;

/// Pull-based frame sequence. `Ok(None)` means the stream is exhausted.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>>;
    fn release(&mut self) -> Result<()>;
}

/// Detector + tracker: classified boxes with persistent track ids.
pub trait ObjectTracker {
    fn track(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recognition {
    Text(String),
    Nothing,
    /// No recognition engine is loaded at all.
    Unavailable,
}

pub trait TextRecognizer {
    fn recognize(&mut self, crop: &Crop) -> Result<Recognition>;
}

/// Append-only event sink.
pub trait RecordStore {
    fn append(&mut self, record: &EventRecord) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
}

pub trait ImageWriter {
    fn write(&mut self, path: &Path, crop: &Crop) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    Stop,
}

/// Renders and presents a processed frame, and reports whether the operator
/// asked to stop.
pub trait FrameSink {
    fn present(&mut self, ctx: &FrameContext, region: &Region) -> Result<LoopControl>;
    fn close(&mut self) -> Result<()>;
}

pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}
