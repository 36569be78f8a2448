// src/pipeline/testing.rs
//
// Scripted collaborators for exercising the loop without video, models or
// disk. Each fake is cheap to clone and clones share state, so a test can
// hand one copy to the pipeline and inspect the other.

use crate::interface::{
    Clock, FrameSink, FrameSource, ImageWriter, LoopControl, ObjectTracker, Recognition,
    RecordStore, TextRecognizer,
};
use crate::pipeline::correlator::FrameDecision;
use crate::pipeline::FrameContext;
use crate::types::{Annotation, BoundingBox, ClassLabel, Crop, Detection, EventRecord, Frame};
use crate::zone::Region;
use anyhow::{bail, Result};
use chrono::{NaiveDate, NaiveDateTime};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ============================================================================
// BUILDERS
// ============================================================================

pub fn solid_frame(width: usize, height: usize) -> Frame {
    Frame {
        data: vec![128; width * height * 3],
        width,
        height,
        timestamp_ms: 0.0,
    }
}

pub fn violation(bbox: BoundingBox) -> Detection {
    Detection {
        bbox,
        class_label: ClassLabel::Violation,
        track_id: None,
        confidence: 0.9,
    }
}

pub fn identifier(track_id: i64, bbox: BoundingBox) -> Detection {
    Detection {
        bbox,
        class_label: ClassLabel::Identifier,
        track_id: Some(track_id),
        confidence: 0.9,
    }
}

/// 2024-05-01 14:03:22.123
pub fn fixed_clock() -> FixedClock {
    let now = NaiveDate::from_ymd_opt(2024, 5, 1)
        .and_then(|d| d.and_hms_milli_opt(14, 3, 22, 123))
        .unwrap();
    FixedClock(now)
}

pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

// ============================================================================
// FRAME SOURCE
// ============================================================================

#[derive(Clone)]
pub struct ScriptedSource {
    frames: Rc<RefCell<VecDeque<Frame>>>,
    fail_when_empty: bool,
    released: Rc<Cell<bool>>,
}

impl ScriptedSource {
    pub fn new(count: usize, width: usize, height: usize) -> Self {
        let frames = (0..count)
            .map(|i| Frame {
                timestamp_ms: i as f64 * 40.0,
                ..solid_frame(width, height)
            })
            .collect();
        Self {
            frames: Rc::new(RefCell::new(frames)),
            fail_when_empty: false,
            released: Rc::new(Cell::new(false)),
        }
    }

    /// Report a read error instead of end-of-stream once frames run out.
    pub fn failing_at_end(mut self) -> Self {
        self.fail_when_empty = true;
        self
    }

    pub fn remaining(&self) -> usize {
        self.frames.borrow().len()
    }

    pub fn released(&self) -> bool {
        self.released.get()
    }
}

impl FrameSource for ScriptedSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match self.frames.borrow_mut().pop_front() {
            Some(frame) => Ok(Some(frame)),
            None if self.fail_when_empty => bail!("device disconnected"),
            None => Ok(None),
        }
    }

    fn release(&mut self) -> Result<()> {
        self.released.set(true);
        Ok(())
    }
}

// ============================================================================
// TRACKER
// ============================================================================

/// Returns one scripted detection list per frame, then nothing.
pub struct ScriptedTracker {
    script: VecDeque<Vec<Detection>>,
    fail_on_call: Option<usize>,
    interrupt_on_call: Option<(usize, Arc<AtomicBool>)>,
    calls: usize,
}

impl ScriptedTracker {
    pub fn new(script: Vec<Vec<Detection>>) -> Self {
        Self {
            script: script.into(),
            fail_on_call: None,
            interrupt_on_call: None,
            calls: 0,
        }
    }

    pub fn failing_on_call(mut self, call: usize) -> Self {
        self.fail_on_call = Some(call);
        self
    }

    /// Raise `flag` while tracking the given call, as a Ctrl-C landing
    /// mid-frame would.
    pub fn interrupting_on_call(mut self, call: usize, flag: Arc<AtomicBool>) -> Self {
        self.interrupt_on_call = Some((call, flag));
        self
    }
}

impl ObjectTracker for ScriptedTracker {
    fn track(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        self.calls += 1;
        if self.fail_on_call == Some(self.calls) {
            bail!("inference backend crashed");
        }
        if let Some((call, flag)) = &self.interrupt_on_call {
            if *call == self.calls {
                flag.store(true, Ordering::SeqCst);
            }
        }
        Ok(self.script.pop_front().unwrap_or_default())
    }
}

// ============================================================================
// RECOGNIZER
// ============================================================================

pub struct ScriptedRecognizer {
    response: Option<Recognition>,
}

impl ScriptedRecognizer {
    pub fn always(recognition: Recognition) -> Self {
        Self {
            response: Some(recognition),
        }
    }

    pub fn always_text(text: &str) -> Self {
        Self::always(Recognition::Text(text.to_string()))
    }

    pub fn failing() -> Self {
        Self { response: None }
    }
}

impl TextRecognizer for ScriptedRecognizer {
    fn recognize(&mut self, _crop: &Crop) -> Result<Recognition> {
        match &self.response {
            Some(recognition) => Ok(recognition.clone()),
            None => bail!("recognizer session poisoned"),
        }
    }
}

// ============================================================================
// PERSISTENCE
// ============================================================================

#[derive(Clone, Default)]
pub struct MemoryRecordStore {
    records: Rc<RefCell<Vec<EventRecord>>>,
    fail: Rc<Cell<bool>>,
    flushes: Rc<Cell<usize>>,
}

impl MemoryRecordStore {
    pub fn records(&self) -> Vec<EventRecord> {
        self.records.borrow().clone()
    }

    pub fn fail_appends(&self) {
        self.fail.set(true);
    }

    pub fn flushes(&self) -> usize {
        self.flushes.get()
    }
}

impl RecordStore for MemoryRecordStore {
    fn append(&mut self, record: &EventRecord) -> Result<()> {
        if self.fail.get() {
            bail!("disk full");
        }
        self.records.borrow_mut().push(record.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.flushes.set(self.flushes.get() + 1);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemoryImageWriter {
    written: Rc<RefCell<Vec<(PathBuf, Crop)>>>,
    fail: Rc<Cell<bool>>,
}

impl MemoryImageWriter {
    pub fn paths(&self) -> Vec<PathBuf> {
        self.written.borrow().iter().map(|(p, _)| p.clone()).collect()
    }

    pub fn sizes(&self) -> Vec<(usize, usize)> {
        self.written
            .borrow()
            .iter()
            .map(|(_, c)| (c.width, c.height))
            .collect()
    }

    pub fn fail_writes(&self) {
        self.fail.set(true);
    }
}

impl ImageWriter for MemoryImageWriter {
    fn write(&mut self, path: &Path, crop: &Crop) -> Result<()> {
        if self.fail.get() {
            bail!("permission denied");
        }
        self.written
            .borrow_mut()
            .push((path.to_path_buf(), crop.clone()));
        Ok(())
    }
}

// ============================================================================
// SINK
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Presented {
    pub frame_id: u64,
    pub decision: FrameDecision,
    pub annotations: Vec<Annotation>,
}

#[derive(Clone, Default)]
pub struct RecordingSink {
    presented: Rc<RefCell<Vec<Presented>>>,
    stop_after: Option<usize>,
    closed: Rc<Cell<bool>>,
}

impl RecordingSink {
    /// Ask the loop to stop once `frames` frames have been presented.
    pub fn stopping_after(frames: usize) -> Self {
        Self {
            stop_after: Some(frames),
            ..Self::default()
        }
    }

    pub fn presented(&self) -> Vec<Presented> {
        self.presented.borrow().clone()
    }

    pub fn closed(&self) -> bool {
        self.closed.get()
    }
}

impl FrameSink for RecordingSink {
    fn present(&mut self, ctx: &FrameContext, _region: &Region) -> Result<LoopControl> {
        let mut presented = self.presented.borrow_mut();
        presented.push(Presented {
            frame_id: ctx.frame_id,
            decision: ctx.decision,
            annotations: ctx.annotations.clone(),
        });
        match self.stop_after {
            Some(limit) if presented.len() >= limit => Ok(LoopControl::Stop),
            _ => Ok(LoopControl::Continue),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.closed.set(true);
        Ok(())
    }
}
