// src/pipeline/orchestrator.rs
//
// Side effects for one trigger, in a fixed order:
//   crop -> recognize -> write image -> append record -> ledger -> annotate
//
// The ledger is only updated once both persistence steps succeeded, so a
// failed write never burns the single event a track is allowed.

use crate::interface::{Clock, ImageWriter, Recognition, RecordStore, TextRecognizer};
use crate::ledger::DedupLedger;
use crate::pipeline::correlator::Trigger;
use crate::pipeline::frame_context::FrameContext;
use crate::preprocessing;
use crate::record_store::SessionOutput;
use crate::types::{Annotation, EventRecord, ExtractionConfig};
use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{info, warn};

/// Recorded when the recognizer ran but produced no usable text.
pub const NO_TEXT_SENTINEL: &str = "NO_PLATE_DETECTED";
/// Recorded when no recognizer is loaded.
pub const OCR_UNAVAILABLE_SENTINEL: &str = "OCR_NOT_AVAILABLE";

#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    Recorded {
        track_id: i64,
        record: EventRecord,
        image_path: PathBuf,
        /// Text is a sentinel rather than a recognizer result.
        degraded: bool,
    },
    /// The box had no pixels inside the frame; nothing was persisted.
    EmptyCrop { track_id: i64 },
}

pub struct ExtractionOrchestrator {
    recognizer: Box<dyn TextRecognizer>,
    image_writer: Box<dyn ImageWriter>,
    record_store: Box<dyn RecordStore>,
    clock: Box<dyn Clock>,
    session: SessionOutput,
    crop_width: usize,
    crop_height: usize,
    image_extension: String,
}

impl ExtractionOrchestrator {
    pub fn new(
        recognizer: Box<dyn TextRecognizer>,
        image_writer: Box<dyn ImageWriter>,
        record_store: Box<dyn RecordStore>,
        clock: Box<dyn Clock>,
        session: SessionOutput,
        config: &ExtractionConfig,
    ) -> Self {
        Self {
            recognizer,
            image_writer,
            record_store,
            clock,
            session,
            crop_width: config.crop_width,
            crop_height: config.crop_height,
            image_extension: config.image_extension.clone(),
        }
    }

    pub fn extract(
        &mut self,
        trigger: &Trigger,
        ctx: &mut FrameContext,
        ledger: &mut DedupLedger,
    ) -> Result<ExtractionOutcome> {
        let track_id = trigger.track_id;

        // 1. Crop to a canonical size
        let Some(crop) = preprocessing::crop_and_resize(
            &ctx.frame,
            &trigger.bbox,
            self.crop_width,
            self.crop_height,
        ) else {
            warn!(
                "Plate box {:?} for track #{} lies outside the frame, skipping",
                trigger.bbox, track_id
            );
            return Ok(ExtractionOutcome::EmptyCrop { track_id });
        };

        // 2. Recognize; never fatal
        let recognition = match self.recognizer.recognize(&crop) {
            Ok(recognition) => recognition,
            Err(e) => {
                warn!("Text recognition failed for track #{}: {:#}", track_id, e);
                Recognition::Nothing
            }
        };
        let (text, degraded) = resolve_text(recognition);
        info!("Detected Number Plate: {}", text);

        // 3. Image file, named from the text and a millisecond timestamp
        let time = self.clock.now().format("%H-%M-%S-%3f").to_string();
        let image_path = self.session.dir.join(format!(
            "{}_{}.{}",
            file_stem_for(&text),
            time,
            self.image_extension
        ));
        self.image_writer
            .write(&image_path, &crop)
            .with_context(|| format!("failed to write plate image {}", image_path.display()))?;

        // 4. Record
        let record = EventRecord {
            text,
            date: self.session.date.clone(),
            time,
        };
        self.record_store
            .append(&record)
            .context("failed to append event record")?;

        // 5. Only now is the track considered actioned
        ledger.insert(track_id);

        // 6. Overlay
        ctx.annotate(Annotation {
            text: track_id.to_string(),
            origin: trigger.bbox.origin(),
        });

        Ok(ExtractionOutcome::Recorded {
            track_id,
            record,
            image_path,
            degraded,
        })
    }

    pub fn flush(&mut self) -> Result<()> {
        self.record_store.flush()
    }
}

fn resolve_text(recognition: Recognition) -> (String, bool) {
    match recognition {
        Recognition::Text(text) if !text.trim().is_empty() => (text.trim().to_string(), false),
        Recognition::Text(_) | Recognition::Nothing => (NO_TEXT_SENTINEL.to_string(), true),
        Recognition::Unavailable => (OCR_UNAVAILABLE_SENTINEL.to_string(), true),
    }
}

/// Recognized text is arbitrary; keep file names portable.
fn file_stem_for(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{
        fixed_clock, solid_frame, MemoryImageWriter, MemoryRecordStore, ScriptedRecognizer,
    };
    use crate::types::{BoundingBox, Point};
    use std::path::Path;

    struct Harness {
        orchestrator: ExtractionOrchestrator,
        store: MemoryRecordStore,
        images: MemoryImageWriter,
    }

    fn harness(recognizer: ScriptedRecognizer) -> Harness {
        let store = MemoryRecordStore::default();
        let images = MemoryImageWriter::default();
        let orchestrator = ExtractionOrchestrator::new(
            Box::new(recognizer),
            Box::new(images.clone()),
            Box::new(store.clone()),
            Box::new(fixed_clock()),
            SessionOutput {
                dir: PathBuf::from("out/2024-05-01"),
                date: "2024-05-01".to_string(),
            },
            &ExtractionConfig::default(),
        );
        Harness {
            orchestrator,
            store,
            images,
        }
    }

    fn trigger(track_id: i64) -> Trigger {
        Trigger {
            track_id,
            bbox: BoundingBox::new(10, 20, 40, 35),
            confidence: 0.9,
        }
    }

    #[test]
    fn test_records_event_and_marks_ledger() {
        let mut h = harness(ScriptedRecognizer::always_text("KA01AB1234"));
        let mut ctx = FrameContext::new(1, solid_frame(100, 100));
        let mut ledger = DedupLedger::new();

        let outcome = h.orchestrator.extract(&trigger(7), &mut ctx, &mut ledger).unwrap();

        let expected = EventRecord {
            text: "KA01AB1234".to_string(),
            date: "2024-05-01".to_string(),
            time: "14-03-22-123".to_string(),
        };
        assert_eq!(h.store.records(), vec![expected.clone()]);
        assert_eq!(
            h.images.paths(),
            vec![PathBuf::from("out/2024-05-01/KA01AB1234_14-03-22-123.jpg")]
        );
        assert_eq!(h.images.sizes(), vec![(120, 85)]);
        assert!(ledger.contains(7));
        assert_eq!(
            ctx.annotations,
            vec![Annotation {
                text: "7".to_string(),
                origin: Point::new(10, 20)
            }]
        );
        assert_eq!(
            outcome,
            ExtractionOutcome::Recorded {
                track_id: 7,
                record: expected,
                image_path: PathBuf::from("out/2024-05-01/KA01AB1234_14-03-22-123.jpg"),
                degraded: false,
            }
        );
    }

    #[test]
    fn test_empty_recognition_uses_sentinel() {
        let mut h = harness(ScriptedRecognizer::always(Recognition::Nothing));
        let mut ctx = FrameContext::new(1, solid_frame(100, 100));
        let mut ledger = DedupLedger::new();

        let outcome = h.orchestrator.extract(&trigger(7), &mut ctx, &mut ledger).unwrap();

        assert_eq!(h.store.records()[0].text, NO_TEXT_SENTINEL);
        assert!(matches!(outcome, ExtractionOutcome::Recorded { degraded: true, .. }));
        assert!(ledger.contains(7));
    }

    #[test]
    fn test_whitespace_text_uses_sentinel() {
        let mut h = harness(ScriptedRecognizer::always_text("   "));
        let mut ctx = FrameContext::new(1, solid_frame(100, 100));
        h.orchestrator
            .extract(&trigger(7), &mut ctx, &mut DedupLedger::new())
            .unwrap();
        assert_eq!(h.store.records()[0].text, NO_TEXT_SENTINEL);
    }

    #[test]
    fn test_recognizer_error_does_not_abort() {
        let mut h = harness(ScriptedRecognizer::failing());
        let mut ctx = FrameContext::new(1, solid_frame(100, 100));
        let mut ledger = DedupLedger::new();

        let outcome = h.orchestrator.extract(&trigger(7), &mut ctx, &mut ledger);

        assert!(outcome.is_ok());
        assert_eq!(h.store.records()[0].text, NO_TEXT_SENTINEL);
        assert!(ledger.contains(7));
    }

    #[test]
    fn test_missing_engine_uses_unavailable_sentinel() {
        let mut h = harness(ScriptedRecognizer::always(Recognition::Unavailable));
        let mut ctx = FrameContext::new(1, solid_frame(100, 100));
        h.orchestrator
            .extract(&trigger(7), &mut ctx, &mut DedupLedger::new())
            .unwrap();
        assert_eq!(h.store.records()[0].text, OCR_UNAVAILABLE_SENTINEL);
        assert!(h.images.paths()[0]
            .to_string_lossy()
            .starts_with("out/2024-05-01/OCR_NOT_AVAILABLE_"));
    }

    #[test]
    fn test_record_failure_leaves_ledger_untouched() {
        let mut h = harness(ScriptedRecognizer::always_text("KA01"));
        h.store.fail_appends();
        let mut ctx = FrameContext::new(1, solid_frame(100, 100));
        let mut ledger = DedupLedger::new();

        let err = h.orchestrator.extract(&trigger(7), &mut ctx, &mut ledger).unwrap_err();

        assert!(format!("{:#}", err).contains("event record"));
        assert!(!ledger.contains(7));
        assert!(ctx.annotations.is_empty());
    }

    #[test]
    fn test_image_failure_skips_record_and_ledger() {
        let mut h = harness(ScriptedRecognizer::always_text("KA01"));
        h.images.fail_writes();
        let mut ctx = FrameContext::new(1, solid_frame(100, 100));
        let mut ledger = DedupLedger::new();

        assert!(h.orchestrator.extract(&trigger(7), &mut ctx, &mut ledger).is_err());
        assert!(h.store.records().is_empty());
        assert!(!ledger.contains(7));
    }

    #[test]
    fn test_box_outside_frame_is_skipped() {
        let mut h = harness(ScriptedRecognizer::always_text("KA01"));
        let mut ctx = FrameContext::new(1, solid_frame(100, 100));
        let mut ledger = DedupLedger::new();
        let t = Trigger {
            track_id: 3,
            bbox: BoundingBox::new(150, 150, 160, 160),
            confidence: 0.9,
        };

        let outcome = h.orchestrator.extract(&t, &mut ctx, &mut ledger).unwrap();

        assert_eq!(outcome, ExtractionOutcome::EmptyCrop { track_id: 3 });
        assert!(h.store.records().is_empty());
        assert!(!ledger.contains(3));
    }

    #[test]
    fn test_file_stem_is_sanitized() {
        assert_eq!(file_stem_for("KA 01/AB:12"), "KA_01_AB_12");
        assert_eq!(file_stem_for("NO_PLATE_DETECTED"), "NO_PLATE_DETECTED");
        assert_eq!(
            Path::new(&file_stem_for("../../etc")).components().count(),
            1
        );
    }
}
