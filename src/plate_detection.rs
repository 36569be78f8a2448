// src/plate_detection.rs

use crate::inference::InferenceEngine;
use crate::preprocessing::{self, Letterbox};
use crate::types::{DetectorConfig, Frame};
use anyhow::{bail, Result};
use tracing::{debug, info};

/// Untracked model output in frame pixel coordinates.
#[derive(Debug, Clone)]
pub struct RawDetection {
    pub bbox: [f32; 4], // [x1, y1, x2, y2] in original image coordinates
    pub confidence: f32,
    pub class_id: usize,
    pub class_name: String,
}

/// YOLOv8-style detector trained on helmet / no-helmet / numberplate classes.
pub struct PlateDetector {
    engine: InferenceEngine,
    input_size: usize,
    class_names: Vec<String>,
    confidence_threshold: f32,
    nms_iou_threshold: f32,
}

impl PlateDetector {
    pub fn new(config: &DetectorConfig) -> Result<Self> {
        if config.class_names.is_empty() {
            bail!("detector.class_names is empty");
        }

        let engine = InferenceEngine::new(&config.model_path, config.num_threads)?;

        info!(
            "✓ Plate detector initialized ({} classes: {})",
            config.class_names.len(),
            config.class_names.join(", ")
        );

        Ok(Self {
            engine,
            input_size: config.input_size,
            class_names: config.class_names.clone(),
            confidence_threshold: config.confidence_threshold,
            nms_iou_threshold: config.nms_iou_threshold,
        })
    }

    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>> {
        // 1. Preprocess (letterbox + normalize)
        let mut letterbox =
            preprocessing::letterbox(&frame.data, frame.width, frame.height, self.input_size);
        let shape = [1, 3, self.input_size, self.input_size];
        let input = std::mem::take(&mut letterbox.input);

        // 2. Run inference
        let (output_shape, output) = self.engine.infer(shape, input)?;

        // 3. Postprocess (parse detections + NMS)
        let detections = decode_predictions(
            &output,
            &output_shape,
            &letterbox,
            &self.class_names,
            self.confidence_threshold,
        )?;
        let detections = nms(detections, self.nms_iou_threshold);

        debug!("Detected {} objects", detections.len());
        Ok(detections)
    }
}

/// YOLOv8 output: [1, 4 + num_classes, num_predictions], each column is
/// [cx, cy, w, h, class0_conf, class1_conf, ...] in letterboxed input space.
fn decode_predictions(
    output: &[f32],
    output_shape: &[i64],
    letterbox: &Letterbox,
    class_names: &[String],
    conf_thresh: f32,
) -> Result<Vec<RawDetection>> {
    if output_shape.len() != 3 {
        bail!("unexpected detector output rank: {:?}", output_shape);
    }
    let num_rows = output_shape[1] as usize;
    let num_preds = output_shape[2] as usize;
    let num_classes = class_names.len();

    if num_rows != 4 + num_classes {
        bail!(
            "detector output has {} rows but {} class names are configured",
            num_rows,
            num_classes
        );
    }
    if output.len() < num_rows * num_preds {
        bail!("detector output is truncated");
    }

    let mut detections = Vec::new();

    for i in 0..num_preds {
        let cx = output[i];
        let cy = output[num_preds + i];
        let w = output[num_preds * 2 + i];
        let h = output[num_preds * 3 + i];

        // Find best class
        let mut max_conf = 0.0f32;
        let mut best_class = 0;
        for c in 0..num_classes {
            let conf = output[num_preds * (4 + c) + i];
            if conf > max_conf {
                max_conf = conf;
                best_class = c;
            }
        }

        if max_conf < conf_thresh {
            continue;
        }

        let bbox = letterbox.unmap([cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0]);
        if bbox[2] <= bbox[0] || bbox[3] <= bbox[1] {
            continue;
        }

        detections.push(RawDetection {
            bbox,
            confidence: max_conf,
            class_id: best_class,
            class_name: class_names[best_class].clone(),
        });
    }

    Ok(detections)
}

/// Per-class non-maximum suppression. A plate box never suppresses a rider box.
fn nms(mut detections: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    if detections.is_empty() {
        return detections;
    }

    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<RawDetection> = Vec::new();

    for det in detections {
        let suppressed = keep.iter().any(|kept| {
            kept.class_id == det.class_id && calculate_iou(&kept.bbox, &det.bbox) >= iou_threshold
        });
        if !suppressed {
            keep.push(det);
        }
    }

    keep
}

pub fn calculate_iou(box1: &[f32; 4], box2: &[f32; 4]) -> f32 {
    let x1 = box1[0].max(box2[0]);
    let y1 = box1[1].max(box2[1]);
    let x2 = box1[2].min(box2[2]);
    let y2 = box1[3].min(box2[3]);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area1 = (box1[2] - box1[0]) * (box1[3] - box1[1]);
    let area2 = (box2[2] - box2[0]) * (box2[3] - box2[1]);
    let union = area1 + area2 - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        vec!["helmet".into(), "no-helmet".into(), "numberplate".into()]
    }

    fn identity_letterbox() -> Letterbox {
        Letterbox {
            input: Vec::new(),
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
        }
    }

    /// Build a [1, 7, N] tensor from (cx, cy, w, h, class, conf) tuples.
    fn tensor(preds: &[(f32, f32, f32, f32, usize, f32)]) -> (Vec<f32>, Vec<i64>) {
        let n = preds.len();
        let mut out = vec![0.0f32; 7 * n];
        for (i, &(cx, cy, w, h, class, conf)) in preds.iter().enumerate() {
            out[i] = cx;
            out[n + i] = cy;
            out[2 * n + i] = w;
            out[3 * n + i] = h;
            out[(4 + class) * n + i] = conf;
        }
        (out, vec![1, 7, n as i64])
    }

    #[test]
    fn test_decode_filters_by_confidence() {
        let (out, shape) = tensor(&[
            (50.0, 50.0, 20.0, 10.0, 2, 0.9),
            (100.0, 100.0, 40.0, 40.0, 1, 0.1),
        ]);
        let dets = decode_predictions(&out, &shape, &identity_letterbox(), &names(), 0.3).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_name, "numberplate");
        assert_eq!(dets[0].bbox, [40.0, 45.0, 60.0, 55.0]);
    }

    #[test]
    fn test_decode_undoes_letterbox() {
        let (out, shape) = tensor(&[(50.0, 110.0, 20.0, 20.0, 1, 0.8)]);
        let lb = Letterbox {
            input: Vec::new(),
            scale: 0.5,
            pad_x: 0.0,
            pad_y: 50.0,
        };
        let dets = decode_predictions(&out, &shape, &lb, &names(), 0.3).unwrap();
        assert_eq!(dets[0].bbox, [80.0, 100.0, 120.0, 140.0]);
    }

    #[test]
    fn test_decode_rejects_class_mismatch() {
        let (out, _) = tensor(&[(50.0, 50.0, 20.0, 10.0, 2, 0.9)]);
        let err = decode_predictions(&out, &[1, 8, 1], &identity_letterbox(), &names(), 0.3);
        assert!(err.is_err());
    }

    #[test]
    fn test_nms_is_per_class() {
        let det = |class_id: usize, conf: f32| RawDetection {
            bbox: [0.0, 0.0, 10.0, 10.0],
            confidence: conf,
            class_id,
            class_name: names()[class_id].clone(),
        };
        let kept = nms(vec![det(2, 0.6), det(2, 0.9), det(1, 0.5)], 0.45);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].class_id, 1);
    }

    #[test]
    fn test_iou() {
        assert_eq!(calculate_iou(&[0.0, 0.0, 10.0, 10.0], &[0.0, 0.0, 10.0, 10.0]), 1.0);
        assert_eq!(calculate_iou(&[0.0, 0.0, 10.0, 10.0], &[20.0, 20.0, 30.0, 30.0]), 0.0);
        let iou = calculate_iou(&[0.0, 0.0, 10.0, 10.0], &[5.0, 0.0, 15.0, 10.0]);
        assert!((iou - 1.0 / 3.0).abs() < 1e-6);
    }
}
