use serde::{Deserialize, Serialize};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub zone: ZoneConfig,
    pub detector: DetectorConfig,
    pub tracker: TrackerConfig,
    pub labels: LabelConfig,
    pub ocr: OcrConfig,
    pub extraction: ExtractionConfig,
    pub output: OutputConfig,
    pub display: DisplayConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Video file, stream URL, or a numeric camera index.
    pub uri: String,
    pub working_width: usize,
    pub working_height: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            uri: "final.mp4".to_string(),
            working_width: 1020,
            working_height: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneConfig {
    /// Polygon vertices in working-resolution pixels.
    pub polygon: Vec<[i32; 2]>,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            polygon: vec![[1, 173], [62, 468], [608, 431], [364, 155]],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub model_path: String,
    pub input_size: usize,
    /// Model class names, indexed by class id.
    pub class_names: Vec<String>,
    pub confidence_threshold: f32,
    pub nms_iou_threshold: f32,
    pub num_threads: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: "models/best.onnx".to_string(),
            input_size: 640,
            class_names: vec![
                "helmet".to_string(),
                "no-helmet".to_string(),
                "numberplate".to_string(),
            ],
            confidence_threshold: 0.3,
            nms_iou_threshold: 0.45,
            num_threads: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub iou_threshold: f32,
    pub max_missing_frames: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.3,
            max_missing_frames: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    pub violation: String,
    pub identifier: String,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            violation: "no-helmet".to_string(),
            identifier: "numberplate".to_string(),
        }
    }
}

impl LabelConfig {
    pub fn classify(&self, class_name: &str) -> ClassLabel {
        if class_name == self.violation {
            ClassLabel::Violation
        } else if class_name == self.identifier {
            ClassLabel::Identifier
        } else {
            ClassLabel::Other(class_name.to_string())
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Recognition model. Leave unset to run without OCR.
    pub model_path: Option<String>,
    /// Character dictionary, one entry per line.
    pub keys_path: Option<String>,
    pub input_height: usize,
    pub max_width: usize,
    pub min_score: f32,
    pub num_threads: usize,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            keys_path: None,
            input_height: 48,
            max_width: 320,
            min_score: 0.5,
            num_threads: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub crop_width: usize,
    pub crop_height: usize,
    pub image_extension: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            crop_width: 120,
            crop_height: 85,
            image_extension: "jpg".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Parent of the per-day output directories.
    pub root_dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root_dir: ".".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub enabled: bool,
    pub window_name: String,
    pub stop_key: char,
    pub save_annotated: bool,
    pub annotated_fps: f64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_name: "RGB".to_string(),
            stop_key: 'q',
            save_annotated: false,
            annotated_fps: 25.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ============================================================================
// FRAMES AND DETECTIONS
// ============================================================================

/// Interleaved RGB frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub timestamp_ms: f64,
}

/// Interleaved RGB image cut out of a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Crop {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<[i32; 2]> for Point {
    fn from(p: [i32; 2]) -> Self {
        Self::new(p[0], p[1])
    }
}

/// Axis-aligned box in integer pixel coordinates, `x1 < x2`, `y1 < y2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Truncates float model output the same way a tensor `.int()` cast does.
    pub fn from_xyxy(bbox: [f32; 4]) -> Self {
        Self::new(
            bbox[0] as i32,
            bbox[1] as i32,
            bbox[2] as i32,
            bbox[3] as i32,
        )
    }

    /// Floor of the midpoint on each axis. The sum is taken in `i64`; the
    /// midpoint of two `i32`s always fits back into one.
    pub fn centroid(&self) -> Point {
        let mid = |a: i32, b: i32| (a as i64 + b as i64).div_euclid(2) as i32;
        Point::new(mid(self.x1, self.x2), mid(self.y1, self.y2))
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x1, self.y1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassLabel {
    Violation,
    Identifier,
    Other(String),
}

/// One classified, tracked object in one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub class_label: ClassLabel,
    pub track_id: Option<i64>,
    pub confidence: f32,
}

// ============================================================================
// EVENTS
// ============================================================================

/// Durable output of one trigger. Column names match the spreadsheet
/// layout operators already use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(rename = "Number Plate")]
    pub text: String,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Time")]
    pub time: String,
}

/// Text drawn on the displayed frame at a pixel position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub text: String,
    pub origin: Point,
}
