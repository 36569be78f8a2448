// src/error.rs

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegionError {
    #[error("region polygon needs at least 3 points, got {0}")]
    TooFewPoints(usize),
}

/// Failures that stop the monitor before the frame loop starts. Each variant
/// names the collaborator that could not be brought up.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("config {path}: {reason}")]
    Config { path: String, reason: String },

    #[error("region: {0}")]
    Region(#[from] RegionError),

    #[error("frame source {uri}: {reason}")]
    FrameSource { uri: String, reason: String },

    #[error("detector model {path}: {reason}")]
    Detector { path: String, reason: String },

    #[error("text recognizer {path}: {reason}")]
    Recognizer { path: String, reason: String },

    #[error("output location {path}: {reason}")]
    Output { path: String, reason: String },

    #[error("display: {0}")]
    Display(String),
}

impl StartupError {
    pub fn collaborator(&self) -> &'static str {
        match self {
            StartupError::Config { .. } => "config",
            StartupError::Region(_) => "region",
            StartupError::FrameSource { .. } => "frame source",
            StartupError::Detector { .. } => "detector",
            StartupError::Recognizer { .. } => "recognizer",
            StartupError::Output { .. } => "output",
            StartupError::Display(_) => "display",
        }
    }
}
