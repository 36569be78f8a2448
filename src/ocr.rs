// src/ocr.rs

use crate::inference::InferenceEngine;
use crate::interface::{Recognition, TextRecognizer};
use crate::preprocessing;
use crate::types::{Crop, OcrConfig};
use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};

/// CRNN-style line recognizer (PaddleOCR rec export) decoded with greedy CTC.
/// Output is `[1, steps, classes]` probabilities where class 0 is the CTC
/// blank, classes `1..=len` map onto the dictionary and the one after that
/// is a space.
pub struct OnnxTextRecognizer {
    engine: InferenceEngine,
    charset: Vec<String>,
    input_height: usize,
    max_width: usize,
    min_score: f32,
}

impl OnnxTextRecognizer {
    pub fn new(config: &OcrConfig) -> Result<Self> {
        let model_path = config
            .model_path
            .as_deref()
            .context("ocr.model_path is not set")?;
        let keys_path = config
            .keys_path
            .as_deref()
            .context("ocr.keys_path is not set")?;

        let charset = load_charset(keys_path)?;
        let engine = InferenceEngine::new(model_path, config.num_threads)?;

        info!(
            "✓ Text recognizer ready ({} symbols, input {}x{})",
            charset.len(),
            config.max_width,
            config.input_height
        );

        Ok(Self {
            engine,
            charset,
            input_height: config.input_height,
            max_width: config.max_width,
            min_score: config.min_score,
        })
    }
}

impl TextRecognizer for OnnxTextRecognizer {
    fn recognize(&mut self, crop: &Crop) -> Result<Recognition> {
        let input = preprocessing::recognizer_input(crop, self.input_height, self.max_width);
        let shape = [1, 3, self.input_height, self.max_width];
        let (output_shape, probs) = self.engine.infer(shape, input)?;

        let (steps, classes) = match output_shape.as_slice() {
            [_, steps, classes] if *steps >= 0 && *classes >= 0 => {
                (*steps as usize, *classes as usize)
            }
            _ => bail!("unexpected recognizer output shape {:?}", output_shape),
        };

        let (text, score) = ctc_greedy_decode(&probs, steps, classes, &self.charset)?;
        debug!("OCR raw '{}' (score {:.2})", text, score);

        if text.is_empty() || score < self.min_score {
            return Ok(Recognition::Nothing);
        }
        Ok(Recognition::Text(text))
    }
}

/// Stand-in when no recognition model is configured.
pub struct NullRecognizer;

impl NullRecognizer {
    pub fn new() -> Self {
        warn!("⚪ No OCR model configured, plates will be recorded without text");
        Self
    }
}

impl TextRecognizer for NullRecognizer {
    fn recognize(&mut self, _crop: &Crop) -> Result<Recognition> {
        Ok(Recognition::Unavailable)
    }
}

fn load_charset(path: &str) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read OCR dictionary {}", path))?;
    let charset: Vec<String> = raw
        .lines()
        .map(|line| line.trim_end_matches('\r').to_string())
        .filter(|line| !line.is_empty())
        .collect();

    if charset.is_empty() {
        bail!("OCR dictionary {} is empty", path);
    }
    Ok(charset)
}

/// Best class per step, repeats collapsed, blanks dropped. The score is the
/// mean probability of the emitted symbols.
pub fn ctc_greedy_decode(
    probs: &[f32],
    steps: usize,
    classes: usize,
    charset: &[String],
) -> Result<(String, f32)> {
    if steps == 0 || classes == 0 {
        bail!("empty recognizer output shape {}x{}", steps, classes);
    }
    if steps.checked_mul(classes).map_or(true, |needed| probs.len() < needed) {
        bail!(
            "recognizer output too short: {} values for {}x{}",
            probs.len(),
            steps,
            classes
        );
    }

    let mut text = String::new();
    let mut confidences = Vec::new();
    let mut previous = 0usize;

    for row in probs.chunks_exact(classes).take(steps) {
        let (best, prob) = row
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::MIN), |acc, (i, p)| if p > acc.1 { (i, p) } else { acc });

        if best != 0 && best != previous {
            let symbol = match best - 1 {
                idx if idx < charset.len() => charset[idx].as_str(),
                idx if idx == charset.len() => " ",
                _ => "",
            };
            if !symbol.is_empty() {
                text.push_str(symbol);
                confidences.push(prob);
            }
        }
        previous = best;
    }

    let score = if confidences.is_empty() {
        0.0
    } else {
        confidences.iter().sum::<f32>() / confidences.len() as f32
    };
    Ok((text.trim().to_string(), score))
}
