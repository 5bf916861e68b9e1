//! ocrs engine implementation
//!
//! Pure Rust OCR engine using the ocrs library. No system dependencies
//! required. Downloads neural network models automatically on first use.

use crate::config::Config;
use crate::engine::{RecognitionEngine, RecognitionMode, RecognitionOutput};
use crate::error::ReceiptError;
use image::DynamicImage;
use ocrs::{DecodeMethod, ImageSource, OcrEngine as OcrsOcrEngine, OcrEngineParams};
use rten::Model;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default model URLs from the ocrs project
const DETECTION_MODEL_URL: &str =
    "https://ocrs-models.s3-accelerate.amazonaws.com/text-detection.rten";
const RECOGNITION_MODEL_URL: &str =
    "https://ocrs-models.s3-accelerate.amazonaws.com/text-recognition.rten";

/// Recognition engine wrapping the ocrs library
pub struct OcrsEngine {
    engine: Arc<OcrsOcrEngine>,
}

impl OcrsEngine {
    /// Create a new engine, downloading models if needed
    pub fn new(_config: &Config) -> Result<Self, ReceiptError> {
        let detection_model_path =
            ensure_model_downloaded(DETECTION_MODEL_URL, "text-detection.rten")?;
        let recognition_model_path =
            ensure_model_downloaded(RECOGNITION_MODEL_URL, "text-recognition.rten")?;

        let detection_model = Model::load_file(&detection_model_path).map_err(|e| {
            ReceiptError::Initialization(format!("Failed to load detection model: {}", e))
        })?;
        let recognition_model = Model::load_file(&recognition_model_path).map_err(|e| {
            ReceiptError::Initialization(format!("Failed to load recognition model: {}", e))
        })?;

        let engine = OcrsOcrEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            decode_method: DecodeMethod::Greedy,
            ..Default::default()
        })
        .map_err(|e| {
            ReceiptError::Initialization(format!("Failed to create ocrs engine: {}", e))
        })?;

        tracing::info!("ocrs engine initialized successfully");

        Ok(Self {
            engine: Arc::new(engine),
        })
    }
}

impl RecognitionEngine for OcrsEngine {
    fn name(&self) -> &'static str {
        "ocrs"
    }

    fn description(&self) -> &'static str {
        "Pure Rust OCR engine - fast, no system dependencies required"
    }

    fn recognize(
        &self,
        image: &DynamicImage,
        language: &str,
        _mode: RecognitionMode,
    ) -> Result<RecognitionOutput, ReceiptError> {
        let mut warnings = Vec::new();
        // ocrs has no segmentation modes and is English/Latin-only.
        if language != "eng" {
            warnings.push(format!(
                "ocrs only supports 'eng'; requested language '{}' ignored",
                language
            ));
        }

        let rgb_img = image.to_rgb8();
        let dimensions = rgb_img.dimensions();

        // HWC byte layout, which is what ImageSource::from_bytes expects
        let img_source = ImageSource::from_bytes(rgb_img.as_raw(), dimensions).map_err(|e| {
            ReceiptError::Recognition(format!("Failed to create image source: {}", e))
        })?;

        let ocr_input = self
            .engine
            .prepare_input(img_source)
            .map_err(|e| ReceiptError::Recognition(format!("Failed to prepare input: {}", e)))?;

        let word_rects = self
            .engine
            .detect_words(&ocr_input)
            .map_err(|e| ReceiptError::Recognition(format!("Failed to detect words: {}", e)))?;

        let line_rects = self.engine.find_text_lines(&ocr_input, &word_rects);

        let line_texts = self
            .engine
            .recognize_text(&ocr_input, &line_rects)
            .map_err(|e| ReceiptError::Recognition(format!("Failed to recognize text: {}", e)))?;

        let text: String = line_texts
            .iter()
            .filter_map(|line| line.as_ref())
            .map(|line| {
                line.words()
                    .map(|word| word.to_string())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n");

        let confidence = estimate_confidence(&text);

        Ok(RecognitionOutput {
            text,
            confidence,
            warnings,
        })
    }

    fn supported_languages(&self) -> Vec<String> {
        vec!["eng".to_string()]
    }
}

/// Ensure a model file is cached locally, downloading it on first use
fn ensure_model_downloaded(url: &str, filename: &str) -> Result<PathBuf, ReceiptError> {
    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("receipt-ocr")
        .join("models");

    std::fs::create_dir_all(&cache_dir).map_err(|e| {
        ReceiptError::Initialization(format!("Failed to create model directory: {}", e))
    })?;

    let model_path = cache_dir.join(filename);

    if !model_path.exists() {
        tracing::info!("Downloading {} (this may take a moment)...", filename);
        download_file(url, &model_path)?;
        tracing::info!("Downloaded model to {:?}", model_path);
    }

    Ok(model_path)
}

fn download_file(url: &str, path: &Path) -> Result<(), ReceiptError> {
    let response = ureq::get(url)
        .call()
        .map_err(|e| ReceiptError::Initialization(format!("Failed to download model: {}", e)))?;

    let buffer = response.into_body().read_to_vec().map_err(|e| {
        ReceiptError::Initialization(format!("Failed to read model response: {}", e))
    })?;

    let mut file = File::create(path)
        .map_err(|e| ReceiptError::Initialization(format!("Failed to create model file: {}", e)))?;
    file.write_all(&buffer)
        .map_err(|e| ReceiptError::Initialization(format!("Failed to write model file: {}", e)))?;

    Ok(())
}

/// Heuristic confidence score for recognized receipt text.
///
/// ocrs provides no per-character confidence, so score the shape of the
/// output instead. Receipts are digit-heavy, so digits and currency
/// punctuation count toward quality alongside letters; a pile of exotic
/// symbols is the usual signature of garbled recognition.
fn estimate_confidence(text: &str) -> f32 {
    if text.is_empty() {
        return 0.0;
    }
    let total = text.chars().count();
    if total < 5 {
        return 0.5;
    }

    let meaningful = text
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '$' | '.' | ',' | '/' | '%' | '-' | ':'))
        .count();
    let garbage = text
        .chars()
        .filter(|c| !c.is_alphanumeric() && !c.is_whitespace() && !c.is_ascii_punctuation())
        .count();

    let meaningful_ratio = meaningful as f32 / total as f32;
    let garbage_penalty = (garbage as f32 / total as f32 * 10.0).min(1.0);

    // Receipts have short lines; a single enormous "line" usually means the
    // layout analysis failed.
    let lines = text.lines().count().max(1);
    let avg_line_len = total as f32 / lines as f32;
    let structure_score = if avg_line_len < 80.0 { 1.0 } else { 0.5 };

    (0.6 * meaningful_ratio + 0.25 * structure_score + 0.15 * (1.0 - garbage_penalty))
        .clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_empty_text_is_zero() {
        assert_eq!(estimate_confidence(""), 0.0);
    }

    #[test]
    fn test_confidence_receipt_text_scores_high() {
        let text = "CORNER MARKET\n123 Main St\nCoffee 3.50\nBagel 2.25\nTOTAL $5.75";
        assert!(estimate_confidence(text) > 0.7);
    }

    #[test]
    fn test_confidence_garbled_text_scores_low() {
        let garbled = "\u{fffd}\u{2620}\u{fffd}\u{25a0}\u{fffd} \u{fffd}\u{fffd}\u{2620}\u{25a0}";
        assert!(estimate_confidence(garbled) < estimate_confidence("TOTAL 12.99"));
    }
}
