use crate::error::ReceiptError;
use image::DynamicImage;
use serde::Deserialize;

/// Page-segmentation hint passed to the recognition engine.
///
/// Receipts are a single uniform block of left-aligned text, which is why
/// `UniformBlock` is the default; engines that have no notion of
/// segmentation modes are free to ignore the hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionMode {
    /// Let the engine segment the page itself.
    Auto,
    /// Treat the image as one uniform block of text.
    #[default]
    UniformBlock,
    /// Find text in no particular order (sparse layouts).
    SparseText,
}

impl RecognitionMode {
    /// Parse from a form/query parameter string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "uniform_block" => Some(Self::UniformBlock),
            "sparse_text" => Some(Self::SparseText),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::UniformBlock => "uniform_block",
            Self::SparseText => "sparse_text",
        }
    }
}

/// Recognition result
#[derive(Debug, Clone)]
pub struct RecognitionOutput {
    pub text: String,
    pub confidence: f32,
    pub warnings: Vec<String>,
}

/// Trait that all recognition engines must implement.
///
/// Engines consume the enhanced in-memory image produced by the pipeline;
/// they never touch the filesystem for input.
pub trait RecognitionEngine: Send + Sync {
    /// Returns the engine identifier (e.g., "ocrs", "leptess")
    fn name(&self) -> &'static str;

    /// Returns a human-readable description of the engine
    fn description(&self) -> &'static str;

    /// Recognize text in an enhanced receipt image
    fn recognize(
        &self,
        image: &DynamicImage,
        language: &str,
        mode: RecognitionMode,
    ) -> Result<RecognitionOutput, ReceiptError>;

    /// Get supported languages
    fn supported_languages(&self) -> Vec<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_round_trips_through_strings() {
        for mode in [
            RecognitionMode::Auto,
            RecognitionMode::UniformBlock,
            RecognitionMode::SparseText,
        ] {
            assert_eq!(RecognitionMode::from_str(mode.as_str()), Some(mode));
        }
        assert_eq!(RecognitionMode::from_str("psm99"), None);
    }
}
