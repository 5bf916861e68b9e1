//! Leptess/Tesseract engine implementation
//!
//! Tesseract-based recognition, better for noisy phone photos. Uses the
//! tesseract-static crate for static linking (no system dependencies) and
//! downloads tessdata automatically on first use.

use crate::config::Config;
use crate::engine::{RecognitionEngine, RecognitionMode, RecognitionOutput};
use crate::error::ReceiptError;
use image::DynamicImage;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tesseract_static::tesseract::Tesseract;

impl RecognitionMode {
    /// Tesseract page-segmentation mode number
    fn psm(&self) -> &'static str {
        match self {
            RecognitionMode::Auto => "3",
            RecognitionMode::UniformBlock => "6",
            RecognitionMode::SparseText => "11",
        }
    }
}

/// Tesseract recognition engine
pub struct LeptessEngine {
    /// Path to tessdata directory
    tessdata_path: String,
    /// Default language
    default_language: String,
}

impl LeptessEngine {
    /// Create a new Tesseract-based engine
    pub fn new(config: &Config) -> Result<Self, ReceiptError> {
        let default_language = config.default_language.clone();

        let tessdata_path = match &config.tessdata_path {
            Some(path) => path.clone(),
            None => ensure_tessdata_available(&default_language)?,
        };

        // Validate tessdata by doing a test initialization
        let test_tess =
            Tesseract::new(Some(&tessdata_path), Some(&default_language)).map_err(|e| {
                ReceiptError::Initialization(format!("Failed to initialize Tesseract: {}", e))
            })?;
        drop(test_tess);

        tracing::info!(
            "Leptess engine initialized (tessdata: {}, language: {})",
            tessdata_path,
            default_language
        );

        Ok(Self {
            tessdata_path,
            default_language,
        })
    }
}

impl RecognitionEngine for LeptessEngine {
    fn name(&self) -> &'static str {
        "leptess"
    }

    fn description(&self) -> &'static str {
        "Tesseract OCR engine - better for noisy/messy images like phone photos"
    }

    fn recognize(
        &self,
        image: &DynamicImage,
        language: &str,
        mode: RecognitionMode,
    ) -> Result<RecognitionOutput, ReceiptError> {
        let mut warnings = Vec::new();

        let language = if language.is_empty() {
            self.default_language.as_str()
        } else {
            language
        };

        // Tessdata for non-default languages is fetched lazily.
        if language != self.default_language && ensure_tessdata_available(language).is_err() {
            warnings.push(format!(
                "no tessdata for '{}', falling back to '{}'",
                language, self.default_language
            ));
        }

        // Convert to BMP in memory (BMP is always supported by leptonica)
        let rgb_img = image.to_rgb8();
        let mut bmp_data = Vec::new();
        {
            let mut cursor = std::io::Cursor::new(&mut bmp_data);
            rgb_img
                .write_to(&mut cursor, image::ImageFormat::Bmp)
                .map_err(|e| ReceiptError::Encode(format!("Failed to convert to BMP: {}", e)))?;
        }

        let mut tess = Tesseract::new(Some(&self.tessdata_path), Some(language))
            .map_err(|e| ReceiptError::Recognition(format!("Failed to create Tesseract: {}", e)))?;

        tess = tess
            .set_variable("tessedit_pageseg_mode", mode.psm())
            .map_err(|e| {
                ReceiptError::Recognition(format!("Failed to set segmentation mode: {}", e))
            })?;

        tess = tess.set_image_from_mem(&bmp_data).map_err(|e| {
            ReceiptError::Recognition(format!(
                "Failed to set image ({}x{}): {}",
                rgb_img.width(),
                rgb_img.height(),
                e
            ))
        })?;

        tess = tess
            .recognize()
            .map_err(|e| ReceiptError::Recognition(format!("Failed to recognize text: {}", e)))?;

        let text = tess
            .get_text()
            .map_err(|e| ReceiptError::Recognition(format!("Failed to get text: {}", e)))?;

        // 0-100 scale, convert to 0.0-1.0
        let confidence = tess.mean_text_conf() as f32 / 100.0;

        Ok(RecognitionOutput {
            text: text.trim().to_string(),
            confidence,
            warnings,
        })
    }

    fn supported_languages(&self) -> Vec<String> {
        vec![
            "eng".to_string(),
            "deu".to_string(),
            "fra".to_string(),
            "spa".to_string(),
            "ita".to_string(),
            "por".to_string(),
            "nld".to_string(),
        ]
    }
}

/// Ensure tessdata is available, downloading if needed
fn ensure_tessdata_available(language: &str) -> Result<String, ReceiptError> {
    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("receipt-ocr")
        .join("tessdata");

    std::fs::create_dir_all(&cache_dir).map_err(|e| {
        ReceiptError::Initialization(format!("Failed to create tessdata directory: {}", e))
    })?;

    let traineddata_path = cache_dir.join(format!("{}.traineddata", language));

    if !traineddata_path.exists() {
        let url = tessdata_url(language);
        tracing::info!(
            "Downloading tessdata for '{}' (this may take a moment)...",
            language
        );
        download_file(&url, &traineddata_path)?;
        tracing::info!("Downloaded tessdata to {:?}", traineddata_path);
    }

    // Tesseract expects the directory, not the file
    cache_dir
        .to_str()
        .map(|s| s.to_string())
        .ok_or_else(|| ReceiptError::Initialization("Invalid tessdata path".to_string()))
}

/// tessdata_fast: smaller, faster downloads
fn tessdata_url(language: &str) -> String {
    format!(
        "https://github.com/tesseract-ocr/tessdata_fast/raw/main/{}.traineddata",
        language
    )
}

fn download_file(url: &str, path: &Path) -> Result<(), ReceiptError> {
    let response = ureq::get(url).call().map_err(|e| {
        ReceiptError::Initialization(format!("Failed to download tessdata: {}", e))
    })?;

    let buffer = response.into_body().read_to_vec().map_err(|e| {
        ReceiptError::Initialization(format!("Failed to read tessdata response: {}", e))
    })?;

    let mut file = File::create(path).map_err(|e| {
        ReceiptError::Initialization(format!("Failed to create tessdata file: {}", e))
    })?;
    file.write_all(&buffer).map_err(|e| {
        ReceiptError::Initialization(format!("Failed to write tessdata file: {}", e))
    })?;

    Ok(())
}
