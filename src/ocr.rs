//! Receipt processing facade
//!
//! Owns the enhancement pipeline and the engine registry, and runs the full
//! decode → enhance → recognize → extract sequence for one uploaded image.

use crate::config::Config;
use crate::engine::{RecognitionEngine, RecognitionMode, RecognitionOutput};
use crate::engines::{EngineInfo, EngineRegistry};
use crate::enhance::{Pipeline, StepTiming};
use crate::error::ReceiptError;
use crate::extract::{self, ExpenseRecord};
use image::DynamicImage;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::time::Duration;
use uuid::Uuid;

/// Everything produced for one receipt.
#[derive(Debug, Clone)]
pub struct ProcessedReceipt {
    pub record: ExpenseRecord,
    pub text: String,
    pub confidence: f32,
    pub warnings: Vec<String>,
    pub enhancement_time_ms: u64,
    pub enhancement_steps: Vec<StepTiming>,
}

pub struct ReceiptProcessor {
    registry: EngineRegistry,
    pipeline: Pipeline,
    timeout: Duration,
    debug_dir: Option<PathBuf>,
}

impl ReceiptProcessor {
    pub fn new(config: &Config) -> Result<Self, ReceiptError> {
        let registry = EngineRegistry::new(config)?;
        Ok(Self {
            registry,
            pipeline: Pipeline::new(config.enhance.clone()),
            timeout: Duration::from_secs(config.recognition_timeout_secs),
            debug_dir: config.debug_capture_dir.clone(),
        })
    }

    /// Run the full sequence on raw uploaded bytes.
    pub fn process(
        &self,
        data: &[u8],
        language: &str,
        mode: RecognitionMode,
    ) -> Result<ProcessedReceipt, ReceiptError> {
        let receipt_id = Uuid::new_v4();

        let image = image::load_from_memory(data)
            .map_err(|e| ReceiptError::Decode(format!("unreadable image: {}", e)))?;
        if image.width() == 0 || image.height() == 0 {
            return Err(ReceiptError::InvalidImage(
                "decoded image has zero area".to_string(),
            ));
        }

        let enhanced = self.pipeline.process(image)?;

        if let Some(dir) = &self.debug_dir {
            enhanced.write_captures(&dir.join(receipt_id.to_string()))?;
        }

        let engine = self
            .registry
            .default()
            .ok_or_else(|| ReceiptError::Initialization("no default engine".to_string()))?;

        let output = self.recognize_with_deadline(
            engine,
            enhanced.image.clone(),
            language.to_string(),
            mode,
        )?;

        let record = extract::parse_receipt_text(&output.text, receipt_id);

        tracing::info!(
            receipt_id = %receipt_id,
            vendor = record.vendor_name.as_deref().unwrap_or("unknown"),
            total = record.total.unwrap_or(0.0),
            confidence = output.confidence,
            "receipt processed"
        );

        Ok(ProcessedReceipt {
            record,
            text: output.text,
            confidence: output.confidence,
            warnings: output.warnings,
            enhancement_time_ms: enhanced.total_time_ms,
            enhancement_steps: enhanced.steps,
        })
    }

    /// Run recognition on its own thread under a deadline. On expiry the
    /// worker thread finishes in the background and its result is dropped;
    /// the request fails with a timeout either way.
    fn recognize_with_deadline(
        &self,
        engine: Arc<dyn RecognitionEngine>,
        image: DynamicImage,
        language: String,
        mode: RecognitionMode,
    ) -> Result<RecognitionOutput, ReceiptError> {
        let seconds = self.timeout.as_secs();
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || {
            let _ = tx.send(engine.recognize(&image, &language, mode));
        });

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(_) => Err(ReceiptError::RecognitionTimeout { seconds }),
        }
    }

    pub fn engines(&self) -> Vec<EngineInfo> {
        self.registry.info()
    }

    pub fn default_engine_name(&self) -> &str {
        self.registry.default_name()
    }
}
