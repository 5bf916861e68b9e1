use crate::error::ReceiptError;
use image::DynamicImage;
use serde::Serialize;
use std::path::Path;
use std::time::Instant;

use super::steps;
use super::steps::denoise::DenoiseParams;
use super::steps::deskew::SkewParams;
use super::steps::shadows::ShadowParams;

/// Options for one enhancement run.
///
/// Every tunable of every stage lives here; the pipeline itself holds no
/// state beyond the current image. Given the same input and options the
/// output is byte-identical — nothing in the pipeline is randomized.
#[derive(Debug, Clone)]
pub struct EnhanceOptions {
    /// Uniform rescale factor applied first (default 1.2).
    pub rescale_factor: f32,
    /// Whether to run the fixed orientation rotation before skew correction.
    pub rotate_orientation: bool,
    /// Angle used by the orientation stage when the aspect heuristic decides
    /// the frame is sideways (default 90).
    pub orientation_angle: f32,
    pub skew: SkewParams,
    pub shadow: ShadowParams,
    pub denoise: DenoiseParams,
    /// Keep a copy of each stage's output for inspection.
    pub debug_capture: bool,
}

impl Default for EnhanceOptions {
    fn default() -> Self {
        Self {
            rescale_factor: 1.2,
            rotate_orientation: true,
            orientation_angle: 90.0,
            skew: SkewParams::default(),
            shadow: ShadowParams::default(),
            denoise: DenoiseParams::default(),
            debug_capture: false,
        }
    }
}

impl EnhanceOptions {
    /// Validate all options before any stage runs.
    pub fn validate(&self) -> Result<(), ReceiptError> {
        if !self.rescale_factor.is_finite() || self.rescale_factor <= 0.0 {
            return Err(ReceiptError::InvalidArgument(format!(
                "rescale factor must be positive, got {}",
                self.rescale_factor
            )));
        }
        if !self.orientation_angle.is_finite() {
            return Err(ReceiptError::InvalidArgument(format!(
                "orientation angle must be finite, got {}",
                self.orientation_angle
            )));
        }
        self.skew.validate()?;
        self.denoise.validate()?;
        Ok(())
    }
}

/// Timing information for a single enhancement stage
#[derive(Debug, Clone, Serialize)]
pub struct StepTiming {
    pub name: String,
    pub time_ms: u64,
}

/// One captured intermediate image, named by execution order
/// (e.g. `1_rescaled`, `2_rotated`).
#[derive(Debug, Clone)]
pub struct StageCapture {
    pub name: String,
    pub image: DynamicImage,
}

/// Result of an enhancement run.
#[derive(Debug, Clone)]
pub struct EnhanceResult {
    pub image: DynamicImage,
    pub total_time_ms: u64,
    pub steps: Vec<StepTiming>,
    /// Populated only when `debug_capture` is set; ordered by execution.
    pub captures: Vec<StageCapture>,
}

impl EnhanceResult {
    /// Write each captured stage as a PNG into `dir`, creating it if needed.
    /// File names match the capture names, so a directory listing reads in
    /// pipeline execution order.
    pub fn write_captures(&self, dir: &Path) -> Result<(), ReceiptError> {
        if self.captures.is_empty() {
            return Ok(());
        }
        std::fs::create_dir_all(dir).map_err(|e| {
            ReceiptError::Encode(format!("failed to create capture dir {}: {}", dir.display(), e))
        })?;
        for capture in &self.captures {
            let path = dir.join(format!("{}.png", capture.name));
            capture
                .image
                .save_with_format(&path, image::ImageFormat::Png)
                .map_err(|e| {
                    ReceiptError::Encode(format!("failed to write {}: {}", path.display(), e))
                })?;
        }
        Ok(())
    }
}

/// The enhancement pipeline: a fixed linear sequence of stages.
///
/// `rescale → (orientation rotate?) → remove shadows → skew correct →
/// grayscale → denoise`
///
/// The only branches are the two designed skips: the orientation stage's
/// aspect heuristic and the negligible-skew threshold inside deskew. Both
/// are configuration, not failures.
pub struct Pipeline {
    options: EnhanceOptions,
}

struct RunState {
    timings: Vec<StepTiming>,
    captures: Vec<StageCapture>,
    executed: usize,
}

impl Pipeline {
    pub fn new(options: EnhanceOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &EnhanceOptions {
        &self.options
    }

    /// Enhance one image. Options are validated before the first stage, and
    /// every stage boundary rejects zero-area images.
    pub fn process(&self, image: DynamicImage) -> Result<EnhanceResult, ReceiptError> {
        self.options.validate()?;

        let start = Instant::now();
        let mut state = RunState {
            timings: Vec::new(),
            captures: Vec::new(),
            executed: 0,
        };

        let mut img = image;

        img = self.run_step("rescaled", img, &mut state, |i| {
            steps::rescale::apply(i, self.options.rescale_factor)
        })?;

        if self.options.rotate_orientation {
            let angle = steps::rotate::orientation_angle(
                img.width(),
                img.height(),
                self.options.orientation_angle,
            );
            img = self.run_step("rotated", img, &mut state, |i| {
                steps::rotate::apply(i, angle)
            })?;
        }

        img = self.run_step("shadows_removed", img, &mut state, |i| {
            steps::shadows::apply(i, &self.options.shadow)
        })?;

        img = self.run_step("deskewed", img, &mut state, |i| {
            steps::deskew::apply(i, &self.options.skew)
        })?;

        img = self.run_step("grayscale", img, &mut state, steps::grayscale::apply)?;

        img = self.run_step("denoised", img, &mut state, |i| {
            steps::denoise::apply(i, &self.options.denoise)
        })?;

        Ok(EnhanceResult {
            image: img,
            total_time_ms: start.elapsed().as_millis() as u64,
            steps: state.timings,
            captures: state.captures,
        })
    }

    fn run_step<F>(
        &self,
        name: &str,
        img: DynamicImage,
        state: &mut RunState,
        step_fn: F,
    ) -> Result<DynamicImage, ReceiptError>
    where
        F: FnOnce(DynamicImage) -> Result<DynamicImage, ReceiptError>,
    {
        if img.width() == 0 || img.height() == 0 {
            return Err(ReceiptError::InvalidImage(format!(
                "zero-area image ({}x{}) entering stage {}",
                img.width(),
                img.height(),
                name
            )));
        }

        let step_start = Instant::now();
        let result = step_fn(img)?;
        let elapsed = step_start.elapsed().as_millis() as u64;

        state.executed += 1;
        state.timings.push(StepTiming {
            name: name.to_string(),
            time_ms: elapsed,
        });
        if self.options.debug_capture {
            state.captures.push(StageCapture {
                name: format!("{}_{}", state.executed, name),
                image: result.clone(),
            });
        }

        tracing::trace!(stage = name, time_ms = elapsed, "stage complete");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Rgb, RgbImage};

    fn receipt_like(width: u32, height: u32) -> DynamicImage {
        let mut img = RgbImage::from_pixel(width, height, Rgb([235, 235, 230]));
        let mut y = height / 10;
        while y + 4 < height {
            for row in y..y + 4 {
                for x in width / 10..width - width / 10 {
                    img.put_pixel(x, row, Rgb([30, 30, 30]));
                }
            }
            y += height / 12;
        }
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_pipeline_produces_binary_single_channel() {
        let pipeline = Pipeline::new(EnhanceOptions::default());
        let result = pipeline.process(receipt_like(200, 300)).unwrap();

        assert!(matches!(result.image, DynamicImage::ImageLuma8(_)));
        for pixel in result.image.to_luma8().pixels() {
            assert!(pixel.0[0] == 0 || pixel.0[0] == 255);
        }
    }

    #[test]
    fn test_pipeline_rescales_dimensions() {
        let pipeline = Pipeline::new(EnhanceOptions::default());
        let result = pipeline.process(receipt_like(200, 300)).unwrap();
        assert_eq!(result.image.width(), 240);
        assert_eq!(result.image.height(), 360);
    }

    #[test]
    fn test_pipeline_is_deterministic() {
        let pipeline = Pipeline::new(EnhanceOptions::default());
        let first = pipeline.process(receipt_like(160, 240)).unwrap();
        let second = pipeline.process(receipt_like(160, 240)).unwrap();
        assert_eq!(first.image.as_bytes(), second.image.as_bytes());
    }

    #[test]
    fn test_pipeline_rejects_zero_area_input() {
        let pipeline = Pipeline::new(EnhanceOptions::default());
        let result = pipeline.process(DynamicImage::ImageLuma8(GrayImage::new(0, 10)));
        assert!(matches!(result, Err(ReceiptError::InvalidImage(_))));
    }

    #[test]
    fn test_pipeline_validates_options_before_running() {
        let options = EnhanceOptions {
            rescale_factor: -1.0,
            ..Default::default()
        };
        let pipeline = Pipeline::new(options);
        let result = pipeline.process(receipt_like(100, 150));
        assert!(matches!(result, Err(ReceiptError::InvalidArgument(_))));
    }

    #[test]
    fn test_debug_captures_are_ordered_and_named() {
        let options = EnhanceOptions {
            debug_capture: true,
            ..Default::default()
        };
        let pipeline = Pipeline::new(options);
        let result = pipeline.process(receipt_like(160, 240)).unwrap();

        let names: Vec<&str> = result.captures.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "1_rescaled",
                "2_rotated",
                "3_shadows_removed",
                "4_deskewed",
                "5_grayscale",
                "6_denoised"
            ]
        );
    }

    #[test]
    fn test_capture_numbering_tracks_skipped_orientation() {
        let options = EnhanceOptions {
            debug_capture: true,
            rotate_orientation: false,
            ..Default::default()
        };
        let pipeline = Pipeline::new(options);
        let result = pipeline.process(receipt_like(160, 240)).unwrap();

        let names: Vec<&str> = result.captures.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "1_rescaled",
                "2_shadows_removed",
                "3_deskewed",
                "4_grayscale",
                "5_denoised"
            ]
        );
    }

    #[test]
    fn test_no_captures_without_debug_flag() {
        let pipeline = Pipeline::new(EnhanceOptions::default());
        let result = pipeline.process(receipt_like(120, 180)).unwrap();
        assert!(result.captures.is_empty());
        assert_eq!(result.steps.len(), 6);
    }
}
