use crate::error::ReceiptError;
use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::distance_transform::Norm;
use imageproc::filter::{bilateral_filter, gaussian_blur_f32};
use imageproc::morphology::{dilate, erode};
use serde::{Deserialize, Serialize};

/// Parameters for the denoise cascade.
///
/// Defaults are tuned for typical receipt-photo resolutions; retune per
/// camera rather than editing the cascade itself.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DenoiseParams {
    /// Radius of the open/close morphology pair. The default of 0 is a
    /// deliberate placeholder (a 1x1 kernel, identity); the knob exists so
    /// higher-noise cameras can turn it up without a code change.
    pub morph_radius: u8,
    /// Gaussian blur sigma (default 1.1, the sigma of a 5x5 kernel).
    pub blur_sigma: f32,
    /// Bilateral filter window size (default 5).
    pub bilateral_window: u32,
    /// Bilateral filter intensity sigma (default 75).
    pub bilateral_sigma_color: f32,
    /// Bilateral filter spatial sigma (default 75).
    pub bilateral_sigma_spatial: f32,
    /// Adaptive threshold block size (default 31, must be odd and > 1).
    pub adaptive_block_size: u32,
    /// Constant subtracted from the local mean in the adaptive threshold
    /// (default 2).
    pub adaptive_offset: f32,
}

impl Default for DenoiseParams {
    fn default() -> Self {
        Self {
            morph_radius: 0,
            blur_sigma: 1.1,
            bilateral_window: 5,
            bilateral_sigma_color: 75.0,
            bilateral_sigma_spatial: 75.0,
            adaptive_block_size: 31,
            adaptive_offset: 2.0,
        }
    }
}

impl DenoiseParams {
    pub fn validate(&self) -> Result<(), ReceiptError> {
        if !self.blur_sigma.is_finite() || self.blur_sigma <= 0.0 {
            return Err(ReceiptError::InvalidArgument(format!(
                "blur sigma must be positive, got {}",
                self.blur_sigma
            )));
        }
        if self.adaptive_block_size < 3 || self.adaptive_block_size % 2 == 0 {
            return Err(ReceiptError::InvalidArgument(format!(
                "adaptive block size must be odd and >= 3, got {}",
                self.adaptive_block_size
            )));
        }
        if self.bilateral_window == 0 {
            return Err(ReceiptError::InvalidArgument(
                "bilateral window must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Multi-stage denoise producing a binary image.
///
/// Ordered cascade: dilate, erode, Gaussian blur, global Otsu threshold,
/// bilateral filter (edge-preserving smoothing of the binary edges), and a
/// final adaptive Gaussian threshold that re-binarizes with a local cutoff.
/// The double thresholding looks redundant but is not: Otsu flattens the
/// bulk of the paper noise globally, while the adaptive pass recovers text
/// strokes in regions the global cutoff misjudged.
pub fn apply(image: DynamicImage, params: &DenoiseParams) -> Result<DynamicImage, ReceiptError> {
    params.validate()?;

    let mut img = image.to_luma8();

    if params.morph_radius > 0 {
        img = dilate(&img, Norm::LInf, params.morph_radius);
        img = erode(&img, Norm::LInf, params.morph_radius);
    }

    let blurred = gaussian_blur_f32(&img, params.blur_sigma);

    let level = otsu_level(&blurred);
    let binary = threshold(&blurred, level, ThresholdType::Binary);

    let smoothed = bilateral_filter(
        &binary,
        params.bilateral_window,
        params.bilateral_sigma_color,
        params.bilateral_sigma_spatial,
    );

    let final_binary = adaptive_gaussian_threshold(
        &smoothed,
        params.adaptive_block_size,
        params.adaptive_offset,
    );

    Ok(DynamicImage::ImageLuma8(final_binary))
}

/// Binarize against a Gaussian-weighted local mean: a pixel is foreground
/// when it exceeds `local_mean - offset`. The local mean is a Gaussian blur
/// whose sigma matches the requested block size (same sigma-for-kernel-size
/// rule OpenCV uses), which keeps the cutoff tracking slow illumination
/// drift the global threshold cannot.
fn adaptive_gaussian_threshold(img: &GrayImage, block_size: u32, offset: f32) -> GrayImage {
    let sigma = 0.3 * ((block_size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let local_mean = gaussian_blur_f32(img, sigma);

    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let value = img.get_pixel(x, y).0[0] as f32;
        let cutoff = local_mean.get_pixel(x, y).0[0] as f32 - offset;
        if value > cutoff {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denoise_output_is_binary() {
        let img = GrayImage::from_fn(60, 60, |x, y| Luma([((x * 3 + y * 5) % 251) as u8]));
        let result = apply(DynamicImage::ImageLuma8(img), &DenoiseParams::default()).unwrap();
        for pixel in result.to_luma8().pixels() {
            assert!(
                pixel.0[0] == 0 || pixel.0[0] == 255,
                "expected binary pixel, got {}",
                pixel.0[0]
            );
        }
    }

    #[test]
    fn test_denoise_preserves_dimensions() {
        let img = GrayImage::new(80, 40);
        let result = apply(DynamicImage::ImageLuma8(img), &DenoiseParams::default()).unwrap();
        assert_eq!(result.width(), 80);
        assert_eq!(result.height(), 40);
    }

    #[test]
    fn test_denoise_keeps_text_dark_and_background_light() {
        let mut img = GrayImage::from_pixel(100, 60, Luma([230]));
        for y in 28..32 {
            for x in 20..80 {
                img.put_pixel(x, y, Luma([15]));
            }
        }

        let result = apply(DynamicImage::ImageLuma8(img), &DenoiseParams::default())
            .unwrap()
            .to_luma8();

        assert_eq!(result.get_pixel(50, 30).0[0], 0);
        assert_eq!(result.get_pixel(50, 10).0[0], 255);
    }

    #[test]
    fn test_denoise_rejects_even_block_size() {
        let params = DenoiseParams {
            adaptive_block_size: 30,
            ..Default::default()
        };
        let img = GrayImage::new(10, 10);
        let result = apply(DynamicImage::ImageLuma8(img), &params);
        assert!(matches!(result, Err(ReceiptError::InvalidArgument(_))));
    }

    #[test]
    fn test_denoise_rejects_bad_sigma() {
        let params = DenoiseParams {
            blur_sigma: 0.0,
            ..Default::default()
        };
        let img = GrayImage::new(10, 10);
        let result = apply(DynamicImage::ImageLuma8(img), &params);
        assert!(matches!(result, Err(ReceiptError::InvalidArgument(_))));
    }
}
