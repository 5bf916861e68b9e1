use crate::enhance::steps::rotate;
use crate::error::ReceiptError;
use image::{DynamicImage, GrayImage};
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use serde::{Deserialize, Serialize};

/// Upper bound on search candidates so a bad limit/step ratio fails fast
/// instead of grinding through thousands of full-image rotations.
const MAX_CANDIDATES: u32 = 720;

/// Which side of the Otsu cutoff counts as foreground in the search proxy.
///
/// Receipts are dark text on light paper, so the inverted polarity (text
/// becomes white, i.e. the mass being summed) usually gives the sharper
/// row-projection signal; scans with reversed contrast want the plain one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkewPolarity {
    Binary,
    #[default]
    BinaryInverted,
}

/// Skew-search parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SkewParams {
    /// Search range is the inclusive interval [-limit, +limit] degrees.
    pub limit: f32,
    /// Step between candidate angles in degrees.
    pub step: f32,
    /// Angles at or below this magnitude skip rotation entirely, avoiding
    /// resampling artifacts on already-straight images.
    pub skip_threshold: f32,
    /// Foreground polarity for the binarized search proxy.
    pub polarity: SkewPolarity,
}

impl Default for SkewParams {
    fn default() -> Self {
        Self {
            limit: 5.0,
            step: 0.5,
            skip_threshold: 0.1,
            polarity: SkewPolarity::default(),
        }
    }
}

impl SkewParams {
    pub fn validate(&self) -> Result<(), ReceiptError> {
        if !self.step.is_finite() || self.step <= 0.0 {
            return Err(ReceiptError::InvalidArgument(format!(
                "skew step must be positive, got {}",
                self.step
            )));
        }
        if !self.limit.is_finite() || self.limit < 0.0 {
            return Err(ReceiptError::InvalidArgument(format!(
                "skew limit must be non-negative, got {}",
                self.limit
            )));
        }
        let candidates = (2.0 * self.limit / self.step).round() as u32 + 1;
        if candidates > MAX_CANDIDATES {
            return Err(ReceiptError::InvalidArgument(format!(
                "skew search of {} candidates exceeds the {} candidate bound (limit {}, step {})",
                candidates, MAX_CANDIDATES, self.limit, self.step
            )));
        }
        Ok(())
    }
}

/// Estimate the text skew angle via a projection-profile search.
///
/// The working image is binarized once (Otsu, configurable polarity) into a
/// proxy; each candidate angle in [-limit, +limit] rotates the proxy
/// (nearest-neighbor), sums foreground intensity per row, and scores the
/// histogram by the sum of squared first differences. Correctly aligned text
/// gives sharp transitions between text rows and gaps, so the maximum score
/// wins. Candidates are visited in ascending order and ties keep the first
/// angle seen, so the result is exactly reproducible.
pub fn estimate(image: &DynamicImage, params: &SkewParams) -> Result<f32, ReceiptError> {
    params.validate()?;

    let gray = image.to_luma8();
    let level = otsu_level(&gray);
    let polarity = match params.polarity {
        SkewPolarity::Binary => ThresholdType::Binary,
        SkewPolarity::BinaryInverted => ThresholdType::BinaryInverted,
    };
    let proxy = threshold(&gray, level, polarity);

    let steps = (2.0 * params.limit / params.step).round() as u32;
    let mut best_angle = -params.limit;
    let mut best_score = f64::MIN;

    for i in 0..=steps {
        let angle = -params.limit + i as f32 * params.step;
        let score = projection_score(&proxy, angle);
        if score > best_score {
            best_score = score;
            best_angle = angle;
        }
    }

    Ok(best_angle)
}

/// Estimate skew and rotate the working image to correct it.
///
/// The search runs on the binarized proxy, but the rotation is applied to
/// the real image so no detail is lost to the proxy's thresholding.
pub fn apply(image: DynamicImage, params: &SkewParams) -> Result<DynamicImage, ReceiptError> {
    let angle = estimate(&image, params)?;

    if angle.abs() <= params.skip_threshold {
        tracing::debug!(angle, "skew negligible, skipping rotation");
        return Ok(image);
    }

    tracing::debug!(angle, "correcting skew");
    rotate::apply(image, angle)
}

/// Sum of squared first differences of the row-intensity histogram after
/// rotating the proxy by `angle`.
fn projection_score(proxy: &GrayImage, angle: f32) -> f64 {
    let rotated = rotate::rotate_nearest(proxy, angle);
    let height = rotated.height() as usize;
    let mut histogram = vec![0u64; height];

    for (_, y, pixel) in rotated.enumerate_pixels() {
        histogram[y as usize] += pixel.0[0] as u64;
    }

    histogram
        .windows(2)
        .map(|w| {
            let diff = w[1] as i64 - w[0] as i64;
            (diff * diff) as f64
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// White page with dark horizontal bands, a crude stand-in for text rows.
    fn banded_image() -> DynamicImage {
        let mut img = GrayImage::from_pixel(200, 200, Luma([255]));
        for band in 0..8 {
            let top = 20 + band * 20;
            for y in top..top + 6 {
                for x in 20..180 {
                    img.put_pixel(x, y, Luma([0]));
                }
            }
        }
        DynamicImage::ImageLuma8(img)
    }

    #[test]
    fn test_estimate_is_deterministic() {
        let img = banded_image();
        let params = SkewParams::default();
        let first = estimate(&img, &params).unwrap();
        let second = estimate(&img, &params).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_estimate_finds_zero_for_straight_bands() {
        let angle = estimate(&banded_image(), &SkewParams::default()).unwrap();
        assert!(
            angle.abs() <= 0.5,
            "expected near-zero angle, got {}",
            angle
        );
    }

    #[test]
    fn test_estimate_recovers_known_skew() {
        let skewed = rotate::apply(banded_image(), 2.0).unwrap();
        let angle = estimate(&skewed, &SkewParams::default()).unwrap();
        // Best angle should undo the applied rotation within one step.
        assert!(
            (angle + 2.0).abs() <= 0.5,
            "expected about -2.0, got {}",
            angle
        );
    }

    #[test]
    fn test_apply_skips_negligible_skew() {
        let img = banded_image();
        let result = apply(img.clone(), &SkewParams::default()).unwrap();
        assert_eq!(result.to_luma8(), img.to_luma8());
    }

    #[test]
    fn test_apply_straightens_skewed_bands() {
        let skewed = rotate::apply(banded_image(), 3.0).unwrap();
        let corrected = apply(skewed, &SkewParams::default()).unwrap();
        let residual = estimate(&corrected, &SkewParams::default()).unwrap();
        assert!(
            residual.abs() <= 0.5,
            "expected residual skew near zero, got {}",
            residual
        );
    }

    #[test]
    fn test_params_reject_non_positive_step() {
        let params = SkewParams {
            step: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ReceiptError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_params_reject_unbounded_search() {
        let params = SkewParams {
            limit: 180.0,
            step: 0.01,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ReceiptError::InvalidArgument(_))
        ));
    }
}
