use crate::error::ReceiptError;
use image::{imageops::FilterType, DynamicImage, GenericImageView};

/// Rescale both dimensions by a uniform factor using cubic interpolation.
///
/// Receipt photos tend to arrive slightly under the resolution recognition
/// engines like; the default pipeline factor (1.2) nudges them up without
/// distorting the aspect ratio. Output dimensions are `round(w * factor)`
/// by `round(h * factor)`.
pub fn apply(image: DynamicImage, factor: f32) -> Result<DynamicImage, ReceiptError> {
    if !factor.is_finite() || factor <= 0.0 {
        return Err(ReceiptError::InvalidArgument(format!(
            "rescale factor must be positive, got {}",
            factor
        )));
    }

    let (width, height) = image.dimensions();
    let new_width = (width as f32 * factor).round() as u32;
    let new_height = (height as f32 * factor).round() as u32;

    if new_width == 0 || new_height == 0 {
        return Err(ReceiptError::InvalidArgument(format!(
            "rescale factor {} collapses {}x{} to zero area",
            factor, width, height
        )));
    }

    Ok(image.resize_exact(new_width, new_height, FilterType::CatmullRom))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, RgbImage};

    #[test]
    fn test_rescale_rounds_dimensions() {
        let img = RgbImage::new(1000, 1500);
        let result = apply(DynamicImage::ImageRgb8(img), 1.2).unwrap();
        assert_eq!(result.width(), 1200);
        assert_eq!(result.height(), 1800);
    }

    #[test]
    fn test_rescale_downscales() {
        let img = GrayImage::new(100, 50);
        let result = apply(DynamicImage::ImageLuma8(img), 0.5).unwrap();
        assert_eq!(result.width(), 50);
        assert_eq!(result.height(), 25);
    }

    #[test]
    fn test_rescale_rejects_non_positive_factor() {
        for factor in [0.0, -1.0, f32::NAN, f32::NEG_INFINITY] {
            let img = GrayImage::new(10, 10);
            let result = apply(DynamicImage::ImageLuma8(img), factor);
            assert!(matches!(result, Err(ReceiptError::InvalidArgument(_))));
        }
    }

    #[test]
    fn test_rescale_rejects_collapse_to_zero() {
        let img = GrayImage::new(10, 10);
        let result = apply(DynamicImage::ImageLuma8(img), 0.01);
        assert!(matches!(result, Err(ReceiptError::InvalidArgument(_))));
    }
}
