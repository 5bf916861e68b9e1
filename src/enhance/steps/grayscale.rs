use crate::error::ReceiptError;
use image::DynamicImage;

/// Convert to grayscale via the standard luminance weighting.
///
/// Already single-channel input passes through untouched (a no-op, not an
/// error): the pipeline calls this unconditionally after deskew, and the
/// working image may or may not still carry color at that point.
pub fn apply(image: DynamicImage) -> Result<DynamicImage, ReceiptError> {
    match image {
        DynamicImage::ImageLuma8(gray) => Ok(DynamicImage::ImageLuma8(gray)),
        other => Ok(DynamicImage::ImageLuma8(other.to_luma8())),
    }
}
