use crate::error::ReceiptError;
use image::{DynamicImage, GrayImage, ImageBuffer, Pixel};

/// Rotate an image about its center by `degrees`, preserving dimensions.
///
/// Samples entering from outside the original frame replicate the nearest
/// edge pixel rather than filling with a constant, and resampling is cubic
/// (Catmull-Rom). imageproc's `rotate_about_center` fills with a default
/// pixel, which leaves dark wedges in the corners that confuse downstream
/// thresholding, so the inverse mapping is done by hand here.
///
/// Positive angles rotate counter-clockwise. An angle of 0 is a pass-through
/// with no resampling.
pub fn apply(image: DynamicImage, degrees: f32) -> Result<DynamicImage, ReceiptError> {
    if !degrees.is_finite() {
        return Err(ReceiptError::InvalidArgument(format!(
            "rotation angle must be finite, got {}",
            degrees
        )));
    }
    if degrees == 0.0 {
        return Ok(image);
    }

    Ok(match image {
        DynamicImage::ImageLuma8(gray) => {
            DynamicImage::ImageLuma8(rotate_buffer(&gray, degrees, Sampling::Cubic))
        }
        DynamicImage::ImageRgb8(rgb) => {
            DynamicImage::ImageRgb8(rotate_buffer(&rgb, degrees, Sampling::Cubic))
        }
        // Other layouts (RGBA, 16-bit) are flattened to RGB8 first; the
        // pipeline only ever feeds Luma8 or Rgb8 through here.
        other => DynamicImage::ImageRgb8(rotate_buffer(&other.to_rgb8(), degrees, Sampling::Cubic)),
    })
}

/// Pick the orientation-correction angle for an image of the given size.
///
/// Heuristic carried over from the receipt capture flow: portrait frames
/// (width < height) are assumed to already be upright, landscape frames are
/// assumed to be receipts photographed sideways and get the configured
/// rotation (typically 90 degrees). This conflates camera orientation with
/// content orientation and can misfire on genuinely landscape receipts;
/// callers that know better should disable the orientation stage instead.
pub fn orientation_angle(width: u32, height: u32, configured: f32) -> f32 {
    if width < height {
        0.0
    } else {
        configured
    }
}

/// Nearest-neighbor rotation for the deskew search proxy. Same center and
/// edge-replication semantics as `apply`, but no interpolation, since the
/// proxy is binary and the search only cares about row mass.
pub(crate) fn rotate_nearest(img: &GrayImage, degrees: f32) -> GrayImage {
    rotate_buffer(img, degrees, Sampling::Nearest)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Sampling {
    Nearest,
    Cubic,
}

fn rotate_buffer<P>(
    img: &ImageBuffer<P, Vec<u8>>,
    degrees: f32,
    sampling: Sampling,
) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let (width, height) = img.dimensions();
    let theta = degrees.to_radians();
    let (sin_t, cos_t) = theta.sin_cos();
    let cx = width as f32 / 2.0;
    let cy = height as f32 / 2.0;

    ImageBuffer::from_fn(width, height, |x, y| {
        // Inverse mapping: where in the source does this output pixel come from?
        let dx = x as f32 - cx;
        let dy = y as f32 - cy;
        let sx = cos_t * dx + sin_t * dy + cx;
        let sy = -sin_t * dx + cos_t * dy + cy;

        match sampling {
            Sampling::Nearest => {
                let px = clamp_coord(sx.round() as i64, width);
                let py = clamp_coord(sy.round() as i64, height);
                *img.get_pixel(px, py)
            }
            Sampling::Cubic => sample_bicubic(img, sx, sy),
        }
    })
}

/// Catmull-Rom sample at a fractional source position, clamping the 4x4
/// neighborhood to the image bounds (edge replication).
fn sample_bicubic<P>(img: &ImageBuffer<P, Vec<u8>>, sx: f32, sy: f32) -> P
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let (width, height) = img.dimensions();
    let x0 = sx.floor() as i64;
    let y0 = sy.floor() as i64;
    let fx = sx - x0 as f32;
    let fy = sy - y0 as f32;

    let mut wx = [0.0f32; 4];
    let mut wy = [0.0f32; 4];
    for i in 0..4 {
        wx[i] = catmull_rom(fx - (i as f32 - 1.0));
        wy[i] = catmull_rom(fy - (i as f32 - 1.0));
    }

    let channels = P::CHANNEL_COUNT as usize;
    let mut acc = [0.0f32; 4];

    for (j, wyj) in wy.iter().enumerate() {
        let py = clamp_coord(y0 - 1 + j as i64, height);
        for (i, wxi) in wx.iter().enumerate() {
            let px = clamp_coord(x0 - 1 + i as i64, width);
            let weight = wxi * wyj;
            let pixel = img.get_pixel(px, py);
            for (c, sample) in pixel.channels().iter().enumerate() {
                acc[c] += weight * *sample as f32;
            }
        }
    }

    let mut out = *img.get_pixel(clamp_coord(x0, width), clamp_coord(y0, height));
    for (c, value) in out.channels_mut().iter_mut().enumerate().take(channels) {
        *value = acc[c].round().clamp(0.0, 255.0) as u8;
    }
    out
}

fn catmull_rom(t: f32) -> f32 {
    let t = t.abs();
    if t < 1.0 {
        1.5 * t * t * t - 2.5 * t * t + 1.0
    } else if t < 2.0 {
        -0.5 * t * t * t + 2.5 * t * t - 4.0 * t + 2.0
    } else {
        0.0
    }
}

fn clamp_coord(v: i64, size: u32) -> u32 {
    v.clamp(0, size as i64 - 1) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    #[test]
    fn test_rotate_preserves_dimensions() {
        let img = GrayImage::new(120, 80);
        for angle in [-15.0, -3.5, 0.0, 7.25, 90.0, 180.0] {
            let result = apply(DynamicImage::ImageLuma8(img.clone()), angle).unwrap();
            assert_eq!(result.width(), 120);
            assert_eq!(result.height(), 80);
        }
    }

    #[test]
    fn test_rotate_preserves_channel_count() {
        let rgb = RgbImage::new(40, 60);
        let result = apply(DynamicImage::ImageRgb8(rgb), 10.0).unwrap();
        assert!(matches!(result, DynamicImage::ImageRgb8(_)));

        let gray = GrayImage::new(40, 60);
        let result = apply(DynamicImage::ImageLuma8(gray), 10.0).unwrap();
        assert!(matches!(result, DynamicImage::ImageLuma8(_)));
    }

    #[test]
    fn test_zero_angle_is_identity() {
        let img = GrayImage::from_fn(30, 30, |x, y| Luma([(x * 7 + y * 3) as u8]));
        let result = apply(DynamicImage::ImageLuma8(img.clone()), 0.0).unwrap();
        assert_eq!(result.to_luma8(), img);
    }

    #[test]
    fn test_rotate_rejects_non_finite_angle() {
        let img = GrayImage::new(10, 10);
        let result = apply(DynamicImage::ImageLuma8(img), f32::NAN);
        assert!(matches!(result, Err(ReceiptError::InvalidArgument(_))));
    }

    #[test]
    fn test_border_replication_fills_corners() {
        // Uniform white image: replicated borders must keep every output
        // pixel white, where a constant black fill would darken corners.
        let img = RgbImage::from_pixel(50, 50, Rgb([255, 255, 255]));
        let result = apply(DynamicImage::ImageRgb8(img), 45.0).unwrap();
        for pixel in result.to_rgb8().pixels() {
            assert_eq!(pixel.0, [255, 255, 255]);
        }
    }

    #[test]
    fn test_orientation_heuristic() {
        assert_eq!(orientation_angle(600, 800, 90.0), 0.0);
        assert_eq!(orientation_angle(800, 600, 90.0), 90.0);
        assert_eq!(orientation_angle(800, 800, 90.0), 90.0);
    }

    #[test]
    fn test_rotation_round_trip_recovers_band() {
        // A horizontal dark band rotated out and back should land where it
        // started, within interpolation blur.
        let mut img = GrayImage::from_pixel(80, 80, Luma([255]));
        for y in 38..42 {
            for x in 10..70 {
                img.put_pixel(x, y, Luma([0]));
            }
        }
        let rotated = apply(DynamicImage::ImageLuma8(img), 8.0).unwrap();
        let restored = apply(rotated, -8.0).unwrap().to_luma8();

        assert!(restored.get_pixel(40, 40).0[0] < 64);
        assert!(restored.get_pixel(40, 10).0[0] > 192);
    }
}
