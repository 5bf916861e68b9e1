use crate::error::ReceiptError;
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::filter::median_filter;
use imageproc::morphology::dilate;
use serde::{Deserialize, Serialize};

/// Background-estimation parameters for shadow removal.
///
/// Radii are in pixels; a radius r corresponds to a (2r+1)x(2r+1) kernel.
/// Defaults are tuned for handheld receipt photos at phone-camera
/// resolutions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ShadowParams {
    /// Dilation structuring element radius (default 3, a 7x7 square).
    pub dilate_radius: u8,
    /// Median blur radius for the background estimate (default 10, a 21x21
    /// window).
    pub median_radius: u32,
}

impl Default for ShadowParams {
    fn default() -> Self {
        Self {
            dilate_radius: 3,
            median_radius: 10,
        }
    }
}

/// Flatten uneven illumination by dividing out an estimated background.
///
/// Per plane: dilate to wash out the (high-frequency) text, median-blur the
/// result into a smooth background estimate, take the absolute difference
/// against the original plane, invert it, and stretch to the full [0, 255]
/// range. Assumes the background varies slowly while text is high-frequency;
/// no explicit illumination model. Planes are processed independently and
/// recombined in their original order, so color input stays color.
pub fn apply(image: DynamicImage, params: &ShadowParams) -> Result<DynamicImage, ReceiptError> {
    Ok(match image {
        DynamicImage::ImageLuma8(gray) => {
            DynamicImage::ImageLuma8(remove_shadows_plane(&gray, params))
        }
        other => {
            let rgb = other.to_rgb8();
            let planes = split_planes(&rgb);
            let flattened = [
                remove_shadows_plane(&planes[0], params),
                remove_shadows_plane(&planes[1], params),
                remove_shadows_plane(&planes[2], params),
            ];
            DynamicImage::ImageRgb8(merge_planes(&flattened))
        }
    })
}

fn remove_shadows_plane(plane: &GrayImage, params: &ShadowParams) -> GrayImage {
    let dilated = dilate(plane, Norm::LInf, params.dilate_radius);
    let background = median_filter(&dilated, params.median_radius, params.median_radius);

    let diff = GrayImage::from_fn(plane.width(), plane.height(), |x, y| {
        let p = plane.get_pixel(x, y).0[0];
        let b = background.get_pixel(x, y).0[0];
        Luma([255 - p.abs_diff(b)])
    });

    stretch_to_full_range(&diff)
}

/// Min-max stretch to [0, 255]. A constant plane comes back unchanged
/// (already shadow-free, and there is no range to stretch).
fn stretch_to_full_range(img: &GrayImage) -> GrayImage {
    let mut min = 255u8;
    let mut max = 0u8;
    for pixel in img.pixels() {
        min = min.min(pixel.0[0]);
        max = max.max(pixel.0[0]);
    }

    if max <= min {
        return img.clone();
    }

    let range = (max - min) as f32;
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let value = img.get_pixel(x, y).0[0];
        Luma([((value - min) as f32 / range * 255.0).round() as u8])
    })
}

fn split_planes(rgb: &RgbImage) -> [GrayImage; 3] {
    let (width, height) = rgb.dimensions();
    let mut planes = [
        GrayImage::new(width, height),
        GrayImage::new(width, height),
        GrayImage::new(width, height),
    ];
    for (x, y, pixel) in rgb.enumerate_pixels() {
        for (c, plane) in planes.iter_mut().enumerate() {
            plane.put_pixel(x, y, Luma([pixel.0[c]]));
        }
    }
    planes
}

fn merge_planes(planes: &[GrayImage; 3]) -> RgbImage {
    RgbImage::from_fn(planes[0].width(), planes[0].height(), |x, y| {
        Rgb([
            planes[0].get_pixel(x, y).0[0],
            planes[1].get_pixel(x, y).0[0],
            planes[2].get_pixel(x, y).0[0],
        ])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_plane_comes_out_near_white() {
        // No shadow and no texture: difference from background is ~0
        // everywhere, inverted to ~255.
        let img = GrayImage::from_pixel(64, 64, Luma([180]));
        let result = apply(DynamicImage::ImageLuma8(img), &ShadowParams::default()).unwrap();
        for pixel in result.to_luma8().pixels() {
            assert!(pixel.0[0] >= 250, "expected near-white, got {}", pixel.0[0]);
        }
    }

    #[test]
    fn test_shadow_removal_preserves_channel_count() {
        let rgb = RgbImage::from_pixel(32, 32, Rgb([200, 180, 160]));
        let result = apply(DynamicImage::ImageRgb8(rgb), &ShadowParams::default()).unwrap();
        assert!(matches!(result, DynamicImage::ImageRgb8(_)));

        let gray = GrayImage::from_pixel(32, 32, Luma([200]));
        let result = apply(DynamicImage::ImageLuma8(gray), &ShadowParams::default()).unwrap();
        assert!(matches!(result, DynamicImage::ImageLuma8(_)));
    }

    #[test]
    fn test_gradient_background_is_flattened() {
        // A slow left-to-right shading gradient with no text should flatten
        // to a mostly uniform bright plane.
        let img = GrayImage::from_fn(64, 64, |x, _| Luma([120 + x as u8]));
        let result = apply(DynamicImage::ImageLuma8(img), &ShadowParams::default())
            .unwrap()
            .to_luma8();

        // Ignore the median filter's border region.
        let mut min = 255u8;
        let mut max = 0u8;
        for y in 12..52 {
            for x in 12..52 {
                let v = result.get_pixel(x, y).0[0];
                min = min.min(v);
                max = max.max(v);
            }
        }
        assert!(
            max - min < 80,
            "interior should be roughly flat, spread was {}",
            max - min
        );
    }

    #[test]
    fn test_split_merge_round_trip() {
        let rgb = RgbImage::from_fn(8, 8, |x, y| Rgb([x as u8, y as u8, (x + y) as u8]));
        let merged = merge_planes(&split_planes(&rgb));
        assert_eq!(merged, rgb);
    }
}
