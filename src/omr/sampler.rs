//! Bubble sampler
//!
//! Pure pixel-level measurement: how much of a bubble's disk is dark.

use image::GrayImage;

use super::types::OmrOptions;
use crate::template::Bubble;

/// Borrowed view of a row-major 8-bit grayscale page
#[derive(Debug, Clone, Copy)]
pub struct GrayPage<'a> {
    pixels: &'a [u8],
    width: u32,
    height: u32,
}

impl<'a> GrayPage<'a> {
    /// Wrap a buffer; the caller guarantees `pixels.len() >= width * height`
    pub(crate) fn new(pixels: &'a [u8], width: u32, height: u32) -> Self {
        Self {
            pixels,
            width,
            height,
        }
    }

    /// Borrow an `image` grayscale buffer
    pub fn from_image(image: &'a GrayImage) -> Self {
        Self::new(image.as_raw(), image.width(), image.height())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    fn luma(&self, x: u32, y: u32) -> u8 {
        self.pixels[y as usize * self.width as usize + x as usize]
    }
}

/// Measurement of one bubble disk
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BubbleSample {
    /// Pixels inside the disk and inside the image
    pub sampled: u32,
    /// Sampled pixels below the dark threshold
    pub dark: u32,
}

impl BubbleSample {
    /// Dark / sampled, 0.0 when nothing was sampled
    pub fn fill_ratio(&self) -> f64 {
        if self.sampled == 0 {
            0.0
        } else {
            self.dark as f64 / self.sampled as f64
        }
    }
}

/// Pixel center and radius of a normalized bubble on a page
///
/// The radius scales with the larger page dimension and never drops below
/// `min_radius_px`. It is capped at the larger page dimension, which already
/// covers the whole page, so the squared radius cannot overflow.
pub fn bubble_geometry(bubble: &Bubble, width: u32, height: u32, min_radius_px: u32) -> (i64, i64, i64) {
    let cx = (bubble.x as f64 * width as f64).round() as i64;
    let cy = (bubble.y as f64 * height as f64).round() as i64;
    let rx = (bubble.radius as f64 * width as f64).round() as i64;
    let ry = (bubble.radius as f64 * height as f64).round() as i64;
    let cap = i64::from(width.max(height).max(1));
    let radius = rx.max(ry).max(i64::from(min_radius_px)).min(cap);
    (cx, cy, radius)
}

/// Sample every pixel of the bubble disk, clipped to the page bounds
pub fn sample_bubble(page: &GrayPage<'_>, bubble: &Bubble, options: &OmrOptions) -> BubbleSample {
    let (cx, cy, radius) = bubble_geometry(bubble, page.width, page.height, options.min_radius_px);
    let r2 = radius * radius;

    // Clip the bounding square once instead of testing every pixel
    let x0 = (cx - radius).max(0);
    let x1 = (cx + radius).min(page.width as i64 - 1);
    let y0 = (cy - radius).max(0);
    let y1 = (cy + radius).min(page.height as i64 - 1);

    let mut sample = BubbleSample { sampled: 0, dark: 0 };
    if x0 > x1 || y0 > y1 {
        return sample;
    }

    for y in y0..=y1 {
        let dy = y - cy;
        for x in x0..=x1 {
            let dx = x - cx;
            if dx * dx + dy * dy > r2 {
                continue;
            }
            sample.sampled += 1;
            if page.luma(x as u32, y as u32) < options.dark_threshold {
                sample.dark += 1;
            }
        }
    }

    sample
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::drawing::draw_filled_circle_mut;

    fn bubble(x: f32, y: f32, radius: f32) -> Bubble {
        Bubble {
            question_number: 1,
            option: 'A',
            x,
            y,
            radius,
        }
    }

    #[test]
    fn test_white_page_has_zero_fill() {
        let img = GrayImage::from_pixel(200, 200, Luma([255]));
        let page = GrayPage::from_image(&img);
        let sample = sample_bubble(&page, &bubble(0.5, 0.5, 0.05), &OmrOptions::default());
        assert!(sample.sampled > 0);
        assert_eq!(sample.dark, 0);
        assert_eq!(sample.fill_ratio(), 0.0);
    }

    #[test]
    fn test_filled_disk_is_fully_dark() {
        let mut img = GrayImage::from_pixel(200, 200, Luma([255]));
        draw_filled_circle_mut(&mut img, (100, 100), 14, Luma([10]));
        let page = GrayPage::from_image(&img);
        // radius 0.05 * 200 = 10 px, entirely inside the drawn disk
        let sample = sample_bubble(&page, &bubble(0.5, 0.5, 0.05), &OmrOptions::default());
        assert_eq!(sample.dark, sample.sampled);
        assert_eq!(sample.fill_ratio(), 1.0);
    }

    #[test]
    fn test_mid_gray_cut() {
        let img = GrayImage::from_pixel(100, 100, Luma([128]));
        let page = GrayPage::from_image(&img);
        let sample = sample_bubble(&page, &bubble(0.5, 0.5, 0.05), &OmrOptions::default());
        assert_eq!(sample.fill_ratio(), 0.0);

        let img = GrayImage::from_pixel(100, 100, Luma([127]));
        let page = GrayPage::from_image(&img);
        let sample = sample_bubble(&page, &bubble(0.5, 0.5, 0.05), &OmrOptions::default());
        assert_eq!(sample.fill_ratio(), 1.0);
    }

    #[test]
    fn test_out_of_bounds_bubble_is_clipped() {
        let img = GrayImage::from_pixel(100, 100, Luma([0]));
        let page = GrayPage::from_image(&img);
        let opts = OmrOptions::default();

        let inside = sample_bubble(&page, &bubble(0.5, 0.5, 0.1), &opts);
        let corner = sample_bubble(&page, &bubble(0.0, 0.0, 0.1), &opts);
        assert!(corner.sampled > 0);
        assert!(corner.sampled < inside.sampled);
        assert_eq!(corner.fill_ratio(), 1.0);

        let outside = sample_bubble(&page, &bubble(1.0, 1.0, 0.01), &opts);
        assert!(outside.sampled > 0);

        let far = Bubble {
            x: 3.0,
            y: 3.0,
            ..bubble(0.0, 0.0, 0.01)
        };
        let far_sample = sample_bubble(&page, &far, &opts);
        assert_eq!(far_sample.sampled, 0);
        assert_eq!(far_sample.fill_ratio(), 0.0);
    }

    #[test]
    fn test_min_radius_applies() {
        let (_, _, r) = bubble_geometry(&bubble(0.5, 0.5, 0.001), 100, 100, 6);
        assert_eq!(r, 6);
        let (cx, cy, r) = bubble_geometry(&bubble(0.5, 0.25, 0.05), 200, 400, 6);
        assert_eq!((cx, cy, r), (100, 100, 20));
    }

    #[test]
    fn test_oversized_radius_is_capped() {
        let img = GrayImage::from_pixel(100, 100, Luma([0]));
        let page = GrayPage::from_image(&img);
        let huge = bubble(0.5, 0.5, 1.0e9);

        let (_, _, radius) = bubble_geometry(&huge, 100, 100, 6);
        assert_eq!(radius, 100);

        // The disk covers the whole page
        let sample = sample_bubble(&page, &huge, &OmrOptions::default());
        assert_eq!(sample.sampled, 100 * 100);
        assert_eq!(sample.fill_ratio(), 1.0);

        let options = OmrOptions {
            min_radius_px: u32::MAX,
            ..OmrOptions::default()
        };
        assert_eq!(sample_bubble(&page, &bubble(0.5, 0.5, 0.01), &options).sampled, 100 * 100);
    }
}
