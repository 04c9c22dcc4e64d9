//! Debug overlay rendering
//!
//! Draws the sampled bubble circles over the scanned page so a reviewer can
//! see what the detector read and how sure it was.

use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_circle_mut;

use super::sampler::bubble_geometry;
use super::types::{OmrOptions, OmrResult};
use crate::template::BubbleTemplate;

/// Selected answer, confidence >= 0.8
pub const COLOR_CONFIDENT: Rgb<u8> = Rgb([0, 200, 0]);
/// Selected answer, confidence >= 0.6
pub const COLOR_UNCERTAIN: Rgb<u8> = Rgb([230, 200, 0]);
/// Selected answer, lower confidence
pub const COLOR_DOUBTFUL: Rgb<u8> = Rgb([255, 140, 0]);
/// Bubble not selected
pub const COLOR_UNSELECTED: Rgb<u8> = Rgb([220, 0, 0]);

fn selection_color(confidence: f64) -> Rgb<u8> {
    if confidence >= 0.8 {
        COLOR_CONFIDENT
    } else if confidence >= 0.6 {
        COLOR_UNCERTAIN
    } else {
        COLOR_DOUBTFUL
    }
}

/// Render detection results on top of the page
pub fn render_overlay(
    image: &DynamicImage,
    template: &BubbleTemplate,
    result: &OmrResult,
    options: &OmrOptions,
) -> RgbImage {
    let mut canvas = image.to_rgb8();
    let (w, h) = canvas.dimensions();

    for bubble in &template.bubbles {
        let (cx, cy, radius) = bubble_geometry(bubble, w, h, options.min_radius_px);
        let center = (cx as i32, cy as i32);
        let radius = radius as i32;

        if result.answer(bubble.question_number) == Some(bubble.option) {
            let confidence = result.confidence(bubble.question_number).unwrap_or(0.0);
            let color = selection_color(confidence);
            // Thicker ring for the selected option
            draw_hollow_circle_mut(&mut canvas, center, radius, color);
            draw_hollow_circle_mut(&mut canvas, center, radius + 1, color);
            draw_hollow_circle_mut(&mut canvas, center, radius + 2, color);
        } else {
            draw_hollow_circle_mut(&mut canvas, center, radius, COLOR_UNSELECTED);
        }
    }

    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::omr::OmrBubbleDetector;
    use crate::template::GridLayout;
    use image::{GrayImage, Luma};
    use imageproc::drawing::draw_filled_circle_mut;

    #[test]
    fn test_selection_colors() {
        assert_eq!(selection_color(1.0), COLOR_CONFIDENT);
        assert_eq!(selection_color(0.85), COLOR_CONFIDENT);
        assert_eq!(selection_color(0.75), COLOR_UNCERTAIN);
        assert_eq!(selection_color(0.60), COLOR_UNCERTAIN);
        assert_eq!(selection_color(0.3), COLOR_DOUBTFUL);
    }

    #[test]
    fn test_render_overlay_marks_selected_bubble() {
        let layout = GridLayout {
            column_start_x: vec![0.25],
            row_y: vec![0.5],
            option_spacing: 0.5,
            radius: 0.05,
            options: vec!['A', 'B'],
        };
        let template = BubbleTemplate::from_grid("overlay", &layout);

        let mut gray = GrayImage::from_pixel(200, 200, Luma([255]));
        draw_filled_circle_mut(&mut gray, (50, 100), 12, Luma([0]));
        let page = DynamicImage::ImageLuma8(gray);

        let options = OmrOptions::default();
        let result = OmrBubbleDetector::new(options.clone())
            .detect_image(&page, &template)
            .unwrap();
        assert_eq!(result.answer(1), Some('A'));

        let overlay = render_overlay(&page, &template, &result, &options);
        assert_eq!(overlay.dimensions(), (200, 200));
        // Rightmost point of the outer ring around A (radius 10 + 2)
        assert_eq!(*overlay.get_pixel(62, 100), COLOR_CONFIDENT);
        // Ring around B
        assert_eq!(*overlay.get_pixel(160, 100), COLOR_UNSELECTED);
    }
}
