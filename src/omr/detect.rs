//! Page-level bubble detection
//!
//! Samples every bubble of a template on a grayscale page, classifies it,
//! and resolves one answer per question.

use image::DynamicImage;
use rayon::prelude::*;

use super::decide::{classify, overall_confidence, resolve_question, QuestionDecision};
use super::sampler::{sample_bubble, GrayPage};
use super::types::{BubbleDetectionResult, BubbleState, OmrError, OmrOptions, OmrResult, Result};
use crate::template::BubbleTemplate;

/// Bubble detector
///
/// Holds only thresholds, so one instance can serve many pages in parallel.
#[derive(Debug, Clone, Default)]
pub struct OmrBubbleDetector {
    options: OmrOptions,
}

impl OmrBubbleDetector {
    pub fn new(options: OmrOptions) -> Self {
        Self {
            options: options.normalized(),
        }
    }

    pub fn options(&self) -> &OmrOptions {
        &self.options
    }

    /// Detect answers on a row-major 8-bit grayscale buffer
    pub fn detect(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
        template: &BubbleTemplate,
    ) -> Result<OmrResult> {
        if width == 0 || height == 0 {
            return Err(OmrError::MissingImageDimensions { width, height });
        }
        let expected = width as usize * height as usize;
        if pixels.len() < expected {
            return Err(OmrError::BufferSizeMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        template.validate()?;

        let page = GrayPage::new(pixels, width, height);
        Ok(self.detect_page(&page, template))
    }

    /// Detect answers on any decoded image (converted to luma first)
    pub fn detect_image(&self, image: &DynamicImage, template: &BubbleTemplate) -> Result<OmrResult> {
        let gray = image.to_luma8();
        self.detect(gray.as_raw(), gray.width(), gray.height(), template)
    }

    /// Detect several pages in parallel; each page fails independently
    pub fn detect_batch(
        &self,
        images: &[DynamicImage],
        template: &BubbleTemplate,
    ) -> Vec<Result<OmrResult>> {
        images
            .par_iter()
            .map(|image| self.detect_image(image, template))
            .collect()
    }

    fn detect_page(&self, page: &GrayPage<'_>, template: &BubbleTemplate) -> OmrResult {
        let bubbles: Vec<BubbleDetectionResult> = template
            .bubbles
            .iter()
            .map(|bubble| {
                let sample = sample_bubble(page, bubble, &self.options);
                let fill_ratio = sample.fill_ratio();
                let state = classify(fill_ratio, &self.options);
                BubbleDetectionResult {
                    question_number: bubble.question_number,
                    option: bubble.option,
                    fill_ratio,
                    is_marked: state == BubbleState::Marked,
                    is_ambiguous: state == BubbleState::Ambiguous,
                    sampled_pixels: sample.sampled,
                }
            })
            .collect();

        // Template validation guarantees question numbers within 1..=N
        let mut by_question: Vec<Vec<BubbleDetectionResult>> =
            vec![Vec::new(); template.total_questions];
        for b in &bubbles {
            by_question[b.question_number - 1].push(b.clone());
        }

        let decisions: Vec<QuestionDecision> = by_question
            .iter()
            .enumerate()
            .map(|(i, group)| resolve_question(i + 1, group, &self.options))
            .collect();

        let overall = overall_confidence(&decisions);
        let warnings: Vec<String> = decisions.iter().filter_map(|d| d.warning.clone()).collect();

        tracing::debug!(
            "page {}x{}: {} answered of {}, confidence {:.2}, {} warning(s)",
            page.width(),
            page.height(),
            decisions.iter().filter(|d| d.answer.is_some()).count(),
            decisions.len(),
            overall,
            warnings.len()
        );

        OmrResult {
            answers: decisions.iter().map(|d| d.answer).collect(),
            confidences: decisions.iter().map(|d| d.confidence).collect(),
            overall_confidence: overall,
            warnings,
            bubbles,
        }
    }
}
