//! OMR core types
//!
//! Thresholds, options, and result structures shared by the sampler,
//! the per-question decision logic, and the page detector.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::template::TemplateError;

// ============================================================
// Constants
// ============================================================

/// Luminance below which a pixel counts as dark (mid-gray cut)
pub const DEFAULT_DARK_THRESHOLD: u8 = 128;

/// Minimum fill ratio to call a bubble marked
pub const DEFAULT_FILL_LOW: f64 = 0.35;

/// Fill ratio of a confident mark
pub const DEFAULT_FILL_HIGH: f64 = 0.50;

/// Lower edge of the faint-mark band
pub const DEFAULT_AMBIGUOUS_LOW: f64 = 0.20;

/// Upper edge (exclusive) of the faint-mark band
pub const DEFAULT_AMBIGUOUS_HIGH: f64 = 0.35;

/// Lead over the runner-up that makes a multi-mark winner clear
pub const DEFAULT_CLEAR_WINNER_MARGIN: f64 = 0.15;

/// Smallest sampling radius in pixels
pub const DEFAULT_MIN_RADIUS_PX: u32 = 6;

/// Confidence of a blank question with no plausible mark
pub const CONFIDENCE_BLANK: f64 = 1.0;

/// Confidence of a single mark at or above the high threshold
pub const CONFIDENCE_STRONG_MARK: f64 = 1.0;

/// Confidence of a single mark below the high threshold
pub const CONFIDENCE_SINGLE_MARK: f64 = 0.90;

/// Confidence of a multi-mark question with a clear winner
pub const CONFIDENCE_CLEAR_WINNER: f64 = 0.85;

/// Confidence of a lightly marked question
pub const CONFIDENCE_FAINT_MARK: f64 = 0.75;

/// Confidence of a multi-mark question without a clear winner
pub const CONFIDENCE_TIED_MARKS: f64 = 0.60;

// ============================================================
// Error Types
// ============================================================

/// Page-level detection errors
///
/// Every variant aborts detection of the page that raised it and nothing
/// else; batch callers keep going with the remaining pages.
#[derive(Debug, Error)]
pub enum OmrError {
    #[error("Image dimensions missing: {width}x{height}")]
    MissingImageDimensions { width: u32, height: u32 },

    #[error("Pixel buffer holds {actual} bytes, {expected} expected")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("Invalid template: {0}")]
    Template(#[from] TemplateError),
}

pub type Result<T> = std::result::Result<T, OmrError>;

// ============================================================
// Options
// ============================================================

/// Bubble classification thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OmrOptions {
    pub dark_threshold: u8,
    pub fill_low: f64,
    pub fill_high: f64,
    pub ambiguous_low: f64,
    pub ambiguous_high: f64,
    pub clear_winner_margin: f64,
    pub min_radius_px: u32,
}

impl Default for OmrOptions {
    fn default() -> Self {
        Self {
            dark_threshold: DEFAULT_DARK_THRESHOLD,
            fill_low: DEFAULT_FILL_LOW,
            fill_high: DEFAULT_FILL_HIGH,
            ambiguous_low: DEFAULT_AMBIGUOUS_LOW,
            ambiguous_high: DEFAULT_AMBIGUOUS_HIGH,
            clear_winner_margin: DEFAULT_CLEAR_WINNER_MARGIN,
            min_radius_px: DEFAULT_MIN_RADIUS_PX,
        }
    }
}

impl OmrOptions {
    /// Create a new options builder
    pub fn builder() -> OmrOptionsBuilder {
        OmrOptionsBuilder::default()
    }

    /// Restore threshold ordering after user edits
    ///
    /// Keeps `ambiguous_low <= ambiguous_high <= fill_low <= fill_high`, so the
    /// faint band always sits strictly below the marked threshold.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        let finite_or = |v: f64, default: f64| if v.is_finite() { v } else { default };
        self.fill_low = finite_or(self.fill_low, DEFAULT_FILL_LOW);
        self.fill_high = finite_or(self.fill_high, DEFAULT_FILL_HIGH);
        self.ambiguous_low = finite_or(self.ambiguous_low, DEFAULT_AMBIGUOUS_LOW);
        self.ambiguous_high = finite_or(self.ambiguous_high, DEFAULT_AMBIGUOUS_HIGH);
        self.clear_winner_margin = finite_or(self.clear_winner_margin, DEFAULT_CLEAR_WINNER_MARGIN);

        self.fill_low = self.fill_low.clamp(0.0, 1.0);
        self.fill_high = self.fill_high.clamp(self.fill_low, 1.0);
        self.ambiguous_high = self.ambiguous_high.clamp(0.0, self.fill_low);
        self.ambiguous_low = self.ambiguous_low.clamp(0.0, self.ambiguous_high);
        self.clear_winner_margin = self.clear_winner_margin.clamp(0.0, 1.0);
        self
    }
}

/// Builder for OmrOptions
#[derive(Debug, Default)]
pub struct OmrOptionsBuilder {
    options: OmrOptions,
}

impl OmrOptionsBuilder {
    /// Set the dark pixel luminance cut
    #[must_use]
    pub fn dark_threshold(mut self, threshold: u8) -> Self {
        self.options.dark_threshold = threshold;
        self
    }

    /// Set the marked / confident-mark thresholds
    #[must_use]
    pub fn fill_thresholds(mut self, low: f64, high: f64) -> Self {
        self.options.fill_low = low;
        self.options.fill_high = high;
        self
    }

    /// Set the faint-mark band `[low, high)`
    #[must_use]
    pub fn ambiguous_band(mut self, low: f64, high: f64) -> Self {
        self.options.ambiguous_low = low;
        self.options.ambiguous_high = high;
        self
    }

    /// Set the clear-winner margin for multi-mark questions
    #[must_use]
    pub fn clear_winner_margin(mut self, margin: f64) -> Self {
        self.options.clear_winner_margin = margin;
        self
    }

    /// Set the minimum sampling radius (pixels, at least 1)
    #[must_use]
    pub fn min_radius_px(mut self, radius: u32) -> Self {
        self.options.min_radius_px = radius.max(1);
        self
    }

    /// Build the options
    #[must_use]
    pub fn build(self) -> OmrOptions {
        self.options.normalized()
    }
}

// ============================================================
// Results
// ============================================================

/// Classification of a single bubble
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BubbleState {
    Unmarked,
    Ambiguous,
    Marked,
}

/// Per-bubble measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BubbleDetectionResult {
    pub question_number: usize,
    pub option: char,
    /// Dark pixels / sampled pixels
    pub fill_ratio: f64,
    pub is_marked: bool,
    pub is_ambiguous: bool,
    /// Pixels inside the disk that fell within the image
    pub sampled_pixels: u32,
}

impl BubbleDetectionResult {
    /// Classification recovered from the flags
    pub fn state(&self) -> BubbleState {
        if self.is_marked {
            BubbleState::Marked
        } else if self.is_ambiguous {
            BubbleState::Ambiguous
        } else {
            BubbleState::Unmarked
        }
    }
}

/// Detection result for one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OmrResult {
    /// Answers for questions 1..=N (index 0 is question 1), `None` = blank
    pub answers: Vec<Option<char>>,
    /// Confidence per question, same indexing as `answers`
    pub confidences: Vec<f64>,
    /// Mean confidence over answered questions (1.0 for an all-blank sheet)
    pub overall_confidence: f64,
    /// Human-readable notes about questions that needed a tie-break
    pub warnings: Vec<String>,
    /// Raw per-bubble measurements, in template order
    pub bubbles: Vec<BubbleDetectionResult>,
}

impl OmrResult {
    /// Answer for a 1-indexed question
    pub fn answer(&self, question_number: usize) -> Option<char> {
        question_number
            .checked_sub(1)
            .and_then(|i| self.answers.get(i).copied().flatten())
    }

    /// Confidence for a 1-indexed question
    pub fn confidence(&self, question_number: usize) -> Option<f64> {
        question_number
            .checked_sub(1)
            .and_then(|i| self.confidences.get(i).copied())
    }

    /// Number of non-blank answers
    pub fn answered_count(&self) -> usize {
        self.answers.iter().filter(|a| a.is_some()).count()
    }

    /// Answers as strings, blank as `""`
    pub fn answer_strings(&self) -> Vec<String> {
        self.answers
            .iter()
            .map(|a| a.map(String::from).unwrap_or_default())
            .collect()
    }
}
