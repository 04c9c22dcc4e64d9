//! Optical mark recognition
//!
//! Reads filled bubbles from a scanned answer sheet:
//!
//! - `sampler`: pixels → fill ratio for one bubble disk
//! - `decide`: fill ratios → marked/ambiguous/unmarked and one answer per question
//! - `detect`: whole-page detection against a [`BubbleTemplate`](crate::template::BubbleTemplate)
//! - `overlay`: debug rendering of what was read

mod decide;
mod detect;
mod overlay;
mod sampler;
mod types;

pub use decide::{classify, overall_confidence, resolve_question, QuestionDecision};
pub use detect::OmrBubbleDetector;
pub use overlay::render_overlay;
pub use sampler::{bubble_geometry, sample_bubble, BubbleSample, GrayPage};
pub use types::*;
