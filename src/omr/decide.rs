//! Per-question decision logic
//!
//! Pure functions from fill ratios to a bubble classification and from a
//! question's bubbles to one answer (or blank) with a confidence.

use super::types::{
    BubbleDetectionResult, BubbleState, OmrOptions, CONFIDENCE_BLANK, CONFIDENCE_CLEAR_WINNER,
    CONFIDENCE_FAINT_MARK, CONFIDENCE_SINGLE_MARK, CONFIDENCE_STRONG_MARK, CONFIDENCE_TIED_MARKS,
};

/// Outcome for one question
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionDecision {
    pub answer: Option<char>,
    pub confidence: f64,
    /// Set when several marks could not be told apart
    pub warning: Option<String>,
}

impl QuestionDecision {
    fn blank() -> Self {
        Self {
            answer: None,
            confidence: CONFIDENCE_BLANK,
            warning: None,
        }
    }

    fn answered(option: char, confidence: f64) -> Self {
        Self {
            answer: Some(option),
            confidence,
            warning: None,
        }
    }
}

/// Classify a single bubble by its fill ratio
///
/// An empty bubble (fill 0) is always unmarked, whatever the thresholds.
pub fn classify(fill_ratio: f64, options: &OmrOptions) -> BubbleState {
    if fill_ratio <= 0.0 {
        BubbleState::Unmarked
    } else if fill_ratio >= options.fill_low {
        BubbleState::Marked
    } else if fill_ratio >= options.ambiguous_low && fill_ratio < options.ambiguous_high {
        BubbleState::Ambiguous
    } else {
        BubbleState::Unmarked
    }
}

/// First bubble with the highest fill ratio (template order breaks ties)
fn fullest<'a, I>(bubbles: I) -> Option<&'a BubbleDetectionResult>
where
    I: IntoIterator<Item = &'a BubbleDetectionResult>,
{
    let mut best: Option<&BubbleDetectionResult> = None;
    for b in bubbles {
        if best.is_none_or(|cur| b.fill_ratio > cur.fill_ratio) {
            best = Some(b);
        }
    }
    best
}

/// Resolve one question from its bubbles
pub fn resolve_question(
    question_number: usize,
    bubbles: &[BubbleDetectionResult],
    options: &OmrOptions,
) -> QuestionDecision {
    let mut marked: Vec<&BubbleDetectionResult> = bubbles.iter().filter(|b| b.is_marked).collect();

    match marked.len() {
        0 => match fullest(bubbles.iter().filter(|b| b.is_ambiguous)) {
            Some(faint) => {
                tracing::debug!(
                    "Q{}: light mark on {} (fill {:.2})",
                    question_number,
                    faint.option,
                    faint.fill_ratio
                );
                QuestionDecision::answered(faint.option, CONFIDENCE_FAINT_MARK)
            }
            None => QuestionDecision::blank(),
        },
        1 => {
            let only = marked[0];
            let confidence = if only.fill_ratio >= options.fill_high {
                CONFIDENCE_STRONG_MARK
            } else {
                CONFIDENCE_SINGLE_MARK
            };
            QuestionDecision::answered(only.option, confidence)
        }
        _ => {
            // Stable: equal fills keep template order
            marked.sort_by(|a, b| b.fill_ratio.total_cmp(&a.fill_ratio));
            let top = marked[0];
            let lead = top.fill_ratio - marked[1].fill_ratio;

            if lead > options.clear_winner_margin {
                return QuestionDecision::answered(top.option, CONFIDENCE_CLEAR_WINNER);
            }

            let tied: Vec<String> = marked
                .iter()
                .filter(|b| top.fill_ratio - b.fill_ratio <= options.clear_winner_margin)
                .map(|b| format!("{} ({:.2})", b.option, b.fill_ratio))
                .collect();
            let warning = format!(
                "Question {}: multiple marks without a clear winner: {}; chose {}",
                question_number,
                tied.join(", "),
                top.option
            );
            tracing::warn!("{}", warning);

            QuestionDecision {
                answer: Some(top.option),
                confidence: CONFIDENCE_TIED_MARKS,
                warning: Some(warning),
            }
        }
    }
}

/// Mean confidence over answered questions; 1.0 when nothing was answered
pub fn overall_confidence(decisions: &[QuestionDecision]) -> f64 {
    let answered: Vec<f64> = decisions
        .iter()
        .filter(|d| d.answer.is_some())
        .map(|d| d.confidence)
        .collect();

    if answered.is_empty() {
        CONFIDENCE_BLANK
    } else {
        answered.iter().sum::<f64>() / answered.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detections(fills: &[(char, f64)]) -> Vec<BubbleDetectionResult> {
        let opts = OmrOptions::default();
        fills
            .iter()
            .map(|&(option, fill_ratio)| {
                let state = classify(fill_ratio, &opts);
                BubbleDetectionResult {
                    question_number: 1,
                    option,
                    fill_ratio,
                    is_marked: state == BubbleState::Marked,
                    is_ambiguous: state == BubbleState::Ambiguous,
                    sampled_pixels: 100,
                }
            })
            .collect()
    }

    fn resolve(fills: &[(char, f64)]) -> QuestionDecision {
        resolve_question(1, &detections(fills), &OmrOptions::default())
    }

    #[test]
    fn test_classify_bands() {
        let opts = OmrOptions::default();
        assert_eq!(classify(0.0, &opts), BubbleState::Unmarked);
        assert_eq!(classify(0.10, &opts), BubbleState::Unmarked);
        assert_eq!(classify(0.20, &opts), BubbleState::Ambiguous);
        assert_eq!(classify(0.34, &opts), BubbleState::Ambiguous);
        assert_eq!(classify(0.35, &opts), BubbleState::Marked);
        assert_eq!(classify(0.90, &opts), BubbleState::Marked);
    }

    #[test]
    fn test_white_bubble_never_marked_or_ambiguous() {
        let opts = OmrOptions::builder()
            .fill_thresholds(0.0, 0.0)
            .ambiguous_band(0.0, 0.0)
            .build();
        assert_eq!(classify(0.0, &opts), BubbleState::Unmarked);
    }

    #[test]
    fn test_blank_question() {
        let d = resolve(&[('A', 0.0), ('B', 0.05), ('C', 0.1), ('D', 0.0), ('E', 0.0)]);
        assert_eq!(d.answer, None);
        assert_eq!(d.confidence, 1.0);
        assert!(d.warning.is_none());
    }

    #[test]
    fn test_single_confident_mark() {
        let d = resolve(&[('A', 0.02), ('B', 0.62), ('C', 0.34), ('D', 0.0), ('E', 0.1)]);
        assert_eq!(d.answer, Some('B'));
        assert_eq!(d.confidence, 1.0);
    }

    #[test]
    fn test_single_light_mark() {
        let d = resolve(&[('A', 0.0), ('B', 0.0), ('C', 0.42), ('D', 0.0), ('E', 0.0)]);
        assert_eq!(d.answer, Some('C'));
        assert_eq!(d.confidence, 0.90);
    }

    #[test]
    fn test_faint_mark_picks_fullest_ambiguous() {
        let d = resolve(&[('A', 0.22), ('B', 0.0), ('C', 0.0), ('D', 0.31), ('E', 0.0)]);
        assert_eq!(d.answer, Some('D'));
        assert_eq!(d.confidence, 0.75);
    }

    #[test]
    fn test_faint_tie_keeps_template_order() {
        let d = resolve(&[('A', 0.0), ('B', 0.25), ('C', 0.25), ('D', 0.0), ('E', 0.0)]);
        assert_eq!(d.answer, Some('B'));
    }

    #[test]
    fn test_multiple_marks_clear_winner() {
        let d = resolve(&[('A', 0.90), ('B', 0.40), ('C', 0.0), ('D', 0.0), ('E', 0.0)]);
        assert_eq!(d.answer, Some('A'));
        assert_eq!(d.confidence, 0.85);
        assert!(d.warning.is_none());
    }

    #[test]
    fn test_multiple_marks_tied() {
        let d = resolve(&[('A', 0.0), ('B', 0.70), ('C', 0.0), ('D', 0.75), ('E', 0.0)]);
        assert_eq!(d.answer, Some('D'));
        assert_eq!(d.confidence, 0.60);
        let warning = d.warning.unwrap();
        assert!(warning.contains("Question 1"));
        assert!(warning.contains('B'));
        assert!(warning.contains('D'));
    }

    #[test]
    fn test_overall_confidence() {
        let decisions = vec![
            QuestionDecision::answered('A', 1.0),
            QuestionDecision::blank(),
            QuestionDecision::answered('B', 0.6),
        ];
        assert!((overall_confidence(&decisions) - 0.8).abs() < 1e-12);

        let all_blank = vec![QuestionDecision::blank(), QuestionDecision::blank()];
        assert_eq!(overall_confidence(&all_blank), 1.0);
        assert_eq!(overall_confidence(&[]), 1.0);
    }
}
