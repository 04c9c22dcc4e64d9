//! Question statistics (pass 1)
//!
//! Cohort-wide correct percentage per question. Pass 2 reads these as
//! difficulty, so the whole cohort must be aggregated before any student
//! is scored.

use rayon::prelude::*;

use super::types::{AnswerKey, AnswerRecord, QuestionRange, QuestionStat, Result, ScoringError};

/// Pass-1 aggregator
pub struct QuestionStatisticsAggregator;

impl QuestionStatisticsAggregator {
    /// Correct percentage of each question in `range` (default: whole key)
    ///
    /// Percentages are computed over attempts (non-blank answers). Output
    /// question numbers start at 1 at the beginning of the range.
    pub fn aggregate(
        cohort: &[AnswerRecord],
        key: &AnswerKey,
        range: Option<QuestionRange>,
    ) -> Result<Vec<QuestionStat>> {
        if cohort.is_empty() {
            return Err(ScoringError::EmptyCohort);
        }
        if key.is_empty() {
            return Err(ScoringError::EmptyAnswerKey);
        }
        let range = range.unwrap_or(QuestionRange::full(key.len())).resolve(key.len())?;

        let stats: Vec<QuestionStat> = range
            .indices()
            .into_par_iter()
            .map(|index| {
                let mut attempts = 0u32;
                let mut correct = 0u32;
                for student in cohort {
                    let answer = student.at(index);
                    if answer.is_some() {
                        attempts += 1;
                        if key.is_correct(index, answer) {
                            correct += 1;
                        }
                    }
                }

                let correct_percentage = if attempts > 0 {
                    correct as f64 / attempts as f64 * 100.0
                } else {
                    0.0
                };

                QuestionStat {
                    question_number: index + 2 - range.start,
                    correct_percentage,
                }
            })
            .collect();

        let percentages: Vec<f64> = stats.iter().map(|s| s.correct_percentage).collect();
        tracing::info!(
            "question stats for {}..={} over {} students: mean {:.1}%, min {:.1}%, max {:.1}%, std {:.2}",
            range.start,
            range.end,
            cohort.len(),
            mean(&percentages),
            percentages.iter().copied().fold(f64::INFINITY, f64::min),
            percentages.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            standard_deviation(&percentages)
        );

        Ok(stats)
    }
}

/// Arithmetic mean, 0 for no values
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation, 0 for fewer than two values
pub fn standard_deviation(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}
