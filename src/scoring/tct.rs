//! Classical test theory scoring
//!
//! Fixed points per correct answer on a 0-10 scale, per area and overall.
//! Needs no historical data and no pass-1 statistics.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::orchestrator::AreaDefinition;
use super::types::{AnswerKey, AnswerRecord, Area, QuestionRange, Result, ScoringError};

/// 45 correct answers ≈ 10.0
pub const DEFAULT_POINTS_PER_CORRECT: f64 = 0.222;

/// Top of the classical scale
pub const MAX_SCORE: f64 = 10.0;

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Classical score of one student
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TctResult {
    pub student_id: String,
    /// Empty when scored against the whole key
    pub area_scores: BTreeMap<Area, f64>,
    pub correct_by_area: BTreeMap<Area, u32>,
    pub average_score: f64,
}

/// Classical scorer
#[derive(Debug, Clone)]
pub struct TctScorer {
    points_per_correct: f64,
}

impl Default for TctScorer {
    fn default() -> Self {
        Self {
            points_per_correct: DEFAULT_POINTS_PER_CORRECT,
        }
    }
}

impl TctScorer {
    pub fn new(points_per_correct: f64) -> Self {
        let points_per_correct = if points_per_correct.is_finite() && points_per_correct > 0.0 {
            points_per_correct
        } else {
            DEFAULT_POINTS_PER_CORRECT
        };
        Self { points_per_correct }
    }

    pub fn points_per_correct(&self) -> f64 {
        self.points_per_correct
    }

    /// Score a cohort
    ///
    /// With areas, each area scores `correct × points` and the average is the
    /// mean of the unrounded area scores. Without areas the whole key is
    /// scored proportionally. All reported values are rounded to one decimal.
    pub fn score(
        &self,
        cohort: &[AnswerRecord],
        key: &AnswerKey,
        areas: &[AreaDefinition],
    ) -> Result<Vec<TctResult>> {
        if cohort.is_empty() {
            return Err(ScoringError::EmptyCohort);
        }
        if key.is_empty() {
            return Err(ScoringError::EmptyAnswerKey);
        }

        let resolved: Vec<(Area, QuestionRange)> = areas
            .iter()
            .map(|d| d.range.resolve(key.len()).map(|r| (d.area, r)))
            .collect::<Result<_>>()?;

        let results = cohort
            .iter()
            .map(|student| {
                if resolved.is_empty() {
                    let correct = student.correct_count(key, QuestionRange::full(key.len()));
                    return TctResult {
                        student_id: student.student_id.clone(),
                        area_scores: BTreeMap::new(),
                        correct_by_area: BTreeMap::new(),
                        average_score: round1(MAX_SCORE * correct as f64 / key.len() as f64),
                    };
                }

                let mut area_scores = BTreeMap::new();
                let mut correct_by_area = BTreeMap::new();
                let mut total = 0.0;
                for &(area, range) in &resolved {
                    let correct = student.correct_count(key, range);
                    let score = correct as f64 * self.points_per_correct;
                    total += score;
                    area_scores.insert(area, round1(score));
                    correct_by_area.insert(area, correct);
                }

                TctResult {
                    student_id: student.student_id.clone(),
                    area_scores,
                    correct_by_area,
                    average_score: round1(total / resolved.len() as f64),
                }
            })
            .collect();

        Ok(results)
    }
}
