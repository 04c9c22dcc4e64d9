//! Coherence-weighted proficiency scoring (pass 2)
//!
//! The historical band for a raw score says how past examinees with that
//! many correct answers were spread. A student lands inside the band by how
//! closely their correct answers follow the cohort's difficulty ordering:
//! getting the easy questions right puts them near the top, getting only
//! hard ones right puts them near the bottom.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::historical::{HistoricalEntry, HistoricalScoreRepository, HistoricalTable};
use super::stats::{mean, standard_deviation};
use super::types::{
    AnswerKey, AnswerRecord, Area, CoherenceResult, QuestionRange, QuestionStat, Result,
    ScoringError,
};

// ============================================================
// Constants
// ============================================================

/// Minimum standard deviation of correct percentages (0-100 scale)
pub const DEFAULT_MIN_DIFFICULTY_STD: f64 = 3.0;

// ============================================================
// Options
// ============================================================

/// Pass-2 options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoherenceOptions {
    /// Below this spread of question difficulty every student gets the median
    pub min_difficulty_std: f64,
}

impl Default for CoherenceOptions {
    fn default() -> Self {
        Self {
            min_difficulty_std: DEFAULT_MIN_DIFFICULTY_STD,
        }
    }
}

// ============================================================
// Pure Scoring Functions
// ============================================================

/// Difficulty weight 1 (very hard) to 5 (very easy) from a correct percentage
pub fn difficulty_weight(correct_percentage: f64) -> u32 {
    match correct_percentage {
        p if p >= 80.0 => 5,
        p if p >= 60.0 => 4,
        p if p >= 40.0 => 3,
        p if p >= 20.0 => 2,
        _ => 1,
    }
}

/// Zero-based positions ordered from easiest to hardest
///
/// Stable: questions with equal percentages keep their original order.
pub fn ideal_question_order(percentages: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..percentages.len()).collect();
    order.sort_by(|&a, &b| percentages[b].total_cmp(&percentages[a]));
    order
}

/// `score_real / score_ideal` clamped to [0, 1]; 0 when the ideal is 0
pub fn coherence_index(score_real: u32, score_ideal: u32) -> f64 {
    if score_ideal == 0 {
        return 0.0;
    }
    (score_real as f64 / score_ideal as f64).clamp(0.0, 1.0)
}

/// Position inside the historical band
pub fn interpolate(entry: &HistoricalEntry, coherence: f64) -> f64 {
    entry.min + (entry.max - entry.min) * coherence
}

/// Difficulty picture of one area, shared read-only by every student
#[derive(Debug, Clone)]
pub struct DifficultyProfile {
    weights: Vec<u32>,
    /// Prefix sums of weights along the ideal order; `ideal_prefix[n]` is the
    /// ideal score for `n` correct answers
    ideal_prefix: Vec<u32>,
    spread: f64,
    use_coherence: bool,
}

impl DifficultyProfile {
    /// Build from pass-1 statistics for a range of `question_count` questions
    ///
    /// Statistics are keyed by their 1-based question number inside the range;
    /// questions without a statistic count as 0%.
    pub fn new(stats: Option<&[QuestionStat]>, question_count: usize, min_std: f64) -> Self {
        let stats = stats.filter(|s| !s.is_empty());

        let by_number: HashMap<usize, f64> = stats
            .unwrap_or_default()
            .iter()
            .map(|s| (s.question_number, s.correct_percentage))
            .collect();
        let percentages: Vec<f64> = (1..=question_count)
            .map(|n| by_number.get(&n).copied().unwrap_or(0.0))
            .collect();

        let weights: Vec<u32> = percentages.iter().map(|&p| difficulty_weight(p)).collect();
        let mut ideal_prefix = Vec::with_capacity(question_count + 1);
        ideal_prefix.push(0);
        for position in ideal_question_order(&percentages) {
            let last = ideal_prefix.last().copied().unwrap_or(0);
            ideal_prefix.push(last + weights[position]);
        }

        let supplied: Vec<f64> = stats
            .unwrap_or_default()
            .iter()
            .map(|s| s.correct_percentage)
            .collect();
        let spread = standard_deviation(&supplied);
        let use_coherence = stats.is_some() && spread >= min_std;

        Self {
            weights,
            ideal_prefix,
            spread,
            use_coherence,
        }
    }

    /// Whether interpolation is meaningful for this cohort
    pub fn use_coherence(&self) -> bool {
        self.use_coherence
    }

    /// Standard deviation of the supplied percentages
    pub fn spread(&self) -> f64 {
        self.spread
    }

    pub fn weights(&self) -> &[u32] {
        &self.weights
    }

    /// Sum of weights of the `correct` easiest questions
    pub fn score_ideal(&self, correct: u32) -> u32 {
        let n = (correct as usize).min(self.weights.len());
        self.ideal_prefix[n]
    }

    /// Sum of weights of the questions actually answered correctly
    pub fn score_real(&self, student: &AnswerRecord, key: &AnswerKey, range: QuestionRange) -> u32 {
        range
            .indices()
            .enumerate()
            .filter(|&(_, index)| key.is_correct(index, student.at(index)))
            .map(|(position, _)| self.weights[position])
            .sum()
    }
}

// ============================================================
// Results
// ============================================================

/// Counts over one area's pass-2 run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringSummary {
    pub students: usize,
    pub scored: usize,
    pub interpolated: usize,
    pub median_fallbacks: usize,
    pub missing_historical: usize,
    /// Mean of non-null final scores
    pub average_score: Option<f64>,
}

impl ScoringSummary {
    pub fn from_results(results: &[CoherenceResult]) -> Self {
        let scores: Vec<f64> = results.iter().filter_map(|r| r.final_score).collect();
        let interpolated = results.iter().filter(|r| r.used_coherence).count();
        Self {
            students: results.len(),
            scored: scores.len(),
            interpolated,
            median_fallbacks: scores.len() - interpolated,
            missing_historical: results.len() - scores.len(),
            average_score: (!scores.is_empty()).then(|| mean(&scores)),
        }
    }
}

/// Pass-2 output for one area
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringOutcome {
    pub area: Area,
    pub year: i32,
    /// Same order as the cohort
    pub per_student: Vec<CoherenceResult>,
    pub used_coherence_overall: bool,
    pub summary: ScoringSummary,
}

// ============================================================
// Scorer
// ============================================================

/// Pass-2 scorer backed by the shared historical repository
#[derive(Debug, Clone)]
pub struct CoherenceTriScorer {
    repository: Arc<HistoricalScoreRepository>,
    options: CoherenceOptions,
}

impl CoherenceTriScorer {
    pub fn new(repository: Arc<HistoricalScoreRepository>) -> Self {
        Self::with_options(repository, CoherenceOptions::default())
    }

    pub fn with_options(repository: Arc<HistoricalScoreRepository>, options: CoherenceOptions) -> Self {
        Self { repository, options }
    }

    pub fn repository(&self) -> &Arc<HistoricalScoreRepository> {
        &self.repository
    }

    pub fn options(&self) -> &CoherenceOptions {
        &self.options
    }

    /// Score every student of a cohort in one area
    ///
    /// `stats` must come from a completed pass 1 over the same cohort and
    /// range. Students without a historical band get a null score and are
    /// still reported.
    pub fn calculate(
        &self,
        cohort: &[AnswerRecord],
        key: &AnswerKey,
        area: Area,
        year: i32,
        stats: Option<&[QuestionStat]>,
        range: Option<QuestionRange>,
    ) -> Result<ScoringOutcome> {
        if cohort.is_empty() {
            return Err(ScoringError::EmptyCohort);
        }
        if key.is_empty() {
            return Err(ScoringError::EmptyAnswerKey);
        }
        let range = range.unwrap_or(QuestionRange::full(key.len())).resolve(key.len())?;

        let table = self.repository.load()?;
        let profile = DifficultyProfile::new(stats, range.len(), self.options.min_difficulty_std);
        if stats.is_none_or(|s| s.is_empty()) {
            tracing::warn!("{} {}: no question statistics, using historical medians", area, year);
        } else if !profile.use_coherence() {
            tracing::warn!(
                "{} {}: difficulty spread {:.2} below {:.2}, using historical medians",
                area,
                year,
                profile.spread(),
                self.options.min_difficulty_std
            );
        }

        let per_student: Vec<CoherenceResult> = cohort
            .par_iter()
            .map(|student| score_student(student, key, area, year, range, &profile, &table))
            .collect();

        let summary = ScoringSummary::from_results(&per_student);
        tracing::info!(
            "{} {}: {} students, {} scored ({} interpolated), {} without historical band",
            area,
            year,
            summary.students,
            summary.scored,
            summary.interpolated,
            summary.missing_historical
        );

        Ok(ScoringOutcome {
            area,
            year,
            per_student,
            used_coherence_overall: profile.use_coherence(),
            summary,
        })
    }
}

fn score_student(
    student: &AnswerRecord,
    key: &AnswerKey,
    area: Area,
    year: i32,
    range: QuestionRange,
    profile: &DifficultyProfile,
    table: &HistoricalTable,
) -> CoherenceResult {
    let raw_score = student.correct_count(key, range);

    let Some(entry) = table.find(area, raw_score, year) else {
        tracing::warn!(
            "{}: no {} band for raw score {} up to {}",
            student.student_id,
            area,
            raw_score,
            year
        );
        return CoherenceResult {
            student_id: student.student_id.clone(),
            raw_score,
            final_score: None,
            coherence_index: None,
            used_coherence: false,
            historical_min: None,
            historical_max: None,
        };
    };

    let total = range.len() as u32;
    let interpolate_band = profile.use_coherence() && raw_score > 0 && raw_score < total;

    let (final_score, coherence) = if interpolate_band {
        let ideal = profile.score_ideal(raw_score);
        let real = profile.score_real(student, key, range);
        let index = coherence_index(real, ideal);
        tracing::debug!(
            "{}: raw {} ideal {} real {} coherence {:.3}",
            student.student_id,
            raw_score,
            ideal,
            real,
            index
        );
        (interpolate(entry, index), Some(index))
    } else {
        (entry.median, None)
    };

    CoherenceResult {
        student_id: student.student_id.clone(),
        raw_score,
        final_score: Some(final_score),
        coherence_index: coherence,
        used_coherence: coherence.is_some(),
        historical_min: Some(entry.min),
        historical_max: Some(entry.max),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::historical::{HistoricalConfig, InMemorySource, RawHistoricalRow};
    use crate::scoring::stats::QuestionStatisticsAggregator;

    fn band(area: &str, raw: u32, min: f64, median: f64, max: f64, year: i32) -> RawHistoricalRow {
        RawHistoricalRow {
            area: area.into(),
            raw_score_count: raw.to_string(),
            min: min.to_string(),
            max: max.to_string(),
            median: median.to_string(),
            year: year.to_string(),
        }
    }

    fn scorer(rows: Vec<RawHistoricalRow>) -> CoherenceTriScorer {
        let repo = HistoricalScoreRepository::new(InMemorySource::new(rows), HistoricalConfig::default());
        CoherenceTriScorer::new(Arc::new(repo))
    }

    fn stats(percentages: &[f64]) -> Vec<QuestionStat> {
        percentages
            .iter()
            .enumerate()
            .map(|(i, &p)| QuestionStat {
                question_number: i + 1,
                correct_percentage: p,
            })
            .collect()
    }

    fn mt_rows() -> Vec<RawHistoricalRow> {
        (0..=5).map(|raw| band("MT", raw, 400.0, 500.0, 600.0, 2023)).collect()
    }

    #[test]
    fn test_difficulty_weight_buckets() {
        assert_eq!(difficulty_weight(100.0), 5);
        assert_eq!(difficulty_weight(80.0), 5);
        assert_eq!(difficulty_weight(79.9), 4);
        assert_eq!(difficulty_weight(60.0), 4);
        assert_eq!(difficulty_weight(40.0), 3);
        assert_eq!(difficulty_weight(20.0), 2);
        assert_eq!(difficulty_weight(19.99), 1);
        assert_eq!(difficulty_weight(0.0), 1);
    }

    #[test]
    fn test_coherence_index_bounds() {
        assert_eq!(coherence_index(15, 15), 1.0);
        assert_eq!(coherence_index(0, 15), 0.0);
        assert_eq!(coherence_index(5, 0), 0.0);
        assert_eq!(coherence_index(20, 15), 1.0);
        for real in 0..30 {
            let c = coherence_index(real, 15);
            assert!((0.0..=1.0).contains(&c));
        }
    }

    #[test]
    fn test_interpolation_endpoints() {
        let entry = HistoricalEntry {
            area: Area::MT,
            raw_score_count: 10,
            year: 2023,
            min: 400.0,
            median: 500.0,
            max: 600.0,
        };
        assert_eq!(interpolate(&entry, coherence_index(15, 15)), 600.0);
        assert_eq!(interpolate(&entry, coherence_index(0, 15)), 400.0);
        assert_eq!(interpolate(&entry, 0.5), 500.0);
    }

    #[test]
    fn test_ideal_order_keeps_ties_in_question_order() {
        let order = ideal_question_order(&[50.0, 90.0, 50.0, 90.0, 10.0]);
        assert_eq!(order, vec![1, 3, 0, 2, 4]);
    }

    #[test]
    fn test_score_ideal_depends_on_tie_order() {
        // Q1 and Q2 tie at 60%; Q1 is taken before Q2
        let profile = DifficultyProfile::new(Some(stats(&[60.0, 60.0, 10.0, 85.0]).as_slice()), 4, 3.0);
        assert_eq!(profile.weights(), &[4, 4, 1, 5]);
        assert_eq!(profile.score_ideal(0), 0);
        assert_eq!(profile.score_ideal(1), 5);
        assert_eq!(profile.score_ideal(2), 9);
        assert_eq!(profile.score_ideal(3), 13);
        assert_eq!(profile.score_ideal(4), 14);
        assert_eq!(profile.score_ideal(99), 14);
    }

    #[test]
    fn test_full_coherence_reaches_band_max() {
        let key = AnswerKey::from_strings(&["A", "B", "C", "D", "E"]);
        let cohort = vec![
            AnswerRecord::from_strings("coherent", &["A", "B", "C", "A", "A"]),
            AnswerRecord::from_strings("incoherent", &["B", "C", "C", "D", "E"]),
        ];
        let stats = stats(&[90.0, 85.0, 80.0, 10.0, 0.0]);

        let outcome = scorer(mt_rows())
            .calculate(&cohort, &key, Area::MT, 2023, Some(stats.as_slice()), None)
            .unwrap();
        assert!(outcome.used_coherence_overall);

        // ideal 15, real 15
        let coherent = &outcome.per_student[0];
        assert_eq!(coherent.raw_score, 3);
        assert_eq!(coherent.coherence_index, Some(1.0));
        assert_eq!(coherent.final_score, Some(600.0));
        assert!(coherent.used_coherence);

        // ideal 15, real 5 + 1 + 1
        let incoherent = &outcome.per_student[1];
        assert_eq!(incoherent.raw_score, 3);
        let expected = 400.0 + 200.0 * (7.0 / 15.0);
        assert!((incoherent.final_score.unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_zero_raw_score_uses_median() {
        let key = AnswerKey::from_strings(&["A", "B", "C", "D", "E"]);
        let cohort = vec![AnswerRecord::from_strings("s1", &["E", "E", "E", "E", "A"])];
        let stats = stats(&[90.0, 85.0, 80.0, 10.0, 0.0]);

        let outcome = scorer(mt_rows())
            .calculate(&cohort, &key, Area::MT, 2023, Some(stats.as_slice()), None)
            .unwrap();
        let result = &outcome.per_student[0];
        assert_eq!(result.raw_score, 0);
        assert_eq!(result.final_score, Some(500.0));
        assert!(!result.used_coherence);
        assert_eq!(result.coherence_index, None);
    }

    #[test]
    fn test_perfect_raw_score_uses_median() {
        let key = AnswerKey::from_strings(&["A", "B", "C", "D", "E"]);
        let cohort = vec![AnswerRecord::from_strings("s1", &["A", "B", "C", "D", "E"])];
        let stats = stats(&[90.0, 85.0, 80.0, 10.0, 0.0]);

        let outcome = scorer(mt_rows())
            .calculate(&cohort, &key, Area::MT, 2023, Some(stats.as_slice()), None)
            .unwrap();
        assert_eq!(outcome.per_student[0].final_score, Some(500.0));
        assert!(!outcome.per_student[0].used_coherence);
    }

    #[test]
    fn test_low_variance_and_missing_stats_use_median() {
        let key = AnswerKey::from_strings(&["A", "B", "C", "D"]);
        let cohort = vec![AnswerRecord::from_strings("s1", &["A", "B", "", ""])];
        let flat = stats(&[50.0, 51.0, 52.0, 50.0]);
        let scorer = scorer(mt_rows());

        let outcome = scorer
            .calculate(&cohort, &key, Area::MT, 2023, Some(flat.as_slice()), None)
            .unwrap();
        assert!(!outcome.used_coherence_overall);
        assert_eq!(outcome.per_student[0].final_score, Some(500.0));

        let outcome = scorer.calculate(&cohort, &key, Area::MT, 2023, None, None).unwrap();
        assert!(!outcome.used_coherence_overall);
        assert_eq!(outcome.per_student[0].final_score, Some(500.0));

        let outcome = scorer.calculate(&cohort, &key, Area::MT, 2023, Some(&[][..]), None).unwrap();
        assert!(!outcome.used_coherence_overall);
    }

    #[test]
    fn test_missing_historical_entry_is_null() {
        let key = AnswerKey::from_strings(&["A", "B"]);
        let cohort = vec![
            AnswerRecord::from_strings("found", &["A", ""]),
            AnswerRecord::from_strings("missing", &["A", "B"]),
        ];
        let rows = vec![band("CN", 1, 350.0, 360.0, 370.0, 2021)];

        let outcome = scorer(rows)
            .calculate(&cohort, &key, Area::CN, 2023, None, None)
            .unwrap();
        assert_eq!(outcome.per_student[0].final_score, Some(360.0));
        assert_eq!(outcome.per_student[1].final_score, None);
        assert_eq!(outcome.per_student[1].historical_min, None);
        assert_eq!(outcome.summary.students, 2);
        assert_eq!(outcome.summary.scored, 1);
        assert_eq!(outcome.summary.missing_historical, 1);
        assert_eq!(outcome.summary.average_score, Some(360.0));
    }

    #[test]
    fn test_range_scoring_with_pass_one_stats() {
        // Questions 1-2 belong to another area and must not count
        let key = AnswerKey::from_strings(&["A", "A", "B", "C", "D", "E"]);
        let cohort = vec![
            AnswerRecord::from_strings("s1", &["A", "A", "B", "C", "", ""]),
            AnswerRecord::from_strings("s2", &["", "", "B", "C", "D", ""]),
            AnswerRecord::from_strings("s3", &["A", "A", "B", "", "", ""]),
        ];
        let range = QuestionRange::new(3, 6);
        let stats = QuestionStatisticsAggregator::aggregate(&cohort, &key, Some(range)).unwrap();

        let outcome = scorer(mt_rows())
            .calculate(&cohort, &key, Area::MT, 2023, Some(stats.as_slice()), Some(range))
            .unwrap();
        let raw: Vec<u32> = outcome.per_student.iter().map(|r| r.raw_score).collect();
        assert_eq!(raw, vec![2, 3, 1]);
        assert!(outcome.used_coherence_overall);
        // s3 got only the easiest question
        assert_eq!(outcome.per_student[2].final_score, Some(600.0));
    }

    #[test]
    fn test_structural_errors() {
        let scorer = scorer(mt_rows());
        let key = AnswerKey::from_strings(&["A"]);
        assert!(matches!(
            scorer.calculate(&[], &key, Area::MT, 2023, None, None),
            Err(ScoringError::EmptyCohort)
        ));

        let empty_table = CoherenceTriScorer::new(Arc::new(HistoricalScoreRepository::new(
            InMemorySource::default(),
            HistoricalConfig::default(),
        )));
        let cohort = vec![AnswerRecord::from_strings("s1", &["A"])];
        assert!(matches!(
            empty_table.calculate(&cohort, &key, Area::MT, 2023, None, None),
            Err(ScoringError::Historical(_))
        ));
    }
}
