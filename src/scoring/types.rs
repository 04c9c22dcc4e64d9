//! Scoring core types
//!
//! Answer records, answer keys, knowledge areas and per-student results
//! shared by both scoring passes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::historical::HistoricalError;
use crate::omr::OmrResult;

/// Stand-in for an answer that is present but not a single letter
/// (e.g. "AB" typed during manual correction); counts as an attempt, never correct.
pub const INVALID_MARK: char = '*';

// ============================================================
// Error Types
// ============================================================

/// Batch-level scoring errors
///
/// Only structural problems end up here; per-student problems are carried
/// in each student's result instead.
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("Cohort is empty")]
    EmptyCohort,

    #[error("Answer key is empty")]
    EmptyAnswerKey,

    #[error("Invalid question range {start}..={end} for a {key_len}-question key")]
    InvalidRange {
        start: usize,
        end: usize,
        key_len: usize,
    },

    #[error("Student id '{0}' appears more than once in the cohort")]
    DuplicateStudentId(String),

    #[error("Historical table error: {0}")]
    Historical(#[from] HistoricalError),
}

pub type Result<T> = std::result::Result<T, ScoringError>;

// ============================================================
// Knowledge Areas
// ============================================================

/// Knowledge area of the exam
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Area {
    /// Languages and codes
    LC,
    /// Human sciences
    CH,
    /// Natural sciences
    CN,
    /// Mathematics
    MT,
}

impl Area {
    pub const ALL: [Area; 4] = [Area::LC, Area::CH, Area::CN, Area::MT];

    pub fn code(&self) -> &'static str {
        match self {
            Area::LC => "LC",
            Area::CH => "CH",
            Area::CN => "CN",
            Area::MT => "MT",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Area::LC => "Languages and codes",
            Area::CH => "Human sciences",
            Area::CN => "Natural sciences",
            Area::MT => "Mathematics",
        }
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Area {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LC" => Ok(Area::LC),
            "CH" => Ok(Area::CH),
            "CN" => Ok(Area::CN),
            "MT" => Ok(Area::MT),
            other => Err(format!("unknown area '{other}'")),
        }
    }
}

// ============================================================
// Answers
// ============================================================

/// Normalize a raw answer cell: trimmed, upper-cased, blank → `None`
pub fn normalize_answer(raw: &str) -> Option<char> {
    let trimmed = raw.trim();
    let mut chars = trimmed.chars();
    match (chars.next(), chars.next()) {
        (None, _) => None,
        (Some(c), None) => Some(c.to_ascii_uppercase()),
        (Some(_), Some(_)) => Some(INVALID_MARK),
    }
}

/// Inclusive, 1-indexed question range (a knowledge area)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionRange {
    pub start: usize,
    pub end: usize,
}

impl QuestionRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Whole key
    pub fn full(key_len: usize) -> Self {
        Self::new(1, key_len)
    }

    /// Clip to the key length and reject empty or inverted ranges
    pub fn resolve(self, key_len: usize) -> Result<Self> {
        let end = self.end.min(key_len);
        if self.start == 0 || self.start > end {
            return Err(ScoringError::InvalidRange {
                start: self.start,
                end: self.end,
                key_len,
            });
        }
        Ok(Self::new(self.start, end))
    }

    pub fn len(&self) -> usize {
        (self.end + 1).saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Zero-based indices covered by the range
    pub fn indices(&self) -> std::ops::Range<usize> {
        self.start.saturating_sub(1)..self.end
    }
}

/// Official answer key; blank entries (annulled questions) are never correct
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerKey(pub Vec<Option<char>>);

impl AnswerKey {
    pub fn from_strings<S: AsRef<str>>(answers: &[S]) -> Self {
        Self(answers.iter().map(|a| normalize_answer(a.as_ref())).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Key letter at a zero-based index
    pub fn at(&self, index: usize) -> Option<char> {
        self.0.get(index).copied().flatten()
    }

    /// Whether an answer matches the key at a zero-based index
    pub fn is_correct(&self, index: usize, answer: Option<char>) -> bool {
        match (answer, self.at(index)) {
            (Some(given), Some(expected)) => given != INVALID_MARK && given == expected,
            _ => false,
        }
    }
}

/// One student's answers, index 0 = question 1
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub student_id: String,
    pub answers: Vec<Option<char>>,
}

impl AnswerRecord {
    pub fn new(student_id: impl Into<String>, answers: Vec<Option<char>>) -> Self {
        Self {
            student_id: student_id.into(),
            answers,
        }
    }

    pub fn from_strings<S: AsRef<str>>(student_id: impl Into<String>, answers: &[S]) -> Self {
        Self::new(
            student_id,
            answers.iter().map(|a| normalize_answer(a.as_ref())).collect(),
        )
    }

    /// Record built from a detected page
    pub fn from_omr(student_id: impl Into<String>, result: &OmrResult) -> Self {
        Self::new(student_id, result.answers.clone())
    }

    /// Answer at a zero-based index; missing entries read as blank
    pub fn at(&self, index: usize) -> Option<char> {
        self.answers.get(index).copied().flatten()
    }

    /// Replace one answer (manual correction), growing the record if needed
    pub fn replace(&mut self, question_number: usize, answer: Option<char>) {
        if question_number == 0 {
            return;
        }
        let index = question_number - 1;
        if index >= self.answers.len() {
            self.answers.resize(index + 1, None);
        }
        self.answers[index] = answer;
    }

    /// Correct answers within a range
    pub fn correct_count(&self, key: &AnswerKey, range: QuestionRange) -> u32 {
        range
            .indices()
            .filter(|&i| key.is_correct(i, self.at(i)))
            .count() as u32
    }
}

// ============================================================
// Results
// ============================================================

/// Pass-1 difficulty of one question
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuestionStat {
    /// 1-indexed, relative to the scored range
    pub question_number: usize,
    /// Correct answers / attempts × 100, 0 when nobody attempted
    pub correct_percentage: f64,
}

/// Pass-2 result for one student in one area
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoherenceResult {
    pub student_id: String,
    pub raw_score: u32,
    /// `None` when no historical band exists for this raw score
    pub final_score: Option<f64>,
    /// Only set when the score was interpolated
    pub coherence_index: Option<f64>,
    pub used_coherence: bool,
    pub historical_min: Option<f64>,
    pub historical_max: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_area_parsing() {
        assert_eq!(" mt ".parse::<Area>(), Ok(Area::MT));
        assert_eq!("Lc".parse::<Area>(), Ok(Area::LC));
        assert!("XX".parse::<Area>().is_err());
        assert_eq!(Area::CN.to_string(), "CN");
    }

    #[test]
    fn test_normalize_answer() {
        assert_eq!(normalize_answer(" a "), Some('A'));
        assert_eq!(normalize_answer("E"), Some('E'));
        assert_eq!(normalize_answer("   "), None);
        assert_eq!(normalize_answer(""), None);
        assert_eq!(normalize_answer("AB"), Some(INVALID_MARK));
    }

    #[test]
    fn test_answer_key_matching() {
        let key = AnswerKey::from_strings(&["A", " b", "", "AB"]);
        assert!(key.is_correct(0, Some('A')));
        assert!(key.is_correct(1, normalize_answer("B ")));
        assert!(!key.is_correct(0, Some('B')));
        assert!(!key.is_correct(0, None));
        // Annulled question
        assert!(!key.is_correct(2, Some('C')));
        // Invalid marks never match, even each other
        assert!(!key.is_correct(3, Some(INVALID_MARK)));
        // Past the end of the key
        assert!(!key.is_correct(9, Some('A')));
    }

    #[test]
    fn test_question_range_resolve() {
        assert_eq!(
            QuestionRange::new(46, 200).resolve(90).unwrap(),
            QuestionRange::new(46, 90)
        );
        assert!(QuestionRange::new(0, 10).resolve(90).is_err());
        assert!(QuestionRange::new(91, 100).resolve(90).is_err());
        assert!(QuestionRange::new(10, 5).resolve(90).is_err());

        let range = QuestionRange::new(46, 90);
        assert_eq!(range.len(), 45);
        assert_eq!(range.indices(), 45..90);
        assert!(QuestionRange::new(5, 4).is_empty());
    }

    #[test]
    fn test_answer_record_correct_count_and_replace() {
        let key = AnswerKey::from_strings(&["A", "B", "C", "D"]);
        let mut record = AnswerRecord::from_strings("s1", &["a", "B", "", "E"]);
        assert_eq!(record.correct_count(&key, QuestionRange::full(4)), 2);
        assert_eq!(record.correct_count(&key, QuestionRange::new(2, 4)), 1);

        record.replace(4, Some('D'));
        assert_eq!(record.correct_count(&key, QuestionRange::full(4)), 3);

        record.replace(6, Some('A'));
        assert_eq!(record.answers.len(), 6);
        assert_eq!(record.at(4), None);
        assert_eq!(record.at(5), Some('A'));
    }

    #[test]
    fn test_short_record_reads_blank() {
        let key = AnswerKey::from_strings(&["A", "B", "C"]);
        let record = AnswerRecord::from_strings("s1", &["A"]);
        assert_eq!(record.at(2), None);
        assert_eq!(record.correct_count(&key, QuestionRange::full(3)), 1);
    }
}
