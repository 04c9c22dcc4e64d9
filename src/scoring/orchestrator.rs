//! Per-area two-pass orchestration
//!
//! Each knowledge area runs `Pending → StatsComputed → Scored`. Areas do not
//! share state and run in parallel; results are merged per student per
//! area so re-scoring one area never touches another area's results.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use super::coherence::{CoherenceTriScorer, ScoringOutcome};
use super::stats::{mean, QuestionStatisticsAggregator};
use super::types::{
    AnswerKey, AnswerRecord, Area, CoherenceResult, QuestionRange, QuestionStat, Result, ScoringError,
};

// ============================================================
// Exam Layouts
// ============================================================

/// One knowledge area and the questions it covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaDefinition {
    pub area: Area,
    pub range: QuestionRange,
}

impl AreaDefinition {
    pub fn new(area: Area, start: usize, end: usize) -> Self {
        Self {
            area,
            range: QuestionRange::new(start, end),
        }
    }
}

/// Standard split of the national exam into areas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExamLayout {
    /// Both days, 180 questions
    #[default]
    Full,
    /// Languages and human sciences
    Day1,
    /// Natural sciences and mathematics, numbered 91-180
    Day2,
}

impl ExamLayout {
    pub fn areas(&self) -> Vec<AreaDefinition> {
        match self {
            ExamLayout::Full => vec![
                AreaDefinition::new(Area::LC, 1, 45),
                AreaDefinition::new(Area::CH, 46, 90),
                AreaDefinition::new(Area::CN, 91, 135),
                AreaDefinition::new(Area::MT, 136, 180),
            ],
            ExamLayout::Day1 => vec![
                AreaDefinition::new(Area::LC, 1, 45),
                AreaDefinition::new(Area::CH, 46, 90),
            ],
            ExamLayout::Day2 => vec![
                AreaDefinition::new(Area::CN, 91, 135),
                AreaDefinition::new(Area::MT, 136, 180),
            ],
        }
    }
}

impl fmt::Display for ExamLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExamLayout::Full => "full",
            ExamLayout::Day1 => "day1",
            ExamLayout::Day2 => "day2",
        })
    }
}

impl FromStr for ExamLayout {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(ExamLayout::Full),
            "day1" => Ok(ExamLayout::Day1),
            "day2" => Ok(ExamLayout::Day2),
            other => Err(format!("unknown layout '{other}'")),
        }
    }
}

// ============================================================
// Area State Machine
// ============================================================

/// Progress of one area through the two passes
#[derive(Debug, Clone, PartialEq)]
pub enum AreaState {
    Pending,
    StatsComputed { stats: Vec<QuestionStat> },
    Scored { stats: Vec<QuestionStat>, outcome: ScoringOutcome },
}

impl AreaState {
    pub fn name(&self) -> &'static str {
        match self {
            AreaState::Pending => "pending",
            AreaState::StatsComputed { .. } => "stats_computed",
            AreaState::Scored { .. } => "scored",
        }
    }
}

/// Results merge by student id, so every id must be unique in the cohort
fn ensure_unique_ids(cohort: &[AnswerRecord]) -> Result<()> {
    let mut seen = HashSet::with_capacity(cohort.len());
    for record in cohort {
        if !seen.insert(record.student_id.as_str()) {
            return Err(ScoringError::DuplicateStudentId(record.student_id.clone()));
        }
    }
    Ok(())
}

/// One area's run over a cohort
#[derive(Debug, Clone)]
pub struct AreaRun {
    definition: AreaDefinition,
    state: AreaState,
}

impl AreaRun {
    pub fn new(definition: AreaDefinition) -> Self {
        Self {
            definition,
            state: AreaState::Pending,
        }
    }

    pub fn definition(&self) -> &AreaDefinition {
        &self.definition
    }

    pub fn state(&self) -> &AreaState {
        &self.state
    }

    /// Move to the next state; a scored run stays scored
    pub fn advance(
        &mut self,
        scorer: &CoherenceTriScorer,
        cohort: &[AnswerRecord],
        key: &AnswerKey,
        year: i32,
    ) -> Result<()> {
        let AreaDefinition { area, range } = self.definition;
        let next = match &self.state {
            AreaState::Pending => {
                ensure_unique_ids(cohort)?;
                let stats = QuestionStatisticsAggregator::aggregate(cohort, key, Some(range))?;
                AreaState::StatsComputed { stats }
            }
            AreaState::StatsComputed { stats } => {
                let outcome =
                    scorer.calculate(cohort, key, area, year, Some(stats.as_slice()), Some(range))?;
                AreaState::Scored {
                    stats: stats.clone(),
                    outcome,
                }
            }
            AreaState::Scored { .. } => return Ok(()),
        };
        tracing::debug!("{}: {} -> {}", area, self.state.name(), next.name());
        self.state = next;
        Ok(())
    }

    /// Run both passes to completion
    pub fn run_to_completion(
        mut self,
        scorer: &CoherenceTriScorer,
        cohort: &[AnswerRecord],
        key: &AnswerKey,
        year: i32,
    ) -> Result<AreaReport> {
        loop {
            self.advance(scorer, cohort, key, year)?;
            if let AreaState::Scored { stats, outcome } = self.state {
                return Ok(AreaReport {
                    definition: self.definition,
                    stats,
                    outcome,
                });
            }
        }
    }
}

/// Completed area
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AreaReport {
    pub definition: AreaDefinition,
    pub stats: Vec<QuestionStat>,
    pub outcome: ScoringOutcome,
}

// ============================================================
// Orchestrator
// ============================================================

/// Per-student results across areas
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StudentResults {
    pub areas: BTreeMap<Area, CoherenceResult>,
}

impl StudentResults {
    /// Mean of non-null area scores
    pub fn overall_score(&self) -> Option<f64> {
        let scores: Vec<f64> = self.areas.values().filter_map(|r| r.final_score).collect();
        (!scores.is_empty()).then(|| mean(&scores))
    }
}

/// Runs areas for one exam year and keeps merged results
#[derive(Debug)]
pub struct TriProcessingOrchestrator {
    scorer: CoherenceTriScorer,
    year: i32,
    results: BTreeMap<String, StudentResults>,
}

impl TriProcessingOrchestrator {
    pub fn new(scorer: CoherenceTriScorer, year: i32) -> Self {
        Self {
            scorer,
            year,
            results: BTreeMap::new(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn scorer(&self) -> &CoherenceTriScorer {
        &self.scorer
    }

    /// Run one area and merge its results
    pub fn process_area(
        &mut self,
        cohort: &[AnswerRecord],
        key: &AnswerKey,
        definition: AreaDefinition,
    ) -> Result<AreaReport> {
        let report = AreaRun::new(definition).run_to_completion(&self.scorer, cohort, key, self.year)?;
        self.merge(&report);
        Ok(report)
    }

    /// Run independent areas in parallel, then merge in the given order
    ///
    /// A structural failure in any area fails the call and merges nothing.
    pub fn process_areas(
        &mut self,
        cohort: &[AnswerRecord],
        key: &AnswerKey,
        definitions: &[AreaDefinition],
    ) -> Result<Vec<AreaReport>> {
        let scorer = &self.scorer;
        let year = self.year;
        let reports: Vec<AreaReport> = definitions
            .par_iter()
            .map(|&definition| AreaRun::new(definition).run_to_completion(scorer, cohort, key, year))
            .collect::<Result<Vec<_>>>()?;

        for report in &reports {
            self.merge(report);
        }
        tracing::info!("{} areas scored for {} students", reports.len(), cohort.len());
        Ok(reports)
    }

    /// Overwrite each student's result for this report's area only
    pub fn merge(&mut self, report: &AreaReport) {
        let area = report.definition.area;
        for result in &report.outcome.per_student {
            self.results
                .entry(result.student_id.clone())
                .or_default()
                .areas
                .insert(area, result.clone());
        }
    }

    pub fn results(&self) -> &BTreeMap<String, StudentResults> {
        &self.results
    }

    pub fn student(&self, student_id: &str) -> Option<&StudentResults> {
        self.results.get(student_id)
    }

    /// Cross-area mean per student
    pub fn overall_scores(&self) -> BTreeMap<String, Option<f64>> {
        self.results
            .iter()
            .map(|(id, r)| (id.clone(), r.overall_score()))
            .collect()
    }

    pub fn clear(&mut self) {
        self.results.clear();
    }
}
