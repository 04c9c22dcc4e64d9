//! Proficiency scoring
//!
//! Two passes per knowledge area:
//!
//! - `stats`: pass 1, cohort-wide correct percentage per question
//! - `coherence`: pass 2, each student placed inside the historical band for
//!   their raw score by how coherent their correct answers are
//!
//! `historical` holds the reference table, `orchestrator` sequences the
//! passes per area and merges results, and `tct` is the classical scale.

mod coherence;
mod historical;
mod orchestrator;
mod stats;
mod tct;
mod types;

pub use coherence::{
    coherence_index, difficulty_weight, ideal_question_order, interpolate, CoherenceOptions,
    CoherenceTriScorer, DifficultyProfile, ScoringOutcome, ScoringSummary, DEFAULT_MIN_DIFFICULTY_STD,
};
pub use historical::{
    load_table, parse_row, DelimitedTableSource, HistoricalConfig, HistoricalEntry, HistoricalError,
    HistoricalScoreRepository, HistoricalTable, InMemorySource, RawHistoricalRow, RowError,
    TableSource, TableStats, ZeroScoreDefaults, DEFAULT_DELIMITER, DEFAULT_YEAR_WINDOW,
};
pub use orchestrator::{
    AreaDefinition, AreaReport, AreaRun, AreaState, ExamLayout, StudentResults,
    TriProcessingOrchestrator,
};
pub use stats::{mean, standard_deviation, QuestionStatisticsAggregator};
pub use tct::{TctResult, TctScorer, DEFAULT_POINTS_PER_CORRECT};
pub use types::*;
