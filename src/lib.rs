//! # omr-tri
//!
//! Bubble-sheet reading and coherence-weighted proficiency scoring.
//!
//! ## Features
//!
//! - **Mark recognition**: fill-ratio sampling of each template bubble, with
//!   per-question confidence and multi-mark tie-breaking
//! - **Question statistics**: cohort-wide difficulty per question
//! - **Historical bands**: cached reference table of past score bands with
//!   earlier-year fallback and atomic reload
//! - **Coherence scoring**: students placed inside their band by which
//!   questions they got right
//! - **Classical scoring**: fixed points per correct answer
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use omr_tri::scoring::{
//!     AnswerKey, AnswerRecord, CoherenceTriScorer, DelimitedTableSource, ExamLayout,
//!     HistoricalConfig, HistoricalScoreRepository, TriProcessingOrchestrator,
//! };
//!
//! let repository = Arc::new(HistoricalScoreRepository::new(
//!     DelimitedTableSource::new("tri_table.csv"),
//!     HistoricalConfig::default(),
//! ));
//! let mut orchestrator =
//!     TriProcessingOrchestrator::new(CoherenceTriScorer::new(repository), 2023);
//!
//! let key = AnswerKey::from_strings(&["A"; 180]);
//! let cohort = vec![AnswerRecord::from_strings("s1", &["A"; 180])];
//! orchestrator.process_areas(&cohort, &key, &ExamLayout::Full.areas()).unwrap();
//! println!("{:?}", orchestrator.overall_scores());
//! ```

pub mod config;
pub mod omr;
pub mod scoring;
pub mod template;

pub use config::{Config, ConfigError};
pub use omr::{OmrBubbleDetector, OmrError, OmrOptions, OmrResult};
pub use scoring::{
    AnswerKey, AnswerRecord, Area, CoherenceTriScorer, HistoricalScoreRepository,
    QuestionStatisticsAggregator, ScoringError, TriProcessingOrchestrator,
};
pub use template::{official_template, BubbleTemplate, TemplateError};
