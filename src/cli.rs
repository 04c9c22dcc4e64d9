//! Command-line arguments and command runners

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use omr_tri::config::Config;
use omr_tri::omr::{render_overlay, OmrBubbleDetector, OmrResult};
use omr_tri::scoring::{
    AnswerKey, AnswerRecord, Area, AreaDefinition, CoherenceTriScorer, DelimitedTableSource,
    ExamLayout, HistoricalScoreRepository, QuestionRange, ScoringSummary, StudentResults,
    TctResult, TctScorer, TriProcessingOrchestrator,
};
use omr_tri::template::{official_template, BubbleTemplate};

#[derive(Debug, Parser)]
#[command(name = "omr-tri")]
#[command(about = "Read bubble sheets and score them against historical proficiency bands")]
#[command(version)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Configuration file (default: <config dir>/omr-tri/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Detect marked answers on scanned pages
    Detect(DetectArgs),

    /// Two-pass proficiency scoring of a cohort
    Score(ScoreArgs),

    /// Classical 0-10 scoring of a cohort
    Tct(TctArgs),

    /// Write the official answer-sheet template as JSON
    Template(TemplateArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LayoutArg {
    /// LC 1-45, CH 46-90, CN 91-135, MT 136-180
    Full,
    /// LC and CH
    Day1,
    /// CN and MT
    Day2,
    /// The whole key as one area
    Whole,
}

impl LayoutArg {
    fn exam_layout(self) -> Option<ExamLayout> {
        match self {
            LayoutArg::Full => Some(ExamLayout::Full),
            LayoutArg::Day1 => Some(ExamLayout::Day1),
            LayoutArg::Day2 => Some(ExamLayout::Day2),
            LayoutArg::Whole => None,
        }
    }
}

#[derive(Debug, Args)]
pub struct DetectArgs {
    /// Page images
    #[arg(required = true)]
    pub images: Vec<PathBuf>,

    /// Template JSON (default: official 90-question sheet)
    #[arg(long)]
    pub template: Option<PathBuf>,

    /// Write a debug overlay PNG per page into this directory
    #[arg(long)]
    pub overlay: Option<PathBuf>,

    /// Write JSON here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ScoreArgs {
    /// Cohort JSON: [{"id": "...", "answers": ["A", "", ...]}, ...]
    #[arg(long)]
    pub cohort: PathBuf,

    /// Answer key JSON: ["A", "B", ...]
    #[arg(long)]
    pub key: PathBuf,

    /// Historical band table (default: [historical] table from config)
    #[arg(long)]
    pub table: Option<PathBuf>,

    /// Exam year
    #[arg(long)]
    pub year: i32,

    #[arg(long, value_enum, default_value_t = LayoutArg::Full)]
    pub layout: LayoutArg,

    /// Score only this area (required with --layout whole)
    #[arg(long)]
    pub area: Option<Area>,

    /// Table column separator
    #[arg(long, default_value_t = ';')]
    pub delimiter: char,

    /// Write JSON here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct TctArgs {
    #[arg(long)]
    pub cohort: PathBuf,

    #[arg(long)]
    pub key: PathBuf,

    #[arg(long, value_enum, default_value_t = LayoutArg::Whole)]
    pub layout: LayoutArg,

    /// Write JSON here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct TemplateArgs {
    /// Write here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

// ============================================================
// Input Files
// ============================================================

#[derive(Debug, Deserialize)]
struct CohortEntry {
    id: String,
    /// `null` reads as blank
    #[serde(default)]
    answers: Vec<Option<String>>,
}

fn cells(values: &[Option<String>]) -> Vec<&str> {
    values.iter().map(|v| v.as_deref().unwrap_or("")).collect()
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {} {}", what, path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid {} {}", what, path.display()))
}

fn load_cohort(path: &Path) -> Result<Vec<AnswerRecord>> {
    let entries: Vec<CohortEntry> = read_json(path, "cohort")?;
    Ok(entries
        .into_iter()
        .map(|e| AnswerRecord::from_strings(e.id, &cells(&e.answers)))
        .collect())
}

fn load_key(path: &Path) -> Result<AnswerKey> {
    let answers: Vec<Option<String>> = read_json(path, "answer key")?;
    Ok(AnswerKey::from_strings(&cells(&answers)))
}

fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => std::fs::write(path, json + "\n")
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}

fn progress_bar(len: usize, verbose: u8) -> ProgressBar {
    if verbose > 1 {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} {msg}") {
        pb.set_style(style.progress_chars("=> "));
    }
    pb
}

// ============================================================
// detect
// ============================================================

#[derive(Debug, Serialize)]
struct PageReport {
    image: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<OmrResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub fn run_detect(args: &DetectArgs, config: &Config, verbose: u8) -> Result<()> {
    let loaded;
    let template: &BubbleTemplate = match &args.template {
        Some(path) => {
            loaded = BubbleTemplate::from_json_file(path)
                .with_context(|| format!("Failed to load template {}", path.display()))?;
            &loaded
        }
        None => official_template(),
    };
    template.validate().context("Template is invalid")?;

    if let Some(dir) = &args.overlay {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create overlay directory {}", dir.display()))?;
    }

    let detector = OmrBubbleDetector::new(config.omr_options());
    let pb = progress_bar(args.images.len(), verbose);

    let pages: Vec<PageReport> = args
        .images
        .par_iter()
        .map(|path| {
            let outcome = detect_page(&detector, template, path, args.overlay.as_deref());
            pb.inc(1);
            match outcome {
                Ok(result) => PageReport {
                    image: path.clone(),
                    result: Some(result),
                    error: None,
                },
                Err(e) => {
                    tracing::error!("{}: {:#}", path.display(), e);
                    PageReport {
                        image: path.clone(),
                        result: None,
                        error: Some(format!("{e:#}")),
                    }
                }
            }
        })
        .collect();
    pb.finish_and_clear();

    let failed = pages.iter().filter(|p| p.error.is_some()).count();
    tracing::info!("{} pages read, {} failed", pages.len() - failed, failed);
    write_json(&pages, args.output.as_deref())?;

    if failed == pages.len() {
        bail!("No page could be read");
    }
    Ok(())
}

fn detect_page(
    detector: &OmrBubbleDetector,
    template: &BubbleTemplate,
    path: &Path,
    overlay_dir: Option<&Path>,
) -> Result<OmrResult> {
    let image = image::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let result = detector.detect_image(&image, template)?;

    if let Some(dir) = overlay_dir {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "page".to_string());
        let target = dir.join(format!("{stem}_overlay.png"));
        render_overlay(&image, template, &result, detector.options())
            .save(&target)
            .with_context(|| format!("Failed to save overlay {}", target.display()))?;
    }
    Ok(result)
}

// ============================================================
// score
// ============================================================

#[derive(Debug, Serialize)]
struct AreaSummaryReport {
    area: Area,
    range: QuestionRange,
    used_coherence: bool,
    summary: ScoringSummary,
}

#[derive(Debug, Serialize)]
struct StudentReport<'a> {
    id: &'a str,
    #[serde(flatten)]
    results: &'a StudentResults,
    overall_score: Option<f64>,
}

#[derive(Debug, Serialize)]
struct ScoreReport<'a> {
    generated_at: String,
    year: i32,
    table: TableReport,
    areas: Vec<AreaSummaryReport>,
    students: Vec<StudentReport<'a>>,
}

#[derive(Debug, Serialize)]
struct TableReport {
    path: PathBuf,
    records: usize,
    years: Vec<i32>,
}

fn areas_for(layout: LayoutArg, area: Option<Area>, key_len: usize) -> Result<Vec<AreaDefinition>> {
    match (layout.exam_layout(), area) {
        (Some(exam), None) => Ok(exam.areas()),
        (Some(exam), Some(area)) => {
            let areas: Vec<AreaDefinition> = exam.areas().into_iter().filter(|d| d.area == area).collect();
            if areas.is_empty() {
                bail!("Area {} is not part of the {} layout", area, exam);
            }
            Ok(areas)
        }
        (None, Some(area)) => Ok(vec![AreaDefinition::new(area, 1, key_len)]),
        (None, None) => bail!("--layout whole needs --area"),
    }
}

pub fn run_score(args: &ScoreArgs, config: &Config) -> Result<()> {
    let cohort = load_cohort(&args.cohort)?;
    let key = load_key(&args.key)?;
    let areas = areas_for(args.layout, args.area, key.len())?;

    let table_path = args
        .table
        .clone()
        .or_else(|| config.historical.table.clone())
        .context("No historical table given (use --table or [historical] table)")?;
    let source = DelimitedTableSource::new(&table_path).with_delimiter(args.delimiter);
    let repository = Arc::new(HistoricalScoreRepository::new(source, config.historical_config()));
    let table = repository
        .load()
        .with_context(|| format!("Failed to load historical table {}", table_path.display()))?;

    let scorer = CoherenceTriScorer::with_options(Arc::clone(&repository), config.coherence_options());
    let mut orchestrator = TriProcessingOrchestrator::new(scorer, args.year);
    let reports = orchestrator.process_areas(&cohort, &key, &areas)?;

    let stats = table.stats();
    let overall = orchestrator.overall_scores();
    let report = ScoreReport {
        generated_at: chrono::Utc::now().to_rfc3339(),
        year: args.year,
        table: TableReport {
            path: table_path.clone(),
            records: stats.total_records,
            years: stats.years,
        },
        areas: reports
            .iter()
            .map(|r| AreaSummaryReport {
                area: r.definition.area,
                range: r.definition.range,
                used_coherence: r.outcome.used_coherence_overall,
                summary: r.outcome.summary.clone(),
            })
            .collect(),
        students: orchestrator
            .results()
            .iter()
            .map(|(id, results)| StudentReport {
                id,
                results,
                overall_score: overall.get(id).copied().flatten(),
            })
            .collect(),
    };
    write_json(&report, args.output.as_deref())
}

// ============================================================
// tct
// ============================================================

pub fn run_tct(args: &TctArgs, config: &Config) -> Result<()> {
    let cohort = load_cohort(&args.cohort)?;
    let key = load_key(&args.key)?;
    let areas = args
        .layout
        .exam_layout()
        .map(|layout| layout.areas())
        .unwrap_or_default();

    let scorer = TctScorer::new(config.scoring.points_per_correct);
    let results: Vec<TctResult> = scorer.score(&cohort, &key, &areas)?;
    tracing::info!(
        "{} students scored on the classical scale ({} areas)",
        results.len(),
        areas.len()
    );
    write_json(&results, args.output.as_deref())
}

// ============================================================
// template
// ============================================================

pub fn run_template(args: &TemplateArgs) -> Result<()> {
    let json = official_template().to_json()?;
    match &args.output {
        Some(path) => std::fs::write(path, json + "\n")
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}
