//! Historical score bands
//!
//! Reference table mapping (area, raw score, year) to the {min, median, max}
//! proficiency band observed for past examinees, plus the process-wide
//! repository that loads, caches and reloads it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

use super::types::Area;

// ============================================================
// Constants
// ============================================================

/// Number of most recent years kept from the table
pub const DEFAULT_YEAR_WINDOW: usize = 5;

/// Column separator of the delimited table files
pub const DEFAULT_DELIMITER: char = ';';

// ============================================================
// Error Types
// ============================================================

/// Table load errors (fatal for the load, never for a single row)
#[derive(Debug, Error)]
pub enum HistoricalError {
    /// Raised by custom [`TableSource`] implementations
    #[error("Table source failed: {0}")]
    Source(String),

    #[error("Table is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Historical table has no usable rows")]
    EmptyTable,

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Row-level validation errors; the row is skipped and the load continues
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RowError {
    #[error("unknown area '{0}'")]
    UnknownArea(String),

    #[error("invalid integer in {field}: '{value}'")]
    InvalidInteger { field: &'static str, value: String },

    #[error("invalid number in {field}: '{value}'")]
    InvalidNumber { field: &'static str, value: String },

    #[error("missing {0}")]
    MissingValue(&'static str),

    #[error("band out of order: min {min}, median {median}, max {max}")]
    BandOutOfOrder { min: f64, median: f64, max: f64 },
}

pub type Result<T> = std::result::Result<T, HistoricalError>;

// ============================================================
// Records
// ============================================================

/// Validated band for one (area, raw score, year)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalEntry {
    pub area: Area,
    pub raw_score_count: u32,
    pub year: i32,
    pub min: f64,
    pub median: f64,
    pub max: f64,
}

/// Untyped row as delivered by a table adapter (cells as text)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawHistoricalRow {
    pub area: String,
    pub raw_score_count: String,
    pub min: String,
    pub max: String,
    pub median: String,
    pub year: String,
}

/// Per-area floor substituted at raw score 0 when the table leaves cells empty
///
/// The floor fills an empty `min`; empty `median` and `max` then copy the
/// row's `min`, so a raw-0 row collapses to a single value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZeroScoreDefaults(pub BTreeMap<Area, f64>);

impl Default for ZeroScoreDefaults {
    fn default() -> Self {
        Self(BTreeMap::from([
            (Area::LC, 270.6),
            (Area::CH, 305.1),
            (Area::CN, 300.0),
            (Area::MT, 300.0),
        ]))
    }
}

impl ZeroScoreDefaults {
    pub fn get(&self, area: Area) -> Option<f64> {
        self.0.get(&area).copied()
    }
}

/// Table loading options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoricalConfig {
    /// Keep only this many most recent years present in the table
    pub year_window: usize,
    pub zero_score_defaults: ZeroScoreDefaults,
}

impl Default for HistoricalConfig {
    fn default() -> Self {
        Self {
            year_window: DEFAULT_YEAR_WINDOW,
            zero_score_defaults: ZeroScoreDefaults::default(),
        }
    }
}

// ============================================================
// Row Parsing
// ============================================================

fn parse_integer<T: std::str::FromStr>(field: &'static str, value: &str) -> std::result::Result<T, RowError> {
    value.trim().parse().map_err(|_| RowError::InvalidInteger {
        field,
        value: value.to_string(),
    })
}

/// Empty → `None`; decimal comma accepted
fn parse_decimal(field: &'static str, value: &str) -> std::result::Result<Option<f64>, RowError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    match trimmed.replace(',', ".").parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(RowError::InvalidNumber {
            field,
            value: value.to_string(),
        }),
    }
}

/// Validate one raw row
pub fn parse_row(
    row: &RawHistoricalRow,
    defaults: &ZeroScoreDefaults,
) -> std::result::Result<HistoricalEntry, RowError> {
    let area: Area = row
        .area
        .parse()
        .map_err(|_| RowError::UnknownArea(row.area.trim().to_string()))?;
    let raw_score_count: u32 = parse_integer("raw_score_count", &row.raw_score_count)?;
    let year: i32 = parse_integer("year", &row.year)?;

    let min = parse_decimal("min", &row.min)?;
    let median = parse_decimal("median", &row.median)?;
    let max = parse_decimal("max", &row.max)?;

    let (min, median, max) = if raw_score_count == 0 {
        let min = min
            .or_else(|| defaults.get(area))
            .ok_or(RowError::MissingValue("min"))?;
        (min, median.unwrap_or(min), max.unwrap_or(min))
    } else {
        (
            min.ok_or(RowError::MissingValue("min"))?,
            median.ok_or(RowError::MissingValue("median"))?,
            max.ok_or(RowError::MissingValue("max"))?,
        )
    };

    if !(min <= median && median <= max) {
        return Err(RowError::BandOutOfOrder { min, median, max });
    }

    Ok(HistoricalEntry {
        area,
        raw_score_count,
        year,
        min,
        median,
        max,
    })
}

// ============================================================
// Table Snapshot
// ============================================================

/// Summary of a loaded table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableStats {
    pub total_records: usize,
    pub areas: Vec<Area>,
    pub years: Vec<i32>,
    pub records_by_area: BTreeMap<Area, usize>,
}

/// Immutable, indexed table snapshot
#[derive(Debug, Clone)]
pub struct HistoricalTable {
    entries: Vec<HistoricalEntry>,
    index: HashMap<(Area, u32, i32), usize>,
    years_by_area: BTreeMap<Area, BTreeSet<i32>>,
}

impl PartialEq for HistoricalTable {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl HistoricalTable {
    /// Index validated entries, keeping only the `year_window` most recent years
    pub fn build(entries: Vec<HistoricalEntry>, year_window: usize) -> Self {
        let all_years: BTreeSet<i32> = entries.iter().map(|e| e.year).collect();
        let kept_years: BTreeSet<i32> = all_years.iter().rev().take(year_window).copied().collect();
        if kept_years.len() < all_years.len() {
            tracing::info!(
                "keeping years {:?} of {:?}",
                kept_years.iter().collect::<Vec<_>>(),
                all_years.iter().collect::<Vec<_>>()
            );
        }

        let mut table = Self {
            entries: Vec::with_capacity(entries.len()),
            index: HashMap::with_capacity(entries.len()),
            years_by_area: BTreeMap::new(),
        };

        for entry in entries {
            if !kept_years.contains(&entry.year) {
                continue;
            }
            let key = (entry.area, entry.raw_score_count, entry.year);
            if table.index.contains_key(&key) {
                tracing::warn!(
                    "duplicate row for {} raw={} year={}, keeping the first",
                    entry.area,
                    entry.raw_score_count,
                    entry.year
                );
                continue;
            }
            table.index.insert(key, table.entries.len());
            table.years_by_area.entry(entry.area).or_default().insert(entry.year);
            table.entries.push(entry);
        }

        table
    }

    pub fn entries(&self) -> &[HistoricalEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Years with any data for an area, ascending
    pub fn years_for(&self, area: Area) -> Vec<i32> {
        self.years_by_area
            .get(&area)
            .map(|years| years.iter().copied().collect())
            .unwrap_or_default()
    }

    fn exact(&self, area: Area, raw_score_count: u32, year: i32) -> Option<&HistoricalEntry> {
        self.index
            .get(&(area, raw_score_count, year))
            .map(|&i| &self.entries[i])
    }

    /// Band for (area, raw score, year)
    ///
    /// Falls back to the nearest strictly earlier year in which the area has
    /// data; never to a later year.
    pub fn find(&self, area: Area, raw_score_count: u32, year: i32) -> Option<&HistoricalEntry> {
        if let Some(entry) = self.exact(area, raw_score_count, year) {
            return Some(entry);
        }

        let years = self.years_by_area.get(&area)?;
        let found = years
            .range(..year)
            .rev()
            .find_map(|&earlier| self.exact(area, raw_score_count, earlier));
        if let Some(entry) = found {
            tracing::debug!(
                "no {} band for raw={} in {}, using {}",
                area,
                raw_score_count,
                year,
                entry.year
            );
        }
        found
    }

    pub fn stats(&self) -> TableStats {
        let mut records_by_area = BTreeMap::new();
        let mut years = BTreeSet::new();
        for e in &self.entries {
            *records_by_area.entry(e.area).or_insert(0) += 1;
            years.insert(e.year);
        }
        TableStats {
            total_records: self.entries.len(),
            areas: records_by_area.keys().copied().collect(),
            years: years.into_iter().collect(),
            records_by_area,
        }
    }
}

// ============================================================
// Table Sources
// ============================================================

/// Supplier of raw table rows
pub trait TableSource: Send + Sync {
    /// Read all rows
    fn rows(&self) -> Result<Vec<RawHistoricalRow>>;

    /// Short description used in logs
    fn describe(&self) -> String;
}

/// Rows held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    rows: Vec<RawHistoricalRow>,
}

impl InMemorySource {
    pub fn new(rows: Vec<RawHistoricalRow>) -> Self {
        Self { rows }
    }
}

impl TableSource for InMemorySource {
    fn rows(&self) -> Result<Vec<RawHistoricalRow>> {
        Ok(self.rows.clone())
    }

    fn describe(&self) -> String {
        format!("in-memory table ({} rows)", self.rows.len())
    }
}

/// Delimited text file with a header row
///
/// Recognized headers (case-insensitive): `area`; `raw_score_count` or
/// `acertos`; `min`; `max`; `median` or `media`; `year` or `ano`.
#[derive(Debug, Clone)]
pub struct DelimitedTableSource {
    path: PathBuf,
    delimiter: char,
}

impl DelimitedTableSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            delimiter: DEFAULT_DELIMITER,
        }
    }

    #[must_use]
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse delimited text into raw rows
    pub fn parse_text(text: &str, delimiter: char) -> Result<Vec<RawHistoricalRow>> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());

        let header = lines.next().ok_or(HistoricalError::EmptyTable)?;
        let columns: Vec<String> = header
            .split(delimiter)
            .map(|c| c.trim().trim_start_matches('\u{feff}').to_ascii_lowercase())
            .collect();

        let position = |names: &[&str]| columns.iter().position(|c| names.contains(&c.as_str()));
        let wanted: [(&str, &[&str]); 6] = [
            ("area", &["area"]),
            ("raw_score_count", &["raw_score_count", "acertos"]),
            ("min", &["min"]),
            ("max", &["max"]),
            ("median", &["median", "media"]),
            ("year", &["year", "ano"]),
        ];

        let mut indices = [0usize; 6];
        let mut missing = Vec::new();
        for (slot, (name, aliases)) in wanted.iter().enumerate() {
            match position(aliases) {
                Some(i) => indices[slot] = i,
                None => missing.push(name.to_string()),
            }
        }
        if !missing.is_empty() {
            return Err(HistoricalError::MissingColumns(missing));
        }

        let rows = lines
            .map(|line| {
                let cells: Vec<&str> = line.split(delimiter).map(str::trim).collect();
                let cell = |slot: usize| cells.get(indices[slot]).copied().unwrap_or("").to_string();
                RawHistoricalRow {
                    area: cell(0),
                    raw_score_count: cell(1),
                    min: cell(2),
                    max: cell(3),
                    median: cell(4),
                    year: cell(5),
                }
            })
            .collect();

        Ok(rows)
    }
}

impl TableSource for DelimitedTableSource {
    fn rows(&self) -> Result<Vec<RawHistoricalRow>> {
        let text = std::fs::read_to_string(&self.path).map_err(|source| HistoricalError::Read {
            path: self.path.clone(),
            source,
        })?;
        Self::parse_text(&text, self.delimiter)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Read, validate and index a table from a source
pub fn load_table(source: &dyn TableSource, config: &HistoricalConfig) -> Result<HistoricalTable> {
    let rows = source.rows()?;
    let total = rows.len();

    let mut entries = Vec::with_capacity(total);
    let mut skipped = 0usize;
    for (line, row) in rows.iter().enumerate() {
        match parse_row(row, &config.zero_score_defaults) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                skipped += 1;
                tracing::warn!("skipping table row {}: {}", line + 1, e);
            }
        }
    }

    if entries.is_empty() {
        return Err(HistoricalError::EmptyTable);
    }

    let table = HistoricalTable::build(entries, config.year_window);
    tracing::info!(
        "loaded {} historical rows from {} ({} skipped, {} outside the year window)",
        table.len(),
        source.describe(),
        skipped,
        total - skipped - table.len()
    );
    Ok(table)
}

// ============================================================
// Repository
// ============================================================

/// Process-wide cache of the historical table
///
/// Readers hold the read lock only long enough to clone the `Arc`, then
/// work on the snapshot without locking and never observe a half-built
/// table. `reload` builds the new table first and swaps it in with one write.
pub struct HistoricalScoreRepository {
    source: Box<dyn TableSource>,
    config: HistoricalConfig,
    snapshot: RwLock<Option<Arc<HistoricalTable>>>,
}

impl std::fmt::Debug for HistoricalScoreRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoricalScoreRepository")
            .field("source", &self.source.describe())
            .field("config", &self.config)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl HistoricalScoreRepository {
    pub fn new(source: impl TableSource + 'static, config: HistoricalConfig) -> Self {
        Self {
            source: Box::new(source),
            config,
            snapshot: RwLock::new(None),
        }
    }

    fn cached(&self) -> Option<Arc<HistoricalTable>> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current snapshot, loading it on first use
    pub fn load(&self) -> Result<Arc<HistoricalTable>> {
        if let Some(table) = self.cached() {
            return Ok(table);
        }

        let table = Arc::new(load_table(self.source.as_ref(), &self.config)?);
        let mut guard = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have finished first; keep a single snapshot
        if let Some(existing) = guard.as_ref() {
            return Ok(Arc::clone(existing));
        }
        *guard = Some(Arc::clone(&table));
        Ok(table)
    }

    /// Re-read the source and swap the snapshot; on failure the old one stays
    pub fn reload(&self) -> Result<Arc<HistoricalTable>> {
        let table = Arc::new(load_table(self.source.as_ref(), &self.config)?);
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&table));
        Ok(table)
    }

    /// Drop the snapshot; the next `load` re-reads the source
    pub fn clear_cache(&self) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = None;
        tracing::debug!("historical cache cleared");
    }

    pub fn is_loaded(&self) -> bool {
        self.cached().is_some()
    }

    /// Band lookup with earlier-year fallback
    pub fn find(&self, area: Area, raw_score_count: u32, year: i32) -> Result<Option<HistoricalEntry>> {
        Ok(self.load()?.find(area, raw_score_count, year).cloned())
    }

    /// Statistics of the loaded table, if any
    pub fn stats(&self) -> Option<TableStats> {
        self.cached().map(|t| t.stats())
    }
}
