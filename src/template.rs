//! Bubble sheet templates
//!
//! A template describes where, in normalized page coordinates, every
//! answer bubble of a printed sheet sits, plus the auxiliary regions
//! (handwritten text fields, corner anchors) consumed by other stages.
//! Coordinates are assumed to be already aligned to the scanned page.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

// ============================================================
// Constants
// ============================================================

/// Option letters printed on the official sheet
pub const DEFAULT_OPTIONS: [char; 5] = ['A', 'B', 'C', 'D', 'E'];

/// Horizontal distance between two options of the same question
pub const OFFICIAL_OPTION_SPACING: f32 = 0.025;

/// Bubble radius on the official sheet (normalized to page size)
pub const OFFICIAL_BUBBLE_RADIUS: f32 = 0.006;

/// Left edge (option A) of each of the six question columns
const OFFICIAL_COLUMN_START_X: [f32; 6] = [0.035, 0.200, 0.365, 0.530, 0.695, 0.860];

/// Vertical centers of the 15 rows shared by every column
const OFFICIAL_ROW_Y: [f32; 15] = [
    0.0584, 0.0643, 0.0898, 0.1235, 0.2059, 0.2527, 0.3332, 0.3584, 0.3599, 0.3814, 0.3828,
    0.4036, 0.4047, 0.4205, 0.4314,
];

// ============================================================
// Error Types
// ============================================================

/// Template validation and loading errors
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template has no questions")]
    NoQuestions,

    #[error("Template has no options")]
    NoOptions,

    #[error("Duplicate bubble for question {question} option {option}")]
    DuplicateBubble { question: usize, option: char },

    #[error("Missing bubble for question {question} option {option}")]
    MissingBubble { question: usize, option: char },

    #[error("Bubble for question {question} uses unknown option {option}")]
    UnknownOption { question: usize, option: char },

    #[error("Bubble references question {question}, template has {total}")]
    QuestionOutOfRange { question: usize, total: usize },

    #[error("Bubble for question {question} option {option} lies outside the unit square")]
    InvalidCoordinate { question: usize, option: char },

    #[error("Bubble for question {question} option {option} has a non-positive radius")]
    InvalidRadius { question: usize, option: char },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TemplateError>;

// ============================================================
// Core Data Structures
// ============================================================

/// Rectangular region in normalized page coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Region {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Convert to a pixel rectangle `(x, y, width, height)` clipped to the image
    pub fn to_pixels(&self, image_width: u32, image_height: u32) -> (u32, u32, u32, u32) {
        let scale = |v: f32, size: u32| (v.max(0.0) * size as f32).round() as u32;
        let x = scale(self.x, image_width).min(image_width);
        let y = scale(self.y, image_height).min(image_height);
        let w = scale(self.width, image_width).min(image_width - x);
        let h = scale(self.height, image_height).min(image_height - y);
        (x, y, w, h)
    }
}

/// Kind of content expected in a text field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextFieldKind {
    Text,
    Number,
    Date,
}

/// Handwritten/printed field read by an external text recognizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextField {
    pub name: String,
    pub region: Region,
    pub kind: TextFieldKind,
}

/// One answer bubble
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bubble {
    /// Question number (1-indexed)
    pub question_number: usize,
    /// Option letter
    pub option: char,
    /// Normalized center X
    pub x: f32,
    /// Normalized center Y
    pub y: f32,
    /// Normalized radius
    pub radius: f32,
}

/// Grid description used to generate regularly laid out sheets
///
/// Questions run down each column first: with 15 rows, column 2 starts at
/// question 16.
#[derive(Debug, Clone)]
pub struct GridLayout {
    pub column_start_x: Vec<f32>,
    pub row_y: Vec<f32>,
    pub option_spacing: f32,
    pub radius: f32,
    pub options: Vec<char>,
}

impl GridLayout {
    /// Number of questions the grid holds
    pub fn question_count(&self) -> usize {
        self.column_start_x.len() * self.row_y.len()
    }

    /// Generate the bubbles of the grid
    pub fn bubbles(&self) -> Vec<Bubble> {
        let rows = self.row_y.len();
        let mut bubbles = Vec::with_capacity(self.question_count() * self.options.len());

        for (col, &base_x) in self.column_start_x.iter().enumerate() {
            for (row, &y) in self.row_y.iter().enumerate() {
                let question_number = col * rows + row + 1;
                for (opt_idx, &option) in self.options.iter().enumerate() {
                    bubbles.push(Bubble {
                        question_number,
                        option,
                        x: base_x + opt_idx as f32 * self.option_spacing,
                        y,
                        radius: self.radius,
                    });
                }
            }
        }

        bubbles
    }
}

/// Answer sheet template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BubbleTemplate {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub total_questions: usize,
    pub options: Vec<char>,
    pub bubbles: Vec<Bubble>,
    #[serde(default)]
    pub text_fields: Vec<TextField>,
    #[serde(default)]
    pub anchor_marks: Vec<Region>,
}

impl BubbleTemplate {
    /// Build a template from a grid layout
    pub fn from_grid(name: impl Into<String>, layout: &GridLayout) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            total_questions: layout.question_count(),
            options: layout.options.clone(),
            bubbles: layout.bubbles(),
            text_fields: Vec::new(),
            anchor_marks: Vec::new(),
        }
    }

    /// Load and validate a template from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Parse and validate a template from JSON text
    pub fn from_json_str(json: &str) -> Result<Self> {
        let template: Self = serde_json::from_str(json)?;
        template.validate()?;
        Ok(template)
    }

    /// Check that exactly one in-range bubble exists per (question, option)
    pub fn validate(&self) -> Result<()> {
        if self.total_questions == 0 {
            return Err(TemplateError::NoQuestions);
        }
        if self.options.is_empty() {
            return Err(TemplateError::NoOptions);
        }

        let mut seen = HashSet::with_capacity(self.bubbles.len());
        for b in &self.bubbles {
            let (question, option) = (b.question_number, b.option);
            if question == 0 || question > self.total_questions {
                return Err(TemplateError::QuestionOutOfRange {
                    question,
                    total: self.total_questions,
                });
            }
            if !self.options.contains(&option) {
                return Err(TemplateError::UnknownOption { question, option });
            }
            if !(0.0..=1.0).contains(&b.x) || !(0.0..=1.0).contains(&b.y) {
                return Err(TemplateError::InvalidCoordinate { question, option });
            }
            // NaN fails this comparison too
            if !(b.radius > 0.0) {
                return Err(TemplateError::InvalidRadius { question, option });
            }
            if !seen.insert((question, option)) {
                return Err(TemplateError::DuplicateBubble { question, option });
            }
        }

        for question in 1..=self.total_questions {
            for &option in &self.options {
                if !seen.contains(&(question, option)) {
                    return Err(TemplateError::MissingBubble { question, option });
                }
            }
        }

        Ok(())
    }

    /// Bubbles belonging to one question, in template order
    pub fn question_bubbles(&self, question_number: usize) -> impl Iterator<Item = &Bubble> {
        self.bubbles
            .iter()
            .filter(move |b| b.question_number == question_number)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// ============================================================
// Official Sheet
// ============================================================

/// Grid of the official 90-question sheet (6 columns × 15 rows × A–E)
pub fn official_layout() -> GridLayout {
    GridLayout {
        column_start_x: OFFICIAL_COLUMN_START_X.to_vec(),
        row_y: OFFICIAL_ROW_Y.to_vec(),
        option_spacing: OFFICIAL_OPTION_SPACING,
        radius: OFFICIAL_BUBBLE_RADIUS,
        options: DEFAULT_OPTIONS.to_vec(),
    }
}

fn build_official_template() -> BubbleTemplate {
    let mut template = BubbleTemplate::from_grid("Official answer sheet - 90 questions", &official_layout());
    template.description = "Six columns of fifteen questions, options A to E".to_string();

    template.text_fields = vec![
        text_field("full_name", Region::new(0.025, 0.055, 0.46, 0.025), TextFieldKind::Text),
        text_field("unit", Region::new(0.025, 0.088, 0.46, 0.020), TextFieldKind::Text),
        text_field("birth_date", Region::new(0.025, 0.115, 0.12, 0.018), TextFieldKind::Date),
        text_field("grade", Region::new(0.595, 0.070, 0.07, 0.018), TextFieldKind::Text),
        text_field("class", Region::new(0.695, 0.070, 0.07, 0.018), TextFieldKind::Text),
        text_field("number", Region::new(0.795, 0.070, 0.12, 0.018), TextFieldKind::Number),
    ];

    // Corners of the bubble area
    template.anchor_marks = vec![
        Region::new(0.1810, 0.0584, 0.035, 0.035),
        Region::new(0.6859, 0.0584, 0.035, 0.035),
        Region::new(0.1810, 0.9860, 0.035, 0.035),
        Region::new(0.6859, 0.9860, 0.035, 0.035),
    ];

    template
}

fn text_field(name: &str, region: Region, kind: TextFieldKind) -> TextField {
    TextField {
        name: name.to_string(),
        region,
        kind,
    }
}

/// Process-wide official template, built once on first use
pub fn official_template() -> &'static BubbleTemplate {
    static OFFICIAL: OnceLock<BubbleTemplate> = OnceLock::new();
    OFFICIAL.get_or_init(build_official_template)
}
