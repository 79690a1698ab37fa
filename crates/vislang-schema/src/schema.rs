//! Field typing and schema summaries
//!
//! Semantic type precedence:
//! 1. boolean-like columns are nominal
//! 2. numeric columns are nominal when they have at most
//!    [`NOMINAL_CARDINALITY_LIMIT`] distinct values, quantitative otherwise
//! 3. strings matching a date or month pattern are temporal
//! 4. everything else is nominal
//!
//! Rule 2 keeps low-cardinality numeric codes (ratings, cylinder counts) from
//! being encoded as continuous.

use crate::dataset::Dataset;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt::Write as _;

/// Numeric columns with at most this many distinct values are nominal
pub const NOMINAL_CARDINALITY_LIMIT: usize = 10;

static DATE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)^(
            \d{4}-\d{1,2}(-\d{1,2})?([T\s]\d{1,2}:\d{2}(:\d{2}(\.\d+)?)?(Z|[+-]\d{2}:?\d{2})?)?
          | \d{1,2}/\d{1,2}/\d{2,4}
          | \d{4}/\d{1,2}(/\d{1,2})?
          | (jan(uary)?|feb(ruary)?|mar(ch)?|apr(il)?|may|june?|july?|aug(ust)?|sep(t(ember)?)?|oct(ober)?|nov(ember)?|dec(ember)?)\.?(\s+\d{1,2},?)?(\s+\d{4})?
        )$",
    )
    .unwrap_or_else(|e| unreachable!("date pattern is a valid regex: {e}"))
});

/// Storage type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Numbers
    Number,
    /// Free text
    String,
    /// true / false
    Boolean,
    /// Dates and timestamps
    Datetime,
}

impl DataType {
    /// Name used in facts and prompts
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Datetime => "datetime",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoding-level type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    /// Unordered categories
    Nominal,
    /// Continuous measures
    Quantitative,
    /// Points in time
    Temporal,
}

impl SemanticType {
    /// Name used in prompts
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nominal => "nominal",
            Self::Quantitative => "quantitative",
            Self::Temporal => "temporal",
        }
    }
}

impl std::fmt::Display for SemanticType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSummary {
    /// Normalised field name
    pub name: String,
    /// Storage type
    pub data_type: DataType,
    /// Encoding type
    pub semantic_type: SemanticType,
    /// Distinct non-null values
    pub unique: usize,
    /// Minimum (numeric fields only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Maximum (numeric fields only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

/// Field-type summary of a dataset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaSummary {
    /// Number of records
    pub number_rows: usize,
    /// Fields in column order
    pub fields: Vec<FieldSummary>,
}

impl SchemaSummary {
    /// Infer the summary of a dataset
    #[must_use]
    pub fn infer(dataset: &Dataset) -> Self {
        let fields = dataset
            .columns()
            .iter()
            .map(|name| summarize_field(name, dataset.column_values(name)))
            .collect();

        Self {
            number_rows: dataset.len(),
            fields,
        }
    }

    /// Field names in column order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Whether a field exists
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    /// Look up a field
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSummary> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Bullet list of fields for prompts
    ///
    /// `- name: type [semantic] (unique=N, min=…, max=…)`
    #[must_use]
    pub fn column_summary(&self) -> String {
        if self.fields.is_empty() {
            return "(no schema available)".to_string();
        }

        let mut out = String::new();
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            let mut parts = vec![format!("unique={}", field.unique)];
            if let (Some(min), Some(max)) = (field.min, field.max) {
                parts.push(format!("min={}, max={}", format_number(min), format_number(max)));
            }
            let _ = write!(
                out,
                "- {}: {} [{}] ({})",
                field.name,
                field.data_type,
                field.semantic_type,
                parts.join(", ")
            );
        }
        out
    }
}

/// First `n` rows as an aligned, right-justified text table
#[must_use]
pub fn sample_rows(dataset: &Dataset, n: usize) -> String {
    let columns = dataset.columns();
    if columns.is_empty() {
        return String::new();
    }

    let cells: Vec<Vec<String>> = dataset
        .rows()
        .iter()
        .take(n)
        .map(|row| {
            columns
                .iter()
                .map(|c| display_value(row.get(c).unwrap_or(&Value::Null)))
                .collect()
        })
        .collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            cells
                .iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(c.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let render = |values: &[String]| -> String {
        values
            .iter()
            .zip(&widths)
            .map(|(v, &w)| format!("{v:>w$}"))
            .collect::<Vec<_>>()
            .join(" ")
    };

    let mut lines = vec![render(columns)];
    lines.extend(cells.iter().map(|r| render(r.as_slice())));
    lines.join("\n")
}

fn summarize_field<'a>(name: &str, values: impl Iterator<Item = &'a Value>) -> FieldSummary {
    let non_null: Vec<&Value> = values.filter(|v| !v.is_null()).collect();
    let unique = non_null
        .iter()
        .map(|v| v.to_string())
        .collect::<HashSet<_>>()
        .len();

    let data_type = detect_data_type(&non_null);
    let (min, max) = if data_type == DataType::Number {
        let numbers = non_null.iter().filter_map(|v| v.as_f64());
        let (lo, hi) = numbers.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| {
            (lo.min(x), hi.max(x))
        });
        if lo.is_finite() && hi.is_finite() {
            (Some(lo), Some(hi))
        } else {
            (None, None)
        }
    } else {
        (None, None)
    };

    FieldSummary {
        name: name.to_string(),
        data_type,
        semantic_type: classify(data_type, unique),
        unique,
        min,
        max,
    }
}

fn detect_data_type(values: &[&Value]) -> DataType {
    if values.is_empty() {
        return DataType::String;
    }
    if values.iter().all(|v| v.is_boolean()) {
        DataType::Boolean
    } else if values.iter().all(|v| v.is_number()) {
        DataType::Number
    } else if values
        .iter()
        .all(|v| v.as_str().is_some_and(|s| DATE_PATTERN.is_match(s.trim())))
    {
        DataType::Datetime
    } else {
        DataType::String
    }
}

/// Apply the semantic type precedence
#[must_use]
pub fn classify(data_type: DataType, unique: usize) -> SemanticType {
    match data_type {
        DataType::Boolean => SemanticType::Nominal,
        DataType::Number if unique <= NOMINAL_CARDINALITY_LIMIT => SemanticType::Nominal,
        DataType::Number => SemanticType::Quantitative,
        DataType::Datetime => SemanticType::Temporal,
        DataType::String => SemanticType::Nominal,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "NaN".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn format_number(x: f64) -> String {
    if x.fract() == 0.0 && x.abs() < 1e15 {
        format!("{x:.0}")
    } else {
        format!("{x}")
    }
}
