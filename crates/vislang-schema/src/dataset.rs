//! Tabular dataset loading
//!
//! Supports the three formats the visualization corpus ships in:
//! - CSV (comma separated, header row)
//! - TSV (tab separated, header row)
//! - JSON (array of flat records)
//!
//! Column names are normalised by lower-casing their first character, matching
//! the fact language of the design oracle, so that field names in schema facts
//! and in the bound data agree.

use crate::error::{DataFormatError, Result};
use serde_json::{Map, Value};
use std::io::Read;
use std::path::{Path, PathBuf};

/// One record, keyed by normalised column name
pub type Row = Map<String, Value>;

/// Loaded dataset (read-only after load)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    /// Column names in source order
    columns: Vec<String>,
    /// Records
    rows: Vec<Row>,
}

impl Dataset {
    /// Create dataset from already-normalised parts
    #[must_use]
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// Build from JSON records, normalising column names
    ///
    /// Column order follows first appearance across records.
    #[must_use]
    pub fn from_records(records: Vec<Map<String, Value>>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        let mut rows = Vec::with_capacity(records.len());

        for record in records {
            let mut row = Row::new();
            for (key, value) in record {
                let name = normalize_name(&key);
                if !columns.contains(&name) {
                    columns.push(name.clone());
                }
                row.insert(name, value);
            }
            rows.push(row);
        }

        Self { columns, rows }
    }

    /// Column names
    #[inline]
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Records
    #[inline]
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of records
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the dataset has no records
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether a column exists
    #[inline]
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Iterate over one column's values (missing cells read as null)
    pub fn column_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.rows
            .iter()
            .map(move |row| row.get(name).unwrap_or(&Value::Null))
    }

    /// Records as a JSON array (for inlining into chart specs)
    #[must_use]
    pub fn to_values(&self) -> Value {
        Value::Array(self.rows.iter().cloned().map(Value::Object).collect())
    }
}

/// Lower-case the first character of a column name
#[must_use]
pub fn normalize_name(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Resolve a data path against search roots
///
/// Absolute paths are used as-is. Relative paths are tried under each root in
/// order.
///
/// # Errors
/// `DataFormatError::NotFound` if no candidate exists.
pub fn resolve_path(path: &str, roots: &[PathBuf]) -> Result<PathBuf> {
    let given = Path::new(path);
    if given.is_absolute() {
        return if given.exists() {
            Ok(given.to_path_buf())
        } else {
            Err(DataFormatError::NotFound {
                path: path.to_string(),
                searched: vec![given.to_path_buf()],
            })
        };
    }

    let candidates: Vec<PathBuf> = roots.iter().map(|root| root.join(given)).collect();
    candidates
        .iter()
        .find(|c| c.exists())
        .cloned()
        .ok_or_else(|| DataFormatError::NotFound {
            path: path.to_string(),
            searched: candidates,
        })
}

/// Load a dataset from disk
///
/// # Errors
/// - `DataFormatError::NotFound` if the path cannot be resolved
/// - `DataFormatError::UnsupportedFormat` for unknown extensions
/// - `DataFormatError::Parse` for malformed contents
pub fn load(path: &str, roots: &[PathBuf]) -> Result<Dataset> {
    let resolved = resolve_path(path, roots)?;
    let suffix = resolved
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    let file = std::fs::File::open(&resolved)?;
    let dataset = match suffix.as_str() {
        "csv" => read_delimited(file, b',').map_err(|e| DataFormatError::parse(&resolved, e))?,
        "tsv" => read_delimited(file, b'\t').map_err(|e| DataFormatError::parse(&resolved, e))?,
        "json" => read_json(file).map_err(|e| DataFormatError::parse(&resolved, e))?,
        other => return Err(DataFormatError::UnsupportedFormat(format!(".{other}"))),
    };

    if dataset.columns.is_empty() {
        return Err(DataFormatError::Empty);
    }

    tracing::debug!(
        path = %resolved.display(),
        rows = dataset.len(),
        columns = dataset.columns.len(),
        "Loaded dataset"
    );
    Ok(dataset)
}

/// Read delimited text with a header row
///
/// # Errors
/// Returns the csv reader's message on malformed input.
pub fn read_delimited<R: Read>(reader: R, delimiter: u8) -> std::result::Result<Dataset, String> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(reader);

    let columns: Vec<String> = csv_reader
        .headers()
        .map_err(|e| e.to_string())?
        .iter()
        .map(normalize_name)
        .collect();

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record.map_err(|e| e.to_string())?;
        let row: Row = columns
            .iter()
            .zip(record.iter())
            .map(|(name, cell)| (name.clone(), parse_cell(cell)))
            .collect();
        rows.push(row);
    }

    Ok(Dataset { columns, rows })
}

/// Read a JSON array of records
///
/// # Errors
/// Returns a message if the document is not an array of objects.
pub fn read_json<R: Read>(reader: R) -> std::result::Result<Dataset, String> {
    let value: Value = serde_json::from_reader(reader).map_err(|e| e.to_string())?;
    let Value::Array(items) = value else {
        return Err("expected a JSON array of records".to_string());
    };

    let mut records = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        match item {
            Value::Object(map) => records.push(map),
            other => return Err(format!("record {i} is not an object: {other}")),
        }
    }
    Ok(Dataset::from_records(records))
}

/// Interpret a delimited cell as a typed JSON value
fn parse_cell(cell: &str) -> Value {
    let trimmed = cell.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("na") || trimmed.eq_ignore_ascii_case("nan") {
        return Value::Null;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        if f.is_finite() {
            return Value::from(f);
        }
    }
    match trimmed {
        "true" | "True" | "TRUE" => Value::Bool(true),
        "false" | "False" | "FALSE" => Value::Bool(false),
        _ => Value::String(cell.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn normalize_lowercases_first_char_only() {
        assert_eq!(normalize_name("Species"), "species");
        assert_eq!(normalize_name("Body Mass (g)"), "body Mass (g)");
        assert_eq!(normalize_name(""), "");
    }

    #[test]
    fn csv_cells_are_typed() {
        let data = "Name,Count,Flag,Score\nalpha,3,true,1.5\nbeta,,false,NA\n";
        let ds = read_delimited(data.as_bytes(), b',').unwrap();

        assert_eq!(ds.columns(), &["name", "count", "flag", "score"]);
        assert_eq!(ds.rows()[0]["count"], json!(3));
        assert_eq!(ds.rows()[0]["flag"], json!(true));
        assert_eq!(ds.rows()[0]["score"], json!(1.5));
        assert_eq!(ds.rows()[1]["count"], Value::Null);
        assert_eq!(ds.rows()[1]["score"], Value::Null);
    }

    #[test]
    fn tsv_uses_tab_delimiter() {
        let data = "a\tb\n1\tx\n";
        let ds = read_delimited(data.as_bytes(), b'\t').unwrap();
        assert_eq!(ds.columns(), &["a", "b"]);
        assert_eq!(ds.rows()[0]["b"], json!("x"));
    }

    #[test]
    fn json_records_keep_first_appearance_order() {
        let data = r#"[{"Species":"Adelie","Beak":39.1},{"Species":"Gentoo","Island":"Biscoe"}]"#;
        let ds = read_json(data.as_bytes()).unwrap();
        assert_eq!(ds.columns(), &["species", "beak", "island"]);
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.column_values("island").next(), Some(&Value::Null));
    }

    #[test]
    fn json_must_be_array_of_objects() {
        assert!(read_json(r#"{"a":1}"#.as_bytes()).is_err());
        assert!(read_json("[1,2]".as_bytes()).is_err());
    }

    #[test]
    fn load_resolves_against_roots() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("tiny.csv")).unwrap();
        writeln!(file, "x,y\n1,2").unwrap();

        let roots = vec![PathBuf::from("/definitely/missing"), dir.path().to_path_buf()];
        let ds = load("tiny.csv", &roots).unwrap();
        assert_eq!(ds.columns(), &["x", "y"]);
    }

    #[test]
    fn load_reports_missing_and_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let roots = vec![dir.path().to_path_buf()];

        let missing = load("nope.csv", &roots).unwrap_err();
        assert!(matches!(missing, DataFormatError::NotFound { ref searched, .. } if searched.len() == 1));

        std::fs::write(dir.path().join("table.xlsx"), b"binary").unwrap();
        let unsupported = load("table.xlsx", &roots).unwrap_err();
        assert!(matches!(unsupported, DataFormatError::UnsupportedFormat(_)));
    }

    #[test]
    fn load_rejects_corrupt_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), b"[{\"a\": 1,").unwrap();
        let err = load("bad.json", &[dir.path().to_path_buf()]).unwrap_err();
        assert!(matches!(err, DataFormatError::Parse { .. }));
    }
}
