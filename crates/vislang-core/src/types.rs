//! Core types for VisLang
//!
//! Records handed from stage to stage:
//! - Field selections and design recommendations
//! - Generation attempts and the candidates they converge to
//! - Comparison verdicts and the aggregate pipeline result

use crate::error::AttemptError;
use crate::state_machine::GenerationState;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use ulid::Ulid;
use vislang_oracle::{ChatRequest, Chart, Turn};
use vislang_schema::{SchemaFacts, SchemaSummary};

/// Unique run identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(pub Ulid);

impl RunId {
    /// Generate new run ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mark types the design oracle understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkType {
    /// Points / scatter
    Point,
    /// Bars
    Bar,
    /// Lines
    Line,
    /// Filled areas
    Area,
    /// Text labels
    Text,
    /// Ticks
    Tick,
    /// Rectangles / heatmap cells
    Rect,
}

impl MarkType {
    /// Fact atom
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Point => "point",
            Self::Bar => "bar",
            Self::Line => "line",
            Self::Area => "area",
            Self::Text => "text",
            Self::Tick => "tick",
            Self::Rect => "rect",
        }
    }
}

impl FromStr for MarkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "point" => Ok(Self::Point),
            "bar" => Ok(Self::Bar),
            "line" => Ok(Self::Line),
            "area" => Ok(Self::Area),
            "text" => Ok(Self::Text),
            "tick" => Ok(Self::Tick),
            "rect" => Ok(Self::Rect),
            other => Err(format!("unknown mark type '{other}'")),
        }
    }
}

impl std::fmt::Display for MarkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoding channels the design oracle understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Horizontal position
    X,
    /// Vertical position
    Y,
    /// Hue
    Color,
    /// Mark size
    Size,
    /// Mark shape
    Shape,
    /// Text label
    Text,
}

impl Channel {
    /// Fact atom
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::X => "x",
            Self::Y => "y",
            Self::Color => "color",
            Self::Size => "size",
            Self::Shape => "shape",
            Self::Text => "text",
        }
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x" => Ok(Self::X),
            "y" => Ok(Self::Y),
            "color" | "colour" => Ok(Self::Color),
            "size" => Ok(Self::Size),
            "shape" => Ok(Self::Shape),
            "text" => Ok(Self::Text),
            other => Err(format!("unknown channel '{other}'")),
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields chosen for encoding, plus structural hints
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSelection {
    /// Field names in the order the oracle gave them
    pub fields: Vec<String>,
    /// Requested mark type
    pub mark_hint: Option<MarkType>,
    /// Requested field → channel placements
    pub channel_hints: BTreeMap<String, Channel>,
    /// Oracle's one-line rationale
    pub reasoning: String,
}

impl FieldSelection {
    /// Every name referenced by `fields` or `channel_hints`, first occurrence order
    #[must_use]
    pub fn referenced_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for name in self.fields.iter().chain(self.channel_hints.keys()) {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        names
    }

    /// Referenced names that are not schema fields
    #[must_use]
    pub fn ungrounded(&self, schema: &SchemaSummary) -> Vec<String> {
        self.referenced_names()
            .into_iter()
            .filter(|name| !schema.contains(name))
            .map(str::to_string)
            .collect()
    }

    /// Copy with every ungrounded name removed
    #[must_use]
    pub fn grounded(&self, schema: &SchemaSummary) -> Self {
        Self {
            fields: self
                .fields
                .iter()
                .filter(|f| schema.contains(f))
                .cloned()
                .collect(),
            mark_hint: self.mark_hint,
            channel_hints: self
                .channel_hints
                .iter()
                .filter(|(f, _)| schema.contains(f))
                .map(|(f, c)| (f.clone(), *c))
                .collect(),
            reasoning: self.reasoning.clone(),
        }
    }

    /// Whether nothing was selected
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.channel_hints.is_empty()
    }
}

/// Recommended encoding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingRec {
    /// Channel atom
    pub channel: String,
    /// Encoded field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Aggregate function
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<String>,
    /// Bin setting (max bins or flag)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binning: Option<Value>,
    /// Stack mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// Recommended scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleRec {
    /// Channel atom
    pub channel: String,
    /// Scale type
    #[serde(rename = "type")]
    pub scale_type: String,
    /// Whether the scale includes zero
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zero: Option<bool>,
}

/// Recommended facet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetRec {
    /// Facet channel (`row`/`col`)
    pub channel: String,
    /// Faceted field
    pub field: String,
    /// Bin setting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binning: Option<Value>,
}

/// Top-ranked design oracle answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Mark type atom
    pub mark_type: String,
    /// Encodings in answer order
    pub encodings: Vec<EncodingRec>,
    /// Scales
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scales: Vec<ScaleRec>,
    /// Coordinate system
    pub coordinates: String,
    /// Facets
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub facets: Vec<FacetRec>,
    /// Task classification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    /// Optimization cost vector
    pub cost: Vec<i64>,
    /// Soft-constraint violation counts
    pub violations: BTreeMap<String, u64>,
}

impl Recommendation {
    /// Pretty JSON for prompts and logs
    #[must_use]
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Which generation path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathLabel {
    /// Prompted with the design recommendation
    Guided,
    /// Prompted without it
    Unguided,
}

impl PathLabel {
    /// Oracle call log name
    #[inline]
    #[must_use]
    pub fn call_name(self) -> &'static str {
        match self {
            Self::Guided => "2a_draco_spec",
            Self::Unguided => "2b_baseline_spec",
        }
    }

    /// Artifact file prefix
    #[inline]
    #[must_use]
    pub fn artifact_prefix(self) -> &'static str {
        match self {
            Self::Guided => "3a_draco",
            Self::Unguided => "3b_baseline",
        }
    }

    /// Title used in side-by-side views
    #[inline]
    #[must_use]
    pub fn chart_title(self) -> &'static str {
        match self {
            Self::Guided => "With Draco",
            Self::Unguided => "Without Draco",
        }
    }

    /// Caption sent before this path's image
    #[inline]
    #[must_use]
    pub fn image_label(self) -> &'static str {
        match self {
            Self::Guided => "Draco-informed visualization:",
            Self::Unguided => "Baseline visualization:",
        }
    }

    /// Heading of the reasoning artifact
    #[inline]
    #[must_use]
    pub fn reasoning_heading(self) -> &'static str {
        match self {
            Self::Guided => "# Draco-Informed Design",
            Self::Unguided => "# Baseline Design",
        }
    }
}

impl std::fmt::Display for PathLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Guided => "guided",
            Self::Unguided => "unguided",
        })
    }
}

/// One try at producing a specification
///
/// Built once at the end of the attempt and never changed.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    /// 1-based attempt number
    pub index: usize,
    /// Conversation sent
    pub request: ChatRequest,
    /// Raw oracle text (absent on transport failure)
    pub raw_output: Option<String>,
    /// Parsed specification
    pub spec: Option<Value>,
    /// Passed every check
    pub success: bool,
    /// Why it failed
    pub error: Option<AttemptError>,
}

impl Attempt {
    /// Successful attempt
    #[must_use]
    pub fn succeeded(index: usize, request: ChatRequest, raw_output: String, spec: Value) -> Self {
        Self {
            index,
            request,
            raw_output: Some(raw_output),
            spec: Some(spec),
            success: true,
            error: None,
        }
    }

    /// Failed attempt
    #[must_use]
    pub fn failed(
        index: usize,
        request: ChatRequest,
        raw_output: Option<String>,
        spec: Option<Value>,
        error: AttemptError,
    ) -> Self {
        Self {
            index,
            request,
            raw_output,
            spec,
            success: false,
            error: Some(error),
        }
    }
}

/// Terminal outcome of one generation path
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Which path produced it
    pub label: PathLabel,
    /// Last parsed specification
    pub spec: Option<Value>,
    /// Reasoning accompanying `spec`
    pub reasoning: String,
    /// Last successfully constructed chart
    pub chart: Option<Chart>,
    /// Rasterized chart, present only on success
    pub image: Option<Vec<u8>>,
    /// Every attempt, in order
    pub transcript: Vec<Attempt>,
    /// Corrective turns accumulated along the way
    pub conversation: Vec<Turn>,
    /// States the path moved through
    pub states: Vec<GenerationState>,
}

impl Candidate {
    /// Whether the last attempt passed every check
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.image.is_some() && self.transcript.last().is_some_and(|a| a.success)
    }

    /// Whether nothing usable came out
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.spec_is_empty() && self.chart.is_none()
    }

    /// Specification, or an empty object
    #[must_use]
    pub fn spec_or_empty(&self) -> Value {
        self.spec.clone().unwrap_or_else(|| Value::Object(Map::new()))
    }

    fn spec_is_empty(&self) -> bool {
        match &self.spec {
            None | Some(Value::Null) => true,
            Some(Value::Object(map)) => map.is_empty(),
            Some(_) => false,
        }
    }

    /// Most recent attempt error
    #[must_use]
    pub fn last_error(&self) -> Option<&AttemptError> {
        self.transcript.last().and_then(|a| a.error.as_ref())
    }

    /// User-facing summary
    #[must_use]
    pub fn report(&self) -> PathReport {
        PathReport {
            label: self.label,
            succeeded: self.succeeded(),
            attempts: self.transcript.len(),
            last_error: self.last_error().map(ToString::to_string),
        }
    }
}

/// Per-path outcome as shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathReport {
    /// Path
    pub label: PathLabel,
    /// Converged within budget
    pub succeeded: bool,
    /// Attempts made
    pub attempts: usize,
    /// Last failure, if any
    pub last_error: Option<String>,
}

impl std::fmt::Display for PathReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.succeeded {
            write!(f, "{}: valid ({} attempt(s))", self.label, self.attempts)
        } else {
            write!(
                f,
                "{}: failed after {} attempt(s): {}",
                self.label,
                self.attempts,
                self.last_error.as_deref().unwrap_or("no output")
            )
        }
    }
}

/// Categorical judgment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Guided path served the request better
    Guided,
    /// Unguided path served the request better
    Unguided,
    /// Neither clearly better
    Tie,
}

static LEADING_VERDICT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\W*(unguided|baseline|guided|draco|tie)\b")
        .unwrap_or_else(|e| unreachable!("verdict pattern is a valid regex: {e}"))
});

static VERDICT_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:(not|no|never)\s+(?:an?\s+|the\s+)?)?(unguided|baseline|guided|draco|tie)\b")
        .unwrap_or_else(|e| unreachable!("verdict pattern is a valid regex: {e}"))
});

impl Verdict {
    /// Classify free text by its verdict word
    ///
    /// A verdict word opening the text wins. Otherwise the earliest verdict
    /// word that is not negated ("not draco") decides.
    #[must_use]
    pub fn classify(text: &str) -> Option<Self> {
        let word = match LEADING_VERDICT.captures(text) {
            Some(caps) => caps.get(1)?.as_str(),
            None => VERDICT_WORD
                .captures_iter(text)
                .find(|caps| caps.get(1).is_none())?
                .get(2)?
                .as_str(),
        };
        match word.to_ascii_lowercase().as_str() {
            "guided" | "draco" => Some(Self::Guided),
            "unguided" | "baseline" => Some(Self::Unguided),
            _ => Some(Self::Tie),
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Guided => "guided",
            Self::Unguided => "unguided",
            Self::Tie => "tie",
        })
    }
}

/// Structured judgment; all fields empty when no comparison ran
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonResult {
    /// Detailed markdown analysis
    pub comparison_markdown: String,
    /// Short summary
    pub summary: String,
    /// Verdict with free-text justification
    pub verdict: String,
}

impl ComparisonResult {
    /// Whether no comparison ran
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.comparison_markdown.is_empty() && self.summary.is_empty() && self.verdict.is_empty()
    }

    /// Categorical verdict
    #[must_use]
    pub fn winner(&self) -> Option<Verdict> {
        Verdict::classify(&self.verdict)
    }
}

/// One pipeline invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRequest {
    /// Natural-language visualization request
    pub prompt: String,
    /// Dataset path as given by the user
    pub data_path: String,
}

impl PipelineRequest {
    /// Create request
    #[inline]
    #[must_use]
    pub fn new(prompt: impl Into<String>, data_path: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            data_path: data_path.into(),
        }
    }
}

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// Run identifier
    pub run_id: RunId,
    /// Request prompt
    pub prompt: String,
    /// Request data path
    pub data_path: String,
    /// Model used
    pub model: String,
    /// Schema summary of the dataset
    pub schema: SchemaSummary,
    /// Schema facts of the dataset
    pub facts: SchemaFacts,
    /// Field selection restricted to schema fields (possibly empty)
    pub field_selection: FieldSelection,
    /// Names the selector still referenced outside the schema when its
    /// attempts ran out; dropped from `field_selection`
    pub unresolved_fields: Vec<String>,
    /// Design recommendation, absent when the oracle produced none
    pub recommendation: Option<Recommendation>,
    /// Guided candidate, absent when the guided path did not run
    pub guided: Option<Candidate>,
    /// Unguided candidate
    pub unguided: Candidate,
    /// Judgment, empty when skipped
    pub comparison: ComparisonResult,
    /// Run directory, when artifacts were written
    pub log_dir: Option<PathBuf>,
}

impl PipelineResult {
    /// Per-path reports, guided first
    #[must_use]
    pub fn reports(&self) -> Vec<PathReport> {
        self.guided
            .iter()
            .chain(std::iter::once(&self.unguided))
            .map(Candidate::report)
            .collect()
    }

    /// Horizontal concatenation of the available charts
    #[must_use]
    pub fn side_by_side(&self) -> Option<Value> {
        let views: Vec<Value> = self
            .guided
            .iter()
            .chain(std::iter::once(&self.unguided))
            .filter_map(|c| c.chart.as_ref().map(|chart| chart.titled(c.label.chart_title())))
            .collect();
        if views.is_empty() {
            None
        } else {
            Some(json!({ "hconcat": views }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vislang_schema::{Dataset, SchemaSummary};

    fn schema() -> SchemaSummary {
        let data = Dataset::from_records(vec![serde_json::json!({
            "species": "Adelie", "flipper_length": 181, "body_mass": 3750
        })
        .as_object()
        .cloned()
        .unwrap()]);
        SchemaSummary::infer(&data)
    }

    #[test]
    fn hint_parsing_is_lenient_on_case() {
        assert_eq!("Bar".parse::<MarkType>().unwrap(), MarkType::Bar);
        assert!("pie".parse::<MarkType>().is_err());
        assert_eq!(" colour ".parse::<Channel>().unwrap(), Channel::Color);
    }

    #[test]
    fn grounding_drops_unknown_names() {
        let selection = FieldSelection {
            fields: vec!["species".into(), "island".into(), "body_mass".into()],
            mark_hint: Some(MarkType::Bar),
            channel_hints: [("sex".to_string(), Channel::Color)].into_iter().collect(),
            reasoning: String::new(),
        };
        assert_eq!(selection.ungrounded(&schema()), vec!["island", "sex"]);

        let grounded = selection.grounded(&schema());
        assert_eq!(grounded.fields, vec!["species", "body_mass"]);
        assert!(grounded.channel_hints.is_empty());
        assert!(grounded.ungrounded(&schema()).is_empty());
    }

    #[test]
    fn referenced_names_are_unique() {
        let selection = FieldSelection {
            fields: vec!["species".into()],
            channel_hints: [("species".to_string(), Channel::X)].into_iter().collect(),
            ..FieldSelection::default()
        };
        assert_eq!(selection.referenced_names(), vec!["species"]);
    }

    #[test]
    fn verdict_uses_earliest_word() {
        assert_eq!(Verdict::classify("draco - it follows"), Some(Verdict::Guided));
        assert_eq!(
            Verdict::classify("Baseline, since the draco spec overplots"),
            Some(Verdict::Unguided)
        );
        assert_eq!(Verdict::classify("tie: both fine"), Some(Verdict::Tie));
        assert_eq!(Verdict::classify("Unguided wins"), Some(Verdict::Unguided));
        assert_eq!(Verdict::classify("neither"), None);
        assert_eq!(Verdict::classify("dracolich"), None);
    }

    #[test]
    fn negated_verdict_words_are_skipped() {
        assert_eq!(Verdict::classify("not draco; baseline wins"), Some(Verdict::Unguided));
        assert_eq!(Verdict::classify("Clearly not a tie: draco"), Some(Verdict::Guided));
        assert_eq!(Verdict::classify("Draco, not baseline"), Some(Verdict::Guided));
        assert_eq!(Verdict::classify("no tie here"), None);
    }

    #[test]
    fn empty_comparison() {
        assert!(ComparisonResult::default().is_empty());
        assert!(ComparisonResult::default().winner().is_none());
    }

    #[test]
    fn recommendation_json_omits_absent_parts() {
        let rec = Recommendation {
            mark_type: "bar".into(),
            encodings: vec![EncodingRec {
                channel: "x".into(),
                field: Some("species".into()),
                aggregate: None,
                binning: None,
                stack: None,
            }],
            scales: vec![],
            coordinates: "cartesian".into(),
            facets: vec![],
            task: None,
            cost: vec![4],
            violations: BTreeMap::new(),
        };
        let value: Value = serde_json::from_str(&rec.to_pretty_json()).unwrap();
        assert_eq!(value["encodings"][0], serde_json::json!({"channel": "x", "field": "species"}));
        assert!(value.get("scales").is_none());
        assert!(value.get("task").is_none());
    }

    #[test]
    fn report_display() {
        let report = PathReport {
            label: PathLabel::Unguided,
            succeeded: false,
            attempts: 3,
            last_error: Some("PNG rendering failed: boom".into()),
        };
        assert_eq!(
            report.to_string(),
            "unguided: failed after 3 attempt(s): PNG rendering failed: boom"
        );
    }
}
