//! Testing utilities for VisLang workspace
//!
//! Scripted oracles, an in-memory artifact sink and dataset fixtures.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use vislang_core::prompts;
use vislang_core::{Artifact, ArtifactSink, SinkError};
use vislang_oracle::{
    bind, ChatRequest, Chart, DesignModel, DesignOracle, OracleError, RenderError, Renderer,
    TextOracle,
};
use vislang_schema::Dataset;

/// Which pipeline stage issued a text oracle call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    FieldSelection,
    GuidedSpec,
    UnguidedSpec,
    Comparison,
    Unknown,
}

impl CallKind {
    /// Classify by system instruction
    pub fn of(request: &ChatRequest) -> Self {
        let system = request.system.as_str();
        if system == prompts::FIELD_SELECTION_SYSTEM {
            Self::FieldSelection
        } else if system == prompts::COMPARISON_SYSTEM {
            Self::Comparison
        } else if system.contains(prompts::GUIDED_ADDON_SYSTEM) {
            Self::GuidedSpec
        } else if system == prompts::SPEC_SYSTEM {
            Self::UnguidedSpec
        } else {
            Self::Unknown
        }
    }
}

/// Text oracle answering from per-stage queues
///
/// Stages are independent, so concurrent paths get deterministic answers.
/// An exhausted queue answers with `OracleError::InvalidResponse`.
#[derive(Default)]
pub struct ScriptedTextOracle {
    scripts: Mutex<HashMap<CallKind, VecDeque<Result<String, OracleError>>>>,
    requests: Mutex<Vec<(CallKind, ChatRequest)>>,
}

impl ScriptedTextOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response text
    pub fn push(&self, kind: CallKind, response: impl Into<String>) -> &Self {
        self.scripts
            .lock()
            .entry(kind)
            .or_default()
            .push_back(Ok(response.into()));
        self
    }

    /// Queue a failure
    pub fn push_error(&self, kind: CallKind, error: OracleError) -> &Self {
        self.scripts.lock().entry(kind).or_default().push_back(Err(error));
        self
    }

    /// Requests received for `kind`, in order
    pub fn requests(&self, kind: CallKind) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub fn call_count(&self, kind: CallKind) -> usize {
        self.requests.lock().iter().filter(|(k, _)| *k == kind).count()
    }

    /// Responses still queued for `kind`
    pub fn remaining(&self, kind: CallKind) -> usize {
        self.scripts.lock().get(&kind).map_or(0, VecDeque::len)
    }
}

#[async_trait]
impl TextOracle for ScriptedTextOracle {
    async fn complete(&self, request: &ChatRequest) -> Result<String, OracleError> {
        let kind = CallKind::of(request);
        self.requests.lock().push((kind, request.clone()));
        self.scripts
            .lock()
            .get_mut(&kind)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                Err(OracleError::InvalidResponse(format!(
                    "no scripted response for {kind:?}"
                )))
            })
    }
}

/// Design oracle returning fixed answers
pub struct FixedDesignOracle {
    models: Vec<DesignModel>,
    failure: Option<String>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl FixedDesignOracle {
    pub fn new(models: Vec<DesignModel>) -> Self {
        Self {
            models,
            failure: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Oracle answering with a bar chart of `x` against `y`
    pub fn bar(x: &str, y: &str) -> Self {
        Self::new(vec![bar_model(x, y)])
    }

    /// Oracle that finds no completion
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Oracle whose process always fails
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::empty()
        }
    }

    /// Fact lists received, in order
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl DesignOracle for FixedDesignOracle {
    async fn complete_spec(
        &self,
        facts: &[String],
        models: usize,
    ) -> Result<Vec<DesignModel>, OracleError> {
        self.calls.lock().push(facts.to_vec());
        if let Some(message) = &self.failure {
            return Err(OracleError::Process(message.clone()));
        }
        Ok(self.models.iter().take(models).cloned().collect())
    }
}

/// Renderer binding in-process and "exporting" a fixed image
///
/// Construction can be made to fail for the next calls; export can be made
/// to fail for every chart of a given mark type.
pub struct StubRenderer {
    png: Vec<u8>,
    construct_failures: Mutex<VecDeque<String>>,
    failing_marks: Mutex<Vec<String>>,
    exports: Mutex<usize>,
}

impl Default for StubRenderer {
    fn default() -> Self {
        Self {
            png: PNG_SIGNATURE.to_vec(),
            construct_failures: Mutex::new(VecDeque::new()),
            failing_marks: Mutex::new(Vec::new()),
            exports: Mutex::new(0),
        }
    }
}

/// Leading bytes of every PNG file
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

impl StubRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next construction with `message`
    pub fn fail_next_construct(&self, message: impl Into<String>) -> &Self {
        self.construct_failures.lock().push_back(message.into());
        self
    }

    /// Fail every export of charts with `mark`
    pub fn fail_exports_of(&self, mark: impl Into<String>) -> &Self {
        self.failing_marks.lock().push(mark.into());
        self
    }

    /// Successful exports so far
    pub fn export_count(&self) -> usize {
        *self.exports.lock()
    }
}

#[async_trait]
impl Renderer for StubRenderer {
    async fn construct(&self, spec: &Value, data: &Dataset) -> Result<Chart, RenderError> {
        if let Some(message) = self.construct_failures.lock().pop_front() {
            return Err(RenderError::Construction(message));
        }
        bind(spec, data)
    }

    async fn export_png(&self, chart: &Chart) -> Result<Vec<u8>, RenderError> {
        let mark = chart.spec().get("mark").and_then(Value::as_str).unwrap_or_default();
        if self.failing_marks.lock().iter().any(|m| m == mark) {
            return Err(RenderError::Export(format!("cannot rasterize '{mark}' marks")));
        }
        *self.exports.lock() += 1;
        Ok(self.png.clone())
    }
}

/// Sink keeping artifacts in memory
#[derive(Default)]
pub struct MemorySink {
    artifacts: Mutex<BTreeMap<String, Artifact>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Artifact names, sorted
    pub fn names(&self) -> Vec<String> {
        self.artifacts.lock().keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.artifacts.lock().contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Artifact> {
        self.artifacts.lock().get(name).cloned()
    }

    pub fn json(&self, name: &str) -> Option<Value> {
        match self.get(name)? {
            Artifact::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn text(&self, name: &str) -> Option<String> {
        match self.get(name)? {
            Artifact::Text(text) => Some(text),
            _ => None,
        }
    }
}

#[async_trait]
impl ArtifactSink for MemorySink {
    async fn write(&self, name: &str, artifact: Artifact) -> Result<(), SinkError> {
        self.artifacts.lock().insert(name.to_string(), artifact);
        Ok(())
    }

    fn location(&self) -> Option<std::path::PathBuf> {
        None
    }
}

/// Small penguins table
///
/// `species` is nominal; `flipper_length` and `body_mass` are quantitative.
pub fn penguins() -> Dataset {
    let rows = [
        ("Adelie", 181, 3750),
        ("Adelie", 186, 3800),
        ("Adelie", 195, 3250),
        ("Adelie", 193, 3450),
        ("Chinstrap", 192, 3500),
        ("Chinstrap", 196, 3900),
        ("Chinstrap", 193, 3650),
        ("Chinstrap", 188, 3525),
        ("Gentoo", 217, 5400),
        ("Gentoo", 221, 5700),
        ("Gentoo", 211, 4500),
        ("Gentoo", 230, 5800),
    ];
    Dataset::from_records(
        rows.iter()
            .map(|(species, flipper, mass)| {
                let mut record = Map::new();
                record.insert("species".into(), json!(species));
                record.insert("flipper_length".into(), json!(flipper));
                record.insert("body_mass".into(), json!(mass));
                record
            })
            .collect(),
    )
}

/// Field selection answer
pub fn selection_json(fields: &[&str]) -> String {
    json!({
        "fields": fields,
        "reasoning": "fields named by the request",
    })
    .to_string()
}

/// Spec generation answer
pub fn spec_json(spec: &Value, reasoning: &str) -> String {
    json!({"vegalite_spec": spec, "reasoning": reasoning}).to_string()
}

/// Single-view spec with a nominal x and quantitative y
pub fn chart_spec(mark: &str, x: &str, y: &str) -> Value {
    json!({
        "$schema": "https://vega.github.io/schema/vega-lite/v5.json",
        "mark": mark,
        "encoding": {
            "x": {"field": x, "type": "nominal"},
            "y": {"field": y, "type": "quantitative", "aggregate": "mean"},
        },
    })
}

/// Judgment answer
pub fn judgment_json(verdict: &str) -> String {
    json!({
        "comparison_markdown": "## Mark choice\nBoth use bars.",
        "summary": "The charts are close.",
        "verdict": verdict,
    })
    .to_string()
}

/// Design answer recommending a bar chart of mean `y` by `x`
pub fn bar_model(x: &str, y: &str) -> DesignModel {
    DesignModel {
        spec: json!({
            "view": [{
                "coordinates": "cartesian",
                "mark": [{
                    "type": "bar",
                    "encoding": [
                        {"channel": "x", "field": x},
                        {"channel": "y", "field": y, "aggregate": "mean"},
                    ],
                }],
                "scale": [
                    {"channel": "x", "type": "ordinal"},
                    {"channel": "y", "type": "linear", "zero": "true"},
                ],
            }],
            "task": "summary",
        }),
        cost: vec![7],
        violations: BTreeMap::from([("aggregate".to_string(), 1)]),
    }
}
