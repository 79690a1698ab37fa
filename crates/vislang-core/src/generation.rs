//! Spec generation
//!
//! One [`SpecGenerator::generate`] call drives one path through the
//! [`GenerationMachine`]: draft, validate, render, and on any failure append
//! a corrective turn carrying the literal error before redrafting.
//!
//! A chart that constructs but fails to export is retained as the current
//! best chart. A later construction failure does not discard it; a later
//! successful construction replaces it.

use crate::error::AttemptError;
use crate::prompts;
use crate::state_machine::{GenerationMachine, GenerationState};
use crate::types::{Attempt, Candidate, PathLabel};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use vislang_oracle::{decode_object, ChatRequest, Chart, DecodeError, Renderer, TextOracle, Turn};
use vislang_schema::Dataset;

/// Spec generation answer as decoded from the oracle
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SpecResponse {
    /// Vega-Lite specification
    pub vegalite_spec: Value,
    /// Design rationale
    #[serde(default)]
    pub reasoning: Option<String>,
}

impl SpecResponse {
    /// Decode oracle text, returning the typed answer and the raw object
    ///
    /// # Errors
    /// `DecodeError` when the text is not an object with a `vegalite_spec`.
    pub fn decode(text: &str) -> Result<(Self, Value), DecodeError> {
        let value: Value = decode_object(text)?;
        let response =
            serde_json::from_value(value.clone()).map_err(|e| DecodeError::Shape(e.to_string()))?;
        Ok((response, value))
    }
}

/// Structural checks run before rendering
///
/// # Errors
/// The first failing check's message.
pub fn validate_spec(spec: &Value) -> Result<(), String> {
    let Value::Object(map) = spec else {
        return Err("Spec must be a JSON object".into());
    };
    let layered = map.contains_key("layer");
    if !layered && !map.contains_key("mark") {
        return Err("Spec must have 'mark' or 'layer' at top level".into());
    }
    if !layered && !map.contains_key("encoding") {
        return Err("Spec must have 'encoding' or 'layer' at top level".into());
    }
    Ok(())
}

enum Step {
    Converged {
        raw: String,
        response: SpecResponse,
        chart: Chart,
        png: Vec<u8>,
    },
    Failed {
        raw: Option<String>,
        decoded: Option<(SpecResponse, Value)>,
        chart: Option<Chart>,
        error: AttemptError,
    },
}

/// Drives one generation path to convergence or exhaustion
#[derive(Clone)]
pub struct SpecGenerator {
    oracle: Arc<dyn TextOracle>,
    renderer: Arc<dyn Renderer>,
    data: Arc<Dataset>,
    max_attempts: usize,
}

impl SpecGenerator {
    /// Create generator
    #[must_use]
    pub fn new(
        oracle: Arc<dyn TextOracle>,
        renderer: Arc<dyn Renderer>,
        data: Arc<Dataset>,
        max_attempts: usize,
    ) -> Self {
        Self {
            oracle,
            renderer,
            data,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Generate a candidate for one path
    #[tracing::instrument(skip_all, fields(path = %label))]
    pub async fn generate(&self, label: PathLabel, system: String, user: String) -> Candidate {
        let mut machine = GenerationMachine::new(self.max_attempts);
        let mut turns: Vec<Turn> = Vec::new();
        let mut transcript: Vec<Attempt> = Vec::new();
        let mut last_spec: Option<Value> = None;
        let mut last_reasoning = String::new();
        let mut retained: Option<Chart> = None;

        while !machine.is_terminal() {
            let index = machine.attempt();
            let request = ChatRequest::new(system.clone(), user.clone()).with_turns(turns.clone());

            match self.run_attempt(&request, &mut machine).await {
                Step::Converged {
                    raw,
                    response,
                    chart,
                    png,
                } => {
                    tracing::info!(attempt = index, "Spec converged");
                    let spec = response.vegalite_spec;
                    transcript.push(Attempt::succeeded(index, request, raw, spec.clone()));
                    return Candidate {
                        label,
                        spec: Some(spec),
                        reasoning: response.reasoning.unwrap_or_default(),
                        chart: Some(chart),
                        image: Some(png),
                        transcript,
                        conversation: turns,
                        states: machine.history().to_vec(),
                    };
                }
                Step::Failed {
                    raw,
                    decoded,
                    chart,
                    error,
                } => {
                    tracing::debug!(attempt = index, kind = error.kind(), error = %error, "Attempt failed");
                    if let Some((response, _)) = &decoded {
                        last_spec = Some(response.vegalite_spec.clone());
                        last_reasoning = response.reasoning.clone().unwrap_or_default();
                    }
                    if chart.is_some() {
                        retained = chart;
                    }

                    if machine.fail() == GenerationState::Correcting {
                        if error.warrants_correction() {
                            if let Some((_, value)) = &decoded {
                                turns.push(Turn::assistant(value.to_string()));
                            }
                            turns.push(Turn::user(prompts::validation_retry(&error)));
                        }
                        machine.redraft();
                    }

                    let spec = decoded.map(|(response, _)| response.vegalite_spec);
                    transcript.push(Attempt::failed(index, request, raw, spec, error));
                }
            }
        }

        tracing::warn!(
            attempts = transcript.len(),
            chart_retained = retained.is_some(),
            "Spec generation retries exhausted"
        );
        Candidate {
            label,
            spec: last_spec,
            reasoning: last_reasoning,
            chart: retained,
            image: None,
            transcript,
            conversation: turns,
            states: machine.history().to_vec(),
        }
    }

    async fn run_attempt(&self, request: &ChatRequest, machine: &mut GenerationMachine) -> Step {
        // Drafting
        let raw = match self.oracle.complete(request).await {
            Ok(raw) => raw,
            Err(e) => {
                return Step::Failed {
                    raw: None,
                    decoded: None,
                    chart: None,
                    error: e.into(),
                }
            }
        };
        let (response, value) = match SpecResponse::decode(&raw) {
            Ok(decoded) => decoded,
            Err(e) => {
                return Step::Failed {
                    raw: Some(raw),
                    decoded: None,
                    chart: None,
                    error: e.into(),
                }
            }
        };
        machine.pass();

        // Validating
        if let Err(msg) = validate_spec(&response.vegalite_spec) {
            return Step::Failed {
                raw: Some(raw),
                decoded: Some((response, value)),
                chart: None,
                error: AttemptError::Validation(msg),
            };
        }
        machine.pass();

        // Rendering
        let chart = match self.renderer.construct(&response.vegalite_spec, &self.data).await {
            Ok(chart) => chart,
            Err(e) => {
                return Step::Failed {
                    raw: Some(raw),
                    decoded: Some((response, value)),
                    chart: None,
                    error: e.into(),
                }
            }
        };
        let export = match self.renderer.export_png(&chart).await {
            Ok(png) if png.is_empty() => Err(AttemptError::Export("exported image is empty".into())),
            Ok(png) => Ok(png),
            Err(e) => Err(e.into()),
        };
        match export {
            Ok(png) => {
                machine.pass();
                Step::Converged {
                    raw,
                    response,
                    chart,
                    png,
                }
            }
            Err(error) => Step::Failed {
                raw: Some(raw),
                decoded: Some((response, value)),
                chart: Some(chart),
                error,
            },
        }
    }
}
