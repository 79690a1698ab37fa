//! Pipeline orchestrator
//!
//! Sequences schema → field selection → recommendation → generation →
//! comparison, and is the only place that branches on whether a
//! recommendation exists. It also owns every artifact write; a failed write
//! is logged and the run continues.

use crate::comparison::Comparator;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::generation::SpecGenerator;
use crate::prompts;
use crate::recommendation::{RecommendationAdapter, RecommendationOutcome};
use crate::selection::FieldSelector;
use crate::sink::{log_call, Artifact, ArtifactSink, FsSink, NullSink};
use crate::types::{Candidate, ComparisonResult, PathLabel, PipelineRequest, PipelineResult, RunId};
use chrono::Local;
use serde_json::{json, Value};
use std::sync::Arc;
use vislang_oracle::{
    decode_leading, ChatCompletionsConfig, ChatCompletionsOracle, ChatRequest, DesignOracle,
    DesignProcess, Renderer, TextOracle, VegaLiteRenderer,
};
use vislang_schema::{sample_rows, Dataset};

/// The VisLang pipeline
///
/// Holds the three oracles; each [`Pipeline::run`] is independent.
#[derive(Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    text: Arc<dyn TextOracle>,
    design: Arc<dyn DesignOracle>,
    renderer: Arc<dyn Renderer>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline").field("config", &self.config).finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Create pipeline from explicit oracles
    #[must_use]
    pub fn new(
        config: PipelineConfig,
        text: Arc<dyn TextOracle>,
        design: Arc<dyn DesignOracle>,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        Self {
            config,
            text,
            design,
            renderer,
        }
    }

    /// Create pipeline with the production oracles
    ///
    /// # Errors
    /// `PipelineError::Config` for invalid settings, `PipelineError::Oracle`
    /// if a client cannot be built.
    pub fn from_config(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let text = ChatCompletionsOracle::new(ChatCompletionsConfig {
            base_url: config.api_base.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            timeout_secs: config.request_timeout_secs,
        })?;
        let design = DesignProcess::from_command_line(&config.design_command)?;
        let renderer = VegaLiteRenderer::new(config.vl_convert.clone());
        Ok(Self::new(config, Arc::new(text), Arc::new(design), Arc::new(renderer)))
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load the dataset, open a run directory and run
    ///
    /// # Errors
    /// `PipelineError::DataFormat` if the data cannot be loaded, plus
    /// everything [`Pipeline::run_with`] returns.
    pub async fn run(&self, request: &PipelineRequest) -> Result<PipelineResult, PipelineError> {
        let dataset = vislang_schema::load(&request.data_path, &self.config.data_roots)?;

        let sink: Box<dyn ArtifactSink> = if self.config.log_enabled {
            match FsSink::create(&self.config.log_root, &self.config.model, &request.prompt).await {
                Ok(sink) => Box::new(sink),
                Err(e) => {
                    tracing::warn!(error = %e, "Cannot create run directory; artifacts will not be written");
                    Box::new(NullSink)
                }
            }
        } else {
            Box::new(NullSink)
        };

        self.run_with(request, dataset, sink.as_ref()).await
    }

    /// Run on a loaded dataset, writing artifacts to `sink`
    ///
    /// # Errors
    /// - `PipelineError::Judgment` if the comparison could not be read
    /// - `PipelineError::TaskJoin` if a generation task died
    #[tracing::instrument(skip_all, fields(run = tracing::field::Empty))]
    pub async fn run_with(
        &self,
        request: &PipelineRequest,
        dataset: Dataset,
        sink: &dyn ArtifactSink,
    ) -> Result<PipelineResult, PipelineError> {
        let run_id = RunId::new();
        tracing::Span::current().record("run", tracing::field::display(run_id));
        tracing::info!(prompt = %request.prompt, data = %request.data_path, model = %self.config.model, "Starting run");

        // 1. Schema
        let data = Arc::new(dataset);
        let (schema, facts) = vislang_schema::build(&data);
        let column_summary = schema.column_summary();
        let sample = sample_rows(&data, self.config.sample_rows);
        tracing::info!(rows = schema.number_rows, fields = schema.fields.len(), facts = facts.len(), "Schema built");

        persist(
            sink,
            "meta.json",
            Artifact::Json(json!({
                "run_id": run_id.to_string(),
                "prompt": request.prompt,
                "data_path": request.data_path,
                "model": self.config.model,
                "timestamp": Local::now().to_rfc3339(),
            })),
        )
        .await;

        // 2. Field selection
        let selection = FieldSelector::new(self.text.clone(), self.config.selection_attempts)
            .select(&request.prompt, &schema, &sample)
            .await;
        tracing::info!(
            fields = ?selection.selection.fields,
            attempts = selection.attempts,
            grounded = selection.converged(),
            "Field selection done"
        );
        persist_call(
            sink,
            "1_field_selection",
            &selection.request,
            selection.response.clone().unwrap_or(Value::Null),
        )
        .await;
        let field_selection = selection.selection.grounded(&schema);

        // 3. Recommendation
        let outcome = RecommendationAdapter::new(self.design.clone(), self.config.design_models)
            .recommend(&facts, &schema, &field_selection)
            .await;
        persist_recommendation(sink, &outcome).await;

        // 4. Generation
        let generator = SpecGenerator::new(
            self.text.clone(),
            self.renderer.clone(),
            data.clone(),
            self.config.generation_attempts,
        );
        let base_user = prompts::spec_user(&request.prompt, &request.data_path, &column_summary, &sample);

        let (guided, unguided) = if let Some(rec) = &outcome.recommendation {
            tracing::info!("Generating guided and unguided specs");
            let guided_task = tokio::spawn({
                let generator = generator.clone();
                let system = prompts::guided_system();
                let user = prompts::guided_user(&base_user, &rec.to_pretty_json());
                async move { generator.generate(PathLabel::Guided, system, user).await }
            });
            let unguided_task = tokio::spawn({
                let generator = generator.clone();
                let user = base_user.clone();
                async move {
                    generator
                        .generate(PathLabel::Unguided, prompts::SPEC_SYSTEM.to_string(), user)
                        .await
                }
            });
            let (guided, unguided) = tokio::join!(guided_task, unguided_task);
            (Some(guided?), unguided?)
        } else {
            tracing::warn!("No design recommendation; generating unguided spec only");
            let unguided = generator
                .generate(PathLabel::Unguided, prompts::SPEC_SYSTEM.to_string(), base_user)
                .await;
            (None, unguided)
        };

        for candidate in guided.iter().chain(std::iter::once(&unguided)) {
            tracing::info!(report = %candidate.report(), "Generation path finished");
            self.persist_candidate(sink, candidate).await;
        }

        // 5. Comparison
        let comparison = match (&outcome.recommendation, &guided) {
            (Some(rec), Some(guided)) => {
                let judgment = Comparator::new(
                    self.text.clone(),
                    self.renderer.clone(),
                    self.config.judgment_attempts,
                )
                .compare(&request.prompt, rec, guided, &unguided)
                .await?;
                persist_call(
                    sink,
                    "3_comparison",
                    &judgment.exchange.request,
                    lenient_json(&judgment.exchange.response),
                )
                .await;
                persist(
                    sink,
                    "4_comparison.md",
                    Artifact::Text(judgment.result.comparison_markdown.clone()),
                )
                .await;
                judgment.result
            }
            _ => ComparisonResult::default(),
        };

        let log_dir = sink.location();
        tracing::info!(
            verdict = %comparison.verdict,
            log_dir = ?log_dir,
            "Run complete"
        );

        Ok(PipelineResult {
            run_id,
            prompt: request.prompt.clone(),
            data_path: request.data_path.clone(),
            model: self.config.model.clone(),
            schema,
            facts,
            field_selection,
            unresolved_fields: selection.unresolved,
            recommendation: outcome.recommendation,
            guided,
            unguided,
            comparison,
            log_dir,
        })
    }

    async fn persist_candidate(&self, sink: &dyn ArtifactSink, candidate: &Candidate) {
        let call = candidate.label.call_name();
        let prefix = candidate.label.artifact_prefix();

        if let Some(last) = candidate.transcript.last() {
            let output = last.raw_output.as_deref().map_or(Value::Null, lenient_json);
            persist_call(sink, call, &last.request, output).await;

            if !candidate.succeeded() {
                let history = ChatRequest::new(last.request.system.clone(), last.request.user.clone())
                    .with_turns(candidate.conversation.clone());
                let spec = candidate.spec_or_empty();
                persist_call(
                    sink,
                    &format!("{call}_retries_exhausted"),
                    &history,
                    json!({"vegalite_spec": spec, "reasoning": candidate.reasoning}),
                )
                .await;
            }
        }

        persist(
            sink,
            &format!("{prefix}_spec.vl.json"),
            Artifact::Json(candidate.spec_or_empty()),
        )
        .await;
        persist(
            sink,
            &format!("{prefix}_reasoning.md"),
            Artifact::Text(format!(
                "{}\n\n{}",
                candidate.label.reasoning_heading(),
                candidate.reasoning
            )),
        )
        .await;

        let png_name = format!("{prefix}_spec.png");
        if let Some(png) = &candidate.image {
            persist(sink, &png_name, Artifact::Png(png.clone())).await;
        } else if let Some(chart) = &candidate.chart {
            match self.renderer.export_png(chart).await {
                Ok(png) => persist(sink, &png_name, Artifact::Png(png)).await,
                Err(e) => {
                    persist(
                        sink,
                        &format!("{png_name}.render_error.txt"),
                        Artifact::Text(e.to_string()),
                    )
                    .await;
                }
            }
        }
    }
}

async fn persist(sink: &dyn ArtifactSink, name: &str, artifact: Artifact) {
    if let Err(e) = sink.write(name, artifact).await {
        tracing::warn!(artifact = name, error = %e, "Failed to persist artifact");
    }
}

async fn persist_call(sink: &dyn ArtifactSink, name: &str, request: &ChatRequest, response: Value) {
    if let Err(e) = log_call(sink, name, request, response).await {
        tracing::warn!(call = name, error = %e, "Failed to persist call log");
    }
}

async fn persist_recommendation(sink: &dyn ArtifactSink, outcome: &RecommendationOutcome) {
    persist(sink, "2_draco_solver_input.json", Artifact::Json(json!(outcome.facts))).await;
    if let Some(model) = &outcome.model {
        persist(
            sink,
            "2_draco_solver_output.json",
            Artifact::Json(json!({
                "spec_dict": model.spec,
                "cost": model.cost,
                "violations": model.violations,
            })),
        )
        .await;
    }
    if let Some(rec) = &outcome.recommendation {
        if let Ok(value) = serde_json::to_value(rec) {
            persist(sink, "2_draco_recommendations.json", Artifact::Json(value)).await;
        }
    }
    if let Some(error) = &outcome.error {
        persist(sink, "2_draco_error.txt", Artifact::Text(error.clone())).await;
    }
}

fn lenient_json(raw: &str) -> Value {
    decode_leading(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn production_pipeline_builds_from_defaults() {
        let pipeline = Pipeline::from_config(PipelineConfig::default()).unwrap();
        assert_eq!(pipeline.config().model, "anthropic/claude-opus-4-6");
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = Pipeline::from_config(PipelineConfig::default().with_attempts(0)).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[tokio::test]
    async fn missing_data_is_fatal_before_any_oracle_call() {
        let tmp = tempfile::tempdir().unwrap();
        let config = PipelineConfig::default()
            .with_data_roots(vec![PathBuf::from(tmp.path())])
            .with_log_root(tmp.path().join("logs"));
        let pipeline = Pipeline::from_config(config).unwrap();

        let err = pipeline
            .run(&PipelineRequest::new("anything", "missing.csv"))
            .await
            .unwrap_err();

        assert!(err.is_fatal());
        assert!(matches!(err, PipelineError::DataFormat(_)));
        assert!(!tmp.path().join("logs").exists());
    }

    #[test]
    fn lenient_json_falls_back_to_text() {
        assert_eq!(lenient_json("```json\n{\"a\": 1}\n```"), json!({"a": 1}));
        assert_eq!(lenient_json("oops"), json!("oops"));
    }
}
