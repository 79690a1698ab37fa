//! Comparator
//!
//! Judges the guided candidate against the unguided one. Transport and
//! decode failures are retried without corrective turns; exhausting the
//! budget is fatal because a verdict has no safe default.

use crate::error::PipelineError;
use crate::prompts::{self, ComparisonEvidence};
use crate::types::{Candidate, ComparisonResult, Recommendation, Verdict};
use serde::Deserialize;
use std::sync::Arc;
use vislang_oracle::{decode_object, exchange, ChatRequest, DecodeError, Exchange, LabeledImage, Renderer, TextOracle};

/// Judgment answer as decoded from the oracle
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JudgmentResponse {
    /// Detailed markdown analysis
    pub comparison_markdown: String,
    /// Short summary
    pub summary: String,
    /// Verdict with justification
    pub verdict: String,
}

impl JudgmentResponse {
    /// Decode oracle text; the verdict must name a side or a tie
    ///
    /// # Errors
    /// `DecodeError` for malformed text, missing keys or an unclassifiable verdict.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let response: Self = decode_object(text)?;
        if Verdict::classify(&response.verdict).is_none() {
            return Err(DecodeError::Shape(format!(
                "verdict '{}' names neither draco, baseline nor tie",
                response.verdict
            )));
        }
        Ok(response)
    }
}

impl From<JudgmentResponse> for ComparisonResult {
    fn from(r: JudgmentResponse) -> Self {
        Self {
            comparison_markdown: r.comparison_markdown,
            summary: r.summary,
            verdict: r.verdict,
        }
    }
}

/// A verdict and the exchange that produced it
#[derive(Debug, Clone)]
pub struct Judgment {
    /// Structured verdict
    pub result: ComparisonResult,
    /// Request sent and raw response
    pub exchange: Exchange,
}

/// Comparator
#[derive(Clone)]
pub struct Comparator {
    oracle: Arc<dyn TextOracle>,
    renderer: Arc<dyn Renderer>,
    max_attempts: usize,
}

impl Comparator {
    /// Create comparator
    #[must_use]
    pub fn new(oracle: Arc<dyn TextOracle>, renderer: Arc<dyn Renderer>, max_attempts: usize) -> Self {
        Self {
            oracle,
            renderer,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Compare the two candidates
    ///
    /// # Errors
    /// `PipelineError::Judgment` once every attempt failed.
    #[tracing::instrument(skip_all)]
    pub async fn compare(
        &self,
        prompt: &str,
        recommendation: &Recommendation,
        guided: &Candidate,
        unguided: &Candidate,
    ) -> Result<Judgment, PipelineError> {
        let request = self.request(prompt, recommendation, guided, unguided).await;
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            let outcome = match exchange(self.oracle.as_ref(), request.clone()).await {
                Ok(ex) => JudgmentResponse::decode(&ex.response)
                    .map(|response| (response, ex))
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };

            match outcome {
                Ok((response, exchange)) => {
                    tracing::info!(attempt, verdict = %response.verdict, "Judgment received");
                    return Ok(Judgment {
                        result: response.into(),
                        exchange,
                    });
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Judgment attempt failed");
                    last_error = e;
                }
            }
        }

        Err(PipelineError::Judgment {
            attempts: self.max_attempts,
            last_error,
        })
    }

    async fn request(
        &self,
        prompt: &str,
        recommendation: &Recommendation,
        guided: &Candidate,
        unguided: &Candidate,
    ) -> ChatRequest {
        let recommendation_json = recommendation.to_pretty_json();
        let guided_spec_json = pretty(guided);
        let unguided_spec_json = pretty(unguided);
        let user = prompts::comparison_user(&ComparisonEvidence {
            prompt,
            recommendation_json: &recommendation_json,
            guided_spec_json: &guided_spec_json,
            guided_reasoning: &guided.reasoning,
            unguided_spec_json: &unguided_spec_json,
            unguided_reasoning: &unguided.reasoning,
        });

        let mut images = Vec::new();
        for candidate in [guided, unguided] {
            if let Some(png) = self.image(candidate).await {
                images.push(LabeledImage::new(candidate.label.image_label(), png));
            }
        }

        ChatRequest::new(prompts::COMPARISON_SYSTEM, user).with_images(images)
    }

    async fn image(&self, candidate: &Candidate) -> Option<Vec<u8>> {
        if let Some(png) = &candidate.image {
            return Some(png.clone());
        }
        let chart = candidate.chart.as_ref()?;
        match self.renderer.export_png(chart).await {
            Ok(png) if !png.is_empty() => Some(png),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(path = %candidate.label, error = %e, "Omitting image from comparison");
                None
            }
        }
    }
}

fn pretty(candidate: &Candidate) -> String {
    serde_json::to_string_pretty(&candidate.spec_or_empty()).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PathLabel;
    use async_trait::async_trait;
    use mockall::{mock, Sequence};
    use serde_json::{json, Value};
    use std::collections::BTreeMap;
    use vislang_oracle::{bind, Chart, OracleError, RenderError};
    use vislang_schema::Dataset;

    mock! {
        Oracle {}
        #[async_trait]
        impl TextOracle for Oracle {
            async fn complete(&self, request: &ChatRequest) -> Result<String, OracleError>;
        }
    }

    mock! {
        Charts {}
        #[async_trait]
        impl Renderer for Charts {
            async fn construct(&self, spec: &Value, data: &Dataset) -> Result<Chart, RenderError>;
            async fn export_png(&self, chart: &Chart) -> Result<Vec<u8>, RenderError>;
        }
    }

    const JUDGMENT: &str = r###"{"comparison_markdown": "## Marks", "summary": "Both bars.", "verdict": "tie - equivalent"}"###;

    fn recommendation() -> Recommendation {
        Recommendation {
            mark_type: "bar".into(),
            encodings: vec![],
            scales: vec![],
            coordinates: "cartesian".into(),
            facets: vec![],
            task: None,
            cost: vec![1],
            violations: BTreeMap::new(),
        }
    }

    fn candidate(label: PathLabel, image: Option<Vec<u8>>, with_chart: bool) -> Candidate {
        let data = Dataset::from_records(vec![json!({"species": "Adelie"}).as_object().cloned().unwrap()]);
        let spec = json!({"mark": "bar", "encoding": {"x": {"field": "species"}}});
        Candidate {
            label,
            chart: with_chart.then(|| bind(&spec, &data).unwrap()),
            spec: Some(spec),
            reasoning: format!("{label} reasoning"),
            image,
            transcript: vec![],
            conversation: vec![],
            states: vec![],
        }
    }

    #[test]
    fn verdict_must_be_classifiable() {
        assert!(JudgmentResponse::decode(JUDGMENT).is_ok());
        let err = JudgmentResponse::decode(
            r#"{"comparison_markdown": "", "summary": "", "verdict": "unclear"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, DecodeError::Shape(_)));
        assert!(JudgmentResponse::decode(r#"{"summary": "", "verdict": "tie"}"#).is_err());
    }

    #[tokio::test]
    async fn images_for_every_renderable_candidate() {
        let mut oracle = MockOracle::new();
        oracle
            .expect_complete()
            .times(1)
            .withf(|req: &ChatRequest| {
                req.images.len() == 2
                    && req.images[0].label == "Draco-informed visualization:"
                    && req.images[1].label == "Baseline visualization:"
                    && req.user.contains("guided reasoning")
            })
            .returning(|_| Ok(JUDGMENT.into()));
        let mut renderer = MockCharts::new();
        renderer.expect_export_png().times(1).returning(|_| Ok(vec![7]));

        let judgment = Comparator::new(Arc::new(oracle), Arc::new(renderer), 3)
            .compare(
                "mass by species",
                &recommendation(),
                &candidate(PathLabel::Guided, Some(vec![1]), true),
                &candidate(PathLabel::Unguided, None, true),
            )
            .await
            .unwrap();

        assert_eq!(judgment.result.winner(), Some(Verdict::Tie));
        assert_eq!(judgment.exchange.request.images[1].png, vec![7]);
    }

    #[tokio::test]
    async fn failed_export_omits_image() {
        let mut oracle = MockOracle::new();
        oracle
            .expect_complete()
            .withf(|req: &ChatRequest| req.images.len() == 1)
            .returning(|_| Ok(JUDGMENT.into()));
        let mut renderer = MockCharts::new();
        renderer
            .expect_export_png()
            .returning(|_| Err(RenderError::Export("no rasterizer".into())));

        let result = Comparator::new(Arc::new(oracle), Arc::new(renderer), 3)
            .compare(
                "p",
                &recommendation(),
                &candidate(PathLabel::Guided, None, true),
                &candidate(PathLabel::Unguided, Some(vec![1]), true),
            )
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let mut seq = Sequence::new();
        let mut oracle = MockOracle::new();
        oracle
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(OracleError::Timeout { secs: 120 }));
        oracle
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("{\"summary\": ".into()));
        oracle
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|req: &ChatRequest| req.turns.is_empty())
            .returning(|_| Ok(JUDGMENT.into()));

        let judgment = Comparator::new(Arc::new(oracle), Arc::new(MockCharts::new()), 3)
            .compare(
                "p",
                &recommendation(),
                &candidate(PathLabel::Guided, None, false),
                &candidate(PathLabel::Unguided, None, false),
            )
            .await
            .unwrap();

        assert_eq!(judgment.result.summary, "Both bars.");
    }

    #[tokio::test]
    async fn exhaustion_is_fatal() {
        let mut oracle = MockOracle::new();
        oracle.expect_complete().times(3).returning(|_| Ok("no idea".into()));

        let err = Comparator::new(Arc::new(oracle), Arc::new(MockCharts::new()), 3)
            .compare(
                "p",
                &recommendation(),
                &candidate(PathLabel::Guided, None, false),
                &candidate(PathLabel::Unguided, None, false),
            )
            .await
            .unwrap_err();

        assert!(err.is_fatal());
        assert!(matches!(err, PipelineError::Judgment { attempts: 3, .. }));
    }
}
