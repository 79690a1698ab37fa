//! Recommendation adapter
//!
//! Turns a grounded field selection into design-oracle facts, invokes the
//! oracle and reads the top-ranked answer back into a [`Recommendation`].
//! An oracle failure or an empty answer yields no recommendation; that is a
//! normal outcome, not an error.

use crate::types::{EncodingRec, FacetRec, FieldSelection, Recommendation, ScaleRec};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use vislang_oracle::{DesignModel, DesignOracle};
use vislang_schema::{atom, attribute, entity, SchemaFacts, SchemaSummary};

/// Build the design oracle's input facts
///
/// Schema facts first, then the partial view: one view, one mark, an
/// optional mark type, and one encoding per grounded field with its channel
/// when hinted. Names missing from `schema` are dropped.
#[must_use]
pub fn build_facts(
    schema_facts: &SchemaFacts,
    schema: &SchemaSummary,
    selection: &FieldSelection,
) -> Vec<String> {
    let selection = selection.grounded(schema);
    let mut facts: Vec<String> = schema_facts.as_slice().to_vec();

    facts.push(entity("view", "root", "v0"));
    facts.push(entity("mark", "v0", "m0"));
    if let Some(mark) = selection.mark_hint {
        facts.push(attribute("(mark,type)", "m0", mark));
    }

    for (i, field) in selection.fields.iter().enumerate() {
        let id = format!("e{i}");
        facts.push(entity("encoding", "m0", &id));
        facts.push(attribute("(encoding,field)", &id, atom(field)));
        if let Some(channel) = selection.channel_hints.get(field) {
            facts.push(attribute("(encoding,channel)", &id, channel));
        }
    }
    facts
}

/// Hex SHA-256 over the fact list, one fact per line
#[must_use]
pub fn fingerprint(facts: &[String]) -> String {
    let mut hasher = Sha256::new();
    for fact in facts {
        hasher.update(fact.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Read a design oracle answer into a recommendation
///
/// # Errors
/// A message naming the missing part when the answer has no view or mark.
pub fn extract(model: &DesignModel) -> Result<Recommendation, String> {
    let spec = &model.spec;
    let view = spec
        .get("view")
        .and_then(Value::as_array)
        .and_then(|views| views.first())
        .ok_or("design answer has no view")?;
    let mark = view
        .get("mark")
        .and_then(Value::as_array)
        .and_then(|marks| marks.first())
        .ok_or("design answer view has no mark")?;

    let encodings = items(mark.get("encoding"))
        .map(|enc| EncodingRec {
            channel: string(enc.get("channel")).unwrap_or_default(),
            field: string(enc.get("field")),
            aggregate: string(enc.get("aggregate")),
            binning: enc.get("binning").filter(|b| !b.is_null()).cloned(),
            stack: string(enc.get("stack")),
        })
        .collect();

    let scale_source = if view.get("scale").is_some() {
        view.get("scale")
    } else {
        spec.get("scale")
    };
    let scales = items(scale_source)
        .map(|scale| ScaleRec {
            channel: string(scale.get("channel")).unwrap_or_default(),
            scale_type: string(scale.get("type")).unwrap_or_default(),
            zero: scale.get("zero").and_then(as_flag),
        })
        .collect();

    let facets = items(view.get("facet"))
        .map(|facet| FacetRec {
            channel: string(facet.get("channel")).unwrap_or_default(),
            field: string(facet.get("field")).unwrap_or_default(),
            binning: facet.get("binning").filter(|b| !b.is_null()).cloned(),
        })
        .collect();

    Ok(Recommendation {
        mark_type: string(mark.get("type")).unwrap_or_default(),
        encodings,
        scales,
        coordinates: string(view.get("coordinates")).unwrap_or_else(|| "cartesian".into()),
        facets,
        task: string(spec.get("task")),
        cost: model.cost.clone(),
        violations: model.violations.clone(),
    })
}

fn items(value: Option<&Value>) -> impl Iterator<Item = &Value> {
    value.and_then(Value::as_array).into_iter().flatten()
}

fn string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn as_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Everything one adapter invocation produced
#[derive(Debug, Clone, Default)]
pub struct RecommendationOutcome {
    /// Facts sent to the oracle
    pub facts: Vec<String>,
    /// Top-ranked answer, if any
    pub model: Option<DesignModel>,
    /// Recommendation read from `model`
    pub recommendation: Option<Recommendation>,
    /// Why there is no recommendation
    pub error: Option<String>,
}

/// Recommendation adapter
#[derive(Clone)]
pub struct RecommendationAdapter {
    oracle: Arc<dyn DesignOracle>,
    models: usize,
}

impl RecommendationAdapter {
    /// Create adapter requesting `models` ranked answers
    #[must_use]
    pub fn new(oracle: Arc<dyn DesignOracle>, models: usize) -> Self {
        Self {
            oracle,
            models: models.max(1),
        }
    }

    /// Recommend a design for the selection
    #[tracing::instrument(skip_all, fields(fields = selection.fields.len()))]
    pub async fn recommend(
        &self,
        schema_facts: &SchemaFacts,
        schema: &SchemaSummary,
        selection: &FieldSelection,
    ) -> RecommendationOutcome {
        let facts = build_facts(schema_facts, schema, selection);
        tracing::debug!(facts = facts.len(), fingerprint = %fingerprint(&facts), "Invoking design oracle");

        let mut outcome = RecommendationOutcome {
            facts,
            ..RecommendationOutcome::default()
        };

        let models = match self.oracle.complete_spec(&outcome.facts, self.models).await {
            Ok(models) => models,
            Err(e) => {
                tracing::warn!(error = %e, "Design oracle failed; continuing without recommendation");
                outcome.error = Some(e.to_string());
                return outcome;
            }
        };

        let Some(top) = models.into_iter().next() else {
            tracing::warn!("Design oracle returned no models; continuing without recommendation");
            return outcome;
        };

        match extract(&top) {
            Ok(rec) => {
                tracing::info!(mark = %rec.mark_type, encodings = rec.encodings.len(), "Design recommendation ready");
                outcome.recommendation = Some(rec);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Design answer unreadable; continuing without recommendation");
                outcome.error = Some(e);
            }
        }
        outcome.model = Some(top);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Channel, MarkType};
    use async_trait::async_trait;
    use mockall::mock;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::BTreeMap;
    use vislang_oracle::OracleError;
    use vislang_schema::{build, Dataset};

    mock! {
        Design {}
        #[async_trait]
        impl DesignOracle for Design {
            async fn complete_spec(&self, facts: &[String], models: usize) -> Result<Vec<DesignModel>, OracleError>;
        }
    }

    fn schema() -> (SchemaSummary, SchemaFacts) {
        build(&Dataset::from_records(vec![json!({
            "species": "Adelie", "body_mass": 3750
        })
        .as_object()
        .cloned()
        .unwrap()]))
    }

    fn bar_model() -> DesignModel {
        DesignModel {
            spec: json!({
                "number_rows": 1,
                "task": "summary",
                "view": [{
                    "coordinates": "cartesian",
                    "mark": [{
                        "type": "bar",
                        "encoding": [
                            {"channel": "x", "field": "species"},
                            {"channel": "y", "field": "body_mass", "aggregate": "mean"}
                        ]
                    }],
                    "scale": [
                        {"channel": "x", "type": "ordinal"},
                        {"channel": "y", "type": "linear", "zero": "true"}
                    ]
                }]
            }),
            cost: vec![12],
            violations: BTreeMap::from([("aggregate".to_string(), 1)]),
        }
    }

    #[test]
    fn facts_follow_schema_facts() {
        let (summary, schema_facts) = schema();
        let selection = FieldSelection {
            fields: vec!["species".into(), "island".into(), "body_mass".into()],
            mark_hint: Some(MarkType::Bar),
            channel_hints: BTreeMap::from([("species".to_string(), Channel::X)]),
            reasoning: String::new(),
        };

        let facts = build_facts(&schema_facts, &summary, &selection);
        let tail: Vec<&str> = facts[schema_facts.len()..].iter().map(String::as_str).collect();

        assert_eq!(&facts[..schema_facts.len()], schema_facts.as_slice());
        assert_eq!(
            tail,
            vec![
                "entity(view,root,v0).",
                "entity(mark,v0,m0).",
                "attribute((mark,type),m0,bar).",
                "entity(encoding,m0,e0).",
                "attribute((encoding,field),e0,species).",
                "attribute((encoding,channel),e0,x).",
                "entity(encoding,m0,e1).",
                "attribute((encoding,field),e1,body_mass).",
            ]
        );
    }

    #[test]
    fn fingerprint_tracks_content() {
        let a = vec!["entity(view,root,v0).".to_string()];
        let b = vec!["entity(view,root,v1).".to_string()];
        assert_eq!(fingerprint(&a), fingerprint(&a.clone()));
        assert_ne!(fingerprint(&a), fingerprint(&b));
        assert_eq!(fingerprint(&a).len(), 64);
    }

    #[test]
    fn extraction_reads_top_model() {
        let rec = extract(&bar_model()).unwrap();
        assert_eq!(rec.mark_type, "bar");
        assert_eq!(rec.encodings.len(), 2);
        assert_eq!(rec.encodings[1].aggregate.as_deref(), Some("mean"));
        assert_eq!(rec.scales[1].zero, Some(true));
        assert_eq!(rec.coordinates, "cartesian");
        assert_eq!(rec.task.as_deref(), Some("summary"));
        assert_eq!(rec.cost, vec![12]);
    }

    #[test]
    fn extraction_needs_a_mark() {
        let model = DesignModel {
            spec: json!({"view": [{"mark": []}]}),
            ..DesignModel::default()
        };
        assert!(extract(&model).unwrap_err().contains("no mark"));
    }

    #[tokio::test]
    async fn zero_models_is_no_recommendation() {
        let mut oracle = MockDesign::new();
        oracle.expect_complete_spec().times(1).returning(|_, _| Ok(vec![]));
        let (summary, facts) = schema();

        let outcome = RecommendationAdapter::new(Arc::new(oracle), 1)
            .recommend(&facts, &summary, &FieldSelection::default())
            .await;

        assert!(outcome.recommendation.is_none());
        assert!(outcome.model.is_none());
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn oracle_failure_is_recorded_not_raised() {
        let mut oracle = MockDesign::new();
        oracle
            .expect_complete_spec()
            .returning(|_, _| Err(OracleError::Process("clingo: unsatisfiable".into())));
        let (summary, facts) = schema();

        let outcome = RecommendationAdapter::new(Arc::new(oracle), 1)
            .recommend(&facts, &summary, &FieldSelection::default())
            .await;

        assert!(outcome.recommendation.is_none());
        assert!(outcome.error.unwrap().contains("unsatisfiable"));
    }

    #[tokio::test]
    async fn top_model_becomes_recommendation() {
        let mut oracle = MockDesign::new();
        oracle
            .expect_complete_spec()
            .withf(|facts: &[String], models: &usize| *models == 1 && facts.iter().any(|f| f == "entity(view,root,v0)."))
            .returning(|_, _| Ok(vec![bar_model()]));
        let (summary, facts) = schema();

        let outcome = RecommendationAdapter::new(Arc::new(oracle), 1)
            .recommend(&facts, &summary, &FieldSelection::default())
            .await;

        assert_eq!(outcome.recommendation.unwrap().mark_type, "bar");
        assert!(outcome.model.is_some());
    }
}
