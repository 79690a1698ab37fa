//! Grounded field selection
//!
//! Asks the text oracle which fields matter for the request, checks every
//! name it references against the schema, and feeds the invalid ones back
//! until the answer is grounded or the attempt budget runs out. Exhausting
//! the budget is not an error: the last answer is used and its ungrounded
//! names are dropped later, when facts are built.

use crate::error::GroundingError;
use crate::prompts;
use crate::types::{Channel, FieldSelection, MarkType};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use vislang_oracle::{decode_object, ChatRequest, DecodeError, TextOracle, Turn};
use vislang_schema::SchemaSummary;

/// Field selection answer as decoded from the oracle
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldSelectionResponse {
    /// Selected field names
    pub fields: Vec<String>,
    /// Rationale
    #[serde(default)]
    pub reasoning: Option<String>,
    /// Mark hint, if the user asked for one
    #[serde(default)]
    pub mark_hint: Option<String>,
    /// Field → channel placements
    #[serde(default)]
    pub channel_hints: Option<BTreeMap<String, String>>,
}

impl FieldSelectionResponse {
    /// Decode oracle text
    ///
    /// # Errors
    /// `DecodeError` when the text is not an object with a `fields` list.
    pub fn decode(text: &str) -> Result<(Self, Value), DecodeError> {
        let value: Value = decode_object(text)?;
        let response =
            serde_json::from_value(value.clone()).map_err(|e| DecodeError::Shape(e.to_string()))?;
        Ok((response, value))
    }

    /// Names referenced by `fields` and the keys of `channel_hints`
    #[must_use]
    pub fn referenced_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        let hinted = self.channel_hints.iter().flat_map(BTreeMap::keys);
        for name in self.fields.iter().chain(hinted) {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        names
    }

    /// Convert to a typed selection; unknown marks and channels are dropped
    #[must_use]
    pub fn into_selection(self) -> FieldSelection {
        let mut fields: Vec<String> = Vec::with_capacity(self.fields.len());
        for field in self.fields {
            if !fields.contains(&field) {
                fields.push(field);
            }
        }

        let mark_hint = self
            .mark_hint
            .filter(|m| !m.trim().is_empty())
            .and_then(|m| match m.parse::<MarkType>() {
                Ok(mark) => Some(mark),
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping mark hint");
                    None
                }
            });

        let channel_hints = self
            .channel_hints
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(field, channel)| match channel.parse::<Channel>() {
                Ok(channel) => Some((field, channel)),
                Err(e) => {
                    tracing::warn!(field = %field, error = %e, "Dropping channel hint");
                    None
                }
            })
            .collect();

        FieldSelection {
            fields,
            mark_hint,
            channel_hints,
            reasoning: self.reasoning.unwrap_or_default(),
        }
    }
}

/// What the selector converged to, and how
#[derive(Debug, Clone, Default)]
pub struct SelectionOutcome {
    /// Last decoded selection (empty if nothing decoded)
    pub selection: FieldSelection,
    /// Oracle invocations made
    pub attempts: usize,
    /// Names still ungrounded after the last attempt
    pub unresolved: Vec<String>,
    /// Last conversation sent
    pub request: ChatRequest,
    /// Last decoded answer, verbatim
    pub response: Option<Value>,
}

impl SelectionOutcome {
    /// Whether the last answer decoded and was fully grounded
    #[inline]
    #[must_use]
    pub fn converged(&self) -> bool {
        self.response.is_some() && self.unresolved.is_empty()
    }
}

/// Grounded field selector
#[derive(Clone)]
pub struct FieldSelector {
    oracle: Arc<dyn TextOracle>,
    max_attempts: usize,
}

impl FieldSelector {
    /// Create selector with an attempt budget
    #[must_use]
    pub fn new(oracle: Arc<dyn TextOracle>, max_attempts: usize) -> Self {
        Self {
            oracle,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Select fields for `prompt`
    #[tracing::instrument(skip_all, fields(max_attempts = self.max_attempts))]
    pub async fn select(
        &self,
        prompt: &str,
        schema: &SchemaSummary,
        sample_rows: &str,
    ) -> SelectionOutcome {
        let user = prompts::field_selection_user(prompt, &schema.column_summary(), sample_rows);
        let mut valid: Vec<String> = schema.field_names().map(str::to_string).collect();
        valid.sort();

        let mut turns: Vec<Turn> = Vec::new();
        let mut outcome = SelectionOutcome::default();

        for attempt in 1..=self.max_attempts {
            let request =
                ChatRequest::new(prompts::FIELD_SELECTION_SYSTEM, user.clone()).with_turns(turns.clone());
            outcome.attempts = attempt;
            outcome.request = request.clone();
            let more = attempt < self.max_attempts;

            let text = match self.oracle.complete(&request).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Field selection call failed");
                    continue;
                }
            };

            let (response, raw) = match FieldSelectionResponse::decode(&text) {
                Ok(decoded) => decoded,
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "Field selection not decodable");
                    if more {
                        turns.push(Turn::user(prompts::selection_parse_retry(&e.to_string())));
                    }
                    continue;
                }
            };

            let invalid: Vec<String> = response
                .referenced_names()
                .into_iter()
                .filter(|name| !schema.contains(name))
                .map(str::to_string)
                .collect();

            outcome.selection = response.into_selection();
            outcome.unresolved.clone_from(&invalid);
            outcome.response = Some(raw.clone());

            if invalid.is_empty() {
                tracing::debug!(attempt, fields = ?outcome.selection.fields, "Field selection grounded");
                return outcome;
            }

            tracing::debug!(attempt, invalid = ?invalid, "Field selection references unknown fields");
            if more {
                let correction = GroundingError {
                    invalid,
                    valid: valid.clone(),
                };
                turns.push(Turn::assistant(raw.to_string()));
                turns.push(Turn::user(correction.to_string()));
            }
        }

        if !outcome.unresolved.is_empty() {
            tracing::warn!(
                unresolved = ?outcome.unresolved,
                "Field selection retries exhausted; ungrounded names will be dropped"
            );
        } else if outcome.response.is_none() {
            tracing::warn!("Field selection produced no usable answer; continuing with none");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mockall::{mock, Sequence};
    use serde_json::json;
    use vislang_oracle::{OracleError, Role};
    use vislang_schema::Dataset;

    mock! {
        Oracle {}
        #[async_trait]
        impl TextOracle for Oracle {
            async fn complete(&self, request: &ChatRequest) -> Result<String, OracleError>;
        }
    }

    fn schema() -> SchemaSummary {
        let data = Dataset::from_records(vec![json!({
            "species": "Adelie", "flipper_length": 181, "body_mass": 3750
        })
        .as_object()
        .cloned()
        .unwrap()]);
        SchemaSummary::infer(&data)
    }

    #[test]
    fn response_decoding_tolerates_nulls() {
        let (response, _) = FieldSelectionResponse::decode(
            r#"{"fields": ["species"], "reasoning": null, "mark_hint": null, "channel_hints": null}"#,
        )
        .unwrap();
        let selection = response.into_selection();
        assert_eq!(selection.fields, vec!["species"]);
        assert!(selection.mark_hint.is_none());
        assert!(selection.channel_hints.is_empty());
    }

    #[test]
    fn unknown_hints_are_dropped_and_fields_deduplicated() {
        let (response, _) = FieldSelectionResponse::decode(
            r#"{"fields": ["species", "species"], "mark_hint": "pie",
                "channel_hints": {"species": "x", "body_mass": "wobble"}}"#,
        )
        .unwrap();
        assert_eq!(response.referenced_names(), vec!["species", "body_mass"]);
        let selection = response.into_selection();
        assert_eq!(selection.fields, vec!["species"]);
        assert!(selection.mark_hint.is_none());
        assert_eq!(selection.channel_hints.len(), 1);
    }

    #[tokio::test]
    async fn grounded_first_answer_needs_one_call() {
        let mut oracle = MockOracle::new();
        oracle.expect_complete().times(1).returning(|_| {
            Ok(r#"{"fields": ["species", "body_mass"], "mark_hint": "bar"}"#.into())
        });

        let outcome = FieldSelector::new(Arc::new(oracle), 3)
            .select("mass by species", &schema(), "")
            .await;

        assert!(outcome.converged());
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.selection.mark_hint, Some(MarkType::Bar));
    }

    #[tokio::test]
    async fn invalid_names_trigger_a_grounding_turn() {
        let mut seq = Sequence::new();
        let mut oracle = MockOracle::new();
        oracle
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(r#"{"fields": ["species", "island"]}"#.into()));
        oracle
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|req: &ChatRequest| {
                req.turns.len() == 2
                    && req.turns[0].role == Role::Assistant
                    && req.turns[1].content.contains(r#"["island"]"#)
                    && req.turns[1].content.contains(r#"["body_mass", "flipper_length", "species"]"#)
            })
            .returning(|_| Ok(r#"{"fields": ["species"]}"#.into()));

        let outcome = FieldSelector::new(Arc::new(oracle), 3)
            .select("mass by species", &schema(), "")
            .await;

        assert!(outcome.converged());
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.selection.fields, vec!["species"]);
    }

    #[tokio::test]
    async fn exhausted_budget_keeps_last_answer() {
        let mut oracle = MockOracle::new();
        oracle
            .expect_complete()
            .times(2)
            .returning(|_| Ok(r#"{"fields": ["species"], "channel_hints": {"sex": "color"}}"#.into()));

        let outcome = FieldSelector::new(Arc::new(oracle), 2)
            .select("mass by species", &schema(), "")
            .await;

        assert!(!outcome.converged());
        assert_eq!(outcome.unresolved, vec!["sex"]);
        assert_eq!(outcome.selection.fields, vec!["species"]);
        assert_eq!(outcome.request.turns.len(), 2);
    }

    #[tokio::test]
    async fn parse_failures_and_transport_errors_share_the_budget() {
        let mut seq = Sequence::new();
        let mut oracle = MockOracle::new();
        oracle
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(OracleError::Transport("connection reset".into())));
        oracle
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("{\"fields\": [".into()));
        oracle
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|req: &ChatRequest| {
                req.turns.len() == 1 && req.turns[0].content.contains("not valid structured output")
            })
            .returning(|_| Ok(r#"{"fields": ["body_mass"]}"#.into()));

        let outcome = FieldSelector::new(Arc::new(oracle), 3)
            .select("distribution of mass", &schema(), "")
            .await;

        assert!(outcome.converged());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.selection.fields, vec!["body_mass"]);
    }

    #[tokio::test]
    async fn nothing_decodable_yields_empty_selection() {
        let mut oracle = MockOracle::new();
        oracle
            .expect_complete()
            .times(3)
            .returning(|_| Ok("I think species is best.".into()));

        let outcome = FieldSelector::new(Arc::new(oracle), 3).select("?", &schema(), "").await;

        assert!(!outcome.converged());
        assert!(outcome.selection.is_empty());
        assert!(outcome.response.is_none());
    }
}
