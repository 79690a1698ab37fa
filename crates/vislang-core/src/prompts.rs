//! Prompt catalogue
//!
//! Fixed system instructions are constants; user instructions are built by
//! the `*_user` functions from run data.

use crate::error::AttemptError;

/// Field selection system instruction
pub const FIELD_SELECTION_SYSTEM: &str = "\
You are a visualization field-selection assistant. Given a dataset schema and a \
user's visualization request, you decide which fields are relevant and suggest \
structural hints for the chart.

Return a JSON object with exactly these keys:
- \"fields\": list of field names (strings) from the schema that should be encoded
- \"reasoning\": one-sentence explanation of your choices
- \"mark_hint\": mark type if the user explicitly asked for one (e.g. \"bar\", \"line\"), otherwise null
- \"channel_hints\": object mapping field names to channels if the user explicitly \
placed a field on an axis (e.g. {\"price\": \"x\"}), otherwise {}
";

/// Spec generation system instruction, shared by both paths
pub const SPEC_SYSTEM: &str = "\
You are generating a Vega-Lite visualization spec.

Design the best visualization for the user's request:
- Choose the most effective mark type for the data and task
- Assign fields to channels for maximum readability
- Use appropriate scales, aggregation, and binning
- Add a descriptive title and axis labels
- Include tooltips for interactive exploration
- Apply appropriate mark styling (filled marks, opacity for overplotting, etc.)
- Use a thoughtful color scheme
- Size the chart appropriately

Return a JSON object with exactly these keys:
- \"vegalite_spec\": the complete Vega-Lite specification (no $schema or data needed)
- \"reasoning\": brief explanation of your design choices
";

/// Appended to [`SPEC_SYSTEM`] on the guided path
pub const GUIDED_ADDON_SYSTEM: &str = "

ADDITIONAL GUIDANCE - Draco Recommendations:

You have been provided with structural recommendations from Draco 2, a \
constraint-based visualization recommender that optimizes for perceptual \
effectiveness. You MUST honor these structural decisions:
- Mark type: use the recommended mark type
- Channel assignments: use the recommended field-to-channel mappings
- Scale types: use the recommended scale types
- Aggregation/binning: apply if recommended

You may add polish on top of these structural choices, but do not contradict them.
";

/// Judgment system instruction
pub const COMPARISON_SYSTEM: &str = "\
You are a visualization analyst comparing two Vega-Lite specs for the same task: \
one informed by Draco's constraint-based recommendations, one designed by an LLM \
without Draco.

You receive the Vega-Lite specs, reasoning text, Draco's recommendations, and \
rendered images of both visualizations. Use the images to assess the actual visual \
output (layout, readability, color effectiveness, overplotting, axis formatting and \
overall clarity), not just the spec structure.

Only make judgements about the relative quality of the two specs that you are highly \
confident in. Keep discussion of insignificant differences short.

Use the Draco recommendations to assess:
- Which structural choices came from Draco and which were added or changed by the LLM
- Whether the Draco-informed spec actually followed Draco's advice
- Whether any deviations from Draco's recommendations were justified
- Whether any difference in quality can be attributed to Draco's contribution, or \
to the LLM making different choices independently of Draco's input. Mention this \
point in your final evaluation.

Return a JSON object with exactly these keys:
- \"comparison_markdown\": detailed markdown analysis covering mark type choices, \
channel/encoding decisions, scale choices, where the Draco-informed spec followed \
or deviated from Draco's advice, enhancements added by each approach, and which \
better serves the user's intent
- \"summary\": 2-3 sentence summary of the key differences
- \"verdict\": which approach better serves the user's intent (\"draco\", \"baseline\", \
or \"tie\") with brief justification
";

/// Field selection user instruction
#[must_use]
pub fn field_selection_user(prompt: &str, column_summary: &str, sample_rows: &str) -> String {
    format!(
        "USER REQUEST: {prompt}\n\n\
         DATASET SCHEMA:\n{column_summary}\n\n\
         SAMPLE ROWS:\n{sample_rows}\n\n\
         Select the fields most relevant to the user's request. Only include fields that \
         should be encoded in the visualization. Return JSON.\n"
    )
}

/// Spec generation user instruction, shared by both paths
#[must_use]
pub fn spec_user(prompt: &str, data_path: &str, column_summary: &str, sample_rows: &str) -> String {
    format!(
        "USER REQUEST: {prompt}\n\n\
         DATA FILE: {data_path}\n\n\
         COLUMN SUMMARY:\n{column_summary}\n\n\
         SAMPLE ROWS:\n{sample_rows}\n\n\
         Generate the best Vega-Lite spec for this request. Return JSON.\n"
    )
}

/// Guided system instruction
#[must_use]
pub fn guided_system() -> String {
    format!("{SPEC_SYSTEM}{GUIDED_ADDON_SYSTEM}")
}

/// Guided user instruction: the shared one plus the recommendation
#[must_use]
pub fn guided_user(base_user: &str, recommendation_json: &str) -> String {
    format!(
        "{base_user}\n\nDRACO RECOMMENDATIONS:\n{recommendation_json}\n\n\
         Honor Draco's structural choices above while designing the spec.\n"
    )
}

/// Evidence handed to the judgment oracle
#[derive(Debug, Clone, Copy)]
pub struct ComparisonEvidence<'a> {
    /// User request
    pub prompt: &'a str,
    /// Pretty recommendation JSON
    pub recommendation_json: &'a str,
    /// Pretty guided spec JSON
    pub guided_spec_json: &'a str,
    /// Guided reasoning
    pub guided_reasoning: &'a str,
    /// Pretty unguided spec JSON
    pub unguided_spec_json: &'a str,
    /// Unguided reasoning
    pub unguided_reasoning: &'a str,
}

/// Judgment user instruction
#[must_use]
pub fn comparison_user(evidence: &ComparisonEvidence<'_>) -> String {
    format!(
        "USER REQUEST: {}\n\n\
         DRACO RECOMMENDATIONS:\n{}\n\n\
         DRACO-INFORMED SPEC:\n{}\n\n\
         DRACO-INFORMED REASONING:\n{}\n\n\
         BASELINE SPEC:\n{}\n\n\
         BASELINE REASONING:\n{}\n\n\
         Analyze both approaches. Pay special attention to whether the Draco-informed spec \
         actually followed Draco's structural advice and whether differences between the two \
         specs are attributable to Draco's contribution. Return JSON.\n",
        evidence.prompt,
        evidence.recommendation_json,
        evidence.guided_spec_json,
        evidence.guided_reasoning,
        evidence.unguided_spec_json,
        evidence.unguided_reasoning,
    )
}

/// Corrective turn after a failed generation attempt
///
/// Parse failures have no spec to quote, so they get their own wording.
#[must_use]
pub fn validation_retry(error: &AttemptError) -> String {
    if let AttemptError::Parse(message) = error {
        return spec_parse_retry(message);
    }
    format!(
        "The Vega-Lite spec you returned failed validation with this error:\n\n\
         {error}\n\n\
         Please fix the spec and return the corrected JSON in the same format \
         (with \"vegalite_spec\" and \"reasoning\" keys).\n"
    )
}

/// Corrective turn after an unparseable generation answer
#[must_use]
pub fn spec_parse_retry(error: &str) -> String {
    format!(
        "Your response was not valid structured output: {error}\n\n\
         Please return a JSON object with \"vegalite_spec\" and \"reasoning\" keys.\n"
    )
}

/// Corrective turn after an unparseable field selection
#[must_use]
pub fn selection_parse_retry(error: &str) -> String {
    format!(
        "Your response was not valid structured output: {error}\n\n\
         Please return a JSON object with \"fields\", \"reasoning\", \"mark_hint\" and \
         \"channel_hints\" keys.\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guided_prompts_extend_the_shared_ones() {
        assert!(guided_system().starts_with(SPEC_SYSTEM));
        let base = spec_user("mass by species", "penguins.json", "- species: string", "...");
        let guided = guided_user(&base, "{\"mark_type\": \"bar\"}");
        assert!(guided.starts_with(&base));
        assert!(guided.contains("DRACO RECOMMENDATIONS:\n{\"mark_type\": \"bar\"}"));
    }

    #[test]
    fn retry_embeds_literal_error() {
        let msg = validation_retry(&AttemptError::Construction("unknown mark type 'pie'".into()));
        assert!(msg.contains("Chart construction failed: unknown mark type 'pie'"));
        assert!(msg.contains("\"vegalite_spec\""));
    }

    #[test]
    fn parse_failures_get_their_own_wording() {
        let msg = validation_retry(&AttemptError::Parse("expected value at line 1".into()));
        assert!(msg.starts_with("Your response was not valid structured output: expected value"));
        assert!(!msg.contains("failed validation"));
        assert!(msg.contains("\"vegalite_spec\" and \"reasoning\""));
    }

    #[test]
    fn comparison_user_orders_evidence() {
        let text = comparison_user(&ComparisonEvidence {
            prompt: "p",
            recommendation_json: "R",
            guided_spec_json: "G",
            guided_reasoning: "gr",
            unguided_spec_json: "U",
            unguided_reasoning: "ur",
        });
        let guided = text.find("DRACO-INFORMED SPEC:\nG").unwrap();
        let unguided = text.find("BASELINE SPEC:\nU").unwrap();
        assert!(guided < unguided);
    }
}
