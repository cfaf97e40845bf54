use crate::EvaluationResult;

/// Appended to the evaluator's system message on the repair round-trip.
pub const REPAIR_INSTRUCTION: &str =
    "IMPORTANT: Return ONLY valid JSON. Do not include any extra text or markdown.";

/// Prompt templates for the producer, reviser and evaluator phases
pub struct LoopPrompts;

impl LoopPrompts {
    /// Fence `content` as a markdown code block
    pub fn wrap_block(content: &str, language: &str) -> String {
        format!("```{}\n{}\n```", language, content)
    }

    /// Build the user message for the first attempt
    pub fn build_producer_message(inputs_block: &str) -> String {
        [
            "Inputs:",
            inputs_block,
            "",
            "Return ONLY the markdown output described in the prompt.",
        ]
        .join("\n")
    }

    /// Build the user message for a revision attempt
    pub fn build_reviser_message(
        original_output: &str,
        evaluation: &EvaluationResult,
        attempt: u32,
        inputs_block: &str,
    ) -> String {
        let evaluation_json = serde_json::to_string_pretty(evaluation)
            .unwrap_or_else(|_| format!("{:?}", evaluation));

        [
            format!("Revision attempt: {}", attempt),
            String::new(),
            "Original output:".to_string(),
            Self::wrap_block(original_output, "markdown"),
            String::new(),
            "Evaluation JSON:".to_string(),
            Self::wrap_block(&evaluation_json, "json"),
            String::new(),
            "Inputs:".to_string(),
            inputs_block.to_string(),
            String::new(),
            "Return ONLY the revised markdown output described in the prompt.".to_string(),
        ]
        .join("\n")
    }

    /// Build the instruction block pinning the evaluator's output shape
    pub fn build_schema_instruction<'a>(
        dimensions: impl IntoIterator<Item = &'a str>,
        pass_threshold: f64,
    ) -> String {
        let dimension_fields = dimensions
            .into_iter()
            .map(|name| format!("\"{}\": number", name))
            .collect::<Vec<_>>()
            .join(", ");

        [
            "Return ONLY valid JSON with this exact structure:".to_string(),
            "{".to_string(),
            "  \"overallScore\": number,".to_string(),
            "  \"passed\": boolean,".to_string(),
            format!("  \"dimensionScores\": {{ {} }},", dimension_fields),
            "  \"feedback\": string,".to_string(),
            "  \"suggestedFixes\": string[]".to_string(),
            "}".to_string(),
            "No extra keys. Dimension scores must match the rubric exactly.".to_string(),
            format!(
                "Set \"passed\" to true ONLY if overallScore >= {}.",
                pass_threshold
            ),
        ]
        .join("\n")
    }

    /// Build the evaluator's system message
    pub fn build_evaluator_system_message(prompt: &str, schema_instruction: &str) -> String {
        format!("{}\n\n{}", prompt, schema_instruction)
    }

    /// Build the evaluator's user message
    pub fn build_evaluator_message(artifact: &str, rubric_source: &str, inputs_block: &str) -> String {
        [
            "Target list:".to_string(),
            Self::wrap_block(artifact, "markdown"),
            String::new(),
            "Rubric:".to_string(),
            Self::wrap_block(rubric_source, "yaml"),
            String::new(),
            "Inputs:".to_string(),
            inputs_block.to_string(),
        ]
        .join("\n")
    }

    /// Build the stricter system message used for the repair round-trip
    pub fn build_repair_system_message(system_message: &str) -> String {
        format!("{}\n\n{}", system_message, REPAIR_INSTRUCTION)
    }
}
