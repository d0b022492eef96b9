//! Strict parser for the reasoning agent's thought/action grammar.
//!
//! The model's output must contain either a `Final Answer:` marker or
//! an `Action:` / `Action Input:` line pair. Ambiguous output (both
//! markers, or an action with no input) is a parse failure that
//! terminates the run; the parser never guesses.

use crate::error::Error;

/// Marker that terminates a run with the model's answer.
const FINAL_ANSWER_MARKER: &str = "Final Answer:";
/// Line prefix naming the tool to invoke.
const ACTION_PREFIX: &str = "Action:";
/// Line prefix carrying the tool's argument.
const ACTION_INPUT_PREFIX: &str = "Action Input:";
/// Optional line prefix carrying the model's reasoning.
const THOUGHT_PREFIX: &str = "Thought:";

/// One parsed step of model output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedStep {
    /// The model chose a tool invocation.
    Action {
        /// Reasoning text preceding the action, if any.
        thought: String,
        /// Name of the tool to invoke.
        tool: String,
        /// Argument to pass to the tool.
        input: String,
    },
    /// The model produced its final answer.
    FinalAnswer {
        /// Reasoning text preceding the answer, if any.
        thought: String,
        /// The answer text after the marker.
        text: String,
    },
}

/// Parses one round of model output into a typed step.
///
/// # Errors
///
/// Returns [`Error::ResponseParse`] when the output contains neither a
/// final answer nor a complete action, or contains both.
pub fn parse_step(output: &str) -> Result<ParsedStep, Error> {
    let has_action = output
        .lines()
        .any(|line| line.trim_start().starts_with(ACTION_PREFIX));
    let final_pos = output.find(FINAL_ANSWER_MARKER);

    match (final_pos, has_action) {
        (Some(_), true) => Err(parse_error(
            "output contains both an action and a final answer",
            output,
        )),
        (Some(pos), false) => {
            let text = output[pos + FINAL_ANSWER_MARKER.len()..].trim().to_string();
            let thought = extract_thought(&output[..pos]);
            Ok(ParsedStep::FinalAnswer { thought, text })
        }
        (None, true) => parse_action(output),
        (None, false) => Err(parse_error(
            "output contains neither an action nor a final answer",
            output,
        )),
    }
}

/// Parses the `Action:` / `Action Input:` line pair.
fn parse_action(output: &str) -> Result<ParsedStep, Error> {
    let mut tool: Option<String> = None;
    let mut input: Option<String> = None;
    let mut thought_lines: Vec<&str> = Vec::new();

    for line in output.lines() {
        let trimmed = line.trim_start();
        // "Action Input:" must be checked first: "Action:" is its prefix.
        if let Some(rest) = trimmed.strip_prefix(ACTION_INPUT_PREFIX) {
            if tool.is_some() && input.is_none() {
                input = Some(rest.trim().to_string());
            }
        } else if let Some(rest) = trimmed.strip_prefix(ACTION_PREFIX) {
            if tool.is_none() {
                tool = Some(rest.trim().to_string());
            }
        } else if tool.is_none() {
            thought_lines.push(line);
        }
    }

    match (tool, input) {
        (Some(tool), Some(input)) if !tool.is_empty() && !input.is_empty() => {
            let thought = extract_thought(&thought_lines.join("\n"));
            Ok(ParsedStep::Action {
                thought,
                tool,
                input,
            })
        }
        (Some(_), _) => Err(parse_error("action is missing its input", output)),
        (None, _) => Err(parse_error("no action line found", output)),
    }
}

/// Strips the `Thought:` prefix and surrounding whitespace from the
/// text preceding an action or final answer.
fn extract_thought(prefix: &str) -> String {
    let trimmed = prefix.trim();
    trimmed
        .strip_prefix(THOUGHT_PREFIX)
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}

fn parse_error(message: &str, content: &str) -> Error {
    Error::ResponseParse {
        message: message.to_string(),
        content: content.to_string(),
    }
}

/// Strips markdown code fences from model output.
///
/// Some models wrap JSON in ```` ```json ```` blocks even when asked
/// for a bare object.
#[must_use]
pub fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    if trimmed.starts_with("```") {
        trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
    } else {
        trimmed
    }
}
