use crate::error::Error;
use crate::models::{HistoryMessage, Role};

/// Most recent history entries kept when formatting the prompt.
pub const MAX_HISTORY_MESSAGES: usize = 10;
/// Upper bound on an accepted question.
pub const MAX_QUESTION_LEN: usize = 500;

const CONTENT_PROMPT_TMPL: &str = "\
You are a physics education assistant specializing in helping users understand the physical principles behind natural phenomena.

## Task Requirements
Please provide a detailed explanation of the physical principles for the user's physics question, along with related phenomena and follow-up questions.

## Explanation Requirements
- Use clear, accessible language, 200-400 words
- Emphasize causal relationships and physical mechanisms
- Consider the coherence of conversation history
- Use everyday analogies and examples

## Related Phenomena Requirements
- Based on the same physical principles, close to daily life
- Each item 3-8 words, concise and clear

## Follow-up Questions Requirements
- First: deepen understanding of the current phenomenon (explore deeper why)
- Second: connect horizontally to other phenomena (what else is similar)
- Third: practical applications or frontier developments (where is this principle used)
- Each question should be within 15 words

## Important: Text Format Requirements
All text fields must strictly follow these rules:
- Do not use double quotes (\") in explanation text, use single quotes (') instead
- Avoid backslashes (\\) and other special characters
- Use concise expressions for related phenomena and follow-up questions, avoiding quotes
- For emphasis, use **bold text** instead of quotes
";

const SVG_PROMPT_TMPL: &str = "\
You are a professional physics diagram designer who creates accurate, clear, and visually appealing SVG demonstration diagrams based on provided physics explanations.

## SVG Technical Requirements
- Responsive design: use an appropriate viewBox, recommended ratios 2:1, 3:2, or 4:3
- Animation effects: add SVG animations when phenomena involve motion or changing processes, using <animateTransform>, <animate>, <animateMotion>; duration 2-4 seconds, looping
- Layered display: use <g> groups for background, main objects, and annotation layers
- Annotations: use <text> tags for physical quantities, units indicated, arrow length represents magnitude

## Physics Accuracy Requirements
- Proportions, angles, and directions must comply with physics laws
- Force directions must be correct; follow the vector nature of physical quantities
- Energy transformation processes must follow conservation laws

## Color Standards
- Temperature: red = hot, blue = cold
- Electric charge: red = positive, blue = negative
- Velocity: green arrows indicate direction
- Energy: yellow = high, purple = low

## SVG Format Requirements
- JSON safety: all double quotes in SVG code must be replaced with single quotes
- Avoid backslashes, newlines, and other escape-sensitive characters
- Keep structure simple; use <defs> for repeated elements
- Add <title> and <desc> tags describing the diagram

Example format:
svg_code: \"<svg viewBox='0 0 800 400' xmlns='http://www.w3.org/2000/svg'>...</svg>\"
";

/// Rejects questions the pipeline should never attempt. Runs before any
/// record is created or network call made.
pub fn validate_question(question: &str) -> Result<&str, Error> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation("question must not be empty".into()));
    }
    if trimmed.chars().count() > MAX_QUESTION_LEN {
        return Err(Error::Validation(format!(
            "question exceeds {MAX_QUESTION_LEN} characters"
        )));
    }
    Ok(trimmed)
}

fn format_history(history: &[HistoryMessage]) -> String {
    if history.is_empty() {
        return String::new();
    }
    let start = history.len().saturating_sub(MAX_HISTORY_MESSAGES);
    let lines: Vec<String> = history[start..]
        .iter()
        .map(|msg| {
            let speaker = match msg.role {
                Role::User => "User",
                Role::Assistant => "AI",
            };
            format!("{}: {}", speaker, msg.content)
        })
        .collect();
    format!("## Conversation History\n{}\n\n", lines.join("\n\n"))
}

/// Formats the content-stage prompt: fixed template, history section (omitted
/// when history is empty), the question verbatim, then format instructions.
pub fn build_content_prompt(question: &str, history: &[HistoryMessage]) -> String {
    format!(
        "{}\n{}User question: {}\n\n{}",
        CONTENT_PROMPT_TMPL,
        format_history(history),
        question,
        content_format_instructions()
    )
}

/// Formats the visual-stage prompt from the question and the already-generated
/// content fields.
pub fn build_svg_prompt(question: &str, explanation: &str, related_phenomena: &[String]) -> String {
    format!(
        "{}\n## Input Information\nUser question: {}\n\nPhysics explanation: {}\n\nRelated phenomena: {}\n\nPlease create an accurate, clear, and visually appealing SVG physics demonstration diagram based on the above explanation.\n\n{}",
        SVG_PROMPT_TMPL,
        question,
        explanation,
        related_phenomena.join(", "),
        svg_format_instructions()
    )
}

fn content_format_instructions() -> &'static str {
    "Respond with a JSON object matching this schema exactly, and nothing else:\n\
    {\"explanation\": string (at least 50 characters), \"related_phenomena\": array of exactly 3 strings, \"further_questions\": array of exactly 3 strings}"
}

fn svg_format_instructions() -> &'static str {
    "Respond with a JSON object matching this schema exactly, and nothing else:\n\
    {\"svg_code\": string (a complete <svg> document, at least 100 characters)}"
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn exchange(n: usize) -> [HistoryMessage; 2] {
        [
            HistoryMessage { role: Role::User, content: format!("question {n}") },
            HistoryMessage { role: Role::Assistant, content: format!("answer {n}") },
        ]
    }

    #[test]
    fn empty_history_omits_history_section() {
        let prompt = build_content_prompt("为什么天空是蓝色的？", &[]);
        assert!(!prompt.contains("## Conversation History"));
        assert!(prompt.contains("User question: 为什么天空是蓝色的？"));
        assert!(prompt.contains("exactly 3 strings"));
    }

    #[test]
    fn history_is_truncated_to_most_recent_entries_in_order() {
        let mut history = Vec::new();
        for n in 1..=15 {
            history.extend(exchange(n));
        }
        let prompt = build_content_prompt("q", &history);

        // 30 messages in, only the last 10 survive: exchanges 11..=15.
        assert!(!prompt.contains("question 10"));
        assert!(prompt.contains("User: question 11"));
        assert!(prompt.contains("AI: answer 15"));

        let q11 = prompt.find("question 11").unwrap();
        let q15 = prompt.find("question 15").unwrap();
        assert!(q11 < q15, "oldest-first order inside the window");

        let section = prompt.split("## Conversation History").nth(1).unwrap();
        let lines = section.split("User question:").next().unwrap();
        assert_eq!(lines.matches("User: ").count(), 5);
        assert_eq!(lines.matches("AI: ").count(), 5);
    }

    #[test]
    fn builder_is_deterministic() {
        let history: Vec<HistoryMessage> = exchange(1).into();
        let a = build_content_prompt("why do magnets attract iron?", &history);
        let b = build_content_prompt("why do magnets attract iron?", &history);
        assert_eq!(a, b);
    }

    #[test]
    fn svg_prompt_carries_content_stage_output() {
        let prompt = build_svg_prompt(
            "why is the sky blue?",
            "rayleigh scattering scatters short wavelengths more strongly",
            &["red sunsets".into(), "blue eyes".into(), "milk in water".into()],
        );
        assert!(prompt.contains("Physics explanation: rayleigh scattering"));
        assert!(prompt.contains("red sunsets, blue eyes, milk in water"));
        assert!(prompt.contains("svg_code"));
    }

    #[test]
    fn question_validation() {
        assert!(matches!(validate_question(""), Err(Error::Validation(_))));
        assert!(matches!(validate_question("   \n"), Err(Error::Validation(_))));
        let long = "why".repeat(200);
        assert!(matches!(validate_question(&long), Err(Error::Validation(_))));
        assert_eq!(validate_question("  why is ice slippery?  ").unwrap(), "why is ice slippery?");
    }
}
