use serde::Deserialize;
use tracing::info;

use crate::error::{Error, FailureKind};
use crate::models::ContentFields;
use crate::openrouter::{preview, CompletionModel};

/// Minimum explanation length accepted from the content stage.
const MIN_EXPLANATION_CHARS: usize = 50;
/// Exact cardinality required for both list fields.
const LIST_LEN: usize = 3;
/// Minimum SVG payload accepted from the visual stage.
const MIN_SVG_CHARS: usize = 100;

const CONTENT_TEMPERATURE: f32 = 0.3;
// Lower temperature for SVG generation to keep markup structurally tame.
const SVG_TEMPERATURE: f32 = 0.2;

#[derive(Debug, Deserialize)]
struct RawSvg {
    svg_code: String,
}

/// Pulls the JSON object out of a raw model reply, tolerating markdown code
/// fences and surrounding prose. The reply is untrusted text until it has
/// passed this and the schema checks.
fn extract_json(raw: &str) -> Result<&str, Error> {
    let start = raw
        .find('{')
        .ok_or_else(|| Error::generation(FailureKind::Parse, "no JSON object in model reply"))?;
    let end = raw
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| Error::generation(FailureKind::Parse, "unterminated JSON object in model reply"))?;
    Ok(&raw[start..=end])
}

fn parse_content(raw: &str) -> Result<ContentFields, Error> {
    let json = extract_json(raw)?;
    let content: ContentFields = serde_json::from_str(json)
        .map_err(|e| Error::generation(FailureKind::Parse, format!("content reply: {e}")))?;
    validate_content(&content)?;
    Ok(content)
}

fn validate_content(content: &ContentFields) -> Result<(), Error> {
    if content.explanation.trim().chars().count() < MIN_EXPLANATION_CHARS {
        return Err(Error::generation(
            FailureKind::Schema,
            format!("explanation shorter than {MIN_EXPLANATION_CHARS} characters"),
        ));
    }
    check_list(&content.related_phenomena, "related_phenomena")?;
    check_list(&content.further_questions, "further_questions")?;
    Ok(())
}

fn check_list(items: &[String], field: &str) -> Result<(), Error> {
    if items.len() != LIST_LEN {
        return Err(Error::generation(
            FailureKind::Schema,
            format!("{field} must have exactly {LIST_LEN} entries, got {}", items.len()),
        ));
    }
    if items.iter().any(|item| item.trim().is_empty()) {
        return Err(Error::generation(FailureKind::Schema, format!("{field} contains an empty entry")));
    }
    Ok(())
}

fn parse_svg(raw: &str) -> Result<String, Error> {
    let json = extract_json(raw)?;
    let svg: RawSvg = serde_json::from_str(json)
        .map_err(|e| Error::generation(FailureKind::Parse, format!("svg reply: {e}")))?;
    validate_svg(&svg.svg_code)?;
    Ok(svg.svg_code)
}

fn validate_svg(code: &str) -> Result<(), Error> {
    let trimmed = code.trim();
    if trimmed.chars().count() < MIN_SVG_CHARS {
        return Err(Error::generation(
            FailureKind::Schema,
            format!("svg_code shorter than {MIN_SVG_CHARS} characters"),
        ));
    }
    let open = trimmed.find("<svg");
    let close = trimmed.rfind("</svg>");
    match (open, close) {
        (Some(open), Some(close)) if open < close => Ok(()),
        _ => Err(Error::generation(
            FailureKind::Schema,
            "svg_code is not a well-formed <svg> document",
        )),
    }
}

/// Runs one content-stage completion and returns the validated fields, or a
/// generation failure. No retries happen here; that is the caller's policy.
pub async fn invoke_content(
    model: &dyn CompletionModel,
    prompt: &str,
) -> Result<ContentFields, Error> {
    let raw = model.complete(prompt, CONTENT_TEMPERATURE).await?;
    let content = parse_content(&raw)?;
    info!(chars = content.explanation.len(), "✅ Content reply passed schema validation");
    Ok(content)
}

/// Runs one visual-stage completion and returns the validated SVG markup.
pub async fn invoke_svg(model: &dyn CompletionModel, prompt: &str) -> Result<String, Error> {
    let raw = model.complete(prompt, SVG_TEMPERATURE).await?;
    let svg = parse_svg(&raw)?;
    info!("✅ SVG reply passed schema validation: {}", preview(&svg));
    Ok(svg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn valid_content_json() -> String {
        serde_json::json!({
            "explanation": "Light from the sun scatters off air molecules; shorter blue wavelengths scatter far more strongly than red ones.",
            "related_phenomena": ["Red sunsets", "Blue distant mountains", "White clouds"],
            "further_questions": ["Why are sunsets red?", "Why is the ocean blue?", "How do polarized glasses work?"]
        })
        .to_string()
    }

    #[test]
    fn accepts_valid_content_reply() {
        let content = parse_content(&valid_content_json()).unwrap();
        assert_eq!(content.related_phenomena.len(), 3);
        assert_eq!(content.further_questions.len(), 3);
        assert!(content.explanation.len() >= 50);
    }

    #[test]
    fn accepts_reply_wrapped_in_code_fence_and_prose() {
        let wrapped = format!("Sure! Here is the result:\n```json\n{}\n```\nHope this helps.", valid_content_json());
        assert!(parse_content(&wrapped).is_ok());
    }

    #[test]
    fn rejects_wrong_list_cardinality() {
        let raw = serde_json::json!({
            "explanation": "An explanation that is certainly longer than fifty characters in total length.",
            "related_phenomena": ["only", "two"],
            "further_questions": ["a?", "b?", "c?"]
        })
        .to_string();
        let err = parse_content(&raw).unwrap_err();
        assert_eq!(err.failure_kind(), Some(FailureKind::Schema));
        assert!(err.to_string().contains("related_phenomena"));
    }

    #[test]
    fn rejects_short_explanation() {
        let raw = serde_json::json!({
            "explanation": "too short",
            "related_phenomena": ["a", "b", "c"],
            "further_questions": ["a?", "b?", "c?"]
        })
        .to_string();
        let err = parse_content(&raw).unwrap_err();
        assert_eq!(err.failure_kind(), Some(FailureKind::Schema));
    }

    #[test]
    fn rejects_missing_field_as_parse_failure() {
        let raw = serde_json::json!({
            "explanation": "An explanation that is certainly longer than fifty characters in total length.",
            "related_phenomena": ["a", "b", "c"]
        })
        .to_string();
        let err = parse_content(&raw).unwrap_err();
        assert_eq!(err.failure_kind(), Some(FailureKind::Parse));
    }

    #[test]
    fn rejects_non_json_reply() {
        let err = parse_content("I could not produce JSON, sorry.").unwrap_err();
        assert_eq!(err.failure_kind(), Some(FailureKind::Parse));
    }

    #[test]
    fn svg_requires_length_and_tag_structure() {
        let good = format!(
            "{{\"svg_code\": \"<svg viewBox='0 0 800 400' xmlns='http://www.w3.org/2000/svg'>{}</svg>\"}}",
            "<rect width='10' height='10'/>".repeat(5)
        );
        assert!(parse_svg(&good).is_ok());

        let short = "{\"svg_code\": \"<svg></svg>\"}";
        assert_eq!(parse_svg(short).unwrap_err().failure_kind(), Some(FailureKind::Schema));

        let unclosed = format!("{{\"svg_code\": \"<svg viewBox='0 0 800 400'>{}\"}}", "x".repeat(120));
        assert_eq!(parse_svg(&unclosed).unwrap_err().failure_kind(), Some(FailureKind::Schema));
    }
}
