use std::time::Duration;

/// Connection settings for the LLM provider, built once in main and handed to
/// the client explicitly instead of reading env vars at call sites.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub request_timeout: Duration,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        let api_key = std::env::var("OPENROUTER_API_KEY").unwrap_or_else(|_| "DEMO_KEY".into());
        let base_url = std::env::var("OPENROUTER_API_BASE")
            .unwrap_or_else(|_| "https://openrouter.ai/api/v1".to_string());
        let model = std::env::var("LLM_MODEL")
            .unwrap_or_else(|_| "anthropic/claude-sonnet-4".to_string());
        let timeout_secs: u64 = std::env::var("LLM_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);
        Self {
            api_key,
            base_url,
            model,
            request_timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn is_demo(&self) -> bool {
        self.api_key == "DEMO_KEY"
    }
}

/// Pipeline behavior knobs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// When false the content stage completes the record directly and no SVG
    /// diagram is generated.
    pub svg_stage: bool,
    /// Total attempts (first run included) the HTTP edge spends on a record
    /// before surfacing a terminal failure. Only transient failures re-drive.
    pub max_attempts: u32,
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let svg_stage = std::env::var("SVG_STAGE")
            .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
            .unwrap_or(true);
        let max_attempts: u32 = std::env::var("MAX_GENERATION_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3);
        Self { svg_stage, max_attempts: max_attempts.max(1) }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { svg_stage: true, max_attempts: 3 }
    }
}
