//! Reasoning-service stages
//!
//! Each stage wraps one completion call: build the prompt, call the
//! provider, parse the response against a strict schema, and map provider
//! failures into the pipeline error taxonomy.

pub mod patterns;
pub mod report;
pub mod scenarios;

pub use patterns::PatternRecognizer;
pub use report::{assemble_report, ReportDraft, ReportSynthesizer};
pub use scenarios::ScenarioAnalyst;

use chart_core::AnalysisError;
use chart_llm::LLMError;

/// Map a provider failure to the pipeline taxonomy for a named stage.
///
/// Transient failures land in the retryable variants; permanent ones
/// (bad credentials, unknown model, invalid request) must not, or the
/// retry loop would burn its budget resending a request that cannot
/// succeed.
pub(crate) fn map_llm_error(stage: &str, err: LLMError) -> AnalysisError {
    match err {
        LLMError::RateLimitExceeded(_) => AnalysisError::RateLimited {
            provider: stage.to_string(),
        },
        other if other.is_retryable() => AnalysisError::UpstreamUnavailable {
            stage: stage.to_string(),
            reason: other.to_string(),
        },
        other => AnalysisError::Other(format!("provider error in {stage} stage: {other}")),
    }
}

/// Pull the JSON object out of a model reply.
///
/// Models occasionally wrap JSON in code fences or prose despite the
/// instructions; everything outside the outermost braces is discarded.
pub(crate) fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Parse error for a stage's response schema
pub(crate) fn malformed(stage: &str, reason: impl std::fmt::Display) -> AnalysisError {
    AnalysisError::MalformedUpstreamResponse {
        stage: stage.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_plain() {
        assert_eq!(extract_json(r#"{"a": 1}"#), Some(r#"{"a": 1}"#));
    }

    #[test]
    fn test_extract_json_fenced() {
        let text = "Here you go:\n```json\n{\"a\": 1}\n```\nanything else";
        assert_eq!(extract_json(text), Some("{\"a\": 1}"));
    }

    #[test]
    fn test_extract_json_none() {
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("} backwards {"), None);
    }

    #[test]
    fn test_map_rate_limit() {
        let err = map_llm_error("patterns", LLMError::RateLimitExceeded("429".to_string()));
        assert!(matches!(err, AnalysisError::RateLimited { .. }));
    }

    #[test]
    fn test_map_transient_vs_permanent_failures() {
        let err = map_llm_error("patterns", LLMError::RequestFailed("503".to_string()));
        assert!(matches!(err, AnalysisError::UpstreamUnavailable { .. }));

        // a bad key or unknown model never improves on resend
        let err = map_llm_error("patterns", LLMError::AuthenticationFailed);
        assert!(matches!(err, AnalysisError::Other(_)));
        let err = map_llm_error("scenarios", LLMError::ModelNotFound("x".to_string()));
        assert!(matches!(err, AnalysisError::Other(_)));
    }
}
