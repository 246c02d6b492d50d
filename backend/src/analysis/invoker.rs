use common_types::AnalysisResult;
use tracing::instrument;

use super::prompt::{RESPONSE_MIME_TYPE, SYSTEM_INSTRUCTION, TEMPERATURE, USER_PROMPT};
use super::response_text::normalize_response_text;
use super::{AnalysisError, PipelineResult};
use crate::gemini_api::{
    Content, FileReference, GenerateContentRequest, GenerateContentResponse, GenerationConfig,
    GenerativeApi, Part,
};

/// Finish reasons meaning the vendor refused to answer
const REJECTED_FINISH_REASONS: [&str; 6] = [
    "SAFETY",
    "OTHER",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
    "RECITATION",
];

/// Request for one analysis of `file`
#[must_use]
pub fn build_request(file: &FileReference) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![Part::file(file), Part::text(USER_PROMPT)],
        }],
        system_instruction: Some(Content {
            role: None,
            parts: vec![Part::text(SYSTEM_INSTRUCTION)],
        }),
        generation_config: GenerationConfig {
            temperature: TEMPERATURE,
            response_mime_type: Some(RESPONSE_MIME_TYPE.to_string()),
        },
    }
}

/// Returns the candidate text unless the vendor refused
///
/// # Errors
///
/// Returns `AnalysisError::ContentRejected` with the internal reason code
pub fn ensure_accepted(response: &GenerateContentResponse) -> PipelineResult<String> {
    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|feedback| feedback.block_reason.as_deref())
    {
        tracing::warn!(reason, "Prompt blocked by vendor");
        return Err(AnalysisError::ContentRejected(reason.to_string()));
    }

    let Some(candidate) = response.candidates.first() else {
        tracing::warn!("Vendor returned no candidate");
        return Err(AnalysisError::ContentRejected("NO_CANDIDATE".to_string()));
    };

    if let Some(reason) = candidate
        .finish_reason
        .as_deref()
        .filter(|reason| REJECTED_FINISH_REASONS.contains(reason))
    {
        tracing::warn!(reason, "Vendor stopped generation");
        return Err(AnalysisError::ContentRejected(reason.to_string()));
    }

    Ok(candidate.text())
}

/// Parses vendor text into a result
///
/// # Errors
///
/// Returns `AnalysisError::MalformedResponse` if the text is not a complete
/// result or a percentage is outside 0-100
pub fn parse_analysis(text: &str) -> PipelineResult<AnalysisResult> {
    let result: AnalysisResult = serde_json::from_str(normalize_response_text(text))
        .map_err(|e| AnalysisError::MalformedResponse(e.to_string()))?;

    result
        .check_ranges()
        .map_err(|e| AnalysisError::MalformedResponse(e.to_string()))?;

    Ok(result)
}

/// Runs the analysis on an active file; exactly one vendor call
///
/// # Errors
///
/// Returns `AnalysisError::Upstream` on transport failure, otherwise see
/// [`ensure_accepted`] and [`parse_analysis`]
#[instrument(skip_all, fields(uri = %file.uri))]
pub async fn invoke(api: &dyn GenerativeApi, file: &FileReference) -> PipelineResult<AnalysisResult> {
    let response = api
        .generate_content(&build_request(file))
        .await
        .map_err(AnalysisError::upstream)?;

    let text = ensure_accepted(&response)?;
    parse_analysis(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini_api::mock::{analysis_json, MockGenerativeApi};
    use crate::gemini_api::PromptFeedback;

    fn reference() -> FileReference {
        FileReference {
            uri: "https://generativelanguage.test/v1beta/files/abc".to_string(),
            mime_type: "video/mp4".to_string(),
        }
    }

    #[test]
    fn test_request_carries_prompt_and_config() {
        let request = build_request(&reference());

        assert!((request.generation_config.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(
            request.generation_config.response_mime_type.as_deref(),
            Some("application/json")
        );
        let parts = &request.contents[0].parts;
        assert_eq!(
            parts[0].file_data.as_ref().unwrap().file_uri,
            reference().uri
        );
        assert_eq!(parts[1].text.as_deref(), Some(USER_PROMPT));
        assert!(request.system_instruction.is_some());
    }

    #[test]
    fn test_fenced_and_bare_json_parse_identically() {
        let bare = analysis_json(10, 20, 15, 90);
        let fenced = format!("```json\n{bare}\n```");

        let a = parse_analysis(&bare).unwrap();
        let b = parse_analysis(&fenced).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.velo_palato.obstrucao_percentual, 10);
        assert_eq!(a.nivel_confianca, 90);
    }

    #[test]
    fn test_missing_field_is_malformed() {
        let err = parse_analysis(r#"{"nivel_confianca": 90}"#).unwrap_err();
        assert!(matches!(err, AnalysisError::MalformedResponse(_)));

        let err = parse_analysis("I cannot analyze this video").unwrap_err();
        assert!(matches!(err, AnalysisError::MalformedResponse(_)));
    }

    #[test]
    fn test_out_of_range_percentage_is_malformed() {
        let err = parse_analysis(&analysis_json(10, 140, 15, 90)).unwrap_err();
        assert!(matches!(err, AnalysisError::MalformedResponse(msg) if msg.contains("orofaringe")));

        let err = parse_analysis(&analysis_json(10, 20, 15, -1)).unwrap_err();
        assert!(matches!(err, AnalysisError::MalformedResponse(_)));
    }

    #[test]
    fn test_no_candidate_is_rejected() {
        let err = ensure_accepted(&GenerateContentResponse::default()).unwrap_err();
        assert!(matches!(err, AnalysisError::ContentRejected(_)));
    }

    #[test]
    fn test_rejected_finish_reasons() {
        for reason in REJECTED_FINISH_REASONS {
            let response = GenerateContentResponse::from_text("{}", reason);
            let err = ensure_accepted(&response).unwrap_err();
            assert!(matches!(err, AnalysisError::ContentRejected(r) if r == reason));
        }

        let response = GenerateContentResponse::from_text("ok", "STOP");
        assert_eq!(ensure_accepted(&response).unwrap(), "ok");
    }

    #[test]
    fn test_block_reason_is_rejected() {
        let response = GenerateContentResponse {
            prompt_feedback: Some(PromptFeedback {
                block_reason: Some("SAFETY".to_string()),
            }),
            ..GenerateContentResponse::default()
        };
        assert!(matches!(
            ensure_accepted(&response),
            Err(AnalysisError::ContentRejected(_))
        ));
    }

    #[tokio::test]
    async fn test_invoke_makes_exactly_one_call() {
        let api = MockGenerativeApi::new();

        let result = invoke(&api, &reference()).await.unwrap();

        assert_eq!(api.generate_calls(), 1);
        assert_eq!(result.orofaringe.obstrucao_percentual, 20);
    }

    #[tokio::test]
    async fn test_invoke_does_not_retry_transport_errors() {
        let api = MockGenerativeApi::new().with_generate_error("connection reset");

        let err = invoke(&api, &reference()).await.unwrap_err();

        assert!(matches!(err, AnalysisError::Upstream(_)));
        assert_eq!(api.generate_calls(), 1);
    }
}
