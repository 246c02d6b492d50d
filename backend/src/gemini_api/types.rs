//! Wire types of the Gemini file and `generateContent` REST endpoints

use serde::{Deserialize, Serialize};

/// Processing state of an uploaded file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteFileState {
    /// Still being processed by the vendor
    #[default]
    #[serde(alias = "PROCESSING", alias = "STATE_UNSPECIFIED")]
    Pending,
    /// Ready to be referenced in a prompt
    Active,
    /// Processing failed, the file is unusable
    Failed,
}

/// File handle returned by the vendor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    /// Resource name, `files/<id>`
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub state: RemoteFileState,
}

impl RemoteFile {
    #[must_use]
    pub fn reference(&self) -> FileReference {
        FileReference {
            uri: self.uri.clone(),
            mime_type: self.mime_type.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct UploadFileResponse {
    pub file: RemoteFile,
}

/// Media reference usable in a prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReference {
    pub uri: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    pub mime_type: String,
    pub file_uri: String,
}

/// One part of a message: either text or a file reference
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_data: Option<FileData>,
}

impl Part {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            file_data: None,
        }
    }

    #[must_use]
    pub fn file(reference: &FileReference) -> Self {
        Self {
            text: None,
            file_data: Some(FileData {
                mime_type: reference.mime_type.clone(),
                file_uri: reference.uri.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

impl Candidate {
    /// Concatenated text of every part
    #[must_use]
    pub fn text(&self) -> String {
        self.content
            .iter()
            .flat_map(|content| content.parts.iter())
            .filter_map(|part| part.text.as_deref())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

impl GenerateContentResponse {
    /// Response with a single candidate carrying `text`
    #[must_use]
    pub fn from_text(text: impl Into<String>, finish_reason: &str) -> Self {
        Self {
            candidates: vec![Candidate {
                content: Some(Content {
                    role: Some("model".to_string()),
                    parts: vec![Part::text(text)],
                }),
                finish_reason: Some(finish_reason.to_string()),
            }],
            prompt_feedback: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processing_state_maps_to_pending() {
        let file: RemoteFile = serde_json::from_str(
            r#"{"name":"files/abc","mimeType":"video/mp4","uri":"https://x/files/abc","state":"PROCESSING"}"#,
        )
        .unwrap();
        assert_eq!(file.state, RemoteFileState::Pending);

        let file: RemoteFile =
            serde_json::from_str(r#"{"name":"files/abc","state":"ACTIVE"}"#).unwrap();
        assert_eq!(file.state, RemoteFileState::Active);
    }

    #[test]
    fn test_request_serializes_vendor_field_names() {
        let reference = FileReference {
            uri: "https://x/files/abc".to_string(),
            mime_type: "video/mp4".to_string(),
        };
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part::file(&reference), Part::text("analise")],
            }],
            system_instruction: None,
            generation_config: GenerationConfig {
                temperature: 0.2,
                response_mime_type: Some("application/json".to_string()),
            },
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json["contents"][0]["parts"][0]["fileData"]["fileUri"],
            "https://x/files/abc"
        );
        assert_eq!(json["contents"][0]["parts"][1]["text"], "analise");
        assert_eq!(
            json["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert!(json.get("systemInstruction").is_none());
    }

    #[test]
    fn test_candidate_text_joins_parts() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"{\"a\":"},{"text":"1}"}]},"finishReason":"STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(response.candidates[0].text(), "{\"a\":1}");
    }
}
