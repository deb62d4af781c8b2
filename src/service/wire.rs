//! JSON shapes for the `generateContent` endpoint.

use serde::{Deserialize, Serialize};

use crate::image_data::ImageBlob;

use super::{OutputPart, ServiceError};

const TRANSLATION_INSTRUCTION: &str = "Translate the following Chinese text to English. Only return the translated English text, without any introductory phrases or explanations. Chinese text:";
const MODALITY_IMAGE: &str = "IMAGE";
const MODALITY_TEXT: &str = "TEXT";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentRequest {
    pub(crate) contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) role: Option<String>,
    #[serde(default)]
    pub(crate) parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) inline_data: Option<InlineData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InlineData {
    pub(crate) mime_type: String,
    pub(crate) data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerationConfig {
    pub(crate) response_modalities: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentResponse {
    #[serde(default)]
    pub(crate) candidates: Vec<Candidate>,
    #[serde(default)]
    pub(crate) prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Candidate {
    #[serde(default)]
    pub(crate) content: Option<Content>,
    #[serde(default)]
    pub(crate) finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PromptFeedback {
    #[serde(default)]
    pub(crate) block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    fn image(image: &ImageBlob) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: image.mime_type().to_string(),
                data: image.base64_payload().to_string(),
            }),
        }
    }
}

pub(crate) fn translation_request(text: &str) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![Part::text(format!("{TRANSLATION_INSTRUCTION} \"{text}\""))],
        }],
        generation_config: None,
    }
}

pub(crate) fn edit_request(
    user_image: &ImageBlob,
    reference_image: &ImageBlob,
    prompt: &str,
) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![
                Part::image(user_image),
                Part::image(reference_image),
                Part::text(prompt),
            ],
        }],
        generation_config: Some(GenerationConfig {
            response_modalities: vec![MODALITY_IMAGE.to_string(), MODALITY_TEXT.to_string()],
        }),
    }
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate.
    pub(crate) fn text(&self) -> Option<String> {
        let text: String = self
            .first_parts()
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect();
        Some(text).filter(|text| !text.trim().is_empty())
    }

    pub(crate) fn into_output_parts(self) -> Result<Vec<OutputPart>, ServiceError> {
        if let Some(reason) = self
            .prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.block_reason.clone())
        {
            return Err(ServiceError::Blocked { reason });
        }

        let mut output = Vec::new();
        for part in self.first_parts() {
            if let Some(inline) = &part.inline_data {
                let image = ImageBlob::from_base64(&inline.mime_type, &inline.data)?;
                output.push(OutputPart::Image(image));
            } else if let Some(text) = part.text.as_ref().filter(|text| !text.is_empty()) {
                output.push(OutputPart::Text(text.clone()));
            }
        }
        Ok(output)
    }

    fn first_parts(&self) -> &[Part] {
        self.candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(|content| content.parts.as_slice())
            .unwrap_or_default()
    }
}

/// Pulls a human-readable message out of an error response body.
pub(crate) fn api_error_message(body: &str) -> Option<String> {
    let envelope: ApiErrorEnvelope = serde_json::from_str(body).ok()?;
    envelope
        .error
        .message
        .filter(|message| !message.is_empty())
        .or(envelope.error.status)
}
