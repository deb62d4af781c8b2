use std::time::Duration;

use reqwest::blocking::Client;

use crate::config::{AppConfig, DEFAULT_API_BASE_URL, DEFAULT_EDIT_MODEL, DEFAULT_TRANSLATE_MODEL};
use crate::image_data::ImageBlob;

use super::wire::{self, GenerateContentRequest, GenerateContentResponse};
use super::{GenerativeBackend, OutputPart, ServiceError, ServiceResult};

const API_KEY_HEADER: &str = "x-goog-api-key";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiOptions {
    pub api_key: Option<String>,
    pub base_url: String,
    pub translate_model: String,
    pub edit_model: String,
    pub timeout: Duration,
}

impl Default for GeminiOptions {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_API_BASE_URL.to_string(),
            translate_model: DEFAULT_TRANSLATE_MODEL.to_string(),
            edit_model: DEFAULT_EDIT_MODEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl GeminiOptions {
    pub(crate) fn from_config(config: &AppConfig) -> Self {
        Self {
            api_key: config.resolved_api_key(),
            base_url: config.api_base_url().to_string(),
            translate_model: config.translate_model().to_string(),
            edit_model: config.edit_model().to_string(),
            timeout: config.request_timeout(),
        }
    }
}

/// Blocking client for the Gemini `generateContent` REST endpoint.
///
/// Calls block the current thread for up to the configured timeout; run them
/// off the UI thread.
#[derive(Debug, Clone)]
pub struct GeminiBackend {
    client: Client,
    options: GeminiOptions,
}

impl GeminiBackend {
    pub fn new(options: GeminiOptions) -> ServiceResult<Self> {
        let client = Client::builder()
            .timeout(options.timeout)
            .user_agent(concat!("nano-imager/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| ServiceError::Transport(format!("failed to build HTTP client: {err}")))?;
        if options.api_key.is_none() {
            tracing::warn!("no Gemini API key configured; edits will fail until one is set");
        }
        Ok(Self { client, options })
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{model}:generateContent",
            self.options.base_url.trim_end_matches('/')
        )
    }

    fn generate(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> ServiceResult<GenerateContentResponse> {
        let api_key = self
            .options
            .api_key
            .as_deref()
            .ok_or(ServiceError::MissingApiKey)?;
        let url = self.endpoint(model);
        tracing::debug!(model, "sending generateContent request");

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, api_key)
            .json(request)
            .send()
            .map_err(|err| self.map_transport_error(err))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|err| self.map_transport_error(err))?;

        if !status.is_success() {
            let message = wire::api_error_message(&body).unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string()
            });
            tracing::warn!(model, status = status.as_u16(), %message, "generateContent rejected");
            return Err(ServiceError::Api {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|err| ServiceError::Decode(err.to_string()))
    }

    fn map_transport_error(&self, err: reqwest::Error) -> ServiceError {
        if err.is_timeout() {
            ServiceError::Timeout {
                seconds: self.options.timeout.as_secs(),
            }
        } else {
            ServiceError::Transport(err.to_string())
        }
    }
}

impl GenerativeBackend for GeminiBackend {
    fn translate(&self, text: &str) -> ServiceResult<String> {
        let response = self.generate(
            &self.options.translate_model,
            &wire::translation_request(text),
        )?;
        response.text().ok_or(ServiceError::EmptyTranslation)
    }

    fn generate_edit(
        &self,
        user_image: &ImageBlob,
        reference_image: &ImageBlob,
        prompt: &str,
    ) -> ServiceResult<Vec<OutputPart>> {
        let request = wire::edit_request(user_image, reference_image, prompt);
        let response = self.generate(&self.options.edit_model, &request)?;
        if let Some(reason) = response
            .candidates
            .first()
            .and_then(|candidate| candidate.finish_reason.as_deref())
        {
            tracing::debug!(finish_reason = reason, "edit candidate finished");
        }
        response.into_output_parts()
    }
}
