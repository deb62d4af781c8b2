use thiserror::Error;

use crate::image_data::{ImageBlob, ImageDataError};

mod gemini;
mod wire;

pub use gemini::{GeminiBackend, GeminiOptions};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("API key is not set")]
    MissingApiKey,
    #[error("request timed out after {seconds}s")]
    Timeout { seconds: u64 },
    #[error("remote API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("request was blocked: {reason}")]
    Blocked { reason: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("invalid image data: {0}")]
    InvalidImage(#[from] ImageDataError),
    #[error("translation returned no text")]
    EmptyTranslation,
    #[error("model returned no image")]
    NoImage { text: Option<String> },
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditedImage {
    pub image: ImageBlob,
    pub text: Option<String>,
}

/// The single operation the controller sees.
///
/// Implementations report every failure as `Err`; they never panic on a
/// remote fault.
pub trait EditService: Send + Sync {
    fn edit_image(
        &self,
        user_image: &ImageBlob,
        reference_image: &ImageBlob,
        prompt: &str,
    ) -> ServiceResult<EditedImage>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputPart {
    Image(ImageBlob),
    Text(String),
}

/// Raw remote calls composed by [`EditPipeline`].
pub trait GenerativeBackend: Send + Sync {
    fn translate(&self, text: &str) -> ServiceResult<String>;
    fn generate_edit(
        &self,
        user_image: &ImageBlob,
        reference_image: &ImageBlob,
        prompt: &str,
    ) -> ServiceResult<Vec<OutputPart>>;
}

/// Outcome of the prompt preparation step.
#[derive(Debug)]
pub enum PromptStage {
    Translated(String),
    Untranslated(String),
    /// Translation failed; the original text is used as-is.
    Fallback { original: String, reason: ServiceError },
}

impl PromptStage {
    pub fn text(&self) -> &str {
        match self {
            PromptStage::Translated(text) | PromptStage::Untranslated(text) => text,
            PromptStage::Fallback { original, .. } => original,
        }
    }
}

/// Translate-then-edit pipeline.
#[derive(Debug)]
pub struct EditPipeline<B> {
    backend: B,
    translate_prompts: bool,
}

impl<B: GenerativeBackend> EditPipeline<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            translate_prompts: true,
        }
    }

    pub fn with_translation(mut self, enabled: bool) -> Self {
        self.translate_prompts = enabled;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn prepare_prompt(&self, prompt: &str) -> PromptStage {
        if !self.translate_prompts {
            return PromptStage::Untranslated(prompt.to_string());
        }

        let translated = self
            .backend
            .translate(prompt)
            .and_then(|text| {
                let text = text.trim();
                if text.is_empty() {
                    Err(ServiceError::EmptyTranslation)
                } else {
                    Ok(text.to_string())
                }
            });
        match translated {
            Ok(text) => {
                tracing::debug!(chars = text.chars().count(), "prompt translated");
                PromptStage::Translated(text)
            }
            Err(reason) => {
                tracing::warn!(%reason, "prompt translation failed; using original text");
                PromptStage::Fallback {
                    original: prompt.to_string(),
                    reason,
                }
            }
        }
    }
}

impl<B: GenerativeBackend> EditService for EditPipeline<B> {
    fn edit_image(
        &self,
        user_image: &ImageBlob,
        reference_image: &ImageBlob,
        prompt: &str,
    ) -> ServiceResult<EditedImage> {
        let stage = self.prepare_prompt(prompt);
        let parts = self
            .backend
            .generate_edit(user_image, reference_image, stage.text())
            .inspect_err(|err| tracing::error!(%err, "image edit request failed"))?;
        collect_edit(parts)
    }
}

/// The last image part wins, as does the last text part.
fn collect_edit(parts: Vec<OutputPart>) -> ServiceResult<EditedImage> {
    let mut image = None;
    let mut text = None;
    for part in parts {
        match part {
            OutputPart::Image(blob) => image = Some(blob),
            OutputPart::Text(value) => text = Some(value),
        }
    }

    match image {
        Some(image) => Ok(EditedImage { image, text }),
        None => {
            tracing::warn!(has_text = text.is_some(), "model response carried no image");
            Err(ServiceError::NoImage { text })
        }
    }
}
