use std::fmt;
use std::path::Path;

use base64::{engine::general_purpose, Engine as _};
use image::ImageFormat;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

const DATA_URI_SCHEME: &str = "data:";
const BASE64_MARKER: &str = ";base64,";
const IMAGE_MIME_PREFIX: &str = "image/";
pub const SVG_MIME_TYPE: &str = "image/svg+xml";

pub const DEFAULT_MAX_IMAGE_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImageDataError {
    #[error("invalid image data URI")]
    InvalidDataUri,
    #[error("unsupported mime type: {mime_type}")]
    UnsupportedMimeType { mime_type: String },
    #[error("image payload is empty")]
    EmptyPayload,
    #[error("unrecognized image format")]
    UnknownFormat,
    #[error("image is {size} bytes, limit is {limit} bytes")]
    TooLarge { size: usize, limit: usize },
    #[error("invalid base64 payload: {message}")]
    InvalidBase64 { message: String },
    #[error("failed to read image file {path}: {message}")]
    ReadFailed { path: String, message: String },
}

/// Image bytes tagged with their mime type, kept in base64 form.
///
/// The payload is stored exactly as received so a blob serializes back to the
/// same `data:` URI it was parsed from.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageBlob {
    mime_type: String,
    payload: String,
}

impl ImageBlob {
    pub fn parse(data_uri: &str) -> Result<Self, ImageDataError> {
        let rest = data_uri
            .strip_prefix(DATA_URI_SCHEME)
            .ok_or(ImageDataError::InvalidDataUri)?;
        let (mime_type, payload) = rest
            .split_once(BASE64_MARKER)
            .ok_or(ImageDataError::InvalidDataUri)?;
        Self::from_base64(mime_type, payload)
    }

    /// Wraps an already base64-encoded payload, e.g. inline data from an API.
    pub fn from_base64(mime_type: &str, payload: &str) -> Result<Self, ImageDataError> {
        validate_mime_type(mime_type)?;
        if payload.is_empty() {
            return Err(ImageDataError::EmptyPayload);
        }

        Ok(Self {
            mime_type: mime_type.to_string(),
            payload: payload.to_string(),
        })
    }

    /// Encodes bytes whose mime type is already known.
    pub fn encode(mime_type: &str, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            payload: general_purpose::STANDARD.encode(bytes),
        }
    }

    /// Encodes raw bytes, sniffing the mime type from the content.
    pub fn from_bytes(bytes: &[u8], max_bytes: usize) -> Result<Self, ImageDataError> {
        if bytes.is_empty() {
            return Err(ImageDataError::EmptyPayload);
        }
        if bytes.len() > max_bytes {
            return Err(ImageDataError::TooLarge {
                size: bytes.len(),
                limit: max_bytes,
            });
        }
        let mime_type = sniff_mime_type(bytes)?;
        Ok(Self {
            mime_type,
            payload: general_purpose::STANDARD.encode(bytes),
        })
    }

    pub fn from_file(path: &Path, max_bytes: usize) -> Result<Self, ImageDataError> {
        let read_failed = |err: std::io::Error| ImageDataError::ReadFailed {
            path: path.display().to_string(),
            message: err.to_string(),
        };
        let size = std::fs::metadata(path).map_err(read_failed)?.len();
        let size = usize::try_from(size).unwrap_or(usize::MAX);
        if size > max_bytes {
            return Err(ImageDataError::TooLarge {
                size,
                limit: max_bytes,
            });
        }
        let bytes = std::fs::read(path).map_err(read_failed)?;
        Self::from_bytes(&bytes, max_bytes)
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn base64_payload(&self) -> &str {
        &self.payload
    }

    pub fn to_data_uri(&self) -> String {
        format!(
            "{DATA_URI_SCHEME}{}{BASE64_MARKER}{}",
            self.mime_type, self.payload
        )
    }

    pub fn decode(&self) -> Result<Vec<u8>, ImageDataError> {
        general_purpose::STANDARD
            .decode(self.payload.as_bytes())
            .map_err(|err| ImageDataError::InvalidBase64 {
                message: err.to_string(),
            })
    }

    /// Approximate decoded size, without decoding.
    pub fn approx_decoded_len(&self) -> usize {
        self.payload.len() / 4 * 3
    }

    pub fn file_extension(&self) -> &'static str {
        if self.mime_type == SVG_MIME_TYPE {
            return "svg";
        }
        ImageFormat::from_mime_type(&self.mime_type)
            .and_then(|format| format.extensions_str().first().copied())
            .unwrap_or("img")
    }
}

impl fmt::Debug for ImageBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageBlob")
            .field("mime_type", &self.mime_type)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

impl Serialize for ImageBlob {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_data_uri())
    }
}

impl<'de> Deserialize<'de> for ImageBlob {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

fn validate_mime_type(mime_type: &str) -> Result<(), ImageDataError> {
    let valid = mime_type
        .strip_prefix(IMAGE_MIME_PREFIX)
        .is_some_and(|subtype| {
            !subtype.is_empty()
                && subtype
                    .chars()
                    .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '+' | '-'))
        });
    if valid {
        Ok(())
    } else {
        Err(ImageDataError::UnsupportedMimeType {
            mime_type: mime_type.to_string(),
        })
    }
}

fn sniff_mime_type(bytes: &[u8]) -> Result<String, ImageDataError> {
    if let Ok(format) = image::guess_format(bytes) {
        return Ok(format.to_mime_type().to_string());
    }
    if looks_like_svg(bytes) {
        return Ok(SVG_MIME_TYPE.to_string());
    }
    Err(ImageDataError::UnknownFormat)
}

fn looks_like_svg(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(256)];
    let Ok(text) = std::str::from_utf8(head) else {
        return false;
    };
    let text = text.trim_start();
    text.starts_with("<svg") || (text.starts_with("<?xml") && text.contains("<svg"))
}
