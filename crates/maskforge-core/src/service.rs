//! Wire format of the remote image generation service.
//!
//! The engine never performs network I/O itself. This module builds
//! request payloads and parses response bodies; an
//! [`ImageGenerationService`] implementation outside the core supplies
//! the transport.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Model identifier sent with every request.
pub const MODEL: &str = "V_2";

/// Default remix image weight.
pub const DEFAULT_IMAGE_WEIGHT: u8 = 50;

/// Output aspect ratio understood by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    /// Square.
    #[default]
    #[serde(rename = "ASPECT_1_1")]
    Square,
    /// Landscape banner.
    #[serde(rename = "ASPECT_16_9")]
    Wide,
    /// Portrait.
    #[serde(rename = "ASPECT_10_16")]
    Tall,
}

impl AspectRatio {
    /// All supported ratios.
    pub const ALL: [Self; 3] = [Self::Square, Self::Wide, Self::Tall];

    /// Identifier used on the wire, e.g. `ASPECT_16_9`.
    #[must_use]
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::Square => "ASPECT_1_1",
            Self::Wide => "ASPECT_16_9",
            Self::Tall => "ASPECT_10_16",
        }
    }

    /// Parse a wire identifier or a human `w:h` label.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|r| r.wire_name() == value || r.to_string() == value)
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Square => "1:1",
            Self::Wide => "16:9",
            Self::Tall => "10:16",
        })
    }
}

/// Failures of a remote generation call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum GenerationError {
    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(String),

    /// The service answered with a non-success status.
    #[error("service returned status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// The response parsed but contained no images.
    #[error("no image data received from the generation service")]
    EmptyResult,

    /// The response body was not the expected JSON.
    #[error("malformed service response: {0}")]
    Malformed(String),
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    prompt: &'a str,
    aspect_ratio: AspectRatio,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_weight: Option<u8>,
    model: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_images: Option<u8>,
    magic_prompt_option: MagicPrompt,
}

#[derive(Serialize)]
struct Envelope<'a> {
    image_request: ImageRequest<'a>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "UPPERCASE")]
enum MagicPrompt {
    Auto,
    Off,
}

impl MagicPrompt {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "AUTO",
            Self::Off => "OFF",
        }
    }
}

/// Text-to-image request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// What to draw.
    pub prompt: String,
    /// Output shape.
    pub aspect_ratio: AspectRatio,
}

impl GenerateRequest {
    /// JSON request body.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::Malformed`] if serialization fails.
    pub fn to_json(&self) -> Result<String, GenerationError> {
        let body = Envelope {
            image_request: ImageRequest {
                prompt: &self.prompt,
                aspect_ratio: self.aspect_ratio,
                image_weight: None,
                model: MODEL,
                num_images: Some(1),
                magic_prompt_option: MagicPrompt::Auto,
            },
        };
        serde_json::to_string(&body).map_err(|e| GenerationError::Malformed(e.to_string()))
    }
}

/// Value of one multipart form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Plain text.
    Text(String),
    /// Inline binary content.
    Blob {
        /// File content.
        bytes: Vec<u8>,
        /// MIME type of `bytes`.
        mime_type: &'static str,
    },
    /// An image the transport must download and attach as a file.
    RemoteImage(String),
}

/// One named multipart form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    /// Field name.
    pub name: &'static str,
    /// Field content.
    pub value: FieldValue,
}

impl FormField {
    fn text(name: &'static str, value: impl Into<String>) -> Self {
        Self {
            name,
            value: FieldValue::Text(value.into()),
        }
    }
}

/// Masked inpainting request.
///
/// Opaque black mask pixels are regenerated; opaque white ones are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditRequest {
    /// Location of the image being edited.
    pub image_url: String,
    /// PNG-encoded mask with the image's dimensions.
    pub mask_png: Vec<u8>,
    /// What to paint into the masked region.
    pub prompt: String,
}

impl EditRequest {
    /// Multipart form fields, in submission order.
    #[must_use]
    pub fn form_fields(&self) -> Vec<FormField> {
        vec![
            FormField {
                name: "image_file",
                value: FieldValue::RemoteImage(self.image_url.clone()),
            },
            FormField {
                name: "mask",
                value: FieldValue::Blob {
                    bytes: self.mask_png.clone(),
                    mime_type: "image/png",
                },
            },
            FormField::text("prompt", self.prompt.clone()),
            FormField::text("model", MODEL),
            FormField::text("magic_prompt_option", MagicPrompt::Off.as_str()),
            FormField::text("num_images", "1"),
        ]
    }
}

/// Image-to-image variation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemixRequest {
    /// Location of the image to vary.
    pub image_url: String,
    /// Guidance for the variation.
    pub prompt: String,
    /// Output shape.
    pub aspect_ratio: AspectRatio,
    /// How strongly the source image constrains the output, `1..=100`.
    pub image_weight: u8,
}

impl RemixRequest {
    /// Build a request with the default image weight.
    #[must_use]
    pub fn new(image_url: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            image_url: image_url.into(),
            prompt: prompt.into(),
            aspect_ratio: AspectRatio::default(),
            image_weight: DEFAULT_IMAGE_WEIGHT,
        }
    }

    /// Multipart form fields: the JSON `image_request` and the source
    /// image.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::Malformed`] if the weight is outside
    /// `1..=100` or serialization fails.
    pub fn form_fields(&self) -> Result<Vec<FormField>, GenerationError> {
        if !(1..=100).contains(&self.image_weight) {
            return Err(GenerationError::Malformed(format!(
                "image weight must be in 1..=100, got {}",
                self.image_weight
            )));
        }
        let request = ImageRequest {
            prompt: &self.prompt,
            aspect_ratio: self.aspect_ratio,
            image_weight: Some(self.image_weight),
            model: MODEL,
            num_images: None,
            magic_prompt_option: MagicPrompt::Off,
        };
        let json =
            serde_json::to_string(&request).map_err(|e| GenerationError::Malformed(e.to_string()))?;
        Ok(vec![
            FormField::text("image_request", json),
            FormField {
                name: "image_file",
                value: FieldValue::RemoteImage(self.image_url.clone()),
            },
        ])
    }
}

/// One generated image in a service response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedImage {
    /// Where the image can be downloaded.
    pub url: String,
    /// Prompt as rewritten by the service, if reported.
    #[serde(default)]
    pub prompt: Option<String>,
    /// Output resolution such as `1024x1024`, if reported.
    #[serde(default)]
    pub resolution: Option<String>,
}

#[derive(Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<GeneratedImage>,
}

/// Parse a generate, edit or remix response body.
///
/// # Errors
///
/// Returns [`GenerationError::Malformed`] for invalid JSON and
/// [`GenerationError::EmptyResult`] when `data` is missing or empty.
pub fn parse_image_response(body: &str) -> Result<Vec<GeneratedImage>, GenerationError> {
    let response: ImageResponse =
        serde_json::from_str(body).map_err(|e| GenerationError::Malformed(e.to_string()))?;
    if response.data.is_empty() {
        return Err(GenerationError::EmptyResult);
    }
    Ok(response.data)
}

/// The remote generation collaborator.
///
/// Implementations own the transport and credentials. Edit sessions
/// await it across the single finalize suspension point.
#[allow(async_fn_in_trait)]
pub trait ImageGenerationService {
    /// Generate an image from a prompt, returning its URL.
    async fn generate(&self, request: &GenerateRequest) -> Result<String, GenerationError>;

    /// Inpaint the masked region of an image, returning the result URL.
    async fn edit(&self, request: &EditRequest) -> Result<String, GenerationError>;

    /// Produce variations of an image, returning their URLs.
    async fn remix(&self, request: &RemixRequest) -> Result<Vec<String>, GenerationError>;
}
