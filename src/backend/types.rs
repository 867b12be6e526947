// Request/response types shared by every generative backend
//
// These are provider-agnostic: each backend implementation maps them onto
// its own wire format.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An image handed to or returned from a backend.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageData {
    pub bytes: Vec<u8>,
    /// e.g. "image/png"
    pub media_type: String,
}

impl ImageData {
    pub fn new(bytes: Vec<u8>, media_type: impl Into<String>) -> Self {
        Self {
            bytes,
            media_type: media_type.into(),
        }
    }

    pub fn png(bytes: Vec<u8>) -> Self {
        Self::new(bytes, "image/png")
    }

    /// File extension matching the media type.
    pub fn extension(&self) -> &'static str {
        match self.media_type.as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            _ => "png",
        }
    }

    /// Guess the media type from a file extension (falls back to PNG).
    pub fn media_type_for_extension(ext: &str) -> &'static str {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => "image/jpeg",
            "webp" => "image/webp",
            _ => "image/png",
        }
    }
}

// Image payloads can be megabytes; keep Debug output readable.
impl fmt::Debug for ImageData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageData")
            .field("media_type", &self.media_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Aspect ratios the image model accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "16:9")]
    Wide,
    #[serde(rename = "3:2")]
    Landscape,
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "21:9")]
    UltraWide,
    #[serde(rename = "9:16")]
    Tall,
    #[serde(rename = "2:3")]
    Portrait,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wide => "16:9",
            Self::Landscape => "3:2",
            Self::Square => "1:1",
            Self::UltraWide => "21:9",
            Self::Tall => "9:16",
            Self::Portrait => "2:3",
        }
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self::Wide
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "16:9" => Ok(Self::Wide),
            "3:2" => Ok(Self::Landscape),
            "1:1" => Ok(Self::Square),
            "21:9" => Ok(Self::UltraWide),
            "9:16" => Ok(Self::Tall),
            "2:3" => Ok(Self::Portrait),
            other => Err(format!("unsupported aspect ratio '{}'", other)),
        }
    }
}

/// A `reason` call: text and image parts in, text or structured data out.
#[derive(Debug, Clone)]
pub struct ReasonRequest {
    /// Text parts, sent after the images in order
    pub text_inputs: Vec<String>,

    /// Image parts (in-context references, rendered figures to critique)
    pub image_inputs: Vec<ImageData>,

    /// When set, the reply must be JSON; the schema is forwarded to the model
    pub output_schema: Option<serde_json::Value>,

    pub temperature: Option<f32>,
}

impl ReasonRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text_inputs: vec![text.into()],
            image_inputs: Vec::new(),
            output_schema: None,
            temperature: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text_inputs.push(text.into());
        self
    }

    pub fn with_image(mut self, image: ImageData) -> Self {
        self.image_inputs.push(image);
        self
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn expects_structured(&self) -> bool {
        self.output_schema.is_some()
    }
}

/// Reply to a `reason` call.
#[derive(Debug, Clone, PartialEq)]
pub enum ReasonOutput {
    Text(String),
    Structured(serde_json::Value),
}

impl ReasonOutput {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Structured(_) => None,
        }
    }
}

/// A `render` call: one description in, one image out.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub description: String,
    pub aspect_ratio: AspectRatio,
    pub temperature: Option<f32>,
}

impl RenderRequest {
    pub fn new(description: impl Into<String>, aspect_ratio: AspectRatio) -> Self {
        Self {
            description: description.into(),
            aspect_ratio,
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Strip leading/trailing markdown code fences (```json ... ``` or ``` ... ```)
pub fn strip_markdown_fences(s: &str) -> &str {
    let s = s.trim();
    let s = if let Some(rest) = s.strip_prefix("```json") {
        rest
    } else if let Some(rest) = s.strip_prefix("```") {
        rest
    } else {
        s
    };
    if let Some(rest) = s.strip_suffix("```") {
        rest.trim()
    } else {
        s.trim()
    }
}
