// src/options.rs
//
// ConversionOptions: the declarative request contract, plus cross-field
// validation into ValidatedOptions.
//
// Every field has an explicit type and default; there are no runtime
// presence checks downstream of validate(). All rules are evaluated (not
// short-circuited) so a single response can report every violation.

use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};

/// Output encodings the service understands. `jpg` is kept as a distinct
/// wire value for compatibility, but it behaves identically to `jpeg`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Jpg,
    Png,
    Webp,
    Gif,
    Tiff,
    Bmp,
    Svg,
    Heif,
    Avif,
}

impl ImageFormat {
    /// Canonical file extension for output naming.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Jpg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Webp => "webp",
            ImageFormat::Gif => "gif",
            ImageFormat::Tiff => "tiff",
            ImageFormat::Bmp => "bmp",
            ImageFormat::Svg => "svg",
            ImageFormat::Heif => "heif",
            ImageFormat::Avif => "avif",
        }
    }

    pub fn is_jpeg(&self) -> bool {
        matches!(self, ImageFormat::Jpeg | ImageFormat::Jpg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeMode {
    PreserveRatio,
    Stretch,
    Crop,
    Pad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionType {
    Lossless,
    Lossy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropPosition {
    Center,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Custom,
}

/// Default quality applied when compression is lossy and quality is unset.
pub const DEFAULT_LOSSY_QUALITY: u8 = 85;

/// Declarative description of one image conversion. Field names are the
/// stable wire contract; everything except `output_format` is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOptions {
    pub output_format: ImageFormat,
    /// If true, only convert format without additional processing.
    #[serde(default)]
    pub convert_only: bool,

    // Quality options (only used if convert_only is false)
    #[serde(default)]
    pub compression_type: Option<CompressionType>,
    /// Image quality (1-100, higher is better).
    #[serde(default)]
    pub quality: Option<u8>,

    // Resize options
    #[serde(default)]
    pub resize: Option<bool>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub resize_mode: Option<ResizeMode>,

    // Cropping options
    #[serde(default)]
    pub crop: Option<bool>,
    #[serde(default)]
    pub crop_position: Option<CropPosition>,
    #[serde(default)]
    pub crop_width: Option<u32>,
    #[serde(default)]
    pub crop_height: Option<u32>,
    #[serde(default)]
    pub crop_x: Option<u32>,
    #[serde(default)]
    pub crop_y: Option<u32>,

    // Metadata options
    #[serde(default)]
    pub strip_metadata: Option<bool>,
    #[serde(default)]
    pub preserve_color_profile: Option<bool>,

    // Advanced options
    #[serde(default)]
    pub auto_orient: Option<bool>,
    #[serde(default)]
    pub background_color: Option<String>,
    #[serde(default)]
    pub sharpen: Option<bool>,
}

impl ConversionOptions {
    /// Options with only the output format set; everything else defaulted.
    pub fn new(output_format: ImageFormat) -> Self {
        Self {
            output_format,
            convert_only: false,
            compression_type: None,
            quality: None,
            resize: None,
            width: None,
            height: None,
            resize_mode: None,
            crop: None,
            crop_position: None,
            crop_width: None,
            crop_height: None,
            crop_x: None,
            crop_y: None,
            strip_metadata: None,
            preserve_color_profile: None,
            auto_orient: None,
            background_color: None,
            sharpen: None,
        }
    }

    /// Enforce cross-field constraints and normalize defaults.
    ///
    /// All rules are evaluated so multiple violations are reported together
    /// in one error. Pure function over the input value.
    pub fn validate(&self) -> Result<ValidatedOptions> {
        let mut violations: Vec<String> = Vec::new();

        if let Some(q) = self.quality {
            if !(1..=100).contains(&q) {
                violations.push(format!("quality must be between 1 and 100, got {q}"));
            }
        }

        if self.crop_position == Some(CropPosition::Custom)
            && (self.crop_x.is_none() || self.crop_y.is_none())
        {
            violations
                .push("crop_x and crop_y are required when crop_position is 'custom'".to_string());
        }

        let crop = self.crop.unwrap_or(false);
        if crop && (self.crop_width.is_none() || self.crop_height.is_none()) {
            violations.push("crop_width and crop_height are required when crop is true".to_string());
        }
        if let Some(w) = self.crop_width {
            if w == 0 {
                violations.push("crop_width must be positive".to_string());
            }
        }
        if let Some(h) = self.crop_height {
            if h == 0 {
                violations.push("crop_height must be positive".to_string());
            }
        }

        let resize = self.resize.unwrap_or(false);
        if let Some(w) = self.width {
            if w == 0 {
                violations.push("width must be positive".to_string());
            }
        }
        if let Some(h) = self.height {
            if h == 0 {
                violations.push("height must be positive".to_string());
            }
        }

        let background = match self.background_color.as_deref() {
            Some(raw) => match parse_color(raw) {
                Some(rgb) => Some(rgb),
                None => {
                    violations.push(format!("unrecognized background_color '{raw}'"));
                    None
                }
            },
            None => None,
        };

        if !violations.is_empty() {
            return Err(ConvertError::invalid_options(violations.join("; ")));
        }

        // Normalizations (not errors)
        let resize_mode = self.resize_mode.unwrap_or(ResizeMode::PreserveRatio);
        let quality = match (self.quality, self.compression_type) {
            (None, Some(CompressionType::Lossy)) => Some(DEFAULT_LOSSY_QUALITY),
            (q, _) => q,
        };

        Ok(ValidatedOptions {
            output_format: self.output_format,
            convert_only: self.convert_only,
            compression_type: self.compression_type,
            quality,
            resize,
            width: self.width,
            height: self.height,
            resize_mode,
            crop,
            crop_position: self.crop_position.unwrap_or(CropPosition::Center),
            crop_width: self.crop_width,
            crop_height: self.crop_height,
            crop_x: self.crop_x,
            crop_y: self.crop_y,
            strip_metadata: self.strip_metadata.unwrap_or(false),
            preserve_color_profile: self.preserve_color_profile.unwrap_or(false),
            auto_orient: self.auto_orient.unwrap_or(false),
            background,
            sharpen: self.sharpen.unwrap_or(false),
        })
    }
}

/// Normalized conversion request: every default resolved, the background
/// color parsed. Consumed by the planner; never constructed directly.
#[derive(Debug, Clone)]
pub struct ValidatedOptions {
    pub output_format: ImageFormat,
    pub convert_only: bool,
    pub compression_type: Option<CompressionType>,
    pub quality: Option<u8>,
    pub resize: bool,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub resize_mode: ResizeMode,
    pub crop: bool,
    pub crop_position: CropPosition,
    pub crop_width: Option<u32>,
    pub crop_height: Option<u32>,
    pub crop_x: Option<u32>,
    pub crop_y: Option<u32>,
    pub strip_metadata: bool,
    pub preserve_color_profile: bool,
    pub auto_orient: bool,
    pub background: Option<[u8; 3]>,
    pub sharpen: bool,
}

/// Parse a CSS-style color: `#rgb`, `#rrggbb`, or a small named set.
pub(crate) fn parse_color(raw: &str) -> Option<[u8; 3]> {
    let raw = raw.trim();
    if let Some(hex) = raw.strip_prefix('#') {
        return match hex.len() {
            3 => {
                let mut rgb = [0u8; 3];
                for (i, c) in hex.chars().enumerate() {
                    let v = c.to_digit(16)? as u8;
                    rgb[i] = v * 16 + v;
                }
                Some(rgb)
            }
            6 => {
                let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
                let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
                let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
                Some([r, g, b])
            }
            _ => None,
        };
    }
    match raw.to_ascii_lowercase().as_str() {
        "white" => Some([255, 255, 255]),
        "black" => Some([0, 0, 0]),
        "gray" | "grey" => Some([128, 128, 128]),
        "red" => Some([255, 0, 0]),
        "green" => Some([0, 128, 0]),
        "blue" => Some([0, 0, 255]),
        _ => None,
    }
}
