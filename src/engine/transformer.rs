// src/engine/transformer.rs
//
// Single-image pipeline: admit, decode, plan, execute, encode, store.
// One Transformer is shared across a batch; per-image state lives on the
// stack of the calling worker thread.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::decoder::{decode_image, detect_exif_orientation};
use crate::engine::io::{extract_icc_profile, SourceBytes};
use crate::engine::memory::{estimate_decode_weight, memory_semaphore};
use crate::engine::pipeline::apply_ops;
use crate::engine::planner::{plan_transform, SourceProbe};
use crate::error::{ConvertError, Result};
use crate::formats;
use crate::options::ConversionOptions;
use crate::storage::Storage;

/// Per-file admission limits.
#[derive(Debug, Clone, Copy)]
pub struct TransformConfig {
    /// Largest accepted source file in bytes.
    pub max_file_bytes: u64,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 20 * 1024 * 1024,
        }
    }
}

/// Outcome of one successful conversion. Field names are the wire contract.
#[derive(Debug, Clone, Serialize)]
pub struct TransformResult {
    pub url: String,
    pub format: String,
    pub width: u32,
    pub height: u32,
    pub size_bytes: u64,
    pub original_filename: String,
}

/// Converts one image at a time against a storage backend.
pub struct Transformer<S: Storage> {
    storage: S,
    config: TransformConfig,
}

impl<S: Storage> Transformer<S> {
    pub fn new(storage: S) -> Self {
        Self::with_config(storage, TransformConfig::default())
    }

    pub fn with_config(storage: S, config: TransformConfig) -> Self {
        Self { storage, config }
    }

    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    /// Run the full pipeline for one source image.
    ///
    /// Holds a memory permit sized from the image header for the duration
    /// of the pixel work, so concurrent decodes cannot overcommit memory.
    pub fn transform(
        &self,
        source: &SourceBytes,
        filename: &str,
        options: &ConversionOptions,
    ) -> Result<TransformResult> {
        let bytes = source.as_bytes();
        if bytes.is_empty() {
            return Err(ConvertError::decode_failed("empty input"));
        }
        if bytes.len() as u64 > self.config.max_file_bytes {
            return Err(ConvertError::file_too_large(
                filename.to_string(),
                bytes.len() as u64,
                self.config.max_file_bytes,
            ));
        }
        check_input_extension(filename)?;

        let validated = options.validate()?;

        let weight = estimate_decode_weight(bytes);
        let _permit = memory_semaphore().acquire(weight);

        let (img, input_format) = decode_image(bytes)?;
        debug!(
            filename,
            width = img.width(),
            height = img.height(),
            input_format = ?input_format,
            estimated_bytes = weight,
            "decoded source image"
        );

        let orientation = if validated.auto_orient {
            detect_exif_orientation(bytes)
        } else {
            None
        };
        let probe = SourceProbe {
            width: img.width(),
            height: img.height(),
            has_alpha: img.color().has_alpha(),
            orientation,
        };
        let plan = plan_transform(&validated, &probe)?;

        let icc = if plan.encode.keep_icc {
            extract_icc_profile(bytes)
        } else {
            None
        };

        let img = apply_ops(img, &plan.ops)?;
        let encoded = crate::engine::encoder::encode_image(&img, &plan.encode, icc.as_deref())?;

        let name = output_name(filename, plan.encode.format.extension());
        let stored = self.storage.store(&encoded, &name)?;

        info!(
            filename,
            output = %name,
            format = plan.encode.format.extension(),
            width = img.width(),
            height = img.height(),
            size_bytes = stored.size_bytes,
            ops = plan.ops.len(),
            "conversion complete"
        );

        Ok(TransformResult {
            url: stored.url,
            format: plan.encode.format.extension().to_string(),
            width: img.width(),
            height: img.height(),
            size_bytes: stored.size_bytes,
            original_filename: filename.to_string(),
        })
    }
}

/// Reject inputs whose extension names a format outside the registry.
/// Extensionless names pass; content sniffing in the decoder is the
/// arbiter for those.
fn check_input_extension(filename: &str) -> Result<()> {
    let ext = match Path::new(filename).extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => ext,
        _ => return Ok(()),
    };
    if formats::mime_for_extension(ext).is_none() {
        return Err(ConvertError::unsupported_mime(
            format!("extension '.{ext}'"),
            formats::supported_mime_list(),
        ));
    }
    Ok(())
}

/// Collision-free output name: sanitized source stem plus a short unique
/// suffix and the canonical output extension.
fn output_name(filename: &str, extension: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    let mut sanitized: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        sanitized.push_str("image");
    }
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{sanitized}_{}.{extension}", &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::options::ImageFormat;
    use crate::storage::DiskStorage;
    use image::{DynamicImage, RgbImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x * 7 % 256) as u8, (y * 11 % 256) as u8, 64])
        }));
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    fn transformer(dir: &Path) -> Transformer<DiskStorage> {
        let storage = DiskStorage::new(dir, "http://localhost/files").unwrap();
        Transformer::new(storage)
    }

    #[test]
    fn converts_png_to_jpeg_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let t = transformer(dir.path());
        let source = SourceBytes::from_vec(png_bytes(64, 48));
        let options = ConversionOptions::new(ImageFormat::Jpeg);

        let result = t.transform(&source, "photo.png", &options).unwrap();
        assert_eq!(result.format, "jpeg");
        assert_eq!((result.width, result.height), (64, 48));
        assert_eq!(result.original_filename, "photo.png");
        assert!(result.url.starts_with("http://localhost/files/photo_"));
        assert!(result.url.ends_with(".jpeg"));
        assert!(result.size_bytes > 0);

        // The stored artifact is a real JPEG
        let name = result.url.rsplit('/').next().unwrap();
        let bytes = std::fs::read(dir.path().join(name)).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn resize_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let t = transformer(dir.path());
        let source = SourceBytes::from_vec(png_bytes(200, 100));
        let mut options = ConversionOptions::new(ImageFormat::Png);
        options.resize = Some(true);
        options.width = Some(100);

        let result = t.transform(&source, "wide.png", &options).unwrap();
        assert_eq!((result.width, result.height), (100, 50));
    }

    #[test]
    fn oversized_file_is_rejected_before_decode() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path(), "http://localhost/files").unwrap();
        let t = Transformer::with_config(storage, TransformConfig { max_file_bytes: 16 });
        let source = SourceBytes::from_vec(png_bytes(8, 8));
        let options = ConversionOptions::new(ImageFormat::Png);

        let err = t.transform(&source, "big.png", &options).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LimitExceeded);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let t = transformer(dir.path());
        let source = SourceBytes::from_vec(png_bytes(8, 8));
        let options = ConversionOptions::new(ImageFormat::Png);

        let err = t.transform(&source, "document.pdf", &options).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    }

    #[test]
    fn empty_input_is_a_processing_error() {
        let dir = tempfile::tempdir().unwrap();
        let t = transformer(dir.path());
        let source = SourceBytes::from_vec(Vec::new());
        let options = ConversionOptions::new(ImageFormat::Png);

        let err = t.transform(&source, "empty.png", &options).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Processing);
    }

    #[test]
    fn invalid_options_surface_as_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let t = transformer(dir.path());
        let source = SourceBytes::from_vec(png_bytes(8, 8));
        let mut options = ConversionOptions::new(ImageFormat::Png);
        options.quality = Some(0);

        let err = t.transform(&source, "bad.png", &options).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn output_names_are_unique_and_sanitized() {
        let a = output_name("my photo (1).png", "webp");
        let b = output_name("my photo (1).png", "webp");
        assert!(a.starts_with("my_photo__1__"));
        assert!(a.ends_with(".webp"));
        assert_ne!(a, b);
        assert!(output_name("", "png").starts_with("image_"));
    }
}
