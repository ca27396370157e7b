// src/engine/encoder.rs
//
// Encoder dispatch: JPEG via mozjpeg, PNG via image + oxipng, WebP via
// libwebp, GIF/TIFF/BMP through the image crate. ICC re-embedding goes
// through img-parts for the containers that support it.

use std::borrow::Cow;
use std::io::Cursor;

use image::{DynamicImage, ImageFormat as CrateFormat};
use img_parts::{jpeg::Jpeg, png::Png, ImageICC};
use mozjpeg::{ColorSpace, Compress, ScanMode};

use crate::engine::{run_guarded, MAX_DIMENSION};
use crate::error::{ConvertError, Result};
use crate::ops::EncodeParams;
use crate::options::{ImageFormat, DEFAULT_LOSSY_QUALITY};

/// Derives per-format encoder knobs from a 0-100 quality value.
/// WebP filter_strength keeps the sharp-compatible 80/60 thresholds.
#[derive(Debug, Clone, Copy)]
struct QualitySettings {
    quality: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QualityBand {
    High,
    Balanced,
    Fast,
}

impl QualitySettings {
    fn new(quality: u8) -> Self {
        Self {
            quality: quality.min(100) as f32,
        }
    }

    fn band(&self) -> QualityBand {
        if self.quality >= 85.0 {
            QualityBand::High
        } else if self.quality >= 70.0 {
            QualityBand::Balanced
        } else {
            QualityBand::Fast
        }
    }

    fn webp_sns_strength(&self) -> i32 {
        match self.band() {
            QualityBand::High => 50,
            QualityBand::Balanced => 70,
            QualityBand::Fast => 80,
        }
    }

    fn webp_filter_strength(&self) -> i32 {
        if self.quality >= 80.0 {
            20
        } else if self.quality >= 60.0 {
            30
        } else {
            40
        }
    }

    fn webp_filter_sharpness(&self) -> i32 {
        match self.band() {
            QualityBand::High => 2,
            QualityBand::Balanced | QualityBand::Fast => 0,
        }
    }
}

/// Encode a transformed image according to the resolved plan parameters.
/// The ICC profile is only embedded when the plan asks for it and the
/// target container can carry one.
pub fn encode_image(
    img: &DynamicImage,
    params: &EncodeParams,
    icc: Option<&[u8]>,
) -> Result<Vec<u8>> {
    let icc = if params.keep_icc { icc } else { None };
    let quality = params.quality.unwrap_or(DEFAULT_LOSSY_QUALITY);

    match params.format {
        ImageFormat::Jpeg | ImageFormat::Jpg => encode_jpeg(img, quality, icc),
        ImageFormat::Png => encode_png(img, params.lossless, icc),
        ImageFormat::Webp => encode_webp(img, quality, params.lossless, icc),
        ImageFormat::Gif => encode_with_image_crate(img, CrateFormat::Gif, "gif"),
        ImageFormat::Tiff => encode_with_image_crate(img, CrateFormat::Tiff, "tiff"),
        ImageFormat::Bmp => encode_with_image_crate(img, CrateFormat::Bmp, "bmp"),
        ImageFormat::Svg | ImageFormat::Heif | ImageFormat::Avif => Err(
            ConvertError::unsupported_output_format(params.format.extension().to_string()),
        ),
    }
}

/// Encode to JPEG using mozjpeg with progressive, web-optimized settings.
pub fn encode_jpeg(img: &DynamicImage, quality: u8, icc: Option<&[u8]>) -> Result<Vec<u8>> {
    run_guarded("encode:jpeg", || {
        let quality = quality.min(100);

        // Zero-copy when already RGB8
        let rgb: Cow<'_, image::RgbImage> = match img {
            DynamicImage::ImageRgb8(rgb_img) => Cow::Borrowed(rgb_img),
            _ => Cow::Owned(img.to_rgb8()),
        };
        let (w, h) = rgb.dimensions();
        let pixels: &[u8] = rgb.as_raw();

        if w == 0 || h == 0 {
            return Err(ConvertError::encode_failed(
                "jpeg",
                "image has zero width or height",
            ));
        }
        if w > MAX_DIMENSION || h > MAX_DIMENSION {
            return Err(ConvertError::dimension_exceeds_limit(
                w.max(h),
                MAX_DIMENSION,
            ));
        }
        let expected_len = (w as usize) * (h as usize) * 3;
        if pixels.len() != expected_len {
            return Err(ConvertError::encode_failed(
                "jpeg",
                "pixel buffer size mismatch",
            ));
        }

        let mut comp = Compress::new(ColorSpace::JCS_RGB);
        comp.set_size(w as usize, h as usize);
        comp.set_color_space(ColorSpace::JCS_YCbCr);
        comp.set_quality(quality as f32);
        comp.set_chroma_sampling_pixel_sizes((2, 2), (2, 2));
        comp.set_progressive_mode();
        comp.set_optimize_coding(true);
        comp.set_optimize_scans(true);
        comp.set_scan_optimization_mode(ScanMode::AllComponentsTogether);

        let estimated_size = (w as usize * h as usize * 3 / 10).max(4096);
        let mut output = Vec::with_capacity(estimated_size);

        let encoded = {
            let mut writer = comp.start_compress(&mut output).map_err(|e| {
                ConvertError::encode_failed("jpeg", format!("mozjpeg: failed to start: {e:?}"))
            })?;

            let stride = w as usize * 3;
            for row in pixels.chunks(stride) {
                writer.write_scanlines(row).map_err(|e| {
                    ConvertError::encode_failed(
                        "jpeg",
                        format!("mozjpeg: failed to write scanlines: {e:?}"),
                    )
                })?;
            }

            writer.finish().map_err(|e| {
                ConvertError::encode_failed("jpeg", format!("mozjpeg: failed to finish: {e:?}"))
            })?;

            output
        };

        if let Some(icc_data) = icc {
            embed_icc_jpeg(encoded, icc_data)
        } else {
            Ok(encoded)
        }
    })
}

fn embed_icc_jpeg(jpeg_data: Vec<u8>, icc: &[u8]) -> Result<Vec<u8>> {
    use img_parts::jpeg::{markers::APP2, JpegSegment};
    use img_parts::Bytes;

    let mut jpeg = Jpeg::from_bytes(Bytes::from(jpeg_data))
        .map_err(|e| ConvertError::encode_failed("jpeg", format!("ICC reparse failed: {e}")))?;

    let mut marker_data = Vec::with_capacity(14 + icc.len());
    marker_data.extend_from_slice(b"ICC_PROFILE\0");
    marker_data.push(1);
    marker_data.push(1);
    marker_data.extend_from_slice(icc);

    let segment = JpegSegment::new_with_contents(APP2, Bytes::from(marker_data));
    jpeg.segments_mut().insert(0, segment);

    let mut output = Vec::new();
    jpeg.encoder().write_to(&mut output).map_err(|e| {
        ConvertError::encode_failed("jpeg", format!("failed to write JPEG with ICC: {e}"))
    })?;
    Ok(output)
}

/// Encode to PNG. Lossless requests are re-compressed with oxipng.
pub fn encode_png(img: &DynamicImage, optimize: bool, icc: Option<&[u8]>) -> Result<Vec<u8>> {
    run_guarded("encode:png", || {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), CrateFormat::Png)
            .map_err(|e| ConvertError::encode_failed("png", format!("PNG encode failed: {e}")))?;

        let encoded = if optimize {
            let mut options = oxipng::Options::from_preset(4);
            options.strip = oxipng::StripChunks::None;
            oxipng::optimize_from_memory(&buf, &options).map_err(|e| {
                ConvertError::encode_failed("png", format!("oxipng optimization failed: {e}"))
            })?
        } else {
            buf
        };

        if let Some(icc_data) = icc {
            embed_icc_png(encoded, icc_data)
        } else {
            Ok(encoded)
        }
    })
}

fn embed_icc_png(png_data: Vec<u8>, icc: &[u8]) -> Result<Vec<u8>> {
    use img_parts::Bytes;

    let mut png = Png::from_bytes(Bytes::from(png_data))
        .map_err(|e| ConvertError::encode_failed("png", format!("ICC reparse failed: {e}")))?;
    png.set_icc_profile(Some(Bytes::from(icc.to_vec())));

    let mut output = Vec::new();
    png.encoder().write_to(&mut output).map_err(|e| {
        ConvertError::encode_failed("png", format!("failed to write PNG with ICC: {e}"))
    })?;
    Ok(output)
}

/// Encode to WebP, lossless or lossy depending on the plan.
pub fn encode_webp(
    img: &DynamicImage,
    quality: u8,
    lossless: bool,
    icc: Option<&[u8]>,
) -> Result<Vec<u8>> {
    run_guarded("encode:webp", || {
        let has_alpha = img.color().has_alpha();
        let encoded = if has_alpha {
            let rgba: Cow<'_, image::RgbaImage> = match img {
                DynamicImage::ImageRgba8(rgba_img) => Cow::Borrowed(rgba_img),
                _ => Cow::Owned(img.to_rgba8()),
            };
            let (w, h) = rgba.dimensions();
            let encoder = webp::Encoder::from_rgba(&rgba, w, h);
            encode_webp_inner(encoder, quality, lossless)?
        } else {
            // Avoid an unnecessary alpha channel to reduce file size
            let rgb: Cow<'_, image::RgbImage> = match img {
                DynamicImage::ImageRgb8(rgb_img) => Cow::Borrowed(rgb_img),
                _ => Cow::Owned(img.to_rgb8()),
            };
            let (w, h) = rgb.dimensions();
            let encoder = webp::Encoder::from_rgb(&rgb, w, h);
            encode_webp_inner(encoder, quality, lossless)?
        };

        if let Some(icc_data) = icc {
            embed_icc_webp(encoded, icc_data)
        } else {
            Ok(encoded)
        }
    })
}

fn encode_webp_inner(encoder: webp::Encoder<'_>, quality: u8, lossless: bool) -> Result<Vec<u8>> {
    if lossless {
        return Ok(encoder.encode_lossless().to_vec());
    }

    let mut config = webp::WebPConfig::new()
        .map_err(|_| ConvertError::encode_failed("webp", "failed to create WebPConfig"))?;

    let settings = QualitySettings::new(quality);
    config.quality = settings.quality;
    config.method = 4;
    config.pass = 1;
    config.preprocessing = 0;
    config.sns_strength = settings.webp_sns_strength();
    config.autofilter = 1;
    config.filter_strength = settings.webp_filter_strength();
    config.filter_sharpness = settings.webp_filter_sharpness();

    let mem = encoder
        .encode_advanced(&config)
        .map_err(|e| ConvertError::encode_failed("webp", format!("WebP encode failed: {e:?}")))?;
    Ok(mem.to_vec())
}

fn embed_icc_webp(webp_data: Vec<u8>, icc: &[u8]) -> Result<Vec<u8>> {
    use img_parts::webp::WebP;
    use img_parts::Bytes;

    let mut webp = WebP::from_bytes(Bytes::from(webp_data))
        .map_err(|e| ConvertError::encode_failed("webp", format!("ICC reparse failed: {e}")))?;
    webp.set_icc_profile(Some(Bytes::from(icc.to_vec())));

    let mut output = Vec::new();
    webp.encoder().write_to(&mut output).map_err(|e| {
        ConvertError::encode_failed("webp", format!("failed to write WebP with ICC: {e}"))
    })?;
    Ok(output)
}

fn encode_with_image_crate(
    img: &DynamicImage,
    format: CrateFormat,
    name: &'static str,
) -> Result<Vec<u8>> {
    run_guarded("encode:image", || {
        // GIF and BMP encoders reject some pixel layouts; normalize first.
        let normalized: Cow<'_, DynamicImage> = match (format, img) {
            (_, DynamicImage::ImageRgb8(_)) | (_, DynamicImage::ImageRgba8(_)) => {
                Cow::Borrowed(img)
            }
            _ => Cow::Owned(DynamicImage::ImageRgba8(img.to_rgba8())),
        };

        let mut buf = Vec::new();
        normalized
            .write_to(&mut Cursor::new(&mut buf), format)
            .map_err(|e| ConvertError::encode_failed(name, format!("encode failed: {e}")))?;
        Ok(buf)
    })
}
