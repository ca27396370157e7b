// src/engine/pipeline.rs
//
// Executes a resolved plan's pixel operations in order. All geometry was
// decided by the planner; this module never re-derives dimensions beyond
// bounds checks.

use fast_image_resize::{self as fir, ImageBufferError, MulDiv, PixelType, ResizeOptions};
use image::{imageops, imageops::FilterType, DynamicImage, Rgba, RgbaImage, RgbImage};

use crate::error::{ConvertError, Result};
use crate::ops::TransformOp;

/// Apply plan operations to a decoded image.
pub fn apply_ops(mut img: DynamicImage, ops: &[TransformOp]) -> Result<DynamicImage> {
    for op in ops {
        img = apply_one(img, op)?;
    }
    Ok(img)
}

fn apply_one(img: DynamicImage, op: &TransformOp) -> Result<DynamicImage> {
    match op {
        TransformOp::Orient { orientation } => Ok(apply_orientation(img, *orientation)),

        TransformOp::Crop(rect) => {
            if rect.width == 0 || rect.height == 0 {
                return Err(ConvertError::op_failed("crop", "zero crop dimensions"));
            }
            if rect.x + rect.width > img.width() || rect.y + rect.height > img.height() {
                return Err(ConvertError::op_failed(
                    "crop",
                    format!(
                        "window {}x{}+{}+{} outside image {}x{}",
                        rect.width,
                        rect.height,
                        rect.x,
                        rect.y,
                        img.width(),
                        img.height()
                    ),
                ));
            }
            Ok(img.crop_imm(rect.x, rect.y, rect.width, rect.height))
        }

        TransformOp::Resize { width, height } => {
            if (*width, *height) == (img.width(), img.height()) {
                Ok(img)
            } else {
                fast_resize_owned(img, *width, *height)
            }
        }

        TransformOp::FillCrop { width, height } => {
            let layout =
                crate::geometry::fill_dimensions(img.width(), img.height(), *width, *height);
            let scaled = if layout == (img.width(), img.height()) {
                img
            } else {
                fast_resize_owned(img, layout.0, layout.1)?
            };
            Ok(crop_to_dimensions(scaled, *width, *height))
        }

        TransformOp::Pad { layout, background } => {
            let scaled = if (layout.scaled_width, layout.scaled_height)
                == (img.width(), img.height())
            {
                img
            } else {
                fast_resize_owned(img, layout.scaled_width, layout.scaled_height)?
            };
            let [r, g, b] = *background;
            let mut canvas = RgbaImage::from_pixel(
                layout.canvas_width,
                layout.canvas_height,
                Rgba([r, g, b, 255]),
            );
            imageops::overlay(
                &mut canvas,
                &scaled.to_rgba8(),
                layout.offset_x as i64,
                layout.offset_y as i64,
            );
            Ok(DynamicImage::ImageRgba8(canvas))
        }

        // Identity on pixels; the encoder consults the plan instead.
        TransformOp::StripMetadata => Ok(img),

        TransformOp::Flatten { background } => Ok(flatten_onto(img, *background)),

        TransformOp::Sharpen => Ok(img.unsharpen(1.0, 0)),
    }
}

/// Undo an EXIF orientation (TIFF orientation values 1-8).
fn apply_orientation(img: DynamicImage, orientation: u16) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(), // transpose
        6 => img.rotate90(),
        7 => img.rotate270().fliph(), // transverse
        8 => img.rotate270(),
        _ => img,
    }
}

/// Center-crop to the target size; dimensions already at or below the
/// current size by construction.
fn crop_to_dimensions(img: DynamicImage, target_w: u32, target_h: u32) -> DynamicImage {
    let crop_width = target_w.min(img.width()).max(1);
    let crop_height = target_h.min(img.height()).max(1);
    let crop_x = (img.width() - crop_width) / 2;
    let crop_y = (img.height() - crop_height) / 2;
    img.crop_imm(crop_x, crop_y, crop_width, crop_height)
}

/// Composite any alpha onto a solid background, producing opaque RGB.
fn flatten_onto(img: DynamicImage, background: [u8; 3]) -> DynamicImage {
    if !img.color().has_alpha() {
        return DynamicImage::ImageRgb8(img.to_rgb8());
    }
    let [r, g, b] = background;
    let mut canvas = RgbaImage::from_pixel(img.width(), img.height(), Rgba([r, g, b, 255]));
    imageops::overlay(&mut canvas, &img.to_rgba8(), 0, 0);
    DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(canvas).to_rgb8())
}

/// Resize with fast_image_resize (Lanczos3), taking ownership of the pixel
/// buffer so RGB8/RGBA8 inputs avoid a copy.
pub fn fast_resize_owned(img: DynamicImage, dst_width: u32, dst_height: u32) -> Result<DynamicImage> {
    let src_width = img.width();
    let src_height = img.height();

    if src_width == 0 || src_height == 0 || dst_width == 0 || dst_height == 0 {
        return Err(ConvertError::op_failed(
            "resize",
            format!("invalid dimensions {src_width}x{src_height} -> {dst_width}x{dst_height}"),
        ));
    }

    let (pixel_type, src_pixels): (PixelType, Vec<u8>) = match img {
        DynamicImage::ImageRgb8(rgb) => (PixelType::U8x3, rgb.into_raw()),
        DynamicImage::ImageRgba8(rgba) => (PixelType::U8x4, rgba.into_raw()),
        other => {
            let rgba = other.to_rgba8();
            (PixelType::U8x4, rgba.into_raw())
        }
    };

    fast_resize_impl(src_width, src_height, src_pixels, pixel_type, dst_width, dst_height)
        .map_err(|reason| ConvertError::op_failed("resize", reason))
}

fn default_resize_options() -> ResizeOptions {
    ResizeOptions::new().resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Lanczos3))
}

fn fast_resize_impl(
    src_width: u32,
    src_height: u32,
    mut src_pixels: Vec<u8>,
    pixel_type: PixelType,
    dst_width: u32,
    dst_height: u32,
) -> std::result::Result<DynamicImage, String> {
    let pixel_count = (src_width as usize)
        .checked_mul(src_height as usize)
        .ok_or_else(|| "image dimensions overflow during resize".to_string())?;
    let required_bytes = pixel_count
        .checked_mul(pixel_type.size())
        .ok_or_else(|| "image buffer size overflow during resize".to_string())?;

    if src_pixels.len() < required_bytes {
        return Err(format!(
            "fir source image invalid buffer size. expected {required_bytes} bytes, got {} bytes",
            src_pixels.len()
        ));
    }

    let options = default_resize_options();
    let primary_result = match fir::images::Image::from_slice_u8(
        src_width,
        src_height,
        src_pixels.as_mut_slice(),
        pixel_type,
    ) {
        Ok(src_image) => {
            resize_with_source_image(src_image, pixel_type, dst_width, dst_height, &options)
        }
        Err(ImageBufferError::InvalidBufferAlignment) => {
            let aligned = copy_pixels_to_aligned_image(
                src_width,
                src_height,
                pixel_type,
                &src_pixels,
                required_bytes,
            )?;
            resize_with_source_image(aligned, pixel_type, dst_width, dst_height, &options)
        }
        Err(other) => Err(format!("fir source image error: {other:?}")),
    };

    match primary_result {
        Ok(img) => Ok(img),
        Err(err) => resize_with_image_crate_fallback(
            &src_pixels,
            src_width,
            src_height,
            pixel_type,
            dst_width,
            dst_height,
        )
        .map_err(|fallback_err| format!("{err}; image crate fallback failed: {fallback_err}")),
    }
}

fn copy_pixels_to_aligned_image(
    width: u32,
    height: u32,
    pixel_type: PixelType,
    src_pixels: &[u8],
    required_bytes: usize,
) -> std::result::Result<fir::images::Image<'static>, String> {
    let mut aligned_image = fir::images::Image::new(width, height, pixel_type);
    let aligned_buffer = aligned_image.buffer_mut();
    if aligned_buffer.len() != required_bytes {
        return Err(format!(
            "fir alignment fallback buffer mismatch. expected {required_bytes} bytes, got {} bytes",
            aligned_buffer.len()
        ));
    }
    aligned_buffer.copy_from_slice(&src_pixels[..required_bytes]);
    Ok(aligned_image)
}

fn resize_with_image_crate_fallback(
    src_pixels: &[u8],
    src_width: u32,
    src_height: u32,
    pixel_type: PixelType,
    dst_width: u32,
    dst_height: u32,
) -> std::result::Result<DynamicImage, String> {
    let filter = FilterType::Lanczos3;
    match pixel_type {
        PixelType::U8x3 => {
            let rgb = RgbImage::from_raw(src_width, src_height, src_pixels.to_vec())
                .ok_or_else(|| "failed to build rgb image for fallback resize".to_string())?;
            Ok(DynamicImage::ImageRgb8(imageops::resize(
                &rgb, dst_width, dst_height, filter,
            )))
        }
        PixelType::U8x4 => {
            let rgba = RgbaImage::from_raw(src_width, src_height, src_pixels.to_vec())
                .ok_or_else(|| "failed to build rgba image for fallback resize".to_string())?;
            Ok(DynamicImage::ImageRgba8(imageops::resize(
                &rgba, dst_width, dst_height, filter,
            )))
        }
        _ => Err("fallback resize supports only U8x3/U8x4 pixel types".to_string()),
    }
}

/// Check if an RGBA image is fully opaque. Only scans images of 1MP or
/// larger; for smaller images the scan costs more than the SIMD
/// premultiply it would skip.
fn is_fully_opaque(
    image: &fir::images::Image,
    pixel_type: PixelType,
    width: u32,
    height: u32,
) -> bool {
    if pixel_type != PixelType::U8x4 {
        return true; // no alpha channel
    }

    const THRESHOLD_PIXELS: u64 = 1_000_000;
    if (width as u64).saturating_mul(height as u64) < THRESHOLD_PIXELS {
        return false;
    }

    let buffer = image.buffer();
    buffer.iter().skip(3).step_by(4).all(|&alpha| alpha == 255)
}

fn resize_with_source_image(
    mut src_image: fir::images::Image<'_>,
    pixel_type: PixelType,
    dst_width: u32,
    dst_height: u32,
    options: &ResizeOptions,
) -> std::result::Result<DynamicImage, String> {
    let mut dst_image = fir::images::Image::new(dst_width, dst_height, pixel_type);

    let src_width = src_image.width();
    let src_height = src_image.height();
    let needs_premultiply = pixel_type == PixelType::U8x4
        && !is_fully_opaque(&src_image, pixel_type, src_width, src_height);

    let mul_div = MulDiv::default();
    if needs_premultiply {
        mul_div
            .multiply_alpha_inplace(&mut src_image)
            .map_err(|e| format!("failed to premultiply alpha: {e}"))?;
    }

    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_image, &mut dst_image, options)
        .map_err(|e| format!("fir resize error: {e:?}"))?;

    if needs_premultiply {
        mul_div
            .divide_alpha_inplace(&mut dst_image)
            .map_err(|e| format!("failed to unpremultiply alpha: {e}"))?;
    }

    let dst_pixels = dst_image.into_vec();
    match pixel_type {
        PixelType::U8x3 => RgbImage::from_raw(dst_width, dst_height, dst_pixels)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| "failed to create rgb image from resized data".to_string()),
        PixelType::U8x4 => RgbaImage::from_raw(dst_width, dst_height, dst_pixels)
            .map(DynamicImage::ImageRgba8)
            .ok_or_else(|| "failed to create rgba image from resized data".to_string()),
        _ => Err("unsupported pixel type after resize".to_string()),
    }
}
