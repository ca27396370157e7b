// src/engine/planner.rs
//
// Turns a validated request plus source facts into an ordered operation
// list. Planning is pure: no pixels are touched, and all geometry is
// resolved here so the executor only replays fixed windows and sizes.

use crate::error::Result;
use crate::geometry::{crop_rect, fit_dimensions, pad_layout, resize_dimensions};
use crate::ops::{EncodeParams, TransformOp, TransformPlan};
use crate::options::{CompressionType, ResizeMode, ValidatedOptions};

/// Default canvas/flatten background when the request does not name one.
const DEFAULT_BACKGROUND: [u8; 3] = [255, 255, 255];

/// Facts about the decoded source the planner needs: dimensions after
/// decode, alpha presence, and the EXIF orientation tag if any.
#[derive(Debug, Clone, Copy)]
pub struct SourceProbe {
    pub width: u32,
    pub height: u32,
    pub has_alpha: bool,
    pub orientation: Option<u16>,
}

/// Build the operation list and encode parameters for one conversion.
///
/// Ops always come out in the fixed order orient, crop, resize, strip,
/// flatten, sharpen. `convert_only` short-circuits to an empty list.
pub fn plan_transform(options: &ValidatedOptions, source: &SourceProbe) -> Result<TransformPlan> {
    let encode = EncodeParams {
        format: options.output_format,
        quality: options.quality,
        lossless: options.compression_type == Some(CompressionType::Lossless),
        keep_icc: options.preserve_color_profile && !options.strip_metadata,
    };

    if options.convert_only {
        return Ok(TransformPlan {
            ops: Vec::new(),
            encode,
            final_width: source.width,
            final_height: source.height,
        });
    }

    let mut ops: Vec<TransformOp> = Vec::new();
    let mut cur_w = source.width;
    let mut cur_h = source.height;

    if options.auto_orient {
        if let Some(orientation) = source.orientation {
            if (2..=8).contains(&orientation) {
                ops.push(TransformOp::Orient { orientation });
                // Values 5-8 rotate by 90 degrees and swap the axes.
                if orientation >= 5 {
                    std::mem::swap(&mut cur_w, &mut cur_h);
                }
            }
        }
    }

    if options.crop {
        // Validation guarantees crop_width/crop_height are present.
        let rect = crop_rect(
            cur_w,
            cur_h,
            options.crop_width.unwrap_or(cur_w),
            options.crop_height.unwrap_or(cur_h),
            options.crop_position,
            options.crop_x.unwrap_or(0),
            options.crop_y.unwrap_or(0),
        );
        cur_w = rect.width;
        cur_h = rect.height;
        ops.push(TransformOp::Crop(rect));
    }

    if options.resize && (options.width.is_some() || options.height.is_some()) {
        match options.resize_mode {
            ResizeMode::PreserveRatio => {
                let (w, h) = match (options.width, options.height) {
                    // Both bounds form a box; fit inside it.
                    (Some(bw), Some(bh)) => fit_dimensions(cur_w, cur_h, bw, bh),
                    _ => resize_dimensions(cur_w, cur_h, options.width, options.height),
                };
                if (w, h) != (cur_w, cur_h) {
                    ops.push(TransformOp::Resize { width: w, height: h });
                }
                cur_w = w;
                cur_h = h;
            }
            ResizeMode::Stretch => {
                let (w, h) = resize_dimensions(cur_w, cur_h, options.width, options.height);
                if (w, h) != (cur_w, cur_h) {
                    ops.push(TransformOp::Resize { width: w, height: h });
                }
                cur_w = w;
                cur_h = h;
            }
            ResizeMode::Crop => {
                let (w, h) = resize_dimensions(cur_w, cur_h, options.width, options.height);
                ops.push(TransformOp::FillCrop { width: w, height: h });
                cur_w = w;
                cur_h = h;
            }
            ResizeMode::Pad => {
                let (w, h) = resize_dimensions(cur_w, cur_h, options.width, options.height);
                let layout = pad_layout(cur_w, cur_h, w, h);
                ops.push(TransformOp::Pad {
                    layout,
                    background: options.background.unwrap_or(DEFAULT_BACKGROUND),
                });
                cur_w = w;
                cur_h = h;
            }
        }
    }

    if options.strip_metadata {
        ops.push(TransformOp::StripMetadata);
    }

    // Alpha must be flattened when the request names a background or the
    // output encoding cannot carry it. Pad already composites onto an
    // opaque canvas.
    let alpha_survives = source.has_alpha && !matches!(ops.last(), Some(TransformOp::Pad { .. }));
    let output_has_alpha = matches!(
        options.output_format,
        crate::options::ImageFormat::Png
            | crate::options::ImageFormat::Webp
            | crate::options::ImageFormat::Gif
            | crate::options::ImageFormat::Tiff
    );
    if alpha_survives && (options.background.is_some() || !output_has_alpha) {
        ops.push(TransformOp::Flatten {
            background: options.background.unwrap_or(DEFAULT_BACKGROUND),
        });
    }

    if options.sharpen {
        ops.push(TransformOp::Sharpen);
    }

    Ok(TransformPlan {
        ops,
        encode,
        final_width: cur_w,
        final_height: cur_h,
    })
}
