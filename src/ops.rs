// src/ops.rs
//
// Fully resolved pipeline operations.
// The planner does all geometry up front; executing a plan never consults
// the request again.

use crate::geometry::{CropRect, PadLayout};
use crate::options::ImageFormat;

/// One pixel-level step of a transform plan.
///
/// Every operation is self-contained: absolute coordinates, resolved
/// dimensions, no references back into the request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransformOp {
    /// Undo an EXIF orientation (values 2-8; 1 is never planned).
    Orient { orientation: u16 },
    /// Extract a window known to lie inside the current image.
    Crop(CropRect),
    /// Scale to exactly the given dimensions.
    Resize { width: u32, height: u32 },
    /// Scale to cover the box, then center-crop to it.
    FillCrop { width: u32, height: u32 },
    /// Fit-scale and center on a solid-color canvas.
    Pad {
        layout: PadLayout,
        background: [u8; 3],
    },
    /// Drop ancillary metadata at encode time. Identity on pixels; the
    /// encoder consults the plan's `keep_icc` flag instead.
    StripMetadata,
    /// Composite any alpha onto a solid background, producing opaque RGB.
    Flatten { background: [u8; 3] },
    /// Mild unsharp mask.
    Sharpen,
}

impl TransformOp {
    /// Stable name used in error messages and trace events.
    pub fn name(&self) -> &'static str {
        match self {
            TransformOp::Orient { .. } => "orient",
            TransformOp::Crop(_) => "crop",
            TransformOp::Resize { .. } => "resize",
            TransformOp::FillCrop { .. } => "fill_crop",
            TransformOp::Pad { .. } => "pad",
            TransformOp::StripMetadata => "strip_metadata",
            TransformOp::Flatten { .. } => "flatten",
            TransformOp::Sharpen => "sharpen",
        }
    }
}

/// Everything the encoder needs, resolved by the planner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodeParams {
    pub format: ImageFormat,
    /// 1-100 when set; encoder defaults apply otherwise.
    pub quality: Option<u8>,
    pub lossless: bool,
    /// Re-embed the source ICC profile in the output when the container
    /// supports it.
    pub keep_icc: bool,
}

/// A complete, statically resolved conversion: pixel ops in execution
/// order, then encode parameters.
#[derive(Clone, Debug)]
pub struct TransformPlan {
    pub ops: Vec<TransformOp>,
    pub encode: EncodeParams,
    /// Dimensions the image will have after all ops run.
    pub final_width: u32,
    pub final_height: u32,
}

impl TransformPlan {
    pub fn is_passthrough(&self) -> bool {
        self.ops.is_empty()
    }
}
