// src/engine.rs
//
// The conversion engine: decode, plan, execute, encode, store.
// This file is a facade over the decomposed modules in engine/.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::error::{ConvertError, Result};

// =============================================================================
// SECURITY LIMITS
// =============================================================================

/// Maximum allowed image dimension (width or height).
/// Images larger than 32768x32768 are rejected to prevent decompression bombs.
/// This is the same limit used by libvips/sharp.
pub const MAX_DIMENSION: u32 = 32768;

/// Maximum allowed total pixels (width * height).
/// 100 megapixels = 400MB uncompressed RGBA. Beyond this is likely malicious.
pub const MAX_PIXELS: u64 = 100_000_000;

mod batch;
mod decoder;
mod encoder;
mod io;
mod memory;
mod pipeline;
mod planner;
mod pool;
mod transformer;

pub use batch::{
    convert_batch, convert_batch_individual, BatchFile, BatchItem, BatchItemError, BatchLimits,
    BatchReport, BatchResponse, ItemOutcome,
};
pub use decoder::{check_dimensions, decode_image, detect_exif_orientation, probe_image, ImageProbe};
pub use encoder::encode_image;
pub use io::{extract_icc_profile, SourceBytes};
pub use pipeline::apply_ops;
pub use planner::{plan_transform, SourceProbe};
pub use transformer::{TransformConfig, TransformResult, Transformer};

/// Run codec work behind a panic guard. Native codecs abort a single
/// conversion, never the process; a panic surfaces as a Processing error
/// naming the failed stage.
pub(crate) fn run_guarded<T>(stage: &'static str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(ConvertError::op_failed(stage, format!("panic: {message}")))
        }
    }
}
