// lib.rs
//
// imagemill: a batch image transformation pipeline.
//
// Given source bytes and a declarative option set, produce a correctly
// formatted, resized, cropped, and compressed output image. Batches run
// over a bounded worker pool with partial-failure isolation.
//
// Layering, top to bottom:
// - options:  wire contract + validation into ValidatedOptions
// - geometry: pure dimension math (no pixels, no I/O)
// - ops:      the operation vocabulary shared by planner and executor
// - engine:   decode, plan, execute, encode; batch orchestration
// - storage:  persistence seam for encoded outputs
// - formats:  supported-input registry
// - error:    unified taxonomy with stable wire codes

pub mod engine;
pub mod error;
pub mod formats;
pub mod geometry;
pub mod ops;
pub mod options;
pub mod storage;

pub use engine::{
    convert_batch, convert_batch_individual, BatchFile, BatchItem, BatchItemError, BatchLimits,
    BatchReport, BatchResponse, ItemOutcome, SourceBytes, TransformConfig, TransformResult,
    Transformer,
};
pub use error::{ConvertError, ErrorKind, Result};
pub use formats::{supported_formats, SupportedFormats};
pub use options::{
    CompressionType, ConversionOptions, CropPosition, ImageFormat, ResizeMode, ValidatedOptions,
};
pub use storage::{DiskStorage, StoredObject, Storage};

/// Crate version, for service banners and diagnostics.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    #[test]
    fn version_is_nonempty() {
        assert!(!super::version().is_empty());
    }
}
