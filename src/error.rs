// src/error.rs
//
// Unified error handling for imagemill
// Uses thiserror for simple, type-safe error handling
//
// Error Taxonomy:
// - Validation: cross-field option constraint violated, recoverable
// - UnsupportedFormat: MIME type / encoder not in the supported set
// - Processing: codec-level failure (decode, transform op, encode)
// - InvalidBatchIndex: individual-options batch references a bad index
// - LimitExceeded: per-file or batch-level ceiling hit
// - Storage: output artifact could not be persisted
// - Timeout: batch deadline passed before the item started

use std::borrow::Cow;
use thiserror::Error;

/// Stable machine-readable error classification.
///
/// Every `ConvertError` maps to exactly one kind; batch item errors carry
/// the kind's wire code alongside the human-readable message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Cross-field option constraint violated, recoverable by the caller
    Validation,
    /// Input MIME type or requested output encoding not supported
    UnsupportedFormat,
    /// Codec-level failure while decoding, transforming, or encoding
    Processing,
    /// Individual-options batch referenced an out-of-range file index
    InvalidBatchIndex,
    /// Per-file or batch-level resource ceiling exceeded
    LimitExceeded,
    /// Output artifact could not be stored
    Storage,
    /// Batch deadline passed before this item started
    Timeout,
}

impl ErrorKind {
    /// Wire code exposed in batch item errors and logs.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::UnsupportedFormat => "UNSUPPORTED_FORMAT",
            ErrorKind::Processing => "PROCESSING_ERROR",
            ErrorKind::InvalidBatchIndex => "INVALID_BATCH_INDEX",
            ErrorKind::LimitExceeded => "LIMIT_EXCEEDED",
            ErrorKind::Storage => "STORAGE_ERROR",
            ErrorKind::Timeout => "TIMEOUT",
        }
    }
}

/// imagemill error types
///
/// All errors are type-safe and provide clear, actionable messages. Batch
/// orchestration never exposes internal paths beyond the submitted filename.
#[derive(Debug, Error)]
pub enum ConvertError {
    // Options validation
    #[error("invalid conversion options: {violations}")]
    InvalidOptions { violations: Cow<'static, str> },

    // Format support
    #[error("unsupported image format: {mime}. Supported formats: {supported}")]
    UnsupportedMime {
        mime: Cow<'static, str>,
        supported: Cow<'static, str>,
    },

    #[error("no encoder available for output format '{format}'")]
    UnsupportedOutputFormat { format: Cow<'static, str> },

    // Decode
    #[error("failed to decode image: {message}")]
    DecodeFailed { message: Cow<'static, str> },

    #[error("image dimension {dimension} exceeds maximum {max}")]
    DimensionExceedsLimit { dimension: u32, max: u32 },

    #[error("image pixel count {pixels} exceeds maximum {max}")]
    PixelCountExceedsLimit { pixels: u64, max: u64 },

    // Transform
    #[error("transform step '{op}' failed: {message}")]
    OpFailed {
        op: &'static str,
        message: Cow<'static, str>,
    },

    // Encode
    #[error("failed to encode as {format}: {message}")]
    EncodeFailed {
        format: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    // Batch preconditions
    #[error("invalid file_index: {index} (batch has {file_count} files)")]
    InvalidBatchIndex { index: usize, file_count: usize },

    #[error("batch of {count} files exceeds the maximum of {max}")]
    TooManyFiles { count: usize, max: usize },

    #[error("batch payload of {bytes} bytes exceeds the maximum of {max}")]
    BatchTooLarge { bytes: u64, max: u64 },

    #[error("file '{filename}' is {bytes} bytes, larger than the {max} byte limit")]
    FileTooLarge {
        filename: Cow<'static, str>,
        bytes: u64,
        max: u64,
    },

    // Storage
    #[error("failed to store output '{name}': {source}")]
    StoreFailed {
        name: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    // Batch deadline
    #[error("batch deadline exceeded before item {index} started")]
    DeadlineExceeded { index: usize },
}

impl Clone for ConvertError {
    fn clone(&self) -> Self {
        match self {
            Self::InvalidOptions { violations } => Self::InvalidOptions {
                violations: violations.clone(),
            },
            Self::UnsupportedMime { mime, supported } => Self::UnsupportedMime {
                mime: mime.clone(),
                supported: supported.clone(),
            },
            Self::UnsupportedOutputFormat { format } => Self::UnsupportedOutputFormat {
                format: format.clone(),
            },
            Self::DecodeFailed { message } => Self::DecodeFailed {
                message: message.clone(),
            },
            Self::DimensionExceedsLimit { dimension, max } => Self::DimensionExceedsLimit {
                dimension: *dimension,
                max: *max,
            },
            Self::PixelCountExceedsLimit { pixels, max } => Self::PixelCountExceedsLimit {
                pixels: *pixels,
                max: *max,
            },
            Self::OpFailed { op, message } => Self::OpFailed {
                op,
                message: message.clone(),
            },
            Self::EncodeFailed { format, message } => Self::EncodeFailed {
                format: format.clone(),
                message: message.clone(),
            },
            Self::InvalidBatchIndex { index, file_count } => Self::InvalidBatchIndex {
                index: *index,
                file_count: *file_count,
            },
            Self::TooManyFiles { count, max } => Self::TooManyFiles {
                count: *count,
                max: *max,
            },
            Self::BatchTooLarge { bytes, max } => Self::BatchTooLarge {
                bytes: *bytes,
                max: *max,
            },
            Self::FileTooLarge {
                filename,
                bytes,
                max,
            } => Self::FileTooLarge {
                filename: filename.clone(),
                bytes: *bytes,
                max: *max,
            },
            Self::StoreFailed { name, source } => Self::StoreFailed {
                name: name.clone(),
                source: std::io::Error::new(source.kind(), source.to_string()),
            },
            Self::DeadlineExceeded { index } => Self::DeadlineExceeded { index: *index },
        }
    }
}

// Constructor Helpers
impl ConvertError {
    pub fn invalid_options(violations: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidOptions {
            violations: violations.into(),
        }
    }

    pub fn unsupported_mime(
        mime: impl Into<Cow<'static, str>>,
        supported: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::UnsupportedMime {
            mime: mime.into(),
            supported: supported.into(),
        }
    }

    pub fn unsupported_output_format(format: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedOutputFormat {
            format: format.into(),
        }
    }

    pub fn decode_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::DecodeFailed {
            message: message.into(),
        }
    }

    pub fn dimension_exceeds_limit(dimension: u32, max: u32) -> Self {
        Self::DimensionExceedsLimit { dimension, max }
    }

    pub fn pixel_count_exceeds_limit(pixels: u64, max: u64) -> Self {
        Self::PixelCountExceedsLimit { pixels, max }
    }

    pub fn op_failed(op: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self::OpFailed {
            op,
            message: message.into(),
        }
    }

    pub fn encode_failed(
        format: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::EncodeFailed {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn invalid_batch_index(index: usize, file_count: usize) -> Self {
        Self::InvalidBatchIndex { index, file_count }
    }

    pub fn too_many_files(count: usize, max: usize) -> Self {
        Self::TooManyFiles { count, max }
    }

    pub fn batch_too_large(bytes: u64, max: u64) -> Self {
        Self::BatchTooLarge { bytes, max }
    }

    pub fn file_too_large(filename: impl Into<Cow<'static, str>>, bytes: u64, max: u64) -> Self {
        Self::FileTooLarge {
            filename: filename.into(),
            bytes,
            max,
        }
    }

    pub fn store_failed(name: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::StoreFailed {
            name: name.into(),
            source,
        }
    }

    pub fn deadline_exceeded(index: usize) -> Self {
        Self::DeadlineExceeded { index }
    }

    /// Get the error kind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidOptions { .. } => ErrorKind::Validation,

            Self::UnsupportedMime { .. } | Self::UnsupportedOutputFormat { .. } => {
                ErrorKind::UnsupportedFormat
            }

            Self::DecodeFailed { .. }
            | Self::DimensionExceedsLimit { .. }
            | Self::PixelCountExceedsLimit { .. }
            | Self::OpFailed { .. }
            | Self::EncodeFailed { .. } => ErrorKind::Processing,

            Self::InvalidBatchIndex { .. } => ErrorKind::InvalidBatchIndex,

            Self::TooManyFiles { .. } | Self::BatchTooLarge { .. } | Self::FileTooLarge { .. } => {
                ErrorKind::LimitExceeded
            }

            Self::StoreFailed { .. } => ErrorKind::Storage,

            Self::DeadlineExceeded { .. } => ErrorKind::Timeout,
        }
    }

    /// Check if this error is recoverable by fixing the request.
    ///
    /// Validation, format, batch-precondition and limit errors are always
    /// fixable by the caller; codec and storage failures are not.
    pub fn is_recoverable(&self) -> bool {
        match self.kind() {
            ErrorKind::Validation
            | ErrorKind::UnsupportedFormat
            | ErrorKind::InvalidBatchIndex
            | ErrorKind::LimitExceeded
            | ErrorKind::Timeout => true,
            ErrorKind::Processing | ErrorKind::Storage => false,
        }
    }
}

// Result type alias
pub type Result<T> = std::result::Result<T, ConvertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConvertError::unsupported_mime("application/pdf", "image/jpeg, image/png");
        assert!(err.to_string().contains("application/pdf"));
        assert!(err.to_string().contains("image/png"));
    }

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(
            ConvertError::invalid_options("quality out of range").kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            ConvertError::unsupported_output_format("svg").kind(),
            ErrorKind::UnsupportedFormat
        );
        assert_eq!(
            ConvertError::decode_failed("truncated stream").kind(),
            ErrorKind::Processing
        );
        assert_eq!(
            ConvertError::encode_failed("webp", "encoder rejected buffer").kind(),
            ErrorKind::Processing
        );
        assert_eq!(
            ConvertError::invalid_batch_index(5, 3).kind(),
            ErrorKind::InvalidBatchIndex
        );
        assert_eq!(
            ConvertError::too_many_files(100, 32).kind(),
            ErrorKind::LimitExceeded
        );
        assert_eq!(
            ConvertError::file_too_large("huge.png", 30 << 20, 20 << 20).kind(),
            ErrorKind::LimitExceeded
        );
        assert_eq!(
            ConvertError::store_failed(
                "out.webp",
                std::io::Error::from(std::io::ErrorKind::PermissionDenied)
            )
            .kind(),
            ErrorKind::Storage
        );
        assert_eq!(
            ConvertError::deadline_exceeded(7).kind(),
            ErrorKind::Timeout
        );
    }

    #[test]
    fn test_error_recoverable() {
        assert!(ConvertError::invalid_options("crop_x missing").is_recoverable());
        assert!(ConvertError::invalid_batch_index(5, 3).is_recoverable());
        assert!(ConvertError::batch_too_large(1 << 30, 256 << 20).is_recoverable());
        assert!(!ConvertError::decode_failed("bad magic").is_recoverable());
        assert!(!ConvertError::store_failed(
            "out.png",
            std::io::Error::from(std::io::ErrorKind::Other)
        )
        .is_recoverable());
    }

    #[test]
    fn test_kind_codes_are_stable() {
        assert_eq!(ErrorKind::Validation.code(), "VALIDATION_ERROR");
        assert_eq!(ErrorKind::UnsupportedFormat.code(), "UNSUPPORTED_FORMAT");
        assert_eq!(ErrorKind::Processing.code(), "PROCESSING_ERROR");
        assert_eq!(ErrorKind::InvalidBatchIndex.code(), "INVALID_BATCH_INDEX");
        assert_eq!(ErrorKind::LimitExceeded.code(), "LIMIT_EXCEEDED");
        assert_eq!(ErrorKind::Storage.code(), "STORAGE_ERROR");
        assert_eq!(ErrorKind::Timeout.code(), "TIMEOUT");
    }

    #[test]
    fn test_invalid_batch_index_names_offender() {
        let err = ConvertError::invalid_batch_index(5, 3);
        assert!(err.to_string().contains('5'));
        assert!(err.to_string().contains('3'));
    }
}
