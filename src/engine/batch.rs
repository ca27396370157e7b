// src/engine/batch.rs
//
// Batch orchestration over the shared rayon pool. Pre-flight checks reject
// a bad batch atomically; once processing starts, failures are isolated to
// their item's outcome slot and never abort siblings.

use std::path::Path;
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::engine::io::SourceBytes;
use crate::engine::pool::get_pool;
use crate::engine::transformer::{TransformResult, Transformer};
use crate::error::{ConvertError, Result};
use crate::options::ConversionOptions;
use crate::storage::Storage;

/// One submitted image: the name the caller knows it by, plus its bytes.
#[derive(Debug, Clone)]
pub struct BatchFile {
    pub filename: String,
    pub bytes: SourceBytes,
}

impl BatchFile {
    pub fn from_vec(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes: SourceBytes::from_vec(bytes),
        }
    }

    /// Memory-map a file instead of reading it into the heap. The mapping
    /// is shared by clones, so batch fan-out does not copy the bytes.
    pub fn from_path(path: &Path) -> Result<Self> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image")
            .to_string();
        Ok(Self {
            filename,
            bytes: SourceBytes::map_file(path)?,
        })
    }
}

/// Pairs one batch slot with its own conversion options.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub file_index: usize,
    pub conversion_options: ConversionOptions,
}

/// Whole-batch ceilings, checked before any item is processed.
#[derive(Debug, Clone, Copy)]
pub struct BatchLimits {
    pub max_files: usize,
    pub max_total_bytes: u64,
    /// Items not yet started when this passes fail with a timeout. Items
    /// already running are allowed to finish.
    pub deadline: Option<Instant>,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_files: 32,
            max_total_bytes: 256 * 1024 * 1024,
            deadline: None,
        }
    }
}

/// What became of one submitted item.
#[derive(Debug)]
pub enum ItemOutcome {
    Success(TransformResult),
    Failure(BatchItemError),
}

/// Failure record for one item. Carries only the submitted filename, never
/// internal paths.
#[derive(Debug, Clone, Serialize)]
pub struct BatchItemError {
    pub index: usize,
    pub filename: String,
    pub code: &'static str,
    pub error: String,
}

/// Ordered per-item outcomes: `outcomes[i]` corresponds to input item `i`.
#[derive(Debug)]
pub struct BatchReport {
    pub outcomes: Vec<ItemOutcome>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ItemOutcome::Success(_)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    /// Split outcomes into the wire response shape.
    pub fn into_response(self) -> BatchResponse {
        let total_images = self.total();
        let mut results = Vec::new();
        let mut errors = Vec::new();
        for outcome in self.outcomes {
            match outcome {
                ItemOutcome::Success(result) => results.push(result),
                ItemOutcome::Failure(error) => errors.push(error),
            }
        }
        BatchResponse {
            total_images,
            successful_conversions: results.len(),
            failed_conversions: errors.len(),
            results,
            errors,
        }
    }
}

/// Aggregate wire response. Field names are the stable contract.
#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub results: Vec<TransformResult>,
    pub errors: Vec<BatchItemError>,
    pub total_images: usize,
    pub successful_conversions: usize,
    pub failed_conversions: usize,
}

/// Convert every file under one shared option set.
pub fn convert_batch<S: Storage>(
    transformer: &Transformer<S>,
    files: &[BatchFile],
    options: &ConversionOptions,
    limits: &BatchLimits,
) -> Result<BatchReport> {
    check_batch_limits(files, limits)?;
    let work: Vec<(&BatchFile, &ConversionOptions)> =
        files.iter().map(|file| (file, options)).collect();
    Ok(run_batch(transformer, work, limits.deadline))
}

/// Convert selected files, each under its own option set. Every
/// `file_index` is validated before any processing starts.
pub fn convert_batch_individual<S: Storage>(
    transformer: &Transformer<S>,
    files: &[BatchFile],
    items: &[BatchItem],
    limits: &BatchLimits,
) -> Result<BatchReport> {
    check_batch_limits(files, limits)?;
    for item in items {
        if item.file_index >= files.len() {
            return Err(ConvertError::invalid_batch_index(item.file_index, files.len()));
        }
    }
    let work: Vec<(&BatchFile, &ConversionOptions)> = items
        .iter()
        .map(|item| (&files[item.file_index], &item.conversion_options))
        .collect();
    Ok(run_batch(transformer, work, limits.deadline))
}

fn check_batch_limits(files: &[BatchFile], limits: &BatchLimits) -> Result<()> {
    if files.len() > limits.max_files {
        return Err(ConvertError::too_many_files(files.len(), limits.max_files));
    }
    let total_bytes: u64 = files.iter().map(|f| f.bytes.len() as u64).sum();
    if total_bytes > limits.max_total_bytes {
        return Err(ConvertError::batch_too_large(total_bytes, limits.max_total_bytes));
    }
    Ok(())
}

fn run_batch<S: Storage>(
    transformer: &Transformer<S>,
    work: Vec<(&BatchFile, &ConversionOptions)>,
    deadline: Option<Instant>,
) -> BatchReport {
    let total = work.len();
    info!(items = total, "starting batch conversion");

    let outcomes: Vec<ItemOutcome> = get_pool().install(|| {
        work.par_iter()
            .enumerate()
            .map(|(index, (file, options))| {
                // The deadline gates item start only; running items finish.
                if let Some(deadline) = deadline {
                    if Instant::now() >= deadline {
                        return failure(index, &file.filename, ConvertError::deadline_exceeded(index));
                    }
                }
                match transformer.transform(&file.bytes, &file.filename, options) {
                    Ok(result) => ItemOutcome::Success(result),
                    Err(err) => failure(index, &file.filename, err),
                }
            })
            .collect()
    });

    let report = BatchReport { outcomes };
    info!(
        items = total,
        succeeded = report.succeeded(),
        failed = report.failed(),
        "batch conversion finished"
    );
    report
}

fn failure(index: usize, filename: &str, err: ConvertError) -> ItemOutcome {
    ItemOutcome::Failure(BatchItemError {
        index,
        filename: filename.to_string(),
        code: err.kind().code(),
        error: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::options::ImageFormat;
    use crate::storage::DiskStorage;
    use image::{DynamicImage, RgbImage};
    use std::io::Cursor;
    use std::time::Duration;

    fn png_file(name: &str, width: u32, height: u32) -> BatchFile {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(
            width,
            height,
            image::Rgb([200, 100, 50]),
        ));
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        BatchFile::from_vec(name, out)
    }

    fn corrupt_file(name: &str) -> BatchFile {
        BatchFile::from_vec(name, vec![0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01])
    }

    fn transformer(dir: &Path) -> Transformer<DiskStorage> {
        Transformer::new(DiskStorage::new(dir, "/converted").unwrap())
    }

    #[test]
    fn partial_failure_is_isolated_and_order_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let t = transformer(dir.path());
        let files = vec![
            png_file("a.png", 16, 16),
            corrupt_file("broken.png"),
            png_file("c.png", 8, 8),
        ];
        let options = ConversionOptions::new(ImageFormat::Jpeg);

        let report = convert_batch(&t, &files, &options, &BatchLimits::default()).unwrap();
        assert_eq!(report.total(), 3);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);

        match &report.outcomes[1] {
            ItemOutcome::Failure(err) => {
                assert_eq!(err.index, 1);
                assert_eq!(err.filename, "broken.png");
                assert_eq!(err.code, "PROCESSING_ERROR");
            }
            other => panic!("expected failure in slot 1, got {other:?}"),
        }
        assert!(matches!(&report.outcomes[0], ItemOutcome::Success(r) if r.original_filename == "a.png"));
        assert!(matches!(&report.outcomes[2], ItemOutcome::Success(r) if r.original_filename == "c.png"));
    }

    #[test]
    fn invalid_index_rejects_whole_batch() {
        let dir = tempfile::tempdir().unwrap();
        let t = transformer(dir.path());
        let files = vec![
            png_file("a.png", 8, 8),
            png_file("b.png", 8, 8),
            png_file("c.png", 8, 8),
        ];
        let items = vec![
            BatchItem {
                file_index: 0,
                conversion_options: ConversionOptions::new(ImageFormat::Webp),
            },
            BatchItem {
                file_index: 5,
                conversion_options: ConversionOptions::new(ImageFormat::Png),
            },
        ];

        let err = convert_batch_individual(&t, &files, &items, &BatchLimits::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidBatchIndex);
        assert!(err.to_string().contains('5'));
        // Nothing was stored
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn individual_options_apply_per_item() {
        let dir = tempfile::tempdir().unwrap();
        let t = transformer(dir.path());
        let files = vec![png_file("a.png", 16, 16), png_file("b.png", 16, 16)];
        let items = vec![
            BatchItem {
                file_index: 0,
                conversion_options: ConversionOptions::new(ImageFormat::Jpeg),
            },
            BatchItem {
                file_index: 1,
                conversion_options: ConversionOptions::new(ImageFormat::Webp),
            },
        ];

        let report = convert_batch_individual(&t, &files, &items, &BatchLimits::default()).unwrap();
        assert_eq!(report.succeeded(), 2);
        match (&report.outcomes[0], &report.outcomes[1]) {
            (ItemOutcome::Success(a), ItemOutcome::Success(b)) => {
                assert_eq!(a.format, "jpeg");
                assert_eq!(b.format, "webp");
            }
            other => panic!("expected two successes, got {other:?}"),
        }
    }

    #[test]
    fn same_file_may_be_referenced_twice() {
        let dir = tempfile::tempdir().unwrap();
        let t = transformer(dir.path());
        let files = vec![png_file("a.png", 8, 8)];
        let items = vec![
            BatchItem {
                file_index: 0,
                conversion_options: ConversionOptions::new(ImageFormat::Png),
            },
            BatchItem {
                file_index: 0,
                conversion_options: ConversionOptions::new(ImageFormat::Bmp),
            },
        ];
        let report = convert_batch_individual(&t, &files, &items, &BatchLimits::default()).unwrap();
        assert_eq!(report.total(), 2);
        assert_eq!(report.succeeded(), 2);
    }

    #[test]
    fn too_many_files_is_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let t = transformer(dir.path());
        let files = vec![
            png_file("a.png", 8, 8),
            png_file("b.png", 8, 8),
            png_file("c.png", 8, 8),
        ];
        let limits = BatchLimits { max_files: 2, ..Default::default() };
        let options = ConversionOptions::new(ImageFormat::Png);

        let err = convert_batch(&t, &files, &options, &limits).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LimitExceeded);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let t = transformer(dir.path());
        let files = vec![png_file("a.png", 64, 64), png_file("b.png", 64, 64)];
        let limits = BatchLimits { max_total_bytes: 16, ..Default::default() };
        let options = ConversionOptions::new(ImageFormat::Png);

        let err = convert_batch(&t, &files, &options, &limits).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LimitExceeded);
    }

    #[test]
    fn expired_deadline_times_out_unstarted_items() {
        let dir = tempfile::tempdir().unwrap();
        let t = transformer(dir.path());
        let files = vec![png_file("a.png", 8, 8), png_file("b.png", 8, 8)];
        let limits = BatchLimits {
            deadline: Some(Instant::now() - Duration::from_secs(1)),
            ..Default::default()
        };
        let options = ConversionOptions::new(ImageFormat::Png);

        let report = convert_batch(&t, &files, &options, &limits).unwrap();
        assert_eq!(report.total(), 2);
        assert_eq!(report.failed(), 2);
        for outcome in &report.outcomes {
            match outcome {
                ItemOutcome::Failure(err) => assert_eq!(err.code, "TIMEOUT"),
                other => panic!("expected timeout, got {other:?}"),
            }
        }
    }

    #[test]
    fn response_shape_matches_wire_contract() {
        let dir = tempfile::tempdir().unwrap();
        let t = transformer(dir.path());
        let files = vec![png_file("a.png", 8, 8), corrupt_file("b.png")];
        let options = ConversionOptions::new(ImageFormat::Webp);

        let report = convert_batch(&t, &files, &options, &BatchLimits::default()).unwrap();
        let response = report.into_response();
        assert_eq!(response.total_images, 2);
        assert_eq!(response.successful_conversions, 1);
        assert_eq!(response.failed_conversions, 1);

        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("results").unwrap().is_array());
        assert!(json.get("errors").unwrap().is_array());
        assert_eq!(json["total_images"], 2);
        assert_eq!(json["errors"][0]["filename"], "b.png");
        assert!(json["errors"][0].get("code").is_some());
    }
}
