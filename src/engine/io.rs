// src/engine/io.rs
//
// Input byte handling and ICC profile extraction.

use memmap2::Mmap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use img_parts::{jpeg::Jpeg, png::Png, ImageICC};

use crate::error::{ConvertError, Result};

/// Input bytes for one conversion. Cheap to clone and share across worker
/// threads; large files can be memory-mapped instead of buffered.
#[derive(Clone, Debug)]
pub enum SourceBytes {
    /// In-memory payload (uploaded request body)
    Memory(Arc<Vec<u8>>),
    /// Memory-mapped file (zero-copy access)
    Mapped(Arc<Mmap>),
}

impl SourceBytes {
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        SourceBytes::Memory(Arc::new(bytes))
    }

    /// Map a file read-only. The mapping stays valid for the lifetime of
    /// the value; callers must not truncate the file while converting.
    pub fn map_file(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| ConvertError::store_failed(path.display().to_string(), e))?;
        let mmap = unsafe { Mmap::map(&file) }
            .map_err(|e| ConvertError::store_failed(path.display().to_string(), e))?;
        Ok(SourceBytes::Mapped(Arc::new(mmap)))
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            SourceBytes::Memory(data) => data.as_slice(),
            SourceBytes::Mapped(mmap) => mmap.as_ref(),
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Extract an ICC profile from image data.
/// Supports JPEG (APP2 marker), PNG (iCCP chunk), and WebP (ICCP chunk).
pub fn extract_icc_profile(data: &[u8]) -> Option<Vec<u8>> {
    if data.len() < 12 {
        return None;
    }

    let icc_data = if data[0] == 0xFF && data[1] == 0xD8 {
        extract_icc_from_jpeg(data)?
    } else if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        extract_icc_from_png(data)?
    } else if &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        extract_icc_from_webp(data)?
    } else {
        return None;
    };

    if validate_icc_profile(&icc_data) {
        Some(icc_data)
    } else {
        // Invalid profile, skip it
        None
    }
}

/// Validate the fixed 128-byte ICC header: size field must match the data
/// length and the signature fields must be printable ASCII.
pub(crate) fn validate_icc_profile(icc_data: &[u8]) -> bool {
    if icc_data.len() < 128 {
        return false;
    }

    let profile_size =
        u32::from_be_bytes([icc_data[0], icc_data[1], icc_data[2], icc_data[3]]) as usize;
    if profile_size != icc_data.len() {
        return false;
    }

    // Major version should be reasonable (typically 2, 4, or 5)
    if icc_data[8] > 10 {
        return false;
    }

    // CMM type, profile class, data color space, PCS: printable ASCII or NUL
    for range in [4..8, 12..16, 16..20, 20..24] {
        for &byte in &icc_data[range] {
            if !(32..=126).contains(&byte) && byte != 0 {
                return false;
            }
        }
    }

    true
}

fn extract_icc_from_jpeg(data: &[u8]) -> Option<Vec<u8>> {
    let jpeg = Jpeg::from_bytes(data.to_vec().into()).ok()?;
    jpeg.icc_profile().map(|icc| icc.to_vec())
}

fn extract_icc_from_png(data: &[u8]) -> Option<Vec<u8>> {
    let png = Png::from_bytes(data.to_vec().into()).ok()?;
    png.icc_profile().map(|icc| icc.to_vec())
}

fn extract_icc_from_webp(data: &[u8]) -> Option<Vec<u8>> {
    use img_parts::webp::WebP;
    let webp = WebP::from_bytes(data.to_vec().into()).ok()?;
    webp.icc_profile().map(|icc| icc.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn source_bytes_memory_roundtrip() {
        let src = SourceBytes::from_vec(vec![1, 2, 3]);
        assert_eq!(src.as_bytes(), &[1, 2, 3]);
        assert_eq!(src.len(), 3);
        assert!(!src.is_empty());
    }

    #[test]
    fn source_bytes_mmap_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"mapped contents").unwrap();
        file.flush().unwrap();

        let src = SourceBytes::map_file(file.path()).unwrap();
        assert_eq!(src.as_bytes(), b"mapped contents");
    }

    #[test]
    fn validate_rejects_short_profile() {
        assert!(!validate_icc_profile(&[0u8; 127]));
        assert!(!validate_icc_profile(&[]));
    }

    #[test]
    fn validate_requires_matching_size_field() {
        let mut data = vec![0u8; 200];
        data[0..4].copy_from_slice(&255u32.to_be_bytes());
        assert!(!validate_icc_profile(&data));

        data[0..4].copy_from_slice(&200u32.to_be_bytes());
        assert!(validate_icc_profile(&data));
    }

    #[test]
    fn validate_rejects_absurd_version() {
        let mut data = vec![0u8; 128];
        data[0..4].copy_from_slice(&128u32.to_be_bytes());
        data[8] = 20;
        assert!(!validate_icc_profile(&data));
    }

    #[test]
    fn extract_returns_none_for_non_image() {
        assert!(extract_icc_profile(b"not an image").is_none());
        assert!(extract_icc_profile(&[]).is_none());
    }
}
