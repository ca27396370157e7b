// src/formats.rs
//
// Supported-format registry: MIME type -> canonical extensions.
// The registry describes what the service accepts; whether the bundled
// codec can actually encode a given format is decided in engine/encoder.rs.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use serde::Serialize;

/// MIME types accepted for input, with their recognized file extensions.
/// The first extension of each entry is the canonical one.
const SUPPORTED_MIMETYPES: &[(&str, &[&str])] = &[
    ("image/avif", &["avif"]),
    ("image/bmp", &["bmp"]),
    ("image/gif", &["gif"]),
    ("image/heif", &["heif", "heic"]),
    ("image/jpeg", &["jpg", "jpeg"]),
    ("image/png", &["png"]),
    ("image/svg+xml", &["svg"]),
    ("image/tiff", &["tiff", "tif"]),
    ("image/webp", &["webp"]),
];

/// Registry keyed by MIME type, ordered for stable error messages.
pub fn registry() -> &'static BTreeMap<&'static str, &'static [&'static str]> {
    static REGISTRY: OnceLock<BTreeMap<&'static str, &'static [&'static str]>> = OnceLock::new();
    REGISTRY.get_or_init(|| SUPPORTED_MIMETYPES.iter().copied().collect())
}

pub fn is_supported_mime(mime: &str) -> bool {
    registry().contains_key(mime)
}

/// Resolve a MIME type from a file extension (case-insensitive).
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let ext = ext.to_ascii_lowercase();
    registry()
        .iter()
        .find(|(_, exts)| exts.contains(&ext.as_str()))
        .map(|(mime, _)| *mime)
}

/// Comma-separated MIME list for error messages.
pub fn supported_mime_list() -> String {
    registry().keys().copied().collect::<Vec<_>>().join(", ")
}

/// Response shape of the observable "list supported formats" query.
#[derive(Debug, Clone, Serialize)]
pub struct SupportedFormats {
    pub formats: BTreeMap<&'static str, Vec<&'static str>>,
    /// Whether the surrounding service enables advanced processing (OCR
    /// and friends). Always false for the bare pipeline; carried in the
    /// response for contract compatibility.
    pub advanced_processing: bool,
}

pub fn supported_formats() -> SupportedFormats {
    SupportedFormats {
        formats: registry()
            .iter()
            .map(|(mime, exts)| (*mime, exts.to_vec()))
            .collect(),
        advanced_processing: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_covers_all_nine_families() {
        assert_eq!(registry().len(), 9);
        assert!(is_supported_mime("image/jpeg"));
        assert!(is_supported_mime("image/avif"));
        assert!(!is_supported_mime("application/pdf"));
    }

    #[test]
    fn extension_lookup_is_case_insensitive() {
        assert_eq!(mime_for_extension("JPG"), Some("image/jpeg"));
        assert_eq!(mime_for_extension("heic"), Some("image/heif"));
        assert_eq!(mime_for_extension("tif"), Some("image/tiff"));
        assert_eq!(mime_for_extension("exe"), None);
    }

    #[test]
    fn supported_formats_query_shape() {
        let listing = supported_formats();
        assert_eq!(listing.formats.len(), 9);
        assert!(!listing.advanced_processing);
        assert_eq!(listing.formats["image/jpeg"], vec!["jpg", "jpeg"]);
    }
}
