//! Content type detection for upload sources.

use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Resolves the content type stored with an object.
///
/// Implementations never fail; unknown files fall back to a default. The
/// manager calls them on the blocking thread pool, so they may read the file.
pub trait ContentTypeResolver: Send + Sync {
    fn content_type(&self, path: &Path) -> String;
}

/// Leading-byte signatures, checked before the extension.
const SIGNATURES: &[(&[u8], &str)] = &[
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xff\xd8\xff", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"%PDF-", "application/pdf"),
    (b"PK\x03\x04", "application/zip"),
    (b"\x1f\x8b", "application/gzip"),
];

const SNIFF_LEN: usize = 16;

/// Sniffs magic bytes, then falls back to the file extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct SniffingResolver;

impl SniffingResolver {
    fn sniff(path: &Path) -> Option<&'static str> {
        let mut header = [0u8; SNIFF_LEN];
        let mut file = File::open(path).ok()?;
        let read = file.read(&mut header).ok()?;
        let header = &header[..read];

        SIGNATURES
            .iter()
            .find(|(magic, _)| header.starts_with(magic))
            .map(|(_, content_type)| *content_type)
    }

    fn from_extension(path: &Path) -> Option<String> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        let content_type = match extension.as_str() {
            "txt" | "log" => mime::TEXT_PLAIN.to_string(),
            "htm" | "html" => mime::TEXT_HTML.to_string(),
            "css" => mime::TEXT_CSS.to_string(),
            "csv" => mime::TEXT_CSV.to_string(),
            "xml" => mime::TEXT_XML.to_string(),
            "js" => mime::APPLICATION_JAVASCRIPT.to_string(),
            "json" => mime::APPLICATION_JSON.to_string(),
            "pdf" => mime::APPLICATION_PDF.to_string(),
            "png" => mime::IMAGE_PNG.to_string(),
            "jpg" | "jpeg" => mime::IMAGE_JPEG.to_string(),
            "gif" => mime::IMAGE_GIF.to_string(),
            "svg" => mime::IMAGE_SVG.to_string(),
            "bmp" => mime::IMAGE_BMP.to_string(),
            "woff" => mime::FONT_WOFF.to_string(),
            "woff2" => mime::FONT_WOFF2.to_string(),
            "md" => "text/markdown".to_owned(),
            "zip" => "application/zip".to_owned(),
            "gz" | "tgz" => "application/gzip".to_owned(),
            "tar" => "application/x-tar".to_owned(),
            "mp4" => "video/mp4".to_owned(),
            "mov" => "video/quicktime".to_owned(),
            "mkv" => "video/x-matroska".to_owned(),
            "mp3" => "audio/mpeg".to_owned(),
            "iso" => "application/x-iso9660-image".to_owned(),
            _ => return None,
        };
        Some(content_type)
    }
}

impl ContentTypeResolver for SniffingResolver {
    fn content_type(&self, path: &Path) -> String {
        Self::sniff(path)
            .map(str::to_owned)
            .or_else(|| Self::from_extension(path))
            .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn file_with(suffix: &str, contents: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents).unwrap();
        file
    }

    #[test]
    fn test_signature_wins_over_extension() {
        let file = file_with(".txt", b"\x89PNG\r\n\x1a\n....");
        assert_eq!(SniffingResolver.content_type(file.path()), "image/png");
    }

    #[test]
    fn test_extension_fallback() {
        let file = file_with(".JSON", b"{\"a\": 1}");
        assert_eq!(SniffingResolver.content_type(file.path()), "application/json");
    }

    #[test]
    fn test_unknown_defaults_to_octet_stream() {
        let file = file_with(".bin", b"\x00\x01\x02");
        assert_eq!(
            SniffingResolver.content_type(file.path()),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_missing_file_uses_extension() {
        let path = Path::new("/nonexistent/archive.tar");
        assert_eq!(SniffingResolver.content_type(path), "application/x-tar");
    }
}
