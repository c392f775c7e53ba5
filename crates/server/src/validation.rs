//! Request validation: URL scheme allowlisting and shape checks, and
//! upload safety (basename sanitization plus magic-byte verification).

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::WebError;

const FORBIDDEN_SCHEMES: [&str; 5] = ["file", "ftp", "gopher", "data", "javascript"];

fn url_scheme(url: &str) -> Option<String> {
    let (scheme, _) = url.split_once("://")?;
    Some(scheme.to_ascii_lowercase())
}

/// Reject any URL whose scheme matches the forbidden set, case
/// insensitively, regardless of source type.
pub fn check_scheme_allowlist(url: &str) -> Result<(), WebError> {
    if let Some(scheme) = url_scheme(url) {
        if FORBIDDEN_SCHEMES.contains(&scheme.as_str()) {
            return Err(WebError::unprocessable(
                "invalid_url",
                format!("scheme `{scheme}` is not permitted"),
            ));
        }
    }
    Ok(())
}

static YOUTUBE_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(https?://)?(www\.)?(youtube\.com/watch\?v=|youtu\.be/)[\w\-]{11}")
        .expect("valid regex")
});

static WEB_URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^https?://").expect("valid regex"));

/// Scheme allowlist plus a shape check specific to the declared source
/// type.
pub fn validate_source_url(url: &str, source_type: &str) -> Result<(), WebError> {
    check_scheme_allowlist(url)?;
    let ok = match source_type {
        "youtube" => YOUTUBE_URL_RE.is_match(url),
        "web" => WEB_URL_RE.is_match(url),
        _ => false,
    };
    if !ok {
        return Err(WebError::unprocessable(
            "invalid_url",
            format!("url does not match the expected shape for source_type `{source_type}`"),
        ));
    }
    Ok(())
}

/// Reduce a filename to its basename and strip NUL bytes before it is ever
/// used to construct a filesystem path. The caller joins this against
/// `<tmp_root>/<job_id>/`, so the result can never escape that directory
/// regardless of `..` components — `Path::file_name()` on a path
/// containing `..` yields `".."`'s final component only, never a full
/// traversal.
pub fn safe_basename(filename: &str) -> String {
    let stripped: String = filename.chars().filter(|&c| c != '\0').collect();
    std::path::Path::new(&stripped)
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty() && s != "..")
        .unwrap_or_else(|| "upload".to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Pdf,
    Epub,
}

impl UploadKind {
    pub fn magic(&self) -> &'static [u8] {
        match self {
            UploadKind::Pdf => b"%PDF",
            UploadKind::Epub => b"PK",
        }
    }

    pub fn source_kind(&self) -> pipeline_engine::SourceKind {
        match self {
            UploadKind::Pdf => pipeline_engine::SourceKind::PdfFile,
            UploadKind::Epub => pipeline_engine::SourceKind::EpubFile,
        }
    }
}

/// Maps a file extension of `.pdf` or `.epub` to its upload kind.
pub fn upload_kind_from_filename(filename: &str) -> Result<UploadKind, WebError> {
    let ext = std::path::Path::new(filename)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => Ok(UploadKind::Pdf),
        "epub" => Ok(UploadKind::Epub),
        other => Err(WebError::unprocessable(
            "unsupported_file_type",
            format!("unsupported file type: .{other}. allowed: .pdf, .epub"),
        )),
    }
}

/// Verify the uploaded content's magic-byte prefix matches what the
/// declared type requires.
pub fn verify_magic(contents: &[u8], kind: UploadKind) -> Result<(), WebError> {
    let magic = kind.magic();
    if contents.len() >= magic.len() && &contents[..magic.len()] == magic {
        Ok(())
    } else {
        Err(WebError::unprocessable(
            "magic_mismatch",
            "file content does not match declared type",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_forbidden_schemes_case_insensitively() {
        for scheme in ["file", "FTP", "Gopher", "DATA", "javascript"] {
            let url = format!("{scheme}://example.com/x");
            assert!(check_scheme_allowlist(&url).is_err(), "{scheme} should be rejected");
        }
    }

    #[test]
    fn allows_http_and_https() {
        assert!(check_scheme_allowlist("https://example.com").is_ok());
        assert!(check_scheme_allowlist("http://example.com").is_ok());
    }

    #[test]
    fn validates_youtube_shape() {
        assert!(validate_source_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ", "youtube").is_ok());
        assert!(validate_source_url("https://youtu.be/dQw4w9WgXcQ", "youtube").is_ok());
        assert!(validate_source_url("https://example.com/not-a-video", "youtube").is_err());
    }

    #[test]
    fn validates_web_shape() {
        assert!(validate_source_url("https://example.com/article", "web").is_ok());
        assert!(validate_source_url("ftp://example.com/article", "web").is_err());
    }

    #[test]
    fn basename_strips_traversal_and_nul() {
        assert_eq!(safe_basename("../../etc/cron.d/evil.pdf"), "evil.pdf");
        assert_eq!(safe_basename("evil\0.pdf"), "evil.pdf");
    }

    #[test]
    fn upload_kind_rejects_unknown_extension() {
        assert!(upload_kind_from_filename("notes.txt").is_err());
        assert_eq!(upload_kind_from_filename("book.epub").unwrap(), UploadKind::Epub);
    }

    #[test]
    fn magic_gate_rejects_mismatched_content() {
        assert!(verify_magic(b"%PDF-1.4 ...", UploadKind::Pdf).is_ok());
        assert!(verify_magic(b"not a pdf", UploadKind::Pdf).is_err());
        assert!(verify_magic(b"PK\x03\x04", UploadKind::Epub).is_ok());
    }
}
