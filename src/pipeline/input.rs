//! Input resolution: normalise a user-supplied path or URL to a local file.
//!
//! ## Why download to a temp file?
//!
//! pdfium requires a file-system path — it cannot stream from a byte buffer.
//! Downloading to a `TempDir` gives us a path pdfium can open while ensuring
//! cleanup happens automatically when `ResolvedInput` is dropped, even if
//! the process panics. We validate the PDF magic bytes before returning so
//! callers get a meaningful error rather than a pdfium crash.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info};

use crate::error::FoliomdError;

/// Where the input ended up: already on disk, or fetched into a temp dir.
pub enum ResolvedInput {
    /// The caller handed us a path.
    Local(PathBuf),
    /// Fetched from a URL. Holding the `TempDir` defers deletion until the
    /// conversion is done with the file.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    /// The on-disk location, whichever way it arrived.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

/// True when the input names an HTTP or HTTPS resource.
pub fn is_url(input: &str) -> bool {
    matches!(input.split_once("://"), Some(("http" | "https", _)))
}

/// The PDF format allows up to 1024 bytes of preamble before the `%PDF-`
/// header (some generators prepend junk), so the scan covers the first KiB
/// rather than just offset zero.
fn has_pdf_magic(head: &[u8]) -> bool {
    head[..head.len().min(1024)]
        .windows(5)
        .any(|w| w == b"%PDF-")
}

/// First four bytes of `head`, zero-padded, for the `NotAPdf` error.
fn magic_of(head: &[u8]) -> [u8; 4] {
    let mut magic = [0u8; 4];
    let n = head.len().min(4);
    magic[..n].copy_from_slice(&head[..n]);
    magic
}

/// Normalise `input` to a local PDF path.
///
/// URLs are fetched into a temp directory; plain paths are checked for
/// existence, readability, and a PDF header.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, FoliomdError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(FoliomdError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(trimmed) {
        download_url(trimmed, timeout_secs).await
    } else {
        resolve_local(trimmed)
    }
}

/// Validate a path on disk: present, openable, and starting like a PDF.
fn resolve_local(path_str: &str) -> Result<ResolvedInput, FoliomdError> {
    let path = PathBuf::from(path_str);
    if !path.exists() {
        return Err(FoliomdError::FileNotFound { path });
    }

    let file = match std::fs::File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(FoliomdError::PermissionDenied { path });
        }
        Err(_) => return Err(FoliomdError::FileNotFound { path }),
    };

    use std::io::Read;
    let mut head = Vec::with_capacity(1024);
    if file.take(1024).read_to_end(&mut head).is_ok() && !has_pdf_magic(&head) {
        return Err(FoliomdError::NotAPdf {
            path,
            magic: magic_of(&head),
        });
    }

    debug!(path = %path.display(), "local input accepted");
    Ok(ResolvedInput::Local(path))
}

/// Fetch `url` into a fresh temp directory and return the staged path.
async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, FoliomdError> {
    info!(url, "downloading input");

    let fail = |reason: String| FoliomdError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| fail(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            FoliomdError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            fail(e.to_string())
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(fail(format!("HTTP {status}")));
    }

    let filename = extract_filename(url);
    let staging = TempDir::new().map_err(|e| FoliomdError::Internal(e.to_string()))?;
    let target = staging.path().join(&filename);

    let body = response.bytes().await.map_err(|e| fail(e.to_string()))?;
    if !has_pdf_magic(&body) {
        return Err(FoliomdError::NotAPdf {
            path: target,
            magic: magic_of(&body),
        });
    }

    tokio::fs::write(&target, &body)
        .await
        .map_err(|e| FoliomdError::Internal(format!("could not stage the download: {e}")))?;
    info!(path = %target.display(), "download complete");

    Ok(ResolvedInput::Downloaded {
        path: target,
        _temp_dir: staging,
    })
}

/// A filename for the staged download, out of the URL path if it has one.
fn extract_filename(url: &str) -> String {
    let from_path = reqwest::Url::parse(url).ok().and_then(|parsed| {
        parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_string))
            .filter(|last| !last.is_empty() && last.contains('.'))
    });
    from_path.unwrap_or_else(|| "downloaded.pdf".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_detection_requires_an_http_scheme() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("ftp://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn magic_scan_accepts_offset_header() {
        let mut head = vec![b'j'; 40];
        head.extend_from_slice(b"%PDF-1.7");
        assert!(has_pdf_magic(&head));
        assert!(has_pdf_magic(b"%PDF-1.4\n"));
        assert!(!has_pdf_magic(b"PK\x03\x04 not a pdf"));
        assert!(!has_pdf_magic(b""));
    }

    #[test]
    fn staged_filename_comes_from_the_url_path() {
        assert_eq!(
            extract_filename("https://example.com/papers/attn.pdf"),
            "attn.pdf"
        );
        assert_eq!(
            extract_filename("https://arxiv.org/pdf/1706.03762"),
            "1706.03762"
        );
        assert_eq!(extract_filename("https://example.com/"), "downloaded.pdf");
        assert_eq!(extract_filename("not a url"), "downloaded.pdf");
    }

    #[tokio::test]
    async fn empty_input_is_invalid() {
        assert!(matches!(
            resolve_input("   ", 5).await,
            Err(FoliomdError::InvalidInput { .. })
        ));
    }

    #[tokio::test]
    async fn missing_file_reports_not_found() {
        assert!(matches!(
            resolve_input("/definitely/not/here.pdf", 5).await,
            Err(FoliomdError::FileNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn non_pdf_file_reports_its_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.pdf");
        std::fs::write(&path, b"PK\x03\x04zipzip").unwrap();
        match resolve_input(path.to_str().unwrap(), 5).await {
            Err(FoliomdError::NotAPdf { magic, .. }) => assert_eq!(&magic, b"PK\x03\x04"),
            Err(e) => panic!("expected NotAPdf, got {e}"),
            Ok(_) => panic!("expected NotAPdf, input resolved"),
        }
    }
}
