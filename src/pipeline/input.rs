//! Input loading for the CLI: read a local path or download a URL into memory.
//!
//! Both surfaces converge on the same in-memory form, a byte buffer plus a
//! display filename, so the web upload and the CLI share one code path from
//! staging onwards.

use crate::error::AnalysisError;
use std::path::PathBuf;
use tracing::{debug, info};

/// A document held in memory, ready to be staged for extraction.
#[derive(Debug, Clone)]
pub struct LoadedInput {
    pub bytes: Vec<u8>,
    pub filename: String,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load `input` (local path or HTTP/HTTPS URL) into memory.
pub async fn load_input(input: &str, timeout_secs: u64) -> Result<LoadedInput, AnalysisError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(input).await
    }
}

async fn read_local(path_str: &str) -> Result<LoadedInput, AnalysisError> {
    let path = PathBuf::from(path_str);

    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => AnalysisError::PermissionDenied { path: path.clone() },
        _ => AnalysisError::FileNotFound { path: path.clone() },
    })?;

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.pdf".to_string());

    debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
    Ok(LoadedInput { bytes, filename })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<LoadedInput, AnalysisError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AnalysisError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            AnalysisError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            AnalysisError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(AnalysisError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| AnalysisError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    info!("Downloaded {} bytes", bytes.len());

    Ok(LoadedInput {
        bytes: bytes.to_vec(),
        filename: filename_from_url(url),
    })
}

/// Last path segment of `url` if it looks like a filename.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}
