//! Source acquisition with SHA-256 verification.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::registry::SourceLocator;
use crate::util::hash::{hash_bytes, hash_file};

use super::types::StepError;

/// What the fetch step produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
  Archive(PathBuf),
  Directory(PathBuf),
}

/// Acquire the sources named by `source` into `downloads`.
pub async fn fetch_source(source: &SourceLocator, downloads: &Path) -> Result<Option<Fetched>, StepError> {
  match source {
    SourceLocator::Url { url, sha256, .. } => {
      let archive = fetch_url(url, sha256.as_deref(), downloads).await?;
      Ok(Some(Fetched::Archive(archive)))
    }
    SourceLocator::Path { path, sha256, .. } => fetch_path(path, sha256.as_deref()).map(Some),
    SourceLocator::None => Ok(None),
  }
}

async fn fetch_url(url: &str, expected_sha256: Option<&str>, downloads: &Path) -> Result<PathBuf, StepError> {
  info!(url = %url, "fetching source");

  fs::create_dir_all(downloads).await.map_err(StepError::io(downloads))?;
  let dest_path = downloads.join(url_to_filename(url));

  let fetch_err = |message: String| StepError::Fetch {
    url: url.to_string(),
    message,
  };

  let response = reqwest::get(url).await.map_err(|e| fetch_err(e.to_string()))?;
  if !response.status().is_success() {
    return Err(fetch_err(format!("HTTP {}", response.status())));
  }
  let bytes = response.bytes().await.map_err(|e| fetch_err(e.to_string()))?;

  if let Some(expected) = expected_sha256 {
    verify(url, expected, &hash_bytes(&bytes).0)?;
  }

  let mut file = fs::File::create(&dest_path).await.map_err(StepError::io(dest_path.as_path()))?;
  file.write_all(&bytes).await.map_err(StepError::io(dest_path.as_path()))?;
  file.flush().await.map_err(StepError::io(dest_path.as_path()))?;

  info!(path = %dest_path.display(), size = bytes.len(), "download complete");
  Ok(dest_path)
}

fn fetch_path(path: &Path, expected_sha256: Option<&str>) -> Result<Fetched, StepError> {
  let metadata = std::fs::metadata(path).map_err(StepError::io(path))?;

  if metadata.is_dir() {
    debug!(path = %path.display(), "using local source directory");
    return Ok(Fetched::Directory(path.to_path_buf()));
  }

  if let Some(expected) = expected_sha256 {
    let actual = hash_file(path).map_err(|e| StepError::Fetch {
      url: path.display().to_string(),
      message: e.to_string(),
    })?;
    verify(&path.display().to_string(), expected, &actual.0)?;
  }

  Ok(Fetched::Archive(path.to_path_buf()))
}

fn verify(source_name: &str, expected: &str, actual: &str) -> Result<(), StepError> {
  if !expected.eq_ignore_ascii_case(actual) {
    return Err(StepError::HashMismatch {
      source_name: source_name.to_string(),
      expected: expected.to_string(),
      actual: actual.to_string(),
    });
  }
  Ok(())
}

/// Convert a URL to a safe filename.
///
/// Takes the last path component and sanitizes it, falling back to a hash of
/// the URL.
pub fn url_to_filename(url: &str) -> String {
  if let Some(filename) = url.rsplit('/').next() {
    let filename = filename.split('?').next().unwrap_or(filename);

    let sanitized: String = filename
      .chars()
      .map(|c| {
        if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
          c
        } else {
          '_'
        }
      })
      .collect();

    if !sanitized.is_empty() && sanitized != "." && sanitized != ".." {
      return sanitized;
    }
  }

  format!("download_{}", &hash_bytes(url.as_bytes()).0[..16])
}
