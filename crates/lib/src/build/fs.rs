//! File-tree helpers for staging and header-copy recipes.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::util::relative_key;

use super::types::StepError;

fn walk_err(root: &Path) -> impl Fn(walkdir::Error) -> StepError + '_ {
  move |e| {
    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
    StepError::Io {
      path,
      source: e.into_io_error().unwrap_or_else(|| std::io::Error::other("filesystem loop")),
    }
  }
}

/// Whether the `/`-separated `relative` path equals or lies under one of `excludes`.
fn is_excluded(relative: &str, excludes: &[String]) -> bool {
  excludes.iter().any(|ex| {
    let ex = ex.trim_end_matches('/');
    relative == ex || relative.strip_prefix(ex).is_some_and(|rest| rest.starts_with('/'))
  })
}

/// Copy a file or merge a directory tree from `from` into `to`, replacing
/// existing files. Returns the number of files and symlinks written.
pub fn copy_tree(from: &Path, to: &Path, excludes: &[String]) -> Result<usize, StepError> {
  let metadata = fs::symlink_metadata(from).map_err(StepError::io(from))?;

  if !metadata.is_dir() {
    if let Some(parent) = to.parent() {
      fs::create_dir_all(parent).map_err(StepError::io(parent))?;
    }
    copy_entry(from, to, metadata.file_type().is_symlink())?;
    return Ok(1);
  }

  let mut copied = 0;
  let walker = WalkDir::new(from).sort_by_file_name().into_iter().filter_entry(|e| {
    let relative = relative_key(from, e.path());
    relative.is_empty() || !is_excluded(&relative, excludes)
  });

  for entry in walker {
    let entry = entry.map_err(walk_err(from))?;
    let relative = entry.path().strip_prefix(from).unwrap_or(entry.path());
    let dest = to.join(relative);
    let file_type = entry.file_type();

    if file_type.is_dir() {
      fs::create_dir_all(&dest).map_err(StepError::io(dest.as_path()))?;
    } else {
      copy_entry(entry.path(), &dest, file_type.is_symlink())?;
      copied += 1;
    }
  }

  debug!(from = %from.display(), to = %to.display(), files = copied, "copied tree");
  Ok(copied)
}

fn copy_entry(from: &Path, to: &Path, symlink: bool) -> Result<(), StepError> {
  if fs::symlink_metadata(to).is_ok() {
    remove_path(to)?;
  }

  if symlink {
    let target = fs::read_link(from).map_err(StepError::io(from))?;
    std::os::unix::fs::symlink(&target, to).map_err(StepError::io(to))?;
  } else {
    fs::copy(from, to).map_err(StepError::io(to))?;
  }
  Ok(())
}

/// Delete a file, symlink or directory tree. Missing paths are ignored.
pub fn remove_path(path: &Path) -> Result<(), StepError> {
  match fs::symlink_metadata(path) {
    Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(path).map_err(StepError::io(path)),
    Ok(_) => fs::remove_file(path).map_err(StepError::io(path)),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
    Err(e) => Err(StepError::Io {
      path: path.to_path_buf(),
      source: e,
    }),
  }
}

/// Replace every occurrence of `from` by `to` inside `path`. Returns whether
/// the file changed.
pub fn rewrite_file(path: &Path, from: &str, to: &str) -> Result<bool, StepError> {
  let content = fs::read(path).map_err(StepError::io(path))?;
  let (rewritten, count) = replace_bytes(&content, from.as_bytes(), to.as_bytes());

  if count == 0 {
    return Ok(false);
  }

  fs::write(path, rewritten).map_err(StepError::io(path))?;
  debug!(path = %path.display(), from, to, count, "rewrote embedded path");
  Ok(true)
}

fn replace_bytes(haystack: &[u8], from: &[u8], to: &[u8]) -> (Vec<u8>, usize) {
  if from.is_empty() {
    return (haystack.to_vec(), 0);
  }

  let mut out = Vec::with_capacity(haystack.len());
  let mut count = 0;
  let mut i = 0;

  while i < haystack.len() {
    if haystack[i..].starts_with(from) {
      out.extend_from_slice(to);
      i += from.len();
      count += 1;
    } else {
      out.push(haystack[i]);
      i += 1;
    }
  }

  (out, count)
}

/// Descend through `levels` single top-level directories of an unpacked
/// archive, like `tar --strip-components`.
pub fn strip_components(unpacked: &Path, levels: usize) -> Result<PathBuf, StepError> {
  let mut current = unpacked.to_path_buf();

  for _ in 0..levels {
    let entries = fs::read_dir(&current)
      .map_err(StepError::io(current.as_path()))?
      .collect::<Result<Vec<_>, _>>()
      .map_err(StepError::io(current.as_path()))?;

    match entries.as_slice() {
      [only] if only.path().is_dir() => current = only.path(),
      _ => {
        return Err(StepError::Archive(format!(
          "{} does not contain a single top-level directory",
          current.display()
        )));
      }
    }
  }

  Ok(current)
}
