//! Advisory lock serializing provisioning runs against one prefix.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::LOCK_FILENAME;

#[derive(Debug, Serialize, Deserialize)]
pub struct LockMetadata {
  pub version: u32,
  pub pid: u32,
  pub started_at_unix: u64,
  pub command: String,
  pub prefix: PathBuf,
}

#[derive(Debug, Error)]
pub enum PrefixLockError {
  #[error(
    "prefix is locked by another process: {command} (PID {pid}, started {started_at})\n\
             If you're sure no judgebox process is running, remove the lock file:\n  {lock_path}"
  )]
  Contention {
    command: String,
    pid: u32,
    started_at: String,
    lock_path: PathBuf,
  },

  #[error(
    "prefix is locked (could not read lock metadata)\n\
             If you're sure no judgebox process is running, remove the lock file:\n  {lock_path}"
  )]
  ContentionUnknown { lock_path: PathBuf },

  #[error("failed to create lock directory: {0}")]
  CreateDir(#[source] io::Error),

  #[error("failed to open lock file: {0}")]
  OpenFile(#[source] io::Error),

  #[error("failed to write lock metadata: {0}")]
  WriteMetadata(#[source] io::Error),

  #[error("failed to acquire lock: {0}")]
  LockFailed(#[source] io::Error),
}

/// Exclusive lock held for the duration of a run. Released on drop.
pub struct PrefixLock {
  file: File,
  lock_path: PathBuf,
}

impl PrefixLock {
  /// Path of the lock file guarding `prefix`. It lives next to the prefix so
  /// that discarding the prefix does not drop the lock.
  pub fn path_for(prefix: &Path) -> PathBuf {
    let name = prefix
      .file_name()
      .map(|n| format!("{}{}", n.to_string_lossy(), LOCK_FILENAME))
      .unwrap_or_else(|| LOCK_FILENAME.to_string());
    prefix.parent().unwrap_or(prefix).join(name)
  }

  pub fn acquire(prefix: &Path, command: &str) -> Result<Self, PrefixLockError> {
    let lock_path = Self::path_for(prefix);

    if let Some(dir) = lock_path.parent()
      && !dir.exists()
    {
      std::fs::create_dir_all(dir).map_err(PrefixLockError::CreateDir)?;
    }

    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&lock_path)
      .map_err(PrefixLockError::OpenFile)?;

    if let Err(err) = try_lock(&file) {
      if err.kind() == io::ErrorKind::WouldBlock {
        return Err(Self::read_contention_error(&lock_path));
      }
      return Err(PrefixLockError::LockFailed(err));
    }

    Self::write_metadata(&file, command, prefix)?;

    Ok(PrefixLock { file, lock_path })
  }

  /// Reads the lock metadata through the held file handle.
  pub fn read_metadata(&self) -> io::Result<LockMetadata> {
    use std::io::{Seek, SeekFrom};

    let mut file = &self.file;
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents).map_err(io::Error::other)
  }

  pub fn lock_path(&self) -> &Path {
    &self.lock_path
  }

  fn write_metadata(file: &File, command: &str, prefix: &Path) -> Result<(), PrefixLockError> {
    let metadata = LockMetadata {
      version: 1,
      pid: std::process::id(),
      started_at_unix: SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs(),
      command: command.to_string(),
      prefix: prefix.to_path_buf(),
    };

    file.set_len(0).map_err(PrefixLockError::WriteMetadata)?;
    let mut writer = io::BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &metadata)
      .map_err(|e| PrefixLockError::WriteMetadata(io::Error::other(e)))?;
    writer.flush().map_err(PrefixLockError::WriteMetadata)?;

    Ok(())
  }

  fn read_contention_error(lock_path: &Path) -> PrefixLockError {
    if let Ok(mut file) = File::open(lock_path) {
      let mut contents = String::new();
      if file.read_to_string(&mut contents).is_ok()
        && let Ok(metadata) = serde_json::from_str::<LockMetadata>(&contents)
      {
        return PrefixLockError::Contention {
          command: metadata.command,
          pid: metadata.pid,
          started_at: format!("Unix timestamp {}", metadata.started_at_unix),
          lock_path: lock_path.to_path_buf(),
        };
      }
    }

    PrefixLockError::ContentionUnknown {
      lock_path: lock_path.to_path_buf(),
    }
  }
}

#[cfg(unix)]
fn try_lock(file: &File) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  flock(file.as_fd(), FlockOperation::NonBlockingLockExclusive).map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(not(unix))]
fn try_lock(_file: &File) -> io::Result<()> {
  Err(io::Error::new(
    io::ErrorKind::Unsupported,
    "prefix locking requires a unix host",
  ))
}
