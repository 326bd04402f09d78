//! Recipe step command execution.
//!
//! Commands run through `/bin/sh -c` with a cleared environment that is
//! rebuilt from the prefix, the workspace and the toolchain, so the host's
//! ambient variables never leak into a build.

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::consts::SOURCE_DATE_EPOCH;

use super::types::StepError;

/// Output lines kept for the failure message.
const TAIL_LINES: usize = 20;

/// Base environment for every step of one package build.
pub fn step_env(prefix: &Path, host_path: &str, tmp: &Path) -> BTreeMap<String, String> {
  let bin = prefix.join("bin");
  let path = if host_path.is_empty() {
    bin.to_string_lossy().into_owned()
  } else {
    format!("{}:{}", bin.display(), host_path)
  };
  let tmp = tmp.to_string_lossy().into_owned();

  let mut env = BTreeMap::new();
  env.insert("PATH".to_string(), path);
  env.insert("HOME".to_string(), tmp.clone());
  env.insert("TMPDIR".to_string(), tmp);
  env.insert("LANG".to_string(), "C".to_string());
  env.insert("LC_ALL".to_string(), "C".to_string());
  env.insert("SOURCE_DATE_EPOCH".to_string(), SOURCE_DATE_EPOCH.to_string());
  env
}

/// Run `cmd` in `cwd` with exactly `env`.
pub async fn run_command(
  cmd: &str,
  cwd: &Path,
  env: &BTreeMap<String, String>,
  timeout: Option<Duration>,
) -> Result<(), StepError> {
  info!(cmd = %cmd, cwd = %cwd.display(), "executing command");

  let mut child = Command::new("/bin/sh")
    .arg("-c")
    .arg(cmd)
    .current_dir(cwd)
    .env_clear()
    .envs(env)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true)
    .spawn()
    .map_err(StepError::io(cwd))?;

  let tail = Mutex::new(VecDeque::with_capacity(TAIL_LINES));
  let stdout = child.stdout.take();
  let stderr = child.stderr.take();

  let run = async {
    tokio::join!(drain(stdout, "stdout", &tail), drain(stderr, "stderr", &tail));
    child.wait().await
  };

  let status = match timeout {
    Some(limit) => tokio::time::timeout(limit, run).await.map_err(|_| StepError::TimedOut {
      cmd: cmd.to_string(),
      timeout: limit,
    })?,
    None => run.await,
  }
  .map_err(StepError::io(cwd))?;

  if !status.success() {
    let tail = tail.into_inner().unwrap_or_default().into_iter().collect();
    return Err(StepError::Command {
      cmd: cmd.to_string(),
      code: status.code(),
      tail,
    });
  }

  Ok(())
}

async fn drain<R: AsyncRead + Unpin>(reader: Option<R>, stream: &'static str, tail: &Mutex<VecDeque<String>>) {
  let Some(reader) = reader else {
    return;
  };

  let mut lines = BufReader::new(reader).lines();
  while let Ok(Some(line)) = lines.next_line().await {
    debug!(stream, "{line}");
    if let Ok(mut tail) = tail.lock() {
      if tail.len() == TAIL_LINES {
        tail.pop_front();
      }
      tail.push_back(line);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn env_for(temp: &TempDir) -> BTreeMap<String, String> {
    step_env(&temp.path().join("prefix"), "/usr/bin:/bin", temp.path())
  }

  #[test]
  fn prefix_bin_comes_first_on_path() {
    let env = step_env(Path::new("/opt/jb"), "/usr/bin", Path::new("/w/tmp"));

    assert_eq!(env["PATH"], "/opt/jb/bin:/usr/bin");
    assert_eq!(env["TMPDIR"], "/w/tmp");
    assert_eq!(env["SOURCE_DATE_EPOCH"], "315532800");
    assert_eq!(env["LC_ALL"], "C");
  }

  #[tokio::test]
  async fn command_runs_in_working_directory() {
    let temp = TempDir::new().unwrap();

    run_command("echo built > out.txt", temp.path(), &env_for(&temp), None)
      .await
      .unwrap();

    assert_eq!(std::fs::read_to_string(temp.path().join("out.txt")).unwrap(), "built\n");
  }

  #[tokio::test]
  async fn environment_is_rebuilt_from_scratch() {
    let temp = TempDir::new().unwrap();
    let mut env = env_for(&temp);
    env.insert("CXX".to_string(), "g++".to_string());

    run_command(
      "printf '%s|%s' \"$CXX\" \"${CARGO_PKG_NAME:-unset}\" > env.txt",
      temp.path(),
      &env,
      None,
    )
    .await
    .unwrap();

    assert_eq!(std::fs::read_to_string(temp.path().join("env.txt")).unwrap(), "g++|unset");
  }

  #[tokio::test]
  async fn failure_reports_exit_code_and_output_tail() {
    let temp = TempDir::new().unwrap();

    let err = run_command("echo configure: error: no C compiler >&2; exit 77", temp.path(), &env_for(&temp), None)
      .await
      .unwrap_err();

    match err {
      StepError::Command { code, tail, .. } => {
        assert_eq!(code, Some(77));
        assert_eq!(tail, vec!["configure: error: no C compiler"]);
      }
      other => panic!("expected command failure, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn tail_keeps_last_lines() {
    let temp = TempDir::new().unwrap();

    let err = run_command("for i in $(seq 1 30); do echo line$i; done; false", temp.path(), &env_for(&temp), None)
      .await
      .unwrap_err();

    let StepError::Command { tail, .. } = err else {
      panic!("expected command failure");
    };
    assert_eq!(tail.len(), TAIL_LINES);
    assert_eq!(tail.last().map(String::as_str), Some("line30"));
  }

  #[tokio::test]
  async fn slow_command_times_out() {
    let temp = TempDir::new().unwrap();

    let err = run_command("sleep 5", temp.path(), &env_for(&temp), Some(Duration::from_millis(100)))
      .await
      .unwrap_err();

    assert!(matches!(err, StepError::TimedOut { .. }));
  }
}
