//! Terminal and JSON output for the commands.
//!
//! Status lines go through [`print_status`]; anything machine-readable goes
//! through [`print_json`]. Colors are applied only when the stream supports them.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

/// Kind of a one-line status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
  Success,
  Warning,
  Error,
}

impl Status {
  fn symbol(self) -> &'static str {
    match self {
      Status::Success => "✓",
      Status::Warning => "⚠",
      Status::Error => "✗",
    }
  }

  /// Successes go to stdout, problems to stderr.
  fn stream(self) -> Stream {
    match self {
      Status::Success => Stream::Stdout,
      Status::Warning | Status::Error => Stream::Stderr,
    }
  }
}

pub fn print_status(status: Status, message: &str) {
  let stream = status.stream();
  let symbol = status.symbol();
  let line = match status {
    Status::Success => format!("{} {message}", symbol.if_supports_color(stream, |s| s.green())),
    Status::Warning => format!(
      "{} {}",
      symbol.if_supports_color(stream, |s| s.yellow()),
      message.if_supports_color(stream, |s| s.yellow())
    ),
    Status::Error => format!(
      "{} {}",
      symbol.if_supports_color(stream, |s| s.red()),
      message.if_supports_color(stream, |s| s.red())
    ),
  };

  match stream {
    Stream::Stdout => println!("{line}"),
    _ => eprintln!("{line}"),
  }
}

pub fn print_success(message: &str) {
  print_status(Status::Success, message);
}

pub fn print_warning(message: &str) {
  print_status(Status::Warning, message);
}

pub fn print_error(message: &str) {
  print_status(Status::Error, message);
}

/// `  label: value`, with a dimmed label.
pub fn print_stat(label: &str, value: &str) {
  println!("  {}: {value}", label.if_supports_color(Stream::Stdout, |s| s.dimmed()));
}

/// One resolved build step of a dry run.
pub fn print_step(step: &str, detail: &str) {
  println!("    → {} {detail}", step.if_supports_color(Stream::Stdout, |s| s.cyan()));
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{json}");
  Ok(())
}

/// First 12 hex digits of a digest.
pub fn short_digest(digest: &str) -> &str {
  &digest[..digest.len().min(12)]
}

/// Human-readable duration, rounded to 10ms below a minute and to whole
/// seconds above.
pub fn format_duration(duration: Duration) -> String {
  let rounded = if duration.as_secs() >= 60 {
    Duration::from_secs(duration.as_secs())
  } else {
    Duration::from_millis(duration.as_millis() as u64 / 10 * 10)
  };
  if rounded.is_zero() {
    return "0ms".to_string();
  }
  humantime::format_duration(rounded).to_string()
}
