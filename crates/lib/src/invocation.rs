//! Compile invocation synthesis.
//!
//! The invocation is a pure function of the manifest: the preamble flags
//! (defines, include paths, code generation and ABI flags) followed by the
//! resolved static-link block. Flags keep `$${prefix}` unresolved until they
//! are rendered, either against a concrete prefix or into the wrapper script
//! that reads the prefix root from its marker file at run time.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::{DEFAULT_OUTPUT_FILE, DEFAULT_SOURCE_FILE, WRAPPER_PREFIX_VAR};
use crate::link::{LibraryLinkNode, LinkOrder};
use crate::placeholder::{Placeholder, PlaceholderError, PrefixResolver, Segment, parse, substitute};
use crate::registry::PackageSpec;

#[derive(Debug, Error)]
pub enum InvocationError {
  #[error(transparent)]
  Placeholder(#[from] PlaceholderError),

  #[error("cannot quote {0:?} for the shell")]
  Quote(String),
}

/// Fixed parts of the compile command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InvocationSettings {
  #[serde(default = "default_compiler")]
  pub compiler: String,
  /// Source file compiled when the wrapper gets no argument.
  #[serde(default = "default_source")]
  pub default_source: String,
  #[serde(default = "default_output")]
  pub output: String,
  /// Macro defines, written without `-D`.
  #[serde(default)]
  pub defines: Vec<String>,
  /// Language standard, optimization and warning flags, in order.
  #[serde(default)]
  pub flags: Vec<String>,
  /// Flags placed right before the library search paths, e.g. `-static`.
  #[serde(default)]
  pub link_flags: Vec<String>,
  /// Prefix-relative library directories.
  #[serde(default = "default_lib_dirs")]
  pub lib_dirs: Vec<String>,
  /// Also record each library directory as a run path.
  #[serde(default = "default_rpath")]
  pub rpath: bool,
}

impl Default for InvocationSettings {
  fn default() -> Self {
    Self {
      compiler: default_compiler(),
      default_source: default_source(),
      output: default_output(),
      defines: Vec::new(),
      flags: Vec::new(),
      link_flags: Vec::new(),
      lib_dirs: default_lib_dirs(),
      rpath: default_rpath(),
    }
  }
}

fn default_compiler() -> String {
  "$${prefix}/bin/g++".to_string()
}

fn default_source() -> String {
  DEFAULT_SOURCE_FILE.to_string()
}

fn default_output() -> String {
  DEFAULT_OUTPUT_FILE.to_string()
}

fn default_lib_dirs() -> Vec<String> {
  vec!["lib64".to_string(), "lib".to_string()]
}

fn default_rpath() -> bool {
  true
}

/// A deterministic compile command template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileInvocation {
  pub compiler: String,
  pub default_source: String,
  pub output: String,
  /// Every flag that is not part of the link block.
  pub preamble: Vec<String>,
  /// The resolved static-link block.
  pub link_block: Vec<String>,
}

/// Combine the fixed flags, the packages' include directories (in build
/// order) and the link order into one invocation.
pub fn synthesize(
  settings: &InvocationSettings,
  packages: &[&PackageSpec],
  libraries: &[LibraryLinkNode],
  link_order: &LinkOrder,
) -> CompileInvocation {
  let defines: BTreeSet<&str> = settings
    .defines
    .iter()
    .chain(libraries.iter().flat_map(|l| &l.defines))
    .map(|d| d.trim_start_matches("-D"))
    .filter(|d| !d.is_empty())
    .collect();

  let mut preamble: Vec<String> = defines.into_iter().map(|d| format!("-D{d}")).collect();

  let mut includes = vec!["-I$${prefix}/include".to_string()];
  for dir in packages.iter().flat_map(|p| &p.include_dirs) {
    let flag = format!("-I$${{prefix}}/{}", dir.trim_matches('/'));
    if !includes.contains(&flag) {
      includes.push(flag);
    }
  }
  preamble.extend(includes);

  preamble.extend(settings.flags.iter().cloned());
  preamble.extend(settings.link_flags.iter().cloned());

  for dir in &settings.lib_dirs {
    let dir = dir.trim_matches('/');
    preamble.push(format!("-L$${{prefix}}/{dir}"));
    if settings.rpath {
      preamble.push(format!("-Wl,-R$${{prefix}}/{dir}"));
    }
  }

  CompileInvocation {
    compiler: settings.compiler.clone(),
    default_source: settings.default_source.clone(),
    output: settings.output.clone(),
    preamble,
    link_block: link_order.flags(),
  }
}

fn quote(arg: &str) -> Result<String, InvocationError> {
  shlex::try_quote(arg)
    .map(|q| q.into_owned())
    .map_err(|_| InvocationError::Quote(arg.to_string()))
}

/// Append `text` to a double-quoted bash word, escaping what bash would
/// otherwise expand.
fn escape_into(word: &mut String, text: &str) {
  for ch in text.chars() {
    if matches!(ch, '"' | '\\' | '$' | '`') {
      word.push('\\');
    }
    word.push(ch);
  }
}

/// Render `token` as a double-quoted bash word with the prefix replaced by
/// the wrapper's prefix variable.
fn wrapper_word(token: &str) -> Result<String, InvocationError> {
  let mut word = String::from("\"");

  for segment in parse(token)? {
    match segment {
      Segment::Literal(text) => escape_into(&mut word, &text),
      Segment::Placeholder(Placeholder::Prefix) => {
        word.push_str(&format!("${{{WRAPPER_PREFIX_VAR}}}"));
      }
      Segment::Placeholder(other) => {
        return Err(PlaceholderError::Unavailable(other.to_string()).into());
      }
    }
  }

  word.push('"');
  Ok(word)
}

impl CompileInvocation {
  /// All flags, preamble first.
  pub fn flags(&self) -> impl Iterator<Item = &String> {
    self.preamble.iter().chain(&self.link_block)
  }

  /// This invocation with `$${prefix}` replaced by `prefix`.
  pub fn resolve(&self, prefix: &Path) -> Result<CompileInvocation, InvocationError> {
    let root = prefix.to_string_lossy();
    let resolver = PrefixResolver(&root);
    let render = |values: &[String]| {
      values
        .iter()
        .map(|v| substitute(v, &resolver))
        .collect::<Result<Vec<_>, _>>()
    };

    Ok(CompileInvocation {
      compiler: substitute(&self.compiler, &resolver)?,
      default_source: self.default_source.clone(),
      output: self.output.clone(),
      preamble: render(&self.preamble)?,
      link_block: render(&self.link_block)?,
    })
  }

  /// A shell command line compiling `source` against `prefix`.
  pub fn command_line(&self, prefix: &Path, source: Option<&str>) -> Result<String, InvocationError> {
    let resolved = self.resolve(prefix)?;
    let source = source.unwrap_or(&resolved.default_source);

    let mut words = vec![
      quote(&resolved.compiler)?,
      quote(source)?,
      "-o".to_string(),
      quote(&resolved.output)?,
    ];
    for flag in resolved.flags() {
      words.push(quote(flag)?);
    }

    Ok(words.join(" "))
  }

  /// A bash wrapper that reads the prefix root from `marker` and compiles
  /// its optional first argument.
  pub fn wrapper_script(&self, marker: &Path) -> Result<String, InvocationError> {
    let marker = quote(&marker.to_string_lossy())?;
    let mut source = String::new();
    escape_into(&mut source, &self.default_source);

    let mut script = String::new();
    script.push_str("#!/usr/bin/env bash\n");
    script.push_str("# Generated by judgebox. Compiles one source file against the provisioned prefix.\n");
    script.push_str("set -euo pipefail\n\n");
    script.push_str(&format!("{WRAPPER_PREFIX_VAR}=\"$(cat {marker})\"\n\n"));
    script.push_str("BUILD_FLAGS=(\n");
    for flag in self.flags() {
      script.push_str("  ");
      script.push_str(&wrapper_word(flag)?);
      script.push('\n');
    }
    script.push_str(")\n\n");
    script.push_str(&format!(
      "exec {} \"${{1:-{source}}}\" -o {} \"${{BUILD_FLAGS[@]}}\"\n",
      wrapper_word(&self.compiler)?,
      wrapper_word(&self.output)?,
    ));

    Ok(script)
  }
}
