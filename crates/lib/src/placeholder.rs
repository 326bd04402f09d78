//! Placeholder parsing and substitution for deferred value resolution.
//!
//! Recipe parameters, toolchain settings and emitted compiler flags refer to
//! locations that are only known when a package is built (the staged source
//! tree) or when the invocation is rendered (the prefix root, which the
//! wrapper script reads from its marker at run time).
//!
//! # Placeholder Formats
//!
//! - `$${prefix}` - root of the install prefix
//! - `$${src}` - staged source tree of the package being built
//! - `$${build}` - out-of-tree build directory of the package being built
//! - `$${jobs}` - parallelism granted to the package's own build system
//! - `$${tool:NAME}` - a resolved toolchain value (`cc`, `cxx`, `launcher`)
//!
//! # Shell Variables
//!
//! Single `$` characters pass through unchanged, so shell variables like
//! `$HOME` and `$(nproc)` work naturally without any escaping.
//!
//! # Escaping
//!
//! Use `$$$` before `{` to produce a literal `$${` sequence.
//!
//! # Example
//!
//! ```
//! use judgebox_lib::placeholder::{parse, Segment, Placeholder};
//!
//! let segments = parse("-I$${prefix}/include").unwrap();
//! assert_eq!(segments, vec![
//!     Segment::Literal("-I".to_string()),
//!     Segment::Placeholder(Placeholder::Prefix),
//!     Segment::Literal("/include".to_string()),
//! ]);
//! ```

use thiserror::Error;

/// A parsed placeholder reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
  /// `$${prefix}`
  Prefix,

  /// `$${src}`
  Src,

  /// `$${build}`
  Build,

  /// `$${jobs}`
  Jobs,

  /// `$${tool:NAME}`
  Tool(String),
}

impl std::fmt::Display for Placeholder {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Placeholder::Prefix => write!(f, "$${{prefix}}"),
      Placeholder::Src => write!(f, "$${{src}}"),
      Placeholder::Build => write!(f, "$${{build}}"),
      Placeholder::Jobs => write!(f, "$${{jobs}}"),
      Placeholder::Tool(name) => write!(f, "$${{tool:{}}}", name),
    }
  }
}

/// A segment of parsed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  /// Literal text (no placeholders)
  Literal(String),

  /// A placeholder to be resolved
  Placeholder(Placeholder),
}

/// Errors that can occur during placeholder parsing or resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaceholderError {
  #[error("unclosed placeholder at position {0}")]
  Unclosed(usize),

  #[error("unknown placeholder: {0}")]
  Unknown(String),

  #[error("malformed placeholder: {0}")]
  Malformed(String),

  #[error("placeholder {0} is not available in this context")]
  Unavailable(String),

  #[error("unknown toolchain value: {0}")]
  UnknownTool(String),
}

/// Trait for resolving placeholder values.
///
/// Every method defaults to `Unavailable` so that a resolver only has to
/// implement the values its context actually knows about.
pub trait Resolver {
  fn resolve_prefix(&self) -> Result<&str, PlaceholderError> {
    Err(PlaceholderError::Unavailable(Placeholder::Prefix.to_string()))
  }

  fn resolve_src(&self) -> Result<&str, PlaceholderError> {
    Err(PlaceholderError::Unavailable(Placeholder::Src.to_string()))
  }

  fn resolve_build(&self) -> Result<&str, PlaceholderError> {
    Err(PlaceholderError::Unavailable(Placeholder::Build.to_string()))
  }

  fn resolve_jobs(&self) -> Result<&str, PlaceholderError> {
    Err(PlaceholderError::Unavailable(Placeholder::Jobs.to_string()))
  }

  fn resolve_tool(&self, name: &str) -> Result<&str, PlaceholderError> {
    Err(PlaceholderError::Unavailable(Placeholder::Tool(name.to_string()).to_string()))
  }
}

/// Resolver that only knows the prefix root.
///
/// Used for toolchain settings and for rendering the compile invocation.
#[derive(Debug, Clone, Copy)]
pub struct PrefixResolver<'a>(pub &'a str);

impl Resolver for PrefixResolver<'_> {
  fn resolve_prefix(&self) -> Result<&str, PlaceholderError> {
    Ok(self.0)
  }
}

/// Parse a string containing placeholders into segments.
///
/// # Errors
///
/// Returns an error if a placeholder is unclosed or names an unknown value.
pub fn parse(input: &str) -> Result<Vec<Segment>, PlaceholderError> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut chars = input.char_indices().peekable();

  while let Some((pos, ch)) = chars.next() {
    if ch != '$' {
      literal.push(ch);
      continue;
    }

    match chars.peek() {
      Some((_, '$')) => {
        chars.next();

        match chars.peek() {
          Some((_, '$')) => {
            chars.next();

            match chars.peek() {
              Some((_, '{')) => {
                // $$${ -> literal $${
                literal.push_str("$${");
                chars.next();
              }
              _ => literal.push_str("$$$"),
            }
          }
          Some((_, '{')) => {
            chars.next();

            if !literal.is_empty() {
              segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }

            let mut content = String::new();
            let mut found_close = false;

            for (_, c) in chars.by_ref() {
              if c == '}' {
                found_close = true;
                break;
              }
              content.push(c);
            }

            if !found_close {
              return Err(PlaceholderError::Unclosed(pos));
            }

            segments.push(Segment::Placeholder(parse_placeholder_content(&content)?));
          }
          _ => literal.push_str("$$"),
        }
      }
      _ => literal.push('$'),
    }
  }

  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }

  Ok(segments)
}

fn parse_placeholder_content(content: &str) -> Result<Placeholder, PlaceholderError> {
  match content {
    "prefix" => Ok(Placeholder::Prefix),
    "src" => Ok(Placeholder::Src),
    "build" => Ok(Placeholder::Build),
    "jobs" => Ok(Placeholder::Jobs),
    _ => match content.split_once(':') {
      Some(("tool", name)) if !name.is_empty() => Ok(Placeholder::Tool(name.to_string())),
      Some(("tool", _)) => Err(PlaceholderError::Malformed(format!("missing tool name in '{content}'"))),
      _ => Err(PlaceholderError::Unknown(content.to_string())),
    },
  }
}

/// Substitute all placeholders in a string using the provided resolver.
pub fn substitute(input: &str, resolver: &impl Resolver) -> Result<String, PlaceholderError> {
  let segments = parse(input)?;
  substitute_segments(&segments, resolver)
}

/// Substitute placeholders in pre-parsed segments.
pub fn substitute_segments(segments: &[Segment], resolver: &impl Resolver) -> Result<String, PlaceholderError> {
  let mut result = String::new();

  for segment in segments {
    match segment {
      Segment::Literal(s) => result.push_str(s),
      Segment::Placeholder(p) => {
        let value = match p {
          Placeholder::Prefix => resolver.resolve_prefix()?,
          Placeholder::Src => resolver.resolve_src()?,
          Placeholder::Build => resolver.resolve_build()?,
          Placeholder::Jobs => resolver.resolve_jobs()?,
          Placeholder::Tool(name) => resolver.resolve_tool(name)?,
        };
        result.push_str(value);
      }
    }
  }

  Ok(result)
}
