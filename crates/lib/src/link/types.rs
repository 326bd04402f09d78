use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::ConfigurationError;

/// One library (or linker flag) in the static-link block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LibraryLinkNode {
  /// Archive name (`boost_json` becomes `-lboost_json`) or a verbatim flag
  /// starting with `-`.
  pub token: String,
  /// Tokens whose symbols this library references.
  #[serde(default)]
  pub depends_on: Vec<String>,
  /// Package that installs the archive.
  #[serde(default)]
  pub package: Option<String>,
  /// Macro defines the library's headers require.
  #[serde(default)]
  pub defines: Vec<String>,
  #[serde(default)]
  pub anchor: Option<Anchor>,
  /// Tokens that must come later without any symbol reference.
  #[serde(default)]
  pub before: Vec<String>,
  /// Opt in to resolving a cycle of three or more members by repetition.
  #[serde(default)]
  pub allow_cycle: bool,
}

impl LibraryLinkNode {
  pub fn new(token: impl Into<String>) -> Self {
    Self {
      token: token.into(),
      depends_on: Vec::new(),
      package: None,
      defines: Vec::new(),
      anchor: None,
      before: Vec::new(),
      allow_cycle: false,
    }
  }

  pub fn depends_on<I, S>(mut self, tokens: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.depends_on.extend(tokens.into_iter().map(Into::into));
    self
  }

  pub fn with_package(mut self, package: impl Into<String>) -> Self {
    self.package = Some(package.into());
    self
  }

  pub fn with_anchor(mut self, anchor: Anchor) -> Self {
    self.anchor = Some(anchor);
    self
  }

  pub fn before<I, S>(mut self, tokens: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.before.extend(tokens.into_iter().map(Into::into));
    self
  }

  pub fn allow_cycle(mut self) -> Self {
    self.allow_cycle = true;
    self
  }
}

/// Render a link token as a compiler flag.
pub fn link_flag(token: &str) -> String {
  if token.starts_with('-') {
    token.to_string()
  } else {
    format!("-l{token}")
  }
}

/// Fixed position preference within the link block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Anchor {
  Front,
  Back,
}

/// Non-fatal note that a token was emitted twice to break a mutual dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatedToken {
  pub token: String,
  /// Members of the dependency cycle in emission order.
  pub cycle: Vec<String>,
}

impl fmt::Display for RepeatedToken {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "link token '{}' repeated to resolve cycle between {}",
      self.token,
      self.cycle.join(", ")
    )
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
  #[error(transparent)]
  Configuration(#[from] ConfigurationError),

  #[error("link token '{token}' depends on unknown token '{dependency}'")]
  UnresolvedDependency { token: String, dependency: String },

  #[error("cyclic link dependency between {} cannot be resolved by repetition", .members.join(", "))]
  CyclicDependency { members: Vec<String> },

  #[error("link order places '{dependency}' before its dependent '{dependent}'")]
  OrderViolation { dependent: String, dependency: String },
}

/// Resolved static-link block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkOrder {
  /// Tokens in link order, repeats included.
  pub tokens: Vec<String>,
  pub diagnostics: Vec<RepeatedToken>,
}

impl LinkOrder {
  /// Compiler flags for the link block.
  pub fn flags(&self) -> Vec<String> {
    self.tokens.iter().map(|t| link_flag(t)).collect()
  }

  /// Verify that every dependency and `before` target occurs after the first
  /// occurrence of the token that names it.
  pub fn check(&self, nodes: &[LibraryLinkNode]) -> Result<(), LinkError> {
    for node in nodes {
      let Some(first) = self.tokens.iter().position(|t| t == &node.token) else {
        continue;
      };

      for dependency in node.depends_on.iter().chain(&node.before) {
        if dependency == &node.token {
          continue;
        }
        if !self.tokens[first + 1..].iter().any(|t| t == dependency) {
          return Err(LinkError::OrderViolation {
            dependent: node.token.clone(),
            dependency: dependency.clone(),
          });
        }
      }
    }

    Ok(())
  }
}
