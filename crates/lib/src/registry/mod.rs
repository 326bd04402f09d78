//! Package registry.
//!
//! The registry owns the package specifications of one manifest in
//! registration order and guarantees the structural invariants every later
//! stage relies on: unique non-empty names, no self-references and no
//! prerequisite that names an undeclared package.

mod types;

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::link::LibraryLinkNode;

pub use types::*;

#[derive(Debug, Clone)]
pub struct Registry {
  packages: Vec<PackageSpec>,
  index: HashMap<String, usize>,
}

impl Registry {
  /// Validate `packages` and build a registry preserving their order.
  pub fn new(packages: Vec<PackageSpec>) -> Result<Self, ConfigurationError> {
    let mut index = HashMap::with_capacity(packages.len());

    for (i, spec) in packages.iter().enumerate() {
      if spec.name.trim().is_empty() {
        return Err(ConfigurationError::EmptyName { index: i });
      }
      if index.insert(spec.name.clone(), i).is_some() {
        return Err(ConfigurationError::DuplicatePackage(spec.name.clone()));
      }
    }

    for spec in &packages {
      for prerequisite in &spec.requires {
        if prerequisite == &spec.name {
          return Err(ConfigurationError::SelfReference(spec.name.clone()));
        }
        if !index.contains_key(prerequisite) {
          return Err(ConfigurationError::UnknownPrerequisite {
            package: spec.name.clone(),
            prerequisite: prerequisite.clone(),
          });
        }
      }
      validate_recipe(spec)?;
    }

    debug!(packages = packages.len(), "registry validated");

    Ok(Self { packages, index })
  }

  /// Packages in registration order.
  pub fn packages(&self) -> &[PackageSpec] {
    &self.packages
  }

  pub fn get(&self, name: &str) -> Option<&PackageSpec> {
    self.index.get(name).map(|&i| &self.packages[i])
  }

  /// Registration position of `name`.
  pub fn position(&self, name: &str) -> Option<usize> {
    self.index.get(name).copied()
  }

  pub fn contains(&self, name: &str) -> bool {
    self.index.contains_key(name)
  }

  pub fn len(&self) -> usize {
    self.packages.len()
  }

  pub fn is_empty(&self) -> bool {
    self.packages.is_empty()
  }

  /// Whether `package` depends on `target` directly or through other packages.
  pub fn requires_transitively(&self, package: &str, target: &str) -> bool {
    let mut seen = HashSet::new();
    let mut stack: Vec<&str> = match self.get(package) {
      Some(spec) => spec.requires.iter().map(String::as_str).collect(),
      None => return false,
    };

    while let Some(name) = stack.pop() {
      if name == target {
        return true;
      }
      if !seen.insert(name) {
        continue;
      }
      if let Some(spec) = self.get(name) {
        stack.extend(spec.requires.iter().map(String::as_str));
      }
    }

    false
  }

  /// Every package other than the toolchain provider must (transitively)
  /// require it, otherwise it could be built with a different compiler.
  pub fn check_toolchain_provider(&self, provider: &str) -> Result<(), ConfigurationError> {
    if !self.contains(provider) {
      return Err(ConfigurationError::UnknownToolchainProvider(provider.to_string()));
    }

    for spec in &self.packages {
      if spec.name != provider && !self.requires_transitively(&spec.name, provider) {
        return Err(ConfigurationError::UndeclaredToolchainDependency {
          package: spec.name.clone(),
          provider: provider.to_string(),
        });
      }
    }

    Ok(())
  }

  /// Cross-check the library manifest against the registry.
  pub fn check_libraries(&self, libraries: &[LibraryLinkNode]) -> Result<(), ConfigurationError> {
    let mut tokens = HashSet::new();

    for node in libraries {
      if !tokens.insert(node.token.as_str()) {
        return Err(ConfigurationError::DuplicateToken(node.token.clone()));
      }
      if let Some(package) = &node.package
        && !self.contains(package)
      {
        return Err(ConfigurationError::UnknownLibraryPackage {
          token: node.token.clone(),
          package: package.clone(),
        });
      }
    }

    Ok(())
  }
}

fn validate_recipe(spec: &PackageSpec) -> Result<(), ConfigurationError> {
  let invalid = |reason: &str| ConfigurationError::InvalidPackage {
    package: spec.name.clone(),
    reason: reason.to_string(),
  };

  if spec.version.trim().is_empty() {
    return Err(invalid("empty version"));
  }

  let (copies, rewrites) = match &spec.recipe {
    Recipe::HeaderCopy(recipe) => (recipe.copy.as_slice(), recipe.rewrite.as_slice()),
    Recipe::SystemPackage(recipe) => (recipe.relocate.as_slice(), recipe.rewrite.as_slice()),
    _ => (&[][..], &[][..]),
  };
  let destinations = copies.iter().map(|c| c.to.as_str()).chain(rewrites.iter().map(|r| r.file.as_str()));
  for destination in destinations {
    if !is_prefix_relative(destination) {
      return Err(invalid(&format!("'{destination}' must be a relative path inside the prefix")));
    }
  }

  match &spec.recipe {
    Recipe::HeaderCopy(recipe) if recipe.copy.is_empty() => Err(invalid("header-copy recipe without copy rules")),
    Recipe::SystemPackage(recipe) if recipe.package.trim().is_empty() => {
      Err(invalid("system-package recipe without a package name"))
    }
    Recipe::SystemPackage(_) if spec.source != SourceLocator::None => {
      Err(invalid("system packages are installed by the package manager and take no source"))
    }
    Recipe::Autotools(_) | Recipe::Cmake(_) | Recipe::HeaderCopy(_) if spec.source == SourceLocator::None => {
      Err(invalid("recipe needs a source"))
    }
    _ => Ok(()),
  }
}

fn is_prefix_relative(path: &str) -> bool {
  let path = std::path::Path::new(path);
  !path.as_os_str().is_empty()
    && path
      .components()
      .all(|c| matches!(c, std::path::Component::Normal(_) | std::path::Component::CurDir))
}
