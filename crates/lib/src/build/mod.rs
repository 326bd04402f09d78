//! Package builds.
//!
//! A build fetches the package sources, stages them into a throwaway
//! workspace, runs the recipe steps against the shared prefix and finally
//! verifies that the prefix only changed where the package said it would.
//! The workspace is discarded when the build returns, successful or not.

mod cmd;
mod fetch;
mod fs;
mod recipe;
mod types;
mod workspace;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

use crate::placeholder::{PlaceholderError, Resolver, substitute};
use crate::prefix::InstallPrefix;
use crate::registry::{CopyRule, PackageSpec, RewriteRule, SourceLocator};
use crate::toolchain::{PackageManagerSettings, Toolchain, ToolchainDescriptor};

pub use cmd::{run_command, step_env};
pub use fetch::{Fetched, fetch_source, url_to_filename};
pub use fs::{copy_tree, remove_path, rewrite_file, strip_components};
pub use recipe::{PlannedStep, StepAction, WorkDir, plan_steps};
pub use types::*;
pub use workspace::Workspace;

/// Builder configuration shared by every package of a run.
#[derive(Debug, Clone)]
pub struct BuilderSettings {
  /// Directory that holds the per-package workspaces.
  pub work_dir: PathBuf,
  pub package_manager: PackageManagerSettings,
  /// Limit for any single command.
  pub step_timeout: Option<Duration>,
  /// Host `PATH` appended after the prefix's `bin`.
  pub host_path: String,
}

impl BuilderSettings {
  pub fn new(work_dir: &Path) -> Self {
    Self {
      work_dir: work_dir.to_path_buf(),
      package_manager: PackageManagerSettings::default(),
      step_timeout: None,
      host_path: crate::platform::host_path(),
    }
  }
}

/// One step as it would run, for dry runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepDescription {
  pub step: BuildStep,
  pub detail: String,
}

impl fmt::Display for StepDescription {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[{}] {}", self.step, self.detail)
  }
}

/// Placeholder values for one package build.
struct StepResolver {
  prefix: String,
  src: String,
  build: String,
  jobs: String,
  cc: String,
  cxx: String,
  launcher: String,
}

impl StepResolver {
  fn new(prefix: &Path, src: &Path, build: &Path, toolchain: &Toolchain) -> Self {
    Self {
      prefix: prefix.to_string_lossy().into_owned(),
      src: src.to_string_lossy().into_owned(),
      build: build.to_string_lossy().into_owned(),
      jobs: toolchain.jobs.to_string(),
      cc: toolchain.cc.clone(),
      cxx: toolchain.cxx.clone(),
      launcher: toolchain.launcher.clone().unwrap_or_default(),
    }
  }
}

impl Resolver for StepResolver {
  fn resolve_prefix(&self) -> Result<&str, PlaceholderError> {
    Ok(&self.prefix)
  }

  fn resolve_src(&self) -> Result<&str, PlaceholderError> {
    Ok(&self.src)
  }

  fn resolve_build(&self) -> Result<&str, PlaceholderError> {
    Ok(&self.build)
  }

  fn resolve_jobs(&self) -> Result<&str, PlaceholderError> {
    Ok(&self.jobs)
  }

  fn resolve_tool(&self, name: &str) -> Result<&str, PlaceholderError> {
    match name {
      "cc" => Ok(&self.cc),
      "cxx" => Ok(&self.cxx),
      "launcher" => Ok(&self.launcher),
      _ => Err(PlaceholderError::UnknownTool(name.to_string())),
    }
  }
}

fn strip_levels(source: &SourceLocator) -> usize {
  match source {
    SourceLocator::Url { strip_components, .. } | SourceLocator::Path { strip_components, .. } => *strip_components,
    SourceLocator::None => 0,
  }
}

fn unpack_command(archive: &Path, dest: &Path) -> Result<String, StepError> {
  let name = archive
    .file_name()
    .map(|n| n.to_string_lossy().to_lowercase())
    .unwrap_or_default();
  let archive_arg = recipe::quote(&archive.to_string_lossy())?;
  let dest_arg = recipe::quote(&dest.to_string_lossy())?;

  if name.ends_with(".zip") {
    Ok(format!("unzip -q {archive_arg} -d {dest_arg}"))
  } else if [".tar.gz", ".tgz", ".tar.bz2", ".tbz2", ".tar.xz", ".txz", ".tar"]
    .iter()
    .any(|ext| name.ends_with(ext))
  {
    Ok(format!("tar -xf {archive_arg} -C {dest_arg}"))
  } else {
    Err(StepError::Archive(archive.display().to_string()))
  }
}

/// Runs package recipes against an install prefix.
#[derive(Debug, Clone)]
pub struct PackageBuilder {
  toolchain: ToolchainDescriptor,
  settings: BuilderSettings,
}

impl PackageBuilder {
  pub fn new(toolchain: ToolchainDescriptor, settings: BuilderSettings) -> Self {
    Self { toolchain, settings }
  }

  pub fn settings(&self) -> &BuilderSettings {
    &self.settings
  }

  /// Build `spec` into `prefix`. Every prerequisite must already be
  /// installed there.
  pub async fn build(&self, spec: &PackageSpec, prefix: &mut InstallPrefix) -> Result<BuildReport, BuildError> {
    let name = spec.name.as_str();
    let started = Instant::now();
    info!(package = %name, version = %spec.version, kind = %spec.recipe.kind(), "building package");

    let toolchain = self
      .toolchain
      .for_package(spec)
      .map_err(|e| StepError::from(e).at(name, BuildStep::Configure))?;
    let steps = plan_steps(spec, &toolchain, &self.settings.package_manager).map_err(|e| e.at(name, BuildStep::Configure))?;

    let before = prefix
      .fingerprint()
      .map_err(|e| StepError::from(e).at(name, BuildStep::VerifyPrefix))?;

    let workspace = Workspace::create(&self.settings.work_dir, name).map_err(|e| e.at(name, BuildStep::Fetch))?;
    let resolver = StepResolver::new(prefix.root(), workspace.src(), workspace.build(), &toolchain);

    let mut env = step_env(prefix.root(), &self.settings.host_path, workspace.tmp());
    env.extend(toolchain.env(prefix.root()));
    for (key, value) in &spec.env {
      let value = substitute(value, &resolver).map_err(|e| StepError::from(e).at(name, BuildStep::Configure))?;
      env.insert(key.clone(), value);
    }

    let mut fetched = None;
    for planned in &steps {
      debug!(package = %name, step = %planned.step, "running step");
      self
        .run_step(spec, &planned.action, &workspace, prefix.root(), &resolver, &env, &mut fetched)
        .await
        .map_err(|e| e.at(name, planned.step))?;
    }

    let changes = prefix
      .record(spec, &before)
      .map_err(|e| StepError::from(e).at(name, BuildStep::VerifyPrefix))?;
    drop(workspace);

    let duration = started.elapsed();
    info!(package = %name, duration = ?duration, files = changes.added.len(), "package installed");

    Ok(BuildReport {
      package: spec.name.clone(),
      version: spec.version.clone(),
      kind: spec.recipe.kind(),
      duration,
      changes,
    })
  }

  #[allow(clippy::too_many_arguments)]
  async fn run_step(
    &self,
    spec: &PackageSpec,
    action: &StepAction,
    workspace: &Workspace,
    prefix: &Path,
    resolver: &StepResolver,
    env: &BTreeMap<String, String>,
    fetched: &mut Option<Fetched>,
  ) -> Result<(), StepError> {
    match action {
      StepAction::Fetch => {
        *fetched = fetch_source(&spec.source, workspace.downloads()).await?;
      }
      StepAction::Stage => self.stage(fetched.as_ref(), strip_levels(&spec.source), workspace, env).await?,
      StepAction::Prune(paths) => {
        for path in paths {
          remove_path(&workspace.src().join(substitute(path, resolver)?))?;
        }
      }
      StepAction::Cmd { cmd, cwd } => {
        let cwd = match cwd {
          WorkDir::Src => workspace.src(),
          WorkDir::Build => workspace.build(),
          WorkDir::Workspace => workspace.root(),
        };
        std::fs::create_dir_all(cwd).map_err(StepError::io(cwd))?;
        run_command(&substitute(cmd, resolver)?, cwd, env, self.settings.step_timeout).await?;
      }
      StepAction::Copy(rules) => {
        for rule in rules {
          let from = workspace.src().join(substitute(&rule.from, resolver)?);
          copy_rule(rule, &from, prefix, resolver)?;
        }
      }
      StepAction::Relocate(rules) => {
        for rule in rules {
          let from = PathBuf::from(substitute(&rule.from, resolver)?);
          copy_rule(rule, &from, prefix, resolver)?;
        }
      }
      StepAction::Rewrite(rules) => {
        for rule in rules {
          rewrite_rule(rule, prefix, resolver)?;
        }
      }
    }

    Ok(())
  }

  async fn stage(
    &self,
    fetched: Option<&Fetched>,
    strip: usize,
    workspace: &Workspace,
    env: &BTreeMap<String, String>,
  ) -> Result<(), StepError> {
    let src = workspace.src();

    match fetched {
      Some(Fetched::Directory(dir)) => {
        copy_tree(dir, src, &[])?;
      }
      Some(Fetched::Archive(archive)) => {
        let unpack = workspace.unpack_dir();
        std::fs::create_dir_all(&unpack).map_err(StepError::io(unpack.as_path()))?;
        run_command(
          &unpack_command(archive, &unpack)?,
          workspace.root(),
          env,
          self.settings.step_timeout,
        )
        .await?;
        let top = strip_components(&unpack, strip)?;
        std::fs::rename(&top, src).map_err(StepError::io(top.as_path()))?;
      }
      None => std::fs::create_dir_all(src).map_err(StepError::io(src))?,
    }

    Ok(())
  }

  /// Resolve every step of `spec` without touching the file system.
  pub fn describe(&self, spec: &PackageSpec) -> Result<Vec<StepDescription>, BuildError> {
    let name = spec.name.as_str();
    let toolchain = self
      .toolchain
      .for_package(spec)
      .map_err(|e| StepError::from(e).at(name, BuildStep::Configure))?;
    let steps = plan_steps(spec, &toolchain, &self.settings.package_manager).map_err(|e| e.at(name, BuildStep::Configure))?;

    let root = self.settings.work_dir.join(format!("{name}-XXXXXX"));
    let prefix = self.toolchain.prefix();
    let resolver = StepResolver::new(prefix, &root.join("src"), &root.join("src").join("build"), &toolchain);

    let mut described = Vec::with_capacity(steps.len());
    for planned in &steps {
      let detail = describe_action(spec, &planned.action, prefix, &resolver).map_err(|e| e.at(name, planned.step))?;
      described.push(StepDescription {
        step: planned.step,
        detail,
      });
    }

    Ok(described)
  }
}

fn copy_rule(rule: &CopyRule, from: &Path, prefix: &Path, resolver: &StepResolver) -> Result<(), StepError> {
  let to = prefix.join(substitute(&rule.to, resolver)?);
  copy_tree(from, &to, &rule.exclude)?;
  Ok(())
}

fn rewrite_rule(rule: &RewriteRule, prefix: &Path, resolver: &StepResolver) -> Result<(), StepError> {
  let file = prefix.join(substitute(&rule.file, resolver)?);
  let to = substitute(&rule.to, resolver)?;
  if !rewrite_file(&file, &rule.from, &to)? {
    debug!(file = %file.display(), from = %rule.from, "rewrite found nothing to replace");
  }
  Ok(())
}

fn describe_action(
  spec: &PackageSpec,
  action: &StepAction,
  prefix: &Path,
  resolver: &StepResolver,
) -> Result<String, StepError> {
  let rules = |rules: &[CopyRule], base: Option<&str>| -> Result<String, StepError> {
    let mut parts = Vec::with_capacity(rules.len());
    for rule in rules {
      let from = substitute(&rule.from, resolver)?;
      let from = match base {
        Some(base) => format!("{base}/{from}"),
        None => from,
      };
      let to = prefix.join(substitute(&rule.to, resolver)?);
      parts.push(format!("{from} -> {}", to.display()));
    }
    Ok(parts.join(", "))
  };

  let detail = match action {
    StepAction::Fetch => match &spec.source {
      SourceLocator::Url { url, .. } => url.clone(),
      SourceLocator::Path { path, .. } => path.display().to_string(),
      SourceLocator::None => String::new(),
    },
    StepAction::Stage => resolver.src.clone(),
    StepAction::Prune(paths) => paths.join(", "),
    StepAction::Cmd { cmd, .. } => substitute(cmd, resolver)?,
    StepAction::Copy(copies) => rules(copies, Some(&resolver.src))?,
    StepAction::Relocate(copies) => rules(copies, None)?,
    StepAction::Rewrite(rewrites) => {
      let mut parts = Vec::with_capacity(rewrites.len());
      for rule in rewrites {
        parts.push(format!(
          "{}: {} -> {}",
          substitute(&rule.file, resolver)?,
          rule.from,
          substitute(&rule.to, resolver)?
        ));
      }
      parts.join(", ")
    }
  };

  Ok(detail)
}
