//! Translation of a recipe into an ordered list of build steps.
//!
//! Planning is pure: commands still carry `$${...}` placeholders, which are
//! resolved against the concrete workspace when each step runs. Manifest
//! arguments are shell-quoted before substitution so they reach the build
//! system verbatim.

use crate::registry::{
  AutotoolsRecipe, CmakeRecipe, CopyRule, HeaderCopyRecipe, PackageSpec, Recipe, RewriteRule, SourceLocator,
  SystemPackageRecipe,
};
use crate::toolchain::{PackageManagerSettings, Toolchain};

use super::types::{BuildStep, StepError};

/// Directory a command runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkDir {
  /// Staged source tree.
  Src,
  /// Out-of-tree build directory, created on first use.
  Build,
  /// Workspace root, for steps that do not touch sources.
  Workspace,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepAction {
  Fetch,
  Stage,
  /// Source-relative paths to delete.
  Prune(Vec<String>),
  Cmd { cmd: String, cwd: WorkDir },
  /// Copies from the staged sources into the prefix.
  Copy(Vec<CopyRule>),
  /// Copies from absolute host paths into the prefix.
  Relocate(Vec<CopyRule>),
  Rewrite(Vec<RewriteRule>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedStep {
  pub step: BuildStep,
  pub action: StepAction,
}

impl PlannedStep {
  fn new(step: BuildStep, action: StepAction) -> Self {
    Self { step, action }
  }

  fn cmd(step: BuildStep, cmd: String, cwd: WorkDir) -> Self {
    Self::new(step, StepAction::Cmd { cmd, cwd })
  }
}

pub(crate) fn quote(arg: &str) -> Result<String, StepError> {
  shlex::try_quote(arg)
    .map(|q| q.into_owned())
    .map_err(|_| StepError::Quote(arg.to_string()))
}

fn join_quoted<'a>(command: &str, args: impl IntoIterator<Item = &'a str>) -> Result<String, StepError> {
  let mut line = command.to_string();
  for arg in args {
    line.push(' ');
    line.push_str(&quote(arg)?);
  }
  Ok(line)
}

/// Plan every step needed to build and install `spec`.
pub fn plan_steps(
  spec: &PackageSpec,
  toolchain: &Toolchain,
  package_manager: &PackageManagerSettings,
) -> Result<Vec<PlannedStep>, StepError> {
  let mut steps = Vec::new();

  if spec.source != SourceLocator::None {
    steps.push(PlannedStep::new(BuildStep::Fetch, StepAction::Fetch));
    steps.push(PlannedStep::new(BuildStep::Stage, StepAction::Stage));
    if !spec.prune.is_empty() {
      steps.push(PlannedStep::new(BuildStep::Prune, StepAction::Prune(spec.prune.clone())));
    }
  }

  match &spec.recipe {
    Recipe::Autotools(recipe) => plan_autotools(recipe, &mut steps)?,
    Recipe::Cmake(recipe) => plan_cmake(recipe, toolchain, &mut steps)?,
    Recipe::HeaderCopy(recipe) => plan_header_copy(recipe, &mut steps),
    Recipe::SystemPackage(recipe) => plan_system_package(recipe, package_manager, &mut steps)?,
  }

  Ok(steps)
}

fn plan_autotools(recipe: &AutotoolsRecipe, steps: &mut Vec<PlannedStep>) -> Result<(), StepError> {
  let cwd = if recipe.out_of_tree { WorkDir::Build } else { WorkDir::Src };

  for cmd in recipe.bootstrap.iter().filter(|c| !c.is_empty()) {
    steps.push(PlannedStep::cmd(BuildStep::Bootstrap, cmd.clone(), WorkDir::Src));
  }

  let default_configure = if recipe.out_of_tree {
    "$${src}/configure"
  } else {
    "./configure"
  };
  let configure = recipe.configure.as_deref().unwrap_or(default_configure);
  if !configure.is_empty() {
    let prefix_arg = recipe.prefix_arg.then_some("--prefix=$${prefix}");
    let args = recipe.configure_args.iter().map(String::as_str).chain(prefix_arg);
    steps.push(PlannedStep::cmd(BuildStep::Configure, join_quoted(configure, args)?, cwd));
  }

  let build = recipe.build.as_deref().unwrap_or("make -j$${jobs}");
  if !build.is_empty() {
    steps.push(PlannedStep::cmd(BuildStep::Build, build.to_string(), cwd));
  }

  let install = recipe.install.as_deref().unwrap_or("make install");
  if !install.is_empty() {
    steps.push(PlannedStep::cmd(BuildStep::Install, install.to_string(), cwd));
  }

  Ok(())
}

fn plan_cmake(recipe: &CmakeRecipe, toolchain: &Toolchain, steps: &mut Vec<PlannedStep>) -> Result<(), StepError> {
  let generator = recipe.generator.as_deref().unwrap_or("Ninja");
  let build_type = recipe.build_type.as_deref().unwrap_or("Release");
  let source_dir = match &recipe.source_dir {
    Some(dir) => format!("$${{src}}/{dir}"),
    None => "$${src}".to_string(),
  };

  let mut args = vec![
    "-G".to_string(),
    generator.to_string(),
    "-S".to_string(),
    source_dir,
    "-B".to_string(),
    "$${build}".to_string(),
    format!("-DCMAKE_BUILD_TYPE={build_type}"),
  ];
  args.extend(toolchain.cmake_args());
  args.push("-DCMAKE_INSTALL_PREFIX=$${prefix}".to_string());
  args.push("-DCMAKE_PREFIX_PATH=$${prefix}".to_string());
  args.push("-DCMAKE_INSTALL_MESSAGE=NEVER".to_string());

  let cxx_flags: Vec<&str> = toolchain
    .cxxflags
    .iter()
    .chain(&recipe.cxx_flags)
    .map(String::as_str)
    .collect();
  if !cxx_flags.is_empty() {
    args.push(format!("-DCMAKE_CXX_FLAGS={}", cxx_flags.join(" ")));
  }
  args.extend(recipe.defines.iter().map(|d| format!("-D{d}")));

  steps.push(PlannedStep::cmd(
    BuildStep::Configure,
    join_quoted("cmake", args.iter().map(String::as_str))?,
    WorkDir::Src,
  ));
  steps.push(PlannedStep::cmd(
    BuildStep::Build,
    join_quoted("cmake --build $${build} --config", [build_type])? + " --parallel $${jobs}",
    WorkDir::Src,
  ));
  steps.push(PlannedStep::cmd(
    BuildStep::Install,
    join_quoted("cmake --install $${build} --config", [build_type])?,
    WorkDir::Src,
  ));

  Ok(())
}

fn plan_header_copy(recipe: &HeaderCopyRecipe, steps: &mut Vec<PlannedStep>) {
  steps.push(PlannedStep::new(BuildStep::Copy, StepAction::Copy(recipe.copy.clone())));
  if !recipe.rewrite.is_empty() {
    steps.push(PlannedStep::new(BuildStep::Rewrite, StepAction::Rewrite(recipe.rewrite.clone())));
  }
}

fn plan_system_package(
  recipe: &SystemPackageRecipe,
  package_manager: &PackageManagerSettings,
  steps: &mut Vec<PlannedStep>,
) -> Result<(), StepError> {
  if let Some(refresh) = package_manager.refresh.as_deref().filter(|r| !r.is_empty()) {
    steps.push(PlannedStep::cmd(BuildStep::Install, refresh.to_string(), WorkDir::Workspace));
  }
  steps.push(PlannedStep::cmd(
    BuildStep::Install,
    join_quoted(&package_manager.install, [recipe.package_arg().as_str()])?,
    WorkDir::Workspace,
  ));

  if !recipe.relocate.is_empty() {
    steps.push(PlannedStep::new(BuildStep::Relocate, StepAction::Relocate(recipe.relocate.clone())));
  }
  if !recipe.rewrite.is_empty() {
    steps.push(PlannedStep::new(BuildStep::Rewrite, StepAction::Rewrite(recipe.rewrite.clone())));
  }
  if recipe.remove {
    steps.push(PlannedStep::cmd(
      BuildStep::RemoveSystemPackage,
      join_quoted(&package_manager.remove, [recipe.package.as_str()])?,
      WorkDir::Workspace,
    ));
  }

  Ok(())
}
