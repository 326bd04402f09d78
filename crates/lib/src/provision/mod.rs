//! Provisioning orchestration.
//!
//! A run is all-or-nothing:
//!
//! 1. Validate the manifest and resolve the build order, the link order and
//!    the compile invocation
//! 2. Lock the prefix and create it fresh
//! 3. Build every package in order against the shared prefix
//! 4. Write the marker, the compile wrapper, the info file and the build record
//!
//! Any failure after the prefix exists discards it, unless the caller asked
//! to keep it for inspection.

mod types;

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{error, info, warn};

use crate::build::{BuildReport, BuilderSettings, PackageBuilder};
use crate::consts::BUILD_RECORD_FILENAME;
use crate::invocation::{self, CompileInvocation};
use crate::link::{self, LinkOrder};
use crate::manifest::Manifest;
use crate::platform;
use crate::prefix::{InstallPrefix, PrefixLock};
use crate::registry::{PackageSpec, Registry};
use crate::toolchain::ToolchainDescriptor;
use crate::util::hash::Hashable;

pub use types::*;

/// Everything derived from a manifest before anything is built.
#[derive(Debug, Clone)]
pub struct Plan {
  registry: Registry,
  build_order: Vec<String>,
  link_order: LinkOrder,
  invocation: CompileInvocation,
}

impl Plan {
  pub fn from_manifest(manifest: &Manifest) -> Result<Self, ProvisionError> {
    let registry = Registry::new(manifest.packages.clone())?;
    if let Some(provider) = &manifest.settings.toolchain.provided_by {
      registry.check_toolchain_provider(provider)?;
    }
    registry.check_libraries(&manifest.libraries)?;

    let build_order = registry.build_order()?;
    let link_order = link::resolve(&manifest.libraries)?;
    link_order.check(&manifest.libraries)?;

    let packages: Vec<&PackageSpec> = build_order.iter().filter_map(|name| registry.get(name)).collect();
    let invocation = invocation::synthesize(
      &manifest.settings.invocation,
      &packages,
      &manifest.libraries,
      &link_order,
    );

    Ok(Self {
      registry,
      build_order,
      link_order,
      invocation,
    })
  }

  pub fn build_order(&self) -> &[String] {
    &self.build_order
  }

  /// Package specifications in build order.
  pub fn packages(&self) -> impl Iterator<Item = &PackageSpec> {
    self.build_order.iter().filter_map(|name| self.registry.get(name))
  }

  pub fn link_order(&self) -> &LinkOrder {
    &self.link_order
  }

  pub fn invocation(&self) -> &CompileInvocation {
    &self.invocation
  }
}

fn builder_for(manifest: &Manifest, prefix: &Path, options: &ProvisionOptions) -> PackageBuilder {
  let settings = &manifest.settings;
  let toolchain = ToolchainDescriptor::new(
    settings.toolchain.clone(),
    prefix,
    &settings.cache_dir(),
    platform::default_jobs(),
  );

  let mut builder_settings = BuilderSettings::new(&settings.work_dir());
  builder_settings.package_manager = settings.package_manager.clone();
  builder_settings.step_timeout = options.step_timeout;

  PackageBuilder::new(toolchain, builder_settings)
}

/// Resolve every package's steps without building anything.
pub fn describe(manifest: &Manifest, options: &ProvisionOptions) -> Result<Vec<PackagePlan>, ProvisionError> {
  let manifest = &anchored(manifest)?;
  let plan = Plan::from_manifest(manifest)?;
  let builder = builder_for(manifest, &manifest.settings.prefix, options);

  let mut plans = Vec::new();
  for spec in plan.packages() {
    let steps = builder.describe(spec)?;
    for step in &steps {
      info!(package = %spec.name, step = %step.step, detail = %step.detail, "dry run");
    }
    plans.push(PackagePlan {
      package: spec.name.clone(),
      version: spec.version.clone(),
      steps,
    });
  }

  Ok(plans)
}

/// Provision the prefix described by `manifest` from scratch.
pub async fn provision(manifest: &Manifest, options: &ProvisionOptions) -> Result<ProvisionReport, ProvisionError> {
  let started = Instant::now();
  let manifest = &anchored(manifest)?;
  let plan = Plan::from_manifest(manifest)?;
  let settings = &manifest.settings;

  let _lock = PrefixLock::acquire(&settings.prefix, &options.command)?;
  if options.clean {
    InstallPrefix::clean(&settings.prefix)?;
  }
  let mut prefix = InstallPrefix::create(&settings.prefix)?;

  info!(
    prefix = %prefix.root().display(),
    packages = plan.build_order().len(),
    "provisioning started"
  );

  match populate(manifest, &plan, &mut prefix, options).await {
    Ok(mut report) => {
      report.duration = started.elapsed();
      info!(prefix = %report.prefix.display(), duration = ?report.duration, "provisioning finished");
      Ok(report)
    }
    Err(err) => {
      error!(error = %err, "provisioning failed");
      if options.keep_failed {
        warn!(prefix = %prefix.root().display(), "keeping prefix of failed run");
      } else if let Err(discard_err) = prefix.discard() {
        error!(error = %discard_err, "failed to discard prefix");
      }
      Err(err)
    }
  }
}

async fn populate(
  manifest: &Manifest,
  plan: &Plan,
  prefix: &mut InstallPrefix,
  options: &ProvisionOptions,
) -> Result<ProvisionReport, ProvisionError> {
  let settings = &manifest.settings;
  let cache_dir = settings.cache_dir();
  tokio::fs::create_dir_all(&cache_dir).await.map_err(write_err(&cache_dir))?;

  let builder = builder_for(manifest, prefix.root(), options);
  let mut builds = Vec::with_capacity(plan.build_order().len());
  for spec in plan.packages() {
    builds.push(builder.build(spec, prefix).await?);
  }

  prefix.write_marker(&settings.marker)?;

  let wrapper = settings.wrapper.clone();
  let script = plan.invocation().wrapper_script(&settings.marker)?;
  write_file(&wrapper, script.as_bytes()).await?;
  make_executable(&wrapper).await?;

  let info_path = settings.info_path();
  write_file(&info_path, info_listing(&builds).as_bytes()).await?;

  let record_path = record_path(prefix.root());
  let record = BuildRecord {
    judgebox_version: env!("CARGO_PKG_VERSION").to_string(),
    manifest_digest: manifest.digest()?,
    prefix: prefix.root().to_path_buf(),
    packages: builds.clone(),
    link_order: plan.link_order().tokens.clone(),
  };
  write_file(&record_path, serde_json::to_string_pretty(&record)?.as_bytes()).await?;

  Ok(ProvisionReport {
    prefix: prefix.root().to_path_buf(),
    builds,
    link_order: plan.link_order().clone(),
    invocation: plan.invocation().clone(),
    wrapper,
    marker: settings.marker.clone(),
    info: info_path,
    record: record_path,
    duration: Default::default(),
  })
}

/// `manifest` with its output locations made absolute.
fn anchored(manifest: &Manifest) -> Result<Manifest, ProvisionError> {
  let mut manifest = manifest.clone();
  manifest.settings.make_absolute()?;
  Ok(manifest)
}

/// One `name version` line per installed package.
pub fn info_listing(builds: &[BuildReport]) -> String {
  builds.iter().map(|b| format!("{} {}\n", b.package, b.version)).collect()
}

fn write_err(path: &Path) -> impl FnOnce(std::io::Error) -> ProvisionError + '_ {
  move |source| ProvisionError::Write {
    path: path.to_path_buf(),
    source,
  }
}

async fn write_file(path: &Path, contents: &[u8]) -> Result<(), ProvisionError> {
  if let Some(parent) = path.parent() {
    tokio::fs::create_dir_all(parent).await.map_err(write_err(parent))?;
  }
  tokio::fs::write(path, contents).await.map_err(write_err(path))
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> Result<(), ProvisionError> {
  use std::os::unix::fs::PermissionsExt;

  tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
    .await
    .map_err(write_err(path))
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> Result<(), ProvisionError> {
  Ok(())
}

/// Default location of the build record for a prefix.
pub fn record_path(prefix: &Path) -> PathBuf {
  prefix.join(BUILD_RECORD_FILENAME)
}
