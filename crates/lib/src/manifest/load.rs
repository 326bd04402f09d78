//! Manifest loading from JSON or Lua.

use std::path::{Path, PathBuf};

use mlua::prelude::*;
use tracing::{debug, info};

use super::types::{Manifest, ManifestError};

/// Load the manifest at `path`.
///
/// `.lua` files are evaluated and must return the manifest table; while the
/// script runs, `judgebox.dir` holds its directory and `require` searches it.
/// Anything else is parsed as JSON. Relative local source paths are resolved
/// against the manifest's directory.
pub fn load_manifest(path: &Path) -> Result<Manifest, ManifestError> {
  let canonical = dunce::canonicalize(path).map_err(|source| ManifestError::Io {
    path: path.to_path_buf(),
    source,
  })?;
  let dir = canonical.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));

  let mut manifest = match canonical.extension().and_then(|e| e.to_str()) {
    Some("lua") => load_lua(&canonical, &dir)?,
    _ => load_json(&canonical)?,
  };
  manifest.anchor_sources(&dir);

  info!(
    path = %canonical.display(),
    packages = manifest.packages.len(),
    libraries = manifest.libraries.len(),
    "manifest loaded"
  );
  Ok(manifest)
}

fn load_json(path: &Path) -> Result<Manifest, ManifestError> {
  let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
    path: path.to_path_buf(),
    source,
  })?;
  serde_json::from_str(&content).map_err(|source| ManifestError::Json {
    path: path.to_path_buf(),
    source,
  })
}

fn load_lua(path: &Path, dir: &Path) -> Result<Manifest, ManifestError> {
  let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
    path: path.to_path_buf(),
    source,
  })?;
  let lua_err = |e: LuaError| ManifestError::Lua {
    path: path.to_path_buf(),
    message: e.to_string(),
  };

  let lua = Lua::new();
  register_globals(&lua, dir).map_err(lua_err)?;

  let value = lua
    .load(&content)
    .set_name(format!("@{}", path.display()))
    .eval::<LuaValue>()
    .map_err(lua_err)?;

  if !value.is_table() {
    return Err(ManifestError::Lua {
      path: path.to_path_buf(),
      message: format!("script must return a table, got {}", value.type_name()),
    });
  }

  debug!(path = %path.display(), "lua manifest evaluated");
  lua.from_value::<Manifest>(value).map_err(lua_err)
}

fn register_globals(lua: &Lua, dir: &Path) -> LuaResult<()> {
  let dir = dir.to_string_lossy().into_owned();

  let package = lua.globals().get::<LuaTable>("package")?;
  let package_path = package.get::<String>("path")?;
  package.set("path", format!("{dir}/?.lua;{dir}/?/init.lua;{package_path}"))?;

  let judgebox = lua.create_table()?;
  judgebox.set("dir", dir)?;
  judgebox.set("version", env!("CARGO_PKG_VERSION"))?;
  lua.globals().set("judgebox", judgebox)?;

  Ok(())
}
