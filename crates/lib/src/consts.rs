pub const APP_NAME: &str = "judgebox";

/// Directories every install prefix starts with.
pub const PREFIX_LAYOUT: &[&str] = &["include", "lib", "lib64", "bin", "cmake"];

/// Lock file created next to the prefix while a run is in progress.
pub const LOCK_FILENAME: &str = ".judgebox.lock";

pub const DEFAULT_PREFIX: &str = "/opt/judgebox/gcc";
pub const DEFAULT_MARKER: &str = "/etc/judgebox/install_dir.txt";
pub const DEFAULT_WRAPPER: &str = "/usr/local/bin/judgebox-compile";

pub const BUILD_RECORD_FILENAME: &str = "build-record.json";
pub const INFO_FILENAME: &str = "container-info.txt";

pub const DEFAULT_SOURCE_FILE: &str = "Main.cpp";
pub const DEFAULT_OUTPUT_FILE: &str = "a.out";

/// 1980-01-01 00:00:00 UTC, the ZIP epoch.
pub const SOURCE_DATE_EPOCH: &str = "315532800";

/// Shell variable the wrapper script binds to the prefix root.
pub const WRAPPER_PREFIX_VAR: &str = "INSTALL_DIR";
