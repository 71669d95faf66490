//! Administrative directory layout constants and path helpers.
//!
//! The on-disk layout is the "external interface" described for the
//! engine: one reserved subdirectory per versioned directory, holding
//! the entries table, the pending log, and the pristine/property
//! stores.

use std::path::{Path, PathBuf};

pub const ADMIN_DIR_NAME: &str = ".wc";
pub const ENTRIES_FILE: &str = "entries";
pub const LOG_FILE: &str = "log";
pub const LOCK_FILE: &str = "lock";
pub const TMP_DIR: &str = "tmp";
pub const TEXT_BASE_DIR: &str = "text-base";
pub const PROPS_DIR: &str = "props";
pub const PROP_BASE_DIR: &str = "prop-base";
pub const WCPROPS_DIR: &str = "wcprops";
pub const PRISTINE_EXT: &str = "wc-base";

/// The reserved administrative directory under `dir`.
pub fn admin_dir(dir: &Path) -> PathBuf {
    dir.join(ADMIN_DIR_NAME)
}

pub fn entries_path(dir: &Path) -> PathBuf {
    admin_dir(dir).join(ENTRIES_FILE)
}

pub fn log_path(dir: &Path) -> PathBuf {
    admin_dir(dir).join(LOG_FILE)
}

pub fn lock_path(dir: &Path) -> PathBuf {
    admin_dir(dir).join(LOCK_FILE)
}

/// Live, read-only pristine text for `name` inside `dir`'s admin area.
pub fn pristine_path(dir: &Path, name: &str) -> PathBuf {
    admin_dir(dir)
        .join(TEXT_BASE_DIR)
        .join(format!("{name}.{PRISTINE_EXT}"))
}

/// Scratch pristine text for `name`, written before being moved into place.
pub fn scratch_pristine_path(dir: &Path, name: &str) -> PathBuf {
    admin_dir(dir)
        .join(TMP_DIR)
        .join(TEXT_BASE_DIR)
        .join(format!("{name}.{PRISTINE_EXT}"))
}

pub fn props_dir(dir: &Path) -> PathBuf {
    admin_dir(dir).join(PROPS_DIR)
}

pub fn prop_base_dir(dir: &Path) -> PathBuf {
    admin_dir(dir).join(PROP_BASE_DIR)
}

pub fn wcprops_dir(dir: &Path) -> PathBuf {
    admin_dir(dir).join(WCPROPS_DIR)
}

/// True if `name` is the reserved administrative directory name — an
/// edit may never add or open an entry with this name.
pub fn is_admin_name(name: &str) -> bool {
    name == ADMIN_DIR_NAME
}

/// Path to the live pristine for `name`, relative to the directory
/// that owns it — for use inside log commands, which resolve all
/// paths relative to the directory whose log they belong to.
pub fn rel_pristine(name: &str) -> String {
    format!("{ADMIN_DIR_NAME}/{TEXT_BASE_DIR}/{name}.{PRISTINE_EXT}")
}

pub fn rel_scratch_pristine(name: &str) -> String {
    format!("{ADMIN_DIR_NAME}/{TMP_DIR}/{TEXT_BASE_DIR}/{name}.{PRISTINE_EXT}")
}

pub fn rel_detranslate_scratch(name: &str) -> String {
    format!("{ADMIN_DIR_NAME}/{TMP_DIR}/{name}.detranslated")
}

/// Creates every subdirectory of the admin area that installation and
/// logging need to exist up front.
pub fn ensure_admin_dirs(dir: &Path) -> std::io::Result<()> {
    let admin = admin_dir(dir);
    std::fs::create_dir_all(admin.join(TEXT_BASE_DIR))?;
    std::fs::create_dir_all(admin.join(TMP_DIR).join(TEXT_BASE_DIR))?;
    std::fs::create_dir_all(admin.join(PROPS_DIR))?;
    std::fs::create_dir_all(admin.join(PROP_BASE_DIR))?;
    std::fs::create_dir_all(admin.join(WCPROPS_DIR))?;
    Ok(())
}
