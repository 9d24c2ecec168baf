//! Save file locations.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Extension the interpreter may append to save names (Quetzal format).
pub const SAVE_EXTENSION: &str = "qzl";

/// Default save path for a game: `<game dir>/saves/<stem>_autosave.qzl`.
pub fn default_save_path(game_file: &Path) -> PathBuf {
    let stem = game_file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "game".to_string());
    let dir = game_file.parent().unwrap_or_else(|| Path::new("."));
    dir.join("saves")
        .join(format!("{stem}_autosave.{SAVE_EXTENSION}"))
}

/// Find the file a save at `path` actually produced.
///
/// Checks `path` itself first, then `path` with `.qzl` appended.
pub fn resolve_save_file(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    let mut with_ext = OsString::from(path.as_os_str());
    with_ext.push(".");
    with_ext.push(SAVE_EXTENSION);
    let with_ext = PathBuf::from(with_ext);
    with_ext.is_file().then_some(with_ext)
}
