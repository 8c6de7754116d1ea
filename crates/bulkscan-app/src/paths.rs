// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Platform-aware configuration and input path resolution.

use std::path::{Path, PathBuf};

/// Location of the per-user configuration file, whether or not it exists.
///
/// `$XDG_CONFIG_HOME/bulkscan/config.json`, falling back to
/// `~/.config/bulkscan/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
    config_base().map(|base| base.join("bulkscan").join("config.json"))
}

fn config_base() -> Option<PathBuf> {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg.is_empty() {
            return Some(PathBuf::from(xdg));
        }
    }
    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".config"))
}

/// Resolve a page file named on the command line.
///
/// Paths that exist as given are used unchanged. A relative path that does
/// not exist is looked up in the incoming directory.
pub fn resolve_page(path: &Path, incoming_dir: &Path) -> PathBuf {
    if path.exists() || path.is_absolute() {
        return path.to_path_buf();
    }
    let candidate = incoming_dir.join(path);
    if candidate.exists() {
        candidate
    } else {
        path.to_path_buf()
    }
}
