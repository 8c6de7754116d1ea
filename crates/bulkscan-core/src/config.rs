// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BulkscanError, Result};
use crate::types::PageGeometry;

/// Output quality presets for PDF rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityPreset {
    /// RGB, lossy, at most 300 dpi.
    HighColor,
    /// RGB, lossy, at most 150 dpi.
    MidColor,
    /// Grayscale, lossy, at most 150 dpi.
    #[default]
    MidGray,
    /// Black and white, always raw, at most 100 dpi.
    LowBw,
}

/// Which raster capability performs image probing and transcoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// In-process decoding with the `image` and `png` crates.
    #[default]
    Native,
    /// External ImageMagick `identify` / `convert` processes.
    Magick,
}

/// Persistent application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding scanned pages waiting to be committed.
    pub incoming_dir: PathBuf,
    /// Directory receiving finished `.mud` document containers.
    pub doc_dir: PathBuf,
    /// Where committed source pages are moved. `None` leaves them in place.
    pub processed_dir: Option<PathBuf>,
    /// Page size and margins for rendered PDFs.
    pub page: PageGeometry,
    /// Default quality preset for rendered PDFs.
    pub quality: QualityPreset,
    /// Raster capability used for probing and transcoding.
    pub backend: BackendKind,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            incoming_dir: PathBuf::from("incoming"),
            doc_dir: PathBuf::from("documents"),
            processed_dir: None,
            page: PageGeometry::default(),
            quality: QualityPreset::default(),
            backend: BackendKind::default(),
        }
    }
}

impl AppConfig {
    /// Load settings from a JSON file. Missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            BulkscanError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.page.validate()?;
        Ok(config)
    }
}
