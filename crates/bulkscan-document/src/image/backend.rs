// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raster capability — the seam between Bulkscan and whatever actually decodes,
// inspects and re-encodes image bytes.

use std::path::Path;

use bulkscan_core::error::{BulkscanError, Result};
use bulkscan_core::{ImageInfo, PixelFormat, RasterFormat};

/// What a transcode call should produce.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeRequest {
    /// Output encoding.
    pub format: RasterFormat,
    /// Output pixel format.
    pub pixel_format: PixelFormat,
    /// Forced output size in pixels (aspect ratio is not preserved).
    pub size: Option<(u32, u32)>,
    /// Uniform output resolution recorded in the result, in dpi.
    pub resolution_dpi: Option<f64>,
}

/// Image probing and transcoding.
///
/// Implementations are synchronous and may block for a long time (e.g. on a
/// child process). They hold no per-call state, so one backend can be shared
/// between threads that normalise independent pages.
pub trait RasterBackend: Send + Sync {
    /// Inspect encoded image bytes.
    fn probe(&self, data: &[u8]) -> Result<ImageInfo>;

    /// Re-encode image bytes according to `request`.
    fn transcode(&self, data: &[u8], request: &TranscodeRequest) -> Result<Vec<u8>>;

    /// Inspect an image file on disk.
    fn probe_file(&self, path: &Path) -> Result<ImageInfo> {
        let data = read_image_file(path)?;
        self.probe(&data)
    }
}

/// Read an image file, mapping a missing file to `NotFound`.
pub fn read_image_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => {
            BulkscanError::NotFound(format!("image file {}", path.display()))
        }
        _ => BulkscanError::Io(err),
    })
}
