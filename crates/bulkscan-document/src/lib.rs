// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// bulkscan-document — Image handling and PDF assembly for Bulkscan.
//
// Provides the raster capability (probe/transcode) with a native and an
// ImageMagick backend, the immutable PdfImage value, the normalization policy
// that reduces page images for print, and the compositor that places them on
// physical pages.

pub mod image;
pub mod pdf;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

use std::sync::Arc;

use bulkscan_core::config::BackendKind;

// Re-export the primary types so callers can use `bulkscan_document::PdfImage` etc.
pub use image::{MagickBackend, NativeBackend, PdfImage, RasterBackend, TranscodeRequest};
pub use pdf::{NormalizationPolicy, PagePlacement, PdfCompositor};

/// Construct the raster backend selected in the configuration.
pub fn backend_for(kind: BackendKind) -> Arc<dyn RasterBackend> {
    match kind {
        BackendKind::Native => Arc::new(NativeBackend::new()),
        BackendKind::Magick => Arc::new(MagickBackend::new()),
    }
}
