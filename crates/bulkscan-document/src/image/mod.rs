// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image module — the raster capability, its backends, and the PdfImage value.

pub mod backend;
pub mod bitpack;
pub mod magick;
pub mod native;
pub mod pdf_image;

pub use backend::{RasterBackend, TranscodeRequest};
pub use magick::MagickBackend;
pub use native::NativeBackend;
pub use pdf_image::PdfImage;
