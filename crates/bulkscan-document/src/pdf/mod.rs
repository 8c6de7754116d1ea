// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module — image normalization and page composition.

pub mod policy;
pub mod writer;

pub use policy::NormalizationPolicy;
pub use writer::{PagePlacement, PdfCompositor, compute_placement};
