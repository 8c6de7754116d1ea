// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bulkscan Store — SQLite document containers, the document index, and the
// commit and render pipelines built on top of them.

pub mod commit;
pub mod container;
pub mod integrity;
pub mod library;
pub mod render;

pub use commit::{CommitPage, CommitRequest, DocumentCommitter, ScanMetadata};
pub use container::{DerivativeImage, DocumentContainer, OriginalImage, SideImages};
pub use library::{DocumentEntry, DocumentIndex, OnError, PageSummary};
pub use render::DocumentRenderer;
