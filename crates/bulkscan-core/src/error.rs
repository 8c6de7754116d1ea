// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Bulkscan.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for all Bulkscan operations.
#[derive(Debug, Error)]
pub enum BulkscanError {
    // -- Image errors --
    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("unsupported conversion: {0}")]
    Unsupported(String),

    /// An external raster tool could not be run.
    #[error("raster tool failed: {0}")]
    RasterTool(String),

    // -- Container / library errors --
    #[error("not found: {0}")]
    NotFound(String),

    #[error("document {} carries no document UUID", path.display())]
    DocumentWithoutIdentity { path: PathBuf },

    #[error("document UUID {uuid} already indexed, conflicting file {}", path.display())]
    DuplicateDocument { uuid: String, path: PathBuf },

    #[error("export target already populated: {}", .0.display())]
    ExportTargetExists(PathBuf),

    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    // -- PDF errors --
    #[error("page geometry leaves no printable area: {0}")]
    GeometryInvalid(String),

    #[error("PDF operation failed: {0}")]
    PdfError(String),

    // -- Storage / persistence --
    #[error("database error: {0}")]
    Database(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BulkscanError>;
