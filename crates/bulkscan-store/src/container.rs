// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document container — one scanned document in a single SQLite file.
//
// Schema (version 2):
//   fileversion(version)
//   image_original(side_uuid PK, sheet_uuid, sheet_side, data, datatype,
//                  width, height, resolution_dpi, img_hash_sha256, orderno UNIQUE)
//   image_derivative(derivative_id PK, side_uuid FK, derivative_type, data,
//                    datatype, width, height, resolution_dpi)
//   image_meta(side_uuid, key, value)      PK(side_uuid, key)
//   document_meta(key PK, value)
//   document_tags(tag PK)
//
// A writable container is opened inside a transaction; nothing is durable
// until `close()` commits. Read-only handles never write to the file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use bulkscan_core::error::{BulkscanError, Result};
use bulkscan_core::{
    DerivativeId, DerivativeType, Properties, RasterFormat, SheetId, SheetSide, SideId,
};
use bulkscan_document::RasterBackend;
use bulkscan_document::image::backend::read_image_file;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::integrity::{hash_bytes, verify_hash};

/// Schema version written into new containers.
pub const SCHEMA_VERSION: i64 = 2;

/// Largest accepted relative disagreement between x and y resolution.
const RESOLUTION_TOLERANCE: f64 = 0.01;

const CREATE_SCHEMA_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS fileversion (
        version INTEGER PRIMARY KEY
    );
    CREATE TABLE IF NOT EXISTS image_original (
        side_uuid TEXT PRIMARY KEY,
        sheet_uuid TEXT NOT NULL,
        sheet_side TEXT NOT NULL,
        data BLOB NOT NULL,
        datatype TEXT NOT NULL,
        width INTEGER NOT NULL,
        height INTEGER NOT NULL,
        resolution_dpi REAL NOT NULL,
        img_hash_sha256 TEXT,
        orderno INTEGER UNIQUE,
        CHECK (sheet_side IN ('front', 'back'))
    );
    CREATE TABLE IF NOT EXISTS image_derivative (
        derivative_id INTEGER PRIMARY KEY,
        side_uuid TEXT NOT NULL,
        derivative_type TEXT NOT NULL,
        data BLOB NOT NULL,
        datatype TEXT NOT NULL,
        width INTEGER,
        height INTEGER,
        resolution_dpi REAL,
        CHECK (derivative_type IN ('thumb', 'enhanced', 'ocr')),
        FOREIGN KEY (side_uuid) REFERENCES image_original (side_uuid)
    );
    CREATE TABLE IF NOT EXISTS image_meta (
        side_uuid TEXT NOT NULL,
        key TEXT NOT NULL,
        value TEXT NOT NULL,
        PRIMARY KEY (side_uuid, key)
    );
    CREATE TABLE IF NOT EXISTS document_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS document_tags (
        tag TEXT PRIMARY KEY
    );
"#;

fn db_err(context: &str) -> impl Fn(rusqlite::Error) -> BulkscanError + '_ {
    move |e| BulkscanError::Database(format!("{context}: {e}"))
}

fn parse_id<T: FromStr<Err = uuid::Error>>(column: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|e| BulkscanError::Database(format!("malformed {column} '{raw}': {e}")))
}

/// Next order number and derivative id, continuing after the stored maxima.
fn seed_counters(conn: &Connection) -> Result<(i64, i64)> {
    let next_orderno = conn
        .query_row(
            "SELECT COALESCE(MAX(orderno) + 1, 0) FROM image_original",
            [],
            |row| row.get(0),
        )
        .map_err(db_err("seed orderno"))?;
    let next_derivative_id = conn
        .query_row(
            "SELECT COALESCE(MAX(derivative_id) + 1, 1) FROM image_derivative",
            [],
            |row| row.get(0),
        )
        .map_err(db_err("seed derivative id"))?;
    Ok((next_orderno, next_derivative_id))
}

// ---------------------------------------------------------------------------
// Row descriptors
// ---------------------------------------------------------------------------

/// Descriptor of a side's original image (everything except the bytes).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OriginalImage {
    pub side_id: SideId,
    pub sheet_id: SheetId,
    pub face: SheetSide,
    pub format: RasterFormat,
    pub width: u32,
    pub height: u32,
    pub resolution_dpi: f64,
    pub sha256: Option<String>,
    pub orderno: i64,
}

/// Descriptor of a derived image (everything except the bytes).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivativeImage {
    pub id: DerivativeId,
    pub side_id: SideId,
    pub kind: DerivativeType,
    pub format: RasterFormat,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub resolution_dpi: Option<f64>,
}

/// The original of a side plus its derivatives, grouped by type and ordered
/// by derivative id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SideImages {
    pub original: OriginalImage,
    pub thumbnails: Vec<DerivativeImage>,
    pub enhanced: Vec<DerivativeImage>,
    pub ocr: Vec<DerivativeImage>,
}

// ---------------------------------------------------------------------------
// Container
// ---------------------------------------------------------------------------

/// A multi-page scanned document stored in one SQLite file.
///
/// Single writer only: the handle owns its connection and the next order
/// number and derivative id are tracked in-process.
pub struct DocumentContainer {
    path: Option<PathBuf>,
    conn: Connection,
    backend: Arc<dyn RasterBackend>,
    next_orderno: i64,
    next_derivative_id: i64,
}

impl DocumentContainer {
    /// Open (or create) the container at `path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>, backend: Arc<dyn RasterBackend>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(db_err("open"))?;
        let container = Self::initialize(conn, Some(path.to_path_buf()), backend)?;
        info!(pages = container.next_orderno, "document container opened");
        Ok(container)
    }

    /// Open an existing container without modifying it.
    ///
    /// Fails with `NotFound` when `path` is not a file and with `Database`
    /// when the file holds no container schema. Writes through the returned
    /// handle fail.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open_read_only(path: impl AsRef<Path>, backend: Arc<dyn RasterBackend>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(BulkscanError::NotFound(format!(
                "document container {}",
                path.display()
            )));
        }
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(db_err("open read-only"))?;
        let has_schema: bool = conn
            .query_row(
                "SELECT EXISTS (SELECT 1 FROM sqlite_master
                                WHERE type = 'table' AND name = 'fileversion')",
                [],
                |row| row.get(0),
            )
            .map_err(db_err("inspect schema"))?;
        if !has_schema {
            return Err(BulkscanError::Database(format!(
                "{} is not a document container",
                path.display()
            )));
        }

        let (next_orderno, next_derivative_id) = seed_counters(&conn)?;
        debug!(pages = next_orderno, "document container opened read-only");
        Ok(Self {
            path: Some(path.to_path_buf()),
            conn,
            backend,
            next_orderno,
            next_derivative_id,
        })
    }

    /// Open an in-memory container (useful for tests).
    pub fn open_in_memory(backend: Arc<dyn RasterBackend>) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err("open in-memory"))?;
        let container = Self::initialize(conn, None, backend)?;
        debug!("in-memory document container opened");
        Ok(container)
    }

    fn initialize(
        conn: Connection,
        path: Option<PathBuf>,
        backend: Arc<dyn RasterBackend>,
    ) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)
            .map_err(db_err("foreign_keys pragma"))?;
        conn.execute_batch(CREATE_SCHEMA_SQL)
            .map_err(db_err("create schema"))?;
        conn.execute(
            "INSERT INTO fileversion (version)
             SELECT ?1 WHERE NOT EXISTS (SELECT 1 FROM fileversion)",
            params![SCHEMA_VERSION],
        )
        .map_err(db_err("write schema version"))?;

        let (next_orderno, next_derivative_id) = seed_counters(&conn)?;

        conn.execute_batch("BEGIN").map_err(db_err("begin"))?;

        Ok(Self {
            path,
            conn,
            backend,
            next_orderno,
            next_derivative_id,
        })
    }

    /// Commit all pending writes and release the file.
    #[instrument(skip(self), fields(path = ?self.path))]
    pub fn close(self) -> Result<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT").map_err(db_err("commit"))?;
        }
        self.conn
            .close()
            .map_err(|(_, e)| BulkscanError::Database(format!("close: {e}")))?;
        info!("document container closed");
        Ok(())
    }

    /// Backing file, or `None` for an in-memory container.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Schema version recorded in the file.
    pub fn schema_version(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT MAX(version) FROM fileversion", [], |row| row.get(0))
            .map_err(db_err("read schema version"))
    }

    /// Number of original page images.
    pub fn page_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM image_original", [], |row| row.get(0))
            .map_err(db_err("count pages"))?;
        Ok(count as usize)
    }

    fn ensure_side(&self, side: SideId) -> Result<()> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM image_original WHERE side_uuid = ?1",
                params![side.to_string()],
                |_| Ok(()),
            )
            .optional()
            .map_err(db_err("look up side"))?;
        found.ok_or_else(|| BulkscanError::NotFound(format!("side {side}")))
    }

    // -- Images ---------------------------------------------------------------

    /// Append an original page image and return its side id.
    ///
    /// Missing side and sheet ids are generated. The image's x and y
    /// resolution must agree within 1%; the stored resolution is their mean.
    #[instrument(skip(self, data), fields(data_len = data.len(), face = face.as_str()))]
    pub fn add_original(
        &mut self,
        data: &[u8],
        side: Option<SideId>,
        sheet: Option<SheetId>,
        face: SheetSide,
    ) -> Result<SideId> {
        let probed = self.backend.probe(data)?;
        let (dpi_x, dpi_y) = probed.dpi()?;
        if (dpi_x - dpi_y).abs() / dpi_x > RESOLUTION_TOLERANCE {
            return Err(BulkscanError::InvalidImage(format!(
                "x and y resolution disagree: {dpi_x:.1} vs {dpi_y:.1} dpi"
            )));
        }
        let resolution_dpi = (dpi_x + dpi_y) / 2.0;

        let side = side.unwrap_or_default();
        let sheet = sheet.unwrap_or_default();
        let orderno = self.next_orderno;

        self.conn
            .execute(
                "INSERT INTO image_original (side_uuid, sheet_uuid, sheet_side, data, datatype,
                 width, height, resolution_dpi, img_hash_sha256, orderno)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    side.to_string(),
                    sheet.to_string(),
                    face.as_str(),
                    data,
                    probed.format.name(),
                    probed.width,
                    probed.height,
                    resolution_dpi,
                    hash_bytes(data),
                    orderno,
                ],
            )
            .map_err(db_err("insert original"))?;
        self.next_orderno += 1;

        info!(side = %side, orderno, "page added");
        Ok(side)
    }

    /// Read an image file and append it as an original page.
    pub fn add_original_file(
        &mut self,
        path: impl AsRef<Path>,
        side: Option<SideId>,
        sheet: Option<SheetId>,
        face: SheetSide,
    ) -> Result<SideId> {
        let data = read_image_file(path.as_ref())?;
        self.add_original(&data, side, sheet, face)
    }

    /// Attach a derived image to an existing side.
    #[instrument(skip(self, data), fields(side = %side, data_len = data.len(), kind = kind.as_str()))]
    pub fn add_derivative(
        &mut self,
        side: SideId,
        data: &[u8],
        kind: DerivativeType,
    ) -> Result<DerivativeId> {
        self.ensure_side(side)?;
        let probed = self.backend.probe(data)?;
        let resolution_dpi = probed.dpi().ok().map(|(x, y)| (x + y) / 2.0);
        let id = DerivativeId(self.next_derivative_id);

        self.conn
            .execute(
                "INSERT INTO image_derivative (derivative_id, side_uuid, derivative_type, data,
                 datatype, width, height, resolution_dpi)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id.0,
                    side.to_string(),
                    kind.as_str(),
                    data,
                    probed.format.name(),
                    probed.width,
                    probed.height,
                    resolution_dpi,
                ],
            )
            .map_err(db_err("insert derivative"))?;
        self.next_derivative_id += 1;

        debug!(derivative = %id, "derivative added");
        Ok(id)
    }

    /// Remove every derivative, commit, compact the file and restart the
    /// derivative id sequence at 1.
    #[instrument(skip(self))]
    pub fn delete_all_derivatives(&mut self) -> Result<()> {
        self.conn
            .execute_batch("DELETE FROM image_derivative")
            .map_err(db_err("delete derivatives"))?;
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT").map_err(db_err("commit"))?;
        }
        self.next_derivative_id = 1;
        // VACUUM needs autocommit; the write transaction reopens either way.
        let vacuum = self.conn.execute_batch("VACUUM").map_err(db_err("vacuum"));
        self.conn.execute_batch("BEGIN").map_err(db_err("begin"))?;
        vacuum?;
        info!("all derivatives deleted");
        Ok(())
    }

    /// Side ids in page order.
    pub fn page_order(&self) -> Result<Vec<SideId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT side_uuid FROM image_original ORDER BY orderno ASC")
            .map_err(db_err("prepare page order"))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_err("query page order"))?;

        let mut order = Vec::new();
        for raw in rows {
            let raw = raw.map_err(db_err("read page order"))?;
            order.push(parse_id("side_uuid", &raw)?);
        }
        Ok(order)
    }

    /// Descriptors of a side's original and all of its derivatives.
    pub fn side_images_info(&self, side: SideId) -> Result<SideImages> {
        let row = self
            .conn
            .query_row(
                "SELECT sheet_uuid, sheet_side, datatype, width, height, resolution_dpi,
                 img_hash_sha256, orderno
                 FROM image_original WHERE side_uuid = ?1",
                params![side.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, u32>(3)?,
                        row.get::<_, u32>(4)?,
                        row.get::<_, f64>(5)?,
                        row.get::<_, Option<String>>(6)?,
                        row.get::<_, i64>(7)?,
                    ))
                },
            )
            .optional()
            .map_err(db_err("query original"))?
            .ok_or_else(|| BulkscanError::NotFound(format!("side {side}")))?;

        let (sheet, face, datatype, width, height, resolution_dpi, sha256, orderno) = row;
        let original = OriginalImage {
            side_id: side,
            sheet_id: parse_id("sheet_uuid", &sheet)?,
            face: face.parse()?,
            format: RasterFormat::from_name(&datatype),
            width,
            height,
            resolution_dpi,
            sha256,
            orderno,
        };

        let mut stmt = self
            .conn
            .prepare(
                "SELECT derivative_id, derivative_type, datatype, width, height, resolution_dpi
                 FROM image_derivative WHERE side_uuid = ?1 ORDER BY derivative_id ASC",
            )
            .map_err(db_err("prepare derivatives"))?;
        let rows = stmt
            .query_map(params![side.to_string()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<u32>>(3)?,
                    row.get::<_, Option<u32>>(4)?,
                    row.get::<_, Option<f64>>(5)?,
                ))
            })
            .map_err(db_err("query derivatives"))?;

        let mut images = SideImages {
            original,
            thumbnails: Vec::new(),
            enhanced: Vec::new(),
            ocr: Vec::new(),
        };
        for row in rows {
            let (id, kind, datatype, width, height, resolution_dpi) =
                row.map_err(db_err("read derivative"))?;
            let derivative = DerivativeImage {
                id: DerivativeId(id),
                side_id: side,
                kind: kind.parse()?,
                format: RasterFormat::from_name(&datatype),
                width,
                height,
                resolution_dpi,
            };
            match derivative.kind {
                DerivativeType::Thumbnail => images.thumbnails.push(derivative),
                DerivativeType::Enhanced => images.enhanced.push(derivative),
                DerivativeType::Ocr => images.ocr.push(derivative),
            }
        }
        Ok(images)
    }

    /// Bytes of a side's original image, exactly as added.
    pub fn page_image(&self, side: SideId) -> Result<Vec<u8>> {
        self.conn
            .query_row(
                "SELECT data FROM image_original WHERE side_uuid = ?1",
                params![side.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err("read original"))?
            .ok_or_else(|| BulkscanError::NotFound(format!("side {side}")))
    }

    /// Bytes of a derived image.
    pub fn derived_image(&self, id: DerivativeId) -> Result<Vec<u8>> {
        self.conn
            .query_row(
                "SELECT data FROM image_derivative WHERE derivative_id = ?1",
                params![id.0],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err("read derivative"))?
            .ok_or_else(|| BulkscanError::NotFound(format!("derivative {id}")))
    }

    // -- Metadata -------------------------------------------------------------

    /// Set a document property, replacing any previous value.
    pub fn set_document_property(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO document_meta (key, value) VALUES (?1, ?2)
                 ON CONFLICT (key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .map_err(db_err("set document property"))?;
        debug!(key, "document property set");
        Ok(())
    }

    /// Set a property of an existing side.
    pub fn set_side_property(&mut self, side: SideId, key: &str, value: &str) -> Result<()> {
        self.ensure_side(side)?;
        self.conn
            .execute(
                "INSERT INTO image_meta (side_uuid, key, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT (side_uuid, key) DO UPDATE SET value = excluded.value",
                params![side.to_string(), key, value],
            )
            .map_err(db_err("set side property"))?;
        debug!(side = %side, key, "side property set");
        Ok(())
    }

    /// All document properties.
    pub fn document_properties(&self) -> Result<Properties> {
        self.collect_properties("SELECT key, value FROM document_meta", params![])
    }

    /// One document property, `None` when unset.
    pub fn document_property(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT value FROM document_meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err("read document property"))
    }

    /// Properties of one side. Fails for an unknown side.
    pub fn page_properties(&self, side: SideId) -> Result<Properties> {
        self.ensure_side(side)?;
        self.collect_properties(
            "SELECT key, value FROM image_meta WHERE side_uuid = ?1",
            params![side.to_string()],
        )
    }

    /// Properties of every side, in page order.
    pub fn all_page_properties(&self) -> Result<Vec<(SideId, Properties)>> {
        let mut all = Vec::new();
        for side in self.page_order()? {
            all.push((side, self.page_properties(side)?));
        }
        Ok(all)
    }

    fn collect_properties(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Properties> {
        let mut stmt = self.conn.prepare(sql).map_err(db_err("prepare properties"))?;
        let rows = stmt
            .query_map(args, |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(db_err("query properties"))?;
        let mut properties = Properties::new();
        for row in rows {
            let (key, value) = row.map_err(db_err("read property"))?;
            properties.insert(key, value);
        }
        Ok(properties)
    }

    // -- Tags -----------------------------------------------------------------

    /// All tags, sorted.
    pub fn tags(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT tag FROM document_tags ORDER BY tag ASC")
            .map_err(db_err("prepare tags"))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_err("query tags"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("read tags"))
    }

    /// Add a tag. Adding an existing tag is a no-op.
    pub fn add_tag(&mut self, tag: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO document_tags (tag) VALUES (?1)",
                params![tag],
            )
            .map_err(db_err("add tag"))?;
        Ok(())
    }

    /// Remove a tag if present.
    pub fn remove_tag(&mut self, tag: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM document_tags WHERE tag = ?1", params![tag])
            .map_err(db_err("remove tag"))?;
        Ok(())
    }

    // -- Export and verification ----------------------------------------------

    /// Write every original, enhanced and thumbnail image below `directory`.
    ///
    /// Layout: `original/NNN_<side>.<ext>`, `enhanced/NNN_<side>_<id>.<ext>`
    /// and `thumbs/NNN_<side>_<id>.<ext>`, NNN being the 1-based page number.
    /// OCR derivatives are not exported. Returns the number of files written.
    #[instrument(skip_all, fields(directory = %directory.as_ref().display()))]
    pub fn dump_all_content(&self, directory: impl AsRef<Path>) -> Result<usize> {
        let directory = directory.as_ref();
        let original_dir = directory.join("original");
        let enhanced_dir = directory.join("enhanced");
        let thumbs_dir = directory.join("thumbs");

        for dir in [&original_dir, &enhanced_dir, &thumbs_dir] {
            if dir.exists() {
                return Err(BulkscanError::ExportTargetExists(dir.clone()));
            }
        }
        for dir in [&original_dir, &enhanced_dir, &thumbs_dir] {
            std::fs::create_dir_all(dir)?;
        }

        let mut written = 0;
        for (pageno, side) in (1..).zip(self.page_order()?) {
            let images = self.side_images_info(side)?;
            let name = format!(
                "{pageno:03}_{side}.{}",
                images.original.format.extension()
            );
            std::fs::write(original_dir.join(name), self.page_image(side)?)?;
            written += 1;

            for (dir, derivatives) in [
                (&enhanced_dir, &images.enhanced),
                (&thumbs_dir, &images.thumbnails),
            ] {
                for derivative in derivatives {
                    let name = format!(
                        "{pageno:03}_{side}_{}.{}",
                        derivative.id,
                        derivative.format.extension()
                    );
                    std::fs::write(dir.join(name), self.derived_image(derivative.id)?)?;
                    written += 1;
                }
            }
        }

        info!(files = written, "container content dumped");
        Ok(written)
    }

    /// Recompute the SHA-256 of every original and compare it with the stored
    /// digest. Returns the number of images checked.
    #[instrument(skip(self))]
    pub fn verify_integrity(&self) -> Result<usize> {
        let mut checked = 0;
        for side in self.page_order()? {
            let stored: Option<String> = self
                .conn
                .query_row(
                    "SELECT img_hash_sha256 FROM image_original WHERE side_uuid = ?1",
                    params![side.to_string()],
                    |row| row.get(0),
                )
                .map_err(db_err("read digest"))?;
            if let Some(expected) = stored {
                verify_hash(&self.page_image(side)?, &expected)?;
                checked += 1;
            }
        }
        debug!(checked, "integrity verified");
        Ok(checked)
    }
}

impl fmt::Display for DocumentContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = self
            .path
            .as_deref()
            .map_or_else(|| ":memory:".to_string(), |p| p.display().to_string());
        write!(f, "DocumentContainer<{path}, {} pages>", self.next_orderno)
    }
}
