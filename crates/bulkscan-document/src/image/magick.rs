// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// ImageMagick raster backend — runs `identify` and `convert` as child
// processes, streaming image bytes through stdin and stdout.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use bulkscan_core::error::{BulkscanError, Result};
use bulkscan_core::{ImageInfo, PixelFormat, RasterFormat, ResolutionUnit};
use tracing::{debug, instrument, warn};

use super::backend::{RasterBackend, TranscodeRequest};

/// `identify` format: one header line, then the free-text comment.
const IDENTIFY_FORMAT: &str = "%w %h %x %y %U %m %[colorspace] %z\\n%c";
const JPEG_QUALITY: &str = "85";

/// Backend delegating to the ImageMagick command-line tools.
#[derive(Debug, Clone)]
pub struct MagickBackend {
    identify: PathBuf,
    convert: PathBuf,
}

impl Default for MagickBackend {
    fn default() -> Self {
        Self {
            identify: PathBuf::from("identify"),
            convert: PathBuf::from("convert"),
        }
    }
}

impl MagickBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use explicit program paths instead of looking them up on `PATH`.
    pub fn with_programs(identify: impl Into<PathBuf>, convert: impl Into<PathBuf>) -> Self {
        Self {
            identify: identify.into(),
            convert: convert.into(),
        }
    }
}

impl RasterBackend for MagickBackend {
    #[instrument(skip_all, fields(data_len = data.len()))]
    fn probe(&self, data: &[u8]) -> Result<ImageInfo> {
        let args = ["-format", IDENTIFY_FORMAT, "-"];
        let output = run_tool(&self.identify, &args, data)?;
        let info = parse_identify(&String::from_utf8_lossy(&output))?;
        debug!(
            format = %info.format,
            width = info.width,
            height = info.height,
            "image identified"
        );
        Ok(info)
    }

    #[instrument(skip(self, data), fields(data_len = data.len()))]
    fn transcode(&self, data: &[u8], request: &TranscodeRequest) -> Result<Vec<u8>> {
        let args = convert_args(request);
        let output = run_tool(&self.convert, &args, data)?;
        if output.is_empty() {
            return Err(BulkscanError::InvalidImage(format!(
                "{} produced no output",
                self.convert.display()
            )));
        }
        Ok(output)
    }
}

/// Run one tool with `input` on stdin and return its stdout.
///
/// Failing to start or talk to the tool is a `RasterTool` error. A tool that
/// runs but exits unsuccessfully rejected its input, which is `InvalidImage`.
fn run_tool<S: AsRef<std::ffi::OsStr>>(
    program: &Path,
    args: &[S],
    input: &[u8],
) -> Result<Vec<u8>> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            BulkscanError::RasterTool(format!("failed to spawn {}: {e}", program.display()))
        })?;

    let mut stdin = child.stdin.take().ok_or_else(|| {
        BulkscanError::RasterTool(format!("failed to open stdin of {}", program.display()))
    })?;

    // stdin is fed from a second thread so a full stdout pipe cannot stall us.
    let output = std::thread::scope(|scope| {
        let writer = scope.spawn(move || stdin.write_all(input));
        let output = child.wait_with_output();
        match writer.join() {
            Ok(Err(e)) if e.kind() != std::io::ErrorKind::BrokenPipe => {
                warn!(error = %e, "writing image to {} failed", program.display());
            }
            _ => {}
        }
        output
    })
    .map_err(|e| BulkscanError::RasterTool(format!("failed to wait on {}: {e}", program.display())))?;

    if !output.status.success() {
        return Err(BulkscanError::InvalidImage(format!(
            "{} exited with {}: {}",
            program.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(output.stdout)
}

/// Parse the output of `identify -format IDENTIFY_FORMAT`.
fn parse_identify(text: &str) -> Result<ImageInfo> {
    let (header, comment) = text.split_once('\n').unwrap_or((text, ""));
    let fields: Vec<&str> = header.split_whitespace().collect();
    if fields.len() < 8 {
        return Err(BulkscanError::InvalidImage(format!(
            "unexpected identify output '{header}'"
        )));
    }

    let number = |index: usize| -> Result<f64> {
        fields[index].parse::<f64>().map_err(|e| {
            BulkscanError::InvalidImage(format!("identify field '{}': {e}", fields[index]))
        })
    };

    let colorspace = fields[6].to_ascii_lowercase();
    let depth = number(7)?;
    let pixel_format = if colorspace == "gray" || colorspace == "lineargray" {
        if depth <= 1.0 {
            PixelFormat::BlackWhite
        } else {
            PixelFormat::Grayscale
        }
    } else {
        PixelFormat::Rgb
    };

    let comment = comment.trim_end_matches('\n');
    Ok(ImageInfo {
        width: number(0)? as u32,
        height: number(1)? as u32,
        resolution_x: number(2)?,
        resolution_y: number(3)?,
        unit: ResolutionUnit::from_name(fields[4]),
        format: RasterFormat::from_name(fields[5]),
        pixel_format,
        comment: (!comment.is_empty()).then(|| comment.to_string()),
    })
}

/// Build `convert` arguments for `request`, reading from stdin.
fn convert_args(request: &TranscodeRequest) -> Vec<String> {
    let mut args = vec!["-".to_string()];

    if let Some((width, height)) = request.size {
        args.push("-resize".into());
        args.push(format!("{width}x{height}!"));
    }
    if let Some(dpi) = request.resolution_dpi {
        args.push("-units".into());
        args.push("PixelsPerInch".into());
        args.push("-density".into());
        args.push(format!("{dpi}"));
    }

    match request.pixel_format {
        PixelFormat::BlackWhite => {
            args.extend(["-colorspace", "Gray", "-threshold", "50%"].map(String::from));
            if !request.format.is_raw() {
                args.extend(["-type", "Bilevel"].map(String::from));
            }
        }
        PixelFormat::Grayscale => {
            args.extend(["-colorspace", "Gray"].map(String::from));
        }
        PixelFormat::Rgb => {
            args.extend(["-colorspace", "sRGB", "-type", "TrueColor"].map(String::from));
        }
    }

    if request.format.is_raw() {
        args.extend(["-alpha", "off", "-depth", "8"].map(String::from));
    }
    if request.format == RasterFormat::Jpeg {
        args.push("-quality".into());
        args.push(JPEG_QUALITY.into());
    }

    args.push(format!("{}:-", request.format.name()));
    args
}
