// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bulkscan — command-line front-end.
//
// Entry point. Initialises logging, loads the configuration, selects the
// raster backend and dispatches to one subcommand.

mod paths;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;

use bulkscan_core::config::{BackendKind, QualityPreset};
use bulkscan_core::error::{BulkscanError, Result};
use bulkscan_core::AppConfig;
use bulkscan_document::{NormalizationPolicy, PdfCompositor, backend_for};
use bulkscan_store::{
    CommitPage, CommitRequest, DocumentCommitter, DocumentContainer, DocumentIndex,
    DocumentRenderer, OnError,
};

#[derive(Parser, Debug)]
#[command(name = "bulkscan", author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Raster backend, overriding the configuration.
    #[arg(long, global = true, value_enum)]
    backend: Option<BackendArg>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bundle scanned page files into a new document container.
    Commit {
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Document attribute, e.g. `--attr peer=Acme`.
        #[arg(long = "attr", value_parser = parse_attribute)]
        attributes: Vec<(String, String)>,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Render a document container into a PDF.
    Render {
        mud: PathBuf,
        output: PathBuf,
        #[arg(long, value_enum)]
        preset: Option<PresetArg>,
        /// Prefer enhanced derivatives over originals.
        #[arg(long)]
        enhanced: bool,
        #[arg(long)]
        title: Option<String>,
    },
    /// Export every stored image of a container into a directory.
    Dump { mud: PathBuf, directory: PathBuf },
    /// Print a container's metadata as JSON.
    Info { mud: PathBuf },
    /// Check stored page digests.
    Verify { mud: PathBuf },
    /// Index every container in a directory and print the catalog as JSON.
    Index {
        directory: PathBuf,
        /// Fail on the first unreadable container instead of skipping it.
        #[arg(long)]
        strict: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendArg {
    Native,
    Magick,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Native => BackendKind::Native,
            BackendArg::Magick => BackendKind::Magick,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PresetArg {
    HighColor,
    MidColor,
    MidGray,
    LowBw,
}

impl From<PresetArg> for QualityPreset {
    fn from(arg: PresetArg) -> Self {
        match arg {
            PresetArg::HighColor => QualityPreset::HighColor,
            PresetArg::MidColor => QualityPreset::MidColor,
            PresetArg::MidGray => QualityPreset::MidGray,
            PresetArg::LowBw => QualityPreset::LowBw,
        }
    }
}

fn parse_attribute(raw: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty attribute name in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "bulkscan failed");
            ExitCode::FAILURE
        }
    }
}

fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        return AppConfig::load(path);
    }
    match paths::default_config_path() {
        Some(path) if path.is_file() => AppConfig::load(path),
        _ => Ok(AppConfig::default()),
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(backend) = cli.backend {
        config.backend = backend.into();
    }
    let backend = backend_for(config.backend);
    tracing::debug!(backend = ?config.backend, "raster backend selected");

    match cli.command {
        Command::Commit {
            tags,
            attributes,
            files,
        } => {
            let pages: Vec<CommitPage> = files
                .iter()
                .map(|file| CommitPage::new(paths::resolve_page(file, &config.incoming_dir)))
                .collect();
            let request = CommitRequest {
                attributes: attributes.into_iter().collect(),
                tags,
            };
            let path = DocumentCommitter::from_config(&config, backend).commit(&pages, &request)?;
            println!("{}", path.display());
        }
        Command::Render {
            mud,
            output,
            preset,
            enhanced,
            title,
        } => {
            let container = DocumentContainer::open_read_only(&mud, Arc::clone(&backend))?;
            let preset = preset.map(QualityPreset::from).unwrap_or(config.quality);
            let mut compositor = PdfCompositor::new(config.page)?;
            if let Some(title) = title.or(container.document_property("docname")?) {
                compositor = compositor.with_title(title);
            }
            let renderer = DocumentRenderer::new(backend, NormalizationPolicy::from_preset(preset))
                .prefer_enhanced(enhanced);
            let pages = renderer.render(&container, &mut compositor)?;
            compositor.close(&output)?;
            tracing::info!(pages, output = %output.display(), "PDF written");
        }
        Command::Dump { mud, directory } => {
            let container = DocumentContainer::open_read_only(&mud, backend)?;
            let written = container.dump_all_content(&directory)?;
            println!("{written} files written to {}", directory.display());
        }
        Command::Info { mud } => {
            let container = DocumentContainer::open_read_only(&mud, backend)?;
            let mut pages = Vec::new();
            for (side, properties) in container.all_page_properties()? {
                pages.push(json!({
                    "images": container.side_images_info(side)?,
                    "properties": properties,
                }));
            }
            print_json(&json!({
                "path": mud,
                "schema_version": container.schema_version()?,
                "properties": container.document_properties()?,
                "tags": container.tags()?,
                "pages": pages,
            }))?;
        }
        Command::Verify { mud } => {
            let container = DocumentContainer::open_read_only(&mud, backend)?;
            let checked = container.verify_integrity()?;
            println!("{checked} page images verified");
        }
        Command::Index { directory, strict } => {
            let on_error = if strict { OnError::Raise } else { OnError::Ignore };
            let mut index = DocumentIndex::new(backend);
            index.add_directory(&directory, on_error)?;
            let catalog: std::collections::BTreeMap<String, _> = index
                .iter()
                .map(|(id, entry)| (id.to_string(), entry))
                .collect();
            print_json(&catalog)?;
        }
    }
    Ok(())
}
