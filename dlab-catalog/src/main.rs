//! dlab-catalog - medical image labeling catalog
//!
//! Scans source trees of DICOM and animated PNG files, keeps anonymized
//! per-user catalogs of labels, and decodes items into viewable frames.
//! Results are printed to stdout as JSON; logs go to stderr.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};

use dlab_catalog::config::{configured_sources, frame_options, parse_source_arg};
use dlab_catalog::models::Source;
use dlab_catalog::{CatalogError, CatalogService};
use dlab_common::config::{load_or_default, RootFolderInitializer, RootFolderResolver, ROOT_FOLDER_ENV};

/// Command-line arguments for dlab-catalog
#[derive(Parser, Debug)]
#[command(name = "dlab-catalog")]
#[command(about = "Labeling catalog for DICOM and animated PNG studies")]
#[command(version)]
struct Args {
    /// Folder holding the identity mapping and catalog stores
    #[arg(short, long, env = ROOT_FOLDER_ENV)]
    root: Option<PathBuf>,

    /// Configuration file (default: <config dir>/dlab/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// ffmpeg binary used for video-encapsulated DICOM
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan source trees and rebuild the catalog
    Scan {
        #[arg(short, long)]
        user: String,

        /// Source tree as TAG=PATH (repeatable); defaults to [[sources]] in config
        #[arg(short, long = "source", value_parser = parse_source_arg)]
        sources: Vec<(PathBuf, Source)>,
    },

    /// Print the user's catalog
    Catalog {
        #[arg(short, long)]
        user: String,
    },

    /// Decode every item of one patient into frames
    Frames {
        #[arg(short, long)]
        user: String,

        #[arg(short, long)]
        patient: String,
    },

    /// Set the label of one item
    Label {
        #[arg(short, long)]
        user: String,

        #[arg(short, long)]
        patient: String,

        #[arg(short, long)]
        item: String,

        #[arg(short, long, allow_negative_numbers = true)]
        label: i64,
    },

    /// Reset every label of one user to 0
    ResetLabels {
        #[arg(short, long)]
        user: String,
    },

    /// Delete the identity mapping and every catalog store
    Reset,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("Failed to serialize output")?);
    Ok(())
}

async fn run(service: &CatalogService, command: Command, default_sources: Vec<(PathBuf, Source)>) -> Result<()> {
    match command {
        Command::Scan { user, sources } => {
            let sources = if sources.is_empty() { default_sources } else { sources };
            print_json(&service.scan(&user, sources).await?)
        }
        Command::Catalog { user } => print_json(&service.load_catalog(&user).await?),
        Command::Frames { user, patient } => print_json(&service.fetch_patient_frames(&user, &patient).await?),
        Command::Label {
            user,
            patient,
            item,
            label,
        } => {
            service.update_label(&user, &patient, &item, label).await?;
            print_json(&json!({ "patientName": patient, "itemName": item, "label": label }))
        }
        Command::ResetLabels { user } => {
            let cleared = service.reset_labels(&user).await?;
            print_json(&json!({ "cleared": cleared }))
        }
        Command::Reset => {
            let removed = service.reset_all().await?;
            print_json(&json!({ "removed": removed }))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config = load_or_default(args.config.as_deref());
    dlab_common::logging::init(&toml_config.logging.level)?;

    info!("Starting dlab-catalog");
    info!(
        "Version: {} ({}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("DLAB_GIT_HASH"),
        env!("DLAB_BUILD_PROFILE")
    );

    // Resolve and create the root folder
    let root_folder = RootFolderResolver::new(args.root.clone(), &toml_config).resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;
    info!("Root folder: {}", initializer.root_folder().display());

    let options = frame_options(args.ffmpeg.clone(), &toml_config);
    let service = CatalogService::with_root(initializer.root_folder(), &options);

    match run(&service, args.command, configured_sources(&toml_config)).await {
        Ok(()) => Ok(()),
        Err(e) => match e.downcast_ref::<CatalogError>() {
            Some(catalog_error) => {
                error!(code = catalog_error.code(), "{}", catalog_error);
                std::process::exit(catalog_error.exit_code());
            }
            None => Err(e),
        },
    }
}
