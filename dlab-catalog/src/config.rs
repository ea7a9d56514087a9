//! Configuration resolution for dlab-catalog
//!
//! Frame extraction settings come from CLI → ENV → TOML, highest first.

use crate::frames::FrameOptions;
use crate::models::Source;
use dlab_common::config::TomlConfig;
use std::path::PathBuf;
use tracing::{info, warn};

/// Environment override for the video decoder binary
pub const FFMPEG_ENV: &str = "DLAB_FFMPEG";

const DEFAULT_FFMPEG: &str = "ffmpeg";

/// Resolve the ffmpeg binary
///
/// **Priority:** CLI → ENV → TOML → `ffmpeg` on PATH
pub fn resolve_ffmpeg_path(cli_arg: Option<PathBuf>, toml_config: &TomlConfig) -> PathBuf {
    let env_path = std::env::var_os(FFMPEG_ENV)
        .map(PathBuf::from)
        .filter(|p| !p.as_os_str().is_empty());
    let toml_path = toml_config
        .frames
        .ffmpeg_path
        .clone()
        .filter(|p| !p.as_os_str().is_empty());

    let mut sources = Vec::new();
    if cli_arg.is_some() {
        sources.push("command line");
    }
    if env_path.is_some() {
        sources.push("environment");
    }
    if toml_path.is_some() {
        sources.push("TOML");
    }

    if sources.len() > 1 {
        warn!(
            "ffmpeg path found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    if let Some(path) = cli_arg {
        info!("ffmpeg path from command line: {}", path.display());
        return path;
    }
    if let Some(path) = env_path {
        info!("ffmpeg path from {}: {}", FFMPEG_ENV, path.display());
        return path;
    }
    if let Some(path) = toml_path {
        info!("ffmpeg path from TOML config: {}", path.display());
        return path;
    }

    PathBuf::from(DEFAULT_FFMPEG)
}

/// Frame extraction options from config
pub fn frame_options(ffmpeg_cli: Option<PathBuf>, toml_config: &TomlConfig) -> FrameOptions {
    let defaults = FrameOptions::default();
    FrameOptions {
        ffmpeg_path: resolve_ffmpeg_path(ffmpeg_cli, toml_config),
        include_apng_delays: toml_config
            .frames
            .include_apng_delays
            .unwrap_or(defaults.include_apng_delays),
        scratch_dir: toml_config.frames.scratch_dir.clone(),
    }
}

/// Scan sources configured in TOML
pub fn configured_sources(toml_config: &TomlConfig) -> Vec<(PathBuf, Source)> {
    toml_config
        .sources
        .iter()
        .map(|s| (s.path.clone(), Source::new(s.tag.clone())))
        .collect()
}

/// Parse a `TAG=PATH` source argument
pub fn parse_source_arg(arg: &str) -> Result<(PathBuf, Source), String> {
    let (tag, path) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected TAG=PATH, got '{}'", arg))?;
    if path.trim().is_empty() {
        return Err(format!("empty path in '{}'", arg));
    }
    Ok((PathBuf::from(path.trim()), Source::new(tag.trim())))
}
