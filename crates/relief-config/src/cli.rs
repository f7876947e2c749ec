//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::{Config, SourceKind};

/// Relief command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(name = "relief", about = "Quadtree terrain driven by screen-space error")]
pub struct CliArgs {
    /// Deepest zoom the tree may split to.
    #[arg(long)]
    pub max_zoom: Option<u8>,

    /// Mesh simplification error in meters.
    #[arg(long)]
    pub error: Option<f32>,

    /// Frame anchor latitude in degrees.
    #[arg(long, allow_negative_numbers = true)]
    pub latitude: Option<f64>,

    /// Frame anchor longitude in degrees.
    #[arg(long, allow_negative_numbers = true)]
    pub longitude: Option<f64>,

    /// Frame anchor zoom.
    #[arg(long)]
    pub zoom: Option<u8>,

    /// Elevation source to build tiles from.
    #[arg(long, value_enum)]
    pub source: Option<SourceKind>,

    /// Directory of `{z}/{x}/{y}.png` terrarium tiles; selects the directory
    /// source unless `--source` says otherwise.
    #[arg(long)]
    pub tile_dir: Option<PathBuf>,

    /// Number of scheduling cycles to run.
    #[arg(long, default_value_t = 16)]
    pub cycles: u32,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(zoom) = args.max_zoom {
            self.terrain.max_zoom = zoom;
        }
        if let Some(error) = args.error {
            self.terrain.simplification_error = error;
        }
        if let Some(lat) = args.latitude {
            self.frame.latitude = lat;
        }
        if let Some(lon) = args.longitude {
            self.frame.longitude = lon;
        }
        if let Some(zoom) = args.zoom {
            self.frame.zoom = zoom;
        }
        if let Some(ref dir) = args.tile_dir {
            self.source.tile_dir = Some(dir.clone());
            self.source.kind = SourceKind::Directory;
        }
        if let Some(kind) = args.source {
            self.source.kind = kind;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
