//! Configuration for the terrain engine.
//!
//! Settings persist to disk as `config.ron` and can be overridden from the
//! command line. Every section falls back to defaults for missing fields, and
//! unknown fields are ignored so older files keep loading.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    CONFIG_FILE, Config, DebounceConfig, DebugConfig, FrameConfig, SchedulerConfig, SourceConfig,
    SourceKind, TerrainConfig, default_config_dir,
};
pub use error::ConfigError;
