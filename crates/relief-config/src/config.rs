//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use relief_geo::{
    DEFAULT_GROUND_SAMPLE_DISTANCE, GroundSampleDistance, TileAddress, lat_lng_to_tile,
};
use relief_elevation::DEFAULT_URL_TEMPLATE;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name inside the config directory.
pub const CONFIG_FILE: &str = "config.ron";

/// Platform config directory for the engine, e.g. `~/.config/relief`.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("relief"))
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Quadtree and meshing settings.
    pub terrain: TerrainConfig,
    /// Anchor of the local reference frame.
    pub frame: FrameConfig,
    /// Where elevation tiles come from.
    pub source: SourceConfig,
    /// Split/merge scheduling and screen-space error.
    pub scheduler: SchedulerConfig,
    /// Debounced recompute of geometry after error changes.
    pub debounce: DebounceConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Quadtree and meshing configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TerrainConfig {
    /// Root tile as `(x, y, z)`.
    pub root: (u32, u32, u8),
    /// Deepest zoom the tree may split to.
    pub max_zoom: u8,
    /// Maximum mesh simplification error in meters.
    pub simplification_error: f32,
    /// Side length of the padded elevation grid (`2^k + 1`).
    pub grid_size: u32,
}

/// Reference frame anchor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FrameConfig {
    pub latitude: f64,
    pub longitude: f64,
    /// Zoom of the anchor tile; sets the unit scale of local space.
    pub zoom: u8,
    /// Extra scale applied on top of the anchor tile size.
    pub scale: f64,
}

/// Which elevation source feeds the builder.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
pub enum SourceKind {
    /// Procedural terrain from `synthetic_seed`.
    #[default]
    Synthetic,
    /// Terrarium PNGs under `tile_dir`.
    Directory,
    /// Terrarium PNGs fetched from `url_template`.
    Http,
}

/// Elevation source configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// Directory of `{z}/{x}/{y}.png` terrarium tiles.
    pub tile_dir: Option<PathBuf>,
    /// URL template for fetching tiles over HTTP.
    pub url_template: String,
    /// Seed for synthetic terrain.
    pub synthetic_seed: u32,
}

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Build worker threads (0 = one per spare core).
    pub worker_threads: usize,
    /// Upper bound on splits started per cycle.
    pub max_splits_per_cycle: usize,
    /// Meters per pixel at each zoom, starting at zoom 0.
    pub ground_sample_distance: Vec<f64>,
    /// Vertical field of view of the feedback camera.
    pub vertical_fov_degrees: f64,
    /// Feedback viewport height in pixels.
    pub viewport_height: u32,
}

/// Debounced recompute configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebounceConfig {
    pub interval_ms: u64,
    pub max_retries: u32,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            root: (0, 0, 0),
            max_zoom: 14,
            simplification_error: 1.0,
            grid_size: 257,
        }
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            latitude: 35.0,
            longitude: -106.0,
            zoom: 10,
            scale: 1.0,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Synthetic,
            tile_dir: None,
            url_template: DEFAULT_URL_TEMPLATE.to_string(),
            synthetic_seed: 0,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_threads: 2,
            max_splits_per_cycle: 16,
            ground_sample_distance: DEFAULT_GROUND_SAMPLE_DISTANCE.to_vec(),
            vertical_fov_degrees: 75.0,
            viewport_height: 400,
        }
    }
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            max_retries: 10,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

// --- Derived values ---

impl TerrainConfig {
    /// The configured root as a checked tile address.
    pub fn root_address(&self) -> Result<TileAddress, ConfigError> {
        let (x, y, z) = self.root;
        TileAddress::try_new(x, y, z).map_err(|err| ConfigError::Invalid {
            field: "terrain.root",
            reason: err.to_string(),
        })
    }
}

impl FrameConfig {
    /// The tile the frame is anchored to, once the anchor is checked.
    pub fn anchor_tile(&self) -> Result<TileAddress, ConfigError> {
        if self.zoom > TileAddress::MAX_ZOOM {
            return Err(ConfigError::Invalid {
                field: "frame.zoom",
                reason: format!("zoom {} exceeds {}", self.zoom, TileAddress::MAX_ZOOM),
            });
        }
        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return Err(ConfigError::Invalid {
                field: "frame.latitude",
                reason: "anchor coordinates must be finite".to_string(),
            });
        }
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(ConfigError::Invalid {
                field: "frame.scale",
                reason: format!("scale {} must be positive", self.scale),
            });
        }
        Ok(lat_lng_to_tile(self.latitude, self.longitude, self.zoom))
    }
}

impl SourceConfig {
    /// The selected source kind, once its settings are present.
    pub fn checked_kind(&self) -> Result<SourceKind, ConfigError> {
        match self.kind {
            SourceKind::Directory if self.tile_dir.is_none() => Err(ConfigError::Invalid {
                field: "source.tile_dir",
                reason: "directory source needs a tile_dir".to_string(),
            }),
            SourceKind::Http
                if !["{z}", "{x}", "{y}"]
                    .iter()
                    .all(|key| self.url_template.contains(key)) =>
            {
                Err(ConfigError::Invalid {
                    field: "source.url_template",
                    reason: format!("{:?} lacks {{z}}/{{x}}/{{y}}", self.url_template),
                })
            }
            kind => Ok(kind),
        }
    }
}

impl SchedulerConfig {
    /// The configured ground-sample-distance table.
    pub fn ground_sample_distance(&self) -> Result<GroundSampleDistance, ConfigError> {
        let table = &self.ground_sample_distance;
        if table.is_empty() {
            return Err(ConfigError::Invalid {
                field: "scheduler.ground_sample_distance",
                reason: "table is empty".to_string(),
            });
        }
        if !table.windows(2).all(|w| w[0] > w[1]) {
            return Err(ConfigError::Invalid {
                field: "scheduler.ground_sample_distance",
                reason: "table must be strictly decreasing".to_string(),
            });
        }
        Ok(GroundSampleDistance::new(table.clone()))
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join(CONFIG_FILE);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(ron_str.contains("max_zoom: 14"));
        assert!(ron_str.contains("interval_ms: 100"));
        assert!(ron_str.contains("elevation-tiles-prod"));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.source.tile_dir = Some(PathBuf::from("/tmp/tiles"));
        config.source.kind = SourceKind::Http;
        config.terrain.root = (102, 200, 9);
        let ron_str = ron::to_string(&config).unwrap();
        let deserialized: Config = ron::from_str(&ron_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_missing_section_uses_default() {
        let ron_str = "(terrain: (max_zoom: 12), frame: ())";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.terrain.max_zoom, 12);
        assert_eq!(config.terrain.grid_size, 257, "missing field falls back");
        assert_eq!(config.scheduler, SchedulerConfig::default());
        assert_eq!(config.debounce, DebounceConfig::default());
    }

    #[test]
    fn test_extra_field_ignored() {
        let ron_str = "(future_setting: true, terrain: (wireframe: false))";
        let result: Result<Config, _> = ron::from_str(ron_str);
        assert!(result.is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.terrain.simplification_error = 4.0;
        config.frame.latitude = 46.5;
        config.source.tile_dir = Some(dir.path().join("tiles"));

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_or_create_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("relief");
        let config = Config::load_or_create(&nested).unwrap();
        assert_eq!(config, Config::default());
        assert!(nested.join(CONFIG_FILE).exists());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.debounce.interval_ms = 250;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert!(result.is_some());
        assert_eq!(result.unwrap().debounce.interval_ms, 250);
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{{not valid}}").unwrap();
        let result = Config::load_or_create(dir.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_ron_comments_accepted() {
        let ron_str = "// This is a comment\n(\n  // Another comment\n)";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_root_address_is_checked() {
        let mut terrain = TerrainConfig::default();
        assert_eq!(terrain.root_address().unwrap(), TileAddress::root());
        terrain.root = (4, 0, 2);
        assert!(matches!(
            terrain.root_address(),
            Err(ConfigError::Invalid { field: "terrain.root", .. })
        ));
    }

    #[test]
    fn test_anchor_tile_is_checked() {
        let mut frame = FrameConfig::default();
        let anchor = frame.anchor_tile().unwrap();
        assert_eq!(anchor.z, 10);
        assert_eq!(anchor, lat_lng_to_tile(35.0, -106.0, 10));

        frame.zoom = TileAddress::MAX_ZOOM;
        assert!(frame.anchor_tile().is_ok());
        frame.zoom = 31;
        assert!(matches!(
            frame.anchor_tile(),
            Err(ConfigError::Invalid { field: "frame.zoom", .. })
        ));

        frame.zoom = 10;
        frame.scale = 0.0;
        assert!(matches!(
            frame.anchor_tile(),
            Err(ConfigError::Invalid { field: "frame.scale", .. })
        ));
        frame.scale = 1.0;
        frame.latitude = f64::NAN;
        assert!(frame.anchor_tile().is_err());
    }

    #[test]
    fn test_source_kind_is_checked() {
        let mut source = SourceConfig::default();
        assert_eq!(source.checked_kind().unwrap(), SourceKind::Synthetic);

        source.kind = SourceKind::Directory;
        assert!(matches!(
            source.checked_kind(),
            Err(ConfigError::Invalid { field: "source.tile_dir", .. })
        ));
        source.tile_dir = Some(PathBuf::from("tiles"));
        assert_eq!(source.checked_kind().unwrap(), SourceKind::Directory);

        source.kind = SourceKind::Http;
        assert_eq!(source.checked_kind().unwrap(), SourceKind::Http);
        assert_eq!(source.url_template, DEFAULT_URL_TEMPLATE);
        source.url_template = "https://tiles.example.com/{z}/{x}.png".to_string();
        assert!(matches!(
            source.checked_kind(),
            Err(ConfigError::Invalid { field: "source.url_template", .. })
        ));
    }

    #[test]
    fn test_ground_sample_distance_validation() {
        let mut scheduler = SchedulerConfig::default();
        let table = scheduler.ground_sample_distance().unwrap();
        assert_eq!(table.max_zoom(), 20);

        scheduler.ground_sample_distance = vec![10.0, 20.0];
        assert!(scheduler.ground_sample_distance().is_err(), "increasing table");
        scheduler.ground_sample_distance.clear();
        assert!(scheduler.ground_sample_distance().is_err(), "empty table");
    }
}
