//! Where elevation tiles come from.

use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use noise::{NoiseFn, Simplex};
use relief_geo::{TileAddress, WGS84_A, lla_to_ecef, tile_x_to_lon, tile_y_to_lat};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::RawImage;

/// Side length of the rasters served by tile sources.
pub const TILE_PIXELS: u32 = 256;

/// Terrarium tiles on the public elevation bucket.
pub const DEFAULT_URL_TEMPLATE: &str =
    "https://s3.amazonaws.com/elevation-tiles-prod/terrarium/{z}/{x}/{y}.png";

/// Failure to obtain a raster for a tile.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The source has no data for the tile.
    #[error("no elevation tile at {0}")]
    NotFound(TileAddress),
    /// I/O or network failure.
    #[error("transport failure fetching {address}: {reason}")]
    Transport {
        address: TileAddress,
        reason: String,
    },
    /// The bytes were fetched but are not a readable image.
    #[error("cannot decode elevation tile {address}: {reason}")]
    Decode {
        address: TileAddress,
        reason: String,
    },
}

impl FetchError {
    pub fn address(&self) -> TileAddress {
        match self {
            Self::NotFound(address) => *address,
            Self::Transport { address, .. } | Self::Decode { address, .. } => *address,
        }
    }
}

/// Supplies encoded elevation rasters by tile address.
///
/// Implementations are called from build worker threads and must resolve to
/// a value or an error; they must never block indefinitely.
pub trait ElevationSource: Send + Sync {
    fn fetch(&self, address: &TileAddress) -> Result<RawImage, FetchError>;
}

/// Substitute `{x}`, `{y}` and `{z}` in a tile path or URL template.
#[must_use]
pub fn expand_template(template: &str, address: &TileAddress) -> String {
    template
        .replace("{x}", &address.x.to_string())
        .replace("{y}", &address.y.to_string())
        .replace("{z}", &address.z.to_string())
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

/// Reads `{root}/{z}/{x}/{y}.png` terrarium tiles from disk.
pub struct DirectoryTileSource {
    root: PathBuf,
}

impl DirectoryTileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// On-disk location of a tile.
    pub fn tile_path(&self, address: &TileAddress) -> PathBuf {
        self.root
            .join(address.z.to_string())
            .join(address.x.to_string())
            .join(format!("{}.png", address.y))
    }

    /// Write a raster into the directory layout.
    pub fn store(&self, address: &TileAddress, image: &RawImage) -> std::io::Result<()> {
        let path = self.tile_path(address);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let png = image.encode_png().map_err(std::io::Error::other)?;
        std::fs::write(path, png)
    }
}

impl ElevationSource for DirectoryTileSource {
    fn fetch(&self, address: &TileAddress) -> Result<RawImage, FetchError> {
        let path = self.tile_path(address);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(FetchError::NotFound(*address));
            }
            Err(err) => {
                return Err(FetchError::Transport {
                    address: *address,
                    reason: err.to_string(),
                });
            }
        };
        debug!(path = %path.display(), "read elevation tile");
        RawImage::decode(&bytes).map_err(|err| FetchError::Decode {
            address: *address,
            reason: err.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

/// In-memory tiles with a fetch counter and injectable failures.
#[derive(Default)]
pub struct MemoryTileSource {
    tiles: RwLock<FxHashMap<TileAddress, RawImage>>,
    failing: RwLock<FxHashSet<TileAddress>>,
    fallback: Option<RawImage>,
    fetches: AtomicUsize,
}

impl MemoryTileSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// A source that answers every address with the same raster.
    pub fn uniform(image: RawImage) -> Self {
        Self {
            fallback: Some(image),
            ..Self::default()
        }
    }

    pub fn insert(&self, address: TileAddress, image: RawImage) {
        if let Ok(mut tiles) = self.tiles.write() {
            tiles.insert(address, image);
        }
    }

    /// Make every fetch of `address` fail with a transport error.
    pub fn fail(&self, address: TileAddress) {
        if let Ok(mut failing) = self.failing.write() {
            failing.insert(address);
        }
    }

    /// Total number of `fetch` calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

impl ElevationSource for MemoryTileSource {
    fn fetch(&self, address: &TileAddress) -> Result<RawImage, FetchError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let poisoned = || FetchError::Transport {
            address: *address,
            reason: "tile store lock poisoned".to_string(),
        };
        if self.failing.read().map_err(|_| poisoned())?.contains(address) {
            return Err(FetchError::Transport {
                address: *address,
                reason: "injected failure".to_string(),
            });
        }
        if let Some(image) = self.tiles.read().map_err(|_| poisoned())?.get(address) {
            return Ok(image.clone());
        }
        self.fallback
            .clone()
            .ok_or(FetchError::NotFound(*address))
    }
}

// ---------------------------------------------------------------------------
// Synthetic
// ---------------------------------------------------------------------------

/// Parameters for procedural fBm terrain.
#[derive(Clone, Debug)]
pub struct SyntheticParams {
    pub seed: u32,
    pub octaves: u32,
    pub lacunarity: f64,
    pub persistence: f64,
    /// Frequency of the first octave, in cycles per earth radius.
    pub base_frequency: f64,
    /// Amplitude of the first octave in meters.
    pub amplitude: f64,
    /// Height added to every sample.
    pub base_elevation: f64,
}

impl Default for SyntheticParams {
    fn default() -> Self {
        Self {
            seed: 0,
            octaves: 12,
            lacunarity: 2.0,
            persistence: 0.5,
            base_frequency: 4.0,
            amplitude: 2500.0,
            base_elevation: 1500.0,
        }
    }
}

/// Procedural terrain sampled on the unit sphere, so neighbouring tiles and
/// different zoom levels agree wherever they overlap.
pub struct SyntheticTileSource {
    noise: Simplex,
    params: SyntheticParams,
}

impl SyntheticTileSource {
    pub fn new(params: SyntheticParams) -> Self {
        Self {
            noise: Simplex::new(params.seed),
            params,
        }
    }

    /// Height in meters at a geographic point.
    pub fn height_at(&self, lat: f64, lon: f64) -> f64 {
        let p = lla_to_ecef(lat, lon, 0.0) / WGS84_A;
        let mut total = 0.0;
        let mut frequency = self.params.base_frequency;
        let mut amplitude = self.params.amplitude;
        for _ in 0..self.params.octaves {
            total += self
                .noise
                .get([p.x * frequency, p.y * frequency, p.z * frequency])
                * amplitude;
            frequency *= self.params.lacunarity;
            amplitude *= self.params.persistence;
        }
        self.params.base_elevation + total
    }
}

impl ElevationSource for SyntheticTileSource {
    fn fetch(&self, address: &TileAddress) -> Result<RawImage, FetchError> {
        let step = 1.0 / f64::from(TILE_PIXELS);
        let (x, y, z) = (f64::from(address.x), f64::from(address.y), address.z);
        Ok(RawImage::from_heights(TILE_PIXELS, |px, py| {
            let lon = tile_x_to_lon(x + f64::from(px) * step, z);
            let lat = tile_y_to_lat(y + f64::from(py) * step, z);
            self.height_at(lat, lon)
        }))
    }
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// Fetches terrarium tiles over HTTP from a `{z}/{x}/{y}` URL template.
#[cfg(feature = "http")]
pub struct HttpTileSource {
    client: reqwest::blocking::Client,
    template: String,
}

#[cfg(feature = "http")]
impl HttpTileSource {
    pub fn new(template: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            template: template.into(),
        })
    }
}

#[cfg(feature = "http")]
impl ElevationSource for HttpTileSource {
    fn fetch(&self, address: &TileAddress) -> Result<RawImage, FetchError> {
        let url = expand_template(&self.template, address);
        let transport = |err: reqwest::Error| FetchError::Transport {
            address: *address,
            reason: err.to_string(),
        };
        let response = self.client.get(&url).send().map_err(transport)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(*address));
        }
        if !response.status().is_success() {
            tracing::warn!(%url, status = %response.status(), "elevation request failed");
            return Err(FetchError::Transport {
                address: *address,
                reason: format!("HTTP {}", response.status()),
            });
        }
        let bytes = response.bytes().map_err(transport)?;
        RawImage::decode(&bytes).map_err(|err| FetchError::Decode {
            address: *address,
            reason: err.to_string(),
        })
    }
}
