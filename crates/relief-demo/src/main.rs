//! Headless terrain demo.
//!
//! Builds a quadtree over synthetic (or on-disk) terrarium tiles, renders
//! feedback from a fixed viewpoint with the software probe, and lets the
//! scheduler split and merge tiles until the tree matches the view. Halfway
//! through, a burst of simplification-error changes goes through the debounced
//! recompute path.
//!
//! Run with `cargo run -p relief-demo -- --cycles 20 --error 2`.

mod probe;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use glam::DVec3;
use relief_config::{CliArgs, Config, SourceKind, default_config_dir};
use relief_debounce::{Outcome, debounce};
use relief_elevation::{
    DirectoryTileSource, ElevationSource, SyntheticParams, SyntheticTileSource,
};
use relief_geo::GlobeReference;
use relief_lod::{CycleReport, Scheduler, SchedulerConfig, ViewParams};
use relief_quadtree::{NullScene, TileBuilder, TileTree, TreeConfig};
use tracing::{error, info, warn};

use crate::probe::Probe;

/// Feedback is rendered at this fraction of the screen resolution.
const FEEDBACK_DOWNSAMPLE: u32 = 4;
const SETTLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Viewer altitude and horizontal standoff south of the anchor, in meters.
const EYE_ALTITUDE_M: f64 = 9_000.0;
const EYE_STANDOFF_M: f64 = 25_000.0;

type DemoResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main() {
    let args = CliArgs::parse();

    let config_dir = args
        .config
        .clone()
        .or_else(default_config_dir)
        .unwrap_or_else(|| std::path::PathBuf::from(".relief"));

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    relief_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    if let Err(err) = run(&config, args.cycles) {
        error!(error = %err, "demo failed");
        std::process::exit(1);
    }
}

fn elevation_source(config: &Config) -> DemoResult<Arc<dyn ElevationSource>> {
    let source = &config.source;
    match (source.checked_kind()?, &source.tile_dir) {
        (SourceKind::Directory, Some(dir)) => {
            info!(dir = %dir.display(), "reading terrarium tiles from disk");
            Ok(Arc::new(DirectoryTileSource::new(dir)))
        }
        (SourceKind::Http, _) => http_source(&source.url_template),
        _ => {
            info!(seed = source.synthetic_seed, "using synthetic terrain");
            Ok(Arc::new(SyntheticTileSource::new(SyntheticParams {
                seed: source.synthetic_seed,
                ..SyntheticParams::default()
            })))
        }
    }
}

#[cfg(feature = "http")]
fn http_source(template: &str) -> DemoResult<Arc<dyn ElevationSource>> {
    info!(template, "fetching terrarium tiles over HTTP");
    Ok(Arc::new(relief_elevation::HttpTileSource::new(template)?))
}

#[cfg(not(feature = "http"))]
fn http_source(_template: &str) -> DemoResult<Arc<dyn ElevationSource>> {
    Err("HTTP tiles need the `http` feature: cargo run -p relief-demo --features http".into())
}

fn feedback_probe(config: &Config, frame: &GlobeReference) -> DemoResult<Probe> {
    let scheduler = &config.scheduler;
    let view = ViewParams::from_degrees(scheduler.vertical_fov_degrees, scheduler.viewport_height);
    let height = (scheduler.viewport_height / FEEDBACK_DOWNSAMPLE).max(1);
    let mpu = frame.meters_per_unit();
    // Local +X points south.
    Ok(Probe {
        eye: DVec3::new(EYE_STANDOFF_M / mpu, 0.0, EYE_ALTITUDE_M / mpu),
        target: DVec3::ZERO,
        up: DVec3::Z,
        view,
        width: height * 16 / 9,
        height,
        gsd: scheduler.ground_sample_distance()?,
    })
}

fn run(config: &Config, cycles: u32) -> DemoResult<()> {
    let builder = TileBuilder::new(elevation_source(config)?, config.terrain.grid_size)?;

    let anchor = &config.frame;
    let mut frame = GlobeReference::new(anchor.anchor_tile()?, anchor.scale);
    frame.set_center_and_zoom(anchor.latitude, anchor.longitude, 0.0, anchor.zoom);
    info!(
        anchor = %frame.address(),
        meters_per_unit = frame.meters_per_unit(),
        "reference frame"
    );

    let tree_config = TreeConfig {
        root: config.terrain.root_address()?,
        max_zoom: config.terrain.max_zoom,
        simplification_error: config.terrain.simplification_error,
        ..TreeConfig::default()
    };
    let probe = feedback_probe(config, &frame)?;
    let mut tree = TileTree::new(&tree_config, builder.clone(), frame, Box::new(NullScene))?;
    let mut scheduler = Scheduler::new(
        &SchedulerConfig {
            worker_threads: config.scheduler.worker_threads,
            max_splits_per_cycle: config.scheduler.max_splits_per_cycle,
            ..SchedulerConfig::default()
        },
        builder,
    );

    // Error changes are applied on this thread; the debounced action only
    // hands them over, and backs off while builds are running.
    let busy = Arc::new(AtomicBool::new(false));
    let (error_tx, error_rx) = crossbeam_channel::unbounded::<f32>();
    let busy_flag = Arc::clone(&busy);
    let mut error_changes = debounce(
        move |error: &f32| {
            if busy_flag.load(Ordering::Acquire) {
                return Outcome::Retryable;
            }
            match error_tx.send(*error) {
                Ok(()) => Outcome::Success,
                Err(_) => Outcome::Fatal("demo loop has exited".to_string()),
            }
        },
        Duration::from_millis(config.debounce.interval_ms),
        config.debounce.max_retries,
    );

    let mut total = CycleReport::default();
    let initial = scheduler.settle(&mut tree, SETTLE_TIMEOUT);
    info!(rebuilt = initial.rebuilds_completed, "root built");

    for cycle in 0..cycles {
        for error in error_rx.try_iter() {
            info!(error, "applying simplification error");
            tree.set_simplification_error(error);
        }

        let images = probe.render(&tree);
        let report = scheduler.cycle(&mut tree, &images);
        info!(cycle, %report, leaves = tree.leaf_nodes().len(), "cycle finished");

        busy.store(true, Ordering::Release);
        let settled = scheduler.settle(&mut tree, SETTLE_TIMEOUT);
        busy.store(!scheduler.is_idle(), Ordering::Release);
        if !scheduler.is_idle() {
            warn!(cycle, "builds still running after settle timeout");
        }

        accumulate(&mut total, &report);
        accumulate(&mut total, &settled);

        if cycle == cycles / 2 {
            // A slider drag: only the last value should reach the tree.
            let base = config.terrain.simplification_error;
            for factor in [1.5, 2.0, 4.0] {
                error_changes.call(base * factor);
            }
        }
    }

    error_changes.shutdown();
    for error in error_rx.try_iter() {
        info!(error, "applying simplification error");
        tree.set_simplification_error(error);
    }
    let last = scheduler.settle(&mut tree, SETTLE_TIMEOUT);
    accumulate(&mut total, &last);

    let triangles: usize = tree
        .leaf_nodes()
        .into_iter()
        .filter_map(|key| tree.node(key)?.geometry().map(|g| g.triangle_count()))
        .sum();
    info!(
        nodes = tree.len(),
        leaves = tree.leaf_nodes().len(),
        triangles,
        error = tree.simplification_error(),
        elevation = ?tree.elevation_range(),
        "final tree"
    );
    info!(%total, "totals");
    info!("\n{}", tree.to_full_string());
    Ok(())
}

fn accumulate(total: &mut CycleReport, report: &CycleReport) {
    total.splits_started += report.splits_started;
    total.splits_completed += report.splits_completed;
    total.splits_failed += report.splits_failed;
    total.merges += report.merges;
    total.rebuilds_started += report.rebuilds_started;
    total.rebuilds_completed += report.rebuilds_completed;
}
