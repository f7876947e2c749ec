//! Screen-space-error level of detail: feedback image decoding, per-tile
//! aggregation and classification, and the scheduler that splits and merges
//! quadtree tiles on a background build pool.

mod classify;
mod codec;
mod feedback;
mod pool;
mod scheduler;
mod screen_error;

pub use classify::Classification;
pub use codec::{PACK_LIMIT, pack_number, unpack_number};
pub use feedback::{FeedbackError, FeedbackImages, FeedbackPixel, TileSample, read_tile_data};
pub use pool::{BuildJob, BuildOutcome, BuildPool, BuildTag};
pub use scheduler::{CycleReport, Scheduler, SchedulerConfig, merge_candidates, split_candidates};
pub use screen_error::{ViewParams, pixel_error, required_zoom};
