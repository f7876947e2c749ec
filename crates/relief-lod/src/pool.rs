//! Worker threads that run tile builds off the scheduling thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::JoinHandle;

use relief_quadtree::{BuildError, BuildRequest, BuiltTile, NodeKey, TileBuilder};
use tracing::trace;

/// Which tree operation a build belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuildTag {
    /// Child `child` (0..4) of a pending split of `parent`.
    Split { parent: NodeKey, child: usize },
    /// Fresh geometry for an existing node.
    Rebuild(NodeKey),
}

/// A self-contained build that can run on any thread.
#[derive(Debug)]
pub struct BuildJob {
    pub tag: BuildTag,
    pub request: BuildRequest,
}

/// The result of a finished [`BuildJob`].
#[derive(Debug)]
pub struct BuildOutcome {
    pub tag: BuildTag,
    pub result: Result<BuiltTile, BuildError>,
}

/// Thread pool running [`TileBuilder::build`].
///
/// The scheduler submits [`BuildJob`]s and collects [`BuildOutcome`]s with
/// [`drain_results`](Self::drain_results); nothing here touches the tree.
pub struct BuildPool {
    task_sender: Option<crossbeam_channel::Sender<BuildJob>>,
    result_receiver: crossbeam_channel::Receiver<BuildOutcome>,
    worker_handles: Vec<JoinHandle<()>>,
    /// Maximum number of jobs queued or running at once.
    budget: usize,
    in_flight: Arc<AtomicUsize>,
}

impl BuildPool {
    /// Spawn `worker_count` workers (`0` picks one per spare core).
    pub fn new(worker_count: usize, budget: usize, builder: TileBuilder) -> Self {
        let worker_count = if worker_count == 0 {
            num_cpus::get().saturating_sub(1).max(1)
        } else {
            worker_count
        };
        let budget = budget.max(1);
        let (task_tx, task_rx) = crossbeam_channel::bounded::<BuildJob>(budget);
        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        let in_flight = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let rx = task_rx.clone();
            let tx = result_tx.clone();
            let builder = builder.clone();
            let flight = Arc::clone(&in_flight);

            let handle = std::thread::Builder::new()
                .name(format!("relief-build-{i}"))
                .spawn(move || {
                    while let Ok(job) = rx.recv() {
                        trace!(address = %job.request.address, "build started");
                        let result = builder.build(&job.request);
                        // Released before delivery so a drained pool reads as idle.
                        flight.fetch_sub(1, Ordering::Relaxed);
                        let _ = tx.send(BuildOutcome {
                            tag: job.tag,
                            result,
                        });
                    }
                })
                .expect("failed to spawn build worker");
            handles.push(handle);
        }

        Self {
            task_sender: Some(task_tx),
            result_receiver: result_rx,
            worker_handles: handles,
            budget,
            in_flight,
        }
    }

    /// Queue a job. Hands the job back if the budget is exhausted or the
    /// pool has shut down.
    pub fn submit(&self, job: BuildJob) -> Result<(), BuildJob> {
        let Some(sender) = &self.task_sender else {
            return Err(job);
        };
        if self.in_flight.load(Ordering::Relaxed) >= self.budget {
            return Err(job);
        }
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        sender.send(job).map_err(|err| {
            self.in_flight.fetch_sub(1, Ordering::Relaxed);
            err.into_inner()
        })
    }

    /// Collect every finished job without blocking.
    pub fn drain_results(&self) -> Vec<BuildOutcome> {
        let mut results = Vec::new();
        while let Ok(result) = self.result_receiver.try_recv() {
            results.push(result);
        }
        results
    }

    /// Jobs queued or running.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Jobs that can still be submitted before the budget is hit.
    pub fn remaining(&self) -> usize {
        if self.task_sender.is_none() {
            return 0;
        }
        self.budget.saturating_sub(self.in_flight_count())
    }

    /// Finished jobs waiting to be drained.
    pub(crate) fn ready_count(&self) -> usize {
        self.result_receiver.len()
    }

    pub fn worker_count(&self) -> usize {
        self.worker_handles.len()
    }

    /// Stop accepting work, let workers finish what is queued, and join them.
    pub fn shutdown(&mut self) {
        self.task_sender.take();
        for handle in self.worker_handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for BuildPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relief_elevation::{ElevationSource, FetchError, MemoryTileSource, RawImage};
    use relief_geo::{GlobeReference, TileAddress};
    use relief_quadtree::{CompactId, NullScene, TileTree, TreeConfig};
    use std::time::{Duration, Instant};

    /// Blocks every fetch until the test lets it through.
    struct GateSource {
        gate: crossbeam_channel::Receiver<()>,
        inner: MemoryTileSource,
    }

    impl ElevationSource for GateSource {
        fn fetch(&self, address: &TileAddress) -> Result<RawImage, FetchError> {
            let _ = self.gate.recv_timeout(Duration::from_secs(10));
            self.inner.fetch(address)
        }
    }

    fn image() -> RawImage {
        RawImage::from_heights(16, |x, y| f64::from(x + y))
    }

    fn builder() -> TileBuilder {
        TileBuilder::new(Arc::new(MemoryTileSource::uniform(image())), 17).unwrap()
    }

    fn some_key() -> NodeKey {
        let frame = GlobeReference::new(TileAddress::root(), 1.0);
        TileTree::new(&TreeConfig::default(), builder(), frame, Box::new(NullScene))
            .unwrap()
            .root()
    }

    fn job(i: u32) -> BuildJob {
        let address = TileAddress::new(i, 0, 4);
        BuildJob {
            tag: BuildTag::Rebuild(some_key()),
            request: BuildRequest {
                address,
                id: CompactId::from_raw(i + 1).unwrap(),
                elevation: None,
                error: 1.0,
                matrix: GlobeReference::new(address, 1.0).matrix(),
                epoch: 0,
            },
        }
    }

    fn collect(pool: &BuildPool, count: usize) -> Vec<BuildOutcome> {
        let mut out = Vec::new();
        let start = Instant::now();
        while out.len() < count {
            out.extend(pool.drain_results());
            assert!(start.elapsed() < Duration::from_secs(10), "timed out");
            std::thread::sleep(Duration::from_millis(1));
        }
        out
    }

    #[test]
    fn test_jobs_complete_off_thread() {
        let pool = BuildPool::new(2, 16, builder());
        for i in 0..6 {
            assert!(pool.submit(job(i)).is_ok());
        }
        let mut addresses: Vec<_> = collect(&pool, 6)
            .into_iter()
            .map(|o| o.result.unwrap().address)
            .collect();
        addresses.sort();
        let expected: Vec<_> = (0..6).map(|i| TileAddress::new(i, 0, 4)).collect();
        assert_eq!(addresses, expected);
        assert_eq!(pool.in_flight_count(), 0);
    }

    #[test]
    fn test_budget_limits_submissions() {
        let (open, gate) = crossbeam_channel::unbounded();
        let source = GateSource {
            gate,
            inner: MemoryTileSource::uniform(image()),
        };
        let builder = TileBuilder::new(Arc::new(source), 17).unwrap();
        let pool = BuildPool::new(1, 2, builder);

        assert!(pool.submit(job(0)).is_ok());
        assert!(pool.submit(job(1)).is_ok());
        assert_eq!(pool.remaining(), 0);
        assert!(pool.submit(job(2)).is_err(), "budget is exhausted");

        open.send(()).unwrap();
        open.send(()).unwrap();
        let outcomes = collect(&pool, 2);
        assert!(outcomes.iter().all(|o| o.result.is_ok()));
        assert_eq!(pool.remaining(), 2);
    }

    #[test]
    fn test_shutdown_rejects_work() {
        let mut pool = BuildPool::new(1, 4, builder());
        pool.shutdown();
        assert_eq!(pool.remaining(), 0);
        let rejected = pool.submit(job(3)).unwrap_err();
        assert_eq!(rejected.request.address, TileAddress::new(3, 0, 4));
    }

    #[test]
    fn test_zero_workers_uses_available_cores() {
        let pool = BuildPool::new(0, 4, builder());
        assert!(pool.worker_count() >= 1);
    }
}
