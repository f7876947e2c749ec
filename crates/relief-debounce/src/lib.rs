//! Debounced recompute with bounded retries.
//!
//! [`debounce`] wraps an action in a worker thread. Calls only record their
//! arguments; the action runs on the trailing edge of the interval with the
//! most recent arguments, never more than once per interval and never
//! concurrently with itself. An action that reports [`Outcome::Retryable`] is
//! re-run after another interval, up to a retry limit.

use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, Sender};
use tracing::{debug, warn};

/// Result of one invocation of a debounced action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Prerequisites were not ready; try again with the same arguments.
    Retryable,
    /// Failed for good; logged and dropped.
    Fatal(String),
}

enum Message<A> {
    Call(A),
    Flush(Sender<()>),
}

/// Handle to a debounced action. Dropping it runs any pending call and joins
/// the worker.
pub struct Debounced<A: Send + 'static> {
    sender: Option<Sender<Message<A>>>,
    handle: Option<JoinHandle<()>>,
}

/// Wrap `action` so that bursts of calls collapse into one invocation per
/// `interval`.
pub fn debounce<A, F>(action: F, interval: Duration, max_retries: u32) -> Debounced<A>
where
    A: Send + 'static,
    F: FnMut(&A) -> Outcome + Send + 'static,
{
    let (tx, rx) = crossbeam_channel::unbounded();
    let handle = std::thread::Builder::new()
        .name("relief-debounce".to_string())
        .spawn(move || Worker::new(action, interval, max_retries).run(&rx))
        .expect("failed to spawn debounce worker");
    Debounced {
        sender: Some(tx),
        handle: Some(handle),
    }
}

impl<A: Send + 'static> Debounced<A> {
    /// Record `args` as the latest request.
    pub fn call(&self, args: A) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(Message::Call(args));
        }
    }

    /// Run any pending call now and wait for it to finish.
    pub fn flush(&self) {
        let Some(sender) = &self.sender else {
            return;
        };
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        if sender.send(Message::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    /// Run any pending call, then stop the worker.
    pub fn shutdown(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl<A: Send + 'static> Drop for Debounced<A> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Worker<A, F> {
    action: F,
    interval: Duration,
    max_retries: u32,
    pending: Option<A>,
    deadline: Option<Instant>,
    last_run: Option<Instant>,
    retries: u32,
}

impl<A, F> Worker<A, F>
where
    F: FnMut(&A) -> Outcome,
{
    fn new(action: F, interval: Duration, max_retries: u32) -> Self {
        Self {
            action,
            interval,
            max_retries,
            pending: None,
            deadline: None,
            last_run: None,
            retries: 0,
        }
    }

    fn run(mut self, rx: &crossbeam_channel::Receiver<Message<A>>) {
        loop {
            let message = match self.deadline {
                Some(deadline) => rx.recv_timeout(deadline.saturating_duration_since(Instant::now())),
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match message {
                Ok(Message::Call(args)) => {
                    // Fresh arguments get the full retry budget.
                    self.retries = 0;
                    self.schedule(args);
                }
                Ok(Message::Flush(ack)) => {
                    self.fire();
                    let _ = ack.send(());
                }
                Err(RecvTimeoutError::Timeout) => self.fire(),
                Err(RecvTimeoutError::Disconnected) => {
                    self.fire();
                    return;
                }
            }
        }
    }

    /// Earliest moment the next invocation may start.
    fn next_slot(&self, now: Instant) -> Instant {
        let after_call = now + self.interval;
        match self.last_run {
            Some(last) => after_call.max(last + self.interval),
            None => after_call,
        }
    }

    fn schedule(&mut self, args: A) {
        if self.pending.is_none() {
            self.deadline = Some(self.next_slot(Instant::now()));
        }
        self.pending = Some(args);
    }

    fn fire(&mut self) {
        self.deadline = None;
        let Some(args) = self.pending.take() else {
            return;
        };
        let outcome = (self.action)(&args);
        self.last_run = Some(Instant::now());
        match outcome {
            Outcome::Success => self.retries = 0,
            Outcome::Retryable if self.retries < self.max_retries => {
                self.retries += 1;
                debug!(attempt = self.retries, "debounced action retrying");
                self.schedule(args);
            }
            Outcome::Retryable => {
                warn!(retries = self.retries, "debounced action gave up");
                self.retries = 0;
            }
            Outcome::Fatal(reason) => {
                warn!(%reason, "debounced action failed");
                self.retries = 0;
            }
        }
    }
}
