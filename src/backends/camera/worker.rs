// SPDX-License-Identifier: GPL-3.0-only
//! Single-threaded task queue for hardware confinement
//!
//! A [`Worker`] owns one dedicated thread and one piece of state `S`. Tasks are
//! closures receiving `&mut S`; they run one at a time in submission order, so
//! the state never needs a lock. Delayed tasks run once their deadline passes,
//! ordered by deadline and then by submission.
//!
//! A task may fail by returning `Err` or by panicking. Under
//! [`ErrorPolicy::Contain`] both are logged and the worker carries on with the
//! next task.
//!
//! # Example
//!
//! ```ignore
//! let worker = Worker::spawn("camera-worker", Vec::<u32>::new());
//! worker.handle().enqueue(|state| {
//!     state.push(1);
//!     Ok(())
//! });
//! worker.handle().flush(Duration::from_secs(1));
//! ```

use crate::errors::AppResult;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, OnceLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// A unit of work run on the worker thread
pub type Task<S> = Box<dyn FnOnce(&mut S) -> AppResult<()> + Send>;

/// What happens when a task fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Log the error or panic and continue with the next task
    #[default]
    Contain,
    /// Let a panic unwind the worker thread; the queue closes afterwards
    Propagate,
}

enum Message<S> {
    Run {
        task: Task<S>,
        due: Option<Instant>,
        policy: ErrorPolicy,
    },
    Shutdown,
}

struct Delayed<S> {
    due: Instant,
    seq: u64,
    task: Task<S>,
    policy: ErrorPolicy,
}

impl<S> PartialEq for Delayed<S> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl<S> Eq for Delayed<S> {}

impl<S> PartialOrd for Delayed<S> {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl<S> Ord for Delayed<S> {
    // Reversed so the max-heap pops the earliest deadline first
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Cloneable submission side of a [`Worker`]
pub struct WorkerHandle<S> {
    sender: mpsc::Sender<Message<S>>,
    closed: Arc<AtomicBool>,
    name: Arc<str>,
    thread: Arc<OnceLock<ThreadId>>,
}

impl<S> Clone for WorkerHandle<S> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            closed: Arc::clone(&self.closed),
            name: Arc::clone(&self.name),
            thread: Arc::clone(&self.thread),
        }
    }
}

impl<S> std::fmt::Debug for WorkerHandle<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<S> WorkerHandle<S> {
    /// Worker name used in log events
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the queue stopped accepting tasks
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Whether the caller runs on this worker's thread
    pub fn is_worker_thread(&self) -> bool {
        self.thread
            .get()
            .is_some_and(|id| *id == thread::current().id())
    }
}

impl<S: 'static> WorkerHandle<S> {
    /// Append a task to run as soon as the tasks before it are done
    ///
    /// Returns `false` (and logs) when the queue is closed.
    pub fn enqueue<F>(&self, task: F) -> bool
    where
        F: FnOnce(&mut S) -> AppResult<()> + Send + 'static,
    {
        self.enqueue_with(Duration::ZERO, ErrorPolicy::Contain, task)
    }

    /// Append a task that runs no earlier than `delay` from now
    pub fn enqueue_delayed<F>(&self, delay: Duration, task: F) -> bool
    where
        F: FnOnce(&mut S) -> AppResult<()> + Send + 'static,
    {
        self.enqueue_with(delay, ErrorPolicy::Contain, task)
    }

    /// Append a task with an explicit delay and failure policy
    pub fn enqueue_with<F>(&self, delay: Duration, policy: ErrorPolicy, task: F) -> bool
    where
        F: FnOnce(&mut S) -> AppResult<()> + Send + 'static,
    {
        if self.is_closed() {
            warn!(worker = %self.name, "Task rejected: queue closed");
            return false;
        }

        let due = if delay.is_zero() {
            None
        } else {
            Some(Instant::now() + delay)
        };

        let message = Message::Run {
            task: Box::new(task),
            due,
            policy,
        };

        if self.sender.send(message).is_err() {
            self.closed.store(true, Ordering::SeqCst);
            warn!(worker = %self.name, "Task rejected: queue closed");
            return false;
        }
        true
    }

    /// Block until every task enqueued before this call has run
    ///
    /// Delayed tasks are not waited for. Returns `false` on timeout, when the
    /// queue is closed, or when called from the worker thread itself.
    pub fn flush(&self, timeout: Duration) -> bool {
        if self.is_worker_thread() {
            debug!(worker = %self.name, "Flush from the worker thread refused");
            return false;
        }
        let (tx, rx) = mpsc::channel();
        let enqueued = self.enqueue(move |_| {
            let _ = tx.send(());
            Ok(())
        });
        if !enqueued {
            return false;
        }
        rx.recv_timeout(timeout).is_ok()
    }
}

/// A dedicated thread running queued tasks against owned state
pub struct Worker<S> {
    handle: WorkerHandle<S>,
    thread: Option<JoinHandle<()>>,
}

impl<S: Send + 'static> Worker<S> {
    /// Start a worker owning `state`
    pub fn spawn(name: &str, state: S) -> Self {
        Self::spawn_with(name, move |_| state)
    }

    /// Start a worker whose state is built from its own handle
    ///
    /// The state can keep the handle to enqueue follow-up tasks.
    pub fn spawn_with<I>(name: &str, init: I) -> Self
    where
        I: FnOnce(WorkerHandle<S>) -> S,
    {
        let (sender, receiver) = mpsc::channel();
        let handle = WorkerHandle {
            sender,
            closed: Arc::new(AtomicBool::new(false)),
            name: Arc::from(name),
            thread: Arc::new(OnceLock::new()),
        };

        let state = init(handle.clone());
        let closed = Arc::clone(&handle.closed);
        let thread_name = name.to_string();
        let thread_id = Arc::clone(&handle.thread);

        info!(worker = %name, "Starting worker");

        let thread = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                let _ = thread_id.set(thread::current().id());
                let _guard = CloseOnExit {
                    closed,
                    name: thread_name.clone(),
                };
                run_loop(&thread_name, state, receiver);
            });

        let thread = match thread {
            Ok(thread) => Some(thread),
            Err(e) => {
                error!(worker = %name, error = %e, "Failed to spawn worker thread");
                handle.closed.store(true, Ordering::SeqCst);
                None
            }
        };

        Self { handle, thread }
    }

    pub fn handle(&self) -> &WorkerHandle<S> {
        &self.handle
    }

    /// Check if the worker thread is still alive
    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Stop accepting tasks and end the thread
    ///
    /// Immediate tasks already queued still run; delayed tasks are abandoned.
    /// When called from the worker thread itself the thread is not joined.
    pub fn shutdown(&mut self) {
        if !self.handle.closed.swap(true, Ordering::SeqCst) {
            debug!(worker = %self.handle.name, "Shutting down worker");
        }
        let _ = self.handle.sender.send(Message::Shutdown);

        let Some(thread) = self.thread.take() else {
            return;
        };

        if thread.thread().id() == thread::current().id() {
            debug!(worker = %self.handle.name, "Shutdown requested from worker thread, not joining");
            return;
        }

        if let Err(e) = thread.join() {
            warn!(worker = %self.handle.name, "Worker thread panicked: {:?}", e);
        } else {
            debug!(worker = %self.handle.name, "Worker thread finished");
        }
    }
}

impl<S> Drop for Worker<S> {
    fn drop(&mut self) {
        self.handle.closed.store(true, Ordering::SeqCst);
        let _ = self.handle.sender.send(Message::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.thread().id() != thread::current().id() && thread.join().is_err() {
                warn!(worker = %self.handle.name, "Worker thread panicked");
            }
        }
    }
}

/// Marks the queue closed however the worker thread ends
struct CloseOnExit {
    closed: Arc<AtomicBool>,
    name: String,
}

impl Drop for CloseOnExit {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        info!(worker = %self.name, "Worker thread exiting");
    }
}

fn run_loop<S>(name: &str, mut state: S, receiver: mpsc::Receiver<Message<S>>) {
    debug!(worker = %name, "Worker thread started");

    let mut delayed: BinaryHeap<Delayed<S>> = BinaryHeap::new();
    let mut seq: u64 = 0;

    loop {
        // Run every delayed task whose deadline has passed
        while delayed
            .peek()
            .is_some_and(|next| next.due <= Instant::now())
        {
            if let Some(next) = delayed.pop() {
                run_task(name, &mut state, next.task, next.policy);
            }
        }

        let message = match delayed.peek() {
            Some(next) => {
                let wait = next.due.saturating_duration_since(Instant::now());
                match receiver.recv_timeout(wait) {
                    Ok(message) => message,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match receiver.recv() {
                Ok(message) => message,
                Err(_) => break,
            },
        };

        match message {
            Message::Run {
                task,
                due: None,
                policy,
            } => run_task(name, &mut state, task, policy),
            Message::Run {
                task,
                due: Some(due),
                policy,
            } => {
                seq += 1;
                delayed.push(Delayed {
                    due,
                    seq,
                    task,
                    policy,
                });
            }
            Message::Shutdown => {
                debug!(worker = %name, abandoned = delayed.len(), "Shutdown received");
                break;
            }
        }
    }
}

fn run_task<S>(name: &str, state: &mut S, task: Task<S>, policy: ErrorPolicy) {
    match policy {
        ErrorPolicy::Contain => match catch_unwind(AssertUnwindSafe(|| task(state))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(worker = %name, error = %e, "Task failed"),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(worker = %name, panic = %message, "Task panicked");
            }
        },
        ErrorPolicy::Propagate => {
            if let Err(e) = task(state) {
                warn!(worker = %name, error = %e, "Task failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;
    use std::sync::Mutex;

    const FLUSH: Duration = Duration::from_secs(2);

    #[test]
    fn test_tasks_run_in_order() {
        let worker = Worker::spawn("test-order", Vec::<u32>::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let seen = Arc::clone(&seen);
            worker.handle().enqueue(move |state: &mut Vec<u32>| {
                state.push(i);
                seen.lock().unwrap().push(i);
                Ok(())
            });
        }

        assert!(worker.handle().flush(FLUSH));
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_delayed_task_runs_after_immediate() {
        let worker = Worker::spawn("test-delay", ());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = Arc::clone(&seen);
        worker
            .handle()
            .enqueue_delayed(Duration::from_millis(50), move |_| {
                s.lock().unwrap().push("delayed");
                Ok(())
            });
        let s = Arc::clone(&seen);
        worker.handle().enqueue(move |_| {
            s.lock().unwrap().push("immediate");
            Ok(())
        });

        thread::sleep(Duration::from_millis(200));
        assert!(worker.handle().flush(FLUSH));
        assert_eq!(*seen.lock().unwrap(), vec!["immediate", "delayed"]);
    }

    #[test]
    fn test_errors_and_panics_are_contained() {
        let worker = Worker::spawn("test-contain", 0u32);
        worker
            .handle()
            .enqueue(|_| Err(AppError::Other("boom".into())));
        worker.handle().enqueue(|_| panic!("task panic"));

        let ran = Arc::new(AtomicBool::new(false));
        let r = Arc::clone(&ran);
        worker.handle().enqueue(move |_| {
            r.store(true, Ordering::SeqCst);
            Ok(())
        });

        assert!(worker.handle().flush(FLUSH));
        assert!(ran.load(Ordering::SeqCst));
        assert!(worker.is_running());
    }

    #[test]
    fn test_enqueue_after_shutdown_is_rejected() {
        let mut worker = Worker::spawn("test-closed", ());
        let handle = worker.handle().clone();
        worker.shutdown();

        assert!(handle.is_closed());
        assert!(!handle.enqueue(|_| Ok(())));
        assert!(!handle.flush(FLUSH));
        assert!(!worker.is_running());
    }

    #[test]
    fn test_shutdown_drains_immediate_tasks() {
        let mut worker = Worker::spawn("test-drain", ());
        let count = Arc::new(std::sync::atomic::AtomicU32::new(0));
        for _ in 0..3 {
            let c = Arc::clone(&count);
            worker.handle().enqueue(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        worker.shutdown();
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_state_can_enqueue_follow_up() {
        struct Chain {
            this: WorkerHandle<Chain>,
            hops: u32,
        }

        let worker = Worker::spawn_with("test-chain", |this| Chain { this, hops: 0 });
        worker.handle().enqueue(|chain: &mut Chain| {
            chain.hops += 1;
            chain.this.enqueue(|chain: &mut Chain| {
                chain.hops += 1;
                Ok(())
            });
            Ok(())
        });

        assert!(worker.handle().flush(FLUSH));
        // The follow-up was queued behind the first flush marker
        assert!(worker.handle().flush(FLUSH));

        let (tx, rx) = mpsc::channel();
        worker.handle().enqueue(move |chain: &mut Chain| {
            let _ = tx.send(chain.hops);
            Ok(())
        });
        assert_eq!(rx.recv_timeout(FLUSH), Ok(2));
    }

    #[test]
    fn test_flush_from_worker_thread_returns_immediately() {
        struct Reentrant {
            this: WorkerHandle<Reentrant>,
        }

        let worker = Worker::spawn_with("test-reentrant", |this| Reentrant { this });
        assert!(!worker.handle().is_worker_thread());

        let (tx, rx) = mpsc::channel();
        worker.handle().enqueue(move |state: &mut Reentrant| {
            let started = Instant::now();
            let flushed = state.this.flush(Duration::from_secs(5));
            let _ = tx.send((flushed, state.this.is_worker_thread(), started.elapsed()));
            Ok(())
        });

        let (flushed, on_worker, elapsed) = rx.recv_timeout(FLUSH).unwrap();
        assert!(!flushed);
        assert!(on_worker);
        assert!(elapsed < Duration::from_secs(1));
        assert!(worker.handle().flush(FLUSH));
    }

    #[test]
    fn test_handle_debug_shows_name() {
        let worker = Worker::spawn("test-debug", ());
        let text = format!("{:?}", worker.handle());
        assert!(text.contains("test-debug"));
        assert!(text.contains("closed: false"));
    }

    #[test]
    fn test_propagated_panic_closes_queue() {
        let worker = Worker::spawn("test-propagate", ());
        let handle = worker.handle().clone();
        handle.enqueue_with(Duration::ZERO, ErrorPolicy::Propagate, |_| {
            panic!("fatal task")
        });

        let deadline = Instant::now() + FLUSH;
        while worker.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(!worker.is_running());
        assert!(handle.is_closed());
        assert!(!handle.enqueue(|_| Ok(())));
    }
}
