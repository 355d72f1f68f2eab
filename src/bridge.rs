//! Owner-context bridge: run work on the single thread that owns the host.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐   bounded channel (Job<H>)   ┌──────────────────────┐
//! │  HTTP worker thread  │  ─────── submit ──────────▶  │   Owner context      │
//! │                      │                              │   (main loop /       │
//! │  Bridge::run(work)   │                              │    OwnerThread)      │
//! │    blocks on done_rx │  ◀──── Result<T, _> ───────  │   job(&mut host)     │
//! └──────────────────────┘   bounded(1) per call        └──────────────────────┘
//! ```
//!
//! - The host value `H` never leaves the owner context; only boxed closures
//!   cross threads. `H` itself does not need to be `Send`.
//! - The owner drains its queue one job at a time in submission order, so
//!   two requests never interleave on the host.
//! - Panics inside a job are caught on the owner context and returned to
//!   the caller as [`BridgeError::Panicked`]; the owner keeps running.
//! - [`InlineOwner`] runs jobs on the calling thread for single-threaded
//!   setups such as test harnesses.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use log::{trace, warn};

use crate::error::BridgeError;

/// Unit of work executed against the host on the owner context.
pub type Job<H> = Box<dyn FnOnce(&mut H) + Send + 'static>;

/// Default capacity of the owner queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Accepts jobs for execution on the owner context.
pub trait OwnerContext<H>: Send + Sync {
    /// Hands `job` to the owner. Returns once the job is queued (or, for
    /// inline owners, once it has run).
    fn submit(&self, job: Job<H>) -> Result<(), BridgeError>;
}

/// Constructor for a bounded owner queue.
pub struct OwnerQueue;

impl OwnerQueue {
    /// Creates a queue holding at most `capacity` pending jobs; submitters
    /// block while it is full.
    pub fn bounded<H>(capacity: usize) -> (OwnerSender<H>, OwnerReceiver<H>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        (OwnerSender { tx }, OwnerReceiver { rx })
    }
}

/// Submitting half of an owner queue.
pub struct OwnerSender<H> {
    tx: Sender<Job<H>>,
}

impl<H> Clone for OwnerSender<H> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<H> OwnerContext<H> for OwnerSender<H> {
    fn submit(&self, job: Job<H>) -> Result<(), BridgeError> {
        self.tx.send(job).map_err(|_| BridgeError::Closed)
    }
}

/// Draining half of an owner queue, held by the owner context.
pub struct OwnerReceiver<H> {
    rx: Receiver<Job<H>>,
}

impl<H> OwnerReceiver<H> {
    /// Runs every job already queued without blocking. Returns the number run.
    ///
    /// Meant to be called once per tick from a host main loop.
    pub fn run_pending(&self, host: &mut H) -> usize {
        let mut count = 0;
        loop {
            match self.rx.try_recv() {
                Ok(job) => {
                    job(host);
                    count += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        count
    }

    /// Runs jobs as they arrive until every sender is dropped.
    pub fn run(&self, host: &mut H) {
        for job in self.rx.iter() {
            job(host);
        }
    }

    /// Number of jobs waiting.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

/// Dedicated owner thread that creates and owns the host.
///
/// Dropping it (or calling [`shutdown`](OwnerThread::shutdown)) stops the
/// thread after the job in progress; queued jobs are discarded and their
/// callers receive [`BridgeError::Dropped`].
pub struct OwnerThread<H> {
    sender: OwnerSender<H>,
    stop_tx: Option<Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl<H: 'static> OwnerThread<H> {
    /// Spawns the owner thread. `factory` runs on that thread, so the host
    /// never has to be moved between threads.
    pub fn spawn<F>(capacity: usize, factory: F) -> std::io::Result<Self>
    where
        F: FnOnce() -> H + Send + 'static,
    {
        let (sender, receiver) = OwnerQueue::bounded::<H>(capacity);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);

        let handle = thread::Builder::new()
            .name("browse-owner".to_string())
            .spawn(move || {
                let mut host = factory();
                trace!("Owner context started");
                loop {
                    crossbeam_channel::select! {
                        recv(receiver.rx) -> job => match job {
                            Ok(job) => job(&mut host),
                            Err(_) => break,
                        },
                        recv(stop_rx) -> _ => break,
                    }
                }
                trace!("Owner context stopped ({} jobs discarded)", receiver.pending());
            })?;

        Ok(Self { sender, stop_tx: Some(stop_tx), handle: Some(handle) })
    }

    /// Handle for submitting jobs to this thread.
    pub fn context(&self) -> OwnerSender<H> {
        self.sender.clone()
    }

    /// Stops the thread and waits for it to exit.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }
}

impl<H> OwnerThread<H> {
    fn stop_and_join(&mut self) {
        // Dropping the stop sender wakes the select loop.
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Owner thread panicked during shutdown");
            }
        }
    }
}

impl<H> Drop for OwnerThread<H> {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

/// Runs jobs synchronously on the submitting thread.
///
/// The mutex only serializes callers; in the intended single-threaded use
/// it is never contended.
pub struct InlineOwner<H> {
    host: Mutex<H>,
}

impl<H> InlineOwner<H> {
    pub fn new(host: H) -> Self {
        Self { host: Mutex::new(host) }
    }

    /// Consumes the owner and returns the host.
    pub fn into_inner(self) -> H {
        self.host.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

impl<H: Send> OwnerContext<H> for InlineOwner<H> {
    fn submit(&self, job: Job<H>) -> Result<(), BridgeError> {
        let mut host = self.host.lock().unwrap_or_else(|e| e.into_inner());
        job(&mut host);
        Ok(())
    }
}

/// Submit-and-block front end over an [`OwnerContext`].
pub struct Bridge<H> {
    owner: Arc<dyn OwnerContext<H>>,
}

impl<H> Clone for Bridge<H> {
    fn clone(&self) -> Self {
        Self { owner: Arc::clone(&self.owner) }
    }
}

impl<H: 'static> Bridge<H> {
    pub fn new(owner: impl OwnerContext<H> + 'static) -> Self {
        Self { owner: Arc::new(owner) }
    }

    /// Runs `work` on the owner context and blocks until it has finished.
    ///
    /// State per call: submitted, running on the owner, then completed or
    /// failed. A panic in `work` comes back as [`BridgeError::Panicked`].
    pub fn run<T, F>(&self, work: F) -> Result<T, BridgeError>
    where
        F: FnOnce(&mut H) -> T + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = crossbeam_channel::bounded::<Result<T, BridgeError>>(1);

        let job: Job<H> = Box::new(move |host: &mut H| {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| work(host))).map_err(|payload| {
                let message = panic_message(payload.as_ref());
                warn!("Work panicked on owner context: {}", message);
                BridgeError::Panicked(message)
            });
            // The caller may be gone; the outcome is dropped then.
            let _ = done_tx.send(outcome);
        });

        self.owner.submit(job)?;
        done_rx.recv().map_err(|_| BridgeError::Dropped)?
    }
}

impl<H: Send + 'static> Bridge<H> {
    /// Bridge that runs work directly on the caller's thread.
    pub fn inline(host: H) -> Self {
        Self::new(InlineOwner::new(host))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Barrier;
    use std::time::Duration;

    #[test]
    fn test_inline_runs_on_caller_thread() {
        let bridge = Bridge::inline(Vec::<u32>::new());
        let caller = thread::current().id();

        let ran_on = bridge.run(|v: &mut Vec<u32>| {
            v.push(1);
            thread::current().id()
        });
        assert_eq!(ran_on, Ok(caller));
        assert_eq!(bridge.run(|v: &mut Vec<u32>| v.len()), Ok(1));
    }

    #[test]
    fn test_owner_thread_runs_off_caller_thread() {
        let owner = OwnerThread::spawn(8, || 0u64).unwrap();
        let bridge = Bridge::new(owner.context());
        let caller = thread::current().id();

        let ran_on = bridge.run(|_: &mut u64| thread::current().id()).unwrap();
        assert_ne!(ran_on, caller);
        let name = bridge.run(|_: &mut u64| thread::current().name().map(str::to_string)).unwrap();
        assert_eq!(name.as_deref(), Some("browse-owner"));
    }

    #[test]
    fn test_host_need_not_be_send() {
        // Rc<RefCell<_>> is neither Send nor Sync; it is built on the owner thread.
        let owner = OwnerThread::spawn(8, || Rc::new(RefCell::new(Vec::<String>::new()))).unwrap();
        let bridge = Bridge::new(owner.context());

        bridge.run(|h: &mut Rc<RefCell<Vec<String>>>| h.borrow_mut().push("a".into())).unwrap();
        let len = bridge.run(|h: &mut Rc<RefCell<Vec<String>>>| h.borrow().len()).unwrap();
        assert_eq!(len, 1);
    }

    #[test]
    fn test_panic_is_captured_and_owner_survives() {
        let owner = OwnerThread::spawn(8, || 5i32).unwrap();
        let bridge = Bridge::new(owner.context());

        let err = bridge.run(|_: &mut i32| -> i32 { panic!("bad input") }).unwrap_err();
        assert_eq!(err, BridgeError::Panicked("bad input".to_string()));
        assert_eq!(bridge.run(|n: &mut i32| *n), Ok(5));

        let inline = Bridge::inline(1i32);
        let err = inline.run(|_: &mut i32| -> i32 { panic!("{}", String::from("formatted")) }).unwrap_err();
        assert_eq!(err, BridgeError::Panicked("formatted".to_string()));
        assert_eq!(inline.run(|n: &mut i32| *n), Ok(1));
    }

    #[test]
    fn test_jobs_run_in_submission_order() {
        let (sender, receiver) = OwnerQueue::bounded::<Vec<u32>>(16);
        for i in 0..10 {
            sender.submit(Box::new(move |v: &mut Vec<u32>| v.push(i))).unwrap();
        }
        let mut host = Vec::new();
        assert_eq!(receiver.pending(), 10);
        assert_eq!(receiver.run_pending(&mut host), 10);
        assert_eq!(host, (0..10).collect::<Vec<_>>());
        assert_eq!(receiver.run_pending(&mut host), 0);
    }

    #[test]
    fn test_concurrent_callers_are_serialized() {
        let owner = OwnerThread::spawn(4, || (0u32, 0u32)).unwrap();
        let bridge = Bridge::new(owner.context());
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let bridge = bridge.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..50 {
                        bridge
                            .run(|state: &mut (u32, u32)| {
                                // A non-atomic read-modify-write; lost updates would show.
                                let seen = state.0;
                                thread::yield_now();
                                state.0 = seen + 1;
                                state.1 += 1;
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(bridge.run(|s: &mut (u32, u32)| *s), Ok((400, 400)));
    }

    #[test]
    fn test_main_loop_owner_with_run_pending() {
        let (sender, receiver) = OwnerQueue::bounded::<String>(4);
        let bridge = Bridge::new(sender);

        let caller = thread::spawn(move || bridge.run(|s: &mut String| {
            s.push_str("-edited");
            s.clone()
        }));

        // Host "main loop" ticking until the request is served.
        let mut host = String::from("note");
        let mut served = 0;
        while served == 0 {
            served = receiver.run_pending(&mut host);
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(caller.join().unwrap(), Ok("note-edited".to_string()));
    }

    #[test]
    fn test_closed_and_dropped_owner() {
        let (sender, receiver) = OwnerQueue::bounded::<u8>(4);
        drop(receiver);
        let bridge = Bridge::new(sender);
        assert_eq!(bridge.run(|n: &mut u8| *n), Err(BridgeError::Closed));

        let owner = OwnerThread::spawn(4, || 0u8).unwrap();
        let bridge = Bridge::new(owner.context());
        owner.shutdown();
        assert_eq!(bridge.run(|n: &mut u8| *n), Err(BridgeError::Closed));
    }
}
