//! Debounced write coalescer.
//!
//! Collapses bursts of write requests into one trailing call carrying the
//! latest arguments. Callers of superseded requests are told they were
//! cancelled instead of being left waiting forever.
//!
//! # Example
//!
//! ```ignore
//! let saver = Debouncer::new(Duration::from_millis(1500), move |record| {
//!     let store = store.clone();
//!     async move { store.save(record).await }.boxed()
//! });
//!
//! // Both calls share one write carrying `second`; the first resolves
//! // with `DebounceError::Cancelled`.
//! let first = saver.call(first);
//! let second = saver.call(second);
//!
//! // Before shutdown
//! saver.flush().await?;
//! ```

use futures::future::BoxFuture;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Outcome of a debounced call that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DebounceError<E> {
  /// Superseded by a newer call, or cancelled explicitly
  #[error("cancelled")]
  Cancelled,
  /// The underlying write ran and failed
  #[error("{0}")]
  Failed(E),
}

/// The underlying asynchronous write
type WriteFn<A, E> = Arc<dyn Fn(A) -> BoxFuture<'static, Result<(), E>> + Send + Sync>;

type Waiter<E> = oneshot::Sender<Result<(), DebounceError<E>>>;

struct State<A, E> {
  /// Latest arguments not yet written
  pending: Option<A>,
  /// Timer that will write `pending` once the window elapses
  timer: Option<JoinHandle<()>>,
  /// Caller of the most recent `call`, waiting for the write result
  waiter: Option<Waiter<E>>,
  /// Bumped on every state change so stale timers can tell they lost
  generation: u64,
}

/// Trailing-edge debouncer for an async write function.
pub struct Debouncer<A, E> {
  state: Arc<Mutex<State<A, E>>>,
  write: WriteFn<A, E>,
  window: Duration,
  /// Serializes writes so a later one never overtakes an earlier one
  gate: Arc<tokio::sync::Mutex<()>>,
  writing: Arc<AtomicUsize>,
}

impl<A, E> Clone for Debouncer<A, E> {
  fn clone(&self) -> Self {
    Self {
      state: Arc::clone(&self.state),
      write: Arc::clone(&self.write),
      window: self.window,
      gate: Arc::clone(&self.gate),
      writing: Arc::clone(&self.writing),
    }
  }
}

impl<A, E> Debouncer<A, E>
where
  A: Send + 'static,
  E: Clone + Send + 'static,
{
  /// Wrap `write` so it runs at most once per quiescence `window`.
  pub fn new<F>(window: Duration, write: F) -> Self
  where
    F: Fn(A) -> BoxFuture<'static, Result<(), E>> + Send + Sync + 'static,
  {
    Self {
      state: Arc::new(Mutex::new(State {
        pending: None,
        timer: None,
        waiter: None,
        generation: 0,
      })),
      write: Arc::new(write),
      window,
      gate: Arc::new(tokio::sync::Mutex::new(())),
      writing: Arc::new(AtomicUsize::new(0)),
    }
  }

  /// Record `args` as the latest pending write and restart the timer.
  ///
  /// The returned future resolves with the write result, or with
  /// `DebounceError::Cancelled` if another call, `cancel` or a dropped
  /// debouncer supersedes it first. Must be called inside a tokio runtime.
  pub fn call(
    &self,
    args: A,
  ) -> impl Future<Output = Result<(), DebounceError<E>>> + Send + 'static {
    let (tx, rx) = oneshot::channel();

    {
      let mut state = self.lock();
      state.generation += 1;
      let generation = state.generation;

      state.pending = Some(args);
      if let Some(timer) = state.timer.take() {
        timer.abort();
      }
      if let Some(previous) = state.waiter.replace(tx) {
        let _ = previous.send(Err(DebounceError::Cancelled));
      }

      let this = self.clone();
      state.timer = Some(tokio::spawn(async move {
        tokio::time::sleep(this.window).await;
        this.fire(generation).await;
      }));
    }

    async move { rx.await.unwrap_or(Err(DebounceError::Cancelled)) }
  }

  /// Drop the pending write without performing it.
  pub fn cancel(&self) {
    let mut state = self.lock();
    state.generation += 1;
    if let Some(timer) = state.timer.take() {
      timer.abort();
    }
    state.pending = None;
    if let Some(waiter) = state.waiter.take() {
      let _ = waiter.send(Err(DebounceError::Cancelled));
    }
  }

  /// Write the pending arguments now.
  ///
  /// Resolves once the write has settled and returns its result. With nothing
  /// pending this only waits for a write that is already in flight.
  pub async fn flush(&self) -> Result<(), E> {
    let (args, waiter) = {
      let mut state = self.lock();
      state.generation += 1;
      if let Some(timer) = state.timer.take() {
        timer.abort();
      }
      (state.pending.take(), state.waiter.take())
    };

    match args {
      Some(args) => {
        let result = self.run(args).await;
        if let Some(waiter) = waiter {
          let _ = waiter.send(result.clone().map_err(DebounceError::Failed));
        }
        result
      }
      None => {
        drop(self.gate.lock().await);
        Ok(())
      }
    }
  }

  /// Whether a write is waiting for its window to elapse.
  pub fn is_pending(&self) -> bool {
    self.lock().pending.is_some()
  }

  /// Whether the underlying write is currently running.
  pub fn is_writing(&self) -> bool {
    self.writing.load(Ordering::SeqCst) > 0
  }

  async fn fire(&self, generation: u64) {
    let (args, waiter) = {
      let mut state = self.lock();
      if state.generation != generation {
        return;
      }
      state.timer = None;
      (state.pending.take(), state.waiter.take())
    };

    let Some(args) = args else {
      return;
    };
    let result = self.run(args).await;
    if let Some(waiter) = waiter {
      let _ = waiter.send(result.map_err(DebounceError::Failed));
    }
  }

  async fn run(&self, args: A) -> Result<(), E> {
    let _gate = self.gate.lock().await;
    self.writing.fetch_add(1, Ordering::SeqCst);
    let result = (self.write)(args).await;
    self.writing.fetch_sub(1, Ordering::SeqCst);
    result
  }

  fn lock(&self) -> MutexGuard<'_, State<A, E>> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }
}
