//! Single-assignment value cells.
//!
//! A [`Cell`] holds a value that becomes known only after some operation
//! completes. It starts unresolved, is resolved or failed exactly once, and
//! wakes every waiter when it settles. Handing out cells at declaration time
//! is what lets a resource be referenced before it has run.
//!
//! Waiters are a continuation list drained on settlement; continuations
//! registered with [`Cell::on_ready`] run on their own task, never on the
//! resolver's stack. `on_ready` and `map` therefore require a tokio runtime.

use std::fmt;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::oneshot;

/// Contract violation on a [`Cell`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CellError {
  /// The cell was already resolved or failed.
  #[error("value cell already resolved")]
  AlreadyResolved,
}

enum State<T, E> {
  /// Not yet settled; each sender wakes one registered waiter.
  Pending(Vec<oneshot::Sender<Result<T, E>>>),
  Settled(Result<T, E>),
}

/// A single-assignment, lazily-resolved holder for a value of type `T`,
/// failing with an error of type `E`.
///
/// Cloning is cheap: clones share the same state.
pub struct Cell<T, E> {
  state: Arc<Mutex<State<T, E>>>,
}

impl<T, E> Clone for Cell<T, E> {
  fn clone(&self) -> Self {
    Self {
      state: Arc::clone(&self.state),
    }
  }
}

impl<T, E> Default for Cell<T, E> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T, E> fmt::Debug for Cell<T, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &*self.state.lock().expect("cell state lock poisoned") {
      State::Pending(waiters) => write!(f, "Cell(unresolved, {} waiters)", waiters.len()),
      State::Settled(Ok(_)) => write!(f, "Cell(resolved)"),
      State::Settled(Err(_)) => write!(f, "Cell(failed)"),
    }
  }
}

impl<T, E> Cell<T, E> {
  /// Create a new unresolved cell.
  pub fn new() -> Self {
    Self {
      state: Arc::new(Mutex::new(State::Pending(Vec::new()))),
    }
  }

  /// Whether the cell has been resolved or failed.
  pub fn is_settled(&self) -> bool {
    matches!(
      &*self.state.lock().expect("cell state lock poisoned"),
      State::Settled(_)
    )
  }
}

impl<T: Clone, E: Clone> Cell<T, E> {
  /// Resolve the cell with a value, waking every waiter.
  ///
  /// # Errors
  /// Returns [`CellError::AlreadyResolved`] if the cell was already settled.
  pub fn resolve(&self, value: T) -> Result<(), CellError> {
    self.settle(Ok(value))
  }

  /// Fail the cell with an error, waking every waiter.
  ///
  /// # Errors
  /// Returns [`CellError::AlreadyResolved`] if the cell was already settled.
  pub fn fail(&self, error: E) -> Result<(), CellError> {
    self.settle(Err(error))
  }

  fn settle(&self, outcome: Result<T, E>) -> Result<(), CellError> {
    let waiters = {
      let mut state = self.state.lock().expect("cell state lock poisoned");
      match &mut *state {
        State::Pending(waiters) => {
          let waiters = std::mem::take(waiters);
          *state = State::Settled(outcome.clone());
          waiters
        }
        State::Settled(_) => return Err(CellError::AlreadyResolved),
      }
    };

    // Waiters wake on their own tasks; a dropped receiver is fine.
    for waiter in waiters {
      let _ = waiter.send(outcome.clone());
    }

    Ok(())
  }

  /// Non-blocking snapshot: `None` while unresolved.
  pub fn try_get(&self) -> Option<Result<T, E>> {
    match &*self.state.lock().expect("cell state lock poisoned") {
      State::Pending(_) => None,
      State::Settled(outcome) => Some(outcome.clone()),
    }
  }

  /// Suspend until the cell settles, then return its outcome.
  pub async fn ready(&self) -> Result<T, E> {
    let receiver = {
      let mut state = self.state.lock().expect("cell state lock poisoned");
      match &mut *state {
        State::Settled(outcome) => return outcome.clone(),
        State::Pending(waiters) => {
          let (sender, receiver) = oneshot::channel();
          waiters.push(sender);
          receiver
        }
      }
    };

    // The sender lives in the cell state until settlement, and `&self` keeps
    // the state alive, so the channel cannot close before a send.
    receiver.await.expect("cell settled without notifying waiters")
  }
}

impl<T, E> Cell<T, E>
where
  T: Clone + Send + 'static,
  E: Clone + Send + 'static,
{
  /// Register a continuation invoked exactly once when the cell settles.
  ///
  /// If the cell is already settled the continuation still runs on its own
  /// task, never synchronously on the caller's stack.
  pub fn on_ready(&self, continuation: impl FnOnce(Result<T, E>) + Send + 'static) {
    let cell = self.clone();
    tokio::spawn(async move {
      continuation(cell.ready().await);
    });
  }

  /// Derive a cell that resolves to `transform(value)` once this one
  /// resolves, or carries this cell's failure.
  pub fn map<U>(&self, transform: impl FnOnce(T) -> U + Send + 'static) -> Cell<U, E>
  where
    U: Clone + Send + 'static,
  {
    let derived = Cell::new();
    let target = derived.clone();
    self.on_ready(move |outcome| {
      let _ = match outcome {
        Ok(value) => target.resolve(transform(value)),
        Err(error) => target.fail(error),
      };
    });
    derived
  }
}
