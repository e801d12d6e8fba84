// rust/dataset-core/src/dataset/init.rs

//! One-shot initialization guard.

use std::fmt;
use std::sync::{Mutex, OnceLock};

/// Lifecycle of a dataset.
///
/// `Uninitialized` only exists while a constructor runs; a constructed
/// dataset is at least `MetaOnly`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    Uninitialized,
    MetaOnly,
    FullyInitialized,
}

impl fmt::Display for InitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InitState::Uninitialized => "uninitialized",
            InitState::MetaOnly => "meta-only",
            InitState::FullyInitialized => "fully-initialized",
        };
        f.write_str(name)
    }
}

/// Holds a value produced by a fallible initializer that runs at most once
/// successfully.
///
/// Concurrent callers serialize on an internal lock: one runs the
/// initializer, the others wait and then observe its result. A failed run
/// stores nothing, so the next caller starts over from scratch. Once set,
/// reads never take the lock.
pub struct InitGuard<T> {
    cell: OnceLock<T>,
    lock: Mutex<()>,
}

impl<T> InitGuard<T> {
    pub fn new() -> Self {
        Self {
            cell: OnceLock::new(),
            lock: Mutex::new(()),
        }
    }

    /// Creates a guard that is already initialized.
    pub fn with_value(value: T) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(value);
        Self {
            cell,
            lock: Mutex::new(()),
        }
    }

    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Returns the value, running `init` first if no call has succeeded yet.
    ///
    /// `init` must not call back into the same guard.
    pub fn get_or_try_init<E>(&self, init: impl FnOnce() -> Result<T, E>) -> Result<&T, E> {
        if let Some(value) = self.cell.get() {
            return Ok(value);
        }

        // The lock guards no data, so a poisoned lock only means an earlier
        // initializer panicked and nothing was stored.
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(value) = self.cell.get() {
            return Ok(value);
        }

        let value = init()?;
        Ok(self.cell.get_or_init(|| value))
    }
}

impl<T> Default for InitGuard<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for InitGuard<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitGuard")
            .field("value", &self.cell.get())
            .finish()
    }
}
