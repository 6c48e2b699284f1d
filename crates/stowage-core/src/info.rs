//! Single-flight, memoized retrieval of item attributes.
//!
//! Stat calls, HEAD requests and header reads are expensive, so item handles
//! resolve them at most once. [`InfoCell`] runs the fetch for the first caller,
//! blocks concurrent callers until it completes, and hands every caller the
//! same outcome. A failed fetch stays failed for the lifetime of the cell;
//! obtain a fresh item handle to retry.

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::error::{Error, Result};

/// Observable state of an [`InfoCell`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InfoState {
    /// No fetch has completed yet (one may be in flight).
    Unresolved,
    /// The fetch succeeded and its value is cached.
    Ready,
    /// The fetch failed and its error is cached.
    Failed,
}

/// A once-computed attribute slot holding either a value or a shared error.
pub struct InfoCell<T> {
    slot: OnceLock<std::result::Result<T, Arc<Error>>>,
}

impl<T> InfoCell<T> {
    pub const fn new() -> Self {
        Self {
            slot: OnceLock::new(),
        }
    }

    /// A cell that is already resolved, for handles built from a listing
    /// that returned the attributes alongside the names.
    pub fn ready(value: T) -> Self {
        let slot = OnceLock::new();
        let _ = slot.set(Ok(value));
        Self { slot }
    }

    /// Return the cached outcome, running `fetch` if nothing is cached yet.
    ///
    /// `fetch` runs at most once per cell even when called from many threads
    /// at the same time; the losers of the race wait for the winner.
    pub fn get_or_fetch<F>(&self, fetch: F) -> std::result::Result<&T, Arc<Error>>
    where
        F: FnOnce() -> Result<T>,
    {
        match self.slot.get_or_init(|| fetch().map_err(Arc::new)) {
            Ok(value) => Ok(value),
            Err(err) => Err(Arc::clone(err)),
        }
    }

    /// Like [`InfoCell::get_or_fetch`], wrapping a cached failure with the
    /// accessor name `op`.
    pub fn get_or_fetch_for<F>(&self, op: &'static str, fetch: F) -> Result<&T>
    where
        F: FnOnce() -> Result<T>,
    {
        self.get_or_fetch(fetch).map_err(|err| Error::fetch(op, err))
    }

    /// The cached value, without triggering a fetch.
    pub fn get(&self) -> Option<&T> {
        self.slot.get().and_then(|outcome| outcome.as_ref().ok())
    }

    pub fn state(&self) -> InfoState {
        match self.slot.get() {
            None => InfoState::Unresolved,
            Some(Ok(_)) => InfoState::Ready,
            Some(Err(_)) => InfoState::Failed,
        }
    }
}

impl<T> Default for InfoCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for InfoCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfoCell")
            .field("state", &self.state())
            .field("value", &self.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn fetches_once_and_caches_value() {
        let cell = InfoCell::new();
        let calls = AtomicUsize::new(0);
        assert_eq!(cell.state(), InfoState::Unresolved);

        for _ in 0..3 {
            let value = cell
                .get_or_fetch(|| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(42u64)
                })
                .unwrap();
            assert_eq!(*value, 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cell.state(), InfoState::Ready);
    }

    #[test]
    fn failure_is_cached_and_never_retried() {
        let cell: InfoCell<u64> = InfoCell::new();
        let calls = AtomicUsize::new(0);

        let first = cell
            .get_or_fetch(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::not_found("gone"))
            })
            .unwrap_err();
        let second = cell
            .get_or_fetch(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            })
            .unwrap_err();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cell.state(), InfoState::Failed);
        assert!(cell.get().is_none());
    }

    #[test]
    fn accessor_context_wraps_cached_error() {
        let cell: InfoCell<u64> = InfoCell::new();
        let err = cell
            .get_or_fetch_for("last modified", || Err(Error::not_found("x")))
            .unwrap_err();
        assert!(matches!(err, Error::Fetch { op: "last modified", .. }));
        assert!(err.is_not_found());
    }

    #[test]
    fn ready_cell_never_fetches() {
        let cell = InfoCell::ready(7u32);
        let value = cell
            .get_or_fetch(|| panic!("resolved cells must not fetch"))
            .unwrap();
        assert_eq!(*value, 7);
    }

    #[test]
    fn concurrent_first_access_runs_one_fetch() {
        const CALLERS: usize = 16;
        let cell: Arc<InfoCell<String>> = Arc::new(InfoCell::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(CALLERS));

        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let cell = Arc::clone(&cell);
                let calls = Arc::clone(&calls);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cell.get_or_fetch(|| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(20));
                        Ok("resolved".to_string())
                    })
                    .map(|v| v.clone())
                    .map_err(|e| e.to_string())
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), "resolved");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
