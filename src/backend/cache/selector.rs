/**
 * Backend Selector
 * 
 * A single routing gate for the chat cache. `use_fast_path` says whether
 * calls should try the fast-path store first; `connected` says whether the
 * cache is ready at all. The selector never fails a caller, it only routes.
 */

use std::sync::atomic::{AtomicBool, Ordering};

/// Tracks whether the fast-path backend is reachable
#[derive(Debug)]
pub struct BackendSelector {
    use_fast_path: AtomicBool,
    connected: AtomicBool,
}

impl BackendSelector {
    /// Create a selector.
    ///
    /// Without a configured fast path the in-process fallback is itself a
    /// valid ready state, so `connected` starts out `true`. With one, both
    /// flags wait for the first successful connect.
    pub fn new(fast_path_configured: bool) -> Self {
        Self {
            use_fast_path: AtomicBool::new(false),
            connected: AtomicBool::new(!fast_path_configured),
        }
    }

    /// Record a successful connect (or reconnect) to the fast path.
    pub fn mark_connected(&self) {
        self.use_fast_path.store(true, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
    }

    /// Record a connection-level error or disconnect. `connected` is untouched.
    pub fn mark_unavailable(&self) {
        self.use_fast_path.store(false, Ordering::SeqCst);
    }

    pub fn use_fast_path(&self) -> bool {
        self.use_fast_path.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
