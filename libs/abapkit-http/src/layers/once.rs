use std::sync::atomic::{AtomicBool, Ordering};

/// Armed/fired flag for interceptors that must act exactly once.
///
/// A fresh `OneShot` is armed. [`fire`](Self::fire) flips it with a single
/// compare-exchange, so among any number of concurrent callers exactly one
/// observes `true` and performs the one-time action. Everyone else sees the
/// interceptor as already gone.
///
/// ```
/// use abapkit_http::OneShot;
///
/// let csrf_fetch = OneShot::new();
/// assert!(csrf_fetch.is_armed());
/// assert!(csrf_fetch.fire());
/// assert!(!csrf_fetch.fire());
/// ```
#[derive(Debug, Default)]
pub struct OneShot {
    fired: AtomicBool,
}

impl OneShot {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            fired: AtomicBool::new(false),
        }
    }

    /// `true` until someone successfully fires.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        !self.fired.load(Ordering::Acquire)
    }

    /// Transition armed → fired. Returns `true` only for the caller that did it.
    pub fn fire(&self) -> bool {
        self.fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
