use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared cancellation state. A state may have a parent, so cancelling a
/// parent cancels every descendant.
struct CancelState {
    cancelled: AtomicBool,
    parent: Option<Arc<CancelState>>,
}

impl CancelState {
    #[inline]
    fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::Relaxed) {
            return true;
        }
        match self.parent {
            Some(ref p) => p.is_cancelled(),
            None => false,
        }
    }
}

/// Hierarchical cancellation token.
///
/// Cheap to clone and check. Cancelling a token cancels all of its
/// children; a child cannot un-cancel its parent.
#[derive(Clone)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl CancelToken {
    /// Create a new root token.
    #[inline]
    pub fn new_root() -> Self {
        Self {
            state: Arc::new(CancelState {
                cancelled: AtomicBool::new(false),
                parent: None,
            }),
        }
    }

    /// Create a child token linked to this one.
    #[inline]
    pub fn new_child(&self) -> Self {
        Self {
            state: Arc::new(CancelState {
                cancelled: AtomicBool::new(false),
                parent: Some(self.state.clone()),
            }),
        }
    }

    /// Cancel this token and, transitively, all of its children.
    #[inline]
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Relaxed);
    }

    /// Check whether this token or any ancestor has been cancelled.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.state.is_cancelled()
    }

    /// Sleep for `total`, waking early if the token is cancelled.
    /// Returns `false` when the sleep was cut short by cancellation.
    pub fn sleep_cancellable(&self, total: Duration) -> bool {
        let tick = Duration::from_millis(20);
        let mut slept = Duration::ZERO;

        while slept < total {
            if self.is_cancelled() {
                return false;
            }
            let step = tick.min(total - slept);
            std::thread::sleep(step);
            slept += step;
        }
        !self.is_cancelled()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("is_cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_cancels_children() {
        let root = CancelToken::new_root();
        let child = root.new_child();
        assert!(!child.is_cancelled());
        root.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn child_does_not_cancel_parent() {
        let root = CancelToken::new_root();
        let child = root.new_child();
        child.cancel();
        assert!(!root.is_cancelled());
        assert!(child.is_cancelled());
    }

    #[test]
    fn cancellable_sleep_cuts_short() {
        let token = CancelToken::new_root();
        token.cancel();
        assert!(!token.sleep_cancellable(Duration::from_secs(5)));
    }
}
