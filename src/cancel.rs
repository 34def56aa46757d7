//! Cooperative cancellation of blocking cache calls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag that makes blocking cache calls give up.
///
/// Clones observe the same flag. Once cancelled, `fill` returns `0` as if the
/// stream had ended, forwarded controls report
/// [`ControlError::Unsupported`](crate::ControlError::Unsupported) and the
/// prefill wait in `build` stops early. Nothing is torn down; call
/// [`reset`](Self::reset) to use the cache again.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every blocking call watching this token return.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Clears a previous cancellation.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());

        token.cancel();
        assert!(other.is_cancelled());

        other.reset();
        assert!(!token.is_cancelled());
    }
}
