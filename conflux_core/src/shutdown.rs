//! Cooperative shutdown token.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag observed by every loop in the hub.
///
/// The interrupt hook only ever stores into this; sessions, the acceptor and
/// all waiting loops poll it between blocking steps.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    flag: Arc<AtomicBool>,
}

impl ShutdownToken {
    pub fn new() -> ShutdownToken {
        ShutdownToken::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_is_visible_to_clones() {
        let token = ShutdownToken::new();
        let observer = token.clone();
        assert!(!observer.is_triggered());
        token.trigger();
        assert!(observer.is_triggered());
    }
}
