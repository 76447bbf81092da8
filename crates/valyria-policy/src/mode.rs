use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{info, warn};
use valyria_core::Mode;

/// The operating mode shared by every request handler.
///
/// Cloning yields another handle on the same mode.
#[derive(Debug, Clone, Default)]
pub struct ModeState {
    inner: Arc<RwLock<Mode>>,
}

impl ModeState {
    pub fn new(mode: Mode) -> Self {
        Self {
            inner: Arc::new(RwLock::new(mode)),
        }
    }

    pub fn get(&self) -> Mode {
        *self.inner.read()
    }

    /// Switch mode, returning the previous one.
    pub fn set(&self, mode: Mode) -> Mode {
        let previous = std::mem::replace(&mut *self.inner.write(), mode);
        if previous != mode {
            info!(from = %previous, to = %mode, "mode changed");
        }
        previous
    }

    /// Enter EMERGENCY mode; returns true if the mode actually changed.
    pub fn escalate(&self, reason: &str) -> bool {
        let previous = self.set(Mode::Emergency);
        if previous != Mode::Emergency {
            warn!(reason, "entering emergency mode");
            true
        } else {
            false
        }
    }
}
