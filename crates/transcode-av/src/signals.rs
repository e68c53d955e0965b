//! Pause/stop flags shared between the controller and the supervisor.

use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative control flags.
///
/// The controller only flips flags; the supervisor that owns the external
/// process reads them and acts on the process itself.
#[derive(Debug, Default)]
pub struct ControlSignals {
    paused: AtomicBool,
    stopped: AtomicBool,
}

impl ControlSignals {
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn clear_stop(&self) {
        self.stopped.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}
