//! Surround-Schalter
//!
//! Wird pro Session genau einmal gelesen, im Moment des Attach. Spaeteres
//! Umschalten wirkt nur auf Sessions, die danach attachen.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Geteilter Ein/Aus-Schalter fuer raeumliches Audio
#[derive(Debug, Clone)]
pub struct SurroundSwitch(Arc<AtomicBool>);

impl SurroundSwitch {
    pub fn new(on: bool) -> Self {
        Self(Arc::new(AtomicBool::new(on)))
    }

    pub fn is_on(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn set(&self, on: bool) {
        self.0.store(on, Ordering::Release);
    }
}

impl Default for SurroundSwitch {
    fn default() -> Self {
        Self::new(true)
    }
}
