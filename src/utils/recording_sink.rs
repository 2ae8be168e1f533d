//! Location sink that keeps every published update, for tests and demos

use std::sync::{Arc, Mutex};

use crate::traits::{DriverStatusUpdate, LocationSink};

#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    updates: Arc<Mutex<Vec<DriverStatusUpdate>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far, oldest first
    pub fn updates(&self) -> Vec<DriverStatusUpdate> {
        self.updates
            .lock()
            .map(|u| u.clone())
            .unwrap_or_default()
    }
}

impl LocationSink for RecordingSink {
    fn publish(&self, update: DriverStatusUpdate) {
        // a poisoned buffer just drops the update, same as a lost broadcast
        if let Ok(mut updates) = self.updates.lock() {
            updates.push(update);
        }
    }
}
