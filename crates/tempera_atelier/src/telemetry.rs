//! Instance and registration counters.

use std::cell::{Cell, RefCell};

use serde::Serialize;
use tempera_carton::CompactString;

/// Telemetry sink owned by a registry.
#[derive(Debug, Default)]
pub struct Telemetry {
    instance_count: Cell<usize>,
    registrations: RefCell<Vec<CompactString>>,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    pub instance_count: usize,
    pub registrations: Vec<CompactString>,
}

impl Telemetry {
    pub fn increment_instance_count(&self) {
        self.instance_count.set(self.instance_count.get() + 1);
    }

    pub fn register(&self, name: &str) {
        self.registrations.borrow_mut().push(name.into());
    }

    pub fn instance_count(&self) -> usize {
        self.instance_count.get()
    }

    pub fn registrations(&self) -> Vec<CompactString> {
        self.registrations.borrow().clone()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            instance_count: self.instance_count(),
            registrations: self.registrations(),
        }
    }

    pub fn reset(&self) {
        self.instance_count.set(0);
        self.registrations.borrow_mut().clear();
    }
}
