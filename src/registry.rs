//! Device registry: stable identities, last-known values and change
//! notifications for the host collaborator.
//!
//! The bus never unregisters a device, so there is no deletion path; the
//! registry lives exactly as long as the connection session.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::debug;

use crate::device::{Category, DeviceKey, DeviceState};

#[derive(Debug)]
pub struct Registry {
    devices: HashMap<DeviceKey, DeviceState>,
    subscribers: HashMap<Category, Vec<mpsc::UnboundedSender<DeviceState>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            devices: HashMap::with_capacity(64),
            subscribers: HashMap::new(),
        }
    }

    /// Subscribe to change notifications for one outward category. The
    /// receiver gets a fully populated state on first sight of an identity
    /// and on every value change afterwards.
    pub fn subscribe(&mut self, category: Category) -> mpsc::UnboundedReceiver<DeviceState> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.entry(category).or_default().push(tx);
        rx
    }

    /// Apply a parsed state. Returns whether anything changed. Identical
    /// values are coalesced silently; attribute-only differences update
    /// the stored record without notifying.
    pub fn apply(&mut self, state: DeviceState) -> bool {
        let key = state.key();
        let changed = match self.devices.get(&key) {
            Some(existing) => existing.state != state.state,
            None => true,
        };
        if changed {
            debug!(?key, value = ?state.state, "device state changed");
            self.notify(&state);
        }
        self.devices.insert(key, state);
        changed
    }

    pub fn lookup(&self, key: &DeviceKey) -> Option<&DeviceState> {
        self.devices.get(key)
    }

    /// Snapshot of every known device in one category, for the host
    /// collaborator's initial sync.
    pub fn devices_in_category(&self, category: Category) -> Vec<DeviceState> {
        self.devices
            .values()
            .filter(|s| s.device_type.category() == category)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    fn notify(&mut self, state: &DeviceState) {
        let category = state.device_type.category();
        if let Some(senders) = self.subscribers.get_mut(&category) {
            // Closed receivers are pruned as they are discovered.
            senders.retain(|tx| tx.send(state.clone()).is_ok());
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
