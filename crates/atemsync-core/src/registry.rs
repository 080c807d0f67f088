// ── Coordinator registry ──
//
// Running coordinators keyed by switcher address, so commands name the
// device they target. One coordinator per address.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, info};

use crate::command::Command;
use crate::coordinator::SyncCoordinator;
use crate::error::CoreError;

/// Address-keyed set of running coordinators.
#[derive(Default)]
pub struct CoordinatorRegistry {
    coordinators: DashMap<String, SyncCoordinator>,
}

impl CoordinatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `coordinator` under its configured address.
    ///
    /// Fails with [`CoreError::AlreadyConfigured`] if that address is
    /// already taken; the existing entry is left untouched.
    pub fn insert(&self, coordinator: SyncCoordinator) -> Result<(), CoreError> {
        let key = normalize(coordinator.address());
        match self.coordinators.entry(key) {
            Entry::Occupied(entry) => Err(CoreError::AlreadyConfigured {
                address: entry.key().clone(),
            }),
            Entry::Vacant(entry) => {
                debug!(address = %entry.key(), "coordinator registered");
                entry.insert(coordinator);
                Ok(())
            }
        }
    }

    pub fn get(&self, address: &str) -> Option<SyncCoordinator> {
        self.coordinators
            .get(&normalize(address))
            .map(|entry| entry.value().clone())
    }

    pub fn contains(&self, address: &str) -> bool {
        self.coordinators.contains_key(&normalize(address))
    }

    /// Registered addresses, sorted.
    pub fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<_> = self
            .coordinators
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        addresses.sort();
        addresses
    }

    pub fn len(&self) -> usize {
        self.coordinators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinators.is_empty()
    }

    /// Route `command` to the coordinator for `address`.
    pub async fn execute(&self, address: &str, command: Command) -> Result<(), CoreError> {
        let coordinator = self.get(address).ok_or_else(|| CoreError::NotFound {
            address: address.to_owned(),
        })?;
        coordinator.execute(command).await
    }

    /// Remove the coordinator for `address` and shut it down.
    pub async fn remove(&self, address: &str) -> Result<(), CoreError> {
        let (key, coordinator) =
            self.coordinators
                .remove(&normalize(address))
                .ok_or_else(|| CoreError::NotFound {
                    address: address.to_owned(),
                })?;
        coordinator.shutdown().await;
        info!(address = %key, "coordinator removed");
        Ok(())
    }

    /// Shut down and drop every coordinator.
    pub async fn shutdown_all(&self) {
        for address in self.addresses() {
            if let Some((_, coordinator)) = self.coordinators.remove(&address) {
                coordinator.shutdown().await;
            }
        }
    }
}

fn normalize(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}
