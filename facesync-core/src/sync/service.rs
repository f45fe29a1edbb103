//! Inbound side of the sync: applies config updates from the other device
//! to a local store.
//!
//! A service accepts exactly one origin path. Everything else is ignored,
//! which is what keeps a device from re-applying its own broadcasts.
//! Accepted entries are written with [`ChangeOrigin::Remote`] so the local
//! emitter does not send them back.

use crate::prefs::codec;
use crate::store::{ChangeOrigin, PreferenceStore};

use super::protocol::{OriginPath, Route, SyncMessage};

/// Processing state of a [`SyncService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// Not started, or shut down.
    Stopped,
    Idle,
    ReceivingMessage,
    Applying,
}

/// What happened to each entry of an applied message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Keys whose stored value changed.
    pub applied: Vec<String>,
    /// Keys that already held the received value.
    pub unchanged: Vec<String>,
    /// Keys that could not be written, with the reason.
    pub rejected: Vec<(String, String)>,
}

impl ApplyReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Outcome of handing a message to a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The service is not running.
    Stopped,
    /// The path is not one this service accepts.
    Ignored(Route),
    /// Accepted path, but the payload carried no preferences.
    Empty,
    Applied(ApplyReport),
    /// A data update request for the host application to serve.
    DataRequest(String),
}

/// Applies inbound config updates to a preference store.
#[derive(Debug)]
pub struct SyncService {
    accept: OriginPath,
    store: PreferenceStore,
    state: ServiceState,
}

impl SyncService {
    /// Creates a stopped service that will accept updates from `accept`.
    pub fn new(accept: OriginPath, store: PreferenceStore) -> Self {
        Self {
            accept,
            store,
            state: ServiceState::Stopped,
        }
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn store(&self) -> &PreferenceStore {
        &self.store
    }

    pub fn is_running(&self) -> bool {
        self.state != ServiceState::Stopped
    }

    pub fn start(&mut self) {
        if self.state == ServiceState::Stopped {
            tracing::debug!(
                "Sync service for {} updates started on {}",
                self.accept,
                self.store.name()
            );
            self.state = ServiceState::Idle;
        }
    }

    pub fn shutdown(&mut self) {
        if self.state != ServiceState::Stopped {
            tracing::debug!("Sync service for {} updates stopped", self.accept);
            self.state = ServiceState::Stopped;
        }
    }

    /// Handles one inbound message.
    ///
    /// Entries are written one at a time; an entry that fails does not undo
    /// the ones written before it.
    pub fn dispatch(&mut self, message: &SyncMessage) -> Dispatch {
        if self.state == ServiceState::Stopped {
            tracing::debug!("Dropping {} while stopped", message.path);
            return Dispatch::Stopped;
        }

        self.state = ServiceState::ReceivingMessage;

        let route = message.route();
        if route != Route::ConfigUpdate(self.accept) {
            tracing::debug!("Ignoring message for {}", message.path);
            self.state = ServiceState::Idle;
            return Dispatch::Ignored(route);
        }

        if message.prefs.is_empty() {
            tracing::debug!("Ignoring empty payload on {}", message.path);
            self.state = ServiceState::Idle;
            return Dispatch::Empty;
        }

        self.state = ServiceState::Applying;
        let mut report = ApplyReport::default();

        for (key, raw) in &message.prefs {
            let entry = match codec::encode(key, raw) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping {} from {}: {}", key, self.accept, e);
                    report.rejected.push((key.clone(), e.to_string()));
                    continue;
                }
            };

            match self
                .store
                .put(&entry.key, codec::decode(&entry), ChangeOrigin::Remote)
            {
                Ok(true) => report.applied.push(entry.key),
                Ok(false) => report.unchanged.push(entry.key),
                Err(e) => {
                    tracing::warn!("Failed to store {} from {}: {}", key, self.accept, e);
                    report.rejected.push((entry.key, e.to_string()));
                }
            }
        }

        tracing::info!(
            "Applied {} update (ts {}): {} changed, {} unchanged, {} rejected",
            self.accept,
            message.timestamp,
            report.applied.len(),
            report.unchanged.len(),
            report.rejected.len()
        );

        self.state = ServiceState::Idle;
        Dispatch::Applied(report)
    }
}
