//! Outbound side of the sync: turns local preference edits into messages
//! for the other device.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use crate::prefs::PrefValue;
use crate::store::{ChangeOrigin, PreferenceStore, SubscriptionId};

use super::channel::SyncChannel;
use super::protocol::{OriginPath, SyncMessage, SyncPayload};

/// Source of payload timestamps, in milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Wall clock that never repeats or goes backwards.
///
/// The transport drops payloads identical to the previous one, so two
/// edits within the same millisecond still need distinct timestamps.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: AtomicI64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let mut prev = self.last.load(Ordering::SeqCst);
        loop {
            let next = now.max(prev + 1);
            match self
                .last
                .compare_exchange(prev, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}

/// Sends local preference changes to the other device.
pub struct ChangeEmitter {
    origin: OriginPath,
    channel: Arc<dyn SyncChannel>,
    clock: Arc<dyn Clock>,
    sent: AtomicU64,
    dropped: AtomicU64,
}

impl ChangeEmitter {
    pub fn new(origin: OriginPath, channel: Arc<dyn SyncChannel>) -> Self {
        Self::with_clock(origin, channel, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(origin: OriginPath, channel: Arc<dyn SyncChannel>, clock: Arc<dyn Clock>) -> Self {
        Self {
            origin,
            channel,
            clock,
            sent: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn origin(&self) -> OriginPath {
        self.origin
    }

    /// Number of messages handed to the channel.
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Number of messages the channel refused.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Forwards every local change made to `store`.
    ///
    /// Remote and restore writes are skipped so that a change received from
    /// the other device is never sent back to it.
    pub fn attach(self: &Arc<Self>, store: &PreferenceStore) -> SubscriptionId {
        let emitter = Arc::clone(self);
        store.subscribe(move |change| {
            if change.origin == ChangeOrigin::Local {
                emitter.emit(&change.key, change.value.clone());
            }
        })
    }

    /// Sends a single changed preference.
    ///
    /// Returns the message if the channel accepted it. A refused send is
    /// logged and dropped.
    pub fn emit(&self, key: &str, value: PrefValue) -> Option<SyncMessage> {
        let payload = SyncPayload::single(key, value, self.clock.now_millis());
        self.send(SyncMessage::config_update(self.origin, &payload))
    }

    /// Asks the other device for fresh data identified by `id`.
    pub fn request_data(&self, id: &str) -> Option<SyncMessage> {
        self.send(SyncMessage::data_update_request(id, self.clock.now_millis()))
    }

    fn send(&self, message: SyncMessage) -> Option<SyncMessage> {
        match self.channel.send(message.clone()) {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Sent {} (ts {})", message.path, message.timestamp);
                Some(message)
            }
            Err(e) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Dropped message for {}: {}", message.path, e);
                None
            }
        }
    }
}

impl std::fmt::Debug for ChangeEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeEmitter")
            .field("origin", &self.origin)
            .field("sent", &self.sent())
            .field("dropped", &self.dropped())
            .finish()
    }
}
