//! Outbound transport for sync messages.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::error::ChannelError;
use super::protocol::SyncMessage;

/// A fire-and-forget link to the other device.
///
/// Implementations hand the message to the underlying transport and return
/// immediately; there is no acknowledgment and callers do not retry.
pub trait SyncChannel: Send + Sync {
    fn send(&self, message: SyncMessage) -> Result<(), ChannelError>;
}

impl<C: SyncChannel + ?Sized> SyncChannel for Arc<C> {
    fn send(&self, message: SyncMessage) -> Result<(), ChannelError> {
        (**self).send(message)
    }
}

/// In-process channel that queues messages until they are drained.
///
/// Cloning yields another handle to the same queue.
#[derive(Debug, Clone, Default)]
pub struct MemoryChannel {
    queue: Arc<Mutex<VecDeque<SyncMessage>>>,
    fail_sends: Arc<AtomicBool>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following send fail until switched back off.
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::Relaxed);
    }

    /// Removes and returns every queued message in send order.
    pub fn drain(&self) -> Vec<SyncMessage> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SyncChannel for MemoryChannel {
    fn send(&self, message: SyncMessage) -> Result<(), ChannelError> {
        if self.fail_sends.load(Ordering::Relaxed) {
            return Err(ChannelError::Unavailable("memory channel disabled".to_string()));
        }
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(message);
        Ok(())
    }
}
