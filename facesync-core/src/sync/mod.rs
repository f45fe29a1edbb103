//! Companion/wearable preference sync.
//!
//! ## Protocol
//!
//! 1. A local edit lands in a store with [`ChangeOrigin::Local`](crate::store::ChangeOrigin)
//! 2. The [`ChangeEmitter`] wraps it in a single-entry payload, stamps it
//!    and sends it on this device's origin path
//! 3. The other device's [`SyncService`] accepts only that path and writes
//!    each entry with `ChangeOrigin::Remote`, which its emitter skips
//!
//! Conflicts resolve last-write-wins in arrival order.

mod channel;
mod emitter;
mod error;
mod protocol;
mod service;

pub use channel::{MemoryChannel, SyncChannel};
pub use emitter::{ChangeEmitter, Clock, SystemClock};
pub use error::ChannelError;
pub use protocol::{
    data_update_request_path, OriginPath, Route, SyncMessage, SyncPayload,
    PATH_CONFIG_UPDATE_COMPANION, PATH_CONFIG_UPDATE_WEARABLE,
    PATH_DATA_UPDATE_REQUEST,
};
pub use service::{ApplyReport, Dispatch, ServiceState, SyncService};
