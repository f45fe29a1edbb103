//! facesync core library
//!
//! Preference model and companion/wearable sync logic shared by the
//! facesync applications.

pub mod device;
pub mod prefs;
pub mod store;
pub mod sync;

pub use device::{Companion, Device, Wearable, COMPANION_CONFIG, WEARABLE_CONFIG, WEARABLE_PREFS};
pub use prefs::{CodecError, PayloadEntry, PrefValue, PREF_LIGHT_THEME};
pub use store::{ChangeOrigin, PreferenceChange, PreferenceStore, StoreError, SubscriptionId};
pub use sync::{
    ApplyReport, ChangeEmitter, ChannelError, Clock, Dispatch, MemoryChannel, OriginPath, Route,
    ServiceState, SyncChannel, SyncMessage, SyncPayload, SyncService, SystemClock,
};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
