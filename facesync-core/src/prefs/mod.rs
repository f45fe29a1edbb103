//! Preference values and the codec used to move them in and out of sync
//! payloads.

pub mod codec;
mod value;

pub use codec::{CodecError, PayloadEntry};
pub use value::{PrefValue, PREF_LIGHT_THEME};
