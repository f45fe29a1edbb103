//! A companion and a wearable wired together through in-memory channels,
//! with every message passed through the wire encoding.

use std::sync::Arc;

use facesync_core::{
    Companion, Device, Dispatch, MemoryChannel, PrefValue, PreferenceStore, SyncMessage, Wearable,
    COMPANION_CONFIG, PREF_LIGHT_THEME, WEARABLE_CONFIG, WEARABLE_PREFS,
};
use serde_json::json;

struct Pair {
    companion: Companion,
    wearable: Wearable,
    to_wearable: MemoryChannel,
    to_companion: MemoryChannel,
}

impl Pair {
    fn new() -> Self {
        let to_wearable = MemoryChannel::new();
        let to_companion = MemoryChannel::new();

        let mut companion = Companion::new(
            PreferenceStore::in_memory(COMPANION_CONFIG),
            PreferenceStore::in_memory(WEARABLE_CONFIG),
            Arc::new(to_wearable.clone()),
        );
        let mut wearable = Wearable::new(
            PreferenceStore::in_memory(WEARABLE_PREFS),
            Arc::new(to_companion.clone()),
        );
        companion.start().unwrap();
        wearable.start().unwrap();

        Self {
            companion,
            wearable,
            to_wearable,
            to_companion,
        }
    }

    /// Delivers every pending message in both directions until quiet.
    fn pump(&mut self) -> Vec<Dispatch> {
        let mut outcomes = Vec::new();
        loop {
            let to_wearable = self.to_wearable.drain();
            let to_companion = self.to_companion.drain();
            if to_wearable.is_empty() && to_companion.is_empty() {
                return outcomes;
            }
            for msg in to_wearable {
                outcomes.push(self.wearable.handle_message(&over_the_wire(&msg)));
            }
            for msg in to_companion {
                outcomes.push(self.companion.handle_message(&over_the_wire(&msg)));
            }
        }
    }
}

fn over_the_wire(msg: &SyncMessage) -> SyncMessage {
    SyncMessage::decode(&msg.encode().unwrap()).unwrap()
}

#[test]
fn test_companion_toggle_reaches_wearable() {
    let mut pair = Pair::new();
    assert!(!pair.wearable.light_theme());

    pair.companion
        .set(PREF_LIGHT_THEME, PrefValue::Bool(true))
        .unwrap();

    let pending = pair.to_wearable.drain();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].path, "/config_update/companion");
    assert_eq!(pending[0].prefs.get(PREF_LIGHT_THEME), Some(&json!(true)));
    assert!(pending[0].timestamp > 0);

    let outcome = pair.wearable.handle_message(&over_the_wire(&pending[0]));
    assert!(matches!(outcome, Dispatch::Applied(ref r) if r.applied == vec![PREF_LIGHT_THEME.to_string()]));
    assert!(pair.wearable.light_theme());

    // Nothing bounced back.
    assert!(pair.pump().is_empty());
}

#[test]
fn test_wearable_change_reaches_companion() {
    let mut pair = Pair::new();

    pair.wearable
        .complete_config(PREF_LIGHT_THEME, PrefValue::Bool(true))
        .unwrap();
    let outcomes = pair.pump();

    assert_eq!(outcomes.len(), 1);
    assert!(pair.companion.mirror().get_bool(PREF_LIGHT_THEME, false));
    assert!(pair.companion.config().get_bool(PREF_LIGHT_THEME, false));
}

#[test]
fn test_alternating_edits_converge_to_last_writer() {
    let mut pair = Pair::new();

    pair.companion
        .set(PREF_LIGHT_THEME, PrefValue::Bool(true))
        .unwrap();
    pair.pump();
    pair.wearable
        .complete_config(PREF_LIGHT_THEME, PrefValue::Bool(false))
        .unwrap();
    pair.pump();

    assert!(!pair.wearable.light_theme());
    assert_eq!(
        pair.companion.preferences().get(PREF_LIGHT_THEME),
        Some(&PrefValue::Bool(false))
    );

    // The companion re-sends a value it sent before; it must still arrive.
    pair.companion
        .set(PREF_LIGHT_THEME, PrefValue::Bool(true))
        .unwrap();
    assert_eq!(pair.pump().len(), 1);
    assert!(pair.wearable.light_theme());
}

#[test]
fn test_lost_completion_recovers_when_repeated() {
    let mut pair = Pair::new();
    pair.companion
        .set(PREF_LIGHT_THEME, PrefValue::Bool(false))
        .unwrap();
    pair.pump();

    // The first completion never reaches the companion.
    pair.to_companion.set_fail_sends(true);
    pair.wearable
        .complete_config(PREF_LIGHT_THEME, PrefValue::Bool(true))
        .unwrap();
    assert!(pair.pump().is_empty());
    assert!(pair.wearable.light_theme());
    assert!(!pair.companion.config().get_bool(PREF_LIGHT_THEME, true));

    // Completing the same choice again sends it.
    pair.to_companion.set_fail_sends(false);
    let changed = pair
        .wearable
        .complete_config(PREF_LIGHT_THEME, PrefValue::Bool(true))
        .unwrap();
    assert!(!changed);
    assert_eq!(pair.pump().len(), 1);

    assert!(pair.companion.config().get_bool(PREF_LIGHT_THEME, false));
    assert!(pair.companion.mirror().get_bool(PREF_LIGHT_THEME, false));
}

#[test]
fn test_data_request_surfaces_at_companion() {
    let mut pair = Pair::new();

    pair.wearable.request_data("weather").unwrap();
    let outcomes = pair.pump();

    assert_eq!(outcomes, vec![Dispatch::DataRequest("weather".to_string())]);
}
