//! The two ends of the sync: the wearable running the watch face and the
//! companion app on the phone.
//!
//! Each device owns its stores, a [`SyncService`] for inbound updates and a
//! [`ChangeEmitter`] for outbound ones. The host application drives them
//! through [`Device::start`], [`Device::handle_message`] and
//! [`Device::shutdown`].

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::prefs::{PrefValue, PREF_LIGHT_THEME};
use crate::store::{ChangeOrigin, PreferenceChange, PreferenceStore, StoreError, SubscriptionId};
use crate::sync::{ChangeEmitter, Dispatch, OriginPath, Route, SyncChannel, SyncMessage, SyncService};

/// Preferences edited through the companion's settings screen.
pub const COMPANION_CONFIG: &str = "companion_config";

/// The companion's copy of the wearable's latest preferences.
pub const WEARABLE_CONFIG: &str = "wearable_config";

/// The wearable's own preferences, read by the watch face.
pub const WEARABLE_PREFS: &str = "wearable_prefs";

/// Path of a store file inside a device data directory.
pub fn store_path(data_dir: &Path, name: &str) -> std::path::PathBuf {
    data_dir.join(format!("{}.json", name))
}

/// Operations the host application needs from either device.
pub trait Device {
    /// The origin path this device sends on.
    fn role(&self) -> OriginPath;

    fn start(&mut self) -> Result<(), StoreError>;

    fn shutdown(&mut self);

    /// Records a local edit, which is then sent to the other device.
    fn set(&self, key: &str, value: PrefValue) -> Result<bool, StoreError>;

    /// Entry point for messages delivered by the transport.
    fn handle_message(&mut self, message: &SyncMessage) -> Dispatch;

    /// Current preferences as the user sees them on this device.
    fn preferences(&self) -> BTreeMap<String, PrefValue>;
}

/// The watch side.
#[derive(Debug)]
pub struct Wearable {
    store: PreferenceStore,
    service: SyncService,
    emitter: Arc<ChangeEmitter>,
    subscription: Option<SubscriptionId>,
}

impl Wearable {
    pub fn new(store: PreferenceStore, channel: Arc<dyn SyncChannel>) -> Self {
        Self::with_emitter(store, Arc::new(ChangeEmitter::new(OriginPath::Wearable, channel)))
    }

    pub fn with_emitter(store: PreferenceStore, emitter: Arc<ChangeEmitter>) -> Self {
        Self {
            service: SyncService::new(OriginPath::Companion, store.clone()),
            store,
            emitter,
            subscription: None,
        }
    }

    /// Opens the wearable's store inside `data_dir`.
    pub fn open(data_dir: &Path, channel: Arc<dyn SyncChannel>) -> Result<Self, StoreError> {
        let store = PreferenceStore::open(WEARABLE_PREFS, store_path(data_dir, WEARABLE_PREFS))?;
        Ok(Self::new(store, channel))
    }

    pub fn store(&self) -> &PreferenceStore {
        &self.store
    }

    pub fn emitter(&self) -> &Arc<ChangeEmitter> {
        &self.emitter
    }

    pub fn is_running(&self) -> bool {
        self.service.is_running()
    }

    /// A config choice made on the watch itself.
    ///
    /// Stored locally and, once started, sent to the companion. A completion
    /// is sent even when the stored value is unchanged, so a choice the
    /// companion missed can be repeated.
    pub fn complete_config(&self, key: &str, value: PrefValue) -> Result<bool, StoreError> {
        let changed = self.store.put(key, value.clone(), ChangeOrigin::Local)?;
        if !changed && self.subscription.is_some() {
            self.emitter.emit(key, value);
        }
        Ok(changed)
    }

    /// Lets the watch face react to any config change, local or remote.
    pub fn on_config_changed<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&PreferenceChange) + Send + Sync + 'static,
    {
        self.store.subscribe(listener)
    }

    pub fn light_theme(&self) -> bool {
        self.store.get_bool(PREF_LIGHT_THEME, false)
    }

    /// Asks the companion for fresh data identified by `id`.
    pub fn request_data(&self, id: &str) -> Option<SyncMessage> {
        self.emitter.request_data(id)
    }
}

impl Device for Wearable {
    fn role(&self) -> OriginPath {
        OriginPath::Wearable
    }

    fn start(&mut self) -> Result<(), StoreError> {
        if self.subscription.is_none() {
            self.subscription = Some(self.emitter.attach(&self.store));
        }
        self.service.start();
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Some(id) = self.subscription.take() {
            self.store.unsubscribe(id);
        }
        self.service.shutdown();
    }

    fn set(&self, key: &str, value: PrefValue) -> Result<bool, StoreError> {
        self.complete_config(key, value)
    }

    fn handle_message(&mut self, message: &SyncMessage) -> Dispatch {
        self.service.dispatch(message)
    }

    fn preferences(&self) -> BTreeMap<String, PrefValue> {
        self.store.all()
    }
}

/// The phone side.
///
/// Keeps two stores: `config` is what the settings screen edits, `mirror`
/// is the latest known state of the wearable. Inbound updates land in the
/// mirror; local edits are copied into it as well.
#[derive(Debug)]
pub struct Companion {
    config: PreferenceStore,
    mirror: PreferenceStore,
    service: SyncService,
    emitter: Arc<ChangeEmitter>,
    subscriptions: Vec<(PreferenceStore, SubscriptionId)>,
}

impl Companion {
    pub fn new(config: PreferenceStore, mirror: PreferenceStore, channel: Arc<dyn SyncChannel>) -> Self {
        Self::with_emitter(
            config,
            mirror,
            Arc::new(ChangeEmitter::new(OriginPath::Companion, channel)),
        )
    }

    pub fn with_emitter(config: PreferenceStore, mirror: PreferenceStore, emitter: Arc<ChangeEmitter>) -> Self {
        Self {
            service: SyncService::new(OriginPath::Wearable, mirror.clone()),
            config,
            mirror,
            emitter,
            subscriptions: Vec::new(),
        }
    }

    /// Opens both companion stores inside `data_dir`.
    pub fn open(data_dir: &Path, channel: Arc<dyn SyncChannel>) -> Result<Self, StoreError> {
        let config = PreferenceStore::open(COMPANION_CONFIG, store_path(data_dir, COMPANION_CONFIG))?;
        let mirror = PreferenceStore::open(WEARABLE_CONFIG, store_path(data_dir, WEARABLE_CONFIG))?;
        Ok(Self::new(config, mirror, channel))
    }

    pub fn config(&self) -> &PreferenceStore {
        &self.config
    }

    pub fn mirror(&self) -> &PreferenceStore {
        &self.mirror
    }

    pub fn emitter(&self) -> &Arc<ChangeEmitter> {
        &self.emitter
    }

    pub fn is_running(&self) -> bool {
        self.service.is_running()
    }

    /// Copies every mirrored wearable preference into the settings store.
    ///
    /// Must run before the emitter is attached, otherwise the whole mirror
    /// would be sent back to the wearable.
    pub fn synchronize_from_mirror(&self) -> Result<usize, StoreError> {
        let mut restored = 0;
        for (key, value) in self.mirror.all() {
            if self.config.put(&key, value, ChangeOrigin::Restore)? {
                restored += 1;
            }
        }
        Ok(restored)
    }
}

impl Device for Companion {
    fn role(&self) -> OriginPath {
        OriginPath::Companion
    }

    fn start(&mut self) -> Result<(), StoreError> {
        if self.service.is_running() {
            return Ok(());
        }

        let restored = self.synchronize_from_mirror()?;
        if restored > 0 {
            tracing::info!("Restored {} preference(s) from {}", restored, WEARABLE_CONFIG);
        }

        // Local edits are copied into the mirror.
        let mirror = self.mirror.clone();
        let copy = self.config.subscribe(move |change| {
            if change.origin == ChangeOrigin::Local {
                if let Err(e) = mirror.put(&change.key, change.value.clone(), ChangeOrigin::Local) {
                    tracing::warn!("Failed to mirror {}: {}", change.key, e);
                }
            }
        });
        self.subscriptions.push((self.config.clone(), copy));

        let send = self.emitter.attach(&self.config);
        self.subscriptions.push((self.config.clone(), send));

        // Remote updates are reflected into the settings store.
        let config = self.config.clone();
        let reflect = self.mirror.subscribe(move |change| {
            if change.origin == ChangeOrigin::Remote {
                if let Err(e) = config.put(&change.key, change.value.clone(), ChangeOrigin::Remote) {
                    tracing::warn!("Failed to apply {} to settings: {}", change.key, e);
                }
            }
        });
        self.subscriptions.push((self.mirror.clone(), reflect));

        self.service.start();
        Ok(())
    }

    fn shutdown(&mut self) {
        for (store, id) in self.subscriptions.drain(..) {
            store.unsubscribe(id);
        }
        self.service.shutdown();
    }

    fn set(&self, key: &str, value: PrefValue) -> Result<bool, StoreError> {
        self.config.put(key, value, ChangeOrigin::Local)
    }

    fn handle_message(&mut self, message: &SyncMessage) -> Dispatch {
        match self.service.dispatch(message) {
            Dispatch::Ignored(Route::DataUpdateRequest(id)) => Dispatch::DataRequest(id),
            other => other,
        }
    }

    fn preferences(&self) -> BTreeMap<String, PrefValue> {
        self.config.all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::MemoryChannel;
    use serde_json::json;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn wearable() -> (Wearable, MemoryChannel) {
        let channel = MemoryChannel::new();
        let mut device = Wearable::new(
            PreferenceStore::in_memory(WEARABLE_PREFS),
            Arc::new(channel.clone()),
        );
        device.start().unwrap();
        (device, channel)
    }

    fn companion() -> (Companion, MemoryChannel) {
        let channel = MemoryChannel::new();
        let mut device = Companion::new(
            PreferenceStore::in_memory(COMPANION_CONFIG),
            PreferenceStore::in_memory(WEARABLE_CONFIG),
            Arc::new(channel.clone()),
        );
        device.start().unwrap();
        (device, channel)
    }

    fn update(origin: OriginPath, key: &str, value: serde_json::Value, timestamp: i64) -> SyncMessage {
        let mut prefs = serde_json::Map::new();
        prefs.insert(key.to_string(), value);
        SyncMessage {
            path: origin.as_path().to_string(),
            prefs,
            timestamp,
        }
    }

    #[test]
    fn test_wearable_complete_config_is_sent() {
        let (wearable, channel) = wearable();

        wearable
            .complete_config(PREF_LIGHT_THEME, PrefValue::Bool(true))
            .unwrap();

        assert!(wearable.light_theme());
        let sent = channel.drain();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].path, "/config_update/wearable");
        assert_eq!(sent[0].prefs.get(PREF_LIGHT_THEME), Some(&json!(true)));
    }

    #[test]
    fn test_wearable_repeated_completion_is_sent_again() {
        let (wearable, channel) = wearable();

        assert!(wearable
            .complete_config(PREF_LIGHT_THEME, PrefValue::Bool(true))
            .unwrap());
        assert!(!wearable
            .complete_config(PREF_LIGHT_THEME, PrefValue::Bool(true))
            .unwrap());

        let sent = channel.drain();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].prefs, sent[1].prefs);
        assert!(sent[1].timestamp > sent[0].timestamp);
    }

    #[test]
    fn test_wearable_repeated_completion_not_sent_when_stopped() {
        let channel = MemoryChannel::new();
        let store = PreferenceStore::in_memory(WEARABLE_PREFS);
        store
            .put(PREF_LIGHT_THEME, PrefValue::Bool(true), ChangeOrigin::Remote)
            .unwrap();
        let wearable = Wearable::new(store, Arc::new(channel.clone()));

        wearable
            .complete_config(PREF_LIGHT_THEME, PrefValue::Bool(true))
            .unwrap();
        assert!(channel.is_empty());
    }

    #[test]
    fn test_wearable_applies_companion_update_without_echo() {
        let (mut wearable, channel) = wearable();

        let outcome = wearable.handle_message(&update(
            OriginPath::Companion,
            PREF_LIGHT_THEME,
            json!(true),
            1,
        ));

        assert!(matches!(outcome, Dispatch::Applied(_)));
        assert!(wearable.light_theme());
        assert!(channel.is_empty());
    }

    #[test]
    fn test_wearable_ignores_its_own_path() {
        let (mut wearable, _channel) = wearable();
        let outcome = wearable.handle_message(&update(
            OriginPath::Wearable,
            PREF_LIGHT_THEME,
            json!(true),
            1,
        ));
        assert!(matches!(outcome, Dispatch::Ignored(_)));
        assert!(!wearable.light_theme());
    }

    #[test]
    fn test_watch_face_sees_remote_and_local_changes() {
        let (mut wearable, _channel) = wearable();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        wearable.on_config_changed(move |change| sink.lock().unwrap().push(change.origin));

        wearable.handle_message(&update(OriginPath::Companion, PREF_LIGHT_THEME, json!(true), 1));
        wearable
            .complete_config(PREF_LIGHT_THEME, PrefValue::Bool(false))
            .unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![ChangeOrigin::Remote, ChangeOrigin::Local]
        );
    }

    #[test]
    fn test_wearable_not_started_does_not_send() {
        let channel = MemoryChannel::new();
        let wearable = Wearable::new(
            PreferenceStore::in_memory(WEARABLE_PREFS),
            Arc::new(channel.clone()),
        );
        wearable
            .complete_config(PREF_LIGHT_THEME, PrefValue::Bool(true))
            .unwrap();
        assert!(channel.is_empty());
        assert!(!wearable.is_running());
    }

    #[test]
    fn test_wearable_shutdown_stops_both_directions() {
        let (mut wearable, channel) = wearable();
        wearable.shutdown();

        wearable.set(PREF_LIGHT_THEME, PrefValue::Bool(true)).unwrap();
        assert!(channel.is_empty());

        let outcome = wearable.handle_message(&update(OriginPath::Companion, "k", json!(1), 1));
        assert_eq!(outcome, Dispatch::Stopped);
    }

    #[test]
    fn test_companion_edit_is_sent_and_mirrored() {
        let (companion, channel) = companion();

        companion.set(PREF_LIGHT_THEME, PrefValue::Bool(true)).unwrap();

        assert_eq!(
            companion.mirror().get(PREF_LIGHT_THEME),
            Some(PrefValue::Bool(true))
        );
        let sent = channel.drain();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].path, "/config_update/companion");
    }

    #[test]
    fn test_companion_applies_wearable_update_without_echo() {
        let (mut companion, channel) = companion();

        let outcome = companion.handle_message(&update(
            OriginPath::Wearable,
            PREF_LIGHT_THEME,
            json!(true),
            1,
        ));

        assert!(matches!(outcome, Dispatch::Applied(_)));
        assert_eq!(
            companion.mirror().get(PREF_LIGHT_THEME),
            Some(PrefValue::Bool(true))
        );
        assert_eq!(
            companion.config().get(PREF_LIGHT_THEME),
            Some(PrefValue::Bool(true))
        );
        assert!(channel.is_empty());
    }

    #[test]
    fn test_companion_last_write_wins_against_local_edit() {
        let (mut companion, channel) = companion();

        companion.set(PREF_LIGHT_THEME, PrefValue::Bool(true)).unwrap();
        companion.handle_message(&update(OriginPath::Wearable, PREF_LIGHT_THEME, json!(false), 1));
        assert_eq!(
            companion.preferences().get(PREF_LIGHT_THEME),
            Some(&PrefValue::Bool(false))
        );

        companion.set(PREF_LIGHT_THEME, PrefValue::Bool(true)).unwrap();
        assert_eq!(
            companion.preferences().get(PREF_LIGHT_THEME),
            Some(&PrefValue::Bool(true))
        );

        // Only the two local edits went out.
        assert_eq!(channel.drain().len(), 2);
    }

    #[test]
    fn test_companion_start_restores_mirror_without_sending() {
        let channel = MemoryChannel::new();
        let mirror = PreferenceStore::in_memory(WEARABLE_CONFIG);
        mirror
            .put(PREF_LIGHT_THEME, PrefValue::Bool(true), ChangeOrigin::Remote)
            .unwrap();
        mirror
            .put("pref_hand_style", PrefValue::Int(2), ChangeOrigin::Remote)
            .unwrap();

        let mut companion = Companion::new(
            PreferenceStore::in_memory(COMPANION_CONFIG),
            mirror,
            Arc::new(channel.clone()),
        );
        companion.start().unwrap();

        assert_eq!(companion.config().len(), 2);
        assert!(companion.config().get_bool(PREF_LIGHT_THEME, false));
        assert!(channel.is_empty());
    }

    #[test]
    fn test_companion_start_is_idempotent() {
        let (mut companion, channel) = companion();
        companion.start().unwrap();

        companion.set(PREF_LIGHT_THEME, PrefValue::Bool(true)).unwrap();
        assert_eq!(channel.drain().len(), 1);
    }

    #[test]
    fn test_companion_reports_data_requests() {
        let (mut companion, _channel) = companion();
        let outcome = companion.handle_message(&SyncMessage::data_update_request("weather", 1));
        assert_eq!(outcome, Dispatch::DataRequest("weather".to_string()));
    }

    #[test]
    fn test_companion_persists_both_stores() {
        let temp = TempDir::new().unwrap();
        let channel = MemoryChannel::new();

        {
            let mut companion = Companion::open(temp.path(), Arc::new(channel.clone())).unwrap();
            companion.start().unwrap();
            companion.set(PREF_LIGHT_THEME, PrefValue::Bool(true)).unwrap();
            companion.shutdown();
        }

        assert!(store_path(temp.path(), COMPANION_CONFIG).exists());
        assert!(store_path(temp.path(), WEARABLE_CONFIG).exists());

        let reopened = Companion::open(temp.path(), Arc::new(channel)).unwrap();
        assert!(reopened.config().get_bool(PREF_LIGHT_THEME, false));
        assert!(reopened.mirror().get_bool(PREF_LIGHT_THEME, false));
    }
}
