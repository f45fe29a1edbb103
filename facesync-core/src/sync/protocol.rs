//! Sync message format shared by the companion and the wearable.
//!
//! A message is addressed by a path. Config updates use one path per origin
//! device so each side can tell its own changes apart from the other's.
//! Messages are CBOR-encoded on the wire.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::prefs::{codec, PrefValue};

/// Path used when a config change comes from the companion.
pub const PATH_CONFIG_UPDATE_COMPANION: &str = "/config_update/companion";

/// Path used when a config change comes from the wearable.
pub const PATH_CONFIG_UPDATE_WEARABLE: &str = "/config_update/wearable";

/// Prefix for data requests by the wearable, e.g. `/data_update_request/weather`.
pub const PATH_DATA_UPDATE_REQUEST: &str = "/data_update_request/";

/// The device a config update originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginPath {
    Companion,
    Wearable,
}

impl OriginPath {
    pub fn as_path(&self) -> &'static str {
        match self {
            OriginPath::Companion => PATH_CONFIG_UPDATE_COMPANION,
            OriginPath::Wearable => PATH_CONFIG_UPDATE_WEARABLE,
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        match path {
            PATH_CONFIG_UPDATE_COMPANION => Some(OriginPath::Companion),
            PATH_CONFIG_UPDATE_WEARABLE => Some(OriginPath::Wearable),
            _ => None,
        }
    }
}

impl std::fmt::Display for OriginPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OriginPath::Companion => write!(f, "companion"),
            OriginPath::Wearable => write!(f, "wearable"),
        }
    }
}

/// What an inbound path refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    ConfigUpdate(OriginPath),
    DataUpdateRequest(String),
    Unknown(String),
}

impl Route {
    pub fn parse(path: &str) -> Self {
        if let Some(origin) = OriginPath::from_path(path) {
            return Route::ConfigUpdate(origin);
        }
        match path.strip_prefix(PATH_DATA_UPDATE_REQUEST) {
            Some(id) if !id.is_empty() => Route::DataUpdateRequest(id.to_string()),
            _ => Route::Unknown(path.to_string()),
        }
    }
}

/// Builds the path for a data update request.
pub fn data_update_request_path(id: &str) -> String {
    format!("{}{}", PATH_DATA_UPDATE_REQUEST, id)
}

/// A typed config update: the preferences that changed and a timestamp
/// that only exists to make every payload unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPayload {
    pub prefs: BTreeMap<String, PrefValue>,
    pub timestamp: i64,
}

impl SyncPayload {
    /// A payload carrying a single changed preference.
    pub fn single(key: impl Into<String>, value: PrefValue, timestamp: i64) -> Self {
        let mut prefs = BTreeMap::new();
        prefs.insert(key.into(), value);
        Self { prefs, timestamp }
    }
}

/// A message as it travels between devices.
///
/// `prefs` stays dynamically typed so that unsupported entries can be
/// rejected one at a time by the receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMessage {
    pub path: String,
    #[serde(default)]
    pub prefs: Map<String, Value>,
    #[serde(default)]
    pub timestamp: i64,
}

impl SyncMessage {
    /// Wraps a payload for sending from `origin`.
    pub fn config_update(origin: OriginPath, payload: &SyncPayload) -> Self {
        let prefs = payload
            .prefs
            .iter()
            .map(|(key, value)| (key.clone(), codec::to_wire(value)))
            .collect();

        Self {
            path: origin.as_path().to_string(),
            prefs,
            timestamp: payload.timestamp,
        }
    }

    /// A request from the wearable for fresh data identified by `id`.
    pub fn data_update_request(id: &str, timestamp: i64) -> Self {
        Self {
            path: data_update_request_path(id),
            prefs: Map::new(),
            timestamp,
        }
    }

    pub fn route(&self) -> Route {
        Route::parse(&self.path)
    }

    /// Encode message as CBOR bytes.
    pub fn encode(&self) -> Result<Vec<u8>, ciborium::ser::Error<std::io::Error>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)?;
        Ok(buf)
    }

    /// Decode message from CBOR bytes.
    pub fn decode(data: &[u8]) -> Result<Self, ciborium::de::Error<std::io::Error>> {
        ciborium::from_reader(data)
    }
}
