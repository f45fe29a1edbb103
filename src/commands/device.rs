//! Commands that run one end of the sync.

use clap::{Args, Subcommand};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use facesync::config::Config;
use facesync::transport::{self, RelayConnection};
use facesync_core::{
    Companion, Device, Dispatch, MemoryChannel, OriginPath, PrefValue, PreferenceStore,
    StoreError, SyncChannel, SyncMessage, Wearable,
};

use super::config_cmd::OutputFormat;

/// Run one device of the pair
#[derive(Args)]
pub struct DeviceCommand {
    #[command(subcommand)]
    command: DeviceSubcommand,
}

#[derive(Subcommand)]
enum DeviceSubcommand {
    /// Change a preference and send it to the other device
    Set {
        /// Preference key (e.g. pref_light_theme)
        key: String,

        /// New value: true/false, an integer, or text
        value: String,

        /// Store the value as text even if it looks like a bool or number
        #[arg(long)]
        string: bool,
    },

    /// Show stored preferences
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Apply updates from the other device until interrupted
    Listen,

    /// Ask the companion for fresh data (wearable only)
    Request {
        /// Identifier of the requested data (e.g. weather)
        id: String,
    },
}

impl DeviceCommand {
    pub async fn run(&self, role: OriginPath, config: &Config) -> Result<(), DeviceError> {
        let data_dir = config.device_dir(role);
        match &self.command {
            DeviceSubcommand::Set { key, value, string } => {
                let value = if *string {
                    PrefValue::String(value.clone())
                } else {
                    PrefValue::parse_cli(value)
                };
                self.set(role, &data_dir, config, key, value).await
            }
            DeviceSubcommand::Show { format } => self.show(role, &data_dir, format),
            DeviceSubcommand::Listen => self.listen(role, &data_dir, config).await,
            DeviceSubcommand::Request { id } => self.request(role, &data_dir, config, id).await,
        }
    }

    async fn set(
        &self,
        role: OriginPath,
        data_dir: &Path,
        config: &Config,
        key: &str,
        value: PrefValue,
    ) -> Result<(), DeviceError> {
        let link = Link::open(&config.relay_url.value).await;
        let mut device = open_device(role, data_dir, link.channel())?;
        device.start()?;

        let changed = device.set(key, value.clone())?;
        if changed {
            println!("{} = {} ({})", key, value, value.type_name());
        } else {
            println!("{} already {}", key, value);
        }

        device.shutdown();
        link.close().await;
        Ok(())
    }

    fn show(&self, role: OriginPath, data_dir: &Path, format: &OutputFormat) -> Result<(), DeviceError> {
        let stores = open_stores(role, data_dir)?;

        match format {
            OutputFormat::Json => {
                let all: BTreeMap<&str, BTreeMap<String, PrefValue>> = stores
                    .iter()
                    .map(|store| (store.name(), store.all()))
                    .collect();
                let json = serde_json::to_string_pretty(&all)
                    .map_err(|e| DeviceError::Output(e.to_string()))?;
                println!("{}", json);
            }
            OutputFormat::Text => {
                for (i, store) in stores.iter().enumerate() {
                    if i > 0 {
                        println!();
                    }
                    println!("{}", store.name());
                    println!("{}", "=".repeat(store.name().len()));
                    if store.is_empty() {
                        println!("(empty)");
                    }
                    for (key, value) in store.all() {
                        println!("{} = {} ({})", key, value, value.type_name());
                    }
                }
            }
        }
        Ok(())
    }

    async fn listen(&self, role: OriginPath, data_dir: &Path, config: &Config) -> Result<(), DeviceError> {
        let mut connection = transport::connect(&config.relay_url.value)
            .await
            .map_err(|e| DeviceError::Relay(e.to_string()))?;
        let mut device = open_device(role, data_dir, connection.channel())?;
        device.start()?;

        println!(
            "Listening as {} on {} (Ctrl+C to stop)",
            role, config.relay_url.value
        );

        loop {
            tokio::select! {
                inbound = connection.recv() => match inbound {
                    Some(message) => {
                        let outcome = device.handle_message(&message);
                        report(&message, &outcome, &device.preferences());
                    }
                    None => {
                        println!("Relay closed the connection");
                        break;
                    }
                },
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        device.shutdown();
        Link::Relay(connection).close().await;
        Ok(())
    }

    async fn request(
        &self,
        role: OriginPath,
        data_dir: &Path,
        config: &Config,
        id: &str,
    ) -> Result<(), DeviceError> {
        if role != OriginPath::Wearable {
            return Err(DeviceError::WearableOnly("request"));
        }

        let link = Link::open(&config.relay_url.value).await;
        let mut wearable = Wearable::open(data_dir, link.channel())?;
        wearable.start()?;

        match wearable.request_data(id) {
            Some(sent) => println!("Requested {}", sent.path),
            None => println!("Request for {} was not sent", id),
        }

        wearable.shutdown();
        link.close().await;
        Ok(())
    }
}

/// Outbound link for one-shot commands.
///
/// Falls back to a channel that refuses every send when the relay is down,
/// so local edits are still stored.
enum Link {
    Relay(RelayConnection),
    Offline(MemoryChannel),
}

impl Link {
    async fn open(url: &str) -> Self {
        match transport::connect(url).await {
            Ok(connection) => Link::Relay(connection),
            Err(e) => {
                tracing::warn!("Relay unavailable, working offline: {}", e);
                let channel = MemoryChannel::new();
                channel.set_fail_sends(true);
                Link::Offline(channel)
            }
        }
    }

    fn channel(&self) -> Arc<dyn SyncChannel> {
        let channel: Arc<dyn SyncChannel> = match self {
            Link::Relay(connection) => connection.channel(),
            Link::Offline(channel) => Arc::new(channel.clone()),
        };
        channel
    }

    async fn close(self) {
        if let Link::Relay(connection) = self {
            if let Err(e) = connection.close().await {
                tracing::warn!("{}", e);
            }
        }
    }
}

fn open_device(
    role: OriginPath,
    data_dir: &Path,
    channel: Arc<dyn SyncChannel>,
) -> Result<Box<dyn Device>, StoreError> {
    let device: Box<dyn Device> = match role {
        OriginPath::Companion => Box::new(Companion::open(data_dir, channel)?),
        OriginPath::Wearable => Box::new(Wearable::open(data_dir, channel)?),
    };
    Ok(device)
}

/// Every store a device keeps, in display order.
fn open_stores(role: OriginPath, data_dir: &Path) -> Result<Vec<PreferenceStore>, StoreError> {
    let channel = Arc::new(MemoryChannel::new());
    Ok(match role {
        OriginPath::Companion => {
            let companion = Companion::open(data_dir, channel)?;
            vec![companion.config().clone(), companion.mirror().clone()]
        }
        OriginPath::Wearable => vec![Wearable::open(data_dir, channel)?.store().clone()],
    })
}

fn report(message: &SyncMessage, outcome: &Dispatch, prefs: &BTreeMap<String, PrefValue>) {
    let at = chrono::DateTime::from_timestamp_millis(message.timestamp)
        .map(|t| t.with_timezone(&chrono::Local).format("%H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| message.timestamp.to_string());

    match outcome {
        Dispatch::Applied(report) => {
            for key in &report.applied {
                match prefs.get(key) {
                    Some(value) => println!("[{}] {} = {}", at, key, value),
                    None => println!("[{}] {} updated", at, key),
                }
            }
            for key in &report.unchanged {
                println!("[{}] {} unchanged", at, key);
            }
            for (key, reason) in &report.rejected {
                println!("[{}] {} rejected: {}", at, key, reason);
            }
        }
        Dispatch::DataRequest(id) => println!("[{}] data requested: {}", at, id),
        Dispatch::Empty => println!("[{}] empty update on {}", at, message.path),
        Dispatch::Ignored(_) | Dispatch::Stopped => {
            tracing::debug!("Ignored {}", message.path);
        }
    }
}

/// Errors from device commands
#[derive(Debug)]
pub enum DeviceError {
    Store(StoreError),
    Relay(String),
    Output(String),
    WearableOnly(&'static str),
}

impl std::fmt::Display for DeviceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceError::Store(e) => write!(f, "{}", e),
            DeviceError::Relay(e) => write!(f, "Relay error: {}", e),
            DeviceError::Output(e) => write!(f, "Failed to format output: {}", e),
            DeviceError::WearableOnly(cmd) => {
                write!(f, "'{}' is only available on the wearable", cmd)
            }
        }
    }
}

impl std::error::Error for DeviceError {}

impl From<StoreError> for DeviceError {
    fn from(e: StoreError) -> Self {
        DeviceError::Store(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facesync_core::{PREF_LIGHT_THEME, WEARABLE_CONFIG};
    use tempfile::TempDir;

    #[test]
    fn test_offline_set_is_stored() {
        let temp = TempDir::new().unwrap();
        let channel = MemoryChannel::new();
        channel.set_fail_sends(true);

        let mut device =
            open_device(OriginPath::Companion, temp.path(), Arc::new(channel.clone())).unwrap();
        device.start().unwrap();
        assert!(device.set(PREF_LIGHT_THEME, PrefValue::Bool(true)).unwrap());
        device.shutdown();

        let stores = open_stores(OriginPath::Companion, temp.path()).unwrap();
        assert_eq!(stores.len(), 2);
        assert!(stores[0].get_bool(PREF_LIGHT_THEME, false));
        assert_eq!(stores[1].name(), WEARABLE_CONFIG);
        assert!(stores[1].get_bool(PREF_LIGHT_THEME, false));
    }

    #[test]
    fn test_wearable_has_one_store() {
        let temp = TempDir::new().unwrap();
        let stores = open_stores(OriginPath::Wearable, temp.path()).unwrap();
        assert_eq!(stores.len(), 1);
        assert!(stores[0].is_empty());
    }

    #[tokio::test]
    async fn test_request_rejected_on_companion() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("config.yaml");
        std::fs::write(&config_path, format!("data_dir: {}\n", temp.path().display())).unwrap();
        let config = Config::load_with_env(Some(config_path), |_| None).unwrap();

        let cmd = DeviceCommand {
            command: DeviceSubcommand::Request {
                id: "weather".to_string(),
            },
        };
        let result = cmd.run(OriginPath::Companion, &config).await;
        assert!(matches!(result, Err(DeviceError::WearableOnly(_))));
    }

    #[tokio::test]
    async fn test_link_open_and_close_through_relay() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hub = Arc::new(facesync::relay::RelayHub::new());
        tokio::spawn(facesync::relay::serve_on(listener, Arc::clone(&hub)));

        let link = Link::open(&format!("ws://{}", addr)).await;
        assert!(matches!(link, Link::Relay(_)));
        link.close().await;
    }

    #[tokio::test]
    async fn test_link_falls_back_offline() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let link = Link::open(&format!("ws://{}", addr)).await;
        let channel = link.channel();
        let message = SyncMessage::data_update_request("weather", 1);
        assert!(channel.send(message).is_err());
        link.close().await;
    }
}
