mod config_cmd;
mod device;

pub use config_cmd::ConfigCommand;
pub use device::DeviceCommand;
