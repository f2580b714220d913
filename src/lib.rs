mod client;
mod config;
mod endpoints;
mod error;
mod logger;
mod payloads;
pub mod policy;
mod service;
mod session;
mod types;

pub use client::{RedlinkClient, RedlinkClientBuilder};
pub use config::{AppConfig, ConfigStore, DEFAULT_CONFIG_PATH};
pub use endpoints::{EndpointConfig, DEFAULT_BASE_URL};
pub use error::{Error, Result};
pub use logger::MessageLogMode;
pub use policy::{ArmedMode, ControllerState};
pub use service::{ControlService, ControllerSummary, ManualCommand, Snapshot, StatusSummary};
pub use types::{Command, ControlMode, DeviceStatus, FanMode, SystemSwitch};
