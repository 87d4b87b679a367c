//! Local-network client for Terneo / Welrok floor-heating thermostats.

pub mod models {
    pub mod device;
    pub mod params;
    pub mod state;
    pub mod status;
}

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod utils;
pub mod services {
    pub mod poll;
}

pub use client::{TerneoClient, pair};
pub use error::{Error, Result};
pub use models::device::{ControlType, DeviceIdentity, Generation, Mode, OperationMode, SensorType};
pub use models::state::DeviceState;
