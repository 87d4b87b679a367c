//! Device identity and the small enumerations shared by the codec and the client.

use std::fmt;
use std::str::FromStr;

/// Hardware/firmware generation, fixed at pairing time.
///
/// `Old` units (before June 2025) have no air sensor and store setpoints as
/// whole degrees; `New` units store them as tenths of a degree.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Generation {
    Old,
    New,
}

impl Generation {
    pub fn is_new(self) -> bool {
        matches!(self, Generation::New)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Generation::Old => f.write_str("old"),
            Generation::New => f.write_str("new"),
        }
    }
}

impl FromStr for Generation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "old" => Ok(Generation::Old),
            "new" => Ok(Generation::New),
            other => Err(format!("unknown device generation `{}` (expected `old` or `new`)", other)),
        }
    }
}

/// The one device a client talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub serial: String,
    /// Host name or IP, optionally with `:port`.
    pub host: String,
    pub generation: Generation,
}

impl DeviceIdentity {
    pub fn new(serial: impl Into<String>, host: impl Into<String>, generation: Generation) -> Self {
        DeviceIdentity {
            serial: serial.into(),
            host: host.into(),
            generation,
        }
    }
}

/// Which sensor decides when the relay switches.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ControlType {
    Floor,
    Air,
    AirWithFloorLimit,
}

impl ControlType {
    pub fn wire_value(self) -> u8 {
        match self {
            ControlType::Floor => 0,
            ControlType::Air => 1,
            ControlType::AirWithFloorLimit => 2,
        }
    }

    pub fn from_wire(value: i64) -> Option<Self> {
        match value {
            0 => Some(ControlType::Floor),
            1 => Some(ControlType::Air),
            2 => Some(ControlType::AirWithFloorLimit),
            _ => None,
        }
    }

    pub fn uses_air_sensor(self) -> bool {
        !matches!(self, ControlType::Floor)
    }
}

/// Floor sensor NTC resistance.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SensorType {
    K4_7,
    K6_8,
    K10,
    K12,
    K15,
    K33,
    K47,
}

impl SensorType {
    pub const ALL: [SensorType; 7] = [
        SensorType::K4_7,
        SensorType::K6_8,
        SensorType::K10,
        SensorType::K12,
        SensorType::K15,
        SensorType::K33,
        SensorType::K47,
    ];

    pub fn wire_value(self) -> u8 {
        match self {
            SensorType::K4_7 => 0,
            SensorType::K6_8 => 1,
            SensorType::K10 => 2,
            SensorType::K12 => 3,
            SensorType::K15 => 4,
            SensorType::K33 => 5,
            SensorType::K47 => 6,
        }
    }

    pub fn from_wire(value: i64) -> Option<Self> {
        usize::try_from(value).ok().and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn label(self) -> &'static str {
        match self {
            SensorType::K4_7 => "4.7k",
            SensorType::K6_8 => "6.8k",
            SensorType::K10 => "10k",
            SensorType::K12 => "12k",
            SensorType::K15 => "15k",
            SensorType::K33 => "33k",
            SensorType::K47 => "47k",
        }
    }
}

/// Mode a caller may request. Written as 0 (schedule) / 1 (manual).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Mode {
    Schedule,
    Manual,
}

impl Mode {
    pub fn wire_value(self) -> u8 {
        match self {
            Mode::Schedule => 0,
            Mode::Manual => 1,
        }
    }
}

/// Mode as reported by the status read.
///
/// The status `m.1` value is taken verbatim; `Off` is synthesised whenever
/// the power-off flag is set.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum OperationMode {
    Off,
    Schedule,
    Manual,
    Away,
    Other(i64),
}

impl OperationMode {
    pub fn from_status(value: i64) -> Self {
        match value {
            0 => OperationMode::Schedule,
            3 => OperationMode::Manual,
            4 => OperationMode::Away,
            other => OperationMode::Other(other),
        }
    }
}

impl From<Mode> for OperationMode {
    fn from(value: Mode) -> Self {
        match value {
            Mode::Schedule => OperationMode::Schedule,
            Mode::Manual => OperationMode::Manual,
        }
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationMode::Off => f.write_str("off"),
            OperationMode::Schedule => f.write_str("schedule"),
            OperationMode::Manual => f.write_str("manual"),
            OperationMode::Away => f.write_str("away"),
            OperationMode::Other(v) => write!(f, "mode {}", v),
        }
    }
}
