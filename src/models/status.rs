//! The flat `cmd:4` status response.
//!
//! Keys follow a `<group>.<index>` convention. Only the handful below are
//! interpreted; everything else is ignored.

use serde_json::{Map, Value};

use crate::codec::status_temperature;
use crate::error::{Error, Result};

pub const KEY_FLOOR_TEMPERATURE: &str = "t.1";
pub const KEY_AIR_TEMPERATURE: &str = "t.2";
pub const KEY_SETPOINT: &str = "t.5";
pub const KEY_MODE: &str = "m.1";
pub const KEY_RELAY: &str = "f.0";
/// Firmware 2.4+ only: 1 means powered off.
pub const KEY_POWER_OFF: &str = "f.16";

/// Interpreted status readings, already converted to °C.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusReport {
    pub floor_temperature: Option<f64>,
    pub air_temperature: Option<f64>,
    pub setpoint: Option<f64>,
    pub mode: Option<i64>,
    pub relay_on: Option<bool>,
    pub power_off: Option<bool>,
}

impl StatusReport {
    pub fn from_map(map: &Map<String, Value>) -> Result<Self> {
        Ok(StatusReport {
            floor_temperature: number(map, KEY_FLOOR_TEMPERATURE)?.map(status_temperature),
            air_temperature: number(map, KEY_AIR_TEMPERATURE)?.map(status_temperature),
            setpoint: number(map, KEY_SETPOINT)?.map(status_temperature),
            mode: number(map, KEY_MODE)?.map(|v| v as i64),
            relay_on: number(map, KEY_RELAY)?.map(|v| v == 1.0),
            power_off: number(map, KEY_POWER_OFF)?.map(|v| v != 0.0),
        })
    }
}

/// Status values arrive as strings (`"384"`) or plain numbers.
fn number(map: &Map<String, Value>, key: &str) -> Result<Option<f64>> {
    let parsed = match map.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(Value::Number(n)) => n.as_f64(),
        Some(_) => None,
    };
    match parsed {
        Some(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(Error::Protocol(format!(
            "status field `{}` is not numeric: {}",
            key, map[key]
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn parses_string_and_numeric_fields() {
        let report = StatusReport::from_map(&map(json!({
            "t.1": "384", "t.2": 360, "t.5": "320", "m.1": "3", "f.0": "1", "f.16": "0", "t.3": "whatever"
        })))
        .unwrap();
        assert_eq!(report.floor_temperature, Some(24.0));
        assert_eq!(report.air_temperature, Some(22.5));
        assert_eq!(report.setpoint, Some(20.0));
        assert_eq!(report.mode, Some(3));
        assert_eq!(report.relay_on, Some(true));
        assert_eq!(report.power_off, Some(false));
    }

    #[test]
    fn missing_keys_are_absent() {
        let report = StatusReport::from_map(&map(json!({"sn": "123"}))).unwrap();
        assert_eq!(report, StatusReport::default());
    }

    #[test]
    fn garbage_in_known_key_is_protocol_error() {
        let err = StatusReport::from_map(&map(json!({"t.1": "hot"}))).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }
}
