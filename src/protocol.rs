//! Request and response envelopes of the device's JSON protocol.
//!
//! | operation        | endpoint    | body                                |
//! |------------------|-------------|-------------------------------------|
//! | read parameters  | `/api.cgi`  | `{"cmd":1,"sn":…}`                  |
//! | read status      | `/api.cgi`  | `{"cmd":4,"sn":…}`                  |
//! | write parameters | `/api.cgi`  | `{"sn":…,"par":[[id,type,value]…]}` |
//! | restart          | `/test.cgi` | `{"cmd":"restart"}`                 |

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::device::Generation;
use crate::models::params::{Param, WireParam};
use crate::models::status::StatusReport;

pub const CMD_GET_PARAMS: u8 = 1;
pub const CMD_GET_STATUS: u8 = 4;
pub const CMD_RESTART: &str = "restart";

#[derive(Debug, Serialize)]
struct CommandRequest<'a> {
    cmd: u8,
    sn: &'a str,
}

#[derive(Debug, Serialize)]
struct WriteRequest<'a> {
    sn: &'a str,
    par: &'a [WireParam],
}

#[derive(Debug, Serialize)]
struct RestartRequest {
    cmd: &'static str,
}

#[derive(Debug, Deserialize)]
struct ParamsResponse {
    #[serde(default)]
    sn: Option<String>,
    #[serde(default)]
    par: Option<Vec<WireParam>>,
}

fn to_value<T: Serialize>(request: &T) -> Result<Value> {
    Ok(serde_json::to_value(request)?)
}

pub fn read_params_request(serial: &str) -> Result<Value> {
    to_value(&CommandRequest {
        cmd: CMD_GET_PARAMS,
        sn: serial,
    })
}

pub fn read_status_request(serial: &str) -> Result<Value> {
    to_value(&CommandRequest {
        cmd: CMD_GET_STATUS,
        sn: serial,
    })
}

pub fn write_params_request(serial: &str, params: &[WireParam]) -> Result<Value> {
    to_value(&WriteRequest { sn: serial, par: params })
}

pub fn restart_request() -> Result<Value> {
    to_value(&RestartRequest { cmd: CMD_RESTART })
}

/// Decode the `par` list, checking the echoed serial when present.
pub fn decode_params(body: Value, serial: &str) -> Result<Vec<WireParam>> {
    let resp: ParamsResponse = serde_path_to_error::deserialize(body)?;
    if let Some(sn) = resp.sn.as_deref()
        && sn != serial
    {
        return Err(Error::Protocol(format!(
            "serial number mismatch: expected {}, device answered {}",
            serial, sn
        )));
    }
    resp.par
        .ok_or_else(|| Error::Protocol("parameter response lacks `par`".to_string()))
}

pub fn decode_status(body: &Value) -> Result<StatusReport> {
    match body {
        Value::Object(map) => StatusReport::from_map(map),
        other => Err(Error::Protocol(format!("status response is not an object: {}", other))),
    }
}

/// A write is acknowledged by any non-empty body without an error marker.
pub fn check_write_ack(body: &Value) -> Result<()> {
    let map = match body {
        Value::Object(map) if !map.is_empty() => map,
        other => return Err(Error::Protocol(format!("missing write acknowledgement: {}", other))),
    };
    if let Some(err) = map.get("error") {
        return Err(Error::Protocol(format!("device rejected write: {}", err)));
    }
    if let Some(success) = map.get("success")
        && success.as_str() != Some("true")
    {
        return Err(Error::Protocol(format!("device rejected write: success={}", success)));
    }
    Ok(())
}

/// Restart succeeds only on the string `"true"`.
pub fn check_restart_ack(body: &Value) -> Result<()> {
    match body.get("success") {
        Some(Value::String(s)) if s == "true" => Ok(()),
        other => Err(Error::Protocol(format!(
            "restart not acknowledged: success={}",
            other.map(Value::to_string).unwrap_or_else(|| "-".to_string())
        ))),
    }
}

/// New units expose air-sensor parameters; old ones never do.
pub fn detect_generation(params: &[WireParam]) -> Generation {
    let air_params = [Param::ManualAir, Param::AwayAir, Param::UpperAirLimit];
    if params.iter().any(|p| air_params.iter().any(|a| a.id() == p.id)) {
        Generation::New
    } else {
        Generation::Old
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::params::WireType;
    use serde_json::json;

    fn fixture(name: &str) -> Value {
        let json = std::fs::read_to_string(format!("tests/data/{}", name)).expect("fixture present");
        serde_json::from_str(&json).expect("parse fixture")
    }

    #[test]
    fn request_shapes() {
        assert_eq!(read_params_request("A1").unwrap(), json!({"cmd": 1, "sn": "A1"}));
        assert_eq!(read_status_request("A1").unwrap(), json!({"cmd": 4, "sn": "A1"}));
        assert_eq!(restart_request().unwrap(), json!({"cmd": "restart"}));
        let write = write_params_request(
            "A1",
            &[
                WireParam::new(125, WireType::Bool, "0"),
                WireParam::new(2, WireType::UInt8, "1"),
            ],
        )
        .unwrap();
        assert_eq!(write, json!({"sn": "A1", "par": [[125, 7, "0"], [2, 2, "1"]]}));
        assert!(write.get("cmd").is_none());
    }

    #[test]
    fn decodes_new_generation_fixture() {
        let params = decode_params(fixture("params-new.json"), "0123456789ABCDEF").unwrap();
        assert!(params.len() > 40);
        assert_eq!(detect_generation(&params), Generation::New);
        let upper = params.iter().find(|p| p.id == 26).unwrap();
        assert_eq!(upper.wire_type, WireType::UInt8);
        assert_eq!(upper.value, "35");
    }

    #[test]
    fn decodes_old_generation_fixture() {
        let params = decode_params(fixture("params-old.json"), "OLD0000000000001").unwrap();
        assert_eq!(detect_generation(&params), Generation::Old);
    }

    #[test]
    fn params_response_failures() {
        assert!(matches!(
            decode_params(json!({"sn": "A1"}), "A1"),
            Err(Error::Protocol(_))
        ));
        assert!(matches!(
            decode_params(json!({"sn": "B2", "par": []}), "A1"),
            Err(Error::Protocol(_))
        ));
        let err = decode_params(json!({"par": [[1, 2, "3"], [2, 42, "0"]]}), "A1").unwrap_err();
        match err {
            Error::Protocol(msg) => assert!(msg.contains("par[1]"), "{}", msg),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn status_must_be_object() {
        assert!(decode_status(&json!([1, 2])).is_err());
        let report = decode_status(&fixture("status-new.json")).unwrap();
        assert_eq!(report.floor_temperature, Some(24.0));
    }

    #[test]
    fn write_acknowledgement_rules() {
        assert!(check_write_ack(&json!({"success": "true"})).is_ok());
        assert!(check_write_ack(&json!({"sn": "A1"})).is_ok());
        assert!(check_write_ack(&json!({})).is_err());
        assert!(check_write_ack(&json!({"success": "false"})).is_err());
        assert!(check_write_ack(&json!({"success": true})).is_err());
        assert!(check_write_ack(&json!({"error": "blocked"})).is_err());
    }

    #[test]
    fn restart_needs_string_true() {
        assert!(check_restart_ack(&json!({"success": "true"})).is_ok());
        assert!(check_restart_ack(&json!({"success": true})).is_err());
        assert!(check_restart_ack(&json!({"success": 1})).is_err());
        assert!(check_restart_ack(&json!({})).is_err());
    }
}
