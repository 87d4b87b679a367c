//! Conversion between wire integers and physical units.
//!
//! The generation is always passed in by the caller; nothing here looks at a
//! value to guess which encoding it uses.

use chrono::{DateTime, NaiveDateTime, NaiveTime};

use crate::error::{Error, Result};
use crate::models::device::Generation;
use crate::models::params::{Param, ParamSpec, ParamTable, Role, WireParam, WireType};

/// Unix timestamp of 2000-01-01T00:00:00, the device's time origin.
const DEVICE_EPOCH_UNIX: i64 = 946_684_800;
/// Wire units at which the power encoding switches from 10 W to 20 W steps.
const POWER_SPLIT_WIRE: i64 = 150;
const POWER_SPLIT_WATTS: i64 = 1500;
const BOUNDS_EPSILON: f64 = 1e-9;

pub fn temperature_from_wire(generation: Generation, raw: i64) -> f64 {
    match generation {
        Generation::Old => raw as f64,
        Generation::New => raw as f64 / 10.0,
    }
}

pub fn temperature_to_wire(generation: Generation, celsius: f64) -> i64 {
    match generation {
        Generation::Old => celsius.round() as i64,
        Generation::New => (celsius * 10.0).round() as i64,
    }
}

/// Status readings (`t.*`) are raw × 16 on both generations.
pub fn status_temperature(raw: f64) -> f64 {
    raw / 16.0
}

pub fn tenths_from_wire(raw: i64) -> f64 {
    raw as f64 / 10.0
}

pub fn tenths_to_wire(value: f64) -> i64 {
    (value * 10.0).round() as i64
}

pub fn watts_from_wire(raw: i64) -> i64 {
    if raw <= POWER_SPLIT_WIRE {
        raw * 10
    } else {
        raw * 20 - POWER_SPLIT_WATTS
    }
}

pub fn watts_to_wire(watts: i64) -> i64 {
    if watts <= POWER_SPLIT_WATTS {
        watts / 10
    } else {
        (watts + POWER_SPLIT_WATTS) / 20
    }
}

pub fn timestamp_from_wire(raw: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp(DEVICE_EPOCH_UNIX.checked_add(raw)?, 0).map(|dt| dt.naive_utc())
}

pub fn timestamp_to_wire(value: NaiveDateTime) -> i64 {
    value.and_utc().timestamp() - DEVICE_EPOCH_UNIX
}

pub fn minutes_to_time(minutes: u16) -> Option<NaiveTime> {
    NaiveTime::from_num_seconds_from_midnight_opt(u32::from(minutes) * 60, 0)
}

fn physical_from_wire(spec: &ParamSpec, generation: Generation, raw: i64) -> f64 {
    match spec.role {
        Role::Temperature => temperature_from_wire(generation, raw),
        Role::Tenths => tenths_from_wire(raw),
        Role::Power => watts_from_wire(raw) as f64,
        _ => raw as f64,
    }
}

fn physical_to_wire(spec: &ParamSpec, generation: Generation, value: f64) -> i64 {
    match spec.role {
        Role::Temperature => temperature_to_wire(generation, value),
        Role::Tenths => tenths_to_wire(value),
        Role::Power => watts_to_wire(value.round() as i64),
        _ => value.round() as i64,
    }
}

fn check_writable(spec: &ParamSpec, generation: Generation) -> Result<()> {
    if spec.new_only && !generation.is_new() {
        return Err(Error::Capability { feature: spec.name });
    }
    if !spec.writable {
        return Err(Error::validation(spec.name, "parameter is read-only"));
    }
    Ok(())
}

fn check_wire_range(spec: &ParamSpec, wire_type: WireType, raw: i64) -> Result<()> {
    match wire_type.range() {
        Some((lo, hi)) if raw < lo || raw > hi => Err(Error::validation(
            spec.name,
            format!("wire value {} does not fit {:?}", raw, wire_type),
        )),
        _ => Ok(()),
    }
}

/// Encode a numeric physical value for `param`, validating applicability and domain.
pub fn encode_number(param: Param, generation: Generation, value: f64) -> Result<WireParam> {
    let spec = param.spec();
    check_writable(spec, generation)?;
    if matches!(spec.role, Role::Flag | Role::Timestamp) {
        return Err(Error::validation(spec.name, "parameter is not numeric"));
    }
    if !value.is_finite() {
        return Err(Error::validation(spec.name, "value must be finite"));
    }
    if let Some((lo, hi)) = spec.bounds
        && (value < lo - BOUNDS_EPSILON || value > hi + BOUNDS_EPSILON)
    {
        return Err(Error::validation(
            spec.name,
            format!("{} is outside {}..={}", value, lo, hi),
        ));
    }
    let wire_type = spec.wire_type(generation);
    let raw = physical_to_wire(spec, generation, value);
    check_wire_range(spec, wire_type, raw)?;
    Ok(WireParam::new(spec.id, wire_type, raw.to_string()))
}

pub fn encode_flag(param: Param, generation: Generation, on: bool) -> Result<WireParam> {
    let spec = param.spec();
    check_writable(spec, generation)?;
    if spec.role != Role::Flag {
        return Err(Error::validation(spec.name, "parameter is not a flag"));
    }
    Ok(WireParam::new(spec.id, WireType::Bool, if on { "1" } else { "0" }))
}

pub fn encode_timestamp(param: Param, generation: Generation, value: NaiveDateTime) -> Result<WireParam> {
    let spec = param.spec();
    check_writable(spec, generation)?;
    if spec.role != Role::Timestamp {
        return Err(Error::validation(spec.name, "parameter is not a timestamp"));
    }
    let wire_type = spec.wire_type(generation);
    let raw = timestamp_to_wire(value);
    check_wire_range(spec, wire_type, raw)?;
    Ok(WireParam::new(spec.id, wire_type, raw.to_string()))
}

/// Raw integer of `param`, or `None` when absent, unparseable, outside its
/// wire type or not applicable.
pub fn decode_raw(param: Param, generation: Generation, table: &ParamTable) -> Option<i64> {
    let spec = param.spec();
    if spec.new_only && !generation.is_new() {
        return None;
    }
    let raw = table.get(param)?.as_int()?;
    match spec.wire_type(generation).range() {
        Some((lo, hi)) if raw < lo || raw > hi => None,
        _ => Some(raw),
    }
}

pub fn decode_number(param: Param, generation: Generation, table: &ParamTable) -> Option<f64> {
    decode_raw(param, generation, table).map(|raw| physical_from_wire(param.spec(), generation, raw))
}

pub fn decode_flag(param: Param, generation: Generation, table: &ParamTable) -> Option<bool> {
    if param.spec().new_only && !generation.is_new() {
        return None;
    }
    let entry = table.get(param)?;
    entry.as_flag().or_else(|| entry.as_int().map(|v| v != 0))
}

/// A zero timestamp means "not set".
pub fn decode_timestamp(param: Param, generation: Generation, table: &ParamTable) -> Option<NaiveDateTime> {
    match decode_raw(param, generation, table)? {
        0 => None,
        raw => timestamp_from_wire(raw),
    }
}
