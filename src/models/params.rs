//! Parameter registry: every parameter id the client understands, with its
//! wire type, semantic role, physical domain and generation applicability.
//!
//! Parameters travel as positional triples `[id, type, "value"]`. The
//! [`ParamTable`] holds the triples of the last read-parameters response.

use serde::de::{self, Deserializer, Unexpected};
use serde::ser::{SerializeTuple, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// =====================
// Wire types
// =====================

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum WireType {
    // 0=CSTRING, 1=INT8, 2=UINT8, 3=INT16, 4=UINT16, 5=INT32, 6=UINT32, 7=BOOL
    CString,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Bool,
}

impl WireType {
    pub fn code(self) -> u8 {
        match self {
            WireType::CString => 0,
            WireType::Int8 => 1,
            WireType::UInt8 => 2,
            WireType::Int16 => 3,
            WireType::UInt16 => 4,
            WireType::Int32 => 5,
            WireType::UInt32 => 6,
            WireType::Bool => 7,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(WireType::CString),
            1 => Some(WireType::Int8),
            2 => Some(WireType::UInt8),
            3 => Some(WireType::Int16),
            4 => Some(WireType::UInt16),
            5 => Some(WireType::Int32),
            6 => Some(WireType::UInt32),
            7 => Some(WireType::Bool),
            _ => None,
        }
    }

    /// Inclusive integer range the type can carry, `None` for strings.
    pub fn range(self) -> Option<(i64, i64)> {
        match self {
            WireType::CString => None,
            WireType::Int8 => Some((i8::MIN.into(), i8::MAX.into())),
            WireType::UInt8 => Some((0, u8::MAX.into())),
            WireType::Int16 => Some((i16::MIN.into(), i16::MAX.into())),
            WireType::UInt16 => Some((0, u16::MAX.into())),
            WireType::Int32 => Some((i32::MIN.into(), i32::MAX.into())),
            WireType::UInt32 => Some((0, u32::MAX.into())),
            WireType::Bool => Some((0, 1)),
        }
    }
}

impl Serialize for WireType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for WireType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct V;
        impl<'de> de::Visitor<'de> for V {
            type Value = WireType;

            fn expecting(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
                write!(f, "an integer 0..=7 for WireType")
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                WireType::from_code(value).ok_or_else(|| E::invalid_value(Unexpected::Unsigned(value), &self))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                u64::try_from(value)
                    .ok()
                    .and_then(WireType::from_code)
                    .ok_or_else(|| E::invalid_value(Unexpected::Signed(value), &self))
            }
        }

        deserializer.deserialize_any(V)
    }
}

// =====================
// Registry
// =====================

/// How a wire integer maps to a physical quantity.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Role {
    /// Setpoint temperature: whole °C on old units, °C×10 on new units.
    Temperature,
    /// Whole °C on both generations (limits, warning thresholds).
    WholeDegrees,
    /// Fixed tenths of a degree (hysteresis, sensor corrections).
    Tenths,
    /// Connected load, piecewise-linear in watts.
    Power,
    Flag,
    /// Minutes after midnight.
    TimeOfDay,
    /// A duration in minutes.
    Minutes,
    /// Seconds since 2000-01-01T00:00:00.
    Timestamp,
    Enumerated,
    Count,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ParamSpec {
    pub id: u8,
    pub name: &'static str,
    /// Wire type on new units. [`Role::Temperature`] parameters use int8 on old units.
    pub wire: WireType,
    pub role: Role,
    /// Inclusive physical domain accepted by setters.
    pub bounds: Option<(f64, f64)>,
    pub new_only: bool,
    pub writable: bool,
}

impl ParamSpec {
    pub fn wire_type(&self, generation: super::device::Generation) -> WireType {
        match self.role {
            Role::Temperature if !generation.is_new() => WireType::Int8,
            _ => self.wire,
        }
    }
}

macro_rules! registry {
    ($( $variant:ident = $id:literal, $name:literal, $wire:ident, $role:ident, $bounds:expr, $new_only:literal, $writable:literal; )*) => {
        /// Known parameter ids.
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum Param {
            $( $variant = $id, )*
        }

        impl Param {
            pub const ALL: &'static [Param] = &[ $( Param::$variant, )* ];

            pub fn from_id(id: u8) -> Option<Param> {
                match id {
                    $( $id => Some(Param::$variant), )*
                    _ => None,
                }
            }

            pub fn spec(self) -> &'static ParamSpec {
                match self {
                    $( Param::$variant => {
                        const SPEC: ParamSpec = ParamSpec {
                            id: $id,
                            name: $name,
                            wire: WireType::$wire,
                            role: Role::$role,
                            bounds: $bounds,
                            new_only: $new_only,
                            writable: $writable,
                        };
                        &SPEC
                    } )*
                }
            }
        }
    };
}

registry! {
    StartAwayTime = 0, "start_away_time", UInt32, Timestamp, None, false, true;
    EndAwayTime = 1, "end_away_time", UInt32, Timestamp, None, false, true;
    Mode = 2, "mode", UInt8, Enumerated, Some((0.0, 1.0)), false, true;
    ControlType = 3, "control_type", UInt8, Enumerated, Some((0.0, 2.0)), false, true;
    ManualAir = 4, "manual_air", Int16, Temperature, Some((5.0, 35.0)), true, true;
    ManualFloor = 5, "manual_floor", Int16, Temperature, Some((5.0, 45.0)), false, true;
    AwayAir = 6, "away_air", Int16, Temperature, Some((5.0, 35.0)), true, true;
    AwayFloor = 7, "away_floor", Int16, Temperature, Some((5.0, 45.0)), false, true;
    MinTempAdvanced = 14, "min_temp_advanced", Int8, WholeDegrees, Some((0.0, 40.0)), true, true;
    MaxTempAdvanced = 15, "max_temp_advanced", Int8, WholeDegrees, Some((5.0, 45.0)), true, true;
    Power = 17, "power", UInt16, Power, Some((0.0, 7500.0)), false, true;
    SensorType = 18, "sensor_type", UInt8, Enumerated, Some((0.0, 6.0)), false, true;
    Hysteresis = 19, "hysteresis", UInt8, Tenths, Some((0.5, 10.0)), false, true;
    AirCorrection = 20, "air_correction", Int8, Tenths, Some((-12.7, 12.7)), true, true;
    FloorCorrection = 21, "floor_correction", Int8, Tenths, Some((-12.7, 12.7)), false, true;
    Brightness = 23, "brightness", UInt8, Count, Some((0.0, 9.0)), false, true;
    PropKoef = 25, "prop_koef", UInt8, Minutes, Some((0.0, 30.0)), false, true;
    UpperLimit = 26, "upper_limit", UInt8, WholeDegrees, Some((10.0, 45.0)), false, true;
    LowerLimit = 27, "lower_limit", UInt8, WholeDegrees, Some((5.0, 40.0)), false, true;
    MaxSchedulePeriod = 28, "max_schedule_period", UInt8, Count, None, false, false;
    TempTemperature = 29, "temp_temperature", Int16, Temperature, None, false, false;
    SetTemperature = 31, "set_temperature", Int16, Temperature, None, false, false;
    UpperAirLimit = 33, "upper_air_limit", UInt8, WholeDegrees, Some((10.0, 35.0)), true, true;
    LowerAirLimit = 34, "lower_air_limit", UInt8, WholeDegrees, Some((5.0, 30.0)), true, true;
    BleSensorInterval = 35, "ble_sensor_interval", UInt8, Minutes, Some((1.0, 60.0)), true, true;
    BleSensorBind = 36, "ble_sensor_bind", Bool, Flag, None, true, false;
    NightBrightStart = 52, "night_bright_start", UInt16, TimeOfDay, Some((0.0, 1439.0)), false, true;
    NightBrightEnd = 53, "night_bright_end", UInt16, TimeOfDay, Some((0.0, 1439.0)), false, true;
    RelayOnTimeLimit = 55, "relay_on_time_limit", UInt8, Count, None, false, false;
    UpperWarningTemp = 62, "upper_warning_temp", Int8, WholeDegrees, Some((5.0, 45.0)), true, true;
    LowerWarningTemp = 63, "lower_warning_temp", Int8, WholeDegrees, Some((0.0, 40.0)), true, true;
    TimerPeriod = 64, "timer_period", UInt16, Minutes, None, true, false;
    TimerTemperature = 65, "timer_temperature", Int16, Temperature, None, true, false;
    StartAwayTimeUtc = 66, "start_away_time_utc", UInt32, Timestamp, None, true, false;
    EndAwayTimeUtc = 67, "end_away_time_utc", UInt32, Timestamp, None, true, false;
    ButtonMinusCor = 80, "button_minus_cor", Int8, Count, Some((-30.0, 30.0)), false, true;
    ButtonMenuCor = 81, "button_menu_cor", Int8, Count, Some((-30.0, 30.0)), false, true;
    ButtonPlusCor = 82, "button_plus_cor", Int8, Count, Some((-30.0, 30.0)), false, true;
    OffButtonLock = 109, "off_button_lock", Bool, Flag, None, false, false;
    LanBlock = 114, "lan_block", Bool, Flag, None, false, true;
    CloudBlock = 115, "cloud_block", Bool, Flag, None, false, true;
    NcContactControl = 117, "nc_contact_control", Bool, Flag, None, false, true;
    CoolingControlWay = 118, "cooling_control_way", Bool, Flag, None, false, true;
    UseNightBright = 120, "use_night_bright", Bool, Flag, None, false, true;
    PreControl = 121, "pre_control", Bool, Flag, None, false, true;
    WindowOpenControl = 122, "window_open_control", Bool, Flag, None, true, true;
    ChildrenLock = 124, "children_lock", Bool, Flag, None, false, true;
    PowerOff = 125, "power_off", Bool, Flag, None, false, true;
}

impl Param {
    pub fn id(self) -> u8 {
        self as u8
    }
}

// =====================
// Triples and the decoded table
// =====================

/// One `[id, type, "value"]` triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireParam {
    pub id: u8,
    pub wire_type: WireType,
    pub value: String,
}

impl WireParam {
    pub fn new(id: u8, wire_type: WireType, value: impl Into<String>) -> Self {
        WireParam {
            id,
            wire_type,
            value: value.into(),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        self.value.trim().parse::<i64>().ok()
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self.value.trim() {
            "1" => Some(true),
            "0" => Some(false),
            _ => None,
        }
    }
}

impl Serialize for WireParam {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut tup = serializer.serialize_tuple(3)?;
        tup.serialize_element(&self.id)?;
        tup.serialize_element(&self.wire_type)?;
        tup.serialize_element(&self.value)?;
        tup.end()
    }
}

impl<'de> Deserialize<'de> for WireParam {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (id, wire_type, raw): (u8, WireType, Value) = Deserialize::deserialize(deserializer)?;
        // Some firmware sends numbers instead of strings in the value slot.
        let value = match raw {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => String::from(if b { "1" } else { "0" }),
            Value::Null => return Err(de::Error::invalid_type(Unexpected::Unit, &"a parameter value")),
            Value::Array(_) => return Err(de::Error::invalid_type(Unexpected::Seq, &"a parameter value")),
            Value::Object(_) => return Err(de::Error::invalid_type(Unexpected::Map, &"a parameter value")),
        };
        Ok(WireParam { id, wire_type, value })
    }
}

/// Parameters as last fetched, keyed by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamTable {
    entries: BTreeMap<u8, WireParam>,
}

impl ParamTable {
    /// Later duplicates replace earlier ones.
    pub fn from_list(list: impl IntoIterator<Item = WireParam>) -> Self {
        let mut table = ParamTable::default();
        table.apply(list);
        table
    }

    pub fn apply(&mut self, list: impl IntoIterator<Item = WireParam>) {
        for p in list {
            self.entries.insert(p.id, p);
        }
    }

    pub fn get(&self, param: Param) -> Option<&WireParam> {
        self.entries.get(&param.id())
    }

    pub fn raw(&self, id: u8) -> Option<&WireParam> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WireParam> {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::device::Generation;

    #[test]
    fn registry_ids_round_trip() {
        for p in Param::ALL {
            assert_eq!(Param::from_id(p.id()), Some(*p));
            assert_eq!(p.spec().id, p.id());
        }
        assert_eq!(Param::from_id(8), None);
        assert_eq!(Param::ALL.len(), 48);
    }

    #[test]
    fn setpoint_wire_type_depends_on_generation() {
        let spec = Param::ManualFloor.spec();
        assert_eq!(spec.wire_type(Generation::Old), WireType::Int8);
        assert_eq!(spec.wire_type(Generation::New), WireType::Int16);
        assert_eq!(Param::UpperLimit.spec().wire_type(Generation::Old), WireType::UInt8);
    }

    #[test]
    fn triple_serializes_positionally() {
        let p = WireParam::new(125, WireType::Bool, "0");
        assert_eq!(serde_json::to_string(&p).unwrap(), r#"[125,7,"0"]"#);
    }

    #[test]
    fn triple_accepts_numeric_value() {
        let p: WireParam = serde_json::from_str("[26, 2, 35]").unwrap();
        assert_eq!(p, WireParam::new(26, WireType::UInt8, "35"));
        assert!(serde_json::from_str::<WireParam>("[26, 9, \"35\"]").is_err());
        assert!(serde_json::from_str::<WireParam>("[26, 2, null]").is_err());
    }

    #[test]
    fn duplicate_ids_keep_last() {
        let table = ParamTable::from_list([
            WireParam::new(23, WireType::UInt8, "3"),
            WireParam::new(23, WireType::UInt8, "7"),
        ]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(Param::Brightness).and_then(WireParam::as_int), Some(7));
    }
}
