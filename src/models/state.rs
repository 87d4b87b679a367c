//! Immutable snapshot of everything the client knows about the device.
//!
//! A snapshot is built from one complete read cycle and never edited in
//! place once published; the client swaps in a new one instead.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::codec;
use crate::models::device::{ControlType, Generation, OperationMode, SensorType};
use crate::models::params::{Param, ParamTable, WireParam};
use crate::models::status::StatusReport;

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    pub(crate) generation: Generation,
    pub(crate) params: ParamTable,
    pub(crate) floor_temperature: Option<f64>,
    pub(crate) air_temperature: Option<f64>,
    pub(crate) setpoint: Option<f64>,
    pub(crate) relay_on: Option<bool>,
    pub(crate) mode: Option<OperationMode>,
    pub(crate) power_on: Option<bool>,
    pub(crate) updated_at: Option<DateTime<Utc>>,
}

impl DeviceState {
    /// State before the first successful update cycle.
    pub fn empty(generation: Generation) -> Self {
        DeviceState {
            generation,
            params: ParamTable::default(),
            floor_temperature: None,
            air_temperature: None,
            setpoint: None,
            relay_on: None,
            mode: None,
            power_on: None,
            updated_at: None,
        }
    }

    /// Combine a parameter read and a status read into one snapshot.
    ///
    /// The power-off source is the `f.16` status key when present, otherwise
    /// parameter 125 from the same cycle.
    pub fn from_cycle(generation: Generation, params: ParamTable, status: &StatusReport, at: DateTime<Utc>) -> Self {
        let power_off = status
            .power_off
            .or_else(|| codec::decode_flag(Param::PowerOff, generation, &params));
        let mode = status.mode.map(|m| {
            if power_off == Some(true) {
                OperationMode::Off
            } else {
                OperationMode::from_status(m)
            }
        });

        DeviceState {
            generation,
            floor_temperature: status.floor_temperature,
            air_temperature: if generation.is_new() { status.air_temperature } else { None },
            setpoint: status.setpoint,
            relay_on: status.relay_on,
            mode,
            power_on: power_off.map(|off| !off),
            updated_at: Some(at),
            params,
        }
    }

    pub(crate) fn record_write(&mut self, written: &[WireParam]) {
        self.params.apply(written.iter().cloned());
    }

    fn number(&self, param: Param) -> Option<f64> {
        codec::decode_number(param, self.generation, &self.params)
    }

    fn int<T: TryFrom<i64>>(&self, param: Param) -> Option<T> {
        codec::decode_raw(param, self.generation, &self.params).and_then(|v| T::try_from(v).ok())
    }

    fn flag(&self, param: Param) -> Option<bool> {
        codec::decode_flag(param, self.generation, &self.params)
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn params(&self) -> &ParamTable {
        &self.params
    }

    /// When the last successful update cycle completed.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    // Live readings

    pub fn floor_temperature(&self) -> Option<f64> {
        self.floor_temperature
    }

    pub fn air_temperature(&self) -> Option<f64> {
        self.air_temperature
    }

    /// Temperature of the sensor that drives the relay.
    pub fn current_temperature(&self) -> Option<f64> {
        match self.control_type() {
            Some(ct) if ct.uses_air_sensor() && self.generation.is_new() => self.air_temperature,
            _ => self.floor_temperature,
        }
    }

    pub fn setpoint(&self) -> Option<f64> {
        self.setpoint
    }

    pub fn relay_on(&self) -> Option<bool> {
        self.relay_on
    }

    pub fn mode(&self) -> Option<OperationMode> {
        self.mode
    }

    pub fn power_on(&self) -> Option<bool> {
        self.power_on
    }

    // Configuration

    pub fn control_type(&self) -> Option<ControlType> {
        codec::decode_raw(Param::ControlType, self.generation, &self.params).and_then(ControlType::from_wire)
    }

    pub fn sensor_type(&self) -> Option<SensorType> {
        codec::decode_raw(Param::SensorType, self.generation, &self.params).and_then(SensorType::from_wire)
    }

    pub fn hysteresis(&self) -> Option<f64> {
        self.number(Param::Hysteresis)
    }

    pub fn brightness(&self) -> Option<u8> {
        self.int(Param::Brightness)
    }

    /// Minutes of load per 30 minute cycle in proportional mode.
    pub fn prop_koef(&self) -> Option<u8> {
        self.int(Param::PropKoef)
    }

    pub fn power_watts(&self) -> Option<u32> {
        self.number(Param::Power).and_then(|w| u32::try_from(w as i64).ok())
    }

    pub fn floor_correction(&self) -> Option<f64> {
        self.number(Param::FloorCorrection)
    }

    pub fn air_correction(&self) -> Option<f64> {
        self.number(Param::AirCorrection)
    }

    pub fn upper_limit_celsius(&self) -> Option<i32> {
        self.int(Param::UpperLimit)
    }

    pub fn lower_limit_celsius(&self) -> Option<i32> {
        self.int(Param::LowerLimit)
    }

    pub fn upper_air_limit_celsius(&self) -> Option<i32> {
        self.int(Param::UpperAirLimit)
    }

    pub fn lower_air_limit_celsius(&self) -> Option<i32> {
        self.int(Param::LowerAirLimit)
    }

    /// Floor limits applied while regulating on the air sensor.
    pub fn min_temp_advanced(&self) -> Option<i32> {
        self.int(Param::MinTempAdvanced)
    }

    pub fn max_temp_advanced(&self) -> Option<i32> {
        self.int(Param::MaxTempAdvanced)
    }

    pub fn upper_warning_temp(&self) -> Option<i32> {
        self.int(Param::UpperWarningTemp)
    }

    pub fn lower_warning_temp(&self) -> Option<i32> {
        self.int(Param::LowerWarningTemp)
    }

    pub fn manual_floor_temperature(&self) -> Option<f64> {
        self.number(Param::ManualFloor)
    }

    pub fn manual_air_temperature(&self) -> Option<f64> {
        self.number(Param::ManualAir)
    }

    pub fn away_floor_temperature(&self) -> Option<f64> {
        self.number(Param::AwayFloor)
    }

    pub fn away_air_temperature(&self) -> Option<f64> {
        self.number(Param::AwayAir)
    }

    pub fn temporary_temperature(&self) -> Option<f64> {
        self.number(Param::TempTemperature)
    }

    /// Setpoint currently programmed in the parameter table.
    pub fn target_temperature(&self) -> Option<f64> {
        self.number(Param::SetTemperature)
    }

    pub fn max_schedule_period(&self) -> Option<u8> {
        self.int(Param::MaxSchedulePeriod)
    }

    /// Continuous heating hours before the alarm fires.
    pub fn relay_on_time_limit_hours(&self) -> Option<u8> {
        self.int(Param::RelayOnTimeLimit)
    }

    pub fn night_bright_start_minutes(&self) -> Option<u16> {
        self.int(Param::NightBrightStart)
    }

    pub fn night_bright_end_minutes(&self) -> Option<u16> {
        self.int(Param::NightBrightEnd)
    }

    pub fn button_minus_correction(&self) -> Option<i8> {
        self.int(Param::ButtonMinusCor)
    }

    pub fn button_menu_correction(&self) -> Option<i8> {
        self.int(Param::ButtonMenuCor)
    }

    pub fn button_plus_correction(&self) -> Option<i8> {
        self.int(Param::ButtonPlusCor)
    }

    pub fn ble_sensor_interval_minutes(&self) -> Option<u8> {
        self.int(Param::BleSensorInterval)
    }

    pub fn ble_sensor_bound(&self) -> Option<bool> {
        self.flag(Param::BleSensorBind)
    }

    pub fn timer_period_minutes(&self) -> Option<u16> {
        self.int(Param::TimerPeriod)
    }

    pub fn timer_temperature(&self) -> Option<f64> {
        self.number(Param::TimerTemperature)
    }

    /// Away window in device-local time.
    pub fn away_start(&self) -> Option<NaiveDateTime> {
        codec::decode_timestamp(Param::StartAwayTime, self.generation, &self.params)
    }

    pub fn away_end(&self) -> Option<NaiveDateTime> {
        codec::decode_timestamp(Param::EndAwayTime, self.generation, &self.params)
    }

    pub fn away_start_utc(&self) -> Option<DateTime<Utc>> {
        codec::decode_timestamp(Param::StartAwayTimeUtc, self.generation, &self.params).map(|t| t.and_utc())
    }

    pub fn away_end_utc(&self) -> Option<DateTime<Utc>> {
        codec::decode_timestamp(Param::EndAwayTimeUtc, self.generation, &self.params).map(|t| t.and_utc())
    }

    // Flags

    pub fn children_lock(&self) -> Option<bool> {
        self.flag(Param::ChildrenLock)
    }

    /// Cooling instead of heating.
    pub fn cooling_mode(&self) -> Option<bool> {
        self.flag(Param::CoolingControlWay)
    }

    pub fn pre_control(&self) -> Option<bool> {
        self.flag(Param::PreControl)
    }

    pub fn window_open_control(&self) -> Option<bool> {
        self.flag(Param::WindowOpenControl)
    }

    pub fn use_night_brightness(&self) -> Option<bool> {
        self.flag(Param::UseNightBright)
    }

    /// Relay inverted (normally closed contact).
    pub fn nc_contact_control(&self) -> Option<bool> {
        self.flag(Param::NcContactControl)
    }

    pub fn lan_block(&self) -> Option<bool> {
        self.flag(Param::LanBlock)
    }

    pub fn cloud_block(&self) -> Option<bool> {
        self.flag(Param::CloudBlock)
    }

    pub fn off_button_lock(&self) -> Option<bool> {
        self.flag(Param::OffButtonLock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::params::WireType;

    fn new_gen_table() -> ParamTable {
        ParamTable::from_list([
            WireParam::new(3, WireType::UInt8, "1"),
            WireParam::new(4, WireType::Int16, "215"),
            WireParam::new(17, WireType::UInt16, "175"),
            WireParam::new(26, WireType::UInt8, "35"),
            WireParam::new(33, WireType::UInt8, "30"),
            WireParam::new(35, WireType::UInt8, "5"),
            WireParam::new(62, WireType::Int8, "40"),
            WireParam::new(80, WireType::Int8, "-4"),
            WireParam::new(125, WireType::Bool, "0"),
        ])
    }

    fn status(t1: f64, t2: f64, mode: i64, power_off: Option<bool>) -> StatusReport {
        StatusReport {
            floor_temperature: Some(t1),
            air_temperature: Some(t2),
            setpoint: Some(21.0),
            mode: Some(mode),
            relay_on: Some(false),
            power_off,
        }
    }

    #[test]
    fn derived_getters_on_new_device() {
        let state = DeviceState::from_cycle(Generation::New, new_gen_table(), &status(23.0, 21.5, 3, None), Utc::now());
        assert_eq!(state.upper_limit_celsius(), Some(35));
        assert_eq!(state.upper_air_limit_celsius(), Some(30));
        assert_eq!(state.manual_air_temperature(), Some(21.5));
        assert_eq!(state.power_watts(), Some(2000));
        assert_eq!(state.button_minus_correction(), Some(-4));
        assert_eq!(state.control_type(), Some(ControlType::Air));
        assert_eq!(state.current_temperature(), Some(21.5));
        assert_eq!(state.power_on(), Some(true));
        assert_eq!(state.mode(), Some(OperationMode::Manual));
    }

    #[test]
    fn new_only_getters_absent_on_old_device() {
        let state = DeviceState::from_cycle(Generation::Old, new_gen_table(), &status(23.0, 21.5, 0, None), Utc::now());
        assert_eq!(state.air_temperature(), None);
        assert_eq!(state.upper_air_limit_celsius(), None);
        assert_eq!(state.manual_air_temperature(), None);
        assert_eq!(state.ble_sensor_interval_minutes(), None);
        assert_eq!(state.upper_warning_temp(), None);
        assert_eq!(state.window_open_control(), None);
        assert_eq!(state.away_start_utc(), None);
        // Common parameters still decode.
        assert_eq!(state.upper_limit_celsius(), Some(35));
        assert_eq!(state.current_temperature(), Some(23.0));
    }

    #[test]
    fn status_power_flag_wins_over_parameter() {
        let mut table = new_gen_table();
        table.apply([WireParam::new(125, WireType::Bool, "1")]);

        let state = DeviceState::from_cycle(Generation::New, table.clone(), &status(20.0, 20.0, 3, Some(false)), Utc::now());
        assert_eq!(state.mode(), Some(OperationMode::Manual));
        assert_eq!(state.power_on(), Some(true));

        let state = DeviceState::from_cycle(Generation::New, table, &status(20.0, 20.0, 3, None), Utc::now());
        assert_eq!(state.mode(), Some(OperationMode::Off));
        assert_eq!(state.power_on(), Some(false));

        let state = DeviceState::from_cycle(Generation::New, new_gen_table(), &status(20.0, 20.0, 0, Some(true)), Utc::now());
        assert_eq!(state.mode(), Some(OperationMode::Off));
    }

    #[test]
    fn empty_state_has_nothing() {
        let state = DeviceState::empty(Generation::New);
        assert_eq!(state.floor_temperature(), None);
        assert_eq!(state.brightness(), None);
        assert_eq!(state.updated_at(), None);
    }
}
