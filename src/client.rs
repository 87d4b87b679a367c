//! Device client: the one object a host integration holds per thermostat.
//!
//! - All network calls go through one [`Transport`] behind a mutex, so an
//!   update cycle never interleaves with a setter.
//! - State is an immutable [`DeviceState`] behind an `Arc`, replaced only
//!   after a complete read cycle or a confirmed write.
//! - Setters validate and encode before touching the network.

use chrono::{NaiveDateTime, Utc};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use crate::codec;
use crate::error::{Error, Result};
use crate::models::device::{ControlType, DeviceIdentity, Generation, Mode, OperationMode, SensorType};
use crate::models::params::{Param, ParamTable, WireParam};
use crate::models::state::DeviceState;
use crate::models::status::StatusReport;
use crate::protocol;
use crate::transport::{Endpoint, Transport};

pub struct TerneoClient {
    identity: DeviceIdentity,
    session: Mutex<Transport>,
    state: RwLock<Arc<DeviceState>>,
    available: Arc<AtomicBool>,
}

impl TerneoClient {
    /// Connect over HTTP. A failed liveness probe is logged, not returned:
    /// the client starts out unavailable and recovers on the next good response.
    pub fn connect(identity: DeviceIdentity, timeout: Duration) -> Self {
        let transport = Transport::http(&identity.host, timeout);
        Self::with_transport(identity, transport)
    }

    pub fn with_transport(identity: DeviceIdentity, mut transport: Transport) -> Self {
        match transport.probe() {
            Ok(()) => info!("Client: thermostat {} reachable at {}", identity.serial, identity.host),
            Err(e) => warn!(
                "Client: liveness probe for thermostat {} at {} failed: {}",
                identity.serial, identity.host, e
            ),
        }
        Self::assemble(identity, transport)
    }

    /// Takes over a transport that has already talked to the device, keeping its pacing state.
    fn assemble(identity: DeviceIdentity, transport: Transport) -> Self {
        let available = transport.availability();
        TerneoClient {
            state: RwLock::new(Arc::new(DeviceState::empty(identity.generation))),
            session: Mutex::new(transport),
            available,
            identity,
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn serial(&self) -> &str {
        &self.identity.serial
    }

    pub fn generation(&self) -> Generation {
        self.identity.generation
    }

    /// Outcome of the most recent request, independent of the cached state.
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Current snapshot. Cheap; holds no lock after returning.
    pub fn state(&self) -> Arc<DeviceState> {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn session(&self) -> MutexGuard<'_, Transport> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, next: DeviceState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
    }

    // =====================
    // Reads
    // =====================

    fn fetch_params(&self, session: &mut Transport) -> Result<Vec<WireParam>> {
        let body = protocol::read_params_request(self.serial())?;
        protocol::decode_params(session.post(Endpoint::Api, &body)?, self.serial())
    }

    fn fetch_status(&self, session: &mut Transport) -> Result<StatusReport> {
        let body = protocol::read_status_request(self.serial())?;
        protocol::decode_status(&session.post(Endpoint::Api, &body)?)
    }

    /// Full update cycle: read parameters, then status.
    ///
    /// The snapshot is replaced only when both reads succeed.
    pub fn update(&self) -> Result<()> {
        let mut session = self.session();
        let cycle = self
            .fetch_params(&mut session)
            .and_then(|params| Ok((params, self.fetch_status(&mut session)?)));
        let (params, status) = match cycle {
            Ok(v) => v,
            Err(e) => {
                warn!("Client: update of thermostat {} failed: {}", self.serial(), e);
                return Err(e);
            }
        };

        let table = ParamTable::from_list(params);
        debug!(
            "Client: thermostat {} returned {} parameter(s), status {:?}",
            self.serial(),
            table.len(),
            status
        );
        self.publish(DeviceState::from_cycle(self.generation(), table, &status, Utc::now()));
        Ok(())
    }

    // =====================
    // Writes
    // =====================

    fn rejected(&self, e: Error) -> Error {
        match &e {
            Error::Capability { feature } => warn!(
                "Client: {} requested on {} generation thermostat {}",
                feature,
                self.generation(),
                self.serial()
            ),
            other => debug!("Client: rejected change for {}: {}", self.serial(), other),
        }
        e
    }

    fn number(&self, param: Param, value: f64) -> Result<WireParam> {
        codec::encode_number(param, self.generation(), value).map_err(|e| self.rejected(e))
    }

    fn flag(&self, param: Param, on: bool) -> Result<WireParam> {
        codec::encode_flag(param, self.generation(), on).map_err(|e| self.rejected(e))
    }

    fn timestamp(&self, param: Param, value: NaiveDateTime) -> Result<WireParam> {
        codec::encode_timestamp(param, self.generation(), value).map_err(|e| self.rejected(e))
    }

    /// Write `params` in one request and, once acknowledged, publish a
    /// snapshot with them applied plus whatever `adjust` derives.
    fn commit(&self, what: &str, params: Vec<WireParam>, adjust: impl FnOnce(&mut DeviceState)) -> Result<()> {
        let mut session = self.session();
        self.commit_locked(&mut session, what, params, adjust)
    }

    fn commit_locked(
        &self,
        session: &mut Transport,
        what: &str,
        params: Vec<WireParam>,
        adjust: impl FnOnce(&mut DeviceState),
    ) -> Result<()> {
        let body = protocol::write_params_request(self.serial(), &params)?;
        let acked = session
            .post(Endpoint::Api, &body)
            .and_then(|ack| protocol::check_write_ack(&ack));
        if let Err(e) = acked {
            warn!("Client: writing {} to thermostat {} failed: {}", what, self.serial(), e);
            return Err(e);
        }

        let mut next = (*self.state()).clone();
        next.record_write(&params);
        adjust(&mut next);
        self.publish(next);
        info!("Client: {} written to thermostat {}", what, self.serial());
        Ok(())
    }

    /// Raw write of pre-encoded triples. No validation beyond the device's own.
    pub fn write_parameters(&self, params: Vec<WireParam>) -> Result<()> {
        self.commit("raw parameters", params, |_| {})
    }

    /// Set the target temperature. Also powers the unit on and forces manual mode.
    pub fn set_setpoint(&self, celsius: f64) -> Result<()> {
        // Limits must not change between validation and the write.
        let mut session = self.session();
        let state = self.state();
        let use_air =
            self.generation().is_new() && state.control_type().is_some_and(ControlType::uses_air_sensor);
        let (param, limits) = if use_air {
            (
                Param::ManualAir,
                state.lower_air_limit_celsius().zip(state.upper_air_limit_celsius()),
            )
        } else {
            (
                Param::ManualFloor,
                state.lower_limit_celsius().zip(state.upper_limit_celsius()),
            )
        };
        if let Some((lo, hi)) = limits
            && (celsius < f64::from(lo) || celsius > f64::from(hi))
        {
            return Err(self.rejected(Error::validation(
                "setpoint",
                format!("{} is outside the configured {}..={} limits", celsius, lo, hi),
            )));
        }

        let target = self.number(param, celsius)?;
        let written = target
            .as_int()
            .map(|raw| codec::temperature_from_wire(self.generation(), raw));
        let params = vec![
            self.flag(Param::PowerOff, false)?,
            self.number(Param::Mode, Mode::Manual.wire_value().into())?,
            target,
        ];
        self.commit_locked(&mut session, "setpoint", params, |s| {
            s.setpoint = written;
            s.mode = Some(OperationMode::Manual);
            s.power_on = Some(true);
        })
    }

    /// Switch between schedule and manual mode. Also powers the unit on.
    pub fn set_mode(&self, mode: Mode) -> Result<()> {
        let params = vec![
            self.flag(Param::PowerOff, false)?,
            self.number(Param::Mode, mode.wire_value().into())?,
        ];
        self.commit("mode", params, |s| {
            s.mode = Some(mode.into());
            s.power_on = Some(true);
        })
    }

    pub fn turn_on(&self) -> Result<()> {
        let params = vec![self.flag(Param::PowerOff, false)?];
        self.commit("power on", params, |s| {
            s.power_on = Some(true);
            // The real mode is unknown until the next status read.
            if s.mode == Some(OperationMode::Off) {
                s.mode = None;
            }
        })
    }

    pub fn turn_off(&self) -> Result<()> {
        let params = vec![self.flag(Param::PowerOff, true)?];
        self.commit("power off", params, |s| {
            s.power_on = Some(false);
            s.mode = Some(OperationMode::Off);
        })
    }

    /// Air-based control types need a new generation unit.
    pub fn set_control_type(&self, control_type: ControlType) -> Result<()> {
        if control_type.uses_air_sensor() && !self.generation().is_new() {
            return Err(self.rejected(Error::Capability {
                feature: "air sensor control",
            }));
        }
        let params = vec![self.number(Param::ControlType, control_type.wire_value().into())?];
        self.commit("control type", params, |_| {})
    }

    pub fn set_sensor_type(&self, sensor_type: SensorType) -> Result<()> {
        let params = vec![self.number(Param::SensorType, sensor_type.wire_value().into())?];
        self.commit("sensor type", params, |_| {})
    }

    /// Hysteresis in °C, 0.5..=10.0.
    pub fn set_hysteresis(&self, celsius: f64) -> Result<()> {
        let params = vec![self.number(Param::Hysteresis, celsius)?];
        self.commit("hysteresis", params, |_| {})
    }

    /// Display brightness, 0..=9.
    pub fn set_brightness(&self, level: u8) -> Result<()> {
        let params = vec![self.number(Param::Brightness, level.into())?];
        self.commit("brightness", params, |_| {})
    }

    /// Minutes of load per 30 minute cycle, 0..=30.
    pub fn set_prop_koef(&self, minutes: u8) -> Result<()> {
        let params = vec![self.number(Param::PropKoef, minutes.into())?];
        self.commit("proportional coefficient", params, |_| {})
    }

    /// Connected load in watts, 0..=7500. Stored in 10 W steps up to 1500 W, 20 W above.
    pub fn set_power_watts(&self, watts: u32) -> Result<()> {
        let params = vec![self.number(Param::Power, watts.into())?];
        self.commit("connected power", params, |_| {})
    }

    fn set_range(&self, what: &'static str, low: Param, high: Param, lower: i32, upper: i32) -> Result<()> {
        let params = vec![self.number(low, lower.into())?, self.number(high, upper.into())?];
        if lower >= upper {
            return Err(self.rejected(Error::validation(
                what,
                format!("lower {} must be below upper {}", lower, upper),
            )));
        }
        self.commit(what, params, |_| {})
    }

    /// Floor setpoint limits in whole °C (lower 5..=40, upper 10..=45).
    pub fn set_floor_limits(&self, lower: i32, upper: i32) -> Result<()> {
        self.set_range("floor limits", Param::LowerLimit, Param::UpperLimit, lower, upper)
    }

    /// Air setpoint limits in whole °C (lower 5..=30, upper 10..=35). New units only.
    pub fn set_air_limits(&self, lower: i32, upper: i32) -> Result<()> {
        self.set_range("air limits", Param::LowerAirLimit, Param::UpperAirLimit, lower, upper)
    }

    /// Floor limits enforced while regulating on air. New units only.
    pub fn set_advanced_floor_limits(&self, min: i32, max: i32) -> Result<()> {
        self.set_range(
            "advanced floor limits",
            Param::MinTempAdvanced,
            Param::MaxTempAdvanced,
            min,
            max,
        )
    }

    /// Alarm thresholds in whole °C. New units only.
    pub fn set_warning_temps(&self, lower: i32, upper: i32) -> Result<()> {
        self.set_range(
            "warning temperatures",
            Param::LowerWarningTemp,
            Param::UpperWarningTemp,
            lower,
            upper,
        )
    }

    /// Floor sensor correction in °C, -12.7..=12.7.
    pub fn set_floor_correction(&self, celsius: f64) -> Result<()> {
        let params = vec![self.number(Param::FloorCorrection, celsius)?];
        self.commit("floor correction", params, |_| {})
    }

    pub fn set_air_correction(&self, celsius: f64) -> Result<()> {
        let params = vec![self.number(Param::AirCorrection, celsius)?];
        self.commit("air correction", params, |_| {})
    }

    /// Wireless air sensor poll interval, 1..=60 minutes. New units only.
    pub fn set_ble_sensor_interval(&self, minutes: u8) -> Result<()> {
        let params = vec![self.number(Param::BleSensorInterval, minutes.into())?];
        self.commit("wireless sensor interval", params, |_| {})
    }

    /// Night brightness window in minutes after midnight. The window may wrap midnight.
    pub fn set_night_brightness_time(&self, start_minutes: u16, end_minutes: u16) -> Result<()> {
        let params = vec![
            self.number(Param::NightBrightStart, start_minutes.into())?,
            self.number(Param::NightBrightEnd, end_minutes.into())?,
        ];
        self.commit("night brightness window", params, |_| {})
    }

    /// Touch button sensitivity corrections, each -30..=30.
    pub fn set_button_corrections(&self, minus: i8, menu: i8, plus: i8) -> Result<()> {
        let params = vec![
            self.number(Param::ButtonMinusCor, minus.into())?,
            self.number(Param::ButtonMenuCor, menu.into())?,
            self.number(Param::ButtonPlusCor, plus.into())?,
        ];
        self.commit("button corrections", params, |_| {})
    }

    /// Away setpoints. An air setpoint needs a new generation unit.
    pub fn set_away_temperature(&self, floor: f64, air: Option<f64>) -> Result<()> {
        let mut params = vec![self.number(Param::AwayFloor, floor)?];
        if let Some(air) = air {
            params.push(self.number(Param::AwayAir, air)?);
        }
        self.commit("away temperature", params, |_| {})
    }

    /// Away window in device-local time.
    pub fn set_away_window(&self, start: NaiveDateTime, end: NaiveDateTime) -> Result<()> {
        let params = vec![
            self.timestamp(Param::StartAwayTime, start)?,
            self.timestamp(Param::EndAwayTime, end)?,
        ];
        if end <= start {
            return Err(self.rejected(Error::validation("away window", "end must be after start")));
        }
        self.commit("away window", params, |_| {})
    }

    fn set_flag(&self, what: &'static str, param: Param, on: bool) -> Result<()> {
        let params = vec![self.flag(param, on)?];
        self.commit(what, params, |_| {})
    }

    pub fn set_children_lock(&self, on: bool) -> Result<()> {
        self.set_flag("children lock", Param::ChildrenLock, on)
    }

    /// `true` for cooling, `false` for heating.
    pub fn set_cooling_mode(&self, on: bool) -> Result<()> {
        self.set_flag("cooling mode", Param::CoolingControlWay, on)
    }

    pub fn set_pre_control(&self, on: bool) -> Result<()> {
        self.set_flag("pre-heating", Param::PreControl, on)
    }

    pub fn set_window_open_control(&self, on: bool) -> Result<()> {
        self.set_flag("window open control", Param::WindowOpenControl, on)
    }

    pub fn set_use_night_brightness(&self, on: bool) -> Result<()> {
        self.set_flag("night brightness", Param::UseNightBright, on)
    }

    pub fn set_nc_contact_control(&self, on: bool) -> Result<()> {
        self.set_flag("NC contact control", Param::NcContactControl, on)
    }

    pub fn set_lan_block(&self, on: bool) -> Result<()> {
        self.set_flag("LAN block", Param::LanBlock, on)
    }

    pub fn set_cloud_block(&self, on: bool) -> Result<()> {
        self.set_flag("cloud block", Param::CloudBlock, on)
    }

    /// Reboot the unit via `/test.cgi`.
    pub fn restart(&self) -> Result<()> {
        let mut session = self.session();
        let body = protocol::restart_request()?;
        match session
            .post(Endpoint::Test, &body)
            .and_then(|ack| protocol::check_restart_ack(&ack))
        {
            Ok(()) => {
                info!("Client: restart command accepted by thermostat {}", self.serial());
                Ok(())
            }
            Err(e) => {
                warn!("Client: restart of thermostat {} failed: {}", self.serial(), e);
                Err(e)
            }
        }
    }
}

/// Probe a device, verify its serial, detect its generation and return a
/// client that keeps using the same connection.
pub fn pair(host: &str, serial: &str, timeout: Duration) -> Result<TerneoClient> {
    pair_with(host, serial, Transport::http(host, timeout))
}

pub fn pair_with(host: &str, serial: &str, mut transport: Transport) -> Result<TerneoClient> {
    transport.probe()?;
    let body = protocol::read_params_request(serial)?;
    let resp = transport.post(Endpoint::Api, &body)?;
    if resp.get("sn").is_none() {
        return Err(Error::Protocol(
            "device response has no serial number; check the configured serial".to_string(),
        ));
    }
    let params = protocol::decode_params(resp, serial)?;
    let generation = protocol::detect_generation(&params);
    info!(
        "Pairing: thermostat {} is a {} generation unit ({} parameter(s))",
        serial,
        generation,
        params.len()
    );
    Ok(TerneoClient::assemble(
        DeviceIdentity::new(serial, host, generation),
        transport,
    ))
}
