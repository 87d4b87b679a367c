use log::{info, warn};
use std::thread;
use std::time::{Duration, Instant};

use crate::client::TerneoClient;
use crate::models::state::DeviceState;
use crate::utils::{display_celsius, display_opt, display_time_of_day};

/// One update cycle. Failures are already logged by the client.
pub fn poll_once(client: &TerneoClient) -> bool {
    let was_available = client.is_available();
    let ok = client.update().is_ok();
    match (was_available, client.is_available()) {
        (false, true) => info!("Poll: thermostat {} is reachable again", client.serial()),
        (true, false) => warn!("Poll: thermostat {} became unreachable", client.serial()),
        _ => {}
    }
    if ok {
        info!("Poll: {}", summary(&client.state()));
    }
    ok
}

/// Single-line digest of a snapshot for logs and the `status` command.
pub fn summary(state: &DeviceState) -> String {
    format!(
        "mode={} power={} relay={} floor={} air={} setpoint={} limits={}..{} sensor={} night={}-{}",
        display_opt(state.mode()),
        display_opt(state.power_on().map(|on| if on { "on" } else { "off" })),
        display_opt(state.relay_on().map(|on| if on { "on" } else { "off" })),
        display_celsius(state.floor_temperature()),
        display_celsius(state.air_temperature()),
        display_celsius(state.setpoint()),
        display_opt(state.lower_limit_celsius()),
        display_opt(state.upper_limit_celsius()),
        display_opt(state.sensor_type().map(|s| s.label())),
        display_time_of_day(state.night_bright_start_minutes()),
        display_time_of_day(state.night_bright_end_minutes()),
    )
}

/// Poll forever at a steady cadence. Individual failures never stop the loop.
pub fn run_loop(client: &TerneoClient, interval: Duration) -> ! {
    loop {
        let tick_start = Instant::now();
        poll_once(client);

        // Maintain steady cadence
        let elapsed = tick_start.elapsed();
        if elapsed < interval {
            thread::sleep(interval - elapsed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::device::{DeviceIdentity, Generation};
    use crate::transport::testing::scripted_transport;
    use serde_json::json;

    #[test]
    fn poll_reports_recovery_and_failure() {
        let (transport, backend, _) = scripted_transport("10.0.0.7");
        backend.push_error("no route to host");
        let client = TerneoClient::with_transport(DeviceIdentity::new("S1", "10.0.0.7", Generation::New), transport);

        backend.push_json(json!({"sn": "S1", "par": [[26, 2, "35"], [27, 2, "5"], [52, 4, "1380"]]}));
        backend.push_json(json!({"t.1": "384", "t.5": "320", "m.1": "3", "f.0": "1", "f.16": "0"}));
        assert!(poll_once(&client));
        assert!(client.is_available());

        assert!(!poll_once(&client));
        assert!(!client.is_available());
        assert_eq!(client.state().floor_temperature(), Some(24.0));
    }

    #[test]
    fn summary_lists_known_and_unknown_fields() {
        let (transport, backend, _) = scripted_transport("10.0.0.7");
        backend.push_raw(200, "");
        let client = TerneoClient::with_transport(DeviceIdentity::new("S1", "10.0.0.7", Generation::New), transport);
        backend.push_json(json!({"sn": "S1", "par": [[18, 2, "2"], [26, 2, "35"], [27, 2, "5"], [52, 4, "1380"]]}));
        backend.push_json(json!({"t.1": "384", "t.5": "320", "m.1": "3", "f.0": "1", "f.16": "0"}));
        client.update().unwrap();

        let line = summary(&client.state());
        assert!(line.contains("mode=manual"), "{}", line);
        assert!(line.contains("floor=24.0°C"), "{}", line);
        assert!(line.contains("air=-"), "{}", line);
        assert!(line.contains("limits=5..35"), "{}", line);
        assert!(line.contains("sensor=10k"), "{}", line);
        assert!(line.contains("night=23:00--"), "{}", line);
    }
}
