use std::fmt::Display;

use crate::codec::minutes_to_time;

/// Render an optional reading for log lines, `-` when unknown.
pub fn display_opt<T: Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

/// Render an optional temperature with one decimal and a unit.
pub fn display_celsius(value: Option<f64>) -> String {
    value.map(|v| format!("{:.1}°C", v)).unwrap_or_else(|| "-".to_string())
}

/// Minutes after midnight as `HH:MM`.
pub fn display_time_of_day(minutes: Option<u16>) -> String {
    minutes
        .and_then(minutes_to_time)
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}
