//! Payloads for the portal's generic SubmitControlScreenChanges endpoint.
//!
//! One endpoint handles every control write; the `SystemSwitch` code
//! selects the target system and null fields are left untouched by the
//! device. This shape is a versioned external contract.

use chrono::{NaiveTime, Timelike};
use serde_json::{json, Value};

use crate::types::{FanMode, SystemSwitch};

/// Converts a hold duration into the portal's 15-minute period slot,
/// wrapping past midnight.
pub(crate) fn next_period_slot(hold_minutes: u32, now: NaiveTime) -> u32 {
    let current = now.hour() * 60 + now.minute();
    ((current + hold_minutes) % (24 * 60)) / 15
}

fn base_payload(device_id: u64) -> Value {
    json!({
        "CoolNextPeriod": null,
        "CoolSetpoint": null,
        "DeviceID": device_id,
        "FanMode": null,
        "HeatNextPeriod": null,
        "HeatSetpoint": null,
        "StatusCool": 0,
        "StatusHeat": 0,
        "SystemSwitch": null,
    })
}

pub(crate) fn heat_hold(device_id: u64, setpoint: f64, hold_minutes: u32, now: NaiveTime) -> Value {
    let mut payload = base_payload(device_id);
    merge(
        &mut payload,
        json!({
            "HeatSetpoint": setpoint.round() as i64,
            "StatusCool": 1,
            "StatusHeat": 1,
            "HeatNextPeriod": next_period_slot(hold_minutes, now),
            "SystemSwitch": SystemSwitch::Heat.as_code(),
        }),
    );
    payload
}

pub(crate) fn cool_hold(device_id: u64, setpoint: f64, hold_minutes: u32, now: NaiveTime) -> Value {
    let mut payload = base_payload(device_id);
    merge(
        &mut payload,
        json!({
            "CoolSetpoint": setpoint.round() as i64,
            "StatusCool": 1,
            "StatusHeat": 1,
            "CoolNextPeriod": next_period_slot(hold_minutes, now),
            "SystemSwitch": SystemSwitch::Cool.as_code(),
        }),
    );
    payload
}

pub(crate) fn cancel_hold(device_id: u64) -> Value {
    // StatusCool/StatusHeat at 0 releases the hold back to the schedule.
    base_payload(device_id)
}

pub(crate) fn fan(device_id: u64, mode: FanMode) -> Value {
    let mut payload = base_payload(device_id);
    merge(&mut payload, json!({ "FanMode": mode.as_code() }));
    payload
}

fn merge(target: &mut Value, updates: Value) {
    if let (Value::Object(target), Value::Object(updates)) = (target, updates) {
        for (key, value) in updates {
            target.insert(key, value);
        }
    }
}
