use chrono::{DateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Position of the thermostat's system switch, as numeric wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemSwitch {
    Off,
    Heat,
    Auto,
    Cool,
}

impl SystemSwitch {
    pub fn as_code(&self) -> i64 {
        match self {
            SystemSwitch::Off => 0,
            SystemSwitch::Heat => 1,
            SystemSwitch::Auto => 2,
            SystemSwitch::Cool => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanMode {
    Auto,
    On,
}

impl FanMode {
    pub fn as_code(&self) -> i64 {
        match self {
            FanMode::Auto => 0,
            FanMode::On => 1,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(FanMode::Auto),
            1 => Some(FanMode::On),
            _ => None,
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(FanMode::Auto),
            "on" => Some(FanMode::On),
            _ => None,
        }
    }
}

/// Which engine drives the setpoints: local hysteresis holds, or the
/// device's own schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlMode {
    #[default]
    Hysteresis,
    Schedule,
}

impl ControlMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlMode::Hysteresis => "hysteresis",
            ControlMode::Schedule => "schedule",
        }
    }
}

/// A single device write. Created by the policy engine or a manual
/// request, consumed exactly once by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetHeat { setpoint: f64, hold_minutes: u32 },
    SetCool { setpoint: f64, hold_minutes: u32 },
    SetFan { mode: FanMode },
    CancelHold,
}

impl Command {
    pub fn label(&self) -> &'static str {
        match self {
            Command::SetHeat { .. } => "heat",
            Command::SetCool { .. } => "cool",
            Command::SetFan { .. } => "fan",
            Command::CancelHold => "cancel",
        }
    }

    /// True for commands that establish a temporary hold worth re-asserting.
    pub fn is_hold(&self) -> bool {
        matches!(self, Command::SetHeat { .. } | Command::SetCool { .. })
    }
}

/// Snapshot of the device, parsed fresh from every CheckDataSession
/// response. Never mutated, only replaced.
#[derive(Debug, Clone)]
pub struct DeviceStatus {
    pub temperature: Option<f64>,
    pub humidity: Option<i64>,
    pub heat_setpoint: Option<f64>,
    pub cool_setpoint: Option<f64>,
    /// Hold expiry, normalized to an absolute timestamp at the parse
    /// boundary. The portal reports either a clock-time string or
    /// minutes-since-midnight depending on endpoint version.
    pub hold_until: Option<DateTime<Utc>>,
    pub status_heat: Option<i64>,
    pub status_cool: Option<i64>,
    pub fan_mode: Option<FanMode>,
    pub raw: Value,
}

impl DeviceStatus {
    pub fn from_check_data_session(data: &Value) -> Self {
        Self::from_check_data_session_at(data, chrono::Local::now().time(), Utc::now())
    }

    pub(crate) fn from_check_data_session_at(
        data: &Value,
        local_now: NaiveTime,
        utc_now: DateTime<Utc>,
    ) -> Self {
        let ui = data.pointer("/latestData/uiData").unwrap_or(&Value::Null);
        let fan = data.pointer("/latestData/fanData").unwrap_or(&Value::Null);
        Self {
            temperature: ui.get("DispTemperature").and_then(Value::as_f64),
            humidity: ui.get("IndoorHumidity").and_then(Value::as_i64),
            heat_setpoint: ui.get("HeatSetpoint").and_then(Value::as_f64),
            cool_setpoint: ui.get("CoolSetpoint").and_then(Value::as_f64),
            hold_until: ui
                .get("TemporaryHoldUntilTime")
                .and_then(|v| hold_until_from_value(v, local_now, utc_now)),
            status_heat: ui.get("StatusHeat").and_then(Value::as_i64),
            status_cool: ui.get("StatusCool").and_then(Value::as_i64),
            fan_mode: fan
                .get("fanMode")
                .and_then(Value::as_i64)
                .and_then(FanMode::from_code),
            raw: data.clone(),
        }
    }

    /// A temporary hold is in effect when the device reports an expiry
    /// time or either status flag is non-zero.
    pub fn has_active_hold(&self) -> bool {
        self.hold_until.is_some()
            || self.status_heat.is_some_and(|s| s != 0)
            || self.status_cool.is_some_and(|s| s != 0)
    }
}

/// Converts the portal's hold-until value to the next occurrence of that
/// wall-clock time as an absolute timestamp.
pub(crate) fn hold_until_from_value(
    value: &Value,
    local_now: NaiveTime,
    utc_now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let target_minutes = match value {
        Value::Number(_) => {
            let minutes = value.as_i64()?;
            if !(0..24 * 60).contains(&minutes) {
                return None;
            }
            minutes as u32
        }
        Value::String(s) => {
            let parsed = NaiveTime::parse_from_str(s.trim(), "%I:%M %p")
                .or_else(|_| NaiveTime::parse_from_str(s.trim(), "%H:%M"))
                .ok()?;
            parsed.hour() * 60 + parsed.minute()
        }
        _ => return None,
    };
    let current_minutes = local_now.hour() * 60 + local_now.minute();
    let delta = (target_minutes + 24 * 60 - current_minutes) % (24 * 60);
    Some(utc_now + chrono::Duration::minutes(i64::from(delta)))
}
