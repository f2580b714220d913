//! Hysteresis decision engine. Pure functions over a status snapshot and
//! the current config; all device IO stays in the control loop.

use serde::Serialize;

use crate::config::AppConfig;
use crate::types::{Command, ControlMode, DeviceStatus};

/// Which side the controller last armed a hold for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArmedMode {
    Heat,
    Cool,
}

/// Controller bookkeeping carried between ticks. Owned by the control
/// loop; updated only through [`apply`] and [`ControllerState::note_control_mode`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ControllerState {
    pub mode: Option<ArmedMode>,
    pub last_action: Option<&'static str>,
    #[serde(skip)]
    last_control_mode: Option<ControlMode>,
}

impl ControllerState {
    /// Records the control mode this tick ran under, so the next tick can
    /// detect a hysteresis-to-schedule transition.
    pub fn note_control_mode(&mut self, mode: ControlMode) {
        self.last_control_mode = Some(mode);
    }
}

/// Decides the next device write, if any.
///
/// In schedule mode the device's own scheduler is authoritative: exactly
/// one `CancelHold` is emitted on entry (including the first tick, so a
/// stale hold from a previous run is released), then nothing.
///
/// In hysteresis mode, crossing an on-threshold arms a hold at the
/// matching off-threshold. Between thresholds nothing is emitted; the
/// device itself stops calling for heat/cool once the held setpoint is
/// satisfied. Heat is evaluated before cool as a defensive default in
/// case misconfigured bands overlap.
pub fn decide(
    status: &DeviceStatus,
    config: &AppConfig,
    state: &ControllerState,
) -> Option<Command> {
    match config.control_mode {
        ControlMode::Schedule => {
            if state.last_control_mode != Some(ControlMode::Schedule) {
                return Some(Command::CancelHold);
            }
            None
        }
        ControlMode::Hysteresis => {
            let temperature = status.temperature?;

            if config.enable_heat
                && temperature <= config.heat_on_below
                && !setpoint_at(status.heat_setpoint, config.heat_off_at)
            {
                return Some(Command::SetHeat {
                    setpoint: config.heat_off_at,
                    hold_minutes: config.hold_minutes,
                });
            }

            if config.enable_cool
                && temperature >= config.cool_on_above
                && !setpoint_at(status.cool_setpoint, config.cool_off_at)
            {
                return Some(Command::SetCool {
                    setpoint: config.cool_off_at,
                    hold_minutes: config.hold_minutes,
                });
            }

            // release a hold whose side has since been disabled
            match state.mode {
                Some(ArmedMode::Heat) if !config.enable_heat => Some(Command::CancelHold),
                Some(ArmedMode::Cool) if !config.enable_cool => Some(Command::CancelHold),
                _ => None,
            }
        }
    }
}

/// Command that re-issues an armed hold at its configured target.
///
/// Used when an active hold is close to expiring. When no side is armed
/// (a hold set up before a restart), the held side is inferred from
/// which reported setpoint sits at its off-threshold.
pub fn reassert_hold(
    status: &DeviceStatus,
    config: &AppConfig,
    state: &ControllerState,
) -> Option<Command> {
    let side = state.mode.or_else(|| held_side(status, config))?;
    match side {
        ArmedMode::Heat if config.enable_heat => Some(Command::SetHeat {
            setpoint: config.heat_off_at,
            hold_minutes: config.hold_minutes,
        }),
        ArmedMode::Cool if config.enable_cool => Some(Command::SetCool {
            setpoint: config.cool_off_at,
            hold_minutes: config.hold_minutes,
        }),
        _ => None,
    }
}

fn held_side(status: &DeviceStatus, config: &AppConfig) -> Option<ArmedMode> {
    if setpoint_at(status.heat_setpoint, config.heat_off_at) {
        Some(ArmedMode::Heat)
    } else if setpoint_at(status.cool_setpoint, config.cool_off_at) {
        Some(ArmedMode::Cool)
    } else {
        None
    }
}

/// Updates controller bookkeeping after a command was submitted.
pub fn apply(state: &mut ControllerState, command: &Command) {
    match command {
        Command::SetHeat { .. } => state.mode = Some(ArmedMode::Heat),
        Command::SetCool { .. } => state.mode = Some(ArmedMode::Cool),
        Command::CancelHold => state.mode = None,
        Command::SetFan { .. } => {}
    }
    state.last_action = Some(command.label());
}

fn setpoint_at(setpoint: Option<f64>, target: f64) -> bool {
    // setpoints come back as whole device units; tolerate float noise
    setpoint.is_some_and(|s| (s - target).abs() < 0.01)
}
