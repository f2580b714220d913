use redlink_control::policy::{self, ArmedMode, ControllerState};
use redlink_control::{AppConfig, Command, ControlMode, DeviceStatus, FanMode};
use serde_json::Value;

fn status(temperature: Option<f64>) -> DeviceStatus {
    DeviceStatus {
        temperature,
        humidity: None,
        heat_setpoint: None,
        cool_setpoint: None,
        hold_until: None,
        status_heat: None,
        status_cool: None,
        fan_mode: None,
        raw: Value::Null,
    }
}

fn config() -> AppConfig {
    AppConfig {
        heat_on_below: 68.0,
        heat_off_at: 70.0,
        cool_on_above: 78.0,
        cool_off_at: 76.0,
        hold_minutes: 120,
        ..AppConfig::default()
    }
}

#[test]
fn cold_room_arms_heat_hold() {
    let command = policy::decide(&status(Some(67.0)), &config(), &ControllerState::default());
    assert_eq!(
        command,
        Some(Command::SetHeat {
            setpoint: 70.0,
            hold_minutes: 120,
        })
    );
}

#[test]
fn hot_room_arms_cool_hold() {
    let command = policy::decide(&status(Some(79.0)), &config(), &ControllerState::default());
    assert_eq!(
        command,
        Some(Command::SetCool {
            setpoint: 76.0,
            hold_minutes: 120,
        })
    );
}

#[test]
fn in_band_temperature_emits_nothing() {
    // after the armed hold raised the room to 71 the device coasts on its
    // own; the controller stays quiet until a threshold is crossed again
    let mut state = ControllerState::default();
    policy::apply(
        &mut state,
        &Command::SetHeat {
            setpoint: 70.0,
            hold_minutes: 120,
        },
    );
    assert_eq!(policy::decide(&status(Some(71.0)), &config(), &state), None);
    assert_eq!(policy::decide(&status(Some(74.0)), &config(), &state), None);
}

#[test]
fn no_rearm_when_setpoint_already_held() {
    let mut cold = status(Some(67.0));
    cold.heat_setpoint = Some(70.0);
    let state = ControllerState::default();
    assert_eq!(policy::decide(&cold, &config(), &state), None);
}

#[test]
fn rearm_when_device_reports_stale_setpoint() {
    let mut cold = status(Some(67.0));
    cold.heat_setpoint = Some(68.0);
    let command = policy::decide(&cold, &config(), &ControllerState::default());
    assert!(matches!(command, Some(Command::SetHeat { .. })));
}

#[test]
fn heat_takes_precedence_with_overlapping_bands() {
    let overlapping = AppConfig {
        heat_on_below: 75.0,
        heat_off_at: 76.0,
        cool_on_above: 74.0,
        cool_off_at: 72.0,
        ..AppConfig::default()
    };
    let command = policy::decide(
        &status(Some(74.5)),
        &overlapping,
        &ControllerState::default(),
    );
    assert!(matches!(command, Some(Command::SetHeat { .. })));
}

#[test]
fn disabled_side_releases_its_hold() {
    let mut state = ControllerState::default();
    policy::apply(
        &mut state,
        &Command::SetHeat {
            setpoint: 70.0,
            hold_minutes: 120,
        },
    );
    let mut cfg = config();
    cfg.enable_heat = false;

    assert_eq!(
        policy::decide(&status(Some(71.0)), &cfg, &state),
        Some(Command::CancelHold)
    );
    policy::apply(&mut state, &Command::CancelHold);
    assert_eq!(state.mode, None);
    // released once, then quiet
    assert_eq!(policy::decide(&status(Some(71.0)), &cfg, &state), None);
}

#[test]
fn disabled_heat_never_arms() {
    let mut cfg = config();
    cfg.enable_heat = false;
    assert_eq!(
        policy::decide(&status(Some(60.0)), &cfg, &ControllerState::default()),
        None
    );
}

#[test]
fn schedule_mode_cancels_once_on_entry() {
    let mut cfg = config();
    cfg.control_mode = ControlMode::Schedule;
    let mut state = ControllerState::default();

    // first tick under schedule mode releases any stale hold
    assert_eq!(
        policy::decide(&status(Some(71.0)), &cfg, &state),
        Some(Command::CancelHold)
    );
    policy::apply(&mut state, &Command::CancelHold);
    state.note_control_mode(ControlMode::Schedule);

    assert_eq!(policy::decide(&status(Some(60.0)), &cfg, &state), None);
    assert_eq!(policy::decide(&status(Some(90.0)), &cfg, &state), None);
}

#[test]
fn switching_back_to_schedule_cancels_again() {
    let mut state = ControllerState::default();
    state.note_control_mode(ControlMode::Hysteresis);

    let mut cfg = config();
    cfg.control_mode = ControlMode::Schedule;
    assert_eq!(
        policy::decide(&status(Some(71.0)), &cfg, &state),
        Some(Command::CancelHold)
    );
}

#[test]
fn missing_temperature_is_a_no_op() {
    assert_eq!(
        policy::decide(&status(None), &config(), &ControllerState::default()),
        None
    );
}

#[test]
fn reassert_rebuilds_the_armed_hold() {
    let mut state = ControllerState::default();
    policy::apply(
        &mut state,
        &Command::SetHeat {
            setpoint: 70.0,
            hold_minutes: 120,
        },
    );
    // a fan write in between must not mask the armed hold
    policy::apply(&mut state, &Command::SetFan { mode: FanMode::On });

    let command = policy::reassert_hold(&status(Some(71.0)), &config(), &state);
    assert_eq!(
        command,
        Some(Command::SetHeat {
            setpoint: 70.0,
            hold_minutes: 120,
        })
    );
}

#[test]
fn reassert_infers_the_held_side_without_bookkeeping() {
    // hold armed by a previous run: nothing is armed locally, but the
    // device reports a setpoint sitting at the heat off-threshold
    let mut held = status(Some(71.0));
    held.heat_setpoint = Some(70.0);
    let command = policy::reassert_hold(&held, &config(), &ControllerState::default());
    assert_eq!(
        command,
        Some(Command::SetHeat {
            setpoint: 70.0,
            hold_minutes: 120,
        })
    );

    let mut held = status(Some(75.0));
    held.cool_setpoint = Some(76.0);
    let command = policy::reassert_hold(&held, &config(), &ControllerState::default());
    assert!(matches!(command, Some(Command::SetCool { .. })));
}

#[test]
fn reassert_skips_a_disabled_side() {
    let mut state = ControllerState::default();
    policy::apply(
        &mut state,
        &Command::SetHeat {
            setpoint: 70.0,
            hold_minutes: 120,
        },
    );
    let mut cfg = config();
    cfg.enable_heat = false;
    assert_eq!(policy::reassert_hold(&status(Some(71.0)), &cfg, &state), None);
}

#[test]
fn reassert_needs_an_armed_or_inferable_side() {
    // setpoints away from both off-thresholds give nothing to re-issue
    let mut plain = status(Some(72.0));
    plain.heat_setpoint = Some(68.0);
    plain.cool_setpoint = Some(78.0);
    assert_eq!(
        policy::reassert_hold(&plain, &config(), &ControllerState::default()),
        None
    );
}

#[test]
fn fan_command_leaves_armed_mode_alone() {
    let mut state = ControllerState::default();
    policy::apply(
        &mut state,
        &Command::SetCool {
            setpoint: 76.0,
            hold_minutes: 120,
        },
    );
    policy::apply(&mut state, &Command::SetFan { mode: FanMode::On });
    assert_eq!(state.mode, Some(ArmedMode::Cool));
    assert_eq!(state.last_action, Some("fan"));
}
