use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::client::{RedlinkClient, RedlinkClientBuilder};
use crate::config::{AppConfig, ConfigStore};
use crate::policy::{self, ArmedMode, ControllerState};
use crate::types::{Command, ControlMode, DeviceStatus, FanMode};
use crate::{Error, Result};

const DEFAULT_POLL_SECONDS: u64 = 60;

/// A user-issued command, accepted through the same serialized path as
/// the loop's own writes.
#[derive(Debug, Clone, Deserialize)]
pub struct ManualCommand {
    pub action: String,
    #[serde(default)]
    pub setpoint: Option<f64>,
    #[serde(default)]
    pub hold_minutes: Option<u32>,
    #[serde(default)]
    pub mode: Option<String>,
}

impl ManualCommand {
    fn to_command(&self, config: &AppConfig) -> Result<Command> {
        match self.action.as_str() {
            "heat" | "cool" => {
                let setpoint = self
                    .setpoint
                    .ok_or_else(|| Error::InvalidCommand("setpoint is required".to_string()))?;
                let hold_minutes = self.hold_minutes.unwrap_or(config.hold_minutes);
                if hold_minutes == 0 {
                    return Err(Error::InvalidCommand(
                        "hold_minutes must be positive".to_string(),
                    ));
                }
                if self.action == "heat" {
                    Ok(Command::SetHeat { setpoint, hold_minutes })
                } else {
                    Ok(Command::SetCool { setpoint, hold_minutes })
                }
            }
            "fan" => {
                let label = self
                    .mode
                    .as_deref()
                    .ok_or_else(|| Error::InvalidCommand("mode is required".to_string()))?;
                let mode = FanMode::from_label(label).ok_or_else(|| {
                    Error::InvalidCommand(format!("fan mode must be 'auto' or 'on', got {label:?}"))
                })?;
                Ok(Command::SetFan { mode })
            }
            "cancel" => Ok(Command::CancelHold),
            other => Err(Error::InvalidCommand(format!("unknown action: {other}"))),
        }
    }
}

/// Status snapshot exposed to external consumers (`/api/status` shape).
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub status: Option<StatusSummary>,
    pub controller: ControllerSummary,
    pub config: Option<Value>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSummary {
    pub temperature: Option<f64>,
    pub humidity: Option<i64>,
    pub heat_setpoint: Option<f64>,
    pub cool_setpoint: Option<f64>,
    pub hold_until: Option<DateTime<Utc>>,
    pub status_heat: Option<i64>,
    pub status_cool: Option<i64>,
    pub fan_mode: Option<FanMode>,
}

impl From<&DeviceStatus> for StatusSummary {
    fn from(status: &DeviceStatus) -> Self {
        Self {
            temperature: status.temperature,
            humidity: status.humidity,
            heat_setpoint: status.heat_setpoint,
            cool_setpoint: status.cool_setpoint,
            hold_until: status.hold_until,
            status_heat: status.status_heat,
            status_cool: status.status_cool,
            fan_mode: status.fan_mode,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ControllerSummary {
    pub mode: Option<ArmedMode>,
    pub last_action: Option<&'static str>,
    pub last_action_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct LoopState {
    config: Option<AppConfig>,
    status: Option<DeviceStatus>,
    error: Option<String>,
    controller: ControllerState,
    last_command: Option<(Command, DateTime<Utc>)>,
    /// Most recent hold write, kept separately from `last_command` so a
    /// later fan or cancel-free write cannot mask an armed hold.
    last_hold: Option<Command>,
    auth_latched: bool,
}

struct ManualRequest {
    command: ManualCommand,
    reply: oneshot::Sender<Result<()>>,
}

/// Handle to the running control loop.
///
/// One poll/decide/act cycle runs to completion before the next begins,
/// and manual commands are serviced by the same task, so device writes
/// never interleave.
pub struct ControlService {
    shared: Arc<Mutex<LoopState>>,
    command_tx: mpsc::Sender<ManualRequest>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ControlService {
    /// Spawns the loop. The first tick runs immediately.
    pub fn start(store: ConfigStore) -> Self {
        let shared = Arc::new(Mutex::new(LoopState::default()));
        let (command_tx, command_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = Worker {
            store,
            shared: shared.clone(),
            client: None,
            client_key: None,
        };
        let task = tokio::spawn(worker.run(command_rx, shutdown_rx));
        Self {
            shared,
            command_tx,
            shutdown_tx,
            task,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = lock(&self.shared);
        Snapshot {
            status: state.status.as_ref().map(StatusSummary::from),
            controller: ControllerSummary {
                mode: state.controller.mode,
                last_action: state.controller.last_action,
                last_action_at: state.last_command.as_ref().map(|(_, at)| *at),
            },
            config: state.config.as_ref().map(AppConfig::public_value),
            error: state.error.clone(),
        }
    }

    /// Submits a manual command through the loop's command queue and
    /// waits for the device write to complete.
    pub async fn apply_manual_command(&self, command: ManualCommand) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.command_tx
            .send(ManualRequest { command, reply })
            .await
            .map_err(|_| Error::Stopped)?;
        response.await.map_err(|_| Error::Stopped)?
    }

    /// Signals shutdown, aborting any in-flight remote call, and waits
    /// for the loop task to exit.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }
}

struct Worker {
    store: ConfigStore,
    shared: Arc<Mutex<LoopState>>,
    client: Option<RedlinkClient>,
    client_key: Option<ClientKey>,
}

#[derive(PartialEq)]
struct ClientKey {
    username: String,
    password: String,
    device_id: u64,
    base_url: String,
    time_offset_minutes: Option<i32>,
    timeout_seconds: u64,
}

impl ClientKey {
    fn from_config(config: &AppConfig) -> Self {
        Self {
            username: config.username.clone(),
            password: config.password.clone(),
            device_id: config.device_id,
            base_url: config.base_url.clone(),
            time_offset_minutes: config.time_offset_minutes,
            timeout_seconds: config.timeout_seconds,
        }
    }
}

impl Worker {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<ManualRequest>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut next_tick = tokio::time::Instant::now();
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                Some(request) = commands.recv() => {
                    let ManualRequest { command, reply } = request;
                    let result = tokio::select! {
                        _ = shutdown.changed() => break,
                        result = self.handle_manual(command) => result,
                    };
                    let _ = reply.send(result);
                }
                _ = tokio::time::sleep_until(next_tick) => {
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        () = self.tick() => {}
                    }
                    next_tick = tokio::time::Instant::now()
                        + Duration::from_secs(self.poll_interval_seconds());
                }
            }
        }
        debug!("control loop stopped");
    }

    /// One poll/decide/act cycle. Errors are recorded, never fatal.
    async fn tick(&mut self) {
        let config = match self.store.ensure() {
            Ok(config) => config,
            Err(e) => {
                self.record_error(&e);
                return;
            }
        };
        {
            let mut state = lock(&self.shared);
            state.config = Some(config.clone());
        }
        if let Err(e) = config.validate() {
            self.record_error(&e);
            return;
        }
        if !config.is_configured() {
            self.record_error_msg("config missing username/password/device_id");
            return;
        }
        self.ensure_client(&config);
        let Some(client) = self.client.as_ref() else {
            return;
        };

        let mut tick_error: Option<String> = None;

        // session refresh is independent of control mode and not a Command
        if let Some(elapsed) = client.seconds_since_login().await
            && elapsed >= config.login_refresh_seconds
        {
            debug!(elapsed, "refreshing session ahead of expiry");
            if let Err(e) = client.refresh_session().await {
                // the existing cookie may still be honored, keep polling
                warn!(error = %e, "session refresh failed");
                self.note_auth(&e);
                tick_error = Some(e.to_string());
            }
        }

        let status = match client.get_status().await {
            Ok(status) => status,
            Err(e) => {
                self.note_auth(&e);
                self.record_error(&e);
                return;
            }
        };

        // re-assert an expiring hold so the device schedule cannot regain
        // control between ticks
        if !lock(&self.shared).auth_latched && config.control_mode == ControlMode::Hysteresis {
            let expiring = {
                let state = lock(&self.shared);
                let margin = chrono::Duration::seconds(config.poll_interval_seconds as i64);
                status
                    .hold_until
                    .filter(|until| *until - Utc::now() <= margin)
                    .and_then(|_| {
                        // the exact hold if this process issued it, otherwise
                        // one rebuilt from the armed side and the config, so
                        // a hold survives interleaved fan writes and restarts
                        state
                            .last_hold
                            .clone()
                            .or_else(|| policy::reassert_hold(&status, &config, &state.controller))
                    })
            };
            if let Some(command) = expiring {
                debug!(action = command.label(), "re-asserting expiring hold");
                match self.submit(&command).await {
                    Ok(()) => self.record_command(&command),
                    Err(e) => {
                        self.note_auth(&e);
                        tick_error = Some(e.to_string());
                    }
                }
            }
        }

        // the latch may have tripped during the re-assert above
        let latched = lock(&self.shared).auth_latched;
        let decision = if latched {
            None
        } else {
            let state = lock(&self.shared);
            policy::decide(&status, &config, &state.controller)
        };

        let mut mode_settled = !latched && decision.is_none();
        if let Some(command) = decision {
            debug!(action = command.label(), "policy decision");
            match self.submit(&command).await {
                Ok(()) => {
                    self.record_command(&command);
                    mode_settled = true;
                }
                Err(e) => {
                    warn!(action = command.label(), error = %e, "command failed");
                    self.note_auth(&e);
                    tick_error = Some(e.to_string());
                }
            }
        }

        let mut state = lock(&self.shared);
        state.status = Some(status);
        if mode_settled {
            // only note the mode once its entry command went through, so a
            // failed schedule-mode cancel is retried next tick
            state.controller.note_control_mode(config.control_mode);
        }
        if tick_error.is_some() {
            state.error = tick_error;
        } else if !state.auth_latched {
            // while latched the credential error keeps being reported
            state.error = None;
        }
    }

    async fn handle_manual(&mut self, manual: ManualCommand) -> Result<()> {
        let config = self.store.ensure()?;
        config.validate()?;
        if !config.is_configured() {
            return Err(Error::InvalidCommand(
                "config missing username/password/device_id".to_string(),
            ));
        }
        self.ensure_client(&config);
        let command = manual.to_command(&config)?;
        debug!(action = command.label(), "manual command");
        match self.submit(&command).await {
            Ok(()) => {
                self.record_command(&command);
                Ok(())
            }
            Err(e) => {
                self.note_auth(&e);
                Err(e)
            }
        }
    }

    async fn submit(&self, command: &Command) -> Result<()> {
        let Some(client) = self.client.as_ref() else {
            return Err(Error::InvalidCommand("client not configured".to_string()));
        };
        match command {
            Command::SetHeat { setpoint, hold_minutes } => {
                client.set_heat_setpoint(*setpoint, *hold_minutes).await
            }
            Command::SetCool { setpoint, hold_minutes } => {
                client.set_cool_setpoint(*setpoint, *hold_minutes).await
            }
            Command::SetFan { mode } => client.set_fan_mode(*mode).await,
            Command::CancelHold => client.cancel_hold().await,
        }
    }

    /// Rebuilds the client when the credential/endpoint key changes.
    /// A new key also clears the auth latch: new credentials get a chance.
    fn ensure_client(&mut self, config: &AppConfig) {
        let key = ClientKey::from_config(config);
        if self.client_key.as_ref() == Some(&key) {
            return;
        }
        debug!(device_id = config.device_id, "building client");
        self.client = Some(RedlinkClientBuilder::from_config(config).build());
        self.client_key = Some(key);
        let mut state = lock(&self.shared);
        state.auth_latched = false;
    }

    fn record_command(&self, command: &Command) {
        let mut state = lock(&self.shared);
        policy::apply(&mut state.controller, command);
        state.last_command = Some((command.clone(), Utc::now()));
        if command.is_hold() {
            state.last_hold = Some(command.clone());
        } else if matches!(command, Command::CancelHold) {
            state.last_hold = None;
        }
        // a successful write proves the credentials work
        state.auth_latched = false;
    }

    fn note_auth(&self, error: &Error) {
        if matches!(error, Error::Auth(_)) {
            warn!("credentials rejected, halting automatic commands");
            let mut state = lock(&self.shared);
            state.auth_latched = true;
        }
    }

    fn record_error(&self, error: &Error) {
        let mut state = lock(&self.shared);
        state.error = Some(error.to_string());
    }

    fn record_error_msg(&self, message: &str) {
        let mut state = lock(&self.shared);
        state.error = Some(message.to_string());
    }

    fn poll_interval_seconds(&self) -> u64 {
        let state = lock(&self.shared);
        state
            .config
            .as_ref()
            .map(|c| c.poll_interval_seconds)
            .unwrap_or(DEFAULT_POLL_SECONDS)
            .max(1)
    }
}

fn lock(shared: &Arc<Mutex<LoopState>>) -> MutexGuard<'_, LoopState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}
