use std::sync::Mutex;
use std::time::Duration;

use chrono::{Local, Utc};
use serde_json::Value;
use tracing::{debug, trace};

use crate::config::AppConfig;
use crate::endpoints::EndpointConfig;
use crate::logger::{MessageLogMode, MessageLogger};
use crate::payloads;
use crate::session::{local_time_offset_minutes, SessionManager};
use crate::types::{DeviceStatus, FanMode};
use crate::{Error, Result};

const DEFAULT_TIMEOUT_SECONDS: u64 = 20;

// The portal serves browsers only; a bare client UA gets bounced.
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub struct RedlinkClientBuilder {
    username: String,
    password: String,
    device_id: u64,
    endpoints: EndpointConfig,
    timeout: Duration,
    time_offset_minutes: Option<i32>,
    log_mode: Option<MessageLogMode>,
    log_path: Option<String>,
}

impl RedlinkClientBuilder {
    pub fn new(username: impl Into<String>, password: impl Into<String>, device_id: u64) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            device_id,
            endpoints: EndpointConfig::default(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
            time_offset_minutes: None,
            log_mode: None,
            log_path: None,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let mut builder = Self::new(&config.username, &config.password, config.device_id)
            .base_url(&config.base_url)
            .timeout_seconds(config.timeout_seconds);
        if let Some(offset) = config.time_offset_minutes {
            builder = builder.time_offset_minutes(offset);
        }
        builder
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.endpoints.base_url = base_url.into();
        self
    }

    pub fn endpoints(mut self, endpoints: EndpointConfig) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout = Duration::from_secs(seconds.max(1));
        self
    }

    pub fn time_offset_minutes(mut self, minutes: i32) -> Self {
        self.time_offset_minutes = Some(minutes);
        self
    }

    pub fn message_log(mut self, mode: MessageLogMode, path: impl Into<String>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    pub fn build(self) -> RedlinkClient {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .build()
            .expect("failed to build HTTP client");

        let logger = match (self.log_mode, self.log_path) {
            (Some(mode), Some(path)) => Some(Mutex::new(
                MessageLogger::new(mode, &path).expect("failed to open log file"),
            )),
            _ => None,
        };

        let login_url = self.endpoints.login_url();
        let session = SessionManager::new(
            http.clone(),
            login_url.clone(),
            self.username,
            self.password,
            self.time_offset_minutes
                .unwrap_or_else(local_time_offset_minutes),
        );

        RedlinkClient {
            http,
            endpoints: self.endpoints,
            device_id: self.device_id.to_string(),
            device_id_num: self.device_id,
            referer: login_url,
            session,
            logger,
        }
    }
}

/// Typed operations against the portal, one per device capability.
///
/// Every operation obtains a session, issues the request, and on an
/// auth-expired signal re-logs-in and retries exactly once. Retrying
/// beyond that is the control loop's job, not the client's. Setpoint
/// writes are fire-and-verify: the portal gives no transactional write
/// acknowledgement, so callers re-poll status to confirm effect.
pub struct RedlinkClient {
    http: reqwest::Client,
    endpoints: EndpointConfig,
    device_id: String,
    device_id_num: u64,
    referer: String,
    session: SessionManager,
    logger: Option<Mutex<MessageLogger>>,
}

impl RedlinkClient {
    pub fn builder(
        username: impl Into<String>,
        password: impl Into<String>,
        device_id: u64,
    ) -> RedlinkClientBuilder {
        RedlinkClientBuilder::new(username, password, device_id)
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub async fn get_status(&self) -> Result<DeviceStatus> {
        let data = self.check_data_session().await?;
        if let Some(logger) = &self.logger
            && let Ok(mut logger) = logger.lock()
        {
            logger.log_poll(200, &data);
        }
        Ok(DeviceStatus::from_check_data_session(&data))
    }

    pub async fn set_heat_setpoint(&self, setpoint: f64, hold_minutes: u32) -> Result<()> {
        let payload =
            payloads::heat_hold(self.device_id_num, setpoint, hold_minutes, Local::now().time());
        self.submit_control("heat", payload).await
    }

    pub async fn set_cool_setpoint(&self, setpoint: f64, hold_minutes: u32) -> Result<()> {
        let payload =
            payloads::cool_hold(self.device_id_num, setpoint, hold_minutes, Local::now().time());
        self.submit_control("cool", payload).await
    }

    pub async fn set_fan_mode(&self, mode: FanMode) -> Result<()> {
        let payload = payloads::fan(self.device_id_num, mode);
        self.submit_control("fan", payload).await
    }

    pub async fn cancel_hold(&self) -> Result<()> {
        let payload = payloads::cancel_hold(self.device_id_num);
        self.submit_control("cancel", payload).await
    }

    /// Fetches the device schedule as an opaque blob. The payload shape
    /// is account/firmware dependent and not interpreted here.
    pub async fn get_schedule(&self) -> Result<Value> {
        let url = self
            .endpoints
            .get_schedule_url(&self.device_id)
            .ok_or(Error::EndpointNotConfigured("get_schedule_path"))?;
        self.get_json(&url).await
    }

    /// Submits a schedule blob verbatim.
    pub async fn set_schedule(&self, payload: &Value) -> Result<()> {
        let url = self
            .endpoints
            .submit_schedule_url()
            .ok_or(Error::EndpointNotConfigured("submit_schedule_path"))?;
        self.post_json(&url, payload).await
    }

    /// Forces a fresh login now, pre-empting expiry during a later command.
    pub async fn refresh_session(&self) -> Result<()> {
        self.session.refresh().await.map(|_| ())
    }

    pub async fn seconds_since_login(&self) -> Option<u64> {
        self.session.seconds_since_login().await
    }

    async fn check_data_session(&self) -> Result<Value> {
        // cache-buster query param, same trick the portal's own JS uses
        let url = format!(
            "{}?_={}",
            self.endpoints.check_data_session_url(&self.device_id),
            Utc::now().timestamp_millis()
        );
        self.get_json(&url).await
    }

    async fn submit_control(&self, action: &str, payload: Value) -> Result<()> {
        // The portal only accepts control writes after a status read in
        // the same session; its endpoints are stateful.
        self.check_data_session().await?;
        debug!(action, "submitting control changes");
        self.post_json(&self.endpoints.submit_control_changes_url(), &payload)
            .await
    }

    /// GET with the one-retry auth recovery contract.
    async fn get_json(&self, url: &str) -> Result<Value> {
        let session = self.session.ensure().await?;
        match self.get_json_once(url).await {
            Err(Error::SessionExpired) => {
                debug!(url, "session rejected, retrying once after re-login");
                self.session.invalidate(session).await;
                self.session.ensure().await?;
                match self.get_json_once(url).await {
                    Err(Error::SessionExpired) => Err(Error::Auth(
                        "portal rejected a freshly established session".to_string(),
                    )),
                    other => other,
                }
            }
            other => other,
        }
    }

    /// POST with the one-retry auth recovery contract.
    async fn post_json(&self, url: &str, payload: &Value) -> Result<()> {
        let session = self.session.ensure().await?;
        match self.post_json_once(url, payload).await {
            Err(Error::SessionExpired) => {
                debug!(url, "session rejected, retrying once after re-login");
                self.session.invalidate(session).await;
                self.session.ensure().await?;
                match self.post_json_once(url, payload).await {
                    Err(Error::SessionExpired) => Err(Error::Auth(
                        "portal rejected a freshly established session".to_string(),
                    )),
                    other => other,
                }
            }
            other => other,
        }
    }

    async fn get_json_once(&self, url: &str) -> Result<Value> {
        trace!(url, "GET");
        self.log_request("GET", url, None);
        let response = self
            .http
            .get(url)
            .header("Accept", "application/json; q=0.01")
            .header("X-Requested-With", "XMLHttpRequest")
            .header("Referer", &self.referer)
            .send()
            .await?;
        let body = self.classify(response).await?;
        serde_json::from_str(&body).map_err(|e| Error::Payload(format!("response was not JSON: {e}")))
    }

    async fn post_json_once(&self, url: &str, payload: &Value) -> Result<()> {
        trace!(url, "POST");
        self.log_request("POST", url, Some(payload));
        let response = self
            .http
            .post(url)
            .header("Accept", "application/json; q=0.01")
            .header("X-Requested-With", "XMLHttpRequest")
            .header("Referer", &self.referer)
            .json(payload)
            .send()
            .await?;
        self.classify(response).await?;
        Ok(())
    }

    fn log_request(&self, method: &str, url: &str, body: Option<&Value>) {
        if let Some(logger) = &self.logger
            && let Ok(mut logger) = logger.lock()
        {
            logger.log_request(method, url, body);
        }
    }

    /// Maps a portal response to the error taxonomy. Expiry shows up as a
    /// 401/403, a redirect back to the login page, or an HTML login form
    /// served where JSON was expected.
    async fn classify(&self, response: reqwest::Response) -> Result<String> {
        let status = response.status();
        if matches!(status.as_u16(), 401 | 403) {
            return Err(Error::SessionExpired);
        }
        if status.is_redirection() {
            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            if location.contains(&self.endpoints.login_path) || location.is_empty() {
                return Err(Error::SessionExpired);
            }
            return Err(Error::Payload(format!("unexpected redirect to {location}")));
        }
        if !status.is_success() {
            response.error_for_status()?;
            unreachable!();
        }
        let body = response.text().await?;
        if body.trim_start().starts_with('<') || body.contains("__RequestVerificationToken") {
            // login page served instead of data: the cookie was dropped
            return Err(Error::SessionExpired);
        }
        Ok(body)
    }
}
