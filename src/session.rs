use std::sync::OnceLock;
use std::time::Instant;

use regex::Regex;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{Error, Result};

/// Matches the anti-forgery token hidden in the portal login form.
fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"name="__RequestVerificationToken"[^>]*value="([^"]+)""#)
            .expect("static regex")
    })
}

/// Opaque proof that a caller observed a particular live session. Used to
/// report expiry back without ever exposing the session itself.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SessionHandle {
    epoch: u64,
}

#[derive(Default)]
struct SessionState {
    epoch: u64,
    valid: bool,
    last_login: Option<Instant>,
}

/// Owns the portal login flow and the session lifecycle. The session
/// cookies live in the shared `reqwest` cookie jar and are only ever
/// written by [`SessionManager::login`].
///
/// All state transitions run under one async mutex, so concurrent callers
/// that detect expiry collapse into a single login attempt (single-flight)
/// rather than racing the portal with parallel credential posts.
pub(crate) struct SessionManager {
    http: reqwest::Client,
    login_url: String,
    username: String,
    password: String,
    time_offset_minutes: i32,
    state: Mutex<SessionState>,
}

impl SessionManager {
    pub fn new(
        http: reqwest::Client,
        login_url: String,
        username: String,
        password: String,
        time_offset_minutes: i32,
    ) -> Self {
        Self {
            http,
            login_url,
            username,
            password,
            time_offset_minutes,
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Returns a handle to a live session, logging in when none exists.
    pub async fn ensure(&self) -> Result<SessionHandle> {
        let mut state = self.state.lock().await;
        if state.valid {
            return Ok(SessionHandle { epoch: state.epoch });
        }
        self.login().await?;
        state.epoch += 1;
        state.valid = true;
        state.last_login = Some(Instant::now());
        Ok(SessionHandle { epoch: state.epoch })
    }

    /// Forces a fresh login even when the current session looks live.
    /// The loop uses this to pre-empt expiry between commands.
    pub async fn refresh(&self) -> Result<SessionHandle> {
        let mut state = self.state.lock().await;
        self.login().await?;
        state.epoch += 1;
        state.valid = true;
        state.last_login = Some(Instant::now());
        Ok(SessionHandle { epoch: state.epoch })
    }

    /// Reports that the session the handle refers to was rejected
    /// upstream. A handle from an older epoch is ignored, so only the
    /// first of several concurrent expiry reports forces a re-login.
    pub async fn invalidate(&self, handle: SessionHandle) {
        let mut state = self.state.lock().await;
        if state.epoch == handle.epoch {
            debug!(epoch = handle.epoch, "session invalidated");
            state.valid = false;
        }
    }

    pub async fn seconds_since_login(&self) -> Option<u64> {
        let state = self.state.lock().await;
        state.last_login.map(|t| t.elapsed().as_secs())
    }

    async fn login(&self) -> Result<()> {
        debug!(url = %self.login_url, "logging in");
        let page = self
            .http
            .get(&self.login_url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let token = token_re()
            .captures(&page)
            .map(|c| c[1].to_string());

        let offset = self.time_offset_minutes.to_string();
        let mut form: Vec<(&str, &str)> = vec![
            ("timeOffset", &offset),
            ("UserName", &self.username),
            ("Password", &self.password),
            ("RememberMe", "false"),
        ];
        if let Some(ref token) = token {
            form.push(("__RequestVerificationToken", token));
        }

        let response = self.http.post(&self.login_url).form(&form).send().await?;
        let status = response.status().as_u16();
        match status {
            200 | 302 | 303 => {
                debug!(status, "login accepted");
                Ok(())
            }
            401 | 403 => Err(Error::Auth(format!("login rejected with status {status}"))),
            _ => Err(Error::Auth(format!("login failed with status {status}"))),
        }
    }
}

/// Minutes west of UTC, the format the portal's login form expects.
pub(crate) fn local_time_offset_minutes() -> i32 {
    use chrono::Offset;
    let offset = chrono::Local::now().offset().fix();
    -(offset.local_minus_utc() / 60)
}
