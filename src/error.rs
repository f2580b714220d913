use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// Credentials rejected by the portal. Not retryable until config changes.
    Auth(String),
    /// The session cookie was rejected. Recovered internally by one re-login.
    SessionExpired,
    /// Transport-level failure (timeout, connect error, 5xx). Retry next tick.
    Network(reqwest::Error),
    /// Response body did not have the expected shape.
    Payload(String),
    /// Config rejected at write time.
    Config(Vec<String>),
    EndpointNotConfigured(&'static str),
    InvalidCommand(String),
    /// The control loop has been stopped.
    Stopped,
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Auth(msg) => write!(f, "authentication failed: {msg}"),
            Error::SessionExpired => write!(f, "session expired"),
            Error::Network(e) => write!(f, "network error: {e}"),
            Error::Payload(msg) => write!(f, "unexpected payload: {msg}"),
            Error::Config(errors) => write!(f, "invalid config: {}", errors.join("; ")),
            Error::EndpointNotConfigured(name) => {
                write!(f, "endpoint not configured: {name}")
            }
            Error::InvalidCommand(msg) => write!(f, "invalid command: {msg}"),
            Error::Stopped => write!(f, "control loop stopped"),
            Error::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Network(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Network(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
