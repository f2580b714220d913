use std::fs::{File, OpenOptions};
use std::io::Write;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::warn;

pub enum MessageLogMode {
    Full,
    /// Masks credential fields in logged request bodies.
    Redacted,
}

const SENSITIVE_KEYS: &[&str] = &["Password", "password", "UserName", "username"];

pub(crate) struct MessageLogger {
    mode: MessageLogMode,
    file: File,
}

impl MessageLogger {
    pub fn new(mode: MessageLogMode, path: &str) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { mode, file })
    }

    pub fn log_request(&mut self, method: &str, path: &str, body: Option<&Value>) {
        let body = body.map(|b| self.scrub(b));
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "req",
            "method": method,
            "path": path,
            "body": body,
        });
        self.write_line(&entry);
    }

    pub fn log_poll(&mut self, status: u16, body: &Value) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "poll",
            "status": status,
            "body": body,
        });
        self.write_line(&entry);
    }

    fn scrub(&self, body: &Value) -> Value {
        match self.mode {
            MessageLogMode::Full => body.clone(),
            MessageLogMode::Redacted => {
                let mut scrubbed = body.clone();
                redact(&mut scrubbed);
                scrubbed
            }
        }
    }

    fn write_line(&mut self, entry: &Value) {
        if let Ok(line) = serde_json::to_string(entry)
            && let Err(e) = writeln!(self.file, "{line}")
        {
            warn!("failed to write log entry: {e}");
        }
    }
}

fn redact(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, entry) in map.iter_mut() {
                if SENSITIVE_KEYS.contains(&key.as_str()) {
                    *entry = Value::String("***".to_string());
                } else {
                    redact(entry);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                redact(item);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::NamedTempFile;

    fn read_lines(path: &str) -> Vec<Value> {
        let mut contents = String::new();
        std::fs::File::open(path)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn log_request_writes_ndjson() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::Full, path).unwrap();
        logger.log_request("POST", "/portal/", None);

        let lines = read_lines(path);
        assert_eq!(lines[0]["dir"], "req");
        assert_eq!(lines[0]["method"], "POST");
        assert!(lines[0]["ts"].as_str().is_some());
    }

    #[test]
    fn redacted_mode_masks_credentials() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::Redacted, path).unwrap();
        logger.log_request(
            "POST",
            "/portal/",
            Some(&json!({"UserName": "alice", "Password": "hunter2", "RememberMe": "false"})),
        );

        let lines = read_lines(path);
        assert_eq!(lines[0]["body"]["UserName"], "***");
        assert_eq!(lines[0]["body"]["Password"], "***");
        assert_eq!(lines[0]["body"]["RememberMe"], "false");
    }

    #[test]
    fn full_mode_keeps_body_verbatim() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::Full, path).unwrap();
        logger.log_request(
            "POST",
            "/portal/Device/SubmitControlScreenChanges",
            Some(&json!({"HeatSetpoint": 70, "DeviceID": 1})),
        );

        let lines = read_lines(path);
        assert_eq!(lines[0]["dir"], "req");
        assert_eq!(lines[0]["body"]["HeatSetpoint"], 70);
    }

    #[test]
    fn log_poll_records_status() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::Full, path).unwrap();
        logger.log_poll(200, &json!({"latestData": {}}));

        let lines = read_lines(path);
        assert_eq!(lines[0]["dir"], "poll");
        assert_eq!(lines[0]["status"], 200);
    }
}
