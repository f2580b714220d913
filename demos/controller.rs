//! Runs the control loop against a JSON config file and prints a
//! snapshot every ten seconds until interrupted.
//!
//!   cargo run --example controller -- config.json

use std::time::Duration;

use redlink_control::{ConfigStore, ControlService, DEFAULT_CONFIG_PATH};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let store = ConfigStore::new(&path);
    let config = store.ensure()?;
    if !config.is_configured() {
        eprintln!("fill in username/password/device_id in {path} and run again");
        return Ok(());
    }

    let service = ControlService::start(store);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(Duration::from_secs(10)) => {
                let snapshot = service.snapshot();
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            }
        }
    }
    service.stop().await;
    Ok(())
}
