//! One-shot status read. Credentials come from the environment:
//!
//!   TCC_USERNAME=me@example.com TCC_PASSWORD=... TCC_DEVICE_ID=1234567 \
//!     cargo run --example status

use redlink_control::RedlinkClient;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let username = std::env::var("TCC_USERNAME")?;
    let password = std::env::var("TCC_PASSWORD")?;
    let device_id: u64 = std::env::var("TCC_DEVICE_ID")?.parse()?;

    let client = RedlinkClient::builder(username, password, device_id).build();
    let status = client.get_status().await?;

    println!("temperature:   {:?}", status.temperature);
    println!("humidity:      {:?}", status.humidity);
    println!("heat setpoint: {:?}", status.heat_setpoint);
    println!("cool setpoint: {:?}", status.cool_setpoint);
    println!("fan mode:      {:?}", status.fan_mode);
    println!("hold until:    {:?}", status.hold_until);
    Ok(())
}
