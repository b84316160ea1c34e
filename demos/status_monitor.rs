use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Manager, Peripheral};
use skycookers::{
    BleTransport, ConnectionMode, CookerConfig, CookerDevice, CookerError, Result,
    COOKER_SERVICE_UUID,
};
use std::time::Duration;
use tokio::time::{interval, sleep, Instant};
use tracing::{info, warn};
use uuid::Uuid;

/// Scan for the first peripheral advertising the cooker service
async fn find_cooker(model_name: &str) -> Result<Peripheral> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    let central = adapters
        .first()
        .ok_or_else(|| CookerError::ConnectionFailed("no Bluetooth adapter".to_string()))?;

    let service_uuid = Uuid::parse_str(COOKER_SERVICE_UUID)
        .map_err(|e| CookerError::Protocol(format!("Invalid service UUID: {e}")))?;
    central
        .start_scan(ScanFilter {
            services: vec![service_uuid],
        })
        .await?;
    sleep(Duration::from_secs(5)).await;
    central.stop_scan().await?;

    for peripheral in central.peripherals().await? {
        if let Ok(Some(props)) = peripheral.properties().await {
            if let Some(name) = props.local_name {
                if name.starts_with(model_name) {
                    info!("Found {name} at {}", props.address);
                    return Ok(peripheral);
                }
            }
        }
    }
    Err(CookerError::ConnectionFailed(format!(
        "no {model_name} in range"
    )))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let model_name = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "RMC-M800S".to_string());

    info!("📊 Skycookers Status Monitor Example");
    info!("Searching for {model_name}...");

    let peripheral = find_cooker(&model_name).await?;

    let mut config = CookerConfig::new(
        &model_name,
        [0x2F, 0x41, 0x09, 0x77, 0x10, 0xD3, 0x8B, 0x5E],
    );
    // Reconnect per poll so the phone app can still reach the cooker
    config.mode = ConnectionMode::OnDemand;
    let cooker = CookerDevice::new(BleTransport::new(peripheral), config)?;

    info!("🔍 Starting status monitoring...");
    info!("Press Ctrl+C to stop monitoring");

    let mut monitor_interval = interval(Duration::from_secs(30));
    let start_time = Instant::now();
    let mut failed_polls = 0u32;

    loop {
        monitor_interval.tick().await;

        if !cooker.poll(3, false).await {
            failed_polls += 1;
            warn!(
                "❌ Poll failed ({failed_polls} so far, success rate {}%)",
                cooker.success_rate().await
            );
            continue;
        }

        let elapsed = start_time.elapsed();
        let minutes = elapsed.as_secs() / 60;
        let seconds = elapsed.as_secs() % 60;

        if let Some(status) = cooker.status().await {
            println!("\n📊 Status Update ({minutes:02}:{seconds:02})");
            println!("┌─────────────────────────────────────────┐");
            println!("│ Program: {:26} │", format!("{}", status.program));
            println!(
                "│ Power:   {:26} │",
                if status.is_on() { "ON" } else { "OFF" }
            );
            println!("│ Target:  {:23}°C │", status.target_temperature);
            println!(
                "│ Timer:   {:>2}h{:02}m (+{:>2}h{:02}m)          │",
                status.main_hours, status.main_minutes,
                status.additional_hours, status.additional_minutes
            );
            println!(
                "│ Keep-warm: {:24} │",
                if status.auto_warm { "enabled" } else { "disabled" }
            );
            println!("└─────────────────────────────────────────┘");

            if !status.is_on() {
                println!("💤 Cooker is idle");
            }
        }

        println!(
            "📈 Link: {}% poll success, firmware {}",
            cooker.success_rate().await,
            cooker.sw_version().await.unwrap_or_else(|| "?".to_string())
        );

        if !cooker.available().await {
            warn!("❌ Device unavailable, stopping monitor");
            break;
        }
    }

    info!("🔌 Shutting down...");
    cooker.stop().await;

    println!(
        "\n📊 Monitored for {:02}:{:02}, {failed_polls} failed poll(s)",
        start_time.elapsed().as_secs() / 60,
        start_time.elapsed().as_secs() % 60
    );

    info!("🎉 Status monitoring completed!");
    Ok(())
}
