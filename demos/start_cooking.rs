use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Manager, Peripheral};
use skycookers::{
    BleTransport, CookerConfig, CookerDevice, CookerError, Program, Result, COOKER_SERVICE_UUID,
};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info};
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

    info!("🍲 Skycookers Start Cooking Example");
    info!("Searching for {model_name}...");

    let peripheral = find_cooker(&model_name).await?;

    // The pairing key agreed while the cooker was in pairing mode
    let config = CookerConfig::new(
        &model_name,
        [0x2F, 0x41, 0x09, 0x77, 0x10, 0xD3, 0x8B, 0x5E],
    );
    let cooker = CookerDevice::new(BleTransport::new(peripheral), config)?;

    // One hour of soup
    cooker.set_target_program(Program::Soup).await?;
    cooker.set_main_time(1, 0).await?;
    cooker.set_auto_warm(true).await?;

    info!("🔌 Starting the cooker...");
    if !cooker.start().await {
        error!("❌ Could not start cooking (success rate {}%)", cooker.success_rate().await);
        cooker.stop().await;
        return Err(CookerError::ConnectionFailed("start failed".to_string()));
    }

    info!("✅ Cooking started, firmware {:?}", cooker.sw_version().await);
    if let Some(status) = cooker.status().await {
        info!(
            "📊 {} for {}h{:02}m at {}°C",
            status.program, status.main_hours, status.main_minutes, status.target_temperature
        );
    }

    // Let it run for a bit, then shut it down again
    sleep(Duration::from_secs(30)).await;
    info!("🛑 Stopping the cooker...");
    cooker.stop_cooking().await?;
    cooker.stop().await;

    Ok(())
}
