#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

//! # Skycookers 🍲
//!
//! A Rust library for controlling SkyCooker multicookers via Bluetooth Low
//! Energy.
//!
//! SkyCooker multicookers expose a Nordic-UART-style GATT service carrying a
//! simple framed request/response protocol. This library speaks that protocol
//! end to end: pairing-key authentication, program selection, cooking
//! parameter upload, power control, status decoding, and device clock sync,
//! with the model-to-model differences captured as capability data rather
//! than per-model code.
//!
//! Device discovery is deliberately out of scope. Scan with `btleplug`
//! however your application prefers, then hand the chosen peripheral to
//! [`BleTransport`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use skycookers::{BleTransport, CookerConfig, CookerDevice, Program};
//! # async fn demo(peripheral: btleplug::platform::Peripheral) -> Result<(), Box<dyn std::error::Error>> {
//! // Pairing key as established while the cooker was in pairing mode
//! let config = CookerConfig::new("RMC-M800S", [0x2F, 0x41, 0x09, 0x77, 0x10, 0xD3, 0x8B, 0x5E]);
//! let cooker = CookerDevice::new(BleTransport::new(peripheral), config)?;
//!
//! // Describe the desired cooking run, then push it to the device
//! cooker.set_target_program(Program::Soup).await?;
//! cooker.set_main_time(1, 30).await?;
//! if cooker.start().await {
//!     println!("Soup is on, firmware {:?}", cooker.sw_version().await);
//! }
//! # Ok(())
//! # }
//! ```

/// Command channel, connection lifecycle, and the typed command set
pub mod connection;
/// High-level device handle with target reconciliation and polling
pub mod device;
/// Error types and handling
pub mod error;
/// Model capability tables: programs, defaults, and family quirks
pub mod models;
/// Frame codec and payload layouts
pub mod protocol;
/// BLE link abstraction and the btleplug-backed implementation
pub mod transport;
/// Shared records: status snapshots, targets, statistics, configuration
pub mod types;

// Re-export the main types for convenient usage
pub use connection::{CookerConnection, CookingParams};
pub use device::CookerDevice;
pub use error::{CookerError, Result};
pub use models::{Model, Program, ProgramDefaults};
pub use protocol::Command;
pub use transport::{BleTransport, Transport};
pub use types::{
    ConnectionMode, ConnectionState, CookerConfig, DeviceStatus, Statistics, TargetState,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// SkyCooker GATT service UUID
///
/// Nordic-UART-style vendor service present on every supported cooker. All
/// command and status traffic flows through its two characteristics.
pub const COOKER_SERVICE_UUID: &str = "6E400001-B5A3-F393-E0A9-E50E24DCCA9E";

/// Write characteristic UUID for app-to-cooker command frames
pub const COOKER_TX_CHAR_UUID: &str = "6E400002-B5A3-F393-E0A9-E50E24DCCA9E";

/// Notify characteristic UUID for cooker-to-app response frames
pub const COOKER_RX_CHAR_UUID: &str = "6E400003-B5A3-F393-E0A9-E50E24DCCA9E";
