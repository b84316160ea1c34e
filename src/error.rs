use thiserror::Error;

/// Errors that can occur when working with SkyCooker multicookers
#[derive(Error, Debug)]
pub enum CookerError {
    /// Bluetooth Low Energy related errors
    #[error("BLE error: {0}")]
    Ble(#[from] btleplug::Error),

    /// Device connection failed
    #[error("Failed to connect to device: {0}")]
    ConnectionFailed(String),

    /// Operation attempted without an active connection
    #[error("Not connected to device")]
    NotConnected,

    /// Malformed response frame (bad magic bytes or truncated)
    #[error("Framing error: {0}")]
    Framing(String),

    /// No valid response within the receive window
    #[error("Timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// Unexpected response where no leniency rule applies
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Pairing key rejected by the device
    #[error("Authentication failed - pairing mode must be enabled on the cooker")]
    AuthFailed,

    /// Device returned a non-success code for a state-changing command
    #[error("Device rejected command {command:02X} with code {code:02X}")]
    DeviceCommand {
        /// Command byte that was sent
        command: u8,
        /// Status code the device returned
        code: u8,
    },

    /// Operation attempted after teardown
    #[error("Device handle has been disposed")]
    Disposed,

    /// Model name not present in the capability table
    #[error("Unknown cooker model: {0}")]
    UnknownModel(String),

    /// Program index outside the model's program table
    #[error("Program id {program_id} out of range for model family {family}")]
    ProgramOutOfRange {
        /// Requested program index
        program_id: u8,
        /// Model family code
        family: u8,
    },

    /// Program not available on this model
    #[error("Program {0} is not supported by this model")]
    UnsupportedProgram(String),
}

/// Result type for SkyCooker operations
pub type Result<T> = std::result::Result<T, CookerError>;

impl CookerError {
    /// Check if this error indicates a connection issue
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Ble(_) | Self::ConnectionFailed(_) | Self::NotConnected
        )
    }

    /// Check if this error is worth retrying within a poll cycle
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Ble(_)
                | Self::ConnectionFailed(_)
                | Self::NotConnected
                | Self::Framing(_)
                | Self::Timeout { .. }
                | Self::Protocol(_)
                | Self::DeviceCommand { .. }
        )
    }

    /// Check if this error must not be retried automatically
    ///
    /// Authentication failures require out-of-band re-pairing and disposal is
    /// permanent, so the poll loop gives up immediately on either.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::AuthFailed | Self::Disposed)
    }
}
