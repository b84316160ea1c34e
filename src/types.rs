use crate::models::Program;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Device status codes reported in byte 8 of a status payload
pub mod status_code {
    /// Device is off
    pub const OFF: u8 = 0x00;
    /// Program selected, waiting for start
    pub const WAIT: u8 = 0x01;
    /// Counting down to a delayed launch
    pub const DELAYED_LAUNCH: u8 = 0x02;
    /// Heating up to the target temperature
    pub const WARMING: u8 = 0x03;
    /// Actively cooking
    pub const COOKING: u8 = 0x05;
    /// Keeping the finished dish warm
    pub const AUTO_WARM: u8 = 0x06;
    /// Fully powered down
    pub const FULL_OFF: u8 = 0x0A;
}

/// Immutable snapshot of the cooker state, decoded from one status response
///
/// A fresh snapshot replaces the previous one wholesale after every
/// successful poll; fields are never patched in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    /// Wire id of the active program
    pub program_id: u8,
    /// Active program, resolved through the model table
    pub program: Program,
    /// Sub-program id (0 on models without sub-programs)
    pub subprogram_id: u8,
    /// Target temperature in Celsius
    pub target_temperature: u8,
    /// Main timer hours
    pub main_hours: u8,
    /// Main timer minutes
    pub main_minutes: u8,
    /// Additional timer hours (delayed start or keep-warm, depending on state)
    pub additional_hours: u8,
    /// Additional timer minutes
    pub additional_minutes: u8,
    /// Keep-warm after cooking finishes
    pub auto_warm: bool,
    /// Raw status code, see [`status_code`]
    pub status: u8,
    /// Sound signals enabled
    pub sound_enabled: bool,
}

impl DeviceStatus {
    /// Whether the device reports itself as running
    #[must_use]
    pub const fn is_on(&self) -> bool {
        self.status != status_code::OFF
    }
}

/// Desired cooking parameters not yet confirmed by the device
///
/// Setters accumulate into this record; the poll loop pushes it to the
/// device and clears the pending marker once the device confirms. A target
/// left pending past its TTL is abandoned rather than replayed stale.
#[derive(Debug, Clone)]
pub struct TargetState {
    /// Wire id of the desired program, `None` until one is chosen
    pub program_id: Option<u8>,
    /// Desired sub-program id
    pub subprogram_id: u8,
    /// Desired target temperature in Celsius
    pub temperature: u8,
    /// Main timer hours
    pub main_hours: u8,
    /// Main timer minutes
    pub main_minutes: u8,
    /// Delayed start hours
    pub additional_hours: u8,
    /// Delayed start minutes
    pub additional_minutes: u8,
    /// Keep-warm after cooking
    pub auto_warm: bool,
    /// When the target became pending, `None` while nothing is queued
    pub pending_since: Option<Instant>,
}

impl TargetState {
    /// Empty target with nothing pending
    #[must_use]
    pub const fn new() -> Self {
        Self {
            program_id: None,
            subprogram_id: 0,
            temperature: 0,
            main_hours: 0,
            main_minutes: 0,
            additional_hours: 0,
            additional_minutes: 0,
            auto_warm: false,
            pending_since: None,
        }
    }

    /// Mark the current parameters as waiting to be pushed to the device
    pub fn mark_pending(&mut self) {
        self.pending_since = Some(Instant::now());
    }

    /// Whether a push to the device is queued
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.pending_since.is_some()
    }

    /// Whether the pending target has outlived the given TTL
    #[must_use]
    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.pending_since
            .map(|since| since.elapsed() > ttl)
            .unwrap_or(false)
    }

    /// Set the main cooking timer, clamping to a valid 24h clock
    pub fn set_main_time(&mut self, hours: u8, minutes: u8) {
        self.main_hours = hours.min(23);
        self.main_minutes = minutes.min(59);
    }

    /// Set the delayed start offset, clamping to a valid 24h clock
    pub fn set_delayed_start(&mut self, hours: u8, minutes: u8) {
        self.additional_hours = hours.min(23);
        self.additional_minutes = minutes.min(59);
    }

    /// Drop everything queued and return to the empty state
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for TargetState {
    fn default() -> Self {
        Self::new()
    }
}

/// Rolling record of recent poll outcomes
///
/// Keeps the last [`Statistics::WINDOW`] results; older entries fall off.
#[derive(Debug, Default)]
pub struct Statistics {
    outcomes: VecDeque<bool>,
}

impl Statistics {
    /// Number of poll outcomes retained
    pub const WINDOW: usize = 100;

    /// Empty statistics
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one poll outcome
    pub fn record(&mut self, success: bool) {
        if self.outcomes.len() == Self::WINDOW {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(success);
    }

    /// Success percentage over the retained window, 0 when empty
    #[must_use]
    pub fn success_rate(&self) -> u8 {
        if self.outcomes.is_empty() {
            return 0;
        }
        let successes = self.outcomes.iter().filter(|ok| **ok).count();
        (successes * 100 / self.outcomes.len()) as u8
    }

    /// Number of outcomes currently retained
    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether no outcome has been recorded yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// When to hold the BLE link between polls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionMode {
    /// Keep the connection open between polls
    Persistent,
    /// Connect for each poll and drop the link afterwards
    OnDemand,
}

/// Lifecycle phase of the device link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No link
    Disconnected,
    /// Transport-level connect in progress
    Connecting,
    /// Link up, pairing key not yet accepted
    Authenticating,
    /// Authenticated and ready for commands
    Ready,
}

/// Configuration for one cooker device
#[derive(Debug, Clone)]
pub struct CookerConfig {
    /// Model name as advertised by the device, e.g. "RMC-M800S"
    pub model_name: String,
    /// 8-byte pairing key established during pairing mode
    pub pairing_key: [u8; 8],
    /// Link retention policy
    pub mode: ConnectionMode,
    /// Window for one command round trip
    pub recv_timeout: Duration,
    /// Hard cap on transport connect
    pub connect_timeout: Duration,
    /// Poll attempts before giving up on a cycle
    pub max_attempts: u32,
    /// Pause between failed poll attempts
    pub backoff: Duration,
    /// How long a pending target stays eligible for replay
    pub target_ttl: Duration,
    /// Settle delay after program selection
    pub select_settle: Duration,
    /// Settle delay after parameter upload
    pub set_settle: Duration,
}

impl CookerConfig {
    /// Configuration with the stock timing profile for a given model and key
    #[must_use]
    pub fn new(model_name: impl Into<String>, pairing_key: [u8; 8]) -> Self {
        Self {
            model_name: model_name.into(),
            pairing_key,
            ..Self::default()
        }
    }
}

impl Default for CookerConfig {
    fn default() -> Self {
        Self {
            model_name: String::new(),
            pairing_key: [0xBB; 8],
            mode: ConnectionMode::Persistent,
            recv_timeout: Duration::from_millis(1500),
            connect_timeout: Duration::from_secs(10),
            max_attempts: 3,
            backoff: Duration::from_millis(500),
            target_ttl: Duration::from_secs(30),
            select_settle: Duration::from_millis(500),
            set_settle: Duration::from_millis(300),
        }
    }
}
