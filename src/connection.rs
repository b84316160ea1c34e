use std::time::{SystemTime, UNIX_EPOCH};

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    error::{CookerError, Result},
    models::Model,
    protocol::{self, Command},
    transport::Transport,
    types::{ConnectionMode, ConnectionState, CookerConfig, DeviceStatus},
};

/// Full parameter set for one cooking run, as uploaded to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookingParams {
    /// Wire id of the program slot
    pub program_id: u8,
    /// Sub-program id (ignored by models without sub-programs)
    pub subprogram_id: u8,
    /// Target temperature in Celsius
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
    /// Program settings bit flags; 0 means "use the factory default"
    pub flags: u8,
}

/// Authenticated command channel to one cooker
///
/// Owns the transport, the rolling sequence counter, and the connection
/// lifecycle. Commands are strictly serialized: one request is written, then
/// notifications are consumed until the matching response arrives or the
/// receive window closes.
pub struct CookerConnection<T: Transport> {
    transport: T,
    config: CookerConfig,
    model: &'static Model,
    seq: u8,
    state: ConnectionState,
    disposed: bool,
    authed: bool,
    time_synced: bool,
    last_connect_ok: bool,
    last_auth_ok: bool,
    sw_version: Option<String>,
}

impl<T: Transport> CookerConnection<T> {
    /// Build a connection for the model named in the configuration
    ///
    /// # Errors
    ///
    /// Returns [`CookerError::UnknownModel`] when the configured model name
    /// is not in the capability table.
    pub fn new(transport: T, config: CookerConfig) -> Result<Self> {
        let model = Model::resolve(&config.model_name)?;
        Ok(Self {
            transport,
            config,
            model,
            seq: 0,
            state: ConnectionState::Disconnected,
            disposed: false,
            authed: false,
            time_synced: false,
            last_connect_ok: false,
            last_auth_ok: false,
            sw_version: None,
        })
    }

    /// Capability record for the configured model
    #[must_use]
    pub fn model(&self) -> &'static Model {
        self.model
    }

    /// Current lifecycle phase
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether the last transport connect attempt succeeded
    #[must_use]
    pub const fn last_connect_ok(&self) -> bool {
        self.last_connect_ok
    }

    /// Whether the last pairing-key exchange succeeded
    #[must_use]
    pub const fn last_auth_ok(&self) -> bool {
        self.last_auth_ok
    }

    /// Firmware version string, once fetched
    #[must_use]
    pub fn sw_version(&self) -> Option<&str> {
        self.sw_version.as_deref()
    }

    /// Whether the transport link is up
    pub async fn connected(&self) -> bool {
        self.transport.is_connected().await
    }

    /// Send one command and wait for its matching response payload
    ///
    /// Responses carrying a stale sequence number are discarded and the wait
    /// continues against the same deadline. A response with a different
    /// opcode is accepted only under the firmware's known substitutions: a
    /// status push confirms `TurnOn`/`SelectProgram`/`SetMainProgram`, and a
    /// deferred command echo answers `GetStatus`.
    ///
    /// # Errors
    ///
    /// [`CookerError::Disposed`] after [`stop`](Self::stop),
    /// [`CookerError::NotConnected`] without a link,
    /// [`CookerError::Timeout`] when the window closes,
    /// [`CookerError::Protocol`] for unexplained opcode mismatches.
    pub async fn send(&mut self, command: Command, payload: &[u8]) -> Result<Vec<u8>> {
        if self.disposed {
            return Err(CookerError::Disposed);
        }
        if !self.transport.is_connected().await {
            return Err(CookerError::NotConnected);
        }

        self.seq = self.seq.wrapping_add(1);
        let seq = self.seq;
        let frame = protocol::encode(seq, command, payload);
        debug!("Command {:02X} seq {} -> {:02X?}", command.code(), seq, payload);
        self.transport.write(&frame).await?;

        let deadline = Instant::now() + self.config.recv_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(CookerError::Timeout {
                    timeout_ms: self.config.recv_timeout.as_millis() as u64,
                });
            }
            let raw = self.transport.recv(remaining).await?;
            let response = protocol::decode(&raw)?;
            if response.seq != seq {
                debug!(
                    "Discarding response with stale seq {} (waiting for {})",
                    response.seq, seq
                );
                continue;
            }
            if response.command == command.code() {
                return Ok(response.payload);
            }
            return Self::reconcile_mismatch(command, response.command, response.payload);
        }
    }

    fn reconcile_mismatch(sent: Command, got: u8, payload: Vec<u8>) -> Result<Vec<u8>> {
        let status_push_confirms = matches!(
            sent,
            Command::SelectProgram | Command::SetMainProgram | Command::TurnOn
        ) && got == Command::GetStatus.code();
        if status_push_confirms {
            debug!("Status push in place of {:02X} reply, treating as success", sent.code());
            return Ok(vec![0x01]);
        }

        let deferred_echo = sent == Command::GetStatus
            && matches!(
                Command::from_u8(got),
                Some(Command::SelectProgram | Command::SetMainProgram | Command::TurnOff)
            );
        if deferred_echo {
            debug!("Deferred {:02X} echo in place of status, passing through", got);
            return Ok(payload);
        }

        Err(CookerError::Protocol(format!(
            "sent command {:02X}, device answered {:02X}",
            sent.code(),
            got
        )))
    }

    /// Bring the link to the ready state, reconnecting if it went stale
    ///
    /// A no-op when already connected and authenticated. Otherwise performs
    /// the full handshake: clean disconnect, transport connect, pairing key
    /// exchange, firmware version fetch, and a best-effort clock sync (once
    /// per session, failure logged and swallowed).
    ///
    /// # Errors
    ///
    /// [`CookerError::AuthFailed`] when the pairing key is rejected; this is
    /// terminal and never retried within the call. Connect and handshake
    /// errors propagate with the link torn back down.
    pub async fn connect_if_needed(&mut self) -> Result<()> {
        if self.disposed {
            return Err(CookerError::Disposed);
        }
        if self.authed && self.transport.is_connected().await {
            return Ok(());
        }

        // A half-open link leaks adapter resources, cycle it first
        self.disconnect().await;

        self.state = ConnectionState::Connecting;
        match self.transport.connect(self.config.connect_timeout).await {
            Ok(()) => self.last_connect_ok = true,
            Err(e) => {
                self.last_connect_ok = false;
                self.disconnect().await;
                return Err(e);
            }
        }
        info!("Connected to {}", self.config.model_name);

        self.state = ConnectionState::Authenticating;
        let key = self.config.pairing_key;
        match self.auth(&key).await {
            Ok(true) => self.last_auth_ok = true,
            Ok(false) => {
                self.last_auth_ok = false;
                self.disconnect().await;
                return Err(CookerError::AuthFailed);
            }
            Err(e) => {
                self.disconnect().await;
                return Err(e);
            }
        }

        // Refreshed on every session; the last known value survives a
        // disconnect for display purposes
        match self.get_version().await {
            Ok(version) => {
                info!("Firmware version {version}");
                self.sw_version = Some(version);
            }
            Err(e) => {
                self.disconnect().await;
                return Err(e);
            }
        }

        if !self.time_synced {
            self.sync_time().await;
            self.time_synced = true;
        }

        self.authed = true;
        self.state = ConnectionState::Ready;
        Ok(())
    }

    /// Drop the link when the retention policy says so
    pub async fn disconnect_if_needed(&mut self) {
        if self.config.mode == ConnectionMode::OnDemand {
            self.disconnect().await;
        }
    }

    /// Tear the link down; safe to call repeatedly
    pub async fn disconnect(&mut self) {
        if let Err(e) = self.transport.disconnect().await {
            warn!("Disconnect failed: {e}");
        }
        self.authed = false;
        self.time_synced = false;
        self.state = ConnectionState::Disconnected;
    }

    /// Dispose of the connection; every later operation fails fast
    pub async fn stop(&mut self) {
        if self.disposed {
            return;
        }
        self.disconnect().await;
        self.disposed = true;
        info!("Connection to {} stopped", self.config.model_name);
    }

    /// Present the pairing key; `true` means the device accepted it
    ///
    /// # Errors
    ///
    /// Propagates channel errors from [`send`](Self::send).
    pub async fn auth(&mut self, key: &[u8; 8]) -> Result<bool> {
        let response = self.send(Command::Auth, key).await?;
        Ok(response.first().copied().unwrap_or(0) != 0)
    }

    /// Read the firmware version as "major.minor"
    ///
    /// # Errors
    ///
    /// [`CookerError::Protocol`] when the response is shorter than 2 bytes.
    pub async fn get_version(&mut self) -> Result<String> {
        let response = self.send(Command::GetVersion, &[]).await?;
        if response.len() < 2 {
            return Err(CookerError::Protocol(format!(
                "version payload too short: {} bytes",
                response.len()
            )));
        }
        Ok(format!("{}.{}", response[0], response[1]))
    }

    /// Start the selected program
    ///
    /// # Errors
    ///
    /// [`CookerError::DeviceCommand`] unless the device answers with the
    /// success byte.
    pub async fn turn_on(&mut self) -> Result<()> {
        let response = self.send(Command::TurnOn, &[]).await?;
        Self::check_strict(Command::TurnOn, &response)
    }

    /// Stop cooking and return to standby
    ///
    /// # Errors
    ///
    /// [`CookerError::DeviceCommand`] unless the device answers with the
    /// success byte.
    pub async fn turn_off(&mut self) -> Result<()> {
        let response = self.send(Command::TurnOff, &[]).await?;
        Self::check_strict(Command::TurnOff, &response)
    }

    /// Select a program slot
    ///
    /// Models without sub-program support take a one-byte payload; everyone
    /// else also gets the sub-program id.
    ///
    /// # Errors
    ///
    /// [`CookerError::DeviceCommand`] when the device rejects the selection.
    pub async fn select_program(&mut self, program_id: u8, subprogram_id: u8) -> Result<()> {
        self.model.program(program_id)?;
        let payload = if self.model.supports_subprograms() {
            vec![program_id, subprogram_id]
        } else {
            vec![program_id]
        };
        let response = self.send(Command::SelectProgram, &payload).await?;
        Self::check_tolerant(Command::SelectProgram, &response)
    }

    /// Upload the full parameter set for a cooking run
    ///
    /// Family 3 models take the short eight-byte layout; all others append a
    /// flags byte, defaulted from the capability table when the caller
    /// passes 0.
    ///
    /// # Errors
    ///
    /// [`CookerError::DeviceCommand`] when the device rejects the upload.
    pub async fn set_main_program(&mut self, params: &CookingParams) -> Result<()> {
        let mut payload = vec![
            params.program_id,
            params.subprogram_id,
            params.temperature,
            params.main_hours,
            params.main_minutes,
            params.additional_hours,
            params.additional_minutes,
            u8::from(params.auto_warm),
        ];
        if self.model.supports_subprograms() {
            let flags = if params.flags == 0 {
                self.model.defaults(params.program_id)?.flags
            } else {
                params.flags
            };
            payload.push(flags);
        }
        let response = self.send(Command::SetMainProgram, &payload).await?;
        Self::check_tolerant(Command::SetMainProgram, &response)
    }

    /// Read and decode the current device status
    ///
    /// # Errors
    ///
    /// Channel errors, plus [`CookerError::Protocol`] for a malformed
    /// status record.
    pub async fn get_status(&mut self) -> Result<DeviceStatus> {
        let response = self.send(Command::GetStatus, &[]).await?;
        protocol::parse_status(self.model, &response)
    }

    /// Push the host clock to the device, best effort
    ///
    /// Clock sync failure never fails a poll; the device just shows a wrong
    /// clock until the next session.
    pub async fn sync_time(&mut self) {
        let now = match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(elapsed) => elapsed.as_secs() as i32,
            Err(e) => {
                warn!("Clock sync skipped, host clock unreadable: {e}");
                return;
            }
        };
        let offset = time::UtcOffset::current_local_offset()
            .map(time::UtcOffset::whole_seconds)
            .unwrap_or(0);
        let payload = protocol::encode_time(now, offset);
        match self.send(Command::SyncTime, &payload).await {
            Ok(response) => {
                let code = response.first().copied().unwrap_or(0);
                if code != 0 {
                    warn!("Device refused clock sync, code {code:02X}");
                } else {
                    debug!("Clock synced: {now} offset {offset}s");
                }
            }
            Err(e) => warn!("Clock sync failed: {e}"),
        }
    }

    /// Read the device clock as (unix seconds, UTC offset seconds)
    ///
    /// # Errors
    ///
    /// Channel errors, plus [`CookerError::Protocol`] for a short payload.
    pub async fn get_time(&mut self) -> Result<(i32, i32)> {
        let response = self.send(Command::GetTime, &[]).await?;
        protocol::decode_time(&response)
    }

    fn check_strict(command: Command, response: &[u8]) -> Result<()> {
        let code = response.first().copied().unwrap_or(0);
        if code == 1 {
            Ok(())
        } else {
            Err(CookerError::DeviceCommand {
                command: command.code(),
                code,
            })
        }
    }

    /// Some firmwares answer program commands with a bare one-byte echo
    /// instead of the success byte; both count as accepted.
    fn check_tolerant(command: Command, response: &[u8]) -> Result<()> {
        let code = response.first().copied().unwrap_or(0);
        if code == 1 || response.len() == 1 {
            Ok(())
        } else {
            Err(CookerError::DeviceCommand {
                command: command.code(),
                code,
            })
        }
    }
}
