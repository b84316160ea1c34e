use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{watch, Mutex, RwLock};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::{
    connection::{CookerConnection, CookingParams},
    error::{CookerError, Result},
    models::{Model, Program},
    transport::Transport,
    types::{CookerConfig, DeviceStatus, Statistics, TargetState},
};

/// High-level handle for one cooker
///
/// `CookerDevice` reconciles a desired cooking state against the device:
/// setters accumulate a target, and [`poll`](Self::poll) pushes it out,
/// refreshes the status snapshot, and keeps connection statistics. At most
/// one poll runs at a time; concurrent callers queue on the connection lock.
///
/// # Examples
///
/// ```no_run
/// use skycookers::{BleTransport, CookerConfig, CookerDevice, Program};
/// # async fn demo(peripheral: btleplug::platform::Peripheral) -> Result<(), Box<dyn std::error::Error>> {
/// let config = CookerConfig::new("RMC-M800S", [0x01; 8]);
/// let device = CookerDevice::new(BleTransport::new(peripheral), config)?;
///
/// device.set_target_program(Program::Soup).await?;
/// device.set_main_time(1, 0).await?;
/// device.start().await;
/// # Ok(())
/// # }
/// ```
pub struct CookerDevice<T: Transport> {
    connection: Mutex<CookerConnection<T>>,
    // Resolved up front so setters never touch the connection lock; a
    // setter racing a poll must only contend on the target lock
    model: &'static Model,
    status: RwLock<Option<DeviceStatus>>,
    target: Mutex<TargetState>,
    stats: Mutex<Statistics>,
    status_tx: watch::Sender<Option<DeviceStatus>>,
    disposed: AtomicBool,
    config: CookerConfig,
}

impl<T: Transport> CookerDevice<T> {
    /// Build a device handle over the given transport
    ///
    /// # Errors
    ///
    /// Returns [`CookerError::UnknownModel`] when the configured model name
    /// is not in the capability table.
    pub fn new(transport: T, config: CookerConfig) -> Result<Self> {
        let model = Model::resolve(&config.model_name)?;
        let connection = CookerConnection::new(transport, config.clone())?;
        let (status_tx, _) = watch::channel(None);
        Ok(Self {
            connection: Mutex::new(connection),
            model,
            status: RwLock::new(None),
            target: Mutex::new(TargetState::new()),
            stats: Mutex::new(Statistics::new()),
            status_tx,
            disposed: AtomicBool::new(false),
            config,
        })
    }

    /// Capability record for the configured model
    #[must_use]
    pub const fn model(&self) -> &'static Model {
        self.model
    }

    /// Run one reconciliation cycle
    ///
    /// Connects if needed, refreshes the status snapshot, pushes any pending
    /// target, and applies the link retention policy. On failure the link is
    /// dropped unconditionally, a failure is recorded, and the cycle retries
    /// after a fixed backoff until `max_attempts` is exhausted. A rejected
    /// pairing key aborts immediately without touching the statistics.
    ///
    /// Returns whether the cycle eventually succeeded. A disposed handle
    /// returns `false` without doing anything.
    pub async fn poll(&self, max_attempts: u32, force: bool) -> bool {
        if self.disposed.load(Ordering::SeqCst) {
            return false;
        }
        let mut connection = self.connection.lock().await;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.poll_once(&mut connection, force).await {
                Ok(()) => {
                    self.stats.lock().await.record(true);
                    let snapshot = self.status.read().await.clone();
                    self.status_tx.send_replace(snapshot);
                    return true;
                }
                Err(e) => {
                    warn!("Poll attempt {attempt} failed: {e}");
                    connection.disconnect().await;
                    self.abandon_stale_target().await;

                    if e.is_terminal() {
                        error!("Giving up: {e}");
                        return false;
                    }
                    self.stats.lock().await.record(false);
                    if attempt >= max_attempts {
                        error!("Poll failed after {attempt} attempts: {e}");
                        return false;
                    }
                    sleep(self.config.backoff).await;
                }
            }
        }
    }

    async fn poll_once(
        &self,
        connection: &mut CookerConnection<T>,
        force: bool,
    ) -> Result<()> {
        connection.connect_if_needed().await?;

        let status = connection.get_status().await?;
        debug!(
            "Status: {} ({}), code {:02X}",
            status.program,
            if status.is_on() { "on" } else { "off" },
            status.status
        );
        *self.status.write().await = Some(status.clone());

        let pending = {
            let target = self.target.lock().await;
            if target.is_pending() || (force && target.program_id.is_some()) {
                target.program_id.map(|program_id| CookingParams {
                    program_id,
                    subprogram_id: target.subprogram_id,
                    temperature: target.temperature,
                    main_hours: target.main_hours,
                    main_minutes: target.main_minutes,
                    additional_hours: target.additional_hours,
                    additional_minutes: target.additional_minutes,
                    auto_warm: target.auto_warm,
                    flags: 0,
                })
            } else {
                None
            }
        };

        if let Some(params) = pending {
            // The standby sentinel is an observed state, never a command
            if !self.model.is_standby(params.program_id) {
                self.converge(connection, &status, &params).await?;
                self.target.lock().await.reset();
            }
        }

        connection.disconnect_if_needed().await;
        Ok(())
    }

    /// Push the target to the device: select, upload parameters, start
    ///
    /// Selection is skipped when the device is already running the target
    /// program; re-selecting would knock it back to standby. The settle
    /// pauses give the firmware time to commit between steps.
    async fn converge(
        &self,
        connection: &mut CookerConnection<T>,
        observed: &DeviceStatus,
        params: &CookingParams,
    ) -> Result<()> {
        let already_selected = observed.is_on() && observed.program_id == params.program_id;
        if already_selected {
            debug!("Program {} already active, skipping selection", params.program_id);
        } else {
            connection
                .select_program(params.program_id, params.subprogram_id)
                .await?;
            sleep(self.config.select_settle).await;
        }

        connection.set_main_program(params).await?;
        sleep(self.config.set_settle).await;

        connection.turn_on().await?;
        info!("Program {} started", params.program_id);
        Ok(())
    }

    /// Drop a pending target that has outlived its TTL
    ///
    /// Replaying minutes-old cooking parameters after a long outage is
    /// worse than doing nothing.
    async fn abandon_stale_target(&self) {
        let mut target = self.target.lock().await;
        if target.is_stale(self.config.target_ttl) {
            warn!("Abandoning pending target, older than {:?}", self.config.target_ttl);
            target.reset();
        }
    }

    fn check_disposed(&self) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            Err(CookerError::Disposed)
        } else {
            Ok(())
        }
    }

    /// Choose the program to cook with
    ///
    /// Seeds the target temperature and main timer from the model's factory
    /// defaults for that program. Choosing the standby sentinel clears the
    /// target instead.
    ///
    /// # Errors
    ///
    /// [`CookerError::UnsupportedProgram`] when the model lacks the program,
    /// [`CookerError::Disposed`] after [`stop`](Self::stop).
    pub async fn set_target_program(&self, program: Program) -> Result<()> {
        self.check_disposed()?;
        let mut target = self.target.lock().await;
        if program == Program::Standby {
            target.reset();
            return Ok(());
        }
        let program_id = self
            .model
            .program_id(program)
            .ok_or_else(|| CookerError::UnsupportedProgram(program.as_str().to_string()))?;
        let defaults = self.model.defaults(program_id)?;
        target.program_id = Some(program_id);
        target.temperature = defaults.temperature;
        target.main_hours = defaults.hours;
        target.main_minutes = defaults.minutes;
        Ok(())
    }

    /// Choose the sub-program (crust, texture, ... depending on program)
    ///
    /// # Errors
    ///
    /// [`CookerError::Disposed`] after [`stop`](Self::stop).
    pub async fn set_target_subprogram(&self, subprogram_id: u8) -> Result<()> {
        self.check_disposed()?;
        self.target.lock().await.subprogram_id = subprogram_id;
        Ok(())
    }

    /// Override the target temperature
    ///
    /// # Errors
    ///
    /// [`CookerError::Disposed`] after [`stop`](Self::stop).
    pub async fn set_target_temperature(&self, temperature: u8) -> Result<()> {
        self.check_disposed()?;
        self.target.lock().await.temperature = temperature;
        Ok(())
    }

    /// Set the main cooking timer, clamped to a valid 24h clock
    ///
    /// # Errors
    ///
    /// [`CookerError::Disposed`] after [`stop`](Self::stop).
    pub async fn set_main_time(&self, hours: u8, minutes: u8) -> Result<()> {
        self.check_disposed()?;
        self.target.lock().await.set_main_time(hours, minutes);
        Ok(())
    }

    /// Set the delayed start offset, clamped to a valid 24h clock
    ///
    /// # Errors
    ///
    /// [`CookerError::Disposed`] after [`stop`](Self::stop).
    pub async fn set_delayed_start(&self, hours: u8, minutes: u8) -> Result<()> {
        self.check_disposed()?;
        self.target.lock().await.set_delayed_start(hours, minutes);
        Ok(())
    }

    /// Enable or disable keep-warm after cooking
    ///
    /// # Errors
    ///
    /// [`CookerError::Disposed`] after [`stop`](Self::stop).
    pub async fn set_auto_warm(&self, enabled: bool) -> Result<()> {
        self.check_disposed()?;
        self.target.lock().await.auto_warm = enabled;
        Ok(())
    }

    /// Push the accumulated target to the device and start cooking
    ///
    /// A no-op when no program is chosen or the target resolves to standby.
    /// Runs a single poll cycle without the timer loop's retries; a failed
    /// start leaves the target pending for the next scheduled poll.
    /// Returns whether the device confirmed the start.
    pub async fn start(&self) -> bool {
        {
            let mut target = self.target.lock().await;
            match target.program_id {
                None => {
                    debug!("Nothing to start, no target program");
                    return false;
                }
                Some(_) => target.mark_pending(),
            }
        }
        self.poll(1, true).await
    }

    /// Start with a delayed launch after the given offset
    ///
    /// Returns whether the device confirmed the start.
    pub async fn start_delayed(&self, hours: u8, minutes: u8) -> bool {
        if self.set_delayed_start(hours, minutes).await.is_err() {
            return false;
        }
        self.start().await
    }

    /// Turn the cooker off and drop any pending target
    ///
    /// Runs out of band, without touching the poll statistics.
    ///
    /// # Errors
    ///
    /// Channel and command errors from the turn-off exchange.
    pub async fn stop_cooking(&self) -> Result<()> {
        self.check_disposed()?;
        let mut connection = self.connection.lock().await;
        connection.connect_if_needed().await?;
        connection.turn_off().await?;
        self.target.lock().await.reset();
        connection.disconnect_if_needed().await;
        info!("Cooking stopped");
        Ok(())
    }

    /// Dispose of the handle; idempotent, every later operation fails fast
    pub async fn stop(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.connection.lock().await.stop().await;
    }

    /// Watch channel carrying the status snapshot published after each poll
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<DeviceStatus>> {
        self.status_tx.subscribe()
    }

    /// Whether the device is reachable and the pairing key is accepted
    pub async fn available(&self) -> bool {
        let connection = self.connection.lock().await;
        connection.last_connect_ok() && connection.last_auth_ok()
    }

    /// Whether the transport link is currently up
    pub async fn connected(&self) -> bool {
        self.connection.lock().await.connected().await
    }

    /// Firmware version, once fetched during the handshake
    pub async fn sw_version(&self) -> Option<String> {
        self.connection
            .lock()
            .await
            .sw_version()
            .map(str::to_string)
    }

    /// Poll success percentage over the recent window
    pub async fn success_rate(&self) -> u8 {
        self.stats.lock().await.success_rate()
    }

    /// Last decoded status snapshot; survives failed polls unchanged
    pub async fn status(&self) -> Option<DeviceStatus> {
        self.status.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{self, Command};
    use crate::transport::mock::MockTransport;
    use std::sync::{Arc, Mutex as StdMutex};
    use std::time::Duration;

    fn frame(seq: u8, command: Command, payload: &[u8]) -> Vec<u8> {
        protocol::encode(seq, command, payload).to_vec()
    }

    fn standby_status() -> [u8; 16] {
        // Program 0 (standby on family 0), device off
        [0, 0, 0, 0, 0, 0, 0, 0, 0x00, 1, 0, 0, 0, 0, 0, 0]
    }

    fn soup_status() -> [u8; 16] {
        [9, 0, 99, 1, 0, 0, 0, 0, 0x05, 1, 0, 0, 0, 0, 0, 0]
    }

    /// Scripted cooker: answers the handshake, tracks power state, and logs
    /// the order of state-changing commands
    fn scripted_cooker(
        log: Arc<StdMutex<Vec<u8>>>,
    ) -> Box<dyn FnMut(u8, u8, &[u8]) -> Vec<Vec<u8>> + Send + Sync> {
        let mut cooking = false;
        Box::new(move |seq, cmd, _| match Command::from_u8(cmd) {
            Some(Command::Auth) => vec![frame(seq, Command::Auth, &[1])],
            Some(Command::GetVersion) => vec![frame(seq, Command::GetVersion, &[3, 16])],
            Some(Command::SyncTime) => vec![frame(seq, Command::SyncTime, &[0])],
            Some(Command::GetStatus) => {
                let payload = if cooking { soup_status() } else { standby_status() };
                vec![frame(seq, Command::GetStatus, &payload)]
            }
            Some(Command::SelectProgram | Command::SetMainProgram) => {
                log.lock().unwrap().push(cmd);
                vec![frame(seq, cmd_of(cmd), &[1])]
            }
            Some(Command::TurnOn) => {
                log.lock().unwrap().push(cmd);
                cooking = true;
                vec![frame(seq, Command::TurnOn, &[1])]
            }
            Some(Command::TurnOff) => {
                log.lock().unwrap().push(cmd);
                cooking = false;
                vec![frame(seq, Command::TurnOff, &[1])]
            }
            _ => Vec::new(),
        })
    }

    fn cmd_of(code: u8) -> Command {
        Command::from_u8(code).unwrap()
    }

    fn device(mock: MockTransport) -> CookerDevice<MockTransport> {
        let config = CookerConfig::new("RMC-M800S", [1, 2, 3, 4, 5, 6, 7, 8]);
        CookerDevice::new(mock, config).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_refreshes_status() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let device = device(MockTransport::new(scripted_cooker(log)));

        assert!(device.status().await.is_none());
        assert!(device.poll(3, false).await);

        let status = device.status().await.unwrap();
        assert_eq!(status.program, Program::Standby);
        assert!(!status.is_on());
        assert_eq!(device.success_rate().await, 100);
        assert!(device.available().await);
        assert_eq!(device.sw_version().await.as_deref(), Some("3.16"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_bound_records_each_failure() {
        let mut mock = MockTransport::new(Box::new(|_, _, _| Vec::new()));
        mock.fail_connects = 10;
        let device = device(mock);

        let started = tokio::time::Instant::now();
        assert!(!device.poll(3, false).await);

        assert_eq!(device.stats.lock().await.len(), 3);
        assert_eq!(device.success_rate().await, 0);
        // Two backoff pauses between three attempts
        assert_eq!(started.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_converges_from_standby() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let device = device(MockTransport::new(scripted_cooker(Arc::clone(&log))));

        device.set_target_program(Program::Soup).await.unwrap();
        device.set_main_time(1, 30).await.unwrap();
        assert!(device.start().await);

        // select, then parameters, then power on
        assert_eq!(
            log.lock().unwrap().as_slice(),
            &[
                Command::SelectProgram.code(),
                Command::SetMainProgram.code(),
                Command::TurnOn.code(),
            ]
        );
        // Target cleared once the device confirmed
        assert!(!device.target.lock().await.is_pending());
        assert_eq!(device.target.lock().await.program_id, None);

        // Next poll observes the running program
        assert!(device.poll(3, false).await);
        let status = device.status().await.unwrap();
        assert_eq!(status.program, Program::Soup);
        assert!(status.is_on());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_skips_select_when_already_running() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let mut responder = scripted_cooker(Arc::clone(&log));
        // Warm the script up to the cooking state
        let device = device(MockTransport::new(Box::new(move |seq, cmd, payload| {
            responder(seq, cmd, payload)
        })));

        device.set_target_program(Program::Soup).await.unwrap();
        assert!(device.start().await);
        log.lock().unwrap().clear();

        // Same program again while the device reports it running
        device.set_target_program(Program::Soup).await.unwrap();
        assert!(device.start().await);
        assert_eq!(
            log.lock().unwrap().as_slice(),
            &[Command::SetMainProgram.code(), Command::TurnOn.code()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_standby_target_is_never_sent() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let device = device(MockTransport::new(scripted_cooker(Arc::clone(&log))));

        device.set_target_program(Program::Soup).await.unwrap();
        device.set_target_program(Program::Standby).await.unwrap();
        assert!(!device.start().await);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_target_abandoned_after_failure() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let mut mock = MockTransport::new(scripted_cooker(Arc::clone(&log)));
        mock.fail_connects = 1;
        let device = device(mock);

        device.set_target_program(Program::Soup).await.unwrap();
        device.target.lock().await.mark_pending();
        tokio::time::advance(Duration::from_secs(31)).await;

        // First attempt fails, the outdated target is dropped, the retry
        // then succeeds with nothing left to push
        assert!(device.poll(3, false).await);
        assert!(!device.target.lock().await.is_pending());
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_setter_completes_while_poll_holds_the_connection() {
        // Silent device: connect succeeds, every command runs out the clock,
        // so the poll sits on the connection lock for several seconds
        let device = Arc::new(device(MockTransport::new(Box::new(|_, _, _| Vec::new()))));

        let poller = Arc::clone(&device);
        let poll_task = tokio::spawn(async move { poller.poll(3, false).await });
        // Let the poll take the connection lock and park in its receive window
        tokio::time::sleep(Duration::from_millis(10)).await;

        let result = tokio::time::timeout(
            Duration::from_secs(60),
            device.set_target_program(Program::Soup),
        )
        .await;
        assert!(result.is_ok(), "setter blocked behind an in-flight poll");
        result.unwrap().unwrap();

        assert!(!poll_task.await.unwrap());
        assert_eq!(device.target.lock().await.program_id, Some(9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_failure_does_not_retry() {
        let mut mock = MockTransport::new(Box::new(|_, _, _| Vec::new()));
        mock.fail_connects = 5;
        let device = device(mock);

        device.set_target_program(Program::Soup).await.unwrap();
        let started = tokio::time::Instant::now();
        assert!(!device.start().await);

        // One attempt, one recorded failure, no backoff pause
        assert_eq!(device.stats.lock().await.len(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
        // The target stays pending for the next scheduled poll to push
        assert!(device.target.lock().await.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_skips_statistics() {
        let mock = MockTransport::new(Box::new(|seq, cmd, _| {
            if cmd == Command::Auth.code() {
                vec![frame(seq, Command::Auth, &[0])]
            } else {
                Vec::new()
            }
        }));
        let device = device(mock);

        assert!(!device.poll(3, false).await);
        assert!(device.stats.lock().await.is_empty());
        assert!(!device.available().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cooking_resets_target() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let device = device(MockTransport::new(scripted_cooker(Arc::clone(&log))));

        device.set_target_program(Program::Soup).await.unwrap();
        tokio_test::assert_ok!(device.stop_cooking().await);

        assert_eq!(log.lock().unwrap().as_slice(), &[Command::TurnOff.code()]);
        assert_eq!(device.target.lock().await.program_id, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disposed_handle_fails_fast() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let device = device(MockTransport::new(scripted_cooker(log)));

        device.stop().await;
        device.stop().await; // idempotent

        assert!(!device.poll(3, false).await);
        assert!(matches!(
            device.set_target_program(Program::Soup).await,
            Err(CookerError::Disposed)
        ));
        assert!(matches!(
            device.stop_cooking().await,
            Err(CookerError::Disposed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_publishes_after_poll() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let device = device(MockTransport::new(scripted_cooker(log)));
        let mut rx = device.subscribe();

        assert!(rx.borrow().is_none());
        assert!(device.poll(3, false).await);
        assert!(rx.has_changed().unwrap());
        assert_eq!(
            rx.borrow_and_update().as_ref().map(|s| s.program),
            Some(Program::Standby)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_program_rejected() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let device = device(MockTransport::new(scripted_cooker(log)));

        // Galantine only exists on family 2
        assert!(matches!(
            device.set_target_program(Program::Galantine).await,
            Err(CookerError::UnsupportedProgram(_))
        ));
    }
}
