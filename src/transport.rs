use async_trait::async_trait;
use btleplug::{
    api::{Characteristic, Peripheral as _, WriteType},
    platform::Peripheral,
};
use futures::stream::StreamExt;
use std::time::Duration;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::timeout,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    error::{CookerError, Result},
    COOKER_RX_CHAR_UUID, COOKER_SERVICE_UUID, COOKER_TX_CHAR_UUID,
};

/// Byte-level link to a cooker
///
/// The command layer is written against this trait so the protocol logic can
/// be exercised without Bluetooth hardware. [`BleTransport`] is the
/// production implementation.
#[async_trait]
pub trait Transport: Send {
    /// Bring the link up, bounded by `timeout`
    async fn connect(&mut self, timeout: Duration) -> Result<()>;

    /// Tear the link down; must be safe to call when already down
    async fn disconnect(&mut self) -> Result<()>;

    /// Whether the link is currently up
    async fn is_connected(&self) -> bool;

    /// Write one raw frame
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Next notification payload, or [`CookerError::Timeout`] after `window`
    async fn recv(&mut self, window: Duration) -> Result<Vec<u8>>;
}

/// Production transport over a host-discovered BLE peripheral
///
/// Scanning and pairing stay with the host; this type only drives an
/// already-known peripheral through the Nordic-UART-style service the
/// cooker exposes.
pub struct BleTransport {
    peripheral: Peripheral,
    write_char: Option<Characteristic>,
    notifications: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
    forward_task: Option<JoinHandle<()>>,
}

impl BleTransport {
    /// Wrap a peripheral handed over by the host's discovery layer
    #[must_use]
    pub fn new(peripheral: Peripheral) -> Self {
        Self {
            peripheral,
            write_char: None,
            notifications: None,
            forward_task: None,
        }
    }

    fn parse_uuid(text: &str) -> Result<Uuid> {
        Uuid::parse_str(text).map_err(|e| CookerError::Protocol(format!("Invalid UUID: {e}")))
    }

    /// Drop per-connection resources so a reconnect starts from scratch
    ///
    /// Stale subscriptions and receivers otherwise pile up across
    /// reconnects and eventually exhaust the adapter's connection slots.
    fn clear_session(&mut self) {
        if let Some(task) = self.forward_task.take() {
            task.abort();
        }
        self.notifications = None;
        self.write_char = None;
    }
}

#[async_trait]
impl Transport for BleTransport {
    async fn connect(&mut self, connect_timeout: Duration) -> Result<()> {
        self.clear_session();
        if self.peripheral.is_connected().await.unwrap_or(false) {
            debug!("Link reported up before connect, cycling it");
            let _ = self.peripheral.disconnect().await;
        }

        timeout(connect_timeout, self.peripheral.connect())
            .await
            .map_err(|_| CookerError::Timeout {
                timeout_ms: connect_timeout.as_millis() as u64,
            })?
            .map_err(|e| CookerError::ConnectionFailed(e.to_string()))?;

        self.peripheral.discover_services().await?;

        let service_uuid = Self::parse_uuid(COOKER_SERVICE_UUID)?;
        let tx_uuid = Self::parse_uuid(COOKER_TX_CHAR_UUID)?;
        let rx_uuid = Self::parse_uuid(COOKER_RX_CHAR_UUID)?;

        let services = self.peripheral.services();
        let service = services
            .iter()
            .find(|s| s.uuid == service_uuid)
            .ok_or_else(|| CookerError::Protocol("UART service not found".to_string()))?;

        let write_char = service
            .characteristics
            .iter()
            .find(|c| c.uuid == tx_uuid)
            .ok_or_else(|| CookerError::Protocol("Write characteristic not found".to_string()))?
            .clone();

        let notify_char = service
            .characteristics
            .iter()
            .find(|c| c.uuid == rx_uuid)
            .ok_or_else(|| CookerError::Protocol("Notify characteristic not found".to_string()))?
            .clone();

        self.peripheral.subscribe(&notify_char).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut stream = self.peripheral.notifications().await?;
        let notify_uuid = notify_char.uuid;
        self.forward_task = Some(tokio::spawn(async move {
            while let Some(data) = stream.next().await {
                if data.uuid == notify_uuid && tx.send(data.value).is_err() {
                    break;
                }
            }
        }));

        self.write_char = Some(write_char);
        self.notifications = Some(rx);
        debug!("Transport connected and subscribed");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.clear_session();
        if self.peripheral.is_connected().await.unwrap_or(false) {
            if let Err(e) = self.peripheral.disconnect().await {
                warn!("Disconnect failed: {e}");
                return Err(e.into());
            }
        }
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.write_char.is_some() && self.peripheral.is_connected().await.unwrap_or(false)
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let write_char = self.write_char.as_ref().ok_or(CookerError::NotConnected)?;
        debug!("TX {:02X?}", data);
        self.peripheral
            .write(write_char, data, WriteType::WithoutResponse)
            .await?;
        Ok(())
    }

    async fn recv(&mut self, window: Duration) -> Result<Vec<u8>> {
        let rx = self.notifications.as_mut().ok_or(CookerError::NotConnected)?;
        let data = timeout(window, rx.recv())
            .await
            .map_err(|_| CookerError::Timeout {
                timeout_ms: window.as_millis() as u64,
            })?
            .ok_or(CookerError::NotConnected)?;
        debug!("RX {:02X?}", data);
        Ok(data)
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use crate::protocol;
    use std::collections::VecDeque;

    /// Scripted response generator: (seq, command, payload) -> raw frames
    pub(crate) type Responder = Box<dyn FnMut(u8, u8, &[u8]) -> Vec<Vec<u8>> + Send + Sync>;

    /// In-memory transport with a scripted device on the other end
    pub(crate) struct MockTransport {
        connected: bool,
        /// Number of upcoming connect calls that should fail
        pub fail_connects: u32,
        responder: Responder,
        pending: VecDeque<Vec<u8>>,
        /// Raw frames written by the code under test
        pub writes: Vec<Vec<u8>>,
        /// Connect call count
        pub connects: u32,
        /// Disconnect call count
        pub disconnects: u32,
    }

    impl MockTransport {
        pub(crate) fn new(responder: Responder) -> Self {
            Self {
                connected: false,
                fail_connects: 0,
                responder,
                pending: VecDeque::new(),
                writes: Vec::new(),
                connects: 0,
                disconnects: 0,
            }
        }

        /// Queue a raw frame as if the device pushed it unprompted
        pub(crate) fn push_notification(&mut self, frame: Vec<u8>) {
            self.pending.push_back(frame);
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn connect(&mut self, _timeout: Duration) -> Result<()> {
            self.connects += 1;
            if self.fail_connects > 0 {
                self.fail_connects -= 1;
                return Err(CookerError::ConnectionFailed("scripted failure".to_string()));
            }
            self.connected = true;
            Ok(())
        }

        async fn disconnect(&mut self) -> Result<()> {
            self.disconnects += 1;
            self.connected = false;
            self.pending.clear();
            Ok(())
        }

        async fn is_connected(&self) -> bool {
            self.connected
        }

        async fn write(&mut self, data: &[u8]) -> Result<()> {
            if !self.connected {
                return Err(CookerError::NotConnected);
            }
            self.writes.push(data.to_vec());
            let frame = protocol::decode(data)?;
            let replies = (self.responder)(frame.seq, frame.command, &frame.payload);
            self.pending.extend(replies);
            Ok(())
        }

        async fn recv(&mut self, window: Duration) -> Result<Vec<u8>> {
            if !self.connected {
                return Err(CookerError::NotConnected);
            }
            if let Some(frame) = self.pending.pop_front() {
                return Ok(frame);
            }
            // Nothing queued: burn the window like real hardware would
            tokio::time::sleep(window).await;
            Err(CookerError::Timeout {
                timeout_ms: window.as_millis() as u64,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_times_out_when_silent() {
        let mut mock = MockTransport::new(Box::new(|_, _, _| Vec::new()));
        mock.connect(Duration::from_secs(10)).await.unwrap();
        mock.write(&protocol::encode(1, protocol::Command::GetStatus, &[]))
            .await
            .unwrap();
        let err = mock.recv(Duration::from_millis(1500)).await.unwrap_err();
        assert!(matches!(err, CookerError::Timeout { timeout_ms: 1500 }));
    }
}
