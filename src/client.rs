//! The caller-facing client for one printer.
//!
//! ```text
//!                 ┌────────────── PrinterClient ───────────────┐
//!  start/stop ──► │ ActiveLink                                 │
//!  publish ─────► │   AsyncClient ──► rumqttc request queue    │
//!                 │   pump task:   EventLoop ─► TransportEvent │──┐
//!                 │   driver task: SessionMachine + ingest  ◄──│──┘
//!  get_status ◄── │ watch<DeviceStatus>                        │
//!  is_connected ◄─│ watch<SessionState>                        │
//!                 └────────────────────────────────────────────┘
//! ```

use crate::config::ClientConfig;
use crate::ingest::{IngestPipeline, StatusCallback};
use crate::logging::LogSink;
use crate::mqtt::session::{SessionDriver, SessionEvent, SessionMachine, SessionState};
use crate::mqtt::transport;
use crate::persistence::MessageArchive;
use crate::status::DeviceStatus;
use rumqttc::{AsyncClient, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long `stop` waits for the DISCONNECT to go out before cutting the link.
const DISCONNECT_GRACE: Duration = Duration::from_secs(5);

pub struct PrinterClient {
    config: ClientConfig,
    archive: MessageArchive,
    machine: SessionMachine,
    status: Arc<watch::Sender<DeviceStatus>>,
    callback: Option<StatusCallback>,
    log: LogSink,
    link: Option<ActiveLink>,
}

/// Everything that exists only between `start` and `stop`.
struct ActiveLink {
    client: AsyncClient,
    cancel: CancellationToken,
    pump: JoinHandle<()>,
    driver: JoinHandle<()>,
}

impl ActiveLink {
    async fn shutdown(self, graceful: bool) {
        let mut pump = self.pump;
        let mut pump_done = false;

        if graceful {
            match self.client.try_disconnect() {
                Ok(()) => match tokio::time::timeout(DISCONNECT_GRACE, &mut pump).await {
                    Ok(_) => pump_done = true,
                    Err(_) => warn!("DISCONNECT not flushed within {:?}", DISCONNECT_GRACE),
                },
                Err(e) => warn!("Failed to request DISCONNECT: {}", e),
            }
        }

        self.cancel.cancel();
        if !pump_done {
            if let Err(e) = pump.await {
                warn!("Event pump task ended abnormally: {}", e);
            }
        }
        // the driver drains whatever the pump sent before it stopped
        if let Err(e) = self.driver.await {
            warn!("Session driver task ended abnormally: {}", e);
        }
    }
}

impl PrinterClient {
    pub fn new(config: ClientConfig) -> Self {
        let archive = MessageArchive::new(config.storage.data_root.clone());
        let log = LogSink::current(&config.printer.serial);
        let (status, _) = watch::channel(DeviceStatus::default());

        Self {
            config,
            archive,
            machine: SessionMachine::new(),
            status: Arc::new(status),
            callback: None,
            log,
            link: None,
        }
    }

    pub fn with_log_sink(mut self, log: LogSink) -> Self {
        self.log = log;
        self
    }

    /// Called from the session task after every decoded report.
    pub fn with_status_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&DeviceStatus) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn archive(&self) -> &MessageArchive {
        &self.archive
    }

    /// Begins connecting and returns without waiting for the outcome.
    ///
    /// Ignored while connecting or connected. After `Error` or an unsolicited
    /// disconnect the old link is torn down and a fresh one is opened.
    pub async fn start(&mut self) {
        let log = self.log.clone();
        log.scope(self.open_link()).await
    }

    async fn open_link(&mut self) {
        let state = self.machine.current();
        if matches!(state, SessionState::Connecting | SessionState::Connected) {
            info!("MQTT client already started ({:?})", state);
            return;
        }
        if let Some(stale) = self.link.take() {
            debug!("Releasing previous link before reconnecting");
            stale.shutdown(false).await;
        }
        if self.machine.apply(SessionEvent::Start).is_none() {
            return;
        }

        if let Err(e) = self.config.validate() {
            error!("Failed to initialize MQTT client: {}", e);
            self.machine.apply(SessionEvent::TransportFailed);
            return;
        }

        let printer = &self.config.printer;
        info!(
            "Connecting to mqtts://{}:{} as {}",
            printer.host, self.config.mqtt.port, self.config.mqtt.username
        );

        let (events_tx, events_rx) = mpsc::channel(self.config.mqtt.channel_capacity);
        let cancel = CancellationToken::new();
        let (client, pump) =
            transport::open(printer, &self.config.mqtt, events_tx, cancel.clone());

        let pipeline = IngestPipeline::new(
            printer.serial.as_str(),
            self.archive.clone(),
            self.status.clone(),
        )
        .with_callback(self.callback.clone());
        let driver = SessionDriver::new(
            self.machine.clone(),
            client.clone(),
            printer.report_topic(),
            pipeline,
            events_rx,
        );

        let pump = tokio::spawn(self.log.scope(transport::drive(pump)));
        let driver = tokio::spawn(self.log.scope(driver.run()));
        self.link = Some(ActiveLink {
            client,
            cancel,
            pump,
            driver,
        });
        info!("MQTT client started");
    }

    /// Disconnects and waits for both background tasks. Always ends in
    /// `Disconnected`; calling it twice is harmless.
    pub async fn stop(&mut self) {
        let log = self.log.clone();
        log.scope(self.close_link()).await
    }

    async fn close_link(&mut self) {
        match self.link.take() {
            Some(link) => {
                let graceful = self.machine.current() == SessionState::Connected;
                link.shutdown(graceful).await;
                info!("MQTT client stopped");
            }
            None => debug!("Stop requested without an active link"),
        }
        self.machine.apply(SessionEvent::Stop);
    }

    /// Queues `message` for the report topic at QoS 1.
    ///
    /// `false` means it was never handed to the transport: no link, or the
    /// link is already gone. `true` does not mean the printer got it.
    pub async fn publish(&self, message: impl Into<String>) -> bool {
        let message = message.into();
        self.log.scope(self.enqueue(message)).await
    }

    async fn enqueue(&self, message: String) -> bool {
        let Some(link) = &self.link else {
            error!("MQTT client not connected");
            return false;
        };

        let topic = self.config.printer.report_topic();
        match link
            .client
            .publish(topic.as_str(), QoS::AtLeastOnce, false, message.into_bytes())
            .await
        {
            Ok(()) => {
                info!("Published message to {}", topic);
                true
            }
            Err(e) => {
                error!("Failed to publish message: {}", e);
                false
            }
        }
    }

    pub fn get_status(&self) -> DeviceStatus {
        self.status.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.machine.current() == SessionState::Connected
    }

    pub fn session_state(&self) -> SessionState {
        self.machine.current()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.machine.subscribe()
    }

    pub fn watch_status(&self) -> watch::Receiver<DeviceStatus> {
        self.status.subscribe()
    }
}

impl Drop for PrinterClient {
    fn drop(&mut self) {
        if let Some(link) = &self.link {
            link.cancel.cancel();
        }
    }
}
