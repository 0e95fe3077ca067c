//! Session state machine and the driver task that feeds it.
//!
//! ```text
//!                 start                 CONNACK
//! Disconnected ─────────► Connecting ─────────► Connected
//!      ▲  ▲                   │                     │
//!      │  │                   │ connect failure     │ transport lost
//!      │  │                   ▼                     │
//!      │  └──── start ──── Error                    │
//!      └────────────────────────────────────────────┘
//!
//! stop: any state ─► Disconnected
//! ```
//!
//! Nothing here retries. `Error` is left only through another `start`.

use super::events::TransportEvent;
use crate::ingest::IngestPipeline;
use rumqttc::{AsyncClient, QoS};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    Start,
    TransportConnected,
    TransportFailed,
    TransportDisconnected,
    Stop,
}

impl SessionState {
    /// Transition table. `None` means the event does not apply in this state.
    pub fn next(self, event: SessionEvent) -> Option<SessionState> {
        use SessionEvent::*;
        use SessionState::*;

        match (self, event) {
            (_, Stop) => Some(Disconnected),
            (Disconnected | Error, Start) => Some(Connecting),
            (Connecting, TransportConnected) => Some(Connected),
            (Connecting, TransportFailed) => Some(Error),
            (Connected, TransportDisconnected) => Some(Disconnected),
            _ => None,
        }
    }
}

/// Shared handle on the current session state.
///
/// Writers go through [`SessionMachine::apply`]; readers borrow or
/// subscribe to the underlying watch channel.
#[derive(Clone, Debug)]
pub struct SessionMachine {
    state: Arc<watch::Sender<SessionState>>,
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMachine {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            state: Arc::new(state),
        }
    }

    pub fn current(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Applies `event` atomically. Returns the new state if the event moved
    /// the machine, `None` if it was ignored.
    pub fn apply(&self, event: SessionEvent) -> Option<SessionState> {
        let mut moved = None;
        self.state.send_if_modified(|current| match current.next(event) {
            Some(next) => {
                moved = Some(next);
                if next == *current {
                    return false;
                }
                debug!("Session {:?} --{:?}--> {:?}", current, event, next);
                *current = next;
                true
            }
            None => false,
        });
        moved
    }
}

/// Issues the report subscription once the link is up.
///
/// Must not wait for queue space: only the event pump drains the request
/// queue, and the pump itself may be waiting on the session driver.
pub trait ReportSubscriber: Send + Sync + 'static {
    fn subscribe_reports(&self, topic: &str) -> Result<(), String>;
}

impl ReportSubscriber for AsyncClient {
    fn subscribe_reports(&self, topic: &str) -> Result<(), String> {
        self.try_subscribe(topic, QoS::AtLeastOnce).map_err(|e| e.to_string())
    }
}

/// Background task: applies transport events to the machine and hands
/// messages to the ingest pipeline, one at a time.
pub struct SessionDriver<S: ReportSubscriber> {
    machine: SessionMachine,
    subscriber: S,
    report_topic: String,
    pipeline: IngestPipeline,
    events: mpsc::Receiver<TransportEvent>,
}

impl<S: ReportSubscriber> SessionDriver<S> {
    pub fn new(
        machine: SessionMachine,
        subscriber: S,
        report_topic: String,
        pipeline: IngestPipeline,
        events: mpsc::Receiver<TransportEvent>,
    ) -> Self {
        Self {
            machine,
            subscriber,
            report_topic,
            pipeline,
            events,
        }
    }

    /// Runs until the transport side drops its sender.
    pub async fn run(mut self) {
        while let Some(event) = self.events.recv().await {
            self.handle(event).await;
        }
        debug!("Transport event channel closed, session driver exiting");
    }

    async fn handle(&mut self, event: TransportEvent) {
        let moved = match event.session_event() {
            Some(session_event) => {
                let moved = self.machine.apply(session_event);
                match moved {
                    Some(state) => info!("Session state: {:?}", state),
                    None => debug!(
                        "Ignoring {:?} in state {:?}",
                        session_event,
                        self.machine.current()
                    ),
                }
                moved
            }
            None => None,
        };

        match event {
            TransportEvent::Connected => {
                if moved == Some(SessionState::Connected) {
                    self.subscribe_reports();
                }
            }
            TransportEvent::ConnectFailed { reason } => {
                error!("Connection failed with {}", reason);
            }
            TransportEvent::Disconnected { reason } => {
                info!("MQTT_EVENT_DISCONNECTED: {}", reason);
            }
            TransportEvent::Subscribed { pkid, granted } => {
                if granted {
                    info!("Subscribed to topic successfully, msg_id={}", pkid);
                } else {
                    error!("Broker rejected subscription to {}", self.report_topic);
                }
            }
            TransportEvent::Message(message) => {
                self.pipeline.ingest(message).await;
            }
        }
    }

    fn subscribe_reports(&self) {
        info!("Subscribing to topic: {}", self.report_topic);
        if let Err(e) = self.subscriber.subscribe_reports(&self.report_topic) {
            // the link stays usable for publishing
            warn!("Failed to subscribe to topic {}: {}", self.report_topic, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt::message::InboundMessage;
    use crate::persistence::MessageArchive;
    use crate::status::DeviceStatus;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const SERIAL: &str = "03919D530105226";

    #[derive(Clone, Default)]
    struct RecordingSubscriber {
        topics: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl ReportSubscriber for RecordingSubscriber {
        fn subscribe_reports(&self, topic: &str) -> Result<(), String> {
            self.topics.lock().unwrap().push(topic.to_string());
            if self.fail {
                Err("request channel closed".to_string())
            } else {
                Ok(())
            }
        }
    }

    struct Harness {
        machine: SessionMachine,
        status: Arc<watch::Sender<DeviceStatus>>,
        subscriber: RecordingSubscriber,
        archive: MessageArchive,
        tx: Option<mpsc::Sender<TransportEvent>>,
        driver: Option<tokio::task::JoinHandle<()>>,
        _dir: TempDir,
    }

    impl Harness {
        fn start(fail_subscribe: bool) -> Self {
            let dir = TempDir::new().unwrap();
            let archive = MessageArchive::new(dir.path());
            let machine = SessionMachine::new();
            let (status, _) = watch::channel(DeviceStatus::default());
            let status = Arc::new(status);
            let subscriber = RecordingSubscriber {
                fail: fail_subscribe,
                ..Default::default()
            };
            let pipeline = IngestPipeline::new(SERIAL, archive.clone(), status.clone());
            let (tx, rx) = mpsc::channel(16);
            let driver = SessionDriver::new(
                machine.clone(),
                subscriber.clone(),
                format!("device/{}/report", SERIAL),
                pipeline,
                rx,
            );

            machine.apply(SessionEvent::Start);
            Self {
                machine,
                status,
                subscriber,
                archive,
                tx: Some(tx),
                driver: Some(tokio::spawn(driver.run())),
                _dir: dir,
            }
        }

        async fn send(&self, event: TransportEvent) {
            self.tx.as_ref().unwrap().send(event).await.unwrap();
        }

        /// Closes the channel and waits until every event was handled.
        async fn finish(&mut self) {
            self.tx.take();
            if let Some(driver) = self.driver.take() {
                driver.await.unwrap();
            }
        }

        fn subscribed_topics(&self) -> Vec<String> {
            self.subscriber.topics.lock().unwrap().clone()
        }
    }

    #[test]
    fn transition_table() {
        use SessionEvent::*;
        use SessionState::*;

        assert_eq!(Disconnected.next(Start), Some(Connecting));
        assert_eq!(Error.next(Start), Some(Connecting));
        assert_eq!(Connecting.next(TransportConnected), Some(Connected));
        assert_eq!(Connecting.next(TransportFailed), Some(Error));
        assert_eq!(Connected.next(TransportDisconnected), Some(Disconnected));

        for state in [Disconnected, Connecting, Connected, Error] {
            assert_eq!(state.next(Stop), Some(Disconnected));
        }

        assert_eq!(Connected.next(Start), None);
        assert_eq!(Connecting.next(Start), None);
        assert_eq!(Connected.next(TransportFailed), None);
        assert_eq!(Disconnected.next(TransportConnected), None);
        assert_eq!(Error.next(TransportConnected), None);
        assert_eq!(Error.next(TransportDisconnected), None);
    }

    #[test]
    fn connect_failure_never_reaches_connected() {
        let machine = SessionMachine::new();
        machine.apply(SessionEvent::Start);
        assert_eq!(
            machine.apply(SessionEvent::TransportFailed),
            Some(SessionState::Error)
        );
        assert_eq!(machine.apply(SessionEvent::TransportConnected), None);
        assert_eq!(machine.current(), SessionState::Error);
    }

    #[test]
    fn watchers_see_transitions() {
        let machine = SessionMachine::new();
        let mut rx = machine.subscribe();
        assert!(!rx.has_changed().unwrap());

        machine.apply(SessionEvent::Start);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), SessionState::Connecting);

        // ignored events do not wake watchers
        machine.apply(SessionEvent::TransportDisconnected);
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn connect_subscribes_then_reports_update_snapshot() {
        let mut harness = Harness::start(false);
        harness.status.send_modify(|s| s.bed_temper = 35.0);
        let report = InboundMessage::new(
            format!("device/{}/report", SERIAL),
            r#"{"print":{"nozzle_temper":210.5}}"#,
        );
        let day = report.received_at.date_naive();

        harness.send(TransportEvent::Connected).await;
        harness
            .send(TransportEvent::Subscribed {
                pkid: 1,
                granted: true,
            })
            .await;
        harness.send(TransportEvent::Message(report)).await;
        harness.finish().await;

        assert_eq!(harness.machine.current(), SessionState::Connected);
        assert_eq!(
            harness.subscribed_topics(),
            vec![format!("device/{}/report", SERIAL)]
        );
        let status = harness.status.borrow().clone();
        assert_eq!(status.nozzle_temper, 210.5);
        assert_eq!(status.bed_temper, 35.0);

        let records = harness.archive.read_day(SERIAL, day).await.unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn unsolicited_disconnect_is_not_an_error() {
        let mut harness = Harness::start(false);
        harness.send(TransportEvent::Connected).await;
        harness
            .send(TransportEvent::Disconnected {
                reason: "connection reset".into(),
            })
            .await;
        harness.finish().await;

        assert_eq!(harness.machine.current(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn connect_failure_skips_subscription() {
        let mut harness = Harness::start(false);
        harness
            .send(TransportEvent::ConnectFailed {
                reason: "tls handshake eof".into(),
            })
            .await;
        harness.finish().await;

        assert_eq!(harness.machine.current(), SessionState::Error);
        assert!(harness.subscribed_topics().is_empty());
    }

    #[tokio::test]
    async fn failed_subscription_keeps_session_connected() {
        let mut harness = Harness::start(true);
        harness.send(TransportEvent::Connected).await;
        harness
            .send(TransportEvent::Subscribed {
                pkid: 1,
                granted: false,
            })
            .await;
        harness.finish().await;

        assert_eq!(harness.machine.current(), SessionState::Connected);
        assert_eq!(harness.subscribed_topics().len(), 1);
    }

    #[tokio::test]
    async fn late_connect_after_stop_is_ignored() {
        let mut harness = Harness::start(false);
        harness.machine.apply(SessionEvent::Stop);
        harness.send(TransportEvent::Connected).await;
        harness.finish().await;

        assert_eq!(harness.machine.current(), SessionState::Disconnected);
        assert!(harness.subscribed_topics().is_empty());
    }

    #[tokio::test]
    async fn full_request_queue_fails_subscription_without_waiting() {
        let options = rumqttc::MqttOptions::new("printlink-test", "127.0.0.1", 8883);
        // the event loop is kept but never polled, so the queue never drains
        let (client, _eventloop) = AsyncClient::new(options, 1);
        client
            .try_publish("device/S/report", QoS::AtLeastOnce, false, "queued")
            .unwrap();

        let result = client.subscribe_reports("device/S/report");
        assert!(result.is_err());
    }
}
