//! Transport connector: builds the TLS MQTT link and pumps its event loop.
//!
//! The pump goes through two phases:
//!
//! ```text
//! Handshaking ──CONNACK──► Streaming ──error / DISCONNECT / cancel──► (done)
//!      │
//!      └── refused / TLS error / timeout ──► (done)
//! ```
//!
//! Every outcome is reported as a [`TransportEvent`]. The pump never polls
//! again after the link fails, so rumqttc's built-in reconnect never runs;
//! reconnecting is the caller's decision.

use super::config::MqttConfig;
use super::events::TransportEvent;
use super::message::InboundMessage;
use super::tls;
use crate::config::ConnectionIdentity;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet,
    SubscribeReasonCode,
};
use statum::{machine, state};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

pub fn mqtt_options(identity: &ConnectionIdentity, config: &MqttConfig) -> MqttOptions {
    let mut options = MqttOptions::new(
        config.client_id_for(&identity.serial),
        identity.host.clone(),
        config.port,
    );
    options
        .set_credentials(config.username.clone(), identity.access_code.clone())
        .set_keep_alive(config.keep_alive())
        .set_clean_session(true)
        .set_max_packet_size(config.max_packet_size, config.max_packet_size)
        .set_transport(tls::transport());
    options
}

/// Creates the client handle and the (not yet running) event pump.
pub fn open(
    identity: &ConnectionIdentity,
    config: &MqttConfig,
    events: mpsc::Sender<TransportEvent>,
    cancel: CancellationToken,
) -> (AsyncClient, EventPump<Handshaking>) {
    let (client, mut eventloop) =
        AsyncClient::new(mqtt_options(identity, config), config.channel_capacity);
    // rumqttc caps TCP + TLS + CONNACK at 5 s unless told otherwise
    eventloop
        .network_options
        .set_connection_timeout(config.connect_timeout_secs);
    let pump = EventPump::create(eventloop, events, cancel, config.connect_timeout());
    (client, pump)
}

#[state]
#[derive(Debug, Clone)]
pub enum PumpPhase {
    Handshaking,
    Streaming,
}

#[machine]
pub struct EventPump<S: PumpPhase> {
    eventloop: EventLoop,
    events: mpsc::Sender<TransportEvent>,
    cancel: CancellationToken,
    handshake_timeout: Duration,
}

impl EventPump<Handshaking> {
    pub fn create(
        eventloop: EventLoop,
        events: mpsc::Sender<TransportEvent>,
        cancel: CancellationToken,
        handshake_timeout: Duration,
    ) -> Self {
        Self::new(eventloop, events, cancel, handshake_timeout)
    }

    /// Drives the connect until CONNACK. Returns `None` once the failure
    /// has been reported, or when cancelled.
    pub async fn handshake(mut self) -> Option<EventPump<Streaming>> {
        let deadline = Instant::now() + self.handshake_timeout;
        loop {
            let polled = tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("Handshake cancelled");
                    return None;
                }
                polled = tokio::time::timeout_at(deadline, self.eventloop.poll()) => polled,
            };

            let reason = match polled {
                Ok(Ok(Event::Incoming(Packet::ConnAck(ack)))) => {
                    if ack.code == ConnectReturnCode::Success {
                        info!("MQTT_EVENT_CONNECTED");
                        emit(&self.events, TransportEvent::Connected).await;
                        return Some(self.transition());
                    }
                    format!("broker refused connection: {:?}", ack.code)
                }
                Ok(Ok(event)) => {
                    trace!("Handshake event: {:?}", event);
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("no CONNACK within {:?}", self.handshake_timeout),
            };

            error!("Connection failed: {}", reason);
            emit(&self.events, TransportEvent::ConnectFailed { reason }).await;
            return None;
        }
    }
}

impl EventPump<Streaming> {
    pub async fn run(mut self) {
        loop {
            let polled = tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("Event pump cancelled");
                    break;
                }
                polled = self.eventloop.poll() => polled,
            };

            match polled {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let message = InboundMessage::new(publish.topic, publish.payload.to_vec());
                    emit(&self.events, TransportEvent::Message(message)).await;
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    let granted = ack
                        .return_codes
                        .iter()
                        .all(|code| !matches!(code, SubscribeReasonCode::Failure));
                    let event = TransportEvent::Subscribed {
                        pkid: ack.pkid,
                        granted,
                    };
                    emit(&self.events, event).await;
                }
                Ok(Event::Incoming(Packet::PubAck(ack))) => {
                    debug!("Publish acknowledged, pkid={}", ack.pkid);
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    info!("MQTT_EVENT_DISCONNECTED");
                    let reason = "broker sent DISCONNECT".to_string();
                    emit(&self.events, TransportEvent::Disconnected { reason }).await;
                    break;
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    info!("Sent DISCONNECT to broker");
                    break;
                }
                Ok(event) => trace!("Transport event: {:?}", event),
                Err(e) => {
                    warn!("MQTT connection lost: {}", e);
                    let reason = e.to_string();
                    emit(&self.events, TransportEvent::Disconnected { reason }).await;
                    break;
                }
            }
        }
        debug!("Event pump stopped");
    }
}

async fn emit(events: &mpsc::Sender<TransportEvent>, event: TransportEvent) {
    if events.send(event).await.is_err() {
        debug!("Session driver gone, dropping transport event");
    }
}

/// Runs a pump through both phases.
pub async fn drive(pump: EventPump<Handshaking>) {
    if let Some(streaming) = pump.handshake().await {
        streaming.run().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::Transport;

    fn identity() -> ConnectionIdentity {
        ConnectionIdentity::new("192.168.1.199", "56154859", "03919D530105226")
    }

    #[test]
    fn options_carry_identity_and_policy() {
        let options = mqtt_options(&identity(), &MqttConfig::default());

        assert_eq!(
            options.broker_address(),
            ("192.168.1.199".to_string(), 8883)
        );
        assert_eq!(options.client_id(), "printlink-03919D530105226");
        assert_eq!(
            options.credentials(),
            Some(("bblp".to_string(), "56154859".to_string()))
        );
        assert_eq!(options.keep_alive(), Duration::from_secs(120));
        assert!(matches!(options.transport(), Transport::Tls(_)));
    }

    #[tokio::test]
    async fn refused_connection_reports_connect_failed() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = MqttConfig {
            port,
            ..MqttConfig::default()
        };
        let identity = ConnectionIdentity::new("127.0.0.1", "code", "S");
        let (tx, mut rx) = mpsc::channel(8);
        let (_client, pump) = open(&identity, &config, tx, CancellationToken::new());

        assert!(pump.handshake().await.is_none());
        assert!(matches!(
            rx.recv().await,
            Some(TransportEvent::ConnectFailed { .. })
        ));
    }

    #[tokio::test]
    async fn silent_peer_hits_handshake_timeout() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let config = MqttConfig {
            port,
            connect_timeout_secs: 1,
            ..MqttConfig::default()
        };
        let identity = ConnectionIdentity::new("127.0.0.1", "code", "S");
        let (tx, mut rx) = mpsc::channel(8);
        let (_client, pump) = open(&identity, &config, tx, CancellationToken::new());

        assert!(pump.handshake().await.is_none());
        match rx.recv().await {
            Some(TransportEvent::ConnectFailed { reason }) => {
                assert!(reason.contains("no CONNACK"), "unexpected reason: {}", reason)
            }
            other => panic!("expected ConnectFailed, got {:?}", other),
        }
        drop(listener);
    }

    #[tokio::test]
    async fn handshake_waits_for_configured_timeout() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let config = MqttConfig {
            port,
            connect_timeout_secs: 10,
            ..MqttConfig::default()
        };
        let identity = ConnectionIdentity::new("127.0.0.1", "code", "S");
        let (tx, mut rx) = mpsc::channel(8);
        let (_client, pump) = open(&identity, &config, tx, CancellationToken::new());

        // past rumqttc's own 5 s default, still handshaking
        let still_waiting = tokio::time::timeout(Duration::from_secs(6), pump.handshake()).await;
        assert!(still_waiting.is_err());
        assert!(rx.try_recv().is_err());
        drop(listener);
    }

    #[tokio::test]
    async fn cancelled_handshake_stays_silent() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let config = MqttConfig {
            port,
            ..MqttConfig::default()
        };
        let identity = ConnectionIdentity::new("127.0.0.1", "code", "S");
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let (_client, pump) = open(&identity, &config, tx, cancel.clone());

        cancel.cancel();
        assert!(pump.handshake().await.is_none());
        assert!(rx.recv().await.is_none());
        drop(listener);
    }
}
