use crate::error::ApiError;
use crate::responses::ConnectionCredentials;
use chrono::Utc;
use configuration::MqttConfig;
use events::{IngestRecord, decode_payload};
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Largest frame accepted from the broker. Full-portfolio snapshots of long
/// backtests can be several megabytes.
const MAX_PACKET_BYTES: usize = 16 * 1024 * 1024;
/// Capacity of the MQTT client's outgoing request queue.
const REQUEST_QUEUE: usize = 64;
/// How long `disconnect` lets the worker flush before aborting it.
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// Subscribes to one session's position-update topic on the broker's message bus.
///
/// Each client serves exactly one backtest run. `connect` starts a background
/// receive worker which decodes every inbound frame and sends the resulting
/// records down a bounded channel; the receiving half is handed out by `new`.
/// The worker owns the only sender, so the channel closes when it stops.
/// No reconnect is attempted: a dropped connection ends the worker, and the
/// listener sees the channel close.
pub struct IngestClient {
    config: MqttConfig,
    records_tx: Option<mpsc::Sender<IngestRecord>>,
    client: Option<AsyncClient>,
    worker: Option<JoinHandle<()>>,
    topic: Option<String>,
}

impl IngestClient {
    /// Creates a disconnected client and the receiver its records arrive on.
    pub fn new(config: &MqttConfig) -> (Self, mpsc::Receiver<IngestRecord>) {
        let (records_tx, records_rx) = mpsc::channel(config.channel_capacity.max(1));
        let client = Self {
            config: config.clone(),
            records_tx: Some(records_tx),
            client: None,
            worker: None,
            topic: None,
        };
        (client, records_rx)
    }

    /// The position-update topic for a session's client id.
    pub fn topic_for(&self, client_id: &str) -> String {
        self.config.topic_template.replace("{client_id}", client_id)
    }

    pub fn is_connected(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Connects with the session's credentials and subscribes to its topic.
    ///
    /// Blocks for at most `handshake_timeout_secs` waiting for the broker to
    /// accept the connection.
    pub async fn connect(&mut self, credentials: &ConnectionCredentials) -> Result<(), ApiError> {
        if self.is_connected() {
            return Ok(());
        }
        let Some(records_tx) = self.records_tx.take() else {
            return Err(ApiError::Mqtt(
                "ingest client already used; create a new one per run".to_string(),
            ));
        };

        let topic = self.topic_for(&credentials.client_id);
        let mut options = MqttOptions::new(
            credentials.client_id.clone(),
            self.config.host.clone(),
            self.config.port,
        );
        options.set_keep_alive(Duration::from_secs(self.config.keep_alive_secs.max(5)));
        options.set_credentials(credentials.username.clone(), credentials.password.clone());
        options.set_max_packet_size(MAX_PACKET_BYTES, MAX_PACKET_BYTES);

        let (client, eventloop) = AsyncClient::new(options, REQUEST_QUEUE);
        let (ready_tx, ready_rx) = oneshot::channel();
        let worker = tokio::spawn(run_worker(
            eventloop,
            topic.clone(),
            records_tx,
            ready_tx,
        ));

        tracing::info!(
            host = %self.config.host,
            port = self.config.port,
            "Connecting to message bus..."
        );
        let handshake = self.config.handshake_timeout_secs;
        match timeout(Duration::from_secs(handshake), ready_rx).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => {
                worker.abort();
                return Err(e);
            }
            Ok(Err(_)) => {
                worker.abort();
                return Err(ApiError::Mqtt("receive worker stopped during handshake".to_string()));
            }
            Err(_) => {
                worker.abort();
                return Err(ApiError::ConnectTimeout(handshake));
            }
        }

        if let Err(e) = client.subscribe(topic.clone(), QoS::AtLeastOnce).await {
            worker.abort();
            return Err(ApiError::Mqtt(format!("subscribe to {topic} failed: {e}")));
        }
        tracing::info!(%topic, "Subscribed to position updates.");

        self.client = Some(client);
        self.worker = Some(worker);
        self.topic = Some(topic);
        Ok(())
    }

    /// Stops ingestion. Does not cancel the remote backtest job.
    ///
    /// Returns `false` when the client was not connected.
    pub async fn disconnect(&mut self) -> bool {
        let Some(client) = self.client.take() else {
            return false;
        };
        if let Err(e) = client.disconnect().await {
            tracing::debug!(error = %e, "Disconnect request could not be queued.");
        }
        if let Some(mut worker) = self.worker.take() {
            if timeout(DISCONNECT_GRACE, &mut worker).await.is_err() {
                worker.abort();
            }
        }
        let topic = self.topic.take().unwrap_or_default();
        tracing::info!(%topic, "Disconnected from message bus.");
        true
    }
}

impl Drop for IngestClient {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}

/// Decodes one frame and sends every resulting record to the listener.
///
/// Returns `false` once the listener has gone away.
pub async fn forward_payload(records: &mpsc::Sender<IngestRecord>, payload: &[u8]) -> bool {
    for record in decode_payload(payload, Utc::now()) {
        if records.send(record).await.is_err() {
            return false;
        }
    }
    true
}

async fn run_worker(
    mut eventloop: EventLoop,
    topic: String,
    records: mpsc::Sender<IngestRecord>,
    ready: oneshot::Sender<Result<(), ApiError>>,
) {
    let mut ready = Some(ready);
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if let Some(ready) = ready.take() {
                    if ack.code == ConnectReturnCode::Success {
                        let _ = ready.send(Ok(()));
                    } else {
                        let _ = ready.send(Err(ApiError::Mqtt(format!(
                            "broker rejected the connection: {:?}",
                            ack.code
                        ))));
                        return;
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                if publish.topic != topic {
                    tracing::debug!(topic = %publish.topic, "Ignoring frame from another topic.");
                    continue;
                }
                if !forward_payload(&records, &publish.payload).await {
                    tracing::debug!("Record channel dropped. Stopping receive worker.");
                    return;
                }
            }
            Ok(Event::Outgoing(rumqttc::Outgoing::Disconnect)) => {
                tracing::debug!("Disconnect sent. Stopping receive worker.");
                return;
            }
            Ok(_) => {}
            Err(e) => {
                match ready.take() {
                    Some(ready) => {
                        let _ = ready.send(Err(ApiError::Mqtt(e.to_string())));
                    }
                    None => {
                        tracing::warn!(error = %e, "Message bus connection lost. Stopping worker.")
                    }
                }
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use events::{RawFormat, RecordBody};

    fn credentials() -> ConnectionCredentials {
        ConnectionCredentials {
            instance_id: "inst".to_string(),
            client_id: "client-7".to_string(),
            trader_id: "trader".to_string(),
            username: "u".to_string(),
            password: "p".to_string(),
        }
    }

    #[test]
    fn topic_is_derived_from_client_id() {
        let (client, _rx) = IngestClient::new(&MqttConfig::default());
        assert_eq!(client.topic_for(&credentials().client_id), "position/client-7");
    }

    #[tokio::test]
    async fn undecodable_frame_still_adds_one_record() {
        let (tx, mut rx) = mpsc::channel(8);
        assert!(forward_payload(&tx, &[0x00, 0xff, 0x13, 0x37]).await);
        drop(tx);

        let mut received = Vec::new();
        while let Some(record) = rx.recv().await {
            received.push(record);
        }
        assert_eq!(received.len(), 1);
        assert!(matches!(received[0].body, RecordBody::Raw { format: RawFormat::Hex, .. }));
    }

    #[tokio::test]
    async fn forward_reports_a_closed_listener() {
        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        assert!(!forward_payload(&tx, br#"{"timestamp": 1}"#).await);
    }

    #[tokio::test]
    async fn connect_fails_fast_when_broker_is_unreachable() {
        let config = MqttConfig {
            host: "127.0.0.1".to_string(),
            // Reserved port; nothing listens here.
            port: 1,
            handshake_timeout_secs: 5,
            ..MqttConfig::default()
        };
        let (mut client, _rx) = IngestClient::new(&config);
        assert!(client.connect(&credentials()).await.is_err());
        assert!(!client.is_connected());
        assert!(!client.disconnect().await);
        // The sender went with the failed worker, so the client cannot be reused.
        assert!(matches!(client.connect(&credentials()).await, Err(ApiError::Mqtt(_))));
    }
}
