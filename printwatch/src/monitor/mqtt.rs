//! MQTT-over-TLS telemetry transport.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS, Transport,
};
use tracing::{debug, trace};

use super::transport::{TelemetrySource, TelemetryStream};
use crate::database::models::MonitoredDevice;
use crate::{Error, Result};

/// MQTT user name of the printers' local broker.
pub const MQTT_USERNAME: &str = "bblp";

const KEEP_ALIVE: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const CLOSE_TIMEOUT: Duration = Duration::from_millis(500);
/// Full status reports are far larger than the client default.
const MAX_PACKET_SIZE: usize = 4 * 1024 * 1024;
const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// Status report topic of a device.
pub fn report_topic(device_id: &str) -> String {
    format!("device/{device_id}/report")
}

/// Connects to each printer's built-in MQTT broker.
#[derive(Debug, Clone, Default)]
pub struct MqttTelemetrySource {
    /// PEM bundle used to verify devices; platform roots otherwise.
    ca_cert: Option<Vec<u8>>,
}

impl MqttTelemetrySource {
    pub fn new(ca_cert: Option<Vec<u8>>) -> Self {
        Self { ca_cert }
    }

    fn options(&self, device: &MonitoredDevice) -> MqttOptions {
        let client_id = format!(
            "printwatch-{}-{}",
            device.device_id,
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );
        let mut options = MqttOptions::new(client_id, device.address.clone(), device.port);
        options
            .set_credentials(MQTT_USERNAME, device.access_code.clone())
            .set_keep_alive(KEEP_ALIVE)
            .set_clean_session(true)
            .set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);

        let transport = match &self.ca_cert {
            Some(ca) => Transport::tls(ca.clone(), None, None),
            None => Transport::tls_with_default_config(),
        };
        options.set_transport(transport);
        options
    }
}

#[async_trait]
impl TelemetrySource for MqttTelemetrySource {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    async fn connect(&self, device: &MonitoredDevice) -> Result<Box<dyn TelemetryStream>> {
        let (client, mut eventloop) =
            AsyncClient::new(self.options(device), REQUEST_CHANNEL_CAPACITY);

        tokio::time::timeout(CONNECT_TIMEOUT, wait_for_connack(&mut eventloop))
            .await
            .map_err(|_| Error::transport(format!("Timed out connecting to {}", device.address)))??;

        let topic = report_topic(&device.device_id);
        client
            .subscribe(topic.as_str(), QoS::AtMostOnce)
            .await
            .map_err(|e| Error::transport(format!("Subscribe to {topic} failed: {e}")))?;
        debug!(device_id = %device.device_id, %topic, "MQTT subscribed");

        Ok(Box::new(MqttTelemetryStream { client, eventloop }))
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<()> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return match ack.code {
                    ConnectReturnCode::Success => Ok(()),
                    code => Err(Error::transport(format!("Connection refused: {code:?}"))),
                };
            }
            Ok(_) => {}
            Err(e) => return Err(Error::transport(format!("Connect failed: {e}"))),
        }
    }
}

struct MqttTelemetryStream {
    client: AsyncClient,
    eventloop: EventLoop,
}

#[async_trait]
impl TelemetryStream for MqttTelemetryStream {
    async fn next_message(&mut self) -> Result<Option<Bytes>> {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    trace!(topic = %publish.topic, bytes = publish.payload.len(), "MQTT message");
                    return Ok(Some(publish.payload));
                }
                Ok(Event::Incoming(Packet::Disconnect)) => return Ok(None),
                Ok(_) => {}
                Err(e) => return Err(Error::transport(format!("MQTT connection lost: {e}"))),
            }
        }
    }

    async fn close(&mut self) {
        if self.client.try_disconnect().is_ok() {
            // Drive the event loop so the DISCONNECT packet is written.
            let _ = tokio::time::timeout(CLOSE_TIMEOUT, self.eventloop.poll()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_topic() {
        assert_eq!(report_topic("01P00A000000001"), "device/01P00A000000001/report");
    }

    #[test]
    fn test_options_use_device_credentials() {
        let device = MonitoredDevice::new("01P00A000000001", "192.168.1.40", "12345678");
        let options = MqttTelemetrySource::default().options(&device);
        assert_eq!(options.broker_address(), ("192.168.1.40".to_string(), 8883));
        assert_eq!(
            options.credentials(),
            Some((MQTT_USERNAME.to_string(), "12345678".to_string()))
        );
        assert_eq!(options.keep_alive(), KEEP_ALIVE);
        assert!(options.client_id().starts_with("printwatch-01P00A000000001-"));
    }
}
