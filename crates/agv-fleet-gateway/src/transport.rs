//! MQTT transport adapter.

use crate::config::MqttConfig;
use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS};
use url::Url;

const DEFAULT_MQTT_PORT: u16 = 1883;

/// Request capacity between the client handle and the event loop.
const REQUEST_CAPACITY: usize = 100;

/// Outgoing side of the broker connection.
///
/// Both calls only enqueue the request; delivery happens while the event
/// loop is polled.
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send + Sync {
    /// Subscribe to a topic filter.
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be queued.
    fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), TransportError>;

    /// Publish a payload.
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be queued.
    fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS, retain: bool)
        -> Result<(), TransportError>;
}

/// `rumqttc` client wrapper.
pub struct MqttTransport {
    client: AsyncClient,
}

impl MqttTransport {
    /// Create the client and its event loop.
    ///
    /// # Errors
    ///
    /// Returns error if the broker URL is invalid.
    pub fn connect(config: &MqttConfig) -> Result<(Self, EventLoop), TransportError> {
        let (host, port) = parse_mqtt_url(&config.broker)?;

        let mut mqtt_options = MqttOptions::new(&config.client_id, host, port);
        mqtt_options.set_keep_alive(config.keep_alive);

        let (client, eventloop) = AsyncClient::new(mqtt_options, REQUEST_CAPACITY);

        Ok((Self { client }, eventloop))
    }
}

impl Transport for MqttTransport {
    fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), TransportError> {
        tracing::info!(topic, ?qos, "Subscribing");

        self.client
            .try_subscribe(topic, qos)
            .map_err(|e| TransportError::Subscribe(e.to_string()))
    }

    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    ) -> Result<(), TransportError> {
        tracing::debug!(topic, payload_len = payload.len(), ?qos, "Publishing");

        self.client
            .try_publish(topic, qos, retain, payload)
            .map_err(|e| TransportError::Publish(e.to_string()))
    }
}

/// Parse MQTT URL into host and port.
///
/// Accepts `tcp://host:port`, `mqtt://host:port` or bare `host[:port]`.
///
/// # Errors
///
/// Returns error for unsupported schemes, a missing host or a bad port.
pub fn parse_mqtt_url(input: &str) -> Result<(String, u16), TransportError> {
    if input.contains("://") {
        let url = Url::parse(input)
            .map_err(|e| TransportError::InvalidBrokerUrl(format!("{input}: {e}")))?;

        match url.scheme() {
            "tcp" | "mqtt" => {}
            scheme => {
                return Err(TransportError::InvalidBrokerUrl(format!(
                    "{input}: unsupported scheme '{scheme}'"
                )));
            }
        }

        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| TransportError::InvalidBrokerUrl(format!("{input}: missing host")))?;
        let port = url.port().unwrap_or(DEFAULT_MQTT_PORT);

        return Ok((host.to_string(), port));
    }

    let (host, port) = match input.split_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (input, None),
    };
    if host.is_empty() {
        return Err(TransportError::InvalidBrokerUrl(format!(
            "{input}: missing host"
        )));
    }
    let port = match port {
        None => DEFAULT_MQTT_PORT,
        Some(port) => port.parse().map_err(|_| {
            TransportError::InvalidBrokerUrl(format!("{input}: invalid port '{port}'"))
        })?,
    };

    Ok((host.to_string(), port))
}

/// Errors for transport operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Invalid MQTT broker URL
    #[error("invalid MQTT broker URL: {0}")]
    InvalidBrokerUrl(String),
    /// Subscription could not be queued
    #[error("subscription error: {0}")]
    Subscribe(String),
    /// Publish could not be queued
    #[error("publish error: {0}")]
    Publish(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mqtt_url_accepts_tcp_scheme() {
        let (host, port) = parse_mqtt_url("tcp://localhost:1883").unwrap();
        assert_eq!(host, "localhost");
        assert_eq!(port, 1883);
    }

    #[test]
    fn parse_mqtt_url_defaults_port() {
        let (host, port) = parse_mqtt_url("mqtt://broker.local").unwrap();
        assert_eq!(host, "broker.local");
        assert_eq!(port, 1883);

        let (host, port) = parse_mqtt_url("broker.local").unwrap();
        assert_eq!(host, "broker.local");
        assert_eq!(port, 1883);
    }

    #[test]
    fn parse_mqtt_url_accepts_host_port() {
        let (host, port) = parse_mqtt_url("10.0.0.7:2883").unwrap();
        assert_eq!(host, "10.0.0.7");
        assert_eq!(port, 2883);
    }

    #[test]
    fn parse_mqtt_url_rejects_bad_input() {
        assert!(parse_mqtt_url("http://localhost:1883").is_err());
        assert!(parse_mqtt_url(":1883").is_err());
        assert!(parse_mqtt_url("localhost:abc").is_err());
        assert!(parse_mqtt_url("localhost:1883:1").is_err());
    }

    #[tokio::test]
    async fn requests_are_queued_without_polling() {
        let config = MqttConfig {
            broker: "tcp://127.0.0.1:1".to_string(),
            ..MqttConfig::default()
        };
        let (transport, _eventloop) = MqttTransport::connect(&config).unwrap();

        transport.subscribe("uagv/v2/+/+/state", QoS::AtLeastOnce).unwrap();
        transport
            .publish("uagv/v2/fleet/001/order", b"{}".to_vec(), QoS::AtMostOnce, false)
            .unwrap();
    }
}
