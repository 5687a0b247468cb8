//! Gateway configuration.

use agv_fleet_proto::FleetIdentity;
use anyhow::{bail, Context, Result};
use rumqttc::QoS;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Broker connection
    pub mqtt: MqttConfig,

    /// Protocol constants used for topics and outbound headers
    pub identity: FleetIdentity,

    /// Persistence configuration
    pub persistence: PersistenceConfig,

    /// Outbound command configuration
    pub commands: CommandConfig,

    /// Store validated visualization messages
    pub persist_visualization: bool,
}

/// MQTT configuration.
#[derive(Debug, Clone)]
pub struct MqttConfig {
    /// Broker URL
    pub broker: String,

    /// Client identifier
    pub client_id: String,

    /// Keep-alive interval
    pub keep_alive: Duration,
}

/// Persistence configuration.
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    /// Database path
    pub db_path: PathBuf,

    /// How long a statement waits on a locked database
    pub busy_timeout: Duration,
}

/// Outbound command configuration.
#[derive(Debug, Clone)]
pub struct CommandConfig {
    /// QoS for orders
    pub order_qos: QoS,

    /// QoS for instant actions
    pub instant_actions_qos: QoS,

    /// Publish both seeded templates after every connect
    pub publish_on_connect: bool,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: "tcp://localhost:1883".to_string(),
            client_id: format!("agv-fleet-{}", Uuid::new_v4()),
            keep_alive: Duration::from_secs(60),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            mqtt: MqttConfig::default(),
            identity: FleetIdentity::default(),
            persistence: PersistenceConfig {
                db_path: PathBuf::from("./agv-fleet.db"),
                busy_timeout: Duration::from_millis(5000),
            },
            commands: CommandConfig {
                order_qos: QoS::AtMostOnce,
                instant_actions_qos: QoS::AtLeastOnce,
                publish_on_connect: false,
            },
            persist_visualization: false,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `FLEET_MQTT_BROKER`: MQTT broker URL
    /// - `FLEET_MQTT_CLIENT_ID`: MQTT client identifier
    /// - `FLEET_MQTT_KEEP_ALIVE_SECS`: Keep-alive in seconds
    /// - `FLEET_INTERFACE_NAME`, `FLEET_VERSION`, `FLEET_MAJOR_VERSION`,
    ///   `FLEET_MANUFACTURER`, `FLEET_SERIAL_NUMBER`: Protocol constants
    /// - `FLEET_DB_PATH`: SQLite database path
    /// - `FLEET_DB_BUSY_TIMEOUT_MS`: SQLite busy timeout
    /// - `FLEET_ORDER_QOS`, `FLEET_INSTANT_ACTIONS_QOS`: Outbound QoS (0, 1 or 2)
    /// - `FLEET_PUBLISH_ON_CONNECT`: Publish seeded commands on connect
    /// - `FLEET_PERSIST_VISUALIZATION`: Store visualization messages
    ///
    /// # Errors
    ///
    /// Returns error if a variable holds an invalid value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns error if a variable holds an invalid value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(broker) = lookup("FLEET_MQTT_BROKER") {
            config.mqtt.broker = broker;
        }

        if let Some(client_id) = lookup("FLEET_MQTT_CLIENT_ID") {
            config.mqtt.client_id = client_id;
        }

        if let Some(secs) = lookup("FLEET_MQTT_KEEP_ALIVE_SECS") {
            let secs: u64 = secs
                .parse()
                .context("Invalid FLEET_MQTT_KEEP_ALIVE_SECS")?;
            // rumqttc rejects keep-alive intervals below five seconds
            if secs < 5 {
                bail!("Invalid FLEET_MQTT_KEEP_ALIVE_SECS: {secs} is below 5");
            }
            config.mqtt.keep_alive = Duration::from_secs(secs);
        }

        let identity = &mut config.identity;
        for (name, field) in [
            ("FLEET_INTERFACE_NAME", &mut identity.interface_name),
            ("FLEET_VERSION", &mut identity.version),
            ("FLEET_MAJOR_VERSION", &mut identity.major_version),
            ("FLEET_MANUFACTURER", &mut identity.manufacturer),
            ("FLEET_SERIAL_NUMBER", &mut identity.serial_number),
        ] {
            if let Some(value) = lookup(name) {
                if value.is_empty() || value.contains(['/', '+', '#']) {
                    bail!("Invalid {name}: '{value}' is not a topic segment");
                }
                *field = value;
            }
        }

        if let Some(db_path) = lookup("FLEET_DB_PATH") {
            config.persistence.db_path = PathBuf::from(db_path);
        }

        if let Some(ms) = lookup("FLEET_DB_BUSY_TIMEOUT_MS") {
            let ms: u64 = ms.parse().context("Invalid FLEET_DB_BUSY_TIMEOUT_MS")?;
            config.persistence.busy_timeout = Duration::from_millis(ms);
        }

        if let Some(qos) = lookup("FLEET_ORDER_QOS") {
            config.commands.order_qos = parse_qos(&qos).context("Invalid FLEET_ORDER_QOS")?;
        }

        if let Some(qos) = lookup("FLEET_INSTANT_ACTIONS_QOS") {
            config.commands.instant_actions_qos =
                parse_qos(&qos).context("Invalid FLEET_INSTANT_ACTIONS_QOS")?;
        }

        if let Some(flag) = lookup("FLEET_PUBLISH_ON_CONNECT") {
            config.commands.publish_on_connect =
                parse_flag(&flag).context("Invalid FLEET_PUBLISH_ON_CONNECT")?;
        }

        if let Some(flag) = lookup("FLEET_PERSIST_VISUALIZATION") {
            config.persist_visualization =
                parse_flag(&flag).context("Invalid FLEET_PERSIST_VISUALIZATION")?;
        }

        Ok(config)
    }
}

fn parse_qos(value: &str) -> Result<QoS> {
    match value.trim() {
        "0" => Ok(QoS::AtMostOnce),
        "1" => Ok(QoS::AtLeastOnce),
        "2" => Ok(QoS::ExactlyOnce),
        other => bail!("expected 0, 1 or 2, got '{other}'"),
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => bail!("expected a boolean, got '{other}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<GatewayConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        GatewayConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_without_variables() {
        let config = load(&[]).unwrap();

        assert_eq!(config.mqtt.broker, "tcp://localhost:1883");
        assert!(config.mqtt.client_id.starts_with("agv-fleet-"));
        assert_eq!(config.identity.interface_name, "uagv");
        assert_eq!(config.identity.major_version, "v2");
        assert_eq!(config.commands.order_qos, QoS::AtMostOnce);
        assert_eq!(config.commands.instant_actions_qos, QoS::AtLeastOnce);
        assert!(!config.commands.publish_on_connect);
        assert!(!config.persist_visualization);
    }

    #[test]
    fn variables_override_defaults() {
        let config = load(&[
            ("FLEET_MQTT_BROKER", "broker:2883"),
            ("FLEET_MANUFACTURER", "acme"),
            ("FLEET_SERIAL_NUMBER", "agv-7"),
            ("FLEET_DB_PATH", "/tmp/fleet.db"),
            ("FLEET_DB_BUSY_TIMEOUT_MS", "250"),
            ("FLEET_ORDER_QOS", "2"),
            ("FLEET_PUBLISH_ON_CONNECT", "true"),
            ("FLEET_PERSIST_VISUALIZATION", "1"),
        ])
        .unwrap();

        assert_eq!(config.mqtt.broker, "broker:2883");
        assert_eq!(config.identity.manufacturer, "acme");
        assert_eq!(config.identity.serial_number, "agv-7");
        assert_eq!(config.persistence.db_path, PathBuf::from("/tmp/fleet.db"));
        assert_eq!(config.persistence.busy_timeout, Duration::from_millis(250));
        assert_eq!(config.commands.order_qos, QoS::ExactlyOnce);
        assert!(config.commands.publish_on_connect);
        assert!(config.persist_visualization);
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = load(&[("FLEET_ORDER_QOS", "3")]).unwrap_err();
        assert!(err.to_string().contains("FLEET_ORDER_QOS"));

        let err = load(&[("FLEET_SERIAL_NUMBER", "a/b")]).unwrap_err();
        assert!(err.to_string().contains("FLEET_SERIAL_NUMBER"));

        assert!(load(&[("FLEET_MQTT_KEEP_ALIVE_SECS", "2")]).is_err());
        assert!(load(&[("FLEET_PUBLISH_ON_CONNECT", "maybe")]).is_err());
    }
}
