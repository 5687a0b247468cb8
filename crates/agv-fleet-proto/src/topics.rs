//! MQTT topic scheme for the VDA5050 interface.
//!
//! Topic structure: `{interfaceName}/{majorVersion}/{manufacturer}/{serialNumber}/{category}`
//!
//! This allows:
//! - Fleet isolation by interface name and protocol major version
//! - Per-vehicle addressing by manufacturer and serial number
//! - Category filtering on the last segment

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default interface name used as the first topic segment.
pub const DEFAULT_INTERFACE_NAME: &str = "uagv";

/// Default protocol major version segment.
pub const DEFAULT_MAJOR_VERSION: &str = "v2";

/// Default full protocol version carried in message headers.
pub const DEFAULT_PROTOCOL_VERSION: &str = "2.0.0";

/// Single-level MQTT wildcard.
const WILDCARD: &str = "+";

/// Message category, carried in the last topic segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Vehicle connection state (last will)
    #[serde(rename = "connection")]
    Connection,
    /// Static vehicle capabilities
    #[serde(rename = "factsheet")]
    Factsheet,
    /// Routed base path command
    #[serde(rename = "order")]
    Order,
    /// Periodic vehicle telemetry
    #[serde(rename = "state")]
    State,
    /// Out-of-band command list
    #[serde(rename = "instantActions")]
    InstantActions,
    /// High-frequency position stream
    #[serde(rename = "visualization")]
    Visualization,
}

impl Category {
    /// Every category, in topic-table order.
    pub const ALL: [Self; 6] = [
        Self::Connection,
        Self::Factsheet,
        Self::Order,
        Self::State,
        Self::InstantActions,
        Self::Visualization,
    ];

    /// Wire name of the category as it appears in topics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Factsheet => "factsheet",
            Self::Order => "order",
            Self::State => "state",
            Self::InstantActions => "instantActions",
            Self::Visualization => "visualization",
        }
    }

    /// Parse a category from the last topic segment.
    ///
    /// Matching is exact, so no suffix can shadow another.
    #[must_use]
    pub fn from_topic_suffix(suffix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|category| category.as_str() == suffix)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol constants addressing this fleet and the vehicle it commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetIdentity {
    /// First topic segment (e.g. `uagv`)
    pub interface_name: String,
    /// Full protocol version written into headers (e.g. `2.0.0`)
    pub version: String,
    /// Version topic segment (e.g. `v2`)
    pub major_version: String,
    /// Vehicle manufacturer
    pub manufacturer: String,
    /// Serial number of the commanded vehicle
    pub serial_number: String,
}

impl Default for FleetIdentity {
    fn default() -> Self {
        Self {
            interface_name: DEFAULT_INTERFACE_NAME.to_string(),
            version: DEFAULT_PROTOCOL_VERSION.to_string(),
            major_version: DEFAULT_MAJOR_VERSION.to_string(),
            manufacturer: "fleet".to_string(),
            serial_number: "001".to_string(),
        }
    }
}

impl FleetIdentity {
    /// Topic scheme derived from this identity.
    #[must_use]
    pub fn topic_scheme(&self) -> TopicScheme {
        TopicScheme::new(
            self.interface_name.clone(),
            self.major_version.clone(),
            self.manufacturer.clone(),
        )
    }

    /// Topic of the commanded vehicle for `category`.
    #[must_use]
    pub fn vehicle_topic(&self, category: Category) -> String {
        self.topic_scheme().topic(&self.serial_number, category)
    }
}

/// Topic scheme configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicScheme {
    /// Interface name (first segment)
    pub interface_name: String,
    /// Major version (second segment)
    pub major_version: String,
    /// Manufacturer used for manufacturer-scoped topics
    pub manufacturer: String,
}

impl Default for TopicScheme {
    fn default() -> Self {
        FleetIdentity::default().topic_scheme()
    }
}

impl TopicScheme {
    /// Create a new topic scheme.
    #[must_use]
    pub fn new(
        interface_name: impl Into<String>,
        major_version: impl Into<String>,
        manufacturer: impl Into<String>,
    ) -> Self {
        Self {
            interface_name: interface_name.into(),
            major_version: major_version.into(),
            manufacturer: manufacturer.into(),
        }
    }

    fn build(&self, manufacturer: &str, serial_number: &str, category: Category) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.interface_name, self.major_version, manufacturer, serial_number, category
        )
    }

    /// Topic for one vehicle of the configured manufacturer.
    #[must_use]
    pub fn topic(&self, serial_number: &str, category: Category) -> String {
        self.build(&self.manufacturer, serial_number, category)
    }

    /// Wildcard subscription for every vehicle of every manufacturer.
    #[must_use]
    pub fn fleet_wildcard(&self, category: Category) -> String {
        self.build(WILDCARD, WILDCARD, category)
    }

    /// Wildcard subscription for every vehicle of the configured manufacturer.
    #[must_use]
    pub fn manufacturer_wildcard(&self, category: Category) -> String {
        self.build(&self.manufacturer, WILDCARD, category)
    }

    /// Parse a concrete topic into its address.
    ///
    /// # Errors
    ///
    /// Returns error if the topic does not have five segments, belongs to a
    /// different interface or version, or ends in an unknown category.
    pub fn parse(&self, topic: &str) -> Result<TopicAddress, TopicError> {
        let parts: Vec<&str> = topic.split('/').collect();
        let [interface_name, major_version, manufacturer, serial_number, suffix] = parts[..] else {
            return Err(TopicError::Malformed(topic.to_string()));
        };

        if interface_name != self.interface_name || major_version != self.major_version {
            return Err(TopicError::ForeignPrefix(topic.to_string()));
        }

        if manufacturer.is_empty() || serial_number.is_empty() {
            return Err(TopicError::Malformed(topic.to_string()));
        }

        let category = Category::from_topic_suffix(suffix)
            .ok_or_else(|| TopicError::UnknownCategory(suffix.to_string()))?;

        Ok(TopicAddress {
            manufacturer: manufacturer.to_string(),
            serial_number: serial_number.to_string(),
            category,
        })
    }
}

/// Vehicle and category addressed by a concrete topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicAddress {
    /// Manufacturer segment
    pub manufacturer: String,
    /// Serial number segment
    pub serial_number: String,
    /// Category segment
    pub category: Category,
}

/// Errors for topic parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopicError {
    /// Wrong number of segments or empty vehicle segments
    #[error("malformed topic: {0}")]
    Malformed(String),
    /// Interface name or version does not match this fleet
    #[error("topic outside this fleet: {0}")]
    ForeignPrefix(String),
    /// Last segment is not a known category
    #[error("unknown category: {0}")]
    UnknownCategory(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheme() -> TopicScheme {
        TopicScheme::new("uagv", "v2", "acme")
    }

    #[test]
    fn topic_generation() {
        let scheme = scheme();

        assert_eq!(scheme.topic("001", Category::Order), "uagv/v2/acme/001/order");
        assert_eq!(
            scheme.topic("001", Category::InstantActions),
            "uagv/v2/acme/001/instantActions"
        );
    }

    #[test]
    fn wildcard_topics() {
        let scheme = scheme();

        assert_eq!(
            scheme.fleet_wildcard(Category::Connection),
            "uagv/v2/+/+/connection"
        );
        assert_eq!(
            scheme.manufacturer_wildcard(Category::Visualization),
            "uagv/v2/acme/+/visualization"
        );
    }

    #[test]
    fn topic_parsing() {
        let address = scheme().parse("uagv/v2/other/agv-7/state").unwrap();

        assert_eq!(address.manufacturer, "other");
        assert_eq!(address.serial_number, "agv-7");
        assert_eq!(address.category, Category::State);
    }

    #[test]
    fn suffix_match_is_exact() {
        // A substring match would route this to connection.
        assert_eq!(Category::from_topic_suffix("connectionState"), None);
        assert_eq!(Category::from_topic_suffix("State"), None);

        let err = scheme().parse("uagv/v2/acme/001/connectionState").unwrap_err();
        assert_eq!(err, TopicError::UnknownCategory("connectionState".to_string()));
    }

    #[test]
    fn serial_named_like_a_category_does_not_confuse_routing() {
        let address = scheme().parse("uagv/v2/acme/state/connection").unwrap();
        assert_eq!(address.category, Category::Connection);
        assert_eq!(address.serial_number, "state");
    }

    #[test]
    fn parse_rejects_foreign_and_malformed_topics() {
        let scheme = scheme();

        assert!(matches!(
            scheme.parse("uagv/v1/acme/001/state"),
            Err(TopicError::ForeignPrefix(_))
        ));
        assert!(matches!(
            scheme.parse("uagv/v2/acme/state"),
            Err(TopicError::Malformed(_))
        ));
        assert!(matches!(
            scheme.parse("uagv/v2/acme//state"),
            Err(TopicError::Malformed(_))
        ));
        assert!(matches!(
            scheme.parse("uagv/v2/acme/001/state/extra"),
            Err(TopicError::Malformed(_))
        ));
    }

    #[test]
    fn every_category_roundtrips_through_its_topic() {
        let scheme = scheme();
        for category in Category::ALL {
            let topic = scheme.topic("001", category);
            assert_eq!(scheme.parse(&topic).unwrap().category, category);
        }
    }

    #[test]
    fn identity_builds_vehicle_topics() {
        let identity = FleetIdentity {
            manufacturer: "acme".to_string(),
            serial_number: "042".to_string(),
            ..FleetIdentity::default()
        };

        assert_eq!(
            identity.vehicle_topic(Category::Order),
            "uagv/v2/acme/042/order"
        );
    }
}
