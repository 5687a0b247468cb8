//! Normalized records, one variant per persisted category.
//!
//! Nested structures are kept as opaque JSON values and stored as text.

use agv_fleet_proto::Category;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Header fields shared by every record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordHeader {
    /// Message sequence number
    pub header_id: i64,
    /// Message timestamp
    pub timestamp: DateTime<Utc>,
    /// Protocol version
    pub version: String,
    /// Vehicle manufacturer
    pub manufacturer: String,
    /// Vehicle serial number
    pub serial_number: String,
}

/// Row of the `connection` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    /// Header
    pub header: RecordHeader,
    /// `ONLINE`, `OFFLINE` or `CONNECTIONBROKEN`
    pub connection_state: String,
}

/// Row of the `factsheet` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactsheetRecord {
    /// Header
    pub header: RecordHeader,
    /// Vehicle series
    pub series_name: String,
    /// Series description
    pub series_description: String,
    /// Kinematic model
    pub agv_kinematic: String,
    /// Vehicle class
    pub agv_class: String,
    /// Maximum load in kg
    pub max_load_mass: f64,
    /// Supported localization types
    pub localization_types: Value,
    /// Supported navigation types
    pub navigation_types: Value,
    /// Minimum controlled speed
    pub speed_min: f64,
    /// Maximum speed
    pub speed_max: f64,
    /// Maximum acceleration
    pub acceleration_max: f64,
    /// Maximum deceleration
    pub deceleration_max: f64,
    /// Minimum height
    pub height_min: f64,
    /// Maximum height
    pub height_max: f64,
    /// Width
    pub width: f64,
    /// Length
    pub length: f64,
    /// Protocol limits section
    pub protocol_limits: Value,
    /// Protocol features section
    pub protocol_features: Value,
    /// Geometry section
    pub agv_geometry: Value,
    /// Load specification section
    pub load_specification: Value,
}

/// Row of the `state` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    /// Header
    pub header: RecordHeader,
    /// Current order
    pub order_id: String,
    /// Current order update
    pub order_update_id: i64,
    /// Active zone set
    pub zone_set_id: String,
    /// Last traversed node
    pub last_node_id: String,
    /// Sequence id of the last traversed node
    pub last_node_sequence_id: i64,
    /// Vehicle is driving
    pub driving: bool,
    /// Vehicle is paused
    pub paused: bool,
    /// Vehicle requests a new base
    pub new_base_request: bool,
    /// Distance travelled since the last node
    pub distance_since_last_node: f64,
    /// Operating mode
    pub operating_mode: String,
    /// Remaining nodes
    pub node_states: Value,
    /// Remaining edges
    pub edge_states: Value,
    /// Vehicle position
    pub agv_position: Value,
    /// Vehicle velocity
    pub velocity: Value,
    /// Carried loads
    pub loads: Value,
    /// Action progress
    pub action_states: Value,
    /// Full battery section
    pub battery_state: Value,
    /// State of charge in percent
    pub battery_charge: f64,
    /// Vehicle is charging
    pub charging: bool,
    /// Active errors
    pub errors: Value,
    /// Informational messages
    pub information: Value,
    /// Safety section
    pub safety_state: Value,
}

/// Row of the `visualization` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationRecord {
    /// Header
    pub header: RecordHeader,
    /// Vehicle position
    pub agv_position: Value,
    /// Vehicle velocity
    pub velocity: Value,
}

/// Row of the `orders` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Header
    pub header: RecordHeader,
    /// Order identifier
    pub order_id: String,
    /// Order update counter
    pub order_update_id: i64,
    /// Zone set
    pub zone_set_id: String,
    /// Node list
    pub nodes: Value,
    /// Edge list
    pub edges: Value,
}

/// Row of the `instant_actions` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstantActionsRecord {
    /// Header
    pub header: RecordHeader,
    /// Action list
    pub actions: Value,
}

/// A normalized message ready for storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Record {
    /// Connection message
    Connection(ConnectionRecord),
    /// Factsheet message
    Factsheet(FactsheetRecord),
    /// State message
    State(StateRecord),
    /// Visualization message
    Visualization(VisualizationRecord),
    /// Order command
    Order(OrderRecord),
    /// Instant actions command
    InstantActions(InstantActionsRecord),
}

impl Record {
    /// Category the record was normalized from.
    #[must_use]
    pub fn category(&self) -> Category {
        match self {
            Self::Connection(_) => Category::Connection,
            Self::Factsheet(_) => Category::Factsheet,
            Self::State(_) => Category::State,
            Self::Visualization(_) => Category::Visualization,
            Self::Order(_) => Category::Order,
            Self::InstantActions(_) => Category::InstantActions,
        }
    }

    /// Header of the record.
    #[must_use]
    pub fn header(&self) -> &RecordHeader {
        match self {
            Self::Connection(r) => &r.header,
            Self::Factsheet(r) => &r.header,
            Self::State(r) => &r.header,
            Self::Visualization(r) => &r.header,
            Self::Order(r) => &r.header,
            Self::InstantActions(r) => &r.header,
        }
    }
}
