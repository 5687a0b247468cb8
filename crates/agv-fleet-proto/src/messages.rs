//! Protocol messages emitted toward vehicles.
//!
//! Field names follow the VDA5050 2.0 JSON wire format (camelCase).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Header shared by every protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    /// Per-sender, per-category sequence number
    pub header_id: u32,
    /// UTC send time
    pub timestamp: DateTime<Utc>,
    /// Protocol version (e.g. `2.0.0`)
    pub version: String,
    /// Vehicle manufacturer
    pub manufacturer: String,
    /// Vehicle serial number
    pub serial_number: String,
}

/// How an action blocks driving and other actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BlockingType {
    /// Runs in parallel with driving and other actions
    None,
    /// Stops driving, may run in parallel with other actions
    Soft,
    /// Runs alone
    Hard,
}

/// Key/value parameter of an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionParameter {
    /// Parameter name
    pub key: String,
    /// Parameter value (any JSON value)
    pub value: serde_json::Value,
}

impl ActionParameter {
    /// Create a parameter.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// An action attached to a node, an edge, or sent as an instant action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    /// Action type (e.g. `pick`, `drop`)
    pub action_type: String,
    /// Unique action identifier
    pub action_id: String,
    /// Free-text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_description: Option<String>,
    /// Blocking behaviour
    pub blocking_type: BlockingType,
    /// Parameters
    #[serde(default)]
    pub action_parameters: Vec<ActionParameter>,
}

/// Position of a node on a map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePosition {
    /// X coordinate in metres
    pub x: f64,
    /// Y coordinate in metres
    pub y: f64,
    /// Orientation in radians
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theta: Option<f64>,
    /// Allowed positional deviation in metres
    #[serde(
        default,
        rename = "allowedDeviationXY",
        alias = "allowedDeviationXy",
        skip_serializing_if = "Option::is_none"
    )]
    pub allowed_deviation_xy: Option<f64>,
    /// Allowed orientation deviation in radians
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_deviation_theta: Option<f64>,
    /// Map identifier
    pub map_id: String,
    /// Map description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_description: Option<String>,
}

/// A node of the order graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Node identifier
    pub node_id: String,
    /// Position of the node in the traversal sequence
    pub sequence_id: u32,
    /// Free-text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_description: Option<String>,
    /// Part of the released base
    pub released: bool,
    /// Node position
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_position: Option<NodePosition>,
    /// Actions executed at the node
    #[serde(default)]
    pub actions: Vec<Action>,
}

/// NURBS control point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlPoint {
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
    /// Weight
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

/// NURBS trajectory of an edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trajectory {
    /// Curve degree
    pub degree: u32,
    /// Knot vector
    pub knot_vector: Vec<f64>,
    /// Control points
    pub control_points: Vec<ControlPoint>,
}

/// An edge of the order graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    /// Edge identifier
    pub edge_id: String,
    /// Position of the edge in the traversal sequence
    pub sequence_id: u32,
    /// Free-text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_description: Option<String>,
    /// Part of the released base
    pub released: bool,
    /// Start node
    pub start_node_id: String,
    /// End node
    pub end_node_id: String,
    /// Speed limit in m/s
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_speed: Option<f64>,
    /// Maximum load height in metres
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_height: Option<f64>,
    /// Minimum load height in metres
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_height: Option<f64>,
    /// Orientation on the edge in radians
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<f64>,
    /// Direction hint at junctions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    /// Rotation permitted on the edge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation_allowed: Option<bool>,
    /// Rotation speed limit in rad/s
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rotation_speed: Option<f64>,
    /// Length in metres
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<f64>,
    /// Trajectory to follow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trajectory: Option<Trajectory>,
    /// Actions executed on the edge
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Edge {
    /// Create a released edge with no optional attributes.
    #[must_use]
    pub fn new(
        edge_id: impl Into<String>,
        sequence_id: u32,
        start_node_id: impl Into<String>,
        end_node_id: impl Into<String>,
    ) -> Self {
        Self {
            edge_id: edge_id.into(),
            sequence_id,
            edge_description: None,
            released: true,
            start_node_id: start_node_id.into(),
            end_node_id: end_node_id.into(),
            max_speed: None,
            max_height: None,
            min_height: None,
            orientation: None,
            direction: None,
            rotation_allowed: None,
            max_rotation_speed: None,
            length: None,
            trajectory: None,
            actions: Vec::new(),
        }
    }
}

impl Node {
    /// Create a released node with no position or actions.
    #[must_use]
    pub fn new(node_id: impl Into<String>, sequence_id: u32) -> Self {
        Self {
            node_id: node_id.into(),
            sequence_id,
            node_description: None,
            released: true,
            node_position: None,
            actions: Vec::new(),
        }
    }
}

/// Order command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Message header
    #[serde(flatten)]
    pub header: Header,
    /// Order identifier
    pub order_id: String,
    /// Update counter within the order
    pub order_update_id: u32,
    /// Zone set to use
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_set_id: Option<String>,
    /// Nodes to traverse
    pub nodes: Vec<Node>,
    /// Edges between the nodes
    pub edges: Vec<Edge>,
}

/// Instant actions command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstantActions {
    /// Message header
    #[serde(flatten)]
    pub header: Header,
    /// Actions to execute immediately
    pub actions: Vec<Action>,
}

/// Serialize a message to JSON bytes.
///
/// # Errors
///
/// Returns error if serialization fails.
pub fn to_json<T: Serialize>(message: &T) -> Result<Vec<u8>, MessageError> {
    serde_json::to_vec(message).map_err(|e| MessageError::Serialize(e.to_string()))
}

/// Decode a JSON payload into an untyped document.
///
/// # Errors
///
/// Returns error if the payload is not well-formed JSON.
pub fn decode(payload: &[u8]) -> Result<serde_json::Value, MessageError> {
    serde_json::from_slice(payload).map_err(|e| MessageError::Deserialize(e.to_string()))
}

/// Errors for message serialization/deserialization.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MessageError {
    /// Serialization failed
    #[error("serialization failed: {0}")]
    Serialize(String),
    /// Deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialize(String),
}
