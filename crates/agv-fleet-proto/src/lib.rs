//! # AGV Fleet Protocol
//!
//! VDA5050 wire definitions shared by the gateway and its tools.
//!
//! ## Topics
//!
//! Topic scheme: `{interfaceName}/{majorVersion}/{manufacturer}/{serialNumber}/{category}`
//!
//! ## Messages
//!
//! - `Order`: routed base path (nodes and edges) for a vehicle
//! - `InstantActions`: actions executed outside the current order
//!
//! Inbound categories (`connection`, `factsheet`, `state`, `visualization`)
//! stay untyped and are checked against the embedded JSON Schemas.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod messages;
pub mod schema;
pub mod topics;

pub use messages::{
    Action, ActionParameter, BlockingType, ControlPoint, Edge, Header, InstantActions,
    MessageError, Node, NodePosition, Order, Trajectory,
};
pub use schema::{JsonSchemaRegistry, MessageValidator, SchemaError, SchemaViolation};
pub use topics::{Category, FleetIdentity, TopicAddress, TopicError, TopicScheme};

#[cfg(any(test, feature = "testing"))]
pub use schema::MockMessageValidator;
