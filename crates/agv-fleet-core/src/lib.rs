//! # AGV Fleet Core
//!
//! Pure domain logic of the fleet gateway.
//!
//! This crate provides:
//! - Normalization of validated messages into flat, storable records
//! - The `RecordStore` seam implemented by the persistence layer
//! - Owned command templates for orders and instant actions

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod normalize;
pub mod record;
pub mod store;
pub mod template;

pub use normalize::normalize;
pub use record::{
    ConnectionRecord, FactsheetRecord, InstantActionsRecord, OrderRecord, Record, RecordHeader,
    StateRecord, VisualizationRecord,
};
pub use store::{PersistenceError, RecordStore};
pub use template::{
    ActionUpdate, CommandTemplate, EdgeUpdate, EntryKind, InstantActionsTemplate, NodeUpdate,
    OrderTemplate, TemplateError,
};

#[cfg(any(test, feature = "testing"))]
pub use store::MockRecordStore;
