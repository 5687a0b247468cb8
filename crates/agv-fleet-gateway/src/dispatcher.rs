//! Topic router for inbound vehicle messages.
//!
//! One routing table drives both the subscriptions and the per-category
//! pipeline: parse topic, decode JSON, validate, normalize, store.

use crate::transport::{Transport, TransportError};
use agv_fleet_core::{normalize, PersistenceError, Record, RecordStore};
use agv_fleet_proto::messages::decode;
use agv_fleet_proto::{
    Category, MessageError, MessageValidator, SchemaViolation, TopicError, TopicScheme,
};
use rumqttc::QoS;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// Every manufacturer and serial number
    Fleet,
    /// Every serial number of the configured manufacturer
    Manufacturer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pipeline {
    Store,
    Acknowledge,
    Observe,
}

#[derive(Debug, Clone, Copy)]
struct Route {
    category: Category,
    scope: Scope,
    qos: QoS,
    pipeline: Pipeline,
}

static ROUTES: [Route; 5] = [
    Route {
        category: Category::Connection,
        scope: Scope::Fleet,
        qos: QoS::AtLeastOnce,
        pipeline: Pipeline::Store,
    },
    Route {
        category: Category::Factsheet,
        scope: Scope::Fleet,
        qos: QoS::AtLeastOnce,
        pipeline: Pipeline::Store,
    },
    Route {
        category: Category::State,
        scope: Scope::Fleet,
        qos: QoS::AtLeastOnce,
        pipeline: Pipeline::Store,
    },
    Route {
        category: Category::InstantActions,
        scope: Scope::Fleet,
        qos: QoS::AtLeastOnce,
        pipeline: Pipeline::Acknowledge,
    },
    Route {
        category: Category::Visualization,
        scope: Scope::Manufacturer,
        qos: QoS::AtMostOnce,
        pipeline: Pipeline::Observe,
    },
];

fn route_for(category: Category) -> Option<&'static Route> {
    ROUTES.iter().find(|route| route.category == category)
}

/// A topic filter the gateway listens on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Category routed from this filter
    pub category: Category,
    /// Topic filter
    pub topic: String,
    /// Requested QoS
    pub qos: QoS,
}

/// What happened to an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Validated and stored
    Stored(Category),
    /// Validated instant actions, logged only
    Acknowledged,
    /// Validated and normalized without storing
    Observed(Category),
    /// Category has no inbound pipeline
    Ignored(Category),
}

/// Why an inbound message was dropped.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    /// Topic does not belong to this fleet
    #[error(transparent)]
    Topic(#[from] TopicError),
    /// Payload is not JSON
    #[error(transparent)]
    Decode(#[from] MessageError),
    /// Message violates its schema
    #[error(transparent)]
    Schema(#[from] SchemaViolation),
    /// Normalized record could not be stored
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Routes inbound messages into the store.
pub struct Dispatcher {
    scheme: TopicScheme,
    validator: Arc<dyn MessageValidator>,
    store: Arc<dyn RecordStore>,
    persist_visualization: bool,
}

impl Dispatcher {
    /// Create a dispatcher.
    #[must_use]
    pub fn new(
        scheme: TopicScheme,
        validator: Arc<dyn MessageValidator>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            scheme,
            validator,
            store,
            persist_visualization: false,
        }
    }

    /// Store visualization messages instead of only observing them.
    #[must_use]
    pub fn with_visualization_persistence(mut self, enabled: bool) -> Self {
        self.persist_visualization = enabled;
        self
    }

    /// Topic filters for every routed category.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<Subscription> {
        ROUTES
            .iter()
            .map(|route| Subscription {
                category: route.category,
                topic: match route.scope {
                    Scope::Fleet => self.scheme.fleet_wildcard(route.category),
                    Scope::Manufacturer => self.scheme.manufacturer_wildcard(route.category),
                },
                qos: route.qos,
            })
            .collect()
    }

    /// Subscribe to every routed topic filter.
    ///
    /// # Errors
    ///
    /// Returns the first failed subscription.
    pub fn subscribe_all(&self, transport: &dyn Transport) -> Result<(), TransportError> {
        for subscription in self.subscriptions() {
            transport.subscribe(&subscription.topic, subscription.qos)?;
        }
        Ok(())
    }

    /// Run one inbound message through its pipeline.
    ///
    /// # Errors
    ///
    /// Returns why the message was dropped. Nothing is stored in that case.
    pub fn dispatch(&self, topic: &str, payload: &[u8]) -> Result<Outcome, DispatchError> {
        let address = self.scheme.parse(topic)?;
        let category = address.category;

        let Some(route) = route_for(category) else {
            tracing::debug!(topic, %category, "No inbound pipeline");
            return Ok(Outcome::Ignored(category));
        };

        let message = decode(payload)?;
        self.validator.validate(category, &message)?;

        match route.pipeline {
            Pipeline::Acknowledge => {
                tracing::info!(
                    manufacturer = %address.manufacturer,
                    serial_number = %address.serial_number,
                    "Received instant actions"
                );
                Ok(Outcome::Acknowledged)
            }
            Pipeline::Observe if !self.persist_visualization => {
                let record = normalize(category, &message);
                tracing::trace!(topic, header_id = record.header().header_id, "Observed");
                Ok(Outcome::Observed(category))
            }
            Pipeline::Store | Pipeline::Observe => {
                let record = normalize(category, &message);
                log_summary(&record);
                self.store.insert(&record)?;
                Ok(Outcome::Stored(category))
            }
        }
    }
}

fn log_summary(record: &Record) {
    let header = record.header();
    match record {
        Record::State(state) => tracing::debug!(
            serial_number = %header.serial_number,
            header_id = header.header_id,
            order_id = %state.order_id,
            last_node_id = %state.last_node_id,
            driving = state.driving,
            battery_charge = state.battery_charge,
            "Vehicle state"
        ),
        Record::Connection(connection) => tracing::info!(
            serial_number = %header.serial_number,
            connection_state = %connection.connection_state,
            "Vehicle connection"
        ),
        _ => tracing::debug!(
            category = %record.category(),
            serial_number = %header.serial_number,
            header_id = header.header_id,
            "Vehicle message"
        ),
    }
}
