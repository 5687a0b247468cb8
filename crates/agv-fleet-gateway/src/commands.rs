//! Outbound command builders.
//!
//! A builder owns one command template, the identity written into every
//! header and the last header id it published. Publishing renders the
//! template with the next header id, hands the bytes to the transport and
//! only then records an audit row. A transport failure leaves the header id
//! unconsumed; an audit failure never undoes a publish.

use crate::transport::{Transport, TransportError};
use agv_fleet_core::{
    normalize, ActionUpdate, CommandTemplate, EdgeUpdate, InstantActionsTemplate, NodeUpdate,
    OrderTemplate, PersistenceError, RecordStore, TemplateError,
};
use agv_fleet_proto::messages::to_json;
use agv_fleet_proto::{Action, Edge, FleetIdentity, Header, MessageError, Node};
use chrono::Utc;
use rumqttc::QoS;
use std::sync::Arc;

/// Builder for orders.
pub type OrderBuilder = CommandBuilder<OrderTemplate>;

/// Builder for instant actions.
pub type InstantActionsBuilder = CommandBuilder<InstantActionsTemplate>;

/// A command handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    /// Topic the command went to
    pub topic: String,
    /// Header id it carried
    pub header_id: u32,
    /// Whether the audit row was stored
    pub audited: bool,
}

/// Template plus header-id counter for one outbound category.
pub struct CommandBuilder<T> {
    template: T,
    header_id: u32,
    identity: FleetIdentity,
    qos: QoS,
    store: Arc<dyn RecordStore>,
}

impl<T: CommandTemplate> CommandBuilder<T> {
    /// Create a builder whose counter resumes from the highest stored
    /// header id of its category, or 0 when nothing was stored.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be queried or holds an id outside
    /// the header id range.
    pub fn recover(
        template: T,
        identity: FleetIdentity,
        qos: QoS,
        store: Arc<dyn RecordStore>,
    ) -> Result<Self, CommandError> {
        let last = store.max_header_id(T::CATEGORY)?.unwrap_or(0);
        let header_id =
            u32::try_from(last).map_err(|_| CommandError::HeaderIdOutOfRange(last))?;

        let category = T::CATEGORY;
        tracing::info!(%category, header_id, "Recovered header id");

        Ok(Self {
            template,
            header_id,
            identity,
            qos,
            store,
        })
    }

    /// Last header id published (or recovered).
    #[must_use]
    pub fn header_id(&self) -> u32 {
        self.header_id
    }

    /// Topic commands are published to.
    #[must_use]
    pub fn topic(&self) -> String {
        self.identity.vehicle_topic(T::CATEGORY)
    }

    /// Current template.
    #[must_use]
    pub fn template(&self) -> &T {
        &self.template
    }

    /// Render the template with the next header id and publish it.
    ///
    /// # Errors
    ///
    /// Returns error if rendering or the transport fails; the header id is
    /// not consumed in that case.
    pub fn publish(&mut self, transport: &dyn Transport) -> Result<Published, CommandError> {
        let header_id = self
            .header_id
            .checked_add(1)
            .ok_or(CommandError::HeaderIdExhausted)?;
        let header = Header {
            header_id,
            timestamp: Utc::now(),
            version: self.identity.version.clone(),
            manufacturer: self.identity.manufacturer.clone(),
            serial_number: self.identity.serial_number.clone(),
        };

        let message = serde_json::to_value(self.template.render(header))
            .map_err(|e| MessageError::Serialize(e.to_string()))?;
        let payload = to_json(&message)?;
        let topic = self.topic();

        transport.publish(&topic, payload, self.qos, false)?;
        self.header_id = header_id;

        tracing::info!(topic, header_id, "Published command");

        // The audit row is normalized from the exact JSON that went out.
        let audited = match self.store.insert(&normalize(T::CATEGORY, &message)) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, topic, header_id, "Failed to record published command");
                false
            }
        };

        Ok(Published {
            topic,
            header_id,
            audited,
        })
    }
}

impl CommandBuilder<OrderTemplate> {
    /// Replace order id and update id.
    pub fn set_order(&mut self, order_id: impl Into<String>, order_update_id: u32) {
        self.template.set_order(order_id, order_update_id);
    }

    /// Set or clear the zone set id.
    pub fn set_zone_set_id(&mut self, zone_set_id: Option<String>) {
        self.template.set_zone_set_id(zone_set_id);
    }

    /// Append a node.
    pub fn add_node(&mut self, node: Node) {
        self.template.add_node(node);
    }

    /// Update the node at `index`.
    ///
    /// # Errors
    ///
    /// Returns error if `index` is out of range.
    pub fn update_node(&mut self, index: usize, update: NodeUpdate) -> Result<(), TemplateError> {
        self.template.update_node(index, update).map_err(warn_rejected)
    }

    /// Remove the node at `index`.
    ///
    /// # Errors
    ///
    /// Returns error if `index` is out of range.
    pub fn remove_node(&mut self, index: usize) -> Result<Node, TemplateError> {
        self.template.remove_node(index).map_err(warn_rejected)
    }

    /// Append an edge.
    pub fn add_edge(&mut self, edge: Edge) {
        self.template.add_edge(edge);
    }

    /// Update the edge at `index`.
    ///
    /// # Errors
    ///
    /// Returns error if `index` is out of range.
    pub fn update_edge(&mut self, index: usize, update: EdgeUpdate) -> Result<(), TemplateError> {
        self.template.update_edge(index, update).map_err(warn_rejected)
    }

    /// Remove the edge at `index`.
    ///
    /// # Errors
    ///
    /// Returns error if `index` is out of range.
    pub fn remove_edge(&mut self, index: usize) -> Result<Edge, TemplateError> {
        self.template.remove_edge(index).map_err(warn_rejected)
    }
}

impl CommandBuilder<InstantActionsTemplate> {
    /// Append an action.
    pub fn add_action(&mut self, action: Action) {
        self.template.add_action(action);
    }

    /// Update the action at `index`.
    ///
    /// # Errors
    ///
    /// Returns error if `index` is out of range.
    pub fn update_action(
        &mut self,
        index: usize,
        update: ActionUpdate,
    ) -> Result<(), TemplateError> {
        self.template
            .update_action(index, update)
            .map_err(warn_rejected)
    }

    /// Remove the action at `index`.
    ///
    /// # Errors
    ///
    /// Returns error if `index` is out of range.
    pub fn remove_action(&mut self, index: usize) -> Result<Action, TemplateError> {
        self.template.remove_action(index).map_err(warn_rejected)
    }
}

fn warn_rejected(err: TemplateError) -> TemplateError {
    tracing::warn!(error = %err, "Rejected template edit");
    err
}

/// Errors for outbound commands.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CommandError {
    /// Template edit rejected
    #[error(transparent)]
    Template(#[from] TemplateError),
    /// Message could not be encoded
    #[error(transparent)]
    Encode(#[from] MessageError),
    /// Transport rejected the publish
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Store query failed
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    /// Stored header id does not fit a header
    #[error("stored header id {0} is out of range")]
    HeaderIdOutOfRange(i64),
    /// Counter reached its maximum
    #[error("header id counter exhausted")]
    HeaderIdExhausted,
    /// Broker has not acknowledged a session
    #[error("not connected to the broker")]
    NotConnected,
    /// Gateway loop is no longer running
    #[error("gateway is not running")]
    Closed,
}
