//! Gateway runtime orchestration.

use crate::commands::{CommandError, InstantActionsBuilder, OrderBuilder, Published};
use crate::config::GatewayConfig;
use crate::dispatcher::{DispatchError, Dispatcher, Outcome};
use crate::persistence::SqliteStore;
use crate::transport::{MqttTransport, Transport};
use agv_fleet_core::{
    ActionUpdate, EdgeUpdate, InstantActionsTemplate, NodeUpdate, OrderTemplate, RecordStore,
};
use agv_fleet_proto::{Action, Edge, JsonSchemaRegistry, Node};
use anyhow::{Context, Result};
use rumqttc::{Event, Packet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Delay before polling again after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Edit or publish of the order template.
#[derive(Debug, Clone)]
pub enum OrderCommand {
    /// Replace order id and update id
    SetOrder {
        /// New order id
        order_id: String,
        /// New order update id
        order_update_id: u32,
    },
    /// Append a node
    AddNode(Node),
    /// Update the node at `index`
    UpdateNode {
        /// Node position
        index: usize,
        /// Fields to replace
        update: NodeUpdate,
    },
    /// Remove the node at the index
    RemoveNode(usize),
    /// Append an edge
    AddEdge(Edge),
    /// Update the edge at `index`
    UpdateEdge {
        /// Edge position
        index: usize,
        /// Fields to replace
        update: EdgeUpdate,
    },
    /// Remove the edge at the index
    RemoveEdge(usize),
    /// Publish the current order
    Publish,
}

/// Edit or publish of the instant actions template.
#[derive(Debug, Clone)]
pub enum InstantActionsCommand {
    /// Append an action
    AddAction(Action),
    /// Update the action at `index`
    UpdateAction {
        /// Action position
        index: usize,
        /// Fields to replace
        update: ActionUpdate,
    },
    /// Remove the action at the index
    RemoveAction(usize),
    /// Publish the current actions
    Publish,
}

/// Request handled by the gateway loop.
#[derive(Debug, Clone)]
pub enum Command {
    /// Order template command
    Order(OrderCommand),
    /// Instant actions template command
    InstantActions(InstantActionsCommand),
}

/// Result of an applied command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Template changed
    Edited,
    /// Command was published
    Published(Published),
}

/// A command plus the slot its result goes to.
#[derive(Debug)]
pub struct CommandRequest {
    command: Command,
    reply: oneshot::Sender<Result<CommandOutcome, CommandError>>,
}

/// Receiving end of the command channel, consumed by [`Gateway::run`].
pub type CommandReceiver = mpsc::Receiver<CommandRequest>;

/// Cloneable handle for submitting commands to a running gateway.
#[derive(Debug, Clone)]
pub struct GatewayHandle {
    tx: mpsc::Sender<CommandRequest>,
}

impl GatewayHandle {
    /// Submit a command and wait for its result.
    ///
    /// # Errors
    ///
    /// Returns the command's error, or [`CommandError::Closed`] if the
    /// gateway loop has stopped.
    pub async fn submit(&self, command: Command) -> Result<CommandOutcome, CommandError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(CommandRequest { command, reply })
            .await
            .map_err(|_| CommandError::Closed)?;
        response.await.map_err(|_| CommandError::Closed)?
    }
}

/// Create a command channel with room for `capacity` pending requests.
#[must_use]
pub fn command_channel(capacity: usize) -> (GatewayHandle, CommandReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (GatewayHandle { tx }, rx)
}

/// The gateway runtime.
pub struct Gateway {
    config: GatewayConfig,
    dispatcher: Dispatcher,
    orders: OrderBuilder,
    instant_actions: InstantActionsBuilder,
    connected: bool,
}

impl Gateway {
    /// Create a gateway backed by the configured `SQLite` database.
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened or initialization
    /// fails.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let store = SqliteStore::open(
            &config.persistence.db_path,
            config.persistence.busy_timeout,
        )
        .with_context(|| {
            format!(
                "Failed to open SQLite database {}",
                config.persistence.db_path.display()
            )
        })?;

        Self::with_store(config, Arc::new(store))
    }

    /// Create a gateway over an existing store.
    ///
    /// # Errors
    ///
    /// Returns error if the schemas cannot be compiled or the header ids
    /// cannot be recovered.
    pub fn with_store(config: GatewayConfig, store: Arc<dyn RecordStore>) -> Result<Self> {
        let validator = JsonSchemaRegistry::load().context("Failed to load message schemas")?;

        let dispatcher = Dispatcher::new(
            config.identity.topic_scheme(),
            Arc::new(validator),
            Arc::clone(&store),
        )
        .with_visualization_persistence(config.persist_visualization);

        let orders = OrderBuilder::recover(
            OrderTemplate::seeded(),
            config.identity.clone(),
            config.commands.order_qos,
            Arc::clone(&store),
        )
        .context("Failed to recover order header id")?;

        let instant_actions = InstantActionsBuilder::recover(
            InstantActionsTemplate::seeded(),
            config.identity.clone(),
            config.commands.instant_actions_qos,
            store,
        )
        .context("Failed to recover instant actions header id")?;

        Ok(Self {
            config,
            dispatcher,
            orders,
            instant_actions,
            connected: false,
        })
    }

    /// Order builder.
    #[must_use]
    pub fn orders(&self) -> &OrderBuilder {
        &self.orders
    }

    /// Instant actions builder.
    #[must_use]
    pub fn instant_actions(&self) -> &InstantActionsBuilder {
        &self.instant_actions
    }

    /// Whether the broker acknowledged the current session.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Route one inbound message.
    ///
    /// # Errors
    ///
    /// Returns why the message was dropped.
    pub fn handle_inbound(&self, topic: &str, payload: &[u8]) -> Result<Outcome, DispatchError> {
        self.dispatcher.dispatch(topic, payload)
    }

    /// Subscribe to every inbound topic and, if configured, publish the
    /// current templates.
    pub fn on_connected(&mut self, transport: &dyn Transport) {
        self.connected = true;

        if let Err(err) = self.dispatcher.subscribe_all(transport) {
            tracing::error!(error = %err, "Failed to subscribe");
        }

        if self.config.commands.publish_on_connect {
            if let Err(err) = self.instant_actions.publish(transport) {
                tracing::warn!(error = %err, "Failed to publish instant actions");
            }
            if let Err(err) = self.orders.publish(transport) {
                tracing::warn!(error = %err, "Failed to publish order");
            }
        }
    }

    /// Apply one command to the templates.
    ///
    /// # Errors
    ///
    /// Returns error if an edit is rejected or a publish fails. Publishes
    /// are refused with [`CommandError::NotConnected`] until the broker
    /// acknowledges a session.
    pub fn apply(
        &mut self,
        command: Command,
        transport: &dyn Transport,
    ) -> Result<CommandOutcome, CommandError> {
        match command {
            Command::Order(command) => {
                let orders = &mut self.orders;
                match command {
                    OrderCommand::SetOrder {
                        order_id,
                        order_update_id,
                    } => orders.set_order(order_id, order_update_id),
                    OrderCommand::AddNode(node) => orders.add_node(node),
                    OrderCommand::UpdateNode { index, update } => {
                        orders.update_node(index, update)?;
                    }
                    OrderCommand::RemoveNode(index) => {
                        orders.remove_node(index)?;
                    }
                    OrderCommand::AddEdge(edge) => orders.add_edge(edge),
                    OrderCommand::UpdateEdge { index, update } => {
                        orders.update_edge(index, update)?;
                    }
                    OrderCommand::RemoveEdge(index) => {
                        orders.remove_edge(index)?;
                    }
                    OrderCommand::Publish => {
                        if !self.connected {
                            return Err(CommandError::NotConnected);
                        }
                        return orders.publish(transport).map(CommandOutcome::Published);
                    }
                }
            }
            Command::InstantActions(command) => {
                let instant_actions = &mut self.instant_actions;
                match command {
                    InstantActionsCommand::AddAction(action) => instant_actions.add_action(action),
                    InstantActionsCommand::UpdateAction { index, update } => {
                        instant_actions.update_action(index, update)?;
                    }
                    InstantActionsCommand::RemoveAction(index) => {
                        instant_actions.remove_action(index)?;
                    }
                    InstantActionsCommand::Publish => {
                        if !self.connected {
                            return Err(CommandError::NotConnected);
                        }
                        return instant_actions
                            .publish(transport)
                            .map(CommandOutcome::Published);
                    }
                }
            }
        }

        Ok(CommandOutcome::Edited)
    }

    fn serve(&mut self, request: CommandRequest, transport: &dyn Transport) {
        let result = self.apply(request.command, transport);
        if request.reply.send(result).is_err() {
            tracing::debug!("Command submitter went away");
        }
    }

    /// Run the gateway's main loop until Ctrl-C.
    ///
    /// Commands arrive through `commands`; callers embed the library and
    /// keep the matching [`GatewayHandle`] to submit them.
    ///
    /// # Errors
    ///
    /// Returns error if the broker URL is invalid or the first connection
    /// attempt fails.
    pub async fn run(mut self, mut commands: CommandReceiver) -> Result<()> {
        tracing::info!(broker = %self.config.mqtt.broker, "Starting gateway runtime");

        let (transport, mut eventloop) =
            MqttTransport::connect(&self.config.mqtt).context("Failed to create MQTT client")?;

        let mut ever_connected = false;
        let mut commands_open = true;

        loop {
            tokio::select! {
                // Handle MQTT events
                event = eventloop.poll() => {
                    match event {
                        Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                            tracing::info!(code = ?ack.code, "Connected to broker");
                            ever_connected = true;
                            self.on_connected(&transport);
                        }
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            tracing::debug!(
                                topic = %publish.topic,
                                payload_len = publish.payload.len(),
                                "Received vehicle message"
                            );
                            match self.handle_inbound(&publish.topic, &publish.payload) {
                                Ok(outcome) => tracing::debug!(topic = %publish.topic, ?outcome, "Routed"),
                                Err(err) => tracing::warn!(topic = %publish.topic, error = %err, "Dropped vehicle message"),
                            }
                        }
                        Ok(_) => {}
                        Err(e) if !ever_connected => {
                            return Err(e).context("Failed to connect to MQTT broker");
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "MQTT error");
                            self.connected = false;
                            tokio::time::sleep(RECONNECT_DELAY).await;
                        }
                    }
                }

                // Handle commands
                request = commands.recv(), if commands_open => {
                    match request {
                        Some(request) => self.serve(request, &transport),
                        None => commands_open = false,
                    }
                }

                // Handle shutdown
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutdown signal received");
                    break;
                }
            }
        }

        tracing::info!("Gateway stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockTransport, TransportError};
    use agv_fleet_core::{PersistenceError, TemplateError};
    use agv_fleet_proto::Category;

    fn gateway(config: GatewayConfig) -> (Gateway, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let gateway = Gateway::with_store(config, store.clone()).unwrap();
        (gateway, store)
    }

    #[test]
    fn connect_subscribes_without_publishing_by_default() {
        let (mut gateway, _store) = gateway(GatewayConfig::default());

        let mut transport = MockTransport::new();
        transport.expect_subscribe().times(5).returning(|_, _| Ok(()));
        transport.expect_publish().never();

        gateway.on_connected(&transport);
    }

    #[test]
    fn connect_publishes_seeded_templates_when_enabled() {
        let mut config = GatewayConfig::default();
        config.commands.publish_on_connect = true;
        let (mut gateway, store) = gateway(config);

        let mut transport = MockTransport::new();
        transport.expect_subscribe().times(5).returning(|_, _| Ok(()));
        transport
            .expect_publish()
            .withf(|topic, _, qos, _| {
                topic == "uagv/v2/fleet/001/instantActions" && *qos == rumqttc::QoS::AtLeastOnce
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        transport
            .expect_publish()
            .withf(|topic, _, qos, _| {
                topic == "uagv/v2/fleet/001/order" && *qos == rumqttc::QoS::AtMostOnce
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        gateway.on_connected(&transport);

        assert_eq!(gateway.orders().header_id(), 1);
        assert_eq!(gateway.instant_actions().header_id(), 1);
        assert_eq!(store.count(Category::Order).unwrap(), 1);
        assert_eq!(store.count(Category::InstantActions).unwrap(), 1);
    }

    #[test]
    fn failed_subscription_does_not_stop_connect() {
        let mut config = GatewayConfig::default();
        config.commands.publish_on_connect = true;
        let (mut gateway, _store) = gateway(config);

        let mut transport = MockTransport::new();
        transport
            .expect_subscribe()
            .times(1)
            .returning(|_, _| Err(TransportError::Subscribe("queue full".to_string())));
        transport
            .expect_publish()
            .times(2)
            .returning(|_, _, _, _| Ok(()));

        gateway.on_connected(&transport);
    }

    #[test]
    fn apply_edits_then_publishes() {
        let (mut gateway, store) = gateway(GatewayConfig::default());
        gateway.connected = true;

        let mut transport = MockTransport::new();
        transport
            .expect_publish()
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let outcome = gateway
            .apply(
                Command::Order(OrderCommand::SetOrder {
                    order_id: "order_042".to_string(),
                    order_update_id: 3,
                }),
                &transport,
            )
            .unwrap();
        assert_eq!(outcome, CommandOutcome::Edited);

        let outcome = gateway
            .apply(Command::Order(OrderCommand::Publish), &transport)
            .unwrap();
        let CommandOutcome::Published(published) = outcome else {
            panic!("expected a publish, got {outcome:?}");
        };
        assert_eq!(published.header_id, 1);
        assert!(published.audited);
        assert_eq!(store.count(Category::Order).unwrap(), 1);
        assert_eq!(gateway.orders().template().order_id(), "order_042");
    }

    #[test]
    fn apply_reports_rejected_edit() {
        let (mut gateway, _store) = gateway(GatewayConfig::default());
        let transport = MockTransport::new();

        let err = gateway
            .apply(
                Command::InstantActions(InstantActionsCommand::RemoveAction(7)),
                &transport,
            )
            .unwrap_err();

        assert!(matches!(
            err,
            CommandError::Template(TemplateError::IndexOutOfRange { index: 7, .. })
        ));
        assert_eq!(gateway.instant_actions().template().actions().len(), 1);
    }

    #[test]
    fn publish_is_refused_until_connected() {
        let (mut gateway, store) = gateway(GatewayConfig::default());
        assert!(!gateway.is_connected());

        let mut transport = MockTransport::new();
        transport.expect_publish().never();

        let outcome = gateway
            .apply(
                Command::InstantActions(InstantActionsCommand::RemoveAction(0)),
                &transport,
            )
            .unwrap();
        assert_eq!(outcome, CommandOutcome::Edited);

        let err = gateway
            .apply(Command::Order(OrderCommand::Publish), &transport)
            .unwrap_err();
        assert!(matches!(err, CommandError::NotConnected));
        let err = gateway
            .apply(
                Command::InstantActions(InstantActionsCommand::Publish),
                &transport,
            )
            .unwrap_err();
        assert!(matches!(err, CommandError::NotConnected));

        assert_eq!(gateway.orders().header_id(), 0);
        assert_eq!(gateway.instant_actions().header_id(), 0);
        assert_eq!(store.count(Category::Order).unwrap(), 0);
        assert_eq!(store.count(Category::InstantActions).unwrap(), 0);
    }

    #[tokio::test]
    async fn unreachable_broker_records_no_commands() {
        let mut config = GatewayConfig::default();
        config.mqtt.broker = "tcp://127.0.0.1:1".to_string();
        let (gateway, store) = gateway(config);
        let (handle, commands) = command_channel(4);

        let submit = tokio::spawn(async move {
            handle
                .submit(Command::InstantActions(InstantActionsCommand::Publish))
                .await
        });

        assert!(gateway.run(commands).await.is_err());

        let result = submit.await.unwrap();
        assert!(matches!(
            result,
            Err(CommandError::NotConnected | CommandError::Closed)
        ));
        assert_eq!(store.count(Category::InstantActions).unwrap(), 0);
    }

    #[test]
    fn unreachable_store_fails_startup() {
        let mut store = agv_fleet_core::MockRecordStore::new();
        store
            .expect_max_header_id()
            .returning(|_| Err(PersistenceError::Unavailable("down".to_string())));

        let result = Gateway::with_store(GatewayConfig::default(), Arc::new(store));

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn handle_round_trips_through_the_channel() {
        let (mut gateway, _store) = gateway(GatewayConfig::default());
        gateway.connected = true;
        let (handle, mut commands) = command_channel(4);

        let submit = tokio::spawn(async move {
            handle
                .submit(Command::InstantActions(InstantActionsCommand::Publish))
                .await
        });

        let mut transport = MockTransport::new();
        transport
            .expect_publish()
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let request = commands.recv().await.unwrap();
        gateway.serve(request, &transport);

        let outcome = submit.await.unwrap().unwrap();
        assert!(matches!(outcome, CommandOutcome::Published(p) if p.header_id == 1));
    }

    #[tokio::test]
    async fn handle_reports_closed_gateway() {
        let (handle, commands) = command_channel(1);
        drop(commands);

        let err = handle
            .submit(Command::Order(OrderCommand::Publish))
            .await
            .unwrap_err();

        assert!(matches!(err, CommandError::Closed));
    }
}
