//! # AGV Fleet Gateway
//!
//! Bridges a VDA5050 vehicle fleet on an MQTT broker and a `SQLite` store.
//!
//! ## Architecture
//!
//! A single task owns the MQTT event loop and runs three flows:
//! 1. **Ingress**: Vehicle messages are routed by topic, validated against
//!    their category schema, normalized and stored
//! 2. **Commands**: Order and instant action templates are edited through a
//!    [`GatewayHandle`] and published with consecutive header ids
//! 3. **Audit**: Every published command is stored, which is also where the
//!    header id counters resume from after a restart

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod persistence;
pub mod runtime;
pub mod transport;

pub use commands::{CommandBuilder, CommandError, InstantActionsBuilder, OrderBuilder, Published};
pub use config::GatewayConfig;
pub use dispatcher::{DispatchError, Dispatcher, Outcome, Subscription};
pub use persistence::SqliteStore;
pub use runtime::{
    command_channel, Command, CommandOutcome, CommandReceiver, Gateway, GatewayHandle,
    InstantActionsCommand, OrderCommand,
};
pub use transport::{MqttTransport, Transport, TransportError};
