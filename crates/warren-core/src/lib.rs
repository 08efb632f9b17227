//! # warren-core
//!
//! Channel-level protocol state machine for the Warren AMQP broker.
//!
//! This crate provides the pieces between a decoded method frame and the
//! frames written back to the peer:
//!
//! - **Channel** - flow state, unacknowledged deliveries, outbound buffer
//! - **ConnectionContext** - what handlers may see and do on a connection
//! - **Dispatcher** - routes each method to its stateless handler
//! - **VersionPolicy** - the per-version behavior switches handlers consult
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌─────────────┐
//! │   Session   │────▶│  Dispatcher  │────▶│   Handler   │
//! └─────────────┘     └──────────────┘     └─────────────┘
//!        ▲                                        │
//!        │          ┌────────────────────┐        │
//!        └──────────│ ConnectionContext  │◀───────┘
//!                   └────────────────────┘
//! ```

pub mod channel;
pub mod connection;
pub mod error;
pub mod handlers;
pub mod policy;
pub mod vhost;

pub use channel::{Channel, DeliveryOutcome, FlowGate, UnackedDelivery};
pub use connection::{ConnectionContext, ConnectionState};
pub use error::{Defect, DispatchError, DispatchResult, InvalidReason, ProtocolViolation};
pub use handlers::{Dispatcher, MethodHandler};
pub use policy::{ChannelIdPolicy, RecoverCompletion, VersionPolicy};
pub use vhost::{MemoryMessageStore, MessageStore, VirtualHost, VirtualHostRegistry};
