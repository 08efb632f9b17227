//! # warren-transport
//!
//! Transport abstraction layer for the Warren AMQP broker.
//!
//! A transport accepts connections; a connection exchanges the protocol
//! header and then reassembled AMQP frames. TCP is the only transport.
//!
//! ```rust,ignore
//! use warren_transport::{Connection, Transport};
//!
//! async fn handle_connection(mut conn: Box<dyn Connection>) {
//!     let header = conn.recv_protocol_header().await?;
//!     while let Some(frame) = conn.recv().await? {
//!         // Process frame
//!     }
//! }
//! ```

pub mod tcp;
pub mod traits;

pub use tcp::{TcpConfig, TcpConnection, TcpTransport};
pub use traits::{Connection, ConnectionId, Transport, TransportError};
