//! # warren-protocol
//!
//! AMQP wire protocol for the Warren broker: frame layout, field encoding,
//! and the per-version method tables for 0-8, 0-9 and 0-9-1.
//!
//! ## Method registries
//!
//! Each supported version has one immutable [`MethodRegistry`]. It turns a
//! method frame payload into a [`MethodBody`] and builds reply bodies with
//! the class/method numbering of that version.
//!
//! ```rust
//! use bytes::Bytes;
//! use warren_protocol::{MethodKind, MethodRegistry, V0_91};
//!
//! let registry = MethodRegistry::for_version(V0_91).unwrap();
//!
//! // channel.flow(active = true)
//! let body = registry.decode(Bytes::from_static(&[0, 20, 0, 20, 1])).unwrap();
//! assert_eq!(body.kind(), MethodKind::ChannelFlow);
//!
//! let reply = registry.create_channel_flow_ok(true).unwrap();
//! assert_eq!(&reply.encode()[..], &[0, 20, 0, 21, 1]);
//! ```

pub mod codec;
pub mod definitions;
pub mod field;
pub mod frame;
pub mod method;
pub mod registry;
pub mod table;
pub mod version;

pub use codec::{decode_method, DecodeError, METHOD_HEADER_SIZE};
pub use field::{FieldError, FieldTable, FieldType, FieldValue, TableValue};
pub use frame::{ContentHeader, Frame, FrameError, FrameType, ProtocolInitiation};
pub use method::{MethodBody, MethodKind, MethodSpec};
pub use registry::MethodRegistry;
pub use table::VersionMethodTable;
pub use version::{ProtocolVersion, SUPPORTED_VERSIONS, V0_8, V0_9, V0_91};
