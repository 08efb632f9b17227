//! Method frame codec.
//!
//! A method frame payload starts with a fixed 4-byte header (big-endian class
//! id, big-endian method id) followed by the method arguments. Frame
//! reassembly happens in [`crate::frame`]; this module only ever sees one
//! complete method payload.

use bytes::{Buf, Bytes};
use thiserror::Error;

use crate::field::FieldError;
use crate::method::MethodKind;
use crate::version::ProtocolVersion;

/// Size of the class/method header.
pub const METHOD_HEADER_SIZE: usize = 4;

/// Errors raised while resolving or building method bodies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The payload is too short to hold the method header.
    #[error("Method header needs {METHOD_HEADER_SIZE} bytes, got {0}")]
    TruncatedHeader(usize),

    /// The class id lies beyond the version's class table.
    #[error(
        "Class {class_id} unknown in AMQP version {version} \
         (while trying to decode class {class_id} method {method_id})"
    )]
    UnknownClass {
        class_id: u16,
        method_id: u16,
        version: ProtocolVersion,
    },

    /// The class exists but the method slot is out of range or empty.
    #[error(
        "Method {method_id} unknown in AMQP version {version} \
         (while trying to decode class {class_id} method {method_id})"
    )]
    UnknownMethod {
        class_id: u16,
        method_id: u16,
        version: ProtocolVersion,
    },

    /// The arguments could not be decoded.
    #[error(
        "Malformed payload for class {class_id} method {method_id} \
         in AMQP version {version}: {source}"
    )]
    MalformedMethodPayload {
        class_id: u16,
        method_id: u16,
        version: ProtocolVersion,
        #[source]
        source: FieldError,
    },

    /// A builder was asked for a method the version does not declare.
    #[error("{kind:?} is not declared in AMQP version {version}")]
    MethodNotInVersion {
        kind: MethodKind,
        version: ProtocolVersion,
    },

    /// A builder was given arguments that do not match the declaration.
    #[error("Invalid arguments for {name}: {source}")]
    InvalidArguments {
        name: &'static str,
        #[source]
        source: FieldError,
    },
}

impl DecodeError {
    /// Class id the error refers to, if any.
    #[must_use]
    pub fn class_id(&self) -> Option<u16> {
        match self {
            DecodeError::UnknownClass { class_id, .. }
            | DecodeError::UnknownMethod { class_id, .. }
            | DecodeError::MalformedMethodPayload { class_id, .. } => Some(*class_id),
            _ => None,
        }
    }

    /// Method id the error refers to, if any.
    #[must_use]
    pub fn method_id(&self) -> Option<u16> {
        match self {
            DecodeError::UnknownClass { method_id, .. }
            | DecodeError::UnknownMethod { method_id, .. }
            | DecodeError::MalformedMethodPayload { method_id, .. } => Some(*method_id),
            _ => None,
        }
    }

    /// Whether the error was caused by bytes received from the peer.
    #[must_use]
    pub fn is_peer_error(&self) -> bool {
        !matches!(
            self,
            DecodeError::MethodNotInVersion { .. } | DecodeError::InvalidArguments { .. }
        )
    }
}

/// Split a method frame payload into `(class_id, method_id, arguments)`.
///
/// # Errors
///
/// Returns [`DecodeError::TruncatedHeader`] if fewer than 4 bytes are present.
pub fn decode_method(mut payload: Bytes) -> Result<(u16, u16, Bytes), DecodeError> {
    if payload.len() < METHOD_HEADER_SIZE {
        return Err(DecodeError::TruncatedHeader(payload.len()));
    }
    let class_id = payload.get_u16();
    let method_id = payload.get_u16();
    Ok((class_id, method_id, payload))
}
