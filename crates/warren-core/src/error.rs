//! Errors raised while dispatching methods.
//!
//! Two families: [`ProtocolViolation`]s are the peer's fault and become a
//! `connection.close` carrying an AMQP reply code; [`Defect`]s are broker
//! bugs, logged and never serialized.

use thiserror::Error;
use warren_protocol::{DecodeError, MethodBody, MethodRegistry, ProtocolVersion};

/// AMQP reply codes used by the broker.
pub mod reply_code {
    pub const FRAME_ERROR: u16 = 501;
    pub const SYNTAX_ERROR: u16 = 502;
    pub const COMMAND_INVALID: u16 = 503;
    pub const CHANNEL_ERROR: u16 = 504;
    pub const UNEXPECTED_FRAME: u16 = 505;
    pub const NOT_ALLOWED: u16 = 530;
    pub const NOT_IMPLEMENTED: u16 = 540;
    pub const INTERNAL_ERROR: u16 = 541;
}

/// Result of dispatching one method.
pub type DispatchResult = Result<(), DispatchError>;

/// Error returned by the dispatcher and handlers.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Violation(#[from] ProtocolViolation),

    #[error(transparent)]
    Defect(#[from] Defect),
}

/// Why a command was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidReason {
    /// `channel.open` arrived before `connection.open` bound a virtual host.
    NoVirtualHost,
    /// Channel 0 is reserved for the connection class.
    ReservedChannel,
    /// Acknowledged a delivery tag that is not outstanding.
    UnknownDeliveryTag(u64),
    /// No handler is registered for the method.
    NotImplemented,
    /// `connection.open` named a virtual host that does not exist.
    UnknownVirtualHost(String),
    /// A connection-class method arrived in the wrong handshake phase.
    OutOfSequence,
    /// `channel.open` named a channel above the negotiated `channel-max`.
    ChannelMaxExceeded(u16),
}

impl std::fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidReason::NoVirtualHost => {
                f.write_str("Virtualhost has not yet been set. ConnectionOpen has not been called.")
            }
            InvalidReason::ReservedChannel => f.write_str("Channel 0 is reserved"),
            InvalidReason::UnknownDeliveryTag(tag) => write!(f, "Unknown delivery tag {tag}"),
            InvalidReason::NotImplemented => f.write_str("Method not implemented"),
            InvalidReason::UnknownVirtualHost(name) => write!(f, "Unknown virtual host: {name}"),
            InvalidReason::OutOfSequence => f.write_str("Method out of sequence"),
            InvalidReason::ChannelMaxExceeded(max) => write!(f, "Channel id exceeds channel-max {max}"),
        }
    }
}

/// A peer-caused error, closed back to the peer with a reply code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("Unknown channel id: {channel} (class {class_id} method {method_id}, AMQP {version})")]
    ChannelNotFound {
        version: ProtocolVersion,
        class_id: u16,
        method_id: u16,
        channel: u16,
    },

    #[error("{reason} (class {class_id} method {method_id} on channel {channel}, AMQP {version})")]
    CommandInvalid {
        version: ProtocolVersion,
        class_id: u16,
        method_id: u16,
        channel: u16,
        reason: InvalidReason,
    },

    #[error("Channel {channel} already open (AMQP {version})")]
    ChannelAlreadyOpen {
        version: ProtocolVersion,
        class_id: u16,
        method_id: u16,
        channel: u16,
    },

    #[error("Unexpected {frame} frame on channel {channel} (AMQP {version})")]
    UnexpectedFrame {
        version: ProtocolVersion,
        channel: u16,
        frame: &'static str,
    },

    #[error("{source} (channel {channel})")]
    Decode {
        channel: u16,
        #[source]
        source: DecodeError,
    },
}

impl ProtocolViolation {
    pub fn channel_not_found(body: &MethodBody, channel: u16) -> Self {
        ProtocolViolation::ChannelNotFound {
            version: body.version(),
            class_id: body.class_id(),
            method_id: body.method_id(),
            channel,
        }
    }

    pub fn command_invalid(body: &MethodBody, channel: u16, reason: InvalidReason) -> Self {
        ProtocolViolation::CommandInvalid {
            version: body.version(),
            class_id: body.class_id(),
            method_id: body.method_id(),
            channel,
            reason,
        }
    }

    /// AMQP reply code sent in `connection.close`.
    #[must_use]
    pub fn reply_code(&self) -> u16 {
        match self {
            ProtocolViolation::ChannelNotFound { .. } | ProtocolViolation::ChannelAlreadyOpen { .. } => {
                reply_code::CHANNEL_ERROR
            }
            ProtocolViolation::CommandInvalid {
                reason: InvalidReason::NotImplemented,
                ..
            } => reply_code::NOT_IMPLEMENTED,
            ProtocolViolation::CommandInvalid {
                reason: InvalidReason::UnknownVirtualHost(_),
                ..
            } => reply_code::NOT_ALLOWED,
            ProtocolViolation::CommandInvalid {
                reason: InvalidReason::ChannelMaxExceeded(_),
                ..
            } => reply_code::CHANNEL_ERROR,
            ProtocolViolation::CommandInvalid { .. } => reply_code::COMMAND_INVALID,
            ProtocolViolation::UnexpectedFrame { .. } => reply_code::UNEXPECTED_FRAME,
            ProtocolViolation::Decode { source, .. } => match source {
                DecodeError::UnknownClass { .. } | DecodeError::UnknownMethod { .. } => {
                    reply_code::NOT_IMPLEMENTED
                }
                DecodeError::TruncatedHeader(_) | DecodeError::MalformedMethodPayload { .. } => {
                    reply_code::SYNTAX_ERROR
                }
                DecodeError::MethodNotInVersion { .. } | DecodeError::InvalidArguments { .. } => {
                    reply_code::INTERNAL_ERROR
                }
            },
        }
    }

    /// Class and method the violation refers to, `(0, 0)` when unknown.
    #[must_use]
    pub fn method_ids(&self) -> (u16, u16) {
        match self {
            ProtocolViolation::ChannelNotFound { class_id, method_id, .. }
            | ProtocolViolation::CommandInvalid { class_id, method_id, .. }
            | ProtocolViolation::ChannelAlreadyOpen { class_id, method_id, .. } => {
                (*class_id, *method_id)
            }
            ProtocolViolation::UnexpectedFrame { .. } => (0, 0),
            ProtocolViolation::Decode { source, .. } => {
                (source.class_id().unwrap_or(0), source.method_id().unwrap_or(0))
            }
        }
    }

    /// Channel the offending frame arrived on.
    #[must_use]
    pub fn channel(&self) -> u16 {
        match self {
            ProtocolViolation::ChannelNotFound { channel, .. }
            | ProtocolViolation::CommandInvalid { channel, .. }
            | ProtocolViolation::ChannelAlreadyOpen { channel, .. }
            | ProtocolViolation::UnexpectedFrame { channel, .. }
            | ProtocolViolation::Decode { channel, .. } => *channel,
        }
    }

    /// Whether the broker should close the whole connection.
    ///
    /// The broker closes the connection for every violation; this only
    /// distinguishes hard errors from channel-scoped ones for logging.
    #[must_use]
    pub fn is_connection_fatal(&self) -> bool {
        !matches!(
            self,
            ProtocolViolation::ChannelNotFound { .. } | ProtocolViolation::ChannelAlreadyOpen { .. }
        )
    }

    /// Version-correct `connection.close` describing this violation.
    ///
    /// # Errors
    ///
    /// Fails only if the registry cannot build `connection.close`.
    pub fn close_method(&self, registry: &MethodRegistry) -> Result<MethodBody, DecodeError> {
        let (class_id, method_id) = self.method_ids();
        let mut text = self.to_string();
        // reply-text is a short string
        if text.len() > 255 {
            let mut end = 255;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            text.truncate(end);
        }
        registry.create_connection_close(self.reply_code(), &text, class_id, method_id)
    }
}

/// A broker bug. Never sent to the peer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Defect {
    #[error("No method table for AMQP version {0}")]
    UnsupportedVersion(ProtocolVersion),

    #[error("No handler registered for {0}")]
    HandlerMissing(&'static str),

    #[error("Could not build {method}: {source}")]
    BuildFailed {
        method: &'static str,
        #[source]
        source: DecodeError,
    },

    #[error("Bad argument access on {method}: {reason}")]
    FieldAccess {
        method: &'static str,
        reason: String,
    },
}
