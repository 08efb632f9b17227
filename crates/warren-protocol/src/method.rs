//! Method descriptors and decoded method bodies.
//!
//! Every version table is a list of [`MethodSpec`] descriptors. A descriptor
//! is the stateless factory for its method: it knows the wire identity and the
//! ordered argument list, and turns a payload cursor into a [`MethodBody`].

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{DecodeError, METHOD_HEADER_SIZE};
use crate::field::{self, FieldError, FieldSpec, FieldTable, FieldValue};
use crate::frame::Frame;
use crate::version::ProtocolVersion;

/// Every method known to any supported version.
///
/// The same kind may carry different class/method numbers or arguments in
/// different versions; the version tables hold the mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodKind {
    ConnectionStart,
    ConnectionStartOk,
    ConnectionSecure,
    ConnectionSecureOk,
    ConnectionTune,
    ConnectionTuneOk,
    ConnectionOpen,
    ConnectionOpenOk,
    ConnectionRedirect,
    ConnectionClose,
    ConnectionCloseOk,

    ChannelOpen,
    ChannelOpenOk,
    ChannelFlow,
    ChannelFlowOk,
    ChannelAlert,
    ChannelClose,
    ChannelCloseOk,
    ChannelResume,
    ChannelPing,
    ChannelPong,
    ChannelOk,

    AccessRequest,
    AccessRequestOk,

    ExchangeDeclare,
    ExchangeDeclareOk,
    ExchangeDelete,
    ExchangeDeleteOk,
    ExchangeBound,
    ExchangeBoundOk,

    QueueDeclare,
    QueueDeclareOk,
    QueueBind,
    QueueBindOk,
    QueuePurge,
    QueuePurgeOk,
    QueueDelete,
    QueueDeleteOk,
    QueueUnbind,
    QueueUnbindOk,

    BasicQos,
    BasicQosOk,
    BasicConsume,
    BasicConsumeOk,
    BasicCancel,
    BasicCancelOk,
    BasicPublish,
    BasicReturn,
    BasicDeliver,
    BasicGet,
    BasicGetOk,
    BasicGetEmpty,
    BasicAck,
    BasicReject,
    BasicRecover,
    BasicRecoverOk,
    BasicRecoverSync,
    BasicRecoverSyncOk,

    FileQos,
    FileQosOk,
    FileConsume,
    FileConsumeOk,
    FileCancel,
    FileCancelOk,
    FileOpen,
    FileOpenOk,
    FileStage,
    FilePublish,
    FileReturn,
    FileDeliver,
    FileAck,
    FileReject,

    StreamQos,
    StreamQosOk,
    StreamConsume,
    StreamConsumeOk,
    StreamCancel,
    StreamCancelOk,
    StreamPublish,
    StreamReturn,
    StreamDeliver,

    TxSelect,
    TxSelectOk,
    TxCommit,
    TxCommitOk,
    TxRollback,
    TxRollbackOk,

    DtxSelect,
    DtxSelectOk,
    DtxStart,
    DtxStartOk,

    TunnelRequest,

    TestInteger,
    TestIntegerOk,
    TestString,
    TestStringOk,
    TestTable,
    TestTableOk,
    TestContent,
    TestContentOk,

    MessageTransfer,
    MessageConsume,
    MessageCancel,
    MessageGet,
    MessageRecover,
    MessageOpen,
    MessageClose,
    MessageAppend,
    MessageCheckpoint,
    MessageResume,
    MessageQos,
    MessageOk,
    MessageEmpty,
    MessageReject,
    MessageOffset,
}

/// Static descriptor of one method in one protocol version.
#[derive(Debug, PartialEq, Eq)]
pub struct MethodSpec {
    pub kind: MethodKind,
    pub class_id: u16,
    pub method_id: u16,
    /// Wire name, e.g. `channel.flow-ok`.
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
}

impl MethodSpec {
    /// Decode a method payload (the bytes after the 4-byte method header).
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::MalformedMethodPayload`] if the payload does not
    /// match the declared arguments exactly.
    pub fn new_instance(
        &'static self,
        version: ProtocolVersion,
        mut payload: Bytes,
    ) -> Result<MethodBody, DecodeError> {
        let fields = field::decode_fields(self.fields, &mut payload).map_err(|source| {
            DecodeError::MalformedMethodPayload {
                class_id: self.class_id,
                method_id: self.method_id,
                version,
                source,
            }
        })?;
        Ok(MethodBody {
            spec: self,
            version,
            fields,
        })
    }

    /// Build a body from argument values.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidArguments`] on arity or domain mismatch.
    pub fn construct(
        &'static self,
        version: ProtocolVersion,
        fields: Vec<FieldValue>,
    ) -> Result<MethodBody, DecodeError> {
        field::validate(self.fields, &fields).map_err(|source| DecodeError::InvalidArguments {
            name: self.name,
            source,
        })?;
        Ok(MethodBody {
            spec: self,
            version,
            fields,
        })
    }
}

/// A decoded, immutable method invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodBody {
    spec: &'static MethodSpec,
    version: ProtocolVersion,
    fields: Vec<FieldValue>,
}

impl MethodBody {
    #[must_use]
    pub fn kind(&self) -> MethodKind {
        self.spec.kind
    }

    #[must_use]
    pub fn class_id(&self) -> u16 {
        self.spec.class_id
    }

    #[must_use]
    pub fn method_id(&self) -> u16 {
        self.spec.method_id
    }

    /// Wire name of the method.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.spec.name
    }

    /// Version whose table produced this body.
    #[must_use]
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    #[must_use]
    pub fn spec(&self) -> &'static MethodSpec {
        self.spec
    }

    /// Argument values in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldValue] {
        &self.fields
    }

    /// Look up an argument by its wire name.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::NoSuchField`] if the method declares no such argument.
    pub fn field(&self, name: &str) -> Result<&FieldValue, FieldError> {
        self.spec
            .fields
            .iter()
            .position(|f| f.name == name)
            .map(|i| &self.fields[i])
            .ok_or_else(|| FieldError::NoSuchField(name.to_string()))
    }

    fn mismatch(&self, name: &str, expected: field::FieldType) -> FieldError {
        match self.spec.fields.iter().position(|f| f.name == name) {
            Some(i) => FieldError::TypeMismatch {
                field: self.spec.fields[i].name,
                expected,
                actual: self.fields[i].field_type(),
            },
            None => FieldError::NoSuchField(name.to_string()),
        }
    }

    /// # Errors
    ///
    /// Fails if the argument is missing or not a `bit`.
    pub fn bit(&self, name: &str) -> Result<bool, FieldError> {
        match self.field(name)? {
            FieldValue::Bit(v) => Ok(*v),
            _ => Err(self.mismatch(name, field::FieldType::Bit)),
        }
    }

    /// # Errors
    ///
    /// Fails if the argument is missing or not an `octet`.
    pub fn octet(&self, name: &str) -> Result<u8, FieldError> {
        match self.field(name)? {
            FieldValue::Octet(v) => Ok(*v),
            _ => Err(self.mismatch(name, field::FieldType::Octet)),
        }
    }

    /// # Errors
    ///
    /// Fails if the argument is missing or not a `short`.
    pub fn short(&self, name: &str) -> Result<u16, FieldError> {
        match self.field(name)? {
            FieldValue::Short(v) => Ok(*v),
            _ => Err(self.mismatch(name, field::FieldType::Short)),
        }
    }

    /// # Errors
    ///
    /// Fails if the argument is missing or not a `long`.
    pub fn long(&self, name: &str) -> Result<u32, FieldError> {
        match self.field(name)? {
            FieldValue::Long(v) => Ok(*v),
            _ => Err(self.mismatch(name, field::FieldType::Long)),
        }
    }

    /// # Errors
    ///
    /// Fails if the argument is missing or not a `longlong`.
    pub fn longlong(&self, name: &str) -> Result<u64, FieldError> {
        match self.field(name)? {
            FieldValue::LongLong(v) => Ok(*v),
            _ => Err(self.mismatch(name, field::FieldType::LongLong)),
        }
    }

    /// # Errors
    ///
    /// Fails if the argument is missing or not a `shortstr`.
    pub fn shortstr(&self, name: &str) -> Result<&Bytes, FieldError> {
        match self.field(name)? {
            FieldValue::ShortStr(v) => Ok(v),
            _ => Err(self.mismatch(name, field::FieldType::ShortStr)),
        }
    }

    /// # Errors
    ///
    /// Fails if the argument is missing or not a `longstr`.
    pub fn longstr(&self, name: &str) -> Result<&Bytes, FieldError> {
        match self.field(name)? {
            FieldValue::LongStr(v) => Ok(v),
            _ => Err(self.mismatch(name, field::FieldType::LongStr)),
        }
    }

    /// # Errors
    ///
    /// Fails if the argument is missing or not a `table`.
    pub fn table(&self, name: &str) -> Result<&FieldTable, FieldError> {
        match self.field(name)? {
            FieldValue::Table(v) => Ok(v),
            _ => Err(self.mismatch(name, field::FieldType::Table)),
        }
    }

    /// Size of the encoded method, header included.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        METHOD_HEADER_SIZE + field::encoded_len(&self.fields)
    }

    /// Append the method header and arguments to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());
        buf.put_u16(self.spec.class_id);
        buf.put_u16(self.spec.method_id);
        field::encode_fields(&self.fields, buf);
    }

    /// Encode the method header and arguments.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Wrap the encoded method in a method frame for `channel`.
    #[must_use]
    pub fn to_frame(&self, channel: u16) -> Frame {
        Frame::method(channel, self.encode())
    }
}

impl std::fmt::Display for MethodBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}", self.spec.name)?;
        for (spec, value) in self.spec.fields.iter().zip(&self.fields) {
            write!(f, " {}=", spec.name)?;
            match value {
                FieldValue::ShortStr(s) | FieldValue::LongStr(s) => {
                    write!(f, "{:?}", String::from_utf8_lossy(s))?;
                }
                FieldValue::Table(t) => write!(f, "<table:{}>", t.len())?,
                FieldValue::Octet(v) => write!(f, "{v}")?,
                FieldValue::Short(v) => write!(f, "{v}")?,
                FieldValue::Long(v) => write!(f, "{v}")?,
                FieldValue::LongLong(v) | FieldValue::Timestamp(v) => write!(f, "{v}")?,
                FieldValue::Bit(v) => write!(f, "{v}")?,
            }
        }
        f.write_str("]")
    }
}
