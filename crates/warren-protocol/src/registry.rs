//! Per-version method registries.
//!
//! A [`MethodRegistry`] decodes incoming method payloads and builds outgoing
//! method bodies for exactly one protocol version. Registries are immutable
//! and built once per process; [`MethodRegistry::for_version`] hands out
//! shared `'static` references.

use std::sync::OnceLock;

use bytes::Bytes;

use crate::codec::DecodeError;
use crate::definitions::{amqp0_8, amqp0_9, amqp0_91};
use crate::field::{FieldTable, FieldValue};
use crate::method::{MethodBody, MethodKind, MethodSpec};
use crate::table::VersionMethodTable;
use crate::version::{ProtocolVersion, V0_8, V0_9, V0_91};

/// Decoder and method builder for one protocol version.
#[derive(Debug)]
pub struct MethodRegistry {
    table: VersionMethodTable,
}

static REGISTRY_0_8: OnceLock<MethodRegistry> = OnceLock::new();
static REGISTRY_0_9: OnceLock<MethodRegistry> = OnceLock::new();
static REGISTRY_0_91: OnceLock<MethodRegistry> = OnceLock::new();

impl MethodRegistry {
    /// Shared registry for `version`, or `None` if the version is unsupported.
    #[must_use]
    pub fn for_version(version: ProtocolVersion) -> Option<&'static MethodRegistry> {
        let (cell, methods) = match version {
            V0_8 => (&REGISTRY_0_8, amqp0_8::METHODS),
            V0_9 => (&REGISTRY_0_9, amqp0_9::METHODS),
            V0_91 => (&REGISTRY_0_91, amqp0_91::METHODS),
            _ => return None,
        };
        Some(cell.get_or_init(|| MethodRegistry {
            table: VersionMethodTable::build(version, methods),
        }))
    }

    #[must_use]
    pub fn version(&self) -> ProtocolVersion {
        self.table.version()
    }

    #[must_use]
    pub fn table(&self) -> &VersionMethodTable {
        &self.table
    }

    /// Resolve a method by id and decode its arguments.
    ///
    /// # Errors
    ///
    /// See [`VersionMethodTable::resolve`].
    pub fn resolve(&self, class_id: u16, method_id: u16, args: Bytes) -> Result<MethodBody, DecodeError> {
        self.table.resolve(class_id, method_id, args)
    }

    /// Decode a whole method frame payload.
    ///
    /// # Errors
    ///
    /// See [`VersionMethodTable::decode`].
    pub fn decode(&self, payload: Bytes) -> Result<MethodBody, DecodeError> {
        self.table.decode(payload)
    }

    /// Whether this version declares `kind`.
    #[must_use]
    pub fn declares(&self, kind: MethodKind) -> bool {
        self.table.spec_for(kind).is_some()
    }

    fn spec(&self, kind: MethodKind) -> Result<&'static MethodSpec, DecodeError> {
        self.table
            .spec_for(kind)
            .ok_or(DecodeError::MethodNotInVersion {
                kind,
                version: self.version(),
            })
    }

    /// Build any declared method from its argument values in wire order.
    ///
    /// # Errors
    ///
    /// [`DecodeError::MethodNotInVersion`] if this version lacks `kind`,
    /// [`DecodeError::InvalidArguments`] if the values do not match.
    pub fn create(&self, kind: MethodKind, fields: Vec<FieldValue>) -> Result<MethodBody, DecodeError> {
        self.spec(kind)?.construct(self.version(), fields)
    }

    // connection

    /// # Errors
    ///
    /// Fails only if the version lacks the method.
    pub fn create_connection_start(
        &self,
        server_properties: FieldTable,
        mechanisms: &str,
        locales: &str,
    ) -> Result<MethodBody, DecodeError> {
        let (major, minor) = self.version().advertised();
        self.create(
            MethodKind::ConnectionStart,
            vec![
                FieldValue::Octet(major),
                FieldValue::Octet(minor),
                FieldValue::Table(server_properties),
                FieldValue::long_str(Bytes::copy_from_slice(mechanisms.as_bytes())),
                FieldValue::long_str(Bytes::copy_from_slice(locales.as_bytes())),
            ],
        )
    }

    /// # Errors
    ///
    /// Fails if the version lacks the method or a string is too long.
    pub fn create_connection_start_ok(
        &self,
        client_properties: FieldTable,
        mechanism: &str,
        response: Bytes,
        locale: &str,
    ) -> Result<MethodBody, DecodeError> {
        self.create(
            MethodKind::ConnectionStartOk,
            vec![
                FieldValue::Table(client_properties),
                FieldValue::short_str(mechanism),
                FieldValue::LongStr(response),
                FieldValue::short_str(locale),
            ],
        )
    }

    /// # Errors
    ///
    /// Fails only if the version lacks the method.
    pub fn create_connection_tune(
        &self,
        channel_max: u16,
        frame_max: u32,
        heartbeat: u16,
    ) -> Result<MethodBody, DecodeError> {
        self.create(
            MethodKind::ConnectionTune,
            vec![
                FieldValue::Short(channel_max),
                FieldValue::Long(frame_max),
                FieldValue::Short(heartbeat),
            ],
        )
    }

    /// # Errors
    ///
    /// Fails only if the version lacks the method.
    pub fn create_connection_tune_ok(
        &self,
        channel_max: u16,
        frame_max: u32,
        heartbeat: u16,
    ) -> Result<MethodBody, DecodeError> {
        self.create(
            MethodKind::ConnectionTuneOk,
            vec![
                FieldValue::Short(channel_max),
                FieldValue::Long(frame_max),
                FieldValue::Short(heartbeat),
            ],
        )
    }

    /// # Errors
    ///
    /// Fails if the version lacks the method or a string is too long.
    pub fn create_connection_open(&self, virtual_host: &str) -> Result<MethodBody, DecodeError> {
        self.create(
            MethodKind::ConnectionOpen,
            vec![
                FieldValue::short_str(virtual_host),
                FieldValue::short_str(""),
                FieldValue::Bit(false),
            ],
        )
    }

    /// # Errors
    ///
    /// Fails if the version lacks the method or a string is too long.
    pub fn create_connection_open_ok(&self, known_hosts: &str) -> Result<MethodBody, DecodeError> {
        self.create(MethodKind::ConnectionOpenOk, vec![FieldValue::short_str(known_hosts)])
    }

    /// # Errors
    ///
    /// Fails if the version lacks the method or the text is too long.
    pub fn create_connection_close(
        &self,
        reply_code: u16,
        reply_text: &str,
        class_id: u16,
        method_id: u16,
    ) -> Result<MethodBody, DecodeError> {
        self.create(
            MethodKind::ConnectionClose,
            vec![
                FieldValue::Short(reply_code),
                FieldValue::short_str(reply_text),
                FieldValue::Short(class_id),
                FieldValue::Short(method_id),
            ],
        )
    }

    /// # Errors
    ///
    /// Fails only if the version lacks the method.
    pub fn create_connection_close_ok(&self) -> Result<MethodBody, DecodeError> {
        self.create(MethodKind::ConnectionCloseOk, Vec::new())
    }

    // channel

    /// # Errors
    ///
    /// Fails only if the version lacks the method.
    pub fn create_channel_open(&self) -> Result<MethodBody, DecodeError> {
        self.create(MethodKind::ChannelOpen, vec![FieldValue::short_str("")])
    }

    /// Build `channel.open-ok`.
    ///
    /// 0-8 declares no arguments and ignores `channel_id`; later versions
    /// carry it as a long string, empty when `None`.
    ///
    /// # Errors
    ///
    /// Fails only if the version lacks the method.
    pub fn create_channel_open_ok(&self, channel_id: Option<Bytes>) -> Result<MethodBody, DecodeError> {
        let spec = self.spec(MethodKind::ChannelOpenOk)?;
        let fields = if spec.fields.is_empty() {
            Vec::new()
        } else {
            vec![FieldValue::LongStr(channel_id.unwrap_or_default())]
        };
        spec.construct(self.version(), fields)
    }

    /// # Errors
    ///
    /// Fails only if the version lacks the method.
    pub fn create_channel_flow(&self, active: bool) -> Result<MethodBody, DecodeError> {
        self.create(MethodKind::ChannelFlow, vec![FieldValue::Bit(active)])
    }

    /// # Errors
    ///
    /// Fails only if the version lacks the method.
    pub fn create_channel_flow_ok(&self, active: bool) -> Result<MethodBody, DecodeError> {
        self.create(MethodKind::ChannelFlowOk, vec![FieldValue::Bit(active)])
    }

    /// # Errors
    ///
    /// Fails if the version lacks the method or the text is too long.
    pub fn create_channel_close(
        &self,
        reply_code: u16,
        reply_text: &str,
        class_id: u16,
        method_id: u16,
    ) -> Result<MethodBody, DecodeError> {
        self.create(
            MethodKind::ChannelClose,
            vec![
                FieldValue::Short(reply_code),
                FieldValue::short_str(reply_text),
                FieldValue::Short(class_id),
                FieldValue::Short(method_id),
            ],
        )
    }

    /// # Errors
    ///
    /// Fails only if the version lacks the method.
    pub fn create_channel_close_ok(&self) -> Result<MethodBody, DecodeError> {
        self.create(MethodKind::ChannelCloseOk, Vec::new())
    }

    // basic

    /// # Errors
    ///
    /// Fails if the version lacks the method or a string is too long.
    pub fn create_basic_deliver(
        &self,
        consumer_tag: &str,
        delivery_tag: u64,
        redelivered: bool,
        exchange: &str,
        routing_key: &str,
    ) -> Result<MethodBody, DecodeError> {
        self.create(
            MethodKind::BasicDeliver,
            vec![
                FieldValue::short_str(consumer_tag),
                FieldValue::LongLong(delivery_tag),
                FieldValue::Bit(redelivered),
                FieldValue::short_str(exchange),
                FieldValue::short_str(routing_key),
            ],
        )
    }

    /// # Errors
    ///
    /// Fails only if the version lacks the method.
    pub fn create_basic_ack(&self, delivery_tag: u64, multiple: bool) -> Result<MethodBody, DecodeError> {
        self.create(
            MethodKind::BasicAck,
            vec![FieldValue::LongLong(delivery_tag), FieldValue::Bit(multiple)],
        )
    }

    /// # Errors
    ///
    /// Fails only if the version lacks the method.
    pub fn create_basic_recover(&self, requeue: bool) -> Result<MethodBody, DecodeError> {
        self.create(MethodKind::BasicRecover, vec![FieldValue::Bit(requeue)])
    }

    /// # Errors
    ///
    /// Fails only if the version lacks the method.
    pub fn create_basic_recover_sync(&self, requeue: bool) -> Result<MethodBody, DecodeError> {
        self.create(MethodKind::BasicRecoverSync, vec![FieldValue::Bit(requeue)])
    }

    /// `basic.recover-ok`, declared only by 0-8.
    ///
    /// # Errors
    ///
    /// [`DecodeError::MethodNotInVersion`] on 0-9 and 0-9-1.
    pub fn create_basic_recover_ok(&self) -> Result<MethodBody, DecodeError> {
        self.create(MethodKind::BasicRecoverOk, Vec::new())
    }

    /// `basic.recover-sync-ok`, declared by 0-9 and 0-9-1.
    ///
    /// # Errors
    ///
    /// [`DecodeError::MethodNotInVersion`] on 0-8.
    pub fn create_basic_recover_sync_ok(&self) -> Result<MethodBody, DecodeError> {
        self.create(MethodKind::BasicRecoverSyncOk, Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(version: ProtocolVersion) -> &'static MethodRegistry {
        MethodRegistry::for_version(version).unwrap()
    }

    #[test]
    fn test_for_version_is_shared() {
        let a = registry(V0_91);
        let b = registry(V0_91);
        assert!(std::ptr::eq(a, b));
        assert_eq!(a.version(), V0_91);
    }

    #[test]
    fn test_unsupported_version() {
        assert!(MethodRegistry::for_version(ProtocolVersion::new(1, 0)).is_none());
    }

    #[test]
    fn test_decode_channel_flow_per_version() {
        for version in [V0_8, V0_9, V0_91] {
            let body = registry(version)
                .decode(Bytes::from_static(&[0x00, 0x14, 0x00, 0x14, 0x01]))
                .unwrap();
            assert_eq!(body.kind(), MethodKind::ChannelFlow);
            assert!(body.bit("active").unwrap());
            assert_eq!(body.version(), version);
        }
    }

    #[test]
    fn test_recover_ok_only_in_0_8() {
        assert_eq!(registry(V0_8).create_basic_recover_ok().unwrap().method_id(), 101);
        for version in [V0_9, V0_91] {
            assert!(matches!(
                registry(version).create_basic_recover_ok(),
                Err(DecodeError::MethodNotInVersion { kind: MethodKind::BasicRecoverOk, .. })
            ));
        }
    }

    #[test]
    fn test_recover_sync_ok_numbering() {
        assert!(registry(V0_8).create_basic_recover_sync_ok().is_err());
        assert_eq!(registry(V0_9).create_basic_recover_sync_ok().unwrap().method_id(), 101);
        assert_eq!(registry(V0_91).create_basic_recover_sync_ok().unwrap().method_id(), 111);
    }

    #[test]
    fn test_channel_open_ok_shape() {
        let id = Bytes::from_static(&[7; 16]);
        let v8 = registry(V0_8).create_channel_open_ok(Some(id.clone())).unwrap();
        assert_eq!(v8.encode().len(), 4);

        let v91 = registry(V0_91).create_channel_open_ok(Some(id.clone())).unwrap();
        assert_eq!(v91.longstr("channel-id").unwrap(), &id);
        assert_eq!(v91.encode().len(), 4 + 4 + 16);

        let empty = registry(V0_9).create_channel_open_ok(None).unwrap();
        assert!(empty.longstr("channel-id").unwrap().is_empty());
    }

    #[test]
    fn test_flow_ok_encoding() {
        let body = registry(V0_91).create_channel_flow_ok(false).unwrap();
        assert_eq!(&body.encode()[..], &[0x00, 0x14, 0x00, 0x15, 0x00]);
    }

    #[test]
    fn test_connection_close_encoding() {
        let body = registry(V0_8)
            .create_connection_close(504, "CHANNEL_ERROR", 20, 20)
            .unwrap();
        let decoded = registry(V0_8).decode(body.encode()).unwrap();
        assert_eq!(decoded.method_id(), 60);
        assert_eq!(decoded.short("reply-code").unwrap(), 504);
        assert_eq!(&decoded.shortstr("reply-text").unwrap()[..], b"CHANNEL_ERROR");
    }

    #[test]
    fn test_create_rejects_wrong_arity() {
        let err = registry(V0_91)
            .create(MethodKind::ChannelFlow, Vec::new())
            .unwrap_err();
        assert!(matches!(err, DecodeError::InvalidArguments { name: "channel.flow", .. }));
        assert!(!err.is_peer_error());
    }
}
