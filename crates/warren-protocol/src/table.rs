//! Sparse per-version lookup from `(class_id, method_id)` to method factory.
//!
//! The outer vector is indexed by class id and sized to the highest class the
//! version declares; each present class holds a vector indexed by method id
//! sized to that class's highest method. Resolution is two constant-time
//! index operations.

use bytes::Bytes;

use crate::codec::{self, DecodeError};
use crate::method::{MethodBody, MethodKind, MethodSpec};
use crate::version::ProtocolVersion;

type ClassSlots = Vec<Option<&'static MethodSpec>>;

/// Method table for one protocol version.
#[derive(Debug)]
pub struct VersionMethodTable {
    version: ProtocolVersion,
    classes: Vec<Option<ClassSlots>>,
    methods: &'static [MethodSpec],
}

impl VersionMethodTable {
    /// Build the table from a version's declaration list.
    ///
    /// Later declarations of the same `(class, method)` pair replace earlier ones.
    #[must_use]
    pub fn build(version: ProtocolVersion, methods: &'static [MethodSpec]) -> Self {
        let max_class = methods.iter().map(|m| m.class_id).max().unwrap_or(0);
        let mut classes: Vec<Option<ClassSlots>> = vec![None; usize::from(max_class) + 1];

        for spec in methods {
            let max_method = methods
                .iter()
                .filter(|m| m.class_id == spec.class_id)
                .map(|m| m.method_id)
                .max()
                .unwrap_or(0);
            let slots = classes[usize::from(spec.class_id)]
                .get_or_insert_with(|| vec![None; usize::from(max_method) + 1]);
            slots[usize::from(spec.method_id)] = Some(spec);
        }

        Self {
            version,
            classes,
            methods,
        }
    }

    #[must_use]
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Highest class id the table can index.
    #[must_use]
    pub fn max_class_id(&self) -> u16 {
        u16::try_from(self.classes.len().saturating_sub(1)).unwrap_or(u16::MAX)
    }

    /// Highest method id declared for `class_id`, if the class exists.
    #[must_use]
    pub fn max_method_id(&self, class_id: u16) -> Option<u16> {
        self.classes
            .get(usize::from(class_id))?
            .as_ref()
            .and_then(|slots| u16::try_from(slots.len().saturating_sub(1)).ok())
    }

    /// Factory for `(class_id, method_id)`.
    ///
    /// # Errors
    ///
    /// [`DecodeError::UnknownClass`] when the class id lies beyond the table,
    /// [`DecodeError::UnknownMethod`] when the class is absent, the method id
    /// is out of range, or the slot is empty.
    pub fn factory(&self, class_id: u16, method_id: u16) -> Result<&'static MethodSpec, DecodeError> {
        let Some(class) = self.classes.get(usize::from(class_id)) else {
            return Err(DecodeError::UnknownClass {
                class_id,
                method_id,
                version: self.version,
            });
        };
        class
            .as_ref()
            .and_then(|slots| slots.get(usize::from(method_id)).copied().flatten())
            .ok_or(DecodeError::UnknownMethod {
                class_id,
                method_id,
                version: self.version,
            })
    }

    /// Resolve `(class_id, method_id)` and decode its arguments from `payload`.
    ///
    /// # Errors
    ///
    /// Resolution errors from [`Self::factory`], or
    /// [`DecodeError::MalformedMethodPayload`] if the arguments do not decode.
    pub fn resolve(&self, class_id: u16, method_id: u16, payload: Bytes) -> Result<MethodBody, DecodeError> {
        self.factory(class_id, method_id)?.new_instance(self.version, payload)
    }

    /// Decode a full method payload, 4-byte header included.
    ///
    /// # Errors
    ///
    /// See [`codec::decode_method`] and [`Self::resolve`].
    pub fn decode(&self, payload: Bytes) -> Result<MethodBody, DecodeError> {
        let (class_id, method_id, args) = codec::decode_method(payload)?;
        self.resolve(class_id, method_id, args)
    }

    /// Descriptor for a method kind in this version.
    #[must_use]
    pub fn spec_for(&self, kind: MethodKind) -> Option<&'static MethodSpec> {
        self.methods.iter().find(|m| m.kind == kind)
    }

    /// Every method this version declares.
    #[must_use]
    pub fn methods(&self) -> &'static [MethodSpec] {
        self.methods
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::{amqp0_8, amqp0_9, amqp0_91};
    use crate::field::{FieldTable, FieldType, FieldValue, TableValue};
    use crate::version::{V0_8, V0_9, V0_91};

    fn tables() -> Vec<VersionMethodTable> {
        vec![
            VersionMethodTable::build(V0_8, amqp0_8::METHODS),
            VersionMethodTable::build(V0_9, amqp0_9::METHODS),
            VersionMethodTable::build(V0_91, amqp0_91::METHODS),
        ]
    }

    #[test]
    fn test_every_declared_method_resolves_to_itself() {
        for table in tables() {
            for spec in table.methods() {
                let found = table.factory(spec.class_id, spec.method_id).unwrap();
                assert_eq!(found.kind, spec.kind, "{} in {}", spec.name, table.version());
            }
        }
    }

    #[test]
    fn test_every_declared_method_decodes_its_own_encoding() {
        for table in tables() {
            for spec in table.methods() {
                let fields = spec.fields.iter().map(|f| FieldValue::default_for(f.ty)).collect();
                let body = spec.construct(table.version(), fields).unwrap();
                let decoded = table.decode(body.encode()).unwrap();
                assert_eq!(decoded.kind(), spec.kind);
                assert_eq!(decoded.fields(), body.fields());
            }
        }
    }

    /// A non-zero value for argument `index` of a method, distinct per position.
    fn sample_value(ty: FieldType, index: usize) -> FieldValue {
        let n = index as u64 + 1;
        match ty {
            FieldType::Octet => FieldValue::Octet(0xA0 | n as u8),
            FieldType::Short => FieldValue::Short(0x1200 + n as u16),
            FieldType::Long => FieldValue::Long(0xDEAD_0000 + n as u32),
            FieldType::LongLong => FieldValue::LongLong(0x0102_0304_0506_0700 + n),
            // alternate so packed octets carry both set and clear bits
            FieldType::Bit => FieldValue::Bit(index % 2 == 0),
            FieldType::ShortStr => FieldValue::short_str(&format!("arg-{index}")),
            FieldType::LongStr => FieldValue::long_str(format!("long value {index}").into_bytes()),
            FieldType::Timestamp => FieldValue::Timestamp(1_700_000_000 + n),
            FieldType::Table => FieldValue::Table(
                FieldTable::new()
                    .with("x-index", TableValue::U16(index as u16))
                    .with("flag", TableValue::Bool(true))
                    .with("name", TableValue::LongStr(Bytes::from_static(b"warren")))
                    .with(
                        "nested",
                        TableValue::Table(FieldTable::new().with("depth", TableValue::I64(-2))),
                    )
                    .with(
                        "list",
                        TableValue::Array(vec![TableValue::I8(-1), TableValue::Void, TableValue::F64(0.5)]),
                    ),
            ),
        }
    }

    #[test]
    fn test_every_declared_method_reencodes_byte_identical() {
        for table in tables() {
            for spec in table.methods() {
                let fields = spec
                    .fields
                    .iter()
                    .enumerate()
                    .map(|(i, f)| sample_value(f.ty, i))
                    .collect();
                let body = spec.construct(table.version(), fields).unwrap();
                let payload = body.encode();

                let decoded = table.decode(payload.clone()).unwrap();
                assert_eq!(decoded.fields(), body.fields(), "{} in {}", spec.name, table.version());
                assert_eq!(decoded.encode(), payload, "{} in {}", spec.name, table.version());
            }
        }
    }

    #[test]
    fn test_wire_queue_declare_reencodes_byte_identical() {
        // 0-8 queue.declare: ticket 1, queue "tasks", durable + auto-delete,
        // arguments {"x-ttl": I 60000}
        let wire: &[u8] = &[
            0x00, 0x32, 0x00, 0x0A, //
            0x00, 0x01, //
            0x05, b't', b'a', b's', b'k', b's', //
            0b0000_1010, //
            0x00, 0x00, 0x00, 0x0B, 0x05, b'x', b'-', b't', b't', b'l', b'I', 0x00, 0x00, 0xEA, 0x60,
        ];
        let payload = Bytes::from_static(wire);
        for table in [
            VersionMethodTable::build(V0_8, amqp0_8::METHODS),
            VersionMethodTable::build(V0_91, amqp0_91::METHODS),
        ] {
            let body = table.decode(payload.clone()).unwrap();
            assert_eq!(body.kind(), MethodKind::QueueDeclare);
            assert_eq!(body.shortstr("queue").unwrap().as_ref(), b"tasks");
            assert!(!body.bit("passive").unwrap());
            assert!(body.bit("durable").unwrap());
            assert!(!body.bit("exclusive").unwrap());
            assert!(body.bit("auto-delete").unwrap());
            assert!(!body.bit("nowait").unwrap());
            assert_eq!(
                body.table("arguments").unwrap().get("x-ttl"),
                Some(&TableValue::I32(60_000))
            );
            assert_eq!(body.encode(), payload);
        }
    }

    #[test]
    fn test_wire_basic_deliver_reencodes_byte_identical() {
        let wire: &[u8] = &[
            0x00, 0x3C, 0x00, 0x3C, //
            0x02, b'c', b't', //
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x07, //
            0x01, //
            0x02, b'e', b'x', //
            0x02, b'r', b'k',
        ];
        let payload = Bytes::from_static(wire);
        for table in tables() {
            let body = table.decode(payload.clone()).unwrap();
            assert_eq!(body.kind(), MethodKind::BasicDeliver);
            assert_eq!(body.longlong("delivery-tag").unwrap(), 7);
            assert!(body.bit("redelivered").unwrap());
            assert_eq!(body.encode(), payload);
        }
    }

    #[test]
    fn test_class_beyond_range_is_unknown_class() {
        for table in tables() {
            let class_id = table.max_class_id() + 1;
            assert!(matches!(
                table.factory(class_id, 10),
                Err(DecodeError::UnknownClass { .. })
            ));
        }
    }

    #[test]
    fn test_absent_class_is_unknown_method() {
        // 0-9-1 has no access class but indexes past it.
        let table = VersionMethodTable::build(V0_91, amqp0_91::METHODS);
        assert_eq!(table.max_class_id(), 90);
        assert!(matches!(
            table.factory(30, 10),
            Err(DecodeError::UnknownMethod { class_id: 30, method_id: 10, .. })
        ));
    }

    #[test]
    fn test_empty_slot_and_out_of_range_are_unknown_method() {
        let table = VersionMethodTable::build(V0_8, amqp0_8::METHODS);
        // channel 20 declares 10..41; 12 is a gap, 42 is past the end
        assert!(matches!(table.factory(20, 12), Err(DecodeError::UnknownMethod { .. })));
        assert!(matches!(table.factory(20, 42), Err(DecodeError::UnknownMethod { .. })));
        assert_eq!(table.max_method_id(20), Some(41));
        assert_eq!(table.max_method_id(12), None);
    }

    #[test]
    fn test_recover_numbering_differs_by_version() {
        let [v8, v9, v91]: [VersionMethodTable; 3] = tables().try_into().unwrap();

        assert_eq!(v8.factory(60, 101).unwrap().kind, MethodKind::BasicRecoverOk);
        assert!(v8.spec_for(MethodKind::BasicRecoverSync).is_none());

        assert_eq!(v9.factory(60, 101).unwrap().kind, MethodKind::BasicRecoverSyncOk);
        assert_eq!(v9.factory(60, 102).unwrap().kind, MethodKind::BasicRecoverSync);
        assert!(v9.spec_for(MethodKind::BasicRecoverOk).is_none());

        assert_eq!(v91.factory(60, 110).unwrap().kind, MethodKind::BasicRecoverSync);
        assert_eq!(v91.factory(60, 111).unwrap().kind, MethodKind::BasicRecoverSyncOk);
        assert!(matches!(v91.factory(60, 101), Err(DecodeError::UnknownMethod { .. })));
    }

    #[test]
    fn test_connection_close_numbering_differs_by_version() {
        let [v8, v9, v91]: [VersionMethodTable; 3] = tables().try_into().unwrap();
        assert_eq!(v8.spec_for(MethodKind::ConnectionClose).unwrap().method_id, 60);
        assert_eq!(v9.spec_for(MethodKind::ConnectionClose).unwrap().method_id, 50);
        assert_eq!(v91.spec_for(MethodKind::ConnectionClose).unwrap().method_id, 50);
    }

    #[test]
    fn test_malformed_payload_keeps_method_identity() {
        let table = VersionMethodTable::build(V0_9, amqp0_9::METHODS);
        // channel.flow with no argument byte
        let err = table.decode(Bytes::from_static(&[0, 20, 0, 20])).unwrap_err();
        match err {
            DecodeError::MalformedMethodPayload { class_id, method_id, version, .. } => {
                assert_eq!((class_id, method_id, version), (20, 20, V0_9));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
