//! Method declarations for each supported AMQP revision.
//!
//! Each submodule lists every method its revision declares, in class order,
//! with arguments in wire order. The lists are plain static data; the
//! lookup tables in [`crate::table`] are built from them once per process.

/// Declare one method: kind, class id, method id, wire name, then
/// `"argument-name": Domain` pairs in wire order.
macro_rules! method {
    ($kind:ident, $class:literal, $method:literal, $name:literal $(, $field:literal : $ty:ident)* $(,)?) => {
        $crate::method::MethodSpec {
            kind: $crate::method::MethodKind::$kind,
            class_id: $class,
            method_id: $method,
            name: $name,
            fields: &[$($crate::field::FieldSpec {
                name: $field,
                ty: $crate::field::FieldType::$ty,
            }),*],
        }
    };
}

pub mod amqp0_8;
pub mod amqp0_9;
pub mod amqp0_91;
