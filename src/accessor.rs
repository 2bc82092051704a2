//! Accessor facade: name-based access to the live host.
//!
//! The core never inspects host objects directly. Every read or call goes
//! through an `Accessor`, which resolves types and members by name in
//! whatever introspection mechanism the host exposes. Every call is fallible
//! and callers are expected to degrade rather than propagate.

use crate::error::AccessorError;
use crate::value::{ObjectHandle, TypeHandle, Value};

/// Kind of host member looked up by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Field,
    Method,
}

/// Name-based access to host types, fields and methods.
///
/// Implementations must be safe to call from any thread; whether a given
/// member may be touched off the host's main thread is the caller's concern.
pub trait Accessor: Send + Sync {
    /// Resolve `namespace.class_name` to a host type.
    fn resolve_type(&self, namespace: &str, class_name: &str) -> Result<TypeHandle, AccessorError>;

    /// Read a static field of a host type.
    fn get_static_field(&self, ty: &TypeHandle, field: &str) -> Result<Value, AccessorError>;

    /// Read an instance field of a live host object.
    fn get_instance_field(&self, obj: ObjectHandle, field: &str) -> Result<Value, AccessorError>;

    /// Invoke an instance method. `arg_types` disambiguates overloads and may
    /// be empty.
    fn invoke_instance(
        &self,
        obj: ObjectHandle,
        method: &str,
        args: &[Value],
        arg_types: &[&str],
    ) -> Result<Value, AccessorError>;

    /// Invoke a static method of a host type.
    fn invoke_static(&self, ty: &TypeHandle, method: &str, args: &[Value]) -> Result<Value, AccessorError>;

    /// Whether `ty` declares a member of the given kind. Used by the startup
    /// self-check only.
    fn has_member(&self, ty: &TypeHandle, member: &str, kind: MemberKind) -> bool;
}

/// Reads a member of a live object, as a field or as a zero-argument method.
pub fn read_member(
    accessor: &dyn Accessor,
    obj: ObjectHandle,
    member: &str,
    kind: MemberKind,
) -> Result<Value, AccessorError> {
    match kind {
        MemberKind::Field => accessor.get_instance_field(obj, member),
        MemberKind::Method => accessor.invoke_instance(obj, member, &[], &[]),
    }
}

/// Checks that `value` is an object handle.
pub fn expect_object(member: &str, value: Value) -> Result<ObjectHandle, AccessorError> {
    value.as_object().ok_or_else(|| unexpected(member, "object", &value))
}

/// Checks that `value` is a bool.
pub fn expect_bool(member: &str, value: Value) -> Result<bool, AccessorError> {
    value.as_bool().ok_or_else(|| unexpected(member, "bool", &value))
}

fn unexpected(member: &str, expected: &'static str, actual: &Value) -> AccessorError {
    AccessorError::UnexpectedValue {
        member: member.to_string(),
        expected,
        actual: actual.type_name().to_string(),
    }
}
