//! Runtime representation of Tok values.

mod classes;
mod functions;
mod natives;

use crate::heap::{
    BoundMethodId, ClassId, ClosureId, FunctionId, Heap, InstanceId, NativeFunctionId, StringId,
    UpvalueId,
};
pub use classes::{BoundMethod, Class, Instance};
pub use functions::{Closure, Function, Upvalue};
pub use natives::{NativeFunction, NativeFunctionImpl};

/// Central enum for the types of runtime values that exist in Tok.
///
/// Immediate values live directly in the enum, everything else is an
/// id into the heap. Strings are interned, so the derived equality
/// (id comparison) agrees with content equality. All other heap values
/// compare by identity, numbers by IEEE-754 rules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Bool(bool),
    Nil,

    Number(f64),

    String(StringId),

    Function(FunctionId),
    Closure(ClosureId),
    Upvalue(UpvalueId),

    NativeFunction(NativeFunctionId),

    Class(ClassId),
    Instance(InstanceId),
    BoundMethod(BoundMethodId),
}

impl Value {
    /// Only `nil` and `false` are falsey, everything else is truthy.
    pub(crate) const fn is_falsey(&self) -> bool {
        matches!(self, Self::Nil | Self::Bool(false))
    }

    pub fn to_string(&self, heap: &Heap) -> String {
        match self {
            Self::Bool(bool) => format!("{bool}"),
            Self::Number(num) => format!("{num}"),
            Self::Nil => "nil".to_string(),
            Self::String(s) => s.to_value(heap).clone(),
            Self::Function(ref_id) => ref_id.to_value(heap).to_string(heap),
            Self::Closure(ref_id) => ref_id.to_value(heap).to_string(heap),
            Self::NativeFunction(ref_id) => ref_id.to_value(heap).to_string(heap),
            Self::Class(ref_id) => ref_id.to_value(heap).to_string(heap),
            Self::Instance(ref_id) => ref_id.to_value(heap).to_string(heap),
            Self::BoundMethod(ref_id) => ref_id.to_value(heap).to_string(heap),
            Self::Upvalue(ref_id) => format!("{}", ref_id.to_value(heap)),
        }
    }
}

impl Value {
    pub(crate) fn bound_method(receiver: Self, method: ClosureId, heap: &mut Heap) -> Self {
        heap.add_bound_method(BoundMethod { receiver, method })
    }
}

// Conversions
impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Number(f)
    }
}

impl From<StringId> for Value {
    fn from(s: StringId) -> Self {
        Self::String(s)
    }
}

impl From<FunctionId> for Value {
    fn from(f: FunctionId) -> Self {
        Self::Function(f)
    }
}

impl From<ClosureId> for Value {
    fn from(c: ClosureId) -> Self {
        Self::Closure(c)
    }
}

impl From<UpvalueId> for Value {
    fn from(u: UpvalueId) -> Self {
        Self::Upvalue(u)
    }
}

impl From<NativeFunctionId> for Value {
    fn from(n: NativeFunctionId) -> Self {
        Self::NativeFunction(n)
    }
}

impl From<ClassId> for Value {
    fn from(c: ClassId) -> Self {
        Self::Class(c)
    }
}

impl From<InstanceId> for Value {
    fn from(i: InstanceId) -> Self {
        Self::Instance(i)
    }
}

impl From<BoundMethodId> for Value {
    fn from(b: BoundMethodId) -> Self {
        Self::BoundMethod(b)
    }
}

// Retrieve the inner id
impl Value {
    pub(crate) fn as_closure(&self) -> &ClosureId {
        match self {
            Self::Closure(c) => c,
            _ => unreachable!("Expected Closure, found `{:?}`", self),
        }
    }

    pub(crate) fn as_string(&self) -> &StringId {
        match self {
            Self::String(s) => s,
            _ => unreachable!("Expected String, found `{:?}`", self),
        }
    }

    pub(crate) fn as_function(&self) -> &FunctionId {
        match self {
            Self::Function(f) => f,
            _ => unreachable!("Expected Function, found `{:?}`", self),
        }
    }

    pub(crate) fn as_class(&self) -> &ClassId {
        match self {
            Self::Class(c) => c,
            _ => unreachable!("Expected Class, found `{:?}`", self),
        }
    }

    pub(crate) fn upvalue_location(&self) -> &UpvalueId {
        match self {
            Self::Upvalue(v) => v,
            _ => unreachable!("Expected upvalue, found `{:?}`", self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::Heap;

    #[test]
    fn test_truthiness() {
        assert!(Value::Nil.is_falsey());
        assert!(Value::Bool(false).is_falsey());
        assert!(!Value::Bool(true).is_falsey());
        // Zero and the empty string are truthy.
        assert!(!Value::Number(0.0).is_falsey());
        let mut heap = Heap::new();
        let empty = heap.string_id(&"");
        assert!(!Value::String(empty).is_falsey());
    }

    #[test]
    fn test_number_equality_follows_ieee() {
        assert_eq!(Value::Number(1.5), Value::Number(1.5));
        assert_ne!(Value::Number(f64::NAN), Value::Number(f64::NAN));
        assert_eq!(Value::Number(0.0), Value::Number(-0.0));
    }

    #[test]
    fn test_interned_string_equality() {
        let mut heap = Heap::new();
        let a = heap.string_id(&"hello");
        let b = heap.string_id(&"hello");
        let c = heap.string_id(&"world");
        assert_eq!(Value::String(a), Value::String(b));
        assert_ne!(Value::String(a), Value::String(c));
    }

    #[test]
    fn test_cross_type_inequality() {
        assert_ne!(Value::Nil, Value::Bool(false));
        assert_ne!(Value::Number(0.0), Value::Bool(false));
    }

    #[test]
    fn test_to_string() {
        let mut heap = Heap::new();
        assert_eq!(Value::Number(7.0).to_string(&heap), "7");
        assert_eq!(Value::Number(2.5).to_string(&heap), "2.5");
        assert_eq!(Value::Nil.to_string(&heap), "nil");
        assert_eq!(Value::Bool(true).to_string(&heap), "true");
        let s = heap.string_id(&"hi!");
        assert_eq!(Value::String(s).to_string(&heap), "hi!");
    }
}
