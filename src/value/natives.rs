use crate::{
    heap::{Heap, StringId},
    vm::VM,
};

use derivative::Derivative;

use super::Value;

pub type NativeFunctionImpl = fn(&mut VM, &[Value]) -> Result<Value, String>;

/// A host function callable from Tok code.
///
/// Only the name lives on the heap, the implementation is a plain
/// Rust function pointer.
#[derive(Derivative)]
#[derivative(Debug, PartialEq, Clone)]
pub struct NativeFunction {
    pub(crate) name: StringId,
    pub(crate) arity: u8,

    #[derivative(
        Debug = "ignore",
        // Treat the implementation as always equal; built-in functions are discriminated by name
        PartialEq(compare_with = "always_equals")
    )]
    pub(crate) fun: NativeFunctionImpl,
}

const fn always_equals<T>(_: &T, _: &T) -> bool {
    true
}

impl NativeFunction {
    pub(crate) fn to_string(&self, heap: &Heap) -> String {
        format!("<native fn {}>", self.name.to_value(heap))
    }
}

impl std::fmt::Display for NativeFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad("<native fn Value>")
    }
}
