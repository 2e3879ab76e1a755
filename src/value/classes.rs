use crate::heap::{ClassId, ClosureId, Heap, StringId};

use rustc_hash::FxHashMap as HashMap;

use super::Value;

/// A user defined class.
///
/// Stores its name and its method table. Methods are copied down from
/// the superclass when the class declaration executes, so method lookup
/// never has to walk the superclass chain.
#[derive(Debug, Clone)]
pub struct Class {
    pub(crate) name: StringId,
    pub(crate) methods: HashMap<StringId, ClosureId>,
}

impl Class {
    #[must_use]
    pub(crate) fn new(name: StringId) -> Self {
        Self {
            name,
            methods: HashMap::default(),
        }
    }

    pub(crate) fn to_string(&self, heap: &Heap) -> String {
        format!("<class {}>", self.name.to_value(heap))
    }
}

impl std::fmt::Display for Class {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad("<class Value>")
    }
}

impl PartialEq for Class {
    fn eq(&self, _other: &Self) -> bool {
        // Two different classes are always considered different
        false
    }
}

/// An instance of a class with its own field table.
///
/// Fields override class methods on property access.
#[derive(Debug, Clone)]
pub struct Instance {
    pub(crate) class: ClassId,
    pub(crate) fields: HashMap<StringId, Value>,
}

impl Instance {
    #[must_use]
    pub(crate) fn new(class: ClassId) -> Self {
        Self {
            class,
            fields: HashMap::default(),
        }
    }

    pub(crate) fn to_string(&self, heap: &Heap) -> String {
        format!(
            "<{} instance>",
            self.class.to_value(heap).name.to_value(heap)
        )
    }
}

impl std::fmt::Display for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad("<instance Value>")
    }
}

impl PartialEq for Instance {
    fn eq(&self, _other: &Self) -> bool {
        // Two different instances are always considered different
        false
    }
}

/// Pairing of a receiver with a method closure.
///
/// Created when a method name is read as a value instead of being
/// invoked directly.
#[derive(Debug, Clone)]
pub struct BoundMethod {
    pub(crate) receiver: Value,
    pub(crate) method: ClosureId,
}

impl BoundMethod {
    pub(crate) fn to_string(&self, heap: &Heap) -> String {
        // Bound methods print as the method they wrap.
        self.method
            .to_value(heap)
            .function
            .to_value(heap)
            .to_string(heap)
    }
}

impl PartialEq for BoundMethod {
    fn eq(&self, _other: &Self) -> bool {
        // Two different bound methods are always considered different
        false
    }
}

impl std::fmt::Display for BoundMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad("<bound method Value>")
    }
}
