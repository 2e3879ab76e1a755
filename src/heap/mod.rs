//! Handles the allocation of all heap living values.
//!
//! While booleans, `nil` and numbers are stored directly on the stack,
//! all other objects only have references stored there.
//! The actual objects live in the heap.
//!
//! The heap is managed via arenas, one for each type of `Value`.
//! Each value holds the key of the object in its respective arena and
//! objects are retrieved by resolving the key through the heap.
//!
//! Garbage collection occurs via tri-colour `mark and sweep`: the VM
//! grays its roots, `trace` blackens everything reachable, `sweep`
//! frees the rest. Instead of clearing mark bits after a collection
//! the meaning of the bit (`black_value`) is flipped.

mod arenas;

use paste::paste;
use rustc_hash::FxHashMap as HashMap;
use std::collections::hash_map::Entry;

use crate::heap::arenas::Arena;
pub use crate::heap::arenas::{
    BoundMethodId, ClassId, ClosureId, FunctionId, InstanceId, NativeFunctionId, StringId,
    UpvalueId,
};
use crate::value::{BoundMethod, Class, Closure, Function, Instance, NativeFunction, Upvalue, Value};

/// Collection of all builtin constants that are needed in different parts
/// of the heap or VM.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuiltinConstants {
    /// Name of the initializer method.
    pub(crate) init_string: StringId,
    /// Name given to the function wrapping the top level script.
    pub(crate) script_name: StringId,
}

impl BuiltinConstants {
    #[must_use]
    fn new(heap: &mut Heap) -> Self {
        Self {
            init_string: heap.string_id(&"init"),
            script_name: heap.string_id(&"<script>"),
        }
    }
}

/// Switch to add a `Value` to the gray vector of the correct arena.
///
/// Needs to be a macro because it is used in multiple places and a function
/// runs into issues with the borrow checker.
macro_rules! gray_value {
    ($self:expr, $value:expr) => {
        match $value {
            Value::Bool(_) | Value::Nil | Value::Number(_) => {}
            Value::String(id) => {
                #[cfg(feature = "log_gc")]
                {
                    eprintln!("String/{:?} gray {}", id, $self.strings[*id]);
                }
                $self.strings.gray.push(*id);
            }
            Value::Function(id) => {
                #[cfg(feature = "log_gc")]
                {
                    eprintln!("Function/{:?} gray {}", id, $self.functions[*id]);
                }
                $self.functions.gray.push(*id);
            }
            Value::Closure(id) => {
                #[cfg(feature = "log_gc")]
                {
                    eprintln!("Closure/{:?} gray {}", id, $self.closures[*id]);
                }
                $self.closures.gray.push(*id);
            }
            Value::Upvalue(id) => {
                #[cfg(feature = "log_gc")]
                {
                    eprintln!("Upvalue/{:?} gray {}", id, $self.upvalues[*id]);
                }
                $self.upvalues.gray.push(*id);
            }
            Value::NativeFunction(id) => {
                #[cfg(feature = "log_gc")]
                {
                    eprintln!(
                        "NativeFunction/{:?} gray {}",
                        id, $self.native_functions[*id]
                    );
                }
                $self.native_functions.gray.push(*id);
            }
            Value::Class(id) => {
                #[cfg(feature = "log_gc")]
                {
                    eprintln!("Class/{:?} gray {}", id, $self.classes[*id]);
                }
                $self.classes.gray.push(*id);
            }
            Value::Instance(id) => {
                #[cfg(feature = "log_gc")]
                {
                    eprintln!("Instance/{:?} gray {}", id, $self.instances[*id]);
                }
                $self.instances.gray.push(*id);
            }
            Value::BoundMethod(id) => {
                #[cfg(feature = "log_gc")]
                {
                    eprintln!("BoundMethod/{:?} gray {}", id, $self.bound_methods[*id]);
                }
                $self.bound_methods.gray.push(*id);
            }
        }
    };
}

/// Main representation of the heap.
///
/// Heart is multiple arenas, one for each variant of `Value`.
#[derive(Clone, Debug)]
pub struct Heap {
    builtin_constants: Option<BuiltinConstants>,
    /// Intern table: maps string contents to the one id holding them.
    /// Treated as a weak set by the collector.
    pub(crate) strings_by_name: HashMap<String, StringId>,

    pub(crate) strings: Arena<StringId, String>,
    functions: Arena<FunctionId, Function>,
    closures: Arena<ClosureId, Closure>,
    upvalues: Arena<UpvalueId, Upvalue>,
    native_functions: Arena<NativeFunctionId, NativeFunction>,
    classes: Arena<ClassId, Class>,
    instances: Arena<InstanceId, Instance>,
    bound_methods: Arena<BoundMethodId, BoundMethod>,

    next_gc: usize,
    pub(crate) black_value: bool,
}

impl Heap {
    pub(crate) fn new() -> Self {
        let mut heap = Self {
            builtin_constants: None,
            strings_by_name: HashMap::default(),

            strings: Arena::new("String"),
            functions: Arena::new("Function"),
            closures: Arena::new("Closure"),
            upvalues: Arena::new("Upvalue"),
            native_functions: Arena::new("NativeFunction"),
            classes: Arena::new("Class"),
            instances: Arena::new("Instance"),
            bound_methods: Arena::new("BoundMethod"),

            next_gc: 1024 * 1024,
            black_value: true,
        };
        heap.builtin_constants = Some(BuiltinConstants::new(&mut heap));

        heap
    }

    pub(crate) fn builtin_constants(&self) -> &BuiltinConstants {
        self.builtin_constants.as_ref().unwrap()
    }

    /// Uniquify string ids so that each distinct string is mapped to the same id.
    pub(crate) fn string_id<S>(&mut self, s: &S) -> StringId
    where
        S: ToString,
    {
        if let Entry::Occupied(entry) = self.strings_by_name.entry(s.to_string()) {
            return *entry.get();
        }
        let string_val = self.add_string(s.to_string());
        let string_id = *string_val.as_string();
        self.strings_by_name.insert(s.to_string(), string_id);
        string_id
    }

    const fn bytes_allocated(&self) -> usize {
        self.strings.bytes_allocated()
            + self.functions.bytes_allocated()
            + self.closures.bytes_allocated()
            + self.upvalues.bytes_allocated()
            + self.native_functions.bytes_allocated()
            + self.classes.bytes_allocated()
            + self.instances.bytes_allocated()
            + self.bound_methods.bytes_allocated()
    }

    #[cfg(not(feature = "stress_gc"))]
    pub(crate) const fn needs_gc(&self) -> bool {
        self.bytes_allocated() > self.next_gc
    }

    /// Prepare the garbage collection by graying the values
    /// the heap itself holds on to: the builtin constants.
    pub(crate) fn gc_start(&mut self) {
        #[cfg(feature = "log_gc")]
        {
            eprintln!("-- gc begin");
        }

        self.strings.gray.push(self.builtin_constants().init_string);
        self.strings.gray.push(self.builtin_constants().script_name);
    }

    /// Trace through all reachable values.
    ///
    /// For that repeatedly drain the gray lists and blacken everything
    /// that can be reached from them, until no gray values remain.
    pub(crate) fn trace(&mut self) {
        #[cfg(feature = "log_gc")]
        {
            eprintln!("-- trace start");
        }
        while !self.strings.gray.is_empty()
            || !self.functions.gray.is_empty()
            || !self.closures.gray.is_empty()
            || !self.upvalues.gray.is_empty()
            || !self.native_functions.gray.is_empty()
            || !self.classes.gray.is_empty()
            || !self.instances.gray.is_empty()
            || !self.bound_methods.gray.is_empty()
        {
            for index in self.strings.flush_gray() {
                self.blacken_string(index);
            }
            for index in self.functions.flush_gray() {
                self.blacken_function(index);
            }
            for index in self.closures.flush_gray() {
                self.blacken_closure(index);
            }
            for index in self.upvalues.flush_gray() {
                self.blacken_upvalue(index);
            }
            for index in self.native_functions.flush_gray() {
                self.blacken_native_function(index);
            }
            for index in self.classes.flush_gray() {
                self.blacken_class(index);
            }
            for index in self.instances.flush_gray() {
                self.blacken_instance(index);
            }
            for index in self.bound_methods.flush_gray() {
                self.blacken_bound_method(index);
            }
        }
    }

    pub(crate) fn mark_value(&mut self, value: &Value) {
        self.blacken_value(value);
    }

    pub(crate) fn mark_string(&mut self, id: StringId) {
        self.blacken_string(id);
    }

    pub(crate) fn mark_closure(&mut self, id: ClosureId) {
        self.blacken_closure(id);
    }

    pub(crate) fn mark_upvalue(&mut self, id: UpvalueId) {
        self.blacken_upvalue(id);
    }

    fn blacken_value(&mut self, value: &Value) {
        match value {
            Value::Bool(_) | Value::Nil | Value::Number(_) => {}
            Value::String(id) => self.blacken_string(*id),
            Value::Function(id) => self.blacken_function(*id),
            Value::Closure(id) => self.blacken_closure(*id),
            Value::Upvalue(id) => self.blacken_upvalue(*id),
            Value::NativeFunction(id) => self.blacken_native_function(*id),
            Value::Class(id) => self.blacken_class(*id),
            Value::Instance(id) => self.blacken_instance(*id),
            Value::BoundMethod(id) => self.blacken_bound_method(*id),
        }
    }

    /// Strings don't contain any other values.
    fn blacken_string(&mut self, index: StringId) {
        let item = &mut self.strings.data[index];
        if item.marked == self.black_value {
            return;
        }
        #[cfg(feature = "log_gc")]
        {
            eprintln!("String/{:?} blacken {}", index, item.item);
        }
        item.marked = self.black_value;
    }

    /// Functions contain their own name as well as their constants.
    fn blacken_function(&mut self, index: FunctionId) {
        let item = &mut self.functions.data[index];
        if item.marked == self.black_value {
            return;
        }
        #[cfg(feature = "log_gc")]
        {
            eprintln!("Function/{:?} blacken {}", index, item.item);
        }
        item.marked = self.black_value;
        let function = &item.item;
        self.strings.gray.push(function.name);
        for constant in function.chunk.constants() {
            gray_value!(self, constant);
        }
    }

    /// Closures store their wrapped function as well as the captured upvalues.
    fn blacken_closure(&mut self, index: ClosureId) {
        let item = &mut self.closures.data[index];
        if item.marked == self.black_value {
            return;
        }
        #[cfg(feature = "log_gc")]
        {
            eprintln!("Closure/{:?} blacken {}", index, item.item);
        }
        item.marked = self.black_value;
        let closure = &item.item;
        self.functions.gray.push(closure.function);
        for upvalue in &closure.upvalues {
            self.upvalues.gray.push(*upvalue);
        }
    }

    /// Closed upvalues refer to a separate value that has to be marked.
    ///
    /// Open ones point into the stack which is a root itself.
    fn blacken_upvalue(&mut self, index: UpvalueId) {
        let item = &mut self.upvalues.data[index];
        if item.marked == self.black_value {
            return;
        }
        #[cfg(feature = "log_gc")]
        {
            eprintln!("Upvalue/{:?} blacken {}", index, item.item);
        }
        item.marked = self.black_value;
        match &item.item {
            Upvalue::Open(_) => {}
            Upvalue::Closed(value) => {
                gray_value!(self, value);
            }
        }
    }

    /// Native functions only have their name on the heap.
    /// The implementation is directly in rust.
    fn blacken_native_function(&mut self, index: NativeFunctionId) {
        let item = &mut self.native_functions.data[index];
        if item.marked == self.black_value {
            return;
        }
        #[cfg(feature = "log_gc")]
        {
            eprintln!("NativeFunction/{:?} blacken {}", index, item.item);
        }
        item.marked = self.black_value;
        let function = &item.item;
        self.strings.gray.push(function.name);
    }

    /// Classes store their name as well as their methods with their names.
    fn blacken_class(&mut self, index: ClassId) {
        let item = &mut self.classes.data[index];
        if item.marked == self.black_value {
            return;
        }
        #[cfg(feature = "log_gc")]
        {
            eprintln!("Class/{:?} blacken {}", index, item.item);
        }
        item.marked = self.black_value;
        let class = &item.item;
        self.strings.gray.push(class.name);
        for (method_name, method) in &class.methods {
            self.strings.gray.push(*method_name);
            self.closures.gray.push(*method);
        }
    }

    /// Instances store the class they belong to as well as their fields.
    fn blacken_instance(&mut self, index: InstanceId) {
        let item = &mut self.instances.data[index];
        if item.marked == self.black_value {
            return;
        }
        #[cfg(feature = "log_gc")]
        {
            eprintln!("Instance/{:?} blacken {}", index, item.item);
        }
        item.marked = self.black_value;
        let instance = &item.item;
        self.classes.gray.push(instance.class);
        for (field_name, field) in &instance.fields {
            self.strings.gray.push(*field_name);
            gray_value!(self, field);
        }
    }

    /// Bound methods store the receiver they are bound to
    /// as well as the method they are binding.
    fn blacken_bound_method(&mut self, index: BoundMethodId) {
        let item = &mut self.bound_methods.data[index];
        if item.marked == self.black_value {
            return;
        }
        #[cfg(feature = "log_gc")]
        {
            eprintln!("BoundMethod/{:?} blacken {}", index, item.item);
        }
        item.marked = self.black_value;
        let bound_method = &item.item;
        let method = bound_method.method;
        gray_value!(self, &bound_method.receiver);
        self.closures.gray.push(method);
    }

    pub(crate) fn sweep(&mut self) {
        #[cfg(feature = "log_gc")]
        eprintln!("-- sweep start");
        #[cfg(feature = "log_gc")]
        let before = self.bytes_allocated();

        // Closures are swept before functions and strings last as the
        // `log_gc` display of the former reads the latter.
        self.closures.sweep(self.black_value);
        self.functions.sweep(self.black_value);
        self.upvalues.sweep(self.black_value);
        self.native_functions.sweep(self.black_value);
        self.bound_methods.sweep(self.black_value);
        self.instances.sweep(self.black_value);
        self.classes.sweep(self.black_value);
        self.strings.sweep(self.black_value);

        self.black_value = !self.black_value;

        self.next_gc = self.bytes_allocated() * crate::config::GC_HEAP_GROW_FACTOR;
        #[cfg(feature = "log_gc")]
        {
            eprintln!("-- gc end");
            eprintln!(
                "   collected {} (from {} to {}) next at {}",
                humansize::format_size(before - self.bytes_allocated(), humansize::BINARY),
                humansize::format_size(before, humansize::BINARY),
                humansize::format_size(self.bytes_allocated(), humansize::BINARY),
                humansize::format_size(self.next_gc, humansize::BINARY),
            );
        }
    }
}

macro_rules! define_value_methods {
    ($(
        $slot_name:ident => {
            field: $field_name:ident,
            ty: $ty:ty,
            id_ty: $id_ty:ty
        }
    ),* $(,)?) => {
        paste! {
        $(
            // e.g. pub(crate) fn add_string(&mut self, value: String) -> Value
            pub(crate) fn [<add_$slot_name>](&mut self, value: $ty) -> Value {
                self.$field_name.add(value, self.black_value).into()
            }

            // e.g. pub(crate) fn get_string(&self, index: StringId) -> &String
            pub(crate) fn [<get_$slot_name>](&self, index: $id_ty) -> &$ty {
                self.$field_name.get(index)
            }

            // e.g. pub(crate) fn get_mut_string(&mut self, index: StringId) -> &mut String
            pub(crate) fn [<get_mut_$slot_name>](&mut self, index: $id_ty) -> &mut $ty {
                self.$field_name.get_mut(index)
            }

            // e.g. pub(crate) fn string_marked(&self, index: StringId) -> bool
            pub(crate) fn [< $slot_name _marked>](&self, index: $id_ty) -> bool {
                self.$field_name.is_marked(index, self.black_value)
            }
        )*
    }
}}

impl Heap {
    define_value_methods!(
        string => {
            field: strings,
            ty: String,
            id_ty: StringId
        },
        function => {
            field: functions,
            ty: Function,
            id_ty: FunctionId
        },
        closure => {
            field: closures,
            ty: Closure,
            id_ty: ClosureId
        },
        upvalue => {
            field: upvalues,
            ty: Upvalue,
            id_ty: UpvalueId
        },
        native_function => {
            field: native_functions,
            ty: NativeFunction,
            id_ty: NativeFunctionId
        },
        class => {
            field: classes,
            ty: Class,
            id_ty: ClassId
        },
        instance => {
            field: instances,
            ty: Instance,
            id_ty: InstanceId
        },
        bound_method => {
            field: bound_methods,
            ty: BoundMethod,
            id_ty: BoundMethodId
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_interning() {
        let mut heap = Heap::new();
        let a = heap.string_id(&"counter");
        let b = heap.string_id(&"counter");
        assert_eq!(a, b);
        assert_eq!(heap.get_string(a), "counter");
    }

    #[test]
    fn test_builtin_constants_interned() {
        let mut heap = Heap::new();
        let init = heap.builtin_constants().init_string;
        assert_eq!(heap.string_id(&"init"), init);
    }

    #[test]
    fn test_mark_and_sweep_frees_unreachable_strings() {
        let mut heap = Heap::new();
        let kept = heap.string_id(&"kept");
        let _dropped = heap.string_id(&"dropped");

        heap.gc_start();
        heap.mark_string(kept);
        heap.trace();
        let mut strings_by_name = std::mem::take(&mut heap.strings_by_name);
        strings_by_name.retain(|_, string_id| string_id.marked(&heap));
        heap.strings_by_name = strings_by_name;
        heap.sweep();

        assert_eq!(heap.get_string(kept), "kept");
        assert!(heap.strings_by_name.contains_key("kept"));
        assert!(!heap.strings_by_name.contains_key("dropped"));
        // A fresh intern of the collected contents gets a new entry.
        let again = heap.string_id(&"dropped");
        assert_eq!(heap.get_string(again), "dropped");
    }

    #[test]
    fn test_sweep_is_idempotent_for_reachable_values() {
        let mut heap = Heap::new();
        let kept = heap.string_id(&"kept");

        for _ in 0..2 {
            heap.gc_start();
            heap.mark_string(kept);
            heap.trace();
            let mut strings_by_name = std::mem::take(&mut heap.strings_by_name);
            strings_by_name.retain(|_, string_id| string_id.marked(&heap));
            heap.strings_by_name = strings_by_name;
            heap.sweep();
        }

        assert_eq!(heap.get_string(kept), "kept");
    }
}
