use crate::{
    chunk::CodeOffset,
    heap::{ClassId, ClosureId, NativeFunctionId, StringId, UpvalueId},
    value::{Instance, Upvalue, Value},
};

use super::{RuntimeError, VM};

// Handle a call
impl VM {
    pub(super) fn call(&mut self) -> Result<(), RuntimeError> {
        let arg_count = self.read_byte();
        let callee = self.stack[self.stack.len() - 1 - usize::from(arg_count)];
        self.call_value(callee, arg_count)
    }

    /// Invoke an attribute retrieved from an instance.
    ///
    /// Fields override class methods, so a callable field is called first.
    /// Otherwise the method is looked up in the class and called directly,
    /// without allocating an intermediate bound method.
    pub(super) fn invoke(
        &mut self,
        method_name: StringId,
        arg_count: u8,
    ) -> Result<(), RuntimeError> {
        let receiver = *self
            .peek(arg_count.into())
            .expect("Stack underflow in OP_INVOKE");
        match receiver {
            Value::Instance(instance) => {
                if let Some(value) = instance
                    .to_value(&self.heap)
                    .fields
                    .get(&method_name)
                    .copied()
                {
                    let new_stack_base = self.stack.len() - usize::from(arg_count) - 1;
                    self.stack[new_stack_base] = value;
                    self.call_value(value, arg_count)
                } else {
                    self.invoke_from_class(instance.to_value(&self.heap).class, method_name, arg_count)
                }
            }
            _ => {
                runtime_error!(self, "Only instances have methods.");
                Err(RuntimeError::new())
            }
        }
    }

    /// Invoke a method on the receiver directly from the given class.
    pub(super) fn invoke_from_class(
        &mut self,
        class: ClassId,
        method_name: StringId,
        arg_count: u8,
    ) -> Result<(), RuntimeError> {
        let Some(method) = class.to_value(&self.heap).methods.get(&method_name).copied() else {
            runtime_error!(
                self,
                "Undefined property '{}'.",
                method_name.to_value(&self.heap)
            );
            return Err(RuntimeError::new());
        };
        self.execute_call(method, arg_count)
    }

    /// Call the passed value with the passed number of arguments.
    ///
    /// The arguments reside on top of the stack with the first (leftmost)
    /// argument being the deepest, directly on top of the callee.
    ///
    /// Callable values are:
    /// - Closures: scheduled directly for execution.
    /// - Native functions: executed immediately.
    /// - Classes: instantiated, invoking an eventual `init` method.
    /// - Bound methods: the receiver is restored into slot 0, then the
    ///   wrapped closure is scheduled.
    fn call_value(&mut self, callee: Value, arg_count: u8) -> Result<(), RuntimeError> {
        match callee {
            Value::Closure(closure) => self.execute_call(closure, arg_count),
            Value::NativeFunction(f) => self.execute_native_call(f, arg_count),
            Value::Class(class) => {
                let maybe_initializer = class
                    .to_value(&self.heap)
                    .methods
                    .get(&self.heap.builtin_constants().init_string)
                    .copied();

                let instance = self.heap.add_instance(Instance::new(class));
                let stack_index = self.stack.len() - usize::from(arg_count) - 1;
                self.stack[stack_index] = instance;
                if let Some(initializer) = maybe_initializer {
                    self.execute_call(initializer, arg_count)
                } else if arg_count != 0 {
                    runtime_error!(self, "Expected 0 arguments but got {arg_count}.");
                    Err(RuntimeError::new())
                } else {
                    Ok(())
                }
            }
            Value::BoundMethod(bound_method) => {
                let bound_method = bound_method.to_value(&self.heap);
                let method = bound_method.method;
                let new_stack_base = self.stack.len() - usize::from(arg_count) - 1;
                self.stack[new_stack_base] = bound_method.receiver;
                self.execute_call(method, arg_count)
            }
            _ => {
                runtime_error!(self, "Can only call functions and classes.");
                Err(RuntimeError::new())
            }
        }
    }

    /// Execute a closure call.
    ///
    /// The arity of the closure is checked against the provided number of
    /// arguments, then the closure is pushed onto the callstack. The new
    /// frame's window starts at the callee slot.
    pub(super) fn execute_call(
        &mut self,
        closure: ClosureId,
        arg_count: u8,
    ) -> Result<(), RuntimeError> {
        let arity = closure.to_value(&self.heap).function.to_value(&self.heap).arity;
        let arg_count = usize::from(arg_count);
        if arg_count != arity {
            runtime_error!(self, "Expected {arity} arguments but got {arg_count}.");
            return Err(RuntimeError::new());
        }

        if self.callstack.len() == crate::config::FRAMES_MAX {
            runtime_error!(self, "Stack overflow.");
            return Err(RuntimeError::new());
        }

        self.callstack
            .push(closure, self.stack.len() - arg_count - 1, &self.heap);
        Ok(())
    }

    /// Execute a call to a native function.
    ///
    /// After the call the stack is truncated to remove the arguments and the
    /// callee, and the result is pushed onto the stack.
    fn execute_native_call(
        &mut self,
        f: NativeFunctionId,
        arg_count: u8,
    ) -> Result<(), RuntimeError> {
        let f = f.to_value(&self.heap);
        let arity = f.arity;
        if arg_count != arity {
            runtime_error!(self, "Expected {arity} arguments but got {arg_count}.");
            return Err(RuntimeError::new());
        }
        let fun = f.fun;
        let start_index = self.stack.len() - usize::from(arg_count);
        let args: Vec<Value> = self.stack[start_index..].to_vec();
        let result = fun(self, &args);
        match result {
            Ok(value) => {
                self.stack.truncate(start_index - 1);
                self.stack_push(value);
                Ok(())
            }
            Err(e) => {
                runtime_error!(self, "{}", e);
                Err(RuntimeError::new())
            }
        }
    }
}

// Methods and upvalues
impl VM {
    /// Bind a method of the given class to the instance on top of the stack.
    ///
    /// Returns `false` if the class has no such method.
    pub(super) fn bind_method(&mut self, class: ClassId, name: StringId) -> bool {
        let Some(method) = class.to_value(&self.heap).methods.get(&name).copied() else {
            return false;
        };
        let bound_method = Value::bound_method(
            *self.peek(0).expect("Stack underflow in bind_method"),
            method,
            &mut self.heap,
        );
        self.stack.pop(); // instance
        self.stack_push(bound_method);
        true
    }

    /// Capture a local of the running frame as an upvalue.
    ///
    /// The open upvalue list is ordered by descending stack slot and holds
    /// at most one entry per slot, so closures capturing the same variable
    /// share the same upvalue object.
    pub(super) fn capture_upvalue(&mut self, local: usize) -> UpvalueId {
        let local = self.callstack.current().stack_base + local;

        let mut insert_at = self.open_upvalues.len();
        for (i, open) in self.open_upvalues.iter().enumerate() {
            let slot = open.to_value(&self.heap).as_open();
            if slot == local {
                return *open;
            }
            if slot < local {
                insert_at = i;
                break;
            }
        }

        let upvalue_value = self.heap.add_upvalue(Upvalue::Open(local));
        let upvalue_id = *upvalue_value.upvalue_location();
        self.open_upvalues.insert(insert_at, upvalue_id);

        upvalue_id
    }

    /// Close every open upvalue pointing at or above the given stack slot.
    ///
    /// The slot's value is moved into the upvalue, which from then on owns
    /// it; the upvalue is unlinked from the open list.
    pub(super) fn close_upvalue(&mut self, last: usize) {
        while self
            .open_upvalues
            .front()
            .is_some_and(|v| v.to_value(&self.heap).as_open() >= last)
        {
            let upvalue_id = self.open_upvalues.pop_front().unwrap();
            let pointed_value = self.stack[upvalue_id.to_value(&self.heap).as_open()];
            *self.heap.get_mut_upvalue(upvalue_id) = Upvalue::Closed(pointed_value);
        }
    }

    /// Insert the closure on top of the stack into the method table of
    /// the class below it.
    pub(super) fn define_method(&mut self, method_name: StringId) {
        let method = *self
            .peek(0)
            .expect("Stack underflow in OP_METHOD (method)")
            .as_closure();
        let class = *self
            .peek(1)
            .expect("Stack underflow in OP_METHOD (class)")
            .as_class();
        class
            .to_value_mut(&mut self.heap)
            .methods
            .insert(method_name, method);
        self.stack.pop();
    }
}

// Remaining instance related opcode handlers
impl VM {
    pub(super) fn get_property(&mut self) -> Result<(), RuntimeError> {
        let name = self.read_string("OP_GET_PROPERTY");
        let receiver = *self.peek(0).expect("Stack underflow in OP_GET_PROPERTY");
        match receiver {
            Value::Instance(instance) => {
                // Can either be a field...
                if let Some(value) = instance.to_value(&self.heap).fields.get(&name).copied() {
                    self.stack.pop(); // instance
                    self.stack_push(value);
                    Ok(())
                }
                // ...or a method that has to be bound to the instance
                // so that it can be called separately later.
                else if self.bind_method(instance.to_value(&self.heap).class, name) {
                    Ok(())
                } else {
                    runtime_error!(
                        self,
                        "Undefined property '{}'.",
                        name.to_value(&self.heap)
                    );
                    Err(RuntimeError::new())
                }
            }
            _ => {
                runtime_error!(self, "Only instances have properties.");
                Err(RuntimeError::new())
            }
        }
    }

    pub(super) fn set_property(&mut self) -> Result<(), RuntimeError> {
        let name = self.read_string("OP_SET_PROPERTY");
        let receiver = *self.peek(1).expect("Stack underflow in OP_SET_PROPERTY");
        match receiver {
            Value::Instance(instance) => {
                let value = self.stack.pop().expect("Stack underflow in OP_SET_PROPERTY");
                instance
                    .to_value_mut(&mut self.heap)
                    .fields
                    .insert(name, value);
                self.stack.pop(); // instance
                self.stack_push(value);
                Ok(())
            }
            _ => {
                runtime_error!(self, "Only instances have fields.");
                Err(RuntimeError::new())
            }
        }
    }

    pub(super) fn get_super(&mut self) -> Result<(), RuntimeError> {
        let name = self.read_string("OP_GET_SUPER");
        let superclass = self.stack.pop().expect("Stack underflow in OP_GET_SUPER");
        if self.bind_method(*superclass.as_class(), name) {
            Ok(())
        } else {
            runtime_error!(
                self,
                "Undefined property '{}'.",
                name.to_value(&self.heap)
            );
            Err(RuntimeError::new())
        }
    }

    /// Copy all methods of the superclass into the subclass.
    ///
    /// Runs before any of the subclass's own methods are defined, so an
    /// override simply replaces the inherited entry afterwards. Method
    /// lookup at call time never walks the superclass chain.
    pub(super) fn inherit(&mut self) -> Result<(), RuntimeError> {
        let superclass_value = *self.peek(1).expect("Stack underflow in OP_INHERIT");
        let Value::Class(superclass) = superclass_value else {
            runtime_error!(self, "Superclass must be a class.");
            return Err(RuntimeError::new());
        };
        let methods = superclass.to_value(&self.heap).methods.clone();
        let subclass = *self
            .peek(0)
            .expect("Stack underflow in OP_INHERIT")
            .as_class();
        subclass
            .to_value_mut(&mut self.heap)
            .methods
            .extend(methods);
        self.stack.pop(); // subclass
        Ok(())
    }
}

// Return
impl VM {
    /// Return from the current function.
    ///
    /// Open upvalues still pointing into the frame's window are closed,
    /// the window (arguments, locals and the callee itself) is popped and
    /// the return value is pushed in its place.
    ///
    /// Returning from the bottom frame ends interpretation.
    pub(super) fn return_(&mut self) -> Option<super::InterpretResult> {
        let result = self.stack.pop().expect("Stack underflow in OP_RETURN");
        let frame = self
            .callstack
            .pop(&self.heap)
            .expect("Call stack underflow in OP_RETURN");
        self.close_upvalue(frame.stack_base);
        if self.callstack.is_empty() {
            self.stack.pop(); // the script closure
            return Some(super::InterpretResult::Ok);
        }
        self.stack.truncate(frame.stack_base);
        self.stack_push(result);
        None
    }
}
