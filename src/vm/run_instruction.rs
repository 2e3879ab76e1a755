/// Main switch for the `OpCode` execution.
///
/// This is a macro for performance reasons:
/// the handlers can return straight out of the enclosing run loop and
/// the hot dispatch path stays free of an extra function call.
macro_rules! run_instruction {
    ($self:ident) => {
        #[cfg(feature = "trace_execution")]
        {
            let function = $self.callstack.function();
            let mut disassembler =
                InstructionDisassembler::new(&function.to_value(&$self.heap).chunk, &$self.heap);
            *disassembler.offset = $self.callstack.current().ip;
            println!(
                "          [ {} ]",
                $self
                    .stack
                    .iter()
                    .map(|v| v.to_string(&$self.heap))
                    .collect::<Vec<_>>()
                    .join(" ][ ")
            );
            print!("{disassembler:?}");
        }
        // Instruction boundaries are the collector's safepoints.
        $self.collect_garbage();
        match OpCode::try_from($self.read_byte()).expect("Internal error: unrecognized opcode") {
            // Index of the constant is the operand, value is in the constants table
            OpCode::Constant => {
                let value = $self.read_constant();
                $self.stack_push(value);
            }
            OpCode::Nil => $self.stack_push(Value::Nil),
            OpCode::True => $self.stack_push(Value::Bool(true)),
            OpCode::False => $self.stack_push(Value::Bool(false)),
            OpCode::Pop => {
                $self.stack.pop().expect("Stack underflow in OP_POP.");
            }
            // Grabs the slot (into the stack frame) as the operand (next bytecode)
            OpCode::GetLocal => {
                let slot = usize::from($self.read_byte());
                $self.stack_push(*$self.stack_get(slot));
            }
            // Slot is the operand again, value to set is on the stack and stays there
            OpCode::SetLocal => {
                let slot = usize::from($self.read_byte());
                *$self.stack_get_mut(slot) =
                    *$self.peek(0).expect("Stack underflow in OP_SET_LOCAL");
            }
            // Name of the global is the operand
            OpCode::GetGlobal => {
                if $self.get_global().is_err() {
                    return $self.abort_on_runtime_error();
                }
            }
            OpCode::DefineGlobal => $self.define_global(),
            OpCode::SetGlobal => {
                if $self.set_global().is_err() {
                    return $self.abort_on_runtime_error();
                }
            }
            // Upvalue index is the operand, closure is the one on the callstack
            OpCode::GetUpvalue => {
                let upvalue_index = usize::from($self.read_byte());
                let closure = $self.callstack.closure();
                let upvalue_location =
                    closure.to_value(&$self.heap).upvalues[upvalue_index].to_value(&$self.heap);
                match *upvalue_location {
                    Upvalue::Open(absolute_local_index) => {
                        $self.stack_push($self.stack[absolute_local_index]);
                    }
                    Upvalue::Closed(value) => $self.stack_push(value),
                }
            }
            // Upvalue index is the operand, value to set is on the stack
            OpCode::SetUpvalue => {
                let upvalue_index = usize::from($self.read_byte());
                let closure = $self.callstack.closure();
                let upvalue_id = closure.to_value(&$self.heap).upvalues[upvalue_index];
                let new_value = *$self
                    .peek(0)
                    .expect("Stack underflow in OP_SET_UPVALUE");
                match $self.heap.get_mut_upvalue(upvalue_id) {
                    Upvalue::Open(absolute_local_index) => {
                        let index = *absolute_local_index;
                        $self.stack[index] = new_value;
                    }
                    Upvalue::Closed(value) => {
                        *value = new_value;
                    }
                }
            }
            // Property to get is the operand, instance is on the stack
            OpCode::GetProperty => {
                if $self.get_property().is_err() {
                    return $self.abort_on_runtime_error();
                }
            }
            // Property to set is the operand, instance is on the stack
            // as is the value to set.
            OpCode::SetProperty => {
                if $self.set_property().is_err() {
                    return $self.abort_on_runtime_error();
                }
            }
            // Grab and bind a method from the superclass.
            // Operand is the name of the method, the stack has the superclass.
            OpCode::GetSuper => {
                if $self.get_super().is_err() {
                    return $self.abort_on_runtime_error();
                }
            }
            OpCode::Equal => $self.equal(),
            // All of these work on the top two stack values.
            // Top most is the right operand, second is the left.
            OpCode::Greater => binary_op!($self, >),
            OpCode::Less => binary_op!($self, <),
            OpCode::Add => {
                if $self.add().is_err() {
                    return $self.abort_on_runtime_error();
                }
            }
            OpCode::Subtract => binary_op!($self, -),
            OpCode::Multiply => binary_op!($self, *),
            OpCode::Divide => binary_op!($self, /),
            OpCode::Not => $self.not_(),
            OpCode::Negate => {
                if $self.negate().is_err() {
                    return $self.abort_on_runtime_error();
                }
            }
            OpCode::Print => $self.print(),
            // Unconditional forward jump, offset is the operand
            OpCode::Jump => {
                let offset = $self.read_16bit_number();
                $self.callstack.current_mut().ip += offset;
            }
            // Conditional forward jump. Peeks the condition, does not pop it.
            OpCode::JumpIfFalse => {
                let offset = $self.read_16bit_number();
                if $self
                    .peek(0)
                    .expect("Stack underflow in OP_JUMP_IF_FALSE")
                    .is_falsey()
                {
                    $self.callstack.current_mut().ip += offset;
                }
            }
            // Offset to jump backwards is the operand
            OpCode::Loop => {
                let offset = $self.read_16bit_number();
                $self.callstack.current_mut().ip -= offset;
            }
            // Arg count is passed as the operand.
            // The callee is on the stack followed by all arguments
            // in order from left to right.
            OpCode::Call => {
                if $self.call().is_err() {
                    return $self.abort_on_runtime_error();
                }
            }
            // Operands are the method name to invoke as well as the number of arguments.
            // Stack contains the instance followed by the arguments.
            OpCode::Invoke => {
                let method_name = $self.read_string("OP_INVOKE");
                let arg_count = $self.read_byte();
                if $self.invoke(method_name, arg_count).is_err() {
                    return $self.abort_on_runtime_error();
                }
            }
            // Invoke a method directly on the superclass.
            // Operands are the name of the method and number of arguments,
            // the stack has the superclass on top of the arguments.
            OpCode::SuperInvoke => {
                let method_name = $self.read_string("OP_SUPER_INVOKE");
                let arg_count = $self.read_byte();
                let superclass = $self
                    .stack
                    .pop()
                    .expect("Stack underflow in OP_SUPER_INVOKE");
                if $self
                    .invoke_from_class(*superclass.as_class(), method_name, arg_count)
                    .is_err()
                {
                    return $self.abort_on_runtime_error();
                }
            }
            // Get the function with the actual bytecode as a constant from the operand,
            // capture the upvalues and push the closure onto the stack.
            OpCode::Closure => {
                let value = $self.read_constant();
                let function = *value.as_function();
                let mut closure = Closure::new(function, &$self.heap);

                for _ in 0..closure.upvalue_count {
                    let is_local = $self.read_byte();
                    debug_assert!(
                        is_local == 0 || is_local == 1,
                        "'is_local' must be 0 or 1, got {is_local}"
                    );
                    let is_local = is_local == 1;

                    let index = usize::from($self.read_byte());
                    if is_local {
                        let upvalue = $self.capture_upvalue(index);
                        closure.upvalues.push(upvalue);
                    } else {
                        closure
                            .upvalues
                            .push($self.callstack.closure().to_value(&$self.heap).upvalues[index]);
                    }
                }
                let closure_value = $self.heap.add_closure(closure);
                $self.stack_push(closure_value);
            }
            // Hoist the local on top of the stack into its upvalue
            OpCode::CloseUpvalue => {
                $self.close_upvalue($self.stack.len() - 1);
                $self.stack.pop();
            }
            // Value to return is on the stack
            OpCode::Return => {
                if let Some(result) = $self.return_() {
                    return result;
                }
            }
            // Class name is the operand, create a new class and push it onto the stack
            OpCode::Class => {
                let class_name = $self.read_string("OP_CLASS");
                let class = $self.heap.add_class(Class::new(class_name));
                $self.stack_push(class);
            }
            // Stack has (... --- Superclass --- Class)
            OpCode::Inherit => {
                if $self.inherit().is_err() {
                    return $self.abort_on_runtime_error();
                }
            }
            // Name of the method is the operand, the closure is on the stack
            // together with the class (... --- Class --- Closure)
            OpCode::Method => {
                let method_name = $self.read_string("OP_METHOD");
                $self.define_method(method_name);
            }
        };
    };
}
