//! The vm module contains the main struct for the virtual machine and heart of the interpreter.
//!
//! The VM orchestrates the scanning to tokens, parsing of the tokens and creation of bytecode,
//! as well as the actual execution of the bytecode.

#[macro_use]
mod runtime_error;
mod garbage_collection;
mod stack;

#[macro_use]
mod arithmetics;
#[macro_use]
mod run_instruction;
mod bytecode;
mod callstack;
mod error;
mod functions;
mod variables;

#[cfg(test)]
mod tests;

use callstack::CallStack;
pub(crate) use error::RuntimeError;

use rustc_hash::FxHashMap as HashMap;
use std::collections::VecDeque;
use std::time::Instant;

#[cfg(feature = "trace_execution")]
use crate::chunk::InstructionDisassembler;
use crate::{
    chunk::{CodeOffset, OpCode},
    compiler::Compiler,
    heap::{Heap, StringId, UpvalueId},
    natives,
    scanner::Scanner,
    value::{Class, Closure, Function, Upvalue, Value},
};

#[derive(Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum InterpretResult {
    Ok,
    CompileError,
    RuntimeError,
}

/// The main struct for the virtual machine and heart of the interpreter.
///
/// Contains the heap, operand stack, callstack, globals and open upvalues.
pub struct VM {
    pub(crate) heap: Heap,
    pub(crate) stack: Vec<Value>,
    callstack: CallStack,
    globals: HashMap<StringId, Value>,
    /// Open upvalues, ordered by descending stack slot.
    open_upvalues: VecDeque<UpvalueId>,
    start_time: Instant,
}

// Core functionality for running a script.
impl VM {
    #[must_use]
    pub fn new() -> Self {
        let mut vm = Self {
            heap: Heap::new(),
            stack: Vec::with_capacity(crate::config::STACK_MAX),
            callstack: CallStack::new(),
            globals: HashMap::default(),
            open_upvalues: VecDeque::new(),
            start_time: Instant::now(),
        };
        natives::define(&mut vm);
        vm
    }

    /// Main interpret step for an input of bytes.
    ///
    /// Works by compiling the source to bytecode and then running it.
    /// Even the main script is compiled into a function and wrapped in a
    /// closure, so all call sites are uniform.
    pub fn interpret(&mut self, source: &[u8]) -> InterpretResult {
        let result = if let Some(function) = self.compile(source) {
            let function_value = self.heap.add_function(function);

            let closure = Closure::new(*function_value.as_function(), &self.heap);
            let closure_value = self.heap.add_closure(closure);
            self.stack_push(closure_value);
            self.execute_call(*closure_value.as_closure(), 0)
                .expect("The script itself can always be called");

            self.run()
        } else {
            InterpretResult::CompileError
        };

        if result == InterpretResult::Ok {
            debug_assert_eq!(self.stack.len(), 0);
        }
        result
    }

    fn compile(&mut self, source: &[u8]) -> Option<Function> {
        let scanner = Scanner::new(source);
        let compiler = Compiler::new(scanner, &mut self.heap);
        compiler.compile()
    }

    /// Infinite loop over the bytecode.
    ///
    /// Returns when a return instruction is hit at the top level or a
    /// runtime error occurs.
    fn run(&mut self) -> InterpretResult {
        loop {
            run_instruction!(self);
        }
    }

    /// Reset the stacks and report a runtime error to the driver.
    ///
    /// The diagnostic itself has already been printed by `runtime_error!`.
    fn abort_on_runtime_error(&mut self) -> InterpretResult {
        self.stack.clear();
        self.callstack.truncate(0, &self.heap);
        self.open_upvalues.clear();
        InterpretResult::RuntimeError
    }

    pub(crate) fn start_time(&self) -> Instant {
        self.start_time
    }

    /// Define a native function in the globals.
    pub(crate) fn define_native(
        &mut self,
        name: &str,
        arity: u8,
        fun: crate::value::NativeFunctionImpl,
    ) {
        let name_id = self.heap.string_id(&name);
        let value = self.heap.add_native_function(crate::value::NativeFunction {
            name: name_id,
            arity,
            fun,
        });
        self.globals.insert(name_id, value);
    }
}

impl Default for VM {
    fn default() -> Self {
        Self::new()
    }
}
