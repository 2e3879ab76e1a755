use crate::chunk::CodeOffset;

use super::{RuntimeError, VM};

impl VM {
    /// Push the value of a global variable.
    ///
    /// Globals are late-bound by name, so referencing one that was never
    /// defined is a runtime error, not a compile error.
    pub(super) fn get_global(&mut self) -> Result<(), RuntimeError> {
        let name = self.read_string("OP_GET_GLOBAL");
        if let Some(value) = self.globals.get(&name).copied() {
            self.stack_push(value);
            Ok(())
        } else {
            runtime_error!(self, "Undefined variable '{}'.", name.to_value(&self.heap));
            Err(RuntimeError::new())
        }
    }

    /// Assign to an existing global variable.
    ///
    /// Assignment is an expression, so the value stays on the stack.
    /// Assigning to a name that was never defined is a runtime error.
    pub(super) fn set_global(&mut self) -> Result<(), RuntimeError> {
        let name = self.read_string("OP_SET_GLOBAL");
        let stack_top_value = *self
            .peek(0)
            .expect("Stack underflow in OP_SET_GLOBAL");
        if let Some(global) = self.globals.get_mut(&name) {
            *global = stack_top_value;
            Ok(())
        } else {
            runtime_error!(self, "Undefined variable '{}'.", name.to_value(&self.heap));
            Err(RuntimeError::new())
        }
    }

    /// Define (or redefine) a global variable with the value on top
    /// of the stack.
    pub(super) fn define_global(&mut self) {
        let name = self.read_string("OP_DEFINE_GLOBAL");
        let stack_top_value = *self
            .peek(0)
            .expect("Stack underflow in OP_DEFINE_GLOBAL");
        self.globals.insert(name, stack_top_value);
        self.stack.pop();
    }
}
