//! Native functions callable from Tok code.

use crate::{
    value::Value,
    vm::VM,
};

/// Seconds since the interpreter started, as a double.
fn clock_native(vm: &mut VM, _args: &[Value]) -> Result<Value, String> {
    Ok(Value::Number(vm.start_time().elapsed().as_secs_f64()))
}

/// Register all native functions in the VM's globals.
pub fn define(vm: &mut VM) {
    vm.define_native("clock", 0, clock_native);
}
