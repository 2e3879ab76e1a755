/// Report runtime errors with the correct line number and function name.
///
/// Prints the message followed by one trace line per live call frame,
/// innermost first. The line is taken from the instruction preceding
/// the frame's current ip. Macro for borrow checking reasons.
macro_rules! runtime_error {
    ($self:ident, $($arg:expr),* $(,)?) => {
        eprintln!($($arg),*);
        for frame in $self.callstack.iter().rev() {
            let function = frame.closure(&$self.heap).function.to_value(&$self.heap);
            let line = function.chunk.get_line(CodeOffset(frame.ip - 1));
            if function.name == $self.heap.builtin_constants().script_name {
                eprintln!("[line {}] in script", *line);
            } else {
                eprintln!("[line {}] in {}()", *line, function.name.to_value(&$self.heap));
            }
        }
    };
}
