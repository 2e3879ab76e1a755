/// Runtime error type for the virtual machine.
///
/// The diagnostic (message plus stack trace) has already been printed
/// by the time this value is constructed; it only drives unwinding to
/// the interpreter entry point.
#[derive(thiserror::Error, Debug)]
pub enum RuntimeError {
    #[error("Runtime error occurred")]
    Runtime,
}

impl RuntimeError {
    pub fn new() -> Self {
        Self::Runtime
    }
}
