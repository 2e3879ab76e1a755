//! The compiler module contains the compiler for the Tok language.
//!
//! It compiles tokens from the scanner into bytecode for the VM to execute.
//! Compilation happens in a single pass, no AST is ever materialised.

mod back;
mod error;
mod front;
mod rules;
mod variables;

use rustc_hash::FxHashMap as HashMap;

use shrinkwraprs::Shrinkwrap;

use crate::{
    chunk::{Chunk, ConstantLongIndex},
    compiler::rules::{Rules, make_rules},
    heap::{Heap, StringId},
    scanner::{Scanner, Token, TokenKind},
    types::Line,
    value::Function,
};

#[derive(Shrinkwrap, Clone, Copy, PartialOrd, Ord, PartialEq, Eq, Default, Debug)]
#[shrinkwrap(mutable)]
struct ScopeDepth(i32);

/// Represents a local variable in the current scope.
///
/// Stores its depth in order to properly release it when a scope ends
/// and whether it is captured by a closure. Also contains the token it
/// was created from, usually an identifier. Synthetic tokens exist for
/// `super` and `this`.
#[derive(Debug)]
struct Local<'scanner> {
    name: Token<'scanner>,
    depth: ScopeDepth,
    is_captured: bool,
}

/// Characterizes the types of functions.
///
/// - Function is a normal function.
/// - Initializer is a constructor and is special because it returns `this` on exit without
///   a return statement or on a bare `return`. Returns with values are not allowed.
/// - Method is a method on a class. It is special because the local slot 0 is always `this`.
/// - Script is the top-level code in a file. Does not allow `return` statements.
#[derive(Copy, Clone, PartialEq, Eq)]
enum FunctionType {
    Function,
    Initializer,
    Method,
    Script,
}

/// Struct to handle the state of an upvalue.
///
/// Tracks the position of the upvalue and whether it is captured directly from
/// a local variable or from the upvalue of an enclosing closure.
#[derive(Clone, Debug)]
struct Upvalue {
    index: u8,
    is_local: bool,
}

/// Nestable part of the compiler state.
///
/// This struct is used to keep track of the state of the compiler that can be nested
/// when compiling nested functions.
struct NestableState<'scanner> {
    current_function: Function,
    function_type: FunctionType,

    locals: Vec<Local<'scanner>>,
    globals_by_name: HashMap<StringId, ConstantLongIndex>,
    upvalues: Vec<Upvalue>,
    scope_depth: ScopeDepth,
}

impl NestableState<'_> {
    #[must_use]
    fn new(function_name: StringId, function_type: FunctionType) -> Self {
        NestableState {
            current_function: Function::new(0, function_name),
            function_type,
            // Slot 0 is reserved: it names `this` inside methods and is the
            // anonymous callee placeholder everywhere else.
            locals: vec![Local {
                name: Token {
                    kind: TokenKind::Identifier,
                    lexeme: if function_type == FunctionType::Method
                        || function_type == FunctionType::Initializer
                    {
                        b"this"
                    } else {
                        &[]
                    },
                    line: Line(0),
                },
                depth: ScopeDepth::default(),
                is_captured: false,
            }],
            upvalues: Vec::new(),
            globals_by_name: HashMap::default(),
            scope_depth: ScopeDepth::default(),
        }
    }
}

/// Keep track of the state of a class declaration.
///
/// Needed as a stack for nested class declarations.
/// Gates the use of `this` and `super` and tracks whether the class
/// has a superclass.
struct ClassState {
    has_superclass: bool,
}

impl ClassState {
    #[must_use]
    const fn new() -> Self {
        Self {
            has_superclass: false,
        }
    }
}

/// Main compiler struct that turns tokens into bytecode.
pub struct Compiler<'scanner, 'heap> {
    /// The VM heap. Already present here to store compiled functions
    /// and intern strings.
    heap: &'heap mut Heap,

    /// Rules used for parsing expressions by precedence climbing.
    rules: Rules<'scanner, 'heap>,

    /// The scanner that provides tokens to the compiler.
    scanner: Scanner<'scanner>,
    previous: Option<Token<'scanner>>,
    current: Option<Token<'scanner>>,

    had_error: bool,
    panic_mode: bool,

    nestable_state: Vec<NestableState<'scanner>>,
    class_state: Vec<ClassState>,
}

impl<'scanner, 'heap> Compiler<'scanner, 'heap> {
    #[must_use]
    pub(super) fn new(scanner: Scanner<'scanner>, heap: &'heap mut Heap) -> Self {
        let function_name = heap.builtin_constants().script_name;

        Compiler {
            heap,
            scanner,
            previous: None,
            current: None,
            had_error: false,
            panic_mode: false,
            rules: make_rules(),
            nestable_state: vec![NestableState::new(function_name, FunctionType::Script)],
            class_state: vec![],
        }
    }

    /// Compile the tokens provided by the scanner into a function.
    ///
    /// This is the main compilation loop.
    pub(super) fn compile(mut self) -> Option<Function> {
        self.advance();

        while !self.match_(TokenKind::Eof) {
            self.declaration();
        }

        self.end();
        if self.had_error {
            None
        } else {
            Some(self.nestable_state.pop().unwrap().current_function)
        }
    }

    // Nesting related functions are here to not have to export the `NestableState` struct.
    fn start_nesting(&mut self, function_name: StringId, function_type: FunctionType) {
        self.nestable_state
            .push(NestableState::new(function_name, function_type));
    }

    fn end_nesting(&mut self) -> NestableState<'scanner> {
        self.nestable_state.pop().unwrap()
    }

    fn nested<F>(
        &mut self,
        function_name: StringId,
        function_type: FunctionType,
        f: F,
    ) -> NestableState<'scanner>
    where
        F: Fn(&mut Self),
    {
        self.start_nesting(function_name, function_type);
        f(self);
        self.end_nesting()
    }

    fn has_enclosing(&self) -> bool {
        self.nestable_state.len() > 1
    }

    /// Call a function from within the enclosing scope.
    ///
    /// Mainly used for recursively resolving upvalues.
    fn in_enclosing<F, R>(&mut self, f: F) -> R
    where
        F: Fn(&mut Self) -> R,
    {
        assert!(self.has_enclosing());
        let state = self.nestable_state.pop().unwrap();
        let result = f(self);
        self.nestable_state.push(state);
        result
    }

    fn current_function(&self) -> &Function {
        &self.nestable_state.last().unwrap().current_function
    }

    fn current_function_mut(&mut self) -> &mut Function {
        &mut self.nestable_state.last_mut().unwrap().current_function
    }

    fn locals(&self) -> &Vec<Local<'scanner>> {
        &self.nestable_state.last().unwrap().locals
    }

    fn locals_mut(&mut self) -> &mut Vec<Local<'scanner>> {
        &mut self.nestable_state.last_mut().unwrap().locals
    }

    fn function_type(&self) -> FunctionType {
        self.nestable_state.last().unwrap().function_type
    }

    fn scope_depth(&self) -> ScopeDepth {
        self.nestable_state.last().unwrap().scope_depth
    }

    fn scope_depth_mut(&mut self) -> &mut ScopeDepth {
        &mut self.nestable_state.last_mut().unwrap().scope_depth
    }

    fn globals_by_name(&self) -> &HashMap<StringId, ConstantLongIndex> {
        &self.nestable_state.last().unwrap().globals_by_name
    }

    fn globals_by_name_mut(&mut self) -> &mut HashMap<StringId, ConstantLongIndex> {
        &mut self.nestable_state.last_mut().unwrap().globals_by_name
    }

    fn upvalues(&self) -> &Vec<Upvalue> {
        &self.nestable_state.last().unwrap().upvalues
    }

    fn upvalues_mut(&mut self) -> &mut Vec<Upvalue> {
        &mut self.nestable_state.last_mut().unwrap().upvalues
    }

    fn current_chunk(&self) -> &Chunk {
        &self.current_function().chunk
    }

    fn current_chunk_mut(&mut self) -> &mut Chunk {
        &mut self.current_function_mut().chunk
    }

    fn current_chunk_len(&self) -> usize {
        self.current_chunk().code().len()
    }

    fn current_class(&self) -> Option<&ClassState> {
        self.class_state.last()
    }

    fn current_class_mut(&mut self) -> Option<&mut ClassState> {
        self.class_state.last_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(source: &str) -> Option<Function> {
        let mut heap = Heap::new();
        let compiler = Compiler::new(Scanner::new(source.as_bytes()), &mut heap);
        compiler.compile()
    }

    #[test]
    fn test_empty_program_compiles() {
        assert!(compile("").is_some());
    }

    #[test]
    fn test_valid_programs_compile() {
        assert!(compile("print 1 + 2 * 3;").is_some());
        assert!(compile("var a = 1; { var b = a; print b; }").is_some());
        assert!(compile("fun f(a, b) { return a + b; } print f(1, 2);").is_some());
        assert!(compile("class A { init(v) { this.v = v; } } print A(1).v;").is_some());
        assert!(
            compile("class A { m() {} } class B < A { m() { super.m(); } }").is_some()
        );
        assert!(compile("for (var i = 0; i < 3; i = i + 1) print i;").is_some());
        assert!(compile("while (false) {}").is_some());
    }

    #[test]
    fn test_syntax_errors() {
        assert!(compile("print 1").is_none()); // missing ';'
        assert!(compile("var 1 = 2;").is_none());
        assert!(compile("1 +;").is_none());
        assert!(compile("{").is_none());
    }

    #[test]
    fn test_invalid_assignment_target() {
        assert!(compile("1 + 2 = 3;").is_none());
        assert!(compile("a + b = 1;").is_none());
    }

    #[test]
    fn test_local_variable_errors() {
        assert!(compile("{ var a = 1; var a = 2; }").is_none());
        assert!(compile("{ var a = a; }").is_none());
        // Shadowing in an inner scope is fine.
        assert!(compile("{ var a = 1; { var a = 2; } }").is_some());
    }

    #[test]
    fn test_return_restrictions() {
        assert!(compile("return 1;").is_none());
        assert!(compile("class A { init() { return 1; } }").is_none());
        assert!(compile("class A { init() { return; } }").is_some());
    }

    #[test]
    fn test_this_and_super_restrictions() {
        assert!(compile("print this;").is_none());
        assert!(compile("fun f() { return this; }").is_none());
        assert!(compile("print super.x;").is_none());
        assert!(compile("class A { m() { super.m(); } }").is_none());
        assert!(compile("class A < A {}").is_none());
    }

    #[test]
    fn test_too_many_constants() {
        let mut source = String::new();
        for i in 0..257 {
            source.push_str(&format!("print {i}.5;\n"));
        }
        assert!(compile(&source).is_none());
    }

    #[test]
    fn test_parameter_limit() {
        let params = (0..=255).map(|i| format!("p{i}")).collect::<Vec<_>>();
        let source = format!("fun f({}) {{}}", params.join(", "));
        assert!(compile(&source).is_none());

        let params = (0..255).map(|i| format!("p{i}")).collect::<Vec<_>>();
        let source = format!("fun f({}) {{}}", params.join(", "));
        assert!(compile(&source).is_some());
    }

    #[test]
    fn test_argument_limit() {
        let args = (0..=255).map(|i| i.to_string()).collect::<Vec<_>>();
        let source = format!("fun f() {{}} f({});", args.join(", "));
        assert!(compile(&source).is_none());
    }

    #[test]
    fn test_error_recovery_reports_multiple_statements() {
        // Synchronisation lets compilation continue past the first error;
        // the result is still discarded.
        assert!(compile("var 1; print 2; var 2;").is_none());
    }
}
