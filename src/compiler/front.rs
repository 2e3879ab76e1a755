//! Frontend of the compiler.
//!
//! Parses the tokens from the scanner to emit the correct bytecode for
//! declarations, statements and expressions.

use super::{ClassState, Compiler, FunctionType, rules::Precedence};

use crate::{
    chunk::{CodeOffset, OpCode},
    heap::StringId,
    scanner::TokenKind as TK,
    types::Line,
};

impl Compiler<'_, '_> {
    pub(super) fn advance(&mut self) {
        self.previous = std::mem::take(&mut self.current);
        loop {
            let token = self.scanner.scan();
            self.current = Some(token);
            if !self.check(TK::Error) {
                break;
            }
            // Could manually recursively inline `error_at_current` to get rid of this string copy,
            // but... this seems good enough, really.
            #[allow(clippy::unnecessary_to_owned)]
            self.error_at_current(&self.current.as_ref().unwrap().as_str().to_string());
        }
    }

    pub(super) fn consume(&mut self, kind: TK, msg: &str) {
        if self.check(kind) {
            self.advance();
            return;
        }
        self.error_at_current(msg);
    }

    pub(super) fn match_(&mut self, kind: TK) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    pub(super) fn check(&self, kind: TK) -> bool {
        self.current_token_kind() == Some(kind)
    }

    pub(super) fn current_token_kind(&self) -> Option<TK> {
        self.current.as_ref().map(|t| t.kind)
    }

    pub(super) fn check_previous(&self, kind: TK) -> bool {
        self.previous.as_ref().is_some_and(|t| t.kind == kind)
    }

    /// Produce bytecode for parsing an expression.
    ///
    /// After that bytecode runs the resulting value will be on top of the stack.
    pub(super) fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    pub(super) fn declaration(&mut self) {
        if self.match_(TK::Var) {
            self.var_declaration();
        } else if self.match_(TK::Fun) {
            self.fun_declaration();
        } else if self.match_(TK::Class) {
            self.class_declaration();
        } else {
            self.statement();
        }
        if self.panic_mode {
            self.synchronize();
        }
    }

    fn var_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");

        if self.match_(TK::Equal) {
            self.expression();
        } else {
            self.emit_byte(OpCode::Nil, self.line());
        }

        self.consume(TK::Semicolon, "Expect ';' after variable declaration.");

        self.define_variable(global);
    }

    fn fun_declaration(&mut self) {
        let global = self.parse_variable("Expect function name.");
        // Functions may refer to themselves recursively, so the name is
        // usable before the body is finished.
        self.mark_initialized();
        let function_name = self.previous_identifier();
        self.function(function_name, FunctionType::Function);
        self.define_variable(global);
    }

    fn class_declaration(&mut self) {
        self.consume(TK::Identifier, "Expect class name.");
        let class_name = self.previous.as_ref().unwrap().as_str().to_string();
        let name_constant = self.identifier_constant(&class_name);
        self.declare_variable();
        self.emit_byte(OpCode::Class, self.line());
        if !self.emit_number(*name_constant) {
            self.error("Too many constants in one chunk.");
        }
        self.define_variable(Some(name_constant));
        self.class_state.push(ClassState::new());

        if self.match_(TK::Less) {
            self.consume(TK::Identifier, "Expect superclass name.");
            self.variable(false);

            if class_name == self.previous.as_ref().unwrap().as_str() {
                self.error("A class can't inherit from itself.");
            }

            // The superclass stays reachable through a hidden local named
            // `super` wrapped around the class body.
            self.begin_scope();
            self.add_local(self.synthetic_token(TK::Super));
            self.define_variable(None);

            self.named_variable(&class_name, false);
            self.emit_byte(OpCode::Inherit, self.line());
            self.current_class_mut().unwrap().has_superclass = true;
        }

        self.named_variable(&class_name, false);
        self.consume(TK::LeftBrace, "Expect '{' before class body.");
        while !self.check(TK::RightBrace) && !self.check(TK::Eof) {
            self.method();
        }
        self.consume(TK::RightBrace, "Expect '}' after class body.");
        self.emit_byte(OpCode::Pop, self.line());

        if self.current_class().unwrap().has_superclass {
            self.end_scope();
        }

        self.class_state.pop();
    }

    fn statement(&mut self) {
        if self.match_(TK::Print) {
            self.print_statement();
        } else if self.match_(TK::If) {
            self.if_statement();
        } else if self.match_(TK::LeftBrace) {
            self.scoped_block();
        } else if self.match_(TK::While) {
            self.while_statement();
        } else if self.match_(TK::For) {
            self.for_statement();
        } else if self.match_(TK::Return) {
            self.return_statement();
        } else {
            self.expression_statement();
        }
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TK::Semicolon, "Expect ';' after value.");
        self.emit_byte(OpCode::Print, self.line());
    }

    /// Parse an `if` statement.
    ///
    /// Structure is:
    ///
    /// if (condition)
    ///     "A": then statement
    /// else
    ///     "B": else statement
    /// "C" // Continue here after the conditional statement.
    fn if_statement(&mut self) {
        self.consume(TK::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TK::RightParen, "Expect ')' after condition.");

        // If the condition is falsey we jump over the "then" branch to "B".
        // The condition value stays on the stack, both paths pop it explicitly.
        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_byte(OpCode::Pop, self.line());
        self.statement();

        // After the "then" branch always jump over the "else" branch to "C".
        let else_jump = self.emit_jump(OpCode::Jump);

        self.patch_jump(then_jump);
        self.emit_byte(OpCode::Pop, self.line());

        if self.match_(TK::Else) {
            self.statement();
        }

        self.patch_jump(else_jump);
    }

    fn scoped_block(&mut self) {
        self.begin_scope();
        self.block();
        self.end_scope();
    }

    fn block(&mut self) {
        while !self.check(TK::RightBrace) && !self.check(TK::Eof) {
            self.declaration();
        }

        self.consume(TK::RightBrace, "Expect '}' after block.");
    }

    fn while_statement(&mut self) {
        let loop_start = CodeOffset(self.current_chunk_len());

        self.consume(TK::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TK::RightParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_byte(OpCode::Pop, self.line());
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_byte(OpCode::Pop, self.line());
    }

    /// Parse a C-style `for` statement.
    ///
    /// The initializer runs in its own scope. When an increment clause is
    /// present the body jumps over it on the way in, the increment jumps
    /// back to the condition, and the body's backward jump is rewired to
    /// the increment.
    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TK::LeftParen, "Expect '(' after 'for'.");
        let line = self.line();

        if self.match_(TK::Semicolon) {
            // No initializer.
        } else if self.match_(TK::Var) {
            self.var_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = CodeOffset(self.current_chunk_len());

        let exit_jump = (!self.match_(TK::Semicolon)).then(|| {
            self.expression();
            self.consume(TK::Semicolon, "Expect ';' after loop condition.");
            let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
            self.emit_byte(OpCode::Pop, self.line());
            exit_jump
        });

        if !self.match_(TK::RightParen) {
            let body_jump = self.emit_jump(OpCode::Jump);
            let increment_start = CodeOffset(self.current_chunk_len());
            self.expression();
            self.emit_byte(OpCode::Pop, line);
            self.consume(TK::RightParen, "Expect ')' after for clauses.");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump);
            self.emit_byte(OpCode::Pop, line);
        }

        self.end_scope();
    }

    fn return_statement(&mut self) {
        if self.function_type() == FunctionType::Script {
            self.error("Can't return from top-level code.");
        }
        if self.match_(TK::Semicolon) {
            self.emit_return();
        } else {
            if self.function_type() == FunctionType::Initializer {
                self.error("Can't return a value from an initializer.");
            }
            self.expression();
            self.consume(TK::Semicolon, "Expect ';' after return value.");
            self.emit_byte(OpCode::Return, self.line());
        }
    }

    fn expression_statement(&mut self) {
        let line = self.line();
        self.expression();
        self.consume(TK::Semicolon, "Expect ';' after expression.");
        self.emit_byte(OpCode::Pop, line);
    }

    fn previous_identifier(&mut self) -> StringId {
        let name = self.previous.as_ref().unwrap().as_str().to_string();
        self.heap.string_id(&name)
    }

    /// Compile a function body into its own `Function` object.
    ///
    /// Compilation happens in a fresh nested compiler state. Afterwards
    /// the enclosing chunk receives the `Closure` instruction followed by
    /// one `(is_local, index)` byte pair per captured upvalue, which the
    /// VM consumes to build the runtime upvalue array.
    pub(super) fn function(&mut self, function_name: StringId, function_type: FunctionType) {
        let line = self.line();
        let nested_state = self.nested(function_name, function_type, |compiler| {
            compiler.begin_scope();

            compiler.consume(TK::LeftParen, "Expect '(' after function name.");

            if !compiler.check(TK::RightParen) {
                loop {
                    if compiler.current_function().arity == 255 {
                        compiler.error_at_current("Can't have more than 255 parameters.");
                    } else {
                        compiler.current_function_mut().arity += 1;
                    }
                    let constant = compiler.parse_variable("Expect parameter name.");
                    compiler.define_variable(constant);
                    if !compiler.match_(TK::Comma) {
                        break;
                    }
                }
            }

            compiler.consume(TK::RightParen, "Expect ')' after parameters.");
            compiler.consume(TK::LeftBrace, "Expect '{' before function body.");
            compiler.block();
            compiler.end();
        });

        let nested_function = nested_state.current_function;
        let nested_upvalues = nested_state.upvalues;

        self.emit_byte(OpCode::Closure, line);
        let function_value = self.heap.add_function(nested_function);
        let index = self.current_chunk_mut().make_constant(function_value);
        if !self.emit_number(*index) {
            self.error("Too many constants in one chunk.");
        }

        for upvalue in nested_upvalues {
            self.emit_bytes(upvalue.is_local, upvalue.index, line);
        }
    }

    fn method(&mut self) {
        self.consume(TK::Identifier, "Expect method name.");
        let name_constant =
            self.identifier_constant(&self.previous.as_ref().unwrap().as_str().to_string());
        let function_type = if self.previous.as_ref().unwrap().lexeme == b"init" {
            FunctionType::Initializer
        } else {
            FunctionType::Method
        };
        let method_name = self.previous_identifier();
        self.function(method_name, function_type);
        self.emit_byte(OpCode::Method, self.line());
        if !self.emit_number(*name_constant) {
            self.error("Too many constants in one chunk.");
        }
    }

    pub(super) fn line(&self) -> Line {
        self.previous.as_ref().map_or(Line(0), |x| x.line)
    }
}
