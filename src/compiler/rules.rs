//! Parser for expressions while respecting operator precedence.
//!
//! Uses Vaughan Pratt's "top-down operator precedence parsing".

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::chunk::OpCode;
use crate::scanner::TokenKind as TK;

use super::Compiler;

// The precedence of the different operators in the language
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub(super) enum Precedence {
    None,
    Assignment, // =
    Or,         // or
    And,        // and
    Equality,   // == !=
    Comparison, // < > <= >=
    Term,       // + -
    Factor,     // * /
    Unary,      // ! -
    Call,       // . ()
    Primary,
}

// Typedef for the functions that parse the different types of expressions
type ParseFn<'scanner, 'heap> = fn(&mut Compiler<'scanner, 'heap>, bool) -> ();

// This specifies the functions that handle the parsing of an operator as prefix or infix,
// as well as its precedence. There will be one such struct for each Token.
#[derive(Clone)]
pub(super) struct Rule<'scanner, 'heap> {
    prefix: Option<ParseFn<'scanner, 'heap>>,
    infix: Option<ParseFn<'scanner, 'heap>>,
    precedence: Precedence,
}

impl Default for Rule<'_, '_> {
    fn default() -> Self {
        Self {
            prefix: Option::default(),
            infix: Option::default(),
            precedence: Precedence::None,
        }
    }
}

macro_rules! make_rules {
    (@parse_fn None) => { None };
    (@parse_fn $prefix:ident) => { Some(Compiler::$prefix) };

    ($($token:ident = [$prefix:ident, $infix:ident, $precedence:ident]),* $(,)?) => {{
        // Horrible hack to pre-fill the array with *something* before assigning the right values based on the macro input
        // Needed because `Rule` cannot be `Copy` (due to `fn`s)
        // If the tokens get input into the macro in the same order
        // that they appear in the enum then the loop is not needed.
        let mut rules = [$(Rule { prefix: make_rules!(@parse_fn $prefix), infix: make_rules!(@parse_fn $infix), precedence: Precedence::$precedence }),*];
        $(
            rules[TK::$token as usize] = Rule {
                prefix: make_rules!(@parse_fn $prefix),
                infix: make_rules!(@parse_fn $infix),
                precedence: Precedence::$precedence
            };
        )*
        rules
    }};
}

pub(super) type Rules<'scanner, 'heap> = [Rule<'scanner, 'heap>; 40];

// Can't be static because the associated function types include lifetimes
#[rustfmt::skip]
pub(super) fn make_rules<'scanner, 'heap>() -> Rules<'scanner, 'heap> {
    make_rules!(
        LeftParen    = [grouping, call,   Call      ],
        RightParen   = [None,     None,   None      ],
        LeftBrace    = [None,     None,   None      ],
        RightBrace   = [None,     None,   None      ],
        Comma        = [None,     None,   None      ],
        Dot          = [None,     dot,    Call      ],
        Minus        = [unary,    binary, Term      ],
        Plus         = [None,     binary, Term      ],
        Semicolon    = [None,     None,   None      ],
        Slash        = [None,     binary, Factor    ],
        Star         = [None,     binary, Factor    ],
        Bang         = [unary,    None,   None      ],
        BangEqual    = [None,     binary, Equality  ],
        Equal        = [None,     None,   None      ],
        EqualEqual   = [None,     binary, Equality  ],
        Greater      = [None,     binary, Comparison],
        GreaterEqual = [None,     binary, Comparison],
        Less         = [None,     binary, Comparison],
        LessEqual    = [None,     binary, Comparison],
        Identifier   = [variable, None,   None      ],
        String       = [string,   None,   None      ],
        Number       = [number,   None,   None      ],
        And          = [None,     and,    And       ],
        Class        = [None,     None,   None      ],
        Else         = [None,     None,   None      ],
        False        = [literal,  None,   None      ],
        For          = [None,     None,   None      ],
        Fun          = [None,     None,   None      ],
        If           = [None,     None,   None      ],
        Nil          = [literal,  None,   None      ],
        Or           = [None,     or,     Or        ],
        Print        = [None,     None,   None      ],
        Return       = [None,     None,   None      ],
        Super        = [super_,   None,   None      ],
        This         = [this,     None,   None      ],
        True         = [literal,  None,   None      ],
        Var          = [None,     None,   None      ],
        While        = [None,     None,   None      ],
        Error        = [None,     None,   None      ],
        Eof          = [None,     None,   None      ],
    )
}

impl<'scanner, 'heap> Compiler<'scanner, 'heap> {
    const fn get_rule(&self, operator: TK) -> &Rule<'scanner, 'heap> {
        &self.rules[operator as usize]
    }

    /// The actual precedence parsing function.
    ///
    /// Based on Vaughan Pratt's "top-down operator precedence parsing".
    /// See: [Crafting Interpreters](https://craftinginterpreters.com/compiling-expressions.html)
    pub(super) fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        if let Some(prefix_rule) = self.get_rule(self.previous.as_ref().unwrap().kind).prefix {
            let can_assign = precedence <= Precedence::Assignment;
            prefix_rule(self, can_assign);
            while precedence
                <= self
                    .get_rule(self.current.as_ref().unwrap().kind)
                    .precedence
            {
                self.advance();
                let infix_rule = self
                    .get_rule(self.previous.as_ref().unwrap().kind)
                    .infix
                    .unwrap();
                infix_rule(self, can_assign);
            }

            if can_assign && self.match_(TK::Equal) {
                self.error("Invalid assignment target.");
            }
        } else {
            self.error("Expect expression.");
        }
    }

    /// Parse the expression which will leave its value on the stack.
    /// Then emit the bytecode for the respective operation which will act on the value on the stack.
    fn unary(&mut self, _can_assign: bool) {
        let operator = self.previous.as_ref().unwrap().kind;
        let line = self.line();

        self.parse_precedence(Precedence::Unary);

        match operator {
            TK::Minus => self.emit_byte(OpCode::Negate, line),
            TK::Bang => self.emit_byte(OpCode::Not, line),
            _ => unreachable!("Unknown unary operator: {}", operator),
        }
    }

    /// For a binary operator, we need to parse the right operand and then emit the correct bytecode.
    /// The left operand is already on the stack.
    /// The final order on the stack will be that the right operand is on top of the left one.
    /// This is then handled correctly in the VM when the bytecode of a binary operator is encountered.
    fn binary(&mut self, _can_assign: bool) {
        // First operand is already on the stack
        let operator = self.previous.as_ref().unwrap().kind;
        let line = self.line();
        let rule = self.get_rule(operator);

        // Correctly put the second operand on the stack
        self.parse_precedence(
            Precedence::try_from_primitive(u8::from(rule.precedence) + 1).expect(
                "Invalid precedence in 'binary', should never be called for `Primary expression`.",
            ),
        );

        // Emit the correct byte code to perform the operation on the two values.
        // The instruction set only carries Equal, Greater and Less; the other
        // three comparisons are their negations.
        match operator {
            TK::BangEqual => self.emit_bytes(OpCode::Equal, OpCode::Not, line),
            TK::EqualEqual => self.emit_byte(OpCode::Equal, line),
            TK::Greater => self.emit_byte(OpCode::Greater, line),
            TK::GreaterEqual => self.emit_bytes(OpCode::Less, OpCode::Not, line),
            TK::Less => self.emit_byte(OpCode::Less, line),
            TK::LessEqual => self.emit_bytes(OpCode::Greater, OpCode::Not, line),
            TK::Plus => self.emit_byte(OpCode::Add, line),
            TK::Minus => self.emit_byte(OpCode::Subtract, line),
            TK::Star => self.emit_byte(OpCode::Multiply, line),
            TK::Slash => self.emit_byte(OpCode::Divide, line),
            _ => unreachable!("Unknown binary operator: {}", operator),
        }
    }

    /// Parsing any call just means parsing the arguments and then emitting the correct bytecode.
    fn call(&mut self, _can_assign: bool) {
        let arg_count = self.argument_list();
        self.emit_bytes(OpCode::Call, arg_count, self.line());
    }

    /// Parse property access.
    ///
    /// Cases like `a.b;`, `a.b = c;` and `a.b();` all have to be handled here.
    /// A property access immediately followed by a call list is compiled to
    /// `Invoke` so the common case never allocates a bound method.
    fn dot(&mut self, can_assign: bool) {
        self.consume(TK::Identifier, "Expect property name after '.'.");
        let name_constant =
            self.identifier_constant(&self.previous.as_ref().unwrap().as_str().to_string());
        let line = self.line();
        if can_assign && self.match_(TK::Equal) {
            self.expression();
            self.emit_byte(OpCode::SetProperty, line);
            if !self.emit_number(*name_constant) {
                self.error("Too many constants in one chunk.");
            }
        } else if self.match_(TK::LeftParen) {
            let arg_count = self.argument_list();
            self.emit_byte(OpCode::Invoke, line);
            if !self.emit_number(*name_constant) {
                self.error("Too many constants in one chunk.");
            }
            self.emit_byte(arg_count, line);
        } else {
            self.emit_byte(OpCode::GetProperty, line);
            if !self.emit_number(*name_constant) {
                self.error("Too many constants in one chunk.");
            }
        }
    }

    /// Handles the three tokens that directly correspond to values.
    fn literal(&mut self, _can_assign: bool) {
        let literal = self.previous.as_ref().unwrap().kind;
        match literal {
            TK::False => self.emit_byte(OpCode::False, self.line()),
            TK::Nil => self.emit_byte(OpCode::Nil, self.line()),
            TK::True => self.emit_byte(OpCode::True, self.line()),
            _ => unreachable!("Unknown literal: {}", literal),
        }
    }

    /// Used for grouping expressions to overwrite default precedence.
    ///
    /// The full expression within the grouping will be parsed as one.
    fn grouping(&mut self, _can_assign: bool) {
        self.expression();
        self.consume(TK::RightParen, "Expect ')' after expression.");
    }

    /// Emit a number literal constant.
    ///
    /// The value is taken from the last token, extracting the characters
    /// and parsing them to a double.
    /// The constant gets loaded into the current chunk's constant table
    /// and the index is pushed after the corresponding `OpCode`.
    /// The VM then loads the constant from the constant table using that index.
    fn number(&mut self, _can_assign: bool) {
        let value: f64 = self.previous.as_ref().unwrap().as_str().parse().unwrap();
        self.emit_constant(value);
    }

    /// Emit a string constant.
    ///
    /// Here, the string is taken from the lexeme of the token with the last and first
    /// character (`"`) stripped. Rest works like for [`Compiler::number`].
    fn string(&mut self, _can_assign: bool) {
        let lexeme = self.previous.as_ref().unwrap().as_str();
        let value = lexeme[1..lexeme.len() - 1].to_string();
        let string_id = self.heap.string_id(&value);
        self.emit_constant(string_id);
    }

    /// Short circuiting `and`.
    ///
    /// The result of such an expression is the left operand if it is falsey,
    /// otherwise the right operand. The right operand is not evaluated when
    /// the left one already decides the outcome.
    fn and(&mut self, _can_assign: bool) {
        let end_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_byte(OpCode::Pop, self.line());
        self.parse_precedence(Precedence::And);
        self.patch_jump(end_jump);
    }

    /// Short circuiting `or`.
    ///
    /// When the left operand is truthy it skips over the right operand
    /// and stays on the stack as the result.
    fn or(&mut self, _can_assign: bool) {
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        let end_jump = self.emit_jump(OpCode::Jump);

        self.patch_jump(else_jump);
        self.emit_byte(OpCode::Pop, self.line());

        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }

    /// Handle `this`.
    ///
    /// Inside a class this simply reads the local variable `this`
    /// which is initialized to the receiver.
    ///
    /// Outside of a class context this is a compile error.
    fn this(&mut self, _can_assign: bool) {
        if self.current_class().is_none() {
            self.error("Can't use 'this' outside of a class.");
            return;
        }
        self.variable(false);
    }

    /// Handle `super` expressions that interact with the superclass.
    ///
    /// Like `this`, `super` only works when used inside a class.
    /// Additionally, the class is required to have a superclass.
    /// Both are checked statically at compile time.
    ///
    /// Only method access either in the form of a call
    /// or to create a bound method is possible.
    fn super_(&mut self, _can_assign: bool) {
        match self.current_class() {
            None => {
                self.error("Can't use 'super' outside of a class.");
            }
            Some(class) if !class.has_superclass => {
                self.error("Can't use 'super' in a class with no superclass.");
            }
            _ => {}
        }
        self.consume(TK::Dot, "Expect '.' after 'super'.");
        self.consume(TK::Identifier, "Expect superclass method name.");
        let name = self.identifier_constant(&self.previous.as_ref().unwrap().as_str().to_string());

        let line = self.line();

        self.named_variable(&self.synthetic_token(TK::This).as_str(), false);
        if self.match_(TK::LeftParen) {
            let arg_count = self.argument_list();
            self.named_variable(&self.synthetic_token(TK::Super).as_str(), false);
            self.emit_byte(OpCode::SuperInvoke, line);
            if !self.emit_number(*name) {
                self.error("Too many constants in one chunk.");
            }
            self.emit_byte(arg_count, line);
        } else {
            self.named_variable(&self.synthetic_token(TK::Super).as_str(), false);
            self.emit_byte(OpCode::GetSuper, self.line());
            if !self.emit_number(*name) {
                self.error("Too many constants in one chunk.");
            }
        }
    }
}
