use crate::chunk::{Chunk, OpCode};
use crate::constants::MAX_STACK_SIZE;
use crate::gc::GarbageCollector;
use crate::objects::object::Object;
use crate::objects::object_function::ObjectFunction;
use crate::objects::object_manager::ObjectManager;
use crate::objects::object_string::ObjectString;
use crate::scanner::{Scanner, Token, TokenType};
use crate::table::Table;
use crate::value::{as_string, make_number_value, make_object_value, make_string_value, Value};

pub struct Parser<'a> {
    current: Token<'a>,
    previous: Token<'a>,
    scanner: Option<Box<Scanner<'a>>>,
    has_error: bool,
    panic_mode: bool,
    compilers: Vec<Compiler<'a>>,
    class_compilers: Vec<ClassCompiler>,
    object_manager: &'a mut ObjectManager,
    intern_strings: &'a mut Table,
    globals: &'a Table,
    init_str: *mut ObjectString,
    gc: GarbageCollector,
}

struct Local<'a> {
    name: Token<'a>,
    depth: i32,
    is_captured: bool,
}

#[derive(Clone)]
struct Upvalue {
    index: usize,
    is_local: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FunctionType {
    Function,
    Initializer,
    Method,
    Script,
}

struct Compiler<'a> {
    function: *mut ObjectFunction,
    function_type: FunctionType,
    locals: Vec<Local<'a>>,
    upvalues: Vec<Upvalue>,
    scope_depth: i32,
}

struct ClassCompiler {
    has_superclass: bool,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
enum Precedence {
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

impl From<u8> for Precedence {
    fn from(value: u8) -> Self {
        match value {
            0 => Precedence::None,
            1 => Precedence::Assignment,
            2 => Precedence::Or,
            3 => Precedence::And,
            4 => Precedence::Equality,
            5 => Precedence::Comparison,
            6 => Precedence::Term,
            7 => Precedence::Factor,
            8 => Precedence::Unary,
            9 => Precedence::Call,
            10 => Precedence::Primary,
            _ => unreachable!("Invalid precedence value: {}", value),
        }
    }
}

type ParserFn = fn(&mut Parser<'_>, bool);

#[derive(Debug, Clone, Copy)]
struct ParseRule {
    prefix: Option<ParserFn>,
    infix: Option<ParserFn>,
    precedence: Precedence,
}

impl ParseRule {
    const fn new(
        prefix: Option<ParserFn>,
        infix: Option<ParserFn>,
        precedence: Precedence,
    ) -> Self {
        ParseRule {
            prefix,
            infix,
            precedence,
        }
    }
}

const RULES: [ParseRule; TokenType::Eof as usize + 1] = {
    let mut rules = [ParseRule::new(None, None, Precedence::None); TokenType::Eof as usize + 1];

    rules[TokenType::LeftParen as usize] = ParseRule::new(
        Some(|parser, _can_assign| parser.grouping()),
        Some(|parser, can_assign| parser.call(can_assign)),
        Precedence::Call,
    );

    rules[TokenType::Dot as usize] = ParseRule::new(
        None,
        Some(|parser, can_assign| parser.dot(can_assign)),
        Precedence::Call,
    );

    rules[TokenType::Minus as usize] = ParseRule::new(
        Some(|parser, _can_assign| parser.unary()),
        Some(|parser, _can_assign| parser.binary()),
        Precedence::Term,
    );

    rules[TokenType::Plus as usize] = ParseRule::new(
        None,
        Some(|parser, _can_assign| parser.binary()),
        Precedence::Term,
    );

    rules[TokenType::Slash as usize] = ParseRule::new(
        None,
        Some(|parser, _can_assign| parser.binary()),
        Precedence::Factor,
    );

    rules[TokenType::Star as usize] = ParseRule::new(
        None,
        Some(|parser, _can_assign| parser.binary()),
        Precedence::Factor,
    );

    rules[TokenType::Number as usize] = ParseRule::new(
        Some(|parser, _can_assign| parser.number()),
        None,
        Precedence::None,
    );

    rules[TokenType::String as usize] = ParseRule::new(
        Some(|parser, _can_assign| parser.string()),
        None,
        Precedence::None,
    );

    rules[TokenType::False as usize] = ParseRule::new(
        Some(|parser, _can_assign| parser.literal()),
        None,
        Precedence::None,
    );

    rules[TokenType::True as usize] = ParseRule::new(
        Some(|parser, _can_assign| parser.literal()),
        None,
        Precedence::None,
    );

    rules[TokenType::None as usize] = ParseRule::new(
        Some(|parser, _can_assign| parser.literal()),
        None,
        Precedence::None,
    );

    rules[TokenType::Bang as usize] = ParseRule::new(
        Some(|parser, _can_assign| parser.unary()),
        None,
        Precedence::None,
    );

    rules[TokenType::BangEqual as usize] = ParseRule::new(
        None,
        Some(|parser, _can_assign| parser.binary()),
        Precedence::Equality,
    );

    rules[TokenType::EqualEqual as usize] = ParseRule::new(
        None,
        Some(|parser, _can_assign| parser.binary()),
        Precedence::Equality,
    );

    rules[TokenType::Greater as usize] = ParseRule::new(
        None,
        Some(|parser, _can_assign| parser.binary()),
        Precedence::Comparison,
    );

    rules[TokenType::GreaterEqual as usize] = ParseRule::new(
        None,
        Some(|parser, _can_assign| parser.binary()),
        Precedence::Comparison,
    );

    rules[TokenType::Less as usize] = ParseRule::new(
        None,
        Some(|parser, _can_assign| parser.binary()),
        Precedence::Comparison,
    );

    rules[TokenType::LessEqual as usize] = ParseRule::new(
        None,
        Some(|parser, _can_assign| parser.binary()),
        Precedence::Comparison,
    );

    rules[TokenType::Identifier as usize] = ParseRule::new(
        Some(|parser, can_assign| parser.variable(can_assign)),
        None,
        Precedence::None,
    );

    rules[TokenType::And as usize] = ParseRule::new(
        None,
        Some(|parser, _can_assign| parser.and()),
        Precedence::And,
    );

    rules[TokenType::Or as usize] = ParseRule::new(
        None,
        Some(|parser, _can_assign| parser.or()),
        Precedence::Or,
    );

    rules[TokenType::This as usize] = ParseRule::new(
        Some(|parser, _can_assign| parser.this()),
        None,
        Precedence::None,
    );

    rules[TokenType::Super as usize] = ParseRule::new(
        Some(|parser, _can_assign| parser.super_()),
        None,
        Precedence::None,
    );

    rules
};

impl<'a> Parser<'a> {
    pub fn new(
        object_manager: &'a mut ObjectManager,
        intern_strings: &'a mut Table,
        globals: &'a Table,
        init_str: *mut ObjectString,
    ) -> Box<Parser<'a>> {
        let mut parser = Box::new(Parser {
            current: Token {
                token_type: TokenType::Eof,
                value: "",
                line: 0,
            },
            previous: Token {
                token_type: TokenType::Eof,
                value: "",
                line: 0,
            },
            scanner: None,
            has_error: false,
            panic_mode: false,
            compilers: vec![],
            class_compilers: vec![],
            object_manager,
            intern_strings,
            globals,
            init_str,
            gc: GarbageCollector::new(),
        });
        parser.init_compiler(FunctionType::Script);
        parser
    }

    pub fn compile(&mut self, source: &'a str) -> Option<*mut ObjectFunction> {
        self.scanner = Some(Scanner::new(source));

        self.advance();

        while !self.match_token(TokenType::Eof) {
            self.declaration();
        }

        let function = self.end_compiler();
        if self.has_error {
            None
        } else {
            Some(function)
        }
    }

    // Collection can run while compiling, so every function still being
    // built (and, through it, its chunk constants) is a root, alongside the
    // globals the VM already owns.
    fn collect_garbage(&mut self) {
        let before = self.object_manager.bytes_allocated();
        for compiler in &self.compilers {
            self.gc.mark_object(compiler.function as *mut Object);
        }
        self.gc.mark_table(self.globals);
        self.gc.mark_object(self.init_str as *mut Object);
        self.gc.trace_references();
        self.intern_strings.remove_white();
        let freed = self.gc.sweep(self.object_manager);
        let next_trigger = self.object_manager.update_next_gc();
        let after = self.object_manager.bytes_allocated();
        self.gc.record_cycle(before, freed, after, next_trigger);
    }

    fn maybe_collect(&mut self) {
        if self.object_manager.should_collect() {
            self.collect_garbage();
        }
    }

    fn allocate_string_value(&mut self, content: &str) -> Value {
        self.maybe_collect();
        make_string_value(self.object_manager, self.intern_strings, content)
    }

    fn specific_compiler(&self, compiler_index: usize) -> &Compiler<'a> {
        self.compilers
            .get(compiler_index)
            .expect("compiler index is invalid")
    }

    fn specific_compiler_mut(&mut self, compiler_index: usize) -> &mut Compiler<'a> {
        self.compilers
            .get_mut(compiler_index)
            .expect("compiler index is invalid")
    }

    fn current_compiler(&self) -> &Compiler<'a> {
        self.compilers.last().expect("no active compiler")
    }

    fn current_compiler_mut(&mut self) -> &mut Compiler<'a> {
        self.compilers.last_mut().expect("no active compiler")
    }

    fn current_chunk(&self) -> &Chunk {
        unsafe { &(*self.current_compiler().function).chunk }
    }

    fn current_chunk_mut(&mut self) -> &mut Chunk {
        unsafe { &mut (*self.current_compiler_mut().function).chunk }
    }

    fn current_locals(&self) -> &Vec<Local<'a>> {
        &self.current_compiler().locals
    }

    fn current_locals_mut(&mut self) -> &mut Vec<Local<'a>> {
        &mut self.current_compiler_mut().locals
    }

    fn advance(&mut self) {
        self.previous = self.current.clone();
        loop {
            let scanner = self.scanner.as_mut().expect("scanner is not initialized");
            self.current = scanner.scan_token();
            if self.current.token_type != TokenType::Error {
                break;
            }

            self.error_at_current(self.current.value);
        }
    }

    fn match_token(&mut self, token_type: TokenType) -> bool {
        if !self.check(token_type) {
            return false;
        }

        self.advance();
        true
    }

    fn check(&self, token_type: TokenType) -> bool {
        self.current.token_type == token_type
    }

    fn consume(&mut self, token_type: TokenType, message: &str) {
        if self.current.token_type == token_type {
            self.advance();
            return;
        }

        self.error_at_current(message);
    }

    fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line;
        self.current_chunk_mut().write(byte, line);
    }

    fn emit_bytes(&mut self, byte1: u8, byte2: u8) {
        self.emit_byte(byte1);
        self.emit_byte(byte2);
    }

    // Indexed ops switch to the 3-byte little-endian form past one byte.
    fn emit_indexed_op(&mut self, short: OpCode, long: OpCode, index: usize) {
        if index <= u8::MAX as usize {
            self.emit_bytes(short.to_byte(), index as u8);
        } else {
            self.emit_byte(long.to_byte());
            self.emit_byte((index & 0xff) as u8);
            self.emit_byte(((index >> 8) & 0xff) as u8);
            self.emit_byte(((index >> 16) & 0xff) as u8);
        }
    }

    fn emit_constant(&mut self, value: Value) {
        let index = self.make_constant(value);
        self.emit_indexed_op(OpCode::Constant, OpCode::ConstantLong, index);
    }

    fn emit_return(&mut self) {
        if self.current_compiler().function_type == FunctionType::Initializer {
            // An initializer implicitly returns its receiver.
            self.emit_bytes(OpCode::GetLocal.to_byte(), 0);
        } else {
            self.emit_byte(OpCode::None.to_byte());
        }
        self.emit_byte(OpCode::Return.to_byte());
    }

    fn init_compiler(&mut self, function_type: FunctionType) {
        self.maybe_collect();
        let function = self.object_manager.alloc_function();

        // Stack slot zero belongs to the callee; inside methods it is the
        // receiver, resolvable as the local named 'this'.
        let slot_zero = if function_type == FunctionType::Method
            || function_type == FunctionType::Initializer
        {
            Token {
                token_type: TokenType::This,
                value: "this",
                line: 0,
            }
        } else {
            Token {
                token_type: TokenType::Eof,
                value: "",
                line: 0,
            }
        };

        let mut compiler = Compiler {
            function,
            function_type,
            locals: vec![],
            upvalues: vec![],
            scope_depth: 0,
        };
        compiler.locals.push(Local {
            name: slot_zero,
            depth: 0,
            is_captured: false,
        });
        self.compilers.push(compiler);

        // A function declaration reaches here right after its name token.
        if function_type != FunctionType::Script {
            let lexeme = self.previous.value;
            let name_value = self.allocate_string_value(lexeme);
            unsafe {
                (*function).name = as_string(&name_value);
            }
        }
    }

    fn end_compiler(&mut self) -> *mut ObjectFunction {
        self.emit_return();

        let function = self.current_compiler().function;
        unsafe {
            (*function).upvalue_count = self.current_compiler().upvalues.len();
        }
        debug_feature::disassemble_function(self);

        self.compilers.pop();
        function
    }

    fn make_constant(&mut self, value: Value) -> usize {
        if let Some(index) = self.current_chunk().find_constant(value) {
            return index;
        }

        let constant_index = self.current_chunk_mut().add_constant(value);
        if constant_index >= 1 << 24 {
            self.error("Too many constants in one chunk.");
            return 0;
        }
        constant_index
    }

    // For ops whose operand has no long form.
    fn make_constant_u8(&mut self, value: Value) -> u8 {
        let index = self.make_constant(value);
        if index > u8::MAX as usize {
            self.error("Too many constants in one chunk.");
            return 0;
        }
        index as u8
    }

    fn number(&mut self) {
        let value = self.previous.value.parse::<f64>().unwrap_or(0.0);
        self.emit_constant(make_number_value(value));
    }

    fn string(&mut self) {
        let lexeme = self.previous.value;
        // Trim the enclosing quotation marks.
        let value = self.allocate_string_value(&lexeme[1..lexeme.len() - 1]);
        self.emit_constant(value);
    }

    fn identifier_constant(&mut self, name: &str) -> usize {
        let value = self.allocate_string_value(name);
        self.make_constant(value)
    }

    fn identifier_constant_u8(&mut self, name: &str) -> u8 {
        let value = self.allocate_string_value(name);
        self.make_constant_u8(value)
    }

    fn declaration(&mut self) {
        if self.match_token(TokenType::Class) {
            self.class_declaration();
        } else if self.match_token(TokenType::Func) {
            self.function_declaration();
        } else if self.match_token(TokenType::Let) {
            self.variable_declaration();
        } else {
            self.statement();
        }

        if self.panic_mode {
            self.synchronize();
        }
    }

    fn variable_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");

        if self.match_token(TokenType::Equal) {
            self.expression();
        } else {
            self.emit_byte(OpCode::None.to_byte());
        }
        self.consume(
            TokenType::Semicolon,
            "Expect ';' after variable declaration.",
        );

        self.define_variable(global);
    }

    fn parse_variable(&mut self, message: &str) -> usize {
        self.consume(TokenType::Identifier, message);

        self.declare_variable();
        if self.current_compiler().scope_depth > 0 {
            return 0;
        }
        let name = self.previous.value;
        self.identifier_constant(name)
    }

    fn declare_variable(&mut self) {
        if self.current_compiler().scope_depth == 0 {
            // Globals are late bound; nothing to track at compile time.
            return;
        }

        let variable_name = self.previous.clone();
        let scope_depth = self.current_compiler().scope_depth;
        let mut duplicate = false;
        for local in self.current_locals().iter().rev() {
            if local.depth != -1 && local.depth < scope_depth {
                break;
            }

            if Self::identifier_equal(&variable_name, &local.name) {
                duplicate = true;
                break;
            }
        }
        if duplicate {
            self.error("Already a variable with this name in this scope.");
        }

        self.add_local(variable_name);
    }

    fn add_local(&mut self, variable_name: Token<'a>) {
        if self.current_locals().len() >= MAX_STACK_SIZE {
            self.error("Too many local variables in function.");
            return;
        }

        // Depth -1 marks the variable uninitialized until its initializer
        // has compiled; reading it before then is an error.
        self.current_locals_mut().push(Local {
            name: variable_name,
            depth: -1,
            is_captured: false,
        });
    }

    fn function_declaration(&mut self) {
        let global = self.parse_variable("Expect function name.");
        self.mark_initialized();
        self.function(FunctionType::Function);
        self.define_variable(global);
    }

    fn function(&mut self, function_type: FunctionType) {
        self.init_compiler(function_type);

        self.begin_scope();
        self.consume(TokenType::LeftParen, "Expect '(' after function name.");
        if !self.check(TokenType::RightParen) {
            loop {
                unsafe {
                    (*self.current_compiler().function).arity += 1;
                    if (*self.current_compiler().function).arity > 255 {
                        self.error_at_current("Can't have more than 255 parameters.");
                    }
                }
                let constant = self.parse_variable("Expect parameter name.");
                self.define_variable(constant);

                if !self.match_token(TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenType::RightParen, "Expect ')' after parameters.");
        self.consume(TokenType::LeftBrace, "Expect '{' before function body.");
        self.block();

        let upvalues = self.current_compiler().upvalues.clone();
        let function = self.end_compiler();
        let constant = self.make_constant_u8(make_object_value(function as *mut Object));
        self.emit_bytes(OpCode::Closure.to_byte(), constant);

        for upvalue in &upvalues {
            self.emit_byte(u8::from(upvalue.is_local));
            self.emit_byte(upvalue.index as u8);
        }
    }

    fn class_declaration(&mut self) {
        self.consume(TokenType::Identifier, "Expect class name.");
        let class_name = self.previous.clone();
        let name_constant = self.identifier_constant(class_name.value);
        self.declare_variable();
        self.emit_indexed_op(OpCode::Class, OpCode::ClassLong, name_constant);
        self.define_variable(name_constant);

        self.class_compilers.push(ClassCompiler {
            has_superclass: false,
        });

        if self.match_token(TokenType::Less) {
            self.consume(TokenType::Identifier, "Expect superclass name.");
            self.variable(false);
            if Self::identifier_equal(&class_name, &self.previous) {
                self.error("A class can't inherit from itself.");
            }

            // The superclass stays on the stack as a scoped 'super' local
            // for the methods compiled below.
            self.begin_scope();
            self.add_local(Token {
                token_type: TokenType::Super,
                value: "super",
                line: class_name.line,
            });
            self.define_variable(0);

            self.named_variable(class_name.clone(), false);
            self.emit_byte(OpCode::Inherit.to_byte());
            self.class_compilers
                .last_mut()
                .expect("no class compiler")
                .has_superclass = true;
        }

        self.named_variable(class_name, false);
        self.consume(TokenType::LeftBrace, "Expect '{' before class body.");
        while !self.check(TokenType::RightBrace) && !self.check(TokenType::Eof) {
            self.method();
        }
        self.consume(TokenType::RightBrace, "Expect '}' after class body.");
        self.emit_byte(OpCode::Pop.to_byte());

        if self
            .class_compilers
            .last()
            .expect("no class compiler")
            .has_superclass
        {
            self.end_scope();
        }
        self.class_compilers.pop();
    }

    fn method(&mut self) {
        self.consume(TokenType::Identifier, "Expect method name.");
        let name = self.previous.value;
        let constant = self.identifier_constant(name);
        let function_type = if name == "init" {
            FunctionType::Initializer
        } else {
            FunctionType::Method
        };
        self.function(function_type);
        self.emit_indexed_op(OpCode::Method, OpCode::MethodLong, constant);
    }

    fn argument_list(&mut self) -> u8 {
        let mut argument_count: usize = 0;
        if !self.check(TokenType::RightParen) {
            loop {
                self.expression();
                if argument_count >= 255 {
                    self.error("Can't have more than 255 arguments.");
                }
                argument_count += 1;

                if !self.match_token(TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenType::RightParen, "Expect ')' after arguments.");
        argument_count as u8
    }

    fn define_variable(&mut self, global: usize) {
        // scope_depth > 0 means a local variable
        if self.current_compiler().scope_depth > 0 {
            self.mark_initialized();
            return;
        }

        self.emit_indexed_op(OpCode::DefineGlobal, OpCode::DefineGlobalLong, global);
    }

    fn mark_initialized(&mut self) {
        let scope_depth = self.current_compiler().scope_depth;
        if scope_depth == 0 {
            return;
        }

        self.current_locals_mut()
            .last_mut()
            .expect("no local to initialize")
            .depth = scope_depth;
    }

    fn variable(&mut self, can_assign: bool) {
        self.named_variable(self.previous.clone(), can_assign)
    }

    fn named_variable(&mut self, name: Token<'a>, can_assign: bool) {
        let current_compiler_index = self.compilers.len() - 1;
        let local = self.resolve_local(current_compiler_index, &name);
        let (get_ops, set_ops, index) = if local != -1 {
            (
                (OpCode::GetLocal, OpCode::GetLocalLong),
                (OpCode::SetLocal, OpCode::SetLocalLong),
                local as usize,
            )
        } else {
            let upvalue = self.resolve_upvalue(current_compiler_index, &name);
            if upvalue != -1 {
                // Upvalue indexes always fit one byte.
                (
                    (OpCode::GetUpvalue, OpCode::GetUpvalue),
                    (OpCode::SetUpvalue, OpCode::SetUpvalue),
                    upvalue as usize,
                )
            } else {
                let constant = self.identifier_constant(name.value);
                (
                    (OpCode::GetGlobal, OpCode::GetGlobalLong),
                    (OpCode::SetGlobal, OpCode::SetGlobalLong),
                    constant,
                )
            }
        };

        if can_assign && self.match_token(TokenType::Equal) {
            self.expression();
            self.emit_indexed_op(set_ops.0, set_ops.1, index);
        } else {
            self.emit_indexed_op(get_ops.0, get_ops.1, index);
        }
    }

    fn resolve_local(&mut self, compiler_index: usize, name: &Token) -> i32 {
        let mut found = -1;
        let mut uninitialized = false;
        for (index, local) in self
            .specific_compiler(compiler_index)
            .locals
            .iter()
            .enumerate()
            .rev()
        {
            if Self::identifier_equal(name, &local.name) {
                found = index as i32;
                uninitialized = local.depth == -1;
                break;
            }
        }

        if uninitialized {
            self.error("Can't read local variable in its own initializer.");
        }
        found
    }

    fn identifier_equal(left: &Token, right: &Token) -> bool {
        left.token_type == right.token_type && left.value == right.value
    }

    fn resolve_upvalue(&mut self, compiler_index: usize, name: &Token) -> i32 {
        if compiler_index == 0 {
            return -1;
        }

        let local = self.resolve_local(compiler_index - 1, name);
        if local != -1 {
            self.specific_compiler_mut(compiler_index - 1).locals[local as usize].is_captured =
                true;
            return self.add_upvalue(compiler_index, local as usize, true);
        }

        let upvalue = self.resolve_upvalue(compiler_index - 1, name);
        if upvalue != -1 {
            return self.add_upvalue(compiler_index, upvalue as usize, false);
        }

        -1
    }

    fn add_upvalue(&mut self, compiler_index: usize, index: usize, is_local: bool) -> i32 {
        let existing = self
            .specific_compiler(compiler_index)
            .upvalues
            .iter()
            .position(|upvalue| upvalue.is_local == is_local && upvalue.index == index);
        if let Some(found) = existing {
            return found as i32;
        }

        if self.specific_compiler(compiler_index).upvalues.len() >= 256 {
            self.error("Too many closure variables in function.");
            return 0;
        }

        let compiler = self.specific_compiler_mut(compiler_index);
        compiler.upvalues.push(Upvalue { index, is_local });
        let count = compiler.upvalues.len();
        unsafe {
            (*compiler.function).upvalue_count = count;
        }
        (count - 1) as i32
    }

    fn and(&mut self) {
        let end_jump = self.emit_jump_bytes(OpCode::BranchIfFalse.to_byte());
        self.emit_byte(OpCode::Pop.to_byte());
        self.parse_precedence(Precedence::And);
        self.patch_jump_offset(end_jump);
    }

    fn or(&mut self) {
        let else_jump = self.emit_jump_bytes(OpCode::BranchIfFalse.to_byte());
        let end_jump = self.emit_jump_bytes(OpCode::Branch.to_byte());

        self.patch_jump_offset(else_jump);
        self.emit_byte(OpCode::Pop.to_byte());

        self.parse_precedence(Precedence::Or);
        self.patch_jump_offset(end_jump);
    }

    fn dot(&mut self, can_assign: bool) {
        self.consume(TokenType::Identifier, "Expect property name after '.'.");
        let name = self.previous.value;
        let constant = self.identifier_constant_u8(name);

        if can_assign && self.match_token(TokenType::Equal) {
            self.expression();
            self.emit_bytes(OpCode::SetProperty.to_byte(), constant);
        } else if self.match_token(TokenType::LeftParen) {
            let argument_count = self.argument_list();
            self.emit_bytes(OpCode::Invoke.to_byte(), constant);
            self.emit_byte(argument_count);
        } else {
            self.emit_bytes(OpCode::GetProperty.to_byte(), constant);
        }
    }

    fn this(&mut self) {
        if self.class_compilers.is_empty() {
            self.error("Can't use 'this' outside of a class.");
            return;
        }
        self.variable(false);
    }

    fn super_(&mut self) {
        if self.class_compilers.is_empty() {
            self.error("Can't use 'super' outside of a class.");
        } else if !self
            .class_compilers
            .last()
            .expect("no class compiler")
            .has_superclass
        {
            self.error("Can't use 'super' in a class with no superclass.");
        }

        self.consume(TokenType::Dot, "Expect '.' after 'super'.");
        self.consume(TokenType::Identifier, "Expect superclass method name.");
        let name = self.previous.value;
        let line = self.previous.line;
        let constant = self.identifier_constant(name);

        self.named_variable(
            Token {
                token_type: TokenType::This,
                value: "this",
                line,
            },
            false,
        );
        let super_token = Token {
            token_type: TokenType::Super,
            value: "super",
            line,
        };
        if self.match_token(TokenType::LeftParen) {
            let argument_count = self.argument_list();
            self.named_variable(super_token, false);
            self.emit_indexed_op(OpCode::SuperInvoke, OpCode::SuperInvokeLong, constant);
            self.emit_byte(argument_count);
        } else {
            self.named_variable(super_token, false);
            self.emit_indexed_op(OpCode::GetSuper, OpCode::GetSuperLong, constant);
        }
    }

    fn statement(&mut self) {
        if self.match_token(TokenType::If) {
            self.if_statement();
        } else if self.match_token(TokenType::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else if self.match_token(TokenType::While) {
            self.while_statement();
        } else if self.match_token(TokenType::For) {
            self.for_statement();
        } else if self.match_token(TokenType::Return) {
            self.return_statement();
        } else if self.match_token(TokenType::Print) {
            self.print_statement();
        } else {
            self.expression_statement();
        }
    }

    fn if_statement(&mut self) {
        self.consume(TokenType::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenType::RightParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump_bytes(OpCode::BranchIfFalse.to_byte());
        self.emit_byte(OpCode::Pop.to_byte()); // pop the condition result
        self.statement();

        let else_jump = self.emit_jump_bytes(OpCode::Branch.to_byte());
        self.patch_jump_offset(then_jump);
        self.emit_byte(OpCode::Pop.to_byte()); // same pop on the else path

        if self.match_token(TokenType::Else) {
            self.statement();
        }
        self.patch_jump_offset(else_jump);
    }

    fn emit_jump_bytes(&mut self, instruction: u8) -> usize {
        self.emit_byte(instruction);
        // Two placeholder bytes for the forward offset.
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.current_chunk().len() - 2
    }

    fn patch_jump_offset(&mut self, offset: usize) {
        // -2 to adjust for the offset operand itself.
        let jump_offset = self.current_chunk().len() - offset - 2;
        if jump_offset > u16::MAX as usize {
            self.error("Too much code to jump over.");
        }

        let jump_offset = jump_offset as u16;
        let current_chunk = self.current_chunk_mut();
        current_chunk.write_by_offset(offset, ((jump_offset >> 8) & 0xff) as u8);
        current_chunk.write_by_offset(offset + 1, (jump_offset & 0xff) as u8);
    }

    fn begin_scope(&mut self) {
        self.current_compiler_mut().scope_depth += 1
    }

    fn end_scope(&mut self) {
        self.current_compiler_mut().scope_depth -= 1;
        let scope_depth = self.current_compiler().scope_depth;
        loop {
            let captured = match self.current_locals().last() {
                Some(local) if local.depth > scope_depth => local.is_captured,
                _ => break,
            };

            // Captured locals move to the heap instead of being dropped.
            if captured {
                self.emit_byte(OpCode::CloseUpvalue.to_byte());
            } else {
                self.emit_byte(OpCode::Pop.to_byte());
            }
            self.current_locals_mut().pop();
        }
    }

    fn block(&mut self) {
        while !self.check(TokenType::RightBrace) && !self.check(TokenType::Eof) {
            self.declaration();
        }

        self.consume(TokenType::RightBrace, "Expect '}' after block.");
    }

    fn return_statement(&mut self) {
        if self.current_compiler().function_type == FunctionType::Script {
            self.error("Can't return from top-level code.");
        }

        if self.match_token(TokenType::Semicolon) {
            self.emit_return();
        } else {
            if self.current_compiler().function_type == FunctionType::Initializer {
                self.error("Can't return a value from an initializer.");
            }
            self.expression();
            self.consume(TokenType::Semicolon, "Expect ';' after return value.");
            self.emit_byte(OpCode::Return.to_byte());
        }
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenType::Semicolon, "Expect ';' after value.");
        self.emit_byte(OpCode::Print.to_byte());
    }

    fn while_statement(&mut self) {
        let loop_start = self.current_chunk().len();

        self.consume(TokenType::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenType::RightParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump_bytes(OpCode::BranchIfFalse.to_byte());
        self.emit_byte(OpCode::Pop.to_byte());

        self.statement();
        self.emit_loop(loop_start); // back to the condition expression

        self.patch_jump_offset(exit_jump);
        self.emit_byte(OpCode::Pop.to_byte());
    }

    fn emit_loop(&mut self, loop_start: usize) {
        self.emit_byte(OpCode::Loop.to_byte());

        // +2 to skip over the Loop operand itself.
        let offset = self.current_chunk().len() - loop_start + 2;
        if offset > u16::MAX as usize {
            self.error("Loop body too large.");
        }

        self.emit_byte(((offset >> 8) & 0xff) as u8);
        self.emit_byte((offset & 0xff) as u8);
    }

    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenType::LeftParen, "Expect '(' after 'for'.");
        if self.match_token(TokenType::Semicolon) {
            // no initializer
        } else if self.match_token(TokenType::Let) {
            self.variable_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.current_chunk().len();
        let mut exit_jump: i64 = -1;
        if !self.match_token(TokenType::Semicolon) {
            self.expression();
            self.consume(TokenType::Semicolon, "Expect ';' after loop condition.");

            // Jump out of the loop if the condition is false.
            exit_jump = self.emit_jump_bytes(OpCode::BranchIfFalse.to_byte()) as i64;
            self.emit_byte(OpCode::Pop.to_byte());
        }

        if !self.match_token(TokenType::RightParen) {
            // The increment clause runs after the body, so thread the body
            // in front of it with a pair of jumps.
            let body_jump = self.emit_jump_bytes(OpCode::Branch.to_byte());
            let increment_start = self.current_chunk().len();
            self.expression();
            self.emit_byte(OpCode::Pop.to_byte());
            self.consume(TokenType::RightParen, "Expect ')' after for clauses.");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump_offset(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);

        if exit_jump != -1 {
            self.patch_jump_offset(exit_jump as usize);
            self.emit_byte(OpCode::Pop.to_byte());
        }
        self.end_scope();
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenType::Semicolon, "Expect ';' after expression.");
        self.emit_byte(OpCode::Pop.to_byte());
    }

    fn grouping(&mut self) {
        self.expression();
        self.consume(TokenType::RightParen, "Expect ')' after expression.");
    }

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn unary(&mut self) {
        let operator_type = self.previous.token_type;

        self.parse_precedence(Precedence::Unary);

        match operator_type {
            TokenType::Bang => self.emit_byte(OpCode::Not.to_byte()),
            TokenType::Minus => self.emit_byte(OpCode::Negate.to_byte()),
            _ => unreachable!("Expect unary operator."),
        }
    }

    fn binary(&mut self) {
        let operator_type = self.previous.token_type;
        let rule = &RULES[operator_type as usize];
        self.parse_precedence((rule.precedence as u8 + 1).into());

        match operator_type {
            TokenType::BangEqual => {
                self.emit_bytes(OpCode::Equal.to_byte(), OpCode::Not.to_byte())
            }
            TokenType::EqualEqual => self.emit_byte(OpCode::Equal.to_byte()),
            TokenType::Greater => self.emit_byte(OpCode::GreaterThan.to_byte()),
            TokenType::GreaterEqual => {
                self.emit_bytes(OpCode::LessThan.to_byte(), OpCode::Not.to_byte())
            }
            TokenType::Less => self.emit_byte(OpCode::LessThan.to_byte()),
            TokenType::LessEqual => {
                self.emit_bytes(OpCode::GreaterThan.to_byte(), OpCode::Not.to_byte())
            }
            TokenType::Plus => self.emit_byte(OpCode::Add.to_byte()),
            TokenType::Minus => self.emit_byte(OpCode::Sub.to_byte()),
            TokenType::Star => self.emit_byte(OpCode::Mul.to_byte()),
            TokenType::Slash => self.emit_byte(OpCode::Div.to_byte()),
            _ => unreachable!("Unexpected binary operator: {}", operator_type),
        }
    }

    fn literal(&mut self) {
        let operator_type = self.previous.token_type;
        match operator_type {
            TokenType::False => self.emit_byte(OpCode::False.to_byte()),
            TokenType::True => self.emit_byte(OpCode::True.to_byte()),
            TokenType::None => self.emit_byte(OpCode::None.to_byte()),
            _ => unreachable!("Unexpected literal operator: {}", operator_type),
        }
    }

    fn call(&mut self, _can_assign: bool) {
        let argument_count = self.argument_list();
        self.emit_bytes(OpCode::Call.to_byte(), argument_count);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();

        let can_assign = precedence <= Precedence::Assignment;
        if let Some(prefix) = &RULES[self.previous.token_type as usize].prefix {
            prefix(self, can_assign);
        } else {
            self.error("Expect expression.");
            return;
        }

        while precedence as u8 <= RULES[self.current.token_type as usize].precedence as u8 {
            self.advance();
            if let Some(infix) = &RULES[self.previous.token_type as usize].infix {
                infix(self, can_assign);
            }
        }

        if can_assign && self.match_token(TokenType::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.token_type != TokenType::Eof {
            if self.previous.token_type == TokenType::Semicolon {
                return;
            }

            match self.current.token_type {
                TokenType::Class
                | TokenType::Func
                | TokenType::Let
                | TokenType::For
                | TokenType::If
                | TokenType::While
                | TokenType::Print
                | TokenType::Return => return,
                _ => (),
            }

            self.advance()
        }
    }

    fn error(&mut self, message: &str) {
        self.error_at(&self.previous.clone(), message);
    }

    fn error_at_current(&mut self, message: &str) {
        self.error_at(&self.current.clone(), message);
    }

    fn error_at(&mut self, token: &Token, message: &str) {
        if self.panic_mode {
            return;
        }

        self.panic_mode = true;
        eprint!("[line {}] Error", token.line);

        match token.token_type {
            TokenType::Eof => eprint!(" at end"),
            TokenType::Error => {}
            _ => eprint!(" at '{}'", token.value),
        };

        eprintln!(": {}", message);
        self.has_error = true;
    }
}

#[cfg(feature = "debug_print_code")]
mod debug_feature {
    use super::*;
    use crate::debug;

    pub fn disassemble_function(parser: &Parser) {
        if parser.has_error {
            return;
        }
        let function = parser.current_compiler().function;
        unsafe {
            let name = if (*function).name.is_null() {
                "<script>".to_string()
            } else {
                (*(*function).name).content.clone()
            };
            debug::disassemble_chunk(&(*function).chunk, &name);
        }
    }
}

#[cfg(not(feature = "debug_print_code"))]
mod debug_feature {
    use super::*;

    pub fn disassemble_function(_parser: &Parser) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{ValueType, ValueUnion};

    fn compile_source(source: &str) -> (ObjectManager, Table, Option<*mut ObjectFunction>) {
        let mut object_manager = ObjectManager::new();
        let mut intern_strings = Table::new();
        let globals = Table::new();
        let function = {
            let mut parser = Parser::new(
                &mut object_manager,
                &mut intern_strings,
                &globals,
                std::ptr::null_mut(),
            );
            parser.compile(source)
        };
        (object_manager, intern_strings, function)
    }

    #[test]
    fn test_compile_expression_statement() {
        let (_manager, _interns, result) = compile_source("!(5 - 4 > 3 * 2 == !none);");
        let function = result.expect("compilation should succeed");
        let chunk = unsafe { &(*function).chunk };

        assert_eq!(
            *chunk.get_constant(0),
            Value {
                value_type: ValueType::ValueNumber,
                value_as: ValueUnion { number: 5.0 }
            }
        );
        assert_eq!(
            *chunk.get_constant(1),
            Value {
                value_type: ValueType::ValueNumber,
                value_as: ValueUnion { number: 4.0 }
            }
        );

        let expected = [
            OpCode::Constant.to_byte(),
            0,
            OpCode::Constant.to_byte(),
            1,
            OpCode::Sub.to_byte(),
            OpCode::Constant.to_byte(),
            2,
            OpCode::Constant.to_byte(),
            3,
            OpCode::Mul.to_byte(),
            OpCode::GreaterThan.to_byte(),
            OpCode::None.to_byte(),
            OpCode::Not.to_byte(),
            OpCode::Equal.to_byte(),
            OpCode::Not.to_byte(),
            OpCode::Pop.to_byte(),
            OpCode::None.to_byte(),
            OpCode::Return.to_byte(),
        ];
        for (offset, byte) in expected.iter().enumerate() {
            assert_eq!(chunk.read_from_offset(offset), Some(*byte));
        }
        assert_eq!(chunk.len(), expected.len());
    }

    #[test]
    fn test_intern_strings_across_compiles() {
        let mut object_manager = ObjectManager::new();
        let mut intern_strings = Table::new();
        let globals = Table::new();

        for _ in 0..2 {
            let mut parser = Parser::new(
                &mut object_manager,
                &mut intern_strings,
                &globals,
                std::ptr::null_mut(),
            );
            assert!(parser.compile("\"this is a test string\";").is_some());
        }

        assert_eq!(intern_strings.len(), 1);
    }

    #[test]
    fn test_function_declaration() {
        let (_manager, _interns, result) = compile_source(
            "func areWeHavingItYet() {
                print \"Yes we are!\";
            }
            print areWeHavingItYet;",
        );
        assert!(result.is_some());
    }

    #[test]
    fn test_function_with_arguments() {
        let (_manager, _interns, result) = compile_source(
            "func sum(a, b, c) {
                return a + b + c;
            }
            print 4 + sum(5, 6, 7);",
        );
        assert!(result.is_some());
    }

    #[test]
    fn test_closure_captures_compile() {
        let (_manager, _interns, result) = compile_source(
            "func make() {
                let x = 0;
                func inc() {
                    x = x + 1;
                    return x;
                }
                return inc;
            }",
        );
        let function = result.expect("compilation should succeed");
        // The outer function is the only constant-pool function of the
        // script chunk; its nested closure captured exactly one variable.
        let chunk = unsafe { &(*function).chunk };
        let outer = chunk
            .iter_constants()
            .find_map(|constant| {
                if crate::value::is_obj_type(
                    constant,
                    crate::objects::object::ObjectType::ObjFunction,
                ) {
                    Some(crate::value::as_function(constant))
                } else {
                    None
                }
            })
            .expect("outer function constant");
        let inner = unsafe {
            (*outer)
                .chunk
                .iter_constants()
                .find_map(|constant| {
                    if crate::value::is_obj_type(
                        constant,
                        crate::objects::object::ObjectType::ObjFunction,
                    ) {
                        Some(crate::value::as_function(constant))
                    } else {
                        None
                    }
                })
                .expect("inner function constant")
        };
        assert_eq!(unsafe { (*inner).upvalue_count }, 1);
    }

    #[test]
    fn test_class_declaration_compiles() {
        let (_manager, _interns, result) = compile_source(
            "class Greeter {
                init(name) {
                    this.name = name;
                }
                greet() {
                    return \"hi \" + this.name;
                }
            }
            class Loud < Greeter {
                greet() {
                    return super.greet() + \"!\";
                }
            }",
        );
        assert!(result.is_some());
    }

    #[test]
    fn test_own_initializer_read_is_an_error() {
        let (_manager, _interns, result) = compile_source("{ let a = 1; { let a = a; } }");
        assert!(result.is_none());
    }

    #[test]
    fn test_duplicate_declaration_is_an_error() {
        let (_manager, _interns, result) = compile_source("{ let a = 1; let a = 2; }");
        assert!(result.is_none());
    }

    #[test]
    fn test_invalid_assignment_target() {
        let (_manager, _interns, result) = compile_source("1 = 2;");
        assert!(result.is_none());
        let (_manager, _interns, result) = compile_source("a + b = 3;");
        assert!(result.is_none());
    }

    #[test]
    fn test_top_level_return_is_an_error() {
        let (_manager, _interns, result) = compile_source("return 1;");
        assert!(result.is_none());
    }

    #[test]
    fn test_this_and_super_outside_class_are_errors() {
        let (_manager, _interns, result) = compile_source("print this;");
        assert!(result.is_none());
        let (_manager, _interns, result) = compile_source("print super.m;");
        assert!(result.is_none());
    }

    #[test]
    fn test_initializer_cannot_return_a_value() {
        let (_manager, _interns, result) =
            compile_source("class A { init() { return 1; } }");
        assert!(result.is_none());
    }

    #[test]
    fn test_self_inheritance_is_an_error() {
        let (_manager, _interns, result) = compile_source("class A < A {}");
        assert!(result.is_none());
    }

    #[test]
    fn test_long_constant_form_past_256_constants() {
        let mut source = String::from("print 0");
        for value in 1..300 {
            source.push_str(&format!(" + {}", value));
        }
        source.push(';');

        let (_manager, _interns, result) = compile_source(&source);
        let function = result.expect("compilation should succeed");
        let chunk = unsafe { &(*function).chunk };
        assert!(chunk.constant_count() >= 300);

        // Walk whole instructions so operand bytes cannot be mistaken for
        // opcodes; the walk must land exactly on the end of the chunk.
        let mut offset = 0;
        let mut found_long = false;
        while offset < chunk.len() {
            if chunk.read_from_offset(offset) == Some(OpCode::ConstantLong.to_byte()) {
                found_long = true;
            }
            offset = crate::debug::disassemble_instruction(chunk, offset);
        }
        assert_eq!(offset, chunk.len());
        assert!(found_long);
    }

    #[test]
    fn test_branch_targets_stay_inside_the_chunk() {
        let (_manager, _interns, result) = compile_source(
            "let i = 0;
             while (i < 5) {
                 if (i == 2) { print i; } else { print 0; }
                 i = i + 1;
             }
             for (let j = 0; j < 3; j = j + 1) {
                 print j and true or false;
             }",
        );
        let function = result.expect("compilation should succeed");
        let chunk = unsafe { &(*function).chunk };

        let mut offset = 0;
        while offset < chunk.len() {
            let byte = chunk.read_from_offset(offset).expect("in-bounds read");
            let op = OpCode::from_byte(byte).expect("undecodable opcode");
            let next = crate::debug::disassemble_instruction(chunk, offset);
            let operand = || {
                let high = chunk.read_from_offset(offset + 1).unwrap() as usize;
                let low = chunk.read_from_offset(offset + 2).unwrap() as usize;
                (high << 8) | low
            };
            match op {
                OpCode::Branch | OpCode::BranchIfFalse => {
                    assert!(offset + 3 + operand() <= chunk.len());
                }
                OpCode::Loop => {
                    // A backward jump may not escape the front of the chunk.
                    assert!(operand() <= offset + 3);
                }
                _ => {}
            }
            offset = next;
        }
        assert_eq!(offset, chunk.len());
    }

    #[test]
    fn test_compilation_is_idempotent() {
        let source = "let a = 1; { let b = a + 2; print b; } if (a < 3) { print a; }";
        let (_m1, _i1, first) = compile_source(source);
        let (_m2, _i2, second) = compile_source(source);
        let first = first.expect("first compile");
        let second = second.expect("second compile");
        unsafe {
            assert_eq!((*first).chunk.code, (*second).chunk.code);
        }
    }
}
