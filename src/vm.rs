use crate::call_frame::CallFrame;
use crate::chunk::OpCode;
use crate::compiler::Parser;
use crate::constants::{FRAMES_MAX, MAX_STACK_SIZE};
use crate::gc::GarbageCollector;
use crate::objects::object::{NativeObject, Object, ObjectType};
use crate::objects::object_class::ObjectClass;
use crate::objects::object_closure::ObjectClosure;
use crate::objects::object_manager::ObjectManager;
use crate::objects::object_string::ObjectString;
use crate::objects::object_upvalue::ObjectUpvalue;
use crate::std_mod::time::ClockTime;
use crate::table::Table;
use crate::value::{
    as_bool, as_bound_method, as_class, as_closure, as_function, as_instance, as_native_function,
    as_number, as_object, as_string, is_bool, is_class, is_instance, is_none, is_number, is_object,
    is_string, make_bool_value, make_none_value, make_number_value, make_object_value,
    make_string_value, print_value, Value,
};

const NO_FRAME: &str = "no active call frame";

pub struct VM {
    stack: Box<[Value]>,
    stack_top_pos: usize,
    frames: Vec<CallFrame>,
    globals: Table,
    intern_strings: Table,
    object_manager: ObjectManager,
    open_upvalues: *mut ObjectUpvalue,
    gc: GarbageCollector,
    init_str: *mut ObjectString,
}

#[derive(Debug, PartialEq, Eq)]
pub enum InterpretResult {
    Ok,
    CompileError,
    RuntimeError,
}

impl VM {
    pub fn new() -> Box<VM> {
        let mut vm = Box::new(VM {
            stack: vec![make_none_value(); MAX_STACK_SIZE].into_boxed_slice(),
            stack_top_pos: 0,
            frames: Vec::with_capacity(FRAMES_MAX),
            globals: Table::new(),
            intern_strings: Table::new(),
            object_manager: ObjectManager::new(),
            open_upvalues: std::ptr::null_mut(),
            gc: GarbageCollector::new(),
            init_str: std::ptr::null_mut(),
        });

        let init_value = make_string_value(&mut vm.object_manager, &mut vm.intern_strings, "init");
        vm.init_str = as_string(&init_value);

        vm.define_native("clock", 0, ClockTime::new());
        vm
    }

    pub fn interpret(&mut self, source: &str) -> InterpretResult {
        let init_str = self.init_str;
        let function = {
            let mut parser = Parser::new(
                &mut self.object_manager,
                &mut self.intern_strings,
                &self.globals,
                init_str,
            );
            match parser.compile(source) {
                Some(function) => function,
                None => return InterpretResult::CompileError,
            }
        };

        self.push(make_object_value(function as *mut Object));
        self.maybe_collect();
        let closure = self.object_manager.alloc_closure(function);
        self.pop();
        self.push(make_object_value(closure as *mut Object));

        if let Err(message) = self.call(closure, 0) {
            self.throw_runtime_error(&message);
            return InterpretResult::RuntimeError;
        }

        match self.run() {
            Ok(()) => InterpretResult::Ok,
            Err(message) => {
                self.throw_runtime_error(&message);
                InterpretResult::RuntimeError
            }
        }
    }

    /// Registers a host function under `name` in the globals table. Both the
    /// name and the native object ride the stack until the table owns
    /// references to them, so an allocation-triggered collection cannot
    /// reclaim either half-way through.
    pub fn define_native(&mut self, name: &str, arity: u8, native: impl NativeObject + 'static) {
        self.maybe_collect();
        let name_value = make_string_value(&mut self.object_manager, &mut self.intern_strings, name);
        self.push(name_value);
        self.maybe_collect();
        let native_ptr =
            self.object_manager
                .alloc_native_function(name.to_string(), arity, native);
        self.push(make_object_value(native_ptr as *mut Object));

        let key = as_string(&self.peek_steps(1));
        let value = self.peek_steps(0);
        self.globals.insert(key, value);
        self.pop();
        self.pop();
    }

    fn push(&mut self, value: Value) {
        if self.stack_top_pos < MAX_STACK_SIZE {
            self.stack[self.stack_top_pos] = value;
            self.stack_top_pos += 1;
        } else {
            panic!("Stack overflow");
        }
    }

    fn pop(&mut self) -> Value {
        if self.stack_top_pos > 0 {
            self.stack_top_pos -= 1;
            self.stack[self.stack_top_pos]
        } else {
            panic!("Stack underflow");
        }
    }

    fn peek_steps(&self, distance: usize) -> Value {
        self.stack[self.stack_top_pos - distance - 1]
    }

    fn is_falsey(value: &Value) -> bool {
        is_none(value) || (is_bool(value) && !as_bool(value))
    }

    fn reset_stack(&mut self) {
        self.stack_top_pos = 0;
        self.frames.clear();
        self.open_upvalues = std::ptr::null_mut();
    }

    fn throw_runtime_error(&mut self, message: &str) {
        eprintln!("{}", message);

        // Stack trace, innermost frame first.
        for frame in self.frames.iter().rev() {
            unsafe {
                let function = (*frame.closure()).function;
                let instruction = frame.ip().saturating_sub(1);
                let line = (*function).chunk.get_line(instruction);
                if (*function).name.is_null() {
                    eprintln!("[line {}] in script", line);
                } else {
                    eprintln!("[line {}] in {}()", line, (*(*function).name).content);
                }
            }
        }

        self.reset_stack();
    }

    fn collect_garbage(&mut self) {
        let before = self.object_manager.bytes_allocated();

        for index in 0..self.stack_top_pos {
            let value = self.stack[index];
            self.gc.mark_value(&value);
        }
        for index in 0..self.frames.len() {
            let closure = self.frames[index].closure();
            self.gc.mark_object(closure as *mut Object);
        }
        let mut upvalue = self.open_upvalues;
        while !upvalue.is_null() {
            self.gc.mark_object(upvalue as *mut Object);
            upvalue = unsafe { (*upvalue).next };
        }
        self.gc.mark_table(&self.globals);
        self.gc.mark_object(self.init_str as *mut Object);

        self.gc.trace_references();
        self.intern_strings.remove_white();
        let freed = self.gc.sweep(&mut self.object_manager);
        let next_trigger = self.object_manager.update_next_gc();
        let after = self.object_manager.bytes_allocated();
        self.gc.record_cycle(before, freed, after, next_trigger);
    }

    fn maybe_collect(&mut self) {
        if self.object_manager.should_collect() {
            self.collect_garbage();
        }
    }

    fn read_byte(&mut self) -> u8 {
        let frame = self.frames.last_mut().expect(NO_FRAME);
        let closure = frame.closure();
        let ip = *frame.ip_mut();
        *frame.ip_mut() = ip + 1;
        unsafe { (&(*(*closure).function).chunk.code)[ip] }
    }

    // Branch operands are big-endian 16-bit.
    fn read_short(&mut self) -> u16 {
        let high = self.read_byte() as u16;
        let low = self.read_byte() as u16;
        (high << 8) | low
    }

    // Long constant/slot operands are little-endian 24-bit.
    fn read_long(&mut self) -> usize {
        let b0 = self.read_byte() as usize;
        let b1 = self.read_byte() as usize;
        let b2 = self.read_byte() as usize;
        b0 | (b1 << 8) | (b2 << 16)
    }

    fn constant_at(&self, index: usize) -> Value {
        let closure = self.frames.last().expect(NO_FRAME).closure();
        unsafe { *(*(*closure).function).chunk.get_constant(index) }
    }

    fn read_constant(&mut self) -> Value {
        let index = self.read_byte() as usize;
        self.constant_at(index)
    }

    fn read_constant_long(&mut self) -> Value {
        let index = self.read_long();
        self.constant_at(index)
    }

    fn read_string(&mut self) -> *mut ObjectString {
        as_string(&self.read_constant())
    }

    fn read_string_long(&mut self) -> *mut ObjectString {
        as_string(&self.read_constant_long())
    }

    fn run(&mut self) -> Result<(), String> {
        loop {
            debug_feature::trace_instruction(self);

            let instruction = self.read_byte();
            let op = match OpCode::from_byte(instruction) {
                Some(op) => op,
                None => return Err(format!("Unknown opcode {}", instruction)),
            };

            match op {
                OpCode::Constant => {
                    let constant = self.read_constant();
                    self.push(constant);
                }
                OpCode::ConstantLong => {
                    let constant = self.read_constant_long();
                    self.push(constant);
                }
                OpCode::None => {
                    self.push(make_none_value());
                }
                OpCode::True => {
                    self.push(make_bool_value(true));
                }
                OpCode::False => {
                    self.push(make_bool_value(false));
                }
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::GetLocal => {
                    let index = self.read_byte() as usize;
                    let base = self.frames.last().expect(NO_FRAME).slots();
                    let value = self.stack[base + index];
                    self.push(value);
                }
                OpCode::GetLocalLong => {
                    let index = self.read_long();
                    let base = self.frames.last().expect(NO_FRAME).slots();
                    let value = self.stack[base + index];
                    self.push(value);
                }
                OpCode::SetLocal => {
                    let index = self.read_byte() as usize;
                    let base = self.frames.last().expect(NO_FRAME).slots();
                    let value = self.peek_steps(0);
                    self.stack[base + index] = value;
                }
                OpCode::SetLocalLong => {
                    let index = self.read_long();
                    let base = self.frames.last().expect(NO_FRAME).slots();
                    let value = self.peek_steps(0);
                    self.stack[base + index] = value;
                }
                OpCode::GetGlobal => {
                    let name = self.read_string();
                    self.get_global(name)?;
                }
                OpCode::GetGlobalLong => {
                    let name = self.read_string_long();
                    self.get_global(name)?;
                }
                OpCode::DefineGlobal => {
                    let name = self.read_string();
                    let value = self.peek_steps(0);
                    self.globals.insert(name, value);
                    self.pop();
                }
                OpCode::DefineGlobalLong => {
                    let name = self.read_string_long();
                    let value = self.peek_steps(0);
                    self.globals.insert(name, value);
                    self.pop();
                }
                OpCode::SetGlobal => {
                    let name = self.read_string();
                    self.set_global(name)?;
                }
                OpCode::SetGlobalLong => {
                    let name = self.read_string_long();
                    self.set_global(name)?;
                }
                OpCode::GetUpvalue => {
                    let index = self.read_byte() as usize;
                    let closure = self.frames.last().expect(NO_FRAME).closure();
                    let value = unsafe { *(*(&(*closure).upvalues)[index]).location };
                    self.push(value);
                }
                OpCode::SetUpvalue => {
                    let index = self.read_byte() as usize;
                    let value = self.peek_steps(0);
                    let closure = self.frames.last().expect(NO_FRAME).closure();
                    unsafe {
                        *(*(&mut (*closure).upvalues)[index]).location = value;
                    }
                }
                OpCode::CloseUpvalue => {
                    let last = unsafe { self.stack.as_mut_ptr().add(self.stack_top_pos - 1) };
                    self.close_upvalues(last);
                    self.pop();
                }
                OpCode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(make_bool_value(a == b));
                }
                OpCode::GreaterThan => {
                    self.binary_op(OpCode::GreaterThan)?;
                }
                OpCode::LessThan => {
                    self.binary_op(OpCode::LessThan)?;
                }
                OpCode::Add => {
                    let b = self.peek_steps(0);
                    let a = self.peek_steps(1);
                    if is_string(&a) && is_string(&b) {
                        self.concatenate();
                    } else if is_number(&a) && is_number(&b) {
                        self.binary_op(OpCode::Add)?;
                    } else {
                        return Err(
                            "Operands are not both strings or both numbers".to_string()
                        );
                    }
                }
                OpCode::Sub => {
                    self.binary_op(OpCode::Sub)?;
                }
                OpCode::Mul => {
                    self.binary_op(OpCode::Mul)?;
                }
                OpCode::Div => {
                    self.binary_op(OpCode::Div)?;
                }
                OpCode::Not => {
                    let value = self.pop();
                    self.push(make_bool_value(Self::is_falsey(&value)));
                }
                OpCode::Negate => {
                    if !is_number(&self.peek_steps(0)) {
                        return Err("Operand is not a number".to_string());
                    }
                    let value = self.pop();
                    self.push(make_number_value(-as_number(&value)));
                }
                OpCode::Print => {
                    let value = self.pop();
                    print_value(&value);
                    println!();
                }
                OpCode::Branch => {
                    let offset = self.read_short() as usize;
                    let frame = self.frames.last_mut().expect(NO_FRAME);
                    *frame.ip_mut() += offset;
                }
                OpCode::BranchIfFalse => {
                    let offset = self.read_short() as usize;
                    if Self::is_falsey(&self.peek_steps(0)) {
                        let frame = self.frames.last_mut().expect(NO_FRAME);
                        *frame.ip_mut() += offset;
                    }
                }
                OpCode::Loop => {
                    let offset = self.read_short() as usize;
                    let frame = self.frames.last_mut().expect(NO_FRAME);
                    *frame.ip_mut() -= offset;
                }
                OpCode::Call => {
                    let arg_cnt = self.read_byte() as usize;
                    let callee = self.peek_steps(arg_cnt);
                    self.call_value(callee, arg_cnt)?;
                }
                OpCode::Closure => {
                    let function = as_function(&self.read_constant());
                    self.maybe_collect();
                    let closure = self.object_manager.alloc_closure(function);
                    self.push(make_object_value(closure as *mut Object));

                    let upvalue_count = unsafe { (*function).upvalue_count };
                    for index in 0..upvalue_count {
                        let is_local = self.read_byte() != 0;
                        let slot = self.read_byte() as usize;
                        if is_local {
                            let base = self.frames.last().expect(NO_FRAME).slots();
                            let location =
                                unsafe { self.stack.as_mut_ptr().add(base + slot) };
                            let upvalue = self.capture_upvalue(location);
                            unsafe {
                                (&mut (*closure).upvalues)[index] = upvalue;
                            }
                        } else {
                            let enclosing = self.frames.last().expect(NO_FRAME).closure();
                            unsafe {
                                (&mut (*closure).upvalues)[index] = (&(*enclosing).upvalues)[slot];
                            }
                        }
                    }
                }
                OpCode::Class => {
                    let name = self.read_string();
                    self.maybe_collect();
                    let class = self.object_manager.alloc_class(name);
                    self.push(make_object_value(class as *mut Object));
                }
                OpCode::ClassLong => {
                    let name = self.read_string_long();
                    self.maybe_collect();
                    let class = self.object_manager.alloc_class(name);
                    self.push(make_object_value(class as *mut Object));
                }
                OpCode::GetProperty => {
                    if !is_instance(&self.peek_steps(0)) {
                        return Err("Only instances of a class have fields".to_string());
                    }
                    let name = self.read_string();
                    let instance = as_instance(&self.peek_steps(0));
                    let field = unsafe { (*instance).fields.get(name) };
                    match field {
                        Some(value) => {
                            self.pop();
                            self.push(value);
                        }
                        None => {
                            let class = unsafe { (*instance).class };
                            self.bind_method(class, name)?;
                        }
                    }
                }
                OpCode::SetProperty => {
                    if !is_instance(&self.peek_steps(1)) {
                        return Err("Only instances can have fields".to_string());
                    }
                    let name = self.read_string();
                    let instance = as_instance(&self.peek_steps(1));
                    unsafe {
                        (*instance).fields.insert(name, self.peek_steps(0));
                    }

                    // The assigned value is the expression result.
                    let value = self.pop();
                    self.pop();
                    self.push(value);
                }
                OpCode::Method => {
                    let name = self.read_string();
                    self.define_method(name);
                }
                OpCode::MethodLong => {
                    let name = self.read_string_long();
                    self.define_method(name);
                }
                OpCode::Invoke => {
                    let name = self.read_string();
                    let arg_cnt = self.read_byte() as usize;
                    self.invoke(name, arg_cnt)?;
                }
                OpCode::Inherit => {
                    let superclass = self.peek_steps(1);
                    if !is_class(&superclass) {
                        return Err(
                            "You tried to inherit from something that wasn't a class :("
                                .to_string(),
                        );
                    }
                    let subclass = as_class(&self.peek_steps(0));
                    unsafe {
                        (*as_class(&superclass))
                            .methods
                            .add_all(&mut (*subclass).methods);
                    }
                    self.pop(); // the subclass
                }
                OpCode::GetSuper => {
                    let name = self.read_string();
                    let superclass = as_class(&self.pop());
                    self.bind_method(superclass, name)?;
                }
                OpCode::GetSuperLong => {
                    let name = self.read_string_long();
                    let superclass = as_class(&self.pop());
                    self.bind_method(superclass, name)?;
                }
                OpCode::SuperInvoke => {
                    let name = self.read_string();
                    let arg_cnt = self.read_byte() as usize;
                    let superclass = as_class(&self.pop());
                    self.invoke_from_class(superclass, name, arg_cnt)?;
                }
                OpCode::SuperInvokeLong => {
                    let name = self.read_string_long();
                    let arg_cnt = self.read_byte() as usize;
                    let superclass = as_class(&self.pop());
                    self.invoke_from_class(superclass, name, arg_cnt)?;
                }
                OpCode::Return => {
                    let result = self.pop();
                    let frame = self.frames.pop().expect(NO_FRAME);
                    let base = frame.slots();
                    let last = unsafe { self.stack.as_mut_ptr().add(base) };
                    self.close_upvalues(last);

                    if self.frames.is_empty() {
                        // Pop the top-level script closure.
                        self.pop();
                        return Ok(());
                    }

                    self.stack_top_pos = base;
                    self.push(result);
                }
            }
        }
    }

    fn get_global(&mut self, name: *mut ObjectString) -> Result<(), String> {
        match self.globals.get(name) {
            Some(value) => {
                self.push(value);
                Ok(())
            }
            None => Err(format!(
                "This variable has not been defined '{}'",
                unsafe { &(*name).content }
            )),
        }
    }

    // Assignment must not create a global, so an insert that added a fresh
    // key is rolled back and reported.
    fn set_global(&mut self, name: *mut ObjectString) -> Result<(), String> {
        let value = self.peek_steps(0);
        if self.globals.insert(name, value) {
            self.globals.delete(name);
            return Err(format!(
                "Undefined variable name '{}' LET's define it!",
                unsafe { &(*name).content }
            ));
        }
        Ok(())
    }

    fn binary_op(&mut self, op_code: OpCode) -> Result<(), String> {
        if !is_number(&self.peek_steps(0)) || !is_number(&self.peek_steps(1)) {
            return Err("Operands are not numbers".to_string());
        }

        let value_b = as_number(&self.pop());
        let value_a = as_number(&self.pop());
        match op_code {
            OpCode::GreaterThan => self.push(make_bool_value(value_a > value_b)),
            OpCode::LessThan => self.push(make_bool_value(value_a < value_b)),
            OpCode::Add => self.push(make_number_value(value_a + value_b)),
            OpCode::Sub => self.push(make_number_value(value_a - value_b)),
            OpCode::Mul => self.push(make_number_value(value_a * value_b)),
            OpCode::Div => self.push(make_number_value(value_a / value_b)),
            _ => return Err(format!("Unknown binary operator {}", op_code)),
        }
        Ok(())
    }

    // Both operands stay on the stack until the result string exists, so a
    // collection triggered by the allocation cannot free them.
    fn concatenate(&mut self) {
        let string_b = as_string(&self.peek_steps(0));
        let string_a = as_string(&self.peek_steps(1));
        let combination = unsafe {
            let mut combination =
                String::with_capacity((&(*string_a).content).len() + (&(*string_b).content).len());
            combination.push_str((*string_a).content.as_str());
            combination.push_str((*string_b).content.as_str());
            combination
        };

        self.maybe_collect();
        let value = make_string_value(
            &mut self.object_manager,
            &mut self.intern_strings,
            &combination,
        );
        self.pop();
        self.pop();
        self.push(value);
    }

    fn call(&mut self, closure: *mut ObjectClosure, arg_cnt: usize) -> Result<(), String> {
        let arity = unsafe { (*(*closure).function).arity };
        if arg_cnt != arity {
            return Err(format!("Expected {} parameters but got {}", arity, arg_cnt));
        }

        if self.frames.len() == FRAMES_MAX {
            return Err("Stack overflow".to_string());
        }

        self.frames
            .push(CallFrame::new(closure, self.stack_top_pos - arg_cnt - 1));
        Ok(())
    }

    fn call_value(&mut self, callee: Value, arg_cnt: usize) -> Result<(), String> {
        if is_object(&callee) {
            match unsafe { (*as_object(&callee)).obj_type } {
                ObjectType::ObjClosure => return self.call(as_closure(&callee), arg_cnt),
                ObjectType::ObjNativeFunction => {
                    let native = as_native_function(&callee);
                    let args_start = self.stack_top_pos - arg_cnt;
                    let result =
                        unsafe { (*native).invoke(&self.stack[args_start..self.stack_top_pos]) }?;
                    self.stack_top_pos -= arg_cnt + 1;
                    self.push(result);
                    return Ok(());
                }
                ObjectType::ObjClass => {
                    let class = as_class(&callee);
                    self.maybe_collect();
                    let instance = self.object_manager.alloc_instance(class);
                    let slot = self.stack_top_pos - arg_cnt - 1;
                    self.stack[slot] = make_object_value(instance as *mut Object);

                    let constructor = unsafe { (*class).methods.get(self.init_str) };
                    return match constructor {
                        Some(init) => self.call(as_closure(&init), arg_cnt),
                        None if arg_cnt != 0 => Err(format!(
                            "Class without initializer expected 0 arguments but got {}",
                            arg_cnt
                        )),
                        None => Ok(()),
                    };
                }
                ObjectType::ObjBoundMethod => {
                    let bound = as_bound_method(&callee);
                    let slot = self.stack_top_pos - arg_cnt - 1;
                    unsafe {
                        self.stack[slot] = (*bound).receiver;
                        return self.call((*bound).method, arg_cnt);
                    }
                }
                _ => {}
            }
        }
        Err("You attempted call something that isn't a function or class".to_string())
    }

    fn define_method(&mut self, name: *mut ObjectString) {
        let method = self.peek_steps(0);
        let class = as_class(&self.peek_steps(1));
        unsafe {
            (*class).methods.insert(name, method);
        }
        self.pop();
    }

    fn bind_method(
        &mut self,
        class: *mut ObjectClass,
        name: *mut ObjectString,
    ) -> Result<(), String> {
        let method = unsafe { (*class).methods.get(name) };
        let method = match method {
            Some(method) => method,
            None => {
                return Err(format!("Undefined field '{}'", unsafe {
                    &(*name).content
                }))
            }
        };

        self.maybe_collect();
        let bound = self
            .object_manager
            .alloc_bound_method(self.peek_steps(0), as_closure(&method));
        self.pop();
        self.push(make_object_value(bound as *mut Object));
        Ok(())
    }

    fn invoke(&mut self, name: *mut ObjectString, arg_cnt: usize) -> Result<(), String> {
        let receiver = self.peek_steps(arg_cnt);
        if !is_instance(&receiver) {
            return Err(
                "You tried to invoke a method from something that wasn't an instance".to_string(),
            );
        }

        let instance = as_instance(&receiver);
        // A field shadowing the method name wins and goes through the
        // general call path.
        let field = unsafe { (*instance).fields.get(name) };
        if let Some(value) = field {
            let slot = self.stack_top_pos - arg_cnt - 1;
            self.stack[slot] = value;
            return self.call_value(value, arg_cnt);
        }

        let class = unsafe { (*instance).class };
        self.invoke_from_class(class, name, arg_cnt)
    }

    fn invoke_from_class(
        &mut self,
        class: *mut ObjectClass,
        name: *mut ObjectString,
        arg_cnt: usize,
    ) -> Result<(), String> {
        let method = unsafe { (*class).methods.get(name) };
        match method {
            Some(method) => self.call(as_closure(&method), arg_cnt),
            None => Err(format!("'{}' is undefined", unsafe { &(*name).content })),
        }
    }

    fn capture_upvalue(&mut self, local: *mut Value) -> *mut ObjectUpvalue {
        let mut prev_upvalue: *mut ObjectUpvalue = std::ptr::null_mut();
        let mut cur_upvalue = self.open_upvalues;
        unsafe {
            while !cur_upvalue.is_null() && (*cur_upvalue).location > local {
                prev_upvalue = cur_upvalue;
                cur_upvalue = (*cur_upvalue).next;
            }

            if !cur_upvalue.is_null() && (*cur_upvalue).location == local {
                return cur_upvalue;
            }
        }

        self.maybe_collect();
        let new_upvalue = self.object_manager.alloc_upvalue(local);
        unsafe {
            (*new_upvalue).next = cur_upvalue;
            if prev_upvalue.is_null() {
                self.open_upvalues = new_upvalue;
            } else {
                (*prev_upvalue).next = new_upvalue;
            }
        }
        new_upvalue
    }

    fn close_upvalues(&mut self, last: *mut Value) {
        unsafe {
            while !self.open_upvalues.is_null() && (*self.open_upvalues).location >= last {
                let upvalue = self.open_upvalues;
                (*upvalue).closed = *(*upvalue).location;
                (*upvalue).location = &mut (*upvalue).closed;
                self.open_upvalues = (*upvalue).next;
            }
        }
    }
}

#[cfg(feature = "debug_trace_execution")]
mod debug_feature {
    use super::*;
    use crate::debug;

    pub fn trace_instruction(vm: &VM) {
        print!("{: >10}", "");
        for index in 0..vm.stack_top_pos {
            print!(" [ ");
            print_value(&vm.stack[index]);
            print!(" ]");
        }
        println!();

        if let Some(frame) = vm.frames.last() {
            unsafe {
                let function = (*frame.closure()).function;
                debug::disassemble_instruction(&(*function).chunk, frame.ip());
            }
        }
    }
}

#[cfg(not(feature = "debug_trace_execution"))]
mod debug_feature {
    use super::*;

    pub fn trace_instruction(_vm: &VM) {}
}
