use crate::chunk::{Chunk, OpCode};
use crate::value::{as_function, format_value};

pub fn disassemble_chunk(chunk: &Chunk, name: &str) {
    println!("== {} ==", name);

    let mut offset = 0;
    while offset < chunk.len() {
        offset = disassemble_instruction(chunk, offset);
    }
}

pub fn disassemble_instruction(chunk: &Chunk, offset: usize) -> usize {
    print!("{:04} ", offset);
    let line = chunk.get_line(offset);
    if offset > 0 && line == chunk.get_line(offset - 1) {
        print!("   | ");
    } else {
        print!("{:4} ", line);
    }

    let instruction = match chunk.read_from_offset(offset) {
        Some(byte) => byte,
        None => {
            println!("<end of chunk>");
            return offset + 1;
        }
    };

    match OpCode::from_byte(instruction) {
        Some(op) => match op {
            OpCode::Constant
            | OpCode::GetGlobal
            | OpCode::DefineGlobal
            | OpCode::SetGlobal
            | OpCode::Class
            | OpCode::GetProperty
            | OpCode::SetProperty
            | OpCode::Method
            | OpCode::GetSuper => constant_instruction(op, chunk, offset),
            OpCode::ConstantLong
            | OpCode::GetGlobalLong
            | OpCode::DefineGlobalLong
            | OpCode::SetGlobalLong
            | OpCode::ClassLong
            | OpCode::MethodLong
            | OpCode::GetSuperLong => constant_long_instruction(op, chunk, offset),
            OpCode::GetLocal
            | OpCode::SetLocal
            | OpCode::GetUpvalue
            | OpCode::SetUpvalue
            | OpCode::Call => byte_instruction(op, chunk, offset),
            OpCode::GetLocalLong | OpCode::SetLocalLong => {
                long_operand_instruction(op, chunk, offset)
            }
            OpCode::Branch | OpCode::BranchIfFalse => jump_instruction(op, 1, chunk, offset),
            OpCode::Loop => jump_instruction(op, -1, chunk, offset),
            OpCode::Closure => closure_instruction(op, chunk, offset),
            OpCode::Invoke => invoke_instruction(op, chunk, offset),
            OpCode::SuperInvoke => invoke_instruction(op, chunk, offset),
            OpCode::SuperInvokeLong => invoke_long_instruction(op, chunk, offset),
            _ => simple_instruction(op, offset),
        },
        None => {
            println!("Unknown opcode {}", instruction);
            offset + 1
        }
    }
}

fn simple_instruction(op: OpCode, offset: usize) -> usize {
    println!("{}", op);
    offset + 1
}

fn read_long_operand(chunk: &Chunk, offset: usize) -> usize {
    let b0 = chunk.read_from_offset(offset).unwrap_or(0) as usize;
    let b1 = chunk.read_from_offset(offset + 1).unwrap_or(0) as usize;
    let b2 = chunk.read_from_offset(offset + 2).unwrap_or(0) as usize;
    b0 | (b1 << 8) | (b2 << 16)
}

fn constant_instruction(op: OpCode, chunk: &Chunk, offset: usize) -> usize {
    let constant = chunk.read_from_offset(offset + 1).unwrap_or(0) as usize;
    println!(
        "{:<16} {:>4} '{}'",
        op.to_string(),
        constant,
        format_value(chunk.get_constant(constant))
    );
    offset + 2
}

fn constant_long_instruction(op: OpCode, chunk: &Chunk, offset: usize) -> usize {
    let constant = read_long_operand(chunk, offset + 1);
    println!(
        "{:<16} {:>4} '{}'",
        op.to_string(),
        constant,
        format_value(chunk.get_constant(constant))
    );
    offset + 4
}

fn byte_instruction(op: OpCode, chunk: &Chunk, offset: usize) -> usize {
    let operand = chunk.read_from_offset(offset + 1).unwrap_or(0);
    println!("{:<16} {:>4}", op.to_string(), operand);
    offset + 2
}

fn long_operand_instruction(op: OpCode, chunk: &Chunk, offset: usize) -> usize {
    let operand = read_long_operand(chunk, offset + 1);
    println!("{:<16} {:>4}", op.to_string(), operand);
    offset + 4
}

fn jump_instruction(op: OpCode, sign: i64, chunk: &Chunk, offset: usize) -> usize {
    let high = chunk.read_from_offset(offset + 1).unwrap_or(0) as u16;
    let low = chunk.read_from_offset(offset + 2).unwrap_or(0) as u16;
    let jump = i64::from((high << 8) | low);
    let target = offset as i64 + 3 + sign * jump;
    println!("{:<16} {:>4} -> {}", op.to_string(), offset, target);
    offset + 3
}

fn closure_instruction(op: OpCode, chunk: &Chunk, offset: usize) -> usize {
    let constant = chunk.read_from_offset(offset + 1).unwrap_or(0) as usize;
    let value = chunk.get_constant(constant);
    println!(
        "{:<16} {:>4} {}",
        op.to_string(),
        constant,
        format_value(value)
    );

    let function = as_function(value);
    let upvalue_count = unsafe { (*function).upvalue_count };
    let mut next = offset + 2;
    for _ in 0..upvalue_count {
        let is_local = chunk.read_from_offset(next).unwrap_or(0);
        let index = chunk.read_from_offset(next + 1).unwrap_or(0);
        println!(
            "{:04}      |                     {} {}",
            next,
            if is_local != 0 { "local" } else { "upvalue" },
            index
        );
        next += 2;
    }
    next
}

fn invoke_instruction(op: OpCode, chunk: &Chunk, offset: usize) -> usize {
    let constant = chunk.read_from_offset(offset + 1).unwrap_or(0) as usize;
    let arg_cnt = chunk.read_from_offset(offset + 2).unwrap_or(0);
    println!(
        "{:<16} ({} args) {:>4} '{}'",
        op.to_string(),
        arg_cnt,
        constant,
        format_value(chunk.get_constant(constant))
    );
    offset + 3
}

fn invoke_long_instruction(op: OpCode, chunk: &Chunk, offset: usize) -> usize {
    let constant = read_long_operand(chunk, offset + 1);
    let arg_cnt = chunk.read_from_offset(offset + 4).unwrap_or(0);
    println!(
        "{:<16} ({} args) {:>4} '{}'",
        op.to_string(),
        arg_cnt,
        constant,
        format_value(chunk.get_constant(constant))
    );
    offset + 5
}
