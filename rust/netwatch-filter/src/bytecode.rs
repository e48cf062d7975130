// netwatch-filter: Bytecode representation
// Flat instruction vector plus a deduplicated string constant table

use std::fmt;

/// Stack-machine opcodes
///
/// Conditional jumps peek at the top of stack and leave it in place;
/// `Pop` discards it. Jump operands are relative: the target is
/// `pc + 1 + offset`, so an offset of zero is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    /// Push the event field named by the operand
    PushField,
    /// Push a string from the constant table
    PushString,
    /// Push an integer literal
    PushNumber,
    Pop,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    /// Regex match; both operands must be strings
    Match,
    NMatch,
    /// Membership test; operand = number of list entries on the stack
    In,
    And,
    Or,
    Not,
    Jump,
    JumpIfFalse,
    JumpIfTrue,
    Return,
    Nop,
}

impl OpCode {
    /// True for `Jump`/`JumpIfFalse`/`JumpIfTrue`
    pub fn is_jump(self) -> bool {
        matches!(self, OpCode::Jump | OpCode::JumpIfFalse | OpCode::JumpIfTrue)
    }

    pub fn name(self) -> &'static str {
        match self {
            OpCode::PushField => "PUSH_FIELD",
            OpCode::PushString => "PUSH_STRING",
            OpCode::PushNumber => "PUSH_NUMBER",
            OpCode::Pop => "POP",
            OpCode::Eq => "EQ",
            OpCode::Ne => "NE",
            OpCode::Lt => "LT",
            OpCode::Gt => "GT",
            OpCode::Le => "LE",
            OpCode::Ge => "GE",
            OpCode::Match => "MATCH",
            OpCode::NMatch => "NMATCH",
            OpCode::In => "IN",
            OpCode::And => "AND",
            OpCode::Or => "OR",
            OpCode::Not => "NOT",
            OpCode::Jump => "JUMP",
            OpCode::JumpIfFalse => "JUMP_IF_FALSE",
            OpCode::JumpIfTrue => "JUMP_IF_TRUE",
            OpCode::Return => "RETURN",
            OpCode::Nop => "NOP",
        }
    }

    /// Index used by the per-opcode profiler table
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Count of distinct opcodes, sized for profiler tables
pub const OPCODE_COUNT: usize = OpCode::Nop as usize + 1;

/// One instruction: opcode plus at most one 64-bit operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub op: OpCode,
    /// Field id, string table index, integer literal, relative jump
    /// offset, or IN count — meaning depends on the opcode
    pub operand: i64,
}

impl Instruction {
    pub fn new(op: OpCode, operand: i64) -> Self {
        Self { op, operand }
    }

    pub fn simple(op: OpCode) -> Self {
        Self { op, operand: 0 }
    }
}

/// Compiled filter program
#[derive(Debug, Clone, Default)]
pub struct Bytecode {
    pub instructions: Vec<Instruction>,
    /// Deduplicated string constants, indexed by `PushString` operands
    pub strings: Vec<String>,
    /// Optimizer rewrites applied across all passes
    pub optimizations_applied: u32,
}

impl Bytecode {
    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    /// Intern a string, returning its table index
    pub fn intern(&mut self, value: &str) -> i64 {
        if let Some(index) = self.strings.iter().position(|s| s == value) {
            return index as i64;
        }
        self.strings.push(value.to_string());
        (self.strings.len() - 1) as i64
    }

    /// Verify that every jump lands inside the instruction vector
    pub fn jumps_in_bounds(&self) -> bool {
        self.instructions.iter().enumerate().all(|(i, instr)| {
            if !instr.op.is_jump() {
                return true;
            }
            let target = i as i64 + 1 + instr.operand;
            target >= 0 && (target as usize) < self.instructions.len()
        })
    }
}

impl fmt::Display for Bytecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, instr) in self.instructions.iter().enumerate() {
            match instr.op {
                OpCode::PushString => {
                    let value = self
                        .strings
                        .get(instr.operand as usize)
                        .map(String::as_str)
                        .unwrap_or("?");
                    writeln!(f, "{:4}  {} \"{}\"", i, instr.op.name(), value)?;
                }
                OpCode::PushField | OpCode::PushNumber | OpCode::In => {
                    writeln!(f, "{:4}  {} {}", i, instr.op.name(), instr.operand)?;
                }
                op if op.is_jump() => {
                    let target = i as i64 + 1 + instr.operand;
                    writeln!(f, "{:4}  {} -> {}", i, instr.op.name(), target)?;
                }
                _ => writeln!(f, "{:4}  {}", i, instr.op.name())?,
            }
        }
        Ok(())
    }
}
