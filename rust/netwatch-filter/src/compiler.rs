// netwatch-filter: Bytecode compiler
// AST walk with short-circuit jumps, then a fixed pipeline of
// peephole, dead-code and constant-folding passes

use crate::ast::{CmpOp, Expr};
use crate::bytecode::{Bytecode, Instruction, OpCode};
use crate::error::{FilterError, FilterResult};

/// Compile an AST into optimized bytecode
///
/// The emitted program always ends in `Return`, so every short-circuit
/// label has an in-bounds instruction to land on.
pub fn compile(ast: &Expr) -> FilterResult<Bytecode> {
    let mut bytecode = Bytecode::default();
    emit(ast, &mut bytecode)?;
    bytecode.instructions.push(Instruction::simple(OpCode::Return));

    optimize(&mut bytecode);

    if !bytecode.jumps_in_bounds() {
        return Err(FilterError::Compile(
            "jump offset out of instruction bounds".to_string(),
        ));
    }
    Ok(bytecode)
}

/// Compile without running the optimizer passes
///
/// Kept for equivalence testing and debugging: optimized and
/// unoptimized programs must evaluate identically on every event.
pub fn compile_unoptimized(ast: &Expr) -> FilterResult<Bytecode> {
    let mut bytecode = Bytecode::default();
    emit(ast, &mut bytecode)?;
    bytecode.instructions.push(Instruction::simple(OpCode::Return));

    if !bytecode.jumps_in_bounds() {
        return Err(FilterError::Compile(
            "jump offset out of instruction bounds".to_string(),
        ));
    }
    Ok(bytecode)
}

fn emit(expr: &Expr, bytecode: &mut Bytecode) -> FilterResult<()> {
    match expr {
        Expr::Field(field) => {
            bytecode
                .instructions
                .push(Instruction::new(OpCode::PushField, field.code() as i64));
        }
        Expr::Str(value) => {
            let index = bytecode.intern(value);
            bytecode
                .instructions
                .push(Instruction::new(OpCode::PushString, index));
        }
        Expr::Int(value) => {
            bytecode
                .instructions
                .push(Instruction::new(OpCode::PushNumber, *value));
        }
        Expr::Cmp { op, lhs, rhs } => {
            emit(lhs, bytecode)?;
            emit(rhs, bytecode)?;
            bytecode.instructions.push(Instruction::simple(match op {
                CmpOp::Eq => OpCode::Eq,
                CmpOp::Ne => OpCode::Ne,
                CmpOp::Lt => OpCode::Lt,
                CmpOp::Gt => OpCode::Gt,
                CmpOp::Le => OpCode::Le,
                CmpOp::Ge => OpCode::Ge,
                CmpOp::Match => OpCode::Match,
                CmpOp::NotMatch => OpCode::NMatch,
            }));
        }
        Expr::In { lhs, list } => {
            if list.is_empty() {
                return Err(FilterError::Compile("IN list cannot be empty".to_string()));
            }
            emit(lhs, bytecode)?;
            for item in list {
                emit(item, bytecode)?;
            }
            bytecode
                .instructions
                .push(Instruction::new(OpCode::In, list.len() as i64));
        }
        Expr::Not(inner) => {
            emit(inner, bytecode)?;
            bytecode.instructions.push(Instruction::simple(OpCode::Not));
        }
        Expr::And(lhs, rhs) => {
            // <L> JUMP_IF_FALSE end ; POP ; <R> ; end:
            emit(lhs, bytecode)?;
            let jump_at = bytecode.instructions.len();
            bytecode
                .instructions
                .push(Instruction::new(OpCode::JumpIfFalse, 0));
            bytecode.instructions.push(Instruction::simple(OpCode::Pop));
            emit(rhs, bytecode)?;
            let end = bytecode.instructions.len();
            bytecode.instructions[jump_at].operand = end as i64 - (jump_at as i64 + 1);
        }
        Expr::Or(lhs, rhs) => {
            emit(lhs, bytecode)?;
            let jump_at = bytecode.instructions.len();
            bytecode
                .instructions
                .push(Instruction::new(OpCode::JumpIfTrue, 0));
            bytecode.instructions.push(Instruction::simple(OpCode::Pop));
            emit(rhs, bytecode)?;
            let end = bytecode.instructions.len();
            bytecode.instructions[jump_at].operand = end as i64 - (jump_at as i64 + 1);
        }
    }
    Ok(())
}

/// Run the optimizer passes in their fixed order
fn optimize(bytecode: &mut Bytecode) {
    let mut applied = 0;
    applied += peephole(bytecode);
    applied += dead_code(bytecode);
    applied += constant_fold(bytecode);
    bytecode.optimizations_applied += applied;
}

/// Instruction indices that some jump lands on
fn jump_targets(bytecode: &Bytecode) -> Vec<bool> {
    let len = bytecode.instructions.len();
    let mut targets = vec![false; len];
    for (i, instr) in bytecode.instructions.iter().enumerate() {
        if instr.op.is_jump() {
            let target = i as i64 + 1 + instr.operand;
            if target >= 0 && (target as usize) < len {
                targets[target as usize] = true;
            }
        }
    }
    targets
}

/// Drop the instructions marked false in `keep`, rewriting every jump
/// offset for the compacted layout; jumps into removed regions land on
/// the next surviving instruction
fn rebuild(bytecode: &mut Bytecode, keep: &[bool]) {
    let len = bytecode.instructions.len();
    let mut map = vec![0usize; len + 1];
    let mut next = 0;
    for i in 0..len {
        map[i] = next;
        if keep[i] {
            next += 1;
        }
    }
    map[len] = next;

    let mut out = Vec::with_capacity(next);
    for i in 0..len {
        if !keep[i] {
            continue;
        }
        let mut instr = bytecode.instructions[i];
        if instr.op.is_jump() {
            let target = (i as i64 + 1 + instr.operand).clamp(0, len as i64) as usize;
            instr.operand = map[target] as i64 - (map[i] as i64 + 1);
        }
        out.push(instr);
    }
    bytecode.instructions = out;
}

/// Peephole pass: drop `Jump(+0)` and fold adjacent `Not Not`
fn peephole(bytecode: &mut Bytecode) -> u32 {
    let targets = jump_targets(bytecode);
    let len = bytecode.instructions.len();
    let mut keep = vec![true; len];
    let mut changes = 0;

    let mut i = 0;
    while i < len {
        let instr = bytecode.instructions[i];
        if instr.op == OpCode::Jump && instr.operand == 0 {
            // Jumping to the next instruction does nothing
            keep[i] = false;
            changes += 1;
            i += 1;
            continue;
        }
        if instr.op == OpCode::Not
            && i + 1 < len
            && bytecode.instructions[i + 1].op == OpCode::Not
            && !targets[i + 1]
        {
            // Double negation cancels; a jump landing between the pair
            // would change meaning, so that shape is left alone
            keep[i] = false;
            keep[i + 1] = false;
            changes += 1;
            i += 2;
            continue;
        }
        i += 1;
    }

    if changes > 0 {
        rebuild(bytecode, &keep);
    }
    changes
}

/// Dead-code pass: remove instructions that follow an unconditional
/// `Jump`/`Return` and are not jump targets
fn dead_code(bytecode: &mut Bytecode) -> u32 {
    let targets = jump_targets(bytecode);
    let len = bytecode.instructions.len();
    let mut keep = vec![true; len];
    let mut changes = 0;

    let mut reachable = true;
    for i in 0..len {
        if targets[i] {
            reachable = true;
        }
        if !reachable {
            keep[i] = false;
            changes += 1;
            continue;
        }
        if matches!(bytecode.instructions[i].op, OpCode::Jump | OpCode::Return) {
            reachable = false;
        }
    }

    if changes > 0 {
        rebuild(bytecode, &keep);
    }
    changes
}

/// Constant-folding pass: replace literal comparisons with their result
///
/// `PushNumber a, PushNumber b, <cmp>` (and the string equivalent)
/// becomes `PushNumber 0|1`, which is truthiness-equivalent to the
/// boolean the comparison would produce.
fn constant_fold(bytecode: &mut Bytecode) -> u32 {
    let targets = jump_targets(bytecode);
    let len = bytecode.instructions.len();
    let mut keep = vec![true; len];
    let mut changes = 0;

    let mut i = 0;
    while i + 2 < len {
        if !keep[i] {
            i += 1;
            continue;
        }
        let a = bytecode.instructions[i];
        let b = bytecode.instructions[i + 1];
        let op = bytecode.instructions[i + 2].op;
        if targets[i + 1] || targets[i + 2] {
            i += 1;
            continue;
        }

        let folded = match (a.op, b.op) {
            (OpCode::PushNumber, OpCode::PushNumber) => {
                fold_cmp(op, a.operand.cmp(&b.operand))
            }
            (OpCode::PushString, OpCode::PushString) => {
                let lhs = &bytecode.strings[a.operand as usize];
                let rhs = &bytecode.strings[b.operand as usize];
                fold_cmp(op, lhs.cmp(rhs))
            }
            _ => None,
        };

        if let Some(result) = folded {
            bytecode.instructions[i] =
                Instruction::new(OpCode::PushNumber, i64::from(result));
            keep[i + 1] = false;
            keep[i + 2] = false;
            changes += 1;
            i += 3;
        } else {
            i += 1;
        }
    }

    if changes > 0 {
        rebuild(bytecode, &keep);
    }
    changes
}

fn fold_cmp(op: OpCode, ordering: std::cmp::Ordering) -> Option<bool> {
    use std::cmp::Ordering::*;
    Some(match op {
        OpCode::Eq => ordering == Equal,
        OpCode::Ne => ordering != Equal,
        OpCode::Lt => ordering == Less,
        OpCode::Gt => ordering == Greater,
        OpCode::Le => ordering != Greater,
        OpCode::Ge => ordering != Less,
        _ => return None,
    })
}
