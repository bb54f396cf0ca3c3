//! Bytecode representation: the opcode set and instruction array ChronoVM
//! executes (spec.md §4.1).
//!
//! Mirrors the teacher's `bytecode` module split (`op`/`code` submodules)
//! but without a compiler — the front-end that produces a [`Program`] is an
//! explicit external collaborator (spec.md §1, §6).

pub mod gc;
pub mod state;
pub mod step;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::value::Primitive;

/// Every opcode named in spec.md §4.1's instruction table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
pub enum Opcode {
    LoadConst,
    Load,
    Store,
    Pop,
    Dup,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Negate,
    Not,
    Eq,
    Neq,
    Lt,
    Gt,
    Lte,
    Gte,
    Jump,
    JumpIfFalse,
    JumpIfTrue,
    NewObject,
    SetProperty,
    GetProperty,
    NewList,
    ListAppend,
    ListSet,
    ListGet,
    ListLen,
    MakeFunction,
    Call,
    Ret,
    Print,
    Halt,
}

impl Opcode {
    /// `true` for `JUMP`, `JUMP_IF_FALSE`, `JUMP_IF_TRUE` — used by the
    /// compressor's loop-head detection (spec.md §4.8).
    #[must_use]
    pub fn is_jump(self) -> bool {
        matches!(self, Self::Jump | Self::JumpIfFalse | Self::JumpIfTrue)
    }

    #[must_use]
    pub fn is_conditional_jump(self) -> bool {
        matches!(self, Self::JumpIfFalse | Self::JumpIfTrue)
    }
}

/// The operand carried by instructions that take one (spec.md §4.1's
/// "Operand(s)" column). Opcodes with no operand use `Operand::None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    None,
    Const(Primitive),
    Name(String),
    Target(usize),
    Count(usize),
}

/// One instruction: an opcode plus its operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub op: Opcode,
    pub operand: Operand,
}

impl Instruction {
    #[must_use]
    pub fn new(op: Opcode, operand: Operand) -> Self {
        Self { op, operand }
    }

    #[must_use]
    pub fn simple(op: Opcode) -> Self {
        Self { op, operand: Operand::None }
    }
}

/// The immutable instruction array a front-end compiles source into
/// (spec.md §4.1, §6). `Program` is the sole input the whole pipeline is a
/// pure function of (spec.md §1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub instructions: Vec<Instruction>,
}

impl Program {
    #[must_use]
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    #[must_use]
    pub fn get(&self, pc: usize) -> Option<&Instruction> {
        self.instructions.get(pc)
    }

    /// `true` if `pc` is the target of some backward `JUMP` elsewhere in the
    /// program — spec.md §4.8's loop-head definition ("target ≤ source
    /// `pc`").
    #[must_use]
    pub fn is_loop_head(&self, pc: usize) -> bool {
        self.instructions.iter().enumerate().any(|(source, instr)| {
            instr.op == Opcode::Jump
                && matches!(&instr.operand, Operand::Target(target) if *target <= source && *target == pc)
        })
    }
}
