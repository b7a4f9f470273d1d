//! Raw CIL instruction model.
//!
//! This is the shape in which method bodies arrive at the reconstruction engine: an
//! ordered list of [`Instruction`]s, each with its raw [`OpCode`] (short and macro forms
//! included), a decoded [`Operand`], its byte offset and length.
//!
//! # Key Components
//!
//! - [`OpCode`] / [`OperandType`] - The ECMA-335 opcode table
//! - [`Instruction`] / [`Operand`] / [`Immediate`] - Decoded instructions
//! - [`InstructionAssembler`] - Fluent builder producing correctly laid out streams

mod assembler;
mod instruction;
mod opcode;

pub use assembler::{AssembledCode, InstructionAssembler};
pub use instruction::{Immediate, Instruction, Operand, SourceLocation};
pub use opcode::{OpCode, OperandType};
