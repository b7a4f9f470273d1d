//! Decoded CIL instructions as produced by the method body provider.
//!
//! An [`Instruction`] is immutable input: opcode, operand, byte offset and length, plus
//! an optional [`SourceLocation`]. Branch operands are already resolved to absolute byte
//! offsets within the method body.

use std::fmt;

use crate::{assembly::OpCode, metadata::token::Token};

/// Represents an immediate value embedded in a CIL instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Immediate {
    /// Signed 8-bit immediate value
    Int8(i8),
    /// Unsigned 8-bit immediate value
    UInt8(u8),
    /// Signed 32-bit immediate value
    Int32(i32),
    /// Signed 64-bit immediate value
    Int64(i64),
    /// 32-bit floating point immediate value
    Float32(f32),
    /// 64-bit floating point immediate value
    Float64(f64),
}

impl Immediate {
    /// Widens an integer immediate to `i32`, as `ldc.i4.s` does.
    #[must_use]
    pub const fn as_i32(&self) -> Option<i32> {
        match self {
            Immediate::Int8(v) => Some(*v as i32),
            Immediate::UInt8(v) => Some(*v as i32),
            Immediate::Int32(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Immediate::Int8(v) => write!(f, "{v}"),
            Immediate::UInt8(v) => write!(f, "{v}"),
            Immediate::Int32(v) => write!(f, "{v}"),
            Immediate::Int64(v) => write!(f, "{v}"),
            Immediate::Float32(v) => write!(f, "{v}"),
            Immediate::Float64(v) => write!(f, "{v}"),
        }
    }
}

/// The operand of a decoded instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand present
    None,
    /// Immediate value (constant embedded in instruction)
    Immediate(Immediate),
    /// Branch target as an absolute offset within the method body
    Target(u32),
    /// Jump table as absolute offsets within the method body
    Switch(Vec<u32>),
    /// Local variable index
    Local(u16),
    /// Method argument index, counting `this` as 0 on instance methods
    Argument(u16),
    /// Metadata token reference
    Token(Token),
    /// User string literal of `ldstr`
    String(String),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Immediate(imm) => write!(f, "{imm}"),
            Operand::Target(t) => write!(f, "IL_{t:02X}"),
            Operand::Switch(targets) => {
                let labels: Vec<String> = targets.iter().map(|t| format!("IL_{t:02X}")).collect();
                write!(f, "({})", labels.join(", "))
            }
            Operand::Local(l) => write!(f, "V_{l}"),
            Operand::Argument(a) => write!(f, "A_{a}"),
            Operand::Token(t) => write!(f, "{t}"),
            Operand::String(s) => write!(f, "{s:?}"),
        }
    }
}

/// Where an instruction came from in the original source, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    /// Source document path
    pub document: String,
    /// 1-based start line
    pub line: u32,
    /// 1-based start column
    pub column: u32,
}

impl SourceLocation {
    /// Creates a new source location.
    #[must_use]
    pub fn new(document: impl Into<String>, line: u32, column: u32) -> Self {
        SourceLocation {
            document: document.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({},{})", self.document, self.line, self.column)
    }
}

/// One decoded CIL instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Byte offset from the start of the method body
    pub offset: u32,
    /// Encoded size in bytes, opcode and operand included
    pub size: u32,
    /// The raw opcode
    pub opcode: OpCode,
    /// The decoded operand
    pub operand: Operand,
    /// Optional originating source location
    pub location: Option<SourceLocation>,
}

impl Instruction {
    /// Creates an instruction without source location.
    #[must_use]
    pub fn new(offset: u32, size: u32, opcode: OpCode, operand: Operand) -> Self {
        Instruction {
            offset,
            size,
            opcode,
            operand,
            location: None,
        }
    }

    /// Offset of the byte right after this instruction.
    #[must_use]
    pub const fn end_offset(&self) -> u32 {
        self.offset + self.size
    }

    /// Returns the branch targets of this instruction, empty for non-branches.
    #[must_use]
    pub fn branch_targets(&self) -> Vec<u32> {
        match &self.operand {
            Operand::Target(t) => vec![*t],
            Operand::Switch(targets) => targets.clone(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL_{:04X}: {}", self.offset, self.opcode)?;
        if self.operand != Operand::None {
            write!(f, " {}", self.operand)?;
        }
        Ok(())
    }
}
