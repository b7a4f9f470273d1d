//! # cilast Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the cilast library. Import this module to get quick access to everything needed
//! to describe a method body and reconstruct it.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all cilast operations
pub use crate::Error;

/// The result type used throughout cilast
pub use crate::Result;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// Single-method and batch reconstruction
pub use crate::analysis::{build_methods, AstBuilder, BuildOptions, MethodOutcome};

// ================================================================================================
// Input Model
// ================================================================================================

/// Method bodies and their declared slots and regions
pub use crate::metadata::method::{
    ExceptionHandler, HandlerKind, LocalDef, MethodBody, MethodFlags, ParameterDef,
};

/// Instruction streams and the assembler producing them
pub use crate::assembly::{Instruction, InstructionAssembler, OpCode, Operand};

/// Metadata tokens and resolved references
pub use crate::metadata::{
    refs::{FieldRef, MethodRef, TypeRef},
    resolver::{OperandResolver, ReferenceCache, ReferenceTable},
    token::Token,
};

// ================================================================================================
// Output Model
// ================================================================================================

/// The reconstructed tree
pub use crate::ast::{
    AstBlock, AstCatchBlock, AstCode, AstExpression, AstNode, AstOperand, AstTryCatchBlock,
    MethodAst, Variable, VariableId, VariableTable,
};
