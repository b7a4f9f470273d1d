//! The reconstructed tree.
//!
//! A [`MethodAst`] is an [`AstBlock`] of statements over the variables in its
//! [`VariableTable`]. Expressions keep CIL operation semantics ([`AstCode`]) but take
//! their operands as nested argument expressions instead of from an implicit stack.
//!
//! - [`code`] - canonical operation codes and their stack effects
//! - [`node`] - expressions, labels, blocks and try/catch regions
//! - [`variable`] - variables and the per-method table that owns them
//! - [`visit`] - read-only traversals
//!
//! `MethodAst` implements `Display`, printing one statement per line.

pub mod code;
mod method;
pub mod node;
pub mod variable;
pub mod visit;
mod writer;

pub use code::{AstCode, AstPrefix, ElementType, PopCount};
pub use method::MethodAst;
pub use node::{
    AstBlock, AstCatchBlock, AstExpression, AstFilterBlock, AstLabel, AstNode, AstOperand,
    AstTryCatchBlock, IlRange, LabelId,
};
pub use variable::{Variable, VariableFlags, VariableId, VariableOrigin, VariableTable};
