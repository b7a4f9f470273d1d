//! Tree node types.
//!
//! The emitted tree is an ordered [`AstBlock`] of [`AstNode`]s. Expressions nest their
//! operand expressions as `arguments`; control flow stays explicit through labels and
//! branch expressions, while exception regions become properly nested
//! [`AstTryCatchBlock`]s.

use std::fmt;

use crate::{
    assembly::SourceLocation,
    ast::{AstCode, AstPrefix, ElementType, VariableId},
    metadata::refs::{FieldRefRc, MemberRef, MethodRefRc, TypeRefRc},
};

/// Identity of a branch target: the IL offset of the instruction it labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LabelId(pub u32);

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL_{:02X}", self.0)
    }
}

/// A branch target placed in front of the expression it labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AstLabel {
    /// Label identity
    pub id: LabelId,
    /// Location of the labelled instruction
    pub location: Option<SourceLocation>,
}

impl AstLabel {
    /// Display name, `IL_<offset>`.
    #[must_use]
    pub fn name(&self) -> String {
        self.id.to_string()
    }
}

/// The byte range `[start, end)` of the instruction an expression was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IlRange {
    /// First byte, prefixes included
    pub start: u32,
    /// One past the last byte
    pub end: u32,
}

/// Operand of an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum AstOperand {
    /// No operand
    None,
    /// 32-bit integer constant
    Int32(i32),
    /// 64-bit integer constant
    Int64(i64),
    /// 32-bit float constant
    Float32(f32),
    /// 64-bit float constant
    Float64(f64),
    /// String literal
    String(String),
    /// Single branch target
    Label(LabelId),
    /// Jump table
    Labels(Vec<LabelId>),
    /// Loaded, stored or address-taken variable
    Variable(VariableId),
    /// Field reference
    Field(FieldRefRc),
    /// Method reference or call-site signature
    Method(MethodRefRc),
    /// Type reference
    Type(TypeRefRc),
    /// `ldtoken` member handle
    Member(MemberRef),
    /// Primitive type of an expanded `ldind`/`stind`
    Primitive(ElementType),
}

/// An operation with its operand and its argument expressions.
#[derive(Debug, Clone, PartialEq)]
pub struct AstExpression {
    /// The canonical opcode
    pub code: AstCode,
    /// The operand
    pub operand: AstOperand,
    /// Argument expressions, in stack order (deepest first)
    pub arguments: Vec<AstExpression>,
    /// Prefixes merged into this expression
    pub prefixes: Vec<AstPrefix>,
    /// IL range of the source instruction, absent for synthesized loads/stores
    pub il_range: Option<IlRange>,
    /// Source location of the originating instruction
    pub location: Option<SourceLocation>,
}

impl AstExpression {
    /// Creates an expression without arguments.
    #[must_use]
    pub fn new(code: AstCode, operand: AstOperand) -> Self {
        AstExpression {
            code,
            operand,
            arguments: Vec::new(),
            prefixes: Vec::new(),
            il_range: None,
            location: None,
        }
    }

    /// `ldloc variable`
    #[must_use]
    pub fn load(variable: VariableId) -> Self {
        Self::new(AstCode::Ldloc, AstOperand::Variable(variable))
    }

    /// `stloc variable(value)`
    #[must_use]
    pub fn store(variable: VariableId, value: AstExpression) -> Self {
        let location = value.location.clone();
        AstExpression {
            arguments: vec![value],
            location,
            ..Self::new(AstCode::Stloc, AstOperand::Variable(variable))
        }
    }

    /// Returns the variable operand, if any.
    #[must_use]
    pub fn variable(&self) -> Option<VariableId> {
        match self.operand {
            AstOperand::Variable(v) => Some(v),
            _ => None,
        }
    }

    /// Returns `true` if this is `ldloc variable`.
    #[must_use]
    pub fn is_load_of(&self, variable: VariableId) -> bool {
        self.code == AstCode::Ldloc && self.variable() == Some(variable)
    }

    /// Returns the branch targets of this expression.
    #[must_use]
    pub fn branch_targets(&self) -> Vec<LabelId> {
        match &self.operand {
            AstOperand::Label(l) => vec![*l],
            AstOperand::Labels(ls) => ls.clone(),
            _ => Vec::new(),
        }
    }
}

/// A node of the tree.
#[derive(Debug, Clone, PartialEq)]
pub enum AstNode {
    /// A statement-level expression
    Expression(AstExpression),
    /// A branch target
    Label(AstLabel),
    /// A nested block
    Block(AstBlock),
    /// A protected region with its handlers
    TryCatch(AstTryCatchBlock),
}

impl AstNode {
    /// Returns the expression, if this node is one.
    #[must_use]
    pub fn as_expression(&self) -> Option<&AstExpression> {
        match self {
            AstNode::Expression(e) => Some(e),
            _ => None,
        }
    }

    /// Returns the try/catch block, if this node is one.
    #[must_use]
    pub fn as_try_catch(&self) -> Option<&AstTryCatchBlock> {
        match self {
            AstNode::TryCatch(t) => Some(t),
            _ => None,
        }
    }
}

impl From<AstExpression> for AstNode {
    fn from(expr: AstExpression) -> Self {
        AstNode::Expression(expr)
    }
}

/// An ordered sequence of nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AstBlock {
    /// The nodes, in execution order
    pub body: Vec<AstNode>,
}

impl AstBlock {
    /// Wraps a node list.
    #[must_use]
    pub fn new(body: Vec<AstNode>) -> Self {
        AstBlock { body }
    }

    /// Number of top-level nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// Returns `true` if the block has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// A `try` block with its catch, finally and fault handlers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AstTryCatchBlock {
    /// The protected region
    pub try_block: AstBlock,
    /// Catch and filter handlers, in table order
    pub catch_blocks: Vec<AstCatchBlock>,
    /// The finally handler
    pub finally_block: Option<AstBlock>,
    /// The fault handler
    pub fault_block: Option<AstBlock>,
}

/// A typed or filtered catch handler.
#[derive(Debug, Clone, PartialEq)]
pub struct AstCatchBlock {
    /// Caught type; `None` for filter handlers
    pub exception_type: Option<TypeRefRc>,
    /// Variable receiving the exception, if the handler uses it
    pub exception_variable: Option<VariableId>,
    /// The filter deciding whether this handler runs
    pub filter: Option<AstFilterBlock>,
    /// The handler body
    pub body: AstBlock,
}

/// The filter part of a filtered catch handler.
#[derive(Debug, Clone, PartialEq)]
pub struct AstFilterBlock {
    /// Variable receiving the exception, if the filter uses it
    pub exception_variable: Option<VariableId>,
    /// The filter code, ending in `endfilter`
    pub body: AstBlock,
}
