//! The reconstruction result for one method.

use crate::ast::{AstBlock, VariableId, VariableTable};

/// A method body reconstructed as a tree.
///
/// `variables` owns every variable the tree references: parameters, split or shared
/// locals, and engine-generated temporaries. Variables are tagged with their declared type
/// where one is known; everything else is left for later type resolution.
#[derive(Debug, Clone)]
pub struct MethodAst {
    /// Method identity, as given by the method body
    pub name: String,
    /// The reconstructed body
    pub body: AstBlock,
    /// All variables referenced from `body`
    pub variables: VariableTable,
    /// Declared parameters in signature order, excluding `this`
    pub parameters: Vec<VariableId>,
    /// The implicit `this` parameter of instance methods
    pub this_parameter: Option<VariableId>,
}

impl MethodAst {
    /// Creates an empty result for a method without instructions.
    #[must_use]
    pub fn empty(name: impl Into<String>) -> Self {
        MethodAst {
            name: name.into(),
            body: AstBlock::default(),
            variables: VariableTable::new(),
            parameters: Vec::new(),
            this_parameter: None,
        }
    }

    /// Looks up a variable name, for diagnostics and tests.
    #[must_use]
    pub fn variable_name(&self, id: VariableId) -> Option<&str> {
        self.variables.get(id).map(|v| v.name.as_str())
    }
}
