//! Named variables of the reconstructed tree.
//!
//! Every value that lived on the operand stack, in a local slot or in a parameter ends up
//! as a [`Variable`] in the method's [`VariableTable`]. Tree nodes refer to them by
//! [`VariableId`], so the table is the single owner and ids stay valid for the lifetime
//! of the [`crate::ast::MethodAst`].

use std::{fmt, ops::Index};

use bitflags::bitflags;

use crate::metadata::refs::TypeRefRc;

bitflags! {
    /// Properties of a variable.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct VariableFlags: u8 {
        /// A method parameter (including `this`)
        const PARAMETER = 0x01;
        /// The implicit `this` parameter
        const THIS = 0x02;
        /// Bound to a pinned local slot
        const PINNED = 0x04;
        /// Synthesized by the engine rather than declared in the method
        const GENERATED = 0x08;
        /// Holds a managed pointer (`this` of a value type)
        const BY_REF = 0x10;
    }
}

/// Where a variable came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableOrigin {
    /// Split from or equal to a declared local slot
    Local(u16),
    /// A declared parameter, by position excluding `this`
    Parameter(u16),
    /// The implicit `this` parameter
    This,
    /// A stack temporary or other synthetic variable
    Generated,
}

/// Index of a variable in its [`VariableTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VariableId(pub usize);

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A variable of the reconstructed method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    /// Display name, unique within the method for engine-generated names
    pub name: String,
    /// Name of the source variable this one was derived from, if any
    pub original_name: Option<String>,
    /// What the variable was derived from
    pub origin: VariableOrigin,
    /// Variable properties
    pub flags: VariableFlags,
    /// Declared type, if known; resolved by later pipeline stages otherwise
    pub ty: Option<TypeRefRc>,
}

impl Variable {
    /// Creates a synthetic variable.
    #[must_use]
    pub fn generated(name: impl Into<String>, original_name: Option<String>) -> Self {
        Variable {
            name: name.into(),
            original_name,
            origin: VariableOrigin::Generated,
            flags: VariableFlags::GENERATED,
            ty: None,
        }
    }

    /// Creates a variable bound to a declared local slot.
    #[must_use]
    pub fn local(name: impl Into<String>, index: u16, pinned: bool, ty: Option<TypeRefRc>) -> Self {
        let name = name.into();
        Variable {
            original_name: Some(name.clone()),
            name,
            origin: VariableOrigin::Local(index),
            flags: if pinned {
                VariableFlags::PINNED
            } else {
                VariableFlags::empty()
            },
            ty,
        }
    }

    /// Creates a parameter variable.
    #[must_use]
    pub fn parameter(name: impl Into<String>, index: u16, ty: Option<TypeRefRc>) -> Self {
        let name = name.into();
        Variable {
            original_name: Some(name.clone()),
            name,
            origin: VariableOrigin::Parameter(index),
            flags: VariableFlags::PARAMETER,
            ty,
        }
    }

    /// Creates the `this` parameter.
    #[must_use]
    pub fn this(ty: Option<TypeRefRc>) -> Self {
        let by_ref = ty.as_ref().is_some_and(|t| t.is_value_type);
        let mut flags = VariableFlags::PARAMETER | VariableFlags::THIS;
        flags.set(VariableFlags::BY_REF, by_ref);
        Variable {
            name: "this".to_string(),
            original_name: Some("this".to_string()),
            origin: VariableOrigin::This,
            flags,
            ty,
        }
    }

    /// Returns `true` for parameters, `this` included.
    #[must_use]
    pub fn is_parameter(&self) -> bool {
        self.flags.contains(VariableFlags::PARAMETER)
    }

    /// Returns `true` for the `this` parameter.
    #[must_use]
    pub fn is_this(&self) -> bool {
        self.flags.contains(VariableFlags::THIS)
    }

    /// Returns `true` for variables synthesized by the engine.
    #[must_use]
    pub fn is_generated(&self) -> bool {
        self.flags.contains(VariableFlags::GENERATED)
    }

    /// Returns `true` for variables bound to a pinned local.
    #[must_use]
    pub fn is_pinned(&self) -> bool {
        self.flags.contains(VariableFlags::PINNED)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Owner of all variables of one method.
#[derive(Debug, Clone, Default)]
pub struct VariableTable {
    variables: Vec<Variable>,
}

impl VariableTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a variable and returns its id.
    pub fn add(&mut self, variable: Variable) -> VariableId {
        self.variables.push(variable);
        VariableId(self.variables.len() - 1)
    }

    /// Looks up a variable.
    #[must_use]
    pub fn get(&self, id: VariableId) -> Option<&Variable> {
        self.variables.get(id.0)
    }

    /// Mutable lookup.
    pub fn get_mut(&mut self, id: VariableId) -> Option<&mut Variable> {
        self.variables.get_mut(id.0)
    }

    /// Finds the first variable with the given name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<VariableId> {
        self.variables
            .iter()
            .position(|v| v.name == name)
            .map(VariableId)
    }

    /// Iterates over `(id, variable)` pairs in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (VariableId, &Variable)> {
        self.variables
            .iter()
            .enumerate()
            .map(|(i, v)| (VariableId(i), v))
    }

    /// Number of variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Returns `true` if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

impl Index<VariableId> for VariableTable {
    type Output = Variable;

    fn index(&self, id: VariableId) -> &Variable {
        &self.variables[id.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{refs::TypeRef, token::Token};
    use std::sync::Arc;

    #[test]
    fn test_table() {
        let mut table = VariableTable::new();
        let a = table.add(Variable::generated("arg_00_0", None));
        let b = table.add(Variable::local("count", 0, false, None));

        assert_eq!(table.len(), 2);
        assert_eq!(table[a].name, "arg_00_0");
        assert!(table[a].is_generated());
        assert_eq!(table.find("count"), Some(b));
        assert_eq!(table.find("missing"), None);
        assert_eq!(table.iter().map(|(id, _)| id).collect::<Vec<_>>(), vec![a, b]);
    }

    #[test]
    fn test_this_flags() {
        let point = Arc::new(TypeRef::value_type(Token(0x02000001), "Point"));
        let this = Variable::this(Some(point));
        assert!(this.is_this());
        assert!(this.is_parameter());
        assert!(this.flags.contains(VariableFlags::BY_REF));

        let object = Arc::new(TypeRef::new(Token(0x01000001), "System.Object"));
        let this = Variable::this(Some(object));
        assert!(!this.flags.contains(VariableFlags::BY_REF));
    }

    #[test]
    fn test_pinned_local() {
        let v = Variable::local("buffer", 2, true, None);
        assert!(v.is_pinned());
        assert_eq!(v.origin, VariableOrigin::Local(2));
        assert!(!v.is_parameter());
    }
}
