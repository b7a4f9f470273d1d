//! Resolved member references carried by instruction operands.
//!
//! The reconstruction engine treats these as opaque payloads: it copies them into the
//! emitted tree untouched and only reads the few signature facts it needs for stack
//! arithmetic (`param_count`, `has_this`, `returns_value`).

use std::{fmt, sync::Arc};

use crate::metadata::token::Token;

/// A reference-counted pointer to a [`TypeRef`]
pub type TypeRefRc = Arc<TypeRef>;

/// A reference-counted pointer to a [`FieldRef`]
pub type FieldRefRc = Arc<FieldRef>;

/// A reference-counted pointer to a [`MethodRef`]
pub type MethodRefRc = Arc<MethodRef>;

/// A resolved type reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef {
    /// Token the reference was resolved from
    pub token: Token,
    /// Fully qualified type name
    pub name: String,
    /// Whether the type is a value type (affects how `this` is passed)
    pub is_value_type: bool,
}

impl TypeRef {
    /// Creates a reference type.
    #[must_use]
    pub fn new(token: Token, name: impl Into<String>) -> Self {
        TypeRef {
            token,
            name: name.into(),
            is_value_type: false,
        }
    }

    /// Creates a value type.
    #[must_use]
    pub fn value_type(token: Token, name: impl Into<String>) -> Self {
        TypeRef {
            token,
            name: name.into(),
            is_value_type: true,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A resolved field reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    /// Token the reference was resolved from
    pub token: Token,
    /// Field name
    pub name: String,
    /// Type declaring the field, if known
    pub declaring_type: Option<TypeRefRc>,
    /// Whether the field is static
    pub is_static: bool,
}

impl FieldRef {
    /// Creates an instance field reference.
    #[must_use]
    pub fn new(token: Token, name: impl Into<String>) -> Self {
        FieldRef {
            token,
            name: name.into(),
            declaring_type: None,
            is_static: false,
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.declaring_type {
            Some(owner) => write!(f, "{}::{}", owner.name, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// A resolved method reference or stand-alone call signature.
///
/// For `calli` the resolver returns the call-site signature through this same type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRef {
    /// Token the reference was resolved from
    pub token: Token,
    /// Method name
    pub name: String,
    /// Type declaring the method, if known
    pub declaring_type: Option<TypeRefRc>,
    /// Number of declared parameters, not counting `this`
    pub param_count: u16,
    /// Whether the signature has an implicit `this`
    pub has_this: bool,
    /// Whether the return type is something other than `void`
    pub returns_value: bool,
}

impl MethodRef {
    /// Creates a method reference.
    #[must_use]
    pub fn new(
        token: Token,
        name: impl Into<String>,
        param_count: u16,
        has_this: bool,
        returns_value: bool,
    ) -> Self {
        MethodRef {
            token,
            name: name.into(),
            declaring_type: None,
            param_count,
            has_this,
            returns_value,
        }
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.declaring_type {
            Some(owner) => write!(f, "{}::{}", owner.name, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// A resolved `ldtoken` operand, which may denote any kind of member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberRef {
    /// A type handle
    Type(TypeRefRc),
    /// A field handle
    Field(FieldRefRc),
    /// A method handle
    Method(MethodRefRc),
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberRef::Type(t) => write!(f, "{t}"),
            MemberRef::Field(fr) => write!(f, "{fr}"),
            MemberRef::Method(m) => write!(f, "{m}"),
        }
    }
}
