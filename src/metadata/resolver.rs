//! Operand resolution for field, method and type tokens.
//!
//! The reconstruction engine receives raw tokens from the method body provider and turns
//! them into [`TypeRef`], [`FieldRef`] and [`MethodRef`] payloads through an
//! [`OperandResolver`]. Two implementations are provided:
//!
//! - [`ReferenceTable`] - a plain lookup table, filled up front by the caller
//! - [`ReferenceCache`] - a memoizing wrapper around any resolver, safe to share between
//!   threads that reconstruct different methods at the same time
//!
//! # Thread Safety
//!
//! [`OperandResolver`] requires `Send + Sync`; the resolver is the only state shared
//! between concurrent method reconstructions.

use std::{collections::HashMap, sync::Arc};

use dashmap::DashMap;

use crate::{
    metadata::{
        refs::{FieldRef, FieldRefRc, MemberRef, MethodRef, MethodRefRc, TypeRef, TypeRefRc},
        token::Token,
    },
    Error, Result,
};

/// Turns raw metadata tokens into resolved reference payloads.
pub trait OperandResolver: Send + Sync {
    /// Resolves a type token (`TypeDef`, `TypeRef`, `TypeSpec`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnresolvedToken`] if the token is unknown.
    fn resolve_type(&self, token: Token) -> Result<TypeRefRc>;

    /// Resolves a field token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnresolvedToken`] if the token is unknown.
    fn resolve_field(&self, token: Token) -> Result<FieldRefRc>;

    /// Resolves a method token, or a stand-alone signature token for `calli`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnresolvedToken`] if the token is unknown.
    fn resolve_method(&self, token: Token) -> Result<MethodRefRc>;

    /// Resolves an `ldtoken` operand by dispatching on the token's table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnresolvedToken`] if the token is unknown.
    fn resolve_member(&self, token: Token) -> Result<MemberRef> {
        if token.is_field() {
            Ok(MemberRef::Field(self.resolve_field(token)?))
        } else if token.is_method() {
            Ok(MemberRef::Method(self.resolve_method(token)?))
        } else {
            Ok(MemberRef::Type(self.resolve_type(token)?))
        }
    }
}

impl<R: OperandResolver + ?Sized> OperandResolver for &R {
    fn resolve_type(&self, token: Token) -> Result<TypeRefRc> {
        (**self).resolve_type(token)
    }

    fn resolve_field(&self, token: Token) -> Result<FieldRefRc> {
        (**self).resolve_field(token)
    }

    fn resolve_method(&self, token: Token) -> Result<MethodRefRc> {
        (**self).resolve_method(token)
    }
}

/// A resolver backed by explicit lookup tables.
///
/// # Examples
///
/// ```rust
/// use cilast::metadata::{
///     refs::MethodRef, resolver::{OperandResolver, ReferenceTable}, token::Token,
/// };
///
/// let mut table = ReferenceTable::new();
/// let token = Token(0x0A000001);
/// table.add_method(MethodRef::new(token, "WriteLine", 1, false, false));
///
/// assert_eq!(table.resolve_method(token)?.param_count, 1);
/// assert!(table.resolve_method(Token(0x0A000002)).is_err());
/// # Ok::<(), cilast::Error>(())
/// ```
#[derive(Debug, Default, Clone)]
pub struct ReferenceTable {
    types: HashMap<Token, TypeRefRc>,
    fields: HashMap<Token, FieldRefRc>,
    methods: HashMap<Token, MethodRefRc>,
}

impl ReferenceTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a type and returns the shared reference.
    pub fn add_type(&mut self, ty: TypeRef) -> TypeRefRc {
        let rc = Arc::new(ty);
        self.types.insert(rc.token, rc.clone());
        rc
    }

    /// Registers a field and returns the shared reference.
    pub fn add_field(&mut self, field: FieldRef) -> FieldRefRc {
        let rc = Arc::new(field);
        self.fields.insert(rc.token, rc.clone());
        rc
    }

    /// Registers a method and returns the shared reference.
    pub fn add_method(&mut self, method: MethodRef) -> MethodRefRc {
        let rc = Arc::new(method);
        self.methods.insert(rc.token, rc.clone());
        rc
    }

    /// Total number of registered references.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len() + self.fields.len() + self.methods.len()
    }

    /// Returns `true` if nothing has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OperandResolver for ReferenceTable {
    fn resolve_type(&self, token: Token) -> Result<TypeRefRc> {
        self.types
            .get(&token)
            .cloned()
            .ok_or(Error::UnresolvedToken(token))
    }

    fn resolve_field(&self, token: Token) -> Result<FieldRefRc> {
        self.fields
            .get(&token)
            .cloned()
            .ok_or(Error::UnresolvedToken(token))
    }

    fn resolve_method(&self, token: Token) -> Result<MethodRefRc> {
        self.methods
            .get(&token)
            .cloned()
            .ok_or(Error::UnresolvedToken(token))
    }
}

/// A memoizing resolver that can be shared by concurrent method reconstructions.
///
/// Each token is resolved through the wrapped resolver at most once per kind (modulo
/// races, where two threads may both resolve before one result wins); later lookups
/// hand out the cached `Arc`. Failed lookups are not cached.
pub struct ReferenceCache<R: OperandResolver> {
    inner: R,
    types: DashMap<Token, TypeRefRc>,
    fields: DashMap<Token, FieldRefRc>,
    methods: DashMap<Token, MethodRefRc>,
}

impl<R: OperandResolver> ReferenceCache<R> {
    /// Wraps a resolver.
    pub fn new(inner: R) -> Self {
        ReferenceCache {
            inner,
            types: DashMap::new(),
            fields: DashMap::new(),
            methods: DashMap::new(),
        }
    }

    /// Number of cached entries across all kinds.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.types.len() + self.fields.len() + self.methods.len()
    }

    /// Returns the wrapped resolver.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: OperandResolver> OperandResolver for ReferenceCache<R> {
    fn resolve_type(&self, token: Token) -> Result<TypeRefRc> {
        if let Some(hit) = self.types.get(&token) {
            return Ok(hit.value().clone());
        }
        let resolved = self.inner.resolve_type(token)?;
        Ok(self.types.entry(token).or_insert(resolved).value().clone())
    }

    fn resolve_field(&self, token: Token) -> Result<FieldRefRc> {
        if let Some(hit) = self.fields.get(&token) {
            return Ok(hit.value().clone());
        }
        let resolved = self.inner.resolve_field(token)?;
        Ok(self.fields.entry(token).or_insert(resolved).value().clone())
    }

    fn resolve_method(&self, token: Token) -> Result<MethodRefRc> {
        if let Some(hit) = self.methods.get(&token) {
            return Ok(hit.value().clone());
        }
        let resolved = self.inner.resolve_method(token)?;
        Ok(self.methods.entry(token).or_insert(resolved).value().clone())
    }
}
