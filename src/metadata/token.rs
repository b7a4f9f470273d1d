//! Metadata tokens as they appear in CIL operands.
//!
//! A token is the raw 32-bit reference an instruction carries for a field, method, type,
//! signature or user string. The engine never interprets what a token points at; it only
//! inspects the table byte to decide which resolver entry point to call for `ldtoken`.

use std::fmt;

/// A metadata token representing a reference to a metadata table entry.
///
/// Tokens in .NET metadata consist of a 32-bit value where:
/// - The high byte (bits 24-31) indicates the table type
/// - The low 24 bits (bits 0-23) indicate the row index within that table
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(pub u32);

impl Token {
    /// `TypeRef` table
    pub const TABLE_TYPEREF: u8 = 0x01;
    /// `TypeDef` table
    pub const TABLE_TYPEDEF: u8 = 0x02;
    /// `Field` table
    pub const TABLE_FIELD: u8 = 0x04;
    /// `MethodDef` table
    pub const TABLE_METHODDEF: u8 = 0x06;
    /// `MemberRef` table
    pub const TABLE_MEMBERREF: u8 = 0x0A;
    /// `StandAloneSig` table
    pub const TABLE_STANDALONESIG: u8 = 0x11;
    /// `TypeSpec` table
    pub const TABLE_TYPESPEC: u8 = 0x1B;
    /// `MethodSpec` table
    pub const TABLE_METHODSPEC: u8 = 0x2B;
    /// User string heap
    pub const TABLE_USERSTRING: u8 = 0x70;

    /// Creates a new token from a raw 32-bit value
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Token(value)
    }

    /// Creates a token from a table id and a row index.
    #[must_use]
    pub const fn from_parts(table: u8, row: u32) -> Self {
        Token(((table as u32) << 24) | (row & 0x00FF_FFFF))
    }

    /// Returns the raw token value
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }

    /// Extracts the table type from the token (high byte)
    #[must_use]
    pub const fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Extracts the row index from the token (low 24 bits)
    #[must_use]
    pub const fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns true if this is a null token (value 0)
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Returns true if this token lives in a table describing a field.
    #[must_use]
    pub const fn is_field(&self) -> bool {
        self.table() == Self::TABLE_FIELD
    }

    /// Returns true if this token lives in a table describing a method.
    ///
    /// `MemberRef` rows can describe either fields or methods; they are treated as
    /// methods here, which is what `ldtoken` on a `MemberRef` means in practice.
    #[must_use]
    pub const fn is_method(&self) -> bool {
        matches!(
            self.table(),
            Self::TABLE_METHODDEF | Self::TABLE_MEMBERREF | Self::TABLE_METHODSPEC
        )
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_parts() {
        let token = Token::from_parts(Token::TABLE_METHODDEF, 1);
        assert_eq!(token.value(), 0x06000001);
        assert_eq!(token.table(), 0x06);
        assert_eq!(token.row(), 1);
        assert!(!token.is_null());
    }

    #[test]
    fn test_token_kind() {
        assert!(Token(0x04000003).is_field());
        assert!(Token(0x06000001).is_method());
        assert!(Token(0x0A000010).is_method());
        assert!(Token(0x2B000002).is_method());
        assert!(!Token(0x02000005).is_method());
        assert!(!Token(0x02000005).is_field());
    }

    #[test]
    fn test_token_display() {
        assert_eq!(format!("{}", Token(0x06000001)), "0x06000001");
        let debug_str = format!("{:?}", Token(0x06000001));
        assert!(debug_str.contains("table: 0x06"));
        assert!(debug_str.contains("row: 1"));
    }
}
