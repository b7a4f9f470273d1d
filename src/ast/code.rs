//! Canonical opcodes of the expression tree.
//!
//! [`AstCode`] is the closed set of operations the tree uses: every raw [`OpCode`] that is
//! not a short/macro form or a prefix maps to exactly one [`AstCode`] of the same name,
//! plus the synthetic [`AstCode::Ldexception`]. The stack arithmetic and control flow
//! classification live here as exhaustive matches, so adding an opcode forces every
//! table to be revisited.

use std::fmt;

use crate::{assembly::OpCode, metadata::refs::TypeRefRc};

macro_rules! define_ast_codes {
    (
        direct { $($direct:ident,)* }
        synthetic { $($synthetic:ident => $mnemonic:literal,)* }
    ) => {
        /// A canonical tree opcode.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum AstCode {
            $(
                #[doc = concat!("Canonical form of [`OpCode::", stringify!($direct), "`]")]
                $direct,
            )*
            $(
                #[doc = concat!("`", $mnemonic, "`")]
                $synthetic,
            )*
        }

        impl AstCode {
            /// Returns the textual mnemonic, e.g. `"ldloc"`.
            #[must_use]
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $(AstCode::$direct => OpCode::$direct.mnemonic(),)*
                    $(AstCode::$synthetic => $mnemonic,)*
                }
            }

            /// Maps a raw opcode onto the canonical code of the same name.
            ///
            /// Returns `None` for short/macro forms and prefixes, which need operand
            /// rewriting or merging before they have a canonical code.
            #[must_use]
            pub const fn from_direct(op: OpCode) -> Option<AstCode> {
                match op {
                    $(OpCode::$direct => Some(AstCode::$direct),)*
                    _ => None,
                }
            }
        }
    };
}

define_ast_codes! {
    direct {
        Nop, Break, Ldarg, Ldarga, Starg, Ldloc, Ldloca, Stloc, Ldnull,
        LdcI4, LdcI8, LdcR4, LdcR8, Dup, Pop, Jmp, Call, Calli, Ret,
        Br, Brfalse, Brtrue, Beq, Bge, Bgt, Ble, Blt, BneUn, BgeUn, BgtUn, BleUn, BltUn,
        Switch, LdindRef, StindRef,
        Add, Sub, Mul, Div, DivUn, Rem, RemUn, And, Or, Xor, Shl, Shr, ShrUn, Neg, Not,
        ConvI1, ConvI2, ConvI4, ConvI8, ConvR4, ConvR8, ConvU4, ConvU8, ConvRUn,
        Callvirt, Cpobj, Ldobj, Ldstr, Newobj, Castclass, Isinst, Unbox, Throw,
        Ldfld, Ldflda, Stfld, Ldsfld, Ldsflda, Stsfld, Stobj,
        ConvOvfI1Un, ConvOvfI2Un, ConvOvfI4Un, ConvOvfI8Un,
        ConvOvfU1Un, ConvOvfU2Un, ConvOvfU4Un, ConvOvfU8Un, ConvOvfIUn, ConvOvfUUn,
        Box, Newarr, Ldlen, Ldelema,
        LdelemI1, LdelemU1, LdelemI2, LdelemU2, LdelemI4, LdelemU4, LdelemI8, LdelemI,
        LdelemR4, LdelemR8, LdelemRef,
        StelemI, StelemI1, StelemI2, StelemI4, StelemI8, StelemR4, StelemR8, StelemRef,
        Ldelem, Stelem, UnboxAny,
        ConvOvfI1, ConvOvfU1, ConvOvfI2, ConvOvfU2, ConvOvfI4, ConvOvfU4, ConvOvfI8, ConvOvfU8,
        Refanyval, Ckfinite, Mkrefany, Ldtoken,
        ConvU2, ConvU1, ConvI, ConvOvfI, ConvOvfU,
        AddOvf, AddOvfUn, MulOvf, MulOvfUn, SubOvf, SubOvfUn,
        Endfinally, Leave, ConvU,
        Arglist, Ceq, Cgt, CgtUn, Clt, CltUn, Ldftn, Ldvirtftn,
        Localloc, Endfilter, Initobj, Cpblk, Initblk, Rethrow, Sizeof, Refanytype,
    }
    synthetic {
        Ldexception => "ldexception",
    }
}

/// How many stack items an instruction consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PopCount {
    /// A fixed number of items
    Fixed(u16),
    /// The entire stack, whatever its depth (`leave`, `endfinally`)
    All,
}

impl PopCount {
    /// Resolves the count against the current stack depth.
    #[must_use]
    pub fn resolve(self, depth: usize) -> usize {
        match self {
            PopCount::Fixed(n) => usize::from(n),
            PopCount::All => depth,
        }
    }
}

impl fmt::Display for PopCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PopCount::Fixed(n) => write!(f, "{n}"),
            PopCount::All => f.write_str("*"),
        }
    }
}

impl AstCode {
    /// Stack behaviour that depends only on the opcode, as `(pops, pushes)`.
    ///
    /// Returns `None` for calls and `ret`, whose behaviour depends on a signature.
    #[must_use]
    pub const fn fixed_stack_effect(self) -> Option<(PopCount, u16)> {
        use AstCode::*;
        let effect = match self {
            Call | Callvirt | Calli | Newobj | Ret => return None,

            Nop | Break | Jmp | Br | Rethrow => (PopCount::Fixed(0), 0),
            Leave | Endfinally => (PopCount::All, 0),

            Ldarg | Ldarga | Ldloc | Ldloca | Ldnull | LdcI4 | LdcI8 | LdcR4 | LdcR8 | Ldstr
            | Ldsfld | Ldsflda | Ldtoken | Ldftn | Arglist | Sizeof | Ldexception => {
                (PopCount::Fixed(0), 1)
            }

            Starg | Stloc | Pop | Brfalse | Brtrue | Switch | Throw | Stsfld | Initobj
            | Endfilter => (PopCount::Fixed(1), 0),

            Dup => (PopCount::Fixed(1), 2),

            Beq | Bge | Bgt | Ble | Blt | BneUn | BgeUn | BgtUn | BleUn | BltUn | StindRef
            | Stobj | Stfld | Cpobj => (PopCount::Fixed(2), 0),

            StelemI | StelemI1 | StelemI2 | StelemI4 | StelemI8 | StelemR4 | StelemR8
            | StelemRef | Stelem | Cpblk | Initblk => (PopCount::Fixed(3), 0),

            Add | Sub | Mul | Div | DivUn | Rem | RemUn | And | Or | Xor | Shl | Shr | ShrUn
            | AddOvf | AddOvfUn | MulOvf | MulOvfUn | SubOvf | SubOvfUn | Ceq | Cgt | CgtUn
            | Clt | CltUn | Ldelema | LdelemI1 | LdelemU1 | LdelemI2 | LdelemU2 | LdelemI4
            | LdelemU4 | LdelemI8 | LdelemI | LdelemR4 | LdelemR8 | LdelemRef | Ldelem => {
                (PopCount::Fixed(2), 1)
            }

            Neg | Not | ConvI1 | ConvI2 | ConvI4 | ConvI8 | ConvR4 | ConvR8 | ConvU4 | ConvU8
            | ConvRUn | ConvU2 | ConvU1 | ConvI | ConvU | ConvOvfI | ConvOvfU | ConvOvfI1Un
            | ConvOvfI2Un | ConvOvfI4Un | ConvOvfI8Un | ConvOvfU1Un | ConvOvfU2Un
            | ConvOvfU4Un | ConvOvfU8Un | ConvOvfIUn | ConvOvfUUn | ConvOvfI1 | ConvOvfU1
            | ConvOvfI2 | ConvOvfU2 | ConvOvfI4 | ConvOvfU4 | ConvOvfI8 | ConvOvfU8 | Ckfinite
            | LdindRef | Ldobj | Castclass | Isinst | Unbox | UnboxAny | Box | Ldfld | Ldflda
            | Newarr | Ldlen | Refanyval | Refanytype | Mkrefany | Localloc | Ldvirtftn => {
                (PopCount::Fixed(1), 1)
            }
        };
        Some(effect)
    }

    /// Returns `true` if control never falls through to the next instruction.
    #[must_use]
    pub const fn is_unconditional_control_flow(self) -> bool {
        matches!(
            self,
            AstCode::Br
                | AstCode::Leave
                | AstCode::Ret
                | AstCode::Endfilter
                | AstCode::Endfinally
                | AstCode::Throw
                | AstCode::Rethrow
                | AstCode::Jmp
        )
    }

    /// Returns `true` for branches that may or may not be taken.
    #[must_use]
    pub const fn is_conditional_control_flow(self) -> bool {
        matches!(
            self,
            AstCode::Brtrue
                | AstCode::Brfalse
                | AstCode::Beq
                | AstCode::Bge
                | AstCode::Bgt
                | AstCode::Ble
                | AstCode::Blt
                | AstCode::BneUn
                | AstCode::BgeUn
                | AstCode::BgtUn
                | AstCode::BleUn
                | AstCode::BltUn
                | AstCode::Switch
        )
    }
}

impl fmt::Display for AstCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Primitive element type carried by `ldobj`/`stobj` expanded from `ldind.<T>`/`stind.<T>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum ElementType {
    /// `int8`
    I1,
    /// `uint8`
    U1,
    /// `int16`
    I2,
    /// `uint16`
    U2,
    /// `int32`
    I4,
    /// `uint32`
    U4,
    /// `int64`
    I8,
    /// native int
    I,
    /// `float32`
    R4,
    /// `float64`
    R8,
}

/// A prefix instruction merged into the expression it modifies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AstPrefix {
    /// `unaligned.` with the given alignment
    Unaligned(u8),
    /// `volatile.`
    Volatile,
    /// `tail.`
    Tail,
    /// `constrained.` with the constraining type
    Constrained(TypeRefRc),
    /// `readonly.`
    Readonly,
    /// `no.` with the skipped-check flags
    No(u8),
}

impl fmt::Display for AstPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AstPrefix::Unaligned(a) => write!(f, "unaligned. {a}"),
            AstPrefix::Volatile => f.write_str("volatile."),
            AstPrefix::Tail => f.write_str("tail."),
            AstPrefix::Constrained(ty) => write!(f, "constrained. {ty}"),
            AstPrefix::Readonly => f.write_str("readonly."),
            AstPrefix::No(flags) => write!(f, "no. {flags}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_direct_mapping() {
        assert_eq!(AstCode::from_direct(OpCode::Add), Some(AstCode::Add));
        assert_eq!(AstCode::from_direct(OpCode::Ldloc), Some(AstCode::Ldloc));
        assert_eq!(AstCode::from_direct(OpCode::LdlocS), None);
        assert_eq!(AstCode::from_direct(OpCode::Volatile), None);
        assert_eq!(AstCode::ConvOvfI1Un.to_string(), "conv.ovf.i1.un");
        assert_eq!(AstCode::Ldexception.to_string(), "ldexception");
    }

    #[test]
    fn test_every_raw_opcode_has_a_home() {
        let unmapped = OpCode::ALL
            .iter()
            .filter(|op| AstCode::from_direct(**op).is_none())
            .count();
        let prefixes = OpCode::ALL.iter().filter(|op| op.is_prefix()).count();
        // ldarg.N, ldloc.N, stloc.N, short var forms, ldc.i4.N, ldc.i4.s,
        // short branches, leave.s, ldind.<T>, stind.<T>
        assert_eq!(unmapped - prefixes, 4 + 4 + 4 + 6 + 10 + 1 + 13 + 1 + 10 + 7);
    }

    #[test]
    fn test_stack_effects() {
        assert_eq!(AstCode::Add.fixed_stack_effect(), Some((PopCount::Fixed(2), 1)));
        assert_eq!(AstCode::Dup.fixed_stack_effect(), Some((PopCount::Fixed(1), 2)));
        assert_eq!(AstCode::Leave.fixed_stack_effect(), Some((PopCount::All, 0)));
        assert_eq!(AstCode::StelemRef.fixed_stack_effect(), Some((PopCount::Fixed(3), 0)));
        assert_eq!(AstCode::Call.fixed_stack_effect(), None);
        assert_eq!(PopCount::All.resolve(3), 3);
        assert_eq!(PopCount::Fixed(1).resolve(3), 1);
    }

    #[test]
    fn test_control_flow_classes() {
        assert!(AstCode::Br.is_unconditional_control_flow());
        assert!(AstCode::Rethrow.is_unconditional_control_flow());
        assert!(!AstCode::Brtrue.is_unconditional_control_flow());
        assert!(AstCode::Switch.is_conditional_control_flow());
        assert!(!AstCode::Call.is_conditional_control_flow());
    }

    #[test]
    fn test_element_type_names() {
        let names: Vec<String> = ElementType::iter().map(|e| e.to_string()).collect();
        assert_eq!(names, ["i1", "u1", "i2", "u2", "i4", "u4", "i8", "i", "r4", "r8"]);
    }
}
