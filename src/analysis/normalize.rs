//! Instruction stream normalization.
//!
//! Rewrites the raw instruction list of a method body into canonical form, one entry per
//! semantic operation:
//!
//! - short and macro forms get their implicit operand made explicit (`ldloc.2` becomes
//!   `ldloc 2`, `ldc.i4.m1` becomes `ldc.i4 -1`, `brtrue.s` becomes `brtrue`)
//! - `ldind.<T>` / `stind.<T>` become `ldobj` / `stobj` with a primitive type operand
//! - prefixes are merged into the instruction they modify, which then starts at the
//!   offset of its first prefix
//! - metadata tokens are resolved through the [`OperandResolver`]
//! - the stack effect (`pop`, `push`) is computed, using call signatures where needed
//!
//! The pass is total and order-preserving; it contains no control flow reasoning.

use std::fmt;

use crate::{
    assembly::{Immediate, Instruction, OpCode, Operand, SourceLocation},
    ast::{AstCode, AstPrefix, ElementType, PopCount},
    metadata::{
        method::MethodBody,
        refs::{FieldRefRc, MemberRef, MethodRefRc, TypeRefRc},
        resolver::OperandResolver,
    },
    Error, Result,
};

/// The operand of a canonical instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedOperand {
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
    /// Branch target offset
    Target(u32),
    /// Jump table offsets
    Targets(Vec<u32>),
    /// Local slot index
    Local(u16),
    /// Argument index, `this` being 0 on instance methods
    Argument(u16),
    /// Resolved field
    Field(FieldRefRc),
    /// Resolved method or call-site signature
    Method(MethodRefRc),
    /// Resolved type
    Type(TypeRefRc),
    /// Resolved `ldtoken` member
    Member(MemberRef),
    /// Primitive type of an expanded `ldind`/`stind`
    Primitive(ElementType),
}

impl NormalizedOperand {
    /// Branch targets carried by this operand.
    #[must_use]
    pub fn targets(&self) -> &[u32] {
        match self {
            NormalizedOperand::Target(t) => std::slice::from_ref(t),
            NormalizedOperand::Targets(ts) => ts,
            _ => &[],
        }
    }
}

impl fmt::Display for NormalizedOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizedOperand::None => Ok(()),
            NormalizedOperand::Int32(v) => write!(f, "{v}"),
            NormalizedOperand::Int64(v) => write!(f, "{v}"),
            NormalizedOperand::Float32(v) => write!(f, "{v}"),
            NormalizedOperand::Float64(v) => write!(f, "{v}"),
            NormalizedOperand::String(s) => write!(f, "{s:?}"),
            NormalizedOperand::Target(t) => write!(f, "IL_{t:02X}"),
            NormalizedOperand::Targets(ts) => {
                let names: Vec<String> = ts.iter().map(|t| format!("IL_{t:02X}")).collect();
                write!(f, "({})", names.join(", "))
            }
            NormalizedOperand::Local(i) => write!(f, "V_{i}"),
            NormalizedOperand::Argument(i) => write!(f, "A_{i}"),
            NormalizedOperand::Field(fr) => write!(f, "{fr}"),
            NormalizedOperand::Method(m) => write!(f, "{m}"),
            NormalizedOperand::Type(t) => write!(f, "{t}"),
            NormalizedOperand::Member(m) => write!(f, "{m}"),
            NormalizedOperand::Primitive(p) => write!(f, "{p}"),
        }
    }
}

/// One canonical instruction.
#[derive(Debug, Clone)]
pub struct NormalizedInstruction {
    /// Start offset, the first prefix's offset when prefixes were merged
    pub offset: u32,
    /// One past the last byte of the instruction
    pub end_offset: u32,
    /// Canonical opcode
    pub code: AstCode,
    /// Canonical operand
    pub operand: NormalizedOperand,
    /// Merged prefixes, in encounter order
    pub prefixes: Vec<AstPrefix>,
    /// Stack items consumed
    pub pop: PopCount,
    /// Stack items produced
    pub push: u16,
    /// Source location of the instruction itself
    pub location: Option<SourceLocation>,
}

impl fmt::Display for NormalizedInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL_{:02X}: ", self.offset)?;
        for prefix in &self.prefixes {
            write!(f, "{prefix} ")?;
        }
        write!(f, "{}", self.code)?;
        if self.operand != NormalizedOperand::None {
            write!(f, " {}", self.operand)?;
        }
        Ok(())
    }
}

/// Normalizes the instructions of `body`.
///
/// # Errors
///
/// Returns [`Error::InvalidOperand`] for operands that do not fit their opcode or a
/// trailing prefix with nothing to modify or a call whose pop count overflows, and
/// [`Error::UnresolvedOperand`] if the resolver does not know a token.
///
/// # Examples
///
/// ```rust
/// use cilast::{
///     analysis::{normalize, NormalizedOperand},
///     assembly::InstructionAssembler,
///     ast::AstCode,
///     metadata::{method::MethodBody, resolver::ReferenceTable},
/// };
///
/// let mut asm = InstructionAssembler::new();
/// asm.ldc_i4_const(3)?.stloc_0()?.ret()?;
/// let body = MethodBody::new("Sample::Run", asm.finish()?.instructions);
///
/// let normalized = normalize(&body, &ReferenceTable::new())?;
/// assert_eq!(normalized[0].code, AstCode::LdcI4);
/// assert_eq!(normalized[0].operand, NormalizedOperand::Int32(3));
/// assert_eq!(normalized[1].operand, NormalizedOperand::Local(0));
/// # Ok::<(), cilast::Error>(())
/// ```
pub fn normalize(
    body: &MethodBody,
    resolver: &impl OperandResolver,
) -> Result<Vec<NormalizedInstruction>> {
    let normalizer = Normalizer { body, resolver };
    let mut out = Vec::with_capacity(body.instructions.len());
    let mut prefixes = Vec::new();
    let mut prefix_start = None;

    for instr in &body.instructions {
        if instr.opcode.is_prefix() {
            prefix_start.get_or_insert(instr.offset);
            prefixes.push(normalizer.prefix(instr)?);
            continue;
        }

        let (code, operand) = normalizer.canonicalize(instr)?;
        let (pop, push) = normalizer.stack_effect(instr, code, &operand)?;
        out.push(NormalizedInstruction {
            offset: prefix_start.take().unwrap_or(instr.offset),
            end_offset: instr.end_offset(),
            code,
            operand,
            prefixes: std::mem::take(&mut prefixes),
            pop,
            push,
            location: instr.location.clone(),
        });
    }

    if let (Some(offset), Some(last)) = (prefix_start, body.instructions.last()) {
        return Err(normalizer.invalid(
            offset,
            last.opcode.mnemonic(),
            "prefix is not followed by an instruction",
        ));
    }
    Ok(out)
}

struct Normalizer<'a, R> {
    body: &'a MethodBody,
    resolver: &'a R,
}

impl<R: OperandResolver> Normalizer<'_, R> {
    fn invalid(&self, offset: u32, mnemonic: &'static str, message: impl Into<String>) -> Error {
        Error::InvalidOperand {
            method: self.body.name.clone(),
            offset,
            mnemonic,
            message: message.into(),
        }
    }

    /// Attaches the method and the instruction to a resolver failure.
    fn resolved<T>(&self, instr: &Instruction, result: Result<T>) -> Result<T> {
        result.map_err(|error| match error {
            Error::UnresolvedToken(token) => Error::UnresolvedOperand {
                method: self.body.name.clone(),
                offset: instr.offset,
                token,
            },
            other => other,
        })
    }

    fn operand_error(&self, instr: &Instruction) -> Error {
        self.invalid(
            instr.offset,
            instr.opcode.mnemonic(),
            format!("unexpected operand '{:?}'", instr.operand),
        )
    }

    fn index(&self, instr: &Instruction) -> Result<u16> {
        match instr.operand {
            Operand::Local(i) | Operand::Argument(i) => Ok(i),
            Operand::Immediate(Immediate::UInt8(i)) => Ok(u16::from(i)),
            _ => Err(self.operand_error(instr)),
        }
    }

    fn target(&self, instr: &Instruction) -> Result<NormalizedOperand> {
        match instr.operand {
            Operand::Target(t) => Ok(NormalizedOperand::Target(t)),
            _ => Err(self.operand_error(instr)),
        }
    }

    fn prefix(&self, instr: &Instruction) -> Result<AstPrefix> {
        let byte = || match instr.operand {
            Operand::Immediate(Immediate::UInt8(v)) => Ok(v),
            _ => Err(self.operand_error(instr)),
        };
        Ok(match instr.opcode {
            OpCode::Unaligned => AstPrefix::Unaligned(byte()?),
            OpCode::No => AstPrefix::No(byte()?),
            OpCode::Volatile => AstPrefix::Volatile,
            OpCode::Tail => AstPrefix::Tail,
            OpCode::Readonly => AstPrefix::Readonly,
            OpCode::Constrained => match instr.operand {
                Operand::Token(token) => {
                    let ty = self.resolver.resolve_type(token);
                    AstPrefix::Constrained(self.resolved(instr, ty)?)
                }
                _ => return Err(self.operand_error(instr)),
            },
            _ => return Err(malformed_error!("'{}' is not a prefix", instr.opcode)),
        })
    }

    fn canonicalize(&self, instr: &Instruction) -> Result<(AstCode, NormalizedOperand)> {
        use NormalizedOperand as N;

        let op = instr.opcode;
        let canonical = match op {
            OpCode::Ldarg0 => (AstCode::Ldarg, N::Argument(0)),
            OpCode::Ldarg1 => (AstCode::Ldarg, N::Argument(1)),
            OpCode::Ldarg2 => (AstCode::Ldarg, N::Argument(2)),
            OpCode::Ldarg3 => (AstCode::Ldarg, N::Argument(3)),
            OpCode::LdargS | OpCode::Ldarg => (AstCode::Ldarg, N::Argument(self.index(instr)?)),
            OpCode::LdargaS | OpCode::Ldarga => (AstCode::Ldarga, N::Argument(self.index(instr)?)),
            OpCode::StargS | OpCode::Starg => (AstCode::Starg, N::Argument(self.index(instr)?)),

            OpCode::Ldloc0 => (AstCode::Ldloc, N::Local(0)),
            OpCode::Ldloc1 => (AstCode::Ldloc, N::Local(1)),
            OpCode::Ldloc2 => (AstCode::Ldloc, N::Local(2)),
            OpCode::Ldloc3 => (AstCode::Ldloc, N::Local(3)),
            OpCode::Stloc0 => (AstCode::Stloc, N::Local(0)),
            OpCode::Stloc1 => (AstCode::Stloc, N::Local(1)),
            OpCode::Stloc2 => (AstCode::Stloc, N::Local(2)),
            OpCode::Stloc3 => (AstCode::Stloc, N::Local(3)),
            OpCode::LdlocS | OpCode::Ldloc => (AstCode::Ldloc, N::Local(self.index(instr)?)),
            OpCode::LdlocaS | OpCode::Ldloca => (AstCode::Ldloca, N::Local(self.index(instr)?)),
            OpCode::StlocS | OpCode::Stloc => (AstCode::Stloc, N::Local(self.index(instr)?)),

            OpCode::LdcI4M1 => (AstCode::LdcI4, N::Int32(-1)),
            OpCode::LdcI40 => (AstCode::LdcI4, N::Int32(0)),
            OpCode::LdcI41 => (AstCode::LdcI4, N::Int32(1)),
            OpCode::LdcI42 => (AstCode::LdcI4, N::Int32(2)),
            OpCode::LdcI43 => (AstCode::LdcI4, N::Int32(3)),
            OpCode::LdcI44 => (AstCode::LdcI4, N::Int32(4)),
            OpCode::LdcI45 => (AstCode::LdcI4, N::Int32(5)),
            OpCode::LdcI46 => (AstCode::LdcI4, N::Int32(6)),
            OpCode::LdcI47 => (AstCode::LdcI4, N::Int32(7)),
            OpCode::LdcI48 => (AstCode::LdcI4, N::Int32(8)),
            OpCode::LdcI4S | OpCode::LdcI4 => match instr.operand {
                Operand::Immediate(imm) => match imm.as_i32() {
                    Some(v) => (AstCode::LdcI4, N::Int32(v)),
                    None => return Err(self.operand_error(instr)),
                },
                _ => return Err(self.operand_error(instr)),
            },
            OpCode::LdcI8 => match instr.operand {
                Operand::Immediate(Immediate::Int64(v)) => (AstCode::LdcI8, N::Int64(v)),
                _ => return Err(self.operand_error(instr)),
            },
            OpCode::LdcR4 => match instr.operand {
                Operand::Immediate(Immediate::Float32(v)) => (AstCode::LdcR4, N::Float32(v)),
                _ => return Err(self.operand_error(instr)),
            },
            OpCode::LdcR8 => match instr.operand {
                Operand::Immediate(Immediate::Float64(v)) => (AstCode::LdcR8, N::Float64(v)),
                _ => return Err(self.operand_error(instr)),
            },
            OpCode::Ldstr => match &instr.operand {
                Operand::String(s) => (AstCode::Ldstr, N::String(s.clone())),
                _ => return Err(self.operand_error(instr)),
            },

            OpCode::BrS | OpCode::Br => (AstCode::Br, self.target(instr)?),
            OpCode::BrfalseS | OpCode::Brfalse => (AstCode::Brfalse, self.target(instr)?),
            OpCode::BrtrueS | OpCode::Brtrue => (AstCode::Brtrue, self.target(instr)?),
            OpCode::BeqS | OpCode::Beq => (AstCode::Beq, self.target(instr)?),
            OpCode::BgeS | OpCode::Bge => (AstCode::Bge, self.target(instr)?),
            OpCode::BgtS | OpCode::Bgt => (AstCode::Bgt, self.target(instr)?),
            OpCode::BleS | OpCode::Ble => (AstCode::Ble, self.target(instr)?),
            OpCode::BltS | OpCode::Blt => (AstCode::Blt, self.target(instr)?),
            OpCode::BneUnS | OpCode::BneUn => (AstCode::BneUn, self.target(instr)?),
            OpCode::BgeUnS | OpCode::BgeUn => (AstCode::BgeUn, self.target(instr)?),
            OpCode::BgtUnS | OpCode::BgtUn => (AstCode::BgtUn, self.target(instr)?),
            OpCode::BleUnS | OpCode::BleUn => (AstCode::BleUn, self.target(instr)?),
            OpCode::BltUnS | OpCode::BltUn => (AstCode::BltUn, self.target(instr)?),
            OpCode::LeaveS | OpCode::Leave => (AstCode::Leave, self.target(instr)?),
            OpCode::Switch => match &instr.operand {
                Operand::Switch(targets) => (AstCode::Switch, N::Targets(targets.clone())),
                _ => return Err(self.operand_error(instr)),
            },

            OpCode::LdindI1 => (AstCode::Ldobj, N::Primitive(ElementType::I1)),
            OpCode::LdindU1 => (AstCode::Ldobj, N::Primitive(ElementType::U1)),
            OpCode::LdindI2 => (AstCode::Ldobj, N::Primitive(ElementType::I2)),
            OpCode::LdindU2 => (AstCode::Ldobj, N::Primitive(ElementType::U2)),
            OpCode::LdindI4 => (AstCode::Ldobj, N::Primitive(ElementType::I4)),
            OpCode::LdindU4 => (AstCode::Ldobj, N::Primitive(ElementType::U4)),
            OpCode::LdindI8 => (AstCode::Ldobj, N::Primitive(ElementType::I8)),
            OpCode::LdindI => (AstCode::Ldobj, N::Primitive(ElementType::I)),
            OpCode::LdindR4 => (AstCode::Ldobj, N::Primitive(ElementType::R4)),
            OpCode::LdindR8 => (AstCode::Ldobj, N::Primitive(ElementType::R8)),
            OpCode::StindI1 => (AstCode::Stobj, N::Primitive(ElementType::I1)),
            OpCode::StindI2 => (AstCode::Stobj, N::Primitive(ElementType::I2)),
            OpCode::StindI4 => (AstCode::Stobj, N::Primitive(ElementType::I4)),
            OpCode::StindI8 => (AstCode::Stobj, N::Primitive(ElementType::I8)),
            OpCode::StindI => (AstCode::Stobj, N::Primitive(ElementType::I)),
            OpCode::StindR4 => (AstCode::Stobj, N::Primitive(ElementType::R4)),
            OpCode::StindR8 => (AstCode::Stobj, N::Primitive(ElementType::R8)),

            _ => {
                let Some(code) = AstCode::from_direct(op) else {
                    return Err(malformed_error!("No canonical form for '{}'", op));
                };
                (code, self.token_operand(instr, code)?)
            }
        };
        Ok(canonical)
    }

    fn token_operand(&self, instr: &Instruction, code: AstCode) -> Result<NormalizedOperand> {
        use AstCode::*;

        let token = match (&instr.operand, code) {
            (Operand::None, _) if instr.opcode.operand_type().size() == Some(0) => {
                return Ok(NormalizedOperand::None)
            }
            (Operand::Token(token), _) => *token,
            _ => return Err(self.operand_error(instr)),
        };

        let operand = match code {
            Ldfld | Ldflda | Stfld | Ldsfld | Ldsflda | Stsfld => self
                .resolver
                .resolve_field(token)
                .map(NormalizedOperand::Field),
            Call | Callvirt | Calli | Newobj | Jmp | Ldftn | Ldvirtftn => self
                .resolver
                .resolve_method(token)
                .map(NormalizedOperand::Method),
            Ldtoken => self
                .resolver
                .resolve_member(token)
                .map(NormalizedOperand::Member),
            _ => self.resolver.resolve_type(token).map(NormalizedOperand::Type),
        };
        self.resolved(instr, operand)
    }

    fn stack_effect(
        &self,
        instr: &Instruction,
        code: AstCode,
        operand: &NormalizedOperand,
    ) -> Result<(PopCount, u16)> {
        if let Some(effect) = code.fixed_stack_effect() {
            return Ok(effect);
        }

        if code == AstCode::Ret {
            let pop = u16::from(self.body.returns_value());
            return Ok((PopCount::Fixed(pop), 0));
        }

        let NormalizedOperand::Method(sig) = operand else {
            return Err(Error::Unsupported {
                method: self.body.name.clone(),
                offset: instr.offset,
                mnemonic: code.mnemonic(),
            });
        };
        let this = u16::from(sig.has_this);
        let (pop, push) = match code {
            AstCode::Newobj => (Some(sig.param_count), 1),
            AstCode::Calli => (
                sig.param_count
                    .checked_add(this)
                    .and_then(|n| n.checked_add(1)),
                u16::from(sig.returns_value),
            ),
            _ => (
                sig.param_count.checked_add(this),
                u16::from(sig.returns_value),
            ),
        };
        let Some(pop) = pop else {
            return Err(self.invalid(
                instr.offset,
                code.mnemonic(),
                format!("'{}' takes more arguments than fit the stack", sig.name),
            ));
        };
        Ok((PopCount::Fixed(pop), push))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::InstructionAssembler,
        metadata::{
            method::MethodFlags,
            refs::{MethodRef, TypeRef},
            resolver::ReferenceTable,
            token::Token,
        },
    };

    fn run(asm: InstructionAssembler, table: &ReferenceTable) -> Vec<NormalizedInstruction> {
        let code = asm.finish().unwrap();
        let body = MethodBody::new("Test::Run", code.instructions)
            .with_flags(MethodFlags::RETURNS_VALUE);
        normalize(&body, table).unwrap()
    }

    #[test]
    fn test_macro_expansion() {
        let mut asm = InstructionAssembler::new();
        asm.ldarg_1()
            .unwrap()
            .ldc_i4_m1()
            .unwrap()
            .ldc_i4_s(-5)
            .unwrap()
            .stloc_s(7)
            .unwrap()
            .ldind_i2()
            .unwrap()
            .stind_r8()
            .unwrap()
            .ret()
            .unwrap();
        let out = run(asm, &ReferenceTable::new());

        assert_eq!(out[0].code, AstCode::Ldarg);
        assert_eq!(out[0].operand, NormalizedOperand::Argument(1));
        assert_eq!(out[1].operand, NormalizedOperand::Int32(-1));
        assert_eq!(out[2].operand, NormalizedOperand::Int32(-5));
        assert_eq!(out[3].code, AstCode::Stloc);
        assert_eq!(out[3].operand, NormalizedOperand::Local(7));
        assert_eq!(out[4].code, AstCode::Ldobj);
        assert_eq!(out[4].operand, NormalizedOperand::Primitive(ElementType::I2));
        assert_eq!(out[5].code, AstCode::Stobj);
        assert_eq!(out[5].pop, PopCount::Fixed(2));
        assert_eq!(out[6].pop, PopCount::Fixed(1));
    }

    #[test]
    fn test_short_branch_expansion() {
        let mut asm = InstructionAssembler::new();
        asm.ldc_i4_0()
            .unwrap()
            .brtrue_s("end")
            .unwrap()
            .leave_s("end")
            .unwrap()
            .label("end")
            .unwrap()
            .ldc_i4_0()
            .unwrap()
            .ret()
            .unwrap();
        let out = run(asm, &ReferenceTable::new());

        assert_eq!(out[1].code, AstCode::Brtrue);
        assert_eq!(out[1].operand, NormalizedOperand::Target(out[3].offset));
        assert_eq!(out[2].code, AstCode::Leave);
        assert_eq!(out[2].operand.targets(), &[out[3].offset]);
    }

    #[test]
    fn test_prefix_merge() {
        let mut table = ReferenceTable::new();
        let ty = table.add_type(TypeRef::value_type(Token(0x02000001), "Point"));
        table.add_method(MethodRef::new(Token(0x0A000001), "ToString", 0, true, true));

        let mut asm = InstructionAssembler::new();
        asm.ldarg_0()
            .unwrap()
            .volatile()
            .unwrap()
            .unaligned(1)
            .unwrap()
            .ldind_i4()
            .unwrap()
            .pop()
            .unwrap()
            .constrained(Token(0x02000001))
            .unwrap()
            .callvirt(Token(0x0A000001))
            .unwrap()
            .ret()
            .unwrap();
        let out = run(asm, &table);

        assert_eq!(out.len(), 5);
        // ldarg.0 is one byte, so the merged load starts at the volatile. prefix
        assert_eq!(out[1].offset, 1);
        assert_eq!(out[1].prefixes, vec![AstPrefix::Volatile, AstPrefix::Unaligned(1)]);
        assert_eq!(out[3].prefixes, vec![AstPrefix::Constrained(ty)]);
        assert_eq!(out[3].pop, PopCount::Fixed(1));
        assert_eq!(out[3].push, 1);
        assert_eq!(out[3].to_string(), "IL_08: constrained. Point callvirt ToString");
    }

    #[test]
    fn test_call_stack_effects() {
        let mut table = ReferenceTable::new();
        table.add_method(MethodRef::new(Token(0x0A000001), "Max", 2, false, true));
        table.add_method(MethodRef::new(Token(0x0A000002), ".ctor", 3, true, false));
        table.add_method(MethodRef::new(Token(0x11000001), "sig", 1, true, false));

        let mut asm = InstructionAssembler::new();
        asm.call(Token(0x0A000001))
            .unwrap()
            .newobj(Token(0x0A000002))
            .unwrap()
            .calli(Token(0x11000001))
            .unwrap()
            .ret()
            .unwrap();
        let out = run(asm, &table);

        assert_eq!((out[0].pop, out[0].push), (PopCount::Fixed(2), 1));
        assert_eq!((out[1].pop, out[1].push), (PopCount::Fixed(3), 1));
        assert_eq!((out[2].pop, out[2].push), (PopCount::Fixed(3), 0));
    }

    #[test]
    fn test_unresolved_token() {
        let mut asm = InstructionAssembler::new();
        asm.ldfld(Token(0x04000001)).unwrap().ret().unwrap();
        let code = asm.finish().unwrap();
        let body = MethodBody::new("Test::Run", code.instructions);
        let err = normalize(&body, &ReferenceTable::new()).unwrap_err();
        assert!(matches!(
            err,
            Error::UnresolvedOperand {
                offset: 0,
                token: Token(0x04000001),
                ..
            }
        ));
        assert_eq!(err.method(), Some("Test::Run"));
    }

    #[test]
    fn test_unresolved_constrained_prefix() {
        let mut asm = InstructionAssembler::new();
        asm.nop()
            .unwrap()
            .constrained(Token(0x02000009))
            .unwrap()
            .callvirt(Token(0x0A000001))
            .unwrap()
            .ret()
            .unwrap();
        let code = asm.finish().unwrap();
        let body = MethodBody::new("Test::Run", code.instructions);
        let err = normalize(&body, &ReferenceTable::new()).unwrap_err();
        assert!(matches!(
            err,
            Error::UnresolvedOperand {
                offset: 1,
                token: Token(0x02000009),
                ..
            }
        ));
    }

    #[test]
    fn test_pop_count_overflow() {
        let mut table = ReferenceTable::new();
        table.add_method(MethodRef::new(Token(0x0A000001), "Wide", u16::MAX, true, false));
        let mut asm = InstructionAssembler::new();
        asm.callvirt(Token(0x0A000001)).unwrap().ret().unwrap();
        let code = asm.finish().unwrap();
        let body = MethodBody::new("Test::Run", code.instructions);
        assert!(matches!(
            normalize(&body, &table),
            Err(Error::InvalidOperand { offset: 0, mnemonic: "callvirt", .. })
        ));
    }

    #[test]
    fn test_dangling_prefix() {
        let mut asm = InstructionAssembler::new();
        asm.ret().unwrap().volatile().unwrap();
        let code = asm.finish().unwrap();
        let body = MethodBody::new("Test::Run", code.instructions);
        let err = normalize(&body, &ReferenceTable::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidOperand { offset: 1, .. }));
    }
}
