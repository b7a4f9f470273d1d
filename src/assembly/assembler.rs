//! Fluent construction of CIL instruction streams.
//!
//! [`InstructionAssembler`] lays out instructions at their correct byte offsets and
//! resolves named labels into absolute branch targets. It is what callers (and the test
//! suite) use to hand-build method bodies without going through a binary reader.
//!
//! # Examples
//!
//! ```rust
//! use cilast::assembly::{InstructionAssembler, Operand};
//!
//! // if (arg0) { return 1; } return 0;
//! let mut asm = InstructionAssembler::new();
//! asm.ldarg_0()?
//!     .brfalse_s("else")?
//!     .ldc_i4_1()?
//!     .ret()?
//!     .label("else")?
//!     .ldc_i4_0()?
//!     .ret()?;
//!
//! let code = asm.finish()?;
//! assert_eq!(code.instructions.len(), 6);
//! assert_eq!(code.labels["else"], 5);
//! assert_eq!(code.instructions[1].operand, Operand::Target(5));
//! # Ok::<(), cilast::Error>(())
//! ```

use std::collections::HashMap;

use crate::{
    assembly::{Immediate, Instruction, OpCode, Operand, OperandType, SourceLocation},
    metadata::token::Token,
    Error, Result,
};

/// Operand waiting for label resolution.
#[derive(Debug)]
enum PendingOperand {
    Ready(Operand),
    Label(String),
    Labels(Vec<String>),
}

#[derive(Debug)]
struct PendingInstruction {
    offset: u32,
    size: u32,
    opcode: OpCode,
    operand: PendingOperand,
    location: Option<SourceLocation>,
}

/// The output of [`InstructionAssembler::finish`].
#[derive(Debug, Clone)]
pub struct AssembledCode {
    /// Instructions with resolved branch targets
    pub instructions: Vec<Instruction>,
    /// Label name to byte offset
    pub labels: HashMap<String, u32>,
    /// Total code size in bytes
    pub code_size: u32,
}

/// Builds an instruction stream one instruction at a time.
#[derive(Debug, Default)]
pub struct InstructionAssembler {
    instructions: Vec<PendingInstruction>,
    labels: HashMap<String, u32>,
    position: u32,
    location: Option<SourceLocation>,
}

macro_rules! simple_ops {
    ($($name:ident => $op:ident;)*) => {
        $(
            #[doc = concat!("Emits `", stringify!($op), "`.")]
            ///
            /// # Errors
            ///
            /// Never fails; returns `Result` for chaining.
            pub fn $name(&mut self) -> Result<&mut Self> {
                self.emit(OpCode::$op, Operand::None)
            }
        )*
    };
}

macro_rules! branch_ops {
    ($($name:ident => $op:ident;)*) => {
        $(
            #[doc = concat!("Emits `", stringify!($op), "` to a named label.")]
            ///
            /// # Errors
            ///
            /// Label resolution happens in [`InstructionAssembler::finish`].
            pub fn $name(&mut self, label: &str) -> Result<&mut Self> {
                self.branch(OpCode::$op, label)
            }
        )*
    };
}

macro_rules! token_ops {
    ($($name:ident => $op:ident;)*) => {
        $(
            #[doc = concat!("Emits `", stringify!($op), "` with a metadata token operand.")]
            ///
            /// # Errors
            ///
            /// Never fails; returns `Result` for chaining.
            pub fn $name(&mut self, token: Token) -> Result<&mut Self> {
                self.emit(OpCode::$op, Operand::Token(token))
            }
        )*
    };
}

macro_rules! local_ops {
    ($($name:ident => $op:ident, $ty:ty;)*) => {
        $(
            #[doc = concat!("Emits `", stringify!($op), "` for a local slot.")]
            ///
            /// # Errors
            ///
            /// Never fails; returns `Result` for chaining.
            pub fn $name(&mut self, index: $ty) -> Result<&mut Self> {
                self.emit(OpCode::$op, Operand::Local(u16::from(index)))
            }
        )*
    };
}

macro_rules! arg_ops {
    ($($name:ident => $op:ident, $ty:ty;)*) => {
        $(
            #[doc = concat!("Emits `", stringify!($op), "` for an argument slot.")]
            ///
            /// # Errors
            ///
            /// Never fails; returns `Result` for chaining.
            pub fn $name(&mut self, index: $ty) -> Result<&mut Self> {
                self.emit(OpCode::$op, Operand::Argument(u16::from(index)))
            }
        )*
    };
}

impl InstructionAssembler {
    /// Creates an empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current byte offset, i.e. the offset of the next instruction.
    #[must_use]
    pub fn position(&self) -> u32 {
        self.position
    }

    /// Places a label at the current position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateLabel`] if the label was already placed.
    pub fn label(&mut self, name: &str) -> Result<&mut Self> {
        if self.labels.contains_key(name) {
            return Err(Error::DuplicateLabel(name.to_string()));
        }
        self.labels.insert(name.to_string(), self.position);
        Ok(self)
    }

    /// Attaches a source location to the next emitted instruction.
    pub fn at(&mut self, location: SourceLocation) -> &mut Self {
        self.location = Some(location);
        self
    }

    /// Emits an instruction with a fully resolved operand.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if the operand does not fit the opcode.
    pub fn emit(&mut self, opcode: OpCode, operand: Operand) -> Result<&mut Self> {
        let fits = matches!(
            (opcode.operand_type(), &operand),
            (OperandType::None, Operand::None)
                | (OperandType::ShortBranch | OperandType::Branch, Operand::Target(_))
                | (OperandType::Switch, Operand::Switch(_))
                | (
                    OperandType::ShortVar | OperandType::Var,
                    Operand::Local(_) | Operand::Argument(_)
                )
                | (OperandType::ShortInt, Operand::Immediate(Immediate::Int8(_)))
                | (OperandType::UInt8, Operand::Immediate(Immediate::UInt8(_)))
                | (OperandType::Int, Operand::Immediate(Immediate::Int32(_)))
                | (OperandType::Long, Operand::Immediate(Immediate::Int64(_)))
                | (OperandType::ShortFloat, Operand::Immediate(Immediate::Float32(_)))
                | (OperandType::Float, Operand::Immediate(Immediate::Float64(_)))
                | (OperandType::Token, Operand::Token(_))
                | (OperandType::String, Operand::String(_))
        );
        if !fits {
            return Err(malformed_error!(
                "Operand {:?} does not fit '{}'",
                operand,
                opcode.mnemonic()
            ));
        }

        let count = match &operand {
            Operand::Switch(targets) => targets.len(),
            _ => 0,
        };
        self.push(opcode, PendingOperand::Ready(operand), count)
    }

    /// Emits a branch instruction targeting a named label.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if `opcode` is not a single-target branch.
    pub fn branch(&mut self, opcode: OpCode, label: &str) -> Result<&mut Self> {
        if !matches!(
            opcode.operand_type(),
            OperandType::ShortBranch | OperandType::Branch
        ) {
            return Err(malformed_error!("'{}' is not a branch", opcode.mnemonic()));
        }
        self.push(opcode, PendingOperand::Label(label.to_string()), 0)
    }

    /// Emits a `switch` over named labels.
    ///
    /// # Errors
    ///
    /// Never fails; label resolution happens in [`InstructionAssembler::finish`].
    pub fn switch(&mut self, labels: &[&str]) -> Result<&mut Self> {
        let labels: Vec<String> = labels.iter().map(|l| (*l).to_string()).collect();
        let count = labels.len();
        self.push(OpCode::Switch, PendingOperand::Labels(labels), count)
    }

    fn push(
        &mut self,
        opcode: OpCode,
        operand: PendingOperand,
        switch_count: usize,
    ) -> Result<&mut Self> {
        let operand_size = match opcode.operand_type().size() {
            Some(size) => size,
            None => {
                let count = u32::try_from(switch_count)
                    .map_err(|_| malformed_error!("Switch table too large"))?;
                4 + 4 * count
            }
        };
        let size = opcode.size() + operand_size;
        self.instructions.push(PendingInstruction {
            offset: self.position,
            size,
            opcode,
            operand,
            location: self.location.take(),
        });
        self.position += size;
        Ok(self)
    }

    fn resolve(&self, name: &str) -> Result<u32> {
        self.labels
            .get(name)
            .copied()
            .ok_or_else(|| Error::UndefinedLabel(name.to_string()))
    }

    /// Resolves labels and returns the finished instruction stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UndefinedLabel`] if a branch references a label that was never
    /// placed.
    pub fn finish(self) -> Result<AssembledCode> {
        let mut instructions = Vec::with_capacity(self.instructions.len());
        for pending in &self.instructions {
            let operand = match &pending.operand {
                PendingOperand::Ready(operand) => operand.clone(),
                PendingOperand::Label(name) => Operand::Target(self.resolve(name)?),
                PendingOperand::Labels(names) => Operand::Switch(
                    names
                        .iter()
                        .map(|name| self.resolve(name))
                        .collect::<Result<Vec<_>>>()?,
                ),
            };
            instructions.push(Instruction {
                offset: pending.offset,
                size: pending.size,
                opcode: pending.opcode,
                operand,
                location: pending.location.clone(),
            });
        }

        Ok(AssembledCode {
            instructions,
            code_size: self.position,
            labels: self.labels,
        })
    }

    /// Emits `ldc.i4` in its long form.
    ///
    /// # Errors
    ///
    /// Never fails; returns `Result` for chaining.
    pub fn ldc_i4(&mut self, value: i32) -> Result<&mut Self> {
        self.emit(OpCode::LdcI4, Operand::Immediate(Immediate::Int32(value)))
    }

    /// Emits the shortest instruction loading a 32-bit constant.
    ///
    /// # Errors
    ///
    /// Never fails; returns `Result` for chaining.
    pub fn ldc_i4_const(&mut self, value: i32) -> Result<&mut Self> {
        match value {
            -1 => self.ldc_i4_m1(),
            0 => self.ldc_i4_0(),
            1 => self.ldc_i4_1(),
            2 => self.ldc_i4_2(),
            3 => self.ldc_i4_3(),
            4 => self.ldc_i4_4(),
            5 => self.ldc_i4_5(),
            6 => self.ldc_i4_6(),
            7 => self.ldc_i4_7(),
            8 => self.ldc_i4_8(),
            _ => match i8::try_from(value) {
                Ok(short) => self.ldc_i4_s(short),
                Err(_) => self.ldc_i4(value),
            },
        }
    }

    /// Emits `ldc.i4.s`.
    ///
    /// # Errors
    ///
    /// Never fails; returns `Result` for chaining.
    pub fn ldc_i4_s(&mut self, value: i8) -> Result<&mut Self> {
        self.emit(OpCode::LdcI4S, Operand::Immediate(Immediate::Int8(value)))
    }

    /// Emits `ldc.i8`.
    ///
    /// # Errors
    ///
    /// Never fails; returns `Result` for chaining.
    pub fn ldc_i8(&mut self, value: i64) -> Result<&mut Self> {
        self.emit(OpCode::LdcI8, Operand::Immediate(Immediate::Int64(value)))
    }

    /// Emits `ldc.r4`.
    ///
    /// # Errors
    ///
    /// Never fails; returns `Result` for chaining.
    pub fn ldc_r4(&mut self, value: f32) -> Result<&mut Self> {
        self.emit(OpCode::LdcR4, Operand::Immediate(Immediate::Float32(value)))
    }

    /// Emits `ldc.r8`.
    ///
    /// # Errors
    ///
    /// Never fails; returns `Result` for chaining.
    pub fn ldc_r8(&mut self, value: f64) -> Result<&mut Self> {
        self.emit(OpCode::LdcR8, Operand::Immediate(Immediate::Float64(value)))
    }

    /// Emits `ldstr`.
    ///
    /// # Errors
    ///
    /// Never fails; returns `Result` for chaining.
    pub fn ldstr(&mut self, value: &str) -> Result<&mut Self> {
        self.emit(OpCode::Ldstr, Operand::String(value.to_string()))
    }

    /// Emits the `unaligned.` prefix.
    ///
    /// # Errors
    ///
    /// Never fails; returns `Result` for chaining.
    pub fn unaligned(&mut self, alignment: u8) -> Result<&mut Self> {
        self.emit(OpCode::Unaligned, Operand::Immediate(Immediate::UInt8(alignment)))
    }

    /// Emits the `no.` prefix.
    ///
    /// # Errors
    ///
    /// Never fails; returns `Result` for chaining.
    pub fn no(&mut self, checks: u8) -> Result<&mut Self> {
        self.emit(OpCode::No, Operand::Immediate(Immediate::UInt8(checks)))
    }

    simple_ops! {
        nop => Nop;
        break_ => Break;
        ldarg_0 => Ldarg0;
        ldarg_1 => Ldarg1;
        ldarg_2 => Ldarg2;
        ldarg_3 => Ldarg3;
        ldloc_0 => Ldloc0;
        ldloc_1 => Ldloc1;
        ldloc_2 => Ldloc2;
        ldloc_3 => Ldloc3;
        stloc_0 => Stloc0;
        stloc_1 => Stloc1;
        stloc_2 => Stloc2;
        stloc_3 => Stloc3;
        ldnull => Ldnull;
        ldc_i4_m1 => LdcI4M1;
        ldc_i4_0 => LdcI40;
        ldc_i4_1 => LdcI41;
        ldc_i4_2 => LdcI42;
        ldc_i4_3 => LdcI43;
        ldc_i4_4 => LdcI44;
        ldc_i4_5 => LdcI45;
        ldc_i4_6 => LdcI46;
        ldc_i4_7 => LdcI47;
        ldc_i4_8 => LdcI48;
        dup => Dup;
        pop => Pop;
        ret => Ret;
        ldind_i1 => LdindI1;
        ldind_u1 => LdindU1;
        ldind_i2 => LdindI2;
        ldind_u2 => LdindU2;
        ldind_i4 => LdindI4;
        ldind_u4 => LdindU4;
        ldind_i8 => LdindI8;
        ldind_i => LdindI;
        ldind_r4 => LdindR4;
        ldind_r8 => LdindR8;
        ldind_ref => LdindRef;
        stind_ref => StindRef;
        stind_i1 => StindI1;
        stind_i2 => StindI2;
        stind_i4 => StindI4;
        stind_i8 => StindI8;
        stind_r4 => StindR4;
        stind_r8 => StindR8;
        stind_i => StindI;
        add => Add;
        sub => Sub;
        mul => Mul;
        div => Div;
        div_un => DivUn;
        rem => Rem;
        rem_un => RemUn;
        and => And;
        or => Or;
        xor => Xor;
        shl => Shl;
        shr => Shr;
        shr_un => ShrUn;
        neg => Neg;
        not => Not;
        add_ovf => AddOvf;
        add_ovf_un => AddOvfUn;
        mul_ovf => MulOvf;
        mul_ovf_un => MulOvfUn;
        sub_ovf => SubOvf;
        sub_ovf_un => SubOvfUn;
        conv_i1 => ConvI1;
        conv_i2 => ConvI2;
        conv_i4 => ConvI4;
        conv_i8 => ConvI8;
        conv_r4 => ConvR4;
        conv_r8 => ConvR8;
        conv_u1 => ConvU1;
        conv_u2 => ConvU2;
        conv_u4 => ConvU4;
        conv_u8 => ConvU8;
        conv_i => ConvI;
        conv_u => ConvU;
        conv_r_un => ConvRUn;
        throw => Throw;
        rethrow => Rethrow;
        endfinally => Endfinally;
        endfilter => Endfilter;
        ldlen => Ldlen;
        ldelem_i4 => LdelemI4;
        ldelem_ref => LdelemRef;
        stelem_i4 => StelemI4;
        stelem_ref => StelemRef;
        ceq => Ceq;
        cgt => Cgt;
        cgt_un => CgtUn;
        clt => Clt;
        clt_un => CltUn;
        ckfinite => Ckfinite;
        localloc => Localloc;
        cpblk => Cpblk;
        initblk => Initblk;
        arglist => Arglist;
        refanytype => Refanytype;
        volatile => Volatile;
        tail => Tail;
        readonly => Readonly;
    }

    branch_ops! {
        br => Br;
        br_s => BrS;
        brfalse => Brfalse;
        brfalse_s => BrfalseS;
        brtrue => Brtrue;
        brtrue_s => BrtrueS;
        beq => Beq;
        beq_s => BeqS;
        bne_un => BneUn;
        bne_un_s => BneUnS;
        bge => Bge;
        bge_s => BgeS;
        bgt => Bgt;
        bgt_s => BgtS;
        ble => Ble;
        ble_s => BleS;
        blt => Blt;
        blt_s => BltS;
        leave => Leave;
        leave_s => LeaveS;
    }

    token_ops! {
        jmp => Jmp;
        call => Call;
        callvirt => Callvirt;
        calli => Calli;
        newobj => Newobj;
        ldfld => Ldfld;
        ldflda => Ldflda;
        stfld => Stfld;
        ldsfld => Ldsfld;
        ldsflda => Ldsflda;
        stsfld => Stsfld;
        ldtoken => Ldtoken;
        ldftn => Ldftn;
        ldvirtftn => Ldvirtftn;
        box_ => Box;
        unbox => Unbox;
        unbox_any => UnboxAny;
        castclass => Castclass;
        isinst => Isinst;
        initobj => Initobj;
        ldobj => Ldobj;
        stobj => Stobj;
        cpobj => Cpobj;
        newarr => Newarr;
        ldelema => Ldelema;
        ldelem => Ldelem;
        stelem => Stelem;
        sizeof_ => Sizeof;
        mkrefany => Mkrefany;
        refanyval => Refanyval;
        constrained => Constrained;
    }

    local_ops! {
        ldloc_s => LdlocS, u8;
        ldloca_s => LdlocaS, u8;
        stloc_s => StlocS, u8;
        ldloc => Ldloc, u16;
        ldloca => Ldloca, u16;
        stloc => Stloc, u16;
    }

    arg_ops! {
        ldarg_s => LdargS, u8;
        ldarga_s => LdargaS, u8;
        starg_s => StargS, u8;
        ldarg => Ldarg, u16;
        ldarga => Ldarga, u16;
        starg => Starg, u16;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_and_sizes() {
        let mut asm = InstructionAssembler::new();
        asm.ldc_i4(1000)
            .unwrap()
            .ldc_i4_s(5)
            .unwrap()
            .ceq()
            .unwrap()
            .call(Token(0x0A000001))
            .unwrap()
            .ret()
            .unwrap();
        let code = asm.finish().unwrap();

        let layout: Vec<(u32, u32)> = code.instructions.iter().map(|i| (i.offset, i.size)).collect();
        assert_eq!(layout, vec![(0, 5), (5, 2), (7, 2), (9, 5), (14, 1)]);
        assert_eq!(code.code_size, 15);
    }

    #[test]
    fn test_switch_layout() {
        let mut asm = InstructionAssembler::new();
        asm.ldarg_0()
            .unwrap()
            .switch(&["a", "b"])
            .unwrap()
            .label("a")
            .unwrap()
            .ret()
            .unwrap()
            .label("b")
            .unwrap()
            .ret()
            .unwrap();
        let code = asm.finish().unwrap();

        assert_eq!(code.instructions[1].size, 1 + 4 + 8);
        assert_eq!(code.instructions[1].operand, Operand::Switch(vec![14, 15]));
    }

    #[test]
    fn test_label_errors() {
        let mut asm = InstructionAssembler::new();
        asm.label("x").unwrap();
        assert!(matches!(asm.label("x"), Err(Error::DuplicateLabel(_))));

        let mut asm = InstructionAssembler::new();
        asm.br("missing").unwrap();
        assert!(matches!(asm.finish(), Err(Error::UndefinedLabel(name)) if name == "missing"));
    }

    #[test]
    fn test_operand_mismatch() {
        let mut asm = InstructionAssembler::new();
        assert!(asm.emit(OpCode::Ldloc, Operand::None).is_err());
        assert!(asm.branch(OpCode::Add, "x").is_err());
        assert_eq!(asm.position(), 0);
    }

    #[test]
    fn test_ldc_i4_const_picks_short_form() {
        let mut asm = InstructionAssembler::new();
        asm.ldc_i4_const(3)
            .unwrap()
            .ldc_i4_const(-100)
            .unwrap()
            .ldc_i4_const(70000)
            .unwrap();
        let code = asm.finish().unwrap();
        let ops: Vec<OpCode> = code.instructions.iter().map(|i| i.opcode).collect();
        assert_eq!(ops, vec![OpCode::LdcI43, OpCode::LdcI4S, OpCode::LdcI4]);
    }

    #[test]
    fn test_location_attaches_to_next() {
        let mut asm = InstructionAssembler::new();
        asm.at(SourceLocation::new("a.cs", 3, 1)).nop().unwrap().ret().unwrap();
        let code = asm.finish().unwrap();
        assert_eq!(code.instructions[0].location.as_ref().map(|l| l.line), Some(3));
        assert!(code.instructions[1].location.is_none());
    }
}
