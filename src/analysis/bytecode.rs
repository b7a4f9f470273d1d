//! The annotated instruction arena.
//!
//! Every canonical instruction of a method becomes a [`ByteCode`] in one `Vec`, addressed
//! by index. Control flow edges, reaching definitions and store targets all refer to
//! these indices, so the cyclic instruction graph needs no shared ownership.
//!
//! Indices `0..body_len` hold the method body in offset order. Behind them sit the
//! `ldexception` pseudo instructions, one per catch handler and two per filter handler
//! (filter entry and handler entry). They stand for "the runtime pushed the exception"
//! and are never emitted.

use std::{collections::HashMap, fmt};

use crate::{
    analysis::{
        dataflow::{StackSlot, VariableSlot},
        normalize::{NormalizedInstruction, NormalizedOperand},
    },
    assembly::SourceLocation,
    ast::{AstCode, AstPrefix, PopCount, VariableId, VariableTable},
    metadata::method::{HandlerKind, MethodBody},
    Error, Result,
};

/// One annotated instruction.
#[derive(Debug, Clone)]
pub struct ByteCode {
    /// Start offset, prefixes included
    pub offset: u32,
    /// One past the last byte
    pub end_offset: u32,
    /// Canonical opcode
    pub code: AstCode,
    /// Canonical operand
    pub operand: NormalizedOperand,
    /// Merged prefixes
    pub prefixes: Vec<AstPrefix>,
    /// Stack items consumed
    pub pop: PopCount,
    /// Stack items produced
    pub push: u16,
    /// Source location
    pub location: Option<SourceLocation>,
    /// Linear successor in the original instruction order, reachable or not
    pub next: Option<usize>,
    /// Whether a reachable branch targets this instruction; set by the fixpoint
    pub is_branch_target: bool,
    /// Abstract stack on entry; `None` while (or if never) reached
    pub stack_before: Option<Vec<StackSlot>>,
    /// Abstract local state on entry; `None` while (or if never) reached
    pub variables_before: Option<Vec<VariableSlot>>,
    /// Temporaries that must receive the pushed value
    pub store_to: Vec<VariableId>,
    /// Variable replacing the local or argument operand
    pub variable: Option<VariableId>,
}

impl ByteCode {
    fn from_normalized(instr: NormalizedInstruction, next: Option<usize>) -> Self {
        ByteCode {
            offset: instr.offset,
            end_offset: instr.end_offset,
            code: instr.code,
            operand: instr.operand,
            prefixes: instr.prefixes,
            pop: instr.pop,
            push: instr.push,
            location: instr.location,
            next,
            is_branch_target: false,
            stack_before: None,
            variables_before: None,
            store_to: Vec::new(),
            variable: None,
        }
    }

    fn ldexception(offset: u32, operand: NormalizedOperand) -> Self {
        ByteCode {
            offset,
            end_offset: offset,
            code: AstCode::Ldexception,
            operand,
            prefixes: Vec::new(),
            pop: PopCount::Fixed(0),
            push: 1,
            location: None,
            next: None,
            is_branch_target: false,
            stack_before: Some(Vec::new()),
            variables_before: None,
            store_to: Vec::new(),
            variable: None,
        }
    }

    /// The local slot operand, if any.
    #[must_use]
    pub fn local(&self) -> Option<u16> {
        match self.operand {
            NormalizedOperand::Local(index) => Some(index),
            _ => None,
        }
    }

    /// Number of stack items consumed given the depth on entry.
    #[must_use]
    pub fn pop_count(&self) -> usize {
        let depth = self.stack_before.as_ref().map_or(0, Vec::len);
        self.pop.resolve(depth)
    }

    /// The stack slots this instruction consumes, deepest first.
    #[must_use]
    pub fn popped_slots(&self) -> &[StackSlot] {
        match &self.stack_before {
            Some(stack) => &stack[stack.len() - self.pop.resolve(stack.len()).min(stack.len())..],
            None => &[],
        }
    }

    /// Renders the converged state, resolving variable names through `variables`.
    #[must_use]
    pub fn dump(&self, variables: &VariableTable) -> String {
        let name = |id: &VariableId| {
            variables
                .get(*id)
                .map_or_else(|| id.to_string(), |v| v.name.clone())
        };

        let mut out = format!("IL_{:02X}: {}", self.offset, self.code);
        if self.operand != NormalizedOperand::None {
            out.push(' ');
            out.push_str(&self.operand.to_string());
        }

        if let Some(stack) = &self.stack_before {
            let slots: Vec<String> = stack
                .iter()
                .map(|slot| {
                    let defs: Vec<String> = slot.defs.iter().map(|d| d.to_string()).collect();
                    match &slot.load_from {
                        Some(v) => format!("{}:{}", defs.join("|"), name(v)),
                        None => defs.join("|"),
                    }
                })
                .collect();
            out.push_str(&format!(" StackBefore={{{}}}", slots.join(", ")));
        }

        if !self.store_to.is_empty() {
            let targets: Vec<String> = self.store_to.iter().map(name).collect();
            out.push_str(&format!(" StoreTo={{{}}}", targets.join(", ")));
        }

        if let Some(vars) = &self.variables_before {
            let slots: Vec<String> = vars
                .iter()
                .map(|slot| match slot {
                    VariableSlot::Unknown => "?".to_string(),
                    VariableSlot::Known(defs) => {
                        let defs: Vec<String> = defs.iter().map(|d| d.to_string()).collect();
                        defs.join("|")
                    }
                })
                .collect();
            out.push_str(&format!(" VarsBefore={{{}}}", slots.join(", ")));
        }
        out
    }
}

impl fmt::Display for ByteCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dump(&VariableTable::new()))
    }
}

/// Arena positions of the pseudo instructions that belong to one exception handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct HandlerEntry {
    /// First instruction of the handler
    pub handler_start: usize,
    /// Exception pushed on handler entry (catch and filter handlers)
    pub handler_exception: Option<usize>,
    /// First instruction of the filter
    pub filter_start: Option<usize>,
    /// Exception pushed on filter entry
    pub filter_exception: Option<usize>,
}

/// The annotated instructions of one method.
#[derive(Debug, Clone)]
pub struct MethodCode {
    /// Method name, for diagnostics
    pub name: String,
    /// Body instructions followed by `ldexception` pseudo instructions
    pub bytecodes: Vec<ByteCode>,
    /// Number of body instructions at the front of `bytecodes`
    pub body_len: usize,
    /// Per exception handler, in table order
    pub handlers: Vec<HandlerEntry>,
    /// Reachable body instructions in offset order, filled in by [`MethodCode::prune`]
    pub live: Vec<usize>,
    by_offset: HashMap<u32, usize>,
}

impl MethodCode {
    /// Builds the arena and checks that every branch target and handler boundary falls
    /// on an instruction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBranchTarget`], [`Error::InvalidHandlerOffset`] or
    /// [`Error::InvalidOperand`] for malformed bodies.
    pub fn new(body: &MethodBody, instructions: Vec<NormalizedInstruction>) -> Result<Self> {
        let body_len = instructions.len();
        let mut bytecodes: Vec<ByteCode> = instructions
            .into_iter()
            .enumerate()
            .map(|(i, instr)| {
                let next = (i + 1 < body_len).then_some(i + 1);
                ByteCode::from_normalized(instr, next)
            })
            .collect();
        let by_offset: HashMap<u32, usize> = bytecodes
            .iter()
            .enumerate()
            .map(|(i, bc)| (bc.offset, i))
            .collect();

        for bc in &bytecodes {
            Self::check_operand(body, bc)?;
            if let Some(&target) = bc
                .operand
                .targets()
                .iter()
                .find(|target| !by_offset.contains_key(*target))
            {
                return Err(Error::InvalidBranchTarget {
                    method: body.name.clone(),
                    offset: bc.offset,
                    target,
                });
            }
        }

        let end = bytecodes.last().map_or(0, |bc| bc.end_offset);
        let start_of = |offset: u32| {
            by_offset
                .get(&offset)
                .copied()
                .ok_or_else(|| Error::InvalidHandlerOffset {
                    method: body.name.clone(),
                    offset,
                })
        };
        let end_of = |offset: u32| {
            if offset == end || by_offset.contains_key(&offset) {
                Ok(())
            } else {
                Err(Error::InvalidHandlerOffset {
                    method: body.name.clone(),
                    offset,
                })
            }
        };

        let mut handlers = Vec::with_capacity(body.exception_handlers.len());
        for eh in &body.exception_handlers {
            start_of(eh.try_offset)?;
            let mut entry = HandlerEntry {
                handler_start: start_of(eh.handler_offset)?,
                ..HandlerEntry::default()
            };
            end_of(eh.try_end())?;
            end_of(eh.handler_end())?;

            if eh.kind().receives_exception() {
                let operand = eh
                    .catch_type
                    .clone()
                    .map_or(NormalizedOperand::None, NormalizedOperand::Type);
                bytecodes.push(ByteCode::ldexception(eh.handler_offset, operand));
                entry.handler_exception = Some(bytecodes.len() - 1);
            }
            if eh.kind() == HandlerKind::Filter {
                entry.filter_start = Some(start_of(eh.filter_offset)?);
                bytecodes.push(ByteCode::ldexception(
                    eh.filter_offset,
                    NormalizedOperand::None,
                ));
                entry.filter_exception = Some(bytecodes.len() - 1);
            }
            handlers.push(entry);
        }

        Ok(MethodCode {
            name: body.name.clone(),
            bytecodes,
            body_len,
            handlers,
            live: Vec::new(),
            by_offset,
        })
    }

    fn check_operand(body: &MethodBody, bc: &ByteCode) -> Result<()> {
        let invalid = |message: String| Error::InvalidOperand {
            method: body.name.clone(),
            offset: bc.offset,
            mnemonic: bc.code.mnemonic(),
            message,
        };
        match bc.operand {
            NormalizedOperand::Local(index) if usize::from(index) >= body.locals.len() => Err(
                invalid(format!("local {index} of {} declared", body.locals.len())),
            ),
            NormalizedOperand::Argument(index) if usize::from(index) >= body.argument_count() => {
                Err(invalid(format!(
                    "argument {index} of {} declared",
                    body.argument_count()
                )))
            }
            _ => Ok(()),
        }
    }

    /// Looks up the instruction starting at `offset`.
    #[must_use]
    pub fn index_of(&self, offset: u32) -> Option<usize> {
        self.by_offset.get(&offset).copied()
    }

    /// Arena indices of all successors of instruction `index`: fallthrough first, then
    /// branch targets in operand order.
    #[must_use]
    pub fn successors(&self, index: usize) -> Vec<usize> {
        let bc = &self.bytecodes[index];
        let mut out = Vec::with_capacity(1 + bc.operand.targets().len());
        if !bc.code.is_unconditional_control_flow() {
            out.extend(bc.next);
        }
        out.extend(
            bc.operand
                .targets()
                .iter()
                .filter_map(|target| self.index_of(*target)),
        );
        out
    }

    /// The local slot defined by instruction `index`: `stloc`, or `ldloca` immediately
    /// followed by `initobj`.
    #[must_use]
    pub fn defined_local(&self, index: usize) -> Option<u16> {
        let bc = &self.bytecodes[index];
        match bc.code {
            AstCode::Stloc => bc.local(),
            AstCode::Ldloca => {
                let next = bc.next.map(|n| self.bytecodes[n].code);
                (next == Some(AstCode::Initobj))
                    .then(|| bc.local())
                    .flatten()
            }
            _ => None,
        }
    }

    /// Drops instructions the fixpoint never reached. Returns how many were dropped.
    pub fn prune(&mut self) -> usize {
        self.live = (0..self.body_len)
            .filter(|&i| self.bytecodes[i].stack_before.is_some())
            .collect();
        self.body_len - self.live.len()
    }

    /// Reachable body instructions, in offset order.
    pub fn live_bytecodes(&self) -> impl Iterator<Item = (usize, &ByteCode)> {
        self.live.iter().map(|&i| (i, &self.bytecodes[i]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::normalize::normalize,
        assembly::{InstructionAssembler, Operand},
        metadata::{
            method::{ExceptionHandler, LocalDef},
            refs::TypeRef,
            resolver::ReferenceTable,
            token::Token,
        },
    };

    fn build(asm: InstructionAssembler, handlers: Vec<ExceptionHandler>) -> Result<MethodCode> {
        let code = asm.finish()?;
        let body = MethodBody::new("Test::Run", code.instructions)
            .with_locals(vec![LocalDef::new(), LocalDef::new()])
            .with_handlers(handlers);
        let normalized = normalize(&body, &ReferenceTable::new())?;
        MethodCode::new(&body, normalized)
    }

    #[test]
    fn test_arena_links() -> Result<()> {
        let mut asm = InstructionAssembler::new();
        asm.ldc_i4_0()?
            .brtrue_s("end")?
            .nop()?
            .label("end")?
            .ret()?;
        let code = build(asm, Vec::new())?;

        assert_eq!(code.body_len, 4);
        assert_eq!(code.bytecodes[0].next, Some(1));
        assert_eq!(code.bytecodes[3].next, None);
        assert_eq!(code.successors(1), vec![2, 3]);
        assert_eq!(code.successors(3), Vec::<usize>::new());
        Ok(())
    }

    #[test]
    fn test_ldexception_pseudo_instructions() -> Result<()> {
        let mut asm = InstructionAssembler::new();
        asm.label("try")?
            .leave_s("end")?
            .label("filter")?
            .pop()?
            .ldc_i4_1()?
            .endfilter()?
            .label("handler")?
            .pop()?
            .leave_s("end")?
            .label("end")?
            .ret()?;
        let handlers = vec![ExceptionHandler::filter(0, 2, 2, 6, 9)];
        let code = build(asm, handlers)?;

        assert_eq!(code.body_len, 7);
        assert_eq!(code.bytecodes.len(), 9);
        let entry = code.handlers[0];
        assert_eq!(entry.handler_start, 4);
        assert_eq!(entry.filter_start, Some(1));
        assert_eq!(entry.handler_exception, Some(7));
        assert_eq!(entry.filter_exception, Some(8));
        assert_eq!(code.bytecodes[8].code, AstCode::Ldexception);
        Ok(())
    }

    #[test]
    fn test_defined_local() -> Result<()> {
        let mut asm = InstructionAssembler::new();
        asm.ldloca_s(1)?
            .initobj(Token(0x02000001))?
            .ldloca_s(0)?
            .pop()?
            .ldc_i4_0()?
            .stloc_0()?
            .ret()?;
        let mut table = ReferenceTable::new();
        table.add_type(TypeRef::value_type(Token(0x02000001), "S"));
        let assembled = asm.finish()?;
        let body = MethodBody::new("Test::Run", assembled.instructions)
            .with_locals(vec![LocalDef::new(), LocalDef::new()]);
        let code = MethodCode::new(&body, normalize(&body, &table)?)?;

        assert_eq!(code.defined_local(0), Some(1));
        assert_eq!(code.defined_local(2), None);
        assert_eq!(code.defined_local(5), Some(0));
        Ok(())
    }

    #[test]
    fn test_malformed_bodies() {
        let mut asm = InstructionAssembler::new();
        asm.br_s("end").unwrap().label("end").unwrap().ret().unwrap();
        let mut instructions = asm.finish().unwrap().instructions;
        instructions[0].operand = Operand::Target(1);
        let body = MethodBody::new("Test::Run", instructions);
        assert!(matches!(
            MethodCode::new(&body, normalize(&body, &ReferenceTable::new()).unwrap()),
            Err(Error::InvalidBranchTarget { offset: 0, target: 1, .. })
        ));

        let mut asm = InstructionAssembler::new();
        asm.nop().unwrap().ret().unwrap();
        assert!(matches!(
            build(asm, vec![ExceptionHandler::finally(0, 1, 5, 6)]),
            Err(Error::InvalidHandlerOffset { offset: 5, .. })
        ));

        let mut asm = InstructionAssembler::new();
        asm.ldloc_3().unwrap().ret().unwrap();
        assert!(matches!(
            build(asm, Vec::new()),
            Err(Error::InvalidOperand { offset: 0, .. })
        ));
    }
}
