//! Worklist fixpoint over the abstract operand stack and local slots.
//!
//! # Algorithm
//!
//! 1. Seed the entry with an empty stack and every local unknown.
//! 2. Seed each handler entry with unknown locals; catch and filter entries start with
//!    a one-slot stack defined by their `ldexception` pseudo instruction.
//! 3. Pop an instruction from the worklist and compute its exit state: drop the popped
//!    slots, push one slot per pushed value defined by this instruction, record a local
//!    definition, and forget all locals after `leave` (a finally may run in between).
//! 4. Propagate the exit state to every successor. A first visit adopts it; later
//!    visits join it in, and the successor is re-queued only if its state grew.
//!
//! The worklist is LIFO. Termination follows from the finite, monotone lattice in
//! [`crate::analysis::dataflow::lattice`].

use std::collections::HashSet;

use log::warn;

use crate::{
    analysis::{
        bytecode::MethodCode,
        dataflow::{
            lattice::join_all,
            slots::{DefSet, StackSlot, VariableSlot},
        },
    },
    ast::AstCode,
    Error, Result,
};

/// Statistics of one fixpoint run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixpointStats {
    /// Instructions processed, re-visits included
    pub iterations: usize,
    /// Successor joins that grew the successor's state
    pub merges: usize,
}

/// Computes `stack_before` and `variables_before` for every reachable instruction, and
/// marks the instructions reachable branches jump to.
///
/// # Errors
///
/// Returns [`Error::StackMismatch`] when paths merge with different stack depths,
/// [`Error::StackUnderflow`] when an instruction pops more than the stack holds and
/// [`Error::FallthroughAtEnd`] when a reachable instruction runs off the end of the body.
pub fn solve(code: &mut MethodCode, local_count: usize) -> Result<FixpointStats> {
    let capacity = code.bytecodes.len();
    let mut stats = FixpointStats::default();
    let mut worklist = Vec::new();

    let unknown = vec![VariableSlot::Unknown; local_count];
    if code.body_len > 0 {
        seed(code, 0, Vec::new(), &unknown, &mut worklist);
    }

    let mut handler_starts = HashSet::new();
    for entry in code.handlers.clone() {
        handler_starts.insert(entry.handler_start);
        let stack = exception_stack(capacity, entry.handler_exception);
        seed(code, entry.handler_start, stack, &unknown, &mut worklist);
        if let Some(filter_start) = entry.filter_start {
            let stack = exception_stack(capacity, entry.filter_exception);
            seed(code, filter_start, stack, &unknown, &mut worklist);
        }
    }

    while let Some(index) = worklist.pop() {
        stats.iterations += 1;
        let (stack, variables) = exit_state(code, index, capacity)?;

        let bc = &code.bytecodes[index];
        let mut successors = Vec::with_capacity(2);
        if !bc.code.is_unconditional_control_flow() {
            match bc.next {
                Some(next) if handler_starts.contains(&next) => warn!(
                    "{}: IL_{:02X} falls through into the handler at IL_{:02X}; edge ignored",
                    code.name, bc.offset, code.bytecodes[next].offset
                ),
                Some(next) => successors.push(next),
                None => {
                    return Err(Error::FallthroughAtEnd {
                        method: code.name.clone(),
                        offset: bc.offset,
                    })
                }
            }
        }
        let targets: Vec<usize> = bc
            .operand
            .targets()
            .iter()
            .filter_map(|&target| code.index_of(target))
            .collect();
        for &target in &targets {
            code.bytecodes[target].is_branch_target = true;
        }
        successors.extend(targets);

        for succ in successors {
            let offset = code.bytecodes[index].offset;
            let target = &mut code.bytecodes[succ];
            match (&mut target.stack_before, &mut target.variables_before) {
                (Some(old_stack), Some(old_vars)) => {
                    if old_stack.len() != stack.len() {
                        return Err(Error::StackMismatch {
                            method: code.name.clone(),
                            offset,
                            expected: old_stack.len(),
                            found: stack.len(),
                        });
                    }
                    let mut modified = join_all(old_stack, &stack);
                    modified |= join_all(old_vars, &variables);
                    if modified {
                        stats.merges += 1;
                        worklist.push(succ);
                    }
                }
                _ => {
                    target.stack_before = Some(stack.clone());
                    target.variables_before = Some(variables.clone());
                    worklist.push(succ);
                }
            }
        }
    }
    Ok(stats)
}

fn exception_stack(capacity: usize, exception: Option<usize>) -> Vec<StackSlot> {
    exception
        .map(|ldexception| StackSlot::new(DefSet::singleton(capacity, ldexception)))
        .into_iter()
        .collect()
}

fn seed(
    code: &mut MethodCode,
    index: usize,
    stack: Vec<StackSlot>,
    variables: &[VariableSlot],
    worklist: &mut Vec<usize>,
) {
    let bc = &mut code.bytecodes[index];
    bc.stack_before = Some(stack);
    bc.variables_before = Some(variables.to_vec());
    worklist.push(index);
}

fn exit_state(
    code: &MethodCode,
    index: usize,
    capacity: usize,
) -> Result<(Vec<StackSlot>, Vec<VariableSlot>)> {
    let bc = &code.bytecodes[index];
    let (Some(stack), Some(variables)) = (&bc.stack_before, &bc.variables_before) else {
        return Err(malformed_error!(
            "IL_{:02X} queued without an entry state",
            bc.offset
        ));
    };

    let pop = bc.pop.resolve(stack.len());
    if pop > stack.len() {
        return Err(Error::StackUnderflow {
            method: code.name.clone(),
            offset: bc.offset,
            needed: pop,
            available: stack.len(),
        });
    }

    let mut new_stack = stack[..stack.len() - pop].to_vec();
    for _ in 0..bc.push {
        new_stack.push(StackSlot::new(DefSet::singleton(capacity, index)));
    }

    let mut new_variables = variables.clone();
    if let Some(local) = code.defined_local(index) {
        if let Some(slot) = new_variables.get_mut(usize::from(local)) {
            *slot = VariableSlot::Known(DefSet::singleton(capacity, index));
        }
    }
    if bc.code == AstCode::Leave {
        new_variables.fill(VariableSlot::Unknown);
    }
    Ok((new_stack, new_variables))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::normalize::normalize,
        assembly::InstructionAssembler,
        metadata::{
            method::{ExceptionHandler, LocalDef, MethodBody},
            resolver::ReferenceTable,
        },
    };

    fn run(asm: InstructionAssembler, handlers: Vec<ExceptionHandler>) -> Result<MethodCode> {
        let assembled = asm.finish()?;
        let body = MethodBody::new("Test::Run", assembled.instructions)
            .with_locals(vec![LocalDef::new(), LocalDef::new()])
            .with_handlers(handlers);
        let mut code = MethodCode::new(&body, normalize(&body, &ReferenceTable::new())?)?;
        solve(&mut code, 2)?;
        code.prune();
        Ok(code)
    }

    fn defs(code: &MethodCode, index: usize, slot: usize) -> Vec<usize> {
        code.bytecodes[index].stack_before.as_ref().unwrap()[slot]
            .defs
            .iter()
            .collect()
    }

    #[test]
    fn test_straight_line() -> Result<()> {
        let mut asm = InstructionAssembler::new();
        asm.ldc_i4_1()?.ldc_i4_2()?.add()?.pop()?.ret()?;
        let code = run(asm, Vec::new())?;

        assert_eq!(code.bytecodes[2].stack_before.as_ref().unwrap().len(), 2);
        assert_eq!(defs(&code, 2, 0), vec![0]);
        assert_eq!(defs(&code, 2, 1), vec![1]);
        assert_eq!(defs(&code, 3, 0), vec![2]);
        assert!(code.bytecodes[4].stack_before.as_ref().unwrap().is_empty());
        Ok(())
    }

    #[test]
    fn test_merge_unions_definitions() -> Result<()> {
        // cond ? 1 : 2, consumed once after the merge
        let mut asm = InstructionAssembler::new();
        asm.ldc_i4_0()?
            .brtrue_s("one")?
            .ldc_i4_2()?
            .br_s("join")?
            .label("one")?
            .ldc_i4_1()?
            .label("join")?
            .stloc_0()?
            .ret()?;
        let code = run(asm, Vec::new())?;

        assert_eq!(defs(&code, 5, 0), vec![2, 4]);
        let vars = code.bytecodes[6].variables_before.as_ref().unwrap();
        assert_eq!(vars[0].defs().map(DefSet::len), Some(1));
        assert!(vars[1].is_unknown());
        Ok(())
    }

    #[test]
    fn test_stack_mismatch() {
        let mut asm = InstructionAssembler::new();
        asm.ldc_i4_0()
            .unwrap()
            .brtrue_s("join")
            .unwrap()
            .ldc_i4_1()
            .unwrap()
            .label("join")
            .unwrap()
            .ret()
            .unwrap();
        assert!(matches!(
            run(asm, Vec::new()),
            Err(Error::StackMismatch { .. })
        ));
    }

    #[test]
    fn test_stack_underflow() {
        let mut asm = InstructionAssembler::new();
        asm.add().unwrap().ret().unwrap();
        assert!(matches!(
            run(asm, Vec::new()),
            Err(Error::StackUnderflow {
                offset: 0,
                needed: 2,
                available: 0,
                ..
            })
        ));
    }

    #[test]
    fn test_unreachable_is_pruned() -> Result<()> {
        let mut asm = InstructionAssembler::new();
        asm.br_s("end")?.nop()?.nop()?.label("end")?.ret()?;
        let code = run(asm, Vec::new())?;
        assert_eq!(code.live, vec![0, 3]);
        Ok(())
    }

    #[test]
    fn test_dead_tail_is_pruned() -> Result<()> {
        let mut asm = InstructionAssembler::new();
        asm.ret()?.nop()?;
        let code = run(asm, Vec::new())?;
        assert_eq!(code.live, vec![0]);
        Ok(())
    }

    #[test]
    fn test_reachable_fallthrough_at_end() {
        let mut asm = InstructionAssembler::new();
        asm.ldc_i4_0().unwrap().pop().unwrap();
        assert!(matches!(
            run(asm, Vec::new()),
            Err(Error::FallthroughAtEnd { offset: 1, .. })
        ));
    }

    #[test]
    fn test_only_reachable_branches_mark_targets() -> Result<()> {
        // the dead `br` points at `ret`
        let mut asm = InstructionAssembler::new();
        asm.ldc_i4_0()?
            .brtrue_s("skip")?
            .label("skip")?
            .br_s("live")?
            .br_s("end")?
            .label("live")?
            .nop()?
            .label("end")?
            .ret()?;
        let code = run(asm, Vec::new())?;

        assert_eq!(code.live, vec![0, 1, 2, 4, 5]);
        assert!(code.bytecodes[2].is_branch_target);
        assert!(code.bytecodes[4].is_branch_target);
        assert!(!code.bytecodes[5].is_branch_target);
        assert!(!code.bytecodes[0].is_branch_target);
        Ok(())
    }

    #[test]
    fn test_leave_forgets_locals() -> Result<()> {
        let mut asm = InstructionAssembler::new();
        asm.ldc_i4_0()?
            .stloc_0()?
            .leave_s("end")?
            .label("handler")?
            .endfinally()?
            .label("end")?
            .ret()?;
        let code = run(asm, vec![ExceptionHandler::finally(0, 4, 4, 5)])?;

        let ret = code.index_of(5).unwrap();
        assert!(code.bytecodes[ret].variables_before.as_ref().unwrap()[0].is_unknown());
        let leave = code.index_of(2).unwrap();
        assert!(!code.bytecodes[leave].variables_before.as_ref().unwrap()[0].is_unknown());
        Ok(())
    }

    #[test]
    fn test_catch_entry_has_exception() -> Result<()> {
        let mut asm = InstructionAssembler::new();
        asm.leave_s("end")?
            .label("handler")?
            .pop()?
            .leave_s("end")?
            .label("end")?
            .ret()?;
        let code = run(asm, vec![ExceptionHandler::catch(0, 2, 2, 5, None)])?;

        let ldexception = code.handlers[0].handler_exception.unwrap();
        assert_eq!(defs(&code, 1, 0), vec![ldexception]);
        Ok(())
    }
}
