//! Turns the anonymous operand stack into named temporaries.
//!
//! Every stack slot an instruction consumes gets a fresh temporary `arg_<OFF>_<i>`, and
//! every instruction that may have pushed the value records that temporary in its
//! `store_to` list. Afterwards, a value that ended up stored into several temporaries
//! (a `dup`, or a value crossing a merge point along several paths) is collapsed into a
//! single `expr_<OFF>` temporary when every one of those temporaries is fed by this one
//! instruction alone.

use log::debug;

use crate::{
    analysis::bytecode::MethodCode,
    ast::{Variable, VariableId, VariableTable},
    Result,
};

/// Statistics of one materialization run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterializeStats {
    /// Temporaries created for consumed stack slots
    pub temporaries: usize,
    /// Instructions whose temporaries were coalesced
    pub coalesced: usize,
}

struct Temporary {
    variable: Variable,
    live: bool,
    /// `(bytecode, slot)` of the one stack slot loading this temporary
    load: (usize, usize),
}

/// Materializes the stack of every reachable instruction into `variables`.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] if the converged state is inconsistent.
pub fn materialize(
    code: &mut MethodCode,
    variables: &mut VariableTable,
    coalesce: bool,
) -> Result<MaterializeStats> {
    let mut temps: Vec<Temporary> = Vec::new();

    for pos in 0..code.live.len() {
        let index = code.live[pos];
        let bc = &mut code.bytecodes[index];
        let offset = bc.offset;
        let Some(stack) = bc.stack_before.as_mut() else {
            return Err(malformed_error!("IL_{:02X} is live without a stack", offset));
        };

        let depth = stack.len();
        let window = bc.pop.resolve(depth).min(depth);
        let mut pushers = Vec::with_capacity(window);
        for (arg, slot_index) in (depth - window..depth).enumerate() {
            let id = VariableId(temps.len());
            temps.push(Temporary {
                variable: Variable::generated(format!("arg_{offset:02X}_{arg}"), None),
                live: true,
                load: (index, slot_index),
            });
            let slot = &mut stack[slot_index];
            slot.load_from = Some(id);
            pushers.push((slot.defs.clone(), id));
        }

        for (defs, id) in pushers {
            for def in defs.iter() {
                code.bytecodes[def].store_to.push(id);
            }
        }
    }

    let mut stats = MaterializeStats {
        temporaries: temps.len(),
        coalesced: 0,
    };
    if coalesce {
        for pos in 0..code.live.len() {
            let index = code.live[pos];
            if code.bytecodes[index].store_to.len() > 1 && coalesce_one(code, index, &mut temps) {
                stats.coalesced += 1;
            }
        }
    }

    register(code, variables, temps);
    debug!(
        "{}: {} stack temporaries, {} coalesced",
        code.name, stats.temporaries, stats.coalesced
    );
    Ok(stats)
}

/// Replaces the temporaries of `index` with one shared `expr_<OFF>` if every temporary
/// is loaded only from slots this instruction alone defines.
fn coalesce_one(code: &mut MethodCode, index: usize, temps: &mut Vec<Temporary>) -> bool {
    let targets = code.bytecodes[index].store_to.clone();
    let exclusive = targets.iter().all(|id| {
        let (load_bc, load_slot) = temps[id.0].load;
        code.bytecodes[load_bc]
            .stack_before
            .as_ref()
            .and_then(|stack| stack.get(load_slot))
            .is_some_and(|slot| slot.defs.single() == Some(index))
    });
    if !exclusive {
        return false;
    }

    let offset = code.bytecodes[index].offset;
    let shared = VariableId(temps.len());
    temps.push(Temporary {
        variable: Variable::generated(format!("expr_{offset:02X}"), None),
        live: true,
        load: temps[targets[0].0].load,
    });
    code.bytecodes[index].store_to = vec![shared];

    for id in &targets {
        temps[id.0].live = false;
        let (load_bc, load_slot) = temps[id.0].load;
        if let Some(slot) = code.bytecodes[load_bc]
            .stack_before
            .as_mut()
            .and_then(|stack| stack.get_mut(load_slot))
        {
            slot.load_from = Some(shared);
        }
    }
    true
}

/// Moves the surviving temporaries into `variables` and rewrites every reference from
/// temporary numbering to table ids.
fn register(code: &mut MethodCode, variables: &mut VariableTable, temps: Vec<Temporary>) {
    let ids: Vec<Option<VariableId>> = temps
        .into_iter()
        .map(|temp| temp.live.then(|| variables.add(temp.variable)))
        .collect();
    let remap = |id: VariableId| ids.get(id.0).copied().flatten();

    for bc in &mut code.bytecodes {
        bc.store_to = bc.store_to.iter().filter_map(|&id| remap(id)).collect();
        if let Some(stack) = bc.stack_before.as_mut() {
            for slot in stack {
                slot.load_from = slot.load_from.and_then(remap);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{dataflow::solve, normalize::normalize},
        assembly::InstructionAssembler,
        metadata::{
            method::{LocalDef, MethodBody},
            resolver::ReferenceTable,
        },
    };

    fn run(asm: InstructionAssembler, coalesce: bool) -> Result<(MethodCode, VariableTable)> {
        let assembled = asm.finish()?;
        let body = MethodBody::new("Test::Run", assembled.instructions)
            .with_locals(vec![LocalDef::new()]);
        let mut code = MethodCode::new(&body, normalize(&body, &ReferenceTable::new())?)?;
        solve(&mut code, 1)?;
        code.prune();
        let mut variables = VariableTable::new();
        materialize(&mut code, &mut variables, coalesce)?;
        Ok((code, variables))
    }

    fn names(code: &MethodCode, variables: &VariableTable, index: usize) -> Vec<String> {
        code.bytecodes[index]
            .store_to
            .iter()
            .map(|id| variables[*id].name.clone())
            .collect()
    }

    #[test]
    fn test_one_temporary_per_consumed_slot() -> Result<()> {
        let mut asm = InstructionAssembler::new();
        asm.ldc_i4_1()?.ldc_i4_2()?.add()?.stloc_0()?.ret()?;
        let (code, variables) = run(asm, true)?;

        assert_eq!(names(&code, &variables, 0), vec!["arg_02_0"]);
        assert_eq!(names(&code, &variables, 1), vec!["arg_02_1"]);
        assert_eq!(names(&code, &variables, 2), vec!["arg_03_0"]);
        assert!(code.bytecodes[3].store_to.is_empty());
        assert_eq!(variables.len(), 3);
        Ok(())
    }

    #[test]
    fn test_dup_is_coalesced() -> Result<()> {
        let mut asm = InstructionAssembler::new();
        asm.ldc_i4_1()?.dup()?.add()?.stloc_0()?.ret()?;
        let (code, variables) = run(asm, true)?;

        assert_eq!(names(&code, &variables, 1), vec!["expr_01"]);
        let add = &code.bytecodes[2];
        let loads: Vec<_> = add
            .popped_slots()
            .iter()
            .map(|slot| slot.load_from)
            .collect();
        assert_eq!(loads[0], loads[1]);
        assert!(variables.find("arg_02_0").is_none());
        Ok(())
    }

    #[test]
    fn test_dup_kept_without_coalescing() -> Result<()> {
        let mut asm = InstructionAssembler::new();
        asm.ldc_i4_1()?.dup()?.add()?.stloc_0()?.ret()?;
        let (code, variables) = run(asm, false)?;

        assert_eq!(names(&code, &variables, 1), vec!["arg_02_0", "arg_02_1"]);
        Ok(())
    }

    #[test]
    fn test_merged_value_keeps_one_temporary() -> Result<()> {
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
        let (code, variables) = run(asm, true)?;

        assert_eq!(names(&code, &variables, 2), vec!["arg_07_0"]);
        assert_eq!(names(&code, &variables, 4), vec!["arg_07_0"]);
        Ok(())
    }
}
