//! Splits local slots into independent variables.
//!
//! Compilers reuse local slots freely, so one slot often carries several unrelated
//! values. For each slot the splitter gathers its definitions (`stloc`, or `ldloca`
//! followed by `initobj`) and its uses (`ldloc`, other `ldloca`) and, where safe, gives
//! every definition its own variable. A use reached by several definitions merges their
//! variables, transitively, into one.
//!
//! A slot stays one variable when splitting is disabled, the slot is pinned, any use
//! may see a value from outside the analysed paths (unknown state), or its address is
//! taken in a way [`is_deterministic_ldloca`] cannot follow.

use log::debug;

use crate::{
    analysis::{bytecode::MethodCode, normalize::NormalizedOperand},
    ast::{AstCode, PopCount, Variable, VariableTable},
    metadata::method::MethodBody,
    Result,
};

/// Statistics of one splitting run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SplitStats {
    /// Slots kept as a single variable
    pub kept: usize,
    /// Slots split into per-definition variables
    pub split: usize,
    /// Variables created for split slots
    pub variables: usize,
}

/// Decides whether the address taken by the `ldloca` at `index` is consumed right away.
///
/// The address counts as consumed when the next instruction is `initobj`, or when the
/// value stays on the stack, untouched by control flow or other accesses to the same
/// slot, until `ldfld`, `stfld` or an instance `call`/`callvirt` pops it. This is a
/// conservative approximation; anything else keeps the slot unsplit.
#[must_use]
pub fn is_deterministic_ldloca(code: &MethodCode, index: usize) -> bool {
    let ldloca = &code.bytecodes[index];
    let Some(local) = ldloca.local() else {
        return false;
    };
    let Some(mut cursor) = ldloca.next else {
        return false;
    };
    if code.bytecodes[cursor].code == AstCode::Initobj {
        return true;
    }

    // Depth of the stack above the address; the address itself counts as one.
    let mut stack: i64 = 1;
    let consumer = loop {
        let bc = &code.bytecodes[cursor];
        let PopCount::Fixed(pop) = bc.pop else {
            return false;
        };
        stack -= i64::from(pop);
        if stack == 0 {
            break bc;
        }
        if stack < 0 {
            return false;
        }
        if bc.code.is_conditional_control_flow() || bc.code.is_unconditional_control_flow() {
            return false;
        }
        if matches!(bc.code, AstCode::Ldloc | AstCode::Ldloca | AstCode::Stloc)
            && bc.local() == Some(local)
        {
            return false;
        }
        stack += i64::from(bc.push);
        match bc.next {
            Some(next) => cursor = next,
            None => return false,
        }
    };

    match consumer.code {
        AstCode::Ldfld | AstCode::Stfld => true,
        AstCode::Call | AstCode::Callvirt => match &consumer.operand {
            NormalizedOperand::Method(method) => method.has_this,
            _ => false,
        },
        _ => false,
    }
}

/// Binds every `ldloc`/`stloc`/`ldloca` to a variable in `variables`.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] if a use is reached by no definition.
pub fn split_locals(
    code: &mut MethodCode,
    body: &MethodBody,
    variables: &mut VariableTable,
    split: bool,
) -> Result<SplitStats> {
    let mut stats = SplitStats::default();

    for (slot, local) in body.locals.iter().enumerate() {
        let Ok(slot_index) = u16::try_from(slot) else {
            return Err(malformed_error!("Local slot {} out of range", slot));
        };
        let base = local
            .name
            .clone()
            .unwrap_or_else(|| format!("var_{slot}"));

        let mut defs = Vec::new();
        let mut uses = Vec::new();
        for &index in &code.live {
            let bc = &code.bytecodes[index];
            if bc.local() != Some(slot_index) {
                continue;
            }
            if code.defined_local(index) == Some(slot_index) {
                defs.push(index);
            } else if matches!(bc.code, AstCode::Ldloc | AstCode::Ldloca) {
                uses.push(index);
            }
        }

        let keep_single = !split
            || local.pinned
            || uses.iter().any(|&u| {
                code.bytecodes[u]
                    .variables_before
                    .as_ref()
                    .and_then(|vars| vars.get(slot))
                    .map_or(true, |state| state.is_unknown())
            })
            || uses.iter().any(|&u| {
                code.bytecodes[u].code == AstCode::Ldloca && !is_deterministic_ldloca(code, u)
            });

        if keep_single {
            let id = variables.add(Variable::local(
                base,
                slot_index,
                local.pinned,
                local.ty.clone(),
            ));
            for &index in defs.iter().chain(&uses) {
                code.bytecodes[index].variable = Some(id);
            }
            stats.kept += 1;
            continue;
        }

        // Union-find over definition positions; the root of a group is its earliest
        // definition, which names the merged variable.
        let mut parent: Vec<usize> = (0..defs.len()).collect();
        let mut bindings = Vec::with_capacity(uses.len());
        for &u in &uses {
            let reaching = code.bytecodes[u]
                .variables_before
                .as_ref()
                .and_then(|vars| vars.get(slot))
                .and_then(|state| state.defs());
            let groups: Vec<usize> = reaching
                .into_iter()
                .flat_map(|set| set.iter())
                .filter_map(|def| defs.iter().position(|&d| d == def))
                .collect();

            let Some(&first) = groups.first() else {
                return Err(malformed_error!(
                    "{}: load of V_{} at IL_{:02X} has no reaching definition",
                    code.name,
                    slot,
                    code.bytecodes[u].offset
                ));
            };
            let mut root = find(&mut parent, first);
            for &group in &groups[1..] {
                let other = find(&mut parent, group);
                if other != root {
                    let (low, high) = (root.min(other), root.max(other));
                    parent[high] = low;
                    root = low;
                }
            }
            bindings.push((u, root));
        }

        let mut ids = vec![None; defs.len()];
        for position in 0..defs.len() {
            let root = find(&mut parent, position);
            let id = match ids[root] {
                Some(id) => id,
                None => {
                    let offset = code.bytecodes[defs[root]].offset;
                    let mut variable = Variable::local(
                        format!("{base}_{offset:02X}"),
                        slot_index,
                        false,
                        local.ty.clone(),
                    );
                    variable.original_name.clone_from(&local.name);
                    let id = variables.add(variable);
                    ids[root] = Some(id);
                    stats.variables += 1;
                    id
                }
            };
            code.bytecodes[defs[position]].variable = Some(id);
        }
        for (u, root) in bindings {
            let root = find(&mut parent, root);
            code.bytecodes[u].variable = ids[root];
        }
        stats.split += 1;
    }

    debug!(
        "{}: {} locals split into {} variables, {} kept whole",
        code.name, stats.split, stats.variables, stats.kept
    );
    Ok(stats)
}

fn find(parent: &mut [usize], mut node: usize) -> usize {
    while parent[node] != node {
        parent[node] = parent[parent[node]];
        node = parent[node];
    }
    node
}
