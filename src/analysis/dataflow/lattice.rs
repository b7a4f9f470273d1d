//! Join semi-lattice over the abstract stack and local states.
//!
//! Merging two control flow paths joins their states. The join must satisfy:
//!
//! - **Idempotent**: `x.join(x) = x`
//! - **Commutative**: `x.join(y) = y.join(x)`
//! - **Associative**: `x.join(y.join(z)) = (x.join(y)).join(z)`
//!
//! Definition sets grow by union, and [`VariableSlot::Unknown`] is the top element. The
//! lattice is finite (bounded by the number of instructions), so the fixpoint always
//! terminates.

use std::fmt::Debug;

use crate::analysis::dataflow::slots::{DefSet, StackSlot, VariableSlot};

/// A join semi-lattice with an in-place join.
pub trait JoinSemiLattice: Clone + Debug + PartialEq {
    /// Joins `other` into `self`, returning `true` if `self` changed.
    fn join_assign(&mut self, other: &Self) -> bool;

    /// Returns `true` if this is the top element.
    fn is_top(&self) -> bool;
}

impl JoinSemiLattice for DefSet {
    fn join_assign(&mut self, other: &Self) -> bool {
        self.union_with(other)
    }

    fn is_top(&self) -> bool {
        false
    }
}

impl JoinSemiLattice for StackSlot {
    /// Joins the reaching definitions; the materialized variable is not part of the state.
    fn join_assign(&mut self, other: &Self) -> bool {
        self.defs.join_assign(&other.defs)
    }

    fn is_top(&self) -> bool {
        false
    }
}

impl JoinSemiLattice for VariableSlot {
    fn join_assign(&mut self, other: &Self) -> bool {
        match other {
            VariableSlot::Unknown if self.is_unknown() => false,
            VariableSlot::Unknown => {
                *self = VariableSlot::Unknown;
                true
            }
            VariableSlot::Known(theirs) => match self {
                VariableSlot::Unknown => false,
                VariableSlot::Known(mine) => mine.join_assign(theirs),
            },
        }
    }

    fn is_top(&self) -> bool {
        self.is_unknown()
    }
}

/// Joins `other` into `target` element-wise.
///
/// Both slices must have the same length; callers check stack depths first.
pub fn join_all<T: JoinSemiLattice>(target: &mut [T], other: &[T]) -> bool {
    debug_assert_eq!(target.len(), other.len());
    let mut changed = false;
    for (mine, theirs) in target.iter_mut().zip(other) {
        changed |= mine.join_assign(theirs);
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known(indices: &[usize]) -> VariableSlot {
        let mut set = DefSet::new(8);
        for &i in indices {
            set.insert(i);
        }
        VariableSlot::Known(set)
    }

    #[test]
    fn test_unknown_is_top() {
        let mut slot = VariableSlot::Unknown;
        assert!(!slot.join_assign(&known(&[1])));
        assert!(slot.is_top());

        let mut slot = known(&[1]);
        assert!(slot.join_assign(&VariableSlot::Unknown));
        assert_eq!(slot, VariableSlot::Unknown);
    }

    #[test]
    fn test_known_union() {
        let mut slot = known(&[1]);
        assert!(slot.join_assign(&known(&[2])));
        assert_eq!(slot, known(&[1, 2]));
        assert!(!slot.join_assign(&known(&[2])));
    }

    #[test]
    fn test_join_all() {
        let mut stack = vec![StackSlot::new(DefSet::singleton(8, 0))];
        let other = vec![StackSlot::new(DefSet::singleton(8, 3))];
        assert!(join_all(&mut stack, &other));
        assert!(!join_all(&mut stack, &other));
        assert_eq!(stack[0].defs.iter().collect::<Vec<_>>(), vec![0, 3]);
    }
}
