//! Abstract state tracked per stack position and per local slot.
//!
//! Definitions are bytecode indices in the method's arena. A [`DefSet`] is a compact
//! bit vector over that index space (64 definitions per word), so merging the states of
//! two paths is a word-wise OR.

use std::fmt;

use crate::ast::VariableId;

/// A set of reaching definitions, as bytecode indices.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DefSet {
    words: Vec<u64>,
    capacity: usize,
}

impl DefSet {
    /// Creates an empty set able to hold indices `0..capacity`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        DefSet {
            words: vec![0; capacity.div_ceil(64)],
            capacity,
        }
    }

    /// Creates the set `{index}`.
    #[must_use]
    pub fn singleton(capacity: usize, index: usize) -> Self {
        let mut set = Self::new(capacity);
        set.insert(index);
        set
    }

    /// Adds a definition.
    ///
    /// # Panics
    ///
    /// Panics if `index` is outside the arena the set was created for.
    pub fn insert(&mut self, index: usize) {
        assert!(index < self.capacity, "definition index out of bounds");
        self.words[index / 64] |= 1u64 << (index % 64);
    }

    /// Returns `true` if `index` is one of the definitions.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        index < self.capacity && self.words[index / 64] & (1u64 << (index % 64)) != 0
    }

    /// Number of definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Returns `true` if there are no definitions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Returns the definition if there is exactly one.
    #[must_use]
    pub fn single(&self) -> Option<usize> {
        let mut iter = self.iter();
        match (iter.next(), iter.next()) {
            (Some(index), None) => Some(index),
            _ => None,
        }
    }

    /// Adds all definitions of `other`. Returns `true` if `self` changed.
    pub fn union_with(&mut self, other: &Self) -> bool {
        debug_assert_eq!(self.capacity, other.capacity);
        let mut changed = false;
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            let old = *a;
            *a |= *b;
            changed |= old != *a;
        }
        changed
    }

    /// Iterates over the definitions in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(w, &word)| {
            (0..64)
                .filter(move |bit| word & (1u64 << bit) != 0)
                .map(move |bit| w * 64 + bit)
        })
    }
}

impl fmt::Debug for DefSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// One position of the abstract operand stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackSlot {
    /// Instructions whose push may have produced the value
    pub defs: DefSet,
    /// Temporary the value is read from, once materialized
    pub load_from: Option<VariableId>,
}

impl StackSlot {
    /// Creates an unmaterialized slot.
    #[must_use]
    pub fn new(defs: DefSet) -> Self {
        StackSlot {
            defs,
            load_from: None,
        }
    }
}

/// The abstract state of one local slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableSlot {
    /// The slot holds a value written by one of these definitions
    Known(DefSet),
    /// Anything may have written the slot: handler entry, after `leave`, or method entry
    Unknown,
}

impl VariableSlot {
    /// Returns the definitions, or `None` if the state is unknown.
    #[must_use]
    pub fn defs(&self) -> Option<&DefSet> {
        match self {
            VariableSlot::Known(defs) => Some(defs),
            VariableSlot::Unknown => None,
        }
    }

    /// Returns `true` for [`VariableSlot::Unknown`].
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        matches!(self, VariableSlot::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defset_basic() {
        let mut set = DefSet::new(130);
        assert!(set.is_empty());
        set.insert(3);
        set.insert(64);
        set.insert(129);
        assert_eq!(set.len(), 3);
        assert!(set.contains(64));
        assert!(!set.contains(65));
        assert!(!set.contains(500));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![3, 64, 129]);
        assert_eq!(set.single(), None);
        assert_eq!(format!("{set:?}"), "{3, 64, 129}");
    }

    #[test]
    fn test_defset_union() {
        let mut a = DefSet::singleton(10, 1);
        let b = DefSet::singleton(10, 7);
        assert_eq!(a.single(), Some(1));
        assert!(a.union_with(&b));
        assert!(!a.union_with(&b));
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![1, 7]);
    }

    #[test]
    fn test_variable_slot() {
        let known = VariableSlot::Known(DefSet::singleton(4, 2));
        assert_eq!(known.defs().and_then(DefSet::single), Some(2));
        assert!(!known.is_unknown());
        assert!(VariableSlot::Unknown.defs().is_none());
    }
}
