//! Reaching definitions for the operand stack and local slots.
//!
//! The engine tracks, at every instruction, which instructions may have produced each
//! stack position and which may have last written each local slot. Stack positions are
//! treated like anonymous single-assignment temporaries, so the same machinery answers
//! both "who pushed this value" and "which store does this load see".
//!
//! - [`slots`] - [`DefSet`], [`StackSlot`] and [`VariableSlot`]
//! - [`lattice`] - the join over those states
//! - [`stack`] - the worklist fixpoint

pub mod lattice;
pub mod slots;
pub mod stack;

pub use lattice::JoinSemiLattice;
pub use slots::{DefSet, StackSlot, VariableSlot};
pub use stack::{solve, FixpointStats};
