//! Reconstruction of tree-shaped method bodies from stack-based CIL.
//!
//! # Architecture
//!
//! The pipeline runs once per method, each stage refining one shared instruction
//! arena ([`bytecode::MethodCode`]):
//!
//! - [`normalize`] - canonical opcodes, merged prefixes, stack effects
//! - [`bytecode`] - the arena, branch and region validation, exception pseudo instructions
//! - [`dataflow`] - reaching definitions for stack slots and locals, unreachable code
//! - [`materialize`] - named temporaries for the operand stack
//! - [`split`] - one variable per independent use of a local slot
//! - [`params`] - parameter variables in place of argument accesses
//! - [`structure`] - nested try/catch regions and the final tree
//!
//! [`AstBuilder`] drives these stages for one method and [`build_methods`] for many.
//! [`BuildOptions`] tunes how many variables the result uses.
//!
//! # Usage
//!
//! ```rust
//! use cilast::analysis::{AstBuilder, BuildOptions};
//! use cilast::assembly::InstructionAssembler;
//! use cilast::metadata::{method::MethodBody, resolver::ReferenceTable};
//!
//! let mut asm = InstructionAssembler::new();
//! asm.ldc_i4_0()?.brtrue_s("one")?.ldc_i4_2()?.br_s("join")?;
//! asm.label("one")?.ldc_i4_1()?;
//! asm.label("join")?.pop()?.ret()?;
//! let body = MethodBody::new("Demo::Choose", asm.finish()?.instructions);
//!
//! let ast = AstBuilder::new(&body, &ReferenceTable::new(), BuildOptions::default()).build()?;
//! println!("{ast}");
//! # Ok::<(), cilast::Error>(())
//! ```

pub mod batch;
pub mod builder;
pub mod bytecode;
pub mod dataflow;
mod emit;
pub mod materialize;
pub mod normalize;
pub mod options;
pub mod params;
pub mod split;
pub mod structure;

pub use batch::{build_methods, MethodOutcome};
pub use builder::AstBuilder;
pub use normalize::{normalize, NormalizedInstruction, NormalizedOperand};
pub use options::BuildOptions;
