// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # cilast
//!
//! Turns the stack-based CIL instruction stream of a .NET method into a tree of
//! expressions over named variables, the first step of compiling CIL to a register or
//! expression based target.
//!
//! ## Features
//!
//! - **Stack elimination** - every operand stack slot becomes an explicit temporary
//! - **Local splitting** - a reused local slot becomes one variable per independent value
//! - **Structured regions** - exception tables become properly nested try/catch/finally
//!   blocks, filters included
//! - **Deterministic output** - identical input yields an identical tree and identical
//!   variable names
//! - **Batch mode** - many methods reconstructed in parallel on the rayon thread pool
//!
//! ## Quick Start
//!
//! ```rust
//! use cilast::prelude::*;
//!
//! // x = 1 + 2; return x;
//! let mut asm = InstructionAssembler::new();
//! asm.ldc_i4_1()?.ldc_i4_2()?.add()?.stloc_0()?.ldloc_0()?.ret()?;
//!
//! let body = MethodBody::new("Demo::Three", asm.finish()?.instructions)
//!     .with_flags(MethodFlags::RETURNS_VALUE)
//!     .with_locals(vec![LocalDef::named("x")]);
//!
//! let ast = AstBuilder::new(&body, &ReferenceTable::new(), BuildOptions::default()).build()?;
//! println!("{ast}");
//! # Ok::<(), cilast::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`metadata`] - method bodies, exception regions, token resolution
//! - [`assembly`] - CIL opcodes, decoded instructions and an assembler for building them
//! - [`analysis`] - the reconstruction pipeline
//! - [`ast`] - the resulting tree and its variables
//! - [`prelude`] - the commonly used types in one import
//!
//! ## Error Handling
//!
//! Malformed input fails the affected method with an [`Error`] naming the method and the
//! offending IL offset. Nothing is repaired silently.
//!
//! ```rust
//! use cilast::{analysis::{AstBuilder, BuildOptions}, assembly::InstructionAssembler, Error};
//! use cilast::metadata::{method::MethodBody, resolver::ReferenceTable};
//!
//! let mut asm = InstructionAssembler::new();
//! asm.add()?.ret()?;
//! let body = MethodBody::new("Demo::Broken", asm.finish()?.instructions);
//!
//! match AstBuilder::new(&body, &ReferenceTable::new(), BuildOptions::default()).build() {
//!     Err(Error::StackUnderflow { offset, .. }) => assert_eq!(offset, 0),
//!     other => panic!("unexpected: {other:?}"),
//! }
//! # Ok::<(), cilast::Error>(())
//! ```
//!
//! ## Logging
//!
//! Pipeline stages report through the [`log`](https://docs.rs/log) facade: `debug` per
//! stage and method, `trace` for the converged per-instruction state, `warn` for
//! tolerated irregularities. Install any logger to see them.

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use cilast::prelude::*;
///
/// let options = BuildOptions::debug();
/// assert!(options.always_generate_exception_variable);
/// ```
pub mod prelude;

/// CIL instructions as handed to the engine
///
/// This module defines the raw instruction model the reconstruction consumes:
///
/// - **Opcodes**: every ECMA-335 opcode with its operand encoding
/// - **Instructions**: offset, size, opcode, decoded operand and optional source location
/// - **Assembler**: a fluent builder producing instruction streams with resolved labels
///
/// # Examples
///
/// ```rust
/// use cilast::assembly::InstructionAssembler;
///
/// let mut asm = InstructionAssembler::new();
/// asm.ldarg_0()?.brtrue_s("done")?.ldnull()?.throw()?;
/// asm.label("done")?.ret()?;
/// let code = asm.finish()?;
/// assert_eq!(code.instructions.len(), 5);
/// assert_eq!(code.instructions[1].operand, cilast::assembly::Operand::Target(5));
/// # Ok::<(), cilast::Error>(())
/// ```
pub mod assembly;

/// Method-level metadata consumed by the engine
///
/// # Key Components
///
/// - [`metadata::method`] - method bodies, locals, parameters, exception regions
/// - [`metadata::refs`] - resolved type, field and method references
/// - [`metadata::resolver`] - token resolution and a thread-safe resolution cache
/// - [`metadata::token`] - raw metadata tokens
pub mod metadata;

/// The reconstruction pipeline
///
/// See [`analysis::AstBuilder`] for a single method and [`analysis::build_methods`] for
/// batches.
pub mod analysis;

/// The reconstructed tree
pub mod ast;

/// `cilast` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `cilast` Error type
///
/// The error type for all operations in this crate. Variants raised for a specific
/// method carry the method name and the IL offset at fault.
pub use error::Error;
