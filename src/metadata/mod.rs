//! Metadata consumed by the reconstruction engine.
//!
//! The engine does not read assemblies itself. A method body provider hands it fully
//! decoded [`method::MethodBody`] values, and an [`resolver::OperandResolver`] turns the
//! metadata tokens found in operands into opaque reference payloads.
//!
//! # Key Components
//!
//! - [`token`] - Raw metadata tokens as found in instruction operands
//! - [`refs`] - Resolved type, field and method references
//! - [`resolver`] - Token resolution, including a thread-safe memoizing cache
//! - [`method`] - Method bodies, declared locals and parameters, exception regions

pub mod method;
pub mod refs;
pub mod resolver;
pub mod token;
