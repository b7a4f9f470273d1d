//! Method-level inputs to the reconstruction engine.
//!
//! # Key Components
//!
//! - [`MethodBody`] - Instructions, locals, parameters and exception regions of one method
//! - [`ExceptionHandler`] - One entry of the exception region table
//! - [`LocalDef`] / [`ParameterDef`] - Declared variable slots

mod body;
mod exceptions;

pub use body::{LocalDef, MethodBody, MethodFlags, ParameterDef};
pub use exceptions::{ExceptionHandler, ExceptionHandlerFlags, HandlerKind};
