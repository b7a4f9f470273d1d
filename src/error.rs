use thiserror::Error;

use crate::metadata::token::Token;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Every failure while reconstructing a method body is fatal for that one method. The
/// method-scoped variants carry the method name and the IL offset of the offending
/// instruction, so a caller compiling many methods can report the failure and move on.
///
/// # Error Categories
///
/// ## Malformed input
/// - [`Error::StackMismatch`] - Two control flow paths merge with different stack depths
/// - [`Error::StackUnderflow`] - An instruction pops more values than the stack holds
/// - [`Error::InvalidBranchTarget`] - A branch lands between instruction boundaries
/// - [`Error::InvalidHandlerOffset`] - An exception region points at no instruction
/// - [`Error::FallthroughAtEnd`] - Execution can run off the end of the method body
/// - [`Error::InvalidOperand`] - The operand does not match what the opcode expects
///
/// ## Unsupported constructs
/// - [`Error::Unsupported`] - An opcode without defined stack behaviour in this position
///
/// ## Internal consistency
/// - [`Error::Malformed`] - An invariant of the engine itself was violated
/// - [`Error::MissingLabel`] - A branch references an instruction that never got a label
///
/// ## Collaborators
/// - [`Error::UnresolvedToken`] - The operand resolver does not know a metadata token
/// - [`Error::UnresolvedOperand`] - The same, raised for an instruction of a method
/// - [`Error::UndefinedLabel`] / [`Error::DuplicateLabel`] - Misuse of the instruction assembler
///
/// # Examples
///
/// ```rust,ignore
/// use cilast::{analysis::AstBuilder, Error};
///
/// match AstBuilder::new(&body, &resolver, options).build() {
///     Ok(ast) => println!("{}", ast),
///     Err(Error::StackMismatch { method, offset, .. }) => {
///         eprintln!("{method}: inconsistent stack at IL_{offset:02X}");
///     }
///     Err(e) => eprintln!("{e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// An internal invariant of the reconstruction engine was violated.
    ///
    /// This indicates either input the earlier checks did not catch or a bug in the
    /// engine. The error includes the source location where the violation was detected.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Two control flow paths reach the same instruction with different stack depths.
    #[error("Inconsistent stack size in {method} at IL_{offset:02X}: expected {expected}, found {found}")]
    StackMismatch {
        /// Method being reconstructed
        method: String,
        /// Offset of the instruction whose successor disagreed
        offset: u32,
        /// Depth already recorded at the merge point
        expected: usize,
        /// Depth arriving along the new edge
        found: usize,
    },

    /// An instruction pops more values than the evaluation stack holds.
    #[error("Stack underflow in {method} at IL_{offset:02X}: needs {needed}, has {available}")]
    StackUnderflow {
        /// Method being reconstructed
        method: String,
        /// Offset of the popping instruction
        offset: u32,
        /// Number of values the instruction pops
        needed: usize,
        /// Number of values on the stack
        available: usize,
    },

    /// A branch targets an offset that is not the start of an instruction.
    #[error("Branch in {method} at IL_{offset:02X} targets IL_{target:02X}, which is not an instruction")]
    InvalidBranchTarget {
        /// Method being reconstructed
        method: String,
        /// Offset of the branch
        offset: u32,
        /// The target offset
        target: u32,
    },

    /// An exception region references an offset with no instruction.
    #[error("Exception handler in {method} references IL_{offset:02X}, which is not an instruction")]
    InvalidHandlerOffset {
        /// Method being reconstructed
        method: String,
        /// The dangling offset
        offset: u32,
    },

    /// The last instruction of the body does not end control flow.
    #[error("Control falls off the end of {method} at IL_{offset:02X}")]
    FallthroughAtEnd {
        /// Method being reconstructed
        method: String,
        /// Offset of the last instruction
        offset: u32,
    },

    /// The instruction has no defined stack behaviour in this position.
    #[error("Unsupported instruction '{mnemonic}' in {method} at IL_{offset:02X}")]
    Unsupported {
        /// Method being reconstructed
        method: String,
        /// Offset of the instruction
        offset: u32,
        /// Mnemonic of the instruction
        mnemonic: &'static str,
    },

    /// The operand attached to an instruction does not match its opcode.
    #[error("Invalid operand for '{mnemonic}' in {method} at IL_{offset:02X}: {message}")]
    InvalidOperand {
        /// Method being reconstructed
        method: String,
        /// Offset of the instruction
        offset: u32,
        /// Mnemonic of the instruction
        mnemonic: &'static str,
        /// What was wrong with the operand
        message: String,
    },

    /// A branch target was reached without a label having been created for it.
    #[error("Branch in {method} at IL_{offset:02X} references an unlabelled instruction")]
    MissingLabel {
        /// Method being reconstructed
        method: String,
        /// Offset of the branch
        offset: u32,
    },

    /// The operand resolver could not resolve a metadata token.
    #[error("Failed to resolve token - {0}")]
    UnresolvedToken(Token),

    /// An instruction operand references a token the resolver does not know.
    #[error("Unresolved token {token} in {method} at IL_{offset:02X}")]
    UnresolvedOperand {
        /// Method being reconstructed
        method: String,
        /// Offset of the instruction, or of its prefix
        offset: u32,
        /// The unknown token
        token: Token,
    },

    /// The instruction assembler was asked to branch to a label that was never placed.
    #[error("Undefined label - {0}")]
    UndefinedLabel(String),

    /// The instruction assembler was asked to place the same label twice.
    #[error("Duplicate label - {0}")]
    DuplicateLabel(String),
}

impl Error {
    /// Returns the name of the method this error belongs to, if it is method-scoped.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        match self {
            Error::StackMismatch { method, .. }
            | Error::StackUnderflow { method, .. }
            | Error::InvalidBranchTarget { method, .. }
            | Error::InvalidHandlerOffset { method, .. }
            | Error::FallthroughAtEnd { method, .. }
            | Error::Unsupported { method, .. }
            | Error::InvalidOperand { method, .. }
            | Error::MissingLabel { method, .. }
            | Error::UnresolvedOperand { method, .. } => Some(method),
            _ => None,
        }
    }

    /// Returns the IL offset the error points at, if there is one.
    #[must_use]
    pub fn offset(&self) -> Option<u32> {
        match self {
            Error::StackMismatch { offset, .. }
            | Error::StackUnderflow { offset, .. }
            | Error::InvalidBranchTarget { offset, .. }
            | Error::InvalidHandlerOffset { offset, .. }
            | Error::FallthroughAtEnd { offset, .. }
            | Error::Unsupported { offset, .. }
            | Error::InvalidOperand { offset, .. }
            | Error::MissingLabel { offset, .. }
            | Error::UnresolvedOperand { offset, .. } => Some(*offset),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_context() {
        let err = Error::StackMismatch {
            method: "Foo::Bar".to_string(),
            offset: 0x1A,
            expected: 1,
            found: 2,
        };
        assert_eq!(err.method(), Some("Foo::Bar"));
        assert_eq!(err.offset(), Some(0x1A));
        assert_eq!(
            err.to_string(),
            "Inconsistent stack size in Foo::Bar at IL_1A: expected 1, found 2"
        );
    }

    #[test]
    fn test_malformed_macro() {
        let err = malformed_error!("slot {} unbound", 3);
        match &err {
            Error::Malformed { message, file, .. } => {
                assert_eq!(message, "slot 3 unbound");
                assert!(file.ends_with("error.rs"));
            }
            _ => panic!("Expected Error::Malformed"),
        }
        assert!(err.method().is_none());
        assert!(err.offset().is_none());
    }
}
