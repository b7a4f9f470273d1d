//! Exception handler representation for CIL method bodies.
//!
//! This module provides the flags and the region record for try/catch/filter/finally/fault
//! clauses, as specified by ECMA-335. The region table is an immutable input to the
//! reconstruction engine; the structurer consumes it by index.

use bitflags::bitflags;

use crate::metadata::refs::TypeRefRc;

bitflags! {
    /// Exception handler flags defining the type of exception handling clause.
    ///
    /// These flags determine how the exception handler processes exceptions and
    /// control flow within try/catch/finally blocks.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExceptionHandlerFlags: u16 {
        /// A typed exception clause.
        ///
        /// The `catch_type` field holds the exception type that this handler catches.
        const EXCEPTION = 0x0000;

        /// An exception filter and handler clause.
        ///
        /// The filter code at `filter_offset` runs first and decides whether the
        /// handler at `handler_offset` takes the exception.
        const FILTER = 0x0001;

        /// A finally clause.
        ///
        /// Code that executes regardless of whether an exception occurs.
        const FINALLY = 0x0002;

        /// A fault clause (finally that executes only on exception).
        const FAULT = 0x0004;
    }
}

/// The kind of a handler, decoded from [`ExceptionHandlerFlags`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum HandlerKind {
    /// Typed catch clause
    Catch,
    /// Filtered catch clause
    Filter,
    /// Finally clause
    Finally,
    /// Fault clause
    Fault,
}

impl HandlerKind {
    /// Returns `true` if the handler starts with the thrown exception on the stack.
    #[must_use]
    pub const fn receives_exception(self) -> bool {
        matches!(self, HandlerKind::Catch | HandlerKind::Filter)
    }
}

/// Exception handler defining a protected region and the code that handles it.
///
/// # Layout in IL
///
/// ```text
/// try {
///     // try_offset -> try_offset + try_length
/// }
/// filter {
///     // filter_offset -> handler_offset (filter clauses only)
/// }
/// catch (ExceptionType) {
///     // handler_offset -> handler_offset + handler_length
/// }
/// ```
///
/// # Examples
///
/// ```rust
/// use cilast::metadata::method::{ExceptionHandler, HandlerKind};
///
/// let finally = ExceptionHandler::finally(0x00, 0x10, 0x10, 0x18);
/// assert_eq!(finally.kind(), HandlerKind::Finally);
/// assert_eq!(finally.try_end(), 0x10);
/// assert_eq!(finally.handler_end(), 0x18);
/// ```
///
/// # References
/// - ECMA-335 6th Edition, Partition II, Section 25.4.6 - Exception Handling
#[derive(Debug, Clone)]
pub struct ExceptionHandler {
    /// Flags describing the type of exception handler (catch, filter, finally, fault).
    pub flags: ExceptionHandlerFlags,
    /// Offset in bytes of try block from start of method body.
    pub try_offset: u32,
    /// Length in bytes of the try block.
    pub try_length: u32,
    /// Location of the handler for this try block.
    pub handler_offset: u32,
    /// Size of the handler code in bytes.
    pub handler_length: u32,
    /// If flags == EXCEPTION, then this type will handle the exception.
    pub catch_type: Option<TypeRefRc>,
    /// Offset in method body for filter-based exception handler.
    pub filter_offset: u32,
}

impl ExceptionHandler {
    /// Creates a typed catch clause from absolute offsets.
    #[must_use]
    pub fn catch(
        try_start: u32,
        try_end: u32,
        handler_start: u32,
        handler_end: u32,
        catch_type: Option<TypeRefRc>,
    ) -> Self {
        ExceptionHandler {
            flags: ExceptionHandlerFlags::EXCEPTION,
            try_offset: try_start,
            try_length: try_end - try_start,
            handler_offset: handler_start,
            handler_length: handler_end - handler_start,
            catch_type,
            filter_offset: 0,
        }
    }

    /// Creates a filter clause from absolute offsets.
    ///
    /// The filter code occupies `filter_start..handler_start`.
    #[must_use]
    pub fn filter(
        try_start: u32,
        try_end: u32,
        filter_start: u32,
        handler_start: u32,
        handler_end: u32,
    ) -> Self {
        ExceptionHandler {
            flags: ExceptionHandlerFlags::FILTER,
            try_offset: try_start,
            try_length: try_end - try_start,
            handler_offset: handler_start,
            handler_length: handler_end - handler_start,
            catch_type: None,
            filter_offset: filter_start,
        }
    }

    /// Creates a finally clause from absolute offsets.
    #[must_use]
    pub fn finally(try_start: u32, try_end: u32, handler_start: u32, handler_end: u32) -> Self {
        ExceptionHandler {
            flags: ExceptionHandlerFlags::FINALLY,
            try_offset: try_start,
            try_length: try_end - try_start,
            handler_offset: handler_start,
            handler_length: handler_end - handler_start,
            catch_type: None,
            filter_offset: 0,
        }
    }

    /// Creates a fault clause from absolute offsets.
    #[must_use]
    pub fn fault(try_start: u32, try_end: u32, handler_start: u32, handler_end: u32) -> Self {
        ExceptionHandler {
            flags: ExceptionHandlerFlags::FAULT,
            try_offset: try_start,
            try_length: try_end - try_start,
            handler_offset: handler_start,
            handler_length: handler_end - handler_start,
            catch_type: None,
            filter_offset: 0,
        }
    }

    /// Decodes the handler kind.
    ///
    /// `EXCEPTION` is the all-zero flag value, so it is the fallback when none of the
    /// other bits are present.
    #[must_use]
    pub fn kind(&self) -> HandlerKind {
        if self.flags.contains(ExceptionHandlerFlags::FILTER) {
            HandlerKind::Filter
        } else if self.flags.contains(ExceptionHandlerFlags::FINALLY) {
            HandlerKind::Finally
        } else if self.flags.contains(ExceptionHandlerFlags::FAULT) {
            HandlerKind::Fault
        } else {
            HandlerKind::Catch
        }
    }

    /// End offset (exclusive) of the protected region.
    #[must_use]
    pub const fn try_end(&self) -> u32 {
        self.try_offset + self.try_length
    }

    /// End offset (exclusive) of the handler.
    #[must_use]
    pub const fn handler_end(&self) -> u32 {
        self.handler_offset + self.handler_length
    }
}
