//! Tree reconstruction configuration
//!
//! The switches here decide how aggressively the engine turns stack traffic and local
//! slots into separate variables. None of them changes what a method computes; they only
//! change how many variables the tree uses to express it.

/// Configuration for [`crate::analysis::AstBuilder`] and [`crate::analysis::build_methods`]
///
/// # Examples
///
/// ```rust
/// use cilast::analysis::BuildOptions;
///
/// let options = BuildOptions::debug();
/// assert!(!options.split_variables);
/// assert_eq!(BuildOptions::default(), BuildOptions::production());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct BuildOptions {
    /// Split local slots into one variable per definition where this is provably safe.
    /// When disabled every local slot maps to exactly one variable.
    pub split_variables: bool,

    /// Bind a fresh exception variable to catch handlers that discard the exception
    /// immediately, instead of leaving the handler without one
    pub always_generate_exception_variable: bool,

    /// Merge the temporaries of a value that is consumed along several paths
    /// (typically `dup`) into one shared temporary
    pub coalesce_temporaries: bool,

    /// Reconstruct independent methods on the rayon thread pool in batch mode
    pub parallel: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            split_variables: true,
            always_generate_exception_variable: false,
            coalesce_temporaries: true,
            parallel: true,
        }
    }
}

impl BuildOptions {
    /// Creates a configuration that keeps the tree as close to the raw instruction
    /// stream as possible
    ///
    /// No splitting, no coalescing, a variable for every caught exception, and
    /// sequential batch processing so log output stays in method order.
    #[must_use]
    pub fn debug() -> Self {
        Self {
            split_variables: false,
            always_generate_exception_variable: true,
            coalesce_temporaries: false,
            parallel: false,
        }
    }

    /// Creates the configuration used by the compilation pipeline
    #[must_use]
    pub fn production() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_options_presets() {
        let debug = BuildOptions::debug();
        assert!(!debug.split_variables);
        assert!(!debug.coalesce_temporaries);
        assert!(debug.always_generate_exception_variable);
        assert!(!debug.parallel);

        let production = BuildOptions::production();
        assert!(production.split_variables);
        assert!(production.coalesce_temporaries);
        assert!(!production.always_generate_exception_variable);
        assert!(production.parallel);
    }

    #[test]
    fn test_default_options() {
        assert_eq!(BuildOptions::default(), BuildOptions::production());
    }
}
