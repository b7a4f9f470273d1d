//! Reconstruction of many methods at once.
//!
//! Methods are independent, so with [`BuildOptions::parallel`] the batch is spread over
//! the rayon thread pool. Results come back in input order either way, and one failing
//! method never affects the others.

use log::{info, warn};
use rayon::prelude::*;

use crate::{
    analysis::{builder::AstBuilder, options::BuildOptions},
    ast::MethodAst,
    metadata::{method::MethodBody, resolver::OperandResolver},
    Result,
};

/// The result of reconstructing one method of a batch.
#[derive(Debug)]
pub struct MethodOutcome {
    /// Name of the method body
    pub name: String,
    /// The tree, or the reason reconstruction failed
    pub result: Result<MethodAst>,
}

impl MethodOutcome {
    /// Returns `true` if the method was reconstructed.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Reconstructs every body in `bodies`, one [`MethodOutcome`] per body in input order.
///
/// # Examples
///
/// ```rust
/// use cilast::analysis::{build_methods, BuildOptions};
/// use cilast::assembly::InstructionAssembler;
/// use cilast::metadata::{method::MethodBody, resolver::ReferenceTable};
///
/// let mut asm = InstructionAssembler::new();
/// asm.ret()?;
/// let bodies = vec![MethodBody::new("Demo::Nothing", asm.finish()?.instructions)];
///
/// let outcomes = build_methods(&bodies, &ReferenceTable::new(), BuildOptions::default());
/// assert!(outcomes[0].is_ok());
/// # Ok::<(), cilast::Error>(())
/// ```
pub fn build_methods<R: OperandResolver>(
    bodies: &[MethodBody],
    resolver: &R,
    options: BuildOptions,
) -> Vec<MethodOutcome> {
    let build = |body: &MethodBody| {
        let result = AstBuilder::new(body, resolver, options).build();
        if let Err(error) = &result {
            warn!("{}: {}", body.name, error);
        }
        MethodOutcome {
            name: body.name.clone(),
            result,
        }
    };

    let outcomes: Vec<MethodOutcome> = if options.parallel {
        bodies.par_iter().map(build).collect()
    } else {
        bodies.iter().map(build).collect()
    };

    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
    info!(
        "Reconstructed {} of {} methods",
        outcomes.len() - failed,
        outcomes.len()
    );
    outcomes
}
