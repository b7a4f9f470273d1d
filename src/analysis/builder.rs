//! The per-method reconstruction pipeline.

use log::{debug, log_enabled, trace, Level};

use crate::{
    analysis::{
        bytecode::MethodCode,
        dataflow::solve,
        materialize::materialize,
        normalize::normalize,
        options::BuildOptions,
        params::{declare_parameters, rewrite_arguments},
        split::split_locals,
        structure::structure,
    },
    ast::{MethodAst, VariableTable},
    metadata::{method::MethodBody, resolver::OperandResolver},
    Result,
};

/// Reconstructs the tree of one method body.
///
/// The builder runs, in order: normalization, the stack and local dataflow fixpoint,
/// removal of unreachable code, stack materialization, local splitting, parameter
/// conversion and region structuring. Each stage either succeeds or fails the whole
/// method; no partial tree is ever returned.
///
/// # Examples
///
/// ```rust
/// use cilast::analysis::{AstBuilder, BuildOptions};
/// use cilast::assembly::InstructionAssembler;
/// use cilast::metadata::{method::MethodBody, resolver::ReferenceTable};
///
/// let mut asm = InstructionAssembler::new();
/// asm.ldc_i4_1()?.ldc_i4_2()?.add()?.pop()?.ret()?;
/// let body = MethodBody::new("Demo::Add", asm.finish()?.instructions);
///
/// let resolver = ReferenceTable::new();
/// let ast = AstBuilder::new(&body, &resolver, BuildOptions::default()).build()?;
/// assert_eq!(ast.body.len(), 5);
/// # Ok::<(), cilast::Error>(())
/// ```
pub struct AstBuilder<'a, R: OperandResolver> {
    body: &'a MethodBody,
    resolver: &'a R,
    options: BuildOptions,
}

impl<'a, R: OperandResolver> AstBuilder<'a, R> {
    /// Creates a builder for `body`, resolving operand tokens through `resolver`.
    #[must_use]
    pub fn new(body: &'a MethodBody, resolver: &'a R, options: BuildOptions) -> Self {
        AstBuilder {
            body,
            resolver,
            options,
        }
    }

    /// Runs the pipeline.
    ///
    /// # Errors
    ///
    /// Returns the first error any stage reports; see [`crate::Error`] for the
    /// malformed-input variants.
    pub fn build(self) -> Result<MethodAst> {
        let body = self.body;
        let instructions = normalize(body, self.resolver)?;

        let mut variables = VariableTable::new();
        if instructions.is_empty() {
            debug!("{}: empty body", body.name);
            let params = declare_parameters(body, &mut variables)?;
            return Ok(MethodAst {
                parameters: params.declared,
                this_parameter: params.this,
                variables,
                ..MethodAst::empty(body.name.clone())
            });
        }

        let mut code = MethodCode::new(body, instructions)?;
        let stats = solve(&mut code, body.locals.len())?;
        debug!(
            "{}: fixpoint after {} steps, {} merges",
            body.name, stats.iterations, stats.merges
        );

        let dropped = code.prune();
        if dropped > 0 {
            debug!("{}: {} unreachable instructions dropped", body.name, dropped);
        }

        materialize(&mut code, &mut variables, self.options.coalesce_temporaries)?;
        if log_enabled!(Level::Trace) {
            for (_, bc) in code.live_bytecodes() {
                trace!("{}", bc.dump(&variables));
            }
        }

        split_locals(&mut code, body, &mut variables, self.options.split_variables)?;
        let params = declare_parameters(body, &mut variables)?;
        rewrite_arguments(&mut code, &params)?;

        let tree = structure(
            &code,
            &body.exception_handlers,
            &mut variables,
            self.options.always_generate_exception_variable,
        )?;
        debug!(
            "{}: {} top-level nodes, {} variables",
            body.name,
            tree.len(),
            variables.len()
        );

        Ok(MethodAst {
            name: body.name.clone(),
            body: tree,
            variables,
            parameters: params.declared,
            this_parameter: params.this,
        })
    }
}
