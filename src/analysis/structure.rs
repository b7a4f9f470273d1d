//! Nests exception regions into try/catch blocks.
//!
//! The structurer works on the reachable instructions in offset order and the set of
//! regions still to place. While regions remain it takes the earliest try start and,
//! among the regions starting there, the widest try end; every region sharing exactly
//! that try range becomes one handler of a single [`AstTryCatchBlock`], in table order.
//! Everything before the try is emitted flat. Regions nested in the try range or in a
//! handler range are handed to the recursive call for that range. What remains after
//! the last region is emitted flat.

use log::trace;

use crate::{
    analysis::{
        bytecode::{HandlerEntry, MethodCode},
        emit::{is_pop_of, Emitter},
    },
    ast::{
        AstBlock, AstCatchBlock, AstExpression, AstFilterBlock, AstNode, AstTryCatchBlock,
        Variable, VariableId, VariableTable,
    },
    metadata::{
        method::{ExceptionHandler, HandlerKind},
        refs::TypeRefRc,
    },
    Result,
};

/// Builds the tree of a method from its materialized, split instruction arena.
///
/// With `always_generate_exception_variable`, a catch whose exception is popped right
/// away still gets an `ex_<OFF>` variable.
///
/// # Errors
///
/// Propagates emission errors ([`crate::Error::MissingLabel`], unbound variables).
pub fn structure(
    code: &MethodCode,
    handlers: &[ExceptionHandler],
    variables: &mut VariableTable,
    always_generate_exception_variable: bool,
) -> Result<AstBlock> {
    let mut structurer = Structurer {
        handlers,
        entries: &code.handlers,
        always_generate_exception_variable,
        emitter: Emitter::new(code, variables),
    };
    let regions = (0..handlers.len()).collect();
    let body = structurer.convert(code.live.clone(), regions)?;
    Ok(AstBlock::new(body))
}

struct Structurer<'a> {
    handlers: &'a [ExceptionHandler],
    entries: &'a [HandlerEntry],
    always_generate_exception_variable: bool,
    emitter: Emitter<'a>,
}

impl Structurer<'_> {
    fn convert(&mut self, mut body: Vec<usize>, mut regions: Vec<usize>) -> Result<Vec<AstNode>> {
        let mut ast = Vec::new();

        while let Some(try_start) = regions.iter().map(|&r| self.handlers[r].try_offset).min() {
            let try_end = regions
                .iter()
                .map(|&r| &self.handlers[r])
                .filter(|eh| eh.try_offset == try_start)
                .map(ExceptionHandler::try_end)
                .max()
                .unwrap_or(try_start);
            let mut group: Vec<usize> = regions
                .iter()
                .copied()
                .filter(|&r| {
                    let eh = &self.handlers[r];
                    eh.try_offset == try_start && eh.try_end() == try_end
                })
                .collect();
            group.sort_unstable();
            trace!(
                "{}: try IL_{:02X}..IL_{:02X} with {} handlers",
                self.emitter.code().name,
                try_start,
                try_end,
                group.len()
            );

            let before = self.cut(&mut body, 0, try_start);
            ast.extend(self.emitter.flat(&before)?);

            let nested = self.take_nested(&mut regions, try_start, try_end);
            let try_body = self.cut(&mut body, 0, try_end);
            let mut block = AstTryCatchBlock {
                try_block: AstBlock::new(self.convert(try_body, nested)?),
                ..AstTryCatchBlock::default()
            };

            for &r in &group {
                self.handler(&mut block, r, &mut body, &mut regions)?;
            }
            regions.retain(|r| !group.contains(r));
            ast.push(AstNode::TryCatch(block));
        }

        ast.extend(self.emitter.flat(&body)?);
        Ok(ast)
    }

    fn handler(
        &mut self,
        block: &mut AstTryCatchBlock,
        region: usize,
        body: &mut Vec<usize>,
        regions: &mut Vec<usize>,
    ) -> Result<()> {
        let handlers = self.handlers;
        let eh = &handlers[region];
        let entry = self.entries[region];

        let filter = match eh.kind() {
            HandlerKind::Filter => {
                let nested = self.take_nested(regions, eh.filter_offset, eh.handler_offset);
                let range = self.cut(body, eh.filter_offset, eh.handler_offset);
                let mut nodes = self.convert(range, nested)?;
                let exception_variable = self.bind_exception(
                    entry.filter_exception,
                    &mut nodes,
                    eh.filter_offset,
                    None,
                );
                Some(AstFilterBlock {
                    exception_variable,
                    body: AstBlock::new(nodes),
                })
            }
            _ => None,
        };

        let nested = self.take_nested(regions, eh.handler_offset, eh.handler_end());
        let range = self.cut(body, eh.handler_offset, eh.handler_end());
        let mut nodes = self.convert(range, nested)?;

        match eh.kind() {
            HandlerKind::Catch | HandlerKind::Filter => {
                let exception_variable = self.bind_exception(
                    entry.handler_exception,
                    &mut nodes,
                    eh.handler_offset,
                    eh.catch_type.clone(),
                );
                block.catch_blocks.push(AstCatchBlock {
                    exception_type: eh.catch_type.clone(),
                    exception_variable,
                    filter,
                    body: AstBlock::new(nodes),
                });
            }
            HandlerKind::Finally => block.finally_block = Some(AstBlock::new(nodes)),
            HandlerKind::Fault => block.fault_block = Some(AstBlock::new(nodes)),
        }
        Ok(())
    }

    /// Chooses the variable holding the exception on handler (or filter) entry and fixes
    /// up the first statements of `nodes` accordingly.
    fn bind_exception(
        &mut self,
        ldexception: Option<usize>,
        nodes: &mut Vec<AstNode>,
        offset: u32,
        ty: Option<TypeRefRc>,
    ) -> Option<VariableId> {
        let code = self.emitter.code();
        let store_to = ldexception.map_or(&[][..], |i| code.bytecodes[i].store_to.as_slice());

        match store_to {
            [] => None,
            [only] => {
                if nodes.first().is_some_and(|first| is_pop_of(first, *only)) {
                    nodes.remove(0);
                    if self.always_generate_exception_variable {
                        Some(self.exception_variable(offset, ty))
                    } else {
                        None
                    }
                } else {
                    Some(*only)
                }
            }
            targets => {
                let ex = self.exception_variable(offset, ty);
                for &target in targets {
                    nodes.insert(0, AstExpression::store(target, AstExpression::load(ex)).into());
                }
                Some(ex)
            }
        }
    }

    fn exception_variable(&mut self, offset: u32, ty: Option<TypeRefRc>) -> VariableId {
        let mut variable = Variable::generated(format!("ex_{offset:02X}"), None);
        variable.ty = ty;
        self.emitter.variables().add(variable)
    }

    /// Removes and returns the regions strictly nested in `[start, end)`.
    fn take_nested(&self, regions: &mut Vec<usize>, start: u32, end: u32) -> Vec<usize> {
        let (nested, rest): (Vec<usize>, Vec<usize>) = regions.iter().partition(|&&r| {
            let eh = &self.handlers[r];
            (start <= eh.try_offset && eh.try_end() < end)
                || (start < eh.try_offset && eh.try_end() <= end)
        });
        *regions = rest;
        nested
    }

    /// Removes and returns the instructions of `body` whose offsets fall in `[start, end)`.
    fn cut(&self, body: &mut Vec<usize>, start: u32, end: u32) -> Vec<usize> {
        let code = self.emitter.code();
        let before = |limit: u32| {
            body.iter()
                .take_while(|&&i| code.bytecodes[i].offset < limit)
                .count()
        };
        let from = before(start);
        let to = before(end).max(from);
        body.drain(from..to).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::materialize::materialize,
        assembly::InstructionAssembler,
        metadata::method::MethodBody,
        test::{exception_type, solved},
    };

    fn run(
        asm: InstructionAssembler,
        handlers: Vec<ExceptionHandler>,
        always: bool,
    ) -> Result<(AstBlock, VariableTable)> {
        let body = MethodBody::new("Test::Run", Vec::new()).with_handlers(handlers);
        let (body, mut code) = solved(asm, body)?;
        let mut variables = VariableTable::new();
        materialize(&mut code, &mut variables, true)?;
        let block = structure(&code, &body.exception_handlers, &mut variables, always)?;
        Ok((block, variables))
    }

    fn exception() -> Option<TypeRefRc> {
        Some(exception_type())
    }

    /// try { leave end } catch { pop; leave end } end: ret
    fn popping_catch() -> Result<InstructionAssembler> {
        let mut asm = InstructionAssembler::new();
        asm.leave_s("end")?
            .pop()?
            .leave_s("end")?
            .label("end")?
            .ret()?;
        Ok(asm)
    }

    #[test]
    fn test_popped_exception_has_no_variable() -> Result<()> {
        let handlers = vec![ExceptionHandler::catch(0, 2, 2, 5, exception())];
        let (block, _) = run(popping_catch()?, handlers, false)?;

        assert_eq!(block.len(), 3);
        let tc = block.body[0].as_try_catch().unwrap();
        assert_eq!(tc.try_block.len(), 1);
        assert_eq!(tc.catch_blocks.len(), 1);
        let catch = &tc.catch_blocks[0];
        assert!(catch.exception_variable.is_none());
        assert_eq!(catch.body.len(), 1);
        assert_eq!(catch.exception_type.as_ref().unwrap().name, "System.Exception");
        Ok(())
    }

    #[test]
    fn test_always_generate_exception_variable() -> Result<()> {
        let handlers = vec![ExceptionHandler::catch(0, 2, 2, 5, exception())];
        let (block, variables) = run(popping_catch()?, handlers, true)?;

        let catch = &block.body[0].as_try_catch().unwrap().catch_blocks[0];
        let ex = catch.exception_variable.unwrap();
        assert_eq!(variables[ex].name, "ex_02");
        assert_eq!(catch.body.len(), 1);
        Ok(())
    }

    #[test]
    fn test_exception_with_several_consumers() -> Result<()> {
        // the exception stays on the stack across a branch and is popped on both paths
        let mut asm = InstructionAssembler::new();
        asm.leave_s("end")?
            .ldc_i4_0()?
            .brtrue_s("other")?
            .pop()?
            .leave_s("end")?
            .label("other")?
            .pop()?
            .leave_s("end")?
            .label("end")?
            .ret()?;
        let handlers = vec![ExceptionHandler::catch(0, 2, 2, 11, exception())];
        let (block, variables) = run(asm, handlers, false)?;

        let catch = &block.body[0].as_try_catch().unwrap().catch_blocks[0];
        let ex = catch.exception_variable.unwrap();
        assert_eq!(variables[ex].name, "ex_02");
        assert_eq!(variables[ex].ty.as_ref().unwrap().name, "System.Exception");

        let copies: Vec<&str> = catch.body.body[..2]
            .iter()
            .map(|node| {
                let store = node.as_expression().unwrap();
                assert!(store.arguments[0].is_load_of(ex));
                variables[store.variable().unwrap()].name.as_str()
            })
            .collect();
        assert_eq!(copies, vec!["arg_08_0", "arg_05_0"]);
        assert_eq!(catch.body.len(), 9);
        Ok(())
    }

    #[test]
    fn test_finally_and_trailing_code() -> Result<()> {
        let mut asm = InstructionAssembler::new();
        asm.nop()?
            .leave_s("end")?
            .endfinally()?
            .label("end")?
            .ret()?;
        let (block, _) = run(asm, vec![ExceptionHandler::finally(0, 3, 3, 4)], false)?;

        let tc = block.body[0].as_try_catch().unwrap();
        assert_eq!(tc.try_block.len(), 2);
        assert!(tc.catch_blocks.is_empty());
        assert_eq!(tc.finally_block.as_ref().map(AstBlock::len), Some(1));
        assert!(matches!(block.body[1], AstNode::Label(_)));
        assert_eq!(block.body[2].as_expression().unwrap().code, crate::ast::AstCode::Ret);
        Ok(())
    }
}
