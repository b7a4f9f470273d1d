//! Flat emission of straight-line instruction runs.
//!
//! Each reachable instruction becomes one statement. Its consumed stack slots turn into
//! `ldloc` arguments of the temporaries chosen by the materializer, and its pushed value
//! is stored into the temporaries its consumers load from.

use crate::{
    analysis::{
        bytecode::{ByteCode, MethodCode},
        normalize::NormalizedOperand,
    },
    ast::{
        AstCode, AstExpression, AstLabel, AstNode, AstOperand, IlRange, LabelId, Variable,
        VariableId, VariableTable,
    },
    Error, Result,
};

pub(crate) struct Emitter<'a> {
    code: &'a MethodCode,
    variables: &'a mut VariableTable,
}

impl<'a> Emitter<'a> {
    pub(crate) fn new(code: &'a MethodCode, variables: &'a mut VariableTable) -> Self {
        Emitter { code, variables }
    }

    pub(crate) fn code(&self) -> &'a MethodCode {
        self.code
    }

    pub(crate) fn variables(&mut self) -> &mut VariableTable {
        &mut *self.variables
    }

    /// Emits the instructions at `indices`, in order, without any region structure.
    pub(crate) fn flat(&mut self, indices: &[usize]) -> Result<Vec<AstNode>> {
        let code = self.code;
        let mut nodes = Vec::with_capacity(indices.len());
        for &index in indices {
            let bc = &code.bytecodes[index];
            if bc.stack_before.is_none() {
                continue;
            }
            if bc.is_branch_target {
                nodes.push(AstNode::Label(AstLabel {
                    id: LabelId(bc.offset),
                    location: bc.location.clone(),
                }));
            }

            let expr = self.expression(bc)?;
            match bc.store_to.as_slice() {
                [] => nodes.push(expr.into()),
                [target] => nodes.push(AstExpression::store(*target, expr).into()),
                targets => {
                    let shared = self
                        .variables
                        .add(Variable::generated(format!("expr_{:02X}", bc.offset), None));
                    nodes.push(AstExpression::store(shared, expr).into());
                    for &target in targets.iter().rev() {
                        let mut load = AstExpression::load(shared);
                        load.location.clone_from(&bc.location);
                        nodes.push(AstExpression::store(target, load).into());
                    }
                }
            }
        }
        Ok(nodes)
    }

    fn expression(&self, bc: &ByteCode) -> Result<AstExpression> {
        let mut arguments = Vec::new();
        for slot in bc.popped_slots() {
            let Some(variable) = slot.load_from else {
                return Err(malformed_error!(
                    "{}: IL_{:02X} consumes a slot without a temporary",
                    self.code.name,
                    bc.offset
                ));
            };
            let mut load = AstExpression::load(variable);
            load.location.clone_from(&bc.location);
            arguments.push(load);
        }

        Ok(AstExpression {
            code: bc.code,
            operand: self.operand(bc)?,
            arguments,
            prefixes: bc.prefixes.clone(),
            il_range: Some(IlRange {
                start: bc.offset,
                end: bc.end_offset,
            }),
            location: bc.location.clone(),
        })
    }

    fn operand(&self, bc: &ByteCode) -> Result<AstOperand> {
        Ok(match &bc.operand {
            NormalizedOperand::None => AstOperand::None,
            NormalizedOperand::Int32(v) => AstOperand::Int32(*v),
            NormalizedOperand::Int64(v) => AstOperand::Int64(*v),
            NormalizedOperand::Float32(v) => AstOperand::Float32(*v),
            NormalizedOperand::Float64(v) => AstOperand::Float64(*v),
            NormalizedOperand::String(s) => AstOperand::String(s.clone()),
            NormalizedOperand::Target(target) => AstOperand::Label(self.label(bc, *target)?),
            NormalizedOperand::Targets(targets) => AstOperand::Labels(
                targets
                    .iter()
                    .map(|&target| self.label(bc, target))
                    .collect::<Result<_>>()?,
            ),
            NormalizedOperand::Local(_) | NormalizedOperand::Argument(_) => {
                match bc.variable {
                    Some(variable) => AstOperand::Variable(variable),
                    None => {
                        return Err(malformed_error!(
                            "{}: IL_{:02X} {} was never bound to a variable",
                            self.code.name,
                            bc.offset,
                            bc.operand
                        ))
                    }
                }
            }
            NormalizedOperand::Field(field) => AstOperand::Field(field.clone()),
            NormalizedOperand::Method(method) => AstOperand::Method(method.clone()),
            NormalizedOperand::Type(ty) => AstOperand::Type(ty.clone()),
            NormalizedOperand::Member(member) => AstOperand::Member(member.clone()),
            NormalizedOperand::Primitive(element) => AstOperand::Primitive(*element),
        })
    }

    fn label(&self, bc: &ByteCode, target: u32) -> Result<LabelId> {
        match self.code.index_of(target) {
            Some(index) if self.code.bytecodes[index].is_branch_target => Ok(LabelId(target)),
            _ => Err(Error::MissingLabel {
                method: self.code.name.clone(),
                offset: bc.offset,
            }),
        }
    }
}

/// Returns `true` if `node` is `pop(ldloc variable)`.
pub(crate) fn is_pop_of(node: &AstNode, variable: VariableId) -> bool {
    matches!(
        node,
        AstNode::Expression(expr)
            if expr.code == AstCode::Pop
                && expr.arguments.len() == 1
                && expr.arguments[0].is_load_of(variable)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::materialize::materialize,
        assembly::InstructionAssembler,
        metadata::method::MethodBody,
        test::solved,
    };

    fn emit(asm: InstructionAssembler, coalesce: bool) -> Result<(Vec<AstNode>, VariableTable)> {
        let (_, mut code) = solved(asm, MethodBody::new("Test::Run", Vec::new()))?;
        let mut variables = VariableTable::new();
        materialize(&mut code, &mut variables, coalesce)?;
        let nodes = Emitter::new(&code, &mut variables).flat(&code.live)?;
        Ok((nodes, variables))
    }

    fn store_target<'v>(node: &AstNode, variables: &'v VariableTable) -> &'v str {
        let expr = node.as_expression().unwrap();
        assert_eq!(expr.code, AstCode::Stloc);
        variables[expr.variable().unwrap()].name.as_str()
    }

    #[test]
    fn test_shared_value_is_copied_to_each_consumer() -> Result<()> {
        let mut asm = InstructionAssembler::new();
        asm.ldc_i4_1()?.dup()?.add()?.pop()?.ret()?;
        let (nodes, variables) = emit(asm, false)?;

        assert_eq!(nodes.len(), 7);
        let shared = nodes[1].as_expression().unwrap();
        assert_eq!(store_target(&nodes[1], &variables), "expr_01");
        assert_eq!(shared.arguments[0].code, AstCode::Dup);
        assert_eq!(shared.arguments[0].il_range, Some(IlRange { start: 1, end: 2 }));

        let shared = shared.variable().unwrap();
        assert_eq!(store_target(&nodes[2], &variables), "arg_02_1");
        assert_eq!(store_target(&nodes[3], &variables), "arg_02_0");
        for node in &nodes[2..4] {
            assert!(node.as_expression().unwrap().arguments[0].is_load_of(shared));
        }
        assert_eq!(store_target(&nodes[4], &variables), "arg_03_0");
        Ok(())
    }

    #[test]
    fn test_coalesced_value_is_stored_once() -> Result<()> {
        let mut asm = InstructionAssembler::new();
        asm.ldc_i4_1()?.dup()?.add()?.pop()?.ret()?;
        let (nodes, variables) = emit(asm, true)?;

        assert_eq!(nodes.len(), 5);
        assert_eq!(store_target(&nodes[1], &variables), "expr_01");
        let add = &nodes[2].as_expression().unwrap().arguments[0];
        assert_eq!(add.code, AstCode::Add);
        let expr = nodes[1].as_expression().unwrap().variable().unwrap();
        assert!(add.arguments.iter().all(|arg| arg.is_load_of(expr)));
        Ok(())
    }

    #[test]
    fn test_label_precedes_branch_target() -> Result<()> {
        let mut asm = InstructionAssembler::new();
        asm.br_s("end")?.nop()?.label("end")?.ret()?;
        let (nodes, _) = emit(asm, true)?;

        assert_eq!(nodes.len(), 3);
        let br = nodes[0].as_expression().unwrap();
        assert_eq!(br.operand, AstOperand::Label(LabelId(3)));
        assert!(matches!(&nodes[1], AstNode::Label(label) if label.id == LabelId(3)));
        assert_eq!(nodes[2].as_expression().unwrap().code, AstCode::Ret);
        Ok(())
    }

    #[test]
    fn test_unlabelled_target_is_reported() -> Result<()> {
        let mut asm = InstructionAssembler::new();
        asm.br_s("end")?.label("end")?.ret()?;
        let (_, mut code) = solved(asm, MethodBody::new("Test::Run", Vec::new()))?;
        let mut variables = VariableTable::new();
        materialize(&mut code, &mut variables, true)?;
        code.bytecodes[1].is_branch_target = false;

        let result = Emitter::new(&code, &mut variables).flat(&code.live);
        assert!(matches!(result, Err(Error::MissingLabel { offset: 0, .. })));
        Ok(())
    }

    #[test]
    fn test_pop_of_detection() {
        let variable = VariableId(0);
        let pop = AstExpression {
            arguments: vec![AstExpression::load(variable)],
            ..AstExpression::new(AstCode::Pop, AstOperand::None)
        };
        assert!(is_pop_of(&pop.clone().into(), variable));
        assert!(!is_pop_of(&pop.into(), VariableId(1)));
        assert!(!is_pop_of(&AstExpression::load(variable).into(), variable));
    }
}
