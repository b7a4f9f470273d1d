//! Parameter variables.
//!
//! Parameters are declared up front, then every argument access is rewritten into the
//! equivalent local access on the parameter's variable, so later stages see a single
//! load/store/address-of vocabulary.

use crate::{
    analysis::{bytecode::MethodCode, normalize::NormalizedOperand},
    ast::{AstCode, Variable, VariableId, VariableTable},
    metadata::method::{MethodBody, MethodFlags},
    Result,
};

/// The parameter variables of one method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters {
    /// `this`, for instance methods
    pub this: Option<VariableId>,
    /// Declared parameters in signature order
    pub declared: Vec<VariableId>,
}

impl Parameters {
    /// Maps a raw argument index to its variable; index 0 is `this` on instance methods.
    #[must_use]
    pub fn argument(&self, index: u16) -> Option<VariableId> {
        let index = usize::from(index);
        match self.this {
            Some(this) if index == 0 => Some(this),
            Some(_) => self.declared.get(index - 1).copied(),
            None => self.declared.get(index).copied(),
        }
    }
}

/// Adds `this` and one variable per declared parameter to `variables`.
///
/// The last parameter of a property setter or event accessor is named `value`.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] if a parameter index does not fit an argument slot.
pub fn declare_parameters(body: &MethodBody, variables: &mut VariableTable) -> Result<Parameters> {
    let this = body
        .has_this()
        .then(|| variables.add(Variable::this(body.declaring_type.clone())));

    let implicit_value = body
        .flags
        .intersects(MethodFlags::SETTER | MethodFlags::EVENT_ACCESSOR);
    let last = body.parameters.len().checked_sub(1);

    let mut declared = Vec::with_capacity(body.parameters.len());
    for (i, param) in body.parameters.iter().enumerate() {
        let Ok(index) = u16::try_from(i) else {
            return Err(malformed_error!("Parameter {} out of range", i));
        };
        let name = if implicit_value && Some(i) == last {
            "value".to_string()
        } else {
            param.name.clone()
        };
        declared.push(variables.add(Variable::parameter(name, index, param.ty.clone())));
    }

    Ok(Parameters { this, declared })
}

/// Rewrites `ldarg`, `starg` and `ldarga` into `ldloc`, `stloc` and `ldloca` of the
/// parameter variables. Returns the number of rewritten instructions.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] for an argument index without a parameter.
pub fn rewrite_arguments(code: &mut MethodCode, parameters: &Parameters) -> Result<usize> {
    let mut rewritten = 0;
    for pos in 0..code.live.len() {
        let index = code.live[pos];
        let bc = &mut code.bytecodes[index];
        let replacement = match bc.code {
            AstCode::Ldarg => AstCode::Ldloc,
            AstCode::Starg => AstCode::Stloc,
            AstCode::Ldarga => AstCode::Ldloca,
            _ => continue,
        };
        let NormalizedOperand::Argument(index) = bc.operand else {
            return Err(malformed_error!(
                "IL_{:02X}: {} without an argument operand",
                bc.offset,
                bc.code
            ));
        };
        let Some(variable) = parameters.argument(index) else {
            return Err(malformed_error!(
                "IL_{:02X}: argument {} has no parameter",
                bc.offset,
                index
            ));
        };
        bc.code = replacement;
        bc.variable = Some(variable);
        rewritten += 1;
    }
    Ok(rewritten)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{dataflow::solve, normalize::normalize},
        assembly::InstructionAssembler,
        metadata::{method::ParameterDef, refs::TypeRef, resolver::ReferenceTable, token::Token},
    };
    use std::sync::Arc;

    fn body(flags: MethodFlags, params: &[&str]) -> MethodBody {
        MethodBody::new("Widget::set_Size", Vec::new())
            .with_flags(flags)
            .with_declaring_type(Arc::new(TypeRef::new(Token(0x02000002), "Widget")))
            .with_parameters(params.iter().map(|p| ParameterDef::new(*p)).collect())
    }

    #[test]
    fn test_instance_parameters() -> Result<()> {
        let mut variables = VariableTable::new();
        let params = declare_parameters(&body(MethodFlags::HAS_THIS, &["a", "b"]), &mut variables)?;

        let this = params.this.unwrap();
        assert!(variables[this].is_this());
        assert_eq!(params.argument(0), Some(this));
        assert_eq!(variables[params.argument(2).unwrap()].name, "b");
        assert_eq!(params.argument(3), None);
        Ok(())
    }

    #[test]
    fn test_static_parameters() -> Result<()> {
        let mut variables = VariableTable::new();
        let params = declare_parameters(&body(MethodFlags::empty(), &["a"]), &mut variables)?;
        assert!(params.this.is_none());
        assert_eq!(variables[params.argument(0).unwrap()].name, "a");
        Ok(())
    }

    #[test]
    fn test_setter_value_parameter() -> Result<()> {
        let mut variables = VariableTable::new();
        let flags = MethodFlags::HAS_THIS | MethodFlags::SETTER;
        let params = declare_parameters(&body(flags, &["index", "size"]), &mut variables)?;

        assert_eq!(variables[params.declared[0]].name, "index");
        assert_eq!(variables[params.declared[1]].name, "value");
        assert_eq!(variables[params.declared[1]].original_name.as_deref(), Some("value"));
        Ok(())
    }

    #[test]
    fn test_parameter_index_out_of_range() {
        let names: Vec<String> = (0..=usize::from(u16::MAX) + 1).map(|i| format!("p{i}")).collect();
        let body = MethodBody::new("Wide::Run", Vec::new())
            .with_parameters(names.iter().map(|n| ParameterDef::new(n.as_str())).collect());
        let mut variables = VariableTable::new();
        assert!(matches!(
            declare_parameters(&body, &mut variables),
            Err(crate::Error::Malformed { .. })
        ));
    }

    #[test]
    fn test_argument_rewrite() -> Result<()> {
        let mut asm = InstructionAssembler::new();
        asm.ldarg_0()?
            .ldarg_1()?
            .starg_s(1)?
            .ldarga_s(1)?
            .pop()?
            .pop()?
            .ret()?;
        let assembled = asm.finish()?;
        let mut body = body(MethodFlags::HAS_THIS, &["size"]);
        body.instructions = assembled.instructions;

        let mut code = MethodCode::new(&body, normalize(&body, &ReferenceTable::new())?)?;
        solve(&mut code, 0)?;
        code.prune();
        let mut variables = VariableTable::new();
        let params = declare_parameters(&body, &mut variables)?;
        assert_eq!(rewrite_arguments(&mut code, &params)?, 4);

        assert_eq!(code.bytecodes[0].code, AstCode::Ldloc);
        assert_eq!(code.bytecodes[0].variable, params.this);
        assert_eq!(code.bytecodes[2].code, AstCode::Stloc);
        assert_eq!(code.bytecodes[3].code, AstCode::Ldloca);
        assert_eq!(code.bytecodes[3].variable, Some(params.declared[0]));
        Ok(())
    }
}
