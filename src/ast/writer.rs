//! Plain-text rendering of a reconstructed method.
//!
//! ```text
//! stloc arg_02_0(ldc.i4 1)
//! IL_05:
//! .try {
//!     call Console::WriteLine(ldloc arg_0A_0)
//!     leave IL_14
//! }
//! catch System.Exception ex_0F {
//!     leave IL_14
//! }
//! ret
//! ```

use std::fmt::{self, Write};

use crate::ast::{
    AstBlock, AstExpression, AstNode, AstOperand, AstTryCatchBlock, MethodAst, VariableId,
    VariableTable,
};

const INDENT: &str = "    ";

struct AstWriter<'a, W: Write> {
    out: W,
    variables: &'a VariableTable,
    depth: usize,
}

impl<W: Write> AstWriter<'_, W> {
    fn line(&mut self, text: &str) -> fmt::Result {
        for _ in 0..self.depth {
            self.out.write_str(INDENT)?;
        }
        self.out.write_str(text)?;
        self.out.write_char('\n')
    }

    fn variable(&self, id: VariableId) -> String {
        match self.variables.get(id) {
            Some(v) => v.name.clone(),
            None => id.to_string(),
        }
    }

    fn block(&mut self, header: &str, block: &AstBlock) -> fmt::Result {
        self.line(&format!("{header} {{"))?;
        self.depth += 1;
        self.nodes(block)?;
        self.depth -= 1;
        self.line("}")
    }

    fn nodes(&mut self, block: &AstBlock) -> fmt::Result {
        for node in &block.body {
            match node {
                AstNode::Expression(expr) => {
                    let text = self.expression(expr);
                    self.line(&text)?;
                }
                AstNode::Label(label) => self.line(&format!("{}:", label.name()))?,
                AstNode::Block(inner) => self.block("", inner)?,
                AstNode::TryCatch(tc) => self.try_catch(tc)?,
            }
        }
        Ok(())
    }

    fn try_catch(&mut self, tc: &AstTryCatchBlock) -> fmt::Result {
        self.block(".try", &tc.try_block)?;
        for catch in &tc.catch_blocks {
            if let Some(filter) = &catch.filter {
                let mut header = String::from("filter");
                if let Some(v) = filter.exception_variable {
                    header.push(' ');
                    header.push_str(&self.variable(v));
                }
                self.block(&header, &filter.body)?;
            }
            let mut header = String::from("catch");
            if let Some(ty) = &catch.exception_type {
                header.push(' ');
                header.push_str(&ty.name);
            }
            if let Some(v) = catch.exception_variable {
                header.push(' ');
                header.push_str(&self.variable(v));
            }
            self.block(&header, &catch.body)?;
        }
        if let Some(finally) = &tc.finally_block {
            self.block("finally", finally)?;
        }
        if let Some(fault) = &tc.fault_block {
            self.block("fault", fault)?;
        }
        Ok(())
    }

    fn expression(&self, expr: &AstExpression) -> String {
        let mut text = String::new();
        for prefix in &expr.prefixes {
            text.push_str(&prefix.to_string());
            text.push(' ');
        }
        text.push_str(expr.code.mnemonic());

        let operand = match &expr.operand {
            AstOperand::None => None,
            AstOperand::Int32(v) => Some(v.to_string()),
            AstOperand::Int64(v) => Some(v.to_string()),
            AstOperand::Float32(v) => Some(v.to_string()),
            AstOperand::Float64(v) => Some(v.to_string()),
            AstOperand::String(s) => Some(format!("{s:?}")),
            AstOperand::Label(l) => Some(l.to_string()),
            AstOperand::Labels(ls) => Some(format!(
                "({})",
                ls.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
            )),
            AstOperand::Variable(v) => Some(self.variable(*v)),
            AstOperand::Field(f) => Some(f.to_string()),
            AstOperand::Method(m) => Some(m.to_string()),
            AstOperand::Type(t) => Some(t.to_string()),
            AstOperand::Member(m) => Some(m.to_string()),
            AstOperand::Primitive(p) => Some(p.to_string()),
        };
        if let Some(operand) = operand {
            text.push(' ');
            text.push_str(&operand);
        }

        if !expr.arguments.is_empty() {
            let args: Vec<String> = expr.arguments.iter().map(|a| self.expression(a)).collect();
            text.push('(');
            text.push_str(&args.join(", "));
            text.push(')');
        }
        text
    }
}

impl fmt::Display for MethodAst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut writer = AstWriter {
            out: f,
            variables: &self.variables,
            depth: 0,
        };
        writer.nodes(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AstCatchBlock, AstCode, AstLabel, LabelId, Variable};

    #[test]
    fn test_render() {
        let mut ast = MethodAst::empty("Sample::Run");
        let tmp = ast.variables.add(Variable::generated("arg_02_0", None));
        let ex = ast.variables.add(Variable::generated("ex_06", None));

        let store = AstExpression::store(
            tmp,
            AstExpression::new(AstCode::LdcI4, AstOperand::Int32(1)),
        );
        let leave = AstExpression::new(AstCode::Leave, AstOperand::Label(LabelId(0x10)));
        ast.body.body.push(store.into());
        ast.body.body.push(AstNode::TryCatch(AstTryCatchBlock {
            try_block: AstBlock::new(vec![leave.clone().into()]),
            catch_blocks: vec![AstCatchBlock {
                exception_type: None,
                exception_variable: Some(ex),
                filter: None,
                body: AstBlock::new(vec![leave.into()]),
            }],
            ..AstTryCatchBlock::default()
        }));
        ast.body.body.push(AstNode::Label(AstLabel {
            id: LabelId(0x10),
            location: None,
        }));
        ast.body.body.push(AstExpression::new(AstCode::Ret, AstOperand::None).into());

        let expected = "\
stloc arg_02_0(ldc.i4 1)
.try {
    leave IL_10
}
catch ex_06 {
    leave IL_10
}
IL_10:
ret
";
        assert_eq!(ast.to_string(), expected);
    }
}
