//! Traversals over the emitted tree.

use crate::ast::{AstBlock, AstExpression, AstLabel, AstNode, AstTryCatchBlock, LabelId};

impl AstBlock {
    /// All expressions of the tree, pre-order, nested arguments included.
    #[must_use]
    pub fn expressions(&self) -> Vec<&AstExpression> {
        let mut out = Vec::new();
        self.walk_blocks(&mut |block| {
            for node in &block.body {
                if let AstNode::Expression(expr) = node {
                    collect_pre_order(expr, &mut out);
                }
            }
        });
        out
    }

    /// All labels of the tree, in block order.
    #[must_use]
    pub fn labels(&self) -> Vec<&AstLabel> {
        let mut out = Vec::new();
        self.walk_blocks(&mut |block| {
            out.extend(block.body.iter().filter_map(|node| match node {
                AstNode::Label(label) => Some(label),
                _ => None,
            }));
        });
        out
    }

    /// Looks up a label anywhere in the tree.
    #[must_use]
    pub fn find_label(&self, id: LabelId) -> Option<&AstLabel> {
        self.labels().into_iter().find(|l| l.id == id)
    }

    /// All try/catch blocks of the tree, outer blocks first.
    #[must_use]
    pub fn try_catch_blocks(&self) -> Vec<&AstTryCatchBlock> {
        let mut out = Vec::new();
        self.walk_blocks(&mut |block| {
            out.extend(block.body.iter().filter_map(AstNode::as_try_catch));
        });
        out
    }

    /// The evaluation order of the tree: every expression after its arguments, blocks in
    /// execution layout order (try, then each filter and catch, then finally and fault).
    #[must_use]
    pub fn linearize(&self) -> Vec<&AstExpression> {
        let mut out = Vec::new();
        linearize_block(self, &mut out);
        out
    }

    fn walk_blocks<'a>(&'a self, visit: &mut impl FnMut(&'a AstBlock)) {
        visit(self);
        for node in &self.body {
            match node {
                AstNode::Block(block) => block.walk_blocks(visit),
                AstNode::TryCatch(tc) => {
                    tc.try_block.walk_blocks(visit);
                    for catch in &tc.catch_blocks {
                        if let Some(filter) = &catch.filter {
                            filter.body.walk_blocks(visit);
                        }
                        catch.body.walk_blocks(visit);
                    }
                    if let Some(finally) = &tc.finally_block {
                        finally.walk_blocks(visit);
                    }
                    if let Some(fault) = &tc.fault_block {
                        fault.walk_blocks(visit);
                    }
                }
                AstNode::Expression(_) | AstNode::Label(_) => {}
            }
        }
    }
}

fn collect_pre_order<'a>(expr: &'a AstExpression, out: &mut Vec<&'a AstExpression>) {
    out.push(expr);
    for arg in &expr.arguments {
        collect_pre_order(arg, out);
    }
}

fn collect_post_order<'a>(expr: &'a AstExpression, out: &mut Vec<&'a AstExpression>) {
    for arg in &expr.arguments {
        collect_post_order(arg, out);
    }
    out.push(expr);
}

fn linearize_block<'a>(block: &'a AstBlock, out: &mut Vec<&'a AstExpression>) {
    for node in &block.body {
        match node {
            AstNode::Expression(expr) => collect_post_order(expr, out),
            AstNode::Label(_) => {}
            AstNode::Block(inner) => linearize_block(inner, out),
            AstNode::TryCatch(tc) => {
                linearize_block(&tc.try_block, out);
                for catch in &tc.catch_blocks {
                    if let Some(filter) = &catch.filter {
                        linearize_block(&filter.body, out);
                    }
                    linearize_block(&catch.body, out);
                }
                if let Some(finally) = &tc.finally_block {
                    linearize_block(finally, out);
                }
                if let Some(fault) = &tc.fault_block {
                    linearize_block(fault, out);
                }
            }
        }
    }
}
