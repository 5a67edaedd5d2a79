//! TP-015: Lowering pass.
//!
//! Folds statically known subtrees into literals. Lowering never mutates its
//! input; it returns a new tree, so lowering an already lowered tree is a
//! no-op and a failed lowering leaves nothing half-rewritten.

use super::bound::{
    BoundCall, BoundConditional, BoundIndex, BoundMap, BoundNode, BoundOperator, LiteralValue,
    Operator, PathKind, Variable,
};
use super::graph::{Graph, NodeKind};
use super::path::PathContext;
use crate::core::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LowerOptions {
    /// Flatten, merge, and collapse literal fragments of interpolated strings
    pub collapse_outputs: bool,
}

impl Default for LowerOptions {
    fn default() -> Self {
        Self {
            collapse_outputs: true,
        }
    }
}

/// Lower one bound tree.
pub fn lower(node: &BoundNode, ctx: &PathContext, options: LowerOptions) -> Result<BoundNode> {
    Lowerer { ctx, options }.lower(node)
}

/// Lower every bound tree of `graph` into a new graph. Dependency sets are
/// re-derived, since folded conditionals can drop references.
pub fn lower_graph(graph: &Graph, root_path: &str, options: LowerOptions) -> Result<Graph> {
    let ctx = PathContext::new(root_path, &graph.path, graph.is_root);
    let lowerer = Lowerer { ctx: &ctx, options };

    let mut lowered = graph.clone();
    for node in &mut lowered.nodes {
        node.properties = lowerer.lower_map(&node.properties)?;
        match &mut node.kind {
            NodeKind::Resource(r) => {
                r.count = lowerer.lower_opt(r.count.as_ref())?;
                r.depends_on = lowerer.lower_opt(r.depends_on.as_ref())?;
                r.provider = lowerer.lower_opt(r.provider.as_ref())?;
            }
            NodeKind::Variable(v) => v.default = lowerer.lower_opt(v.default.as_ref())?,
            _ => {}
        }
        node.derive_dependencies();
    }

    tracing::debug!(module = %graph.name, "graph lowered");
    Ok(lowered)
}

struct Lowerer<'a> {
    ctx: &'a PathContext,
    options: LowerOptions,
}

impl Lowerer<'_> {
    fn lower_opt(&self, node: Option<&BoundNode>) -> Result<Option<BoundNode>> {
        node.map(|n| self.lower(n)).transpose()
    }

    fn lower_map(&self, map: &BoundMap) -> Result<BoundMap> {
        let mut out = BoundMap::default();
        for (key, value) in &map.elements {
            out.elements.insert(key.clone(), self.lower(value)?);
        }
        Ok(out)
    }

    fn lower_all(&self, nodes: &[BoundNode]) -> Result<Vec<BoundNode>> {
        nodes.iter().map(|n| self.lower(n)).collect()
    }

    fn lower(&self, node: &BoundNode) -> Result<BoundNode> {
        match node {
            BoundNode::Literal(_) => Ok(node.clone()),
            BoundNode::VariableAccess(v) => match &v.var {
                Variable::Path(kind @ (PathKind::Module | PathKind::Root)) => {
                    match self.ctx.resolve(*kind)? {
                        Some(p) => Ok(BoundNode::string(p)),
                        None => Ok(node.clone()),
                    }
                }
                _ => Ok(node.clone()),
            },
            BoundNode::Output(o) => {
                let exprs = self.lower_all(&o.exprs)?;
                if self.options.collapse_outputs {
                    Ok(collapse(exprs))
                } else {
                    Ok(BoundNode::output(exprs))
                }
            }
            BoundNode::List(l) => Ok(BoundNode::list(self.lower_all(&l.elements)?)),
            BoundNode::Map(m) => Ok(BoundNode::Map(self.lower_map(m)?)),
            BoundNode::Conditional(c) => {
                let condition = self.lower(&c.condition)?;
                match condition.as_literal() {
                    Some(LiteralValue::Bool(true)) => self.lower(&c.true_expr),
                    Some(LiteralValue::Bool(false)) => self.lower(&c.false_expr),
                    _ => Ok(BoundNode::Conditional(BoundConditional {
                        condition: Box::new(condition),
                        true_expr: Box::new(self.lower(&c.true_expr)?),
                        false_expr: Box::new(self.lower(&c.false_expr)?),
                    })),
                }
            }
            BoundNode::Call(c) => {
                let args = self.lower_all(&c.args)?;
                Ok(fold_call(&c.func, &args).unwrap_or_else(|| {
                    BoundNode::Call(BoundCall {
                        ty: c.ty,
                        func: c.func.clone(),
                        args,
                    })
                }))
            }
            BoundNode::Index(i) => Ok(BoundNode::Index(BoundIndex {
                target: Box::new(self.lower(&i.target)?),
                key: Box::new(self.lower(&i.key)?),
            })),
            BoundNode::Operator(o) => {
                let operands = self.lower_all(&o.operands)?;
                Ok(fold_operator(o.op, &operands).unwrap_or_else(|| {
                    BoundNode::Operator(BoundOperator { op: o.op, operands })
                }))
            }
        }
    }
}

/// Flatten nested outputs, merge adjacent literals, and collapse an
/// all-literal output to one string.
fn collapse(exprs: Vec<BoundNode>) -> BoundNode {
    let mut flat = Vec::with_capacity(exprs.len());
    for e in exprs {
        match e {
            BoundNode::Output(inner) => flat.extend(inner.exprs),
            other => flat.push(other),
        }
    }

    let mut out: Vec<BoundNode> = Vec::with_capacity(flat.len());
    let mut text: Option<String> = None;
    for e in flat {
        match e.as_literal() {
            Some(lit) => text.get_or_insert_with(String::new).push_str(&lit.to_text()),
            None => {
                if let Some(t) = text.take().filter(|t| !t.is_empty()) {
                    out.push(BoundNode::string(t));
                }
                out.push(e);
            }
        }
    }

    if out.is_empty() {
        return BoundNode::string(text.unwrap_or_default());
    }
    if let Some(t) = text.filter(|t| !t.is_empty()) {
        out.push(BoundNode::string(t));
    }
    BoundNode::output(out)
}

fn fold_call(func: &str, args: &[BoundNode]) -> Option<BoundNode> {
    let literals: Vec<&LiteralValue> = args.iter().map(BoundNode::as_literal).collect::<Option<_>>()?;
    match (func, literals.as_slice()) {
        ("upper", [LiteralValue::String(s)]) => Some(BoundNode::string(s.to_uppercase())),
        ("lower", [LiteralValue::String(s)]) => Some(BoundNode::string(s.to_lowercase())),
        ("min" | "max", [_, ..]) => {
            let numbers: Vec<f64> = literals
                .iter()
                .map(|l| match l {
                    LiteralValue::Number(n) => Some(*n),
                    _ => None,
                })
                .collect::<Option<_>>()?;
            let pick = if func == "min" { f64::min } else { f64::max };
            numbers.into_iter().reduce(pick).map(BoundNode::number)
        }
        _ => None,
    }
}

fn fold_operator(op: Operator, operands: &[BoundNode]) -> Option<BoundNode> {
    use LiteralValue::{Bool, Number};

    let literals: Vec<&LiteralValue> = operands
        .iter()
        .map(BoundNode::as_literal)
        .collect::<Option<_>>()?;
    let folded = match (op, literals.as_slice()) {
        (Operator::Not, [Bool(b)]) => BoundNode::boolean(!b),
        (Operator::Neg, [Number(n)]) => BoundNode::number(-n),
        (Operator::Add, [Number(a), Number(b)]) => BoundNode::number(a + b),
        (Operator::Sub, [Number(a), Number(b)]) => BoundNode::number(a - b),
        (Operator::Mul, [Number(a), Number(b)]) => BoundNode::number(a * b),
        (Operator::Div | Operator::Mod, [Number(_), Number(b)]) if *b == 0.0 => return None,
        (Operator::Div, [Number(a), Number(b)]) => BoundNode::number(a / b),
        (Operator::Mod, [Number(a), Number(b)]) => BoundNode::number(a % b),
        (Operator::Eq, [a, b]) => BoundNode::boolean(a == b),
        (Operator::NotEq, [a, b]) => BoundNode::boolean(a != b),
        (Operator::Lt, [Number(a), Number(b)]) => BoundNode::boolean(a < b),
        (Operator::LtEq, [Number(a), Number(b)]) => BoundNode::boolean(a <= b),
        (Operator::Gt, [Number(a), Number(b)]) => BoundNode::boolean(a > b),
        (Operator::GtEq, [Number(a), Number(b)]) => BoundNode::boolean(a >= b),
        (Operator::And, [Bool(a), Bool(b)]) => BoundNode::boolean(*a && *b),
        (Operator::Or, [Bool(a), Bool(b)]) => BoundNode::boolean(*a || *b),
        _ => return None,
    };
    Some(folded)
}
