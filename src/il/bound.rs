//! TP-010: Bound expression model.
//!
//! A `BoundNode` is one node of a typed expression tree for a single
//! property value. Trees are acyclic and immutable once built; passes that
//! rewrite them (lowering) build new trees.
//!
//! The enum is `#[non_exhaustive]`: out-of-crate consumers such as custom
//! generators must carry a wildcard arm, and that arm should return
//! [`unsupported`] so a new variant surfaces as an invariant error instead of
//! bad output.

use super::graph::NodeId;
use crate::core::error::Error;
use indexmap::IndexMap;
use std::fmt;

/// Static type of an expression, when known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Unknown,
    String,
    Number,
    Bool,
    List,
    Map,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::String => write!(f, "string"),
            Self::Number => write!(f, "number"),
            Self::Bool => write!(f, "bool"),
            Self::List => write!(f, "list"),
            Self::Map => write!(f, "map"),
        }
    }
}

/// A constant value.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    String(String),
    Number(f64),
    Bool(bool),
}

impl LiteralValue {
    pub fn ty(&self) -> Type {
        match self {
            Self::String(_) => Type::String,
            Self::Number(_) => Type::Number,
            Self::Bool(_) => Type::Bool,
        }
    }

    /// Text of the value when interpolated into a string.
    pub fn to_text(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Number(n) => format_number(*n),
            Self::Bool(b) => b.to_string(),
        }
    }
}

/// Render a number without a trailing `.0` for integral values.
/// Non-finite values use the JavaScript global names.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Reserved path references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathKind {
    /// `path.module`: the originating module's directory
    Module,
    /// `path.root`: the root module's directory
    Root,
    /// `path.cwd`: the working directory at run time
    Cwd,
}

/// What a variable access refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Variable {
    /// `TYPE.NAME.attr...` or `data.TYPE.NAME.attr...`
    Resource {
        data: bool,
        type_name: String,
        name: String,
        elements: Vec<String>,
    },
    /// `var.NAME`
    User { name: String },
    /// `local.NAME`
    Local { name: String },
    /// `module.NAME.OUTPUT`
    Module { name: String, output: String },
    /// Provider named by a resource's `provider` meta-property
    Provider { name: String, alias: Option<String> },
    Path(PathKind),
    /// `count.index`
    CountIndex,
    /// `terraform.workspace`
    Workspace,
}

impl Variable {
    /// Address of the node this variable reads from. External inputs
    /// (paths, count index, workspace) have none.
    pub fn node_address(&self) -> Option<String> {
        match self {
            Self::Resource {
                data: true,
                type_name,
                name,
                ..
            } => Some(format!("data.{}.{}", type_name, name)),
            Self::Resource {
                type_name, name, ..
            } => Some(format!("{}.{}", type_name, name)),
            Self::User { name } => Some(format!("var.{}", name)),
            Self::Local { name } => Some(format!("local.{}", name)),
            Self::Module { name, .. } => Some(format!("module.{}", name)),
            Self::Provider {
                name,
                alias: Some(alias),
            } => Some(format!("provider.{}.{}", name, alias)),
            Self::Provider { name, alias: None } => Some(format!("provider.{}", name)),
            Self::Path(_) | Self::CountIndex | Self::Workspace => None,
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resource {
                data,
                type_name,
                name,
                elements,
            } => {
                if *data {
                    write!(f, "data.")?;
                }
                write!(f, "{}.{}", type_name, name)?;
                for e in elements {
                    write!(f, ".{}", e)?;
                }
                Ok(())
            }
            Self::User { name } => write!(f, "var.{}", name),
            Self::Local { name } => write!(f, "local.{}", name),
            Self::Module { name, output } => write!(f, "module.{}.{}", name, output),
            Self::Provider { name, alias: None } => write!(f, "{}", name),
            Self::Provider {
                name,
                alias: Some(a),
            } => write!(f, "{}.{}", name, a),
            Self::Path(PathKind::Module) => write!(f, "path.module"),
            Self::Path(PathKind::Root) => write!(f, "path.root"),
            Self::Path(PathKind::Cwd) => write!(f, "path.cwd"),
            Self::CountIndex => write!(f, "count.index"),
            Self::Workspace => write!(f, "terraform.workspace"),
        }
    }
}

/// Unary and binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Not,
    Neg,
}

impl Operator {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub | Self::Neg => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::And => "&&",
            Self::Or => "||",
            Self::Not => "!",
        }
    }

    pub fn is_unary(self) -> bool {
        matches!(self, Self::Not | Self::Neg)
    }

    pub fn result_type(self) -> Type {
        match self {
            Self::Add | Self::Sub | Self::Mul | Self::Div | Self::Mod | Self::Neg => Type::Number,
            _ => Type::Bool,
        }
    }
}

// ============================================================================
// Bound nodes
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct BoundLiteral {
    pub value: LiteralValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundVariableAccess {
    pub ty: Type,
    pub var: Variable,
    /// Node the variable resolves to, set by the graph builder
    pub target: Option<NodeId>,
}

/// Interpolated string. Fragment order is significant.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundOutput {
    pub exprs: Vec<BoundNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundList {
    pub elements: Vec<BoundNode>,
}

/// Key order is preserved for stable emission.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BoundMap {
    pub elements: IndexMap<String, BoundNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundConditional {
    pub condition: Box<BoundNode>,
    pub true_expr: Box<BoundNode>,
    pub false_expr: Box<BoundNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundCall {
    pub ty: Type,
    pub func: String,
    pub args: Vec<BoundNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundIndex {
    pub target: Box<BoundNode>,
    pub key: Box<BoundNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundOperator {
    pub op: Operator,
    pub operands: Vec<BoundNode>,
}

#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum BoundNode {
    Literal(BoundLiteral),
    VariableAccess(BoundVariableAccess),
    Output(BoundOutput),
    List(BoundList),
    Map(BoundMap),
    Conditional(BoundConditional),
    Call(BoundCall),
    Index(BoundIndex),
    Operator(BoundOperator),
}

impl BoundNode {
    pub fn literal(value: LiteralValue) -> Self {
        Self::Literal(BoundLiteral { value })
    }

    pub fn string(s: impl Into<String>) -> Self {
        Self::literal(LiteralValue::String(s.into()))
    }

    pub fn number(n: f64) -> Self {
        Self::literal(LiteralValue::Number(n))
    }

    pub fn boolean(b: bool) -> Self {
        Self::literal(LiteralValue::Bool(b))
    }

    /// An unresolved variable access; the builder fills in type and target.
    pub fn var(var: Variable) -> Self {
        let ty = match var {
            Variable::Path(_) | Variable::Workspace => Type::String,
            Variable::CountIndex => Type::Number,
            _ => Type::Unknown,
        };
        Self::VariableAccess(BoundVariableAccess {
            ty,
            var,
            target: None,
        })
    }

    pub fn path(kind: PathKind) -> Self {
        Self::var(Variable::Path(kind))
    }

    pub fn output(exprs: Vec<BoundNode>) -> Self {
        Self::Output(BoundOutput { exprs })
    }

    pub fn map(elements: IndexMap<String, BoundNode>) -> Self {
        Self::Map(BoundMap { elements })
    }

    pub fn list(elements: Vec<BoundNode>) -> Self {
        Self::List(BoundList { elements })
    }

    pub fn ty(&self) -> Type {
        match self {
            Self::Literal(l) => l.value.ty(),
            Self::VariableAccess(v) => v.ty,
            Self::Output(_) => Type::String,
            Self::List(_) => Type::List,
            Self::Map(_) => Type::Map,
            Self::Conditional(c) => match (c.true_expr.ty(), c.false_expr.ty()) {
                (a, b) if a == b => a,
                _ => Type::Unknown,
            },
            Self::Call(c) => c.ty,
            Self::Index(_) => Type::Unknown,
            Self::Operator(o) => o.op.result_type(),
        }
    }

    pub fn as_literal(&self) -> Option<&LiteralValue> {
        match self {
            Self::Literal(l) => Some(&l.value),
            _ => None,
        }
    }

    /// Direct children, in evaluation order.
    pub fn children(&self) -> Vec<&BoundNode> {
        match self {
            Self::Literal(_) | Self::VariableAccess(_) => Vec::new(),
            Self::Output(o) => o.exprs.iter().collect(),
            Self::List(l) => l.elements.iter().collect(),
            Self::Map(m) => m.elements.values().collect(),
            Self::Conditional(c) => vec![&*c.condition, &*c.true_expr, &*c.false_expr],
            Self::Call(c) => c.args.iter().collect(),
            Self::Index(i) => vec![&*i.target, &*i.key],
            Self::Operator(o) => o.operands.iter().collect(),
        }
    }

    /// Pre-order walk over this node and every descendant.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a BoundNode)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }

    /// Every variable access in the tree, in walk order.
    pub fn variables(&self) -> Vec<&BoundVariableAccess> {
        let mut out = Vec::new();
        self.walk(&mut |n| {
            if let Self::VariableAccess(v) = n {
                out.push(v);
            }
        });
        out
    }
}

/// The invariant error a visitor returns for a variant it does not handle.
pub fn unsupported(node: &BoundNode, pass: &str) -> Error {
    Error::Invariant(format!("{} does not handle bound node {:?}", pass, node))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BoundNode {
        BoundNode::map(IndexMap::from([
            (
                "name".to_string(),
                BoundNode::output(vec![
                    BoundNode::string("web-"),
                    BoundNode::var(Variable::User {
                        name: "env".into(),
                    }),
                ]),
            ),
            ("size".to_string(), BoundNode::number(2.0)),
            ("dir".to_string(), BoundNode::path(PathKind::Module)),
        ]))
    }

    #[test]
    fn test_tp010_walk_is_preorder() {
        let mut kinds = Vec::new();
        sample().walk(&mut |n| kinds.push(n.ty()));
        assert_eq!(
            kinds,
            vec![
                Type::Map,
                Type::String,
                Type::String,
                Type::Unknown,
                Type::Number,
                Type::String
            ]
        );
    }

    #[test]
    fn test_tp010_variables_collects_accesses() {
        let tree = sample();
        let vars: Vec<String> = tree.variables().iter().map(|v| v.var.to_string()).collect();
        assert_eq!(vars, vec!["var.env", "path.module"]);
    }

    #[test]
    fn test_tp010_node_address_excludes_external_inputs() {
        assert_eq!(Variable::Path(PathKind::Root).node_address(), None);
        assert_eq!(Variable::CountIndex.node_address(), None);
        assert_eq!(Variable::Workspace.node_address(), None);
        let r = Variable::Resource {
            data: true,
            type_name: "aws_ami".into(),
            name: "ubuntu".into(),
            elements: vec!["id".into()],
        };
        assert_eq!(r.node_address().as_deref(), Some("data.aws_ami.ubuntu"));
        assert_eq!(r.to_string(), "data.aws_ami.ubuntu.id");
    }

    #[test]
    fn test_tp010_format_number() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-2.0), "-2");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(format_number(f64::NAN), "NaN");
    }

    #[test]
    fn test_tp010_conditional_type() {
        let c = BoundNode::Conditional(BoundConditional {
            condition: Box::new(BoundNode::boolean(true)),
            true_expr: Box::new(BoundNode::number(1.0)),
            false_expr: Box::new(BoundNode::number(2.0)),
        });
        assert_eq!(c.ty(), Type::Number);
    }

    #[test]
    fn test_tp010_unsupported_is_internal() {
        let err = unsupported(&BoundNode::boolean(true), "emitter");
        assert!(err.is_internal());
        assert!(err.to_string().contains("emitter"));
    }
}
