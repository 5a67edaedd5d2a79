//! TP-011: Expression fragment parsing.
//!
//! Turns raw property values into unresolved bound trees. Strings are
//! templates: literal text with `${...}` interpolations (`$${` escapes).
//! References come back as `VariableAccess` nodes without targets; the
//! graph builder resolves them.

use super::bound::{
    BoundCall, BoundConditional, BoundIndex, BoundNode, BoundOperator, Operator, PathKind, Type,
    Variable,
};
use crate::core::types::RawValue;
use indexmap::IndexMap;

/// Bind a raw property value. `Null` binds to nothing.
pub fn bind_value(value: &RawValue) -> Result<Option<BoundNode>, String> {
    let node = match value {
        RawValue::Null => return Ok(None),
        RawValue::Bool(b) => BoundNode::boolean(*b),
        RawValue::Number(n) => BoundNode::number(*n),
        RawValue::String(s) => parse_template(s)?,
        RawValue::List(items) => {
            let mut elements = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match bind_value(item)? {
                    Some(node) => elements.push(node),
                    None => return Err(format!("list element {} is null", i)),
                }
            }
            BoundNode::list(elements)
        }
        RawValue::Map(entries) => {
            let mut elements = IndexMap::with_capacity(entries.len());
            for (key, item) in entries {
                if let Some(node) = bind_value(item)? {
                    elements.insert(key.clone(), node);
                }
            }
            BoundNode::map(elements)
        }
    };
    Ok(Some(node))
}

/// Parse a template string.
pub fn parse_template(text: &str) -> Result<BoundNode, String> {
    let mut p = Parser::new(text);
    let parts = p.template(None)?;
    Ok(collapse_parts(parts))
}

fn collapse_parts(mut parts: Vec<BoundNode>) -> BoundNode {
    match parts.len() {
        0 => BoundNode::string(""),
        1 => parts.remove(0),
        _ => BoundNode::output(parts),
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn looking_at(&self, s: &str) -> bool {
        s.chars().enumerate().all(|(i, c)| self.peek_at(i) == Some(c))
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    /// Consume `s` after optional whitespace.
    fn eat(&mut self, s: &str) -> bool {
        self.skip_ws();
        if self.looking_at(s) {
            self.pos += s.chars().count();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, s: &str) -> Result<(), String> {
        if self.eat(s) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", s)))
        }
    }

    fn error(&self, message: &str) -> String {
        match self.peek() {
            Some(c) => format!("{} at offset {} (found '{}')", message, self.pos, c),
            None => format!("{} at end of expression", message),
        }
    }

    /// Template body. With a terminator, stops before it (quoted strings).
    fn template(&mut self, terminator: Option<char>) -> Result<Vec<BoundNode>, String> {
        let mut parts = Vec::new();
        let mut text = String::new();

        loop {
            let c = match self.peek() {
                None if terminator.is_some() => return Err(self.error("unterminated string")),
                None => break,
                Some(c) => c,
            };
            if Some(c) == terminator {
                break;
            }
            if self.looking_at("$${") {
                text.push_str("${");
                self.pos += 3;
            } else if self.looking_at("${") {
                self.pos += 2;
                if !text.is_empty() {
                    parts.push(BoundNode::string(std::mem::take(&mut text)));
                }
                parts.push(self.expression()?);
                self.expect("}")?;
            } else if c == '\\' && terminator.is_some() {
                self.pos += 1;
                let escaped = self.peek().ok_or_else(|| self.error("dangling escape"))?;
                text.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
                self.pos += 1;
            } else {
                text.push(c);
                self.pos += 1;
            }
        }

        if !text.is_empty() {
            parts.push(BoundNode::string(text));
        }
        Ok(parts)
    }

    fn expression(&mut self) -> Result<BoundNode, String> {
        let condition = self.binary(0)?;
        if !self.eat("?") {
            return Ok(condition);
        }
        let true_expr = self.expression()?;
        self.expect(":")?;
        let false_expr = self.expression()?;
        Ok(BoundNode::Conditional(BoundConditional {
            condition: Box::new(condition),
            true_expr: Box::new(true_expr),
            false_expr: Box::new(false_expr),
        }))
    }

    /// Precedence climbing over the binary operator levels.
    fn binary(&mut self, level: usize) -> Result<BoundNode, String> {
        const LEVELS: &[&[(&str, Operator)]] = &[
            &[("||", Operator::Or)],
            &[("&&", Operator::And)],
            &[
                ("==", Operator::Eq),
                ("!=", Operator::NotEq),
                ("<=", Operator::LtEq),
                (">=", Operator::GtEq),
                ("<", Operator::Lt),
                (">", Operator::Gt),
            ],
            &[("+", Operator::Add), ("-", Operator::Sub)],
            &[("*", Operator::Mul), ("/", Operator::Div), ("%", Operator::Mod)],
        ];

        if level == LEVELS.len() {
            return self.unary();
        }
        let mut left = self.binary(level + 1)?;
        'outer: loop {
            for (symbol, op) in LEVELS[level] {
                if self.eat(symbol) {
                    let right = self.binary(level + 1)?;
                    left = BoundNode::Operator(BoundOperator {
                        op: *op,
                        operands: vec![left, right],
                    });
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn unary(&mut self) -> Result<BoundNode, String> {
        self.skip_ws();
        let op = if self.looking_at("!") && !self.looking_at("!=") {
            Operator::Not
        } else if self.looking_at("-") {
            Operator::Neg
        } else {
            return self.postfix();
        };
        self.pos += 1;
        let operand = self.unary()?;
        Ok(BoundNode::Operator(BoundOperator {
            op,
            operands: vec![operand],
        }))
    }

    fn postfix(&mut self) -> Result<BoundNode, String> {
        let mut node = self.primary()?;
        while self.eat("[") {
            let key = self.expression()?;
            self.expect("]")?;
            node = BoundNode::Index(BoundIndex {
                target: Box::new(node),
                key: Box::new(key),
            });
        }
        Ok(node)
    }

    fn primary(&mut self) -> Result<BoundNode, String> {
        self.skip_ws();
        match self.peek() {
            Some('(') => {
                self.pos += 1;
                let inner = self.expression()?;
                self.expect(")")?;
                Ok(inner)
            }
            Some('"') => {
                self.pos += 1;
                let parts = self.template(Some('"'))?;
                self.pos += 1;
                Ok(collapse_parts(parts))
            }
            Some(c) if c.is_ascii_digit() => self.number(),
            Some(c) if is_ident_start(c) => self.reference_or_call(),
            _ => Err(self.error("expected expression")),
        }
    }

    fn number(&mut self) -> Result<BoundNode, String> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek() == Some('.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse::<f64>()
            .map(BoundNode::number)
            .map_err(|e| format!("bad number '{}': {}", text, e))
    }

    fn segment(&mut self) -> String {
        let start = self.pos;
        if self.peek() == Some('*') {
            self.pos += 1;
        } else {
            while matches!(self.peek(), Some(c) if is_ident_char(c)) {
                self.pos += 1;
            }
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn reference_or_call(&mut self) -> Result<BoundNode, String> {
        let mut parts = vec![self.segment()];
        while self.peek() == Some('.')
            && matches!(self.peek_at(1), Some(c) if is_ident_char(c) || c == '*')
        {
            self.pos += 1;
            parts.push(self.segment());
        }

        if parts.len() == 1 {
            match parts[0].as_str() {
                "true" => return Ok(BoundNode::boolean(true)),
                "false" => return Ok(BoundNode::boolean(false)),
                _ => {}
            }
            if self.eat("(") {
                let func = parts.remove(0);
                let args = self.arguments()?;
                return Ok(BoundNode::Call(BoundCall {
                    ty: call_type(&func),
                    func,
                    args,
                }));
            }
        }

        reference(&parts).map(BoundNode::var)
    }

    fn arguments(&mut self) -> Result<Vec<BoundNode>, String> {
        let mut args = Vec::new();
        if self.eat(")") {
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            if self.eat(")") {
                return Ok(args);
            }
            self.expect(",")?;
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Classify a dotted reference.
fn reference(parts: &[String]) -> Result<Variable, String> {
    let text = parts.join(".");
    let p: Vec<&str> = parts.iter().map(String::as_str).collect();
    let var = match p.as_slice() {
        ["var", name] => Variable::User {
            name: name.to_string(),
        },
        ["local", name] => Variable::Local {
            name: name.to_string(),
        },
        ["module", name, output] => Variable::Module {
            name: name.to_string(),
            output: output.to_string(),
        },
        ["path", "module"] => Variable::Path(PathKind::Module),
        ["path", "root"] => Variable::Path(PathKind::Root),
        ["path", "cwd"] => Variable::Path(PathKind::Cwd),
        ["count", "index"] => Variable::CountIndex,
        ["terraform", "workspace"] | ["terraform", "env"] => Variable::Workspace,
        ["var" | "local" | "module" | "path" | "count" | "terraform", ..] => {
            return Err(format!("invalid reference '{}'", text))
        }
        ["self", ..] => return Err(format!("'{}': self is only valid in provisioners", text)),
        ["data", ty, name, rest @ ..] => Variable::Resource {
            data: true,
            type_name: ty.to_string(),
            name: name.to_string(),
            elements: rest.iter().map(|s| s.to_string()).collect(),
        },
        ["data", ..] => return Err(format!("invalid reference '{}'", text)),
        [ty, name, rest @ ..] => Variable::Resource {
            data: false,
            type_name: ty.to_string(),
            name: name.to_string(),
            elements: rest.iter().map(|s| s.to_string()).collect(),
        },
        _ => return Err(format!("unknown variable '{}'", text)),
    };
    Ok(var)
}

/// Result type of the interpolation functions the generator knows about.
pub fn call_type(func: &str) -> Type {
    match func {
        "file" | "upper" | "lower" | "join" | "format" | "replace" | "trimspace"
        | "base64encode" | "base64decode" | "substr" | "jsonencode" => Type::String,
        "length" | "min" | "max" | "ceil" | "floor" => Type::Number,
        "split" | "list" | "concat" | "keys" | "values" | "compact" | "distinct" => Type::List,
        "map" | "merge" | "zipmap" => Type::Map,
        "contains" => Type::Bool,
        _ => Type::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::bound::LiteralValue;

    fn user(name: &str) -> BoundNode {
        BoundNode::var(Variable::User {
            name: name.to_string(),
        })
    }

    #[test]
    fn test_tp011_plain_text_is_literal() {
        assert_eq!(parse_template("hello").unwrap(), BoundNode::string("hello"));
        assert_eq!(parse_template("").unwrap(), BoundNode::string(""));
    }

    #[test]
    fn test_tp011_single_interpolation_binds_directly() {
        assert_eq!(parse_template("${var.region}").unwrap(), user("region"));
    }

    #[test]
    fn test_tp011_mixed_template_keeps_fragment_order() {
        let node = parse_template("web-${var.env}-${count.index}").unwrap();
        assert_eq!(
            node,
            BoundNode::output(vec![
                BoundNode::string("web-"),
                user("env"),
                BoundNode::string("-"),
                BoundNode::var(Variable::CountIndex),
            ])
        );
    }

    #[test]
    fn test_tp011_escaped_interpolation() {
        assert_eq!(
            parse_template("cost: $${price}").unwrap(),
            BoundNode::string("cost: ${price}")
        );
    }

    #[test]
    fn test_tp011_resource_and_data_references() {
        let node = parse_template("${aws_instance.web.*.id}").unwrap();
        let BoundNode::VariableAccess(v) = node else {
            panic!("expected variable access");
        };
        assert_eq!(
            v.var,
            Variable::Resource {
                data: false,
                type_name: "aws_instance".into(),
                name: "web".into(),
                elements: vec!["*".into(), "id".into()],
            }
        );

        let node = parse_template("${data.aws_ami.ubuntu.id}").unwrap();
        assert!(matches!(
            node,
            BoundNode::VariableAccess(ref v) if v.var.node_address().as_deref() == Some("data.aws_ami.ubuntu")
        ));
    }

    #[test]
    fn test_tp011_path_variables() {
        let node = parse_template("${path.module}/files").unwrap();
        assert_eq!(
            node,
            BoundNode::output(vec![
                BoundNode::path(PathKind::Module),
                BoundNode::string("/files")
            ])
        );
    }

    #[test]
    fn test_tp011_call_with_nested_string() {
        let node = parse_template(r#"${file("${path.module}/init.sh")}"#).unwrap();
        let BoundNode::Call(call) = node else {
            panic!("expected call");
        };
        assert_eq!(call.func, "file");
        assert_eq!(call.ty, Type::String);
        assert_eq!(call.args.len(), 1);
        assert!(matches!(call.args[0], BoundNode::Output(_)));
    }

    #[test]
    fn test_tp011_precedence() {
        let node = parse_template("${1 + 2 * 3}").unwrap();
        let BoundNode::Operator(add) = node else {
            panic!("expected operator");
        };
        assert_eq!(add.op, Operator::Add);
        assert!(matches!(&add.operands[1], BoundNode::Operator(m) if m.op == Operator::Mul));
    }

    #[test]
    fn test_tp011_conditional_and_index() {
        let node = parse_template(r#"${var.env == "prod" ? var.sizes["large"] : "t2.micro"}"#)
            .unwrap();
        let BoundNode::Conditional(c) = node else {
            panic!("expected conditional");
        };
        assert!(matches!(*c.condition, BoundNode::Operator(ref o) if o.op == Operator::Eq));
        assert!(matches!(*c.true_expr, BoundNode::Index(_)));
        assert_eq!(*c.false_expr, BoundNode::string("t2.micro"));
    }

    #[test]
    fn test_tp011_unary_not_vs_not_equal() {
        let node = parse_template("${!var.enabled}").unwrap();
        assert!(matches!(node, BoundNode::Operator(ref o) if o.op == Operator::Not));
        let node = parse_template("${var.a != var.b}").unwrap();
        assert!(matches!(node, BoundNode::Operator(ref o) if o.op == Operator::NotEq));
    }

    #[test]
    fn test_tp011_hyphenated_names() {
        let node = parse_template("${aws_instance.my-web.id}").unwrap();
        assert!(matches!(
            node,
            BoundNode::VariableAccess(ref v) if v.var.node_address().as_deref() == Some("aws_instance.my-web")
        ));
    }

    #[test]
    fn test_tp011_errors() {
        assert!(parse_template("${var.x").unwrap_err().contains("expected '}'"));
        assert!(parse_template("${foo}").unwrap_err().contains("unknown variable"));
        assert!(parse_template("${self.id}").unwrap_err().contains("provisioners"));
        assert!(parse_template("${path.home}").unwrap_err().contains("invalid reference"));
        assert!(parse_template(r#"${upper("abc)}"#).is_err());
    }

    #[test]
    fn test_tp011_bind_value_structures() {
        let raw: RawValue = serde_yaml_ng::from_str(
            r#"
tags:
  Name: "web-${var.env}"
  Skip: ~
ports: [80, 443]
"#,
        )
        .unwrap();
        let bound = bind_value(&raw).unwrap().unwrap();
        let BoundNode::Map(m) = bound else {
            panic!("expected map");
        };
        let BoundNode::Map(tags) = &m.elements["tags"] else {
            panic!("expected tags map");
        };
        assert!(!tags.elements.contains_key("Skip"));
        assert!(matches!(&m.elements["ports"], BoundNode::List(l)
            if l.elements[1].as_literal() == Some(&LiteralValue::Number(443.0))));
    }

    #[test]
    fn test_tp011_null_list_element_rejected() {
        let raw = RawValue::List(vec![RawValue::Null]);
        assert!(bind_value(&raw).unwrap_err().contains("null"));
    }
}
