//! TP-023: TypeScript generator.
//!
//! Every graph lands in one program. Child modules become functions of
//! `(mod_name, mod_args)` that return their outputs; the root module reads
//! its variables from stack config and exports its outputs.

use super::legalize::{is_legal_identifier, legalize, NameTable};
use super::profile::FormatProfile;
use super::{Emitter, Generator, INDENT};
use crate::core::error::{Error, Result};
use crate::il::bound::{
    format_number, BoundCall, BoundNode, BoundVariableAccess, LiteralValue, Operator, PathKind,
    Type, Variable,
};
use crate::il::graph::{Graph, ModuleNode, Node, NodeId, NodeKind, ResourceNode, VariableNode};
use crate::il::lower::{lower, LowerOptions};
use crate::il::path::PathContext;
use crate::il::schema::{camel_case, ResourceInfo, Token};
use std::collections::BTreeSet;
use std::io::Write;

/// Construction options for [`NodeJsGenerator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeJsOptions {
    pub project_name: String,

    /// `@pulumi/pulumi` version the output targets; selects the format profile
    pub target_version: String,

    /// Hoist data-source lookups and call them directly instead of wrapping
    /// each in `pulumi.output(...)` at first use
    pub prompt_data_sources: bool,

    /// Project root, as seen from the working directory
    pub root_path: String,
}

impl Default for NodeJsOptions {
    fn default() -> Self {
        Self {
            project_name: "main".to_string(),
            target_version: "1.0.0".to_string(),
            prompt_data_sources: false,
            root_path: ".".to_string(),
        }
    }
}

/// What a reference to a node needs to know about it.
#[derive(Debug, Clone)]
struct Target {
    name: String,
    info: Option<ResourceInfo>,
    counted: bool,
    /// Resolves to a `pulumi.Output` rather than a plain value
    output_typed: bool,
}

#[derive(Debug)]
struct ModuleScope {
    is_root: bool,
    paths: PathContext,
    targets: Vec<Target>,
    /// Child-module outputs, returned from the module function
    outputs: Vec<(String, String)>,
}

pub struct NodeJsGenerator<W: Write> {
    options: NodeJsOptions,
    profile: FormatProfile,
    emitter: Emitter<W>,
    packages: Vec<String>,
    scope: Option<ModuleScope>,
    /// A blank line goes before the next declaration
    separate: bool,
}

impl<W: Write> NodeJsGenerator<W> {
    pub fn new(options: NodeJsOptions, sink: W) -> Result<Self> {
        let profile = FormatProfile::from_version(&options.target_version)?;
        if options.prompt_data_sources && !profile.supports_prompt_data_sources() {
            return Err(Error::Version {
                version: options.target_version.clone(),
                message: "prompt data sources require 0.17.28 or newer".to_string(),
            });
        }
        tracing::debug!(project = %options.project_name, %profile, "typescript generator ready");
        Ok(Self {
            options,
            profile,
            emitter: Emitter::new(sink),
            packages: Vec::new(),
            scope: None,
            separate: false,
        })
    }

    pub fn into_inner(self) -> W {
        self.emitter.into_inner()
    }

    /// Lower a bound tree in the current module's path context. Template
    /// strings keep their fragments.
    pub fn lower_property(&self, node: &BoundNode) -> Result<BoundNode> {
        let options = LowerOptions {
            collapse_outputs: false,
        };
        lower(node, &self.scope()?.paths, options)
    }

    fn scope(&self) -> Result<&ModuleScope> {
        self.scope
            .as_ref()
            .ok_or_else(|| Error::Invariant("no module is being generated".to_string()))
    }

    fn target(&self, id: NodeId) -> Result<&Target> {
        self.scope()?
            .targets
            .get(id.0)
            .ok_or_else(|| Error::Invariant(format!("reference to unknown node {:?}", id)))
    }

    fn name_of(&self, node: &Node) -> Result<String> {
        Ok(self.target(node.id)?.name.clone())
    }

    fn is_root(&self) -> Result<bool> {
        Ok(self.scope()?.is_root)
    }

    // ------------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------------

    fn start_declaration(&mut self) -> Result<()> {
        if self.separate {
            self.emitter.blank()?;
        }
        self.separate = true;
        Ok(())
    }

    fn comment(&mut self, node: &Node) -> Result<()> {
        let Some(text) = &node.comment else {
            return Ok(());
        };
        if !self.profile.comments_on_all_nodes() && node.resource().is_none() {
            return Ok(());
        }
        for line in text.lines() {
            let line = line.trim_end();
            if line.is_empty() {
                self.emitter.line("//")?;
            } else {
                self.emitter.line(&format!("// {}", line))?;
            }
        }
        Ok(())
    }

    fn lowered_text(&self, node: &BoundNode, ind: &str) -> Result<String> {
        let lowered = self.lower_property(node)?;
        self.render(&lowered, ind)
    }

    fn variable(&mut self, node: &Node, v: &VariableNode) -> Result<()> {
        let ind = self.emitter.indent();
        let default = match &v.default {
            Some(d) => Some(self.lowered_text(d, &ind)?),
            None => None,
        };
        let key = &node.name;
        let read = if self.is_root()? {
            let (suffix, generic) = if self.profile.typed_config() {
                config_getter(v.ty)
            } else {
                ("", "")
            };
            match default {
                Some(d) => format!("config.get{}{}({}) || {}", suffix, generic, quote(key), d),
                None => format!("config.require{}{}({})", suffix, generic, quote(key)),
            }
        } else {
            let arg = member("mod_args", key);
            match default {
                Some(d) => format!("{} || {}", arg, d),
                None => arg,
            }
        };
        let line = format!("const {} = {};", self.name_of(node)?, read);
        self.emitter.line(&line)
    }

    fn local(&mut self, node: &Node) -> Result<()> {
        let ind = self.emitter.indent();
        let value = self.value_text(node, &ind)?;
        let line = format!("const {} = {};", self.name_of(node)?, value);
        self.emitter.line(&line)
    }

    fn output(&mut self, node: &Node) -> Result<()> {
        if self.is_root()? {
            let ind = self.emitter.indent();
            let value = self.value_text(node, &ind)?;
            let line = format!("export const {} = {};", self.name_of(node)?, value);
            return self.emitter.line(&line);
        }
        let inner = format!("{}{}", self.emitter.indent(), INDENT);
        let value = self.value_text(node, &inner)?;
        if let Some(scope) = self.scope.as_mut() {
            scope.outputs.push((node.name.clone(), value));
        }
        Ok(())
    }

    fn value_text(&self, node: &Node, ind: &str) -> Result<String> {
        let value = node
            .value()
            .ok_or_else(|| Error::Invariant(format!("{} has no value", node.address())))?;
        self.lowered_text(value, ind)
    }

    fn provider(&mut self, node: &Node, alias: Option<&str>) -> Result<()> {
        let ind = self.emitter.indent();
        let args = self.arguments(node, None, &ind)?;
        let line = format!(
            "const {} = new {}.Provider({}, {});",
            self.name_of(node)?,
            legalize(&node.name),
            self.logical_name(alias.unwrap_or(&node.name), false)?,
            args
        );
        self.emitter.line(&line)
    }

    fn module(&mut self, node: &Node, _module: &ModuleNode) -> Result<()> {
        let ind = self.emitter.indent();
        let mut entries = Vec::new();
        let inner = format!("{}{}", ind, INDENT);
        for (key, value) in &node.properties.elements {
            entries.push((key.clone(), self.lowered_text(value, &inner)?));
        }
        let line = format!(
            "const {} = mod_{}({}, {});",
            self.name_of(node)?,
            legalize(&node.name),
            self.logical_name(&node.name, false)?,
            object(&entries, &ind)
        );
        self.emitter.line(&line)
    }

    fn resource(&mut self, node: &Node, r: &ResourceNode) -> Result<()> {
        let token = Token::parse(&r.info.token).ok_or_else(|| Error::Schema {
            node: node.address(),
            provider: r.info.token.clone(),
            type_name: r.type_name.clone(),
        })?;
        let name = self.name_of(node)?;
        let ind = self.emitter.indent();

        let count = match &r.count {
            Some(c) => Some(self.lowered_text(c, &ind)?),
            None => None,
        };
        // counted constructors sit one level deeper, inside the loop
        let body_ind = if count.is_some() {
            format!("{}{}", ind, INDENT)
        } else {
            ind.clone()
        };

        let args = self.arguments(node, Some(&r.info), &body_ind)?;
        let mut opts = Vec::new();
        if let Some(provider) = self.provider_option(r)? {
            opts.push(format!("provider: {}", provider));
        }

        let (construct, array_type) = if r.data_source {
            if !self.options.prompt_data_sources && self.profile.async_invoke() {
                opts.insert(0, "async: true".to_string());
            }
            let call = format!(
                "{}({}{})",
                qualified(&token),
                args,
                inline_options(&opts)
            );
            let call = if self.options.prompt_data_sources {
                call
            } else {
                format!("pulumi.output({})", call)
            };
            (call, "any".to_string())
        } else {
            if let Some(deps) = &r.depends_on {
                opts.push(format!("dependsOn: {}", self.inline_list(deps)?));
            }
            let call = format!(
                "new {}({}, {}{})",
                qualified(&token),
                self.logical_name(&node.name, count.is_some())?,
                args,
                inline_options(&opts)
            );
            (call, qualified(&token))
        };

        match count {
            None => self.emitter.line(&format!("const {} = {};", name, construct)),
            Some(count) => {
                self.emitter
                    .line(&format!("const {}: {}[] = [];", name, array_type))?;
                self.emitter
                    .line(&format!("for (let i = 0; i < {}; i++) {{", count))?;
                self.emitter.indented();
                self.emitter.line(&format!("{}.push({});", name, construct))?;
                self.emitter.dedented();
                self.emitter.line("}")
            }
        }
    }

    fn provider_option(&self, r: &ResourceNode) -> Result<Option<String>> {
        match &r.provider {
            Some(BoundNode::VariableAccess(v)) if v.target.is_some() => {
                Ok(Some(self.access(v)?))
            }
            _ => Ok(None),
        }
    }

    fn inline_list(&self, list: &BoundNode) -> Result<String> {
        let items = match list {
            BoundNode::List(l) => l
                .elements
                .iter()
                .map(|e| self.render(e, ""))
                .collect::<Result<Vec<_>>>()?,
            other => vec![self.render(other, "")?],
        };
        Ok(format!("[{}]", items.join(", ")))
    }

    /// Constructor arguments, keyed by target property name.
    fn arguments(&self, node: &Node, info: Option<&ResourceInfo>, ind: &str) -> Result<String> {
        let inner = format!("{}{}", ind, INDENT);
        let mut entries = Vec::with_capacity(node.properties.elements.len());
        for (key, value) in &node.properties.elements {
            let name = match info {
                Some(info) => info.property_name(key),
                None => camel_case(key),
            };
            entries.push((name, self.lowered_text(value, &inner)?));
        }
        Ok(object(&entries, ind))
    }

    /// The name string a resource is registered under.
    fn logical_name(&self, name: &str, counted: bool) -> Result<String> {
        let root = self.is_root()?;
        Ok(match (root, counted) {
            (true, false) => quote(name),
            (true, true) => format!("`{}-${{i}}`", escape_template(name)),
            (false, false) => format!("`${{mod_name}}-{}`", escape_template(name)),
            (false, true) => format!("`${{mod_name}}-{}-${{i}}`", escape_template(name)),
        })
    }

    // ------------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------------

    /// Render a lowered tree. `ind` is the indentation of the line the
    /// rendered text starts on.
    fn render(&self, node: &BoundNode, ind: &str) -> Result<String> {
        match node {
            BoundNode::Literal(l) => Ok(literal(&l.value)),
            BoundNode::VariableAccess(v) => self.access(v),
            BoundNode::Output(o) => self.template(&o.exprs, ind),
            BoundNode::List(l) => {
                if l.elements.is_empty() {
                    return Ok("[]".to_string());
                }
                let inner = format!("{}{}", ind, INDENT);
                let mut out = String::from("[\n");
                for e in &l.elements {
                    out.push_str(&format!("{}{},\n", inner, self.render(e, &inner)?));
                }
                out.push_str(ind);
                out.push(']');
                Ok(out)
            }
            BoundNode::Map(m) => {
                let inner = format!("{}{}", ind, INDENT);
                let mut entries = Vec::with_capacity(m.elements.len());
                for (key, value) in &m.elements {
                    entries.push((key.clone(), self.render(value, &inner)?));
                }
                Ok(object(&entries, ind))
            }
            BoundNode::Conditional(c) => Ok(format!(
                "({} ? {} : {})",
                self.render(&c.condition, ind)?,
                self.render(&c.true_expr, ind)?,
                self.render(&c.false_expr, ind)?
            )),
            BoundNode::Call(c) => self.call(c, ind),
            BoundNode::Index(i) => Ok(format!(
                "{}[{}]",
                self.render(&i.target, ind)?,
                self.render(&i.key, ind)?
            )),
            BoundNode::Operator(o) => {
                let operands = o
                    .operands
                    .iter()
                    .map(|e| self.render(e, ind))
                    .collect::<Result<Vec<_>>>()?;
                match operands.as_slice() {
                    [a] if o.op.is_unary() => Ok(format!("({}{})", o.op.symbol(), a)),
                    [a, b] => Ok(format!("({} {} {})", a, js_operator(o.op), b)),
                    _ => Err(Error::Invariant(format!(
                        "operator {} with {} operands",
                        o.op.symbol(),
                        operands.len()
                    ))),
                }
            }
        }
    }

    fn access(&self, v: &BoundVariableAccess) -> Result<String> {
        match &v.var {
            Variable::Path(PathKind::Cwd) => return Ok("process.cwd()".to_string()),
            Variable::Path(_) => {
                return Err(Error::Invariant(format!("{} reached emission unlowered", v.var)))
            }
            Variable::CountIndex => return Ok("i".to_string()),
            Variable::Workspace => return Ok("pulumi.getStack()".to_string()),
            _ => {}
        }

        let id = v
            .target
            .ok_or_else(|| Error::Invariant(format!("unresolved reference {}", v.var)))?;
        let target = self.target(id)?;
        match &v.var {
            Variable::Resource { elements, .. } => Ok(resource_access(target, elements)),
            Variable::Module { output, .. } => Ok(member(&target.name, output)),
            _ => Ok(target.name.clone()),
        }
    }

    fn template(&self, exprs: &[BoundNode], ind: &str) -> Result<String> {
        let mut body = String::new();
        let mut outputs = false;
        for e in exprs {
            match e.as_literal() {
                Some(lit) => body.push_str(&escape_template(&lit.to_text())),
                None => {
                    body.push_str("${");
                    body.push_str(&self.render(e, ind)?);
                    body.push('}');
                    outputs |= self.mentions_output(e);
                }
            }
        }
        let tag = if outputs && self.profile.interpolate() {
            "pulumi.interpolate"
        } else {
            ""
        };
        Ok(format!("{}`{}`", tag, body))
    }

    fn mentions_output(&self, node: &BoundNode) -> bool {
        node.variables().iter().any(|v| {
            v.target
                .and_then(|id| self.target(id).ok())
                .is_some_and(|t| t.output_typed)
        })
    }

    fn call(&self, c: &BoundCall, ind: &str) -> Result<String> {
        let args = c
            .args
            .iter()
            .map(|a| self.render(a, ind))
            .collect::<Result<Vec<_>>>()?;
        let text = match (c.func.as_str(), args.as_slice()) {
            ("file", [p]) => format!("fs.readFileSync({}, \"utf-8\")", p),
            ("lookup", [m, k]) => format!("{}[{}]", m, k),
            ("lookup", [m, k, d]) => format!("({}[{}] || {})", m, k, d),
            ("element", [l, i]) => format!("{}[{}]", l, i),
            ("length", [x]) => format!("{}.length", x),
            ("upper", [s]) => format!("{}.toUpperCase()", s),
            ("lower", [s]) => format!("{}.toLowerCase()", s),
            ("join", [sep, l]) => format!("{}.join({})", l, sep),
            ("split", [sep, s]) => format!("{}.split({})", s, sep),
            ("min", [_, ..]) => format!("Math.min({})", args.join(", ")),
            ("max", [_, ..]) => format!("Math.max({})", args.join(", ")),
            _ => {
                tracing::warn!(function = %c.func, "no translation for function");
                format!("(() => {{ throw \"tfport: NYI: call to {}\"; }})()", c.func)
            }
        };
        Ok(text)
    }
}

impl<W: Write> Generator for NodeJsGenerator<W> {
    fn profile(&self) -> FormatProfile {
        self.profile
    }

    fn prompt_data_sources(&self) -> bool {
        self.options.prompt_data_sources
    }

    fn begin(&mut self, graphs: &[Graph]) -> Result<()> {
        let mut packages = BTreeSet::new();
        let mut uses_fs = false;
        for node in graphs.iter().flat_map(|g| &g.nodes) {
            match &node.kind {
                NodeKind::Resource(r) => {
                    if let Some(token) = Token::parse(&r.info.token) {
                        packages.insert(token.package);
                    }
                }
                NodeKind::Provider(_) => {
                    packages.insert(node.name.clone());
                }
                _ => {}
            }
            for tree in node.bound_nodes() {
                tree.walk(&mut |n| {
                    if matches!(n, BoundNode::Call(c) if c.func == "file") {
                        uses_fs = true;
                    }
                });
            }
        }
        self.packages = packages.into_iter().collect();

        self.emitter
            .line("import * as pulumi from \"@pulumi/pulumi\";")?;
        for package in &self.packages {
            self.emitter.line(&format!(
                "import * as {} from \"@pulumi/{}\";",
                legalize(package),
                package
            ))?;
        }
        if uses_fs {
            self.emitter.line("import * as fs from \"fs\";")?;
        }
        self.separate = true;
        Ok(())
    }

    fn begin_module(&mut self, graph: &Graph) -> Result<()> {
        let names = NameTable::for_graph(graph, self.packages.iter().map(String::as_str));
        let targets = graph
            .nodes
            .iter()
            .map(|n| Target {
                name: names
                    .get(n.id)
                    .map(str::to_string)
                    .unwrap_or_else(|| legalize(&n.name)),
                info: n.resource().map(|r| r.info.clone()),
                counted: n.resource().is_some_and(|r| r.count.is_some()),
                output_typed: matches!(n.kind, NodeKind::Resource(_) | NodeKind::Module(_)),
            })
            .collect();
        self.scope = Some(ModuleScope {
            is_root: graph.is_root,
            paths: PathContext::new(&self.options.root_path, &graph.path, graph.is_root),
            targets,
            outputs: Vec::new(),
        });

        if !graph.is_root {
            self.start_declaration()?;
            self.emitter.line(&format!(
                "const mod_{} = (mod_name: string, mod_args: pulumi.Inputs) => {{",
                legalize(&graph.name)
            ))?;
            self.emitter.indented();
            self.separate = false;
        } else if graph.variables().next().is_some() {
            self.start_declaration()?;
            self.emitter.line("const config = new pulumi.Config();")?;
        }
        Ok(())
    }

    fn generate_node(&mut self, _graph: &Graph, node: &Node) -> Result<()> {
        if matches!(node.kind, NodeKind::Output) && !self.is_root()? {
            // returned from the module function; nothing printed here
            return self.output(node);
        }
        self.start_declaration()?;
        self.comment(node)?;
        match &node.kind {
            NodeKind::Resource(r) => self.resource(node, r),
            NodeKind::Variable(v) => self.variable(node, v),
            NodeKind::Local => self.local(node),
            NodeKind::Output => self.output(node),
            NodeKind::Provider(p) => self.provider(node, p.alias.as_deref()),
            NodeKind::Module(m) => self.module(node, m),
        }
    }

    fn end_module(&mut self, graph: &Graph) -> Result<()> {
        let scope = self
            .scope
            .take()
            .ok_or_else(|| Error::Invariant("end_module without begin_module".to_string()))?;
        if !graph.is_root {
            self.start_declaration()?;
            let ind = self.emitter.indent();
            self.emitter
                .line(&format!("return {};", object(&scope.outputs, &ind)))?;
            self.emitter.dedented();
            self.emitter.line("};")?;
            self.separate = true;
        }
        tracing::debug!(module = %graph.name, "module emitted");
        Ok(())
    }

    fn compute_property(&self, node: &BoundNode) -> Result<String> {
        self.render(node, &self.emitter.indent())
    }
}

fn config_getter(ty: Type) -> (&'static str, &'static str) {
    match ty {
        Type::Number => ("Number", ""),
        Type::Bool => ("Boolean", ""),
        Type::List => ("Object", "<any[]>"),
        Type::Map => ("Object", "<Record<string, any>>"),
        Type::String | Type::Unknown => ("", ""),
    }
}

/// A double-quoted string literal.
fn quote(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

fn literal(value: &LiteralValue) -> String {
    match value {
        LiteralValue::String(s) => quote(s),
        LiteralValue::Number(n) => format_number(*n),
        LiteralValue::Bool(b) => b.to_string(),
    }
}

fn member(base: &str, key: &str) -> String {
    if is_legal_identifier(key) {
        format!("{}.{}", base, key)
    } else {
        format!("{}[{}]", base, quote(key))
    }
}

/// An object literal whose values were rendered one level below `ind`.
fn object(entries: &[(String, String)], ind: &str) -> String {
    if entries.is_empty() {
        return "{}".to_string();
    }
    let mut out = String::from("{\n");
    for (key, value) in entries {
        let key = if is_legal_identifier(key) {
            key.clone()
        } else {
            quote(key)
        };
        out.push_str(&format!("{}{}{}: {},\n", ind, INDENT, key, value));
    }
    out.push_str(ind);
    out.push('}');
    out
}

fn inline_options(opts: &[String]) -> String {
    if opts.is_empty() {
        String::new()
    } else {
        format!(", {{ {} }}", opts.join(", "))
    }
}

/// `pkg.module.Member`, with the index module omitted.
fn qualified(token: &Token) -> String {
    let package = legalize(&token.package);
    match &token.module {
        Some(module) => format!("{}.{}.{}", package, legalize(module), token.member),
        None => format!("{}.{}", package, token.member),
    }
}

fn escape_template(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('`', "\\`")
        .replace("${", "\\${")
}

fn js_operator(op: Operator) -> &'static str {
    match op {
        Operator::Eq => "===",
        Operator::NotEq => "!==",
        other => other.symbol(),
    }
}

fn resource_access(target: &Target, elements: &[String]) -> String {
    let info = target.info.as_ref();
    match elements.split_first() {
        None => target.name.clone(),
        Some((first, rest)) if first == "*" => splat(target, rest),
        Some((first, rest)) if first.parse::<usize>().is_ok() => {
            format!("{}[{}]{}", target.name, first, attribute_path(info, rest))
        }
        Some(_) if target.counted => splat(target, elements),
        Some(_) => format!("{}{}", target.name, attribute_path(info, elements)),
    }
}

fn splat(target: &Target, rest: &[String]) -> String {
    let path = attribute_path(target.info.as_ref(), rest);
    match (target.counted, path.is_empty()) {
        (true, true) => target.name.clone(),
        (true, false) => format!("{}.map(v => v{})", target.name, path),
        (false, _) => format!("[{}{}]", target.name, path),
    }
}

/// `.attr[0].nested` for the elements after a resource's name.
fn attribute_path(info: Option<&ResourceInfo>, elements: &[String]) -> String {
    let mut out = String::new();
    for (i, element) in elements.iter().enumerate() {
        if element.parse::<usize>().is_ok() {
            out.push_str(&format!("[{}]", element));
            continue;
        }
        let name = match (i, info) {
            (0, Some(info)) => info.property_name(element),
            _ => camel_case(element),
        };
        if is_legal_identifier(&name) {
            out.push('.');
            out.push_str(&name);
        } else {
            out.push_str(&format!("[{}]", quote(&name)));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::parse_module;
    use crate::core::types::{ModuleTree, RawValue};
    use crate::gen::generate;
    use crate::il::graph::{build_graph, build_module_graphs, BuildOptions};
    use crate::il::schema::StaticProviderInfo;
    use indexmap::IndexMap;

    const AWS: &str = r#"
aws:
  resources:
    aws_instance:
      token: "aws:ec2/instance:Instance"
      fields:
        public_ip: { type: string }
    aws_vpc:
      token: "aws:ec2/vpc:Vpc"
  data_sources:
    aws_ami:
      token: "aws:index/getAmi:getAmi"
"#;

    const ORDERING: &str = r#"
declarations:
  # Region to deploy into
  var.region:
    default: us-east-1
  data.aws_ami.ubuntu:
    most_recent: true
    owners: ["099720109477"]
  aws_vpc.main:
    cidr_block: 10.0.0.0/16
  # The web server
  aws_instance.web:
    ami: "${data.aws_ami.ubuntu.id}"
    instance_type: t2.micro
    tags:
      Name: "web-${var.region}"
  output.ip:
    value: "${aws_instance.web.public_ip}"
"#;

    fn module(yaml: &str) -> ModuleTree {
        let parsed = parse_module(yaml).unwrap();
        let mut tree = ModuleTree::root("main");
        tree.declarations = parsed.declarations;
        tree.comments_available = parsed.comments_available;
        tree
    }

    fn render_tree(tree: &ModuleTree, version: &str, prompt: bool) -> String {
        let info = StaticProviderInfo::from_yaml(AWS).unwrap();
        let options = BuildOptions {
            provider_info: Some(&info),
            allow_missing_providers: true,
            allow_missing_variables: true,
            allow_missing_comments: true,
        };
        let graphs = build_module_graphs(tree, &options).unwrap();
        let mut gen = NodeJsGenerator::new(
            NodeJsOptions {
                target_version: version.to_string(),
                prompt_data_sources: prompt,
                ..Default::default()
            },
            Vec::new(),
        )
        .unwrap();
        generate(&graphs, &mut gen).unwrap();
        String::from_utf8(gen.into_inner()).unwrap()
    }

    fn render(yaml: &str, version: &str, prompt: bool) -> String {
        render_tree(&module(yaml), version, prompt)
    }

    /// The emitted line for `output.x = expr`, next to a variable and a resource.
    fn expression(expr: &str, version: &str) -> String {
        let mut tree = ModuleTree::root("main")
            .declare("var.env", RawValue::Map(IndexMap::new()))
            .unwrap()
            .declare("aws_instance.web", RawValue::Map(IndexMap::new()))
            .unwrap()
            .declare(
                "output.x",
                RawValue::Map(IndexMap::from([(
                    "value".to_string(),
                    RawValue::String(expr.to_string()),
                )])),
            )
            .unwrap();
        tree.comments_available = true;
        let out = render_tree(&tree, version, false);
        out.lines().last().unwrap_or_default().to_string()
    }

    #[test]
    fn test_tp023_lower_to_literal() {
        let mut tree = ModuleTree::root("main");
        tree.path = "./foo/bar".to_string();
        tree.comments_available = true;
        let graph = build_graph(&tree, &BuildOptions::default()).unwrap();

        let mut gen = NodeJsGenerator::new(NodeJsOptions::default(), Vec::new()).unwrap();
        gen.begin_module(&graph).unwrap();

        let prop = BoundNode::map(IndexMap::from([(
            "key".to_string(),
            BoundNode::output(vec![
                BoundNode::string("module: "),
                BoundNode::path(PathKind::Module),
                BoundNode::string(" root: "),
                BoundNode::path(PathKind::Root),
            ]),
        )]));
        let lowered = gen.lower_property(&prop).unwrap();

        let BoundNode::Map(map) = &lowered else {
            panic!("expected map, got {:?}", lowered);
        };
        let BoundNode::Output(out) = &map.elements["key"] else {
            panic!("expected output");
        };
        assert_eq!(out.exprs[1], BoundNode::string("foo/bar"));
        assert_eq!(out.exprs[3], BoundNode::string("."));

        assert_eq!(
            gen.compute_property(&lowered).unwrap(),
            "{\n    key: `module: foo/bar root: .`,\n}"
        );
    }

    #[test]
    fn test_tp023_unlowered_path_is_invariant_error() {
        let mut tree = ModuleTree::root("main");
        tree.comments_available = true;
        let graph = build_graph(&tree, &BuildOptions::default()).unwrap();
        let mut gen = NodeJsGenerator::new(NodeJsOptions::default(), Vec::new()).unwrap();
        gen.begin_module(&graph).unwrap();
        let err = gen
            .compute_property(&BoundNode::path(PathKind::Root))
            .unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn test_tp023_prompt_requires_async_invoke() {
        let options = NodeJsOptions {
            target_version: "0.17.1".to_string(),
            prompt_data_sources: true,
            ..Default::default()
        };
        let err = NodeJsGenerator::new(options, Vec::new()).err().unwrap();
        assert!(matches!(err, Error::Version { .. }));
    }

    #[test]
    fn test_tp023_ordering_not_prompt() {
        insta::assert_snapshot!(render(ORDERING, "1.0.0", false).trim_end(), @r###"
import * as pulumi from "@pulumi/pulumi";
import * as aws from "@pulumi/aws";

const config = new pulumi.Config();

// Region to deploy into
const region = config.get("region") || "us-east-1";

const main = new aws.ec2.Vpc("main", {
    cidrBlock: "10.0.0.0/16",
});

const ubuntu = pulumi.output(aws.getAmi({
    mostRecent: true,
    owners: [
        "099720109477",
    ],
}, { async: true }));

// The web server
const web = new aws.ec2.Instance("web", {
    ami: ubuntu.id,
    instanceType: "t2.micro",
    tags: {
        Name: `web-${region}`,
    },
});

export const ip = web.publicIp;
"###);
    }

    #[test]
    fn test_tp023_ordering_prompt() {
        insta::assert_snapshot!(render(ORDERING, "1.0.0", true).trim_end(), @r###"
import * as pulumi from "@pulumi/pulumi";
import * as aws from "@pulumi/aws";

const config = new pulumi.Config();

// Region to deploy into
const region = config.get("region") || "us-east-1";

const ubuntu = aws.getAmi({
    mostRecent: true,
    owners: [
        "099720109477",
    ],
});

const main = new aws.ec2.Vpc("main", {
    cidrBlock: "10.0.0.0/16",
});

// The web server
const web = new aws.ec2.Instance("web", {
    ami: ubuntu.id,
    instanceType: "t2.micro",
    tags: {
        Name: `web-${region}`,
    },
});

export const ip = web.publicIp;
"###);
    }

    #[test]
    fn test_tp023_legacy_format() {
        insta::assert_snapshot!(render(ORDERING, "0.16.0", false).trim_end(), @r###"
import * as pulumi from "@pulumi/pulumi";
import * as aws from "@pulumi/aws";

const config = new pulumi.Config();

const region = config.get("region") || "us-east-1";

const main = new aws.ec2.Vpc("main", {
    cidrBlock: "10.0.0.0/16",
});

const ubuntu = pulumi.output(aws.getAmi({
    mostRecent: true,
    owners: [
        "099720109477",
    ],
}));

// The web server
const web = new aws.ec2.Instance("web", {
    ami: ubuntu.id,
    instanceType: "t2.micro",
    tags: {
        Name: `web-${region}`,
    },
});

export const ip = web.publicIp;
"###);
    }

    #[test]
    fn test_tp023_typed_config() {
        let yaml = r#"
declarations:
  var.count:
    default: 3
  var.enabled:
    type: bool
  var.zones:
    default: [a, b]
"#;
        let out = render(yaml, "0.17.1", false);
        assert!(out.contains(r#"const count = config.getNumber("count") || 3;"#));
        assert!(out.contains(r#"const enabled = config.requireBoolean("enabled");"#));
        assert!(out.contains(r#"const zones = config.getObject<any[]>("zones") || ["#));

        let legacy = render(yaml, "0.16.0", false);
        assert!(legacy.contains(r#"const count = config.get("count") || 3;"#));
        assert!(legacy.contains(r#"const enabled = config.require("enabled");"#));
    }

    #[test]
    fn test_tp023_counted_resource() {
        let yaml = r#"
declarations:
  aws_instance.web:
    count: 2
    instance_type: t2.micro
    tags:
      Name: "web-${count.index}"
  output.ids:
    value: "${aws_instance.web.*.id}"
"#;
        insta::assert_snapshot!(render(yaml, "1.0.0", false).trim_end(), @r###"
import * as pulumi from "@pulumi/pulumi";
import * as aws from "@pulumi/aws";

const web: aws.ec2.Instance[] = [];
for (let i = 0; i < 2; i++) {
    web.push(new aws.ec2.Instance(`web-${i}`, {
        instanceType: "t2.micro",
        tags: {
            Name: `web-${i}`,
        },
    }));
}

export const ids = web.map(v => v.id);
"###);
    }

    #[test]
    fn test_tp023_resource_options() {
        let yaml = r#"
declarations:
  provider.aws.west:
    region: us-west-2
  aws_vpc.main: {}
  aws_instance.web:
    provider: aws.west
    depends_on: [aws_vpc.main]
    instance_type: t2.micro
"#;
        insta::assert_snapshot!(render(yaml, "1.0.0", false).trim_end(), @r###"
import * as pulumi from "@pulumi/pulumi";
import * as aws from "@pulumi/aws";

const awsWest = new aws.Provider("west", {
    region: "us-west-2",
});

const main = new aws.ec2.Vpc("main", {});

const web = new aws.ec2.Instance("web", {
    instanceType: "t2.micro",
}, { provider: awsWest, dependsOn: [main] });
"###);
    }

    #[test]
    fn test_tp023_child_module_function() {
        let mut child = ModuleTree::child("network", "modules/network")
            .declare("var.cidr", RawValue::Map(IndexMap::new()))
            .unwrap()
            .declare(
                "aws_vpc.main",
                RawValue::Map(IndexMap::from([(
                    "cidr_block".to_string(),
                    RawValue::String("${var.cidr}".to_string()),
                )])),
            )
            .unwrap()
            .declare(
                "output.vpc_id",
                RawValue::Map(IndexMap::from([(
                    "value".to_string(),
                    RawValue::String("${aws_vpc.main.id}".to_string()),
                )])),
            )
            .unwrap();
        child.comments_available = true;

        let mut root = module(
            r#"
declarations:
  module.network:
    source: ./modules/network
    cidr: 10.0.0.0/16
  output.vpc:
    value: "${module.network.vpc_id}"
"#,
        );
        root.children.push(child);

        insta::assert_snapshot!(render_tree(&root, "1.0.0", false).trim_end(), @r###"
import * as pulumi from "@pulumi/pulumi";
import * as aws from "@pulumi/aws";

const mod_network = (mod_name: string, mod_args: pulumi.Inputs) => {
    const cidr = mod_args.cidr;

    const main = new aws.ec2.Vpc(`${mod_name}-main`, {
        cidrBlock: cidr,
    });

    return {
        vpc_id: main.id,
    };
};

const network = mod_network("network", {
    cidr: "10.0.0.0/16",
});

export const vpc = network.vpc_id;
"###);
    }

    #[test]
    fn test_tp023_expressions() {
        let cases = [
            (r#"${var.env == "prod" ? 3 : 1}"#, r#"((env === "prod") ? 3 : 1)"#),
            ("${length(var.env) + 1}", "(env.length + 1)"),
            ("${upper(var.env)}", "env.toUpperCase()"),
            (r#"${lookup(var.env, "a", "b")}"#, r#"(env["a"] || "b")"#),
            (r#"${join(",", var.env)}"#, r#"env.join(",")"#),
            (r#"${var.env["k"]}"#, r#"env["k"]"#),
            ("${path.cwd}", "process.cwd()"),
            ("${terraform.workspace}", "pulumi.getStack()"),
            ("${aws_instance.web.0.id}", "web[0].id"),
            (
                "${frobnicate(1)}",
                r#"(() => { throw "tfport: NYI: call to frobnicate"; })()"#,
            ),
            ("a`b ${var.env} $${x}", r"`a\`b ${env} \${x}`"),
        ];
        for (expr, expected) in cases {
            assert_eq!(
                expression(expr, "1.0.0"),
                format!("export const x = {};", expected),
                "{}",
                expr
            );
        }
    }

    #[test]
    fn test_tp023_interpolate_depends_on_profile() {
        let expr = "http://${aws_instance.web.public_ip}:8080";
        assert_eq!(
            expression(expr, "1.0.0"),
            "export const x = pulumi.interpolate`http://${web.publicIp}:8080`;"
        );
        assert_eq!(
            expression(expr, "0.16.0"),
            "export const x = `http://${web.publicIp}:8080`;"
        );
        assert_eq!(
            expression("id-${var.env}", "1.0.0"),
            "export const x = `id-${env}`;"
        );
    }

    #[test]
    fn test_tp023_file_imports_fs() {
        let mut tree = ModuleTree::root("main").declare(
            "output.script",
            RawValue::Map(IndexMap::from([(
                "value".to_string(),
                RawValue::String(r#"${file("${path.module}/init.sh")}"#.to_string()),
            )])),
        )
        .unwrap();
        tree.comments_available = true;
        let out = render_tree(&tree, "1.0.0", false);
        assert!(out.contains("import * as fs from \"fs\";"));
        assert!(out.ends_with("export const script = fs.readFileSync(`./init.sh`, \"utf-8\");\n"));
    }

    #[test]
    fn test_tp023_reserved_word_names() {
        let yaml = r#"
declarations:
  var.public:
    default: x
  aws_vpc.new:
    cidr_block: "${var.public}"
"#;
        insta::assert_snapshot!(render(yaml, "1.0.0", false).trim_end(), @r###"
import * as pulumi from "@pulumi/pulumi";
import * as aws from "@pulumi/aws";

const config = new pulumi.Config();

const publicInput = config.get("public") || "x";

const newResource = new aws.ec2.Vpc("new", {
    cidrBlock: publicInput,
});
"###);
    }

    #[test]
    fn test_tp023_non_finite_numbers() {
        let mut tree = ModuleTree::root("main");
        tree.comments_available = true;
        for (name, n) in [("up", f64::INFINITY), ("down", f64::NEG_INFINITY), ("nan", f64::NAN)] {
            tree = tree
                .declare(
                    &format!("output.{}", name),
                    RawValue::Map(IndexMap::from([("value".to_string(), RawValue::Number(n))])),
                )
                .unwrap();
        }
        let out = render_tree(&tree, "1.0.0", false);
        assert!(out.contains("export const up = Infinity;\n"));
        assert!(out.contains("export const down = -Infinity;\n"));
        assert!(out.contains("export const nan = NaN;\n"));
    }
}
