//! TP-014: Dependency graph construction.
//!
//! One node per declaration. Building runs in four passes:
//! 1. create node skeletons and the address index (schema lookups happen here)
//! 2. bind every property into a bound tree and resolve its references
//! 3. derive each node's dependency set from one walk of its bound trees
//! 4. reject cycles with a depth-first search
//!
//! Tolerance for missing schemas, variables, and comments is opt-in through
//! [`BuildOptions`]; nothing here reads global state, so independent graphs
//! can be built on separate threads.

use super::bound::{BoundMap, BoundNode, Type, Variable};
use super::expr;
use super::schema::{provider_of, ProviderInfoSource, ResourceInfo, SchemaMiss};
use crate::core::error::{Error, Result};
use crate::core::types::{Declaration, DeclarationKind, ModuleTree, RawValue};
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;

/// Index of a node within its graph, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Options for [`build_graph`].
#[derive(Clone, Copy, Default)]
pub struct BuildOptions<'a> {
    /// Schema source; `None` makes every lookup a miss
    pub provider_info: Option<&'a dyn ProviderInfoSource>,

    /// Substitute opaque schemas for unknown providers and resource kinds
    pub allow_missing_providers: bool,

    /// Substitute placeholder nodes for undeclared variables
    pub allow_missing_variables: bool,

    /// Accept modules whose comments could not be extracted
    pub allow_missing_comments: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceNode {
    pub type_name: String,
    pub data_source: bool,
    pub info: ResourceInfo,
    pub count: Option<BoundNode>,
    /// Explicit `depends_on`, bound to a list of resource references
    pub depends_on: Option<BoundNode>,
    /// Explicit `provider`, bound to a provider reference
    pub provider: Option<BoundNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableNode {
    pub ty: Type,
    pub default: Option<BoundNode>,
    /// Synthesized for an undeclared variable under tolerant construction
    pub placeholder: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderNode {
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleNode {
    pub source: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Resource(ResourceNode),
    Variable(VariableNode),
    Local,
    Output,
    Provider(ProviderNode),
    Module(ModuleNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    /// Bound arguments; outputs and locals keep their value under `value`
    pub properties: BoundMap,
    pub comment: Option<String>,
    deps: Vec<NodeId>,
}

impl Node {
    pub fn address(&self) -> String {
        match &self.kind {
            NodeKind::Resource(r) if r.data_source => format!("data.{}.{}", r.type_name, self.name),
            NodeKind::Resource(r) => format!("{}.{}", r.type_name, self.name),
            NodeKind::Variable(_) => format!("var.{}", self.name),
            NodeKind::Local => format!("local.{}", self.name),
            NodeKind::Output => format!("output.{}", self.name),
            NodeKind::Module(_) => format!("module.{}", self.name),
            NodeKind::Provider(ProviderNode { alias: Some(a) }) => {
                format!("provider.{}.{}", self.name, a)
            }
            NodeKind::Provider(_) => format!("provider.{}", self.name),
        }
    }

    /// Nodes this node depends on, ascending by declaration order.
    pub fn dependencies(&self) -> &[NodeId] {
        &self.deps
    }

    pub fn is_data_source(&self) -> bool {
        matches!(&self.kind, NodeKind::Resource(r) if r.data_source)
    }

    pub fn resource(&self) -> Option<&ResourceNode> {
        match &self.kind {
            NodeKind::Resource(r) => Some(r),
            _ => None,
        }
    }

    /// The `value` of an output or local.
    pub fn value(&self) -> Option<&BoundNode> {
        self.properties.elements.get("value")
    }

    /// Every bound tree owned by this node.
    pub fn bound_nodes(&self) -> Vec<&BoundNode> {
        let mut out: Vec<&BoundNode> = self.properties.elements.values().collect();
        match &self.kind {
            NodeKind::Resource(r) => {
                out.extend(r.count.iter());
                out.extend(r.depends_on.iter());
                out.extend(r.provider.iter());
            }
            NodeKind::Variable(v) => out.extend(v.default.iter()),
            _ => {}
        }
        out
    }

    pub(crate) fn derive_dependencies(&mut self) {
        let mut deps = BTreeSet::new();
        for tree in self.bound_nodes() {
            for access in tree.variables() {
                if let Some(target) = access.target {
                    deps.insert(target);
                }
            }
        }
        self.deps = deps.into_iter().collect();
    }
}

/// The IL for one configuration module.
#[derive(Debug, Clone)]
pub struct Graph {
    pub name: String,
    /// Module location relative to the project root
    pub path: String,
    pub is_root: bool,
    /// Nodes in declaration order; placeholders follow declared nodes
    pub nodes: Vec<Node>,
    index: FxHashMap<String, NodeId>,
}

impl Graph {
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn lookup(&self, address: &str) -> Option<&Node> {
        self.index.get(address).map(|id| self.node(*id))
    }

    pub fn outputs(&self) -> impl Iterator<Item = &Node> {
        self.nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Output))
    }

    pub fn variables(&self) -> impl Iterator<Item = &Node> {
        self.nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Variable(_)))
    }
}

/// Build the graph for a single module. `module.X.Y` references are not
/// checked against child outputs; use [`build_module_graphs`] for that.
pub fn build_graph(tree: &ModuleTree, options: &BuildOptions<'_>) -> Result<Graph> {
    Builder::new(tree, options, &[]).build()
}

/// Build every module in the tree, children before parents.
///
/// Returns graphs in build order: each module's children (depth first, in
/// declaration order) precede it, and the root comes last.
pub fn build_module_graphs(tree: &ModuleTree, options: &BuildOptions<'_>) -> Result<Vec<Graph>> {
    let mut graphs = Vec::new();
    build_subtree(tree, options, &mut graphs)?;
    Ok(graphs)
}

fn build_subtree(tree: &ModuleTree, options: &BuildOptions<'_>, graphs: &mut Vec<Graph>) -> Result<usize> {
    let mut child_indices = Vec::with_capacity(tree.children.len());
    for child in &tree.children {
        child_indices.push(build_subtree(child, options, graphs)?);
    }
    let graph = {
        let children: Vec<&Graph> = child_indices.iter().map(|i| &graphs[*i]).collect();
        Builder::new(tree, options, &children).build()?
    };
    graphs.push(graph);
    Ok(graphs.len() - 1)
}

struct Builder<'t, 'o> {
    tree: &'t ModuleTree,
    options: &'t BuildOptions<'o>,
    children: &'t [&'t Graph],
    nodes: Vec<Node>,
    index: FxHashMap<String, NodeId>,
}

impl<'t, 'o> Builder<'t, 'o> {
    fn new(tree: &'t ModuleTree, options: &'t BuildOptions<'o>, children: &'t [&'t Graph]) -> Self {
        Self {
            tree,
            options,
            children,
            nodes: Vec::with_capacity(tree.declarations.len()),
            index: FxHashMap::default(),
        }
    }

    fn build(mut self) -> Result<Graph> {
        if !self.tree.comments_available && !self.options.allow_missing_comments {
            return Err(Error::config(
                &self.tree.name,
                "comments are unavailable for this module",
            ));
        }

        for decl in &self.tree.declarations {
            self.add_skeleton(decl)?;
        }
        for (i, decl) in self.tree.declarations.iter().enumerate() {
            self.bind(NodeId(i), decl)?;
        }
        for node in &mut self.nodes {
            node.derive_dependencies();
        }

        let graph = Graph {
            name: self.tree.name.clone(),
            path: self.tree.path.clone(),
            is_root: self.tree.is_root,
            nodes: self.nodes,
            index: self.index,
        };
        check_cycles(&graph)?;

        tracing::debug!(
            module = %graph.name,
            path = %graph.path,
            nodes = graph.nodes.len(),
            "graph built"
        );
        Ok(graph)
    }

    fn push(&mut self, name: String, kind: NodeKind, comment: Option<String>) -> NodeId {
        let id = NodeId(self.nodes.len());
        let node = Node {
            id,
            name,
            kind,
            properties: BoundMap::default(),
            comment,
            deps: Vec::new(),
        };
        self.index.insert(node.address(), id);
        self.nodes.push(node);
        id
    }

    // ------------------------------------------------------------------------
    // Pass 1: skeletons
    // ------------------------------------------------------------------------

    fn add_skeleton(&mut self, decl: &Declaration) -> Result<()> {
        let address = decl.address();
        if self.index.contains_key(&address) {
            return Err(Error::config(
                &self.tree.name,
                format!("duplicate declaration '{}'", address),
            ));
        }

        let kind = match decl.kind {
            DeclarationKind::Resource | DeclarationKind::DataSource => {
                let data_source = decl.kind == DeclarationKind::DataSource;
                let type_name = decl.type_name.clone().unwrap_or_default();
                NodeKind::Resource(ResourceNode {
                    info: self.lookup_schema(&address, &type_name, data_source)?,
                    type_name,
                    data_source,
                    count: None,
                    depends_on: None,
                    provider: None,
                })
            }
            DeclarationKind::Variable => NodeKind::Variable(VariableNode {
                ty: variable_type(&address, decl)?,
                default: None,
                placeholder: false,
            }),
            DeclarationKind::Local => NodeKind::Local,
            DeclarationKind::Output => NodeKind::Output,
            DeclarationKind::Provider => NodeKind::Provider(ProviderNode {
                alias: decl.alias().map(str::to_string),
            }),
            DeclarationKind::Module => {
                let source = decl
                    .properties
                    .get("source")
                    .and_then(RawValue::as_str)
                    .ok_or_else(|| {
                        Error::config(
                            &self.tree.name,
                            format!("'{}' has no string 'source'", address),
                        )
                    })?;
                NodeKind::Module(ModuleNode {
                    source: source.to_string(),
                })
            }
        };

        let comment = decl.comment.clone().or_else(|| match decl.kind {
            DeclarationKind::Variable | DeclarationKind::Output => decl
                .properties
                .get("description")
                .and_then(RawValue::as_str)
                .map(str::to_string),
            _ => None,
        });

        self.push(decl.name.clone(), kind, comment);
        Ok(())
    }

    fn lookup_schema(&self, address: &str, type_name: &str, data_source: bool) -> Result<ResourceInfo> {
        let found = match self.options.provider_info {
            Some(source) => source.resource_info(type_name, data_source),
            None => Err(SchemaMiss::UnknownProvider),
        };
        match found {
            Ok(info) => Ok(info),
            Err(miss) if self.options.allow_missing_providers => {
                tracing::debug!(node = %address, ?miss, "substituting opaque schema");
                Ok(ResourceInfo::opaque(type_name, data_source))
            }
            Err(_) => Err(Error::Schema {
                node: address.to_string(),
                provider: provider_of(type_name).to_string(),
                type_name: type_name.to_string(),
            }),
        }
    }

    // ------------------------------------------------------------------------
    // Pass 2: binding
    // ------------------------------------------------------------------------

    fn bind(&mut self, id: NodeId, decl: &Declaration) -> Result<()> {
        let address = decl.address();
        let counted = decl.properties.contains_key("count");
        let mut properties = IndexMap::new();
        let mut kind = self.nodes[id.0].kind.clone();

        for (key, raw) in &decl.properties {
            let ctx = Site {
                node: &address,
                property: key,
                counted,
            };
            match (&mut kind, key.as_str()) {
                (NodeKind::Resource(r), "count") => r.count = self.bind_raw(raw, &ctx)?,
                (NodeKind::Resource(r), "depends_on") => {
                    r.depends_on = Some(self.bind_depends_on(raw, &ctx)?)
                }
                (NodeKind::Resource(r), "provider") => {
                    r.provider = Some(self.bind_provider(raw, &ctx)?)
                }
                (NodeKind::Resource(_), "lifecycle" | "provisioner" | "connection") => {
                    tracing::debug!(node = %address, property = %key, "dropping meta-property");
                }
                (NodeKind::Variable(v), "default") => v.default = self.bind_raw(raw, &ctx)?,
                (NodeKind::Variable(_) | NodeKind::Output, "description" | "sensitive") => {}
                (NodeKind::Variable(_), _) => {}
                (NodeKind::Output, k) if k != "value" => {}
                (NodeKind::Provider(_), "alias" | "version") => {}
                (NodeKind::Module(_), "source") => {}
                _ => {
                    if let Some(node) = self.bind_raw(raw, &ctx)? {
                        properties.insert(key.clone(), node);
                    }
                }
            }
        }

        match &mut kind {
            NodeKind::Output | NodeKind::Local if !properties.contains_key("value") => {
                return Err(Error::config(
                    &self.tree.name,
                    format!("'{}' has no value", address),
                ));
            }
            _ => {}
        }

        let node = &mut self.nodes[id.0];
        node.kind = kind;
        node.properties = BoundMap {
            elements: properties,
        };
        Ok(())
    }

    fn bind_raw(&mut self, raw: &RawValue, site: &Site<'_>) -> Result<Option<BoundNode>> {
        let bound = expr::bind_value(raw).map_err(|message| site.expression(message))?;
        match bound {
            Some(mut node) => {
                self.resolve(&mut node, site)?;
                Ok(Some(node))
            }
            None => Ok(None),
        }
    }

    fn bind_depends_on(&mut self, raw: &RawValue, site: &Site<'_>) -> Result<BoundNode> {
        let RawValue::List(items) = raw else {
            return Err(site.expression("depends_on must be a list of addresses".to_string()));
        };
        let mut elements = Vec::with_capacity(items.len());
        for item in items {
            let address = item
                .as_str()
                .ok_or_else(|| site.expression(format!("bad depends_on entry {}", item)))?;
            let mut node = expr::parse_template(&format!("${{{}}}", address))
                .map_err(|message| site.expression(message))?;
            if !matches!(&node, BoundNode::VariableAccess(v) if matches!(v.var, Variable::Resource { .. }))
            {
                return Err(site.expression(format!("'{}' is not a resource address", address)));
            }
            self.resolve(&mut node, site)?;
            elements.push(node);
        }
        Ok(BoundNode::list(elements))
    }

    fn bind_provider(&mut self, raw: &RawValue, site: &Site<'_>) -> Result<BoundNode> {
        let text = raw
            .as_str()
            .ok_or_else(|| site.expression("provider must be a string".to_string()))?;
        let (name, alias) = match text.split_once('.') {
            Some((name, alias)) => (name, Some(alias.to_string())),
            None => (text, None),
        };
        let mut node = BoundNode::var(Variable::Provider {
            name: name.to_string(),
            alias,
        });
        self.resolve(&mut node, site)?;
        Ok(node)
    }

    /// Fill in targets and types for every variable access in `node`.
    fn resolve(&mut self, node: &mut BoundNode, site: &Site<'_>) -> Result<()> {
        match node {
            BoundNode::VariableAccess(access) => {
                let (target, ty) = self.resolve_variable(&access.var, site)?;
                access.target = target;
                if ty != Type::Unknown {
                    access.ty = ty;
                }
                Ok(())
            }
            BoundNode::Literal(_) => Ok(()),
            BoundNode::Output(o) => o.exprs.iter_mut().try_for_each(|n| self.resolve(n, site)),
            BoundNode::List(l) => l.elements.iter_mut().try_for_each(|n| self.resolve(n, site)),
            BoundNode::Map(m) => m
                .elements
                .values_mut()
                .try_for_each(|n| self.resolve(n, site)),
            BoundNode::Conditional(c) => {
                self.resolve(&mut c.condition, site)?;
                self.resolve(&mut c.true_expr, site)?;
                self.resolve(&mut c.false_expr, site)
            }
            BoundNode::Call(c) => c.args.iter_mut().try_for_each(|n| self.resolve(n, site)),
            BoundNode::Index(i) => {
                self.resolve(&mut i.target, site)?;
                self.resolve(&mut i.key, site)
            }
            BoundNode::Operator(o) => o.operands.iter_mut().try_for_each(|n| self.resolve(n, site)),
        }
    }

    fn resolve_variable(&mut self, var: &Variable, site: &Site<'_>) -> Result<(Option<NodeId>, Type)> {
        let address = match var {
            Variable::Path(_) | Variable::Workspace => return Ok((None, Type::String)),
            Variable::CountIndex if site.counted => return Ok((None, Type::Number)),
            Variable::CountIndex => {
                return Err(site.expression(
                    "count.index is only valid in resources with count".to_string(),
                ))
            }
            other => other.node_address().unwrap_or_default(),
        };

        if let Some(id) = self.index.get(&address).copied() {
            let ty = self.type_of(id, var);
            if let Variable::Module { name, output } = var {
                self.check_module_output(name, output, site)?;
            }
            return Ok((Some(id), ty));
        }

        match var {
            Variable::User { name } if self.options.allow_missing_variables => {
                tracing::debug!(variable = %name, node = %site.node, "adding placeholder variable");
                let id = self.push(
                    name.clone(),
                    NodeKind::Variable(VariableNode {
                        ty: Type::Unknown,
                        default: None,
                        placeholder: true,
                    }),
                    None,
                );
                Ok((Some(id), Type::Unknown))
            }
            // unaliased providers may be implicit
            Variable::Provider { alias: None, .. } => Ok((None, Type::Unknown)),
            _ => Err(Error::Reference {
                node: site.node.to_string(),
                property: site.property.to_string(),
                reference: var.to_string(),
            }),
        }
    }

    fn type_of(&self, id: NodeId, var: &Variable) -> Type {
        match (&self.nodes[id.0].kind, var) {
            (NodeKind::Variable(v), _) => v.ty,
            (NodeKind::Resource(r), Variable::Resource { elements, .. }) => {
                match elements.as_slice() {
                    [first, ..] if first == "*" => Type::List,
                    [.., last] => r.info.field_type(last),
                    [] => Type::Unknown,
                }
            }
            _ => Type::Unknown,
        }
    }

    fn check_module_output(&self, module: &str, output: &str, site: &Site<'_>) -> Result<()> {
        let Some(child) = self.children.iter().find(|g| g.name == module) else {
            return Ok(());
        };
        if child.lookup(&format!("output.{}", output)).is_some() {
            return Ok(());
        }
        Err(Error::Reference {
            node: site.node.to_string(),
            property: site.property.to_string(),
            reference: format!("module.{}.{}", module, output),
        })
    }
}

/// Where a property is being bound, for error context.
struct Site<'a> {
    node: &'a str,
    property: &'a str,
    counted: bool,
}

impl Site<'_> {
    fn expression(&self, message: String) -> Error {
        Error::Expression {
            node: self.node.to_string(),
            property: self.property.to_string(),
            message,
        }
    }
}

/// A variable's type, known before any reference to it is bound: the
/// declared `type`, else the shape of the raw default.
fn variable_type(address: &str, decl: &Declaration) -> Result<Type> {
    if let Some(raw) = decl.properties.get("type") {
        let site = Site {
            node: address,
            property: "type",
            counted: false,
        };
        return declared_type(raw, &site);
    }
    let ty = match decl.properties.get("default") {
        Some(RawValue::Bool(_)) => Type::Bool,
        Some(RawValue::Number(_)) => Type::Number,
        Some(RawValue::String(s)) => expr::parse_template(s).map_or(Type::Unknown, |n| n.ty()),
        Some(RawValue::List(_)) => Type::List,
        Some(RawValue::Map(_)) => Type::Map,
        Some(RawValue::Null) | None => Type::Unknown,
    };
    Ok(ty)
}

fn declared_type(raw: &RawValue, site: &Site<'_>) -> Result<Type> {
    match raw.as_str() {
        Some("string") => Ok(Type::String),
        Some("number") => Ok(Type::Number),
        Some("bool") => Ok(Type::Bool),
        Some("list") => Ok(Type::List),
        Some("map") => Ok(Type::Map),
        _ => Err(site.expression(format!("unknown variable type {}", raw))),
    }
}

// ============================================================================
// Pass 4: cycle detection
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

/// Depth-first search; a back-edge to a node still on the stack is a cycle.
///
/// The walk keeps its own frame stack, so chain length is not bounded by
/// the thread stack.
pub fn check_cycles(graph: &Graph) -> Result<()> {
    let mut marks = vec![Mark::Unvisited; graph.nodes.len()];
    for node in &graph.nodes {
        if marks[node.id.0] == Mark::Unvisited {
            visit(graph, node.id, &mut marks)?;
        }
    }
    Ok(())
}

fn visit(graph: &Graph, root: NodeId, marks: &mut [Mark]) -> Result<()> {
    // (node, index of the next dependency to look at)
    let mut frames: Vec<(NodeId, usize)> = vec![(root, 0)];
    marks[root.0] = Mark::OnStack;

    while let Some(frame) = frames.last_mut() {
        let (id, next) = *frame;
        let Some(&dep) = graph.node(id).dependencies().get(next) else {
            marks[id.0] = Mark::Done;
            frames.pop();
            continue;
        };
        frame.1 += 1;
        match marks[dep.0] {
            Mark::Unvisited => {
                marks[dep.0] = Mark::OnStack;
                frames.push((dep, 0));
            }
            Mark::OnStack => {
                let start = frames.iter().position(|(n, _)| *n == dep).unwrap_or(0);
                return Err(Error::Cycle {
                    members: frames[start..]
                        .iter()
                        .map(|(n, _)| graph.node(*n).address())
                        .collect(),
                });
            }
            Mark::Done => {}
        }
    }
    Ok(())
}
