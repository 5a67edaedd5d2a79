//! TP-001: Declaration tree types.
//!
//! A module tree is what the configuration front end hands the IL builder:
//! per module, an ordered set of declarations, each with a kind, a name, a
//! property map of raw (unbound) values, and optional leading comment text.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Raw values
// ============================================================================

/// An unbound property value as written in the configuration.
///
/// Strings may carry `${...}` interpolations; they are parsed by the IL
/// builder, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<RawValue>),
    Map(IndexMap<String, RawValue>),
}

impl RawValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, RawValue>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => write!(f, "{:?}", s),
            Self::List(items) => write!(f, "[{} items]", items.len()),
            Self::Map(m) => write!(f, "{{{} keys}}", m.len()),
        }
    }
}

// ============================================================================
// Declarations
// ============================================================================

/// Declaration kind, derived from the declaration address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclarationKind {
    Resource,
    DataSource,
    Variable,
    Local,
    Output,
    Provider,
    Module,
}

impl fmt::Display for DeclarationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resource => write!(f, "resource"),
            Self::DataSource => write!(f, "data"),
            Self::Variable => write!(f, "variable"),
            Self::Local => write!(f, "local"),
            Self::Output => write!(f, "output"),
            Self::Provider => write!(f, "provider"),
            Self::Module => write!(f, "module"),
        }
    }
}

/// One declaration in a module.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub kind: DeclarationKind,

    /// Resource or data-source type (`aws_instance`); `None` for other kinds
    pub type_name: Option<String>,

    /// Declared name (`web` in `aws_instance.web`)
    pub name: String,

    /// Property name to raw expression, in source order
    pub properties: IndexMap<String, RawValue>,

    /// Leading comment text, one entry per line, without comment markers
    pub comment: Option<String>,
}

impl Declaration {
    /// Build a declaration from its address and raw value.
    ///
    /// Locals take their value directly; every other kind expects a mapping.
    pub fn from_address(address: &str, value: RawValue) -> Result<Self, String> {
        let parts: Vec<&str> = address.split('.').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(format!("invalid declaration address '{}'", address));
        }

        let (kind, type_name, name) = match parts.as_slice() {
            ["var", name] => (DeclarationKind::Variable, None, *name),
            ["local", name] => (DeclarationKind::Local, None, *name),
            ["output", name] => (DeclarationKind::Output, None, *name),
            ["module", name] => (DeclarationKind::Module, None, *name),
            ["provider", name] => (DeclarationKind::Provider, None, *name),
            ["provider", name, _alias] => (DeclarationKind::Provider, None, *name),
            ["data", ty, name] => (DeclarationKind::DataSource, Some(*ty), *name),
            [ty, name] => (DeclarationKind::Resource, Some(*ty), *name),
            _ => return Err(format!("invalid declaration address '{}'", address)),
        };

        let mut properties = match (kind, value) {
            (DeclarationKind::Local, v) => IndexMap::from([("value".to_string(), v)]),
            (_, RawValue::Map(m)) => m,
            (_, RawValue::Null) => IndexMap::new(),
            (_, other) => {
                return Err(format!(
                    "declaration '{}' must be a mapping, got {}",
                    address, other
                ))
            }
        };

        if let ["provider", _, alias] = parts.as_slice() {
            properties.insert("alias".to_string(), RawValue::String(alias.to_string()));
        }

        Ok(Self {
            kind,
            type_name: type_name.map(str::to_string),
            name: name.to_string(),
            properties,
            comment: None,
        })
    }

    /// Provider alias, when this is an aliased provider declaration.
    pub fn alias(&self) -> Option<&str> {
        if self.kind != DeclarationKind::Provider {
            return None;
        }
        self.properties.get("alias").and_then(RawValue::as_str)
    }

    /// Canonical address, unique within a module.
    pub fn address(&self) -> String {
        match self.kind {
            DeclarationKind::Resource => {
                format!("{}.{}", self.type_name.as_deref().unwrap_or(""), self.name)
            }
            DeclarationKind::DataSource => format!(
                "data.{}.{}",
                self.type_name.as_deref().unwrap_or(""),
                self.name
            ),
            DeclarationKind::Variable => format!("var.{}", self.name),
            DeclarationKind::Local => format!("local.{}", self.name),
            DeclarationKind::Output => format!("output.{}", self.name),
            DeclarationKind::Module => format!("module.{}", self.name),
            DeclarationKind::Provider => match self.alias() {
                Some(alias) => format!("provider.{}.{}", self.name, alias),
                None => format!("provider.{}", self.name),
            },
        }
    }
}

// ============================================================================
// Module tree
// ============================================================================

/// A configuration module and the child modules it instantiates.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleTree {
    /// Module name (`main` for the root, the module declaration name otherwise)
    pub name: String,

    /// Location relative to the project root, forward-slash separated
    pub path: String,

    pub is_root: bool,

    /// Declarations in source order
    pub declarations: Vec<Declaration>,

    /// Child modules, in the order their module declarations appear
    pub children: Vec<ModuleTree>,

    /// Whether leading comments were extracted for this module
    pub comments_available: bool,
}

impl ModuleTree {
    /// An empty root module.
    pub fn root(name: &str) -> Self {
        Self {
            name: name.to_string(),
            path: ".".to_string(),
            is_root: true,
            declarations: Vec::new(),
            children: Vec::new(),
            comments_available: false,
        }
    }

    /// An empty child module at `path`.
    pub fn child(name: &str, path: &str) -> Self {
        Self {
            is_root: false,
            path: path.to_string(),
            ..Self::root(name)
        }
    }

    /// Append a declaration parsed from an address (builder style, for tests and tools).
    pub fn declare(mut self, address: &str, value: RawValue) -> Result<Self, String> {
        self.declarations.push(Declaration::from_address(address, value)?);
        Ok(self)
    }

    pub fn find(&self, address: &str) -> Option<&Declaration> {
        self.declarations.iter().find(|d| d.address() == address)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tp001_raw_value_parse() {
        let yaml = r#"
ami: "${data.aws_ami.ubuntu.id}"
count: 2
enabled: true
cidrs: [10.0.0.0/16, 10.1.0.0/16]
tags:
  Name: web
nothing: ~
"#;
        let v: RawValue = serde_yaml_ng::from_str(yaml).unwrap();
        let m = v.as_map().unwrap();
        assert_eq!(m["ami"], RawValue::String("${data.aws_ami.ubuntu.id}".into()));
        assert_eq!(m["count"], RawValue::Number(2.0));
        assert_eq!(m["enabled"], RawValue::Bool(true));
        assert!(matches!(&m["cidrs"], RawValue::List(l) if l.len() == 2));
        assert!(matches!(&m["tags"], RawValue::Map(t) if t.contains_key("Name")));
        assert_eq!(m["nothing"], RawValue::Null);
        // key order survives
        let keys: Vec<_> = m.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["ami", "count", "enabled", "cidrs", "tags", "nothing"]);
    }

    #[test]
    fn test_tp001_address_resource() {
        let d = Declaration::from_address("aws_instance.web", RawValue::Null).unwrap();
        assert_eq!(d.kind, DeclarationKind::Resource);
        assert_eq!(d.type_name.as_deref(), Some("aws_instance"));
        assert_eq!(d.name, "web");
        assert_eq!(d.address(), "aws_instance.web");
    }

    #[test]
    fn test_tp001_address_data_source() {
        let d = Declaration::from_address("data.aws_ami.ubuntu", RawValue::Null).unwrap();
        assert_eq!(d.kind, DeclarationKind::DataSource);
        assert_eq!(d.address(), "data.aws_ami.ubuntu");
    }

    #[test]
    fn test_tp001_address_aliased_provider() {
        let d = Declaration::from_address("provider.aws.west", RawValue::Null).unwrap();
        assert_eq!(d.kind, DeclarationKind::Provider);
        assert_eq!(d.name, "aws");
        assert_eq!(d.alias(), Some("west"));
        assert_eq!(d.address(), "provider.aws.west");
    }

    #[test]
    fn test_tp001_local_takes_value_directly() {
        let d = Declaration::from_address("local.prefix", RawValue::String("app".into())).unwrap();
        assert_eq!(d.kind, DeclarationKind::Local);
        assert_eq!(d.properties["value"], RawValue::String("app".into()));
    }

    #[test]
    fn test_tp001_non_map_rejected() {
        let err = Declaration::from_address("output.ip", RawValue::Bool(true)).unwrap_err();
        assert!(err.contains("must be a mapping"));
    }

    #[test]
    fn test_tp001_bad_address() {
        assert!(Declaration::from_address("web", RawValue::Null).is_err());
        assert!(Declaration::from_address("a.b.c.d", RawValue::Null).is_err());
        assert!(Declaration::from_address("var.", RawValue::Null).is_err());
    }

    #[test]
    fn test_tp001_kind_display() {
        assert_eq!(DeclarationKind::DataSource.to_string(), "data");
        assert_eq!(DeclarationKind::Variable.to_string(), "variable");
    }

    #[test]
    fn test_tp001_tree_builder() {
        let tree = ModuleTree::root("main")
            .declare("var.region", RawValue::Null)
            .unwrap();
        assert!(tree.is_root);
        assert_eq!(tree.path, ".");
        assert!(tree.find("var.region").is_some());
        assert!(tree.find("var.zone").is_none());
    }
}
