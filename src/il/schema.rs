//! TP-013: Provider schema information.
//!
//! Maps resource kinds to target tokens and property names. The builder
//! queries a [`ProviderInfoSource`]; [`StaticProviderInfo`] is the stock
//! implementation, loaded from YAML or JSON documents keyed by provider.

use super::bound::Type;
use convert_case::{Case, Casing};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Declared type of a schema field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    Unknown,
    String,
    Number,
    Bool,
    List,
    Map,
}

impl From<FieldType> for Type {
    fn from(t: FieldType) -> Self {
        match t {
            FieldType::Unknown => Type::Unknown,
            FieldType::String => Type::String,
            FieldType::Number => Type::Number,
            FieldType::Bool => Type::Bool,
            FieldType::List => Type::List,
            FieldType::Map => Type::Map,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldInfo {
    /// Target-language property name; defaults to camelCase
    #[serde(default)]
    pub name: Option<String>,

    #[serde(rename = "type", default)]
    pub field_type: FieldType,
}

/// Schema for one resource or data-source kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceInfo {
    /// Target token, e.g. `aws:ec2/instance:Instance`
    pub token: String,

    #[serde(default)]
    pub fields: IndexMap<String, FieldInfo>,

    /// Substituted because the real schema was missing
    #[serde(skip)]
    pub opaque: bool,
}

impl ResourceInfo {
    /// Placeholder schema with a token derived from the type name.
    pub fn opaque(type_name: &str, data_source: bool) -> Self {
        let provider = provider_of(type_name);
        let rest = type_name
            .strip_prefix(provider)
            .and_then(|r| r.strip_prefix('_'))
            .unwrap_or(type_name);
        let member = rest.from_case(Case::Snake).to_case(Case::Pascal);
        let token = if data_source {
            format!("{}:index:get{}", provider, member)
        } else {
            format!("{}:index:{}", provider, member)
        };
        Self {
            token,
            fields: IndexMap::new(),
            opaque: true,
        }
    }

    /// Target name for a property or attribute.
    pub fn property_name(&self, tf_name: &str) -> String {
        match self.fields.get(tf_name).and_then(|f| f.name.clone()) {
            Some(name) => name,
            None => camel_case(tf_name),
        }
    }

    pub fn field_type(&self, tf_name: &str) -> Type {
        self.fields
            .get(tf_name)
            .map(|f| f.field_type.into())
            .unwrap_or(Type::Unknown)
    }
}

/// Default snake_case to camelCase property mapping.
pub fn camel_case(tf_name: &str) -> String {
    tf_name.from_case(Case::Snake).to_case(Case::Camel)
}

/// Provider that owns a resource type: the prefix before the first `_`.
pub fn provider_of(type_name: &str) -> &str {
    type_name.split('_').next().unwrap_or(type_name)
}

/// A parsed `package:module/sub:Member` token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub package: String,
    /// `None` for the package's index module
    pub module: Option<String>,
    pub member: String,
}

impl Token {
    pub fn parse(token: &str) -> Option<Self> {
        let mut parts = token.split(':');
        let package = parts.next()?.to_string();
        let module_part = parts.next()?;
        let member = parts.next()?.to_string();
        if parts.next().is_some() || package.is_empty() || member.is_empty() {
            return None;
        }
        let module = module_part.split('/').next().unwrap_or(module_part);
        let module = match module {
            "" | "index" => None,
            m => Some(m.to_string()),
        };
        Some(Self {
            package,
            module,
            member,
        })
    }
}

/// Schema information for one provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderInfo {
    #[serde(default)]
    pub resources: IndexMap<String, ResourceInfo>,

    #[serde(default)]
    pub data_sources: IndexMap<String, ResourceInfo>,
}

/// Why a schema lookup failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaMiss {
    UnknownProvider,
    UnknownResource,
}

/// Synchronous schema lookups used during graph construction.
pub trait ProviderInfoSource: Send + Sync {
    fn resource_info(&self, type_name: &str, data_source: bool) -> Result<ResourceInfo, SchemaMiss>;
}

/// Provider schemas held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticProviderInfo {
    pub providers: IndexMap<String, ProviderInfo>,
}

impl StaticProviderInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, name: &str, info: ProviderInfo) -> Self {
        self.providers.insert(name.to_string(), info);
        self
    }

    /// Parse a document mapping provider names to their schemas.
    pub fn from_yaml(yaml: &str) -> Result<Self, String> {
        let providers: IndexMap<String, ProviderInfo> = serde_yaml_ng::from_str(yaml)
            .map_err(|e| format!("provider info parse error: {}", e))?;
        Ok(Self { providers })
    }

    pub fn from_json(json: &str) -> Result<Self, String> {
        let providers: IndexMap<String, ProviderInfo> = serde_json::from_str(json)
            .map_err(|e| format!("provider info parse error: {}", e))?;
        Ok(Self { providers })
    }

    /// Load `<provider>.yaml` / `<provider>.json` files from a directory.
    pub fn load_dir(dir: &Path) -> Result<Self, String> {
        let mut source = Self::new();
        let pattern = dir.join("*");
        let entries = glob::glob(&pattern.to_string_lossy())
            .map_err(|e| format!("bad provider dir {}: {}", dir.display(), e))?;
        let mut files: Vec<_> = entries.filter_map(|e| e.ok()).collect();
        files.sort();

        for file in files {
            let ext = file.extension().and_then(|e| e.to_str()).unwrap_or("");
            if !matches!(ext, "yaml" | "yml" | "json") {
                continue;
            }
            let Some(name) = file.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let content = std::fs::read_to_string(&file)
                .map_err(|e| format!("failed to read {}: {}", file.display(), e))?;
            let info: ProviderInfo = if ext == "json" {
                serde_json::from_str(&content)
                    .map_err(|e| format!("{}: {}", file.display(), e))?
            } else {
                serde_yaml_ng::from_str(&content)
                    .map_err(|e| format!("{}: {}", file.display(), e))?
            };
            source.providers.insert(name.to_string(), info);
        }
        Ok(source)
    }
}

impl ProviderInfoSource for StaticProviderInfo {
    fn resource_info(&self, type_name: &str, data_source: bool) -> Result<ResourceInfo, SchemaMiss> {
        let provider = self
            .providers
            .get(provider_of(type_name))
            .ok_or(SchemaMiss::UnknownProvider)?;
        let table = if data_source {
            &provider.data_sources
        } else {
            &provider.resources
        };
        table
            .get(type_name)
            .cloned()
            .ok_or(SchemaMiss::UnknownResource)
    }
}
