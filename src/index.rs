//! Canonical API index - the language-neutral schema every engine emits
//!
//! Field names are declared explicitly (camelCase on the wire) so the JSON
//! shape is stable no matter how the Rust structs evolve.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::diagnostics::Diagnostic;

/// Kind tag of an extracted type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    Class,
    Interface,
    Struct,
    Enum,
    Record,
    /// Function-typed declaration (Go `type F func(..)`, delegates)
    Delegate,
    Annotation,
    /// Named type over another type (Go `type Status string`)
    Alias,
}

impl TypeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeKind::Class => "class",
            TypeKind::Interface => "interface",
            TypeKind::Struct => "struct",
            TypeKind::Enum => "enum",
            TypeKind::Record => "record",
            TypeKind::Delegate => "delegate",
            TypeKind::Annotation => "annotation",
            TypeKind::Alias => "alias",
        }
    }

    /// Kinds that can act as a root of the reachability traversal.
    pub fn is_root_kind(&self) -> bool {
        matches!(
            self,
            TypeKind::Class | TypeKind::Interface | TypeKind::Struct | TypeKind::Record
        )
    }
}

impl FromStr for TypeKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "class" => Ok(TypeKind::Class),
            "interface" | "protocol" | "trait" => Ok(TypeKind::Interface),
            "struct" => Ok(TypeKind::Struct),
            "enum" => Ok(TypeKind::Enum),
            "record" => Ok(TypeKind::Record),
            "delegate" | "func" => Ok(TypeKind::Delegate),
            "annotation" => Ok(TypeKind::Annotation),
            "alias" | "type" => Ok(TypeKind::Alias),
            _ => Err(Error::Parse(format!("Unknown type kind: {}", s))),
        }
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind tag of a type member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberKind {
    Constructor,
    Method,
    Property,
    Field,
    Event,
    Indexer,
    Operator,
}

impl MemberKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberKind::Constructor => "constructor",
            MemberKind::Method => "method",
            MemberKind::Property => "property",
            MemberKind::Field => "field",
            MemberKind::Event => "event",
            MemberKind::Indexer => "indexer",
            MemberKind::Operator => "operator",
        }
    }

    /// Whether the member is an operation (something a caller invokes).
    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            MemberKind::Constructor | MemberKind::Method | MemberKind::Indexer | MemberKind::Operator
        )
    }

    /// Whether the member only holds data.
    pub fn is_data(&self) -> bool {
        matches!(self, MemberKind::Property | MemberKind::Field | MemberKind::Event)
    }
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// A single parameter of a callable member.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParamInfo {
    #[serde(rename = "name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub type_name: String,
    #[serde(rename = "variadic", default, skip_serializing_if = "is_false")]
    pub variadic: bool,
    #[serde(rename = "optional", default, skip_serializing_if = "is_false")]
    pub optional: bool,
}

impl ParamInfo {
    pub fn new(name: Option<String>, type_name: impl Into<String>) -> Self {
        Self {
            name,
            type_name: type_name.into(),
            variadic: false,
            optional: false,
        }
    }
}

/// A single result of a callable member (Go allows several).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResultInfo {
    #[serde(rename = "name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub type_name: String,
}

/// A callable or data member of a type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    #[serde(rename = "name")]
    pub name: String,
    #[serde(rename = "id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "kind")]
    pub kind: MemberKind,
    /// Compressed signature (parameter list only, language syntax)
    #[serde(rename = "sig", default)]
    pub sig: String,
    #[serde(rename = "ret", default, skip_serializing_if = "Option::is_none")]
    pub ret: Option<String>,
    #[serde(rename = "params", default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<ParamInfo>,
    #[serde(rename = "results", default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<ResultInfo>,
    #[serde(rename = "doc", default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(rename = "static", default, skip_serializing_if = "is_false")]
    pub is_static: bool,
    #[serde(rename = "async", default, skip_serializing_if = "is_false")]
    pub is_async: bool,
    #[serde(rename = "deprecated", default, skip_serializing_if = "is_false")]
    pub deprecated: bool,
    #[serde(rename = "deprecatedMessage", default, skip_serializing_if = "Option::is_none")]
    pub deprecated_message: Option<String>,
    #[serde(rename = "crossLanguageId", default, skip_serializing_if = "Option::is_none")]
    pub cross_language_id: Option<String>,
}

impl MemberInfo {
    /// Create a member with minimal required fields
    pub fn new(name: impl Into<String>, kind: MemberKind, sig: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            kind,
            sig: sig.into(),
            ret: None,
            params: Vec::new(),
            results: Vec::new(),
            doc: None,
            is_static: false,
            is_async: false,
            deprecated: false,
            deprecated_message: None,
            cross_language_id: None,
        }
    }

    pub fn with_ret(mut self, ret: impl Into<String>) -> Self {
        self.ret = Some(ret.into());
        self
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn with_params(mut self, params: Vec<ParamInfo>) -> Self {
        self.params = params;
        self
    }

    /// Text of every type mentioned by this member (params, results, return).
    pub fn type_texts(&self) -> impl Iterator<Item = &str> {
        self.params
            .iter()
            .map(|p| p.type_name.as_str())
            .chain(self.results.iter().map(|r| r.type_name.as_str()))
            .chain(self.ret.as_deref())
    }
}

/// A class / interface / struct / enum / record / delegate equivalent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeInfo {
    #[serde(rename = "name")]
    pub name: String,
    #[serde(rename = "id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "kind")]
    pub kind: TypeKind,
    #[serde(rename = "base", default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(rename = "interfaces", default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<String>,
    #[serde(rename = "aliasOf", default, skip_serializing_if = "Option::is_none")]
    pub alias_of: Option<String>,
    #[serde(rename = "doc", default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(rename = "entryPoint", default, skip_serializing_if = "is_false")]
    pub entry_point: bool,
    #[serde(rename = "deprecated", default, skip_serializing_if = "is_false")]
    pub deprecated: bool,
    #[serde(rename = "deprecatedMessage", default, skip_serializing_if = "Option::is_none")]
    pub deprecated_message: Option<String>,
    /// Set by the error-type marking pass from the type hierarchy
    #[serde(rename = "error", default, skip_serializing_if = "is_false")]
    pub is_error: bool,
    #[serde(rename = "reExportedFrom", default, skip_serializing_if = "Option::is_none")]
    pub re_exported_from: Option<String>,
    #[serde(rename = "crossLanguageId", default, skip_serializing_if = "Option::is_none")]
    pub cross_language_id: Option<String>,
    #[serde(rename = "members", default)]
    pub members: Vec<MemberInfo>,
    #[serde(rename = "values", default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

impl TypeInfo {
    /// Create a type with minimal required fields
    pub fn new(name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            id: None,
            kind,
            base: None,
            interfaces: Vec::new(),
            alias_of: None,
            doc: None,
            entry_point: false,
            deprecated: false,
            deprecated_message: None,
            is_error: false,
            re_exported_from: None,
            cross_language_id: None,
            members: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn with_member(mut self, member: MemberInfo) -> Self {
        self.members.push(member);
        self
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn as_entry_point(mut self) -> Self {
        self.entry_point = true;
        self
    }

    pub fn callables(&self) -> impl Iterator<Item = &MemberInfo> {
        self.members.iter().filter(|m| m.kind.is_callable())
    }

    pub fn has_callables(&self) -> bool {
        self.callables().next().is_some()
    }

    /// Entry point with at least one operation.
    pub fn is_client(&self) -> bool {
        self.entry_point && self.has_callables()
    }

    /// Data-only type: no operations, at least one data member.
    pub fn is_model(&self) -> bool {
        !self.has_callables() && self.members.iter().any(|m| m.kind.is_data())
    }
}

/// A namespace / module / package group.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NamespaceInfo {
    #[serde(rename = "name")]
    pub name: String,
    #[serde(rename = "types", default)]
    pub types: Vec<TypeInfo>,
    /// Exported free functions of the namespace
    #[serde(rename = "functions", default, skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<MemberInfo>,
}

impl NamespaceInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, ty: TypeInfo) -> Self {
        self.types.push(ty);
        self
    }
}

/// Summary of an external package the public surface refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyInfo {
    #[serde(rename = "package")]
    pub package: String,
    #[serde(rename = "isStdlib", default, skip_serializing_if = "is_false")]
    pub is_stdlib: bool,
    #[serde(rename = "types", default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
}

/// Root of the canonical schema.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApiIndex {
    #[serde(rename = "package")]
    pub package: String,
    #[serde(rename = "version", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(rename = "crossLanguagePackageId", default, skip_serializing_if = "Option::is_none")]
    pub cross_language_package_id: Option<String>,
    #[serde(rename = "namespaces", default)]
    pub namespaces: Vec<NamespaceInfo>,
    #[serde(rename = "dependencies", default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<DependencyInfo>,
    #[serde(rename = "diagnostics", default)]
    pub diagnostics: Vec<Diagnostic>,
}

impl ApiIndex {
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            ..Default::default()
        }
    }

    pub fn with_namespace(mut self, namespace: NamespaceInfo) -> Self {
        self.namespaces.push(namespace);
        self
    }

    /// Iterate every type together with its namespace name
    pub fn types(&self) -> impl Iterator<Item = (&str, &TypeInfo)> {
        self.namespaces
            .iter()
            .flat_map(|ns| ns.types.iter().map(move |t| (ns.name.as_str(), t)))
    }

    pub fn type_count(&self) -> usize {
        self.namespaces.iter().map(|ns| ns.types.len()).sum()
    }

    pub fn find_type(&self, name: &str) -> Option<&TypeInfo> {
        self.types().map(|(_, t)| t).find(|t| t.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces
            .iter()
            .all(|ns| ns.types.is_empty() && ns.functions.is_empty())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> TypeInfo {
        TypeInfo::new("Client", TypeKind::Class)
            .as_entry_point()
            .with_member(MemberInfo::new("get", MemberKind::Method, "id: str"))
    }

    #[test]
    fn test_type_kind_aliases() {
        assert_eq!(TypeKind::from_str("protocol").unwrap(), TypeKind::Interface);
        assert_eq!(TypeKind::from_str("func").unwrap(), TypeKind::Delegate);
        assert!(TypeKind::from_str("widget").is_err());
    }

    #[test]
    fn test_derived_properties() {
        let client = client();
        assert!(client.is_client());
        assert!(!client.is_model());

        let model = TypeInfo::new("Options", TypeKind::Class)
            .with_member(MemberInfo::new("timeout", MemberKind::Field, "int"));
        assert!(model.is_model());
        assert!(!model.is_client());

        let not_entry = TypeInfo::new("Helper", TypeKind::Class)
            .with_member(MemberInfo::new("run", MemberKind::Method, ""));
        assert!(!not_entry.is_client());
    }

    #[test]
    fn test_json_uses_camel_case_and_skips_defaults() {
        let index = ApiIndex::new("sdk").with_namespace(NamespaceInfo::new("sdk").with_type(client()));
        let json = serde_json::to_value(&index).unwrap();

        let ty = &json["namespaces"][0]["types"][0];
        assert_eq!(ty["entryPoint"], true);
        assert!(ty.get("deprecated").is_none());
        assert!(ty.get("interfaces").is_none());
        assert_eq!(ty["members"][0]["kind"], "method");
        assert!(json.get("crossLanguagePackageId").is_none());
        assert!(json["diagnostics"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_deserialize_minimal_analyzer_output() {
        let json = r#"{
            "package": "widgets",
            "namespaces": [
                {"name": "widgets", "types": [
                    {"name": "WidgetClient", "kind": "class", "entryPoint": true,
                     "members": [{"name": "list", "kind": "method", "sig": ""}]}
                ]}
            ]
        }"#;
        let index = ApiIndex::from_json(json).unwrap();
        assert_eq!(index.type_count(), 1);
        assert!(index.find_type("WidgetClient").unwrap().is_client());
        assert!(index.diagnostics.is_empty());
    }
}
