//! Usage coverage - which client operations the sample programs exercise
//!
//! Samples are parsed with the language's tree-sitter grammar. Receivers are
//! resolved through bindings (assignments, typed declarations, parameters,
//! `as` targets) to client constructors, factory calls and client-returning
//! methods, or through static calls on the client type itself. No type
//! checking is attempted beyond that.

use crate::engine::classify::bare_name;
use crate::engine::syntax::{self, field_text, named_children, text};
use crate::engine::Language;
use crate::index::{ApiIndex, MemberKind, TypeInfo};
use crate::reachability::{identifier_tokens, ReferenceGraph, TypeKey};
use crate::skip::SkipFilter;
use crate::Result;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tree_sitter::Node;

/// An operation invoked by a sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoveredOperation {
    pub client: String,
    pub method: String,
    pub file: String,
    pub line: usize,
}

/// An operation no sample invokes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncoveredOperation {
    pub client: String,
    pub method: String,
    pub sig: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageReport {
    pub file_count: usize,
    pub covered: Vec<CoveredOperation>,
    pub uncovered: Vec<UncoveredOperation>,
    /// Structural idioms seen across the samples, sorted
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl UsageReport {
    /// Covered share of all client operations, 0.0 when there are none.
    pub fn coverage(&self) -> f64 {
        let total = self.covered.len() + self.uncovered.len();
        if total == 0 {
            return 0.0;
        }
        self.covered.len() as f64 / total as f64
    }
}

/// Client types with their operations and the calls that produce them.
struct Clients {
    /// client -> operation name -> first signature
    operations: BTreeMap<String, BTreeMap<String, String>>,
    /// factory function or method name -> client it returns
    factories: HashMap<String, String>,
    /// (client, operation) -> client the operation returns
    returns: HashMap<(String, String), String>,
    /// client -> related clients (parents and implementers)
    related: HashMap<String, BTreeSet<String>>,
}

impl Clients {
    fn from_index(index: &ApiIndex) -> Self {
        let reachable = ReferenceGraph::from_index(index).reachable();

        let mut operations: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        for (ns, ty) in index.types() {
            if !reachable.contains(&TypeKey::new(ns, &ty.name)) {
                continue;
            }
            let mut ops: BTreeMap<String, String> = BTreeMap::new();
            for member in ty.callables().filter(|m| m.kind != MemberKind::Constructor) {
                ops.entry(member.name.clone()).or_insert_with(|| member.sig.clone());
            }
            if !ops.is_empty() {
                operations.insert(ty.name.clone(), ops);
            }
        }

        let returned_client = |ret: Option<&str>| -> Option<String> {
            identifier_tokens(ret?)
                .find(|t| operations.contains_key(*t))
                .map(str::to_string)
        };

        let mut factories = HashMap::new();
        let mut returns = HashMap::new();
        for (_, ty) in index.types() {
            for member in ty.callables() {
                let client = match member.kind {
                    MemberKind::Constructor if operations.contains_key(&ty.name) => Some(ty.name.clone()),
                    _ => returned_client(member.ret.as_deref()),
                };
                if let Some(client) = client {
                    if operations.contains_key(&ty.name) && member.kind != MemberKind::Constructor {
                        returns.insert((ty.name.clone(), member.name.clone()), client.clone());
                    }
                    factories.entry(member.name.clone()).or_insert(client);
                }
            }
        }
        for ns in &index.namespaces {
            for function in &ns.functions {
                if let Some(client) = returned_client(function.ret.as_deref()) {
                    factories.entry(function.name.clone()).or_insert(client);
                }
            }
        }

        let mut related: HashMap<String, BTreeSet<String>> = HashMap::new();
        for (_, ty) in index.types() {
            for parent in parents(ty) {
                if operations.contains_key(parent) && operations.contains_key(&ty.name) {
                    related.entry(ty.name.clone()).or_default().insert(parent.to_string());
                    related.entry(parent.to_string()).or_default().insert(ty.name.clone());
                }
            }
        }

        Self {
            operations,
            factories,
            returns,
            related,
        }
    }

    fn has(&self, client: &str, method: &str) -> bool {
        self.operations.get(client).is_some_and(|ops| ops.contains_key(method))
    }

    fn named(&self, name: &str) -> Option<&str> {
        self.operations.get_key_value(name).map(|(client, _)| client.as_str())
    }

    /// Client type produced by a bare callee (`Client`, `NewClient`, `connect`).
    fn produced_by(&self, callee: &str) -> Option<&str> {
        self.named(callee).or_else(|| self.factories.get(callee).map(String::as_str))
    }

    fn returned_by(&self, client: &str, method: &str) -> Option<&str> {
        self.returns
            .get(&(client.to_string(), method.to_string()))
            .map(String::as_str)
    }
}

fn parents(ty: &TypeInfo) -> impl Iterator<Item = &str> {
    ty.base.iter().chain(&ty.interfaces).map(|p| bare_name(p))
}

/// `receiver.method(...)` or `function(...)`
struct Call<'t, 's> {
    receiver: Option<Node<'t>>,
    method: &'s str,
}

/// A name bound to a declared type or to the value of an expression.
struct Binding<'t, 's> {
    name: &'s str,
    declared: Option<&'s str>,
    value: Option<Node<'t>>,
}

/// How one language spells the constructs usage matching looks at.
trait SampleSyntax: Sync {
    fn grammar(&self) -> tree_sitter::Language;

    fn is_test_file(&self, _file_name: &str) -> bool {
        false
    }

    fn call<'t, 's>(&self, node: Node<'t>, src: &'s str) -> Option<Call<'t, 's>>;

    fn bindings<'t, 's>(&self, node: Node<'t>, src: &'s str) -> Vec<Binding<'t, 's>>;

    /// Type named by a construction expression (`new T()`, `&T{}`).
    fn constructed<'s>(&self, _node: Node<'_>, _src: &'s str) -> Option<&'s str> {
        None
    }

    /// Attribute name of a member access (`self.client` -> `client`).
    fn member<'s>(&self, node: Node<'_>, src: &'s str) -> Option<&'s str>;

    /// Expression wrapped by `await`, parentheses or `&`.
    fn inner<'t>(&self, node: Node<'t>) -> Option<Node<'t>>;

    fn patterns(&self, node: Node<'_>, src: &str, found: &mut BTreeSet<&'static str>);
}

fn has_token(node: Node<'_>, kind: &str) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|c| c.kind() == kind);
    found
}

struct PythonSamples;

impl SampleSyntax for PythonSamples {
    fn grammar(&self) -> tree_sitter::Language {
        tree_sitter_python::LANGUAGE.into()
    }

    fn is_test_file(&self, file_name: &str) -> bool {
        file_name.starts_with("test_") || file_name.ends_with("_test.py")
    }

    fn call<'t, 's>(&self, node: Node<'t>, src: &'s str) -> Option<Call<'t, 's>> {
        if node.kind() != "call" {
            return None;
        }
        let function = node.child_by_field_name("function")?;
        match function.kind() {
            "attribute" => Some(Call {
                receiver: function.child_by_field_name("object"),
                method: field_text(function, "attribute", src)?,
            }),
            "identifier" => Some(Call {
                receiver: None,
                method: text(function, src),
            }),
            _ => None,
        }
    }

    fn bindings<'t, 's>(&self, node: Node<'t>, src: &'s str) -> Vec<Binding<'t, 's>> {
        let binding = match node.kind() {
            "assignment" => node.child_by_field_name("left").and_then(|left| {
                let name = match left.kind() {
                    "identifier" => text(left, src),
                    "attribute" => field_text(left, "attribute", src)?,
                    _ => return None,
                };
                Some(Binding {
                    name,
                    declared: field_text(node, "type", src),
                    value: node.child_by_field_name("right"),
                })
            }),
            "typed_parameter" => named_children(node)
                .into_iter()
                .find(|c| c.kind() == "identifier")
                .map(|name| Binding {
                    name: text(name, src),
                    declared: field_text(node, "type", src),
                    value: None,
                }),
            "typed_default_parameter" | "named_expression" => field_text(node, "name", src).map(|name| Binding {
                name,
                declared: field_text(node, "type", src),
                value: node.child_by_field_name("value"),
            }),
            "as_pattern" => field_text(node, "alias", src).map(|alias| Binding {
                name: alias.trim(),
                declared: None,
                value: node.named_child(0),
            }),
            _ => None,
        };
        binding.into_iter().collect()
    }

    fn member<'s>(&self, node: Node<'_>, src: &'s str) -> Option<&'s str> {
        (node.kind() == "attribute")
            .then(|| field_text(node, "attribute", src))
            .flatten()
    }

    fn inner<'t>(&self, node: Node<'t>) -> Option<Node<'t>> {
        match node.kind() {
            "await" | "parenthesized_expression" => node.named_child(0),
            _ => None,
        }
    }

    fn patterns(&self, node: Node<'_>, _src: &str, found: &mut BTreeSet<&'static str>) {
        match node.kind() {
            "await" => {
                found.insert("async");
            }
            "try_statement" => {
                found.insert("error-handling");
            }
            "for_statement" if has_token(node, "async") => {
                found.insert("async");
                found.insert("streaming");
            }
            "with_statement" if has_token(node, "async") => {
                found.insert("async");
            }
            _ => {}
        }
    }
}

struct GoSamples;

impl SampleSyntax for GoSamples {
    fn grammar(&self) -> tree_sitter::Language {
        tree_sitter_go::LANGUAGE.into()
    }

    fn is_test_file(&self, file_name: &str) -> bool {
        file_name.ends_with("_test.go")
    }

    fn call<'t, 's>(&self, node: Node<'t>, src: &'s str) -> Option<Call<'t, 's>> {
        if node.kind() != "call_expression" {
            return None;
        }
        let function = node.child_by_field_name("function")?;
        match function.kind() {
            "selector_expression" => Some(Call {
                receiver: function.child_by_field_name("operand"),
                method: field_text(function, "field", src)?,
            }),
            "identifier" => Some(Call {
                receiver: None,
                method: text(function, src),
            }),
            _ => None,
        }
    }

    fn bindings<'t, 's>(&self, node: Node<'t>, src: &'s str) -> Vec<Binding<'t, 's>> {
        let first = |field: &str| {
            node.child_by_field_name(field)
                .and_then(|list| named_children(list).into_iter().next())
        };
        match node.kind() {
            "short_var_declaration" | "assignment_statement" => {
                let name = first("left").and_then(|left| match left.kind() {
                    "identifier" => Some(text(left, src)),
                    "selector_expression" => field_text(left, "field", src),
                    _ => None,
                });
                name.map(|name| Binding {
                    name,
                    declared: None,
                    value: first("right"),
                })
                .into_iter()
                .collect()
            }
            "var_spec" | "parameter_declaration" => {
                let declared = field_text(node, "type", src);
                let value = node
                    .child_by_field_name("value")
                    .and_then(|list| named_children(list).into_iter().next());
                let mut cursor = node.walk();
                let names: Vec<Node<'t>> = node.children_by_field_name("name", &mut cursor).collect();
                names
                    .into_iter()
                    .map(|name| Binding {
                        name: text(name, src),
                        declared,
                        value,
                    })
                    .collect()
            }
            _ => Vec::new(),
        }
    }

    fn constructed<'s>(&self, node: Node<'_>, src: &'s str) -> Option<&'s str> {
        (node.kind() == "composite_literal")
            .then(|| field_text(node, "type", src))
            .flatten()
    }

    fn member<'s>(&self, node: Node<'_>, src: &'s str) -> Option<&'s str> {
        (node.kind() == "selector_expression")
            .then(|| field_text(node, "field", src))
            .flatten()
    }

    fn inner<'t>(&self, node: Node<'t>) -> Option<Node<'t>> {
        match node.kind() {
            "unary_expression" => node.child_by_field_name("operand"),
            "parenthesized_expression" => node.named_child(0),
            _ => None,
        }
    }

    fn patterns(&self, node: Node<'_>, _src: &str, found: &mut BTreeSet<&'static str>) {
        let pattern = match node.kind() {
            "defer_statement" => "defer-cleanup",
            "go_statement" => "goroutine",
            "select_statement" => "channel-select",
            _ => return,
        };
        found.insert(pattern);
    }
}

struct JavaSamples;

impl SampleSyntax for JavaSamples {
    fn grammar(&self) -> tree_sitter::Language {
        tree_sitter_java::LANGUAGE.into()
    }

    fn call<'t, 's>(&self, node: Node<'t>, src: &'s str) -> Option<Call<'t, 's>> {
        if node.kind() != "method_invocation" {
            return None;
        }
        Some(Call {
            receiver: node.child_by_field_name("object"),
            method: field_text(node, "name", src)?,
        })
    }

    fn bindings<'t, 's>(&self, node: Node<'t>, src: &'s str) -> Vec<Binding<'t, 's>> {
        match node.kind() {
            "local_variable_declaration" | "field_declaration" => {
                let declared = field_text(node, "type", src);
                let mut cursor = node.walk();
                let declarators: Vec<Node<'t>> = node.children_by_field_name("declarator", &mut cursor).collect();
                declarators
                    .into_iter()
                    .filter_map(|d| {
                        Some(Binding {
                            name: field_text(d, "name", src)?,
                            declared,
                            value: d.child_by_field_name("value"),
                        })
                    })
                    .collect()
            }
            "formal_parameter" => field_text(node, "name", src)
                .map(|name| Binding {
                    name,
                    declared: field_text(node, "type", src),
                    value: None,
                })
                .into_iter()
                .collect(),
            "assignment_expression" => {
                let name = node.child_by_field_name("left").and_then(|left| match left.kind() {
                    "identifier" => Some(text(left, src)),
                    "field_access" => field_text(left, "field", src),
                    _ => None,
                });
                name.map(|name| Binding {
                    name,
                    declared: None,
                    value: node.child_by_field_name("right"),
                })
                .into_iter()
                .collect()
            }
            _ => Vec::new(),
        }
    }

    fn constructed<'s>(&self, node: Node<'_>, src: &'s str) -> Option<&'s str> {
        (node.kind() == "object_creation_expression")
            .then(|| field_text(node, "type", src))
            .flatten()
    }

    fn member<'s>(&self, node: Node<'_>, src: &'s str) -> Option<&'s str> {
        (node.kind() == "field_access")
            .then(|| field_text(node, "field", src))
            .flatten()
    }

    fn inner<'t>(&self, node: Node<'t>) -> Option<Node<'t>> {
        (node.kind() == "parenthesized_expression")
            .then(|| node.named_child(0))
            .flatten()
    }

    fn patterns(&self, node: Node<'_>, src: &str, found: &mut BTreeSet<&'static str>) {
        match node.kind() {
            "try_statement" | "try_with_resources_statement" => {
                found.insert("error-handling");
            }
            "enhanced_for_statement" => {
                let loop_text = text(node, src).to_lowercase();
                if loop_text.contains("page") || loop_text.contains("iterator") {
                    found.insert("pagination");
                }
            }
            "lambda_expression" => {
                found.insert("async-callback");
            }
            _ => {}
        }
    }
}

fn sample_syntax(language: Language) -> &'static dyn SampleSyntax {
    match language {
        Language::Python => &PythonSamples,
        Language::Go => &GoSamples,
        Language::Java => &JavaSamples,
    }
}

/// Scan the sample programs under `samples` for calls to client operations
/// of `index`.
pub fn analyze(index: &ApiIndex, samples: &Path, language: Language) -> Result<UsageReport> {
    let clients = Clients::from_index(index);
    if clients.operations.is_empty() {
        tracing::info!("No client types with operations; nothing to match");
        return Ok(UsageReport::default());
    }

    let lang = sample_syntax(language);
    let files = sample_files(samples, language.extensions(), lang)?;
    tracing::info!("Scanning {} {} sample files", files.len(), language);

    let scans: Vec<FileScan> = files
        .par_iter()
        .filter_map(|(path, rel)| {
            let content = match std::fs::read_to_string(path) {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!("Skipping unreadable sample {}: {}", rel, e);
                    return None;
                }
            };
            match scan_file(lang, &clients, rel, &content) {
                Ok(scan) => Some(scan),
                Err(e) => {
                    tracing::warn!("Skipping sample {}: {}", rel, e);
                    None
                }
            }
        })
        .collect();

    // First occurrence in file order wins.
    let mut covered = Vec::new();
    let mut seen = BTreeSet::new();
    let mut patterns = BTreeSet::new();
    for scan in scans {
        patterns.extend(scan.patterns);
        for op in scan.covered {
            if seen.insert((op.client.clone(), op.method.clone())) {
                covered.push(op);
            }
        }
    }

    let mut uncovered = Vec::new();
    for (client, ops) in &clients.operations {
        for (method, sig) in ops {
            let covered_here = seen.contains(&(client.clone(), method.clone()));
            let covered_related = clients
                .related
                .get(client)
                .into_iter()
                .flatten()
                .any(|other| seen.contains(&(other.clone(), method.clone())));
            if !covered_here && !covered_related {
                uncovered.push(UncoveredOperation {
                    client: client.clone(),
                    method: method.clone(),
                    sig: sig.clone(),
                });
            }
        }
    }

    Ok(UsageReport {
        file_count: files.len(),
        covered,
        uncovered,
        patterns: patterns.into_iter().map(str::to_string).collect(),
    })
}

fn sample_files(samples: &Path, extensions: &[&str], lang: &dyn SampleSyntax) -> Result<Vec<(PathBuf, String)>> {
    let root = crate::sandbox::validate_root_path(samples)?;
    let mut files = Vec::new();
    for entry in SkipFilter::new(&root, &[]).walker(&root) {
        let entry = entry?;
        let path = entry.path();
        let wanted = entry.file_type().is_some_and(|t| t.is_file())
            && path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| extensions.contains(&e))
            && !path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| lang.is_test_file(n));
        if !wanted {
            continue;
        }
        let rel = path
            .strip_prefix(&root)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push((path.to_path_buf(), rel));
    }
    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}

#[derive(Debug, Default)]
struct FileScan {
    covered: Vec<CoveredOperation>,
    patterns: BTreeSet<&'static str>,
}

/// Every node of the tree in document order.
fn preorder(root: Node<'_>) -> Vec<Node<'_>> {
    let mut nodes = Vec::new();
    let mut cursor = root.walk();
    loop {
        nodes.push(cursor.node());
        if cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return nodes;
            }
        }
    }
}

/// Client types bound to names while walking one file.
struct Scope<'a, 's> {
    lang: &'a dyn SampleSyntax,
    clients: &'a Clients,
    src: &'s str,
    variables: HashMap<&'s str, &'a str>,
}

impl<'a, 's> Scope<'a, 's> {
    /// Client type an expression evaluates to, when it can be told.
    fn resolve(&self, node: Node<'_>) -> Option<&'a str> {
        let mut node = node;
        while let Some(inner) = self.lang.inner(node) {
            node = inner;
        }

        if let Some(ty) = self.lang.constructed(node, self.src) {
            return self.clients.named(bare_name(ty));
        }
        if let Some(call) = self.lang.call(node, self.src) {
            if let Some(client) = call.receiver.and_then(|r| self.resolve(r)) {
                return self.clients.returned_by(client, call.method);
            }
            return self.clients.produced_by(call.method);
        }
        if let Some(attribute) = self.lang.member(node, self.src) {
            return self.variables.get(attribute).copied();
        }
        if node.kind() == "identifier" {
            let name = text(node, self.src);
            return self.variables.get(name).copied().or_else(|| self.clients.named(name));
        }
        None
    }
}

fn scan_file(lang: &dyn SampleSyntax, clients: &Clients, rel: &str, content: &str) -> Result<FileScan> {
    let tree = syntax::parse(&lang.grammar(), content)?;
    let nodes = preorder(tree.root_node());

    let mut scope = Scope {
        lang,
        clients,
        src: content,
        variables: HashMap::new(),
    };
    for node in &nodes {
        for binding in lang.bindings(*node, content) {
            let client = binding
                .declared
                .and_then(|declared| clients.named(bare_name(declared)))
                .or_else(|| binding.value.and_then(|value| scope.resolve(value)));
            if let Some(client) = client {
                scope.variables.insert(binding.name, client);
            }
        }
    }

    let mut scan = FileScan::default();
    for node in &nodes {
        lang.patterns(*node, content, &mut scan.patterns);

        let Some(call) = lang.call(*node, content) else {
            continue;
        };
        let Some(client) = call.receiver.and_then(|r| scope.resolve(r)) else {
            continue;
        };
        if clients.has(client, call.method) {
            scan.covered.push(CoveredOperation {
                client: client.to_string(),
                method: call.method.to_string(),
                file: rel.to_string(),
                line: node.start_position().row + 1,
            });
        }
    }
    Ok(scan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{MemberInfo, NamespaceInfo, TypeKind};
    use std::fs;

    fn index() -> ApiIndex {
        let client = TypeInfo::new("WidgetClient", TypeKind::Class)
            .as_entry_point()
            .with_member(MemberInfo::new("WidgetClient", MemberKind::Constructor, "endpoint: str"))
            .with_member(MemberInfo::new("get", MemberKind::Method, "widget_id: str").with_ret("Widget"))
            .with_member(MemberInfo::new("delete", MemberKind::Method, "widget_id: str"))
            .with_member(MemberInfo::new("admin", MemberKind::Method, "").with_ret("AdminClient"));
        let admin = TypeInfo::new("AdminClient", TypeKind::Class)
            .with_member(MemberInfo::new("purge", MemberKind::Method, ""));
        let widget = TypeInfo::new("Widget", TypeKind::Class);
        let mut ns = NamespaceInfo::new("widgets").with_type(client).with_type(admin).with_type(widget);
        ns.functions
            .push(MemberInfo::new("connect", MemberKind::Method, "endpoint: str").with_ret("WidgetClient"));
        ApiIndex::new("widgets").with_namespace(ns)
    }

    fn go_index() -> ApiIndex {
        let client = TypeInfo::new("Client", TypeKind::Struct)
            .as_entry_point()
            .with_member(MemberInfo::new("Get", MemberKind::Method, "id string"))
            .with_member(MemberInfo::new("Close", MemberKind::Method, ""))
            .with_member(MemberInfo::new("Delete", MemberKind::Method, "id string"));
        let mut ns = NamespaceInfo::new("example.com/widgets").with_type(client);
        ns.functions
            .push(MemberInfo::new("NewClient", MemberKind::Method, "endpoint string").with_ret("*Client"));
        ApiIndex::new("widgets").with_namespace(ns)
    }

    fn covered(report: &UsageReport) -> Vec<(&str, &str, usize)> {
        report
            .covered
            .iter()
            .map(|c| (c.client.as_str(), c.method.as_str(), c.line))
            .collect()
    }

    #[test]
    fn test_covered_and_uncovered() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("sample.py"),
            "import widgets\n\nclient = widgets.connect(\"https://example\")\nw = client.get(\"a\")\nadmin = client.admin()\nadmin.purge()\nclient.get(\"b\")\n",
        )
        .unwrap();
        fs::write(dir.path().join("test_sample.py"), "import widgets\nwidgets.connect(\"x\").delete(\"y\")\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "client.delete(x)\n").unwrap();

        let report = analyze(&index(), dir.path(), Language::Python).unwrap();
        assert_eq!(report.file_count, 1);
        assert_eq!(
            covered(&report),
            vec![("WidgetClient", "get", 4), ("WidgetClient", "admin", 5), ("AdminClient", "purge", 6)]
        );

        assert_eq!(report.uncovered.len(), 1);
        assert_eq!(report.uncovered[0].method, "delete");
        assert_eq!(report.uncovered[0].sig, "widget_id: str");
        assert!((report.coverage() - 0.75).abs() < f64::EPSILON);
        assert!(report.patterns.is_empty());
    }

    #[test]
    fn test_python_attributes_chains_and_patterns() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("runner.py"),
            r#"import asyncio
from widgets import WidgetClient

class Runner:
    def __init__(self):
        self.client = WidgetClient("e")

    async def run(self):
        try:
            await self.client.delete("x")
        except Exception:
            pass
        async for page in self.client.admin().purge():
            print(page)
"#,
        )
        .unwrap();

        let report = analyze(&index(), dir.path(), Language::Python).unwrap();
        assert_eq!(
            covered(&report),
            vec![("WidgetClient", "delete", 10), ("AdminClient", "purge", 13), ("WidgetClient", "admin", 13)]
        );
        assert_eq!(report.patterns, vec!["async", "error-handling", "streaming"]);
    }

    #[test]
    fn test_typed_declarations_and_constructors() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("Sample.java"),
            "class Sample {\n  void run() {\n    WidgetClient c = build();\n    c.delete(\"x\");\n    var d = new WidgetClient(\"e\");\n    d.get(\"y\");\n  }\n}\n",
        )
        .unwrap();

        let report = analyze(&index(), dir.path(), Language::Java).unwrap();
        let methods: Vec<&str> = report.covered.iter().map(|c| c.method.as_str()).collect();
        assert_eq!(methods, vec!["delete", "get"]);
    }

    #[test]
    fn test_java_parameters_and_patterns() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("Paging.java"),
            "class Paging {\n    void run(WidgetClient client) {\n        try {\n            for (Widget page : client.get(\"a\")) {}\n        } catch (RuntimeException e) {}\n        client.delete(\"x\", () -> {});\n    }\n}\n",
        )
        .unwrap();

        let report = analyze(&index(), dir.path(), Language::Java).unwrap();
        assert_eq!(
            covered(&report),
            vec![("WidgetClient", "get", 4), ("WidgetClient", "delete", 6)]
        );
        assert_eq!(report.patterns, vec!["async-callback", "error-handling", "pagination"]);
    }

    #[test]
    fn test_go_factories_and_patterns() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("main.go"),
            "package main\n\nimport \"example.com/widgets\"\n\nfunc main() {\n\tc, err := widgets.NewClient(\"e\")\n\tif err != nil {\n\t\treturn\n\t}\n\tdefer c.Close()\n\tgo c.Get(\"a\")\n\tselect {}\n}\n",
        )
        .unwrap();
        fs::write(dir.path().join("main_test.go"), "package main\n").unwrap();

        let report = analyze(&go_index(), dir.path(), Language::Go).unwrap();
        assert_eq!(report.file_count, 1);
        assert_eq!(covered(&report), vec![("Client", "Close", 10), ("Client", "Get", 11)]);
        assert_eq!(report.uncovered[0].method, "Delete");
        assert_eq!(report.patterns, vec!["channel-select", "defer-cleanup", "goroutine"]);
    }

    #[test]
    fn test_no_clients_is_empty_report() {
        let dir = tempfile::tempdir().unwrap();
        let index = ApiIndex::new("empty");
        let report = analyze(&index, dir.path(), Language::Python).unwrap();
        assert!(report.covered.is_empty());
        assert_eq!(report.coverage(), 0.0);
    }
}
