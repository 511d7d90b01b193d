//! Reachability - which public types a consumer can actually get to
//!
//! Builds a reference graph over the types of an index and walks it
//! breadth-first from the roots. A type is reachable when a root mentions it
//! (transitively) in a base, an interface or a member signature, or when it
//! extends or implements a reachable type.

use crate::index::{ApiIndex, NamespaceInfo, TypeInfo, TypeKind};
use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::LazyLock;

/// Dotted identifier run: `Builder`, `WidgetClient.Options`, `pkg.Item`
static DOTTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*").unwrap());

/// Split `text` into identifier tokens: maximal runs of ASCII letters,
/// digits and underscores.
pub fn identifier_tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|tok| !tok.is_empty())
}

/// Dotted names mentioned in a type expression, qualifiers kept together.
pub fn dotted_names(text: &str) -> impl Iterator<Item = &str> {
    DOTTED.find_iter(text).map(|m| m.as_str())
}

/// A type of the index, identified by namespace and (possibly nested) name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeKey {
    pub namespace: String,
    pub name: String,
}

impl TypeKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}.{}", self.namespace, self.name)
        }
    }
}

/// Name lookup over the types of an index.
///
/// References resolve in scope order: namespace-qualified, enclosing types
/// of the referring type, the referring namespace, then anywhere. Nested
/// types are also reachable by their innermost name.
#[derive(Debug, Default)]
pub struct TypeTable {
    /// full type name -> namespaces declaring it
    by_name: HashMap<String, Vec<String>>,
    /// innermost segment of nested names -> keys
    by_inner: HashMap<String, Vec<TypeKey>>,
    namespaces: HashSet<String>,
}

impl TypeTable {
    pub fn from_namespaces(namespaces: &[NamespaceInfo]) -> Self {
        let mut table = Self::default();
        for ns in namespaces {
            table.namespaces.insert(ns.name.clone());
            for ty in &ns.types {
                table.insert(&ns.name, &ty.name);
            }
        }
        table
    }

    fn insert(&mut self, namespace: &str, name: &str) {
        let declared = self.by_name.entry(name.to_string()).or_default();
        if !declared.iter().any(|ns| ns == namespace) {
            declared.push(namespace.to_string());
        }
        if let Some((_, inner)) = name.rsplit_once('.') {
            self.by_inner
                .entry(inner.to_string())
                .or_default()
                .push(TypeKey::new(namespace, name));
        }
    }

    pub fn contains(&self, key: &TypeKey) -> bool {
        self.by_name
            .get(&key.name)
            .is_some_and(|declared| declared.contains(&key.namespace))
    }

    fn declared_in(&self, namespace: &str, name: &str) -> Option<TypeKey> {
        let key = TypeKey::new(namespace, name);
        self.contains(&key).then_some(key)
    }

    /// Namespaces a qualifier can denote: the exact name, or the last
    /// segment of a dotted or slashed namespace (`models` for `shop.models`
    /// and `example.com/sdk/models`).
    fn qualified_namespaces<'a>(&'a self, qualifier: &'a str) -> impl Iterator<Item = &'a String> + 'a {
        self.namespaces.iter().filter(move |ns| {
            *ns == qualifier
                || ns
                    .strip_suffix(qualifier)
                    .is_some_and(|head| head.ends_with('.') || head.ends_with('/'))
        })
    }

    /// Types a dotted `reference` written inside `from` can denote.
    pub fn resolve(&self, from: &TypeKey, reference: &str) -> Vec<TypeKey> {
        let reference = reference.trim().trim_start_matches(['*', '&']);
        if reference.is_empty() {
            return Vec::new();
        }

        // namespace-qualified
        for (qualifier, name) in split_points(reference) {
            let mut found: Vec<TypeKey> = self
                .qualified_namespaces(qualifier)
                .filter_map(|ns| self.declared_in(ns, name))
                .collect();
            if !found.is_empty() {
                found.sort();
                return found;
            }
        }

        // enclosing types, innermost first
        let mut scope = from.name.as_str();
        loop {
            if let Some(key) = self.declared_in(&from.namespace, &format!("{}.{}", scope, reference)) {
                return vec![key];
            }
            match scope.rsplit_once('.') {
                Some((outer, _)) => scope = outer,
                None => break,
            }
        }

        if let Some(key) = self.declared_in(&from.namespace, reference) {
            return vec![key];
        }
        if let Some(declared) = self.by_name.get(reference) {
            let mut found: Vec<TypeKey> = declared.iter().map(|ns| TypeKey::new(ns, reference)).collect();
            found.sort();
            return found;
        }

        if !reference.contains('.') {
            let inner = self.by_inner.get(reference).map(Vec::as_slice).unwrap_or_default();
            let local: Vec<TypeKey> = inner.iter().filter(|k| k.namespace == from.namespace).cloned().collect();
            let mut found = if local.is_empty() { inner.to_vec() } else { local };
            found.sort();
            return found;
        }

        // unknown qualifier: retry without it
        match reference.split_once('.') {
            Some((_, rest)) => self.resolve(from, rest),
            None => Vec::new(),
        }
    }

    /// Resolve the head of a parent expression (`pkg.Base[T]`, `*Embedded`).
    pub fn resolve_parent(&self, from: &TypeKey, parent: &str) -> Vec<TypeKey> {
        self.resolve(from, parent_head(parent))
    }
}

/// `pkg.Base[T]` -> `pkg.Base`
pub fn parent_head(parent: &str) -> &str {
    let head = parent.split(['[', '<', '(']).next().unwrap_or(parent).trim();
    head.trim_start_matches(['*', '&'])
}

/// Every `(qualifier, rest)` split of a dotted name, longest qualifier first.
fn split_points(reference: &str) -> impl Iterator<Item = (&str, &str)> {
    reference
        .char_indices()
        .filter(|(_, c)| *c == '.')
        .map(|(i, _)| (&reference[..i], &reference[i + 1..]))
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
}

#[derive(Debug, Clone, Default)]
struct Node {
    entry_point: bool,
    has_operations: bool,
    root_kind: bool,
}

/// Type-level reference graph.
#[derive(Debug, Default)]
pub struct ReferenceGraph {
    nodes: HashMap<TypeKey, Node>,
    /// type -> types it mentions
    references: HashMap<TypeKey, HashSet<TypeKey>>,
    /// type -> types that extend or implement it
    implementers: HashMap<TypeKey, HashSet<TypeKey>>,
}

impl ReferenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph for every type in `index`.
    pub fn from_index(index: &ApiIndex) -> Self {
        let table = TypeTable::from_namespaces(&index.namespaces);
        let mut graph = Self::new();
        for (ns, ty) in index.types() {
            graph.add_type(ns, ty);
        }

        for (ns, ty) in index.types() {
            let from = TypeKey::new(ns, &ty.name);
            let mut mentioned = BTreeSet::new();
            for text in type_mentions(ty) {
                for name in dotted_names(text) {
                    mentioned.extend(table.resolve(&from, name).into_iter().filter(|k| *k != from));
                }
            }
            for target in mentioned {
                graph.add_reference(&from, target);
            }

            for parent in ty.base.iter().chain(&ty.interfaces) {
                for parent in table.resolve_parent(&from, parent) {
                    graph.add_implementation(parent, from.clone());
                }
            }
        }

        graph.add_structural_implementations(index);
        graph
    }

    pub fn add_type(&mut self, namespace: &str, ty: &TypeInfo) {
        let node = self.nodes.entry(TypeKey::new(namespace, &ty.name)).or_default();
        node.entry_point |= ty.entry_point;
        node.has_operations |= ty.has_callables();
        node.root_kind |= ty.kind.is_root_kind();
    }

    pub fn add_reference(&mut self, from: &TypeKey, to: TypeKey) {
        self.references.entry(from.clone()).or_default().insert(to);
    }

    /// Record that `implementer` extends or implements `parent`.
    pub fn add_implementation(&mut self, parent: TypeKey, implementer: TypeKey) {
        self.implementers.entry(parent).or_default().insert(implementer);
    }

    /// Interfaces are satisfied implicitly in some languages: a type whose
    /// method names cover every method of an interface implements it.
    fn add_structural_implementations(&mut self, index: &ApiIndex) {
        let interfaces: Vec<(TypeKey, HashSet<&str>)> = index
            .types()
            .filter(|(_, t)| t.kind == TypeKind::Interface)
            .map(|(ns, t)| (TypeKey::new(ns, &t.name), t.callables().map(|m| m.name.as_str()).collect()))
            .filter(|(_, methods): &(TypeKey, HashSet<&str>)| !methods.is_empty())
            .collect();

        for (ns, ty) in index.types() {
            if ty.kind == TypeKind::Interface {
                continue;
            }
            let methods: HashSet<&str> = ty.callables().map(|m| m.name.as_str()).collect();
            for (iface, required) in &interfaces {
                if required.is_subset(&methods) {
                    self.add_implementation(iface.clone(), TypeKey::new(ns, &ty.name));
                }
            }
        }
    }

    fn references_of(&self, key: &TypeKey) -> impl Iterator<Item = &TypeKey> {
        self.references.get(key).into_iter().flatten()
    }

    fn references_operations(&self, key: &TypeKey) -> bool {
        self.references_of(key)
            .any(|r| self.nodes.get(r).is_some_and(|n| n.has_operations))
    }

    /// Starting points for the walk.
    ///
    /// Entry points when the index declares any. Otherwise root-kind types
    /// nothing else references that either declare operations or reference a
    /// type that does; if that is still empty, the unreferenced condition is
    /// dropped.
    pub fn roots(&self) -> BTreeSet<TypeKey> {
        let entries: BTreeSet<TypeKey> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.entry_point)
            .map(|(key, _)| key.clone())
            .collect();
        if !entries.is_empty() {
            return entries;
        }

        let referenced: HashSet<&TypeKey> = self
            .references
            .iter()
            .flat_map(|(from, targets)| targets.iter().filter(move |t| *t != from))
            .collect();

        let candidates = |require_unreferenced: bool| -> BTreeSet<TypeKey> {
            self.nodes
                .iter()
                .filter(|(_, n)| n.root_kind)
                .filter(|(key, _)| !require_unreferenced || !referenced.contains(key))
                .filter(|(key, n)| n.has_operations || self.references_operations(key))
                .map(|(key, _)| key.clone())
                .collect()
        };

        let roots = candidates(true);
        if roots.is_empty() { candidates(false) } else { roots }
    }

    /// Closure of the roots under references and implementation edges.
    pub fn reachable(&self) -> BTreeSet<TypeKey> {
        self.reachable_from(self.roots())
    }

    pub fn reachable_from(&self, roots: impl IntoIterator<Item = TypeKey>) -> BTreeSet<TypeKey> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        for root in roots {
            if visited.insert(root.clone()) {
                queue.push_back(root);
            }
        }

        while let Some(current) = queue.pop_front() {
            let implementers = self.implementers.get(&current).into_iter().flatten();
            for next in self.references_of(&current).chain(implementers) {
                if visited.insert(next.clone()) {
                    queue.push_back(next.clone());
                }
            }
        }

        visited.into_iter().collect()
    }

    pub fn stats(&self) -> ReachabilityStats {
        ReachabilityStats {
            types: self.nodes.len(),
            references: self.references.values().map(HashSet::len).sum(),
            implementations: self.implementers.values().map(HashSet::len).sum(),
            roots: self.roots().len(),
            reachable: self.reachable().len(),
        }
    }
}

/// Base, interfaces and every member signature of a type.
fn type_mentions(ty: &TypeInfo) -> impl Iterator<Item = &str> {
    ty.base
        .as_deref()
        .into_iter()
        .chain(ty.interfaces.iter().map(String::as_str))
        .chain(ty.alias_of.as_deref())
        .chain(
            ty.members
                .iter()
                .flat_map(|m| std::iter::once(m.sig.as_str()).chain(m.type_texts())),
        )
}

/// Return a copy of `index` without the types no root can reach, together
/// with the statistics of the graph it walked.
pub fn prune_with_stats(index: &ApiIndex) -> (ApiIndex, ReachabilityStats) {
    let graph = ReferenceGraph::from_index(index);
    let stats = graph.stats();
    let reachable = graph.reachable();

    let mut pruned = index.clone();
    for ns in &mut pruned.namespaces {
        let namespace = ns.name.clone();
        ns.types
            .retain(|t| reachable.contains(&TypeKey::new(namespace.as_str(), t.name.as_str())));
    }
    pruned
        .namespaces
        .retain(|ns| !ns.types.is_empty() || !ns.functions.is_empty());

    tracing::debug!(
        "Pruned {} unreachable types",
        index.type_count() - pruned.type_count()
    );
    (pruned, stats)
}

/// Return a copy of `index` without the types no root can reach.
pub fn prune(index: &ApiIndex) -> ApiIndex {
    prune_with_stats(index).0
}

/// Statistics about a reference graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReachabilityStats {
    pub types: usize,
    pub references: usize,
    pub implementations: usize,
    pub roots: usize,
    pub reachable: usize,
}

impl fmt::Display for ReachabilityStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Reference Graph:")?;
        writeln!(f, "  Types: {} (roots: {}, reachable: {})", self.types, self.roots, self.reachable)?;
        writeln!(
            f,
            "  Edges: {} references, {} implementations",
            self.references, self.implementations
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{MemberInfo, MemberKind, ParamInfo};

    fn method(name: &str, param_type: &str) -> MemberInfo {
        MemberInfo::new(name, MemberKind::Method, format!("x: {}", param_type))
            .with_params(vec![ParamInfo::new(Some("x".into()), param_type)])
    }

    fn index(types: Vec<TypeInfo>) -> ApiIndex {
        let mut ns = NamespaceInfo::new("sdk");
        ns.types = types;
        ApiIndex::new("sdk").with_namespace(ns)
    }

    fn names(keys: &BTreeSet<TypeKey>) -> Vec<&str> {
        keys.iter().map(|k| k.name.as_str()).collect()
    }

    #[test]
    fn test_identifier_tokens() {
        let tokens: Vec<_> = identifier_tokens("Optional[List[Item_2]], *x").collect();
        assert_eq!(tokens, vec!["Optional", "List", "Item_2", "x"]);
    }

    #[test]
    fn test_dotted_names() {
        let names: Vec<_> = dotted_names("Map<String, WidgetClient.Options>, *models.Item").collect();
        assert_eq!(names, vec!["Map", "String", "WidgetClient.Options", "models.Item"]);
    }

    #[test]
    fn test_transitive_closure_from_entry_point() {
        let idx = index(vec![
            TypeInfo::new("Client", TypeKind::Class)
                .as_entry_point()
                .with_member(method("create", "Request")),
            TypeInfo::new("Request", TypeKind::Class)
                .with_member(MemberInfo::new("options", MemberKind::Field, "Options")),
            TypeInfo::new("Options", TypeKind::Class),
            TypeInfo::new("Orphan", TypeKind::Class)
                .with_member(MemberInfo::new("run", MemberKind::Method, "")),
        ]);

        let reachable = ReferenceGraph::from_index(&idx).reachable();
        assert_eq!(names(&reachable), vec!["Client", "Options", "Request"]);
    }

    #[test]
    fn test_nested_types_by_inner_and_qualified_name() {
        let idx = index(vec![
            TypeInfo::new("WidgetClient", TypeKind::Class)
                .as_entry_point()
                .with_member(MemberInfo::new("builder", MemberKind::Method, "()").with_ret("Builder"))
                .with_member(method("configure", "WidgetClient.Options")),
            TypeInfo::new("WidgetClient.Builder", TypeKind::Class),
            TypeInfo::new("WidgetClient.Options", TypeKind::Class),
            TypeInfo::new("WidgetClient.Unused", TypeKind::Class),
        ]);

        let pruned = prune(&idx);
        let kept: Vec<_> = pruned.types().map(|(_, t)| t.name.as_str()).collect();
        assert_eq!(kept, vec!["WidgetClient", "WidgetClient.Builder", "WidgetClient.Options"]);
    }

    #[test]
    fn test_same_name_in_different_namespaces() {
        let mut a = NamespaceInfo::new("sdk/a");
        a.types = vec![
            TypeInfo::new("Client", TypeKind::Struct)
                .as_entry_point()
                .with_member(method("Configure", "*Options")),
            TypeInfo::new("Options", TypeKind::Struct),
        ];
        let mut b = NamespaceInfo::new("sdk/b");
        b.types = vec![TypeInfo::new("Options", TypeKind::Struct)];
        let idx = ApiIndex::new("sdk").with_namespace(a).with_namespace(b);

        let reachable = ReferenceGraph::from_index(&idx).reachable();
        assert!(reachable.contains(&TypeKey::new("sdk/a", "Options")));
        assert!(!reachable.contains(&TypeKey::new("sdk/b", "Options")));

        let pruned = prune(&idx);
        assert_eq!(pruned.namespaces.len(), 1);
        assert_eq!(pruned.namespaces[0].name, "sdk/a");
    }

    #[test]
    fn test_qualifier_selects_namespace() {
        let mut client = NamespaceInfo::new("shop.client");
        client.types = vec![TypeInfo::new("Client", TypeKind::Class)
            .as_entry_point()
            .with_member(method("get", "models.Config"))];
        let mut models = NamespaceInfo::new("shop.models");
        models.types = vec![TypeInfo::new("Config", TypeKind::Class)];
        let mut settings = NamespaceInfo::new("shop.settings");
        settings.types = vec![TypeInfo::new("Config", TypeKind::Class)];
        let idx = ApiIndex::new("shop")
            .with_namespace(client)
            .with_namespace(models)
            .with_namespace(settings);

        let reachable = ReferenceGraph::from_index(&idx).reachable();
        assert!(reachable.contains(&TypeKey::new("shop.models", "Config")));
        assert!(!reachable.contains(&TypeKey::new("shop.settings", "Config")));
    }

    #[test]
    fn test_implementers_of_reachable_interface() {
        let idx = index(vec![
            TypeInfo::new("Client", TypeKind::Class)
                .as_entry_point()
                .with_member(method("set_policy", "RetryPolicy")),
            TypeInfo::new("RetryPolicy", TypeKind::Interface),
            TypeInfo::new("ExponentialRetry", TypeKind::Class).with_base("sdk.RetryPolicy"),
        ]);
        let reachable = ReferenceGraph::from_index(&idx).reachable();
        assert!(reachable.contains(&TypeKey::new("sdk", "ExponentialRetry")));
    }

    #[test]
    fn test_structural_implementation() {
        let idx = index(vec![
            TypeInfo::new("Client", TypeKind::Struct)
                .as_entry_point()
                .with_member(method("Use", "Transport")),
            TypeInfo::new("Transport", TypeKind::Interface)
                .with_member(MemberInfo::new("Send", MemberKind::Method, "req *Request")),
            TypeInfo::new("HttpTransport", TypeKind::Struct)
                .with_member(MemberInfo::new("Send", MemberKind::Method, "req *Request")),
            TypeInfo::new("Request", TypeKind::Struct),
        ]);
        let reachable = ReferenceGraph::from_index(&idx).reachable();
        assert!(reachable.contains(&TypeKey::new("sdk", "HttpTransport")));
        assert!(reachable.contains(&TypeKey::new("sdk", "Request")));
    }

    #[test]
    fn test_roots_without_entry_points() {
        let idx = index(vec![
            TypeInfo::new("Service", TypeKind::Class)
                .with_member(method("call", "Payload")),
            TypeInfo::new("Payload", TypeKind::Class),
            TypeInfo::new("Color", TypeKind::Enum),
        ]);
        let graph = ReferenceGraph::from_index(&idx);
        assert_eq!(names(&graph.roots()), vec!["Service"]);
        assert!(!graph.reachable().contains(&TypeKey::new("sdk", "Color")));
    }

    #[test]
    fn test_roots_fallback_when_everything_is_referenced() {
        // A and B reference each other, so neither is unreferenced.
        let idx = index(vec![
            TypeInfo::new("A", TypeKind::Class).with_member(method("to_b", "B")),
            TypeInfo::new("B", TypeKind::Class).with_member(method("to_a", "A")),
        ]);
        assert_eq!(ReferenceGraph::from_index(&idx).roots().len(), 2);
    }

    #[test]
    fn test_prune_keeps_order_and_functions() {
        let mut idx = index(vec![
            TypeInfo::new("Client", TypeKind::Class)
                .as_entry_point()
                .with_member(method("get", "Item")),
            TypeInfo::new("Unused", TypeKind::Class),
            TypeInfo::new("Item", TypeKind::Class),
        ]);
        idx.namespaces[0]
            .functions
            .push(MemberInfo::new("connect", MemberKind::Method, ""));

        let (pruned, stats) = prune_with_stats(&idx);
        let names: Vec<_> = pruned.types().map(|(_, t)| t.name.as_str()).collect();
        assert_eq!(names, vec!["Client", "Item"]);
        assert_eq!(pruned.namespaces[0].functions.len(), 1);
        assert_eq!(idx.type_count(), 3);
        assert_eq!(
            stats,
            ReachabilityStats {
                types: 3,
                references: 1,
                implementations: 0,
                roots: 1,
                reachable: 2,
            }
        );
    }
}
