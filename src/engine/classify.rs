//! Sequential post-processing after the parser pool joins.
//!
//! Runs in a fixed order: parent classification, error marking, dependency
//! resolution, id assignment. Each step only reads what the previous one
//! settled.

use super::merge::{Collected, ImportedName};
use super::source::SourceExtractor;
use crate::index::{DependencyInfo, MemberInfo, NamespaceInfo, TypeKind};
use crate::reachability::{identifier_tokens, parent_head, TypeKey, TypeTable};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::LazyLock;

/// `module.Name` inside a type expression
static QUALIFIED_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\.([A-Za-z_][A-Za-z0-9_]*)").unwrap());

/// Last segment of a possibly qualified, possibly generic type name:
/// `pkg.Base[T]` -> `Base`.
pub fn bare_name(name: &str) -> &str {
    let head = name.split(['[', '<', '(']).next().unwrap_or(name).trim();
    let head = head.trim_start_matches('*');
    head.rsplit('.').next().unwrap_or(head)
}

/// Local hierarchy of the extracted types: declared parents per type, and
/// the lookups that turn a parent expression into local types.
struct Hierarchy<'a> {
    table: TypeTable,
    imports: &'a BTreeMap<String, Vec<ImportedName>>,
}

impl<'a> Hierarchy<'a> {
    fn new(namespaces: &[NamespaceInfo], imports: &'a BTreeMap<String, Vec<ImportedName>>) -> Self {
        Self {
            table: TypeTable::from_namespaces(namespaces),
            imports,
        }
    }

    /// Local types `parent` denotes from inside `from`: an imported name
    /// first, then the usual scope order.
    fn resolve(&self, from: &TypeKey, parent: &str) -> Vec<TypeKey> {
        let head = parent_head(parent);
        if let Some(key) = self.imported(&from.namespace, head) {
            return vec![key];
        }
        self.table.resolve(from, head)
    }

    fn imported(&self, namespace: &str, head: &str) -> Option<TypeKey> {
        let (first, rest) = match head.split_once('.') {
            Some((first, rest)) => (first, Some(rest)),
            None => (head, None),
        };
        let import = self.imports.get(namespace)?.iter().find(|i| i.local == first)?;
        let key = match (&import.name, rest) {
            (Some(name), None) => TypeKey::new(import.package.as_str(), name.as_str()),
            (Some(name), Some(rest)) => TypeKey::new(import.package.as_str(), format!("{}.{}", name, rest)),
            (None, Some(rest)) => TypeKey::new(import.package.as_str(), rest),
            (None, None) => return None,
        };
        self.table.contains(&key).then_some(key)
    }
}

/// Split declared parents into one `base` and `interfaces`.
///
/// Parents declared in the tree are classified by their real kind; the
/// extractor's heuristic is only consulted for external ones.
pub fn classify_parents<X: SourceExtractor + ?Sized>(
    extractor: &X,
    namespaces: &mut [NamespaceInfo],
    imports: &BTreeMap<String, Vec<ImportedName>>,
) {
    if extractor.parents_are_explicit() {
        return;
    }

    let hierarchy = Hierarchy::new(namespaces, imports);
    let kinds: HashMap<TypeKey, TypeKind> = namespaces
        .iter()
        .flat_map(|ns| ns.types.iter().map(move |t| (TypeKey::new(ns.name.as_str(), t.name.as_str()), t.kind)))
        .collect();

    for ns in namespaces.iter_mut() {
        for ty in &mut ns.types {
            let from = TypeKey::new(ns.name.as_str(), ty.name.as_str());
            let parents: Vec<String> = ty.base.take().into_iter().chain(ty.interfaces.drain(..)).collect();
            let mut base = None;
            let mut interfaces = Vec::new();

            for parent in parents {
                let local = hierarchy.resolve(&from, &parent);
                let is_interface = match local.first().and_then(|key| kinds.get(key)) {
                    Some(kind) => *kind == TypeKind::Interface,
                    None => extractor.external_parent_is_interface(&parent),
                };
                // An interface only has interface parents.
                if is_interface || ty.kind == TypeKind::Interface || base.is_some() {
                    if !interfaces.contains(&parent) {
                        interfaces.push(parent);
                    }
                } else {
                    base = Some(parent);
                }
            }

            ty.base = base;
            ty.interfaces = interfaces;
        }
    }
}

/// Set `is_error` on every type whose hierarchy reaches an error root.
///
/// Local parents are followed through the tree; only a parent declared
/// outside it is checked against the language's error roots.
pub fn mark_errors<X: SourceExtractor + ?Sized>(
    extractor: &X,
    namespaces: &mut [NamespaceInfo],
    imports: &BTreeMap<String, Vec<ImportedName>>,
) {
    let hierarchy = Hierarchy::new(namespaces, imports);
    let parents: HashMap<TypeKey, Vec<String>> = namespaces
        .iter()
        .flat_map(|ns| {
            ns.types.iter().map(move |t| {
                let list = t.base.iter().chain(&t.interfaces).cloned().collect();
                (TypeKey::new(ns.name.as_str(), t.name.as_str()), list)
            })
        })
        .collect();

    let mut memo: HashMap<TypeKey, bool> = namespaces
        .iter()
        .flat_map(|ns| ns.types.iter().map(move |t| (ns, t)))
        .filter(|(_, t)| extractor.is_error_type(t))
        .map(|(ns, t)| (TypeKey::new(ns.name.as_str(), t.name.as_str()), true))
        .collect();

    let keys: Vec<TypeKey> = parents.keys().cloned().collect();
    for key in &keys {
        let mut visiting = HashSet::new();
        is_error(extractor, &hierarchy, key, &parents, &mut memo, &mut visiting);
    }

    for ns in namespaces.iter_mut() {
        for ty in &mut ns.types {
            let key = TypeKey::new(ns.name.as_str(), ty.name.as_str());
            ty.is_error = memo.get(&key).copied().unwrap_or(false);
        }
    }
}

fn is_error<X: SourceExtractor + ?Sized>(
    extractor: &X,
    hierarchy: &Hierarchy<'_>,
    key: &TypeKey,
    parents: &HashMap<TypeKey, Vec<String>>,
    memo: &mut HashMap<TypeKey, bool>,
    visiting: &mut HashSet<TypeKey>,
) -> bool {
    if let Some(known) = memo.get(key) {
        return *known;
    }
    if !visiting.insert(key.clone()) {
        // Cycle in a broken hierarchy
        return false;
    }

    let mut result = false;
    for parent in parents.get(key).into_iter().flatten() {
        let local = hierarchy.resolve(key, parent);
        let hit = if local.is_empty() {
            extractor.is_error_root(parent_head(parent))
        } else {
            local
                .iter()
                .any(|p| is_error(extractor, hierarchy, p, parents, memo, visiting))
        };
        if hit {
            result = true;
            break;
        }
    }

    memo.insert(key.clone(), result);
    result
}

/// External packages the public surface mentions, with the types used from
/// each.
pub fn dependencies<X: SourceExtractor + ?Sized>(extractor: &X, collected: &Collected) -> Vec<DependencyInfo> {
    let local: HashSet<&str> = collected
        .namespaces
        .iter()
        .flat_map(|ns| ns.types.iter().map(|t| t.name.as_str()))
        .collect();
    let local_namespaces: HashSet<&str> = collected.namespaces.iter().map(|ns| ns.name.as_str()).collect();

    let mut found: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for ns in &collected.namespaces {
        let Some(imports) = collected.imports.get(&ns.name) else {
            continue;
        };
        let modules: HashMap<&str, &ImportedName> = imports
            .iter()
            .filter(|i| i.name.is_none())
            .map(|i| (i.local.as_str(), i))
            .collect();
        let symbols: HashMap<&str, &ImportedName> = imports
            .iter()
            .filter(|i| i.name.is_some())
            .map(|i| (i.local.as_str(), i))
            .collect();

        let mut texts: Vec<&str> = Vec::new();
        for ty in &ns.types {
            texts.extend(ty.base.as_deref());
            texts.extend(ty.interfaces.iter().map(String::as_str));
            texts.extend(ty.alias_of.as_deref());
            for member in &ty.members {
                texts.extend(member.type_texts());
            }
        }
        for function in &ns.functions {
            texts.extend(function.type_texts());
        }

        for text in texts {
            for caps in QUALIFIED_REF.captures_iter(text) {
                let (Some(module), Some(name)) = (caps.get(1), caps.get(2)) else {
                    continue;
                };
                if let Some(import) = modules.get(module.as_str()) {
                    if !local_namespaces.contains(import.package.as_str()) {
                        found
                            .entry(import.package.clone())
                            .or_default()
                            .insert(name.as_str().to_string());
                    }
                }
            }
            for token in identifier_tokens(text) {
                if local.contains(token) {
                    continue;
                }
                if let Some(import) = symbols.get(token) {
                    if !local_namespaces.contains(import.package.as_str()) {
                        let name = import.name.clone().unwrap_or_else(|| token.to_string());
                        found.entry(import.package.clone()).or_default().insert(name);
                    }
                }
            }
        }
    }

    for reexport in &collected.reexports {
        let entry = found.entry(reexport.package.clone()).or_default();
        if let Some(name) = &reexport.name {
            entry.insert(name.clone());
        }
    }

    found
        .into_iter()
        .map(|(package, types)| DependencyInfo {
            is_stdlib: extractor.is_stdlib(&package),
            package,
            types: types.into_iter().collect(),
        })
        .collect()
}

/// Give every type, member and function an id that is unique within the
/// index. Ids are derived from names and parameter types only, so they are
/// stable across runs on unchanged input.
pub fn assign_ids(namespaces: &mut [NamespaceInfo]) {
    let mut taken: HashSet<String> = HashSet::new();

    for ns in namespaces.iter_mut() {
        for ty in &mut ns.types {
            let type_id = unique(qualify(&ns.name, &ty.name), &mut taken);
            for member in &mut ty.members {
                member.id = Some(unique(member_id(&type_id, member), &mut taken));
            }
            ty.id = Some(type_id);
        }
        for function in &mut ns.functions {
            let base = qualify(&ns.name, &format!("{}({})", function.name, param_types(function)));
            function.id = Some(unique(base, &mut taken));
        }
    }
}

fn member_id(type_id: &str, member: &MemberInfo) -> String {
    if member.kind.is_callable() {
        format!("{}.{}({})", type_id, member.name, param_types(member))
    } else {
        format!("{}.{}", type_id, member.name)
    }
}

fn param_types(member: &MemberInfo) -> String {
    member
        .params
        .iter()
        .map(|p| p.type_name.replace(' ', ""))
        .collect::<Vec<_>>()
        .join(",")
}

fn qualify(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", namespace, name)
    }
}

fn unique(base: String, taken: &mut HashSet<String>) -> String {
    if taken.insert(base.clone()) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}#{}", base, n);
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::merge::TypeAccumulator;
    use crate::engine::source::{FileReport, ProjectInfo, SourceFile};
    use crate::engine::Language;
    use crate::index::{MemberKind, ParamInfo, TypeInfo};
    use std::path::Path;

    struct Heuristics;

    impl SourceExtractor for Heuristics {
        type Project = ProjectInfo;

        fn language(&self) -> Language {
            Language::Python
        }

        fn load_project(&self, root: &Path) -> crate::Result<ProjectInfo> {
            Ok(ProjectInfo {
                root: root.to_path_buf(),
                package: "p".into(),
                version: None,
            })
        }

        fn extract(&self, _: &SourceFile, _: &ProjectInfo, _: &TypeAccumulator) -> crate::Result<FileReport> {
            Ok(FileReport::default())
        }

        fn external_parent_is_interface(&self, name: &str) -> bool {
            bare_name(name) == "Protocol"
        }

        fn is_error_root(&self, name: &str) -> bool {
            name == "Exception"
        }

        fn is_stdlib(&self, package: &str) -> bool {
            package == "typing"
        }
    }

    fn ns(types: Vec<TypeInfo>) -> Vec<NamespaceInfo> {
        let mut ns = NamespaceInfo::new("pkg");
        ns.types = types;
        vec![ns]
    }

    #[test]
    fn test_bare_name() {
        assert_eq!(bare_name("pkg.Base[T]"), "Base");
        assert_eq!(bare_name("*io.Reader"), "Reader");
        assert_eq!(bare_name("List<String>"), "List");
    }

    #[test]
    fn test_local_kinds_beat_heuristics() {
        let mut iface = TypeInfo::new("Readable", TypeKind::Interface);
        iface.members.push(MemberInfo::new("read", MemberKind::Method, ""));
        let mut child = TypeInfo::new("File", TypeKind::Class).with_base("Readable");
        child.interfaces.push("Base".into());
        let mut namespaces = ns(vec![iface, TypeInfo::new("Base", TypeKind::Class), child]);

        classify_parents(&Heuristics, &mut namespaces, &BTreeMap::new());
        let file = &namespaces[0].types[2];
        assert_eq!(file.base.as_deref(), Some("Base"));
        assert_eq!(file.interfaces, vec!["Readable".to_string()]);
    }

    #[test]
    fn test_external_heuristic() {
        let mut ty = TypeInfo::new("Shape", TypeKind::Class).with_base("typing.Protocol");
        ty.interfaces.push("object".into());
        let mut namespaces = ns(vec![ty]);
        classify_parents(&Heuristics, &mut namespaces, &BTreeMap::new());
        let shape = &namespaces[0].types[0];
        assert_eq!(shape.base.as_deref(), Some("object"));
        assert_eq!(shape.interfaces, vec!["typing.Protocol".to_string()]);
    }

    #[test]
    fn test_error_marking_is_transitive() {
        let mut namespaces = ns(vec![
            TypeInfo::new("NotFound", TypeKind::Class).with_base("ApiError"),
            TypeInfo::new("ApiError", TypeKind::Class).with_base("Exception"),
            TypeInfo::new("Widget", TypeKind::Class),
            TypeInfo::new("Loop", TypeKind::Class).with_base("Loop"),
        ]);
        mark_errors(&Heuristics, &mut namespaces, &BTreeMap::new());
        let flags: Vec<bool> = namespaces[0].types.iter().map(|t| t.is_error).collect();
        assert_eq!(flags, vec![true, true, false, false]);
    }

    #[test]
    fn test_error_suffix_alone_is_not_an_error() {
        let mut namespaces = ns(vec![
            TypeInfo::new("ParseError", TypeKind::Class),
            TypeInfo::new("Widget", TypeKind::Class).with_base("ParseError"),
            TypeInfo::new("Broken", TypeKind::Class).with_base("vendor.BrokenError"),
        ]);
        mark_errors(&Heuristics, &mut namespaces, &BTreeMap::new());
        assert!(namespaces[0].types.iter().all(|t| !t.is_error));
    }

    #[test]
    fn test_local_parent_shadows_error_root() {
        // A local class named like a root is judged by its own parents.
        let mut namespaces = ns(vec![
            TypeInfo::new("Exception", TypeKind::Class),
            TypeInfo::new("Failure", TypeKind::Class).with_base("Exception"),
        ]);
        mark_errors(&Heuristics, &mut namespaces, &BTreeMap::new());
        assert!(namespaces[0].types.iter().all(|t| !t.is_error));
    }

    #[test]
    fn test_same_name_in_two_namespaces() {
        let mut a = NamespaceInfo::new("pkg.a");
        a.types = vec![TypeInfo::new("Config", TypeKind::Class).with_base("Exception")];
        let mut b = NamespaceInfo::new("pkg.b");
        b.types = vec![
            TypeInfo::new("Config", TypeKind::Class),
            TypeInfo::new("Child", TypeKind::Class).with_base("Config"),
        ];
        let mut c = NamespaceInfo::new("pkg.c");
        c.types = vec![TypeInfo::new("Failure", TypeKind::Class).with_base("Config")];
        let mut namespaces = vec![a, b, c];

        let mut imports = BTreeMap::new();
        imports.insert(
            "pkg.c".to_string(),
            vec![ImportedName {
                local: "Config".into(),
                package: "pkg.a".into(),
                name: Some("Config".into()),
            }],
        );
        mark_errors(&Heuristics, &mut namespaces, &imports);

        assert!(namespaces[0].types[0].is_error);
        assert!(!namespaces[1].types[0].is_error);
        assert!(!namespaces[1].types[1].is_error);
        assert!(namespaces[2].types[0].is_error);
    }

    #[test]
    fn test_dependencies_from_imports() {
        let member = MemberInfo::new("fetch", MemberKind::Method, "")
            .with_params(vec![
                ParamInfo::new(Some("session".into()), "requests.Session"),
                ParamInfo::new(Some("hint".into()), "Optional[Widget]"),
            ])
            .with_ret("Optional[Widget]");
        let mut collected = Collected {
            namespaces: ns(vec![TypeInfo::new("Widget", TypeKind::Class).with_member(member)]),
            ..Collected::default()
        };
        collected.imports.insert(
            "pkg".into(),
            vec![
                ImportedName {
                    local: "requests".into(),
                    package: "requests".into(),
                    name: None,
                },
                ImportedName {
                    local: "Optional".into(),
                    package: "typing".into(),
                    name: Some("Optional".into()),
                },
            ],
        );

        let deps = dependencies(&Heuristics, &collected);
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].package, "requests");
        assert_eq!(deps[0].types, vec!["Session".to_string()]);
        assert!(!deps[0].is_stdlib);
        assert_eq!(deps[1].package, "typing");
        assert!(deps[1].is_stdlib);
    }

    #[test]
    fn test_ids_are_unique() {
        let first = MemberInfo::new("get", MemberKind::Method, "")
            .with_params(vec![ParamInfo::new(Some("id".into()), "str")]);
        let mut namespaces = ns(vec![TypeInfo::new("Client", TypeKind::Class)
            .with_member(first.clone())
            .with_member(first)
            .with_member(MemberInfo::new("timeout", MemberKind::Field, "int"))]);

        assign_ids(&mut namespaces);
        let client = &namespaces[0].types[0];
        assert_eq!(client.id.as_deref(), Some("pkg.Client"));
        assert_eq!(client.members[0].id.as_deref(), Some("pkg.Client.get(str)"));
        assert_eq!(client.members[1].id.as_deref(), Some("pkg.Client.get(str)#2"));
        assert_eq!(client.members[2].id.as_deref(), Some("pkg.Client.timeout"));
    }
}
