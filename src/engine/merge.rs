//! Concurrent accumulation of partially declared types.
//!
//! Parser workers write into a sharded map keyed by `(namespace, type)`. A
//! type may be assembled from several files (Go declares methods anywhere in
//! the package), so entries accept members before their declaration shows up.
//! The entry lock of the shard serializes writers to one key.
//!
//! Declarations resolve deterministically: when two files declare the same
//! type, the one with the smallest [`Origin`] wins. Members, values and
//! interfaces are append-only and sorted by origin when the map is drained,
//! so the result does not depend on worker scheduling.

use crate::index::{MemberInfo, NamespaceInfo, TypeInfo};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Where a declaration was found: file and byte offset.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Origin {
    pub file: Arc<str>,
    pub offset: usize,
}

impl Origin {
    pub fn new(file: &Arc<str>, offset: usize) -> Self {
        Self {
            file: file.clone(),
            offset,
        }
    }
}

/// A name brought into scope by an import.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ImportedName {
    /// Name as used in the importing file
    pub local: String,
    /// Package or module path
    pub package: String,
    /// Imported symbol; `None` when `local` names the package itself
    pub name: Option<String>,
}

#[derive(Debug, Default)]
struct TypeEntry {
    declaration: Option<(Origin, TypeInfo)>,
    members: Vec<(Origin, MemberInfo)>,
    values: Vec<(Origin, String)>,
    interfaces: Vec<String>,
}

type TypeKey = (String, String);

/// Output of a drained accumulator.
#[derive(Debug, Default)]
pub struct Collected {
    pub namespaces: Vec<NamespaceInfo>,
    /// Imports per namespace, deduplicated
    pub imports: BTreeMap<String, Vec<ImportedName>>,
    /// Members whose owning type was never declared (or is not public)
    pub orphans: usize,
    /// Names re-exported from external packages, recorded by `finalize`
    pub reexports: Vec<ImportedName>,
}

#[derive(Debug, Default)]
pub struct TypeAccumulator {
    types: DashMap<TypeKey, TypeEntry>,
    functions: DashMap<String, Vec<(Origin, MemberInfo)>>,
    imports: DashMap<String, Vec<ImportedName>>,
}

impl TypeAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a type declaration with the members declared inline.
    pub fn declare(&self, namespace: &str, mut ty: TypeInfo, origin: Origin) {
        let members = std::mem::take(&mut ty.members);
        let values = std::mem::take(&mut ty.values);
        let interfaces = std::mem::take(&mut ty.interfaces);

        let mut entry = self
            .types
            .entry((namespace.to_string(), ty.name.clone()))
            .or_default();

        entry
            .members
            .extend(members.into_iter().map(|m| (origin.clone(), m)));
        entry
            .values
            .extend(values.into_iter().map(|v| (origin.clone(), v)));
        for iface in interfaces {
            if !entry.interfaces.contains(&iface) {
                entry.interfaces.push(iface);
            }
        }

        let replace = match &entry.declaration {
            None => true,
            Some((existing, _)) => origin < *existing,
        };
        if replace {
            entry.declaration = Some((origin, ty));
        }
    }

    /// Attach a member declared outside its type's body.
    pub fn add_member(&self, namespace: &str, type_name: &str, member: MemberInfo, origin: Origin) {
        self.types
            .entry((namespace.to_string(), type_name.to_string()))
            .or_default()
            .members
            .push((origin, member));
    }

    /// Attach an enumeration value declared outside its type's body.
    pub fn add_value(&self, namespace: &str, type_name: &str, value: String, origin: Origin) {
        self.types
            .entry((namespace.to_string(), type_name.to_string()))
            .or_default()
            .values
            .push((origin, value));
    }

    pub fn add_function(&self, namespace: &str, function: MemberInfo, origin: Origin) {
        self.functions
            .entry(namespace.to_string())
            .or_default()
            .push((origin, function));
    }

    pub fn add_imports(&self, namespace: &str, imports: impl IntoIterator<Item = ImportedName>) {
        self.imports
            .entry(namespace.to_string())
            .or_default()
            .extend(imports);
    }

    /// Drain into namespaces sorted by name, types and members sorted by
    /// origin.
    pub fn finish(self) -> Collected {
        let mut namespaces: BTreeMap<String, Vec<(Origin, TypeInfo)>> = BTreeMap::new();
        let mut orphans = 0;

        for ((namespace, name), entry) in self.types {
            let Some((origin, mut ty)) = entry.declaration else {
                tracing::debug!(
                    "Dropping {} members of undeclared type {}.{}",
                    entry.members.len(),
                    namespace,
                    name
                );
                orphans += entry.members.len();
                continue;
            };

            let mut members = entry.members;
            members.sort_by(|a, b| a.0.cmp(&b.0));
            ty.members = members.into_iter().map(|(_, m)| m).collect();

            let mut values = entry.values;
            values.sort_by(|a, b| a.0.cmp(&b.0));
            for (_, value) in values {
                if !ty.values.contains(&value) {
                    ty.values.push(value);
                }
            }

            ty.interfaces = entry.interfaces;
            namespaces.entry(namespace).or_default().push((origin, ty));
        }

        let mut functions: BTreeMap<String, Vec<(Origin, MemberInfo)>> =
            self.functions.into_iter().collect();
        for name in functions.keys() {
            namespaces.entry(name.clone()).or_default();
        }

        let namespaces = namespaces
            .into_iter()
            .map(|(name, mut types)| {
                types.sort_by(|a, b| a.0.cmp(&b.0));
                let mut fns = functions.remove(&name).unwrap_or_default();
                fns.sort_by(|a, b| a.0.cmp(&b.0));
                NamespaceInfo {
                    name,
                    types: types.into_iter().map(|(_, t)| t).collect(),
                    functions: fns.into_iter().map(|(_, f)| f).collect(),
                }
            })
            .collect();

        let imports = self
            .imports
            .into_iter()
            .map(|(ns, mut list)| {
                list.sort();
                list.dedup();
                (ns, list)
            })
            .collect();

        Collected {
            namespaces,
            imports,
            orphans,
            reexports: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{MemberKind, TypeKind};
    use rayon::prelude::*;

    fn origin(file: &str, offset: usize) -> Origin {
        Origin::new(&Arc::from(file), offset)
    }

    #[test]
    fn test_members_before_declaration() {
        let acc = TypeAccumulator::new();
        acc.add_member(
            "pkg",
            "Client",
            MemberInfo::new("Close", MemberKind::Method, ""),
            origin("b.go", 10),
        );
        acc.declare(
            "pkg",
            TypeInfo::new("Client", TypeKind::Struct),
            origin("a.go", 5),
        );

        let collected = acc.finish();
        let ty = &collected.namespaces[0].types[0];
        assert_eq!(ty.kind, TypeKind::Struct);
        assert_eq!(ty.members[0].name, "Close");
        assert_eq!(collected.orphans, 0);
    }

    #[test]
    fn test_undeclared_types_are_dropped() {
        let acc = TypeAccumulator::new();
        acc.add_member("pkg", "hidden", MemberInfo::new("Do", MemberKind::Method, ""), origin("a.go", 1));
        let collected = acc.finish();
        assert!(collected.namespaces.is_empty());
        assert_eq!(collected.orphans, 1);
    }

    #[test]
    fn test_earliest_declaration_wins() {
        let acc = TypeAccumulator::new();
        acc.declare("pkg", TypeInfo::new("T", TypeKind::Alias).with_doc("late"), origin("z.go", 0));
        acc.declare("pkg", TypeInfo::new("T", TypeKind::Struct).with_doc("early"), origin("a.go", 0));
        let collected = acc.finish();
        assert_eq!(collected.namespaces[0].types[0].doc.as_deref(), Some("early"));
    }

    #[test]
    fn test_parallel_merge_is_deterministic() {
        let run = || {
            let acc = TypeAccumulator::new();
            (0..64usize).into_par_iter().for_each(|i| {
                let file = format!("f{:02}.go", i);
                if i == 0 {
                    acc.declare("pkg", TypeInfo::new("Big", TypeKind::Struct), origin(&file, 0));
                }
                acc.add_member(
                    "pkg",
                    "Big",
                    MemberInfo::new(format!("M{}", i), MemberKind::Method, ""),
                    origin(&file, 100),
                );
            });
            acc.finish()
        };

        let first = run();
        let second = run();
        let names = |c: &Collected| -> Vec<String> {
            c.namespaces[0].types[0].members.iter().map(|m| m.name.clone()).collect()
        };
        assert_eq!(names(&first).len(), 64);
        assert_eq!(names(&first), names(&second));
        assert_eq!(names(&first)[0], "M0");
    }
}
