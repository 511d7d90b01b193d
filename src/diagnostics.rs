//! Diagnostics post-processor
//!
//! A stateless, rule-based pass over a finished [`ApiIndex`]. Findings are
//! keyed by `(id, text, targetType, targetMember)` so re-running the pass or
//! merging diagnostic lists never reports the same finding twice.

use crate::index::{ApiIndex, MemberInfo};
use crate::reachability::identifier_tokens;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

/// Rule ids emitted by this crate.
pub mod rules {
    /// Public type without documentation
    pub const MISSING_DOC: &str = "APG001";
    /// Entry-point type that exposes no operations
    pub const EMPTY_ENTRY_POINT: &str = "APG002";
    /// Operation parameter typed with a deprecated type
    pub const DEPRECATED_PARAMETER: &str = "APG003";
    /// A source file could not be parsed or read
    pub const PARTIAL_EXTRACTION: &str = "APG100";
    /// Toolchain resolution produced a non-fatal warning
    pub const TOOLCHAIN_WARNING: &str = "APG101";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Info,
    Warning,
    Error,
}

impl DiagnosticLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticLevel::Info => "info",
            DiagnosticLevel::Warning => "warning",
            DiagnosticLevel::Error => "error",
        }
    }
}

impl fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A structured finding attached to an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    #[serde(rename = "id")]
    pub id: String,
    #[serde(rename = "text")]
    pub text: String,
    #[serde(rename = "level")]
    pub level: DiagnosticLevel,
    #[serde(rename = "targetType", default, skip_serializing_if = "Option::is_none")]
    pub target_type: Option<String>,
    #[serde(rename = "targetMember", default, skip_serializing_if = "Option::is_none")]
    pub target_member: Option<String>,
}

impl Diagnostic {
    pub fn new(id: impl Into<String>, level: DiagnosticLevel, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            level,
            target_type: None,
            target_member: None,
        }
    }

    pub fn info(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, DiagnosticLevel::Info, text)
    }

    pub fn warning(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, DiagnosticLevel::Warning, text)
    }

    pub fn on_type(mut self, type_name: impl Into<String>) -> Self {
        self.target_type = Some(type_name.into());
        self
    }

    pub fn on_member(mut self, member: impl Into<String>) -> Self {
        self.target_member = Some(member.into());
        self
    }

    /// Identity used for deduplication
    pub fn key(&self) -> (&str, &str, Option<&str>, Option<&str>) {
        (
            &self.id,
            &self.text,
            self.target_type.as_deref(),
            self.target_member.as_deref(),
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.level, self.id, self.text)
    }
}

/// Merge diagnostic lists, keeping first occurrences in order.
pub fn merge(lists: impl IntoIterator<Item = Vec<Diagnostic>>) -> Vec<Diagnostic> {
    let mut merged: Vec<Diagnostic> = Vec::new();
    let mut seen: HashSet<(String, String, Option<String>, Option<String>)> = HashSet::new();

    for diagnostic in lists.into_iter().flatten() {
        let key = (
            diagnostic.id.clone(),
            diagnostic.text.clone(),
            diagnostic.target_type.clone(),
            diagnostic.target_member.clone(),
        );
        if seen.insert(key) {
            merged.push(diagnostic);
        }
    }

    merged
}

/// Run every rule over the index.
pub fn analyze(index: &ApiIndex) -> Vec<Diagnostic> {
    let mut found = Vec::new();
    missing_documentation(index, &mut found);
    empty_entry_points(index, &mut found);
    deprecated_parameters(index, &mut found);
    merge([found])
}

/// Return a copy of `index` whose diagnostics include this pass's findings.
pub fn apply(index: &ApiIndex) -> ApiIndex {
    let mut out = index.clone();
    out.diagnostics = merge([index.diagnostics.clone(), analyze(index)]);
    out
}

fn missing_documentation(index: &ApiIndex, out: &mut Vec<Diagnostic>) {
    for (_, ty) in index.types() {
        let undocumented = ty.doc.as_deref().is_none_or(|d| d.trim().is_empty());
        if undocumented {
            out.push(
                Diagnostic::info(
                    rules::MISSING_DOC,
                    format!("Public type `{}` has no documentation", ty.name),
                )
                .on_type(&ty.name),
            );
        }
    }
}

fn empty_entry_points(index: &ApiIndex, out: &mut Vec<Diagnostic>) {
    for (_, ty) in index.types() {
        if ty.entry_point && !ty.has_callables() {
            out.push(
                Diagnostic::warning(
                    rules::EMPTY_ENTRY_POINT,
                    format!(
                        "Entry point `{}` exposes no operations; it may be misclassified",
                        ty.name
                    ),
                )
                .on_type(&ty.name),
            );
        }
    }
}

fn deprecated_parameters(index: &ApiIndex, out: &mut Vec<Diagnostic>) {
    let deprecated: BTreeSet<&str> = index
        .types()
        .filter(|(_, t)| t.deprecated)
        .map(|(_, t)| t.name.as_str())
        .collect();
    if deprecated.is_empty() {
        return;
    }

    let mut check = |owner: Option<&str>, member: &MemberInfo| {
        if !member.kind.is_callable() {
            return;
        }
        for param in &member.params {
            let hit = identifier_tokens(&param.type_name).find(|tok| deprecated.contains(tok));
            let Some(hit) = hit else { continue };
            if owner == Some(hit) {
                continue;
            }
            let param_name = param.name.as_deref().unwrap_or("_");
            let qualified = match owner {
                Some(owner) => format!("{}.{}", owner, member.name),
                None => member.name.clone(),
            };
            let mut diagnostic = Diagnostic::warning(
                rules::DEPRECATED_PARAMETER,
                format!(
                    "Parameter `{}` of `{}` uses deprecated type `{}`",
                    param_name, qualified, hit
                ),
            )
            .on_member(&member.name);
            if let Some(owner) = owner {
                diagnostic = diagnostic.on_type(owner);
            }
            out.push(diagnostic);
        }
    };

    for ns in &index.namespaces {
        for ty in &ns.types {
            for member in &ty.members {
                check(Some(&ty.name), member);
            }
        }
        for function in &ns.functions {
            check(None, function);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{MemberKind, NamespaceInfo, ParamInfo, TypeInfo, TypeKind};

    fn sample_index() -> ApiIndex {
        let mut legacy = TypeInfo::new("LegacyOptions", TypeKind::Class).with_doc("Old options");
        legacy.deprecated = true;

        let client = TypeInfo::new("Client", TypeKind::Class)
            .as_entry_point()
            .with_member(
                MemberInfo::new("configure", MemberKind::Method, "opts: list[LegacyOptions]")
                    .with_params(vec![ParamInfo::new(
                        Some("opts".into()),
                        "list[LegacyOptions]",
                    )]),
            );

        let empty = TypeInfo::new("Facade", TypeKind::Class)
            .as_entry_point()
            .with_doc("Nothing here");

        ApiIndex::new("sdk").with_namespace(
            NamespaceInfo::new("sdk")
                .with_type(client)
                .with_type(legacy)
                .with_type(empty),
        )
    }

    #[test]
    fn test_rules_fire() {
        let found = analyze(&sample_index());
        let ids: Vec<&str> = found.iter().map(|d| d.id.as_str()).collect();

        assert!(ids.contains(&rules::MISSING_DOC));
        assert!(ids.contains(&rules::EMPTY_ENTRY_POINT));
        assert!(ids.contains(&rules::DEPRECATED_PARAMETER));

        let deprecated = found
            .iter()
            .find(|d| d.id == rules::DEPRECATED_PARAMETER)
            .unwrap();
        assert_eq!(deprecated.target_type.as_deref(), Some("Client"));
        assert_eq!(deprecated.target_member.as_deref(), Some("configure"));
        assert_eq!(deprecated.level, DiagnosticLevel::Warning);
    }

    #[test]
    fn test_missing_doc_only_for_undocumented() {
        let found = analyze(&sample_index());
        let missing: Vec<_> = found
            .iter()
            .filter(|d| d.id == rules::MISSING_DOC)
            .map(|d| d.target_type.clone().unwrap())
            .collect();
        assert_eq!(missing, vec!["Client".to_string()]);
    }

    #[test]
    fn test_apply_twice_never_duplicates() {
        let once = apply(&sample_index());
        let twice = apply(&once);
        assert_eq!(once.diagnostics, twice.diagnostics);

        let mut keys = HashSet::new();
        for d in &twice.diagnostics {
            assert!(keys.insert(d.key()), "duplicate diagnostic {}", d);
        }
    }

    #[test]
    fn test_merge_overlapping_lists() {
        let a = vec![
            Diagnostic::info("X", "one").on_type("A"),
            Diagnostic::info("X", "two"),
        ];
        let b = vec![
            Diagnostic::info("X", "one").on_type("A"),
            Diagnostic::info("X", "one").on_type("B"),
        ];
        let merged = merge([a, b]);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].target_type.as_deref(), Some("A"));
    }
}
