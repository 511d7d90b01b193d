//! Cross-language identity mapping.
//!
//! A mapping file ties local type and member ids to canonical ids shared by
//! every language flavour of the same package:
//!
//! ```json
//! { "packageId": "widgets", "ids": { "widgets.WidgetClient": "Widgets.Client" } }
//! ```

use crate::index::ApiIndex;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossLanguageMap {
    #[serde(rename = "packageId", default, skip_serializing_if = "Option::is_none")]
    pub package_id: Option<String>,
    #[serde(rename = "ids", default)]
    pub ids: BTreeMap<String, String>,
}

impl CrossLanguageMap {
    pub fn new(package_id: impl Into<String>) -> Self {
        Self {
            package_id: Some(package_id.into()),
            ids: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, local: impl Into<String>, canonical: impl Into<String>) -> Self {
        self.ids.insert(local.into(), canonical.into());
        self
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn lookup(&self, local_id: &str) -> Option<&str> {
        self.ids.get(local_id).map(String::as_str)
    }

    /// Return a copy of `index` with cross-language ids attached.
    ///
    /// Only fills fields; nothing else in the index changes. A type or member
    /// without an id is looked up by its qualified name.
    pub fn attach(&self, index: &ApiIndex) -> ApiIndex {
        let mut out = index.clone();
        if let Some(package_id) = &self.package_id {
            out.cross_language_package_id = Some(package_id.clone());
        }

        let mut attached = 0usize;
        for ns in &mut out.namespaces {
            for ty in &mut ns.types {
                let type_key = ty.id.clone().unwrap_or_else(|| qualify(&ns.name, &ty.name));
                if let Some(canonical) = self.lookup(&type_key) {
                    ty.cross_language_id = Some(canonical.to_string());
                    attached += 1;
                }
                for member in &mut ty.members {
                    let key = member
                        .id
                        .clone()
                        .unwrap_or_else(|| format!("{}.{}", type_key, member.name));
                    if let Some(canonical) = self.lookup(&key) {
                        member.cross_language_id = Some(canonical.to_string());
                        attached += 1;
                    }
                }
            }
            for function in &mut ns.functions {
                let key = function
                    .id
                    .clone()
                    .unwrap_or_else(|| qualify(&ns.name, &function.name));
                if let Some(canonical) = self.lookup(&key) {
                    function.cross_language_id = Some(canonical.to_string());
                    attached += 1;
                }
            }
        }

        tracing::debug!("Attached {} cross-language ids", attached);
        out
    }
}

fn qualify(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", namespace, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{MemberInfo, MemberKind, NamespaceInfo, TypeInfo, TypeKind};

    fn sample() -> ApiIndex {
        let mut client = TypeInfo::new("WidgetClient", TypeKind::Class)
            .with_member(MemberInfo::new("list", MemberKind::Method, ""));
        client.id = Some("widgets.WidgetClient".into());
        client.members[0].id = Some("widgets.WidgetClient.list()".into());
        ApiIndex::new("widgets").with_namespace(
            NamespaceInfo::new("widgets")
                .with_type(client)
                .with_type(TypeInfo::new("Widget", TypeKind::Class)),
        )
    }

    #[test]
    fn test_attach_is_additive() {
        let map = CrossLanguageMap::new("Widgets")
            .with_id("widgets.WidgetClient", "Widgets.Client")
            .with_id("widgets.WidgetClient.list()", "Widgets.Client.List")
            .with_id("widgets.Widget", "Widgets.Widget");

        let index = sample();
        let attached = map.attach(&index);

        assert_eq!(attached.cross_language_package_id.as_deref(), Some("Widgets"));
        let client = attached.find_type("WidgetClient").unwrap();
        assert_eq!(client.cross_language_id.as_deref(), Some("Widgets.Client"));
        assert_eq!(client.members[0].cross_language_id.as_deref(), Some("Widgets.Client.List"));
        assert_eq!(
            attached.find_type("Widget").unwrap().cross_language_id.as_deref(),
            Some("Widgets.Widget")
        );

        // Clearing the attached fields gives back the input.
        let mut stripped = attached.clone();
        stripped.cross_language_package_id = None;
        for ns in &mut stripped.namespaces {
            for ty in &mut ns.types {
                ty.cross_language_id = None;
                for m in &mut ty.members {
                    m.cross_language_id = None;
                }
            }
        }
        assert_eq!(stripped, index);
        assert!(index.cross_language_package_id.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.json");
        std::fs::write(&path, r#"{"packageId": "p", "ids": {"a.B": "P.B"}}"#).unwrap();
        let map = CrossLanguageMap::load(&path).unwrap();
        assert_eq!(map.package_id.as_deref(), Some("p"));
        assert_eq!(map.lookup("a.B"), Some("P.B"));
    }
}
