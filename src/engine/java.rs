//! Java engine
//!
//! Parents come straight from `extends` / `implements`, so no heuristic
//! classification runs. Nested public types are named `Outer.Inner`.

use super::merge::{Collected, ImportedName, Origin, TypeAccumulator};
use super::source::{FileReport, ProjectInfo, SourceExtractor, SourceFile};
use super::syntax::{self, children_of_kind, field_text, named_children, squash, text};
use super::{EngineContext, GraphEngine, Language, MavenProject, Target};
use crate::crossref::CrossLanguageMap;
use crate::index::{ApiIndex, MemberInfo, MemberKind, ParamInfo, TypeInfo, TypeKind};
use crate::result::EngineResult;
use regex::Regex;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::LazyLock;
use tree_sitter::Node;

const DOC_MAX: usize = 120;

static INLINE_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{@\w+\s+([^}]*)\}").unwrap());
static POM_BLOCKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<(parent|dependencies|dependencyManagement|build|profiles|plugins)>.*?</(parent|dependencies|dependencyManagement|build|profiles|plugins)>").unwrap()
});
static POM_ARTIFACT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<artifactId>\s*([^<]+?)\s*</artifactId>").unwrap());
static POM_VERSION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<version>\s*([^<]+?)\s*</version>").unwrap());
static GRADLE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"rootProject\.name\s*=\s*['"]([^'"]+)['"]"#).unwrap());

/// JDK throwables an SDK commonly extends.
const JDK_THROWABLES: &[&str] = &[
    "Throwable", "Exception", "RuntimeException", "Error",
    "IllegalArgumentException", "IllegalStateException", "NullPointerException",
    "IndexOutOfBoundsException", "ArrayIndexOutOfBoundsException",
    "ClassCastException", "UnsupportedOperationException", "NoSuchElementException",
    "IOException", "FileNotFoundException", "EOFException", "UncheckedIOException",
    "InterruptedException", "TimeoutException", "ExecutionException", "CompletionException",
];
const JDK_THROWABLE_PACKAGES: &[&str] = &["java.lang", "java.io", "java.util", "java.util.concurrent"];

const TYPE_DECLARATIONS: &[&str] = &[
    "class_declaration",
    "interface_declaration",
    "enum_declaration",
    "record_declaration",
    "annotation_type_declaration",
];

/// Extraction rules for Java source trees.
#[derive(Debug, Default, Clone, Copy)]
pub struct JavaExtractor;

#[derive(Debug, Default, Clone, Copy)]
struct Modifiers {
    public: bool,
    protected: bool,
    private: bool,
    is_static: bool,
    deprecated: bool,
}

impl Modifiers {
    fn of(node: Node<'_>, src: &str) -> Self {
        let mut modifiers = Modifiers::default();
        let Some(list) = children_of_kind(node, "modifiers").into_iter().next() else {
            return modifiers;
        };
        let mut cursor = list.walk();
        for child in list.children(&mut cursor) {
            match child.kind() {
                "public" => modifiers.public = true,
                "protected" => modifiers.protected = true,
                "private" => modifiers.private = true,
                "static" => modifiers.is_static = true,
                "marker_annotation" | "annotation" => {
                    let name = field_text(child, "name", src).unwrap_or_default();
                    if name.rsplit('.').next() == Some("Deprecated") {
                        modifiers.deprecated = true;
                    }
                }
                _ => {}
            }
        }
        modifiers
    }

    /// Visible to callers outside the package. `in_interface` members are
    /// public unless marked private.
    fn visible(&self, in_interface: bool) -> bool {
        if in_interface {
            !self.private
        } else {
            self.public || self.protected
        }
    }
}

#[derive(Debug, Default)]
struct Javadoc {
    summary: Option<String>,
    deprecated: Option<String>,
}

fn javadoc(node: Node<'_>, src: &str) -> Javadoc {
    let Some(comment) = node
        .prev_named_sibling()
        .filter(|n| n.kind() == "block_comment" && text(*n, src).starts_with("/**"))
    else {
        return Javadoc::default();
    };

    let raw = text(comment, src);
    let body = raw.trim_start_matches("/**").trim_end_matches("*/");
    let lines: Vec<String> = body
        .lines()
        .map(|l| l.trim().trim_start_matches('*').trim())
        .map(|l| INLINE_TAG.replace_all(l, "$1").into_owned())
        .collect();

    let description: Vec<&str> = lines
        .iter()
        .map(String::as_str)
        .take_while(|l| !l.starts_with('@'))
        .collect();

    let deprecated = lines.iter().position(|l| l.starts_with("@deprecated")).map(|at| {
        let mut parts = vec![lines[at].trim_start_matches("@deprecated").trim()];
        parts.extend(
            lines[at + 1..]
                .iter()
                .take_while(|l| !l.starts_with('@'))
                .map(String::as_str)
                .filter(|l| !l.is_empty()),
        );
        parts.join(" ").trim().to_string()
    });

    Javadoc {
        summary: syntax::summary(&description.join("\n"), DOC_MAX),
        deprecated,
    }
}

fn apply_deprecation(modifiers: &Modifiers, doc: &Javadoc) -> (bool, Option<String>) {
    let deprecated = modifiers.deprecated || doc.deprecated.is_some();
    let message = doc.deprecated.clone().filter(|m| !m.is_empty());
    (deprecated, message)
}

impl SourceExtractor for JavaExtractor {
    type Project = ProjectInfo;

    fn language(&self) -> Language {
        Language::Java
    }

    fn load_project(&self, root: &Path) -> crate::Result<ProjectInfo> {
        let mut package = None;
        let mut version = None;

        let pom = root.join("pom.xml");
        if pom.is_file() {
            let contents = std::fs::read_to_string(&pom)?;
            let own = POM_BLOCKS.replace_all(&contents, "");
            package = POM_ARTIFACT.captures(&own).map(|c| c[1].to_string());
            version = POM_VERSION.captures(&own).map(|c| c[1].to_string());
        }
        if package.is_none() {
            for settings in ["settings.gradle", "settings.gradle.kts"] {
                let path = root.join(settings);
                if path.is_file() {
                    let contents = std::fs::read_to_string(&path)?;
                    package = GRADLE_NAME.captures(&contents).map(|c| c[1].to_string());
                    break;
                }
            }
        }

        let package = package.unwrap_or_else(|| {
            root.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "project".to_string())
        });
        Ok(ProjectInfo {
            root: root.to_path_buf(),
            package,
            version,
        })
    }

    fn includes(&self, rel_path: &str) -> bool {
        let file = rel_path.rsplit('/').next().unwrap_or(rel_path);
        let in_tests = rel_path.starts_with("src/test/") || rel_path.contains("/src/test/");
        !in_tests && file != "package-info.java" && file != "module-info.java"
    }

    fn extract(&self, file: &SourceFile, _project: &ProjectInfo, sink: &TypeAccumulator) -> crate::Result<FileReport> {
        let tree = syntax::parse(&tree_sitter_java::LANGUAGE.into(), &file.content)?;
        let root = tree.root_node();
        let src = file.content.as_str();

        let package = children_of_kind(root, "package_declaration")
            .first()
            .and_then(|decl| named_children(*decl).into_iter().find(|n| matches!(n.kind(), "scoped_identifier" | "identifier")))
            .map(|n| text(n, src).to_string())
            .unwrap_or_default();

        if package.contains(".internal") || package.contains(".implementation") {
            return Ok(FileReport {
                syntax_errors: root.has_error(),
            });
        }

        let mut imports = Vec::new();
        for node in named_children(root) {
            match node.kind() {
                "import_declaration" => {
                    if let Some(import) = import_name(node, src) {
                        imports.push(import);
                    }
                }
                kind if TYPE_DECLARATIONS.contains(&kind) => {
                    let mut declared = Vec::new();
                    type_declaration(node, None, false, src, &mut declared);
                    for (ty, offset) in declared {
                        sink.declare(&package, ty, Origin::new(&file.rel_path, offset));
                    }
                }
                _ => {}
            }
        }
        sink.add_imports(&package, imports);

        Ok(FileReport {
            syntax_errors: root.has_error(),
        })
    }

    /// Entry points are the top-level classes, interfaces and records of the
    /// shallowest package.
    fn finalize(&self, _project: &ProjectInfo, collected: &mut Collected) {
        let depth = |name: &str| if name.is_empty() { 0 } else { name.matches('.').count() + 1 };
        let Some(shallowest) = collected
            .namespaces
            .iter()
            .filter(|ns| !ns.types.is_empty())
            .map(|ns| depth(&ns.name))
            .min()
        else {
            return;
        };

        for ns in collected.namespaces.iter_mut().filter(|ns| depth(&ns.name) == shallowest) {
            for ty in &mut ns.types {
                let top_level = !ty.name.contains('.');
                if top_level && matches!(ty.kind, TypeKind::Class | TypeKind::Interface | TypeKind::Record) {
                    ty.entry_point = true;
                }
            }
        }
    }

    fn parents_are_explicit(&self) -> bool {
        true
    }

    fn external_parent_is_interface(&self, name: &str) -> bool {
        matches!(
            super::classify::bare_name(name),
            "AutoCloseable" | "Closeable" | "Serializable" | "Comparable" | "Iterable" | "Runnable"
                | "Callable" | "Supplier" | "Function" | "Consumer" | "Collection" | "List" | "Map" | "Set"
        )
    }

    fn is_error_root(&self, name: &str) -> bool {
        let (package, bare) = match name.rsplit_once('.') {
            Some((package, bare)) => (Some(package), bare),
            None => (None, name),
        };
        JDK_THROWABLES.contains(&bare) && package.is_none_or(|p| JDK_THROWABLE_PACKAGES.contains(&p))
    }

    fn is_stdlib(&self, package: &str) -> bool {
        ["java.", "javax.", "jdk.", "sun."]
            .iter()
            .any(|prefix| package.starts_with(prefix))
    }
}

/// `import a.b.C;` -> `C` from `a.b`. Static and wildcard imports carry no
/// type name.
fn import_name(node: Node<'_>, src: &str) -> Option<ImportedName> {
    let raw = text(node, src);
    if raw.contains('*') || raw.split_whitespace().nth(1) == Some("static") {
        return None;
    }
    let path = named_children(node)
        .into_iter()
        .find(|n| matches!(n.kind(), "scoped_identifier" | "identifier"))?;
    let path = text(path, src);
    let (package, name) = path.rsplit_once('.')?;
    Some(ImportedName {
        local: name.to_string(),
        package: package.to_string(),
        name: Some(name.to_string()),
    })
}

/// Collect a public type declaration and its public nested types.
fn type_declaration(
    node: Node<'_>,
    outer: Option<&str>,
    in_interface: bool,
    src: &str,
    out: &mut Vec<(TypeInfo, usize)>,
) {
    let modifiers = Modifiers::of(node, src);
    let visible = match outer {
        None => modifiers.public,
        Some(_) => modifiers.visible(in_interface),
    };
    if !visible {
        return;
    }
    let Some(simple) = field_text(node, "name", src) else {
        return;
    };
    let name = match outer {
        Some(outer) => format!("{}.{}", outer, simple),
        None => simple.to_string(),
    };

    let kind = match node.kind() {
        "interface_declaration" => TypeKind::Interface,
        "enum_declaration" => TypeKind::Enum,
        "record_declaration" => TypeKind::Record,
        "annotation_type_declaration" => TypeKind::Annotation,
        _ => TypeKind::Class,
    };
    let is_interface = matches!(kind, TypeKind::Interface | TypeKind::Annotation);

    let mut ty = TypeInfo::new(name.clone(), kind);
    let doc = javadoc(node, src);
    (ty.deprecated, ty.deprecated_message) = apply_deprecation(&modifiers, &doc);
    ty.doc = doc.summary;

    if let Some(superclass) = node.child_by_field_name("superclass") {
        ty.base = named_children(superclass).first().map(|t| squash(text(*t, src)));
    }
    let parent_lists = node
        .child_by_field_name("interfaces")
        .into_iter()
        .chain(children_of_kind(node, "extends_interfaces"));
    for list in parent_lists {
        for types in children_of_kind(list, "type_list") {
            ty.interfaces.extend(named_children(types).into_iter().map(|t| squash(text(t, src))));
        }
    }

    if kind == TypeKind::Record {
        record_components(node, &simple_name(&name), src, &mut ty);
    }

    let mut nested = Vec::new();
    if let Some(body) = node.child_by_field_name("body") {
        let mut members = Vec::new();
        for child in named_children(body) {
            match child.kind() {
                "enum_constant" => {
                    if let Some(value) = field_text(child, "name", src) {
                        ty.values.push(value.to_string());
                    }
                }
                // Enum bodies keep methods and fields in a nested list.
                "enum_body_declarations" => {
                    for inner in named_children(child) {
                        member(inner, simple, is_interface, src, &mut members, &mut nested);
                    }
                }
                _ => member(child, simple, is_interface, src, &mut members, &mut nested),
            }
        }
        ty.members.extend(members);
    }

    out.push((ty, node.start_byte()));
    for node in nested {
        type_declaration(node, Some(&name), is_interface, src, out);
    }
}

fn simple_name(name: &str) -> String {
    name.rsplit('.').next().unwrap_or(name).to_string()
}

fn member<'t>(
    node: Node<'t>,
    type_name: &str,
    in_interface: bool,
    src: &str,
    members: &mut Vec<MemberInfo>,
    nested: &mut Vec<Node<'t>>,
) {
    let kind = node.kind();
    if TYPE_DECLARATIONS.contains(&kind) {
        nested.push(node);
        return;
    }

    let modifiers = Modifiers::of(node, src);
    match kind {
        "constructor_declaration" if modifiers.visible(false) => {
            let mut ctor = callable(node, type_name, MemberKind::Constructor, &modifiers, src);
            ctor.ret = None;
            members.push(ctor);
        }
        "method_declaration" if modifiers.visible(in_interface) => {
            let Some(name) = field_text(node, "name", src) else { return };
            let mut method = callable(node, name, MemberKind::Method, &modifiers, src);
            method.ret = field_text(node, "type", src).map(squash);
            members.push(method);
        }
        "annotation_type_element_declaration" => {
            let Some(name) = field_text(node, "name", src) else { return };
            let mut element = callable(node, name, MemberKind::Method, &modifiers, src);
            element.ret = field_text(node, "type", src).map(squash);
            members.push(element);
        }
        "field_declaration" | "constant_declaration" if modifiers.visible(in_interface) || kind == "constant_declaration" => {
            let Some(type_name) = field_text(node, "type", src).map(squash) else { return };
            let doc = javadoc(node, src);
            let mut cursor = node.walk();
            for declarator in node.children_by_field_name("declarator", &mut cursor) {
                let Some(name) = field_text(declarator, "name", src) else { continue };
                let mut field = MemberInfo::new(name, MemberKind::Field, type_name.clone()).with_ret(type_name.clone());
                field.doc = doc.summary.clone();
                field.is_static = modifiers.is_static || kind == "constant_declaration";
                (field.deprecated, field.deprecated_message) = apply_deprecation(&modifiers, &doc);
                members.push(field);
            }
        }
        _ => {}
    }
}

/// Method or constructor with its parameter list rendered as `Type name`.
fn callable(node: Node<'_>, name: &str, kind: MemberKind, modifiers: &Modifiers, src: &str) -> MemberInfo {
    let mut params = Vec::new();
    let mut rendered = Vec::new();

    if let Some(list) = node.child_by_field_name("parameters") {
        for param in named_children(list) {
            match param.kind() {
                "formal_parameter" => {
                    let (Some(type_name), Some(param_name)) =
                        (field_text(param, "type", src).map(squash), field_text(param, "name", src))
                    else {
                        continue;
                    };
                    rendered.push(format!("{} {}", type_name, param_name));
                    params.push(ParamInfo::new(Some(param_name.to_string()), type_name));
                }
                "spread_parameter" => {
                    let Some(type_node) = named_children(param)
                        .into_iter()
                        .find(|n| !matches!(n.kind(), "modifiers" | "variable_declarator"))
                    else {
                        continue;
                    };
                    let type_name = squash(text(type_node, src));
                    let param_name = children_of_kind(param, "variable_declarator")
                        .first()
                        .and_then(|d| field_text(*d, "name", src))
                        .unwrap_or("args");
                    rendered.push(format!("{}... {}", type_name, param_name));
                    let mut info = ParamInfo::new(Some(param_name.to_string()), type_name);
                    info.variadic = true;
                    params.push(info);
                }
                _ => {}
            }
        }
    }

    let doc = javadoc(node, src);
    let mut member = MemberInfo::new(name, kind, rendered.join(", ")).with_params(params);
    member.is_static = modifiers.is_static;
    (member.deprecated, member.deprecated_message) = apply_deprecation(modifiers, &doc);
    member.doc = doc.summary;
    member
}

/// Record components become accessors plus the canonical constructor.
fn record_components(node: Node<'_>, simple: &str, src: &str, ty: &mut TypeInfo) {
    let Some(list) = node.child_by_field_name("parameters") else {
        return;
    };
    let components: Vec<(String, String)> = children_of_kind(list, "formal_parameter")
        .into_iter()
        .filter_map(|p| Some((field_text(p, "name", src)?.to_string(), squash(field_text(p, "type", src)?))))
        .collect();

    let sig = components
        .iter()
        .map(|(name, type_name)| format!("{} {}", type_name, name))
        .collect::<Vec<_>>()
        .join(", ");
    let params = components
        .iter()
        .map(|(name, type_name)| ParamInfo::new(Some(name.clone()), type_name.clone()))
        .collect();
    ty.members.push(MemberInfo::new(simple, MemberKind::Constructor, sig).with_params(params));

    for (name, type_name) in components {
        ty.members.push(MemberInfo::new(name, MemberKind::Property, type_name.clone()).with_ret(type_name));
    }
}

/// Render an index as Java declarations.
pub fn stubs(index: &ApiIndex) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "// {} - Public API Surface", index.package);

    for ns in &index.namespaces {
        if ns.name.is_empty() {
            out.push('\n');
        } else {
            let _ = writeln!(out, "\npackage {};\n", ns.name);
        }

        for ty in &ns.types {
            if let Some(doc) = &ty.doc {
                let _ = writeln!(out, "/** {} */", doc);
            }
            if ty.deprecated {
                let _ = writeln!(out, "@Deprecated");
            }
            let keyword = match ty.kind {
                TypeKind::Interface => "interface",
                TypeKind::Enum => "enum",
                TypeKind::Record => "record",
                TypeKind::Annotation => "@interface",
                _ => "class",
            };
            let _ = write!(out, "public {} {}", keyword, ty.name);
            if ty.kind == TypeKind::Record {
                let ctor = ty.members.iter().find(|m| m.kind == MemberKind::Constructor);
                let _ = write!(out, "({})", ctor.map(|c| c.sig.as_str()).unwrap_or(""));
            }
            if let Some(base) = &ty.base {
                let _ = write!(out, " extends {}", base);
            }
            if !ty.interfaces.is_empty() {
                let verb = if ty.kind == TypeKind::Interface { "extends" } else { "implements" };
                let _ = write!(out, " {} {}", verb, ty.interfaces.join(", "));
            }
            let _ = writeln!(out, " {{");

            if !ty.values.is_empty() {
                let _ = writeln!(out, "    {};", ty.values.join(", "));
            }
            for member in &ty.members {
                if ty.kind == TypeKind::Record && matches!(member.kind, MemberKind::Property | MemberKind::Constructor) {
                    continue;
                }
                write_member(&mut out, &simple_name(&ty.name), member);
            }
            let _ = writeln!(out, "}}\n");
        }
    }
    out
}

fn write_member(out: &mut String, type_name: &str, member: &MemberInfo) {
    if let Some(doc) = &member.doc {
        let _ = writeln!(out, "    /** {} */", doc);
    }
    if member.deprecated {
        let _ = writeln!(out, "    @Deprecated");
    }
    let modifiers = if member.is_static { "public static " } else { "public " };
    match member.kind {
        MemberKind::Field => {
            let _ = writeln!(out, "    {}{} {};", modifiers, member.sig, member.name);
        }
        MemberKind::Constructor => {
            let _ = writeln!(out, "    public {}({});", type_name, member.sig);
        }
        _ => {
            let ret = member.ret.as_deref().unwrap_or("void");
            let _ = writeln!(out, "    {}{} {}({});", modifiers, ret, member.name, member.sig);
        }
    }
}

/// Java engine: tree-sitter source mode or the external analyzer over
/// compiled classes.
#[derive(Clone, Default)]
pub struct JavaEngine {
    ctx: EngineContext,
    extractor: JavaExtractor,
}

impl JavaEngine {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            ctx,
            extractor: JavaExtractor,
        }
    }
}

impl GraphEngine for JavaEngine {
    type Manifest = MavenProject;

    fn language(&self) -> Language {
        Language::Java
    }

    fn is_available(&self) -> bool {
        super::toolchain_available(&self.ctx, Language::Java)
    }

    fn graph(&self, target: &Target<MavenProject>, map: Option<&CrossLanguageMap>) -> EngineResult<ApiIndex> {
        super::run_target(&self.ctx, &self.extractor, target, map)
    }

    fn to_stubs(&self, index: &ApiIndex) -> String {
        stubs(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::result::EngineFailure;
    use std::fs;

    const POM: &str = r#"<project>
  <parent>
    <groupId>com.example</groupId>
    <artifactId>parent-pom</artifactId>
    <version>9.9.9</version>
  </parent>
  <artifactId>widgets-sdk</artifactId>
  <version>1.4.0</version>
  <dependencies>
    <dependency><artifactId>jackson</artifactId><version>2.0</version></dependency>
  </dependencies>
</project>
"#;

    const CLIENT: &str = r#"package com.example.widgets;

import com.example.widgets.models.Widget;
import com.fasterxml.jackson.databind.ObjectMapper;
import java.util.List;
import java.util.*;
import static java.util.Objects.requireNonNull;

/**
 * Talks to the {@link Widget} service.
 * More detail.
 */
public class WidgetClient extends BaseClient implements AutoCloseable, Pageable {
    public static final int MAX = 10;
    private String endpoint;

    /** Creates a client. */
    public WidgetClient(String endpoint) {}

    WidgetClient() {}

    /** Fetch one widget. */
    public Widget get(String id) { return null; }

    /**
     * Old lookup.
     * @deprecated use {@link #get(String)} instead
     */
    @Deprecated
    public Widget fetch(String id) { return null; }

    public List<Widget> list(String... names) { return null; }

    protected ObjectMapper mapper() { return null; }

    public Builder toBuilder() { return null; }

    private void helper() {}

    public static class Builder {
        public WidgetClient build() { return null; }
    }

    public static class Draft {}

    static class Hidden {}
}

class PackagePrivate {}
"#;

    const PAGEABLE: &str = r#"package com.example.widgets;

public interface Pageable extends Iterable<String> {
    int pageSize();
    private void secret() {}
}
"#;

    const MODELS: &str = r#"package com.example.widgets.models;

/** A widget. */
public record Widget(String name, Color color) {}
"#;

    const COLOR: &str = r#"package com.example.widgets.models;

public enum Color {
    RED, GREEN;

    public String label() { return name(); }
}
"#;

    const ERROR: &str = r#"package com.example.widgets;

public class WidgetException extends RuntimeException {
    public WidgetException(String message) {}
}
"#;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let main = root.join("src/main/java/com/example/widgets");
        fs::create_dir_all(main.join("models")).unwrap();
        fs::create_dir_all(main.join("internal")).unwrap();
        fs::create_dir_all(root.join("src/test/java/com/example/widgets")).unwrap();
        fs::write(root.join("pom.xml"), POM).unwrap();
        fs::write(main.join("WidgetClient.java"), CLIENT).unwrap();
        fs::write(main.join("Pageable.java"), PAGEABLE).unwrap();
        fs::write(main.join("WidgetException.java"), ERROR).unwrap();
        fs::write(main.join("models/Widget.java"), MODELS).unwrap();
        fs::write(main.join("models/Color.java"), COLOR).unwrap();
        fs::write(main.join("package-info.java"), "package com.example.widgets;\n").unwrap();
        fs::write(
            main.join("internal/Impl.java"),
            "package com.example.widgets.internal;\n\npublic class Impl {}\n",
        )
        .unwrap();
        fs::write(
            root.join("src/test/java/com/example/widgets/ClientTest.java"),
            "package com.example.widgets;\n\npublic class ClientTest {}\n",
        )
        .unwrap();
        dir
    }

    fn graph(root: &Path) -> ApiIndex {
        JavaEngine::new(EngineContext::new(EngineConfig::default()))
            .graph(&Target::Source(root.to_path_buf()), None)
            .into_result()
            .unwrap()
    }

    #[test]
    fn test_project_from_pom_skips_parent() {
        let dir = fixture();
        let index = graph(dir.path());
        assert_eq!(index.package, "widgets-sdk");
        assert_eq!(index.version.as_deref(), Some("1.4.0"));
    }

    #[test]
    fn test_visibility_and_entry_points() {
        let dir = fixture();
        let index = graph(dir.path());

        assert!(index.find_type("Impl").is_none());
        assert!(index.find_type("ClientTest").is_none());
        assert!(index.find_type("PackagePrivate").is_none());
        assert!(index.find_type("WidgetClient.Hidden").is_none());

        let client = index.find_type("WidgetClient").unwrap();
        assert!(client.entry_point);
        assert_eq!(client.base.as_deref(), Some("BaseClient"));
        assert_eq!(client.interfaces, vec!["AutoCloseable".to_string(), "Pageable".to_string()]);
        assert_eq!(client.doc.as_deref(), Some("Talks to the Widget service."));

        let builder = index.find_type("WidgetClient.Builder").unwrap();
        assert!(!builder.entry_point);
        assert_eq!(builder.members[0].name, "build");

        assert!(!index.find_type("Widget").unwrap().entry_point);
    }

    #[test]
    fn test_members() {
        let dir = fixture();
        let index = graph(dir.path());
        let client = index.find_type("WidgetClient").unwrap();

        let names: Vec<(&str, MemberKind)> = client.members.iter().map(|m| (m.name.as_str(), m.kind)).collect();
        assert_eq!(
            names,
            vec![
                ("MAX", MemberKind::Field),
                ("WidgetClient", MemberKind::Constructor),
                ("get", MemberKind::Method),
                ("fetch", MemberKind::Method),
                ("list", MemberKind::Method),
                ("mapper", MemberKind::Method),
                ("toBuilder", MemberKind::Method),
            ]
        );
        assert!(client.members[0].is_static);
        assert_eq!(client.members[1].doc.as_deref(), Some("Creates a client."));
        assert_eq!(client.members[2].sig, "String id");
        assert_eq!(client.members[2].ret.as_deref(), Some("Widget"));

        let fetch = &client.members[3];
        assert!(fetch.deprecated);
        assert_eq!(fetch.deprecated_message.as_deref(), Some("use #get(String) instead"));

        let list = &client.members[4];
        assert_eq!(list.sig, "String... names");
        assert!(list.params[0].variadic);

        let pageable = index.find_type("Pageable").unwrap();
        assert_eq!(pageable.kind, TypeKind::Interface);
        let methods: Vec<&str> = pageable.members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(methods, vec!["pageSize"]);
        assert_eq!(pageable.interfaces, vec!["Iterable<String>".to_string()]);
    }

    #[test]
    fn test_records_enums_errors() {
        let dir = fixture();
        let index = graph(dir.path());

        let widget = index.find_type("Widget").unwrap();
        assert_eq!(widget.kind, TypeKind::Record);
        assert_eq!(widget.members[0].kind, MemberKind::Constructor);
        assert_eq!(widget.members[0].sig, "String name, Color color");
        assert_eq!(widget.members[1].name, "name");

        let color = index.find_type("Color").unwrap();
        assert_eq!(color.kind, TypeKind::Enum);
        assert_eq!(color.values, vec!["RED".to_string(), "GREEN".to_string()]);
        assert_eq!(color.members[0].name, "label");

        assert!(index.find_type("WidgetException").unwrap().is_error);
        assert!(!index.find_type("WidgetClient").unwrap().is_error);
    }

    #[test]
    fn test_error_roots_are_jdk_throwables() {
        let extractor = JavaExtractor;
        assert!(extractor.is_error_root("RuntimeException"));
        assert!(extractor.is_error_root("java.io.IOException"));
        assert!(!extractor.is_error_root("com.acme.IOException"));
        assert!(!extractor.is_error_root("ParseError"));
    }

    #[test]
    fn test_prune_keeps_referenced_nested_types() {
        let dir = fixture();
        let index = crate::reachability::prune(&graph(dir.path()));

        assert!(index.find_type("WidgetClient.Builder").is_some());
        assert!(index.find_type("Widget").is_some());
        assert!(index.find_type("WidgetClient.Draft").is_none());
    }

    #[test]
    fn test_dependencies() {
        let dir = fixture();
        let index = graph(dir.path());

        let jackson = index
            .dependencies
            .iter()
            .find(|d| d.package == "com.fasterxml.jackson.databind")
            .unwrap();
        assert!(!jackson.is_stdlib);
        assert_eq!(jackson.types, vec!["ObjectMapper".to_string()]);

        let util = index.dependencies.iter().find(|d| d.package == "java.util").unwrap();
        assert!(util.is_stdlib);
        assert!(index.dependencies.iter().all(|d| d.package != "com.example.widgets.models"));
    }

    #[test]
    fn test_manifest_requires_compiled_classes() {
        let dir = fixture();
        let engine = JavaEngine::default();
        let target = Target::Manifest(MavenProject::new(dir.path().join("pom.xml")));
        match engine.graph(&target, None) {
            EngineResult::Failure(EngineFailure::ArtifactMissing { path, remediation }) => {
                assert!(path.ends_with("target/classes"));
                assert!(remediation.contains("mvn compile"));
            }
            _ => panic!("expected a missing artifact failure"),
        }
    }

    #[test]
    fn test_stubs() {
        let dir = fixture();
        let index = graph(dir.path());
        let stubs = JavaEngine::default().to_stubs(&index);

        assert!(stubs.starts_with("// widgets-sdk - Public API Surface"));
        assert!(stubs.contains("package com.example.widgets;"));
        assert!(stubs.contains("public class WidgetClient extends BaseClient implements AutoCloseable, Pageable {"));
        assert!(stubs.contains("    public WidgetClient(String endpoint);"));
        assert!(stubs.contains("    @Deprecated\n    public Widget fetch(String id);"));
        assert!(stubs.contains("public record Widget(String name, Color color) {"));
        assert!(stubs.contains("public enum Color {\n    RED, GREEN;"));
    }
}
