//! Go engine
//!
//! Namespaces are import paths: the module path from `go.mod` joined with the
//! package directory. Methods may live in any file of the package; the
//! accumulator merges them onto their receiver type.

use super::merge::{Collected, ImportedName, Origin, TypeAccumulator};
use super::source::{FileReport, ProjectInfo, SourceExtractor, SourceFile};
use super::syntax::{self, children_of_kind, field_text, leading_comments, named_children, squash, text};
use super::{EngineContext, GoModule, GraphEngine, Language, Target};
use crate::crossref::CrossLanguageMap;
use crate::index::{ApiIndex, MemberInfo, MemberKind, ParamInfo, ResultInfo, TypeInfo, TypeKind};
use crate::result::EngineResult;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::Path;
use tree_sitter::Node;

const DOC_MAX: usize = 120;
const DEPRECATED_PREFIX: &str = "Deprecated:";

/// Extraction rules for Go modules.
#[derive(Debug, Default, Clone, Copy)]
pub struct GoExtractor;

fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

/// Receiver or result type without pointer and type arguments.
fn type_base(text: &str) -> &str {
    let text = text.trim().trim_start_matches('*');
    text.split('[').next().unwrap_or(text).trim()
}

/// Doc text of a declaration plus its deprecation message, if any.
struct GoDoc {
    summary: Option<String>,
    deprecated: Option<String>,
}

fn go_doc(node: Node<'_>, fallback: Option<Node<'_>>, src: &str) -> GoDoc {
    let mut lines = leading_comments(node, src, "comment", "//");
    if lines.is_empty() {
        if let Some(outer) = fallback {
            lines = leading_comments(outer, src, "comment", "//");
        }
    }
    // Block comments are not doc comments.
    lines.retain(|l| !l.starts_with("/*"));

    let deprecated = lines.iter().position(|l| l.starts_with(DEPRECATED_PREFIX)).map(|at| {
        lines[at..]
            .iter()
            .take_while(|l| !l.is_empty())
            .map(|l| l.trim_start_matches(DEPRECATED_PREFIX).trim())
            .collect::<Vec<_>>()
            .join(" ")
    });

    GoDoc {
        summary: syntax::summary(&lines.join("\n"), DOC_MAX),
        deprecated,
    }
}

impl GoDoc {
    fn apply_to_member(self, member: &mut MemberInfo) {
        member.doc = self.summary;
        if let Some(message) = self.deprecated {
            member.deprecated = true;
            member.deprecated_message = Some(message).filter(|m| !m.is_empty());
        }
    }

    fn apply_to_type(self, ty: &mut TypeInfo) {
        ty.doc = self.summary;
        if let Some(message) = self.deprecated {
            ty.deprecated = true;
            ty.deprecated_message = Some(message).filter(|m| !m.is_empty());
        }
    }
}

impl SourceExtractor for GoExtractor {
    type Project = ProjectInfo;

    fn language(&self) -> Language {
        Language::Go
    }

    fn load_project(&self, root: &Path) -> crate::Result<ProjectInfo> {
        let go_mod = root.join("go.mod");
        let module = if go_mod.is_file() {
            std::fs::read_to_string(&go_mod)?
                .lines()
                .find_map(|line| line.trim().strip_prefix("module "))
                .map(|m| m.trim().trim_matches('"').to_string())
        } else {
            None
        };
        let package = module.unwrap_or_else(|| {
            root.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "module".to_string())
        });
        Ok(ProjectInfo {
            root: root.to_path_buf(),
            package,
            version: None,
        })
    }

    fn includes(&self, rel_path: &str) -> bool {
        !rel_path.ends_with("_test.go")
    }

    fn skips_dir(&self, name: &str) -> bool {
        matches!(name, "vendor" | "testdata" | "internal" | "examples")
            || name.starts_with('.')
            || name.starts_with('_')
    }

    fn extract(&self, file: &SourceFile, project: &ProjectInfo, sink: &TypeAccumulator) -> crate::Result<FileReport> {
        let tree = syntax::parse(&tree_sitter_go::LANGUAGE.into(), &file.content)?;
        let root = tree.root_node();
        let src = file.content.as_str();

        // `package foo_test` files are external tests.
        let package_clause = children_of_kind(root, "package_clause");
        let is_external_test = package_clause
            .first()
            .and_then(|c| c.named_child(0))
            .is_some_and(|n| text(n, src).ends_with("_test"));
        if is_external_test {
            return Ok(FileReport::default());
        }

        let namespace = match file.rel_dir() {
            "" => project.package.clone(),
            dir => format!("{}/{}", project.package, dir),
        };
        let origin = |node: Node<'_>| Origin::new(&file.rel_path, node.start_byte());

        let mut imports = Vec::new();
        for node in named_children(root) {
            match node.kind() {
                "import_declaration" => collect_imports(node, src, &project.package, &mut imports),
                "type_declaration" => {
                    for spec in named_children(node) {
                        if !matches!(spec.kind(), "type_spec" | "type_alias") {
                            continue;
                        }
                        if let Some(ty) = type_info(spec, node, src) {
                            sink.declare(&namespace, ty, origin(spec));
                        }
                    }
                }
                "function_declaration" => {
                    let Some(name) = field_text(node, "name", src) else { continue };
                    if !is_exported(name) {
                        continue;
                    }
                    let mut function = callable(node, name, src);
                    go_doc(node, None, src).apply_to_member(&mut function);
                    sink.add_function(&namespace, function, origin(node));
                }
                "method_declaration" => {
                    let Some(name) = field_text(node, "name", src) else { continue };
                    let Some(receiver) = receiver_type(node, src) else { continue };
                    if !is_exported(name) || !is_exported(receiver) {
                        continue;
                    }
                    let mut method = callable(node, name, src);
                    go_doc(node, None, src).apply_to_member(&mut method);
                    sink.add_member(&namespace, receiver, method, origin(node));
                }
                "const_declaration" => {
                    let mut current_type: Option<String> = None;
                    for spec in children_of_kind(node, "const_spec") {
                        // Specs without type and value repeat the previous one.
                        match (field_text(spec, "type", src), spec.child_by_field_name("value")) {
                            (Some(ty), _) => current_type = Some(squash(ty)),
                            (None, Some(_)) => current_type = None,
                            (None, None) => {}
                        }
                        let Some(type_name) = current_type.as_deref() else { continue };
                        let mut cursor = spec.walk();
                        for ident in spec.children_by_field_name("name", &mut cursor) {
                            let value = text(ident, src);
                            if is_exported(value) {
                                sink.add_value(&namespace, type_name, value.to_string(), origin(ident));
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        sink.add_imports(&namespace, imports);

        Ok(FileReport {
            syntax_errors: root.has_error(),
        })
    }

    fn finalize(&self, project: &ProjectInfo, collected: &mut Collected) {
        for ns in &mut collected.namespaces {
            let is_root = ns.name == project.package;

            for ty in &mut ns.types {
                if ty.kind == TypeKind::Alias && !ty.values.is_empty() {
                    ty.kind = TypeKind::Enum;
                }
                if is_root {
                    ty.entry_point = true;
                }
            }

            // `NewX` returning X or *X belongs to X.
            let local: HashSet<String> = ns.types.iter().map(|t| t.name.clone()).collect();
            let (constructors, functions): (Vec<_>, Vec<_>) = std::mem::take(&mut ns.functions)
                .into_iter()
                .partition(|f| constructed_type(f, &local).is_some());
            ns.functions = functions;
            for mut ctor in constructors {
                let Some(owner) = constructed_type(&ctor, &local).map(str::to_string) else {
                    continue;
                };
                ctor.kind = MemberKind::Constructor;
                ctor.is_static = true;
                if let Some(ty) = ns.types.iter_mut().find(|t| t.name == owner) {
                    // Constructors lead the member list.
                    let at = ty.members.iter().take_while(|m| m.kind == MemberKind::Constructor).count();
                    ty.members.insert(at, ctor);
                }
            }
        }
    }

    fn external_parent_is_interface(&self, name: &str) -> bool {
        // Embedded standard interfaces are the common case.
        matches!(
            name,
            "error" | "io.Reader" | "io.Writer" | "io.Closer" | "io.ReadCloser" | "io.WriteCloser"
                | "io.ReadWriter" | "fmt.Stringer" | "context.Context" | "sort.Interface"
        )
    }

    fn is_error_root(&self, name: &str) -> bool {
        name == "error"
    }

    /// Anything with `Error() string` satisfies `error`.
    fn is_error_type(&self, ty: &TypeInfo) -> bool {
        ty.members
            .iter()
            .any(|m| m.name == "Error" && m.params.is_empty() && m.ret.as_deref() == Some("string"))
    }

    fn is_stdlib(&self, package: &str) -> bool {
        !package.split('/').next().unwrap_or(package).contains('.')
    }
}

fn constructed_type<'a>(function: &MemberInfo, local: &'a HashSet<String>) -> Option<&'a str> {
    if !function.name.starts_with("New") {
        return None;
    }
    let first = function.results.first()?;
    local.get(type_base(&first.type_name)).map(String::as_str)
}

fn collect_imports(node: Node<'_>, src: &str, module: &str, out: &mut Vec<ImportedName>) {
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if current.kind() != "import_spec" {
            stack.extend(named_children(current));
            continue;
        }
        let Some(path) = field_text(current, "path", src).map(|p| p.trim_matches(|c| c == '"' || c == '`')) else {
            continue;
        };
        if path == module || path.starts_with(&format!("{}/", module)) {
            continue;
        }
        let local = match field_text(current, "name", src) {
            Some("_") | Some(".") => continue,
            Some(alias) => alias.to_string(),
            None => path.rsplit('/').next().unwrap_or(path).to_string(),
        };
        out.push(ImportedName {
            local,
            package: path.to_string(),
            name: None,
        });
    }
}

fn receiver_type<'a>(method: Node<'_>, src: &'a str) -> Option<&'a str> {
    let receiver = method.child_by_field_name("receiver")?;
    let declaration = children_of_kind(receiver, "parameter_declaration").into_iter().next()?;
    field_text(declaration, "type", src).map(type_base)
}

fn type_info(spec: Node<'_>, declaration: Node<'_>, src: &str) -> Option<TypeInfo> {
    let name = field_text(spec, "name", src)?;
    if !is_exported(name) {
        return None;
    }
    let body = spec.child_by_field_name("type")?;

    let mut ty = if spec.kind() == "type_alias" {
        let mut ty = TypeInfo::new(name, TypeKind::Alias);
        ty.alias_of = Some(squash(text(body, src)));
        ty
    } else {
        match body.kind() {
            "struct_type" => struct_info(name, body, src),
            "interface_type" => interface_info(name, body, src),
            "function_type" => {
                let mut ty = TypeInfo::new(name, TypeKind::Delegate);
                ty.members.push(callable(body, "Invoke", src));
                ty
            }
            _ => {
                let mut ty = TypeInfo::new(name, TypeKind::Alias);
                ty.alias_of = Some(squash(text(body, src)));
                ty
            }
        }
    };

    go_doc(spec, Some(declaration), src).apply_to_type(&mut ty);
    Some(ty)
}

fn struct_info(name: &str, body: Node<'_>, src: &str) -> TypeInfo {
    let mut ty = TypeInfo::new(name, TypeKind::Struct);
    let mut parents = Vec::new();

    for list in children_of_kind(body, "field_declaration_list") {
        for field in children_of_kind(list, "field_declaration") {
            let Some(type_text) = field_text(field, "type", src).map(squash) else {
                continue;
            };
            let mut cursor = field.walk();
            let names: Vec<&str> = field
                .children_by_field_name("name", &mut cursor)
                .map(|n| text(n, src))
                .collect();

            if names.is_empty() {
                // Embedded: promotes the embedded type's surface.
                let embedded = type_base(&type_text);
                let short = embedded.rsplit('.').next().unwrap_or(embedded);
                if is_exported(short) {
                    parents.push(embedded.to_string());
                }
                continue;
            }
            for field_name in names.into_iter().filter(|n| is_exported(n)) {
                let mut member = MemberInfo::new(field_name, MemberKind::Field, type_text.clone()).with_ret(type_text.clone());
                go_doc(field, None, src).apply_to_member(&mut member);
                ty.members.push(member);
            }
        }
    }

    ty.interfaces = parents;
    ty
}

fn interface_info(name: &str, body: Node<'_>, src: &str) -> TypeInfo {
    let mut ty = TypeInfo::new(name, TypeKind::Interface);

    for element in named_children(body) {
        match element.kind() {
            "method_elem" | "method_spec" => {
                let Some(method_name) = field_text(element, "name", src) else { continue };
                if !is_exported(method_name) {
                    continue;
                }
                let mut method = callable(element, method_name, src);
                go_doc(element, None, src).apply_to_member(&mut method);
                ty.members.push(method);
            }
            "type_elem" | "constraint_elem" => {
                for embedded in named_children(element) {
                    let embedded = squash(text(embedded, src));
                    if embedded.starts_with('~') {
                        continue;
                    }
                    ty.interfaces.push(embedded);
                }
            }
            _ => {}
        }
    }
    ty
}

/// Member for anything with `parameters` and `result` fields.
fn callable(node: Node<'_>, name: &str, src: &str) -> MemberInfo {
    let mut params = Vec::new();
    let mut rendered = Vec::new();
    if let Some(list) = node.child_by_field_name("parameters") {
        for (names, type_name, variadic) in parameter_groups(list, src) {
            let shown_type = if variadic { format!("...{}", type_name) } else { type_name.clone() };
            if names.is_empty() {
                rendered.push(shown_type);
                params.push(ParamInfo {
                    name: None,
                    type_name,
                    variadic,
                    optional: false,
                });
                continue;
            }
            for param_name in names {
                rendered.push(format!("{} {}", param_name, shown_type));
                params.push(ParamInfo {
                    name: Some(param_name),
                    type_name: type_name.clone(),
                    variadic,
                    optional: false,
                });
            }
        }
    }

    let mut results = Vec::new();
    if let Some(result) = node.child_by_field_name("result") {
        if result.kind() == "parameter_list" {
            for (names, type_name, _) in parameter_groups(result, src) {
                if names.is_empty() {
                    results.push(ResultInfo { name: None, type_name });
                } else {
                    results.extend(names.into_iter().map(|n| ResultInfo {
                        name: Some(n),
                        type_name: type_name.clone(),
                    }));
                }
            }
        } else {
            results.push(ResultInfo {
                name: None,
                type_name: squash(text(result, src)),
            });
        }
    }

    let ret = match results.as_slice() {
        [] => None,
        [single] => Some(single.type_name.clone()),
        many => Some(format!(
            "({})",
            many.iter().map(|r| r.type_name.as_str()).collect::<Vec<_>>().join(", ")
        )),
    };

    let mut member = MemberInfo::new(name, MemberKind::Method, rendered.join(", ")).with_params(params);
    member.ret = ret;
    member.results = results;
    member
}

/// `(names, type, variadic)` per declaration in a parameter list.
fn parameter_groups(list: Node<'_>, src: &str) -> Vec<(Vec<String>, String, bool)> {
    named_children(list)
        .into_iter()
        .filter(|p| matches!(p.kind(), "parameter_declaration" | "variadic_parameter_declaration"))
        .filter_map(|p| {
            let type_name = squash(field_text(p, "type", src)?);
            let mut cursor = p.walk();
            let names = p
                .children_by_field_name("name", &mut cursor)
                .map(|n| text(n, src).to_string())
                .collect();
            Some((names, type_name, p.kind() == "variadic_parameter_declaration"))
        })
        .collect()
}

/// Render an index as Go declarations.
pub fn stubs(index: &ApiIndex) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "// {} - Public API Surface", index.package);

    for ns in &index.namespaces {
        let _ = writeln!(out, "\n// Package: {}\n", ns.name);

        for ty in &ns.types {
            doc_line(&mut out, "", ty.doc.as_deref(), ty.deprecated_message.as_deref().or(ty.deprecated.then_some("")));
            match ty.kind {
                TypeKind::Interface => {
                    let _ = writeln!(out, "type {} interface {{", ty.name);
                    for embedded in &ty.interfaces {
                        let _ = writeln!(out, "    {}", embedded);
                    }
                    for method in &ty.members {
                        let _ = writeln!(out, "    {}({}){}", method.name, method.sig, ret_suffix(method));
                    }
                    let _ = writeln!(out, "}}");
                }
                TypeKind::Struct => {
                    let _ = writeln!(out, "type {} struct {{", ty.name);
                    for embedded in ty.base.iter().chain(&ty.interfaces) {
                        let _ = writeln!(out, "    {}", embedded);
                    }
                    for field in ty.members.iter().filter(|m| m.kind == MemberKind::Field) {
                        let _ = writeln!(out, "    {} {}", field.name, field.sig);
                    }
                    let _ = writeln!(out, "}}");
                }
                TypeKind::Delegate => {
                    let signature = ty.members.first().map(|m| format!("func({}){}", m.sig, ret_suffix(m)));
                    let _ = writeln!(out, "type {} {}", ty.name, signature.unwrap_or_else(|| "func()".to_string()));
                }
                _ => {
                    let underlying = ty.alias_of.as_deref().unwrap_or("any");
                    let _ = writeln!(out, "type {} {}", ty.name, underlying);
                }
            }

            if !ty.values.is_empty() {
                let _ = writeln!(out, "const (");
                for value in &ty.values {
                    let _ = writeln!(out, "    {} {} = ...", value, ty.name);
                }
                let _ = writeln!(out, ")");
            }

            if matches!(ty.kind, TypeKind::Interface | TypeKind::Delegate) {
                out.push('\n');
                continue;
            }
            for member in ty.members.iter().filter(|m| m.kind.is_callable()) {
                doc_line(&mut out, "", member.doc.as_deref(), None);
                if member.kind == MemberKind::Constructor {
                    let _ = writeln!(out, "func {}({}){}", member.name, member.sig, ret_suffix(member));
                } else {
                    let _ = writeln!(out, "func ({}) {}({}){}", ty.name, member.name, member.sig, ret_suffix(member));
                }
            }
            out.push('\n');
        }

        for function in &ns.functions {
            doc_line(&mut out, "", function.doc.as_deref(), None);
            let _ = writeln!(out, "func {}({}){}", function.name, function.sig, ret_suffix(function));
        }
    }
    out
}

fn ret_suffix(member: &MemberInfo) -> String {
    member.ret.as_deref().map(|r| format!(" {}", r)).unwrap_or_default()
}

fn doc_line(out: &mut String, indent: &str, doc: Option<&str>, deprecated: Option<&str>) {
    if let Some(doc) = doc {
        let _ = writeln!(out, "{}// {}", indent, doc);
    }
    if let Some(message) = deprecated {
        let _ = writeln!(out, "{}// Deprecated: {}", indent, message);
    }
}

/// Go engine: tree-sitter source mode or the external analyzer.
#[derive(Clone, Default)]
pub struct GoEngine {
    ctx: EngineContext,
    extractor: GoExtractor,
}

impl GoEngine {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            ctx,
            extractor: GoExtractor,
        }
    }
}

impl GraphEngine for GoEngine {
    type Manifest = GoModule;

    fn language(&self) -> Language {
        Language::Go
    }

    fn is_available(&self) -> bool {
        super::toolchain_available(&self.ctx, Language::Go)
    }

    fn graph(&self, target: &Target<GoModule>, map: Option<&CrossLanguageMap>) -> EngineResult<ApiIndex> {
        super::run_target(&self.ctx, &self.extractor, target, map)
    }

    fn to_stubs(&self, index: &ApiIndex) -> String {
        stubs(index)
    }
}
