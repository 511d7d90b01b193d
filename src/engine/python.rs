//! Python engine
//!
//! Source mode walks each module with tree-sitter-python. Only module-level
//! classes and functions are considered; nested definitions are
//! implementation detail.

use super::classify::bare_name;
use super::merge::{Collected, ImportedName, Origin, TypeAccumulator};
use super::source::{FileReport, ProjectInfo, SourceExtractor, SourceFile};
use super::syntax::{self, field_text, named_children, squash, text};
use super::{EngineContext, GraphEngine, Language, PyProject, Target};
use crate::crossref::CrossLanguageMap;
use crate::index::{ApiIndex, MemberInfo, MemberKind, ParamInfo, TypeInfo, TypeKind};
use crate::result::EngineResult;
use crate::skip::SkipFilter;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tree_sitter::Node;

/// Docstring summaries keep 150 characters before the ellipsis.
const DOC_MAX: usize = 153;

const ENUM_BASES: &[&str] = &["Enum", "IntEnum", "StrEnum", "Flag", "IntFlag"];
const RECORD_BASES: &[&str] = &["NamedTuple", "TypedDict"];
const INTERFACE_PARENTS: &[&str] = &[
    "Protocol", "ABC", "Generic", "Iterable", "Iterator", "Mapping", "MutableMapping",
    "Sequence", "MutableSequence", "Collection", "Container", "Callable", "Awaitable",
    "AsyncIterator", "AsyncIterable", "ContextManager", "AsyncContextManager", "Hashable",
    "Sized",
];
/// Builtin exception classes. A class is an error when its hierarchy
/// reaches one of these.
const BUILTIN_EXCEPTIONS: &[&str] = &[
    "BaseException", "BaseExceptionGroup", "Exception", "ExceptionGroup", "ArithmeticError",
    "AssertionError", "AttributeError", "BufferError", "EOFError", "FloatingPointError",
    "GeneratorExit", "ImportError", "ModuleNotFoundError", "IndexError", "KeyError",
    "KeyboardInterrupt", "LookupError", "MemoryError", "NameError", "NotImplementedError",
    "OSError", "EnvironmentError", "IOError", "BlockingIOError", "ChildProcessError",
    "ConnectionError", "BrokenPipeError", "ConnectionAbortedError", "ConnectionRefusedError",
    "ConnectionResetError", "FileExistsError", "FileNotFoundError", "InterruptedError",
    "IsADirectoryError", "NotADirectoryError", "PermissionError", "ProcessLookupError",
    "TimeoutError", "OverflowError", "RecursionError", "ReferenceError", "RuntimeError",
    "StopAsyncIteration", "StopIteration", "SyntaxError", "IndentationError", "TabError",
    "SystemError", "SystemExit", "TypeError", "UnboundLocalError", "UnicodeError",
    "UnicodeDecodeError", "UnicodeEncodeError", "UnicodeTranslateError", "ValueError",
    "ZeroDivisionError", "Warning", "BytesWarning", "DeprecationWarning", "FutureWarning",
    "ImportWarning", "PendingDeprecationWarning", "ResourceWarning", "RuntimeWarning",
    "SyntaxWarning", "UnicodeWarning", "UserWarning",
];
const INDEXER_DUNDERS: &[&str] = &["__getitem__", "__setitem__", "__delitem__"];
const OPERATOR_DUNDERS: &[&str] = &[
    "__add__", "__sub__", "__mul__", "__matmul__", "__truediv__", "__floordiv__", "__mod__",
    "__pow__", "__and__", "__or__", "__xor__", "__lshift__", "__rshift__", "__radd__",
    "__rsub__", "__rmul__", "__rtruediv__", "__iadd__", "__isub__", "__imul__", "__eq__",
    "__ne__", "__lt__", "__le__", "__gt__", "__ge__", "__neg__", "__pos__", "__invert__",
    "__contains__",
];

/// Root module names of the standard library.
const STDLIB: &[&str] = &[
    "__future__", "abc", "argparse", "array", "ast", "asyncio", "base64", "bisect", "builtins",
    "bz2", "calendar", "cmath", "codecs", "collections", "colorsys", "concurrent", "configparser",
    "contextlib", "contextvars", "copy", "csv", "ctypes", "dataclasses", "datetime", "decimal",
    "difflib", "dis", "email", "enum", "errno", "fnmatch", "fractions", "functools", "gc",
    "getpass", "gettext", "glob", "gzip", "hashlib", "heapq", "hmac", "html", "http", "imaplib",
    "importlib", "inspect", "io", "ipaddress", "itertools", "json", "keyword", "linecache",
    "locale", "logging", "lzma", "mailbox", "math", "mimetypes", "mmap", "multiprocessing",
    "numbers", "operator", "os", "pathlib", "pickle", "platform", "plistlib", "pprint",
    "queue", "random", "re", "reprlib", "sched", "secrets", "select", "selectors", "shelve",
    "shlex", "shutil", "signal", "site", "smtplib", "socket", "socketserver", "sqlite3", "ssl",
    "stat", "statistics", "string", "struct", "subprocess", "sys", "sysconfig", "tarfile",
    "tempfile", "textwrap", "threading", "time", "timeit", "tkinter", "token", "tokenize",
    "tomllib", "traceback", "types", "typing", "unicodedata", "unittest", "urllib", "uuid",
    "warnings", "weakref", "xml", "zipfile", "zlib", "zoneinfo",
];

/// Extraction rules for Python source trees.
#[derive(Debug, Default, Clone, Copy)]
pub struct PythonExtractor;

/// Per-run state read from the project configuration and the main
/// `__init__.py`.
#[derive(Debug, Clone)]
pub struct PythonProject {
    pub info: ProjectInfo,
    /// Module of the main `__init__.py`
    pub top_module: Option<String>,
    /// Names exported by the main `__init__.py`
    pub entry_symbols: BTreeSet<String>,
    /// Exported names that come from other distributions
    pub external_reexports: Vec<ImportedName>,
    /// Root module names that belong to this project
    local_roots: BTreeSet<String>,
}

impl AsRef<ProjectInfo> for PythonProject {
    fn as_ref(&self) -> &ProjectInfo {
        &self.info
    }
}

/// `__all__` and imports of one module.
#[derive(Debug, Default)]
struct ModuleScope {
    all: Option<Vec<String>>,
    /// Names imported from sibling modules (`from .x import Y`)
    local_imports: Vec<String>,
    external: Vec<ImportedName>,
}

impl SourceExtractor for PythonExtractor {
    type Project = PythonProject;

    fn language(&self) -> Language {
        Language::Python
    }

    fn load_project(&self, root: &Path) -> crate::Result<PythonProject> {
        let (package, version) = read_pyproject(root)?;
        let package = match package {
            Some(name) => name,
            None => shallowest_init(root)
                .as_deref()
                .and_then(Path::parent)
                .map(dir_name)
                .unwrap_or_else(|| dir_name(root)),
        };

        let mut project = PythonProject {
            info: ProjectInfo {
                root: root.to_path_buf(),
                package: package.clone(),
                version,
            },
            top_module: None,
            entry_symbols: BTreeSet::new(),
            external_reexports: Vec::new(),
            local_roots: BTreeSet::from([package.replace('-', "_")]),
        };

        if let Some(init) = main_init(root, &package) {
            let rel = init
                .strip_prefix(root)
                .map(|p| p.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/"))
                .unwrap_or_default();
            let module = module_name(&rel, &package);
            if let Some(root_segment) = module.split('.').next() {
                project.local_roots.insert(root_segment.to_string());
            }
            let source = std::fs::read_to_string(&init)?;
            let tree = syntax::parse(&tree_sitter_python::LANGUAGE.into(), &source)?;
            let scope = module_scope(tree.root_node(), &source, &project.local_roots);

            project.entry_symbols.extend(scope.all.into_iter().flatten());
            project.entry_symbols.extend(scope.local_imports);
            for import in scope.external.into_iter().filter(|i| i.name.is_some()) {
                project.entry_symbols.insert(import.local.clone());
                project.external_reexports.push(import);
            }
            tracing::debug!(
                "Main module {} exports {} names",
                module,
                project.entry_symbols.len()
            );
            project.top_module = Some(module);
        }

        Ok(project)
    }

    fn includes(&self, rel_path: &str) -> bool {
        let file = rel_path.rsplit('/').next().unwrap_or(rel_path);
        if file.starts_with("test_") || file.ends_with("_test.py") || file == "conftest.py" {
            return false;
        }
        if file.starts_with('_') && file != "__init__.py" {
            return false;
        }
        // Build scripts at the root are not part of the package.
        !matches!(rel_path, "setup.py" | "noxfile.py" | "fabfile.py")
    }

    fn skips_dir(&self, name: &str) -> bool {
        matches!(name, "tests" | "test" | "site-packages" | ".nox" | "docs")
    }

    fn extract(
        &self,
        file: &SourceFile,
        project: &PythonProject,
        sink: &TypeAccumulator,
    ) -> crate::Result<FileReport> {
        let tree = syntax::parse(&tree_sitter_python::LANGUAGE.into(), &file.content)?;
        let root = tree.root_node();
        let src = file.content.as_str();
        let module = module_name(&file.rel_path, &project.info.package);
        let scope = module_scope(root, src, &project.local_roots);
        let visible = |name: &str| match &scope.all {
            Some(all) => all.iter().any(|n| n == name),
            None => !name.starts_with('_'),
        };

        let mut functions = Callables::default();
        for node in named_children(root) {
            let (definition, decorators) = unwrap_decorated(node);
            match definition.kind() {
                "class_definition" => {
                    let Some(name) = field_text(definition, "name", src) else { continue };
                    if !visible(name) {
                        continue;
                    }
                    let ty = class_info(definition, &decorators, src);
                    sink.declare(&module, ty, Origin::new(&file.rel_path, definition.start_byte()));
                }
                "function_definition" => {
                    let Some(name) = field_text(definition, "name", src) else { continue };
                    if !visible(name) {
                        continue;
                    }
                    if let Some(callable) = function_info(definition, &decorators, false, src) {
                        functions.push(callable, definition.start_byte());
                    }
                }
                _ => {}
            }
        }
        for (offset, function) in functions.finish() {
            sink.add_function(&module, function, Origin::new(&file.rel_path, offset));
        }
        sink.add_imports(&module, scope.external);

        Ok(FileReport {
            syntax_errors: root.has_error(),
        })
    }

    fn finalize(&self, project: &PythonProject, collected: &mut Collected) {
        for ns in &mut collected.namespaces {
            for ty in &mut ns.types {
                if !project.entry_symbols.contains(&ty.name) {
                    continue;
                }
                ty.entry_point = true;
                if let Some(top) = &project.top_module {
                    if *top != ns.name {
                        ty.re_exported_from = Some(top.clone());
                    }
                }
            }
        }
        collected.reexports.extend(project.external_reexports.iter().cloned());
    }

    fn external_parent_is_interface(&self, name: &str) -> bool {
        INTERFACE_PARENTS.contains(&bare_name(name))
    }

    fn is_error_root(&self, name: &str) -> bool {
        let name = name.strip_prefix("builtins.").unwrap_or(name);
        BUILTIN_EXCEPTIONS.contains(&name)
    }

    fn is_stdlib(&self, package: &str) -> bool {
        let root = package.split('.').next().unwrap_or(package);
        STDLIB.contains(&root)
    }
}

/// `[project]` then `[tool.poetry]` name and version.
fn read_pyproject(root: &Path) -> crate::Result<(Option<String>, Option<String>)> {
    let path = root.join("pyproject.toml");
    if !path.is_file() {
        return Ok((None, None));
    }
    let contents = std::fs::read_to_string(&path)?;
    let table: toml::Table = contents
        .parse()
        .map_err(|e: toml::de::Error| crate::Error::Parse(format!("{}: {}", path.display(), e)))?;

    let section = |keys: &[&str]| -> Option<&toml::Table> {
        let mut current = &table;
        for key in keys {
            current = current.get(*key)?.as_table()?;
        }
        Some(current)
    };
    let field = |keys: &[&str], name: &str| -> Option<String> {
        section(keys)?.get(name)?.as_str().map(str::to_string)
    };

    let name = field(&["project"], "name").or_else(|| field(&["tool", "poetry"], "name"));
    let version = field(&["project"], "version").or_else(|| field(&["tool", "poetry"], "version"));
    Ok((name, version))
}

fn dir_name(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "package".to_string())
}

/// Main `__init__.py`: `<name>/`, then `src/<name>/`, then the shallowest.
fn main_init(root: &Path, package: &str) -> Option<PathBuf> {
    let dir = package.replace('-', "_");
    [root.join(&dir), root.join("src").join(&dir)]
        .into_iter()
        .map(|d| d.join("__init__.py"))
        .find(|p| p.is_file())
        .or_else(|| shallowest_init(root))
}

fn shallowest_init(root: &Path) -> Option<PathBuf> {
    SkipFilter::new(root, &[])
        .walker(root)
        .filter_map(Result::ok)
        .filter(|e| e.file_name() == "__init__.py")
        .filter(|e| {
            let rel = e.path().strip_prefix(root).unwrap_or(e.path());
            !rel.components()
                .any(|c| c.as_os_str().to_string_lossy().to_lowercase().contains("test"))
        })
        .min_by_key(|e| (e.depth(), e.path().to_path_buf()))
        .map(|e| e.path().to_path_buf())
}

/// Dotted module name for a relative path: `src/pkg/sub/__init__.py` -> `pkg.sub`.
fn module_name(rel_path: &str, package: &str) -> String {
    let path = rel_path.strip_prefix("src/").unwrap_or(rel_path);
    let path = path.strip_suffix(".py").unwrap_or(path);
    let path = path.strip_suffix("__init__").unwrap_or(path).trim_end_matches('/');
    if path.is_empty() {
        return package.replace('-', "_");
    }
    path.replace('/', ".")
}

/// Split a `decorated_definition` into its definition and decorators.
fn unwrap_decorated(node: Node<'_>) -> (Node<'_>, Vec<Node<'_>>) {
    if node.kind() != "decorated_definition" {
        return (node, Vec::new());
    }
    let decorators = syntax::children_of_kind(node, "decorator");
    let definition = node.child_by_field_name("definition").unwrap_or(node);
    (definition, decorators)
}

/// Decorator name without arguments: `@functools.cached_property` ->
/// `functools.cached_property`, `@deprecated("x")` -> `deprecated`.
fn decorator_name<'a>(decorator: Node<'_>, src: &'a str) -> &'a str {
    let Some(expr) = decorator.named_child(0) else {
        return "";
    };
    match expr.kind() {
        "call" => field_text(expr, "function", src).unwrap_or(""),
        _ => text(expr, src),
    }
}

/// First string argument of a decorator call.
fn decorator_message(decorator: Node<'_>, src: &str) -> Option<String> {
    let call = decorator.named_child(0).filter(|n| n.kind() == "call")?;
    let args = call.child_by_field_name("arguments")?;
    let first = named_children(args).into_iter().find(|n| n.kind() == "string")?;
    Some(string_value(text(first, src)))
}

fn string_value(raw: &str) -> String {
    let body = raw.trim_start_matches(|c: char| "rRbBuUfF".contains(c));
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if let Some(inner) = body.strip_prefix(quote).and_then(|b| b.strip_suffix(quote)) {
            return inner.to_string();
        }
    }
    body.to_string()
}

fn docstring(definition: Node<'_>, src: &str) -> Option<String> {
    let body = definition.child_by_field_name("body")?;
    let first = body.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let literal = first.named_child(0).filter(|n| n.kind() == "string")?;
    syntax::summary(&string_value(text(literal, src)), DOC_MAX)
}

/// `__all__` and imports of a module. Relative imports and imports of the
/// project's own packages count as local.
fn module_scope(root: Node<'_>, src: &str, local_roots: &BTreeSet<String>) -> ModuleScope {
    let mut scope = ModuleScope::default();
    let mut stack: Vec<Node<'_>> = named_children(root);
    stack.reverse();
    while let Some(node) = stack.pop() {
        match node.kind() {
            "import_from_statement" => from_import(node, src, local_roots, &mut scope),
            "import_statement" => {
                for name in named_children(node) {
                    let (dotted, alias) = match name.kind() {
                        "aliased_import" => (
                            field_text(name, "name", src).unwrap_or(""),
                            field_text(name, "alias", src),
                        ),
                        _ => (text(name, src), None),
                    };
                    let root_segment = dotted.split('.').next().unwrap_or(dotted);
                    if root_segment.is_empty() || local_roots.contains(root_segment) {
                        continue;
                    }
                    scope.external.push(ImportedName {
                        local: alias.unwrap_or(root_segment).to_string(),
                        package: root_segment.to_string(),
                        name: None,
                    });
                }
            }
            "expression_statement" => {
                if let Some(all) = all_assignment(node, src) {
                    scope.all = Some(all);
                }
            }
            // Imports guarded by `if TYPE_CHECKING:` or `try:` still count.
            "if_statement" | "try_statement" | "block" | "else_clause" | "except_clause" => {
                let mut children = named_children(node);
                children.reverse();
                stack.extend(children);
            }
            _ => {}
        }
    }
    scope
}

fn from_import(
    node: Node<'_>,
    src: &str,
    local_roots: &BTreeSet<String>,
    scope: &mut ModuleScope,
) {
    let Some(module_node) = node.child_by_field_name("module_name") else {
        return;
    };
    let is_relative = module_node.kind() == "relative_import";
    let module = text(module_node, src);
    let root_segment = module.split('.').next().unwrap_or(module);
    let local = is_relative || local_roots.contains(root_segment);

    let mut cursor = node.walk();
    for name in node.children_by_field_name("name", &mut cursor) {
        let (imported, alias) = match name.kind() {
            "aliased_import" => (
                field_text(name, "name", src).unwrap_or(""),
                field_text(name, "alias", src),
            ),
            _ => (text(name, src), None),
        };
        let exported = alias.unwrap_or(imported).to_string();
        if local {
            scope.local_imports.push(exported);
        } else {
            scope.external.push(ImportedName {
                local: exported,
                package: root_segment.to_string(),
                name: Some(imported.to_string()),
            });
        }
    }
}

/// `__all__ = [...]` or `__all__ = (...)`.
fn all_assignment(statement: Node<'_>, src: &str) -> Option<Vec<String>> {
    let assignment = statement.named_child(0).filter(|n| n.kind() == "assignment")?;
    if field_text(assignment, "left", src)? != "__all__" {
        return None;
    }
    let right = assignment.child_by_field_name("right")?;
    if !matches!(right.kind(), "list" | "tuple") {
        return None;
    }
    Some(
        named_children(right)
            .into_iter()
            .filter(|n| n.kind() == "string")
            .map(|n| string_value(text(n, src)))
            .collect(),
    )
}

fn is_dunder(name: &str) -> bool {
    name.len() > 4 && name.starts_with("__") && name.ends_with("__")
}

fn is_public_member(name: &str) -> bool {
    !name.starts_with('_') || is_dunder(name)
}

fn class_info(node: Node<'_>, decorators: &[Node<'_>], src: &str) -> TypeInfo {
    let name = field_text(node, "name", src).unwrap_or_default();

    let parents: Vec<String> = node
        .child_by_field_name("superclasses")
        .map(named_children)
        .unwrap_or_default()
        .into_iter()
        .filter(|n| matches!(n.kind(), "identifier" | "attribute" | "subscript"))
        .map(|n| squash(text(n, src)))
        .filter(|p| p != "object")
        .collect();

    let bases: Vec<&str> = parents.iter().map(|p| bare_name(p)).collect();
    let decorated_as = |wanted: &str| decorators.iter().any(|d| bare_name(decorator_name(*d, src)) == wanted);

    let kind = if bases.iter().any(|b| ENUM_BASES.contains(b)) {
        TypeKind::Enum
    } else if bases.contains(&"Protocol") {
        TypeKind::Interface
    } else if bases.iter().any(|b| RECORD_BASES.contains(b)) || decorated_as("dataclass") {
        TypeKind::Record
    } else {
        TypeKind::Class
    };

    let mut ty = TypeInfo::new(name, kind);
    ty.doc = docstring(node, src);
    let mut parents = parents.into_iter();
    ty.base = parents.next();
    ty.interfaces = parents.collect();

    if let Some(deprecation) = decorators.iter().find(|d| bare_name(decorator_name(**d, src)) == "deprecated") {
        ty.deprecated = true;
        ty.deprecated_message = decorator_message(*deprecation, src);
    }

    let Some(body) = node.child_by_field_name("body") else {
        return ty;
    };
    let mut methods = Callables::default();
    for child in named_children(body) {
        let (definition, decorators) = unwrap_decorated(child);
        match definition.kind() {
            "function_definition" => {
                let Some(name) = field_text(definition, "name", src) else { continue };
                if !is_public_member(name) {
                    continue;
                }
                if let Some(callable) = function_info(definition, &decorators, true, src) {
                    methods.push(callable, definition.start_byte());
                }
            }
            "expression_statement" => {
                let Some(assignment) = definition.named_child(0).filter(|n| n.kind() == "assignment") else {
                    continue;
                };
                let Some(left) = assignment.child_by_field_name("left").filter(|n| n.kind() == "identifier") else {
                    continue;
                };
                let attr = text(left, src);
                if attr.starts_with('_') {
                    continue;
                }
                if kind == TypeKind::Enum {
                    ty.values.push(attr.to_string());
                } else if let Some(annotation) = field_text(assignment, "type", src) {
                    let annotation = squash(annotation);
                    methods.push_plain(
                        MemberInfo::new(attr, MemberKind::Field, annotation.clone()).with_ret(annotation),
                    );
                }
            }
            _ => {}
        }
    }
    ty.members = methods.finish().into_iter().map(|(_, m)| m).collect();
    ty
}

/// A function or method with the decorator facts the caller needs.
struct Callable {
    member: MemberInfo,
    overload: bool,
}

/// Ordered callables of one scope. `@overload` signatures replace the
/// implementation they precede and inherit its docstring.
#[derive(Default)]
struct Callables {
    out: Vec<(usize, MemberInfo)>,
    pending: BTreeMap<String, Vec<(usize, MemberInfo)>>,
}

impl Callables {
    fn push(&mut self, callable: Callable, offset: usize) {
        let name = callable.member.name.clone();
        if callable.overload {
            self.pending.entry(name).or_default().push((offset, callable.member));
            return;
        }
        match self.pending.remove(&name) {
            Some(overloads) => {
                let doc = callable.member.doc.clone();
                for (at, mut signature) in overloads {
                    if signature.doc.is_none() {
                        signature.doc = doc.clone();
                    }
                    self.out.push((at, signature));
                }
            }
            None => self.out.push((offset, callable.member)),
        }
    }

    fn push_plain(&mut self, member: MemberInfo) {
        let offset = self.out.last().map(|(o, _)| *o).unwrap_or(0);
        self.out.push((offset, member));
    }

    /// Overloads without an implementation are kept at the end.
    fn finish(mut self) -> Vec<(usize, MemberInfo)> {
        for (_, overloads) in std::mem::take(&mut self.pending) {
            self.out.extend(overloads);
        }
        self.out
    }
}

fn function_info(node: Node<'_>, decorators: &[Node<'_>], in_class: bool, src: &str) -> Option<Callable> {
    let name = field_text(node, "name", src)?.to_string();

    let mut is_property = false;
    let mut is_static = false;
    let mut is_classmethod = false;
    let mut overload = false;
    let mut deprecated = None;
    for decorator in decorators {
        let full = decorator_name(*decorator, src);
        if full.ends_with(".setter") || full.ends_with(".deleter") {
            return None;
        }
        match bare_name(full) {
            "property" | "cached_property" => is_property = true,
            "staticmethod" => is_static = true,
            "classmethod" => is_classmethod = true,
            "overload" => overload = true,
            "deprecated" => deprecated = Some(decorator_message(*decorator, src)),
            _ => {}
        }
    }

    let ret = field_text(node, "return_type", src).map(squash);
    let (params, rendered) = parameters(node, in_class && !is_static, src);

    let kind = if !in_class {
        MemberKind::Method
    } else if is_property {
        MemberKind::Property
    } else if name == "__init__" || name == "__new__" {
        MemberKind::Constructor
    } else if INDEXER_DUNDERS.contains(&name.as_str()) {
        MemberKind::Indexer
    } else if OPERATOR_DUNDERS.contains(&name.as_str()) {
        MemberKind::Operator
    } else {
        MemberKind::Method
    };

    let sig = if kind == MemberKind::Property {
        ret.clone().unwrap_or_default()
    } else {
        rendered
    };
    let mut member = MemberInfo::new(name, kind, sig);
    if kind != MemberKind::Property {
        member.params = params;
    }
    member.ret = ret;
    member.doc = docstring(node, src);
    member.is_static = is_static || is_classmethod;
    member.is_async = node.child(0).is_some_and(|c| c.kind() == "async");
    if let Some(message) = deprecated {
        member.deprecated = true;
        member.deprecated_message = message;
    }

    Some(Callable { member, overload })
}

/// Parameters and their rendering. `skip_receiver` drops `self` / `cls`.
fn parameters(node: Node<'_>, skip_receiver: bool, src: &str) -> (Vec<ParamInfo>, String) {
    let Some(list) = node.child_by_field_name("parameters") else {
        return (Vec::new(), String::new());
    };

    let mut params = Vec::new();
    let mut rendered = Vec::new();
    let mut first = true;

    for param in named_children(list) {
        let (name_node, type_text, optional) = match param.kind() {
            "identifier" | "list_splat_pattern" | "dictionary_splat_pattern" => (Some(param), None, false),
            "typed_parameter" => (param.named_child(0), field_text(param, "type", src), false),
            "default_parameter" => (param.child_by_field_name("name"), None, true),
            "typed_default_parameter" => (
                param.child_by_field_name("name"),
                field_text(param, "type", src),
                true,
            ),
            _ => continue,
        };
        let Some(name_node) = name_node else { continue };

        if std::mem::take(&mut first) && skip_receiver {
            continue;
        }

        let stars = match name_node.kind() {
            "list_splat_pattern" => "*",
            "dictionary_splat_pattern" => "**",
            _ => "",
        };
        let name = text(name_node, src).trim_start_matches('*').to_string();
        let type_name = type_text.map(squash).unwrap_or_default();

        let mut shown = format!("{}{}", stars, name);
        if !type_name.is_empty() {
            let _ = write!(shown, ": {}", type_name);
        }
        if optional {
            shown.push_str(" = ...");
        }
        rendered.push(shown);

        params.push(ParamInfo {
            name: Some(name),
            type_name,
            variadic: !stars.is_empty(),
            optional,
        });
    }

    (params, rendered.join(", "))
}

/// Render an index as a Python stub file.
pub fn stubs(index: &ApiIndex) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {} - Public API Surface", index.package);
    if let Some(version) = &index.version {
        let _ = writeln!(out, "# Version: {}", version);
    }

    for ns in &index.namespaces {
        let _ = writeln!(out, "\n# Module: {}\n", ns.name);

        let mut overloaded: HashSet<&str> = HashSet::new();
        for function in &ns.functions {
            if !overloaded.insert(function.name.as_str()) {
                let _ = writeln!(out, "@overload");
            }
            write_def(&mut out, "", function, false);
        }

        for ty in &ns.types {
            let parents: Vec<&str> = ty.base.iter().chain(&ty.interfaces).map(String::as_str).collect();
            if parents.is_empty() {
                let _ = writeln!(out, "class {}:", ty.name);
            } else {
                let _ = writeln!(out, "class {}({}):", ty.name, parents.join(", "));
            }
            if let Some(doc) = &ty.doc {
                let _ = writeln!(out, "    \"\"\"{}\"\"\"", doc);
            }
            for value in &ty.values {
                let _ = writeln!(out, "    {} = ...", value);
            }

            let mut seen: HashSet<&str> = HashSet::new();
            let repeated: HashSet<&str> = ty
                .members
                .iter()
                .filter(|m| m.kind.is_callable() && !seen.insert(m.name.as_str()))
                .map(|m| m.name.as_str())
                .collect();

            for member in &ty.members {
                match member.kind {
                    MemberKind::Field => {
                        let _ = writeln!(out, "    {}: {}", member.name, member.sig);
                    }
                    MemberKind::Property => {
                        let _ = writeln!(out, "    @property");
                        write_def(&mut out, "    ", member, true);
                    }
                    _ => {
                        if repeated.contains(member.name.as_str()) {
                            let _ = writeln!(out, "    @overload");
                        }
                        write_def(&mut out, "    ", member, true);
                    }
                }
            }
            if ty.members.is_empty() && ty.values.is_empty() {
                let _ = writeln!(out, "    ...");
            }
            out.push('\n');
        }
    }

    let external: Vec<_> = index.dependencies.iter().filter(|d| !d.is_stdlib).collect();
    if !external.is_empty() {
        let _ = writeln!(out, "# Dependencies");
        for dep in external {
            let _ = writeln!(out, "#   {}: {}", dep.package, dep.types.join(", "));
        }
    }
    out
}

fn write_def(out: &mut String, indent: &str, member: &MemberInfo, method: bool) {
    if member.deprecated {
        let _ = writeln!(out, "{}@deprecated", indent);
    }
    if method && member.is_static {
        let _ = writeln!(out, "{}@staticmethod", indent);
    }
    let receiver = method && !member.is_static;
    let params = match (receiver, member.kind == MemberKind::Property || member.sig.is_empty()) {
        (true, true) => "self".to_string(),
        (true, false) => format!("self, {}", member.sig),
        (false, _) if member.kind == MemberKind::Property => String::new(),
        (false, _) => member.sig.clone(),
    };
    let ret = member.ret.as_deref().map(|r| format!(" -> {}", r)).unwrap_or_default();
    let prefix = if member.is_async { "async " } else { "" };
    let _ = writeln!(out, "{}{}def {}({}){}: ...", indent, prefix, member.name, params, ret);
    if let Some(doc) = &member.doc {
        let _ = writeln!(out, "{}    \"\"\"{}\"\"\"", indent, doc);
    }
}

/// Python engine: tree-sitter source mode or the external analyzer.
#[derive(Clone, Default)]
pub struct PythonEngine {
    ctx: EngineContext,
    extractor: PythonExtractor,
}

impl PythonEngine {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            ctx,
            extractor: PythonExtractor,
        }
    }
}

impl GraphEngine for PythonEngine {
    type Manifest = PyProject;

    fn language(&self) -> Language {
        Language::Python
    }

    fn is_available(&self) -> bool {
        super::toolchain_available(&self.ctx, Language::Python)
    }

    fn graph(&self, target: &Target<PyProject>, map: Option<&CrossLanguageMap>) -> EngineResult<ApiIndex> {
        super::run_target(&self.ctx, &self.extractor, target, map)
    }

    fn to_stubs(&self, index: &ApiIndex) -> String {
        stubs(index)
    }
}
