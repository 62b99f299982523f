use std::collections::BTreeMap;

use tree_sitter::Node;

use crate::module_path::{child_of, normalize_type, parent_of};
use crate::{CallSite, Declaration, ImportMap, ParsedModule, Result, SymbolKind, TypeBindings};

use super::helpers::{
    child_by_field, compact_text, extract_python_docstring, inside_error, named_arg_count,
    node_range, node_text,
};
use super::{LanguageSupport, ModuleContext};

#[derive(Debug)]
pub struct PythonSupport;

impl LanguageSupport for PythonSupport {
    fn id(&self) -> &'static str {
        "python"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["py", "pyi"]
    }

    fn tree_sitter_language(&self) -> tree_sitter::Language {
        tree_sitter_python::LANGUAGE.into()
    }

    fn extract(
        &self,
        tree: &tree_sitter::Tree,
        source: &str,
        ctx: &ModuleContext,
    ) -> Result<ParsedModule> {
        let mut walker = PythonWalker {
            source,
            ctx,
            declarations: Vec::new(),
            calls: Vec::new(),
            imports: ImportMap::new(),
            bindings: BTreeMap::new(),
        };

        let root = tree.root_node();
        let scope = Scope::Module(ctx.module_qn.clone());
        walker.walk_children(root, &scope);

        Ok(ParsedModule {
            module_qn: ctx.module_qn.clone(),
            relative_path: ctx.relative_path.clone(),
            language: self.id().to_string(),
            package: None,
            docstring: extract_python_docstring(root, source),
            line_count: source.lines().count(),
            declarations: walker.declarations,
            calls: walker.calls,
            imports: walker.imports,
            bindings: walker.bindings,
        })
    }
}

/// Lexical scope a node is visited in.
enum Scope {
    Module(String),
    Class(String),
    Callable {
        qn: String,
        kind: SymbolKind,
        enclosing_type: Option<String>,
        parsed: bool,
    },
}

impl Scope {
    fn qn(&self) -> &str {
        match self {
            Self::Module(qn) | Self::Class(qn) | Self::Callable { qn, .. } => qn,
        }
    }
}

struct PythonWalker<'a> {
    source: &'a str,
    ctx: &'a ModuleContext,
    declarations: Vec<Declaration>,
    calls: Vec<CallSite>,
    imports: ImportMap,
    bindings: BTreeMap<String, TypeBindings>,
}

impl PythonWalker<'_> {
    fn walk_children(&mut self, node: Node<'_>, scope: &Scope) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.walk(child, scope);
        }
    }

    fn walk(&mut self, node: Node<'_>, scope: &Scope) {
        match node.kind() {
            "import_statement" => {
                self.record_import(node);
                return;
            }
            "import_from_statement" => {
                self.record_from_import(node);
                return;
            }
            "class_definition" => {
                self.walk_class(node, scope);
                return;
            }
            "function_definition" => {
                self.walk_function(node, scope);
                return;
            }
            "call" => self.record_call(node, scope),
            "assignment" => self.record_assignment(node, scope),
            _ => {}
        }
        self.walk_children(node, scope);
    }

    /// `import a.b.c` binds `a` and `a.b.c`. `import a.b as m` binds `m`.
    fn record_import(&mut self, node: Node<'_>) {
        let mut cursor = node.walk();
        for name in node.children_by_field_name("name", &mut cursor) {
            match name.kind() {
                "dotted_name" => {
                    let path = compact_text(name, self.source);
                    if let Some((head, _)) = path.split_once('.') {
                        self.imports.insert(head.to_string(), head.to_string());
                    }
                    self.imports.insert(path.clone(), path);
                }
                "aliased_import" => {
                    if let (Some(target), Some(alias)) =
                        (child_by_field(name, "name"), child_by_field(name, "alias"))
                    {
                        self.imports.insert(
                            node_text(alias, self.source).to_string(),
                            compact_text(target, self.source),
                        );
                    }
                }
                _ => {}
            }
        }
    }

    /// `from a.b import c as d` binds `d` to `a.b.c`. Relative imports are
    /// anchored at the module's package qualified name.
    fn record_from_import(&mut self, node: Node<'_>) {
        let Some(module) = child_by_field(node, "module_name") else {
            return;
        };
        let base = if module.kind() == "relative_import" {
            self.resolve_relative(module)
        } else {
            compact_text(module, self.source)
        };

        let mut cursor = node.walk();
        for name in node.children_by_field_name("name", &mut cursor) {
            let (target, local) = match name.kind() {
                "dotted_name" => {
                    let target = compact_text(name, self.source);
                    let local = target.rsplit('.').next().unwrap_or(&target).to_string();
                    (target, local)
                }
                "aliased_import" => {
                    let (Some(target), Some(alias)) =
                        (child_by_field(name, "name"), child_by_field(name, "alias"))
                    else {
                        continue;
                    };
                    (
                        compact_text(target, self.source),
                        node_text(alias, self.source).to_string(),
                    )
                }
                _ => continue,
            };
            self.imports.insert(local, child_of(&base, &target));
        }
    }

    fn resolve_relative(&self, module: Node<'_>) -> String {
        let text = compact_text(module, self.source);
        let dots = text.chars().take_while(|c| *c == '.').count();
        let rest = &text[dots..];

        let mut package = self.ctx.package_qn();
        for _ in 1..dots {
            package = parent_of(package);
        }
        if rest.is_empty() {
            package.to_string()
        } else {
            child_of(package, rest)
        }
    }

    fn walk_class(&mut self, node: Node<'_>, scope: &Scope) {
        let Some(name_node) = child_by_field(node, "name") else {
            return;
        };
        let name = node_text(name_node, self.source).to_string();
        let qn = child_of(scope.qn(), &name);
        let body = child_by_field(node, "body");

        self.declarations.push(Declaration {
            name,
            qualified_name: qn.clone(),
            kind: SymbolKind::Class,
            parent_qn: scope.qn().to_string(),
            span: node_range(node),
            docstring: body.and_then(|b| extract_python_docstring(b, self.source)),
            parsed: true,
        });

        if let Some(body) = body {
            self.walk_children(body, &Scope::Class(qn));
        }
    }

    fn walk_function(&mut self, node: Node<'_>, scope: &Scope) {
        let Some(name_node) = child_by_field(node, "name") else {
            return;
        };
        let name = node_text(name_node, self.source).to_string();
        let qn = child_of(scope.qn(), &name);
        let (kind, enclosing_type) = match scope {
            Scope::Class(class_qn) if name == "__init__" => {
                (SymbolKind::Constructor, Some(class_qn.clone()))
            }
            Scope::Class(class_qn) => (SymbolKind::Method, Some(class_qn.clone())),
            Scope::Callable { enclosing_type, .. } => (SymbolKind::Function, enclosing_type.clone()),
            Scope::Module(_) => (SymbolKind::Function, None),
        };
        let parsed = !inside_error(node);
        let body = child_by_field(node, "body");

        self.declarations.push(Declaration {
            name,
            qualified_name: qn.clone(),
            kind,
            parent_qn: scope.qn().to_string(),
            span: node_range(node),
            docstring: body.and_then(|b| extract_python_docstring(b, self.source)),
            parsed,
        });

        if let Some(params) = child_by_field(node, "parameters") {
            self.record_parameters(params, &qn);
        }

        if let Some(body) = body {
            let inner = Scope::Callable {
                qn,
                kind,
                enclosing_type,
                parsed,
            };
            self.walk_children(body, &inner);
        }
    }

    fn record_parameters(&mut self, params: Node<'_>, scope_qn: &str) {
        let mut cursor = params.walk();
        for param in params.named_children(&mut cursor) {
            let name = match param.kind() {
                "typed_parameter" => param
                    .named_child(0)
                    .filter(|n| n.kind() == "identifier"),
                "typed_default_parameter" => child_by_field(param, "name"),
                _ => continue,
            };
            if let (Some(name), Some(ty)) = (name, child_by_field(param, "type")) {
                self.bind(
                    scope_qn,
                    node_text(name, self.source).to_string(),
                    normalize_type(node_text(ty, self.source)),
                );
            }
        }
    }

    /// Binds `x: T = ...`, `x = T(...)` and `self.x = ...` (the latter on the
    /// enclosing class).
    fn record_assignment(&mut self, node: Node<'_>, scope: &Scope) {
        let Some(left) = child_by_field(node, "left") else {
            return;
        };
        let annotated = child_by_field(node, "type").map(|t| normalize_type(node_text(t, self.source)));
        let constructed = child_by_field(node, "right").and_then(|r| self.constructed_type(r));

        match (left.kind(), scope) {
            ("identifier", _) => {
                let name = node_text(left, self.source).to_string();
                if let Some(declared) = annotated.or(constructed) {
                    self.bind(scope.qn(), name, declared);
                }
            }
            (
                "attribute",
                Scope::Callable {
                    qn,
                    enclosing_type: Some(class_qn),
                    ..
                },
            ) => {
                let is_self = child_by_field(left, "object")
                    .is_some_and(|o| node_text(o, self.source) == "self");
                let Some(attr) = child_by_field(left, "attribute") else {
                    return;
                };
                if !is_self {
                    return;
                }
                // `self.x = param` takes the parameter's annotated type.
                let from_param = child_by_field(node, "right")
                    .filter(|r| r.kind() == "identifier")
                    .and_then(|r| {
                        self.bindings
                            .get(qn)
                            .and_then(|b| b.get(node_text(r, self.source)))
                            .cloned()
                    });
                if let Some(declared) = annotated.or(constructed).or(from_param) {
                    let class_qn = class_qn.clone();
                    self.bind(&class_qn, node_text(attr, self.source).to_string(), declared);
                }
            }
            _ => {}
        }
    }

    /// `Foo(...)` or `mod.Foo(...)` with a capitalised last segment.
    fn constructed_type(&self, value: Node<'_>) -> Option<String> {
        if value.kind() != "call" {
            return None;
        }
        let function = child_by_field(value, "function")?;
        if !matches!(function.kind(), "identifier" | "attribute") {
            return None;
        }
        let text = compact_text(function, self.source);
        let last = text.rsplit('.').next().unwrap_or(&text);
        last.starts_with(|c: char| c.is_ascii_uppercase())
            .then_some(text)
    }

    fn record_call(&mut self, node: Node<'_>, scope: &Scope) {
        let (caller_qn, caller_kind, enclosing_type, caller_parsed) = match scope {
            Scope::Module(qn) => (qn.clone(), SymbolKind::Module, None, true),
            Scope::Callable {
                qn,
                kind,
                enclosing_type,
                parsed,
            } => (qn.clone(), *kind, enclosing_type.clone(), *parsed),
            Scope::Class(_) => return,
        };
        let Some(function) = child_by_field(node, "function") else {
            return;
        };
        let (receiver, member) = match function.kind() {
            "identifier" => (None, node_text(function, self.source).to_string()),
            "attribute" => {
                let (Some(object), Some(attr)) =
                    (child_by_field(function, "object"), child_by_field(function, "attribute"))
                else {
                    return;
                };
                (
                    Some(compact_text(object, self.source)),
                    node_text(attr, self.source).to_string(),
                )
            }
            _ => return,
        };

        self.calls.push(CallSite {
            caller_qn,
            caller_kind,
            enclosing_type,
            call_text: compact_text(function, self.source),
            receiver,
            member,
            span: node_range(node),
            arg_count: child_by_field(node, "arguments").map_or(0, named_arg_count),
            caller_parsed,
        });
    }

    fn bind(&mut self, scope_qn: &str, name: String, declared: String) {
        if declared.is_empty() {
            return;
        }
        self.bindings
            .entry(scope_qn.to_string())
            .or_default()
            .insert(name, declared);
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    fn extract(project: &str, path: &str, source: &str) -> ParsedModule {
        let ctx = ModuleContext::new(project, Path::new(path));
        PythonSupport.parse(source, &ctx).unwrap()
    }

    const SERVICE: &str = r#""""Service entry points."""
import json
import analytics.client as ac
from analytics.metrics import record, Counter as C
from .util import normalize
from ..shared import base

setup()


class Service:
    """Handles requests."""

    def __init__(self, client: Client, retries: int = 3):
        self.client = client
        self.counter = C()

    def handle(self, payload):
        data = normalize(payload)
        self.client.send(data)
        self.counter.bump()
        ac.emit("handled")
        record(data, 1)
        return json.dumps(data)


def helper(x):
    def inner():
        return x.strip()
    return inner()
"#;

    #[test]
    fn extracts_declarations_and_docstrings() {
        let m = extract("svc", "svc/api/service.py", SERVICE);
        assert_eq!(m.module_qn, "svc.svc.api.service");
        assert_eq!(m.docstring.as_deref(), Some("Service entry points."));

        let class = m.declaration("svc.svc.api.service.Service").unwrap();
        assert_eq!(class.kind, SymbolKind::Class);
        assert_eq!(class.docstring.as_deref(), Some("Handles requests."));

        let init = m.declaration("svc.svc.api.service.Service.__init__").unwrap();
        assert_eq!(init.kind, SymbolKind::Constructor);
        let handle = m.declaration("svc.svc.api.service.Service.handle").unwrap();
        assert_eq!(handle.kind, SymbolKind::Method);
        assert_eq!(handle.parent_qn, "svc.svc.api.service.Service");

        let helper = m.declaration("svc.svc.api.service.helper").unwrap();
        assert_eq!(helper.kind, SymbolKind::Function);
        let inner = m.declaration("svc.svc.api.service.helper.inner").unwrap();
        assert_eq!(inner.kind, SymbolKind::Function);
    }

    #[test]
    fn resolves_absolute_aliased_and_relative_imports() {
        let m = extract("svc", "svc/api/service.py", SERVICE);
        let get = |k: &str| m.imports.get(k).map(String::as_str);

        assert_eq!(get("json"), Some("json"));
        assert_eq!(get("ac"), Some("analytics.client"));
        assert_eq!(get("record"), Some("analytics.metrics.record"));
        assert_eq!(get("C"), Some("analytics.metrics.Counter"));
        assert_eq!(get("normalize"), Some("svc.svc.api.util.normalize"));
        assert_eq!(get("base"), Some("svc.svc.shared.base"));
    }

    #[test]
    fn captures_module_level_and_method_calls() {
        let m = extract("svc", "svc/api/service.py", SERVICE);

        let setup = m.calls.iter().find(|c| c.member == "setup").unwrap();
        assert_eq!(setup.caller_kind, SymbolKind::Module);
        assert_eq!(setup.caller_qn, "svc.svc.api.service");

        let handle_qn = "svc.svc.api.service.Service.handle";
        let texts: Vec<&str> = m
            .calls
            .iter()
            .filter(|c| c.caller_qn == handle_qn)
            .map(|c| c.call_text.as_str())
            .collect();
        assert_eq!(
            texts,
            vec![
                "normalize",
                "self.client.send",
                "self.counter.bump",
                "ac.emit",
                "record",
                "json.dumps",
            ]
        );

        let record = m.calls.iter().find(|c| c.member == "record").unwrap();
        assert_eq!(record.arg_count, 2);
        assert_eq!(record.receiver, None);
        assert_eq!(
            record.enclosing_type.as_deref(),
            Some("svc.svc.api.service.Service")
        );
    }

    #[test]
    fn binds_parameters_and_self_attributes() {
        let m = extract("svc", "svc/api/service.py", SERVICE);

        let init = &m.bindings["svc.svc.api.service.Service.__init__"];
        assert_eq!(init["client"], "Client");
        assert_eq!(init["retries"], "int");

        let fields = &m.bindings["svc.svc.api.service.Service"];
        assert_eq!(fields["client"], "Client");
        assert_eq!(fields["counter"], "C");
    }

    #[test]
    fn init_module_anchors_relative_imports_at_itself() {
        let m = extract("svc", "svc/core/__init__.py", "from .engine import run\n");
        assert_eq!(m.module_qn, "svc.svc.core");
        assert_eq!(
            m.imports.get("run").map(String::as_str),
            Some("svc.svc.core.engine.run")
        );
    }
}
