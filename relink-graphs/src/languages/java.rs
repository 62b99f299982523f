use std::collections::BTreeMap;

use tree_sitter::Node;

use crate::module_path::{
    child_of, last_segment, normalize_type, packaged_module_qualified_name,
};
use crate::{CallSite, Declaration, ImportMap, ParsedModule, Result, SymbolKind, TypeBindings};

use super::helpers::{
    child_by_field, compact_text, extract_block_doc_comment, inside_error, named_arg_count,
    node_range, node_text,
};
use super::{LanguageSupport, ModuleContext};

#[derive(Debug)]
pub struct JavaSupport;

impl LanguageSupport for JavaSupport {
    fn id(&self) -> &'static str {
        "java"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["java"]
    }

    fn tree_sitter_language(&self) -> tree_sitter::Language {
        tree_sitter_java::LANGUAGE.into()
    }

    fn extract(
        &self,
        tree: &tree_sitter::Tree,
        source: &str,
        ctx: &ModuleContext,
    ) -> Result<ParsedModule> {
        let root = tree.root_node();
        let package = declared_package(root, source);
        let module_qn = package.as_deref().map_or_else(
            || ctx.module_qn.clone(),
            |package| {
                packaged_module_qualified_name(&ctx.project_name, &ctx.relative_path, package)
            },
        );

        let mut walker = JavaWalker {
            source,
            module_qn: &module_qn,
            declarations: Vec::new(),
            calls: Vec::new(),
            imports: ImportMap::new(),
            bindings: BTreeMap::new(),
        };

        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            walker.walk_top_level(child);
        }
        let JavaWalker {
            declarations,
            calls,
            imports,
            bindings,
            ..
        } = walker;

        Ok(ParsedModule {
            module_qn,
            relative_path: ctx.relative_path.clone(),
            language: self.id().to_string(),
            package,
            docstring: None,
            line_count: source.lines().count(),
            declarations,
            calls,
            imports,
            bindings,
        })
    }
}

/// The callable whose body is being walked.
struct Caller {
    qn: String,
    kind: SymbolKind,
    enclosing_type: String,
    parsed: bool,
}

struct JavaWalker<'a> {
    source: &'a str,
    module_qn: &'a str,
    declarations: Vec<Declaration>,
    calls: Vec<CallSite>,
    imports: ImportMap,
    bindings: BTreeMap<String, TypeBindings>,
}

impl JavaWalker<'_> {
    fn walk_top_level(&mut self, node: Node<'_>) {
        match node.kind() {
            "import_declaration" => self.record_import(node),
            kind if type_kind(kind).is_some() => {
                let parent = self.module_qn.to_string();
                self.walk_type(node, &parent);
            }
            _ => {}
        }
    }

    /// `import a.b.C;` binds `C`. `import static a.b.C.m;` binds `m`.
    /// Wildcards bind nothing.
    fn record_import(&mut self, node: Node<'_>) {
        let text = node_text(node, self.source);
        let body = text.trim().trim_start_matches("import").trim_end_matches(';');
        let body = body.trim();
        let path: String = body
            .strip_prefix("static")
            .filter(|rest| rest.starts_with(char::is_whitespace))
            .unwrap_or(body)
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        if path.is_empty() || path.ends_with('*') {
            return;
        }
        self.imports
            .insert(last_segment(&path).to_string(), path.clone());
    }

    fn walk_type(&mut self, node: Node<'_>, parent_qn: &str) {
        let Some(kind) = type_kind(node.kind()) else {
            return;
        };
        let Some(name_node) = child_by_field(node, "name") else {
            return;
        };
        let name = node_text(name_node, self.source).to_string();
        let qn = child_of(parent_qn, &name);

        self.declarations.push(Declaration {
            name,
            qualified_name: qn.clone(),
            kind,
            parent_qn: parent_qn.to_string(),
            span: node_range(node),
            docstring: extract_block_doc_comment(node, self.source),
            parsed: true,
        });

        if node.kind() == "record_declaration" {
            if let Some(params) = child_by_field(node, "parameters") {
                self.record_components(params, &qn);
            }
        }

        if let Some(body) = child_by_field(node, "body") {
            self.walk_type_body(body, &qn);
        }
    }

    fn walk_type_body(&mut self, body: Node<'_>, type_qn: &str) {
        let mut cursor = body.walk();
        for member in body.named_children(&mut cursor) {
            match member.kind() {
                "field_declaration" | "constant_declaration" => self.record_field(member, type_qn),
                "method_declaration" | "constructor_declaration" | "compact_constructor_declaration" => {
                    self.walk_callable(member, type_qn);
                }
                "enum_body_declarations" => self.walk_type_body(member, type_qn),
                kind if type_kind(kind).is_some() => self.walk_type(member, type_qn),
                _ => {}
            }
        }
    }

    fn record_field(&mut self, node: Node<'_>, type_qn: &str) {
        let declared = child_by_field(node, "type")
            .map(|t| normalize_type(node_text(t, self.source)))
            .unwrap_or_default();

        let mut cursor = node.walk();
        for declarator in node.children_by_field_name("declarator", &mut cursor) {
            let Some(name_node) = child_by_field(declarator, "name") else {
                continue;
            };
            let name = node_text(name_node, self.source).to_string();
            self.declarations.push(Declaration {
                name: name.clone(),
                qualified_name: child_of(type_qn, &name),
                kind: SymbolKind::Field,
                parent_qn: type_qn.to_string(),
                span: node_range(declarator),
                docstring: extract_block_doc_comment(node, self.source),
                parsed: true,
            });
            if !declared.is_empty() {
                self.bind(type_qn, name, declared.clone());
            }
        }
    }

    fn record_components(&mut self, params: Node<'_>, type_qn: &str) {
        let mut cursor = params.walk();
        for param in params.named_children(&mut cursor) {
            if param.kind() != "formal_parameter" {
                continue;
            }
            let (Some(ty), Some(name_node)) =
                (child_by_field(param, "type"), child_by_field(param, "name"))
            else {
                continue;
            };
            let name = node_text(name_node, self.source).to_string();
            self.declarations.push(Declaration {
                name: name.clone(),
                qualified_name: child_of(type_qn, &name),
                kind: SymbolKind::Field,
                parent_qn: type_qn.to_string(),
                span: node_range(param),
                docstring: None,
                parsed: true,
            });
            self.bind(type_qn, name, normalize_type(node_text(ty, self.source)));
        }
    }

    fn walk_callable(&mut self, node: Node<'_>, type_qn: &str) {
        let Some(name_node) = child_by_field(node, "name") else {
            return;
        };
        let name = node_text(name_node, self.source).to_string();
        let qn = child_of(type_qn, &name);
        let kind = if node.kind() == "method_declaration" {
            SymbolKind::Method
        } else {
            SymbolKind::Constructor
        };
        let parsed = !inside_error(node);

        self.declarations.push(Declaration {
            name,
            qualified_name: qn.clone(),
            kind,
            parent_qn: type_qn.to_string(),
            span: node_range(node),
            docstring: extract_block_doc_comment(node, self.source),
            parsed,
        });

        if let Some(params) = child_by_field(node, "parameters") {
            self.record_parameters(params, &qn);
        }

        let caller = Caller {
            qn,
            kind,
            enclosing_type: type_qn.to_string(),
            parsed,
        };
        if let Some(body) = child_by_field(node, "body") {
            self.walk_body(body, &caller);
        }
    }

    fn record_parameters(&mut self, params: Node<'_>, scope_qn: &str) {
        let mut cursor = params.walk();
        for param in params.named_children(&mut cursor) {
            let (ty, name) = match param.kind() {
                "formal_parameter" => (
                    child_by_field(param, "type"),
                    child_by_field(param, "name"),
                ),
                "spread_parameter" => {
                    let mut inner = param.walk();
                    let children: Vec<Node<'_>> = param.named_children(&mut inner).collect();
                    let ty = children
                        .iter()
                        .find(|c| c.kind().ends_with("type") || c.kind() == "type_identifier")
                        .copied();
                    let name = children
                        .iter()
                        .find(|c| c.kind() == "variable_declarator")
                        .and_then(|d| child_by_field(*d, "name"));
                    (ty, name)
                }
                _ => continue,
            };
            if let (Some(ty), Some(name)) = (ty, name) {
                self.bind(
                    scope_qn,
                    node_text(name, self.source).to_string(),
                    normalize_type(node_text(ty, self.source)),
                );
            }
        }
    }

    fn walk_body(&mut self, node: Node<'_>, caller: &Caller) {
        match node.kind() {
            "method_invocation" => self.record_call(node, caller),
            "local_variable_declaration" => self.record_locals(node, &caller.qn),
            "enhanced_for_statement" => {
                if let (Some(ty), Some(name)) =
                    (child_by_field(node, "type"), child_by_field(node, "name"))
                {
                    self.bind(
                        &caller.qn,
                        node_text(name, self.source).to_string(),
                        normalize_type(node_text(ty, self.source)),
                    );
                }
            }
            kind if type_kind(kind).is_some() => {
                self.walk_type(node, &caller.enclosing_type);
                return;
            }
            _ => {}
        }

        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.walk_body(child, caller);
        }
    }

    fn record_locals(&mut self, node: Node<'_>, scope_qn: &str) {
        let Some(ty) = child_by_field(node, "type") else {
            return;
        };
        let declared = normalize_type(node_text(ty, self.source));

        let mut cursor = node.walk();
        for declarator in node.children_by_field_name("declarator", &mut cursor) {
            let Some(name_node) = child_by_field(declarator, "name") else {
                continue;
            };
            // `var x = new Foo()` takes the constructed type.
            let resolved = if declared == "var" {
                child_by_field(declarator, "value")
                    .filter(|v| v.kind() == "object_creation_expression")
                    .and_then(|v| child_by_field(v, "type"))
                    .map(|t| normalize_type(node_text(t, self.source)))
            } else {
                Some(declared.clone())
            };
            if let Some(resolved) = resolved {
                self.bind(
                    scope_qn,
                    node_text(name_node, self.source).to_string(),
                    resolved,
                );
            }
        }
    }

    fn record_call(&mut self, node: Node<'_>, caller: &Caller) {
        let Some(name_node) = child_by_field(node, "name") else {
            return;
        };
        let member = node_text(name_node, self.source).to_string();
        let receiver = child_by_field(node, "object").map(|o| compact_text(o, self.source));
        let call_text = match &receiver {
            Some(r) => format!("{r}.{member}"),
            None => member.clone(),
        };

        self.calls.push(CallSite {
            caller_qn: caller.qn.clone(),
            caller_kind: caller.kind,
            enclosing_type: Some(caller.enclosing_type.clone()),
            call_text,
            receiver,
            member,
            span: node_range(node),
            arg_count: child_by_field(node, "arguments").map_or(0, named_arg_count),
            caller_parsed: caller.parsed,
        });
    }

    fn bind(&mut self, scope_qn: &str, name: String, declared: String) {
        self.bindings
            .entry(scope_qn.to_string())
            .or_default()
            .insert(name, declared);
    }
}

/// Dotted name of the first `package` declaration, if any.
fn declared_package(root: Node<'_>, source: &str) -> Option<String> {
    let mut cursor = root.walk();
    let declaration = root
        .named_children(&mut cursor)
        .find(|c| c.kind() == "package_declaration")?;
    let mut cursor = declaration.walk();
    declaration
        .named_children(&mut cursor)
        .find(|c| matches!(c.kind(), "scoped_identifier" | "identifier"))
        .map(|name| compact_text(name, source))
}

fn type_kind(node_kind: &str) -> Option<SymbolKind> {
    match node_kind {
        "class_declaration" | "record_declaration" => Some(SymbolKind::Class),
        "interface_declaration" | "annotation_type_declaration" => Some(SymbolKind::Interface),
        "enum_declaration" => Some(SymbolKind::Enum),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    fn extract(project: &str, path: &str, source: &str) -> ParsedModule {
        let ctx = ModuleContext::new(project, Path::new(path));
        JavaSupport.parse(source, &ctx).unwrap()
    }

    const APP: &str = r"package com.example.app;

import com.example.lib.LibraryClass;
import static com.example.lib.Helpers.shout;
import java.util.*;

/** Entry point. */
public class App {
    private final LibraryClass library = new LibraryClass();
    private TelemetryProvider telemetryProvider;

    public App(TelemetryProvider provider) {
        this.telemetryProvider = provider;
    }

    public void run() {
        library.greet();
        LibraryClass.greet();
        telemetryProvider.resolveCoordinate(1, 2);
        com.example.lib.LibraryClass.greet();
        helper();
        this.helper();
        shout();
    }

    private void helper() {
        for (String s : names()) {
            s.trim();
        }
        var local = new Worker();
        local.work();
    }
}
";

    #[test]
    fn extracts_package_imports_and_declarations() {
        let m = extract("consumer", "src/main/java/com/example/app/App.java", APP);

        assert_eq!(m.module_qn, "consumer.src.main.java.com.example.app.App");
        assert_eq!(m.package.as_deref(), Some("com.example.app"));
        assert_eq!(
            m.imports.get("LibraryClass").map(String::as_str),
            Some("com.example.lib.LibraryClass")
        );
        assert_eq!(
            m.imports.get("shout").map(String::as_str),
            Some("com.example.lib.Helpers.shout")
        );
        assert_eq!(m.imports.len(), 2, "wildcard imports bind nothing");

        let class_qn = "consumer.src.main.java.com.example.app.App.App";
        let class = m.declaration(class_qn).expect("class declared");
        assert_eq!(class.kind, SymbolKind::Class);
        assert_eq!(class.docstring.as_deref(), Some("Entry point."));

        let run = m.declaration(&format!("{class_qn}.run")).expect("run declared");
        assert_eq!(run.kind, SymbolKind::Method);
        assert!(run.parsed);
        assert_eq!(run.parent_qn, class_qn);

        let ctor = m.declaration(&format!("{class_qn}.App")).expect("ctor declared");
        assert_eq!(ctor.kind, SymbolKind::Constructor);

        let field = m
            .declaration(&format!("{class_qn}.telemetryProvider"))
            .expect("field declared");
        assert_eq!(field.kind, SymbolKind::Field);
    }

    #[test]
    fn captures_call_sites_with_receivers() {
        let m = extract("consumer", "src/main/java/com/example/app/App.java", APP);
        let run_qn = "consumer.src.main.java.com.example.app.App.App.run";
        let texts: Vec<&str> = m
            .calls
            .iter()
            .filter(|c| c.caller_qn == run_qn)
            .map(|c| c.call_text.as_str())
            .collect();

        assert_eq!(
            texts,
            vec![
                "library.greet",
                "LibraryClass.greet",
                "telemetryProvider.resolveCoordinate",
                "com.example.lib.LibraryClass.greet",
                "helper",
                "this.helper",
                "shout",
            ]
        );

        let telemetry = m
            .calls
            .iter()
            .find(|c| c.member == "resolveCoordinate")
            .unwrap();
        assert_eq!(telemetry.receiver.as_deref(), Some("telemetryProvider"));
        assert_eq!(telemetry.arg_count, 2);
        assert_eq!(telemetry.line(), 19);
        assert_eq!(
            telemetry.enclosing_type.as_deref(),
            Some("consumer.src.main.java.com.example.app.App.App")
        );
    }

    #[test]
    fn records_type_bindings_per_scope() {
        let m = extract("consumer", "src/main/java/com/example/app/App.java", APP);
        let class_qn = "consumer.src.main.java.com.example.app.App.App";

        let fields = &m.bindings[class_qn];
        assert_eq!(fields["library"], "LibraryClass");
        assert_eq!(fields["telemetryProvider"], "TelemetryProvider");

        let ctor = &m.bindings[&format!("{class_qn}.App")];
        assert_eq!(ctor["provider"], "TelemetryProvider");

        let helper = &m.bindings[&format!("{class_qn}.helper")];
        assert_eq!(helper["s"], "String");
        assert_eq!(helper["local"], "Worker");
    }

    #[test]
    fn nested_and_enum_types() {
        let source = r"package p;
enum Mode {
    ON, OFF;
    void flip() { toggle(); }
}
interface Shape { double area(); }
class Outer {
    static class Inner {
        void go() {}
    }
}
";
        let m = extract("proj", "p/Shapes.java", source);
        let kinds: Vec<(&str, SymbolKind)> = m
            .declarations
            .iter()
            .map(|d| (d.qualified_name.as_str(), d.kind))
            .collect();
        assert!(kinds.contains(&("proj.p.Shapes.Mode", SymbolKind::Enum)));
        assert!(kinds.contains(&("proj.p.Shapes.Mode.flip", SymbolKind::Method)));
        assert!(kinds.contains(&("proj.p.Shapes.Shape", SymbolKind::Interface)));
        assert!(kinds.contains(&("proj.p.Shapes.Shape.area", SymbolKind::Method)));
        assert!(kinds.contains(&("proj.p.Shapes.Outer.Inner", SymbolKind::Class)));
        assert!(kinds.contains(&("proj.p.Shapes.Outer.Inner.go", SymbolKind::Method)));
        assert_eq!(m.calls.len(), 1);
        assert_eq!(m.calls[0].caller_qn, "proj.p.Shapes.Mode.flip");
    }

    #[test]
    fn broken_method_is_flagged_unparsed() {
        let source = "class A {\n    void ok() { fine(); }\n    void run() { int x = ; helper.go(); }\n}\n";
        let m = extract("p", "A.java", source);

        let ok = m.declaration("p.A.A.ok").expect("ok declared");
        assert!(ok.parsed);
        assert!(
            m.calls
                .iter()
                .filter(|c| c.caller_qn == "p.A.A.run")
                .all(|c| !c.caller_parsed)
        );
        if let Some(run) = m.declaration("p.A.A.run") {
            assert!(!run.parsed);
        }
    }
}
