//! Collaborators the resolver consults per call site: the import map and
//! the local type map.

use std::collections::{BTreeMap, HashMap};

use relink_graphs::{CallSite, ImportMap, ParsedModule, TypeBindings};

/// Provides the import map of a module: local symbol → fully qualified path.
pub trait ImportResolver: Send + Sync {
    fn imports_for(&self, module_qn: &str) -> Option<&ImportMap>;
}

/// Provides variable name → declared type for a call site's scope. Types are
/// fully qualified when an import supplies them. May be empty.
pub trait TypeInference: Send + Sync {
    fn local_types(
        &self,
        caller: &CallSite,
        module_qn: &str,
        language: &str,
    ) -> HashMap<String, String>;
}

/// Import maps captured by the front end, keyed by module qualified name.
#[derive(Debug, Clone, Default)]
pub struct ImportTable {
    modules: HashMap<String, ImportMap>,
}

impl ImportTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_modules(modules: &[ParsedModule]) -> Self {
        let mut table = Self::new();
        for module in modules {
            table.insert(&module.module_qn, module.imports.clone());
        }
        table
    }

    pub fn insert(&mut self, module_qn: &str, imports: ImportMap) {
        self.modules.insert(module_qn.to_string(), imports);
    }
}

impl ImportResolver for ImportTable {
    fn imports_for(&self, module_qn: &str) -> Option<&ImportMap> {
        self.modules.get(module_qn)
    }
}

/// Resolve a symbol (or a dotted path starting with one) through an import map.
///
/// `ac` → `analytics.client`; `ac.sub` → `analytics.client.sub`.
pub fn resolve_through_imports(symbol: &str, imports: Option<&ImportMap>) -> Option<String> {
    let imports = imports?;
    if let Some(fq) = imports.get(symbol) {
        return Some(fq.clone());
    }
    let (head, rest) = symbol.split_once('.')?;
    imports.get(head).map(|fq| format!("{fq}.{rest}"))
}

/// Default [`TypeInference`]: merges the field bindings of the caller's
/// enclosing type with the caller's own parameter and local bindings (the
/// latter shadow the former), then qualifies simple type names through the
/// module's imports.
#[derive(Debug, Clone, Default)]
pub struct BindingTypeInference {
    bindings: HashMap<String, BTreeMap<String, TypeBindings>>,
    imports: ImportTable,
}

impl BindingTypeInference {
    pub fn from_modules(modules: &[ParsedModule]) -> Self {
        Self {
            bindings: modules
                .iter()
                .map(|m| (m.module_qn.clone(), m.bindings.clone()))
                .collect(),
            imports: ImportTable::from_modules(modules),
        }
    }
}

impl TypeInference for BindingTypeInference {
    fn local_types(
        &self,
        caller: &CallSite,
        module_qn: &str,
        _language: &str,
    ) -> HashMap<String, String> {
        let Some(scopes) = self.bindings.get(module_qn) else {
            return HashMap::new();
        };

        let mut merged: HashMap<String, String> = HashMap::new();
        if let Some(fields) = caller
            .enclosing_type
            .as_deref()
            .and_then(|t| scopes.get(t))
        {
            merged.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        if let Some(locals) = scopes.get(&caller.caller_qn) {
            merged.extend(locals.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        let imports = self.imports.imports_for(module_qn);
        for declared in merged.values_mut() {
            if let Some(fq) = resolve_through_imports(declared, imports) {
                *declared = fq;
            }
        }
        merged
    }
}
