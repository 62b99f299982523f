mod helpers;
pub mod java;
pub mod python;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::module_path::module_qualified_name;
use crate::{GraphError, ParsedModule, Result};

/// Where a file sits: owning project, path relative to the project root,
/// and the module qualified name derived from both.
#[derive(Debug, Clone)]
pub struct ModuleContext {
    pub project_name: String,
    pub relative_path: PathBuf,
    pub module_qn: String,
}

impl ModuleContext {
    pub fn new(project_name: &str, relative_path: &Path) -> Self {
        Self {
            project_name: project_name.to_string(),
            relative_path: relative_path.to_path_buf(),
            module_qn: module_qualified_name(project_name, relative_path),
        }
    }

    /// Package qualified name the module's relative imports are anchored to.
    pub fn package_qn(&self) -> &str {
        let is_init = self
            .relative_path
            .file_stem()
            .is_some_and(|stem| stem == "__init__");
        if is_init {
            &self.module_qn
        } else {
            crate::module_path::parent_of(&self.module_qn)
        }
    }
}

/// Trait implemented by each language's extraction support.
pub trait LanguageSupport: Send + Sync + std::fmt::Debug {
    /// Language identifier (e.g., "java", "python").
    fn id(&self) -> &'static str;

    /// File extensions this language handles.
    fn extensions(&self) -> &'static [&'static str];

    /// Tree-sitter language for parsing.
    fn tree_sitter_language(&self) -> tree_sitter::Language;

    /// Extract declarations, call sites, imports and type bindings.
    fn extract(
        &self,
        tree: &tree_sitter::Tree,
        source: &str,
        ctx: &ModuleContext,
    ) -> Result<ParsedModule>;

    /// Parse `source` and run [`LanguageSupport::extract`] over the tree.
    fn parse(&self, source: &str, ctx: &ModuleContext) -> Result<ParsedModule> {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&self.tree_sitter_language())
            .map_err(|e| GraphError::TreeSitter(e.to_string()))?;
        let tree = parser.parse(source, None).ok_or_else(|| GraphError::Parse {
            path: ctx.relative_path.display().to_string(),
            message: "parser returned no tree".to_string(),
        })?;
        if tree.root_node().has_error() {
            tracing::debug!(
                path = %ctx.relative_path.display(),
                language = self.id(),
                "Syntax errors in parse tree"
            );
        }
        self.extract(&tree, source, ctx)
    }
}

/// Registry of all supported languages.
#[derive(Debug)]
pub struct LanguageRegistry {
    languages: HashMap<String, Arc<dyn LanguageSupport>>,
    extension_map: HashMap<String, String>,
}

impl LanguageRegistry {
    pub fn new() -> Self {
        let mut reg = Self {
            languages: HashMap::new(),
            extension_map: HashMap::new(),
        };
        reg.register(Arc::new(java::JavaSupport));
        reg.register(Arc::new(python::PythonSupport));
        reg
    }

    pub fn register(&mut self, lang: Arc<dyn LanguageSupport>) {
        for ext in lang.extensions() {
            self.extension_map
                .insert((*ext).to_string(), lang.id().to_string());
        }
        self.languages.insert(lang.id().to_string(), lang);
    }

    /// Look up the language support for a file by its extension.
    pub fn for_file(&self, path: &Path) -> Option<Arc<dyn LanguageSupport>> {
        let ext = path.extension()?.to_str()?;
        let lang_id = self.extension_map.get(ext)?;
        self.languages.get(lang_id).cloned()
    }

    /// Get a language by its identifier.
    pub fn get(&self, id: &str) -> Option<Arc<dyn LanguageSupport>> {
        self.languages.get(id).cloned()
    }

    /// List all registered language IDs, sorted.
    pub fn language_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.languages.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::new()
    }
}
