//! Ingestion pass: discover, parse, register, write structure, resolve calls
//! and reconcile the pending set.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use rayon::prelude::*;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use relink_graphs::{LanguageRegistry, ModuleContext, ParsedModule};

use crate::config::{IngestSection, RelinkConfig};
use crate::error::{ExtractError, RelinkError};
use crate::pending::PendingCallStore;
use crate::registry::QualifiedNameRegistry;
use crate::resolve::{
    BatchedLookup, BindingTypeInference, CallOutcome, CallResolver, FirstPartyFilter, ImportTable,
    LookupResults,
};
use crate::store::GraphBackend;
use crate::types::{NodeLabel, NodeRef, PendingCall, ProjectRecord, Properties, RelType, Resolution};

/// Statistics for one ingestion pass.
#[derive(Debug, Default)]
pub struct IngestStats {
    pub project: String,
    pub files: usize,
    pub modules: usize,
    pub definitions: usize,
    pub calls: usize,
    pub local_edges: usize,
    pub cross_project_edges: usize,
    pub reconciled_edges: usize,
    pub pending_recorded: usize,
    pub candidates_dropped: usize,
    pub errors: Vec<(String, RelinkError)>,
    pub duration: Duration,
}

impl IngestStats {
    pub fn total_edges(&self) -> usize {
        self.local_edges + self.cross_project_edges + self.reconciled_edges
    }
}

/// Statistics for a standalone reconciliation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileStats {
    pub examined: usize,
    pub reconciled_edges: usize,
    pub retained: usize,
    /// Records whose caller failed to parse; never promoted.
    pub unparsed_retained: usize,
    pub duration: Duration,
}

/// A cross-project call of the current pass awaiting the batched lookup.
#[derive(Debug)]
struct DeferredCall {
    record: PendingCall,
    line: usize,
    arg_count: usize,
}

/// Runs ingestion passes over one backend, one pass at a time.
#[derive(Debug)]
pub struct Ingestor {
    config: RelinkConfig,
    languages: LanguageRegistry,
    /// Declarations of the most recent pass.
    registry: QualifiedNameRegistry,
}

impl Ingestor {
    pub fn new(config: RelinkConfig) -> Self {
        Self {
            config,
            languages: LanguageRegistry::new(),
            registry: QualifiedNameRegistry::new(),
        }
    }

    pub fn config(&self) -> &RelinkConfig {
        &self.config
    }

    /// Registry built by the most recent pass.
    pub fn registry(&self) -> &QualifiedNameRegistry {
        &self.registry
    }

    /// Ingest the project at `root`, named after its directory.
    pub async fn ingest(
        &mut self,
        backend: &dyn GraphBackend,
        root: &Path,
    ) -> crate::error::Result<IngestStats> {
        let name = project_name(root)?;
        self.ingest_named(backend, root, &name).await
    }

    /// Ingest the project at `root` under an explicit project name.
    #[instrument(skip_all, name = "ingest", fields(project = %name))]
    pub async fn ingest_named(
        &mut self,
        backend: &dyn GraphBackend,
        root: &Path,
        name: &str,
    ) -> crate::error::Result<IngestStats> {
        let start = Instant::now();
        if !root.is_dir() {
            return Err(ExtractError::ProjectRoot(root.display().to_string()).into());
        }
        let mut stats = IngestStats {
            project: name.to_string(),
            ..Default::default()
        };

        let files = discover_files(root, &self.config.ingest);
        stats.files = files.len();
        info!(file_count = files.len(), "Discovered source files");

        let modules = self.parse_files(root, name, &files, &mut stats);
        stats.modules = modules.len();

        self.registry = QualifiedNameRegistry::new();
        for module in &modules {
            self.registry.insert(&module.module_qn, NodeLabel::Module);
            for decl in module.declarations.iter().filter(|d| d.parsed) {
                self.registry.insert(&decl.qualified_name, decl.kind.into());
            }
        }

        self.write_structure(backend, root, name, &modules, &mut stats)
            .await?;
        backend
            .record_project(&ProjectRecord {
                name: name.to_string(),
                namespaces: project_namespaces(name, &modules),
                ingested_at: Utc::now(),
            })
            .await?;
        backend.flush().await?;

        // Stored records of this project are superseded by this pass.
        let pending = PendingCallStore::new(backend);
        let mut snapshot = pending.snapshot().await?;
        snapshot.promotable.retain(|c| c.project_name != name);
        snapshot.unparsed.retain(|c| c.project_name != name);

        let mut filter = FirstPartyFilter::new(self.config.resolution.root_segments);
        for (qn, _) in self.registry.iter() {
            filter.track(&qn);
        }
        for project in backend.projects().await? {
            filter.track(&project.name);
            for namespace in &project.namespaces {
                filter.track(namespace);
                filter.track(&format!("{}.{namespace}", project.name));
            }
        }
        filter.track_all(snapshot.module_qns());

        let labels = self.config.resolution.callable_labels.clone();
        let imports = ImportTable::from_modules(&modules);
        let types = BindingTypeInference::from_modules(&modules);
        let resolver = CallResolver::new(&self.registry, &labels, &imports, &types, &filter);

        let mut written: HashSet<(NodeRef, NodeRef)> = HashSet::new();
        let mut deferred: Vec<DeferredCall> = Vec::new();
        let mut unparsed: Vec<PendingCall> = Vec::new();

        for module in &modules {
            for site in &module.calls {
                stats.calls += 1;
                let resolved = resolver.resolve(site, &module.module_qn, &module.language);
                stats.candidates_dropped += resolved.rejected.len();
                let record = |candidates: Vec<String>, parsed: bool| PendingCall {
                    caller_type: site.caller_kind.into(),
                    caller_qn: site.caller_qn.clone(),
                    module_qn: module.module_qn.clone(),
                    project_name: name.to_string(),
                    call_name: site.call_text.clone(),
                    candidates,
                    language: module.language.clone(),
                    caller_was_parsed: parsed,
                };

                match resolved.outcome {
                    CallOutcome::Local(target) => {
                        let Some(label) = self.registry.get(&target) else {
                            continue;
                        };
                        let caller = NodeRef::new(site.caller_kind.into(), site.caller_qn.clone());
                        let callee = NodeRef::new(label, target);
                        let properties = call_properties(
                            &site.call_text,
                            Some((site.line(), site.arg_count)),
                            Resolution::Local,
                        );
                        if write_call(backend, &mut written, caller, callee, properties).await? {
                            stats.local_edges += 1;
                        }
                    }
                    CallOutcome::Deferred(candidates) => deferred.push(DeferredCall {
                        record: record(candidates, true),
                        line: site.line(),
                        arg_count: site.arg_count,
                    }),
                    CallOutcome::Unparsed(candidates) => unparsed.push(record(candidates, false)),
                    CallOutcome::Dropped => {
                        debug!(caller = %site.caller_qn, call = %site.call_text, "Call dropped");
                    }
                }
            }
        }

        let mut batch = BatchedLookup::new();
        for call in &deferred {
            batch.add(&call.record.candidates);
        }
        for call in &snapshot.promotable {
            batch.add(&call.candidates);
        }
        let results = batch.execute(backend, &labels).await?;

        let mut new_pending = Vec::new();
        for call in deferred {
            let Some(callee) = results.resolve(&call.record.candidates) else {
                new_pending.push(call.record);
                continue;
            };
            let properties = call_properties(
                &call.record.call_name,
                Some((call.line, call.arg_count)),
                Resolution::CrossProject,
            );
            if write_call(backend, &mut written, call.record.caller_ref(), callee, properties).await?
            {
                stats.cross_project_edges += 1;
            }
        }

        let (reconciled, mut remaining) =
            promote(backend, &results, snapshot.promotable, &mut written).await?;
        stats.reconciled_edges = reconciled;

        stats.pending_recorded = new_pending.len() + unparsed.len();
        remaining.extend(snapshot.unparsed);
        remaining.extend(new_pending);
        remaining.extend(unparsed);

        backend.flush().await?;
        pending.replace(&remaining).await?;

        stats.duration = start.elapsed();
        info!(
            files = stats.files,
            modules = stats.modules,
            calls = stats.calls,
            local_edges = stats.local_edges,
            cross_project_edges = stats.cross_project_edges,
            reconciled_edges = stats.reconciled_edges,
            pending = stats.pending_recorded,
            errors = stats.errors.len(),
            duration = ?stats.duration,
            "Ingestion pass complete"
        );
        Ok(stats)
    }

    /// Re-evaluate every stored pending call against the backend.
    #[instrument(skip_all, name = "reconcile")]
    pub async fn reconcile(
        &self,
        backend: &dyn GraphBackend,
    ) -> crate::error::Result<ReconcileStats> {
        let start = Instant::now();
        let pending = PendingCallStore::new(backend);
        let snapshot = pending.snapshot().await?;
        let mut stats = ReconcileStats {
            examined: snapshot.len(),
            unparsed_retained: snapshot.unparsed.len(),
            ..Default::default()
        };

        let mut batch = BatchedLookup::new();
        for call in &snapshot.promotable {
            batch.add(&call.candidates);
        }
        let results = batch
            .execute(backend, &self.config.resolution.callable_labels)
            .await?;

        let mut written = HashSet::new();
        let (reconciled, mut remaining) =
            promote(backend, &results, snapshot.promotable, &mut written).await?;
        stats.reconciled_edges = reconciled;
        stats.retained = remaining.len();
        remaining.extend(snapshot.unparsed);

        backend.flush().await?;
        pending.replace(&remaining).await?;

        stats.duration = start.elapsed();
        info!(
            examined = stats.examined,
            reconciled = stats.reconciled_edges,
            retained = stats.retained,
            unparsed = stats.unparsed_retained,
            "Reconciliation complete"
        );
        Ok(stats)
    }

    fn parse_files(
        &self,
        root: &Path,
        name: &str,
        files: &[PathBuf],
        stats: &mut IngestStats,
    ) -> Vec<ParsedModule> {
        let max_size = self.config.ingest.max_file_size;
        let parsed: Vec<(String, crate::error::Result<ParsedModule>)> = files
            .par_iter()
            .map(|path| {
                let relative = path.strip_prefix(root).unwrap_or(path);
                let display = relative.to_string_lossy().to_string();
                (display, self.parse_file(path, relative, name, max_size))
            })
            .collect();

        let mut modules = Vec::with_capacity(parsed.len());
        for (path, result) in parsed {
            match result {
                Ok(module) => modules.push(module),
                Err(e) => {
                    warn!(path = %path, error = %e, "Failed to parse file");
                    stats.errors.push((path, e));
                }
            }
        }
        modules
    }

    fn parse_file(
        &self,
        path: &Path,
        relative: &Path,
        name: &str,
        max_size: u64,
    ) -> crate::error::Result<ParsedModule> {
        let size = std::fs::metadata(path).map_err(ExtractError::Io)?.len();
        if size > max_size {
            return Err(ExtractError::TooLarge {
                path: relative.display().to_string(),
                size,
            }
            .into());
        }
        let language = self.languages.for_file(path).ok_or_else(|| {
            relink_graphs::GraphError::UnsupportedLanguage(relative.display().to_string())
        })?;
        let source = std::fs::read_to_string(path).map_err(ExtractError::Io)?;
        let ctx = ModuleContext::new(name, relative);
        Ok(language.parse(&source, &ctx)?)
    }

    async fn write_structure(
        &self,
        backend: &dyn GraphBackend,
        root: &Path,
        name: &str,
        modules: &[ParsedModule],
        stats: &mut IngestStats,
    ) -> crate::error::Result<()> {
        let project = NodeRef::new(NodeLabel::Project, name);
        let mut properties = Properties::new();
        properties.insert("name".into(), Value::from(name));
        properties.insert("root".into(), Value::from(root.display().to_string()));
        properties.insert("modules".into(), Value::from(modules.len()));
        backend
            .ensure_node(NodeLabel::Project, name, properties)
            .await?;

        for module in modules {
            let module_ref = NodeRef::new(NodeLabel::Module, module.module_qn.clone());
            let mut properties = Properties::new();
            properties.insert(
                "name".into(),
                Value::from(relink_graphs::module_path::last_segment(&module.module_qn)),
            );
            properties.insert(
                "path".into(),
                Value::from(module.relative_path.display().to_string()),
            );
            properties.insert("language".into(), Value::from(module.language.as_str()));
            properties.insert("line_count".into(), Value::from(module.line_count));
            if let Some(package) = &module.package {
                properties.insert("package".into(), Value::from(package.as_str()));
            }
            if let Some(doc) = &module.docstring {
                properties.insert("docstring".into(), Value::from(doc.as_str()));
            }
            backend
                .ensure_node(NodeLabel::Module, &module.module_qn, properties)
                .await?;
            backend
                .ensure_relationship(&project, RelType::ContainsModule, &module_ref, Properties::new())
                .await?;

            for decl in module.declarations.iter().filter(|d| d.parsed) {
                let label = NodeLabel::from(decl.kind);
                let mut properties = Properties::new();
                properties.insert("name".into(), Value::from(decl.name.as_str()));
                properties.insert(
                    "path".into(),
                    Value::from(module.relative_path.display().to_string()),
                );
                properties.insert("start_line".into(), Value::from(decl.span.start_line()));
                properties.insert("end_line".into(), Value::from(decl.span.end_line()));
                if let Some(doc) = &decl.docstring {
                    properties.insert("docstring".into(), Value::from(doc.as_str()));
                }
                backend
                    .ensure_node(label, &decl.qualified_name, properties)
                    .await?;
                stats.definitions += 1;

                let target = NodeRef::new(label, decl.qualified_name.clone());
                let parent_label = if decl.parent_qn == module.module_qn {
                    Some(NodeLabel::Module)
                } else {
                    self.registry.get(&decl.parent_qn)
                };
                if let Some(parent_label) = parent_label {
                    let rel_type = if parent_label.is_type() {
                        RelType::DefinesMethod
                    } else {
                        RelType::Defines
                    };
                    let parent = NodeRef::new(parent_label, decl.parent_qn.clone());
                    backend
                        .ensure_relationship(&parent, rel_type, &target, Properties::new())
                        .await?;
                }
            }
        }
        Ok(())
    }
}

/// Promote stored records the lookup can satisfy. Returns the number of
/// edges written and the records still unmatched.
async fn promote(
    backend: &dyn GraphBackend,
    results: &LookupResults,
    records: Vec<PendingCall>,
    written: &mut HashSet<(NodeRef, NodeRef)>,
) -> crate::error::Result<(usize, Vec<PendingCall>)> {
    let mut edges = 0;
    let mut remaining = Vec::new();
    for record in records {
        let Some(callee) = results.resolve(&record.candidates) else {
            remaining.push(record);
            continue;
        };
        debug!(caller = %record.caller_qn, callee = %callee.qualified_name, "Reconciled pending call");
        let properties = call_properties(&record.call_name, None, Resolution::Reconciled);
        if write_call(backend, written, record.caller_ref(), callee, properties).await? {
            edges += 1;
        }
    }
    Ok((edges, remaining))
}

/// Write a `CALLS` edge unless the pair was already written this pass.
async fn write_call(
    backend: &dyn GraphBackend,
    written: &mut HashSet<(NodeRef, NodeRef)>,
    caller: NodeRef,
    callee: NodeRef,
    properties: Properties,
) -> crate::error::Result<bool> {
    if written.contains(&(caller.clone(), callee.clone())) {
        return Ok(false);
    }
    backend
        .ensure_relationship(&caller, RelType::Calls, &callee, properties)
        .await?;
    written.insert((caller, callee));
    Ok(true)
}

fn call_properties(
    call_name: &str,
    site: Option<(usize, usize)>,
    resolution: Resolution,
) -> Properties {
    let mut properties = Properties::new();
    properties.insert("call_name".into(), Value::from(call_name));
    if let Some((line, arg_count)) = site {
        properties.insert("line".into(), Value::from(line));
        properties.insert("arg_count".into(), Value::from(arg_count));
    }
    properties.insert("resolution".into(), Value::from(resolution.as_str()));
    properties
}

/// Module qualified names without the project prefix.
fn project_namespaces(name: &str, modules: &[ParsedModule]) -> BTreeSet<String> {
    let prefix = format!("{name}.");
    modules
        .iter()
        .filter_map(|m| m.module_qn.strip_prefix(&prefix))
        .map(str::to_string)
        .collect()
}

fn project_name(root: &Path) -> crate::error::Result<String> {
    let canonical =
        std::fs::canonicalize(root).map_err(|_| ExtractError::ProjectRoot(root.display().to_string()))?;
    canonical
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| ExtractError::ProjectRoot(root.display().to_string()).into())
}

// ── Discovery ──────────────────────────────────────────────────────

/// Files under `root` matching the include patterns and none of the
/// exclude patterns, sorted.
pub fn discover_files(root: &Path, section: &IngestSection) -> Vec<PathBuf> {
    let excludes = compile_excludes(&section.exclude_patterns);
    let mut matched = Vec::new();
    for pattern in &section.include_patterns {
        let full_pattern = root.join(pattern).to_string_lossy().to_string();
        match glob::glob(&full_pattern) {
            Ok(paths) => {
                for entry in paths.flatten() {
                    if entry.is_file() && !is_excluded(&entry, root, &excludes) {
                        matched.push(entry);
                    }
                }
            }
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "Invalid glob pattern");
            }
        }
    }
    matched.sort();
    matched.dedup();
    matched
}

fn compile_excludes(patterns: &[String]) -> Vec<glob::Pattern> {
    patterns
        .iter()
        .filter_map(|pattern| match glob::Pattern::new(pattern) {
            Ok(compiled) => Some(compiled),
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "Invalid exclude pattern");
                None
            }
        })
        .collect()
}

/// Exclude patterns match the path relative to the project root, so a
/// `**/build/**` pattern never catches a `buildinfo` package.
fn is_excluded(path: &Path, root: &Path, excludes: &[glob::Pattern]) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    excludes.iter().any(|pattern| pattern.matches_path(relative))
}
