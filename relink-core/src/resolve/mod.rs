//! Call resolution: local binding, candidate generation, first-party
//! filtering and the batched backend lookup.

pub mod candidates;
pub mod context;
pub mod first_party;
pub mod local;
pub mod lookup;

pub use context::{BindingTypeInference, ImportResolver, ImportTable, TypeInference};
pub use first_party::FirstPartyFilter;
pub use local::LocalResolver;
pub use lookup::{BatchedLookup, LookupResults};

use relink_graphs::CallSite;

use crate::registry::QualifiedNameRegistry;
use crate::types::NodeLabel;

/// What happened to one call site before the backend is consulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    /// Bound to a callable of the current project.
    Local(String),
    /// Needs the batched lookup; ordered surviving candidates.
    Deferred(Vec<String>),
    /// The caller failed to parse. Recorded as pending, never promoted.
    Unparsed(Vec<String>),
    /// No candidate survived.
    Dropped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCall {
    pub outcome: CallOutcome,
    /// Candidates the first-party filter rejected.
    pub rejected: Vec<String>,
}

/// Per-pass resolver over the current registry and its collaborators.
pub struct CallResolver<'a> {
    local: LocalResolver<'a>,
    imports: &'a dyn ImportResolver,
    types: &'a dyn TypeInference,
    filter: &'a FirstPartyFilter,
}

impl std::fmt::Debug for CallResolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallResolver")
            .field("local", &self.local)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

impl<'a> CallResolver<'a> {
    pub fn new(
        registry: &'a QualifiedNameRegistry,
        callable_labels: &'a [NodeLabel],
        imports: &'a dyn ImportResolver,
        types: &'a dyn TypeInference,
        filter: &'a FirstPartyFilter,
    ) -> Self {
        Self {
            local: LocalResolver::new(registry, callable_labels),
            imports,
            types,
            filter,
        }
    }

    pub fn resolve(&self, site: &CallSite, module_qn: &str, language: &str) -> ResolvedCall {
        let imports = self.imports.imports_for(module_qn);
        let types = self.types.local_types(site, module_qn, language);
        let local = self
            .local
            .resolve(site, module_qn, language, imports, &types);

        if site.caller_parsed {
            if let Some(target) = local {
                return ResolvedCall {
                    outcome: CallOutcome::Local(target),
                    rejected: Vec::new(),
                };
            }
        }

        let generated = candidates::generate(site, imports, &types, language);
        let (kept, rejected) = self.filter.partition(generated);

        let outcome = if site.caller_parsed {
            if kept.is_empty() {
                CallOutcome::Dropped
            } else {
                CallOutcome::Deferred(kept)
            }
        } else {
            let mut all: Vec<String> = local.into_iter().collect();
            for candidate in kept {
                if !all.contains(&candidate) {
                    all.push(candidate);
                }
            }
            if all.is_empty() {
                CallOutcome::Dropped
            } else {
                CallOutcome::Unparsed(all)
            }
        };
        ResolvedCall { outcome, rejected }
    }
}
