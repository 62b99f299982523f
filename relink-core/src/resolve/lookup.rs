//! Batched backend lookup: one exact and one suffix query for every
//! candidate collected in a pass.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use relink_graphs::module_path::last_segment;
use tracing::{debug, instrument};

use crate::store::GraphBackend;
use crate::types::{FetchRow, LookupQuery, NodeLabel, NodeRef};

/// Union of candidates awaiting the two batched fetches.
#[derive(Debug, Clone, Default)]
pub struct BatchedLookup {
    candidates: BTreeSet<String>,
}

impl BatchedLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<I, S>(&mut self, candidates: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for candidate in candidates {
            let candidate = candidate.as_ref().trim_start_matches('.');
            if !candidate.is_empty() {
                self.candidates.insert(candidate.to_string());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Issue the exact and suffix fetches. Nothing is sent when no
    /// candidate was collected.
    #[instrument(skip_all, name = "batched_lookup")]
    pub async fn execute(
        self,
        backend: &dyn GraphBackend,
        labels: &[NodeLabel],
    ) -> crate::error::Result<LookupResults> {
        if self.candidates.is_empty() {
            debug!("No candidates, skipping backend lookup");
            return Ok(LookupResults::default());
        }

        let suffixes: Vec<String> = self.candidates.iter().map(|c| format!(".{c}")).collect();
        let exact = LookupQuery::Exact {
            qualified_names: self.candidates.into_iter().collect(),
            allowed_labels: labels.to_vec(),
        };
        let suffix = LookupQuery::Suffix {
            suffixes,
            allowed_labels: labels.to_vec(),
        };

        let exact_rows = backend.fetch(&exact).await?;
        let suffix_rows = backend.fetch(&suffix).await?;
        debug!(
            candidates = exact.len(),
            exact_hits = exact_rows.len(),
            suffix_hits = suffix_rows.len(),
            "Batched lookup complete"
        );
        Ok(LookupResults::from_rows(exact_rows, suffix_rows, labels))
    }
}

/// Rows returned by one batched lookup, ready for per-call selection.
#[derive(Debug, Clone, Default)]
pub struct LookupResults {
    exact: BTreeMap<String, NodeLabel>,
    /// Last segment → suffix-query hits, sorted by qualified name.
    suffix: HashMap<String, BTreeMap<String, NodeLabel>>,
}

impl LookupResults {
    fn from_rows(exact: Vec<FetchRow>, suffix: Vec<FetchRow>, labels: &[NodeLabel]) -> Self {
        let mut results = Self::default();
        for (qualified_name, label) in exact.into_iter().filter_map(|r| allowed(r, labels)) {
            results.exact.insert(qualified_name, label);
        }
        for (qualified_name, label) in suffix.into_iter().filter_map(|r| allowed(r, labels)) {
            results
                .suffix
                .entry(last_segment(&qualified_name).to_string())
                .or_default()
                .insert(qualified_name, label);
        }
        results
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.suffix.is_empty()
    }

    /// Pick the target for one call's ordered candidates: exact hits beat
    /// suffix hits, the first candidate with a hit wins within a tier, and
    /// the smallest qualified name wins among one candidate's hits.
    pub fn resolve(&self, candidates: &[String]) -> Option<NodeRef> {
        for candidate in candidates {
            if let Some((qn, label)) = self.exact.get_key_value(candidate.as_str()) {
                return Some(NodeRef::new(*label, qn.clone()));
            }
        }
        candidates.iter().find_map(|candidate| {
            let candidate = candidate.trim_start_matches('.');
            let dotted = format!(".{candidate}");
            self.suffix
                .get(last_segment(candidate))?
                .iter()
                .find(|(qn, _)| qn.ends_with(&dotted))
                .map(|(qn, label)| NodeRef::new(*label, qn.clone()))
        })
    }
}

/// First allowed label of a row; rows carry their labels sorted.
fn allowed(row: FetchRow, labels: &[NodeLabel]) -> Option<(String, NodeLabel)> {
    let label = row.labels.iter().copied().find(|l| labels.contains(l))?;
    Some((row.qualified_name, label))
}
