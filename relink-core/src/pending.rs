//! Pending-call store: the durable set of call sites awaiting a definition.
//!
//! Single writer. A pass reads one full snapshot and writes back the full
//! remaining set, so concurrent passes against one backend are not supported.

use std::collections::BTreeSet;

use tracing::debug;

use crate::store::GraphBackend;
use crate::types::PendingCall;

/// Pending calls split by whether they may ever be promoted.
#[derive(Debug, Clone, Default)]
pub struct PendingSnapshot {
    /// `caller_was_parsed = true`: re-evaluated every pass.
    pub promotable: Vec<PendingCall>,
    /// `caller_was_parsed = false`: retained unchanged, never promoted.
    pub unparsed: Vec<PendingCall>,
}

impl PendingSnapshot {
    pub fn len(&self) -> usize {
        self.promotable.len() + self.unparsed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Module qualified names of every stored call (tracked namespaces).
    pub fn module_qns(&self) -> impl Iterator<Item = &str> {
        self.promotable
            .iter()
            .chain(&self.unparsed)
            .map(|c| c.module_qn.as_str())
    }
}

/// View over a backend's pending-call contract.
pub struct PendingCallStore<'a> {
    backend: &'a dyn GraphBackend,
}

impl std::fmt::Debug for PendingCallStore<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCallStore").finish_non_exhaustive()
    }
}

impl<'a> PendingCallStore<'a> {
    pub fn new(backend: &'a dyn GraphBackend) -> Self {
        Self { backend }
    }

    pub async fn record(&self, call: &PendingCall) -> crate::error::Result<()> {
        debug!(
            caller = %call.caller_qn,
            call = %call.call_name,
            candidates = call.candidates.len(),
            parsed = call.caller_was_parsed,
            "Deferring call"
        );
        self.backend.record_pending(call).await
    }

    pub async fn snapshot(&self) -> crate::error::Result<PendingSnapshot> {
        let (promotable, unparsed) = self
            .backend
            .get_pending()
            .await?
            .into_iter()
            .partition(|c| c.caller_was_parsed);
        Ok(PendingSnapshot {
            promotable,
            unparsed,
        })
    }

    /// Replace the whole set with `remaining`.
    pub async fn replace(&self, remaining: &[PendingCall]) -> crate::error::Result<()> {
        self.backend.replace_pending(remaining).await
    }

    /// Callers whose pending calls can never be promoted, sorted.
    pub async fn unparsed_callers(&self) -> crate::error::Result<Vec<String>> {
        let snapshot = self.snapshot().await?;
        let callers: BTreeSet<String> = snapshot
            .unparsed
            .into_iter()
            .map(|c| c.caller_qn)
            .collect();
        Ok(callers.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBackend;
    use crate::types::NodeLabel;

    fn call(caller: &str, parsed: bool) -> PendingCall {
        PendingCall {
            caller_type: NodeLabel::Function,
            caller_qn: caller.into(),
            module_qn: "svc.svc.api".into(),
            project_name: "svc".into(),
            call_name: "emit".into(),
            candidates: vec!["analytics.client.emit".into()],
            language: "python".into(),
            caller_was_parsed: parsed,
        }
    }

    #[tokio::test]
    async fn snapshot_partitions_by_parse_flag() {
        let backend = MemoryBackend::new();
        let store = PendingCallStore::new(&backend);
        store.record(&call("svc.svc.api.a", true)).await.unwrap();
        store.record(&call("svc.svc.api.b", false)).await.unwrap();
        store.record(&call("svc.svc.api.c", false)).await.unwrap();

        let snapshot = store.snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.promotable.len(), 1);
        assert_eq!(snapshot.unparsed.len(), 2);
        assert_eq!(snapshot.module_qns().count(), 3);
        assert_eq!(
            store.unparsed_callers().await.unwrap(),
            vec!["svc.svc.api.b", "svc.svc.api.c"]
        );
    }

    #[tokio::test]
    async fn replace_swaps_the_whole_set() {
        let backend = MemoryBackend::new();
        let store = PendingCallStore::new(&backend);
        store.record(&call("svc.svc.api.a", true)).await.unwrap();
        store.replace(&[call("svc.svc.api.z", false)]).await.unwrap();

        let snapshot = store.snapshot().await.unwrap();
        assert!(snapshot.promotable.is_empty());
        assert_eq!(snapshot.unparsed[0].caller_qn, "svc.svc.api.z");
    }
}
