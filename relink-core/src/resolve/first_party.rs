//! First-party filter: rejects candidates whose namespace cannot belong to
//! any project known to this backend.

use std::collections::HashSet;

use tracing::debug;

/// Accepts a candidate when its root prefix (its first `root_segments`
/// segments, capped at one less than its segment count) occurs as a
/// contiguous run of segments in some tracked name.
#[derive(Debug, Clone)]
pub struct FirstPartyFilter {
    root_segments: usize,
    /// Every contiguous segment window, of width 1 to `root_segments`, of
    /// every tracked name.
    windows: HashSet<String>,
    tracked: usize,
}

impl FirstPartyFilter {
    pub fn new(root_segments: usize) -> Self {
        Self {
            root_segments: root_segments.max(1),
            windows: HashSet::new(),
            tracked: 0,
        }
    }

    /// Track a qualified name or namespace.
    pub fn track(&mut self, name: &str) {
        let segments: Vec<&str> = name.split('.').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            return;
        }
        for width in 1..=self.root_segments.min(segments.len()) {
            for window in segments.windows(width) {
                self.windows.insert(window.join("."));
            }
        }
        self.tracked += 1;
    }

    pub fn track_all<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        for name in names {
            self.track(name);
        }
    }

    /// Number of names tracked so far.
    pub fn tracked(&self) -> usize {
        self.tracked
    }

    pub fn accepts(&self, candidate: &str) -> bool {
        if !is_well_formed(candidate) {
            return false;
        }
        let segments: Vec<&str> = candidate.split('.').collect();
        let width = self.root_segments.min(segments.len() - 1);
        self.windows.contains(&segments[..width].join("."))
    }

    /// Split candidates into `(kept, rejected)`, preserving order.
    pub fn partition(&self, candidates: Vec<String>) -> (Vec<String>, Vec<String>) {
        let (kept, rejected): (Vec<String>, Vec<String>) =
            candidates.into_iter().partition(|c| self.accepts(c));
        for candidate in &rejected {
            debug!(candidate = %candidate, "Dropping candidate outside tracked namespaces");
        }
        (kept, rejected)
    }
}

/// Non-empty, dotted, and free of empty segments.
pub fn is_well_formed(candidate: &str) -> bool {
    candidate.contains('.') && candidate.split('.').all(|s| !s.is_empty())
}
