//! Qualified-name registry: a segment trie over dotted names.
//!
//! Rebuilt from scratch for every ingestion pass out of that pass's own
//! declarations. Cross-project truth lives in the graph backend, never here.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::NodeLabel;

#[derive(Debug, Default)]
struct TrieNode {
    children: BTreeMap<String, TrieNode>,
    label: Option<NodeLabel>,
}

impl TrieNode {
    fn collect(&self, path: &mut Vec<String>, out: &mut Vec<(String, NodeLabel)>) {
        if let Some(label) = self.label {
            out.push((path.join("."), label));
        }
        for (segment, child) in &self.children {
            path.push(segment.clone());
            child.collect(path, out);
            path.pop();
        }
    }
}

/// Trie of qualified names annotated with their entity label.
#[derive(Debug, Default)]
pub struct QualifiedNameRegistry {
    root: TrieNode,
    /// Last segment → full names, for suffix lookups without a trie walk.
    by_last_segment: BTreeMap<String, BTreeSet<String>>,
    len: usize,
}

impl QualifiedNameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite. Returns the previous label, if any.
    pub fn insert(&mut self, qualified_name: &str, label: NodeLabel) -> Option<NodeLabel> {
        let mut node = &mut self.root;
        for segment in qualified_name.split('.') {
            node = node.children.entry(segment.to_string()).or_default();
        }
        let previous = node.label.replace(label);
        if previous.is_none() {
            self.len += 1;
            self.by_last_segment
                .entry(last_segment(qualified_name).to_string())
                .or_default()
                .insert(qualified_name.to_string());
        }
        previous
    }

    pub fn get(&self, qualified_name: &str) -> Option<NodeLabel> {
        self.node(qualified_name)?.label
    }

    pub fn contains(&self, qualified_name: &str) -> bool {
        self.get(qualified_name).is_some()
    }

    /// Every registered name strictly below `prefix`, sorted.
    pub fn names_under(&self, prefix: &str) -> Vec<String> {
        let Some(node) = self.node(prefix) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut path: Vec<String> = prefix.split('.').map(str::to_string).collect();
        for (segment, child) in &node.children {
            path.push(segment.clone());
            child.collect(&mut path, &mut out);
            path.pop();
        }
        let mut names: Vec<String> = out.into_iter().map(|(name, _)| name).collect();
        names.sort_unstable();
        names
    }

    /// Names whose trailing segments equal `suffix`, sorted.
    ///
    /// `find_ending_with("B.m")` matches `x.B.m` and `B.m` but not `x.AB.m`.
    pub fn find_ending_with(&self, suffix: &str) -> Vec<String> {
        let suffix = suffix.trim_start_matches('.');
        if suffix.is_empty() {
            return Vec::new();
        }
        let dotted = format!(".{suffix}");
        self.by_last_segment
            .get(last_segment(suffix))
            .map(|names| {
                names
                    .iter()
                    .filter(|name| *name == suffix || name.ends_with(&dotted))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// All entries, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (String, NodeLabel)> + '_ {
        let mut out = Vec::with_capacity(self.len);
        let mut path = Vec::new();
        for (segment, child) in &self.root.children {
            path.push(segment.clone());
            child.collect(&mut path, &mut out);
            path.pop();
        }
        out.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        out.into_iter()
    }

    fn node(&self, qualified_name: &str) -> Option<&TrieNode> {
        let mut node = &self.root;
        for segment in qualified_name.split('.') {
            node = node.children.get(segment)?;
        }
        Some(node)
    }
}

fn last_segment(qualified_name: &str) -> &str {
    relink_graphs::module_path::last_segment(qualified_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> QualifiedNameRegistry {
        let mut reg = QualifiedNameRegistry::new();
        reg.insert("lib.src.com.example.Lib", NodeLabel::Module);
        reg.insert("lib.src.com.example.Lib.Lib", NodeLabel::Class);
        reg.insert("lib.src.com.example.Lib.Lib.greet", NodeLabel::Method);
        reg.insert("lib.src.com.example.Lib.Lib.wave", NodeLabel::Method);
        reg.insert("lib.src.com.example.Util.Util.greet", NodeLabel::Method);
        reg
    }

    #[test]
    fn insert_is_idempotent_and_overwrites_label() {
        let mut reg = sample();
        assert_eq!(reg.len(), 5);
        assert_eq!(
            reg.insert("lib.src.com.example.Lib.Lib.greet", NodeLabel::Function),
            Some(NodeLabel::Method)
        );
        assert_eq!(reg.len(), 5);
        assert_eq!(
            reg.get("lib.src.com.example.Lib.Lib.greet"),
            Some(NodeLabel::Function)
        );
    }

    #[test]
    fn intermediate_segments_are_not_entries() {
        let reg = sample();
        assert!(!reg.contains("lib.src.com"));
        assert!(reg.contains("lib.src.com.example.Lib"));
        assert_eq!(reg.get("lib.src.com.example.Missing"), None);
    }

    #[test]
    fn names_under_lists_descendants_only() {
        let reg = sample();
        assert_eq!(
            reg.names_under("lib.src.com.example.Lib"),
            vec![
                "lib.src.com.example.Lib.Lib",
                "lib.src.com.example.Lib.Lib.greet",
                "lib.src.com.example.Lib.Lib.wave",
            ]
        );
        assert!(reg.names_under("nothing.here").is_empty());
    }

    #[test]
    fn find_ending_with_respects_segment_boundaries() {
        let mut reg = sample();
        reg.insert("lib.src.com.example.XLib.XLib.greet", NodeLabel::Method);

        assert_eq!(
            reg.find_ending_with("Lib.greet"),
            vec!["lib.src.com.example.Lib.Lib.greet"]
        );
        assert_eq!(reg.find_ending_with("greet").len(), 3);
        assert_eq!(
            reg.find_ending_with(".Util.greet"),
            vec!["lib.src.com.example.Util.Util.greet"]
        );
        assert!(reg.find_ending_with("").is_empty());
    }

    #[test]
    fn iter_is_sorted() {
        let reg = sample();
        let names: Vec<String> = reg.iter().map(|(n, _)| n).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert_eq!(names.len(), reg.len());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn arb_qn() -> impl Strategy<Value = String> {
            proptest::collection::vec("[a-d]{1,2}", 1..5).prop_map(|segs| segs.join("."))
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            /// The trie agrees with a flat set under any insert sequence.
            #[test]
            fn matches_reference_set(
                inserts in proptest::collection::vec(arb_qn(), 0..40),
            ) {
                let mut reg = QualifiedNameRegistry::new();
                let mut reference = BTreeSet::new();
                for qn in &inserts {
                    reg.insert(qn, NodeLabel::Method);
                    reference.insert(qn.clone());
                }

                prop_assert_eq!(reg.len(), reference.len());
                let names: Vec<String> = reg.iter().map(|(n, _)| n).collect();
                let expected: Vec<String> = reference.iter().cloned().collect();
                prop_assert_eq!(names, expected);
            }

            /// Suffix lookup equals a brute-force segment-boundary scan.
            #[test]
            fn find_ending_with_matches_scan(
                names in proptest::collection::vec(arb_qn(), 1..30),
                suffix in arb_qn(),
            ) {
                let mut reg = QualifiedNameRegistry::new();
                for qn in &names {
                    reg.insert(qn, NodeLabel::Function);
                }
                let dotted = format!(".{suffix}");
                let expected: Vec<String> = names
                    .iter()
                    .filter(|n| **n == suffix || n.ends_with(&dotted))
                    .cloned()
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect();
                prop_assert_eq!(reg.find_ending_with(&suffix), expected);
            }
        }
    }
}
