use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use relink_graphs::SymbolKind;

use crate::error::StoreError;

// ── Node labels ────────────────────────────────────────────────────

/// Label of an entity node in the knowledge graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeLabel {
    /// An ingested codebase.
    Project,
    /// A source file.
    Module,
    Class,
    Interface,
    Enum,
    /// A free function (Python top-level or nested).
    Function,
    Method,
    Constructor,
    Field,
}

/// Labels a call may resolve to.
pub const CALLABLE_LABELS: [NodeLabel; 3] =
    [NodeLabel::Function, NodeLabel::Method, NodeLabel::Constructor];

impl NodeLabel {
    pub const ALL: [NodeLabel; 9] = [
        Self::Project,
        Self::Module,
        Self::Class,
        Self::Interface,
        Self::Enum,
        Self::Function,
        Self::Method,
        Self::Constructor,
        Self::Field,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Project => "Project",
            Self::Module => "Module",
            Self::Class => "Class",
            Self::Interface => "Interface",
            Self::Enum => "Enum",
            Self::Function => "Function",
            Self::Method => "Method",
            Self::Constructor => "Constructor",
            Self::Field => "Field",
        }
    }

    pub fn is_callable(self) -> bool {
        CALLABLE_LABELS.contains(&self)
    }

    pub fn is_type(self) -> bool {
        matches!(self, Self::Class | Self::Interface | Self::Enum)
    }
}

impl std::fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NodeLabel {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|label| label.as_str() == s)
            .ok_or_else(|| StoreError::Unknown {
                what: "node label",
                value: s.to_string(),
            })
    }
}

impl From<SymbolKind> for NodeLabel {
    fn from(kind: SymbolKind) -> Self {
        match kind {
            SymbolKind::Module => Self::Module,
            SymbolKind::Class => Self::Class,
            SymbolKind::Interface => Self::Interface,
            SymbolKind::Enum => Self::Enum,
            SymbolKind::Function => Self::Function,
            SymbolKind::Method => Self::Method,
            SymbolKind::Constructor => Self::Constructor,
            SymbolKind::Field => Self::Field,
        }
    }
}

// ── Relationships ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RelType {
    /// Caller → callee.
    Calls,
    /// Module → top-level declaration.
    Defines,
    /// Type → member.
    DefinesMethod,
    /// Project → module.
    ContainsModule,
}

impl RelType {
    pub const ALL: [RelType; 4] = [
        Self::Calls,
        Self::Defines,
        Self::DefinesMethod,
        Self::ContainsModule,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Calls => "CALLS",
            Self::Defines => "DEFINES",
            Self::DefinesMethod => "DEFINES_METHOD",
            Self::ContainsModule => "CONTAINS_MODULE",
        }
    }
}

impl std::fmt::Display for RelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RelType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|rel| rel.as_str() == s)
            .ok_or_else(|| StoreError::Unknown {
                what: "relationship type",
                value: s.to_string(),
            })
    }
}

/// How a `CALLS` edge was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Resolved against the project's own registry.
    Local,
    /// Resolved by the batched backend lookup in the caller's own pass.
    CrossProject,
    /// Promoted from a stored pending call in a later pass.
    Reconciled,
}

impl Resolution {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::CrossProject => "cross_project",
            Self::Reconciled => "reconciled",
        }
    }
}

/// Free-form node/relationship attributes.
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// Identifies a node by label and qualified name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeRef {
    pub label: NodeLabel,
    pub qualified_name: String,
}

impl NodeRef {
    pub fn new(label: NodeLabel, qualified_name: impl Into<String>) -> Self {
        Self {
            label,
            qualified_name: qualified_name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub label: NodeLabel,
    pub qualified_name: String,
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub from: NodeRef,
    pub rel_type: RelType,
    pub to: NodeRef,
    pub properties: Properties,
}

// ── Pending calls ──────────────────────────────────────────────────

/// A call site that could not be resolved when its project was ingested.
///
/// Serializes as a JSON object with exactly these keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PendingCall {
    pub caller_type: NodeLabel,
    pub caller_qn: String,
    pub module_qn: String,
    pub project_name: String,
    pub call_name: String,
    pub candidates: Vec<String>,
    pub language: String,
    pub caller_was_parsed: bool,
}

impl PendingCall {
    /// Canonical JSON used as the dedup key.
    pub fn identity(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn caller_ref(&self) -> NodeRef {
        NodeRef::new(self.caller_type, self.caller_qn.clone())
    }
}

// ── Batched lookup ─────────────────────────────────────────────────

/// One of the two batched backend queries issued per pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LookupQuery {
    /// Nodes whose qualified name equals one of `qualified_names`.
    Exact {
        qualified_names: Vec<String>,
        allowed_labels: Vec<NodeLabel>,
    },
    /// Nodes whose qualified name ends with one of `suffixes` (each starts with `.`).
    Suffix {
        suffixes: Vec<String>,
        allowed_labels: Vec<NodeLabel>,
    },
}

impl LookupQuery {
    pub fn allowed_labels(&self) -> &[NodeLabel] {
        match self {
            Self::Exact { allowed_labels, .. } | Self::Suffix { allowed_labels, .. } => {
                allowed_labels
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Exact { .. } => "exact",
            Self::Suffix { .. } => "suffix",
        }
    }

    /// Number of names or suffixes carried.
    pub fn len(&self) -> usize {
        match self {
            Self::Exact {
                qualified_names, ..
            } => qualified_names.len(),
            Self::Suffix { suffixes, .. } => suffixes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn matches(&self, label: NodeLabel, qualified_name: &str) -> bool {
        if !self.allowed_labels().contains(&label) {
            return false;
        }
        match self {
            Self::Exact {
                qualified_names, ..
            } => qualified_names.iter().any(|n| n == qualified_name),
            Self::Suffix { suffixes, .. } => {
                suffixes.iter().any(|s| qualified_name.ends_with(s.as_str()))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FetchRow {
    pub qualified_name: String,
    pub labels: Vec<NodeLabel>,
}

// ── Projects and stats ─────────────────────────────────────────────

/// Namespaces a project declares, persisted so later processes can
/// recognise first-party candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub name: String,
    /// Module qualified names without the project prefix.
    pub namespaces: BTreeSet<String>,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Node count broken down by label.
    pub nodes_by_label: BTreeMap<String, u64>,
    /// Relationship count broken down by type.
    pub relationships_by_type: BTreeMap<String, u64>,
    pub pending_calls: u64,
    /// Pending calls whose caller failed to parse.
    pub unparsed_pending: u64,
    pub projects: u64,
}

impl StoreStats {
    pub fn total_nodes(&self) -> u64 {
        self.nodes_by_label.values().sum()
    }

    pub fn total_relationships(&self) -> u64 {
        self.relationships_by_type.values().sum()
    }
}
