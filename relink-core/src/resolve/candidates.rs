//! Candidate generation for calls that local resolution could not bind.
//!
//! A candidate is a qualified-name fragment the target is expected to end
//! with, shaped like a declaration's qualified name in the target language:
//! Java members sit under `<type>.<Type>` (module segment plus type segment),
//! Python members directly under the type or module.

use std::collections::{HashMap, HashSet};

use relink_graphs::module_path::{last_segment, parent_of};
use relink_graphs::{CallSite, ImportMap};

use super::context::resolve_through_imports;

/// Receiver of a call after `this.`/`self.` normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receiver<'a> {
    /// `foo()`
    Bare,
    /// `this.foo()`, `self.foo()`, `cls.foo()`
    Enclosing,
    /// `recv.foo()`, with `this.`/`self.` stripped from `recv`
    Named(&'a str),
    /// `a.b().c()`, `super.foo()`, subscripts and literals
    Unresolvable,
}

impl<'a> Receiver<'a> {
    pub fn classify(receiver: Option<&'a str>) -> Self {
        let Some(receiver) = receiver else {
            return Self::Bare;
        };
        match receiver {
            "this" | "self" | "cls" => return Self::Enclosing,
            "super" => return Self::Unresolvable,
            _ => {}
        }
        if receiver.contains(['(', '[', '"', '\'']) || receiver.is_empty() {
            return Self::Unresolvable;
        }
        let stripped = receiver
            .strip_prefix("this.")
            .or_else(|| receiver.strip_prefix("self."))
            .unwrap_or(receiver);
        Self::Named(stripped)
    }
}

/// Qualified-name shape of `member` declared on the type or module at `path`.
pub fn member_path(path: &str, member: &str, language: &str) -> String {
    if language == "java" {
        format!("{path}.{}.{member}", last_segment(path))
    } else {
        format!("{path}.{member}")
    }
}

/// Shape of a directly imported callable. Java static imports name
/// `pkg.Type.member`; Python imports name the function itself.
pub fn imported_callable(fq: &str, language: &str) -> String {
    if language == "java" && fq.contains('.') {
        member_path(parent_of(fq), last_segment(fq), language)
    } else {
        fq.to_string()
    }
}

/// `com.example.lib.LibraryClass`: at least two non-empty segments and a
/// lowercase leading segment.
pub fn is_qualified_literal(receiver: &str) -> bool {
    let mut segments = receiver.split('.');
    let Some(first) = segments.next() else {
        return false;
    };
    let rest: Vec<&str> = segments.collect();
    !rest.is_empty()
        && first.starts_with(|c: char| c.is_ascii_lowercase())
        && !first.is_empty()
        && rest.iter().all(|s| !s.is_empty())
}

/// Ordered, deduplicated candidates for one call site.
pub fn generate(
    site: &CallSite,
    imports: Option<&ImportMap>,
    types: &HashMap<String, String>,
    language: &str,
) -> Vec<String> {
    let member = site.member.as_str();
    let mut out = Vec::new();

    match Receiver::classify(site.receiver.as_deref()) {
        Receiver::Bare => {
            if let Some(fq) = imports.and_then(|m| m.get(member)) {
                out.push(imported_callable(fq, language));
            }
        }
        Receiver::Named(receiver) => {
            let imported = resolve_through_imports(receiver, imports);
            if let Some(fq) = &imported {
                out.push(member_path(fq, member, language));
            }
            if let Some(declared) = types.get(receiver).filter(|t| t.contains('.')) {
                out.push(member_path(declared, member, language));
            }
            if imported.is_none()
                && !types.contains_key(receiver)
                && is_qualified_literal(receiver)
            {
                out.push(member_path(receiver, member, language));
            }
        }
        Receiver::Enclosing | Receiver::Unresolvable => {}
    }

    let mut seen = HashSet::new();
    out.retain(|c| seen.insert(c.clone()));
    out
}
