//! Local resolution against the current pass's registry.

use std::collections::HashMap;

use relink_graphs::module_path::parent_of;
use relink_graphs::{CallSite, ImportMap};

use super::candidates::{Receiver, imported_callable, member_path};
use super::context::resolve_through_imports;
use crate::registry::QualifiedNameRegistry;
use crate::types::NodeLabel;

/// Binds call sites to callables declared in the project being ingested.
#[derive(Debug, Clone, Copy)]
pub struct LocalResolver<'a> {
    registry: &'a QualifiedNameRegistry,
    callable_labels: &'a [NodeLabel],
}

impl<'a> LocalResolver<'a> {
    pub fn new(registry: &'a QualifiedNameRegistry, callable_labels: &'a [NodeLabel]) -> Self {
        Self {
            registry,
            callable_labels,
        }
    }

    /// First local target for `site`, or `None` when the call leaves the
    /// project or cannot be bound.
    pub fn resolve(
        &self,
        site: &CallSite,
        module_qn: &str,
        language: &str,
        imports: Option<&ImportMap>,
        types: &HashMap<String, String>,
    ) -> Option<String> {
        let member = site.member.as_str();
        match Receiver::classify(site.receiver.as_deref()) {
            Receiver::Bare => {
                let mut direct = vec![format!("{}.{member}", site.caller_qn)];
                if let Some(enclosing) = &site.enclosing_type {
                    direct.push(format!("{enclosing}.{member}"));
                }
                direct.push(format!("{module_qn}.{member}"));
                if let Some(found) = direct.into_iter().find(|qn| self.is_callable(qn)) {
                    return Some(found);
                }
                if language == "python" {
                    let init = format!("{module_qn}.{member}.__init__");
                    if self.is_callable(&init) {
                        return Some(init);
                    }
                }
                let fq = imports?.get(member)?;
                self.find_in_project(&imported_callable(fq, language), None)
            }
            Receiver::Enclosing => {
                let qn = format!("{}.{member}", site.enclosing_type.as_deref()?);
                self.is_callable(&qn).then_some(qn)
            }
            Receiver::Named(receiver) => {
                let type_path = types
                    .get(receiver)
                    .cloned()
                    .or_else(|| resolve_through_imports(receiver, imports))
                    .unwrap_or_else(|| receiver.to_string());

                if type_path.contains('.') {
                    return self.find_in_project(&member_path(&type_path, member, language), None);
                }

                let same_module = format!("{module_qn}.{type_path}.{member}");
                if self.is_callable(&same_module) {
                    return Some(same_module);
                }
                self.find_in_project(
                    &member_path(&type_path, member, language),
                    Some(parent_of(module_qn)),
                )
            }
            Receiver::Unresolvable => None,
        }
    }

    fn is_callable(&self, qualified_name: &str) -> bool {
        self.registry
            .get(qualified_name)
            .is_some_and(|label| self.callable_labels.contains(&label))
    }

    /// Callable registry names ending with `path`. Names under `prefer` win;
    /// otherwise the smallest name.
    fn find_in_project(&self, path: &str, prefer: Option<&str>) -> Option<String> {
        if let Some(prefix) = prefer.filter(|p| !p.is_empty()) {
            let tail = format!(".{path}");
            let scoped = self
                .registry
                .names_under(prefix)
                .into_iter()
                .find(|qn| qn.ends_with(&tail) && self.is_callable(qn));
            if scoped.is_some() {
                return scoped;
            }
        }
        self.registry
            .find_ending_with(path)
            .into_iter()
            .find(|qn| self.is_callable(qn))
    }
}
