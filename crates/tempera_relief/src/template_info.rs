//! Parsed template metadata.
//!
//! A [`TemplateInfo`] is produced once per template by the parser and shared
//! (read-only) by every stamped instance. Nodes that carry bindings, events,
//! ids, slots or nested templates get a [`NodeInfo`], listed in pre-order.

use std::rc::Rc;

use tempera_carton::CompactString;

use crate::dom::Fragment;
use crate::path;
use crate::value::Value;

/// Immutable result of parsing a template.
#[derive(Debug, Clone, Default)]
pub struct TemplateInfo {
    /// Noted nodes (and their ancestors) in pre-order.
    pub node_info_list: Vec<NodeInfo>,
    pub strip_whitespace: bool,
    /// Some node in this template is a `<slot>`.
    pub has_insertion_point: bool,
    /// Root properties referenced by nested templates, in first-use order.
    pub host_props: Vec<CompactString>,
    /// Detached content (nested templates only).
    pub content: Option<Fragment>,
}

impl TemplateInfo {
    /// Record a host property, keeping first-use order.
    pub fn add_host_prop(&mut self, name: &str) {
        if !self.host_props.iter().any(|p| p == name) {
            self.host_props.push(name.into());
        }
    }

    /// Total number of bindings across all nodes.
    pub fn binding_count(&self) -> usize {
        self.node_info_list.iter().map(|n| n.bindings.len()).sum()
    }
}

/// Metadata for one node of the template.
#[derive(Debug, Clone, Default)]
pub struct NodeInfo {
    /// Value of the node's `id` attribute.
    pub id: Option<CompactString>,
    pub events: Vec<EventInfo>,
    pub bindings: Vec<Binding>,
    /// Index of the parent's entry, `None` for children of the fragment root.
    pub parent_info: Option<usize>,
    /// Child position under the parent.
    pub parent_index: usize,
    pub has_insertion_point: bool,
    /// Parsed nested `<template>`.
    pub template_info: Option<Rc<TemplateInfo>>,
}

impl NodeInfo {
    /// Whether this entry carries anything besides its position.
    pub fn is_noted(&self) -> bool {
        self.id.is_some()
            || !self.events.is_empty()
            || !self.bindings.is_empty()
            || self.has_insertion_point
            || self.template_info.is_some()
    }
}

/// Declarative `on-<event>="handler"` listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventInfo {
    pub name: CompactString,
    pub handler: CompactString,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BindingKind {
    Text,
    Attribute,
    Property,
}

/// `[[..]]` one-way or `{{..}}` two-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BindingMode {
    OneWay,
    TwoWay,
}

impl BindingMode {
    #[inline]
    pub fn from_open_bracket(ch: u8) -> Self {
        if ch == b'{' {
            BindingMode::TwoWay
        } else {
            BindingMode::OneWay
        }
    }
}

/// A binding attached to a node.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub kind: BindingKind,
    /// Property name, attribute name, or `textContent`.
    pub target: CompactString,
    pub parts: Vec<BindingPart>,
    /// Literal text of compound bindings, applied before stamping.
    pub literal: Option<CompactString>,
    pub is_compound: bool,
    /// Change event listened to for two-way bindings.
    pub listener_event: Option<CompactString>,
    pub listener_negate: bool,
}

impl Binding {
    /// Expression parts with their part index.
    pub fn expressions(&self) -> impl Iterator<Item = (usize, &BindingExpression)> {
        self.parts
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.as_expression().map(|e| (i, e)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BindingPart {
    Literal(CompactString),
    Expression(BindingExpression),
}

impl BindingPart {
    pub fn as_expression(&self) -> Option<&BindingExpression> {
        match self {
            BindingPart::Expression(e) => Some(e),
            BindingPart::Literal(_) => None,
        }
    }
}

/// The expression inside a `[[..]]` or `{{..}}`.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingExpression {
    /// Path or method name as written (negation stripped).
    pub source: CompactString,
    pub mode: BindingMode,
    pub negate: bool,
    pub signature: Option<MethodSignature>,
    pub dependencies: Vec<Trigger>,
    /// `::event` suffix of a two-way binding.
    pub custom_event: Option<CompactString>,
    pub compound_index: usize,
}

/// A method call expression `name(arg, ...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodSignature {
    pub method_name: CompactString,
    pub args: Vec<MethodArg>,
    /// All arguments are literals.
    pub is_static: bool,
}

impl MethodSignature {
    /// Triggers of the non-literal arguments.
    pub fn dependencies(&self) -> impl Iterator<Item = &Trigger> {
        self.args.iter().filter_map(|arg| match arg {
            MethodArg::Property(trigger) => Some(trigger),
            MethodArg::Literal(_) => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MethodArg {
    Literal(Value),
    Property(Trigger),
}

/// What a property effect (or a method argument) depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    /// Property or path; the `.*` suffix of wildcard triggers is stripped.
    pub name: CompactString,
    pub root_property: CompactString,
    /// `name` is a path.
    pub structured: bool,
    /// Declared with a `.*` suffix: also fires for any descendant path.
    pub wildcard: bool,
}

impl Trigger {
    /// Plain trigger on a simple property.
    pub fn property(name: &str) -> Self {
        Self {
            name: name.into(),
            root_property: name.into(),
            structured: false,
            wildcard: false,
        }
    }

    /// Trigger from a dependency as written (`a`, `a.b`, `a.b.*`).
    pub fn from_dependency(dep: &str) -> Self {
        let structured = path::is_path(dep);
        let wildcard = structured && dep.ends_with(".*");
        let name = if wildcard { &dep[..dep.len() - 2] } else { dep };
        Self {
            name: name.into(),
            root_property: path::root(dep).into(),
            structured,
            wildcard,
        }
    }

    /// Whether a change at `path` fires this trigger.
    ///
    /// Exact match always fires; structured triggers also fire when `path` is
    /// an ancestor of the trigger, wildcard triggers when `path` is below it.
    pub fn matches_path(&self, path: &str) -> bool {
        self.name == path
            || (self.structured && path::is_ancestor(&self.name, path))
            || (self.wildcard && path::is_descendant(&self.name, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_from_dependency() {
        let t = Trigger::from_dependency("user.items.*");
        assert_eq!(t.name, "user.items");
        assert_eq!(t.root_property, "user");
        assert!(t.structured && t.wildcard);

        let t = Trigger::from_dependency("count");
        assert!(!t.structured && !t.wildcard);
        assert_eq!(t.root_property, "count");
    }

    #[test]
    fn test_trigger_matching() {
        let plain = Trigger::property("user");
        assert!(plain.matches_path("user"));
        assert!(!plain.matches_path("user.name"));

        let structured = Trigger::from_dependency("user.name");
        assert!(structured.matches_path("user.name"));
        assert!(structured.matches_path("user"));
        assert!(!structured.matches_path("user.name.first"));

        let wildcard = Trigger::from_dependency("user.*");
        assert!(wildcard.matches_path("user"));
        assert!(wildcard.matches_path("user.name.first"));
        assert!(!wildcard.matches_path("username"));
    }

    #[test]
    fn test_host_props_keep_order() {
        let mut info = TemplateInfo::default();
        info.add_host_prop("b");
        info.add_host_prop("a");
        info.add_host_prop("b");
        assert_eq!(info.host_props, ["b", "a"]);
    }
}
