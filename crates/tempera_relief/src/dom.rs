//! A minimal DOM-like fragment tree.
//!
//! Nodes live in an arena owned by the [`Fragment`]; [`NodeId`] indexes into
//! it. Removing a node detaches it from its parent but keeps the slot, so ids
//! stay stable for the lifetime of the fragment. `<template>` elements carry
//! their own content fragment instead of children.

use std::fmt::Write as _;
use std::rc::Rc;

use tempera_carton::{is_void_tag, CompactString, FxHashMap};

use crate::template_info::TemplateInfo;
use crate::value::Value;

/// Index of a node inside a [`Fragment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NodeId(u32);

impl NodeId {
    /// The fragment root.
    pub const ROOT: NodeId = NodeId(0);

    #[inline(always)]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    #[inline(always)]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline(always)]
    const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Name/value attribute pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: CompactString,
    pub value: CompactString,
}

impl Attribute {
    pub fn new(name: impl Into<CompactString>, value: impl Into<CompactString>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Element payload.
#[derive(Debug, Clone, Default)]
pub struct ElementData {
    pub tag: CompactString,
    pub attributes: Vec<Attribute>,
    /// Values assigned as properties (not serialized).
    pub properties: FxHashMap<CompactString, Value>,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Root,
    Element(ElementData),
    Text(CompactString),
    Comment(CompactString),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    content: Option<Box<Fragment>>,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            content: None,
        }
    }
}

/// An arena-backed tree of nodes with a synthetic root.
#[derive(Debug, Clone)]
pub struct Fragment {
    nodes: Vec<Node>,
}

impl Default for Fragment {
    fn default() -> Self {
        Self::new()
    }
}

impl Fragment {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(NodeKind::Root)],
        }
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    #[inline]
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    #[inline]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    #[inline]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].children
    }

    pub fn child_at(&self, parent: NodeId, index: usize) -> Option<NodeId> {
        self.children(parent).get(index).copied()
    }

    /// Append a new node under `parent`.
    pub fn append(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u32);
        let mut node = Node::new(kind);
        node.parent = Some(parent);
        self.nodes.push(node);
        self.nodes[parent.index()].children.push(id);
        id
    }

    pub fn append_element(&mut self, parent: NodeId, tag: &str) -> NodeId {
        self.append(
            parent,
            NodeKind::Element(ElementData {
                tag: tag.into(),
                ..Default::default()
            }),
        )
    }

    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        self.append(parent, NodeKind::Text(text.into()))
    }

    pub fn append_comment(&mut self, parent: NodeId, text: &str) -> NodeId {
        self.append(parent, NodeKind::Comment(text.into()))
    }

    /// Detach `id` from its parent.
    pub fn remove(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.index()].parent.take() {
            self.nodes[parent.index()].children.retain(|&c| c != id);
        }
    }

    /// Detach every child of `id`.
    pub fn clear_children(&mut self, id: NodeId) {
        let children = std::mem::take(&mut self.nodes[id.index()].children);
        for child in children {
            self.nodes[child.index()].parent = None;
        }
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.index()].kind {
            NodeKind::Element(el) => Some(el.tag.as_str()),
            _ => None,
        }
    }

    #[inline]
    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Element(_))
    }

    #[inline]
    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Text(_))
    }

    /// Text of a text or comment node.
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.index()].kind {
            NodeKind::Text(t) | NodeKind::Comment(t) => Some(t.as_str()),
            _ => None,
        }
    }

    /// Set the text of a text node, or replace an element's children with a
    /// single text node.
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        if let NodeKind::Text(t) | NodeKind::Comment(t) = &mut self.nodes[id.index()].kind {
            *t = text.into();
            return;
        }
        self.clear_children(id);
        if !text.is_empty() {
            self.append_text(id, text);
        }
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id.index()].kind {
            NodeKind::Text(t) => out.push_str(t),
            NodeKind::Comment(_) => {}
            _ => {
                for &child in self.children(id) {
                    self.collect_text(child, out);
                }
            }
        }
    }

    fn element(&self, id: NodeId) -> Option<&ElementData> {
        match &self.nodes[id.index()].kind {
            NodeKind::Element(el) => Some(el),
            _ => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match &mut self.nodes[id.index()].kind {
            NodeKind::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn attributes(&self, id: NodeId) -> &[Attribute] {
        self.element(id).map_or(&[][..], |el| el.attributes.as_slice())
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attributes(id)
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    #[inline]
    pub fn has_attribute(&self, id: NodeId, name: &str) -> bool {
        self.attribute(id, name).is_some()
    }

    /// Set an attribute, keeping the original position when it exists.
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) {
        let Some(el) = self.element_mut(id) else {
            return;
        };
        match el.attributes.iter_mut().find(|a| a.name == name) {
            Some(attr) => attr.value = value.into(),
            None => el.attributes.push(Attribute::new(name, value)),
        }
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Option<CompactString> {
        let el = self.element_mut(id)?;
        let pos = el.attributes.iter().position(|a| a.name == name)?;
        Some(el.attributes.remove(pos).value)
    }

    /// Property value assigned to an element, `undefined` when unset.
    pub fn property(&self, id: NodeId, name: &str) -> Value {
        self.element(id)
            .and_then(|el| el.properties.get(name).cloned())
            .unwrap_or_default()
    }

    pub fn set_property(&mut self, id: NodeId, name: &str, value: Value) {
        if let Some(el) = self.element_mut(id) {
            el.properties.insert(name.into(), value);
        }
    }

    /// Content fragment of a `<template>` element.
    pub fn content(&self, id: NodeId) -> Option<&Fragment> {
        self.nodes[id.index()].content.as_deref()
    }

    pub fn content_mut(&mut self, id: NodeId) -> Option<&mut Fragment> {
        self.nodes[id.index()].content.as_deref_mut()
    }

    pub fn set_content(&mut self, id: NodeId, content: Fragment) {
        self.nodes[id.index()].content = Some(Box::new(content));
    }

    pub fn take_content(&mut self, id: NodeId) -> Option<Fragment> {
        self.nodes[id.index()].content.take().map(|b| *b)
    }

    /// Attached descendants of `id` in pre-order, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// Number of attached nodes, root included.
    pub fn len(&self) -> usize {
        self.descendants(NodeId::ROOT).len() + 1
    }

    pub fn is_empty(&self) -> bool {
        self.children(NodeId::ROOT).is_empty()
    }

    /// Deep copy of the attached tree, compacted into pre-order ids.
    ///
    /// Child positions are preserved, so a node reached by a chain of child
    /// indexes in `self` is reached by the same chain in the clone.
    pub fn deep_clone(&self) -> Fragment {
        let mut out = Fragment::new();
        self.clone_children(NodeId::ROOT, &mut out, NodeId::ROOT);
        out
    }

    fn clone_children(&self, from: NodeId, out: &mut Fragment, to: NodeId) {
        for &child in self.children(from) {
            let node = self.node(child);
            let id = out.append(to, node.kind.clone());
            if let Some(content) = &node.content {
                out.set_content(id, content.deep_clone());
            }
            self.clone_children(child, out, id);
        }
    }

    /// Move every root child of `other` under `parent`, returning the new ids
    /// of the moved top-level nodes.
    pub fn adopt(&mut self, parent: NodeId, other: &Fragment) -> Vec<NodeId> {
        let mut top = Vec::new();
        for &child in other.children(NodeId::ROOT) {
            let id = self.adopt_subtree(parent, other, child);
            top.push(id);
        }
        top
    }

    /// Copy the subtree rooted at `from` in `other` under `parent`.
    pub fn adopt_subtree(&mut self, parent: NodeId, other: &Fragment, from: NodeId) -> NodeId {
        let node = other.node(from);
        let id = self.append(parent, node.kind.clone());
        if let Some(content) = &node.content {
            self.set_content(id, content.deep_clone());
        }
        for &child in other.children(from) {
            self.adopt_subtree(id, other, child);
        }
        id
    }

    /// Serialize the subtree under `id` (children only) to markup.
    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        for &child in self.children(id) {
            self.write_html(child, &mut out);
        }
        out
    }

    /// Serialize the whole attached tree to markup.
    pub fn to_html(&self) -> String {
        self.inner_html(NodeId::ROOT)
    }

    fn write_html(&self, id: NodeId, out: &mut String) {
        let node = self.node(id);
        match &node.kind {
            NodeKind::Root => {}
            NodeKind::Text(text) => escape_into(out, text, false),
            NodeKind::Comment(text) => {
                let _ = write!(out, "<!--{text}-->");
            }
            NodeKind::Element(el) => {
                out.push('<');
                out.push_str(&el.tag);
                for attr in &el.attributes {
                    out.push(' ');
                    out.push_str(&attr.name);
                    if !attr.value.is_empty() {
                        out.push_str("=\"");
                        escape_into(out, &attr.value, true);
                        out.push('"');
                    }
                }
                out.push('>');
                if is_void_tag(&el.tag) {
                    return;
                }
                if let Some(content) = &node.content {
                    out.push_str(&content.to_html());
                }
                for &child in &node.children {
                    self.write_html(child, out);
                }
                let _ = write!(out, "</{}>", el.tag);
            }
        }
    }
}

fn escape_into(out: &mut String, text: &str, attribute: bool) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' if !attribute => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

/// A `<template>`: its attributes, its inert content and the memoized parse
/// result.
#[derive(Debug, Clone, Default)]
pub struct Template {
    pub attributes: Vec<Attribute>,
    pub content: Fragment,
    info: Option<Rc<TemplateInfo>>,
}

impl Template {
    pub fn new(content: Fragment) -> Self {
        Self {
            attributes: Vec::new(),
            content,
            info: None,
        }
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.push(Attribute::new(name, value));
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    #[inline]
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    /// Parse result, if this template has been parsed.
    #[inline]
    pub fn parsed_info(&self) -> Option<&Rc<TemplateInfo>> {
        self.info.as_ref()
    }

    /// Record the parse result. Later parses return this value.
    pub fn set_parsed_info(&mut self, info: Rc<TemplateInfo>) {
        self.info = Some(info);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Fragment {
        let mut frag = Fragment::new();
        let div = frag.append_element(NodeId::ROOT, "div");
        frag.set_attribute(div, "class", "box");
        frag.append_text(div, "a < b");
        let input = frag.append_element(div, "input");
        frag.set_attribute(input, "value", "");
        frag
    }

    #[test]
    fn test_to_html() {
        assert_eq!(
            sample().to_html(),
            r#"<div class="box">a &lt; b<input value></div>"#
        );
    }

    #[test]
    fn test_attributes() {
        let mut frag = sample();
        let div = frag.child_at(NodeId::ROOT, 0).unwrap();
        frag.set_attribute(div, "class", "other");
        frag.set_attribute(div, "id", "x");
        assert_eq!(frag.attribute(div, "class"), Some("other"));
        assert_eq!(frag.remove_attribute(div, "id").as_deref(), Some("x"));
        assert!(!frag.has_attribute(div, "id"));
    }

    #[test]
    fn test_deep_clone_compacts_removed_nodes() {
        let mut frag = sample();
        let div = frag.child_at(NodeId::ROOT, 0).unwrap();
        let text = frag.child_at(div, 0).unwrap();
        frag.remove(text);
        let clone = frag.deep_clone();
        assert_eq!(clone.to_html(), frag.to_html());
        assert_eq!(clone.len(), 3);
        let input = clone.child_at(clone.child_at(NodeId::ROOT, 0).unwrap(), 0);
        assert_eq!(input.and_then(|id| clone.tag(id)), Some("input"));
    }

    #[test]
    fn test_set_text_on_element() {
        let mut frag = sample();
        let div = frag.child_at(NodeId::ROOT, 0).unwrap();
        frag.set_text(div, "plain");
        assert_eq!(frag.text_content(div), "plain");
        assert_eq!(frag.children(div).len(), 1);
    }

    #[test]
    fn test_properties() {
        let mut frag = sample();
        let div = frag.child_at(NodeId::ROOT, 0).unwrap();
        assert!(frag.property(div, "items").is_undefined());
        frag.set_property(div, "items", Value::from(3));
        assert_eq!(frag.property(div, "items"), Value::from(3));
    }
}
