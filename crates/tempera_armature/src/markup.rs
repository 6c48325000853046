//! Markup builder.
//!
//! Drives the [`Tokenizer`] and assembles a [`Fragment`]. Tag and attribute
//! names are lowercased, entities in text and attribute values are decoded,
//! and the children of every `<template>` are moved into its content
//! fragment, the way a browser parses inert template content.

use tempera_carton::{is_void_tag, CompactString};
use tempera_relief::{Attribute, Fragment, MarkupError, NodeId, NodeKind, Template};

use crate::tokenizer::{Callbacks, QuoteType, Tokenizer};

/// Parse markup into a fragment.
pub fn parse_fragment(source: &str) -> Result<Fragment, MarkupError> {
    let mut tokenizer = Tokenizer::new(source, Builder::new(source));
    tokenizer.tokenize();
    let mut builder = tokenizer.into_callbacks();
    if let Some(err) = builder.error.take() {
        return Err(err);
    }
    let mut fragment = builder.fragment;
    hoist_template_content(&mut fragment, NodeId::ROOT);
    Ok(fragment)
}

/// Parse markup into a [`Template`].
///
/// When the markup is a single `<template>` element (surrounding whitespace
/// aside), its attributes and content are used; otherwise the whole markup
/// becomes the template content.
pub fn parse_template_markup(source: &str) -> Result<Template, MarkupError> {
    let mut fragment = parse_fragment(source)?;
    let elements: Vec<NodeId> = fragment
        .children(NodeId::ROOT)
        .iter()
        .copied()
        .filter(|&id| !is_blank_text(&fragment, id))
        .collect();

    if let [only] = elements.as_slice() {
        if fragment.tag(*only) == Some("template") {
            let attributes = fragment.attributes(*only).to_vec();
            let content = fragment.take_content(*only).unwrap_or_default();
            let mut template = Template::new(content);
            template.attributes = attributes;
            return Ok(template);
        }
    }
    Ok(Template::new(fragment))
}

fn is_blank_text(fragment: &Fragment, id: NodeId) -> bool {
    fragment
        .text(id)
        .is_some_and(|t| fragment.is_text(id) && t.trim().is_empty())
}

/// Move the children of each `<template>` into its content, recursively.
fn hoist_template_content(fragment: &mut Fragment, parent: NodeId) {
    for child in fragment.children(parent).to_vec() {
        if fragment.tag(child) == Some("template") {
            let mut content = Fragment::new();
            for grandchild in fragment.children(child).to_vec() {
                content.adopt_subtree(NodeId::ROOT, fragment, grandchild);
            }
            hoist_template_content(&mut content, NodeId::ROOT);
            fragment.clear_children(child);
            fragment.set_content(child, content);
        } else {
            hoist_template_content(fragment, child);
        }
    }
}

fn decode(raw: &str) -> CompactString {
    CompactString::from(htmlize::unescape(raw).as_ref())
}

/// Tag being opened.
struct PendingTag {
    name: CompactString,
    attributes: Vec<Attribute>,
}

struct Builder<'s> {
    source: &'s str,
    fragment: Fragment,
    /// Open elements, innermost last.
    stack: Vec<NodeId>,
    current_tag: Option<PendingTag>,
    current_attr: Option<Attribute>,
    error: Option<MarkupError>,
}

impl<'s> Builder<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            source,
            fragment: Fragment::new(),
            stack: Vec::new(),
            current_tag: None,
            current_attr: None,
            error: None,
        }
    }

    #[inline]
    fn parent(&self) -> NodeId {
        self.stack.last().copied().unwrap_or(NodeId::ROOT)
    }

    fn fail(&mut self, err: MarkupError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    fn push_text(&mut self, text: &str) {
        let parent = self.parent();
        if let Some(&last) = self.fragment.children(parent).last() {
            if let NodeKind::Text(existing) = self.fragment.kind(last) {
                let mut merged = existing.clone();
                merged.push_str(text);
                self.fragment.set_text(last, &merged);
                return;
            }
        }
        self.fragment.append_text(parent, text);
    }

    fn open_element(&mut self, self_closing: bool) {
        let Some(tag) = self.current_tag.take() else {
            return;
        };
        let parent = self.parent();
        let id = self.fragment.append_element(parent, &tag.name);
        for attr in &tag.attributes {
            self.fragment.set_attribute(id, &attr.name, &attr.value);
        }
        if !self_closing && !is_void_tag(&tag.name) {
            self.stack.push(id);
        }
    }
}

impl Callbacks for Builder<'_> {
    fn on_text(&mut self, start: usize, end: usize) {
        let text = decode(&self.source[start..end]);
        self.push_text(&text);
    }

    fn on_raw_text(&mut self, start: usize, end: usize) {
        let text = &self.source[start..end];
        self.push_text(text);
    }

    fn on_open_tag_name(&mut self, start: usize, end: usize) {
        self.current_tag = Some(PendingTag {
            name: self.source[start..end].to_ascii_lowercase().into(),
            attributes: Vec::new(),
        });
    }

    fn on_open_tag_end(&mut self, _end: usize) {
        self.open_element(false);
    }

    fn on_self_closing_tag(&mut self, _end: usize) {
        self.open_element(true);
    }

    fn on_close_tag(&mut self, start: usize, end: usize) {
        let name = self.source[start..end].to_ascii_lowercase();
        let open = self
            .stack
            .iter()
            .rposition(|&id| self.fragment.tag(id) == Some(name.as_str()));
        match open {
            // Closing an outer element implicitly closes the inner ones.
            Some(pos) => self.stack.truncate(pos),
            None if is_void_tag(&name) => {}
            None => self.fail(MarkupError::UnexpectedClosingTag(name.into())),
        }
    }

    fn on_attrib_name(&mut self, start: usize, end: usize) {
        self.current_attr = Some(Attribute::new(
            self.source[start..end].to_ascii_lowercase(),
            "",
        ));
    }

    fn on_attrib_data(&mut self, start: usize, end: usize) {
        if let Some(attr) = self.current_attr.as_mut() {
            attr.value = decode(&self.source[start..end]);
        }
    }

    fn on_attrib_end(&mut self, _quote: QuoteType, _end: usize) {
        let (Some(attr), Some(tag)) = (self.current_attr.take(), self.current_tag.as_mut()) else {
            return;
        };
        // Duplicate attributes keep the first value.
        if !tag.attributes.iter().any(|a| a.name == attr.name) {
            tag.attributes.push(attr);
        }
    }

    fn on_comment(&mut self, start: usize, end: usize) {
        let parent = self.parent();
        self.fragment
            .append_comment(parent, &self.source[start..end]);
    }

    fn on_end(&mut self) {
        if let Some(&open) = self.stack.last() {
            let tag = self.fragment.tag(open).unwrap_or_default();
            let err = MarkupError::UnclosedElement(tag.into());
            self.fail(err);
        }
    }

    fn on_eof_in_tag(&mut self, index: usize) {
        self.fail(MarkupError::MalformedTag(index));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_markup() {
        let frag = parse_fragment(r#"<div class="a"><span>x &amp; y</span><input value></div>"#)
            .unwrap();
        insta::assert_snapshot!(frag.to_html(), @r#"<div class="a"><span>x &amp; y</span><input value></div>"#);
    }

    #[test]
    fn test_names_are_lowercased() {
        let frag = parse_fragment(r#"<DIV Data-Value="1"></DIV>"#).unwrap();
        let div = frag.child_at(NodeId::ROOT, 0).unwrap();
        assert_eq!(frag.tag(div), Some("div"));
        assert_eq!(frag.attribute(div, "data-value"), Some("1"));
    }

    #[test]
    fn test_template_content_is_hoisted() {
        let frag = parse_fragment("<div><template><p>[[a]]</p></template></div>").unwrap();
        let div = frag.child_at(NodeId::ROOT, 0).unwrap();
        let template = frag.child_at(div, 0).unwrap();
        assert!(frag.children(template).is_empty());
        let content = frag.content(template).unwrap();
        assert_eq!(content.to_html(), "<p>[[a]]</p>");
    }

    #[test]
    fn test_template_markup_uses_outer_template() {
        let template =
            parse_template_markup("\n<template strip-whitespace>\n<b>hi</b>\n</template>\n")
                .unwrap();
        assert!(template.has_attribute("strip-whitespace"));
        assert_eq!(template.content.to_html(), "\n<b>hi</b>\n");
    }

    #[test]
    fn test_text_is_merged() {
        let frag = parse_fragment("a < b").unwrap();
        assert_eq!(frag.children(NodeId::ROOT).len(), 1);
        assert_eq!(frag.text_content(NodeId::ROOT), "a < b");
    }

    #[test]
    fn test_style_is_raw() {
        let frag = parse_fragment("<style>p > b { color: &red; }</style>").unwrap();
        assert_eq!(frag.text_content(NodeId::ROOT), "p > b { color: &red; }");
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            parse_fragment("<div><span></div>").map(|f| f.to_html()),
            Ok("<div><span></span></div>".to_string())
        );
        assert_eq!(
            parse_fragment("<div>").unwrap_err(),
            MarkupError::UnclosedElement("div".into())
        );
        assert_eq!(
            parse_fragment("</p>").unwrap_err(),
            MarkupError::UnexpectedClosingTag("p".into())
        );
        assert!(matches!(
            parse_fragment("<div a=").unwrap_err(),
            MarkupError::MalformedTag(_)
        ));
    }
}
