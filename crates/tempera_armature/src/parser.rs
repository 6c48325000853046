//! Template parser.
//!
//! Walks a template's content once and records every node that needs work at
//! stamp time: ids, `on-*` listeners, bindings, slots and nested templates.
//! Parsing is destructive: binding attributes and `on-*` attributes are
//! removed and bound text nodes are reduced to their literal text, so the
//! content can be cloned as-is for each instance.
//!
//! The result is memoized on the [`Template`]; parsing again returns the same
//! [`TemplateInfo`].

use std::rc::Rc;

use tempera_carton::{
    changed_event_name, dash_to_camel_case, format_compact, is_raw_text_tag, CompactString,
};
use tempera_relief::{
    Binding, BindingExpression, BindingKind, BindingMode, BindingPart, EventInfo, Fragment,
    NodeId, NodeInfo, ParserOptions, Template, TemplateError, TemplateInfo, Trigger,
};
use tracing::warn;

use crate::expression::parse_bindings;

/// Parse `template`, or return the memoized result of an earlier parse.
pub fn parse_template(
    template: &mut Template,
    options: &ParserOptions,
) -> Result<Rc<TemplateInfo>, TemplateError> {
    if let Some(info) = template.parsed_info() {
        return Ok(Rc::clone(info));
    }
    let strip = options.strip_whitespace || strip_flag(template.attribute("strip-whitespace"), false);
    let parser = TemplateParser { options };
    let info = Rc::new(parser.parse_content(&mut template.content, strip)?);
    template.set_parsed_info(Rc::clone(&info));
    Ok(info)
}

/// `strip-whitespace` attribute value, falling back to the inherited flag.
fn strip_flag(attribute: Option<&str>, inherited: bool) -> bool {
    match attribute {
        Some("false") => false,
        Some(_) => true,
        None => inherited,
    }
}

/// Literal text of all literal parts, concatenated.
pub fn literal_from_parts(parts: &[BindingPart]) -> CompactString {
    let mut literal = CompactString::default();
    for part in parts {
        if let BindingPart::Literal(text) = part {
            literal.push_str(text);
        }
    }
    literal
}

struct TemplateParser<'o> {
    options: &'o ParserOptions,
}

impl TemplateParser<'_> {
    fn parse_content(&self, content: &mut Fragment, strip: bool) -> Result<TemplateInfo, TemplateError> {
        let mut info = TemplateInfo {
            strip_whitespace: strip,
            ..Default::default()
        };
        self.parse_children(content, NodeId::ROOT, None, &mut info)?;
        Ok(info)
    }

    /// Binding parts of `text`, applying the strictness setting to bad
    /// expressions.
    fn bindings_in(&self, text: &str) -> Result<Option<Vec<BindingPart>>, TemplateError> {
        match parse_bindings(text) {
            Ok(parts) => Ok(parts),
            Err(source) if self.options.strict => Err(TemplateError::Binding {
                text: text.into(),
                source,
            }),
            Err(source) => {
                warn!(text, error = %source, "invalid binding expression kept as text");
                Ok(None)
            }
        }
    }

    fn parse_children(
        &self,
        frag: &mut Fragment,
        parent: NodeId,
        parent_info: Option<usize>,
        info: &mut TemplateInfo,
    ) -> Result<(), TemplateError> {
        if frag.tag(parent).is_some_and(is_raw_text_tag) {
            return Ok(());
        }

        let children = frag.children(parent).to_vec();
        let mut parent_index = 0;
        let mut i = 0;
        while i < children.len() {
            let node = children[i];
            i += 1;

            if frag.is_text(node) {
                while i < children.len() && frag.is_text(children[i]) {
                    let mut merged = CompactString::from(frag.text(node).unwrap_or_default());
                    merged.push_str(frag.text(children[i]).unwrap_or_default());
                    frag.set_text(node, &merged);
                    frag.remove(children[i]);
                    i += 1;
                }
                if info.strip_whitespace && frag.text(node).is_some_and(|t| t.trim().is_empty()) {
                    frag.remove(node);
                    continue;
                }
            }

            // Reserve this node's slot so the list stays in pre-order; drop
            // it again when neither the node nor its subtree was noted.
            let slot = info.node_info_list.len();
            info.node_info_list.push(NodeInfo {
                parent_info,
                parent_index,
                ..Default::default()
            });
            let noted = self.parse_node(frag, node, slot, info)?;
            if !noted && info.node_info_list.len() == slot + 1 {
                info.node_info_list.truncate(slot);
            }
            parent_index += 1;
        }
        Ok(())
    }

    fn parse_node(
        &self,
        frag: &mut Fragment,
        node: NodeId,
        slot: usize,
        info: &mut TemplateInfo,
    ) -> Result<bool, TemplateError> {
        if frag.is_text(node) {
            return self.parse_text(frag, node, slot, info);
        }
        if !frag.is_element(node) {
            return Ok(false);
        }

        let mut noted = false;
        let tag = frag.tag(node).map(CompactString::from);
        match tag.as_deref() {
            Some("template") if !frag.has_attribute(node, "preserve-content") => {
                noted = self.parse_nested_template(frag, node, slot, info)?;
            }
            Some("slot") => {
                info.has_insertion_point = true;
                info.node_info_list[slot].has_insertion_point = true;
                noted = true;
            }
            _ => {}
        }
        if !frag.children(node).is_empty() {
            self.parse_children(frag, node, Some(slot), info)?;
        }
        if !frag.attributes(node).is_empty() {
            noted = self.parse_attributes(frag, node, slot, info)? || noted;
        }
        Ok(noted)
    }

    fn parse_text(
        &self,
        frag: &mut Fragment,
        node: NodeId,
        slot: usize,
        info: &mut TemplateInfo,
    ) -> Result<bool, TemplateError> {
        let text = CompactString::from(frag.text(node).unwrap_or_default());
        let Some(parts) = self.bindings_in(&text)? else {
            return Ok(false);
        };
        let literal = literal_from_parts(&parts);
        frag.set_text(node, if literal.is_empty() { " " } else { literal.as_str() });
        add_binding(info, slot, BindingKind::Text, "textContent".into(), parts, literal);
        Ok(true)
    }

    fn parse_attributes(
        &self,
        frag: &mut Fragment,
        node: NodeId,
        slot: usize,
        info: &mut TemplateInfo,
    ) -> Result<bool, TemplateError> {
        let attributes = frag.attributes(node).to_vec();
        let mut noted = false;
        for attr in attributes.iter().rev() {
            noted = self.parse_attribute(frag, node, slot, info, &attr.name, &attr.value)? || noted;
        }
        Ok(noted)
    }

    fn parse_attribute(
        &self,
        frag: &mut Fragment,
        node: NodeId,
        slot: usize,
        info: &mut TemplateInfo,
        name: &str,
        value: &str,
    ) -> Result<bool, TemplateError> {
        let Some(parts) = self.bindings_in(value)? else {
            if let Some(event) = name.strip_prefix("on-") {
                frag.remove_attribute(node, name);
                info.node_info_list[slot].events.push(EventInfo {
                    name: event.into(),
                    handler: value.into(),
                });
                return Ok(true);
            }
            if name == "id" {
                info.node_info_list[slot].id = Some(value.into());
                return Ok(true);
            }
            return Ok(false);
        };

        let (kind, target_name) = match name.strip_suffix('$') {
            Some(stripped) => (BindingKind::Attribute, stripped),
            None => (BindingKind::Property, name),
        };
        let mut literal = literal_from_parts(&parts);
        if kind == BindingKind::Attribute && !literal.is_empty() {
            if target_name == "class" {
                if let Some(existing) = frag.attribute(node, "class") {
                    literal.push(' ');
                    literal.push_str(existing);
                }
            }
            frag.set_attribute(node, target_name, &literal);
        }
        frag.remove_attribute(node, name);

        let target = match kind {
            BindingKind::Property => dash_to_camel_case(target_name),
            _ => CompactString::from(target_name),
        };
        add_binding(info, slot, kind, target, parts, literal);
        Ok(true)
    }

    fn parse_nested_template(
        &self,
        frag: &mut Fragment,
        node: NodeId,
        slot: usize,
        info: &mut TemplateInfo,
    ) -> Result<bool, TemplateError> {
        let strip = self.options.strip_whitespace
            || strip_flag(frag.attribute(node, "strip-whitespace"), info.strip_whitespace);
        let mut content = frag.take_content(node).unwrap_or_default();
        let mut nested = self.parse_content(&mut content, strip)?;
        nested.content = Some(content);

        // Host properties of the nested template flow in through two-way
        // `_host_<prop>` bindings on the template node.
        for prop in &nested.host_props {
            let mut trigger = Trigger::from_dependency(prop);
            trigger.wildcard = true;
            let part = BindingPart::Expression(BindingExpression {
                source: prop.clone(),
                mode: BindingMode::TwoWay,
                negate: false,
                signature: None,
                dependencies: vec![trigger],
                custom_event: None,
                compound_index: 0,
            });
            let target = format_compact!("_host_{prop}");
            add_binding(info, slot, BindingKind::Property, target, vec![part], CompactString::default());
        }

        info.node_info_list[slot].template_info = Some(Rc::new(nested));
        Ok(true)
    }
}

fn add_binding(
    info: &mut TemplateInfo,
    slot: usize,
    kind: BindingKind,
    target: CompactString,
    parts: Vec<BindingPart>,
    literal: CompactString,
) {
    let is_compound = parts.len() != 1;
    let (listener_event, listener_negate) = match parts.first() {
        Some(BindingPart::Expression(expr))
            if kind == BindingKind::Property
                && !target.is_empty()
                && !is_compound
                && expr.mode == BindingMode::TwoWay =>
        {
            let event = expr
                .custom_event
                .clone()
                .unwrap_or_else(|| changed_event_name(&target));
            (Some(event), expr.negate)
        }
        _ => (None, false),
    };

    for expr in parts.iter().filter_map(BindingPart::as_expression) {
        for dep in &expr.dependencies {
            info.add_host_prop(&dep.root_property);
        }
    }

    info.node_info_list[slot].bindings.push(Binding {
        kind,
        target,
        parts,
        literal: (!literal.is_empty()).then_some(literal),
        is_compound,
        listener_event,
        listener_negate,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::parse_template_markup;
    use std::fmt::Write as _;
    use tempera_relief::BindingParseError;

    fn options() -> ParserOptions {
        ParserOptions {
            strip_whitespace: false,
            strict: true,
        }
    }

    /// One line per node info: index, parent, position and what was noted.
    fn describe(info: &TemplateInfo) -> String {
        let mut out = String::new();
        for (i, node) in info.node_info_list.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            let _ = write!(out, "{i}: parent={:?} index={}", node.parent_info, node.parent_index);
            if let Some(id) = &node.id {
                let _ = write!(out, " id={id}");
            }
            for event in &node.events {
                let _ = write!(out, " on:{}={}", event.name, event.handler);
            }
            for binding in &node.bindings {
                let _ = write!(out, " {:?}:{}", binding.kind, binding.target);
                if let Some(event) = &binding.listener_event {
                    let _ = write!(out, "<-{event}");
                }
            }
            if node.template_info.is_some() {
                out.push_str(" nested");
            }
        }
        out
    }

    fn parse(markup: &str) -> (Template, Rc<TemplateInfo>) {
        let mut template = parse_template_markup(markup).unwrap();
        let info = parse_template(&mut template, &options()).unwrap();
        (template, info)
    }

    #[test]
    fn test_text_and_attribute_bindings() {
        let (template, info) = parse(
            r#"<div id="box" class="a" class$="[[kind]] x" on-click="handleClick"><span>Hello [[name]]!</span><input value="{{value::input}}"></div>"#,
        );
        insta::assert_snapshot!(template.content.to_html(), @r#"<div id="box" class=" x a"><span>Hello !</span><input></div>"#);
        insta::assert_snapshot!(describe(&info), @r"
        0: parent=None index=0 id=box on:click=handleClick Attribute:class
        1: parent=Some(0) index=0
        2: parent=Some(1) index=0 Text:textContent
        3: parent=Some(0) index=1 Property:value<-input
        ");
        assert_eq!(info.host_props, ["name", "value", "kind"]);
    }

    #[test]
    fn test_property_targets_are_camel_cased() {
        let (_, info) = parse(r#"<x-item selected-item="{{selection}}"></x-item>"#);
        let binding = &info.node_info_list[0].bindings[0];
        assert_eq!(binding.kind, BindingKind::Property);
        assert_eq!(binding.target, "selectedItem");
        assert_eq!(binding.listener_event.as_deref(), Some("selected-item-changed"));
    }

    #[test]
    fn test_compound_bindings_have_no_listener() {
        let (_, info) = parse(r#"<x-item label="{{first}} {{last}}"></x-item>"#);
        let binding = &info.node_info_list[0].bindings[0];
        assert!(binding.is_compound);
        assert_eq!(binding.literal.as_deref(), Some(" "));
        assert_eq!(binding.listener_event, None);
    }

    #[test]
    fn test_pure_text_binding_keeps_a_space() {
        let (template, _) = parse("<p>[[message]]</p>");
        assert_eq!(template.content.to_html(), "<p> </p>");
    }

    #[test]
    fn test_memoized() {
        let mut template = parse_template_markup("<p>[[a]]</p>").unwrap();
        let first = parse_template(&mut template, &options()).unwrap();
        let second = parse_template(&mut template, &options()).unwrap();
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_nested_template() {
        let (template, info) = parse(
            "<template strip-whitespace><div>\n  <template><b>[[item.name]]</b> <slot></slot></template>\n</div></template>",
        );
        assert_eq!(template.content.to_html(), "<div><template></template></div>");
        insta::assert_snapshot!(describe(&info), @r"
        0: parent=None index=0
        1: parent=Some(0) index=0 Property:_host_item<-_host_item-changed nested
        ");
        let nested = info.node_info_list[1].template_info.as_ref().unwrap();
        assert!(nested.strip_whitespace);
        assert!(nested.has_insertion_point);
        assert_eq!(nested.host_props, ["item"]);
        assert_eq!(
            nested.content.as_ref().map(Fragment::to_html).as_deref(),
            Some("<b> </b><slot></slot>")
        );
        assert_eq!(info.host_props, ["item"]);
    }

    #[test]
    fn test_strip_whitespace_override() {
        let (_, info) = parse(
            "<template strip-whitespace><div><template strip-whitespace=\"false\"><b></b> <i></i></template></div></template>",
        );
        let nested = info.node_info_list[1].template_info.as_ref().unwrap();
        assert!(!nested.strip_whitespace);
        assert_eq!(
            nested.content.as_ref().map(Fragment::to_html).as_deref(),
            Some("<b></b> <i></i>")
        );
    }

    #[test]
    fn test_preserve_content_is_not_parsed() {
        let (_, info) = parse("<div><template preserve-content><p>[[a]]</p></template></div>");
        assert!(info.node_info_list.is_empty());
    }

    #[test]
    fn test_style_is_not_parsed() {
        let (_, info) = parse("<style>[[not-a-binding]]</style>");
        assert!(info.node_info_list.is_empty());
    }

    #[test]
    fn test_invalid_binding() {
        let mut template = parse_template_markup("<p>[[fn(]]</p>").unwrap();
        let err = parse_template(&mut template, &options()).unwrap_err();
        assert_eq!(
            err,
            TemplateError::Binding {
                text: "[[fn(]]".into(),
                source: BindingParseError::MalformedMethod("fn(".into()),
            }
        );

        let mut template = parse_template_markup("<p>[[fn(]]</p>").unwrap();
        let lenient = ParserOptions {
            strict: false,
            ..options()
        };
        let info = parse_template(&mut template, &lenient).unwrap();
        assert!(info.node_info_list.is_empty());
        assert_eq!(template.content.to_html(), "<p>[[fn(]]</p>");
    }
}
