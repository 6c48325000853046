//! Binding evaluation and application.
//!
//! A binding part is evaluated against the host (method call or path read),
//! then applied to the stamped node: compound bindings join their parts as
//! strings, attribute targets go through the host's codec, and property
//! targets either reach a client element's accessors or land on the node as
//! plain properties.

use std::rc::Rc;

use tempera_carton::CompactString;
use tempera_relief::{
    path, Binding, BindingExpression, BindingKind, MethodArg, MethodSignature, NodeId, Value,
};

use crate::accessors::ChangeSet;
use crate::element::Element;
use crate::error::{HandlerError, HandlerResult};
use crate::event::Event;
use crate::stamp::BoundTemplate;

pub use tempera_armature::{parse_bindings, parse_method};

/// Evaluate one binding part for a change at `path`.
pub fn evaluate(
    element: &Element,
    part: &BindingExpression,
    path: &str,
    changed: &ChangeSet,
    _old: &ChangeSet,
    has_paths: bool,
) -> HandlerResult {
    let value = if let Some(signature) = &part.signature {
        element.run_method(signature, path, changed)?
    } else if path != part.source {
        element.get(&part.source)
    } else if has_paths && path::is_path(path) {
        element.get(path)
    } else {
        element.data(path)
    };
    Ok(if part.negate {
        Value::Bool(!value.truthy())
    } else {
        value
    })
}

/// Argument values for a method call.
///
/// Unresolved paths fall back to the value in `changed`; wildcard arguments
/// become `{path, value, base}` records.
pub fn marshal_args(
    element: &Element,
    signature: &MethodSignature,
    path: &str,
    changed: &ChangeSet,
) -> Vec<Value> {
    let arg_value = |name: &str| {
        let value = element.get(name);
        if value.is_undefined() {
            changed.value(name)
        } else {
            value
        }
    };

    signature
        .args
        .iter()
        .map(|arg| match arg {
            MethodArg::Literal(value) => value.clone(),
            MethodArg::Property(trigger) if trigger.wildcard => {
                let matches = path::is_descendant(&trigger.name, path);
                let arg_path = if matches { path } else { trigger.name.as_str() };
                let value = arg_value(arg_path);
                let base = if matches {
                    element.get(&trigger.name)
                } else {
                    value.clone()
                };
                Value::object_from([
                    ("path", Value::from(arg_path)),
                    ("value", value),
                    ("base", base),
                ])
            }
            MethodArg::Property(trigger) if trigger.structured => arg_value(&trigger.name),
            MethodArg::Property(trigger) => element.data(&trigger.name),
        })
        .collect()
}

impl Element {
    /// Call the method named by `signature` with marshaled arguments.
    pub(crate) fn run_method(
        &self,
        signature: &MethodSignature,
        path: &str,
        changed: &ChangeSet,
    ) -> HandlerResult {
        let args = marshal_args(self, signature, path, changed);
        self.call_method(&signature.method_name, &args)
    }

    /// Invoke a method of the element's class. Missing methods log a warning
    /// and yield `undefined`.
    pub fn call_method(&self, name: &str, args: &[Value]) -> HandlerResult {
        let Some(method) = self.inner.class.method(name) else {
            tracing::warn!("method `{}` not defined on <{}>", name, self.local_name());
            return Ok(Value::Undefined);
        };
        method(self, args)
    }

    /// PROPAGATE handler of one binding part.
    pub(crate) fn run_binding_effect(
        &self,
        bound: &Rc<BoundTemplate>,
        (node_index, binding_index, part_index): (usize, usize, usize),
        path: &str,
        changed: &ChangeSet,
        has_paths: bool,
    ) -> HandlerResult<()> {
        let Some(node_info) = bound.info.node_info_list.get(node_index) else {
            return Ok(());
        };
        let Some(binding) = node_info.bindings.get(binding_index) else {
            return Ok(());
        };
        let Some(part) = binding.parts.get(part_index).and_then(|p| p.as_expression()) else {
            return Ok(());
        };
        let node = bound.nodes[node_index];

        // Sub-path change forwarded to a client as a path notification.
        if has_paths
            && part.signature.is_none()
            && path.len() > part.source.len()
            && binding.kind == BindingKind::Property
            && !binding.is_compound
        {
            if let Some(client) = bound.client(node).filter(|c| c.has_accessor(&binding.target)) {
                if let Some(translated) = path::translate(&part.source, &binding.target, path) {
                    if client.set_pending_property_or_path(&translated, changed.value(path), false, true) {
                        self.enqueue_client(&client);
                    }
                }
                return Ok(());
            }
        }

        let value = evaluate(self, part, path, changed, &ChangeSet::new(), has_paths)?;
        self.apply_binding_value(bound, (node_index, binding_index), binding, part, value);
        Ok(())
    }

    fn apply_binding_value(
        &self,
        bound: &BoundTemplate,
        address: (usize, usize),
        binding: &Binding,
        part: &BindingExpression,
        value: Value,
    ) {
        let node = bound.nodes[address.0];
        let mut value = if binding.is_compound {
            bound.compound_value(address, part.compound_index, value)
        } else {
            value
        };
        if binding.kind != BindingKind::Attribute && value.is_nullish() {
            let is_input_value = binding.target == "value"
                && matches!(bound.tag(node).as_deref(), Some("input" | "textarea"));
            if binding.target == "textContent" || is_input_value {
                value = Value::from("");
            }
        }

        match binding.kind {
            BindingKind::Attribute => {
                let serialized = self.codec().serialize(&value);
                bound.write_attribute(node, &binding.target, serialized.as_deref());
            }
            BindingKind::Text | BindingKind::Property => {
                if let Some(client) = bound.client(node).filter(|c| c.has_accessor(&binding.target)) {
                    if !client.is_read_only(&binding.target)
                        && client.set_pending_property(&binding.target, value, false)
                    {
                        self.enqueue_client(&client);
                    }
                    return;
                }
                bound.set_unmanaged(node, &binding.target, value);
            }
        }
    }

    /// Plain assignment of `target` on a stamped node.
    pub(crate) fn set_node_target(&self, bound: &BoundTemplate, node: NodeId, target: &str, value: Value) {
        match bound.client(node) {
            Some(client) => {
                if let Err(err) = client.set_property(target, value) {
                    tracing::warn!("`{}` on <{}>: {}", target, client.local_name(), err);
                }
            }
            None => bound.set_unmanaged(node, target, value),
        }
    }

    /// Two-way write-back from a node's change event.
    pub(crate) fn handle_notification(
        &self,
        bound: &BoundTemplate,
        node: NodeId,
        event: &Event,
        from_prop: &str,
        to_path: &str,
        negate: bool,
    ) -> HandlerResult<()> {
        let is_path = event.detail.path.is_some();
        let (to_path, value) = match &event.detail.path {
            Some(from_path) => match path::translate(from_prop, to_path, from_path) {
                Some(translated) => (translated, event.detail.value.clone()),
                None => return Ok(()),
            },
            None => (CompactString::from(to_path), bound.property(node, from_prop)),
        };
        let value = if negate {
            Value::Bool(!value.truthy())
        } else {
            value
        };
        if self.is_read_only(&to_path) {
            return Ok(());
        }
        if self.set_pending_property_or_path(&to_path, value, true, is_path)
            && !event.detail.queue_property
        {
            self.invalidate()
                .map_err(|err| HandlerError::new(err.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::ElementDefinition;
    use crate::registry::Registry;
    use tempera_relief::Settings;

    fn element() -> Element {
        let registry = Registry::new(Settings::default());
        registry
            .define(
                ElementDefinition::new("x-args").method("echo", |_, args| Ok(Value::array(args.to_vec()))),
            )
            .unwrap();
        registry.create("x-args").unwrap()
    }

    #[test]
    fn test_marshal_args() {
        let el = element();
        el.set_property("count", 3).unwrap();
        el.set_property("user", Value::object_from([("name", Value::from("Ann"))]))
            .unwrap();

        let sig = parse_method("echo('lit', count, user.name, user.*)").unwrap().unwrap();
        let mut changed = ChangeSet::new();
        changed.insert("user.name", "Ann".into());
        let args = marshal_args(&el, &sig, "user.name", &changed);
        assert_eq!(args[0], Value::from("lit"));
        assert_eq!(args[1], Value::from(3));
        assert_eq!(args[2], Value::from("Ann"));
        assert_eq!(args[3].get_key("path"), Value::from("user.name"));
        assert_eq!(args[3].get_key("value"), Value::from("Ann"));
        assert!(args[3].get_key("base").strict_eq(&el.get("user")));
    }

    #[test]
    fn test_unresolved_path_falls_back_to_changed() {
        let el = element();
        let sig = parse_method("echo(missing.x)").unwrap().unwrap();
        let mut changed = ChangeSet::new();
        changed.insert("missing.x", 7.into());
        assert_eq!(marshal_args(&el, &sig, "missing.x", &changed), [Value::from(7)]);
    }

    #[test]
    fn test_evaluate_negation_and_missing_method() {
        let el = element();
        el.set_property("flag", Value::Bool(true)).unwrap();
        let parts = parse_bindings("[[!flag]]").unwrap().unwrap();
        let part = parts[0].as_expression().unwrap();
        let empty = ChangeSet::new();
        assert_eq!(evaluate(&el, part, "flag", &empty, &empty, false), Ok(Value::Bool(false)));

        let parts = parse_bindings("[[nothing(flag)]]").unwrap().unwrap();
        let part = parts[0].as_expression().unwrap();
        assert_eq!(evaluate(&el, part, "flag", &empty, &empty, false), Ok(Value::Undefined));
    }
}
