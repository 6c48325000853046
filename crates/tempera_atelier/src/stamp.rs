//! Template stamping.
//!
//! Stamping clones a parsed template's content, finds the noted nodes by
//! walking `parent_info`/`parent_index`, upgrades child nodes whose tag is a
//! defined element into client elements, installs listeners and registers the
//! template's binding effects on the host.

use std::cell::{Ref, RefCell};
use std::rc::Rc;

use tempera_carton::{CompactString, FxHashMap, FxHashSet};
use tempera_relief::{BindingKind, BindingPart, Fragment, NodeId, Template, TemplateInfo, Value};

use crate::accessors::ChangeSet;
use crate::effects::{EffectKind, EffectTable, Phase, PhaseRun};
use crate::element::Element;
use crate::error::{EffectFailure, EngineError, HandlerResult};
use crate::event::{self, Event, Listener};

struct NodeListener {
    node: NodeId,
    event: CompactString,
    listener: Listener,
}

/// A stamped template instance bound to its host element.
pub struct BoundTemplate {
    pub(crate) info: Rc<TemplateInfo>,
    pub(crate) fragment: RefCell<Fragment>,
    /// Stamped node for each entry of `info.node_info_list`.
    pub(crate) nodes: Vec<NodeId>,
    ids: FxHashMap<CompactString, NodeId>,
    /// Binding effects, all in the propagate phase.
    pub(crate) effects: EffectTable,
    compound: RefCell<FxHashMap<(usize, usize), Vec<Value>>>,
    clients: FxHashMap<NodeId, Element>,
    listeners: RefCell<Vec<NodeListener>>,
}

impl BoundTemplate {
    pub fn info(&self) -> &Rc<TemplateInfo> {
        &self.info
    }

    pub fn fragment(&self) -> Ref<'_, Fragment> {
        self.fragment.borrow()
    }

    /// Stamped node of the `index`-th node info.
    pub fn node(&self, index: usize) -> Option<NodeId> {
        self.nodes.get(index).copied()
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Node with the given `id` attribute.
    pub fn by_id(&self, id: &str) -> Option<NodeId> {
        self.ids.get(id).copied()
    }

    /// Client element upgraded at `node`.
    pub fn client(&self, node: NodeId) -> Option<Element> {
        self.clients.get(&node).cloned()
    }

    pub fn clients(&self) -> impl Iterator<Item = &Element> {
        self.clients.values()
    }

    pub fn to_html(&self) -> String {
        self.fragment.borrow().to_html()
    }

    pub fn text_content(&self, node: NodeId) -> String {
        self.fragment.borrow().text_content(node)
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<CompactString> {
        self.fragment.borrow().attribute(node, name).map(CompactString::from)
    }

    /// Property of `node`; client elements answer from their own data.
    pub fn property(&self, node: NodeId, name: &str) -> Value {
        match self.clients.get(&node) {
            Some(client) => client.get(name),
            None => self.fragment.borrow().property(node, name),
        }
    }

    /// Set a property on a plain node, as user input would.
    pub fn set_property(&self, node: NodeId, name: &str, value: Value) {
        self.set_unmanaged(node, name, value);
    }

    /// Parsed nested template at `node`.
    pub fn nested_template(&self, node: NodeId) -> Option<Rc<TemplateInfo>> {
        let index = self.nodes.iter().position(|&n| n == node)?;
        self.info.node_info_list[index].template_info.clone()
    }

    /// Dispatch `event` at `node`.
    pub fn dispatch_event(&self, node: NodeId, event: &Event) -> HandlerResult<()> {
        if let Some(client) = self.clients.get(&node) {
            return client.dispatch_event(event);
        }
        let listeners: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .filter(|l| l.node == node && l.event == event.name)
            .map(|l| l.listener.clone())
            .collect();
        event::dispatch(listeners, event)
    }

    pub(crate) fn add_listener(&self, node: NodeId, event: &str, listener: Listener) {
        match self.clients.get(&node) {
            Some(client) => {
                client.add_event_listener_rc(event, listener);
            }
            None => self.listeners.borrow_mut().push(NodeListener {
                node,
                event: event.into(),
                listener,
            }),
        }
    }

    /// Plain property write; `textContent` replaces the node's text.
    pub(crate) fn set_unmanaged(&self, node: NodeId, name: &str, value: Value) {
        if let Some(client) = self.clients.get(&node) {
            client.inner.store.borrow_mut().set_data(name, value);
            return;
        }
        let mut fragment = self.fragment.borrow_mut();
        if name == "textContent" {
            fragment.set_text(node, &value.to_binding_string());
        } else {
            fragment.set_property(node, name, value);
        }
    }

    pub(crate) fn write_attribute(&self, node: NodeId, name: &str, value: Option<&str>) {
        {
            let mut fragment = self.fragment.borrow_mut();
            match value {
                Some(value) => fragment.set_attribute(node, name, value),
                None => {
                    fragment.remove_attribute(node, name);
                }
            }
        }
        if let Some(client) = self.clients.get(&node) {
            let result = match value {
                Some(value) => client.set_attribute(name, value),
                None => client.remove_attribute(name),
            };
            if let Err(err) = result {
                tracing::warn!("attribute `{}` on client element: {}", name, err);
            }
        }
    }

    /// Store one part of a compound binding and join all parts.
    pub(crate) fn compound_value(
        &self,
        address: (usize, usize),
        compound_index: usize,
        value: Value,
    ) -> Value {
        let mut storage = self.compound.borrow_mut();
        let Some(slots) = storage.get_mut(&address) else {
            return value;
        };
        if let Some(slot) = slots.get_mut(compound_index) {
            *slot = value;
        }
        let mut joined = CompactString::default();
        for slot in slots.iter() {
            joined.push_str(&slot.to_binding_string());
        }
        Value::String(joined)
    }

    pub(crate) fn tag(&self, node: NodeId) -> Option<CompactString> {
        self.fragment.borrow().tag(node).map(CompactString::from)
    }

    /// Detach everything that was stamped.
    fn clear(&self) {
        self.fragment.borrow_mut().clear_children(NodeId::ROOT);
        self.listeners.borrow_mut().clear();
        for client in self.clients.values() {
            client.set_host(None);
        }
    }
}

impl std::fmt::Debug for BoundTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundTemplate")
            .field("nodes", &self.nodes)
            .field("html", &self.to_html())
            .finish()
    }
}

impl Element {
    /// Parse (once) and stamp `template`, binding it to this element.
    pub fn stamp_template(&self, template: &mut Template) -> Result<Rc<BoundTemplate>, EngineError> {
        let options = self.inner.settings.parser_options();
        let info = tempera_armature::parse_template(template, &options)?;
        self.stamp_parsed(&template.content, info)
    }

    /// Stamp the nested template found at `node` of `bound`.
    pub fn stamp_nested_template(
        &self,
        bound: &BoundTemplate,
        node: NodeId,
    ) -> Result<Option<Rc<BoundTemplate>>, EngineError> {
        let Some(info) = bound.nested_template(node) else {
            return Ok(None);
        };
        let Some(content) = info.content.as_ref() else {
            return Ok(None);
        };
        self.stamp_parsed(content, info.clone()).map(Some)
    }

    /// Unbind a stamped template and detach its nodes. Returns `false` when
    /// the template was not bound to this element.
    pub fn remove_bound_dom(&self, bound: &Rc<BoundTemplate>) -> bool {
        let removed = {
            let mut templates = self.inner.templates.borrow_mut();
            let before = templates.len();
            templates.retain(|t| !Rc::ptr_eq(t, bound));
            before != templates.len()
        };
        if !removed {
            return false;
        }
        {
            let mut root = self.inner.root.borrow_mut();
            if root.as_ref().is_some_and(|r| Rc::ptr_eq(r, bound)) {
                *root = None;
            }
        }
        bound.clear();
        true
    }

    pub(crate) fn stamp_parsed(
        &self,
        content: &Fragment,
        info: Rc<TemplateInfo>,
    ) -> Result<Rc<BoundTemplate>, EngineError> {
        let mut failures = Vec::new();
        let bound = self.bind_parsed(content, info, &mut failures)?;
        self.report(failures)?;
        Ok(bound)
    }

    /// Stamp and bind without reporting effect failures. Errors are returned
    /// before anything is bound to this element.
    pub(crate) fn bind_parsed(
        &self,
        content: &Fragment,
        info: Rc<TemplateInfo>,
        failures: &mut Vec<EffectFailure>,
    ) -> Result<Rc<BoundTemplate>, EngineError> {
        let fragment = content.deep_clone();

        let mut nodes = Vec::with_capacity(info.node_info_list.len());
        let mut ids = FxHashMap::default();
        for (index, node_info) in info.node_info_list.iter().enumerate() {
            let parent = match node_info.parent_info {
                Some(p) => nodes.get(p).copied().ok_or(EngineError::StampMismatch(index))?,
                None => NodeId::ROOT,
            };
            let node = fragment
                .child_at(parent, node_info.parent_index)
                .ok_or(EngineError::StampMismatch(index))?;
            if let Some(id) = &node_info.id {
                ids.insert(id.clone(), node);
            }
            nodes.push(node);
        }

        let (clients, upgraded) = self.upgrade_clients(&fragment)?;
        for client in &upgraded {
            self.enqueue_client(client);
        }

        let (effects, roots) = binding_effects(&info);
        for root in &roots {
            self.create_accessor(root, false);
        }

        let bound = Rc::new(BoundTemplate {
            info: info.clone(),
            fragment: RefCell::new(fragment),
            nodes,
            ids,
            effects,
            compound: RefCell::new(FxHashMap::default()),
            clients,
            listeners: RefCell::new(Vec::new()),
        });
        self.setup_bindings(&bound);

        self.apply_static_bindings(&bound, failures);
        self.inner.templates.borrow_mut().push(bound.clone());

        if self.inner.flush.borrow().clients_ready {
            let data = self.inner.store.borrow().data_snapshot();
            self.run_template_effects(&bound, &data, &ChangeSet::new(), false, failures);
            self.flush_clients(failures);
        }
        Ok(bound)
    }

    /// Create client elements for descendants whose tag is defined, keyed
    /// by node and in document order.
    fn upgrade_clients(
        &self,
        fragment: &Fragment,
    ) -> Result<(FxHashMap<NodeId, Element>, Vec<Element>), EngineError> {
        let mut clients = FxHashMap::default();
        let mut upgraded = Vec::new();
        let Some(registry) = self.inner.registry.as_ref() else {
            return Ok((clients, upgraded));
        };
        for node in fragment.descendants(NodeId::ROOT) {
            let Some(tag) = fragment.tag(node) else {
                continue;
            };
            if !registry.is_defined(tag) {
                continue;
            }
            let client = registry.create(tag)?;
            client.set_host(Some(self));
            for attr in fragment.attributes(node) {
                client.set_attribute(&attr.name, &attr.value)?;
            }
            upgraded.push(client.clone());
            clients.insert(node, client);
        }
        Ok((clients, upgraded))
    }

    /// Compound storage, literal initial values and listeners.
    fn setup_bindings(&self, bound: &Rc<BoundTemplate>) {
        for (index, node_info) in bound.info.node_info_list.iter().enumerate() {
            let node = bound.nodes[index];
            for (binding_index, binding) in node_info.bindings.iter().enumerate() {
                if binding.is_compound {
                    let slots = binding
                        .parts
                        .iter()
                        .map(|part| match part {
                            BindingPart::Literal(text) => Value::from(text.clone()),
                            BindingPart::Expression(_) => Value::Undefined,
                        })
                        .collect();
                    bound.compound.borrow_mut().insert((index, binding_index), slots);
                }
                if let (Some(literal), BindingKind::Property) =
                    (&binding.literal, binding.kind)
                {
                    self.set_node_target(bound, node, &binding.target, Value::from(literal.clone()));
                }
                if let Some(event) = &binding.listener_event {
                    let Some(expr) = binding.parts.first().and_then(|p| p.as_expression()) else {
                        continue;
                    };
                    let listener =
                        self.notification_listener(bound, node, &binding.target, &expr.source, binding.listener_negate);
                    bound.add_listener(node, event, listener);
                }
            }
            for event_info in &node_info.events {
                let host = self.downgrade();
                let handler = event_info.handler.clone();
                let listener: Listener = Rc::new(move |event: &Event| {
                    let Some(host) = host.upgrade() else {
                        return Ok(());
                    };
                    let args = [Value::from(event.name.clone()), event.detail.value.clone()];
                    host.call_method(&handler, &args).map(drop)
                });
                bound.add_listener(node, &event_info.name, listener);
            }
        }
    }

    fn notification_listener(
        &self,
        bound: &Rc<BoundTemplate>,
        node: NodeId,
        target: &str,
        source: &str,
        negate: bool,
    ) -> Listener {
        let host = self.downgrade();
        let weak_bound = Rc::downgrade(bound);
        let target = CompactString::from(target);
        let source = CompactString::from(source);
        Rc::new(move |event: &Event| {
            let (Some(host), Some(bound)) = (host.upgrade(), weak_bound.upgrade()) else {
                return Ok(());
            };
            host.handle_notification(&bound, node, event, &target, &source, negate)
        })
    }

    /// Method bindings without dependencies never fire; evaluate them now.
    fn apply_static_bindings(&self, bound: &Rc<BoundTemplate>, failures: &mut Vec<EffectFailure>) {
        let empty = ChangeSet::new();
        for (index, node_info) in bound.info.node_info_list.iter().enumerate() {
            for (binding_index, binding) in node_info.bindings.iter().enumerate() {
                for (part_index, expr) in binding.expressions() {
                    let is_static = expr.signature.as_ref().is_some_and(|s| s.is_static);
                    if !is_static {
                        continue;
                    }
                    let address = (index, binding_index, part_index);
                    if let Err(error) =
                        self.run_binding_effect(bound, address, &expr.source, &empty, false)
                    {
                        failures.push(EffectFailure {
                            phase: Phase::Propagate,
                            property: expr.source.clone(),
                            error,
                        });
                    }
                }
            }
        }
    }

    /// Run one template's binding effects.
    pub(crate) fn run_template_effects(
        &self,
        bound: &Rc<BoundTemplate>,
        changed: &ChangeSet,
        old: &ChangeSet,
        has_paths: bool,
        failures: &mut Vec<EffectFailure>,
    ) {
        let run = PhaseRun {
            phase: Phase::Propagate,
            table: &bound.effects,
            old,
            has_paths,
            template: Some(bound),
        };
        self.run_effects(&run, changed, failures);
    }

    /// Attach stamped DOM as this element's own root.
    pub fn attach_dom(&self, bound: Rc<BoundTemplate>) -> Result<(), EngineError> {
        let mut root = self.inner.root.borrow_mut();
        if root.is_some() {
            return Err(EngineError::AlreadyAttached);
        }
        *root = Some(bound);
        Ok(())
    }

    /// The element's attached DOM.
    pub fn root(&self) -> Option<Rc<BoundTemplate>> {
        self.inner.root.borrow().clone()
    }

    /// Node with the given id in the attached DOM.
    pub fn by_id(&self, id: &str) -> Option<NodeId> {
        self.root()?.by_id(id)
    }

    /// Markup of the attached DOM.
    pub fn to_html(&self) -> String {
        self.root().map(|r| r.to_html()).unwrap_or_default()
    }

    /// Stamped templates bound to this element, in stamping order.
    pub fn bound_templates(&self) -> Vec<Rc<BoundTemplate>> {
        self.inner.templates.borrow().clone()
    }
}

/// Binding effects of a template, keyed by dependency root, and the set of
/// roots that need accessors.
pub(crate) fn binding_effects(info: &TemplateInfo) -> (EffectTable, Vec<CompactString>) {
    let mut table = EffectTable::new();
    let mut roots = Vec::new();
    let mut seen = FxHashSet::default();
    for (node_index, node_info) in info.node_info_list.iter().enumerate() {
        for (binding_index, binding) in node_info.bindings.iter().enumerate() {
            for (part_index, expr) in binding.expressions() {
                let kind = Rc::new(EffectKind::Binding {
                    node_index,
                    binding_index,
                    part_index,
                });
                for dep in &expr.dependencies {
                    table.add(&dep.root_property, Phase::Propagate, Some(dep.clone()), kind.clone());
                    if seen.insert(dep.root_property.clone()) {
                        roots.push(dep.root_property.clone());
                    }
                }
            }
        }
    }
    (table, roots)
}
