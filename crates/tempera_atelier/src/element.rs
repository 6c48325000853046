//! Element instances.
//!
//! An [`Element`] is a cheap handle (`Rc`) to one instance of an
//! [`ElementClass`]. It owns the instance data, a copy-on-write view of the
//! class's accessor and effect tables, the stamped DOM bound to it and its
//! listeners. All writes funnel through the pending bag; see the `flush`
//! module for when they are dispatched.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tempera_carton::{dash_to_camel_case, CompactString};
use tempera_relief::{Attribute, Settings, Value};

use crate::accessors::PropertyStore;
use crate::codec::AttributeCodec;
use crate::definition::ElementClass;
use crate::effects::{EffectContext, EffectGraph, EffectId, EffectKind, Phase};
use crate::error::{EffectFailure, EngineError, HandlerResult};
use crate::event::{self, Event, Listener, ListenerEntry, ListenerId};
use crate::flush::FlushController;
use crate::linker::PathLinker;
use crate::registry::Registry;
use crate::scheduler::Scheduler;
use crate::stamp::BoundTemplate;

/// Receives failures of flushes that have nobody to return them to.
pub type ErrorHook = Rc<dyn Fn(&EffectFailure)>;

pub(crate) struct ElementInner {
    pub(crate) class: Rc<ElementClass>,
    pub(crate) settings: Settings,
    pub(crate) registry: Option<Registry>,
    pub(crate) scheduler: Option<Rc<dyn Scheduler>>,
    pub(crate) store: RefCell<PropertyStore>,
    pub(crate) graph: RefCell<Rc<EffectGraph>>,
    pub(crate) linker: RefCell<PathLinker>,
    pub(crate) flush: RefCell<FlushController>,
    /// Bound templates in stamping order.
    pub(crate) templates: RefCell<Vec<Rc<BoundTemplate>>>,
    pub(crate) root: RefCell<Option<Rc<BoundTemplate>>>,
    attributes: RefCell<Vec<Attribute>>,
    listeners: RefCell<Vec<ListenerEntry>>,
    next_listener: Cell<u32>,
    pub(crate) error_hook: RefCell<Option<ErrorHook>>,
    serializing: Cell<bool>,
    host: RefCell<Weak<ElementInner>>,
}

/// Handle to an element instance.
#[derive(Clone)]
pub struct Element {
    pub(crate) inner: Rc<ElementInner>,
}

/// Non-owning element handle.
#[derive(Clone)]
pub struct WeakElement(Weak<ElementInner>);

impl WeakElement {
    pub fn upgrade(&self) -> Option<Element> {
        self.0.upgrade().map(|inner| Element { inner })
    }
}

impl Element {
    pub(crate) fn new(
        class: Rc<ElementClass>,
        settings: Settings,
        registry: Option<Registry>,
        scheduler: Option<Rc<dyn Scheduler>>,
    ) -> Self {
        let graph = class.graph.clone();
        let element = Element {
            inner: Rc::new(ElementInner {
                class,
                settings,
                registry,
                scheduler,
                store: RefCell::new(PropertyStore::new()),
                graph: RefCell::new(graph),
                linker: RefCell::new(PathLinker::new()),
                flush: RefCell::new(FlushController::default()),
                templates: RefCell::new(Vec::new()),
                root: RefCell::new(None),
                attributes: RefCell::new(Vec::new()),
                listeners: RefCell::new(Vec::new()),
                next_listener: Cell::new(0),
                error_hook: RefCell::new(None),
                serializing: Cell::new(false),
                host: RefCell::new(Weak::new()),
            }),
        };
        element.initialize_properties();
        element
    }

    /// Apply declared defaults as pending writes.
    fn initialize_properties(&self) {
        let class = self.inner.class.clone();
        for decl in class.properties() {
            let Some(default) = &decl.default else {
                continue;
            };
            let value = default.produce();
            if self.has_accessor(&decl.name) {
                self.set_pending_property(&decl.name, value, true);
            } else {
                self.inner.store.borrow_mut().set_data(&decl.name, value);
            }
        }
    }

    pub fn class(&self) -> &Rc<ElementClass> {
        &self.inner.class
    }

    /// Tag name the element was defined under.
    pub fn local_name(&self) -> &str {
        self.inner.class.name()
    }

    pub fn root_path(&self) -> &str {
        &self.inner.settings.root_path
    }

    pub fn ptr_eq(&self, other: &Element) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn downgrade(&self) -> WeakElement {
        WeakElement(Rc::downgrade(&self.inner))
    }

    /// Element whose stamped DOM contains this one.
    pub fn host(&self) -> Option<Element> {
        self.inner.host.borrow().upgrade().map(|inner| Element { inner })
    }

    pub(crate) fn set_host(&self, host: Option<&Element>) {
        *self.inner.host.borrow_mut() = host.map_or_else(Weak::new, |h| Rc::downgrade(&h.inner));
    }

    pub(crate) fn codec(&self) -> Rc<dyn AttributeCodec> {
        self.inner.class.codec.clone()
    }

    /// Contract violations fail in strict mode and are logged otherwise.
    pub(crate) fn violation(&self, err: EngineError) -> Result<(), EngineError> {
        violation(self.inner.settings.strict, err)
    }

    /// Install a hook receiving effect failures instead of returning them.
    pub fn set_error_hook(&self, hook: impl Fn(&EffectFailure) + 'static) {
        *self.inner.error_hook.borrow_mut() = Some(Rc::new(hook));
    }

    // ========================================================================
    // Accessors and effects
    // ========================================================================

    /// Current accessor and effect tables.
    pub fn graph(&self) -> Rc<EffectGraph> {
        self.inner.graph.borrow().clone()
    }

    /// Mutate the instance tables, copying the class tables first if shared.
    fn graph_mut<R>(&self, f: impl FnOnce(&mut EffectGraph) -> R) -> R {
        let mut graph = self.inner.graph.borrow_mut();
        f(Rc::make_mut(&mut graph))
    }

    pub fn has_accessor(&self, name: &str) -> bool {
        self.inner.graph.borrow().accessors.has(name)
    }

    pub fn is_read_only(&self, name: &str) -> bool {
        self.inner.graph.borrow().is_read_only(name)
    }

    pub fn create_accessor(&self, name: &str, read_only: bool) {
        if !self.has_accessor(name) {
            self.graph_mut(|g| g.create_accessor(name, read_only));
        }
    }

    /// Register a custom effect.
    pub fn add_property_effect(
        &self,
        property: &str,
        phase: Phase,
        handler: impl Fn(&Element, &EffectContext<'_>) -> HandlerResult<()> + 'static,
    ) -> EffectId {
        let kind = Rc::new(EffectKind::Custom(Rc::new(handler)));
        self.graph_mut(|g| g.add_effect(property, phase, None, kind))
    }

    pub fn remove_property_effect(&self, property: &str, phase: Phase, id: EffectId) -> bool {
        if !self.has_property_effect(property, Some(phase)) {
            return false;
        }
        self.graph_mut(|g| g.remove_effect(property, phase, id))
    }

    pub fn has_property_effect(&self, property: &str, phase: Option<Phase>) -> bool {
        self.inner.graph.borrow().has_effect(property, phase)
    }

    pub fn create_property_observer(&self, property: &str, method: &str) -> EffectId {
        self.graph_mut(|g| g.create_property_observer(property, method))
    }

    pub fn create_method_observer(&self, expression: &str) -> Result<(), EngineError> {
        match self.graph_mut(|g| g.create_method_observer(expression)) {
            Ok(_) => Ok(()),
            Err(err) => self.violation(err),
        }
    }

    pub fn create_computed_property(&self, property: &str, expression: &str) -> Result<(), EngineError> {
        match self.graph_mut(|g| g.create_computed_property(property, expression)) {
            Ok(_) => Ok(()),
            Err(err) => self.violation(err),
        }
    }

    pub fn create_notifying_property(&self, property: &str) -> EffectId {
        self.graph_mut(|g| g.create_notifying_property(property))
    }

    pub fn create_reflected_property(&self, property: &str) -> Option<EffectId> {
        self.graph_mut(|g| g.create_reflected_property(property))
    }

    pub fn create_read_only_property(&self, property: &str) -> EffectId {
        self.graph_mut(|g| g.create_read_only_property(property))
    }

    // ========================================================================
    // Property writes
    // ========================================================================

    /// Flushed value of a root property.
    pub fn data(&self, name: &str) -> Value {
        self.inner.store.borrow().data(name)
    }

    /// Whether writes are waiting for a flush.
    pub fn has_pending(&self) -> bool {
        self.inner.store.borrow().has_pending()
    }

    /// Record a write to a simple property without invalidating.
    pub fn set_pending_property(&self, name: &str, value: Value, should_notify: bool) -> bool {
        let notifies = self.inner.graph.borrow().has_notify_effect(name);
        self.inner
            .store
            .borrow_mut()
            .set_pending(name, value, should_notify, notifies)
    }

    /// Public property write. Read-only properties are rejected; properties
    /// without an accessor are stored without effects.
    pub fn set_property(&self, name: &str, value: impl Into<Value>) -> Result<(), EngineError> {
        if self.is_read_only(name) {
            return self.violation(EngineError::ReadOnlyProperty(name.into()));
        }
        self.write_property(name, value.into())
    }

    /// Internal setter, allowed to write read-only properties.
    pub fn set_read_only_property(&self, name: &str, value: impl Into<Value>) -> Result<(), EngineError> {
        self.write_property(name, value.into())
    }

    fn write_property(&self, name: &str, value: Value) -> Result<(), EngineError> {
        if !self.has_accessor(name) {
            self.inner.store.borrow_mut().set_data(name, value);
            return Ok(());
        }
        if self.set_pending_property(name, value, true) {
            self.invalidate()?;
        }
        Ok(())
    }

    /// Write several properties or paths, then invalidate once. Read-only
    /// entries are skipped unless `set_read_only`.
    pub fn set_properties<K, I>(&self, props: I, set_read_only: bool) -> Result<(), EngineError>
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, Value)>,
    {
        for (path, value) in props {
            let path = path.as_ref();
            if set_read_only || !self.is_read_only(path) {
                self.set_pending_property_or_path(path, value, true, false);
            }
        }
        self.invalidate()
    }

    // ========================================================================
    // Attributes
    // ========================================================================

    pub fn attribute(&self, name: &str) -> Option<CompactString> {
        self.inner
            .attributes
            .borrow()
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.clone())
    }

    pub fn attributes(&self) -> Vec<Attribute> {
        self.inner.attributes.borrow().clone()
    }

    pub fn set_attribute(&self, name: &str, value: &str) -> Result<(), EngineError> {
        let old = {
            let mut attributes = self.inner.attributes.borrow_mut();
            match attributes.iter_mut().find(|a| a.name == name) {
                Some(attr) => Some(std::mem::replace(&mut attr.value, value.into())),
                None => {
                    attributes.push(Attribute::new(name, value));
                    None
                }
            }
        };
        self.attribute_changed(name, old.as_deref(), Some(value))
    }

    pub fn remove_attribute(&self, name: &str) -> Result<(), EngineError> {
        let old = {
            let mut attributes = self.inner.attributes.borrow_mut();
            let index = attributes.iter().position(|a| a.name == name);
            index.map(|i| attributes.remove(i).value)
        };
        match old {
            Some(old) => self.attribute_changed(name, Some(&old), None),
            None => Ok(()),
        }
    }

    /// Deserialize an observed attribute into its property.
    pub fn attribute_changed(
        &self,
        name: &str,
        old: Option<&str>,
        new: Option<&str>,
    ) -> Result<(), EngineError> {
        if old == new || self.inner.serializing.get() {
            return Ok(());
        }
        let property = dash_to_camel_case(name);
        if !self.has_accessor(&property) || self.is_read_only(&property) {
            return Ok(());
        }
        let value = self
            .codec()
            .deserialize(new, self.inner.class.type_of(&property));
        self.set_property(&property, value)
    }

    /// REFLECT handler.
    pub(crate) fn reflect_to_attribute(&self, attribute: &str, value: &Value) {
        self.inner.serializing.set(true);
        let result = match self.codec().serialize(value) {
            Some(serialized) => self.set_attribute(attribute, &serialized),
            None => self.remove_attribute(attribute),
        };
        self.inner.serializing.set(false);
        if let Err(err) = result {
            tracing::warn!("reflecting `{}` on <{}>: {}", attribute, self.local_name(), err);
        }
    }

    // ========================================================================
    // Events
    // ========================================================================

    pub fn add_event_listener(
        &self,
        event: &str,
        listener: impl Fn(&Event) -> HandlerResult<()> + 'static,
    ) -> ListenerId {
        self.add_event_listener_rc(event, Rc::new(listener))
    }

    pub fn add_event_listener_rc(&self, event: &str, listener: Listener) -> ListenerId {
        let id = ListenerId::new(self.inner.next_listener.get());
        self.inner.next_listener.set(id.as_u32() + 1);
        self.inner.listeners.borrow_mut().push(ListenerEntry {
            id,
            event: event.into(),
            listener,
        });
        id
    }

    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        before != listeners.len()
    }

    /// Run the listeners for `event.name`.
    pub fn dispatch_event(&self, event: &Event) -> HandlerResult<()> {
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .borrow()
            .iter()
            .filter(|l| l.event == event.name)
            .map(|l| l.listener.clone())
            .collect();
        event::dispatch(listeners, event)
    }

    pub(crate) fn dispatch_notify_event(
        &self,
        name: &str,
        value: Value,
        path: Option<&str>,
    ) -> HandlerResult<()> {
        self.dispatch_event(&Event::notify(name, value, path))
    }
}

pub(crate) fn violation(strict: bool, err: EngineError) -> Result<(), EngineError> {
    if strict {
        Err(err)
    } else {
        tracing::warn!("{}", err);
        Ok(())
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("local_name", &self.local_name())
            .field("state", &self.flush_state())
            .finish()
    }
}
