//! Property effects.
//!
//! Effects are registered per root property and per [`Phase`]. A flush takes
//! the pending bag and runs the phases in order:
//!
//! ```text
//! Compute -> Propagate -> Reflect -> Observe -> Notify
//! ```
//!
//! Within a phase, effects are visited in the bag's write order and each
//! effect runs at most once. When the bag contains paths, only effects whose
//! [`Trigger`] matches the changed path run.

use std::fmt;
use std::rc::Rc;

use tempera_carton::{camel_to_dash_case, changed_event_name, CompactString, FxHashMap, FxHashSet};
use tempera_relief::{path, BindingParseError, MethodSignature, Trigger};

use crate::accessors::{AccessorTable, ChangeSet, OrderedMap, PendingBatch};
use crate::element::Element;
use crate::error::{EffectFailure, EngineError, HandlerResult};
use crate::stamp::BoundTemplate;

/// Effect phase. Dispatch order follows declaration order; `ReadOnly` only
/// marks properties and never runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Phase {
    Compute,
    Propagate,
    Reflect,
    Observe,
    Notify,
    ReadOnly,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Compute,
        Phase::Propagate,
        Phase::Reflect,
        Phase::Observe,
        Phase::Notify,
        Phase::ReadOnly,
    ];

    #[inline(always)]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// What a running effect gets to see.
pub struct EffectContext<'a> {
    /// Property or path that triggered the effect.
    pub path: &'a str,
    pub changed: &'a ChangeSet,
    pub old: &'a ChangeSet,
    pub has_paths: bool,
}

/// User-supplied effect.
pub type EffectHandler = Rc<dyn Fn(&Element, &EffectContext<'_>) -> HandlerResult<()>>;

/// Typed record per effect type.
pub enum EffectKind {
    /// Write the method result to `target`.
    Compute {
        target: CompactString,
        signature: MethodSignature,
    },
    /// Call `method(new, old)`.
    PropertyObserver {
        property: CompactString,
        method: CompactString,
    },
    MethodObserver {
        signature: MethodSignature,
    },
    Reflect {
        property: CompactString,
        attribute: CompactString,
    },
    Notify {
        property: CompactString,
        event: CompactString,
    },
    ReadOnly,
    /// Address of a binding part in a bound template.
    Binding {
        node_index: usize,
        binding_index: usize,
        part_index: usize,
    },
    Custom(EffectHandler),
}

impl fmt::Debug for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectKind::Compute { target, signature } => f
                .debug_struct("Compute")
                .field("target", target)
                .field("method", &signature.method_name)
                .finish(),
            EffectKind::PropertyObserver { property, method } => f
                .debug_struct("PropertyObserver")
                .field("property", property)
                .field("method", method)
                .finish(),
            EffectKind::MethodObserver { signature } => f
                .debug_struct("MethodObserver")
                .field("method", &signature.method_name)
                .finish(),
            EffectKind::Reflect { attribute, .. } => {
                f.debug_struct("Reflect").field("attribute", attribute).finish()
            }
            EffectKind::Notify { event, .. } => {
                f.debug_struct("Notify").field("event", event).finish()
            }
            EffectKind::ReadOnly => f.write_str("ReadOnly"),
            EffectKind::Binding {
                node_index,
                binding_index,
                part_index,
            } => write!(f, "Binding({node_index}, {binding_index}, {part_index})"),
            EffectKind::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Effect identifier, unique within one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectId(u32);

impl EffectId {
    #[inline(always)]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline(always)]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

/// A registered effect. Entries registered under several properties for the
/// same logical effect share `kind`, which is what dispatch dedupes on.
#[derive(Debug, Clone)]
pub struct Effect {
    pub id: EffectId,
    /// `None` matches any change under the root property.
    pub trigger: Option<Trigger>,
    pub kind: Rc<EffectKind>,
}

impl Effect {
    #[inline]
    fn dedupe_key(&self) -> usize {
        Rc::as_ptr(&self.kind) as usize
    }

    /// Whether a change at `path` runs this effect.
    pub fn matches(&self, path: &str) -> bool {
        self.trigger.as_ref().map_or(true, |t| t.matches_path(path))
    }
}

type PhaseMap = FxHashMap<CompactString, Vec<Effect>>;

/// Effects by phase and root property.
#[derive(Debug, Clone, Default)]
pub struct EffectTable {
    phases: [PhaseMap; 6],
    next_id: u32,
}

impl EffectTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        property: &str,
        phase: Phase,
        trigger: Option<Trigger>,
        kind: Rc<EffectKind>,
    ) -> EffectId {
        let id = EffectId::new(self.next_id);
        self.next_id += 1;
        self.phases[phase.index()]
            .entry(property.into())
            .or_default()
            .push(Effect { id, trigger, kind });
        id
    }

    pub fn remove(&mut self, property: &str, phase: Phase, id: EffectId) -> bool {
        let map = &mut self.phases[phase.index()];
        let Some(effects) = map.get_mut(property) else {
            return false;
        };
        let before = effects.len();
        effects.retain(|e| e.id != id);
        let removed = effects.len() != before;
        if effects.is_empty() {
            map.remove(property);
        }
        removed
    }

    /// With `phase == None`, any phase counts.
    pub fn has(&self, property: &str, phase: Option<Phase>) -> bool {
        match phase {
            Some(phase) => self.phases[phase.index()].contains_key(property),
            None => self.phases.iter().any(|map| map.contains_key(property)),
        }
    }

    pub fn effects(&self, phase: Phase, property: &str) -> &[Effect] {
        self.phases[phase.index()]
            .get(property)
            .map_or(&[][..], Vec::as_slice)
    }

    pub fn is_phase_empty(&self, phase: Phase) -> bool {
        self.phases[phase.index()].is_empty()
    }

    /// Root properties with effects in `phase`.
    pub fn properties(&self, phase: Phase) -> impl Iterator<Item = &str> {
        self.phases[phase.index()].keys().map(CompactString::as_str)
    }
}

/// Accessor and effect tables of an element class, copied per instance on
/// the first runtime addition.
#[derive(Debug, Clone, Default)]
pub struct EffectGraph {
    pub accessors: AccessorTable,
    pub effects: EffectTable,
    computed: FxHashSet<CompactString>,
}

impl EffectGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_accessor(&mut self, name: &str, read_only: bool) -> bool {
        self.accessors.create(name, read_only)
    }

    /// Register an effect, creating the property's accessor if needed.
    pub fn add_effect(
        &mut self,
        property: &str,
        phase: Phase,
        trigger: Option<Trigger>,
        kind: Rc<EffectKind>,
    ) -> EffectId {
        self.accessors.create(property, phase == Phase::ReadOnly);
        self.effects.add(property, phase, trigger, kind)
    }

    pub fn remove_effect(&mut self, property: &str, phase: Phase, id: EffectId) -> bool {
        self.effects.remove(property, phase, id)
    }

    pub fn has_effect(&self, property: &str, phase: Option<Phase>) -> bool {
        self.effects.has(property, phase)
    }

    pub fn has_read_only_effect(&self, property: &str) -> bool {
        self.effects.has(property, Some(Phase::ReadOnly))
    }

    pub fn has_notify_effect(&self, property: &str) -> bool {
        self.effects.has(property, Some(Phase::Notify))
    }

    pub fn has_reflect_effect(&self, property: &str) -> bool {
        self.effects.has(property, Some(Phase::Reflect))
    }

    /// Whether `property` is the target of a computed effect.
    pub fn has_computed_effect(&self, property: &str) -> bool {
        self.computed.contains(property)
    }

    pub fn is_read_only(&self, property: &str) -> bool {
        self.accessors.is_read_only(property) || self.has_read_only_effect(property)
    }

    pub fn create_read_only_property(&mut self, property: &str) -> EffectId {
        self.add_effect(property, Phase::ReadOnly, None, Rc::new(EffectKind::ReadOnly))
    }

    pub fn create_notifying_property(&mut self, property: &str) -> EffectId {
        let kind = EffectKind::Notify {
            property: property.into(),
            event: changed_event_name(property),
        };
        self.add_effect(property, Phase::Notify, None, Rc::new(kind))
    }

    /// `None` when the property maps to an attribute name that cannot be
    /// written.
    pub fn create_reflected_property(&mut self, property: &str) -> Option<EffectId> {
        let attribute = camel_to_dash_case(property);
        if attribute.starts_with('-') {
            tracing::warn!(
                "property `{}` cannot be reflected to attribute `{}`",
                property,
                attribute
            );
            return None;
        }
        let kind = EffectKind::Reflect {
            property: property.into(),
            attribute,
        };
        Some(self.add_effect(property, Phase::Reflect, None, Rc::new(kind)))
    }

    pub fn create_property_observer(&mut self, property: &str, method: &str) -> EffectId {
        let kind = EffectKind::PropertyObserver {
            property: property.into(),
            method: method.into(),
        };
        self.add_effect(property, Phase::Observe, None, Rc::new(kind))
    }

    /// Observer on a method expression such as `check(a, b.*)`.
    pub fn create_method_observer(&mut self, expression: &str) -> Result<Vec<EffectId>, EngineError> {
        let signature = method_signature(expression)?;
        let dependencies: Vec<Trigger> = signature.dependencies().cloned().collect();
        let kind = Rc::new(EffectKind::MethodObserver { signature });
        Ok(dependencies
            .into_iter()
            .map(|dep| {
                let root = dep.root_property.clone();
                self.add_effect(&root, Phase::Observe, Some(dep), kind.clone())
            })
            .collect())
    }

    /// Computed property. The target gets a read-only accessor.
    pub fn create_computed_property(
        &mut self,
        property: &str,
        expression: &str,
    ) -> Result<Vec<EffectId>, EngineError> {
        if self.has_computed_effect(property) {
            return Err(EngineError::DuplicateComputed(property.into()));
        }
        let signature = method_signature(expression)?;
        let dependencies: Vec<Trigger> = signature.dependencies().cloned().collect();
        let kind = Rc::new(EffectKind::Compute {
            target: property.into(),
            signature,
        });
        self.computed.insert(property.into());
        self.accessors.create(property, true);
        Ok(dependencies
            .into_iter()
            .map(|dep| {
                let root = dep.root_property.clone();
                self.add_effect(&root, Phase::Compute, Some(dep), kind.clone())
            })
            .collect())
    }
}

fn method_signature(expression: &str) -> Result<MethodSignature, EngineError> {
    let invalid = |source| EngineError::InvalidMethodExpression {
        expression: expression.into(),
        source,
    };
    match tempera_armature::parse_method(expression) {
        Ok(Some(signature)) => Ok(signature),
        Ok(None) => Err(invalid(BindingParseError::MalformedMethod(expression.into()))),
        Err(err) => Err(invalid(err)),
    }
}

/// Shared arguments of one phase run.
pub(crate) struct PhaseRun<'a> {
    pub phase: Phase,
    pub table: &'a EffectTable,
    pub old: &'a ChangeSet,
    pub has_paths: bool,
    pub template: Option<&'a Rc<BoundTemplate>>,
}

impl Element {
    /// Run every effect of `run.phase` triggered by `changed`.
    pub(crate) fn run_effects(
        &self,
        run: &PhaseRun<'_>,
        changed: &ChangeSet,
        failures: &mut Vec<EffectFailure>,
    ) -> bool {
        if run.table.is_phase_empty(run.phase) {
            return false;
        }
        let mut seen = FxHashSet::default();
        let mut ran = false;
        for prop in changed.keys() {
            ran |= self.run_effects_for_property(run, &mut seen, prop, changed, failures);
        }
        ran
    }

    fn run_effects_for_property(
        &self,
        run: &PhaseRun<'_>,
        seen: &mut FxHashSet<usize>,
        prop: &str,
        changed: &ChangeSet,
        failures: &mut Vec<EffectFailure>,
    ) -> bool {
        let root = if run.has_paths { path::root(prop) } else { prop };
        let mut ran = false;
        for effect in run.table.effects(run.phase, root) {
            if seen.contains(&effect.dedupe_key()) || (run.has_paths && !effect.matches(prop)) {
                continue;
            }
            seen.insert(effect.dedupe_key());
            tracing::trace!(
                "{:?} effect {} for `{}`: {:?}",
                run.phase,
                effect.id.as_u32(),
                prop,
                effect.kind
            );
            if let Err(error) = self.run_effect(run, effect, prop, changed) {
                failures.push(EffectFailure {
                    phase: run.phase,
                    property: prop.into(),
                    error,
                });
            }
            ran = true;
        }
        ran
    }

    fn run_effect(
        &self,
        run: &PhaseRun<'_>,
        effect: &Effect,
        prop: &str,
        changed: &ChangeSet,
    ) -> HandlerResult<()> {
        match &*effect.kind {
            EffectKind::Compute { target, signature } => {
                let result = self.run_method(signature, prop, changed)?;
                if self.has_accessor(target) {
                    self.set_pending_property(target, result, true);
                } else {
                    self.inner.store.borrow_mut().set_data(target, result);
                }
                Ok(())
            }
            EffectKind::PropertyObserver { property, method } => {
                let args = [self.data(property), run.old.value(property)];
                self.call_method(method, &args).map(drop)
            }
            EffectKind::MethodObserver { signature } => {
                self.run_method(signature, prop, changed).map(drop)
            }
            EffectKind::Reflect {
                property,
                attribute,
            } => {
                let value = self.data(property);
                self.reflect_to_attribute(attribute, &value);
                Ok(())
            }
            EffectKind::Notify { event, .. } => {
                let root = if run.has_paths { path::root(prop) } else { prop };
                let value = if root != prop {
                    let value = self.get(prop);
                    if value.is_undefined() {
                        changed.value(prop)
                    } else {
                        value
                    }
                } else {
                    self.data(prop)
                };
                self.dispatch_notify_event(event, value, (root != prop).then_some(prop))
            }
            EffectKind::ReadOnly => Ok(()),
            EffectKind::Binding {
                node_index,
                binding_index,
                part_index,
            } => match run.template {
                Some(template) => self.run_binding_effect(
                    template,
                    (*node_index, *binding_index, *part_index),
                    prop,
                    changed,
                    run.has_paths,
                ),
                None => Ok(()),
            },
            EffectKind::Custom(handler) => handler(
                self,
                &EffectContext {
                    path: prop,
                    changed,
                    old: run.old,
                    has_paths: run.has_paths,
                },
            ),
        }
    }

    /// COMPUTE phase. Writes made by compute effects are merged into the
    /// batch and fed back in until no effect runs.
    pub(crate) fn run_computed_effects(
        &self,
        batch: &mut PendingBatch,
        failures: &mut Vec<EffectFailure>,
    ) {
        let graph = self.graph();
        if graph.effects.is_phase_empty(Phase::Compute) {
            return;
        }
        let mut input = batch.changed.clone();
        loop {
            let run = PhaseRun {
                phase: Phase::Compute,
                table: &graph.effects,
                old: &batch.old,
                has_paths: batch.has_paths,
                template: None,
            };
            if !self.run_effects(&run, &input, failures) {
                break;
            }
            let Some((pending, old)) = self.inner.store.borrow_mut().take_pending_bags() else {
                break;
            };
            batch.old.extend(old);
            batch.changed.extend(pending.clone());
            input = pending;
        }
    }

    /// NOTIFY phase, driven by the to-notify bag.
    pub(crate) fn run_notify_effects(
        &self,
        to_notify: &OrderedMap<bool>,
        changed: &ChangeSet,
        old: &ChangeSet,
        has_paths: bool,
        failures: &mut Vec<EffectFailure>,
    ) {
        let graph = self.graph();
        let run = PhaseRun {
            phase: Phase::Notify,
            table: &graph.effects,
            old,
            has_paths,
            template: None,
        };
        let mut seen = FxHashSet::default();
        let mut notified = false;
        for (prop, &should_notify) in to_notify.iter() {
            if !should_notify {
                continue;
            }
            if self.run_effects_for_property(&run, &mut seen, prop, changed, failures) {
                notified = true;
            } else if has_paths && path::is_path(prop) {
                // Paths without a notify effect still notify on their root.
                let event = changed_event_name(path::root(prop));
                if let Err(error) =
                    self.dispatch_notify_event(&event, changed.value(prop), Some(prop))
                {
                    failures.push(EffectFailure {
                        phase: Phase::Notify,
                        property: prop.into(),
                        error,
                    });
                }
                notified = true;
            }
        }
        if notified {
            if let Some(host) = self.host() {
                if let Err(err) = host.invalidate() {
                    failures.extend(err.failures().iter().cloned());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &Element, _: &EffectContext<'_>) -> HandlerResult<()> {
        Ok(())
    }

    fn custom() -> Rc<EffectKind> {
        Rc::new(EffectKind::Custom(Rc::new(noop)))
    }

    #[test]
    fn test_table_add_remove() {
        let mut table = EffectTable::new();
        let a = table.add("a", Phase::Observe, None, custom());
        let b = table.add("a", Phase::Observe, None, custom());
        assert_ne!(a, b);
        assert!(table.has("a", Some(Phase::Observe)));
        assert!(table.has("a", None));
        assert!(!table.has("a", Some(Phase::Notify)));
        assert_eq!(table.effects(Phase::Observe, "a").len(), 2);

        assert!(table.remove("a", Phase::Observe, a));
        assert!(!table.remove("a", Phase::Observe, a));
        assert!(table.remove("a", Phase::Observe, b));
        assert!(!table.has("a", None));
        assert!(table.is_phase_empty(Phase::Observe));
    }

    #[test]
    fn test_effect_matching() {
        let kind = custom();
        let any = Effect {
            id: EffectId::new(0),
            trigger: None,
            kind: kind.clone(),
        };
        assert!(any.matches("user.name"));

        let exact = Effect {
            id: EffectId::new(1),
            trigger: Some(Trigger::from_dependency("user.name")),
            kind,
        };
        assert!(exact.matches("user.name"));
        assert!(exact.matches("user"));
        assert!(!exact.matches("user.age"));
        assert!(!exact.matches("user.name.first"));
        assert_eq!(any.dedupe_key(), exact.dedupe_key());
    }

    #[test]
    fn test_graph_helpers() {
        let mut graph = EffectGraph::new();
        graph.create_read_only_property("id");
        assert!(graph.is_read_only("id"));
        assert!(graph.accessors.has("id"));

        graph.create_notifying_property("firstName");
        assert!(graph.has_notify_effect("firstName"));
        match &*graph.effects.effects(Phase::Notify, "firstName")[0].kind {
            EffectKind::Notify { event, .. } => assert_eq!(event, "first-name-changed"),
            other => panic!("unexpected {other:?}"),
        }

        assert!(graph.create_reflected_property("active").is_some());
        assert!(graph.create_reflected_property("Bad").is_none());
        assert!(graph.has_reflect_effect("active"));
    }

    #[test]
    fn test_computed_registration() {
        let mut graph = EffectGraph::new();
        let ids = graph.create_computed_property("full", "join(first, last.*)").unwrap();
        assert_eq!(ids.len(), 2);
        assert!(graph.has_computed_effect("full"));
        assert!(graph.is_read_only("full"));
        assert!(graph.has_effect("first", Some(Phase::Compute)));
        assert!(graph.has_effect("last", Some(Phase::Compute)));
        assert!(matches!(
            graph.create_computed_property("full", "other(first)"),
            Err(EngineError::DuplicateComputed(_))
        ));
        assert!(matches!(
            graph.create_computed_property("x", "notACall"),
            Err(EngineError::InvalidMethodExpression { .. })
        ));
        assert!(matches!(
            graph.create_method_observer("watch(a"),
            Err(EngineError::InvalidMethodExpression { .. })
        ));
    }

    #[test]
    fn test_phase_order() {
        let indices: Vec<_> = Phase::ALL.iter().map(|p| p.index()).collect();
        assert_eq!(indices, [0, 1, 2, 3, 4, 5]);
    }
}
