//! Element registry.
//!
//! The registry owns engine settings, the telemetry sink, an optional
//! scheduler for deferred flushes and the table of finalized classes.
//! Definitions are finalized once per name.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tempera_carton::{CompactString, FxHashMap};
use tempera_relief::Settings;

use crate::definition::{ElementClass, ElementDefinition};
use crate::element::Element;
use crate::error::EngineError;
use crate::scheduler::Scheduler;
use crate::telemetry::{Telemetry, TelemetrySnapshot};

struct RegistryInner {
    settings: RefCell<Settings>,
    classes: RefCell<FxHashMap<CompactString, Rc<ElementClass>>>,
    telemetry: Telemetry,
    scheduler: Option<Rc<dyn Scheduler>>,
}

/// Shared handle to a table of element classes.
#[derive(Clone)]
pub struct Registry {
    inner: Rc<RegistryInner>,
}

impl Registry {
    pub fn new(settings: Settings) -> Self {
        Self::build(settings, None)
    }

    /// Registry whose elements hand deferred flushes to `scheduler`.
    pub fn with_scheduler(settings: Settings, scheduler: Rc<dyn Scheduler>) -> Self {
        Self::build(settings, Some(scheduler))
    }

    fn build(settings: Settings, scheduler: Option<Rc<dyn Scheduler>>) -> Self {
        Self {
            inner: Rc::new(RegistryInner {
                settings: RefCell::new(settings),
                classes: RefCell::new(FxHashMap::default()),
                telemetry: Telemetry::default(),
                scheduler,
            }),
        }
    }

    pub fn settings(&self) -> Settings {
        self.inner.settings.borrow().clone()
    }

    /// Root path handed to elements created from now on.
    pub fn set_root_path(&self, root_path: impl Into<CompactString>) {
        self.inner.settings.borrow_mut().root_path = root_path.into();
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.inner.telemetry.snapshot()
    }

    pub fn reset_telemetry(&self) {
        self.inner.telemetry.reset();
    }

    /// Finalize and register a definition. A name that is already defined
    /// returns the existing class and ignores `definition`.
    pub fn define(&self, definition: ElementDefinition) -> Result<Rc<ElementClass>, EngineError> {
        if let Some(class) = self.get(definition.name()) {
            tracing::debug!("<{}> already defined", definition.name());
            return Ok(class);
        }
        let settings = self.settings();
        let class = Rc::new(definition.finalize(&settings)?);
        self.inner.telemetry.register(class.name());
        self.inner
            .classes
            .borrow_mut()
            .insert(class.name().into(), class.clone());
        Ok(class)
    }

    pub fn get(&self, name: &str) -> Option<Rc<ElementClass>> {
        self.inner.classes.borrow().get(name).cloned()
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.inner.classes.borrow().contains_key(name)
    }

    /// Create an instance of a defined class. The element is not ready yet.
    pub fn create(&self, name: &str) -> Result<Element, EngineError> {
        let class = self
            .get(name)
            .ok_or_else(|| EngineError::UndefinedElement(name.into()))?;
        self.inner.telemetry.increment_instance_count();
        Ok(Element::new(
            class,
            self.settings(),
            Some(self.clone()),
            self.inner.scheduler.clone(),
        ))
    }

    /// Log every registered class.
    pub fn dump_registrations(&self) {
        let registrations = self.inner.telemetry.registrations();
        tracing::info!("{} registered element(s)", registrations.len());
        for name in &registrations {
            if let Some(class) = self.get(name) {
                tracing::info!(
                    "<{}>: {} propert(ies), template: {}",
                    name,
                    class.properties().len(),
                    class.template_info().is_some()
                );
            }
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<CompactString> = self.inner.classes.borrow().keys().cloned().collect();
        names.sort();
        f.debug_struct("Registry").field("classes", &names).finish()
    }
}
