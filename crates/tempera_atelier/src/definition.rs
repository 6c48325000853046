//! Element definitions.
//!
//! An [`ElementDefinition`] is a builder describing properties, observers,
//! methods and a template. The registry finalizes it once into an
//! [`ElementClass`], whose accessor and effect tables every instance starts
//! from.

use std::fmt;
use std::rc::Rc;

use tempera_carton::{bitflags, CompactString, FxHashMap};
use tempera_relief::{Fragment, Settings, Template, TemplateError, TemplateInfo, Value};

use crate::codec::{AttributeCodec, DefaultCodec, TypeTag};
use crate::effects::EffectGraph;
use crate::element::{violation, Element};
use crate::error::{EngineError, HandlerResult};
use crate::stamp::binding_effects;

/// A method callable from bindings, observers and listeners.
pub type Method = Rc<dyn Fn(&Element, &[Value]) -> HandlerResult>;

bitflags! {
    /// Effects requested by a property declaration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PropertyFlags: u8 {
        const READ_ONLY = 1 << 0;
        const NOTIFY = 1 << 1;
        const REFLECT_TO_ATTRIBUTE = 1 << 2;
    }
}

/// Initial value of a property. Factories run once per instance, so shared
/// arrays and objects are not shared between instances.
#[derive(Clone)]
pub enum DefaultValue {
    Value(Value),
    Factory(Rc<dyn Fn() -> Value>),
}

impl DefaultValue {
    pub fn produce(&self) -> Value {
        match self {
            DefaultValue::Value(value) => value.clone(),
            DefaultValue::Factory(factory) => factory(),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Value(value) => f.debug_tuple("Value").field(value).finish(),
            DefaultValue::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PropertyDeclaration {
    pub name: CompactString,
    pub type_tag: TypeTag,
    pub flags: PropertyFlags,
    /// Method expression computing the property.
    pub computed: Option<CompactString>,
    /// Method called with `(value, old)` on change.
    pub observer: Option<CompactString>,
    pub default: Option<DefaultValue>,
}

impl PropertyDeclaration {
    pub fn new(name: impl Into<CompactString>) -> Self {
        Self {
            name: name.into(),
            type_tag: TypeTag::Any,
            flags: PropertyFlags::empty(),
            computed: None,
            observer: None,
            default: None,
        }
    }

    pub fn typed(mut self, type_tag: TypeTag) -> Self {
        self.type_tag = type_tag;
        self
    }

    pub fn notify(mut self) -> Self {
        self.flags |= PropertyFlags::NOTIFY;
        self
    }

    pub fn reflect_to_attribute(mut self) -> Self {
        self.flags |= PropertyFlags::REFLECT_TO_ATTRIBUTE;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.flags |= PropertyFlags::READ_ONLY;
        self
    }

    pub fn computed(mut self, expression: impl Into<CompactString>) -> Self {
        self.computed = Some(expression.into());
        self
    }

    pub fn observer(mut self, method: impl Into<CompactString>) -> Self {
        self.observer = Some(method.into());
        self
    }

    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Value(value.into()));
        self
    }

    pub fn value_with(mut self, factory: impl Fn() -> Value + 'static) -> Self {
        self.default = Some(DefaultValue::Factory(Rc::new(factory)));
        self
    }
}

/// Builder for an element class.
pub struct ElementDefinition {
    name: CompactString,
    properties: Vec<PropertyDeclaration>,
    observers: Vec<CompactString>,
    methods: FxHashMap<CompactString, Method>,
    template: Option<Template>,
    codec: Option<Rc<dyn AttributeCodec>>,
}

impl ElementDefinition {
    pub fn new(name: impl Into<CompactString>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
            observers: Vec::new(),
            methods: FxHashMap::default(),
            template: None,
            codec: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn property(mut self, declaration: PropertyDeclaration) -> Self {
        self.properties.push(declaration);
        self
    }

    /// Complex observer, e.g. `"update(first, items.*)"`.
    pub fn observer(mut self, expression: impl Into<CompactString>) -> Self {
        self.observers.push(expression.into());
        self
    }

    pub fn method(
        mut self,
        name: impl Into<CompactString>,
        method: impl Fn(&Element, &[Value]) -> HandlerResult + 'static,
    ) -> Self {
        self.methods.insert(name.into(), Rc::new(method));
        self
    }

    pub fn template(mut self, template: Template) -> Self {
        self.template = Some(template);
        self
    }

    /// Parse markup as the class template.
    pub fn template_markup(self, markup: &str) -> Result<Self, EngineError> {
        let template = tempera_armature::parse_template_markup(markup).map_err(TemplateError::from)?;
        Ok(self.template(template))
    }

    pub fn codec(mut self, codec: impl AttributeCodec + 'static) -> Self {
        self.codec = Some(Rc::new(codec));
        self
    }

    /// Build the class tables. Per property: computed, read-only, reflect,
    /// notify, observer, then the accessor itself.
    pub(crate) fn finalize(self, settings: &Settings) -> Result<ElementClass, EngineError> {
        let mut graph = EffectGraph::new();

        for decl in &self.properties {
            let mut read_only = decl.flags.contains(PropertyFlags::READ_ONLY);
            if let Some(expression) = &decl.computed {
                read_only = true;
                if graph.has_read_only_effect(&decl.name) {
                    tracing::warn!("cannot redefine computed property `{}`", decl.name);
                } else if let Err(err) = graph.create_computed_property(&decl.name, expression) {
                    violation(settings.strict, err)?;
                }
            }
            if read_only && !graph.has_read_only_effect(&decl.name) {
                graph.create_read_only_property(&decl.name);
            }
            if decl.flags.contains(PropertyFlags::REFLECT_TO_ATTRIBUTE)
                && !graph.has_reflect_effect(&decl.name)
            {
                graph.create_reflected_property(&decl.name);
            }
            if decl.flags.contains(PropertyFlags::NOTIFY) && !graph.has_notify_effect(&decl.name) {
                graph.create_notifying_property(&decl.name);
            }
            if let Some(observer) = &decl.observer {
                graph.create_property_observer(&decl.name, observer);
            }
            graph.create_accessor(&decl.name, read_only);
        }

        for expression in &self.observers {
            if let Err(err) = graph.create_method_observer(expression) {
                violation(settings.strict, err)?;
            }
        }

        let template = match self.template {
            Some(mut template) => {
                let info = tempera_armature::parse_template(&mut template, &settings.parser_options())?;
                for root in binding_effects(&info).1 {
                    graph.create_accessor(&root, false);
                }
                Some(ClassTemplate {
                    content: template.content,
                    info,
                })
            }
            None => None,
        };

        Ok(ElementClass {
            name: self.name,
            properties: self.properties,
            methods: self.methods,
            graph: Rc::new(graph),
            template,
            codec: self.codec.unwrap_or_else(|| Rc::new(DefaultCodec)),
        })
    }
}

pub(crate) struct ClassTemplate {
    pub content: Fragment,
    pub info: Rc<TemplateInfo>,
}

/// A finalized element class, shared by all its instances.
pub struct ElementClass {
    name: CompactString,
    properties: Vec<PropertyDeclaration>,
    methods: FxHashMap<CompactString, Method>,
    pub(crate) graph: Rc<EffectGraph>,
    pub(crate) template: Option<ClassTemplate>,
    pub(crate) codec: Rc<dyn AttributeCodec>,
}

impl ElementClass {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> &[PropertyDeclaration] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDeclaration> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Declared type of a property; `Any` when undeclared.
    pub fn type_of(&self, name: &str) -> TypeTag {
        self.property(name).map(|p| p.type_tag).unwrap_or_default()
    }

    pub(crate) fn method(&self, name: &str) -> Option<Method> {
        self.methods.get(name).cloned()
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Class-level accessor and effect tables.
    pub fn graph(&self) -> &EffectGraph {
        &self.graph
    }

    pub fn template_info(&self) -> Option<&Rc<TemplateInfo>> {
        self.template.as_ref().map(|t| &t.info)
    }

    /// Attribute names mapped back to properties by `attribute_changed`.
    pub fn observed_attributes(&self) -> Vec<CompactString> {
        self.graph
            .accessors
            .names()
            .filter(|name| !self.graph.is_read_only(name))
            .map(tempera_carton::camel_to_dash_case)
            .collect()
    }
}

impl fmt::Debug for ElementClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementClass")
            .field("name", &self.name)
            .field("properties", &self.properties)
            .field("methods", &self.methods.len())
            .field("has_template", &self.template.is_some())
            .finish()
    }
}
