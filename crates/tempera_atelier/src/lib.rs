//! Atelier - The runtime workshop for Tempera.
//!
//! Elements declare properties; every write goes through one pending bag and
//! is dispatched in batches to property effects, run phase by phase:
//! COMPUTE, PROPAGATE (template bindings), REFLECT, OBSERVE, NOTIFY.
//!
//! - [`registry`]: definitions are finalized into classes and instantiated
//! - [`element`]: the instance handle and its property API
//! - [`accessors`] / [`effects`]: pending bag, dirty checking, effect tables
//! - [`stamp`] / [`binding`]: template stamping and binding effects
//! - [`flush`]: when batches are dispatched
//!
//! # Example
//!
//! ```
//! use tempera_atelier::{ElementDefinition, PropertyDeclaration, Registry, Settings};
//!
//! let registry = Registry::new(Settings::default());
//! registry
//!     .define(
//!         ElementDefinition::new("x-greeting")
//!             .property(PropertyDeclaration::new("name").value("World"))
//!             .template_markup("<p>Hello [[name]]!</p>")
//!             .unwrap(),
//!     )
//!     .unwrap();
//!
//! let el = registry.create("x-greeting").unwrap();
//! el.ready().unwrap();
//! assert_eq!(el.to_html(), "<p>Hello World!</p>");
//!
//! el.set_property("name", "Moon").unwrap();
//! assert_eq!(el.to_html(), "<p>Hello Moon!</p>");
//! ```

pub mod accessors;
pub mod binding;
pub mod codec;
pub mod definition;
pub mod effects;
pub mod element;
pub mod error;
pub mod event;
pub mod flush;
pub mod linker;
pub mod registry;
pub mod scheduler;
pub mod stamp;
pub mod structured;
pub mod telemetry;

pub use accessors::{ChangeSet, PropertyStore};
pub use codec::{AttributeCodec, DefaultCodec, TypeTag};
pub use definition::{
    DefaultValue, ElementClass, ElementDefinition, Method, PropertyDeclaration, PropertyFlags,
};
pub use effects::{EffectContext, EffectGraph, EffectId, EffectKind, Phase};
pub use element::{Element, ErrorHook, WeakElement};
pub use error::{EffectFailure, EngineError, HandlerError, HandlerResult};
pub use event::{Event, EventDetail, Listener, ListenerId};
pub use flush::FlushState;
pub use linker::PathLinker;
pub use registry::Registry;
pub use scheduler::{MicrotaskQueue, Scheduler, TaskHandle};
pub use stamp::BoundTemplate;
pub use structured::{get_from, set_in, SpliceRecord};
pub use telemetry::TelemetrySnapshot;

pub use tempera_relief::{path, FlushMode, NodeId, Settings, Template, Value};
