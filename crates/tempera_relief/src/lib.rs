//! Relief - The data model of Tempera.
//!
//! Everything the parser produces and the runtime consumes lives here:
//!
//! - [`Value`]: dynamic values with shared arrays and objects
//! - [`path`]: structured path resolution (`get`, `set`, `translate`, ...)
//! - [`Fragment`] / [`Template`]: a small DOM-like tree to stamp into
//! - [`TemplateInfo`] / [`NodeInfo`] / [`Binding`]: parsed template metadata
//! - [`Settings`]: engine configuration

pub mod dom;
pub mod errors;
pub mod options;
pub mod path;
pub mod template_info;
pub mod value;

pub use dom::{Attribute, ElementData, Fragment, Node, NodeId, NodeKind, Template};
pub use errors::{BindingParseError, MarkupError, TemplateError};
pub use options::{FlushMode, ParserOptions, Settings};
pub use path::{AsPath, PathSegment};
pub use template_info::{
    Binding, BindingExpression, BindingKind, BindingMode, BindingPart, EventInfo, MethodArg,
    MethodSignature, NodeInfo, TemplateInfo, Trigger,
};
pub use value::{ArrayRef, ObjectMap, ObjectRef, Value};
