//! Armature - The parsers of Tempera.
//!
//! - [`tokenizer`]: byte-level markup state machine
//! - [`markup`]: builds fragments and templates from markup
//! - [`expression`]: `[[..]]` / `{{..}}` binding expressions
//! - [`parser`]: the template parser producing [`TemplateInfo`]
//!
//! # Example
//!
//! ```
//! use tempera_armature::{parse_template, parse_template_markup};
//! use tempera_relief::ParserOptions;
//!
//! let mut template = parse_template_markup("<p>Hello [[name]]!</p>").unwrap();
//! let info = parse_template(&mut template, &ParserOptions::default()).unwrap();
//! assert_eq!(info.host_props, ["name"]);
//! assert_eq!(template.content.to_html(), "<p>Hello !</p>");
//! ```
//!
//! [`TemplateInfo`]: tempera_relief::TemplateInfo

pub mod expression;
pub mod markup;
pub mod parser;
pub mod tokenizer;

pub use expression::{parse_arg, parse_bindings, parse_method};
pub use markup::{parse_fragment, parse_template_markup};
pub use parser::{literal_from_parts, parse_template};
