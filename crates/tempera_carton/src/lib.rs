//! Carton - The shared toolbox for Tempera.
//!
//! This crate holds the small, dependency-light utilities every other Tempera
//! crate reaches for: the string and collection types used across the data
//! model, and the case conversions used to map property names to attribute
//! and event names.
//!
//! # Example
//!
//! ```
//! use tempera_carton::{camel_to_dash_case, dash_to_camel_case, CompactString};
//!
//! assert_eq!(camel_to_dash_case("firstName"), "first-name");
//! assert_eq!(dash_to_camel_case("first-name"), CompactString::from("firstName"));
//! ```

pub mod dom_tag_config;
pub mod general;

// Re-export compact_str::CompactString for convenience
pub use compact_str::format_compact;
pub use compact_str::CompactString;
pub use compact_str::CompactString as String;

// Re-export smallvec for stack-optimized collections
pub use smallvec::{smallvec, SmallVec};

// Re-export bitflags for flag types
pub use bitflags::bitflags;

// Re-export rustc-hash for fast hash maps/sets
pub use rustc_hash::{FxHashMap, FxHashSet};

// Re-export phf for compile-time perfect hash functions
pub use phf::{phf_map, phf_set, Map as PhfMap, Set as PhfSet};

// Re-export shared utilities
pub use dom_tag_config::*;
pub use general::*;
