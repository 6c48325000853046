//! Engine settings and parser options.

use serde::Deserialize;
use tempera_carton::CompactString;

/// When invalidated elements flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushMode {
    /// Flush before the write returns (default)
    #[default]
    Sync,
    /// Hand the flush to the scheduler
    Deferred,
}

/// Engine-wide settings, usually owned by a registry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Return contract violations as errors instead of logging them.
    pub strict: bool,
    pub flush_mode: FlushMode,
    /// Strip whitespace-only text in every template.
    pub strip_whitespace: bool,
    /// Base path handed to elements for resolving relative URLs.
    pub root_path: CompactString,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            strict: cfg!(debug_assertions),
            flush_mode: FlushMode::Sync,
            strip_whitespace: false,
            root_path: CompactString::default(),
        }
    }
}

impl Settings {
    /// Parse settings from JSON; missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Options for the template parser.
    pub fn parser_options(&self) -> ParserOptions {
        ParserOptions {
            strip_whitespace: self.strip_whitespace,
            strict: self.strict,
        }
    }
}

/// Template parser options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserOptions {
    /// Force whitespace stripping regardless of template attributes
    pub strip_whitespace: bool,
    /// Fail on invalid binding expressions instead of keeping them as text
    pub strict: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Settings::default().parser_options()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_defaults() {
        let settings = Settings::from_json(r#"{"flushMode": "deferred"}"#).unwrap();
        assert_eq!(settings.flush_mode, FlushMode::Deferred);
        assert_eq!(settings.strict, cfg!(debug_assertions));
        assert!(settings.root_path.is_empty());
    }

    #[test]
    fn test_from_json_full() {
        let settings = Settings::from_json(
            r#"{"strict": false, "flushMode": "sync", "stripWhitespace": true, "rootPath": "/app/"}"#,
        )
        .unwrap();
        assert!(!settings.strict);
        assert!(settings.parser_options().strip_whitespace);
        assert_eq!(settings.root_path, "/app/");
    }

    #[test]
    fn test_unknown_flush_mode_is_rejected() {
        assert!(Settings::from_json(r#"{"flushMode": "eventually"}"#).is_err());
    }
}
