//! Tag tables for the markup tokenizer and the fragment serializer.
//!
//! Uses compile-time perfect hash sets, so lookups cost nothing at startup.

use phf::phf_set;

// =============================================================================
// Compile-time Perfect Hash Sets
// =============================================================================

/// Elements that never have children or a closing tag.
static VOID_TAGS_SET: phf::Set<&'static str> = phf_set! {
    "area",
    "base",
    "br",
    "col",
    "embed",
    "hr",
    "img",
    "input",
    "link",
    "meta",
    "param",
    "source",
    "track",
    "wbr",
};

/// Elements whose content is raw text: no tags, no bindings.
static RAW_TEXT_TAGS_SET: phf::Set<&'static str> = phf_set! {
    "script",
    "style",
};

/// Check if a tag is a void element (`<input>`, `<br>`, ...).
#[inline]
pub fn is_void_tag(tag: &str) -> bool {
    VOID_TAGS_SET.contains(tag)
}

/// Check if a tag holds raw text (`<script>`, `<style>`).
#[inline]
pub fn is_raw_text_tag(tag: &str) -> bool {
    RAW_TEXT_TAGS_SET.contains(tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_void_tags() {
        assert!(is_void_tag("input"));
        assert!(is_void_tag("br"));
        assert!(!is_void_tag("div"));
        assert!(!is_void_tag("template"));
    }

    #[test]
    fn test_raw_text_tags() {
        assert!(is_raw_text_tag("style"));
        assert!(!is_raw_text_tag("span"));
    }
}
