//! General string helpers shared by the parser and the runtime.
//!
//! Property names are camelCase while attribute and event names are
//! dash-case; both directions are needed (binding targets, reflected
//! attributes, `<prop>-changed` events).

use compact_str::CompactString;

/// Convert a dash-case name to camelCase.
///
/// `"foo-bar-baz"` becomes `"fooBarBaz"`. Names without dashes are returned
/// unchanged.
pub fn dash_to_camel_case(name: &str) -> CompactString {
    if !name.contains('-') {
        return CompactString::from(name);
    }
    let mut out = CompactString::with_capacity(name.len());
    let mut upper_next = false;
    for ch in name.chars() {
        if ch == '-' {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// Convert a camelCase name to dash-case.
///
/// `"fooBarBaz"` becomes `"foo-bar-baz"`.
pub fn camel_to_dash_case(name: &str) -> CompactString {
    let mut out = CompactString::with_capacity(name.len() + 4);
    for ch in name.chars() {
        if ch.is_ascii_uppercase() {
            out.push('-');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Name of the event fired when `property` changes (`fooBar` -> `foo-bar-changed`).
#[inline]
pub fn changed_event_name(property: &str) -> CompactString {
    let mut name = camel_to_dash_case(property);
    name.push_str("-changed");
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dash_to_camel() {
        assert_eq!(dash_to_camel_case("foo"), "foo");
        assert_eq!(dash_to_camel_case("foo-bar"), "fooBar");
        assert_eq!(dash_to_camel_case("foo-bar-baz"), "fooBarBaz");
    }

    #[test]
    fn test_camel_to_dash() {
        assert_eq!(camel_to_dash_case("foo"), "foo");
        assert_eq!(camel_to_dash_case("fooBar"), "foo-bar");
        assert_eq!(camel_to_dash_case("fooBarBaz"), "foo-bar-baz");
    }

    #[test]
    fn test_round_trip() {
        for name in ["value", "selectedItem", "aLongPropertyName"] {
            assert_eq!(dash_to_camel_case(&camel_to_dash_case(name)), name);
        }
    }

    #[test]
    fn test_changed_event_name() {
        assert_eq!(changed_event_name("selectedItem"), "selected-item-changed");
    }
}
