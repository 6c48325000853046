//! Structured path resolution.
//!
//! A path is a dot-separated string (`"user.address.city"`) or a sequence of
//! segments (`["items", 0, "name"]`); both forms normalize to the dot string.
//! Reads never fail and writes silently do nothing when an intermediate value
//! is missing.

use std::borrow::Cow;

use tempera_carton::{CompactString, SmallVec};

use crate::value::Value;

/// Split path segments. Most paths in practice have at most four.
pub type PathParts = SmallVec<[CompactString; 4]>;

/// A single path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(CompactString),
    Index(usize),
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.into())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

/// Anything that can be viewed as a path.
pub trait AsPath {
    fn as_path(&self) -> Cow<'_, str>;
}

impl AsPath for str {
    #[inline]
    fn as_path(&self) -> Cow<'_, str> {
        Cow::Borrowed(self)
    }
}

impl AsPath for String {
    #[inline]
    fn as_path(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.as_str())
    }
}

impl AsPath for CompactString {
    #[inline]
    fn as_path(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.as_str())
    }
}

impl AsPath for [PathSegment] {
    fn as_path(&self) -> Cow<'_, str> {
        let mut out = String::new();
        for (i, segment) in self.iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            match segment {
                PathSegment::Key(key) => out.push_str(key),
                PathSegment::Index(index) => out.push_str(&index.to_string()),
            }
        }
        Cow::Owned(out)
    }
}

impl<const N: usize> AsPath for [PathSegment; N] {
    fn as_path(&self) -> Cow<'_, str> {
        self.as_slice().as_path()
    }
}

impl AsPath for Vec<PathSegment> {
    fn as_path(&self) -> Cow<'_, str> {
        self.as_slice().as_path()
    }
}

impl<T: AsPath + ?Sized> AsPath for &T {
    #[inline]
    fn as_path(&self) -> Cow<'_, str> {
        (**self).as_path()
    }
}

/// Whether the string names a path rather than a simple property.
#[inline]
pub fn is_path(path: &str) -> bool {
    path.contains('.')
}

/// First segment of a path (`"a.b.c"` -> `"a"`).
#[inline]
pub fn root(path: &str) -> &str {
    match path.find('.') {
        Some(dot) => &path[..dot],
        None => path,
    }
}

/// `path` is a strict ancestor of `base` (`is_ancestor("a.b", "a")`).
#[inline]
pub fn is_ancestor(base: &str, path: &str) -> bool {
    base.len() > path.len()
        && base.starts_with(path)
        && base.as_bytes()[path.len()] == b'.'
}

/// `path` is a strict descendant of `base` (`is_descendant("a", "a.b")`).
#[inline]
pub fn is_descendant(base: &str, path: &str) -> bool {
    is_ancestor(path, base)
}

/// Re-root `path` from `base` onto `new_base`.
///
/// Returns `None` unless `path` equals `base` or descends from it on a
/// segment boundary.
pub fn translate(base: &str, new_base: &str, path: &str) -> Option<CompactString> {
    if path == base {
        Some(CompactString::from(new_base))
    } else if is_descendant(base, path) {
        let mut out = CompactString::from(new_base);
        out.push_str(&path[base.len()..]);
        Some(out)
    } else {
        None
    }
}

/// Exact equality after normalization.
pub fn matches<A: AsPath + ?Sized, B: AsPath + ?Sized>(base: &A, path: &B) -> bool {
    base.as_path() == path.as_path()
}

/// Normalize to the dot-separated string form.
pub fn normalize<P: AsPath + ?Sized>(path: &P) -> CompactString {
    CompactString::from(path.as_path().as_ref())
}

/// Split into segments.
pub fn split<P: AsPath + ?Sized>(path: &P) -> PathParts {
    path.as_path().split('.').map(CompactString::from).collect()
}

/// Read the value at `path`. Missing intermediates yield `undefined`.
pub fn get<P: AsPath + ?Sized>(root: &Value, path: &P) -> Value {
    get_parts(root, &split(path))
}

/// Read along already split segments.
pub fn get_parts<S: AsRef<str>>(root: &Value, parts: &[S]) -> Value {
    let mut current = root.clone();
    for part in parts {
        if current.is_nullish() {
            return Value::Undefined;
        }
        current = current.get_key(part.as_ref());
    }
    current
}

/// Write `value` at `path`, returning the normalized path when the write
/// happened.
pub fn set<P: AsPath + ?Sized>(root: &Value, path: &P, value: Value) -> Option<CompactString> {
    let parts = split(path);
    set_parts(root, &parts, value)?;
    Some(join(&parts))
}

/// Write along already split segments.
pub fn set_parts<S: AsRef<str>>(root: &Value, parts: &[S], value: Value) -> Option<()> {
    let (last, parents) = parts.split_last()?;
    let parent = get_parts(root, parents);
    parent.set_key(last.as_ref(), value).then_some(())
}

/// Join segments with dots.
pub fn join<S: AsRef<str>>(parts: &[S]) -> CompactString {
    let mut out = CompactString::default();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            out.push('.');
        }
        out.push_str(part.as_ref());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn data() -> Value {
        Value::from(json!({
            "user": {"name": "Ada", "tags": ["a", "b"]},
            "count": 0
        }))
    }

    #[test]
    fn test_relations() {
        assert!(is_path("a.b"));
        assert!(!is_path("a"));
        assert_eq!(root("a.b.c"), "a");
        assert!(is_ancestor("a.b", "a"));
        assert!(!is_ancestor("ab", "a"));
        assert!(!is_ancestor("a", "a"));
        assert!(is_descendant("a", "a.b.c"));
        assert!(!is_descendant("a", "ab.c"));
    }

    #[test]
    fn test_translate() {
        assert_eq!(translate("a.b", "x", "a.b.c").as_deref(), Some("x.c"));
        assert_eq!(translate("a.b", "x", "a.b").as_deref(), Some("x"));
        assert_eq!(translate("a.b", "x", "a.bc"), None);
        assert_eq!(translate("a.b", "x", "a"), None);
    }

    #[test]
    fn test_segments() {
        let segments = [PathSegment::from("items"), PathSegment::Index(2), "name".into()];
        assert_eq!(normalize(&segments), "items.2.name");
        assert!(matches(&segments, "items.2.name"));
        assert_eq!(split("a.b").as_slice(), ["a", "b"]);
    }

    #[test]
    fn test_get() {
        let data = data();
        assert_eq!(get(&data, "user.name"), Value::from("Ada"));
        assert_eq!(get(&data, "user.tags.1"), Value::from("b"));
        assert_eq!(get(&data, "user.tags.length"), Value::from(2));
        assert_eq!(get(&data, "user.name.length"), Value::from(3));
        assert!(get(&data, "missing.deep.path").is_undefined());
    }

    #[test]
    fn test_set() {
        let data = data();
        assert_eq!(
            set(&data, "user.name", Value::from("Grace")).as_deref(),
            Some("user.name")
        );
        assert_eq!(get(&data, "user.name"), Value::from("Grace"));
        assert_eq!(set(&data, "missing.name", Value::from(1)), None);
        assert!(get(&data, "missing").is_undefined());
        assert!(set(&data, "user.tags.2", Value::from("c")).is_some());
        assert_eq!(get(&data, "user.tags.length"), Value::from(3));
    }

    #[test]
    fn test_set_rejects_unbounded_array_growth() {
        let data = data();
        assert_eq!(set(&data, "user.tags.18446744073709551615", Value::from(1)), None);
        assert_eq!(set(&data, "user.tags.99999999999", Value::from(1)), None);
        assert_eq!(set(&data, "user.tags.length", Value::from(f64::INFINITY)), None);
        assert_eq!(set(&data, "user.tags.length", Value::from(1e300)), None);
        assert_eq!(set(&data, "user.tags.length", Value::from(1.5)), None);
        assert_eq!(get(&data, "user.tags.length"), Value::from(2));

        assert!(set(&data, "user.tags.length", Value::from(1)).is_some());
        assert_eq!(get(&data, "user.tags.length"), Value::from(1));
        assert!(set(&data, "user.tags.3", Value::from("d")).is_some());
        assert_eq!(get(&data, "user.tags.length"), Value::from(4));
        assert!(get(&data, "user.tags.2").is_undefined());
    }

    fn path_strategy() -> impl Strategy<Value = String> {
        proptest::collection::vec("[a-z]{1,4}|[0-9]", 1..5).prop_map(|parts| parts.join("."))
    }

    proptest! {
        #[test]
        fn prop_normalize_split(path in path_strategy()) {
            let parts = split(path.as_str());
            prop_assert_eq!(normalize(&join(&parts)), normalize(path.as_str()));
        }

        #[test]
        fn prop_get_undefined_on_missing_intermediate(path in path_strategy()) {
            let value = get(&Value::object(), format!("absent.{path}").as_str());
            prop_assert!(value.is_undefined());
        }

        #[test]
        fn prop_set_is_idempotent(path in path_strategy(), n in 0i32..100) {
            let data = data();
            let target = format!("user.{path}");
            let first = set(&data, target.as_str(), Value::from(n));
            let snapshot = data.to_json();
            let second = set(&data, target.as_str(), Value::from(n));
            prop_assert_eq!(first, second);
            prop_assert_eq!(snapshot, data.to_json());
        }
    }
}
