//! Property accessors and per-instance property storage.
//!
//! An [`AccessorTable`] lists the properties that take part in effects. It is
//! built once per element class and shared; instance additions copy it on
//! first write. [`PropertyStore`] holds the instance's data together with the
//! pending bag, the old-value bag and the same-turn temp cache.

use tempera_carton::{CompactString, FxHashMap};
use tempera_relief::{path, Value};

/// Insertion-ordered map keyed by property or path.
///
/// Re-inserting a key updates its value in place and keeps the original
/// position, so iteration follows first-write order.
#[derive(Debug, Clone)]
pub struct OrderedMap<V> {
    entries: Vec<(CompactString, V)>,
    index: FxHashMap<CompactString, usize>,
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: FxHashMap::default(),
        }
    }
}

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the key is new.
    pub fn insert(&mut self, key: &str, value: V) -> bool {
        match self.index.get(key) {
            Some(&i) => {
                self.entries[i].1 = value;
                false
            }
            None => {
                self.index.insert(key.into(), self.entries.len());
                self.entries.push((key.into(), value));
                true
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert every entry of `other`, overwriting existing keys.
    pub fn extend(&mut self, other: OrderedMap<V>) {
        for (key, value) in other.entries {
            self.insert(&key, value);
        }
    }
}

impl<K: AsRef<str>, V> FromIterator<(K, V)> for OrderedMap<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map.insert(key.as_ref(), value);
        }
        map
    }
}

/// Property/path → value bag.
pub type ChangeSet = OrderedMap<Value>;

impl ChangeSet {
    /// Cloned value, `undefined` when absent.
    pub fn value(&self, key: &str) -> Value {
        self.get(key).cloned().unwrap_or_default()
    }
}

/// Accessor descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Accessor {
    pub read_only: bool,
}

/// Properties with accessors, per element class.
#[derive(Debug, Clone, Default)]
pub struct AccessorTable {
    accessors: FxHashMap<CompactString, Accessor>,
}

impl AccessorTable {
    /// Idempotent: an existing descriptor is kept as is. Returns `true` when
    /// the accessor was created.
    pub fn create(&mut self, name: &str, read_only: bool) -> bool {
        if self.accessors.contains_key(name) {
            return false;
        }
        self.accessors.insert(name.into(), Accessor { read_only });
        true
    }

    #[inline]
    pub fn has(&self, name: &str) -> bool {
        self.accessors.contains_key(name)
    }

    pub fn is_read_only(&self, name: &str) -> bool {
        self.accessors.get(name).is_some_and(|a| a.read_only)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.accessors.keys().map(CompactString::as_str)
    }

    pub fn len(&self) -> usize {
        self.accessors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accessors.is_empty()
    }
}

/// A batch taken by the flush loop.
#[derive(Debug, Default)]
pub struct PendingBatch {
    pub changed: ChangeSet,
    pub old: ChangeSet,
    pub has_paths: bool,
}

/// Instance data plus the bookkeeping of the current turn.
#[derive(Debug, Default)]
pub struct PropertyStore {
    data: FxHashMap<CompactString, Value>,
    temp: FxHashMap<CompactString, Value>,
    pending: Option<ChangeSet>,
    old: Option<ChangeSet>,
    to_notify: Option<OrderedMap<bool>>,
    has_paths: bool,
}

impl PropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flushed value of a root property.
    pub fn data(&self, name: &str) -> Value {
        self.data.get(name).cloned().unwrap_or_default()
    }

    pub fn has_data(&self, name: &str) -> bool {
        self.data.contains_key(name)
    }

    /// Store without any bookkeeping.
    pub fn set_data(&mut self, name: &str, value: Value) {
        self.data.insert(name.into(), value);
    }

    /// All root properties as a change set, sorted by name.
    pub fn data_snapshot(&self) -> ChangeSet {
        let mut keys: Vec<_> = self.data.keys().collect();
        keys.sort();
        keys.into_iter()
            .map(|k| (k.clone(), self.data[k].clone()))
            .collect()
    }

    pub fn has_paths(&self) -> bool {
        self.has_paths
    }

    pub fn mark_has_paths(&mut self) {
        self.has_paths = true;
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.as_ref().map_or(0, ChangeSet::len)
    }

    /// Dirty check.
    ///
    /// - paths compare with the temp-cache entry for that exact path
    /// - objects and arrays compare with the temp cache, which a change
    ///   populates for the rest of the turn
    /// - primitives compare with `old`, `NaN` equal to `NaN`
    pub fn should_change(&mut self, name: &str, value: &Value, old: &Value) -> bool {
        if path::is_path(name) {
            return self.temp.get(name).map_or(true, |prev| !prev.same_value(value));
        }
        if value.is_object_like() {
            let changed = self.temp.get(name).map_or(true, |prev| !prev.strict_eq(value));
            if changed {
                self.temp.insert(name.into(), value.clone());
            }
            return changed;
        }
        !old.same_value(value)
    }

    /// Record a write. Returns whether it counts as a change.
    ///
    /// `notifies` says whether the property has a notify effect; paths always
    /// track their notify intent.
    pub fn set_pending(
        &mut self,
        name: &str,
        value: Value,
        should_notify: bool,
        notifies: bool,
    ) -> bool {
        let is_path = self.has_paths && path::is_path(name);
        let previous = if is_path {
            self.temp.get(name).cloned().unwrap_or_default()
        } else {
            self.data(name)
        };
        if !self.should_change(name, &value, &previous) {
            return false;
        }

        let old = self.old.get_or_insert_with(ChangeSet::new);
        if !old.contains_key(name) {
            let flushed = self.data.get(name).cloned().unwrap_or_default();
            old.insert(name, flushed);
        }
        if is_path {
            self.temp.insert(name.into(), value.clone());
        } else {
            self.data.insert(name.into(), value.clone());
        }
        self.pending
            .get_or_insert_with(ChangeSet::new)
            .insert(name, value);
        if is_path || notifies {
            self.to_notify
                .get_or_insert_with(OrderedMap::new)
                .insert(name, should_notify);
        }
        true
    }

    /// Take the pending bag, the old-value bag and the paths flag.
    pub fn take_pending(&mut self) -> Option<PendingBatch> {
        let changed = self.pending.take()?;
        let old = self.old.take().unwrap_or_default();
        let has_paths = std::mem::take(&mut self.has_paths);
        Some(PendingBatch {
            changed,
            old,
            has_paths,
        })
    }

    /// Take only the pending and old bags (the compute loop merges these into
    /// the running batch).
    pub fn take_pending_bags(&mut self) -> Option<(ChangeSet, ChangeSet)> {
        let changed = self.pending.take()?;
        Some((changed, self.old.take().unwrap_or_default()))
    }

    pub fn take_to_notify(&mut self) -> Option<OrderedMap<bool>> {
        self.to_notify.take()
    }

    pub fn clear_temp(&mut self) {
        self.temp.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordered_map_keeps_first_write_order() {
        let mut map = ChangeSet::new();
        assert!(map.insert("b", 1.into()));
        assert!(map.insert("a", 2.into()));
        assert!(!map.insert("b", 3.into()));
        let entries: Vec<_> = map.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        assert_eq!(entries, [("b".to_string(), Value::from(3)), ("a".to_string(), Value::from(2))]);
        assert_eq!(map.value("missing"), Value::Undefined);
    }

    #[test]
    fn test_accessor_table_is_idempotent() {
        let mut table = AccessorTable::default();
        assert!(table.create("a", false));
        assert!(!table.create("a", true));
        assert!(!table.is_read_only("a"));
        assert!(table.create("b", true));
        assert!(table.is_read_only("b"));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_primitives_compare_with_flushed_value() {
        let mut store = PropertyStore::new();
        assert!(!store.should_change("n", &Value::from(1), &Value::from(1)));
        assert!(!store.should_change("n", &Value::Number(f64::NAN), &Value::Number(f64::NAN)));
        assert!(store.should_change("n", &Value::from(2), &Value::from(1)));
    }

    #[test]
    fn test_objects_use_turn_cache() {
        let mut store = PropertyStore::new();
        let obj = Value::object();
        assert!(store.should_change("o", &obj, &obj));
        assert!(!store.should_change("o", &obj, &obj));
        store.clear_temp();
        assert!(store.should_change("o", &obj, &obj));
    }

    #[test]
    fn test_set_pending_records_first_old_value() {
        let mut store = PropertyStore::new();
        store.set_data("a", 1.into());
        assert!(store.set_pending("a", 2.into(), true, true));
        assert!(store.set_pending("a", 3.into(), true, true));
        assert!(!store.set_pending("a", 3.into(), true, true));
        assert!(store.set_pending("b", "x".into(), true, false));

        let batch = store.take_pending().unwrap();
        assert_eq!(batch.changed.value("a"), Value::from(3));
        assert_eq!(batch.old.value("a"), Value::from(1));
        assert_eq!(batch.changed.keys().collect::<Vec<_>>(), ["a", "b"]);
        let notify = store.take_to_notify().unwrap();
        assert_eq!(notify.keys().collect::<Vec<_>>(), ["a"]);
        assert!(store.take_pending().is_none());
    }

    #[test]
    fn test_paths_go_to_temp_cache() {
        let mut store = PropertyStore::new();
        store.mark_has_paths();
        assert!(store.set_pending("a.b", 1.into(), true, false));
        assert!(!store.set_pending("a.b", 1.into(), true, false));
        assert!(!store.has_data("a.b"));
        let batch = store.take_pending().unwrap();
        assert!(batch.has_paths);
        assert_eq!(batch.old.value("a.b"), Value::Undefined);
        assert_eq!(store.take_to_notify().unwrap().get("a.b"), Some(&true));
    }
}
