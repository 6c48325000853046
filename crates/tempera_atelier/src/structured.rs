//! Path reads and writes, array mutation with splice notification, and
//! path linking.

use tempera_carton::CompactString;
use tempera_relief::{path, AsPath, Value};

use crate::element::Element;
use crate::error::EngineError;

/// One entry of an `indexSplices` change record.
#[derive(Debug, Clone, PartialEq)]
pub struct SpliceRecord {
    pub index: usize,
    pub removed: Vec<Value>,
    pub added_count: usize,
    /// The mutated array.
    pub object: Value,
}

impl SpliceRecord {
    pub fn to_value(&self) -> Value {
        Value::object_from([
            ("index", Value::from(self.index)),
            ("removed", Value::array(self.removed.iter().cloned())),
            ("addedCount", Value::from(self.added_count)),
            ("object", self.object.clone()),
            ("type", Value::from("splice")),
        ])
    }
}

/// Read `path` relative to `root`.
pub fn get_from<P: AsPath + ?Sized>(root: &Value, path: &P) -> Value {
    path::get(root, path)
}

/// Write `path` relative to `root` without notification.
pub fn set_in<P: AsPath + ?Sized>(root: &Value, path: &P, value: Value) -> Option<CompactString> {
    path::set(root, path, value)
}

impl Element {
    /// Read a property or path from the element's data.
    pub fn get<P: AsPath + ?Sized>(&self, path: &P) -> Value {
        let path = path::normalize(path);
        let root = path::root(&path);
        let value = self.data(root);
        if root.len() == path.len() {
            return value;
        }
        path::get(&value, &path[root.len() + 1..])
    }

    /// Write a property or path and notify.
    pub fn set<P: AsPath + ?Sized>(&self, path: &P, value: impl Into<Value>) -> Result<(), EngineError> {
        let path = path::normalize(path);
        if self.is_read_only(&path) {
            return self.violation(EngineError::ReadOnlyProperty(path));
        }
        if self.set_pending_property_or_path(&path, value.into(), true, false) {
            self.invalidate()?;
        }
        Ok(())
    }

    /// Notify a change at `path` that was made without the engine. Without
    /// a value, the current value at `path` is used.
    pub fn notify_path<P: AsPath + ?Sized>(&self, path: &P, value: Option<Value>) -> Result<(), EngineError> {
        let path = path::normalize(path);
        let value = value.unwrap_or_else(|| self.get(&path));
        if self.set_pending_property_or_path(&path, value, true, true) {
            self.invalidate()?;
        }
        Ok(())
    }

    /// Notify `<path>.splices` with the records, then `<path>.length`.
    pub fn notify_splices<P: AsPath + ?Sized>(
        &self,
        path: &P,
        records: Vec<SpliceRecord>,
    ) -> Result<(), EngineError> {
        let path = path::normalize(path);
        let array = self.get(&path);
        let change = Value::object_from([(
            "indexSplices",
            Value::array(records.iter().map(SpliceRecord::to_value)),
        )]);
        self.notify_path(&format!("{path}.splices"), Some(change))?;
        self.notify_path(&format!("{path}.length"), Some(array.get_key("length")))
    }

    fn array_at<P: AsPath + ?Sized>(&self, path: &P) -> Option<(CompactString, Value)> {
        let path = path::normalize(path);
        let value = self.get(&path);
        value.as_array()?;
        Some((path, value))
    }

    fn notify_splice(
        &self,
        path: &str,
        array: Value,
        index: usize,
        added_count: usize,
        removed: Vec<Value>,
    ) -> Result<(), EngineError> {
        let record = SpliceRecord {
            index,
            removed,
            added_count,
            object: array,
        };
        self.notify_splices(path, vec![record])
    }

    /// Append items; returns the new length. Not an array: `Ok(0)`.
    pub fn push<P, I>(&self, path: &P, items: I) -> Result<usize, EngineError>
    where
        P: AsPath + ?Sized,
        I: IntoIterator<Item = Value>,
    {
        let Some((path, array)) = self.array_at(path) else {
            return Ok(0);
        };
        let items: Vec<Value> = items.into_iter().collect();
        let (index, len) = match array.as_array() {
            Some(cell) => {
                let mut vec = cell.borrow_mut();
                let index = vec.len();
                vec.extend(items.iter().cloned());
                (index, vec.len())
            }
            None => return Ok(0),
        };
        if !items.is_empty() {
            self.notify_splice(&path, array, index, items.len(), Vec::new())?;
        }
        Ok(len)
    }

    /// Remove the last item. Empty or not an array: `undefined`, no
    /// notification.
    pub fn pop<P: AsPath + ?Sized>(&self, path: &P) -> Result<Value, EngineError> {
        let Some((path, array)) = self.array_at(path) else {
            return Ok(Value::Undefined);
        };
        let (popped, index) = match array.as_array() {
            Some(cell) => {
                let mut vec = cell.borrow_mut();
                let popped = vec.pop();
                (popped, vec.len())
            }
            None => return Ok(Value::Undefined),
        };
        let Some(popped) = popped else {
            return Ok(Value::Undefined);
        };
        self.notify_splice(&path, array, index, 0, vec![popped.clone()])?;
        Ok(popped)
    }

    /// Remove the first item.
    pub fn shift<P: AsPath + ?Sized>(&self, path: &P) -> Result<Value, EngineError> {
        let Some((path, array)) = self.array_at(path) else {
            return Ok(Value::Undefined);
        };
        let shifted = match array.as_array() {
            Some(cell) => {
                let mut vec = cell.borrow_mut();
                (!vec.is_empty()).then(|| vec.remove(0))
            }
            None => None,
        };
        let Some(shifted) = shifted else {
            return Ok(Value::Undefined);
        };
        self.notify_splice(&path, array, 0, 0, vec![shifted.clone()])?;
        Ok(shifted)
    }

    /// Prepend items; returns the new length.
    pub fn unshift<P, I>(&self, path: &P, items: I) -> Result<usize, EngineError>
    where
        P: AsPath + ?Sized,
        I: IntoIterator<Item = Value>,
    {
        let Some((path, array)) = self.array_at(path) else {
            return Ok(0);
        };
        let items: Vec<Value> = items.into_iter().collect();
        let len = match array.as_array() {
            Some(cell) => {
                let mut vec = cell.borrow_mut();
                vec.splice(0..0, items.iter().cloned());
                vec.len()
            }
            None => return Ok(0),
        };
        if !items.is_empty() {
            self.notify_splice(&path, array, 0, items.len(), Vec::new())?;
        }
        Ok(len)
    }

    /// Remove `delete_count` items at `start` (negative counts from the end)
    /// and insert `items` there. Returns the removed items. With no
    /// `delete_count`, everything from `start` is removed.
    pub fn splice<P, I>(
        &self,
        path: &P,
        start: i64,
        delete_count: Option<usize>,
        items: I,
    ) -> Result<Vec<Value>, EngineError>
    where
        P: AsPath + ?Sized,
        I: IntoIterator<Item = Value>,
    {
        let Some((path, array)) = self.array_at(path) else {
            return Ok(Vec::new());
        };
        let items: Vec<Value> = items.into_iter().collect();
        let (start, removed) = match array.as_array() {
            Some(cell) => {
                let mut vec = cell.borrow_mut();
                let len = vec.len();
                let start = if start < 0 {
                    len.saturating_sub(start.unsigned_abs() as usize)
                } else {
                    (start as usize).min(len)
                };
                let count = delete_count.unwrap_or(len).min(len - start);
                let removed: Vec<Value> = vec.splice(start..start + count, items.iter().cloned()).collect();
                (start, removed)
            }
            None => return Ok(Vec::new()),
        };
        if !items.is_empty() || !removed.is_empty() {
            self.notify_splice(&path, array, start, items.len(), removed.clone())?;
        }
        Ok(removed)
    }

    /// Make `to` and `from` aliases: notifications on one are mirrored to
    /// the other.
    pub fn link_paths<A, B>(&self, to: &A, from: &B)
    where
        A: AsPath + ?Sized,
        B: AsPath + ?Sized,
    {
        self.inner.linker.borrow_mut().link(to, from);
    }

    pub fn unlink_paths<P: AsPath + ?Sized>(&self, to: &P) -> bool {
        let to = path::normalize(to);
        self.inner.linker.borrow_mut().unlink(&to)
    }

    /// Generic pending write.
    ///
    /// Simple names go through the accessor (or land in data unmanaged).
    /// Paths are written into the object graph first unless this is a
    /// notification of a write that already happened; an unchanged value
    /// stops there. Linked aliases are notified too.
    pub(crate) fn set_pending_property_or_path(
        &self,
        path: &str,
        value: Value,
        should_notify: bool,
        is_path_notification: bool,
    ) -> bool {
        let is_root = path::root(path) == path;
        if !is_path_notification && is_root {
            if self.has_accessor(path) {
                return self.set_pending_property(path, value, should_notify);
            }
            self.inner.store.borrow_mut().set_data(path, value);
            return false;
        }

        if !is_path_notification {
            let old = self.get(path);
            let parts = path::split(path);
            let root = self.data(&parts[0]);
            if path::set_parts(&root, &parts[1..], value.clone()).is_none() {
                return false;
            }
            if old.same_value(&value) {
                return false;
            }
        }

        self.inner.store.borrow_mut().mark_has_paths();
        if !self.set_pending_property(path, value.clone(), should_notify) {
            return false;
        }
        let linked = self.inner.linker.borrow().linked_paths(path);
        for link in linked {
            self.set_pending_property_or_path(&link, value.clone(), true, true);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splice_record_value() {
        let array = Value::array([Value::from(1)]);
        let record = SpliceRecord {
            index: 0,
            removed: vec![Value::from(2)],
            added_count: 1,
            object: array.clone(),
        };
        let value = record.to_value();
        assert_eq!(value.get_key("index"), Value::from(0));
        assert_eq!(value.get_key("addedCount"), Value::from(1));
        assert_eq!(value.get_key("type"), Value::from("splice"));
        assert!(value.get_key("object").strict_eq(&array));
        assert_eq!(value.get_key("removed").get_key("length"), Value::from(1));
    }

    #[test]
    fn test_get_from_and_set_in() {
        let root = Value::object_from([("a", Value::object_from([("b", Value::from(1))]))]);
        assert_eq!(get_from(&root, "a.b"), Value::from(1));
        assert_eq!(set_in(&root, "a.b", Value::from(2)).as_deref(), Some("a.b"));
        assert_eq!(get_from(&root, "a.b"), Value::from(2));
        assert_eq!(set_in(&root, "x.y", Value::from(2)), None);
    }
}
