#![forbid(unsafe_code)]

//! Observable list exposing an `Item[]` indexer and a `Count` property.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::{BindError, Result};
use crate::member::{FnMember, INDEXER_MEMBER, MemberRegistry};
use crate::notify::PropertyChanged;
use crate::subscriber::SubscriberRegistry;
use crate::value::{Bindable, Value, ValueType};

/// Name of the element-count property.
pub const COUNT_MEMBER: &str = "Count";

/// A growable list of [`Value`]s that notifies on every mutation.
///
/// Mutations raise `PropertyChanged("Item[]")` followed by
/// `PropertyChanged("Count")` when the length changed. The sender is `Null`.
#[derive(Default)]
pub struct ObservableList {
    items: RefCell<Vec<Value>>,
    changed: SubscriberRegistry<PropertyChanged>,
}

impl ObservableList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared list pre-filled with `items`.
    pub fn from_values(items: impl IntoIterator<Item = Value>) -> Rc<Self> {
        Rc::new(Self {
            items: RefCell::new(items.into_iter().collect()),
            changed: SubscriberRegistry::new(),
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    /// Element at `index`, or `None` when out of range.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Value> {
        self.items.borrow().get(index).cloned()
    }

    /// Snapshot of all elements.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Value> {
        self.items.borrow().clone()
    }

    pub fn push(&self, value: impl Into<Value>) {
        self.items.borrow_mut().push(value.into());
        self.notify(true);
    }

    /// Insert at `index`; indices past the end append.
    pub fn insert(&self, index: usize, value: impl Into<Value>) {
        {
            let mut items = self.items.borrow_mut();
            let index = index.min(items.len());
            items.insert(index, value.into());
        }
        self.notify(true);
    }

    /// Remove and return the element at `index`.
    pub fn remove(&self, index: usize) -> Option<Value> {
        let removed = {
            let mut items = self.items.borrow_mut();
            (index < items.len()).then(|| items.remove(index))
        };
        if removed.is_some() {
            self.notify(true);
        }
        removed
    }

    /// Replace the element at `index`. Returns the previous element.
    pub fn set(&self, index: usize, value: impl Into<Value>) -> Option<Value> {
        let previous = {
            let mut items = self.items.borrow_mut();
            items
                .get_mut(index)
                .map(|slot| std::mem::replace(slot, value.into()))
        };
        if previous.is_some() {
            self.notify(false);
        }
        previous
    }

    pub fn clear(&self) {
        let drained = std::mem::take(&mut *self.items.borrow_mut());
        let had_items = !drained.is_empty();
        drop(drained);
        if had_items {
            self.notify(true);
        }
    }

    fn notify(&self, count_changed: bool) {
        self.changed
            .raise(&Value::Null, &PropertyChanged::new(INDEXER_MEMBER));
        if count_changed {
            self.changed
                .raise(&Value::Null, &PropertyChanged::new(COUNT_MEMBER));
        }
    }

    /// Register the `Item[]` indexer and `Count` property.
    pub fn register_members(registry: &MemberRegistry) {
        registry.register(
            FnMember::<Self>::indexer(ValueType::Any)
                .with_indexed_getter(|list, args| {
                    let index = list_index(args)?;
                    Ok(index.and_then(|i| list.get(i)).unwrap_or(Value::Unset))
                })
                .with_indexed_setter(|list, args, value| {
                    let index = list_index(args)?;
                    match index.and_then(|i| list.set(i, value)) {
                        Some(_) => Ok(()),
                        None => Err(BindError::conversion(
                            args.first().unwrap_or(&Value::Null),
                            ValueType::Int,
                            format!("index out of range for list of {}", list.len()),
                        )),
                    }
                })
                .into_descriptor(),
        );
        registry.register(
            FnMember::<Self>::property(COUNT_MEMBER, ValueType::Int)
                .with_getter(|list| Value::Int(i64::try_from(list.len()).unwrap_or(i64::MAX)))
                .into_descriptor(),
        );
    }
}

/// Decode a single integer index. Negative indices are out of range.
fn list_index(args: &[Value]) -> Result<Option<usize>> {
    match args {
        [Value::Int(n)] => Ok(usize::try_from(*n).ok()),
        [other] => Err(BindError::conversion(other, ValueType::Int, "list index must be an integer")),
        _ => Err(BindError::conversion(
            &Value::Int(i64::try_from(args.len()).unwrap_or(i64::MAX)),
            ValueType::Int,
            "list indexer takes exactly one argument",
        )),
    }
}

impl Bindable for ObservableList {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn property_changed(&self) -> Option<&SubscriberRegistry<PropertyChanged>> {
        Some(&self.changed)
    }
}

impl fmt::Debug for ObservableList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items.borrow().iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriber::Subscription;

    fn names(list: &ObservableList) -> (Rc<RefCell<Vec<String>>>, Subscription) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_in = Rc::clone(&seen);
        let sub = list
            .changed
            .on_message(move |_, msg| seen_in.borrow_mut().push(msg.name().to_owned()));
        (seen, sub)
    }

    #[test]
    fn push_raises_item_and_count() {
        let list = ObservableList::new();
        let (seen, _sub) = names(&list);
        list.push(1);
        assert_eq!(*seen.borrow(), vec!["Item[]", "Count"]);
    }

    #[test]
    fn set_raises_item_only() {
        let list = ObservableList::from_values([Value::Int(1)]);
        let (seen, _sub) = names(&list);
        assert_eq!(list.set(0, 5), Some(Value::Int(1)));
        assert_eq!(*seen.borrow(), vec!["Item[]"]);
        assert_eq!(list.set(4, 5), None);
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn insert_remove_clear() {
        let list = ObservableList::new();
        list.push("a");
        list.insert(0, "b");
        list.insert(99, "c");
        assert_eq!(
            list.to_vec(),
            vec![Value::from("b"), Value::from("a"), Value::from("c")]
        );
        assert_eq!(list.remove(1), Some(Value::from("a")));
        assert_eq!(list.remove(7), None);
        list.clear();
        assert!(list.is_empty());
    }

    #[test]
    fn indexer_out_of_range_is_unset() {
        let registry = MemberRegistry::with_defaults();
        let list = ObservableList::from_values([Value::Int(10), Value::Int(20)]);
        let target = Value::object(&list);
        let indexer = registry
            .find(crate::value::TypeKey::of::<ObservableList>(), INDEXER_MEMBER)
            .unwrap();
        assert_eq!(indexer.get_value(&target, &[Value::Int(1)]).unwrap(), Value::Int(20));
        assert!(indexer.get_value(&target, &[Value::Int(2)]).unwrap().is_unset());
        assert!(indexer.get_value(&target, &[Value::Int(-1)]).unwrap().is_unset());
        assert!(indexer.get_value(&target, &[Value::from("x")]).is_err());
    }

    #[test]
    fn indexer_writes_in_range() {
        let registry = MemberRegistry::with_defaults();
        let list = ObservableList::from_values([Value::Int(10)]);
        let target = Value::object(&list);
        let indexer = registry
            .find(crate::value::TypeKey::of::<ObservableList>(), INDEXER_MEMBER)
            .unwrap();
        indexer.set_value(&target, &[Value::Int(0)], Value::Int(11)).unwrap();
        assert_eq!(list.get(0), Some(Value::Int(11)));
        assert!(indexer.set_value(&target, &[Value::Int(3)], Value::Int(1)).is_err());
    }
}
