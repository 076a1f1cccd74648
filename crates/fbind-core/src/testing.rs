#![forbid(unsafe_code)]

//! Shared test fixtures.
//!
//! Enabled for this crate's own tests and for dependents through the
//! `test-helpers` feature. [`SourceModel`] and [`NestedModel`] are small
//! notifying objects with the member shapes bindings care about: scalar
//! properties, an object link, a collection link, indexers, an event, a
//! command slot, an `Enabled` flag, and a read-only property.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ahash::AHashMap;

use crate::collection::ObservableList;
use crate::error::{BindError, Result};
use crate::member::{ENABLED_MEMBER, FnMember, MemberRegistry};
use crate::notify::PropertyChanged;
use crate::subscriber::SubscriberRegistry;
use crate::value::{Bindable, TypeKey, Value, ValueType};

fn expect_int(value: &Value) -> Result<i64> {
    value
        .as_int()
        .ok_or_else(|| BindError::conversion(value, ValueType::Int, "expected int"))
}

fn expect_bool(value: &Value) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| BindError::conversion(value, ValueType::Bool, "expected bool"))
}

fn expect_str_or_null(value: Value) -> Result<Value> {
    match value {
        Value::Str(_) | Value::Null => Ok(value),
        other => Err(BindError::conversion(&other, ValueType::Str, "expected string")),
    }
}

/// `Null` or an object of type `T`.
fn expect_object<T: Bindable>(value: Value) -> Result<Value> {
    if value.is_null() || value.downcast_ref::<T>().is_some() {
        Ok(value)
    } else {
        Err(BindError::InvalidTarget {
            expected: TypeKey::of::<T>().short_name().to_owned(),
            found: value.type_key().short_name().to_owned(),
        })
    }
}

/// Key of the model indexer: a string plus an optional integer.
fn index_key(args: &[Value]) -> Result<(String, i64)> {
    match args {
        [Value::Str(key)] => Ok((key.to_string(), 0)),
        [Value::Str(key), Value::Int(n)] => Ok((key.to_string(), *n)),
        [other, ..] => Err(BindError::conversion(other, ValueType::Str, "expected string key")),
        [] => Err(BindError::conversion(&Value::Null, ValueType::Str, "missing key")),
    }
}

/// Root-side fixture object.
pub struct SourceModel {
    int_property: Cell<i64>,
    string_property: RefCell<Value>,
    object_property: RefCell<Value>,
    nested: RefCell<Value>,
    items: RefCell<Value>,
    indexed: RefCell<AHashMap<(String, i64), Value>>,
    enabled: Cell<bool>,
    command: RefCell<Value>,
    setter_calls: Cell<usize>,
    click: SubscriberRegistry<Value>,
    changed: SubscriberRegistry<PropertyChanged>,
}

impl SourceModel {
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            int_property: Cell::new(0),
            string_property: RefCell::new(Value::Null),
            object_property: RefCell::new(Value::Null),
            nested: RefCell::new(Value::Null),
            items: RefCell::new(Value::Null),
            indexed: RefCell::new(AHashMap::new()),
            enabled: Cell::new(true),
            command: RefCell::new(Value::Null),
            setter_calls: Cell::new(0),
            click: SubscriberRegistry::new(),
            changed: SubscriberRegistry::new(),
        })
    }

    /// Raise `PropertyChanged(name)`.
    pub fn raise(&self, name: &str) {
        self.changed.raise(&Value::Null, &PropertyChanged::new(name));
    }

    /// Number of setter invocations across all members.
    #[must_use]
    pub fn setter_calls(&self) -> usize {
        self.setter_calls.get()
    }

    fn touch(&self) {
        self.setter_calls.set(self.setter_calls.get() + 1);
    }

    #[must_use]
    pub fn int_property(&self) -> i64 {
        self.int_property.get()
    }

    pub fn set_int_property(&self, value: i64) {
        self.touch();
        if self.int_property.replace(value) != value {
            self.raise("IntProperty");
        }
    }

    #[must_use]
    pub fn string_property(&self) -> Value {
        self.string_property.borrow().clone()
    }

    pub fn set_string_property(&self, value: impl Into<Value>) {
        self.touch();
        let value = value.into();
        if self.string_property.replace(value.clone()) != value {
            self.raise("StringProperty");
        }
    }

    #[must_use]
    pub fn object_property(&self) -> Value {
        self.object_property.borrow().clone()
    }

    pub fn set_object_property(&self, value: Value) {
        self.touch();
        if self.object_property.replace(value.clone()) != value {
            self.raise("ObjectProperty");
        }
    }

    /// The `NestedModel` link, `Null` when unset.
    #[must_use]
    pub fn nested(&self) -> Value {
        self.nested.borrow().clone()
    }

    pub fn set_nested(&self, nested: Option<&Rc<NestedModel>>) {
        self.store_nested(nested.map_or(Value::Null, Value::object));
    }

    fn store_nested(&self, value: Value) {
        self.touch();
        *self.nested.borrow_mut() = value;
        self.raise("NestedModel");
    }

    /// The `Items` link, `Null` when unset.
    #[must_use]
    pub fn items(&self) -> Value {
        self.items.borrow().clone()
    }

    pub fn set_items(&self, items: Option<&Rc<ObservableList>>) {
        self.store_items(items.map_or(Value::Null, Value::object));
    }

    fn store_items(&self, value: Value) {
        self.touch();
        *self.items.borrow_mut() = value;
        self.raise("Items");
    }

    #[must_use]
    pub fn indexed(&self, key: &str, n: i64) -> Value {
        self.indexed
            .borrow()
            .get(&(key.to_owned(), n))
            .cloned()
            .unwrap_or(Value::Unset)
    }

    pub fn set_indexed(&self, key: &str, n: i64, value: impl Into<Value>) {
        self.touch();
        self.indexed
            .borrow_mut()
            .insert((key.to_owned(), n), value.into());
        self.raise(&format!("Item[{key}]"));
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled.get()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.touch();
        if self.enabled.replace(enabled) != enabled {
            self.raise(ENABLED_MEMBER);
        }
    }

    #[must_use]
    pub fn command(&self) -> Value {
        self.command.borrow().clone()
    }

    pub fn set_command(&self, command: Value) {
        self.touch();
        if self.command.replace(command.clone()) != command {
            self.raise("Command");
        }
    }

    /// Registry behind the `Click` event.
    #[must_use]
    pub fn click(&self) -> &SubscriberRegistry<Value> {
        &self.click
    }

    /// Fire `Click` with `args`. Returns the number of handlers reached.
    pub fn raise_click(&self, args: Value) -> usize {
        self.click.raise(&Value::Null, &args)
    }

    /// Number of live `PropertyChanged` registrations.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.changed.prune();
        self.changed.len()
    }

    /// Register `SourceModel` members on `registry`.
    pub fn register_members(registry: &MemberRegistry) {
        registry.register(
            FnMember::<Self>::property("IntProperty", ValueType::Int)
                .with_getter(|m| Value::Int(m.int_property()))
                .with_setter(|m, v| {
                    m.set_int_property(expect_int(&v)?);
                    Ok(())
                })
                .into_descriptor(),
        );
        registry.register(
            FnMember::<Self>::property("StringProperty", ValueType::Str)
                .with_getter(Self::string_property)
                .with_setter(|m, v| {
                    m.set_string_property(expect_str_or_null(v)?);
                    Ok(())
                })
                .into_descriptor(),
        );
        registry.register(
            FnMember::<Self>::property("ObjectProperty", ValueType::Any)
                .with_getter(Self::object_property)
                .with_setter(|m, v| {
                    m.set_object_property(v);
                    Ok(())
                })
                .into_descriptor(),
        );
        registry.register(
            FnMember::<Self>::property("NestedModel", ValueType::Object)
                .with_getter(Self::nested)
                .with_setter(|m, v| {
                    m.store_nested(expect_object::<NestedModel>(v)?);
                    Ok(())
                })
                .into_descriptor(),
        );
        registry.register(
            FnMember::<Self>::property("Items", ValueType::Object)
                .with_getter(Self::items)
                .with_setter(|m, v| {
                    m.store_items(expect_object::<ObservableList>(v)?);
                    Ok(())
                })
                .into_descriptor(),
        );
        registry.register(
            FnMember::<Self>::indexer(ValueType::Any)
                .with_indexed_getter(|m, args| {
                    let (key, n) = index_key(args)?;
                    Ok(m.indexed(&key, n))
                })
                .with_indexed_setter(|m, args, v| {
                    let (key, n) = index_key(args)?;
                    m.set_indexed(&key, n, v);
                    Ok(())
                })
                .into_descriptor(),
        );
        registry.register(
            FnMember::<Self>::property(ENABLED_MEMBER, ValueType::Bool)
                .with_getter(|m| Value::Bool(m.enabled()))
                .with_setter(|m, v| {
                    m.set_enabled(expect_bool(&v)?);
                    Ok(())
                })
                .into_descriptor(),
        );
        registry.register(
            FnMember::<Self>::property("Command", ValueType::Command)
                .with_getter(Self::command)
                .with_setter(|m, v| {
                    m.set_command(v);
                    Ok(())
                })
                .into_descriptor(),
        );
        registry.register(
            FnMember::<Self>::property("ReadOnly", ValueType::Int)
                .with_getter(|m| Value::Int(m.int_property() * 2))
                .into_descriptor(),
        );
        registry.register(
            FnMember::<Self>::property("WriteOnly", ValueType::Int)
                .with_setter(|m, v| {
                    m.set_int_property(expect_int(&v)?);
                    Ok(())
                })
                .observable(false)
                .into_descriptor(),
        );
        registry.register(FnMember::<Self>::event("Click", |m| m.click.clone()).into_descriptor());
    }
}

impl Bindable for SourceModel {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn property_changed(&self) -> Option<&SubscriberRegistry<PropertyChanged>> {
        Some(&self.changed)
    }
}

/// Intermediate fixture object reached through `SourceModel.NestedModel`.
pub struct NestedModel {
    int_property: Cell<i64>,
    string_property: RefCell<Value>,
    indexed: RefCell<AHashMap<String, Value>>,
    changed: SubscriberRegistry<PropertyChanged>,
}

impl NestedModel {
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            int_property: Cell::new(0),
            string_property: RefCell::new(Value::Null),
            indexed: RefCell::new(AHashMap::new()),
            changed: SubscriberRegistry::new(),
        })
    }

    #[must_use]
    pub fn with_int(value: i64) -> Rc<Self> {
        let nested = Self::new();
        nested.int_property.set(value);
        nested
    }

    pub fn raise(&self, name: &str) {
        self.changed.raise(&Value::Null, &PropertyChanged::new(name));
    }

    #[must_use]
    pub fn int_property(&self) -> i64 {
        self.int_property.get()
    }

    pub fn set_int_property(&self, value: i64) {
        if self.int_property.replace(value) != value {
            self.raise("IntProperty");
        }
    }

    #[must_use]
    pub fn string_property(&self) -> Value {
        self.string_property.borrow().clone()
    }

    pub fn set_string_property(&self, value: impl Into<Value>) {
        let value = value.into();
        if self.string_property.replace(value.clone()) != value {
            self.raise("StringProperty");
        }
    }

    pub fn set_indexed(&self, key: &str, value: impl Into<Value>) {
        self.indexed
            .borrow_mut()
            .insert(key.to_owned(), value.into());
        self.raise("Item[]");
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.changed.prune();
        self.changed.len()
    }

    pub fn register_members(registry: &MemberRegistry) {
        registry.register(
            FnMember::<Self>::property("IntProperty", ValueType::Int)
                .with_getter(|m| Value::Int(m.int_property()))
                .with_setter(|m, v| {
                    m.set_int_property(expect_int(&v)?);
                    Ok(())
                })
                .into_descriptor(),
        );
        registry.register(
            FnMember::<Self>::property("StringProperty", ValueType::Str)
                .with_getter(Self::string_property)
                .with_setter(|m, v| {
                    m.set_string_property(expect_str_or_null(v)?);
                    Ok(())
                })
                .into_descriptor(),
        );
        registry.register(
            FnMember::<Self>::indexer(ValueType::Any)
                .with_indexed_getter(|m, args| {
                    let (key, _) = index_key(args)?;
                    Ok(m.indexed.borrow().get(&key).cloned().unwrap_or(Value::Unset))
                })
                .with_indexed_setter(|m, args, v| {
                    let (key, _) = index_key(args)?;
                    m.set_indexed(&key, v);
                    Ok(())
                })
                .into_descriptor(),
        );
    }
}

impl Bindable for NestedModel {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn property_changed(&self) -> Option<&SubscriberRegistry<PropertyChanged>> {
        Some(&self.changed)
    }
}

/// Registry with collection defaults plus both fixture types.
#[must_use]
pub fn fixture_registry() -> Rc<MemberRegistry> {
    let registry = MemberRegistry::with_defaults();
    SourceModel::register_members(&registry);
    NestedModel::register_members(&registry);
    Rc::new(registry)
}
