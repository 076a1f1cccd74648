#![forbid(unsafe_code)]

//! Member descriptors and the member registry.
//!
//! Path segments are resolved by name through a [`MemberRegistry`]. The
//! registry holds *attached* descriptors registered explicitly (usually built
//! with [`FnMember`]) and falls back to pluggable [`MemberProvider`]s, which
//! stand in for a reflection or code-generation backend.
//!
//! # Invariants
//!
//! 1. Attached descriptors shadow provider results for the same
//!    `(type, name)` pair.
//! 2. Providers are consulted in registration order; the first hit wins.
//! 3. The runtime only reads descriptors. They are shared as
//!    `Rc<dyn MemberDescriptor>` and never mutated after registration.
//!
//! # Usage
//!
//! ```ignore
//! let registry = MemberRegistry::with_defaults();
//! registry.register(
//!     FnMember::<Person>::property("Name", ValueType::Str)
//!         .with_getter(|p| p.name())
//!         .with_setter(|p, v| p.set_name(v))
//!         .into_descriptor(),
//! );
//! ```

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use ahash::AHashMap;

use crate::collection::ObservableList;
use crate::error::{BindError, Result};
use crate::notify::PropertyChanged;
use crate::subscriber::{Subscriber, SubscriberRegistry, Subscription};
use crate::value::{Bindable, TypeKey, Value, ValueType};

/// Name under which indexers are registered.
pub const INDEXER_MEMBER: &str = "Item[]";

/// Conventional boolean member toggled by command endpoints.
pub const ENABLED_MEMBER: &str = "Enabled";

/// What a member is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Property,
    Event,
    Method,
}

/// Metadata and accessors for one named member of a type.
pub trait MemberDescriptor {
    fn name(&self) -> &str;

    fn kind(&self) -> MemberKind;

    /// Declared type of the member's value.
    fn value_type(&self) -> ValueType;

    /// Type the member belongs to.
    fn declaring_type(&self) -> TypeKey;

    fn can_read(&self) -> bool;

    fn can_write(&self) -> bool;

    /// Whether the owner raises [`PropertyChanged`] for this member.
    fn supports_notification(&self) -> bool;

    /// Read the member on `target`. `args` carries indexer arguments.
    fn get_value(&self, target: &Value, args: &[Value]) -> Result<Value>;

    /// Write the member on `target`.
    fn set_value(&self, target: &Value, args: &[Value], value: Value) -> Result<()>;

    /// Watch `target` for changes of this member.
    ///
    /// The default attaches to the target object's `property_changed`
    /// registry. `None` means the link cannot notify.
    fn observe(
        &self,
        target: &Value,
        subscriber: Rc<dyn Subscriber<PropertyChanged>>,
    ) -> Option<Subscription> {
        if !self.supports_notification() {
            return None;
        }
        let registry = target.as_object()?.property_changed()?;
        Some(registry.subscribe(subscriber))
    }

    /// Attach `subscriber` to the event this member represents.
    fn subscribe_event(
        &self,
        target: &Value,
        subscriber: Rc<dyn Subscriber<Value>>,
    ) -> Result<Subscription> {
        let _ = (target, subscriber);
        Err(BindError::InvalidTarget {
            expected: "event member".into(),
            found: format!("{:?} '{}'", self.kind(), self.name()),
        })
    }
}

impl fmt::Debug for dyn MemberDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberDescriptor")
            .field("type", &self.declaring_type())
            .field("name", &self.name())
            .field("kind", &self.kind())
            .field("value_type", &self.value_type())
            .finish()
    }
}

type Getter<T> = Rc<dyn Fn(&T, &[Value]) -> Result<Value>>;
type Setter<T> = Rc<dyn Fn(&T, &[Value], Value) -> Result<()>>;
type EventSource<T> = Rc<dyn Fn(&T) -> SubscriberRegistry<Value>>;

/// Closure-backed descriptor for members of `T`.
pub struct FnMember<T: Bindable> {
    name: String,
    kind: MemberKind,
    value_type: ValueType,
    getter: Option<Getter<T>>,
    setter: Option<Setter<T>>,
    event: Option<EventSource<T>>,
    observable: bool,
    _owner: PhantomData<fn(&T)>,
}

impl<T: Bindable> FnMember<T> {
    fn blank(name: &str, kind: MemberKind, value_type: ValueType) -> Self {
        Self {
            name: name.to_owned(),
            kind,
            value_type,
            getter: None,
            setter: None,
            event: None,
            observable: kind == MemberKind::Property,
            _owner: PhantomData,
        }
    }

    /// A property. Observable unless turned off with [`observable`](Self::observable).
    #[must_use]
    pub fn property(name: &str, value_type: ValueType) -> Self {
        Self::blank(name, MemberKind::Property, value_type)
    }

    /// The indexer, registered as [`INDEXER_MEMBER`].
    #[must_use]
    pub fn indexer(value_type: ValueType) -> Self {
        Self::blank(INDEXER_MEMBER, MemberKind::Property, value_type)
    }

    /// A method invoked on read with the indexer-style argument list.
    #[must_use]
    pub fn method(
        name: &str,
        value_type: ValueType,
        call: impl Fn(&T, &[Value]) -> Result<Value> + 'static,
    ) -> Self {
        let mut member = Self::blank(name, MemberKind::Method, value_type);
        member.getter = Some(Rc::new(call));
        member
    }

    /// An event whose registry is produced by `source`.
    #[must_use]
    pub fn event(name: &str, source: impl Fn(&T) -> SubscriberRegistry<Value> + 'static) -> Self {
        let mut member = Self::blank(name, MemberKind::Event, ValueType::Any);
        member.event = Some(Rc::new(source));
        member
    }

    #[must_use]
    pub fn with_getter(mut self, get: impl Fn(&T) -> Value + 'static) -> Self {
        self.getter = Some(Rc::new(move |target: &T, _: &[Value]| Ok(get(target))));
        self
    }

    #[must_use]
    pub fn with_setter(mut self, set: impl Fn(&T, Value) -> Result<()> + 'static) -> Self {
        self.setter = Some(Rc::new(move |target: &T, _: &[Value], value: Value| {
            set(target, value)
        }));
        self
    }

    #[must_use]
    pub fn with_indexed_getter(
        mut self,
        get: impl Fn(&T, &[Value]) -> Result<Value> + 'static,
    ) -> Self {
        self.getter = Some(Rc::new(get));
        self
    }

    #[must_use]
    pub fn with_indexed_setter(
        mut self,
        set: impl Fn(&T, &[Value], Value) -> Result<()> + 'static,
    ) -> Self {
        self.setter = Some(Rc::new(set));
        self
    }

    /// Whether the owner notifies changes of this member.
    #[must_use]
    pub fn observable(mut self, observable: bool) -> Self {
        self.observable = observable;
        self
    }

    #[must_use]
    pub fn into_descriptor(self) -> Rc<dyn MemberDescriptor> {
        Rc::new(self)
    }

    fn owner<'a>(&self, target: &'a Value) -> Result<&'a T> {
        target.downcast_ref::<T>().ok_or_else(|| BindError::InvalidTarget {
            expected: TypeKey::of::<T>().short_name().to_owned(),
            found: target.type_key().short_name().to_owned(),
        })
    }
}

impl<T: Bindable> MemberDescriptor for FnMember<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> MemberKind {
        self.kind
    }

    fn value_type(&self) -> ValueType {
        self.value_type
    }

    fn declaring_type(&self) -> TypeKey {
        TypeKey::of::<T>()
    }

    fn can_read(&self) -> bool {
        self.getter.is_some() || self.event.is_some()
    }

    fn can_write(&self) -> bool {
        self.setter.is_some()
    }

    fn supports_notification(&self) -> bool {
        self.observable
    }

    fn get_value(&self, target: &Value, args: &[Value]) -> Result<Value> {
        let owner = self.owner(target)?;
        match &self.getter {
            Some(get) => get(owner, args),
            None => Ok(Value::Unset),
        }
    }

    fn set_value(&self, target: &Value, args: &[Value], value: Value) -> Result<()> {
        let owner = self.owner(target)?;
        match &self.setter {
            Some(set) => set(owner, args, value),
            None => Err(BindError::MemberNotWritable {
                type_name: TypeKey::of::<T>().short_name().to_owned(),
                member: self.name.clone(),
            }),
        }
    }

    fn subscribe_event(
        &self,
        target: &Value,
        subscriber: Rc<dyn Subscriber<Value>>,
    ) -> Result<Subscription> {
        let owner = self.owner(target)?;
        match &self.event {
            Some(source) => Ok(source(owner).subscribe(subscriber)),
            None => Err(BindError::InvalidTarget {
                expected: "event member".into(),
                found: format!("{:?} '{}'", self.kind, self.name),
            }),
        }
    }
}

impl<T: Bindable> fmt::Debug for FnMember<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnMember")
            .field("type", &TypeKey::of::<T>())
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("value_type", &self.value_type)
            .field("observable", &self.observable)
            .finish()
    }
}

/// Source of descriptors discovered outside the registry, such as a
/// reflection or code-generation backend.
pub trait MemberProvider {
    fn resolve(&self, ty: TypeKey, name: &str) -> Option<Rc<dyn MemberDescriptor>>;
}

/// Registry of member descriptors, shared by observers and accessors.
///
/// Populate it at startup and share it as `Rc<MemberRegistry>`.
#[derive(Default)]
pub struct MemberRegistry {
    attached: RefCell<AHashMap<(TypeKey, String), Rc<dyn MemberDescriptor>>>,
    providers: RefCell<Vec<Rc<dyn MemberProvider>>>,
}

impl MemberRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in collection members.
    #[must_use]
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        ObservableList::register_members(&registry);
        registry
    }

    /// Attach `member` to its declaring type, replacing any previous one.
    pub fn register(&self, member: Rc<dyn MemberDescriptor>) {
        let ty = member.declaring_type();
        self.register_for(ty, member, true);
    }

    /// Attach `member` to `ty`. Without `rewrite`, an existing entry wins
    /// and `false` is returned.
    pub fn register_for(&self, ty: TypeKey, member: Rc<dyn MemberDescriptor>, rewrite: bool) -> bool {
        let key = (ty, member.name().to_owned());
        let mut attached = self.attached.borrow_mut();
        if !rewrite && attached.contains_key(&key) {
            return false;
        }
        tracing::trace!(ty = %ty, member = member.name(), "attached member");
        attached.insert(key, member);
        true
    }

    /// Remove an attached member. Provider results are unaffected.
    pub fn unregister(&self, ty: TypeKey, name: &str) -> bool {
        self.attached
            .borrow_mut()
            .remove(&(ty, name.to_owned()))
            .is_some()
    }

    /// Append a provider consulted after the attached members.
    pub fn add_provider(&self, provider: Rc<dyn MemberProvider>) {
        self.providers.borrow_mut().push(provider);
    }

    /// Look up a member without policy checks.
    #[must_use]
    pub fn find(&self, ty: TypeKey, name: &str) -> Option<Rc<dyn MemberDescriptor>> {
        if let Some(member) = self.attached.borrow().get(&(ty, name.to_owned())) {
            return Some(Rc::clone(member));
        }
        let providers = self.providers.borrow().clone();
        providers.iter().find_map(|p| p.resolve(ty, name))
    }

    /// Look up a member.
    ///
    /// A missing member, or a read-only one when `writable_required` is set,
    /// fails when `throw_if_missing` is set and yields `Ok(None)` otherwise.
    pub fn resolve(
        &self,
        ty: TypeKey,
        name: &str,
        writable_required: bool,
        throw_if_missing: bool,
    ) -> Result<Option<Rc<dyn MemberDescriptor>>> {
        match self.find(ty, name) {
            Some(member) if writable_required && !member.can_write() => {
                if throw_if_missing {
                    Err(BindError::MemberNotWritable {
                        type_name: ty.short_name().to_owned(),
                        member: name.to_owned(),
                    })
                } else {
                    Ok(None)
                }
            }
            Some(member) => Ok(Some(member)),
            None if throw_if_missing => Err(BindError::MemberNotFound {
                type_name: ty.short_name().to_owned(),
                member: name.to_owned(),
            }),
            None => Ok(None),
        }
    }

    /// Number of attached members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attached.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attached.borrow().is_empty()
    }
}

impl fmt::Debug for MemberRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberRegistry")
            .field("attached", &self.len())
            .field("providers", &self.providers.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;
    use std::cell::Cell;

    use crate::subscriber::DelegateSubscriber as DelegateSub;

    #[derive(Default)]
    struct Person {
        age: Cell<i64>,
        changed: SubscriberRegistry<PropertyChanged>,
    }

    impl Bindable for Person {
        fn as_any(&self) -> &dyn Any {
            self
        }

        fn property_changed(&self) -> Option<&SubscriberRegistry<PropertyChanged>> {
            Some(&self.changed)
        }
    }

    struct Other;

    impl Bindable for Other {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn age() -> Rc<dyn MemberDescriptor> {
        FnMember::<Person>::property("Age", ValueType::Int)
            .with_getter(|p| Value::Int(p.age.get()))
            .with_setter(|p, v| {
                let n = v
                    .as_int()
                    .ok_or_else(|| BindError::conversion(&v, ValueType::Int, "expected int"))?;
                p.age.set(n);
                Ok(())
            })
            .into_descriptor()
    }

    struct FixedProvider(Rc<dyn MemberDescriptor>);

    impl MemberProvider for FixedProvider {
        fn resolve(&self, ty: TypeKey, name: &str) -> Option<Rc<dyn MemberDescriptor>> {
            (ty == self.0.declaring_type() && name == self.0.name()).then(|| Rc::clone(&self.0))
        }
    }

    #[test]
    fn fn_member_reads_and_writes() {
        let person = Value::object(&Rc::new(Person::default()));
        let member = age();
        member.set_value(&person, &[], Value::Int(42)).unwrap();
        assert_eq!(member.get_value(&person, &[]).unwrap(), Value::Int(42));
    }

    #[test]
    fn fn_member_rejects_wrong_owner() {
        let other = Value::object(&Rc::new(Other));
        let err = age().get_value(&other, &[]).unwrap_err();
        assert!(matches!(err, BindError::InvalidTarget { .. }), "{err}");
    }

    #[test]
    fn read_only_member_refuses_write() {
        let person = Value::object(&Rc::new(Person::default()));
        let member = FnMember::<Person>::property("Age", ValueType::Int)
            .with_getter(|p| Value::Int(p.age.get()))
            .into_descriptor();
        assert!(!member.can_write());
        let err = member.set_value(&person, &[], Value::Int(1)).unwrap_err();
        assert!(matches!(err, BindError::MemberNotWritable { .. }));
    }

    #[test]
    fn resolve_policy_flags() {
        let registry = MemberRegistry::new();
        registry.register(age());
        let ty = TypeKey::of::<Person>();
        assert!(registry.resolve(ty, "Age", true, true).unwrap().is_some());
        assert!(registry.resolve(ty, "Missing", false, false).unwrap().is_none());
        let err = registry.resolve(ty, "Missing", false, true).unwrap_err();
        assert_eq!(
            err,
            BindError::MemberNotFound {
                type_name: "Person".into(),
                member: "Missing".into()
            }
        );
    }

    #[test]
    fn writable_required_filters_read_only() {
        let registry = MemberRegistry::new();
        registry.register(
            FnMember::<Person>::property("Age", ValueType::Int)
                .with_getter(|p| Value::Int(p.age.get()))
                .into_descriptor(),
        );
        let ty = TypeKey::of::<Person>();
        assert!(registry.resolve(ty, "Age", true, false).unwrap().is_none());
        assert!(matches!(
            registry.resolve(ty, "Age", true, true),
            Err(BindError::MemberNotWritable { .. })
        ));
    }

    #[test]
    fn attached_shadows_provider() {
        let registry = MemberRegistry::new();
        let from_provider = age();
        registry.add_provider(Rc::new(FixedProvider(Rc::clone(&from_provider))));
        let ty = TypeKey::of::<Person>();
        let found = registry.find(ty, "Age").unwrap();
        assert!(Rc::ptr_eq(&found, &from_provider));

        let attached = age();
        registry.register(Rc::clone(&attached));
        let found = registry.find(ty, "Age").unwrap();
        assert!(Rc::ptr_eq(&found, &attached));
    }

    #[test]
    fn register_without_rewrite_keeps_existing() {
        let registry = MemberRegistry::new();
        let first = age();
        let ty = TypeKey::of::<Person>();
        assert!(registry.register_for(ty, Rc::clone(&first), false));
        assert!(!registry.register_for(ty, age(), false));
        assert!(Rc::ptr_eq(&registry.find(ty, "Age").unwrap(), &first));
        assert!(registry.unregister(ty, "Age"));
        assert!(registry.is_empty());
    }

    #[test]
    fn observe_uses_property_changed_registry() {
        let person = Rc::new(Person::default());
        let value = Value::object(&person);
        let hits = Rc::new(Cell::new(0));
        let hits_in = Rc::clone(&hits);
        let handler: Rc<dyn Fn(&Value, &PropertyChanged)> =
            Rc::new(move |_, _| hits_in.set(hits_in.get() + 1));
        let sub = DelegateSub::new(&handler, |h, s, m| {
            h(s, m);
            true
        });
        let guard = age().observe(&value, sub.into_rc()).unwrap();
        person.changed.raise(&Value::Null, &PropertyChanged::new("Age"));
        assert_eq!(hits.get(), 1);
        drop(guard);
        assert!(person.changed.is_empty());
    }

    #[test]
    fn non_observable_member_does_not_observe() {
        let person = Rc::new(Person::default());
        let value = Value::object(&person);
        let member = FnMember::<Person>::property("Age", ValueType::Int)
            .observable(false)
            .into_descriptor();
        let handler: Rc<dyn Fn(&Value, &PropertyChanged)> = Rc::new(|_, _| {});
        let sub = DelegateSub::new(&handler, |_, _, _| true);
        assert!(member.observe(&value, sub.into_rc()).is_none());
    }

    #[test]
    fn event_member_subscribes() {
        #[derive(Default)]
        struct Button {
            click: SubscriberRegistry<Value>,
        }
        impl Bindable for Button {
            fn as_any(&self) -> &dyn Any {
                self
            }
        }
        let button = Rc::new(Button::default());
        let member = FnMember::<Button>::event("Click", |b| b.click.clone()).into_descriptor();
        assert_eq!(member.kind(), MemberKind::Event);
        let clicks = Rc::new(Cell::new(0));
        let clicks_in = Rc::clone(&clicks);
        let handler: Rc<dyn Fn(&Value, &Value)> =
            Rc::new(move |_, _| clicks_in.set(clicks_in.get() + 1));
        let sub = DelegateSub::new(&handler, |h, s, m| {
            h(s, m);
            true
        });
        let _guard = member
            .subscribe_event(&Value::object(&button), sub.into_rc())
            .unwrap();
        button.click.raise(&Value::Null, &Value::Null);
        assert_eq!(clicks.get(), 1);
    }

    #[test]
    fn defaults_include_collection_members() {
        let registry = MemberRegistry::with_defaults();
        let ty = TypeKey::of::<ObservableList>();
        assert!(registry.find(ty, INDEXER_MEMBER).is_some());
        assert!(registry.find(ty, "Count").is_some());
    }
}
