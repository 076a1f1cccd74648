#![forbid(unsafe_code)]

//! Dynamic values flowing through paths, accessors, and converters.
//!
//! # Design
//!
//! [`Value`] is a small tagged union. Objects are shared `Rc<dyn Bindable>`
//! handles compared by identity; everything else compares by value. The two
//! sentinels [`Value::Unset`] and [`Value::DoNothing`] carry pipeline control
//! meaning and are never equal to [`Value::Null`].
//!
//! [`WeakValue`] is the non-owning counterpart used wherever the runtime must
//! remember an object without keeping it alive (observer roots, chain links).

use std::any::{Any, TypeId};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::command::Command;
use crate::member::MemberDescriptor;
use crate::notify::PropertyChanged;
use crate::subscriber::{Subscriber, SubscriberRegistry, Subscription};

/// Runtime type identity used as the member-registry key.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Key for a concrete type.
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Fully qualified type name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Last path component of the type name (`"SourceModel"` rather than
    /// `"my_crate::models::SourceModel"`).
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        let start = base.rfind("::").map_or(0, |i| i + 2);
        &self.name[start..]
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl std::hash::Hash for TypeKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// An object that can be the root or an intermediate link of a path.
///
/// Implementors expose themselves as `Any` for typed member access and may
/// opt into change notification and command semantics.
pub trait Bindable: Any {
    /// Upcast for downcasting in typed descriptors.
    fn as_any(&self) -> &dyn Any;

    /// Type identity used for member lookup.
    fn type_key(&self) -> TypeKey {
        TypeKey::of::<Self>()
    }

    /// Registry raising [`PropertyChanged`] when a member of this object
    /// changes. `None` means the object never notifies.
    fn property_changed(&self) -> Option<&SubscriberRegistry<PropertyChanged>> {
        None
    }

    /// Command view of this object, if it is command-shaped.
    fn as_command(&self) -> Option<&dyn Command> {
        None
    }
}

/// Declared type of a member, used for coercion and default values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Any value, nullable.
    Any,
    /// Boolean, non-nullable.
    Bool,
    /// 64-bit signed integer, non-nullable.
    Int,
    /// 64-bit float, non-nullable.
    Float,
    /// String, nullable.
    Str,
    /// Any object reference, nullable.
    Object,
    /// Command-shaped object reference, nullable.
    Command,
}

impl ValueType {
    /// Whether `Null` is a legal value of this type.
    #[must_use]
    pub fn is_nullable(self) -> bool {
        !matches!(self, Self::Bool | Self::Int | Self::Float)
    }

    /// Zero value for non-nullable types, `Null` otherwise.
    #[must_use]
    pub fn default_value(self) -> Value {
        match self {
            Self::Bool => Value::Bool(false),
            Self::Int => Value::Int(0),
            Self::Float => Value::Float(0.0),
            _ => Value::Null,
        }
    }

    /// Whether `value` already satisfies this type without coercion.
    ///
    /// Sentinels are accepted by every type: they never reach a setter.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Unset | Value::DoNothing) | (Self::Any, _) => true,
            (_, Value::Null) => self.is_nullable(),
            (Self::Bool, Value::Bool(_))
            | (Self::Int, Value::Int(_))
            | (Self::Float, Value::Float(_))
            | (Self::Str, Value::Str(_))
            | (Self::Object, Value::Object(_)) => true,
            (Self::Command, Value::Object(obj)) => obj.as_command().is_some(),
            _ => false,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Any => "any",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "string",
            Self::Object => "object",
            Self::Command => "command",
        };
        f.write_str(name)
    }
}

/// Handle to an event member on a live object.
///
/// Produced when a path terminates in an event; consumers use it to attach
/// listeners without the path machinery invoking anything.
#[derive(Clone)]
pub struct MemberValue {
    owner: Rc<dyn Bindable>,
    member: Rc<dyn MemberDescriptor>,
}

impl MemberValue {
    /// Pair an owner with one of its members.
    #[must_use]
    pub fn new(owner: Rc<dyn Bindable>, member: Rc<dyn MemberDescriptor>) -> Self {
        Self { owner, member }
    }

    /// Object declaring the member.
    #[must_use]
    pub fn owner(&self) -> &Rc<dyn Bindable> {
        &self.owner
    }

    /// The member descriptor.
    #[must_use]
    pub fn member(&self) -> &Rc<dyn MemberDescriptor> {
        &self.member
    }

    /// Attach `subscriber` to the event on the owner.
    pub fn subscribe(&self, subscriber: Rc<dyn Subscriber<Value>>) -> crate::Result<Subscription> {
        self.member
            .subscribe_event(&Value::Object(Rc::clone(&self.owner)), subscriber)
    }
}

impl PartialEq for MemberValue {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.owner, &other.owner) && Rc::ptr_eq(&self.member, &other.member)
    }
}

impl fmt::Debug for MemberValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberValue")
            .field("owner", &self.owner.type_key())
            .field("member", &self.member.name())
            .field("kind", &self.member.kind())
            .finish()
    }
}

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    /// Absence of a value.
    #[default]
    Null,
    /// No value was produced; triggers fallback handling.
    Unset,
    /// Skip the write entirely.
    DoNothing,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Floating point.
    Float(f64),
    /// Immutable string.
    Str(Rc<str>),
    /// Shared object, compared by identity.
    Object(Rc<dyn Bindable>),
    /// Event handle produced by event-terminated paths.
    Member(MemberValue),
}

impl Value {
    /// Wrap a shared object.
    #[must_use]
    pub fn object<T: Bindable>(obj: &Rc<T>) -> Self {
        Self::Object(Rc::clone(obj) as Rc<dyn Bindable>)
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    #[must_use]
    pub fn is_do_nothing(&self) -> bool {
        matches!(self, Self::DoNothing)
    }

    /// `Unset` or `DoNothing`.
    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        matches!(self, Self::Unset | Self::DoNothing)
    }

    /// `Null` or `Unset`: nothing to navigate through.
    #[must_use]
    pub fn is_empty_link(&self) -> bool {
        matches!(self, Self::Null | Self::Unset)
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(x) => Some(*x),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&Rc<dyn Bindable>> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_member(&self) -> Option<&MemberValue> {
        match self {
            Self::Member(m) => Some(m),
            _ => None,
        }
    }

    /// Borrow the object as a concrete type.
    #[must_use]
    pub fn downcast_ref<T: Bindable>(&self) -> Option<&T> {
        self.as_object()?.as_any().downcast_ref::<T>()
    }

    /// Command view of an object value.
    #[must_use]
    pub fn as_command(&self) -> Option<&dyn Command> {
        self.as_object()?.as_command()
    }

    /// Type identity of the value for member lookup.
    #[must_use]
    pub fn type_key(&self) -> TypeKey {
        match self {
            Self::Null | Self::Unset | Self::DoNothing => TypeKey::of::<()>(),
            Self::Bool(_) => TypeKey::of::<bool>(),
            Self::Int(_) => TypeKey::of::<i64>(),
            Self::Float(_) => TypeKey::of::<f64>(),
            Self::Str(_) => TypeKey::of::<str>(),
            Self::Object(obj) => obj.type_key(),
            Self::Member(_) => TypeKey::of::<MemberValue>(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null)
            | (Self::Unset, Self::Unset)
            | (Self::DoNothing, Self::DoNothing) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
            (Self::Member(a), Self::Member(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Unset => f.write_str("Unset"),
            Self::DoNothing => f.write_str("DoNothing"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x:?}"),
            Self::Str(s) => write!(f, "{:?}", &**s),
            Self::Object(obj) => write!(f, "<{}@{:p}>", obj.type_key(), Rc::as_ptr(obj)),
            Self::Member(m) => fmt::Debug::fmt(m, f),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(Rc::from(s))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl From<Rc<dyn Bindable>> for Value {
    fn from(obj: Rc<dyn Bindable>) -> Self {
        Self::Object(obj)
    }
}

/// Non-owning handle to a value.
///
/// Objects are held weakly; other values are cheap to copy and held directly.
#[derive(Clone)]
pub enum WeakValue {
    /// A weakly held object.
    Object(Weak<dyn Bindable>),
    /// A non-object value held by value.
    Value(Value),
}

impl WeakValue {
    /// Downgrade a value.
    #[must_use]
    pub fn new(value: &Value) -> Self {
        match value {
            Value::Object(obj) => Self::Object(Rc::downgrade(obj)),
            other => Self::Value(other.clone()),
        }
    }

    /// Recover the value; a reclaimed object yields [`Value::Unset`].
    #[must_use]
    pub fn upgrade(&self) -> Value {
        match self {
            Self::Object(weak) => weak.upgrade().map_or(Value::Unset, Value::Object),
            Self::Value(v) => v.clone(),
        }
    }

    /// Whether the referent still exists.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        match self {
            Self::Object(weak) => weak.strong_count() > 0,
            Self::Value(_) => true,
        }
    }
}

impl fmt::Debug for WeakValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object(weak) => write!(f, "Weak(alive: {})", weak.strong_count() > 0),
            Self::Value(v) => fmt::Debug::fmt(v, f),
        }
    }
}
