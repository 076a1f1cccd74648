#![forbid(unsafe_code)]

//! Source/target accessor: one endpoint of a binding.
//!
//! A [`BindingSourceAccessor`] wraps a [`PathObserver`] (or a literal) with
//! the conversion pipeline of a [`BindingConfig`] and exposes cancelable
//! change events around writes.
//!
//! # Read pipeline
//!
//! ```text
//! Source role: resolve ─▶ convert ─▶ Unset? fallback/type default ─▶ Null? target-null value
//! Target role: resolve ─▶ == target-null value? Null ─▶ convert_back
//! ```
//!
//! # Write pipeline
//!
//! ```text
//! counterpart.get_value(member type) ─▶ sentinel? stop ─▶ coerce ─▶ equal? stop
//!     ─▶ ValueChanging (cancelable) ─▶ setter ─▶ last value ─▶ ValueChanged
//! ```
//!
//! # Invariants
//!
//! 1. `ValueChanged` is never raised without a preceding, non-canceled
//!    `ValueChanging` for the same transition.
//! 2. Writing `DoNothing` or `Unset` touches nothing and raises nothing.
//! 3. The last known value is updated before `ValueChanged` is raised, so a
//!    re-entrant write of the same value is a no-op.
//! 4. At most one command is subscribed per accessor.
//!
//! # State machine
//!
//! `Uninitialized -> Bound -> {Updating -> Bound}* -> Disposed`

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use fbind_core::{
    BindError, MemberDescriptor, MemberKind, MemberRegistry, MemberValue, Path, Result,
    Subscriber, SubscriberRegistry, Subscription, Value, ValueType,
};

use crate::command_adapter::CommandAdapter;
use crate::config::{BindingConfig, DataContext};
use crate::convert::{ConversionRequest, coerce};
use crate::culture::Culture;
use crate::observer::{PathChanged, PathMembers, PathObserver};

/// Which side of a binding an accessor represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessorRole {
    /// Model side. Reads apply `convert`.
    Source,
    /// View side. Reads apply `convert_back`.
    Target,
}

/// Lifecycle of an accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessorState {
    Uninitialized,
    Bound,
    Updating,
    Disposed,
}

/// Cancelable notification raised before a write.
#[derive(Debug)]
pub struct ValueChangingArgs {
    pub old_value: Value,
    pub new_value: Value,
    cancel: Cell<bool>,
}

impl ValueChangingArgs {
    #[must_use]
    pub fn new(old_value: Value, new_value: Value) -> Self {
        Self {
            old_value,
            new_value,
            cancel: Cell::new(false),
        }
    }

    /// Abort the write.
    pub fn cancel(&self) {
        self.cancel.set(true);
    }

    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.cancel.get()
    }
}

/// Notification raised after a write.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueChangedArgs {
    pub old_value: Value,
    pub new_value: Value,
}

/// Anything `set_value` can read its new value from.
pub trait ValueSource {
    /// Current value converted for a member of type `target_type`.
    ///
    /// # Errors
    ///
    /// Resolution or conversion failures when `throw_on_error` is set.
    fn get_value(
        &self,
        target_type: ValueType,
        context: &DataContext,
        throw_on_error: bool,
    ) -> Result<Value>;
}

impl ValueSource for Value {
    fn get_value(&self, _: ValueType, _: &DataContext, _: bool) -> Result<Value> {
        Ok(self.clone())
    }
}

enum Endpoint {
    Path(PathObserver),
    Literal(Value),
}

struct AccessorInner {
    endpoint: Endpoint,
    role: AccessorRole,
    config: BindingConfig,
    state: Cell<AccessorState>,
    last_value: RefCell<Value>,
    changing: SubscriberRegistry<ValueChangingArgs>,
    changed: SubscriberRegistry<ValueChangedArgs>,
    endpoint_changed: SubscriberRegistry<PathChanged>,
    observer_sub: RefCell<Option<Subscription>>,
    command: RefCell<Option<Rc<CommandAdapter>>>,
    this: Weak<AccessorInner>,
}

impl AccessorInner {
    fn observer(&self) -> Option<&PathObserver> {
        match &self.endpoint {
            Endpoint::Path(observer) => Some(observer),
            Endpoint::Literal(_) => None,
        }
    }

    fn sender(&self) -> Value {
        self.observer().map_or(Value::Null, PathObserver::root)
    }

    fn is_disposed(&self) -> bool {
        self.state.get() == AccessorState::Disposed
    }

    fn raw_value(&self, strict: bool) -> Result<Value> {
        match &self.endpoint {
            Endpoint::Literal(value) => Ok(value.clone()),
            Endpoint::Path(observer) => observer.resolve(strict),
        }
    }

    fn request<'a>(
        &'a self,
        target_type: ValueType,
        culture: &'a Culture,
        context: &'a DataContext,
    ) -> ConversionRequest<'a> {
        ConversionRequest {
            target_type,
            parameter: &self.config.converter_parameter,
            culture,
            context,
        }
    }

    fn get_value(
        &self,
        target_type: ValueType,
        context: &DataContext,
        throw_on_error: bool,
    ) -> Result<Value> {
        if self.is_disposed() {
            return if throw_on_error {
                Err(BindError::Disposed)
            } else {
                Ok(Value::Null)
            };
        }
        let raw = match self.raw_value(throw_on_error) {
            Ok(raw) => raw,
            Err(err) if throw_on_error => return Err(err),
            Err(err) => {
                tracing::trace!(error = %err, "endpoint read failed");
                return Ok(Value::Null);
            }
        };
        *self.last_value.borrow_mut() = raw.clone();
        if matches!(raw, Value::Member(_)) {
            return Ok(raw);
        }
        let converted = match self.role {
            AccessorRole::Source => self.read_source(raw, target_type, context),
            AccessorRole::Target => self.read_target(raw, target_type, context),
        };
        match converted {
            Ok(value) => Ok(value),
            Err(err) if throw_on_error => Err(err),
            Err(err) => {
                tracing::trace!(error = %err, "conversion failed on read");
                Ok(Value::Null)
            }
        }
    }

    fn read_source(
        &self,
        raw: Value,
        target_type: ValueType,
        context: &DataContext,
    ) -> Result<Value> {
        let culture = self.config.effective_culture();
        let mut value = match &self.config.converter {
            Some(converter) => converter
                .convert(&raw, &self.request(target_type, &culture, context))
                .unwrap_or(Ok(raw))?,
            None => raw,
        };
        if value.is_unset() {
            value = self
                .config
                .fallback
                .clone()
                .unwrap_or_else(|| target_type.default_value());
        }
        let null = value.is_null();
        if let Some(target_null) = self.config.target_null_value.as_ref().filter(|_| null) {
            value = target_null.clone();
        }
        Ok(value)
    }

    fn read_target(
        &self,
        raw: Value,
        target_type: ValueType,
        context: &DataContext,
    ) -> Result<Value> {
        let value = match &self.config.target_null_value {
            Some(target_null) if *target_null == raw => Value::Null,
            _ => raw,
        };
        let culture = self.config.effective_culture();
        match &self.config.converter {
            Some(converter) => converter
                .convert_back(&value, &self.request(target_type, &culture, context))
                .unwrap_or(Ok(value)),
            None => Ok(value),
        }
    }

    fn set_value(
        &self,
        counterpart: &dyn ValueSource,
        context: &DataContext,
        throw_on_error: bool,
    ) -> Result<bool> {
        if self.is_disposed() {
            return if throw_on_error {
                Err(BindError::Disposed)
            } else {
                Ok(false)
            };
        }
        let Some(observer) = self.observer() else {
            return if throw_on_error {
                Err(BindError::InvalidTarget {
                    expected: "path endpoint".into(),
                    found: "literal".into(),
                })
            } else {
                Ok(false)
            };
        };
        let (source, member, args) = match observer.path_members(throw_on_error)? {
            PathMembers::Unavailable { depth } if throw_on_error => {
                return Err(BindError::TargetNullReference {
                    path: observer.path().to_text(),
                    depth,
                });
            }
            PathMembers::Unavailable { .. } => return Ok(false),
            PathMembers::Available {
                source,
                member,
                args,
            } => (source, member, args),
        };

        if member.kind() == MemberKind::Event {
            let command = counterpart.get_value(ValueType::Command, context, throw_on_error)?;
            return self.bind_event_command(&source, &member, command, context, throw_on_error);
        }

        let value_type = member.value_type();
        let new_value = counterpart.get_value(value_type, context, throw_on_error)?;
        if new_value.is_sentinel() {
            tracing::trace!(path = %observer.path(), value = ?new_value, "sentinel write skipped");
            return Ok(false);
        }
        let new_value = match self.coerce_for(new_value, value_type) {
            Ok(value) => value,
            Err(err) if throw_on_error => return Err(err),
            Err(err) => {
                tracing::trace!(error = %err, "conversion failed on write");
                return Ok(false);
            }
        };
        if !member.can_write() {
            return if throw_on_error {
                Err(BindError::MemberNotWritable {
                    type_name: source.type_key().short_name().to_owned(),
                    member: member.name().to_owned(),
                })
            } else {
                Ok(false)
            };
        }

        let old_value = self.old_value(&source, member.as_ref(), &args);
        if old_value == new_value {
            if value_type == ValueType::Command {
                self.track_command(&source, new_value, context, throw_on_error)?;
            }
            return Ok(false);
        }

        let changing = ValueChangingArgs::new(old_value.clone(), new_value.clone());
        let sender = self.sender();
        self.changing.raise(&sender, &changing);
        if changing.is_canceled() {
            tracing::debug!(path = %observer.path(), "value change canceled");
            return Ok(false);
        }

        let previous = self.state.replace(AccessorState::Updating);
        let written = member.set_value(&source, &args, new_value.clone());
        self.state.set(match previous {
            AccessorState::Updating => AccessorState::Updating,
            AccessorState::Disposed => AccessorState::Disposed,
            _ => AccessorState::Bound,
        });
        if let Err(err) = written {
            if throw_on_error {
                return Err(err);
            }
            tracing::trace!(error = %err, "setter failed");
            return Ok(false);
        }

        *self.last_value.borrow_mut() = new_value.clone();
        if value_type == ValueType::Command {
            self.track_command(&source, new_value.clone(), context, throw_on_error)?;
        }
        self.changed.raise(
            &sender,
            &ValueChangedArgs {
                old_value,
                new_value,
            },
        );
        Ok(true)
    }

    fn coerce_for(&self, value: Value, value_type: ValueType) -> Result<Value> {
        if matches!(value, Value::Member(_)) {
            return Ok(value);
        }
        if self.config.auto_convert {
            return coerce(value, value_type, &self.config.effective_culture());
        }
        if value_type.accepts(&value) {
            Ok(value)
        } else {
            Err(BindError::conversion(
                &value,
                value_type,
                "automatic conversion is disabled",
            ))
        }
    }

    fn old_value(&self, source: &Value, member: &dyn MemberDescriptor, args: &[Value]) -> Value {
        let current = if member.can_read() {
            member.get_value(source, args).ok()
        } else {
            None
        };
        match current {
            Some(value) if !value.is_unset() => value,
            _ => self.last_value.borrow().clone(),
        }
    }

    /// Adapter for `owner`, replacing one bound to a different object.
    fn command_adapter(&self, owner: &Value) -> Option<Rc<CommandAdapter>> {
        let observer = self.observer()?;
        let mut slot = self.command.borrow_mut();
        if let Some(adapter) = slot.as_ref().filter(|adapter| adapter.target() == *owner) {
            return Some(Rc::clone(adapter));
        }
        if let Some(stale) = slot.take() {
            stale.detach();
        }
        let adapter = CommandAdapter::new(
            Rc::clone(observer.registry()),
            owner,
            self.config.clone(),
        );
        *slot = Some(Rc::clone(&adapter));
        Some(adapter)
    }

    fn track_command(
        &self,
        owner: &Value,
        command: Value,
        context: &DataContext,
        throw_on_error: bool,
    ) -> Result<()> {
        let Some(adapter) = self.command_adapter(owner) else {
            return Ok(());
        };
        match adapter.set_command(command, context) {
            Err(err) if throw_on_error => Err(err),
            Err(err) => {
                tracing::warn!(error = %err, "command binding failed");
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    fn bind_event_command(
        &self,
        owner: &Value,
        member: &Rc<dyn MemberDescriptor>,
        command: Value,
        context: &DataContext,
        throw_on_error: bool,
    ) -> Result<bool> {
        if command.is_sentinel() {
            return Ok(false);
        }
        let Some(adapter) = self.command_adapter(owner) else {
            return Ok(false);
        };
        let Some(object) = owner.as_object() else {
            return Ok(false);
        };
        let handle = MemberValue::new(Rc::clone(object), Rc::clone(member));
        let bound = adapter
            .bind_event(&handle)
            .and_then(|()| adapter.set_command(command, context));
        match bound {
            Ok(()) => Ok(true),
            Err(err) if throw_on_error => Err(err),
            Err(err) => {
                tracing::warn!(error = %err, event = member.name(), "event command binding failed");
                Ok(false)
            }
        }
    }

    fn bind(&self) {
        if self.state.get() != AccessorState::Uninitialized {
            return;
        }
        if let Some(observer) = self.observer() {
            observer.subscribe();
            let weak = self.this.clone();
            let subscription = observer.on_changed(move |change| {
                if let Some(inner) = weak.upgrade() {
                    let sender = inner.sender();
                    inner.endpoint_changed.raise(&sender, change);
                }
            });
            *self.observer_sub.borrow_mut() = Some(subscription);
        }
        self.state.set(AccessorState::Bound);
    }

    fn dispose(&self) {
        if self.state.replace(AccessorState::Disposed) == AccessorState::Disposed {
            return;
        }
        let subscription = self.observer_sub.borrow_mut().take();
        drop(subscription);
        if let Some(observer) = self.observer() {
            observer.dispose();
        }
        if let Some(adapter) = self.command.borrow_mut().take() {
            adapter.detach();
        }
        self.changing.clear();
        self.changed.clear();
        self.endpoint_changed.clear();
        tracing::trace!("accessor disposed");
    }
}

/// One endpoint of a binding.
pub struct BindingSourceAccessor {
    inner: Rc<AccessorInner>,
}

impl BindingSourceAccessor {
    fn from_endpoint(endpoint: Endpoint, role: AccessorRole, config: BindingConfig) -> Self {
        let inner = Rc::new_cyclic(|this| AccessorInner {
            endpoint,
            role,
            config,
            state: Cell::new(AccessorState::Uninitialized),
            last_value: RefCell::new(Value::Unset),
            changing: SubscriberRegistry::new(),
            changed: SubscriberRegistry::new(),
            endpoint_changed: SubscriberRegistry::new(),
            observer_sub: RefCell::new(None),
            command: RefCell::new(None),
            this: this.clone(),
        });
        Self { inner }
    }

    /// Unbound accessor over `path` from `root`.
    #[must_use]
    pub fn new(
        registry: Rc<MemberRegistry>,
        root: &Value,
        path: Arc<Path>,
        role: AccessorRole,
        config: BindingConfig,
    ) -> Self {
        let observer = PathObserver::new(registry, root, path);
        Self::from_endpoint(Endpoint::Path(observer), role, config)
    }

    /// Parse `text` and build an unbound accessor.
    ///
    /// # Errors
    ///
    /// [`BindError::MalformedPath`] if `text` does not parse.
    pub fn from_text(
        registry: Rc<MemberRegistry>,
        root: &Value,
        text: &str,
        role: AccessorRole,
        config: BindingConfig,
    ) -> Result<Self> {
        let path = Path::parse(text)?;
        Ok(Self::new(registry, root, path, role, config))
    }

    /// Read-only source producing `value`.
    #[must_use]
    pub fn literal(value: impl Into<Value>, config: BindingConfig) -> Self {
        Self::from_endpoint(
            Endpoint::Literal(value.into()),
            AccessorRole::Source,
            config,
        )
    }

    /// Subscribe the underlying observer and start forwarding its changes.
    pub fn bind(&self) {
        self.inner.bind();
    }

    #[must_use]
    pub fn role(&self) -> AccessorRole {
        self.inner.role
    }

    #[must_use]
    pub fn state(&self) -> AccessorState {
        self.inner.state.get()
    }

    #[must_use]
    pub fn config(&self) -> &BindingConfig {
        &self.inner.config
    }

    /// Path of a path endpoint.
    #[must_use]
    pub fn path(&self) -> Option<&Arc<Path>> {
        self.inner.observer().map(PathObserver::path)
    }

    /// Declared type of the terminal member, `Any` when unknown.
    #[must_use]
    pub fn member_type(&self) -> ValueType {
        match self.inner.observer().map(|observer| observer.path_members(false)) {
            Some(Ok(PathMembers::Available { member, .. })) => member.value_type(),
            _ => ValueType::Any,
        }
    }

    /// Value seen by the most recent read or write.
    #[must_use]
    pub fn last_value(&self) -> Value {
        self.inner.last_value.borrow().clone()
    }

    /// Current value converted for a member of type `target_type`.
    ///
    /// # Errors
    ///
    /// With `throw_on_error`, resolution errors such as
    /// [`BindError::MemberNotFound`] and converter failures. Without it,
    /// failures read as `Null`.
    pub fn get_value(
        &self,
        target_type: ValueType,
        context: &DataContext,
        throw_on_error: bool,
    ) -> Result<Value> {
        self.inner.get_value(target_type, context, throw_on_error)
    }

    /// Write the counterpart's value into this endpoint. Returns whether a
    /// write happened.
    ///
    /// # Errors
    ///
    /// With `throw_on_error`: [`BindError::TargetNullReference`] for a
    /// broken chain, [`BindError::MemberNotWritable`], conversion and setter
    /// errors. Without it, those cases skip the write.
    pub fn set_value(
        &self,
        counterpart: &dyn ValueSource,
        context: &DataContext,
        throw_on_error: bool,
    ) -> Result<bool> {
        self.inner.set_value(counterpart, context, throw_on_error)
    }

    /// Command adapter currently attached, if any.
    #[must_use]
    pub fn command_adapter(&self) -> Option<Rc<CommandAdapter>> {
        self.inner.command.borrow().clone()
    }

    pub fn on_value_changing(&self, handler: impl Fn(&ValueChangingArgs) + 'static) -> Subscription {
        self.inner
            .changing
            .on_message(move |_sender: &Value, args: &ValueChangingArgs| handler(args))
    }

    pub fn on_value_changed(&self, handler: impl Fn(&ValueChangedArgs) + 'static) -> Subscription {
        self.inner
            .changed
            .on_message(move |_sender: &Value, args: &ValueChangedArgs| handler(args))
    }

    /// Raised when the observed path reports a change.
    pub fn on_endpoint_changed(&self, handler: impl Fn(&PathChanged) + 'static) -> Subscription {
        self.inner
            .endpoint_changed
            .on_message(move |_sender: &Value, change: &PathChanged| handler(change))
    }

    pub fn add_changing_listener(
        &self,
        subscriber: Rc<dyn Subscriber<ValueChangingArgs>>,
    ) -> Subscription {
        self.inner.changing.subscribe(subscriber)
    }

    pub fn add_changed_listener(
        &self,
        subscriber: Rc<dyn Subscriber<ValueChangedArgs>>,
    ) -> Subscription {
        self.inner.changed.subscribe(subscriber)
    }

    pub fn add_endpoint_listener(&self, subscriber: Rc<dyn Subscriber<PathChanged>>) -> Subscription {
        self.inner.endpoint_changed.subscribe(subscriber)
    }

    /// Release the observer, command adapter, and listeners. Idempotent.
    pub fn dispose(&self) {
        self.inner.dispose();
    }
}

impl ValueSource for BindingSourceAccessor {
    fn get_value(
        &self,
        target_type: ValueType,
        context: &DataContext,
        throw_on_error: bool,
    ) -> Result<Value> {
        self.inner.get_value(target_type, context, throw_on_error)
    }
}

impl Drop for BindingSourceAccessor {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

impl fmt::Debug for BindingSourceAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let endpoint = match &self.inner.endpoint {
            Endpoint::Path(observer) => observer.path().to_text(),
            Endpoint::Literal(value) => format!("{value:?}"),
        };
        f.debug_struct("BindingSourceAccessor")
            .field("endpoint", &endpoint)
            .field("role", &self.inner.role)
            .field("state", &self.inner.state.get())
            .finish()
    }
}
