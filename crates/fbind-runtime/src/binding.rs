#![forbid(unsafe_code)]

//! Data bindings joining a target accessor to a source accessor.
//!
//! # Usage
//!
//! ```ignore
//! let target = BindingSourceAccessor::from_text(registry.clone(), &view, "Text", AccessorRole::Target, config.clone())?;
//! let source = BindingSourceAccessor::from_text(registry, &model, "Person.Name", AccessorRole::Source, config)?;
//! let binding = DataBinding::new(target, source, BindingMode::TwoWay, DataContext::empty());
//!
//! let mut scope = BindingScope::new();
//! scope.add(binding);
//! // Dropping `scope` disposes the binding and detaches every link.
//! ```
//!
//! # Invariants
//!
//! 1. The initial sync runs once in the direction given by the mode.
//! 2. An update triggered by another update's write runs depth-first, inside
//!    the outer one. The echo of a write stops at the endpoint that already
//!    holds the value, and nesting is capped at [`MAX_NESTED_UPDATES`].
//! 3. Automatic propagation never fails loudly: errors are logged and the
//!    binding stays live.
//! 4. After `dispose`, no change reaches either endpoint.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use fbind_core::{BindError, Result, Subscription};

use crate::accessor::BindingSourceAccessor;
use crate::config::{BindingMode, DataContext};

// ---------------------------------------------------------------------------
// DataBinding
// ---------------------------------------------------------------------------

/// Updates that may run inside another update of the same binding.
pub const MAX_NESTED_UPDATES: usize = 8;

struct BindingInner {
    target: BindingSourceAccessor,
    source: BindingSourceAccessor,
    mode: BindingMode,
    context: RefCell<DataContext>,
    depth: Cell<usize>,
    subscriptions: RefCell<Vec<Subscription>>,
    disposed: Cell<bool>,
}

#[derive(Clone, Copy, Debug)]
enum Direction {
    ToTarget,
    ToSource,
}

impl BindingInner {
    fn update(&self, direction: Direction, throw_on_error: bool) -> Result<bool> {
        if self.disposed.get() {
            return if throw_on_error {
                Err(BindError::Disposed)
            } else {
                Ok(false)
            };
        }
        let depth = self.depth.get();
        if depth > MAX_NESTED_UPDATES {
            tracing::warn!(?direction, depth, "nested binding update dropped");
            return Ok(false);
        }
        self.depth.set(depth + 1);
        let context = self.context.borrow().clone();
        let result = match direction {
            Direction::ToTarget => self.target.set_value(&self.source, &context, throw_on_error),
            Direction::ToSource => self.source.set_value(&self.target, &context, throw_on_error),
        };
        self.depth.set(depth);
        if let Ok(true) = result {
            tracing::debug!(?direction, depth, mode = ?self.mode, "binding updated");
        }
        result
    }

    fn propagate(&self, direction: Direction) {
        if let Err(err) = self.update(direction, false) {
            tracing::warn!(?direction, error = %err, "binding propagation failed");
        }
    }

    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        let subscriptions = std::mem::take(&mut *self.subscriptions.borrow_mut());
        drop(subscriptions);
        self.target.dispose();
        self.source.dispose();
        tracing::trace!(mode = ?self.mode, "binding disposed");
    }
}

/// A live binding between two endpoints.
///
/// Changes flow according to [`BindingMode`]. Drop the `DataBinding` (or
/// call [`dispose`](Self::dispose)) to disconnect both directions.
pub struct DataBinding {
    inner: Rc<BindingInner>,
}

impl DataBinding {
    /// Bind `target` to `source` and perform the initial sync.
    ///
    /// Both accessors are bound as needed by `mode`. Initial sync errors are
    /// logged, not returned; call [`update_target`](Self::update_target) with
    /// `throw_on_error` to surface them.
    pub fn new(
        target: BindingSourceAccessor,
        source: BindingSourceAccessor,
        mode: BindingMode,
        context: DataContext,
    ) -> Self {
        if mode.updates_target() {
            source.bind();
        }
        if mode.updates_source() {
            target.bind();
        }
        let inner = Rc::new(BindingInner {
            target,
            source,
            mode,
            context: RefCell::new(context),
            depth: Cell::new(0),
            subscriptions: RefCell::new(Vec::new()),
            disposed: Cell::new(false),
        });

        let initial = match mode {
            BindingMode::OneWayToSource => Direction::ToSource,
            _ => Direction::ToTarget,
        };
        inner.propagate(initial);

        let mut subscriptions = Vec::new();
        if mode.updates_target() {
            let weak = Rc::downgrade(&inner);
            subscriptions.push(inner.source.on_endpoint_changed(move |_| {
                forward(&weak, Direction::ToTarget);
            }));
        }
        if mode.updates_source() {
            let weak = Rc::downgrade(&inner);
            subscriptions.push(inner.target.on_endpoint_changed(move |_| {
                forward(&weak, Direction::ToSource);
            }));
        }
        *inner.subscriptions.borrow_mut() = subscriptions;
        Self { inner }
    }

    #[must_use]
    pub fn mode(&self) -> BindingMode {
        self.inner.mode
    }

    #[must_use]
    pub fn target(&self) -> &BindingSourceAccessor {
        &self.inner.target
    }

    #[must_use]
    pub fn source(&self) -> &BindingSourceAccessor {
        &self.inner.source
    }

    /// Replace the context handed to converters and command parameters.
    pub fn set_context(&self, context: DataContext) {
        *self.inner.context.borrow_mut() = context;
    }

    /// Push the source value into the target. Returns whether a write
    /// happened.
    ///
    /// # Errors
    ///
    /// With `throw_on_error`, any error of
    /// [`BindingSourceAccessor::set_value`], or [`BindError::Disposed`].
    pub fn update_target(&self, throw_on_error: bool) -> Result<bool> {
        self.inner.update(Direction::ToTarget, throw_on_error)
    }

    /// Push the target value into the source.
    ///
    /// # Errors
    ///
    /// Same as [`update_target`](Self::update_target).
    pub fn update_source(&self, throw_on_error: bool) -> Result<bool> {
        self.inner.update(Direction::ToSource, throw_on_error)
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Disconnect both directions and dispose the endpoints. Idempotent.
    pub fn dispose(&self) {
        self.inner.dispose();
    }
}

fn forward(inner: &Weak<BindingInner>, direction: Direction) {
    if let Some(inner) = inner.upgrade() {
        inner.propagate(direction);
    }
}

impl Drop for DataBinding {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

impl fmt::Debug for DataBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataBinding")
            .field("target", &self.inner.target)
            .field("source", &self.inner.source)
            .field("mode", &self.inner.mode)
            .field("disposed", &self.inner.disposed.get())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// BindingScope
// ---------------------------------------------------------------------------

/// Collects bindings and subscriptions for one logical owner.
///
/// # Invariants
///
/// 1. Everything is released in reverse registration order on drop.
/// 2. After drop, no callbacks from this scope will fire.
/// 3. `clear()` releases everything immediately (reusable scope).
#[derive(Default)]
pub struct BindingScope {
    bindings: Vec<DataBinding>,
    subscriptions: Vec<Subscription>,
}

impl BindingScope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `sub` alive until the scope is cleared or dropped.
    pub fn hold(&mut self, sub: Subscription) -> &mut Self {
        self.subscriptions.push(sub);
        self
    }

    /// Take ownership of `binding`.
    pub fn add(&mut self, binding: DataBinding) -> &mut Self {
        self.bindings.push(binding);
        self
    }

    #[must_use]
    pub fn bindings(&self) -> &[DataBinding] {
        &self.bindings
    }

    /// Number of bindings and held subscriptions.
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.bindings.len() + self.subscriptions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty() && self.subscriptions.is_empty()
    }

    /// Release everything now.
    pub fn clear(&mut self) {
        while let Some(sub) = self.subscriptions.pop() {
            drop(sub);
        }
        while let Some(binding) = self.bindings.pop() {
            binding.dispose();
        }
    }
}

impl Drop for BindingScope {
    fn drop(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for BindingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingScope")
            .field("bindings", &self.bindings.len())
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::AccessorRole;
    use crate::config::BindingConfig;
    use crate::convert::FnConverter;
    use fbind_core::testing::{SourceModel, fixture_registry};
    use fbind_core::{FnMember, Value, ValueType};

    fn endpoint(
        model: &Rc<SourceModel>,
        path: &str,
        role: AccessorRole,
        config: BindingConfig,
    ) -> BindingSourceAccessor {
        BindingSourceAccessor::from_text(
            fixture_registry(),
            &Value::object(model),
            path,
            role,
            config,
        )
        .unwrap()
    }

    fn bind(
        view: &Rc<SourceModel>,
        view_path: &str,
        model: &Rc<SourceModel>,
        model_path: &str,
        mode: BindingMode,
    ) -> DataBinding {
        DataBinding::new(
            endpoint(view, view_path, AccessorRole::Target, BindingConfig::default()),
            endpoint(model, model_path, AccessorRole::Source, BindingConfig::default()),
            mode,
            DataContext::empty(),
        )
    }

    #[test]
    fn two_way_syncs_both_directions() {
        let view = SourceModel::new();
        let model = SourceModel::new();
        model.set_int_property(5);
        let _binding = bind(&view, "IntProperty", &model, "IntProperty", BindingMode::TwoWay);
        assert_eq!(view.int_property(), 5);

        model.set_int_property(6);
        assert_eq!(view.int_property(), 6);

        view.set_int_property(7);
        assert_eq!(model.int_property(), 7);
    }

    #[test]
    fn one_way_ignores_target_changes() {
        let view = SourceModel::new();
        let model = SourceModel::new();
        let _binding = bind(&view, "IntProperty", &model, "IntProperty", BindingMode::OneWay);
        model.set_int_property(3);
        assert_eq!(view.int_property(), 3);
        view.set_int_property(9);
        assert_eq!(model.int_property(), 3);
    }

    #[test]
    fn one_time_copies_once() {
        let view = SourceModel::new();
        let model = SourceModel::new();
        model.set_int_property(1);
        let _binding = bind(&view, "IntProperty", &model, "IntProperty", BindingMode::OneTime);
        assert_eq!(view.int_property(), 1);
        model.set_int_property(2);
        assert_eq!(view.int_property(), 1);
        assert_eq!(model.listener_count(), 0);
    }

    #[test]
    fn one_way_to_source_starts_from_target() {
        let view = SourceModel::new();
        let model = SourceModel::new();
        view.set_int_property(4);
        let _binding = bind(
            &view,
            "IntProperty",
            &model,
            "IntProperty",
            BindingMode::OneWayToSource,
        );
        assert_eq!(model.int_property(), 4);
        view.set_int_property(5);
        assert_eq!(model.int_property(), 5);
        model.set_int_property(6);
        assert_eq!(view.int_property(), 5);
    }

    #[test]
    fn auto_conversion_crosses_types() {
        let view = SourceModel::new();
        let model = SourceModel::new();
        model.set_int_property(12);
        let _binding = bind(&view, "StringProperty", &model, "IntProperty", BindingMode::TwoWay);
        assert_eq!(view.string_property(), Value::from("12"));

        view.set_string_property("40");
        assert_eq!(model.int_property(), 40);
    }

    #[test]
    fn converter_runs_in_both_directions() {
        let converter = FnConverter::new()
            .with_convert(|value, _| Ok(Value::Int(value.as_int().unwrap_or_default() * 10)))
            .with_convert_back(|value, _| Ok(Value::Int(value.as_int().unwrap_or_default() / 10)))
            .into_rc();
        let config = BindingConfig::default().with_converter(converter);
        let view = SourceModel::new();
        let model = SourceModel::new();
        model.set_int_property(2);
        let _binding = DataBinding::new(
            endpoint(&view, "IntProperty", AccessorRole::Target, config.clone()),
            endpoint(&model, "IntProperty", AccessorRole::Source, config),
            BindingMode::TwoWay,
            DataContext::empty(),
        );
        assert_eq!(view.int_property(), 20);
        view.set_int_property(50);
        assert_eq!(model.int_property(), 5);
    }

    /// Source endpoint whose `Clamped` member caps writes at 100.
    fn clamped_endpoint(model: &Rc<SourceModel>) -> BindingSourceAccessor {
        let registry = fixture_registry();
        registry.register(
            FnMember::<SourceModel>::property("Clamped", ValueType::Int)
                .with_getter(|m| Value::Int(m.int_property()))
                .with_setter(|m, v| {
                    m.set_int_property(v.as_int().unwrap_or_default().min(100));
                    m.raise("Clamped");
                    Ok(())
                })
                .into_descriptor(),
        );
        BindingSourceAccessor::from_text(
            registry,
            &Value::object(model),
            "Clamped",
            AccessorRole::Source,
            BindingConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn normalizing_source_pushes_back_to_target() {
        let view = SourceModel::new();
        let model = SourceModel::new();
        let _binding = DataBinding::new(
            endpoint(&view, "IntProperty", AccessorRole::Target, BindingConfig::default()),
            clamped_endpoint(&model),
            BindingMode::TwoWay,
            DataContext::empty(),
        );
        view.set_int_property(150);
        assert_eq!(model.int_property(), 100);
        assert_eq!(view.int_property(), 100);

        view.set_int_property(40);
        assert_eq!(model.int_property(), 40);
        assert_eq!(view.int_property(), 40);
    }

    #[test]
    #[tracing_test::traced_test]
    fn endpoints_that_never_agree_stop_at_nesting_limit() {
        let bump = FnConverter::new()
            .with_convert(|value, _| Ok(Value::Int(value.as_int().unwrap_or_default() + 1)))
            .with_convert_back(|value, _| Ok(Value::Int(value.as_int().unwrap_or_default() + 1)))
            .into_rc();
        let config = BindingConfig::default().with_converter(bump);
        let view = SourceModel::new();
        let model = SourceModel::new();
        let _binding = DataBinding::new(
            endpoint(&view, "IntProperty", AccessorRole::Target, config.clone()),
            endpoint(&model, "IntProperty", AccessorRole::Source, config),
            BindingMode::TwoWay,
            DataContext::empty(),
        );
        let writes = view.setter_calls() + model.setter_calls();
        assert!(writes <= MAX_NESTED_UPDATES + 1);
        assert!(logs_contain("nested binding update dropped"));
    }

    #[test]
    fn explicit_update_surfaces_errors() {
        let view = SourceModel::new();
        let model = SourceModel::new();
        let binding = bind(&view, "IntProperty", &model, "StringProperty", BindingMode::OneWay);
        model.set_string_property("not a number");
        assert_eq!(view.int_property(), 0);
        let err = binding.update_target(true).unwrap_err();
        assert!(matches!(
            err,
            BindError::ValueConversionError {
                target: ValueType::Int,
                ..
            }
        ));
        assert_eq!(binding.update_target(false), Ok(false));
    }

    #[test]
    fn dispose_detaches_everything() {
        let view = SourceModel::new();
        let model = SourceModel::new();
        let binding = bind(&view, "IntProperty", &model, "IntProperty", BindingMode::TwoWay);
        assert_eq!(model.listener_count(), 1);
        assert_eq!(view.listener_count(), 1);
        binding.dispose();
        binding.dispose();
        assert!(binding.is_disposed());
        assert_eq!(model.listener_count(), 0);
        assert_eq!(view.listener_count(), 0);
        model.set_int_property(8);
        assert_eq!(view.int_property(), 0);
        assert_eq!(binding.update_target(true), Err(BindError::Disposed));
    }

    #[test]
    fn scope_releases_on_drop() {
        let view = SourceModel::new();
        let model = SourceModel::new();
        {
            let mut scope = BindingScope::new();
            scope.add(bind(&view, "IntProperty", &model, "IntProperty", BindingMode::TwoWay));
            scope.hold(model.click().on_message(|_, _| {}));
            assert_eq!(scope.binding_count(), 2);
            model.set_int_property(1);
            assert_eq!(view.int_property(), 1);
        }
        assert_eq!(model.listener_count(), 0);
        assert!(model.click().is_empty());
        model.set_int_property(2);
        assert_eq!(view.int_property(), 1);
    }

    #[test]
    fn scope_clear_is_reusable() {
        let view = SourceModel::new();
        let model = SourceModel::new();
        let mut scope = BindingScope::default();
        scope.add(bind(&view, "IntProperty", &model, "IntProperty", BindingMode::OneWay));
        scope.clear();
        assert!(scope.is_empty());
        scope.add(bind(&view, "IntProperty", &model, "IntProperty", BindingMode::OneWay));
        model.set_int_property(3);
        assert_eq!(view.int_property(), 3);
    }

    #[test]
    #[tracing_test::traced_test]
    fn updates_are_logged() {
        let view = SourceModel::new();
        let model = SourceModel::new();
        model.set_int_property(1);
        let _binding = bind(&view, "IntProperty", &model, "IntProperty", BindingMode::OneWay);
        assert!(logs_contain("binding updated"));
    }
}
