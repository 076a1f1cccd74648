//! End-to-end binding scenarios.
//!
//! 1. Writing a value equal to the current one raises no change events.
//! 2. `DoNothing` and `Unset` never reach the underlying member.
//! 3. A canceled `ValueChanging` leaves the member at its prior value.
//! 4. A broken chain reads as the target type's default (zero for numbers).
//! 5. Swapping an indexed collection moves the subscription to the new one.
//! 6. Rebinding a command endpoint fully detaches the previous command.
//! 7. Non-duplicate subscribers register once; dead subscribers are pruned.
//! 8. Bindings never keep their roots alive.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use fbind::core::testing::{NestedModel, SourceModel, fixture_registry};
use fbind::core::{
    DelegateSubscriber, Listener, ListenerSubscriber, PropertyChanged, SubscriberRegistry,
};
use fbind::prelude::*;
use fbind::runtime::ValueChangingArgs;

// ── Helpers ──────────────────────────────────────────────────────────────

fn bind_with(
    view: &Rc<SourceModel>,
    view_path: &str,
    model: &Rc<SourceModel>,
    model_path: &str,
    mode: BindingMode,
    config: BindingConfig,
) -> DataBinding {
    fbind::bind(
        &fixture_registry(),
        &Value::object(view),
        view_path,
        &Value::object(model),
        model_path,
        mode,
        config,
    )
    .expect("valid paths")
}

fn bind(
    view: &Rc<SourceModel>,
    view_path: &str,
    model: &Rc<SourceModel>,
    model_path: &str,
) -> DataBinding {
    bind_with(
        view,
        view_path,
        model,
        model_path,
        BindingMode::TwoWay,
        BindingConfig::default(),
    )
}

fn count_events(accessor: &BindingSourceAccessor) -> (Rc<Cell<usize>>, Vec<Subscription>) {
    let hits = Rc::new(Cell::new(0));
    let a = Rc::clone(&hits);
    let b = Rc::clone(&hits);
    let subs = vec![
        accessor.on_value_changing(move |_| a.set(a.get() + 1)),
        accessor.on_value_changed(move |_| b.set(b.get() + 1)),
    ];
    (hits, subs)
}

fn toggled_command(flag: &Rc<Cell<bool>>) -> Rc<RelayCommand> {
    let flag = Rc::clone(flag);
    Rc::new(RelayCommand::new(|_| {}).with_can_execute(move |_| flag.get()))
}

fn list_listeners(list: &Rc<ObservableList>) -> usize {
    list.property_changed().map_or(0, SubscriberRegistry::len)
}

// ═══════════════════════════════════════════════════════════════════════════
// Change events
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn equal_value_raises_no_events() {
    let view = SourceModel::new();
    let model = SourceModel::new();
    model.set_int_property(3);
    let binding = bind(&view, "IntProperty", &model, "IntProperty");
    let (hits, _subs) = count_events(binding.target());

    model.raise("IntProperty");
    assert_eq!(binding.update_target(true), Ok(false));
    assert_eq!(hits.get(), 0);
    assert_eq!(view.int_property(), 3);
}

#[test]
fn sentinel_from_converter_leaves_member_untouched() {
    let converter = FnConverter::new()
        .with_convert(|value, _| {
            Ok(match value.as_int() {
                Some(n) if n < 0 => Value::DoNothing,
                Some(0) => Value::Unset,
                _ => value.clone(),
            })
        })
        .into_rc();
    let view = SourceModel::new();
    let model = SourceModel::new();
    model.set_int_property(5);
    let config = BindingConfig::default().with_converter(converter);
    let binding = bind_with(
        &view,
        "IntProperty",
        &model,
        "IntProperty",
        BindingMode::OneWay,
        config,
    );
    assert_eq!(view.int_property(), 5);
    let writes = view.setter_calls();

    model.set_int_property(-1);
    assert_eq!(view.int_property(), 5);
    assert_eq!(view.setter_calls(), writes);

    let sentinel = binding
        .target()
        .set_value(&Value::Unset, &DataContext::empty(), true);
    assert_eq!(sentinel, Ok(false));
    assert_eq!(view.setter_calls(), writes);
}

#[test]
fn canceled_change_keeps_prior_value() {
    let view = SourceModel::new();
    let model = SourceModel::new();
    model.set_int_property(1);
    let binding = bind(&view, "IntProperty", &model, "IntProperty");
    let _veto = binding.target().on_value_changing(ValueChangingArgs::cancel);
    let changed = Rc::new(Cell::new(false));
    let flag = Rc::clone(&changed);
    let _changed = binding.target().on_value_changed(move |_| flag.set(true));

    model.set_int_property(2);
    assert_eq!(view.int_property(), 1);
    assert!(!changed.get());
    assert_eq!(
        binding
            .target()
            .get_value(ValueType::Int, &DataContext::empty(), true),
        Ok(Value::Int(1))
    );
}

#[test]
fn changing_precedes_changed() {
    let view = SourceModel::new();
    let model = SourceModel::new();
    let binding = bind(&view, "IntProperty", &model, "IntProperty");
    let order = Rc::new(RefCell::new(Vec::new()));
    let a = Rc::clone(&order);
    let b = Rc::clone(&order);
    let _changing = binding
        .target()
        .on_value_changing(move |args| a.borrow_mut().push(("changing", args.new_value.clone())));
    let _changed = binding
        .target()
        .on_value_changed(move |args| b.borrow_mut().push(("changed", args.new_value.clone())));

    model.set_int_property(4);
    model.set_int_property(9);
    assert_eq!(
        *order.borrow(),
        vec![
            ("changing", Value::Int(4)),
            ("changed", Value::Int(4)),
            ("changing", Value::Int(9)),
            ("changed", Value::Int(9)),
        ]
    );
}

// ═══════════════════════════════════════════════════════════════════════════
// Path chains
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn null_nested_link_reads_type_default() {
    let view = SourceModel::new();
    let model = SourceModel::new();
    view.set_int_property(42);
    view.set_string_property("stale");
    let _int = bind(&view, "IntProperty", &model, "NestedModel.IntProperty");
    let _text = bind(&view, "StringProperty", &model, "NestedModel.StringProperty");
    assert_eq!(view.int_property(), 0);
    assert_eq!(view.string_property(), Value::Null);

    let nested = NestedModel::with_int(7);
    model.set_nested(Some(&nested));
    assert_eq!(view.int_property(), 7);

    model.set_nested(None);
    assert_eq!(view.int_property(), 0);
}

#[test]
fn fallback_value_wins_over_type_default() {
    let view = SourceModel::new();
    let model = SourceModel::new();
    let _binding = bind_with(
        &view,
        "IntProperty",
        &model,
        "NestedModel.IntProperty",
        BindingMode::OneWay,
        BindingConfig::default().with_fallback(-1),
    );
    assert_eq!(view.int_property(), -1);
}

#[test]
fn intermediate_swap_updates_once() {
    let view = SourceModel::new();
    let model = SourceModel::new();
    model.set_nested(Some(&NestedModel::with_int(1)));
    let binding = bind(&view, "IntProperty", &model, "NestedModel.IntProperty");
    let (hits, _subs) = count_events(binding.target());

    let old = model.nested();
    let replacement = NestedModel::with_int(2);
    model.set_nested(Some(&replacement));
    assert_eq!(view.int_property(), 2);
    assert_eq!(hits.get(), 2);

    let old = old.downcast_ref::<NestedModel>().expect("nested model");
    old.set_int_property(100);
    assert_eq!(view.int_property(), 2);
    assert_eq!(old.listener_count(), 0);
    assert_eq!(replacement.listener_count(), 1);
}

#[test]
fn indexed_collection_swap_resubscribes() {
    let view = SourceModel::new();
    let model = SourceModel::new();
    let first = ObservableList::from_values([1, 2, 3].map(Value::from));
    model.set_items(Some(&first));
    let _binding = bind(&view, "IntProperty", &model, "Items[2]");
    assert_eq!(view.int_property(), 3);
    assert_eq!(list_listeners(&first), 1);

    let second = ObservableList::from_values([10, 20, 30].map(Value::from));
    model.set_items(Some(&second));
    assert_eq!(view.int_property(), 30);
    assert_eq!(list_listeners(&first), 0);
    assert_eq!(list_listeners(&second), 1);

    first.set(2, 99);
    assert_eq!(view.int_property(), 30);
    second.set(2, 31);
    assert_eq!(view.int_property(), 31);
}

#[test]
fn write_through_broken_chain_is_reported() {
    let view = SourceModel::new();
    let model = SourceModel::new();
    let binding = bind(&view, "IntProperty", &model, "NestedModel.IntProperty");
    view.set_int_property(5);
    assert!(model.nested().is_null());
    let err = binding.update_source(true).unwrap_err();
    assert!(matches!(err, BindError::TargetNullReference { depth: 1, .. }));
}

// ═══════════════════════════════════════════════════════════════════════════
// Commands
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn command_rebinding_detaches_previous_command() {
    let view = SourceModel::new();
    let model = SourceModel::new();
    let a_can = Rc::new(Cell::new(false));
    let b_can = Rc::new(Cell::new(true));
    let a = toggled_command(&a_can);
    let b = toggled_command(&b_can);

    model.set_command(Value::object(&a));
    let _binding = bind_with(
        &view,
        "Click",
        &model,
        "Command",
        BindingMode::OneWay,
        BindingConfig::default(),
    );
    assert!(!view.enabled());

    model.set_command(Value::object(&b));
    assert!(view.enabled());
    assert_eq!(a.can_execute_changed().len(), 0);

    a_can.set(false);
    a.raise_can_execute_changed();
    assert!(view.enabled());

    b_can.set(false);
    b.raise_can_execute_changed();
    assert!(!view.enabled());

    model.set_command(Value::Null);
    b_can.set(true);
    b.raise_can_execute_changed();
    assert!(!view.enabled());
    assert_eq!(b.can_execute_changed().len(), 0);
}

#[test]
fn bound_event_executes_command() {
    let view = SourceModel::new();
    let model = SourceModel::new();
    let runs = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&runs);
    let command = Rc::new(RelayCommand::new(move |p| sink.borrow_mut().push(p.clone())));
    model.set_command(Value::object(&command));
    let config = BindingConfig::default().with_command_parameter(|_| Value::from("clicked"));
    let _binding = bind_with(&view, "Click", &model, "Command", BindingMode::OneWay, config);

    view.raise_click(Value::Null);
    assert_eq!(*runs.borrow(), vec![Value::from("clicked")]);
}

// ═══════════════════════════════════════════════════════════════════════════
// Registry and lifetime
// ═══════════════════════════════════════════════════════════════════════════

struct Watcher;

impl Listener<PropertyChanged> for Watcher {
    fn on_message(&self, _sender: &Value, _msg: &PropertyChanged) -> bool {
        true
    }
}

fn on_change(_target: &Watcher, _sender: &Value, _msg: &PropertyChanged) -> bool {
    true
}

#[test]
fn duplicate_listener_registers_once() {
    let model = SourceModel::new();
    let registry = model.property_changed().expect("model notifies");
    let watcher = Rc::new(Watcher);
    assert!(registry.add(ListenerSubscriber::new(&watcher).into_rc()));
    assert!(!registry.add(ListenerSubscriber::new(&watcher).into_rc()));
    assert_eq!(registry.len(), 1);
}

#[test]
fn dead_subscriber_is_pruned_on_raise() {
    let model = SourceModel::new();
    let registry = model.property_changed().expect("model notifies");
    let keep = Rc::new(Watcher);
    let gone = Rc::new(Watcher);
    registry.add(DelegateSubscriber::new(&keep, on_change).into_rc());
    registry.add(DelegateSubscriber::new(&gone, on_change).into_rc());
    assert_eq!(registry.len(), 2);

    drop(gone);
    model.set_int_property(1);
    assert_eq!(registry.len(), 1);
}

#[test]
fn binding_does_not_keep_model_alive() {
    let view = SourceModel::new();
    let model = SourceModel::new();
    model.set_int_property(6);
    let binding = bind(&view, "IntProperty", &model, "IntProperty");
    assert_eq!(view.int_property(), 6);

    let weak = Rc::downgrade(&model);
    drop(model);
    assert!(weak.upgrade().is_none());

    view.set_int_property(8);
    assert_eq!(binding.update_source(false), Ok(false));
}

#[test]
fn scope_drop_detaches_every_link() {
    let view = SourceModel::new();
    let model = SourceModel::new();
    let nested = NestedModel::with_int(1);
    model.set_nested(Some(&nested));
    {
        let mut scope = BindingScope::new();
        scope.add(bind(&view, "IntProperty", &model, "NestedModel.IntProperty"));
        assert_eq!(model.listener_count(), 1);
        assert_eq!(nested.listener_count(), 1);
    }
    assert_eq!(model.listener_count(), 0);
    assert_eq!(nested.listener_count(), 0);
    assert_eq!(view.listener_count(), 0);
}

#[test]
#[tracing_test::traced_test]
fn facade_bind_logs_creation() {
    let view = SourceModel::new();
    let model = SourceModel::new();
    let _binding = bind(&view, "IntProperty", &model, "IntProperty");
    assert!(logs_contain("binding created"));
}

#[test]
fn malformed_path_is_rejected() {
    let view = SourceModel::new();
    let model = SourceModel::new();
    let err = fbind::bind(
        &fixture_registry(),
        &Value::object(&view),
        "IntProperty",
        &Value::object(&model),
        "Items[2",
        BindingMode::TwoWay,
        BindingConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, BindError::MalformedPath { .. }));
}
