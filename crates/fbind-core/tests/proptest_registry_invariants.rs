//! Property-based invariant tests for the weak subscriber registry.
//!
//! 1. Listener subscribers are never registered twice for one target.
//! 2. After `raise`, only entries with live targets remain.
//! 3. `raise` reports exactly the number of live subscribers.
//! 4. Registries never extend target lifetimes.

use std::rc::Rc;

use fbind_core::{DelegateSubscriber, Listener, ListenerSubscriber, SubscriberRegistry, Value};
use proptest::prelude::*;

struct Target;

impl Listener<()> for Target {
    fn on_message(&self, _sender: &Value, _msg: &()) -> bool {
        true
    }
}

fn on_unit(_target: &Target, _sender: &Value, _msg: &()) -> bool {
    true
}

#[derive(Debug, Clone)]
enum Op {
    AddListener(usize),
    AddDelegate(usize),
    Drop(usize),
    Raise,
}

fn op_strategy(targets: usize) -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..targets).prop_map(Op::AddListener),
        2 => (0..targets).prop_map(Op::AddDelegate),
        1 => (0..targets).prop_map(Op::Drop),
        2 => Just(Op::Raise),
    ]
}

const TARGETS: usize = 4;

proptest! {
    #[test]
    fn registry_invariants(ops in proptest::collection::vec(op_strategy(TARGETS), 1..40)) {
        let registry = SubscriberRegistry::<()>::new();
        let mut targets: Vec<Option<Rc<Target>>> = (0..TARGETS).map(|_| Some(Rc::new(Target))).collect();
        // Per target: (listener registered, delegate count).
        let mut model = vec![(false, 0usize); TARGETS];

        for op in ops {
            match op {
                Op::AddListener(i) => {
                    if let Some(t) = &targets[i] {
                        let added = registry.add(ListenerSubscriber::new(t).into_rc());
                        prop_assert_eq!(added, !model[i].0);
                        model[i].0 = true;
                    }
                }
                Op::AddDelegate(i) => {
                    if let Some(t) = &targets[i] {
                        prop_assert!(registry.add(DelegateSubscriber::new(t, on_unit).into_rc()));
                        model[i].1 += 1;
                    }
                }
                Op::Drop(i) => {
                    targets[i] = None;
                }
                Op::Raise => {
                    let expected: usize = targets
                        .iter()
                        .zip(&model)
                        .filter(|(t, _)| t.is_some())
                        .map(|(_, (l, d))| usize::from(*l) + d)
                        .sum();
                    prop_assert_eq!(registry.raise(&Value::Null, &()), expected);
                    prop_assert_eq!(registry.len(), expected);
                    for (t, m) in targets.iter().zip(model.iter_mut()) {
                        if t.is_none() {
                            *m = (false, 0);
                        }
                    }
                }
            }
        }

        for t in targets.iter().flatten() {
            prop_assert_eq!(Rc::strong_count(t), 1);
        }
    }
}
