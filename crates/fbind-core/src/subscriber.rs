#![forbid(unsafe_code)]

//! Weak subscriber registry: many-to-one fan-in that never extends lifetimes.
//!
//! A [`SubscriberRegistry<M>`] is the publisher side of every change
//! notification in fbind (property changes, `CanExecuteChanged`, bound
//! events, observer path changes). Each entry is a [`Subscriber<M>`] that
//! holds its target weakly; dead targets are pruned lazily during
//! [`SubscriberRegistry::raise`].
//!
//! # Invariants
//!
//! 1. A registry never holds a strong reference to a subscriber's target.
//! 2. `raise` iterates a snapshot, so handlers may add or remove entries
//!    (including themselves) without corrupting the pass.
//! 3. Entries whose `handle` returns [`HandlerResult::Invalid`] or whose
//!    target is gone are removed in the same `raise` call.
//! 4. A subscriber with `allow_duplicate() == false` is added at most once
//!    per (target, method) pair.
//! 5. Dropping a [`Subscription`] detaches exactly the entry it created.
//!
//! # Failure Modes
//!
//! - Detaching after the registry itself was dropped: no-op.
//! - Handler panic: propagates to the caller of `raise`; the registry stays
//!   consistent because no borrow is held while handlers run.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::value::Value;

/// Outcome of delivering one message to one subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerResult {
    /// The subscriber acted on the message.
    Handled,
    /// The subscriber is alive but chose not to act.
    Ignored,
    /// The subscriber can never act again and should be pruned.
    Invalid,
}

/// A registry entry receiving messages of type `M`.
pub trait Subscriber<M: 'static>: 'static {
    /// Whether the target is still reachable.
    fn is_alive(&self) -> bool;

    /// Whether equal subscribers may be registered more than once.
    fn allow_duplicate(&self) -> bool;

    /// Address of the weakly held target, used for equality.
    fn target_id(&self) -> usize;

    /// Identity of the callback invoked on the target, used for equality.
    fn method_id(&self) -> usize;

    /// Deliver a message.
    fn handle(&self, sender: &Value, message: &M) -> HandlerResult;
}

/// Equality rule for subscribers: same target and same method.
#[must_use]
pub fn same_subscriber<M: 'static>(a: &dyn Subscriber<M>, b: &dyn Subscriber<M>) -> bool {
    a.target_id() == b.target_id() && a.method_id() == b.method_id()
}

enum Delegate<T: ?Sized, M> {
    Fn(fn(&T, &Value, &M) -> bool),
    Closure(Rc<dyn Fn(&T, &Value, &M) -> bool>),
}

/// Subscriber pairing a weak target with a strong, stateless delegate.
///
/// The delegate receives the upgraded target, so it never needs to capture
/// it. Returning `false` from the delegate reports [`HandlerResult::Ignored`].
pub struct DelegateSubscriber<T: ?Sized + 'static, M: 'static> {
    target: Weak<T>,
    delegate: Delegate<T, M>,
}

impl<T: ?Sized + 'static, M: 'static> DelegateSubscriber<T, M> {
    /// Bind a plain function to `target`. Two subscribers built from the same
    /// target and function compare equal.
    #[must_use]
    pub fn new(target: &Rc<T>, method: fn(&T, &Value, &M) -> bool) -> Self {
        Self {
            target: Rc::downgrade(target),
            delegate: Delegate::Fn(method),
        }
    }

    /// Bind a shared closure to `target`.
    #[must_use]
    pub fn with_closure(target: &Rc<T>, delegate: Rc<dyn Fn(&T, &Value, &M) -> bool>) -> Self {
        Self {
            target: Rc::downgrade(target),
            delegate: Delegate::Closure(delegate),
        }
    }

    /// Box into a registry entry.
    #[must_use]
    pub fn into_rc(self) -> Rc<dyn Subscriber<M>> {
        Rc::new(self)
    }
}

impl<T: ?Sized + 'static, M: 'static> Subscriber<M> for DelegateSubscriber<T, M> {
    fn is_alive(&self) -> bool {
        self.target.strong_count() > 0
    }

    fn allow_duplicate(&self) -> bool {
        true
    }

    fn target_id(&self) -> usize {
        self.target.as_ptr().cast::<()>() as usize
    }

    fn method_id(&self) -> usize {
        match &self.delegate {
            Delegate::Fn(f) => *f as usize,
            Delegate::Closure(c) => Rc::as_ptr(c).cast::<()>() as usize,
        }
    }

    fn handle(&self, sender: &Value, message: &M) -> HandlerResult {
        let Some(target) = self.target.upgrade() else {
            return HandlerResult::Invalid;
        };
        let handled = match &self.delegate {
            Delegate::Fn(f) => f(&target, sender, message),
            Delegate::Closure(c) => c(&target, sender, message),
        };
        if handled {
            HandlerResult::Handled
        } else {
            HandlerResult::Ignored
        }
    }
}

impl<T: ?Sized + 'static, M: 'static> fmt::Debug for DelegateSubscriber<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegateSubscriber")
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Fixed callback interface for objects that listen to `M` messages.
pub trait Listener<M>: 'static {
    /// Handle a message; `false` means ignored.
    fn on_message(&self, sender: &Value, message: &M) -> bool;
}

/// Subscriber holding a weak [`Listener`] target. Duplicates are rejected.
pub struct ListenerSubscriber<M: 'static> {
    target: Weak<dyn Listener<M>>,
}

impl<M: 'static> ListenerSubscriber<M> {
    #[must_use]
    pub fn new<L: Listener<M>>(target: &Rc<L>) -> Self {
        let target: Weak<L> = Rc::downgrade(target);
        let target: Weak<dyn Listener<M>> = target;
        Self { target }
    }

    #[must_use]
    pub fn into_rc(self) -> Rc<dyn Subscriber<M>> {
        Rc::new(self)
    }
}

impl<M: 'static> Subscriber<M> for ListenerSubscriber<M> {
    fn is_alive(&self) -> bool {
        self.target.strong_count() > 0
    }

    fn allow_duplicate(&self) -> bool {
        false
    }

    fn target_id(&self) -> usize {
        self.target.as_ptr().cast::<()>() as usize
    }

    fn method_id(&self) -> usize {
        0
    }

    fn handle(&self, sender: &Value, message: &M) -> HandlerResult {
        match self.target.upgrade() {
            Some(listener) if listener.on_message(sender, message) => HandlerResult::Handled,
            Some(_) => HandlerResult::Ignored,
            None => HandlerResult::Invalid,
        }
    }
}

impl<M: 'static> fmt::Debug for ListenerSubscriber<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSubscriber")
            .field("alive", &self.is_alive())
            .finish()
    }
}

type Entries<M> = RefCell<Vec<Rc<dyn Subscriber<M>>>>;

/// Shared list of weak subscribers for messages of type `M`.
///
/// Cloning yields another handle to the same list.
pub struct SubscriberRegistry<M: 'static> {
    inner: Rc<Entries<M>>,
}

impl<M: 'static> Clone for SubscriberRegistry<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<M: 'static> Default for SubscriberRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: 'static> SubscriberRegistry<M> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Register `subscriber`. Returns `false` when it was rejected as a
    /// duplicate.
    pub fn add(&self, subscriber: Rc<dyn Subscriber<M>>) -> bool {
        let mut entries = self.inner.borrow_mut();
        if !subscriber.allow_duplicate()
            && entries
                .iter()
                .any(|existing| same_subscriber(existing.as_ref(), subscriber.as_ref()))
        {
            return false;
        }
        entries.push(subscriber);
        true
    }

    /// Remove one entry that is `subscriber` itself or equal to it.
    pub fn remove(&self, subscriber: &Rc<dyn Subscriber<M>>) -> bool {
        let mut entries = self.inner.borrow_mut();
        let pos = entries
            .iter()
            .position(|e| Rc::ptr_eq(e, subscriber))
            .or_else(|| {
                entries
                    .iter()
                    .position(|e| same_subscriber(e.as_ref(), subscriber.as_ref()))
            });
        let removed = pos.map(|i| entries.remove(i));
        drop(entries);
        removed.is_some()
    }

    /// Register `subscriber` and return a guard that removes it on drop.
    ///
    /// A duplicate rejected by [`add`](Self::add) yields an inactive guard.
    pub fn subscribe(&self, subscriber: Rc<dyn Subscriber<M>>) -> Subscription {
        if !self.add(Rc::clone(&subscriber)) {
            return Subscription::empty();
        }
        let list = Rc::downgrade(&self.inner);
        let entry = Rc::downgrade(&subscriber);
        drop(subscriber);
        Subscription::new(move || detach_entry(&list, &entry))
    }

    /// Register a closure. The returned guard owns the closure, so the
    /// entry lives exactly as long as the guard.
    pub fn on_message(&self, handler: impl Fn(&Value, &M) + 'static) -> Subscription {
        let handler: Rc<dyn Fn(&Value, &M)> = Rc::new(handler);
        let subscriber = DelegateSubscriber::new(&handler, |h, sender, msg| {
            h(sender, msg);
            true
        });
        let inner = self.subscribe(subscriber.into_rc());
        Subscription::new(move || {
            inner.unsubscribe();
            drop(handler);
        })
    }

    /// Deliver `message` to every live subscriber. Returns the number of
    /// subscribers that reported [`HandlerResult::Handled`].
    ///
    /// Entries added by a handler wait for the next raise. Entries removed by
    /// a handler are skipped for the rest of this one.
    pub fn raise(&self, sender: &Value, message: &M) -> usize {
        let snapshot: Vec<Rc<dyn Subscriber<M>>> = self.inner.borrow().clone();
        let mut handled = 0;
        let mut invalid: Vec<Rc<dyn Subscriber<M>>> = Vec::new();
        for subscriber in &snapshot {
            if !self.contains(subscriber) {
                continue;
            }
            if !subscriber.is_alive() {
                invalid.push(Rc::clone(subscriber));
                continue;
            }
            match subscriber.handle(sender, message) {
                HandlerResult::Handled => handled += 1,
                HandlerResult::Ignored => {}
                HandlerResult::Invalid => invalid.push(Rc::clone(subscriber)),
            }
        }
        if !invalid.is_empty() {
            self.inner
                .borrow_mut()
                .retain(|e| !invalid.iter().any(|dead| Rc::ptr_eq(dead, e)));
            tracing::trace!(pruned = invalid.len(), "pruned invalid subscribers");
        }
        handled
    }

    fn contains(&self, subscriber: &Rc<dyn Subscriber<M>>) -> bool {
        self.inner.borrow().iter().any(|e| Rc::ptr_eq(e, subscriber))
    }

    /// Drop entries whose targets are gone. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let dead: Vec<Rc<dyn Subscriber<M>>> = {
            let mut entries = self.inner.borrow_mut();
            let (live, dead) = std::mem::take(&mut *entries)
                .into_iter()
                .partition(|e| e.is_alive());
            *entries = live;
            dead
        };
        dead.len()
    }

    /// Number of registered entries, dead ones included until pruned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }

    /// Remove every entry.
    pub fn clear(&self) {
        let drained = std::mem::take(&mut *self.inner.borrow_mut());
        drop(drained);
    }
}

fn detach_entry<M: 'static>(list: &Weak<Entries<M>>, entry: &Weak<dyn Subscriber<M>>) {
    let Some(list) = list.upgrade() else {
        return;
    };
    let removed = {
        let mut entries = list.borrow_mut();
        entries
            .iter()
            .position(|e| std::ptr::addr_eq(Rc::as_ptr(e), entry.as_ptr()))
            .map(|i| entries.remove(i))
    };
    drop(removed);
}

impl<M: 'static> fmt::Debug for SubscriberRegistry<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("len", &self.len())
            .finish()
    }
}

/// RAII guard for a registration.
///
/// Dropping the guard detaches the registration. Detaching twice, or after
/// the publisher is gone, does nothing.
#[must_use = "dropping a Subscription detaches it immediately"]
pub struct Subscription {
    detach: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Guard that runs `detach` once when released.
    pub fn new(detach: impl FnOnce() + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// Guard with nothing to detach.
    pub fn empty() -> Self {
        Self { detach: None }
    }

    /// Detach now.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    /// Whether the guard still owns a registration.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.detach.is_some()
    }

    fn release(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
