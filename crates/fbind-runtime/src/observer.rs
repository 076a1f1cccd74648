#![forbid(unsafe_code)]

//! Path observer: resolves a [`Path`] against a root and keeps every link of
//! the chain observed.
//!
//! # Architecture
//!
//! ```text
//! root ──Items──▶ list ──Item[2]──▶ value
//!  │               │
//!  link 0          link 1            (one Subscription per notifying link)
//! ```
//!
//! Reads always walk fresh from the root, so the resolved value is never
//! stale. The link chain exists only to hold subscriptions. When link `d`
//! reports a change, every link after `d` is unsubscribed, the remainder of
//! the chain is re-walked from the new value, and exactly one
//! [`PathChanged`] is raised.
//!
//! # Invariants
//!
//! 1. At most one live subscription per link; stale links are dropped before
//!    new ones are created.
//! 2. The root and every link are held weakly. Observing never keeps an
//!    object alive.
//! 3. Notifications arriving while a re-walk is running are folded into it:
//!    the running update re-walks from the smallest pending depth and raises
//!    a single event.
//! 4. Indexer arguments that are paths are evaluated against the root, never
//!    against the indexed object.
//! 5. `dispose` is idempotent and runs on drop.
//!
//! # Failure Modes
//!
//! | Condition | Strict | Non-strict |
//! |-----------|--------|------------|
//! | Missing member | `MemberNotFound` | `Unset` |
//! | Getter error | propagated | `Unset` |
//! | Null intermediate link on read | `Unset` | `Unset` |
//! | Null intermediate link on write | `TargetNullReference` | no-op |
//! | Read-only terminal on write | `MemberNotWritable` | no-op |

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use fbind_core::{
    BindError, DelegateSubscriber, IndexArg, MemberDescriptor, MemberKind, MemberRegistry,
    MemberValue, Path, PathSegment, PropertyChanged, Result, Subscriber, SubscriberRegistry,
    Subscription, Value, WeakValue,
};

/// Coalesced change notification raised by a [`PathObserver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathChanged {
    /// Index of the upstream-most link that moved.
    pub depth: usize,
}

/// Terminal of a path ready for a write.
pub enum PathMembers {
    /// The chain is broken before the terminal.
    Unavailable {
        /// Index of the segment whose source was null or missing.
        depth: usize,
    },
    /// The terminal member and the object it belongs to.
    Available {
        source: Value,
        member: Rc<dyn MemberDescriptor>,
        args: Vec<Value>,
    },
}

impl PathMembers {
    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available { .. })
    }

    /// Read the terminal member. `Unset` when unavailable.
    pub fn get(&self) -> Result<Value> {
        match self {
            Self::Unavailable { .. } => Ok(Value::Unset),
            Self::Available {
                source,
                member,
                args,
            } => member.get_value(source, args),
        }
    }

    /// Write the terminal member. Unavailable members ignore the write.
    pub fn set(&self, value: Value) -> Result<()> {
        match self {
            Self::Unavailable { .. } => Ok(()),
            Self::Available {
                source,
                member,
                args,
            } => member.set_value(source, args, value),
        }
    }
}

impl fmt::Debug for PathMembers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { depth } => f
                .debug_struct("Unavailable")
                .field("depth", depth)
                .finish(),
            Self::Available {
                source,
                member,
                args,
            } => f
                .debug_struct("Available")
                .field("source", source)
                .field("member", &member.name())
                .field("args", args)
                .finish(),
        }
    }
}

/// Resolve `path` against `root` without observing anything.
pub fn resolve_path(
    registry: &MemberRegistry,
    root: &Value,
    path: &Path,
    strict: bool,
) -> Result<Value> {
    let mut value = root.clone();
    let last = path.len().saturating_sub(1);
    for (depth, segment) in path.segments().iter().enumerate() {
        if value.is_empty_link() {
            return Ok(Value::Unset);
        }
        value = step(registry, root, &value, segment, depth == last, strict)?;
    }
    Ok(value)
}

/// Evaluate one segment on `source`.
fn step(
    registry: &MemberRegistry,
    root: &Value,
    source: &Value,
    segment: &PathSegment,
    is_terminal: bool,
    strict: bool,
) -> Result<Value> {
    let Some(member) = registry.resolve(source.type_key(), segment.member_name(), false, strict)?
    else {
        return Ok(Value::Unset);
    };
    if member.kind() == MemberKind::Event {
        return Ok(match (is_terminal, source.as_object()) {
            (true, Some(owner)) => Value::Member(MemberValue::new(Rc::clone(owner), member)),
            _ => Value::Unset,
        });
    }
    let args = eval_args(registry, root, segment, strict)?;
    match member.get_value(source, &args) {
        Ok(value) => Ok(value),
        Err(err) if strict => Err(err),
        Err(err) => {
            tracing::trace!(member = member.name(), error = %err, "getter failed, yielding unset");
            Ok(Value::Unset)
        }
    }
}

fn eval_args(
    registry: &MemberRegistry,
    root: &Value,
    segment: &PathSegment,
    strict: bool,
) -> Result<Vec<Value>> {
    segment
        .args()
        .iter()
        .map(|arg| match arg {
            IndexArg::Literal(lit) => Ok(lit.to_value()),
            IndexArg::Path(path) => resolve_path(registry, root, path, strict),
        })
        .collect()
}

struct Link {
    source: WeakValue,
    subscription: Option<Subscription>,
}

struct ObserverInner {
    registry: Rc<MemberRegistry>,
    path: Arc<Path>,
    root: WeakValue,
    links: RefCell<Vec<Link>>,
    listeners: SubscriberRegistry<PathChanged>,
    updating: Cell<bool>,
    pending: Cell<Option<usize>>,
    disposed: Cell<bool>,
    this: Weak<ObserverInner>,
}

impl ObserverInner {
    fn root_value(&self) -> Value {
        self.root.upgrade()
    }

    fn resolve(&self, strict: bool) -> Result<Value> {
        if self.disposed.get() {
            return if strict {
                Err(BindError::Disposed)
            } else {
                Ok(Value::Unset)
            };
        }
        resolve_path(&self.registry, &self.root_value(), &self.path, strict)
    }

    fn path_members(&self, strict: bool) -> Result<PathMembers> {
        if self.disposed.get() {
            return if strict {
                Err(BindError::Disposed)
            } else {
                Ok(PathMembers::Unavailable { depth: 0 })
            };
        }
        let segments = self.path.segments();
        let Some((terminal, intermediate)) = segments.split_last() else {
            return Ok(PathMembers::Unavailable { depth: 0 });
        };
        let root = self.root_value();
        let mut source = root.clone();
        for (depth, segment) in intermediate.iter().enumerate() {
            if source.is_empty_link() {
                return Ok(PathMembers::Unavailable { depth });
            }
            source = step(&self.registry, &root, &source, segment, false, strict)?;
        }
        if source.is_empty_link() {
            return Ok(PathMembers::Unavailable {
                depth: intermediate.len(),
            });
        }
        let Some(member) =
            self.registry
                .resolve(source.type_key(), terminal.member_name(), false, strict)?
        else {
            return Ok(PathMembers::Unavailable {
                depth: intermediate.len(),
            });
        };
        let args = eval_args(&self.registry, &root, terminal, strict)?;
        Ok(PathMembers::Available {
            source,
            member,
            args,
        })
    }

    fn set_value(&self, value: Value, strict: bool) -> Result<bool> {
        let members = self.path_members(strict)?;
        let (source, member, args) = match members {
            PathMembers::Unavailable { depth } if strict => {
                return Err(BindError::TargetNullReference {
                    path: self.path.to_text(),
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
        if !member.can_write() {
            return if strict {
                Err(BindError::MemberNotWritable {
                    type_name: source.type_key().short_name().to_owned(),
                    member: member.name().to_owned(),
                })
            } else {
                Ok(false)
            };
        }
        match member.set_value(&source, &args, value) {
            Ok(()) => Ok(true),
            Err(err) if strict => Err(err),
            Err(err) => {
                tracing::trace!(path = %self.path, error = %err, "setter failed");
                Ok(false)
            }
        }
    }

    fn subscribe(&self) {
        if self.disposed.get() {
            return;
        }
        let stale = std::mem::take(&mut *self.links.borrow_mut());
        drop(stale);
        if self.path.is_empty() {
            return;
        }
        self.build_links(0, self.root_value());
        tracing::trace!(
            path = %self.path,
            links = self.links.borrow().len(),
            "path observer subscribed"
        );
    }

    /// Append links for segments `start..` beginning at `value`.
    fn build_links(&self, start: usize, value: Value) {
        let Some(this) = self.this.upgrade() else {
            return;
        };
        let root = self.root_value();
        let segments = self.path.segments();
        let mut value = value;
        let mut fresh = Vec::new();
        for depth in start..segments.len() {
            if value.is_empty_link() {
                break;
            }
            let segment = &segments[depth];
            let name = segment.member_name();
            let subscription = self
                .registry
                .find(value.type_key(), name)
                .and_then(|member| member.observe(&value, link_subscriber(&this, depth, name)));
            fresh.push(Link {
                source: WeakValue::new(&value),
                subscription,
            });
            if depth + 1 == segments.len() {
                break;
            }
            value = step(&self.registry, &root, &value, segment, false, false)
                .unwrap_or(Value::Unset);
        }
        self.links.borrow_mut().extend(fresh);
    }

    /// Drop links after `depth` and rebuild them from link `depth`'s new value.
    fn rewalk(&self, depth: usize) {
        let (stale, source) = {
            let mut links = self.links.borrow_mut();
            if depth >= links.len() {
                return;
            }
            let stale = links.split_off(depth + 1);
            (stale, links[depth].source.upgrade())
        };
        drop(stale);
        let segments = self.path.segments();
        if depth + 1 >= segments.len() || source.is_empty_link() {
            return;
        }
        let next = step(
            &self.registry,
            &self.root_value(),
            &source,
            &segments[depth],
            false,
            false,
        )
        .unwrap_or(Value::Unset);
        self.build_links(depth + 1, next);
    }

    fn on_link_changed(&self, depth: usize) {
        if self.disposed.get() {
            return;
        }
        if self.updating.get() {
            let merged = self.pending.get().map_or(depth, |p| p.min(depth));
            self.pending.set(Some(merged));
            return;
        }
        self.updating.set(true);
        let mut top = depth;
        let mut next = Some(depth);
        while let Some(d) = next {
            if self.disposed.get() {
                break;
            }
            top = top.min(d);
            self.rewalk(d);
            next = self.pending.take();
        }
        self.updating.set(false);
        if self.disposed.get() {
            return;
        }
        tracing::debug!(path = %self.path, depth = top, "path re-walked");
        self.listeners
            .raise(&self.root_value(), &PathChanged { depth: top });
    }

    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        let links = std::mem::take(&mut *self.links.borrow_mut());
        drop(links);
        self.listeners.clear();
        tracing::trace!(path = %self.path, "path observer disposed");
    }
}

type LinkHandler = Rc<dyn Fn(&ObserverInner, &Value, &PropertyChanged) -> bool>;

fn link_subscriber(
    observer: &Rc<ObserverInner>,
    depth: usize,
    member: &str,
) -> Rc<dyn Subscriber<PropertyChanged>> {
    let member = member.to_owned();
    let handler: LinkHandler = Rc::new(move |inner, _sender, msg| {
        if msg.affects(&member) {
            inner.on_link_changed(depth);
            true
        } else {
            false
        }
    });
    DelegateSubscriber::with_closure(observer, handler).into_rc()
}

/// Observes one path on one root.
///
/// Not `Clone`: the observer owns its subscriptions and disposes them on
/// drop.
pub struct PathObserver {
    inner: Rc<ObserverInner>,
}

impl PathObserver {
    /// Create an observer without subscribing to anything yet.
    #[must_use]
    pub fn new(registry: Rc<MemberRegistry>, root: &Value, path: Arc<Path>) -> Self {
        let inner = Rc::new_cyclic(|this| ObserverInner {
            registry,
            path,
            root: WeakValue::new(root),
            links: RefCell::new(Vec::new()),
            listeners: SubscriberRegistry::new(),
            updating: Cell::new(false),
            pending: Cell::new(None),
            disposed: Cell::new(false),
            this: this.clone(),
        });
        Self { inner }
    }

    /// Create an observer and subscribe to the whole chain.
    #[must_use]
    pub fn observe(registry: Rc<MemberRegistry>, root: &Value, path: Arc<Path>) -> Self {
        let observer = Self::new(registry, root, path);
        observer.subscribe();
        observer
    }

    /// Parse `text` and observe it.
    pub fn observe_text(registry: Rc<MemberRegistry>, root: &Value, text: &str) -> Result<Self> {
        Ok(Self::observe(registry, root, Path::parse(text)?))
    }

    #[must_use]
    pub fn path(&self) -> &Arc<Path> {
        &self.inner.path
    }

    #[must_use]
    pub fn registry(&self) -> &Rc<MemberRegistry> {
        &self.inner.registry
    }

    /// The root, or `Unset` once it was reclaimed.
    #[must_use]
    pub fn root(&self) -> Value {
        self.inner.root_value()
    }

    /// Resolve the current value from the root.
    pub fn resolve(&self, strict: bool) -> Result<Value> {
        self.inner.resolve(strict)
    }

    /// Non-strict [`resolve`](Self::resolve).
    #[must_use]
    pub fn current_value(&self) -> Value {
        self.inner.resolve(false).unwrap_or(Value::Unset)
    }

    /// Resolve up to the terminal member without reading it.
    pub fn path_members(&self, strict: bool) -> Result<PathMembers> {
        self.inner.path_members(strict)
    }

    /// Write the terminal member. Returns whether a setter ran.
    pub fn set_value(&self, value: Value, strict: bool) -> Result<bool> {
        self.inner.set_value(value, strict)
    }

    /// (Re)subscribe the whole chain from the root.
    pub fn subscribe(&self) {
        self.inner.subscribe();
    }

    /// Unsubscribe every link. Idempotent.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Number of links currently holding a subscription.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner
            .links
            .borrow()
            .iter()
            .filter(|link| link.subscription.is_some())
            .count()
    }

    /// Number of links in the current chain.
    #[must_use]
    pub fn link_count(&self) -> usize {
        self.inner.links.borrow().len()
    }

    /// Call `handler` after each coalesced change.
    pub fn on_changed(&self, handler: impl Fn(&PathChanged) + 'static) -> Subscription {
        self.inner
            .listeners
            .on_message(move |_sender, msg| handler(msg))
    }

    /// Register a weak listener for coalesced changes.
    pub fn add_listener(&self, subscriber: Rc<dyn Subscriber<PathChanged>>) -> Subscription {
        self.inner.listeners.subscribe(subscriber)
    }
}

impl Drop for PathObserver {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

impl fmt::Debug for PathObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathObserver")
            .field("path", &self.inner.path.to_text())
            .field("links", &self.link_count())
            .field("subscriptions", &self.subscription_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
