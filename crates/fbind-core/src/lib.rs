#![forbid(unsafe_code)]

//! Core data model for fbind property bindings.
//!
//! This crate provides:
//! - [`Value`], [`WeakValue`], and the [`Bindable`] object trait
//! - [`Path`] parsing with a process-wide cache
//! - [`SubscriberRegistry`] for weak, lazily pruned change fan-in
//! - [`MemberDescriptor`] and [`MemberRegistry`] for late-bound member access
//! - [`Command`] and [`ObservableList`] capabilities consumed by bindings
//!
//! Everything here is single-threaded (`Rc`/`RefCell`) except parsed paths,
//! which are `Send + Sync` so the parse cache can be shared.

pub mod collection;
pub mod command;
pub mod error;
pub mod member;
pub mod notify;
pub mod path;
pub mod subscriber;
#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;
pub mod value;

pub use collection::{COUNT_MEMBER, ObservableList};
pub use command::{CanExecuteChanged, Command, RelayCommand};
pub use error::{BindError, Result};
pub use member::{
    ENABLED_MEMBER, FnMember, INDEXER_MEMBER, MemberDescriptor, MemberKind, MemberProvider,
    MemberRegistry,
};
pub use notify::PropertyChanged;
pub use path::{IndexArg, PATH_CACHE_CAPACITY, Path, PathLiteral, PathSegment};
pub use subscriber::{
    DelegateSubscriber, HandlerResult, Listener, ListenerSubscriber, Subscriber,
    SubscriberRegistry, Subscription, same_subscriber,
};
pub use value::{Bindable, MemberValue, TypeKey, Value, ValueType, WeakValue};
