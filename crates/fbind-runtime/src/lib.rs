#![forbid(unsafe_code)]

//! Live property bindings on top of `fbind-core`.
//!
//! - [`PathObserver`]: resolves a path against a root and re-walks the chain
//!   when any link changes, raising one coalesced [`PathChanged`].
//! - [`BindingSourceAccessor`]: one binding endpoint with conversion,
//!   fallback and target-null handling, sentinels, cancelable change events,
//!   and command/event endpoints.
//! - [`DataBinding`] and [`BindingScope`]: join two accessors by
//!   [`BindingMode`] and own their lifetime.
//! - [`coerce`], [`ValueConverter`], [`Culture`]: the conversion pipeline.
//!
//! Strictness is always a call-site flag (`strict` / `throw_on_error`).

pub mod accessor;
pub mod binding;
pub mod command_adapter;
pub mod config;
pub mod convert;
pub mod culture;
pub mod observer;

pub use accessor::{
    AccessorRole, AccessorState, BindingSourceAccessor, ValueChangedArgs, ValueChangingArgs,
    ValueSource,
};
pub use binding::{BindingScope, DataBinding, MAX_NESTED_UPDATES};
pub use command_adapter::CommandAdapter;
pub use config::{BindingConfig, BindingMode, CommandParameter, DataContext};
pub use convert::{ConversionRequest, FnConverter, ValueConverter, coerce};
pub use culture::{Culture, CultureContext, CultureOverride};
pub use observer::{PathChanged, PathMembers, PathObserver, resolve_path};
