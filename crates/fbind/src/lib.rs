#![forbid(unsafe_code)]

//! fbind public facade.
//!
//! Re-exports the value model and path machinery from `fbind-core` and, with
//! the default `runtime` feature, the observers, accessors, and bindings of
//! `fbind-runtime`.
//!
//! ```ignore
//! use fbind::prelude::*;
//!
//! let registry = Rc::new(MemberRegistry::with_defaults());
//! Person::register_members(&registry);
//! let binding = fbind::bind(
//!     &registry,
//!     &Value::object(&view), "Text",
//!     &Value::object(&person), "Address.City",
//!     BindingMode::TwoWay,
//!     BindingConfig::default(),
//! )?;
//! ```

pub use fbind_core as core;
pub use fbind_core::{
    BindError, Bindable, Command, FnMember, MemberDescriptor, MemberKind, MemberRegistry,
    ObservableList, Path, PropertyChanged, RelayCommand, Result, SubscriberRegistry,
    Subscription, Value, ValueType,
};

#[cfg(feature = "runtime")]
pub use fbind_runtime as runtime;
#[cfg(feature = "runtime")]
pub use fbind_runtime::{
    AccessorRole, BindingConfig, BindingMode, BindingScope, BindingSourceAccessor, Culture,
    DataBinding, DataContext, FnConverter, PathObserver, ValueConverter,
};

#[cfg(feature = "runtime")]
use std::rc::Rc;

/// Bind `target_path` on `target_root` to `source_path` on `source_root`.
///
/// Both endpoints share `config`. The binding is live when this returns.
///
/// # Errors
///
/// [`BindError::MalformedPath`] if either path fails to parse.
#[cfg(feature = "runtime")]
pub fn bind(
    registry: &Rc<MemberRegistry>,
    target_root: &Value,
    target_path: &str,
    source_root: &Value,
    source_path: &str,
    mode: BindingMode,
    config: BindingConfig,
) -> Result<DataBinding> {
    let target = BindingSourceAccessor::from_text(
        Rc::clone(registry),
        target_root,
        target_path,
        AccessorRole::Target,
        config.clone(),
    )?;
    let source = BindingSourceAccessor::from_text(
        Rc::clone(registry),
        source_root,
        source_path,
        AccessorRole::Source,
        config,
    )?;
    tracing::debug!(target = target_path, source = source_path, ?mode, "binding created");
    Ok(DataBinding::new(target, source, mode, DataContext::empty()))
}

/// Common imports.
pub mod prelude {
    pub use fbind_core::{
        BindError, Bindable, Command, FnMember, MemberRegistry, ObservableList, PropertyChanged,
        RelayCommand, SubscriberRegistry, Subscription, Value, ValueType,
    };

    #[cfg(feature = "runtime")]
    pub use fbind_runtime::{
        AccessorRole, BindingConfig, BindingMode, BindingScope, BindingSourceAccessor,
        DataBinding, DataContext, FnConverter, PathObserver,
    };

    pub use std::rc::Rc;
}
