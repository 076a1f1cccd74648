#![forbid(unsafe_code)]

//! Command capability consumed by command endpoints.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::subscriber::SubscriberRegistry;
use crate::value::{Bindable, Value};

/// Message raised when a command's `can_execute` result may have changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CanExecuteChanged;

/// An executable action with an enabled state.
pub trait Command {
    fn can_execute(&self, parameter: &Value) -> bool;

    fn execute(&self, parameter: &Value);

    /// Registry raising [`CanExecuteChanged`].
    fn can_execute_changed(&self) -> &SubscriberRegistry<CanExecuteChanged>;
}

type CanExecute = Box<dyn Fn(&Value) -> bool>;
type Execute = Box<dyn Fn(&Value)>;

/// Closure-backed [`Command`].
pub struct RelayCommand {
    execute: Execute,
    can_execute: Option<CanExecute>,
    changed: SubscriberRegistry<CanExecuteChanged>,
}

impl RelayCommand {
    /// Always-enabled command.
    pub fn new(execute: impl Fn(&Value) + 'static) -> Self {
        Self {
            execute: Box::new(execute),
            can_execute: None,
            changed: SubscriberRegistry::new(),
        }
    }

    /// Attach an enabled-state predicate.
    #[must_use]
    pub fn with_can_execute(mut self, can_execute: impl Fn(&Value) -> bool + 'static) -> Self {
        self.can_execute = Some(Box::new(can_execute));
        self
    }

    /// Notify listeners that `can_execute` should be re-queried.
    pub fn raise_can_execute_changed(self: &Rc<Self>) -> usize {
        let sender = Value::object(self);
        self.changed.raise(&sender, &CanExecuteChanged)
    }
}

impl Command for RelayCommand {
    fn can_execute(&self, parameter: &Value) -> bool {
        self.can_execute.as_ref().is_none_or(|f| f(parameter))
    }

    fn execute(&self, parameter: &Value) {
        (self.execute)(parameter);
    }

    fn can_execute_changed(&self) -> &SubscriberRegistry<CanExecuteChanged> {
        &self.changed
    }
}

impl Bindable for RelayCommand {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_command(&self) -> Option<&dyn Command> {
        Some(self)
    }
}

impl fmt::Debug for RelayCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayCommand")
            .field("guarded", &self.can_execute.is_some())
            .field("listeners", &self.changed.len())
            .finish()
    }
}
