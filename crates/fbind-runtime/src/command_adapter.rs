#![forbid(unsafe_code)]

//! Keeps a target's `Enabled` member in step with a bound command.
//!
//! A [`CommandAdapter`] holds at most one subscribed command. Rebinding
//! drops the previous command's `CanExecuteChanged` subscription before the
//! new one is attached, so a stale command can no longer toggle the target.
//! When the adapter is also bound to an event, raising that event executes
//! the command if it can execute.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use fbind_core::{
    BindError, CanExecuteChanged, DelegateSubscriber, ENABLED_MEMBER, Listener,
    ListenerSubscriber, MemberRegistry, MemberValue, Result, Subscription, Value, ValueType,
    WeakValue,
};

use crate::config::{BindingConfig, DataContext};

pub struct CommandAdapter {
    registry: Rc<MemberRegistry>,
    target: WeakValue,
    config: BindingConfig,
    context: RefCell<DataContext>,
    command: RefCell<Value>,
    command_sub: RefCell<Option<Subscription>>,
    event_sub: RefCell<Option<Subscription>>,
    this: Weak<CommandAdapter>,
}

impl CommandAdapter {
    /// Adapter driving the `Enabled` member of `target`. Command parameters
    /// come from `config`.
    #[must_use]
    pub fn new(registry: Rc<MemberRegistry>, target: &Value, config: BindingConfig) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            registry,
            target: WeakValue::new(target),
            config,
            context: RefCell::new(DataContext::empty()),
            command: RefCell::new(Value::Null),
            command_sub: RefCell::new(None),
            event_sub: RefCell::new(None),
            this: this.clone(),
        })
    }

    /// Object whose `Enabled` member is driven.
    #[must_use]
    pub fn target(&self) -> Value {
        self.target.upgrade()
    }

    /// Currently bound command, `Null` when none.
    #[must_use]
    pub fn command(&self) -> Value {
        self.command.borrow().clone()
    }

    #[must_use]
    pub fn has_command(&self) -> bool {
        !self.command.borrow().is_empty_link()
    }

    /// Bind `command`, replacing any previous one.
    ///
    /// `Null` detaches the current command and leaves `Enabled` untouched.
    ///
    /// # Errors
    ///
    /// [`BindError::ValueConversionError`] if `command` is neither null nor
    /// command-shaped. The previous binding is kept in that case.
    pub fn set_command(&self, command: Value, context: &DataContext) -> Result<()> {
        *self.context.borrow_mut() = context.clone();
        if command.is_empty_link() {
            self.detach_command();
            return Ok(());
        }
        let Some(cmd) = command.as_command() else {
            return Err(BindError::conversion(
                &command,
                ValueType::Command,
                "not a command",
            ));
        };
        if *self.command.borrow() != command {
            let Some(this) = self.this.upgrade() else {
                return Ok(());
            };
            let stale = self.command_sub.borrow_mut().take();
            drop(stale);
            let subscription = cmd
                .can_execute_changed()
                .subscribe(ListenerSubscriber::new(&this).into_rc());
            *self.command_sub.borrow_mut() = Some(subscription);
            *self.command.borrow_mut() = command.clone();
            tracing::debug!(command = ?command, "command rebound");
        }
        self.update_enabled();
        Ok(())
    }

    /// Execute the bound command when raising `event`. Binding twice keeps
    /// the first event.
    ///
    /// # Errors
    ///
    /// Propagates the event member's subscribe error.
    pub fn bind_event(&self, event: &MemberValue) -> Result<()> {
        if self.event_sub.borrow().is_some() {
            return Ok(());
        }
        let Some(this) = self.this.upgrade() else {
            return Ok(());
        };
        let subscriber = DelegateSubscriber::new(&this, Self::on_event).into_rc();
        let subscription = event.subscribe(subscriber)?;
        *self.event_sub.borrow_mut() = Some(subscription);
        Ok(())
    }

    fn on_event(&self, _sender: &Value, _args: &Value) -> bool {
        self.execute();
        true
    }

    fn current_parameter(&self) -> Value {
        self.config.command_parameter_for(&self.context.borrow())
    }

    /// `can_execute` of the bound command; `false` without one.
    #[must_use]
    pub fn can_execute(&self) -> bool {
        let command = self.command();
        let parameter = self.current_parameter();
        command
            .as_command()
            .is_some_and(|cmd| cmd.can_execute(&parameter))
    }

    /// Run the bound command if it can execute. Returns whether it ran.
    pub fn execute(&self) -> bool {
        let command = self.command();
        let Some(cmd) = command.as_command() else {
            return false;
        };
        let parameter = self.current_parameter();
        if !cmd.can_execute(&parameter) {
            tracing::trace!("command execution skipped");
            return false;
        }
        cmd.execute(&parameter);
        true
    }

    fn update_enabled(&self) {
        let command = self.command();
        let Some(cmd) = command.as_command() else {
            return;
        };
        let enabled = cmd.can_execute(&self.current_parameter());
        let target = self.target();
        if target.is_empty_link() {
            return;
        }
        match self.registry.find(target.type_key(), ENABLED_MEMBER) {
            Some(member) if member.can_write() => {
                if let Err(err) = member.set_value(&target, &[], Value::Bool(enabled)) {
                    tracing::warn!(error = %err, "failed to update enabled member");
                }
            }
            _ => tracing::trace!(target = ?target, "target has no writable enabled member"),
        }
    }

    fn detach_command(&self) {
        let stale = self.command_sub.borrow_mut().take();
        drop(stale);
        let previous = std::mem::take(&mut *self.command.borrow_mut());
        if !previous.is_empty_link() {
            tracing::debug!(command = ?previous, "command detached");
        }
    }

    /// Drop the command and event subscriptions.
    pub fn detach(&self) {
        self.detach_command();
        let event = self.event_sub.borrow_mut().take();
        drop(event);
    }
}

impl Listener<CanExecuteChanged> for CommandAdapter {
    fn on_message(&self, _sender: &Value, _message: &CanExecuteChanged) -> bool {
        self.update_enabled();
        true
    }
}

impl fmt::Debug for CommandAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandAdapter")
            .field("target", &self.target)
            .field("command", &*self.command.borrow())
            .field("event_bound", &self.event_sub.borrow().is_some())
            .finish()
    }
}
