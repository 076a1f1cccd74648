#![forbid(unsafe_code)]

//! Per-binding configuration.

use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use fbind_core::Value;

use crate::convert::ValueConverter;
use crate::culture::Culture;

/// Direction(s) in which a [`DataBinding`](crate::DataBinding) propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BindingMode {
    /// Copy source to target once, then stop listening.
    OneTime,
    /// Source changes flow to the target.
    OneWay,
    /// Changes flow in both directions.
    #[default]
    TwoWay,
    /// Target changes flow to the source.
    OneWayToSource,
}

impl BindingMode {
    /// Whether source changes are pushed to the target after the initial sync.
    #[must_use]
    pub fn updates_target(self) -> bool {
        matches!(self, Self::OneWay | Self::TwoWay)
    }

    /// Whether target changes are pushed to the source.
    #[must_use]
    pub fn updates_source(self) -> bool {
        matches!(self, Self::TwoWay | Self::OneWayToSource)
    }
}

/// Key/value bag handed to converters and command-parameter delegates.
#[derive(Clone, Default)]
pub struct DataContext {
    values: AHashMap<String, Value>,
}

impl DataContext {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(key.into(), value.into())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for DataContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.values.keys().map(String::as_str).collect();
        keys.sort_unstable();
        f.debug_struct("DataContext").field("keys", &keys).finish()
    }
}

/// Computes the parameter passed to a bound command.
pub type CommandParameter = Rc<dyn Fn(&DataContext) -> Value>;

/// Conversion and fallback settings for one binding endpoint.
///
/// Built with `Default` plus `with_*` calls:
///
/// ```ignore
/// let config = BindingConfig::default()
///     .with_fallback(Value::Int(-1))
///     .with_culture(Culture::new("de-DE"));
/// ```
#[derive(Clone)]
pub struct BindingConfig {
    pub converter: Option<Rc<dyn ValueConverter>>,
    pub converter_parameter: Value,
    /// Culture for conversions. `None` uses [`Culture::current`].
    pub culture: Option<Culture>,
    /// Replaces `Unset` on source reads. `None` uses the target type default.
    pub fallback: Option<Value>,
    /// Source value shown as `Null` on the target and written back as it.
    pub target_null_value: Option<Value>,
    /// Coerce values to the member type when no converter applies.
    pub auto_convert: bool,
    pub command_parameter: Option<CommandParameter>,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            converter: None,
            converter_parameter: Value::Null,
            culture: None,
            fallback: None,
            target_null_value: None,
            auto_convert: true,
            command_parameter: None,
        }
    }
}

impl BindingConfig {
    #[must_use]
    pub fn with_converter(mut self, converter: Rc<dyn ValueConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    #[must_use]
    pub fn with_converter_parameter(mut self, parameter: impl Into<Value>) -> Self {
        self.converter_parameter = parameter.into();
        self
    }

    #[must_use]
    pub fn with_culture(mut self, culture: Culture) -> Self {
        self.culture = Some(culture);
        self
    }

    #[must_use]
    pub fn with_fallback(mut self, fallback: impl Into<Value>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }

    #[must_use]
    pub fn with_target_null_value(mut self, value: impl Into<Value>) -> Self {
        self.target_null_value = Some(value.into());
        self
    }

    #[must_use]
    pub fn with_auto_convert(mut self, auto_convert: bool) -> Self {
        self.auto_convert = auto_convert;
        self
    }

    #[must_use]
    pub fn with_command_parameter(
        mut self,
        parameter: impl Fn(&DataContext) -> Value + 'static,
    ) -> Self {
        self.command_parameter = Some(Rc::new(parameter));
        self
    }

    /// The configured culture, else the thread's current one.
    #[must_use]
    pub fn effective_culture(&self) -> Culture {
        self.culture.clone().unwrap_or_else(Culture::current)
    }

    /// Parameter for a bound command; `Null` when no delegate is set.
    #[must_use]
    pub fn command_parameter_for(&self, context: &DataContext) -> Value {
        self.command_parameter
            .as_ref()
            .map_or(Value::Null, |param| param(context))
    }
}

impl fmt::Debug for BindingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingConfig")
            .field("converter", &self.converter.is_some())
            .field("converter_parameter", &self.converter_parameter)
            .field("culture", &self.culture)
            .field("fallback", &self.fallback)
            .field("target_null_value", &self.target_null_value)
            .field("auto_convert", &self.auto_convert)
            .field("command_parameter", &self.command_parameter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = BindingConfig::default();
        assert!(config.auto_convert);
        assert!(config.converter.is_none());
        assert!(config.fallback.is_none());
        assert_eq!(BindingMode::default(), BindingMode::TwoWay);
    }

    #[test]
    fn mode_directions() {
        assert!(BindingMode::TwoWay.updates_target());
        assert!(BindingMode::TwoWay.updates_source());
        assert!(!BindingMode::OneTime.updates_target());
        assert!(!BindingMode::OneWay.updates_source());
        assert!(BindingMode::OneWayToSource.updates_source());
        assert!(!BindingMode::OneWayToSource.updates_target());
    }

    #[test]
    fn command_parameter_reads_context() {
        let config =
            BindingConfig::default().with_command_parameter(|ctx| ctx.get("id").cloned().unwrap_or_default());
        let ctx = DataContext::empty().with("id", 7);
        assert_eq!(config.command_parameter_for(&ctx), Value::Int(7));
        assert_eq!(
            BindingConfig::default().command_parameter_for(&ctx),
            Value::Null
        );
    }

    #[test]
    fn configured_culture_wins() {
        let config = BindingConfig::default().with_culture(Culture::new("de-DE"));
        assert_eq!(config.effective_culture().name(), "de-DE");
    }

    #[test]
    fn context_debug_lists_sorted_keys() {
        let ctx = DataContext::empty().with("b", 1).with("a", 2);
        assert_eq!(format!("{ctx:?}"), "DataContext { keys: [\"a\", \"b\"] }");
        assert_eq!(ctx.len(), 2);
    }
}
