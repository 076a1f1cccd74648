#![forbid(unsafe_code)]

//! Property change notification message.

use std::rc::Rc;

use crate::member::INDEXER_MEMBER;

/// Raised by an object's [`property_changed`](crate::Bindable::property_changed)
/// registry after one of its members changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyChanged {
    name: Rc<str>,
}

impl PropertyChanged {
    /// Change of the named member. An empty name means every member.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: Rc::from(name),
        }
    }

    /// Change of every member on the object.
    #[must_use]
    pub fn all() -> Self {
        Self::new("")
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a listener watching `member` must react.
    ///
    /// Indexer notifications (`Item[]` or `Item[...]`) match the indexer
    /// member.
    #[must_use]
    pub fn affects(&self, member: &str) -> bool {
        if self.name.is_empty() || &*self.name == member {
            return true;
        }
        member == INDEXER_MEMBER && self.name.starts_with("Item[")
    }
}
