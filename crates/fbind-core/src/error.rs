#![forbid(unsafe_code)]

//! Error taxonomy shared by every fbind crate.
//!
//! # Failure Modes
//!
//! | Error | Raised by | Fail-soft alternative |
//! |-------|-----------|-----------------------|
//! | `MalformedPath` | path parser | none, always surfaced |
//! | `MemberNotFound` | member lookup during resolve/write | non-strict resolve yields `Unset` |
//! | `MemberNotWritable` | terminal write | non-strict write is a no-op |
//! | `TargetNullReference` | write through a broken chain | non-strict write is a no-op |
//! | `ValueConversionError` | converters, coercion, typed setters | `throw_on_error = false` |
//! | `InvalidTarget` | descriptor applied to the wrong object type | none |
//! | `Disposed` | use of a torn-down observer or accessor | `throw_on_error = false` |

use crate::value::ValueType;

/// Errors produced while parsing, resolving, converting, or writing bound values.
#[derive(Debug, Clone, PartialEq)]
pub enum BindError {
    /// The textual path could not be parsed.
    MalformedPath {
        /// Original path text.
        path: String,
        /// Byte offset where parsing failed.
        position: usize,
        /// Human-readable reason.
        reason: String,
    },
    /// No member with this name exists on the type.
    MemberNotFound {
        /// Name of the type that was searched.
        type_name: String,
        /// Requested member name.
        member: String,
    },
    /// The member exists but cannot be written.
    MemberNotWritable {
        /// Name of the owning type.
        type_name: String,
        /// Member name.
        member: String,
    },
    /// An intermediate link was null or missing while writing.
    TargetNullReference {
        /// Path text being written.
        path: String,
        /// Index of the segment whose source was null.
        depth: usize,
    },
    /// A value could not be converted to the requested type.
    ValueConversionError {
        /// Debug rendering of the offending value.
        value: String,
        /// Type the value was converted to.
        target: ValueType,
        /// Why the conversion failed.
        reason: String,
    },
    /// A descriptor was applied to an object of the wrong type.
    InvalidTarget {
        /// Type the descriptor was declared for.
        expected: String,
        /// Type of the object actually passed.
        found: String,
    },
    /// The observer or accessor has already been disposed.
    Disposed,
}

impl BindError {
    /// Shorthand for a conversion failure.
    pub fn conversion(
        value: &crate::value::Value,
        target: ValueType,
        reason: impl Into<String>,
    ) -> Self {
        Self::ValueConversionError {
            value: format!("{value:?}"),
            target,
            reason: reason.into(),
        }
    }

    /// Whether this error describes a structural problem with the path or
    /// members rather than a value problem.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::MalformedPath { .. }
                | Self::MemberNotFound { .. }
                | Self::MemberNotWritable { .. }
                | Self::TargetNullReference { .. }
        )
    }
}

impl std::fmt::Display for BindError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedPath {
                path,
                position,
                reason,
            } => write!(f, "malformed path '{path}' at {position}: {reason}"),
            Self::MemberNotFound { type_name, member } => {
                write!(f, "member '{member}' not found on type '{type_name}'")
            }
            Self::MemberNotWritable { type_name, member } => {
                write!(f, "member '{member}' on type '{type_name}' is not writable")
            }
            Self::TargetNullReference { path, depth } => {
                write!(f, "path '{path}' has a null link at segment {depth}")
            }
            Self::ValueConversionError {
                value,
                target,
                reason,
            } => write!(f, "cannot convert {value} to {target}: {reason}"),
            Self::InvalidTarget { expected, found } => {
                write!(f, "expected target of type '{expected}', found '{found}'")
            }
            Self::Disposed => write!(f, "binding endpoint has been disposed"),
        }
    }
}

impl std::error::Error for BindError {}

/// Result alias used across fbind.
pub type Result<T> = std::result::Result<T, BindError>;
