//! The user-script filter convention.
//!
//! A filter is a script callable taking one message string.  Its return
//! value decides what happens to the line:
//!
//! | Filter result        | Effect                         |
//! |----------------------|--------------------------------|
//! | `nil` or `false`     | discard the line               |
//! | string               | replace the message text       |
//! | number               | replace with its string form   |
//! | anything else        | keep the original text         |
//!
//! A filter that raises keeps the line and additionally produces a
//! synthetic error entry for display, so one broken filter cannot
//! silence a container.

use crate::script::{FuncRef, ScriptError, Value};

/// What a filter decided about one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterAction {
    /// Keep the message unchanged.
    Keep,
    /// Discard the line entirely.
    Drop,
    /// Use this text instead of the original message.
    Replace(String),
}

/// Call `filter` with `message` and interpret the result per the
/// convention table above.
pub fn apply(filter: &FuncRef, message: &str) -> Result<FilterAction, ScriptError> {
    let result = filter.call([Value::Str(message.to_owned())])?;
    Ok(match result {
        Value::Nil | Value::Bool(false) => FilterAction::Drop,
        Value::Str(s) => FilterAction::Replace(s),
        Value::Int(i) => FilterAction::Replace(i.to_string()),
        Value::Float(f) => FilterAction::Replace(f.to_string()),
        _ => FilterAction::Keep,
    })
}

/// Outcome of running a line through an optional filter, with errors
/// already degraded for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filtered {
    /// The line to show, if any.
    pub message: Option<String>,
    /// Synthetic error entry to show alongside, when the filter raised.
    pub error: Option<String>,
}

/// Run `message` through `filter` (if any), degrading filter errors
/// into a displayable entry instead of propagating them.
pub fn run(filter: Option<&FuncRef>, message: &str) -> Filtered {
    let Some(filter) = filter else {
        return Filtered { message: Some(message.to_owned()), error: None };
    };
    match apply(filter, message) {
        Ok(FilterAction::Keep) => Filtered { message: Some(message.to_owned()), error: None },
        Ok(FilterAction::Drop) => Filtered { message: None, error: None },
        Ok(FilterAction::Replace(s)) => Filtered { message: Some(s), error: None },
        Err(e) => Filtered {
            message: Some(message.to_owned()),
            error: Some(format!("Error in filter: {e}")),
        },
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
