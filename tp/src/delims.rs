//! Expression delimiters
//!
//! Handlebars only understands `{{`/`}}`. Other delimiter pairs are rewritten
//! to the handlebars markers before a unit is compiled, and literal `{{` found
//! in the surrounding text is escaped so it still renders verbatim.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EngineError;

pub const DEFAULT_LEFT: &str = "{{";
pub const DEFAULT_RIGHT: &str = "}}";

/// Left/right delimiter pair; an empty side stands for the default marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delims {
    #[serde(default = "default_left")]
    pub left: String,
    #[serde(default = "default_right")]
    pub right: String,
}

fn default_left() -> String {
    DEFAULT_LEFT.to_string()
}

fn default_right() -> String {
    DEFAULT_RIGHT.to_string()
}

impl Default for Delims {
    fn default() -> Self {
        Self {
            left: default_left(),
            right: default_right(),
        }
    }
}

impl Delims {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }

    fn effective(&self) -> (&str, &str) {
        let left = if self.left.is_empty() { DEFAULT_LEFT } else { &self.left };
        let right = if self.right.is_empty() { DEFAULT_RIGHT } else { &self.right };
        (left, right)
    }

    /// True when no translation is needed
    pub fn is_default(&self) -> bool {
        self.effective() == (DEFAULT_LEFT, DEFAULT_RIGHT)
    }

    /// Rewrite `source` so that handlebars sees its own markers
    ///
    /// `name` is only used for error reporting.
    pub fn translate<'a>(&self, name: &str, source: &'a str) -> Result<Cow<'a, str>, EngineError> {
        if self.is_default() {
            return Ok(Cow::Borrowed(source));
        }
        let (left, right) = self.effective();
        debug!(%name, %left, %right, "Delims::translate: called");

        let mut out = String::with_capacity(source.len());
        let mut rest = source;
        while let Some(start) = rest.find(left) {
            let text = &rest[..start];
            push_text(&mut out, text);
            // an odd backslash run would turn the expression into an escape
            if text.chars().rev().take_while(|&c| c == '\\').count() % 2 == 1 {
                out.push('\\');
            }
            let after = &rest[start + left.len()..];
            let end = after.find(right).ok_or_else(|| EngineError::UnclosedDelimiter {
                name: name.to_string(),
                left: left.to_string(),
            })?;
            out.push_str(DEFAULT_LEFT);
            out.push_str(&after[..end]);
            out.push_str(DEFAULT_RIGHT);
            rest = &after[end + right.len()..];
        }
        push_text(&mut out, rest);

        Ok(Cow::Owned(out))
    }
}

fn push_text(out: &mut String, text: &str) {
    // `\{{` is the handlebars escape for a literal `{{`
    out.push_str(&text.replace(DEFAULT_LEFT, "\\{{"));
}
