//! Compiled template registry
//!
//! Every load builds a fresh `Registry` and publishes it whole. Entries are
//! keyed by logical name and tagged by kind; the compiled units themselves
//! live in one shared handlebars namespace so content templates can be used
//! as partials from any other unit.

use std::collections::BTreeMap;
use std::io::Write;

use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

use crate::error::EngineError;

/// Suffix of the unit holding a layout's head fragment
pub const HEAD_SUFFIX: &str = "--tplusHead";

/// Suffix of the unit holding a layout's tail fragment
pub const TAIL_SUFFIX: &str = "--tplusTail";

/// Unit name of a layout's head fragment
pub fn head_unit(name: &str) -> String {
    format!("{name}{HEAD_SUFFIX}")
}

/// Unit name of a layout's tail fragment
pub fn tail_unit(name: &str) -> String {
    format!("{name}{TAIL_SUFFIX}")
}

/// What a logical name resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// A template without a layout marker
    Content { unit: String },
    /// A template split at its layout marker
    Layout { head: String, tail: String },
}

impl Entry {
    pub fn is_layout(&self) -> bool {
        matches!(self, Entry::Layout { .. })
    }
}

/// Logical names mapped to compiled units
pub struct Registry {
    hbs: Handlebars<'static>,
    entries: BTreeMap<String, Entry>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("entries", &self.entries).finish()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(Handlebars::new())
    }
}

impl Registry {
    pub(crate) fn new(hbs: Handlebars<'static>) -> Self {
        Self {
            hbs,
            entries: BTreeMap::new(),
        }
    }

    /// Get the entry registered under a logical name
    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.entries.get(name)
    }

    /// Registered logical names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register a content template under its logical name
    pub(crate) fn add_content(&mut self, name: &str, source: &str) -> Result<(), EngineError> {
        debug!(%name, "Registry::add_content: called");
        self.claim(name)?;
        self.compile_unit(name, source)?;
        self.entries.insert(
            name.to_string(),
            Entry::Content {
                unit: name.to_string(),
            },
        );
        Ok(())
    }

    /// Register both fragments of a layout
    pub(crate) fn add_layout(&mut self, name: &str, head: &str, tail: &str) -> Result<(), EngineError> {
        debug!(%name, "Registry::add_layout: called");
        self.claim(name)?;
        let head_name = head_unit(name);
        let tail_name = tail_unit(name);
        self.compile_unit(&head_name, head)?;
        self.compile_unit(&tail_name, tail)?;
        self.entries.insert(
            name.to_string(),
            Entry::Layout {
                head: head_name,
                tail: tail_name,
            },
        );
        Ok(())
    }

    fn claim(&self, name: &str) -> Result<(), EngineError> {
        if self.entries.contains_key(name) || self.hbs.has_template(name) {
            debug!(%name, "Registry::claim: name already taken");
            return Err(EngineError::Collision { name: name.to_string() });
        }
        Ok(())
    }

    fn compile_unit(&mut self, unit: &str, source: &str) -> Result<(), EngineError> {
        if self.hbs.has_template(unit) {
            debug!(%unit, "Registry::compile_unit: unit already taken");
            return Err(EngineError::Collision { name: unit.to_string() });
        }
        self.hbs
            .register_template_string(unit, source)
            .map_err(|e| EngineError::Compile {
                name: unit.to_string(),
                source: Box::new(e),
            })
    }

    /// Execute one compiled unit, reporting failures against `name`
    pub(crate) fn execute<W, T>(&self, name: &str, unit: &str, data: &T, out: &mut W) -> Result<(), EngineError>
    where
        W: Write + ?Sized,
        T: Serialize,
    {
        debug!(%name, %unit, "Registry::execute: called");
        self.hbs
            .render_to_write(unit, data, &mut *out)
            .map_err(|e| EngineError::Render {
                name: name.to_string(),
                source: Box::new(e),
            })
    }
}
