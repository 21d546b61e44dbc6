//! Layout composer
//!
//! Loading walks a [`TemplateSource`], turns every matching file into a
//! logical name, splits it at [`MARKER`] and registers the pieces. Rendering
//! sequences layout heads, the content template and layout tails so that
//! layouts nest like brackets around the content.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use handlebars::Handlebars;
use serde::Serialize;
use tracing::{debug, info};

use crate::engine::{Function, Settings, SharedHelper};
use crate::error::EngineError;
use crate::registry::{Entry, Registry, head_unit, tail_unit};
use crate::source::TemplateSource;

/// Marks the point in a layout where nested content is rendered
pub const MARKER: &str = "<!--tplusContent-->";

/// A template file after splitting at the layout marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split<'a> {
    Content(&'a str),
    Layout { head: &'a str, tail: &'a str },
}

/// Split a template's text at the layout marker
pub fn split_layout<'a>(name: &str, text: &'a str) -> Result<Split<'a>, EngineError> {
    let mut parts = text.split(MARKER);
    let first = parts.next().unwrap_or_default();
    match (parts.next(), parts.next()) {
        (None, _) => Ok(Split::Content(first)),
        (Some(tail), None) => Ok(Split::Layout { head: first, tail }),
        (Some(_), Some(_)) => {
            debug!(%name, "split_layout: more than one marker");
            Err(EngineError::TooManyMarkers { name: name.to_string() })
        }
    }
}

/// True when the file name's final `.`-suffix equals `extension` exactly
pub fn matches_extension(path: &Path, extension: &str) -> bool {
    let Some(file_name) = path.file_name() else {
        return false;
    };
    let file_name = file_name.to_string_lossy();
    file_name.rfind('.').is_some_and(|idx| &file_name[idx..] == extension)
}

/// Logical name of a template: relative path, `/`-separated, extension stripped
pub fn logical_name(root: &Path, path: &Path, extension: &str) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let normalized = rel.to_string_lossy().replace('\\', "/");
    let normalized = normalized.trim_start_matches('/');
    normalized.strip_suffix(extension).unwrap_or(normalized).to_string()
}

/// Build a complete registry from every matching file in `source`
pub(crate) fn compose(
    source: &dyn TemplateSource,
    settings: &Settings,
    functions: &HashMap<String, Function>,
) -> Result<Registry, EngineError> {
    debug!(root = ?source.root(), extension = %settings.extension, "compose: called");
    let mut hbs = Handlebars::new();
    hbs.set_strict_mode(settings.strict);
    for (name, function) in functions {
        debug!(%name, "compose: binding function");
        hbs.register_helper(name, Box::new(SharedHelper(function.clone())));
    }

    let mut registry = Registry::new(hbs);
    let root = source.root();

    for entry in source.walk()? {
        if entry.is_dir || !matches_extension(&entry.path, &settings.extension) {
            continue;
        }
        let name = logical_name(root, &entry.path, &settings.extension);
        let bytes = source.read(&entry.path)?;
        let text = String::from_utf8(bytes).map_err(|source| EngineError::InvalidUtf8 {
            path: entry.path.clone(),
            source,
        })?;

        match split_layout(&name, &text)? {
            Split::Content(body) => {
                let body = settings.delims.translate(&name, body)?;
                registry.add_content(&name, &body)?;
            }
            Split::Layout { head, tail } => {
                let head = settings.delims.translate(&head_unit(&name), head)?;
                let tail = settings.delims.translate(&tail_unit(&name), tail)?;
                registry.add_layout(&name, &head, &tail)?;
            }
        }

        if settings.debug {
            info!(%name, "Registered view");
        } else {
            debug!(%name, "compose: registered");
        }
    }

    debug!(count = registry.len(), "compose: complete");
    Ok(registry)
}

/// Render `name` wrapped in `layouts`, innermost layout first
///
/// Every name is resolved before anything is written, so an unknown template
/// produces no output. Execution failures stop immediately; whatever was
/// already written stays written.
pub(crate) fn render<W, T>(
    registry: &Registry,
    out: &mut W,
    name: &str,
    data: &T,
    layouts: &[&str],
) -> Result<(), EngineError>
where
    W: Write + ?Sized,
    T: Serialize,
{
    debug!(%name, ?layouts, "render: called");
    let content = match registry.get(name) {
        Some(Entry::Content { unit }) => unit,
        Some(Entry::Layout { .. }) => return Err(EngineError::NotContent { name: name.to_string() }),
        None => return Err(EngineError::NotFound { name: name.to_string() }),
    };

    let mut frames = Vec::with_capacity(layouts.len());
    for layout in layouts {
        match registry.get(layout) {
            Some(Entry::Layout { head, tail }) => frames.push((*layout, head, tail)),
            Some(Entry::Content { .. }) => return Err(EngineError::NotALayout { name: layout.to_string() }),
            None => return Err(EngineError::NotFound { name: layout.to_string() }),
        }
    }

    for (layout, head, _) in frames.iter().rev() {
        registry.execute(layout, head, data, out)?;
    }
    registry.execute(name, content, data, out)?;
    for (layout, _, tail) in &frames {
        registry.execute(layout, tail, data, out)?;
    }

    debug!(%name, "render: complete");
    Ok(())
}
