//! Engine error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading or rendering templates
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to walk template source {root}")]
    Walk {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read template {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Template {path} is not valid UTF-8")]
    InvalidUtf8 {
        path: PathBuf,
        #[source]
        source: std::string::FromUtf8Error,
    },

    #[error("too many layout markers in {name}")]
    TooManyMarkers { name: String },

    #[error("Template name collision: {name}")]
    Collision { name: String },

    #[error("Unclosed delimiter '{left}' in {name}")]
    UnclosedDelimiter { name: String, left: String },

    #[error("Failed to compile template {name}")]
    Compile {
        name: String,
        #[source]
        source: Box<handlebars::TemplateError>,
    },

    #[error("Template not found: {name}")]
    NotFound { name: String },

    #[error("Template {name} is not a layout")]
    NotALayout { name: String },

    #[error("Template {name} is a layout and cannot be rendered as content")]
    NotContent { name: String },

    #[error("Failed to render template {name}")]
    Render {
        name: String,
        #[source]
        source: Box<handlebars::RenderError>,
    },

    #[error("Engine lock poisoned")]
    LockPoisoned,
}

impl EngineError {
    /// Check if this error was raised while loading (as opposed to rendering)
    pub fn is_load_error(&self) -> bool {
        match self {
            EngineError::Walk { .. }
            | EngineError::Read { .. }
            | EngineError::InvalidUtf8 { .. }
            | EngineError::TooManyMarkers { .. }
            | EngineError::Collision { .. }
            | EngineError::UnclosedDelimiter { .. }
            | EngineError::Compile { .. } => true,
            EngineError::NotFound { .. }
            | EngineError::NotALayout { .. }
            | EngineError::NotContent { .. }
            | EngineError::Render { .. }
            | EngineError::LockPoisoned => false,
        }
    }

    /// The logical or unit name this error refers to, if any
    pub fn template_name(&self) -> Option<&str> {
        match self {
            EngineError::TooManyMarkers { name }
            | EngineError::Collision { name }
            | EngineError::UnclosedDelimiter { name, .. }
            | EngineError::Compile { name, .. }
            | EngineError::NotFound { name }
            | EngineError::NotALayout { name }
            | EngineError::NotContent { name }
            | EngineError::Render { name, .. } => Some(name),
            _ => None,
        }
    }
}
