//! tplus - layout-composing template loader
//!
//! Discovers template files under a root, splits layout files at the
//! `<!--tplusContent-->` marker into a head and a tail, and renders a content
//! template wrapped in any number of nested layouts. Expression evaluation is
//! done by [handlebars](https://docs.rs/handlebars).
//!
//! # Layout
//!
//! ```text
//! templates/
//! ├── index.html            # content: <h1>{{Title}}</h1>
//! ├── partials/header.html  # content, usable as {{> partials/header}}
//! └── layouts/
//!     ├── main.html         # <html><body><!--tplusContent--></body></html>
//!     └── nested.html       # <div id="nested"><!--tplusContent--></div>
//! ```
//!
//! # Example
//!
//! ```ignore
//! use tplus::Engine;
//!
//! let engine = Engine::new("./templates", ".html");
//! engine.load()?;
//!
//! let mut out = Vec::new();
//! engine.render(&mut out, "index", &json!({"Title": "Hi"}), &["layouts/nested", "layouts/main"])?;
//! // <html><body><div id="nested"><h1>Hi</h1></div></body></html>
//! ```

pub mod config;
pub mod delims;
mod engine;
pub mod error;
pub mod layout;
pub mod registry;
pub mod source;

pub use config::EngineConfig;
pub use delims::Delims;
pub use engine::{Engine, Function};
pub use error::EngineError;
pub use layout::{MARKER, Split, split_layout};
pub use registry::{Entry, Registry};
pub use source::{DirSource, EmbeddedSource, MemorySource, SourceEntry, TemplateSource};

/// Default template file extension
pub const DEFAULT_EXTENSION: &str = ".html";
