//! # render
//! Universal data-driven templates for generating textual output.
//!
//! Templates use the action language of Go's `text/template` and are rendered
//! against a [`Configuration`], usually a [`Config`] loaded from YAML or JSON files.
//! Besides a library of generic helpers, templates can call `render` to render a
//! nested template, `readFile` to embed a file, `toYaml` to dump part of the
//! configuration, and `gzip`/`ungzip` to compress text.
//!
//! # render as a library
//! ```
//! use std::sync::Arc;
//! use render::{Config, RenderOption, Renderer};
//!
//! let config = Config::from_yaml_str("name: world").unwrap();
//! let renderer = Renderer::new(Some(Arc::new(config)), vec![RenderOption::MissingKeyError]);
//! let out = renderer.render("greeting", "hello {{ .name | upper }}").unwrap();
//! assert_eq!("hello WORLD", out);
//! ```

mod config;
pub use config::{Config, Configuration};
pub mod constants;
pub mod error;
mod fs;
pub mod funcs;
mod renderer;
pub use renderer::{RenderOption, Renderer};
pub mod template;
mod value;
pub use value::Value;
